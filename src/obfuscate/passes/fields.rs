//! Field renaming.
//!
//! Field access resolves through superclasses and superinterfaces, so a field access naming
//! a subclass may well target a field declared higher up. The pass therefore renames each
//! top-level field together with every same-named field in its subtype closure, which keeps
//! hiding relations intact.

use rand::seq::SliceRandom;

use crate::{
    model::LoadSet,
    obfuscate::{
        config::FieldRenameConfig,
        passes::{rename_members, MemberCandidate},
        PassContext, Transform,
    },
    remap::Remapper,
    Result,
};

/// Renames fields to generated names.
pub struct FieldRenamer {
    config: FieldRenameConfig,
}

impl FieldRenamer {
    /// Creates the pass.
    #[must_use]
    pub fn new(config: FieldRenameConfig) -> Self {
        Self { config }
    }
}

impl Transform for FieldRenamer {
    fn name(&self) -> &'static str {
        "fields"
    }

    fn description(&self) -> &'static str {
        "Renames fields, preserving hiding across the hierarchy"
    }

    fn apply(&mut self, set: &mut LoadSet, ctx: &mut PassContext<'_>) -> Result<usize> {
        ctx.names.reset();

        let mut candidates: Vec<MemberCandidate> = set
            .classes()
            .flat_map(|class| {
                class
                    .fields
                    .iter()
                    .filter(|field| !self.config.skip.contains(&field.name))
                    .map(|field| MemberCandidate {
                        owner: class.name.clone(),
                        name: field.name.clone(),
                        desc: None,
                    })
            })
            .collect();
        candidates.shuffle(&mut *ctx.rng);

        let mapping = {
            let hierarchy = ctx.hierarchy(set);
            rename_members(&hierarchy, &candidates, &mut *ctx.names)?
        };
        Remapper::new(&mapping).apply(set)?;

        log::info!("Renamed {} field declarations", mapping.len());
        Ok(mapping.len())
    }
}

#[cfg(test)]
mod tests {
    use rand::{rngs::StdRng, SeedableRng};

    use super::*;
    use crate::{
        model::{builder::ClassBuilder, AccessFlags, Insn},
        naming::LexicographicNames,
        test::{context, jdk_index},
    };

    #[test]
    fn hidden_fields_follow_their_ancestor() {
        let mut set = LoadSet::new();
        set.insert_class(
            ClassBuilder::new("p/Base")
                .field(AccessFlags::PROTECTED, "value", "I")
                .field(AccessFlags::PRIVATE | AccessFlags::STATIC, "serialVersionUID", "J")
                .build(),
        );
        set.insert_class(
            ClassBuilder::new("p/Derived")
                .extends("p/Base")
                .field(AccessFlags::PRIVATE, "value", "Ljava/lang/String;")
                .method(AccessFlags::PUBLIC, "read", "()I", |code| {
                    code.aload(0).getfield("p/Derived", "value", "I").ireturn();
                })
                .build(),
        );

        let index = jdk_index();
        let mut names = LexicographicNames::new();
        let mut rng = StdRng::seed_from_u64(5);
        let mut ctx = context(&index, &mut names, &mut rng);
        let changed = FieldRenamer::new(FieldRenameConfig::default())
            .apply(&mut set, &mut ctx)
            .unwrap();
        assert_eq!(changed, 2);

        let base = set.class("p/Base").unwrap();
        let derived = set.class("p/Derived").unwrap();
        assert_eq!(base.fields[0].name, derived.fields[0].name);
        assert_ne!(base.fields[0].name, "value");
        assert_eq!(base.fields[1].name, "serialVersionUID");

        let code = derived.methods[0].code.as_ref().unwrap();
        assert!(code.instructions.real().any(
            |insn| matches!(insn, Insn::Field { name, .. } if *name == base.fields[0].name)
        ));
    }
}
