//! Method renaming.
//!
//! Each top-level method gets one new name that is pushed into every class of its subtype
//! closure, whether or not the subtype declares the method yet. Overrides therefore keep
//! overriding, and a call through any type of the closure reaches the same declaration as
//! before.
//!
//! The following methods are never candidates:
//!
//! - constructors and static initializers
//! - names on the configured skip list (`main` and the serialization hooks by default)
//! - native methods, which are linked by name
//! - elements of annotation interfaces, which are looked up by name at runtime
//! - `values()` and `valueOf(String)` of enum classes

use rand::seq::SliceRandom;

use crate::{
    model::{AccessFlags, ClassFile, LoadSet, Method},
    obfuscate::{
        config::MethodRenameConfig,
        passes::{rename_members, MemberCandidate},
        PassContext, Transform,
    },
    remap::Remapper,
    Result,
};

/// Renames methods to generated names.
pub struct MethodRenamer {
    config: MethodRenameConfig,
}

impl MethodRenamer {
    /// Creates the pass.
    #[must_use]
    pub fn new(config: MethodRenameConfig) -> Self {
        Self { config }
    }

    fn is_candidate(&self, class: &ClassFile, method: &Method) -> bool {
        if method.name.contains('<') || self.config.skip.contains(&method.name) {
            return false;
        }
        if method.access.contains(AccessFlags::NATIVE)
            || class.access.contains(AccessFlags::ANNOTATION)
        {
            return false;
        }
        let enum_helper = (method.name == "values" && method.desc.starts_with("()"))
            || (method.name == "valueOf" && method.desc.starts_with("(Ljava/lang/String;)"));
        !(class.access.contains(AccessFlags::ENUM) && enum_helper)
    }
}

impl Transform for MethodRenamer {
    fn name(&self) -> &'static str {
        "methods"
    }

    fn description(&self) -> &'static str {
        "Renames methods, preserving overrides across the hierarchy"
    }

    fn apply(&mut self, set: &mut LoadSet, ctx: &mut PassContext<'_>) -> Result<usize> {
        ctx.names.reset();

        let mut candidates: Vec<MemberCandidate> = set
            .classes()
            .flat_map(|class| {
                class
                    .methods
                    .iter()
                    .filter(|method| self.is_candidate(class, method))
                    .map(|method| MemberCandidate {
                        owner: class.name.clone(),
                        name: method.name.clone(),
                        desc: Some(method.desc.clone()),
                    })
            })
            .collect();
        candidates.shuffle(&mut *ctx.rng);

        let mapping = {
            let hierarchy = ctx.hierarchy(set);
            rename_members(&hierarchy, &candidates, &mut *ctx.names)?
        };
        Remapper::new(&mapping).apply(set)?;

        log::info!("Renamed {} method declarations", mapping.len());
        Ok(mapping.len())
    }
}

#[cfg(test)]
mod tests {
    use rand::{rngs::StdRng, SeedableRng};

    use super::*;
    use crate::{
        model::{builder::ClassBuilder, Insn},
        naming::LexicographicNames,
        test::{context, jdk_index},
    };

    fn run(set: &mut LoadSet, seed: u64) -> usize {
        let index = jdk_index();
        let mut names = LexicographicNames::new();
        let mut rng = StdRng::seed_from_u64(seed);
        let mut ctx = context(&index, &mut names, &mut rng);
        MethodRenamer::new(MethodRenameConfig::default())
            .apply(set, &mut ctx)
            .unwrap()
    }

    fn override_set() -> LoadSet {
        let mut set = LoadSet::new();
        set.insert_class(
            ClassBuilder::new("p/Base")
                .default_constructor()
                .method(AccessFlags::PUBLIC, "f", "()I", |code| {
                    code.iconst(1).ireturn();
                })
                .method(AccessFlags::PUBLIC, "toString", "()Ljava/lang/String;", |code| {
                    code.ldc_str("base").areturn();
                })
                .build(),
        );
        set.insert_class(
            ClassBuilder::new("p/Sub")
                .extends("p/Base")
                .default_constructor()
                .method(AccessFlags::PUBLIC, "f", "()I", |code| {
                    code.iconst(2).ireturn();
                })
                .build(),
        );
        set.insert_class(
            ClassBuilder::new("p/Caller")
                .method(AccessFlags::PUBLIC | AccessFlags::STATIC, "call", "(Lp/Base;)I", |code| {
                    code.aload(0).invokevirtual("p/Base", "f", "()I").ireturn();
                })
                .method(
                    AccessFlags::PUBLIC | AccessFlags::STATIC,
                    "main",
                    "([Ljava/lang/String;)V",
                    |code| {
                        code.vreturn();
                    },
                )
                .abstract_method(
                    AccessFlags::PUBLIC | AccessFlags::STATIC | AccessFlags::NATIVE,
                    "nativeCall",
                    "()V",
                )
                .build(),
        );
        set
    }

    #[test]
    fn overrides_share_the_new_name() {
        for seed in 0..4 {
            let mut set = override_set();
            run(&mut set, seed);

            let base = set.class("p/Base").unwrap();
            let sub = set.class("p/Sub").unwrap();
            let base_f = &base.methods[1].name;
            assert_ne!(base_f, "f");
            assert_eq!(&sub.methods[1].name, base_f);
            assert_eq!(base.methods[0].name, "<init>");
            assert_eq!(base.methods[2].name, "toString");

            let caller = set.class("p/Caller").unwrap();
            let code = caller.methods[0].code.as_ref().unwrap();
            assert!(code.instructions.real().any(|insn| matches!(insn,
                Insn::Method { owner, name, .. } if owner == "p/Base" && name == base_f)));
            assert_eq!(caller.methods[1].name, "main");
            assert_eq!(caller.methods[2].name, "nativeCall");
        }
    }

    #[test]
    fn interface_implementations_follow_the_interface() {
        let mut set = LoadSet::new();
        set.insert_class(
            ClassBuilder::interface("p/Task")
                .abstract_method(AccessFlags::PUBLIC | AccessFlags::ABSTRACT, "work", "()V")
                .build(),
        );
        set.insert_class(
            ClassBuilder::new("p/Job")
                .implements("p/Task")
                .method(AccessFlags::PUBLIC, "work", "()V", |code| {
                    code.vreturn();
                })
                .method(AccessFlags::PUBLIC, "run", "()V", |code| {
                    code.vreturn();
                })
                .build(),
        );
        set.insert_class(
            ClassBuilder::new("p/Worker")
                .implements("java/lang/Runnable")
                .method(AccessFlags::PUBLIC, "run", "()V", |code| {
                    code.vreturn();
                })
                .build(),
        );
        run(&mut set, 9);

        let task = set.class("p/Task").unwrap();
        let job = set.class("p/Job").unwrap();
        assert_ne!(task.methods[0].name, "work");
        assert_eq!(job.methods[0].name, task.methods[0].name);
        assert_ne!(job.methods[1].name, "run");
        assert_eq!(set.class("p/Worker").unwrap().methods[0].name, "run");
    }

    #[test]
    fn unrelated_interfaces_with_one_method_are_skipped() {
        let mut set = LoadSet::new();
        for name in ["p/Left", "p/Right"] {
            set.insert_class(
                ClassBuilder::interface(name)
                    .method(AccessFlags::PUBLIC, "greet", "()V", |code| {
                        code.vreturn();
                    })
                    .build(),
            );
        }
        set.insert_class(
            ClassBuilder::new("p/Both")
                .implements("p/Left")
                .implements("p/Right")
                .method(AccessFlags::PUBLIC, "greet", "()V", |code| {
                    code.vreturn();
                })
                .build(),
        );
        assert_eq!(run(&mut set, 2), 0);
        for name in ["p/Left", "p/Right", "p/Both"] {
            assert_eq!(set.class(name).unwrap().methods[0].name, "greet");
        }
    }

    #[test]
    fn enum_and_annotation_methods_are_kept() {
        let mut set = LoadSet::new();
        set.insert_class(
            ClassBuilder::new("p/Color")
                .extends("java/lang/Enum")
                .access(AccessFlags::PUBLIC | AccessFlags::FINAL | AccessFlags::ENUM)
                .abstract_method(AccessFlags::PUBLIC | AccessFlags::STATIC, "values", "()[Lp/Color;")
                .abstract_method(
                    AccessFlags::PUBLIC | AccessFlags::STATIC,
                    "valueOf",
                    "(Ljava/lang/String;)Lp/Color;",
                )
                .build(),
        );
        set.insert_class(
            ClassBuilder::interface("p/Tag")
                .access(
                    AccessFlags::PUBLIC
                        | AccessFlags::INTERFACE
                        | AccessFlags::ABSTRACT
                        | AccessFlags::ANNOTATION,
                )
                .implements("java/lang/annotation/Annotation")
                .abstract_method(AccessFlags::PUBLIC | AccessFlags::ABSTRACT, "color", "()Lp/Color;")
                .build(),
        );
        assert_eq!(run(&mut set, 0), 0);
    }
}
