//! The transform passes.
//!
//! | Pass | [`PassKind`](crate::obfuscate::PassKind) | Effect |
//! |---|---|---|
//! | [`AccessWidener`] | `access` | Classes, fields and methods become public |
//! | [`StringRelocator`] | `strings` | String constants move into a lookup table |
//! | [`ClassRenamer`] | `classes` | Classes get generated names in the target package |
//! | [`FieldRenamer`] | `fields` | Fields get generated names, hiding preserved |
//! | [`MethodRenamer`] | `methods` | Methods get generated names, overriding preserved |
//! | [`AccessorInliner`] | `accessors` | Trivial getters and setters are replaced by field access |
//! | [`DebugInfoStripper`] | `debug` | Source file, line and local variable data are dropped |
//! | [`MemberShuffler`] | `shuffle` | Member and attribute order is randomized |

mod access;
mod accessors;
mod classes;
mod debug;
mod fields;
mod methods;
mod shuffle;
mod strings;

use std::collections::{HashMap, HashSet};

pub use access::AccessWidener;
pub use accessors::AccessorInliner;
pub use classes::ClassRenamer;
pub use debug::DebugInfoStripper;
pub use fields::FieldRenamer;
pub use methods::MethodRenamer;
pub use shuffle::MemberShuffler;
pub use strings::StringRelocator;

use crate::{
    hierarchy::{Hierarchy, MemberKey},
    naming::NameGenerator,
    remap::Mapping,
    Result,
};

/// A field or method considered for renaming.
#[derive(Debug, Clone)]
pub(crate) struct MemberCandidate {
    pub owner: String,
    pub name: String,
    /// `None` for fields
    pub desc: Option<String>,
}

impl MemberCandidate {
    fn key(&self) -> MemberKey<'_> {
        match &self.desc {
            Some(desc) => MemberKey::Method(&self.name, desc),
            None => MemberKey::Field(&self.name),
        }
    }
}

fn tag(key: MemberKey<'_>) -> String {
    match key {
        MemberKey::Field(name) => name.to_string(),
        MemberKey::Method(name, desc) => format!("{name}{desc}"),
    }
}

/// Assigns one new name per top-level candidate and pushes it into the whole subtype
/// closure of its owner.
///
/// Candidates inherited from an ancestor are skipped; they are renamed through that
/// ancestor. Candidates whose closure also inherits the key from outside are left alone.
pub(crate) fn rename_members(
    hierarchy: &Hierarchy<'_>,
    candidates: &[MemberCandidate],
    names: &mut dyn NameGenerator,
) -> Result<Mapping> {
    let mut mapping = Mapping::new();
    let mut assigned: HashMap<String, HashSet<String>> = HashMap::new();

    for candidate in candidates {
        let key = candidate.key();
        if !hierarchy.is_top_level(&candidate.owner, key)? {
            continue;
        }
        let closure = hierarchy.closure(&candidate.owner);
        if hierarchy.conflicts(&closure, key)? {
            log::debug!(
                "Keeping {}.{} inherited from outside its closure",
                candidate.owner,
                candidate.name
            );
            continue;
        }

        let new = loop {
            let name = names.next_name();
            let new_key = key.renamed(&name);
            let new_tag = tag(new_key);
            let clashes = closure
                .iter()
                .any(|class| assigned.get(*class).is_some_and(|tags| tags.contains(&new_tag)));
            if !clashes && !hierarchy.is_taken(&closure, new_key)? {
                break name;
            }
        };

        let new_tag = tag(key.renamed(&new));
        for class in &closure {
            match &candidate.desc {
                Some(desc) => mapping.map_method(class, &candidate.name, desc, &new),
                None => mapping.map_field(class, &candidate.name, &new),
            };
            assigned
                .entry((*class).to_string())
                .or_default()
                .insert(new_tag.clone());
        }
    }
    Ok(mapping)
}
