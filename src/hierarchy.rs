//! Inheritance queries over the load set and the library index.
//!
//! Renaming a member is only sound if every declaration that takes part in the same
//! dispatch receives the same new name. [`Hierarchy`] answers the three questions the
//! renaming and inlining passes ask:
//!
//! - is a member *top level*, i.e. not already declared by an ancestor of its owner
//! - which classes of the load set inherit from a given class (its *closure*)
//! - does any class of a closure also inherit the member from somewhere outside the closure
//!
//! Ancestors are looked up in the load set first and in the [`ExternalSymbolIndex`] second.
//! A missing ancestor is an [`Error::UnresolvedClass`] in strict mode; otherwise it is
//! logged and treated as declaring nothing.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::{
    model::{ClassFile, LoadSet},
    Error, ExternalSymbolIndex, Result,
};

/// The identity of a member for override and hiding purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemberKey<'k> {
    /// Fields are identified by name alone
    Field(&'k str),
    /// Methods are identified by name and descriptor
    Method(&'k str, &'k str),
}

impl<'k> MemberKey<'k> {
    /// Returns `true` if `class` declares a member with this key.
    #[must_use]
    pub fn declared_by(self, class: &ClassFile) -> bool {
        match self {
            MemberKey::Field(name) => class.field(name).is_some(),
            MemberKey::Method(name, desc) => class.method(name, desc).is_some(),
        }
    }

    /// The same kind of key with another name.
    #[must_use]
    pub fn renamed<'n>(self, name: &'n str) -> MemberKey<'n>
    where
        'k: 'n,
    {
        match self {
            MemberKey::Field(_) => MemberKey::Field(name),
            MemberKey::Method(_, desc) => MemberKey::Method(name, desc),
        }
    }
}

/// Subtype relations of one load set, resolved against a library index.
pub struct Hierarchy<'a> {
    set: &'a LoadSet,
    index: &'a ExternalSymbolIndex,
    strict: bool,
    subtypes: HashMap<&'a str, Vec<&'a str>>,
}

impl<'a> Hierarchy<'a> {
    /// Indexes the direct subtypes of every class in `set`.
    #[must_use]
    pub fn build(set: &'a LoadSet, index: &'a ExternalSymbolIndex, strict: bool) -> Self {
        let mut subtypes: HashMap<&str, Vec<&str>> = HashMap::new();
        for class in set.classes() {
            for parent in class.supertypes() {
                subtypes.entry(parent).or_default().push(class.name.as_str());
            }
        }
        Hierarchy {
            set,
            index,
            strict,
            subtypes,
        }
    }

    /// The load set this hierarchy was built from.
    #[must_use]
    pub fn set(&self) -> &'a LoadSet {
        self.set
    }

    /// Finds a class in the load set or, failing that, in the library index.
    #[must_use]
    pub fn class(&self, name: &str) -> Option<&'a ClassFile> {
        self.set.class(name).or_else(|| self.index.get(name))
    }

    /// Returns every transitive superclass and superinterface of `name`, nearest first,
    /// without `name` itself.
    ///
    /// # Errors
    /// Returns [`Error::UnresolvedClass`] in strict mode if an ancestor can not be found.
    pub fn ancestors(&self, name: &str) -> Result<Vec<&'a ClassFile>> {
        let mut ancestors = Vec::new();
        let Some(start) = self.class(name) else {
            return Ok(ancestors);
        };

        let mut seen = HashSet::from([start.name.as_str()]);
        let mut queue = VecDeque::from([start]);
        while let Some(class) = queue.pop_front() {
            for parent in class.supertypes() {
                if !seen.insert(parent) {
                    continue;
                }
                match self.class(parent) {
                    Some(found) => {
                        ancestors.push(found);
                        queue.push_back(found);
                    }
                    None if self.strict => {
                        return Err(Error::UnresolvedClass {
                            name: parent.to_string(),
                            referenced_by: class.name.clone(),
                        })
                    }
                    None => log::debug!("Ignoring unresolved ancestor {parent} of {}", class.name),
                }
            }
        }
        Ok(ancestors)
    }

    /// Returns `true` if no ancestor of `owner` declares `key`.
    ///
    /// # Errors
    /// See [`Hierarchy::ancestors`].
    pub fn is_top_level(&self, owner: &str, key: MemberKey<'_>) -> Result<bool> {
        Ok(!self.ancestors(owner)?.iter().any(|class| key.declared_by(class)))
    }

    /// Returns `name` followed by every class of the load set that inherits from it.
    #[must_use]
    pub fn closure(&self, name: &str) -> Vec<&'a str> {
        let Some(root) = self.set.class(name) else {
            return Vec::new();
        };
        let mut closure = vec![root.name.as_str()];
        let mut seen: HashSet<&str> = HashSet::from([root.name.as_str()]);
        let mut cursor = 0;
        while cursor < closure.len() {
            if let Some(children) = self.subtypes.get(closure[cursor]) {
                for &child in children {
                    if seen.insert(child) {
                        closure.push(child);
                    }
                }
            }
            cursor += 1;
        }
        closure
    }

    /// Returns `true` if a member of `closure` inherits `key` from an ancestor outside the
    /// closure, so the closure can not be renamed on its own.
    ///
    /// # Errors
    /// See [`Hierarchy::ancestors`].
    pub fn conflicts(&self, closure: &[&str], key: MemberKey<'_>) -> Result<bool> {
        for member in closure {
            for ancestor in self.ancestors(member)? {
                if !closure.contains(&ancestor.name.as_str()) && key.declared_by(ancestor) {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    /// Returns `true` if `key` is declared anywhere in `closure` or its ancestors.
    ///
    /// # Errors
    /// See [`Hierarchy::ancestors`].
    pub fn is_taken(&self, closure: &[&str], key: MemberKey<'_>) -> Result<bool> {
        for member in closure {
            if self.class(member).is_some_and(|class| key.declared_by(class)) {
                return Ok(true);
            }
            if self.ancestors(member)?.iter().any(|class| key.declared_by(class)) {
                return Ok(true);
            }
        }
        Ok(false)
    }
}
