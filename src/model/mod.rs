//! The program model: compilation units, members and instruction sequences.
//!
//! A [`LoadSet`] is an arena of [`ClassFile`]s keyed by internal name plus the opaque
//! resources of the archive they came from. Units never hold references to each other; a
//! superclass, an interface or the owner of a field access is a name that is looked up in
//! the load set (or in the [`crate::ExternalSymbolIndex`] for library classes) when needed.
//! Renaming a class is therefore a matter of rewriting strings and re-keying the arena.
//!
//! # Key Components
//!
//! - [`ClassFile`], [`Field`], [`Method`], [`Code`] - The class structure
//! - [`Insn`], [`InsnList`], [`Label`] - Instruction sequences with label indirection
//! - [`Constant`], [`Handle`] - Loadable constants
//! - [`Annotation`], [`ElementValue`] - Annotation data
//! - [`builder`] - Fluent construction of classes and method bodies

mod access;
mod annotation;
pub mod builder;
mod class;
mod constant;
pub mod descriptor;
mod insn;
pub mod opcodes;

use std::collections::BTreeMap;

pub use access::AccessFlags;
pub use annotation::{Annotation, Annotations, ElementValue, TypeAnnotation};
pub use class::{
    package_of, ClassFile, Code, EnclosingMethod, Field, InnerClass, LocalVariable, Method,
    Parameter, RawAttribute, RecordComponent, TryCatchBlock,
};
pub use constant::{Constant, ConstantDynamic, Handle, HandleKind};
pub use insn::{Insn, InsnList, Label, VerificationType};

use crate::{Error, Result};

/// The classes and resources of one program, owned by the pipeline for the whole run.
///
/// Passes may rename units in place; [`LoadSet::rekey`] restores the name-to-unit mapping
/// afterwards.
#[derive(Debug, Clone, Default)]
pub struct LoadSet {
    classes: BTreeMap<String, ClassFile>,
    resources: BTreeMap<String, Vec<u8>>,
}

impl LoadSet {
    /// Creates an empty load set.
    #[must_use]
    pub fn new() -> Self {
        LoadSet::default()
    }

    /// Adds a class under its current name and returns the unit it replaced.
    pub fn insert_class(&mut self, class: ClassFile) -> Option<ClassFile> {
        self.classes.insert(class.name.clone(), class)
    }

    /// Looks up a class by internal name.
    #[must_use]
    pub fn class(&self, name: &str) -> Option<&ClassFile> {
        self.classes.get(name)
    }

    /// Looks up a class by internal name for modification.
    pub fn class_mut(&mut self, name: &str) -> Option<&mut ClassFile> {
        self.classes.get_mut(name)
    }

    /// Removes a class by internal name.
    pub fn remove_class(&mut self, name: &str) -> Option<ClassFile> {
        self.classes.remove(name)
    }

    /// Returns `true` if a class with this key exists.
    #[must_use]
    pub fn contains_class(&self, name: &str) -> bool {
        self.classes.contains_key(name)
    }

    /// Iterates over all classes in key order.
    pub fn classes(&self) -> impl Iterator<Item = &ClassFile> {
        self.classes.values()
    }

    /// Iterates mutably over all classes in key order.
    pub fn classes_mut(&mut self) -> impl Iterator<Item = &mut ClassFile> {
        self.classes.values_mut()
    }

    /// Applies `f` to every class in parallel.
    ///
    /// Every class is visited even if `f` fails for some of them, so the outcome does not
    /// depend on scheduling.
    ///
    /// # Errors
    /// Returns the error of the first failing class in name order.
    pub fn try_for_each_class<F>(&mut self, f: F) -> Result<()>
    where
        F: Fn(&mut ClassFile) -> Result<()> + Sync + Send,
    {
        use rayon::prelude::*;

        let results: Vec<Result<()>> = self
            .classes
            .par_iter_mut()
            .map(|(_, class)| f(class))
            .collect();
        results.into_iter().collect()
    }

    /// Returns the class keys in order.
    #[must_use]
    pub fn class_names(&self) -> Vec<String> {
        self.classes.keys().cloned().collect()
    }

    /// Number of classes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.classes.len()
    }

    /// Returns `true` if there are no classes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// Adds an opaque entry under its relative path.
    pub fn insert_resource(&mut self, path: impl Into<String>, data: Vec<u8>) {
        self.resources.insert(path.into(), data);
    }

    /// Looks up an opaque entry.
    #[must_use]
    pub fn resource(&self, path: &str) -> Option<&[u8]> {
        self.resources.get(path).map(Vec::as_slice)
    }

    /// Removes an opaque entry.
    pub fn remove_resource(&mut self, path: &str) -> Option<Vec<u8>> {
        self.resources.remove(path)
    }

    /// Iterates over the opaque entries in path order.
    pub fn resources(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.resources
            .iter()
            .map(|(path, data)| (path.as_str(), data.as_slice()))
    }

    /// Re-keys every class by its current name.
    ///
    /// # Errors
    /// Returns [`Error::NameCollision`] if two classes carry the same name. The load set is
    /// left unchanged in that case.
    pub fn rekey(&mut self) -> Result<()> {
        if self.classes.iter().all(|(key, class)| *key == class.name) {
            return Ok(());
        }

        let mut rekeyed = BTreeMap::new();
        for class in self.classes.values() {
            if rekeyed.insert(class.name.as_str(), ()).is_some() {
                return Err(Error::NameCollision(class.name.clone()));
            }
        }

        let classes = std::mem::take(&mut self.classes);
        self.classes = classes
            .into_values()
            .map(|class| (class.name.clone(), class))
            .collect();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rekey_after_rename() {
        let mut set = LoadSet::new();
        set.insert_class(ClassFile::new("a/Old", Some("java/lang/Object")));
        set.insert_class(ClassFile::new("a/Other", Some("java/lang/Object")));

        set.class_mut("a/Old").unwrap().name = "b/New".to_string();
        assert!(set.class("b/New").is_none());

        set.rekey().unwrap();
        assert!(set.class("a/Old").is_none());
        assert_eq!(set.class("b/New").unwrap().name, "b/New");
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn rekey_collision() {
        let mut set = LoadSet::new();
        set.insert_class(ClassFile::new("A", None));
        set.insert_class(ClassFile::new("B", None));
        set.class_mut("A").unwrap().name = "B".to_string();

        assert!(matches!(set.rekey(), Err(Error::NameCollision(name)) if name == "B"));
        assert!(set.class("A").is_some());
    }

    #[test]
    fn resources_kept_by_path() {
        let mut set = LoadSet::new();
        set.insert_resource("META-INF/MANIFEST.MF", b"Manifest-Version: 1.0\n".to_vec());
        set.insert_resource("img/logo.png", vec![1, 2, 3]);
        assert_eq!(set.resource("img/logo.png"), Some(&[1u8, 2, 3][..]));
        assert_eq!(set.resources().count(), 2);
        assert!(set.remove_resource("img/logo.png").is_some());
    }

    #[test]
    fn parallel_visit() {
        let mut set = LoadSet::new();
        for name in ["A", "B", "C"] {
            set.insert_class(ClassFile::new(name, Some("java/lang/Object")));
        }
        set.try_for_each_class(|class| {
            class.major_version = 55;
            Ok(())
        })
        .unwrap();
        assert!(set.classes().all(|c| c.major_version == 55));

        let err = set.try_for_each_class(|class| {
            if class.name == "B" {
                Err(Error::Error("boom".into()))
            } else {
                Ok(())
            }
        });
        assert!(err.is_err());
    }

    #[test]
    fn first_failure_in_name_order() {
        let mut set = LoadSet::new();
        for i in 0..64 {
            set.insert_class(ClassFile::new(format!("p/C{i:02}"), Some("java/lang/Object")));
        }
        for _ in 0..8 {
            let err = set.try_for_each_class(|class| {
                class.major_version = 61;
                if class.name.ends_with('7') {
                    Err(Error::Error(class.name.clone()))
                } else {
                    Ok(())
                }
            });
            assert!(matches!(err, Err(Error::Error(name)) if name == "p/C07"));
        }
        assert!(set.classes().all(|c| c.major_version == 61));
    }
}
