//! Configuration for the obfuscation pipeline.
//!
//! This module provides the configuration types for selecting and ordering passes, choosing
//! the name generator, seeding randomness and locating library classes.

use std::path::PathBuf;

use strum::{Display, EnumIter, EnumString};

use crate::naming::NamingStrategy;

/// The passes the pipeline can run, named as on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum PassKind {
    /// Make every class, field and method public
    #[strum(serialize = "access")]
    AccessWidening,
    /// Move string constants into a lookup table
    Strings,
    /// Rename classes
    Classes,
    /// Rename fields
    Fields,
    /// Rename methods
    Methods,
    /// Replace trivial getters and setters by field accesses
    Accessors,
    /// Drop source file, line number and local variable information
    #[strum(serialize = "debug")]
    DebugInfo,
    /// Randomize the order of members and attributes
    Shuffle,
}

impl PassKind {
    /// The default pipeline, in order.
    #[must_use]
    pub fn default_pipeline() -> Vec<PassKind> {
        vec![
            PassKind::AccessWidening,
            PassKind::Strings,
            PassKind::Classes,
            PassKind::Fields,
            PassKind::Methods,
            PassKind::Accessors,
            PassKind::DebugInfo,
            PassKind::Shuffle,
        ]
    }
}

/// Configuration of class renaming.
#[derive(Debug, Clone)]
pub struct ClassRenameConfig {
    /// Package renamed classes are moved to, `/` or `.` separated; empty for the default
    /// package (default: empty).
    pub target_package: String,

    /// Classes that keep their name, `/` or `.` separated.
    pub skip: Vec<String>,

    /// Also keep the `Main-Class` named by the jar manifest (default: true).
    pub keep_main_class: bool,
}

impl Default for ClassRenameConfig {
    fn default() -> Self {
        Self {
            target_package: String::new(),
            skip: Vec::new(),
            keep_main_class: true,
        }
    }
}

impl ClassRenameConfig {
    /// The target package in internal form, without trailing separator.
    #[must_use]
    pub fn package(&self) -> String {
        self.target_package
            .trim_matches(|c| c == '/' || c == '.')
            .replace('.', "/")
    }

    /// The skip list in internal form.
    #[must_use]
    pub fn skipped(&self) -> Vec<String> {
        self.skip.iter().map(|name| name.replace('.', "/")).collect()
    }
}

/// Configuration of method renaming.
#[derive(Debug, Clone)]
pub struct MethodRenameConfig {
    /// Method names that are never renamed.
    ///
    /// Defaults to `main` and the private hooks Java serialization looks up by name.
    pub skip: Vec<String>,
}

impl Default for MethodRenameConfig {
    fn default() -> Self {
        Self {
            skip: [
                "main",
                "writeObject",
                "readObject",
                "readObjectNoData",
                "writeReplace",
                "readResolve",
            ]
            .iter()
            .map(ToString::to_string)
            .collect(),
        }
    }
}

/// Configuration of field renaming.
#[derive(Debug, Clone)]
pub struct FieldRenameConfig {
    /// Field names that are never renamed (default: the serialization fields).
    pub skip: Vec<String>,
}

impl Default for FieldRenameConfig {
    fn default() -> Self {
        Self {
            skip: vec![
                "serialVersionUID".to_string(),
                "serialPersistentFields".to_string(),
            ],
        }
    }
}

/// Configuration of string relocation.
#[derive(Debug, Clone)]
pub struct StringConfig {
    /// Store strings Base64 encoded and decode them on lookup (default: true).
    ///
    /// Only honored if every class targets Java 8 or newer, where `java.util.Base64` exists.
    pub encode: bool,

    /// Log and skip a host class that can not take the lookup table instead of failing the
    /// run (default: false).
    pub lenient: bool,
}

impl Default for StringConfig {
    fn default() -> Self {
        Self {
            encode: true,
            lenient: false,
        }
    }
}

/// Configuration of an [`crate::Obfuscator`] run.
#[derive(Debug, Clone)]
pub struct ObfuscatorConfig {
    /// Passes to run, in order.
    pub passes: Vec<PassKind>,

    /// How new names are generated.
    pub naming: NamingStrategy,

    /// Seed for every random choice; `None` draws one from the operating system.
    pub seed: Option<u64>,

    /// Jars, jmods and class directories holding library classes.
    pub library_path: Vec<PathBuf>,

    /// Add the platform library of `JAVA_HOME` to the library path (default: true).
    pub platform_library: bool,

    /// Fail on ancestors that can not be resolved instead of assuming they declare nothing
    /// (default: true).
    pub strict_hierarchy: bool,

    /// Class renaming.
    pub classes: ClassRenameConfig,

    /// Method renaming.
    pub methods: MethodRenameConfig,

    /// Field renaming.
    pub fields: FieldRenameConfig,

    /// String relocation.
    pub strings: StringConfig,
}

impl Default for ObfuscatorConfig {
    fn default() -> Self {
        Self {
            passes: PassKind::default_pipeline(),
            naming: NamingStrategy::default(),
            seed: None,
            library_path: Vec::new(),
            platform_library: true,
            strict_hierarchy: true,
            classes: ClassRenameConfig::default(),
            methods: MethodRenameConfig::default(),
            fields: FieldRenameConfig::default(),
            strings: StringConfig::default(),
        }
    }
}

impl ObfuscatorConfig {
    /// Creates a new configuration with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the pass list.
    #[must_use]
    pub fn with_passes(mut self, passes: Vec<PassKind>) -> Self {
        self.passes = passes;
        self
    }

    /// Sets the name generator.
    #[must_use]
    pub fn with_naming(mut self, naming: NamingStrategy) -> Self {
        self.naming = naming;
        self
    }

    /// Fixes the random seed, making runs reproducible.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Adds a jar, jmod or class directory to the library path.
    #[must_use]
    pub fn with_library(mut self, path: impl Into<PathBuf>) -> Self {
        self.library_path.push(path.into());
        self
    }

    /// Enables or disables the `JAVA_HOME` platform library.
    #[must_use]
    pub fn with_platform_library(mut self, enabled: bool) -> Self {
        self.platform_library = enabled;
        self
    }

    /// Enables or disables failing on unresolved ancestors.
    #[must_use]
    pub fn with_strict_hierarchy(mut self, strict: bool) -> Self {
        self.strict_hierarchy = strict;
        self
    }

    /// Sets the package renamed classes are moved to.
    #[must_use]
    pub fn with_target_package(mut self, package: impl Into<String>) -> Self {
        self.classes.target_package = package.into();
        self
    }

    /// Keeps a class from being renamed.
    #[must_use]
    pub fn with_kept_class(mut self, name: impl Into<String>) -> Self {
        self.classes.skip.push(name.into());
        self
    }

    /// Replaces the string relocation settings.
    #[must_use]
    pub fn with_strings(mut self, strings: StringConfig) -> Self {
        self.strings = strings;
        self
    }
}
