//! # classveil Prelude
//!
//! This module provides a convenient prelude for the most commonly used types and traits
//! from the classveil library. Import this module to get quick access to the pipeline, the
//! program model and the pass interface.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all classveil operations
pub use crate::Error;

/// The result type used throughout classveil
pub use crate::Result;

// ================================================================================================
// Main Entry Points
// ================================================================================================

/// The pipeline driver and its configuration
pub use crate::obfuscate::{
    ClassRenameConfig, FieldRenameConfig, MethodRenameConfig, Obfuscator, ObfuscatorConfig,
    PassKind, PipelineReport, StringConfig,
};

/// Low-level file access
pub use crate::{File, Parser};

/// Reading and writing archives and directory trees
pub use crate::archive::{read_source, write_destination};

// ================================================================================================
// Program Model
// ================================================================================================

/// Compilation units and their members
pub use crate::model::{
    AccessFlags, ClassFile, Code, Field, InnerClass, LoadSet, Method, TryCatchBlock,
};

/// Instructions and constants
pub use crate::model::{Constant, Handle, HandleKind, Insn, InsnList, Label};

/// Programmatic class construction
pub use crate::model::builder::{ClassBuilder, CodeBuilder};

/// Opcode constants
pub use crate::model::opcodes;

/// Class file decoding and encoding
pub use crate::codec::{read_class, write_class, ReadOptions};

// ================================================================================================
// Analysis
// ================================================================================================

/// Library classes
pub use crate::external::ExternalSymbolIndex;

/// Ancestor walks and override closures
pub use crate::hierarchy::{Hierarchy, MemberKey};

/// Declarative matching
pub use crate::query::{InsnPattern, Query, QueryKey, QueryValue, Queryable};

// ================================================================================================
// Passes
// ================================================================================================

/// The pass interface
pub use crate::obfuscate::{PassContext, Transform};

/// Built-in passes
pub use crate::obfuscate::passes::{
    AccessWidener, AccessorInliner, ClassRenamer, DebugInfoStripper, FieldRenamer,
    MemberShuffler, MethodRenamer, StringRelocator,
};

/// Renaming
pub use crate::naming::{LexicographicNames, NameGenerator, NamingStrategy, OpaqueNames};
pub use crate::remap::{Mapping, Remapper};
