// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![allow(dead_code)]
#![allow(clippy::too_many_arguments)]

//! # classveil
//!
//! A batch obfuscator for compiled JVM programs. `classveil` loads the class files of a jar
//! or a directory tree into a mutable program model, runs an ordered pipeline of
//! semantics-preserving rewrites over it and writes the result to a new archive:
//!
//! - **Renaming** of classes, fields and methods, keeping override relationships intact
//!   across the whole program and against library classes on the library path
//! - **Accessor inlining** of trivial getters and setters
//! - **String relocation** of every string constant into one scrambled table
//! - **Debug info stripping** of source file names, line numbers and local variable names
//! - **Member shuffling** of every declaration list
//!
//! The class file codec is part of the crate: it decodes into an editable instruction list
//! with label indirection and re-encodes with recomputed stack sizes, wide jumps and stack
//! map frames, so passes never deal with byte offsets.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use classveil::prelude::*;
//! use std::path::Path;
//!
//! let config = ObfuscatorConfig::default()
//!     .with_target_package("a")
//!     .with_seed(7);
//! let mut obfuscator = Obfuscator::new(config);
//! let report = obfuscator.run(Path::new("app.jar"), Path::new("app-obf.jar"))?;
//! println!("{report}");
//! # Ok::<(), classveil::Error>(())
//! ```
//!
//! ### Running single passes
//!
//! ```rust,no_run
//! use classveil::prelude::*;
//! use std::path::Path;
//!
//! let mut obfuscator = Obfuscator::new(ObfuscatorConfig::default());
//! let set = obfuscator.load(Path::new("classes"))?;
//! let mut pass = MethodRenamer::new(MethodRenameConfig::default());
//! let set = obfuscator.apply(&mut pass, set)?;
//! obfuscator.write(&set, Path::new("out"))?;
//! # Ok::<(), classveil::Error>(())
//! ```
//!
//! ## Architecture
//!
//! - [`model`] - Compilation units, members, instruction lists and the [`LoadSet`] arena
//! - [`codec`] - Class file decoding and encoding
//! - [`query`] - Declarative matching over model nodes and instruction sequences
//! - [`naming`] - Unique name generators
//! - [`external`] - The lazily built [`ExternalSymbolIndex`] of library classes
//! - [`hierarchy`] - Ancestor walks and subtype closures over the load set and the index
//! - [`remap`] - Rename mappings and their application to every reference
//! - [`archive`] - Reading sources and atomically writing destinations
//! - [`obfuscate`] - The [`Obfuscator`] pipeline and its passes
//! - [`Error`] and [`Result`] - Error handling
//!
//! ## Randomness
//!
//! Every random choice (name assignment order, host class selection, shuffles) draws from
//! one generator owned by the pipeline. Without a seed the output differs between runs;
//! [`ObfuscatorConfig::with_seed`] makes it reproducible.

#[macro_use]
pub(crate) mod macros;

#[macro_use]
pub(crate) mod error;

pub mod archive;
pub mod codec;
pub mod external;
pub mod file;
pub mod hierarchy;
pub mod model;
pub mod naming;
pub mod obfuscate;
pub mod prelude;
pub mod query;
pub mod remap;

#[cfg(test)]
pub(crate) mod test;

/// `classveil` Result type
///
/// A type alias for `std::result::Result<T, Error>` where the error type is always
/// [`Error`]. This is used consistently throughout the crate for all fallible operations.
///
/// # Examples
///
/// ```rust
/// use classveil::{Result, LoadSet};
///
/// fn count_classes(set: &LoadSet) -> Result<usize> {
///     Ok(set.len())
/// }
/// # assert_eq!(count_classes(&LoadSet::new()).unwrap(), 0);
/// ```
pub type Result<T> = std::result::Result<T, Error>;

/// `classveil` Error type
///
/// The main error type for all operations in this crate. Provides detailed error information
/// for decoding, transform and output failures.
pub use error::Error;

/// Raw byte access to input files
pub use file::{parser::Parser, File};

/// The program model
pub use model::{ClassFile, LoadSet};

/// Library classes outside the load set
pub use external::ExternalSymbolIndex;

/// The rewrite pipeline
pub use obfuscate::{Obfuscator, ObfuscatorConfig, PipelineReport};
