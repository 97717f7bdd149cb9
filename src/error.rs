use std::path::PathBuf;

use thiserror::Error;

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

macro_rules! out_of_bounds_error {
    () => {
        crate::Error::OutOfBounds
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// The variants fall into three groups that mirror the stages of a run:
///
/// ## Decoding Errors
/// - [`Error::Malformed`] - A class file violates the format
/// - [`Error::OutOfBounds`] - A read ran past the end of the input
/// - [`Error::Empty`] - Empty input provided
/// - [`Error::Load`] - Wraps any of the above with the archive entry that caused it
///
/// ## Transform Errors
/// - [`Error::UnresolvedClass`] - An ancestor could not be found in the load set or library path
/// - [`Error::NameCollision`] - Two classes ended up with the same name after a pass
/// - [`Error::Transform`] - Wraps a failure with the name of the pass that raised it
///
/// ## Encoding and Output Errors
/// - [`Error::DanglingLabel`] / [`Error::DuplicateLabel`] - Broken label bookkeeping in a method body
/// - [`Error::BranchOutOfRange`] / [`Error::CodeTooLarge`] - The method does not fit the format limits
/// - [`Error::Write`] - Wraps a failure with the destination path
///
/// # Examples
///
/// ```rust,no_run
/// use classveil::{Error, Obfuscator, ObfuscatorConfig};
/// use std::path::Path;
///
/// let mut obfuscator = Obfuscator::new(ObfuscatorConfig::default());
/// match obfuscator.run(Path::new("app.jar"), Path::new("app-obf.jar")) {
///     Ok(report) => println!("done: {report}"),
///     Err(Error::Load { entry, source }) => eprintln!("cannot read {entry}: {source}"),
///     Err(e) => eprintln!("failed: {e}"),
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// The class file is damaged and could not be parsed.
    ///
    /// The error includes the source location where the malformation was detected
    /// for debugging purposes.
    ///
    /// # Fields
    ///
    /// * `message` - Detailed description of what was malformed
    /// * `file` - Source file where the error was detected
    /// * `line` - Source line where the error was detected
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// An out of bound access was attempted while parsing the input.
    #[error("Out of Bound read would have occurred!")]
    OutOfBounds,

    /// Provided input was empty.
    #[error("Provided input was empty")]
    Empty,

    /// File I/O error.
    #[error("{0}")]
    FileError(#[from] std::io::Error),

    /// The jar or zip container could not be read or written.
    #[error("{0}")]
    Archive(#[from] zip::result::ZipError),

    /// Generic error for miscellaneous failures.
    #[error("{0}")]
    Error(String),

    /// Recursion limit reached while resolving nested constants.
    #[error("Reach the maximum recursion level allowed - {0}")]
    RecursionLimit(usize),

    /// The constant pool of a class being written exceeded 65535 slots.
    #[error("Constant pool overflow")]
    PoolOverflow,

    /// An entry of the source archive or directory could not be decoded.
    #[error("Failed to load '{entry}'")]
    Load {
        /// Relative path of the offending entry
        entry: String,
        /// Underlying decoding failure
        source: Box<Error>,
    },

    /// A transform pass aborted the run.
    #[error("Pass '{pass}' failed")]
    Transform {
        /// Name of the failing pass
        pass: &'static str,
        /// Underlying failure
        source: Box<Error>,
    },

    /// The destination could not be written.
    #[error("Failed to write '{}'", path.display())]
    Write {
        /// Destination path of the run
        path: PathBuf,
        /// Underlying failure
        source: Box<Error>,
    },

    /// A superclass or interface is neither in the load set nor on the library path.
    ///
    /// Without the ancestor the override closure of a member can not be computed,
    /// so renaming would risk breaking dispatch.
    #[error("Class '{name}' referenced by '{referenced_by}' can not be resolved")]
    UnresolvedClass {
        /// The missing class
        name: String,
        /// The class that names it as an ancestor
        referenced_by: String,
    },

    /// A branch, handler, line number or local variable refers to a label that
    /// is not placed in the instruction list.
    #[error("Dangling label in '{method}'")]
    DanglingLabel {
        /// Owner, name and descriptor of the method
        method: String,
    },

    /// A label is placed more than once in the instruction list.
    #[error("Label placed twice in '{method}'")]
    DuplicateLabel {
        /// Owner, name and descriptor of the method
        method: String,
    },

    /// A conditional branch does not fit into a 16 bit offset.
    #[error("Conditional branch out of range in '{method}'")]
    BranchOutOfRange {
        /// Owner, name and descriptor of the method
        method: String,
    },

    /// The encoded method body exceeds the 65535 byte limit.
    #[error("Code of '{method}' is too large ({size} bytes)")]
    CodeTooLarge {
        /// Owner, name and descriptor of the method
        method: String,
        /// Encoded size in bytes
        size: usize,
    },

    /// Two compilation units carry the same name.
    #[error("Duplicate class name '{0}'")]
    NameCollision(String),
}
