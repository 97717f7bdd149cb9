use std::path::PathBuf;

use clap::Parser;

/// classveil - batch obfuscator for JVM class archives
#[derive(Debug, Parser)]
#[command(name = "classveil", version, about, long_about = None)]
pub struct Cli {
    /// Jar, zip, class file or directory to obfuscate.
    #[arg(value_name = "SOURCE")]
    pub source: PathBuf,

    /// Output jar, zip or directory; replaced only if the whole run succeeds.
    #[arg(value_name = "DESTINATION")]
    pub destination: PathBuf,

    /// Package renamed classes are moved to (e.g. `a` or `com.example.obf`).
    #[arg(short, long, default_value = "")]
    pub package: String,

    /// Class that keeps its name; repeatable, `.` or `/` separated.
    #[arg(short, long = "keep", value_name = "CLASS")]
    pub keep: Vec<String>,

    /// Generate opaque names of this many characters instead of `A`, `B`, ...
    #[arg(long, value_name = "LENGTH")]
    pub cfn: Option<usize>,

    /// Seed every random choice, making the output reproducible.
    #[arg(long)]
    pub seed: Option<u64>,

    /// Jar, jmod or class directory holding library classes; repeatable.
    #[arg(short = 'l', long = "library", value_name = "PATH")]
    pub library: Vec<PathBuf>,

    /// Do not add the platform library of JAVA_HOME to the library path.
    #[arg(long)]
    pub no_platform: bool,

    /// Comma separated passes to run, in order (default: the full pipeline).
    #[arg(long, value_delimiter = ',', value_name = "PASS")]
    pub passes: Vec<String>,

    /// Assume unresolvable ancestors declare nothing instead of failing.
    #[arg(long)]
    pub lenient: bool,

    /// Emit the pass report as JSON instead of a table.
    #[arg(long)]
    pub json: bool,

    /// Enable verbose (debug-level) logging output.
    #[arg(short, long)]
    pub verbose: bool,
}
