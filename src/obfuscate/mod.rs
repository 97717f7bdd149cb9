//! The obfuscation pipeline.
//!
//! An [`Obfuscator`] loads a jar or directory into a [`LoadSet`], runs the configured
//! [`Transform`] passes over it in order and writes the result. Each pass sees the effect of
//! every pass before it, and the load set is re-keyed by class name after each one.
//!
//! ```text
//!  source ──► load ──► pass 1 ──► rekey ──► pass 2 ──► rekey ──► … ──► write ──► destination
//! ```
//!
//! Nothing is written unless every pass succeeded, and the destination is replaced only
//! once the new output is complete.
//!
//! # Key Components
//!
//! - [`Obfuscator`] - Owns the configuration, the library index, the name generator and the
//!   random source of one run
//! - [`ObfuscatorConfig`] - Pass selection and per-pass settings
//! - [`Transform`] / [`PassContext`] - The pass interface
//! - [`passes`] - The individual rewrites
//! - [`PipelineReport`] - Per-pass change counts
//!
//! # Examples
//!
//! ```rust,no_run
//! use std::path::Path;
//! use classveil::{Obfuscator, ObfuscatorConfig};
//!
//! let config = ObfuscatorConfig::new()
//!     .with_target_package("obf")
//!     .with_kept_class("com.example.Main");
//! let mut obfuscator = Obfuscator::new(config);
//! let report = obfuscator.run(Path::new("app.jar"), Path::new("app-obf.jar"))?;
//! println!("{report}");
//! # Ok::<(), classveil::Error>(())
//! ```

pub mod config;
mod pass;
pub mod passes;

use std::{fmt, path::Path, time::Instant};

use rand::{rngs::StdRng, SeedableRng};

pub use config::{
    ClassRenameConfig, FieldRenameConfig, MethodRenameConfig, ObfuscatorConfig, PassKind,
    StringConfig,
};
pub use pass::{PassContext, Transform};

use crate::{
    archive::{read_source, write_destination},
    model::LoadSet,
    naming::NameGenerator,
    obfuscate::passes::{
        AccessWidener, AccessorInliner, ClassRenamer, DebugInfoStripper, FieldRenamer,
        MemberShuffler, MethodRenamer, StringRelocator,
    },
    ExternalSymbolIndex, Result,
};

/// Change counts of one pipeline run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineReport {
    /// `(pass name, changes)` in execution order
    pub passes: Vec<(&'static str, usize)>,
    /// Classes in the load set after the last pass
    pub classes: usize,
}

impl PipelineReport {
    /// Changes reported by the pass named `name`, if it ran.
    #[must_use]
    pub fn changes(&self, name: &str) -> Option<usize> {
        self.passes
            .iter()
            .find(|(pass, _)| *pass == name)
            .map(|(_, count)| *count)
    }

    /// Get a one-line summary of the run.
    #[must_use]
    pub fn summary(&self) -> String {
        let passes: Vec<String> = self
            .passes
            .iter()
            .map(|(name, count)| format!("{name}={count}"))
            .collect();
        format!("{} classes, {}", self.classes, passes.join(" "))
    }
}

impl fmt::Display for PipelineReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.summary())
    }
}

/// Runs configured passes over load sets.
pub struct Obfuscator {
    config: ObfuscatorConfig,
    index: ExternalSymbolIndex,
    names: Box<dyn NameGenerator>,
    rng: StdRng,
}

impl Obfuscator {
    /// Creates an obfuscator.
    ///
    /// The library index covers the configured library path followed by the platform
    /// library of `JAVA_HOME` (if enabled); it is scanned when the passes start.
    #[must_use]
    pub fn new(config: ObfuscatorConfig) -> Self {
        let mut sources = config.library_path.clone();
        if config.platform_library {
            sources.extend(ExternalSymbolIndex::platform_path());
        }
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Obfuscator {
            names: config.naming.generator(config.seed),
            index: ExternalSymbolIndex::new(sources),
            config,
            rng,
        }
    }

    /// Replaces the library index.
    #[must_use]
    pub fn with_index(mut self, index: ExternalSymbolIndex) -> Self {
        self.index = index;
        self
    }

    /// The configuration in use.
    #[must_use]
    pub fn config(&self) -> &ObfuscatorConfig {
        &self.config
    }

    /// The library index in use.
    #[must_use]
    pub fn index(&self) -> &ExternalSymbolIndex {
        &self.index
    }

    /// Loads a jar, zip or directory tree.
    ///
    /// # Errors
    /// Returns [`crate::Error::Load`] for unreadable sources or malformed classes.
    pub fn load(&self, source: &Path) -> Result<LoadSet> {
        read_source(source)
    }

    /// Runs one pass and re-keys the load set.
    ///
    /// # Errors
    /// Returns [`crate::Error::Transform`] naming the pass if it fails or leaves two classes
    /// with the same name.
    pub fn apply(&mut self, pass: &mut dyn Transform, set: LoadSet) -> Result<LoadSet> {
        self.apply_counted(pass, set).map(|(set, _)| set)
    }

    fn apply_counted(
        &mut self,
        pass: &mut dyn Transform,
        mut set: LoadSet,
    ) -> Result<(LoadSet, usize)> {
        let started = Instant::now();
        let mut ctx = PassContext {
            index: &self.index,
            names: self.names.as_mut(),
            rng: &mut self.rng,
            strict_hierarchy: self.config.strict_hierarchy,
        };
        let changes = pass
            .apply(&mut set, &mut ctx)
            .map_err(|e| transform_error!(pass.name(), e))?;
        set.rekey().map_err(|e| transform_error!(pass.name(), e))?;

        log::debug!(
            "Pass '{}' made {changes} changes in {:?}",
            pass.name(),
            started.elapsed()
        );
        Ok((set, changes))
    }

    fn build_passes(&self) -> Vec<Box<dyn Transform>> {
        self.config
            .passes
            .iter()
            .map(|kind| -> Box<dyn Transform> {
                match kind {
                    PassKind::AccessWidening => Box::new(AccessWidener::new()),
                    PassKind::Strings => Box::new(StringRelocator::new(self.config.strings.clone())),
                    PassKind::Classes => Box::new(ClassRenamer::new(self.config.classes.clone())),
                    PassKind::Fields => Box::new(FieldRenamer::new(self.config.fields.clone())),
                    PassKind::Methods => Box::new(MethodRenamer::new(self.config.methods.clone())),
                    PassKind::Accessors => Box::new(AccessorInliner::new()),
                    PassKind::DebugInfo => Box::new(DebugInfoStripper::new()),
                    PassKind::Shuffle => Box::new(MemberShuffler::new()),
                }
            })
            .collect()
    }

    /// Runs every configured pass in order.
    ///
    /// # Errors
    /// Returns [`crate::Error::Load`] if a library source can not be read, otherwise the
    /// first pass failure; later passes do not run.
    pub fn transform(&mut self, mut set: LoadSet) -> Result<(LoadSet, PipelineReport)> {
        if !self.config.passes.is_empty() {
            self.index.build()?;
        }
        let mut report = PipelineReport::default();
        for mut pass in self.build_passes() {
            let before = set.len();
            let (next, changes) = self.apply_counted(pass.as_mut(), set)?;
            set = next;
            log::info!(
                "{}: {changes} changes ({} -> {} classes)",
                pass.name(),
                before,
                set.len()
            );
            report.passes.push((pass.name(), changes));
        }
        report.classes = set.len();
        Ok((set, report))
    }

    /// Writes a load set to a jar, zip or directory tree.
    ///
    /// # Errors
    /// Returns [`crate::Error::Write`] if the output can not be produced.
    pub fn write(&self, set: &LoadSet, destination: &Path) -> Result<()> {
        write_destination(set, destination)
    }

    /// Loads `source`, runs the pipeline and writes `destination`.
    ///
    /// # Errors
    /// Returns the first load, transform or write error. The destination is untouched unless
    /// the write itself started.
    pub fn run(&mut self, source: &Path, destination: &Path) -> Result<PipelineReport> {
        let set = self.load(source)?;
        log::info!(
            "Loaded {} classes and {} resources from {}",
            set.len(),
            set.resources().count(),
            source.display()
        );
        let (set, report) = self.transform(set)?;
        self.write(&set, destination)?;
        log::info!("{report}");
        Ok(report)
    }
}
