//! The index of library classes outside the load set.
//!
//! Renaming needs to know whether a method overrides something declared by a class that is
//! not being rewritten, such as `java/lang/Object.toString()` or a method of a dependency.
//! The [`ExternalSymbolIndex`] answers this from declaration-only copies of those classes:
//! members keep their names, descriptors and flags but no bodies.
//!
//! The index is configured with a list of jars, jmods and class directories and scanned on
//! first use only. Once built it never changes, so it can be shared freely between threads.
//! [`ExternalSymbolIndex::build`] scans eagerly and fails on a source that can not be read;
//! lookups on an index that was never built skip such sources with a warning.
//!
//! # Examples
//!
//! ```rust,no_run
//! use classveil::ExternalSymbolIndex;
//!
//! let index = ExternalSymbolIndex::new(ExternalSymbolIndex::platform_path());
//! if let Some(object) = index.get("java/lang/Object") {
//!     println!("Object declares {} methods", object.methods.len());
//! }
//! ```

use std::{
    collections::HashMap,
    env,
    path::{Path, PathBuf},
    sync::OnceLock,
};

use rayon::prelude::*;

use crate::{
    archive::{tree_entries, zip_entries, CLASS_SUFFIX},
    codec::{read_class, ReadOptions},
    model::ClassFile,
    Error, File, Result,
};

/// Magic of the jmod container, followed by a regular zip archive.
const JMOD_MAGIC: &[u8] = b"JM\x01\x00";
/// Directory holding the class files inside a jmod.
const JMOD_CLASSES: &str = "classes/";

/// Declaration-only view of the classes on the library path, built on first use.
#[derive(Debug, Default)]
pub struct ExternalSymbolIndex {
    sources: Vec<PathBuf>,
    classes: OnceLock<HashMap<String, ClassFile>>,
}

impl ExternalSymbolIndex {
    /// Creates an index over `sources`, scanned lazily. Earlier sources take precedence for
    /// classes present in several of them.
    #[must_use]
    pub fn new(sources: Vec<PathBuf>) -> Self {
        ExternalSymbolIndex {
            sources,
            classes: OnceLock::new(),
        }
    }

    /// Creates an index without any classes.
    #[must_use]
    pub fn empty() -> Self {
        Self::from_classes(std::iter::empty())
    }

    /// Creates an already built index from classes in memory. Method bodies are dropped.
    #[must_use]
    pub fn from_classes(classes: impl IntoIterator<Item = ClassFile>) -> Self {
        let mut map = HashMap::new();
        for class in classes {
            map.entry(class.name.clone()).or_insert_with(|| strip(class));
        }
        ExternalSymbolIndex {
            sources: Vec::new(),
            classes: OnceLock::from(map),
        }
    }

    /// Returns the platform library of the JDK named by `JAVA_HOME`: its `jmods` on Java 9
    /// and later, its `rt.jar` before. Empty if `JAVA_HOME` is unset or holds neither.
    #[must_use]
    pub fn platform_path() -> Vec<PathBuf> {
        match env::var_os("JAVA_HOME") {
            Some(home) => platform_path_in(Path::new(&home)),
            None => Vec::new(),
        }
    }

    /// The configured sources.
    #[must_use]
    pub fn sources(&self) -> &[PathBuf] {
        &self.sources
    }

    /// Returns `true` once the sources were scanned.
    #[must_use]
    pub fn is_built(&self) -> bool {
        self.classes.get().is_some()
    }

    /// Looks up a library class by internal name, building the index if needed.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ClassFile> {
        self.classes().get(name)
    }

    /// Returns `true` if the library declares `name`.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.classes().contains_key(name)
    }

    /// Number of indexed classes, building the index if needed.
    #[must_use]
    pub fn len(&self) -> usize {
        self.classes().len()
    }

    /// Returns `true` if no class is indexed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.classes().is_empty()
    }

    /// Scans every source now, unless the index is already built.
    ///
    /// Entries that fail to decode are skipped with a warning.
    ///
    /// # Errors
    /// Returns [`Error::Load`] naming the first source that is missing, unreadable or
    /// neither a jar, a jmod nor a directory.
    pub fn build(&self) -> Result<()> {
        if self.is_built() {
            return Ok(());
        }
        let classes = scan(&self.sources, true)?;
        // a concurrent lookup may have built it first
        let _ = self.classes.set(classes);
        Ok(())
    }

    fn classes(&self) -> &HashMap<String, ClassFile> {
        self.classes
            .get_or_init(|| scan(&self.sources, false).unwrap_or_default())
    }
}

fn platform_path_in(home: &Path) -> Vec<PathBuf> {
    let jmods = home.join("jmods");
    if jmods.is_dir() {
        let mut modules: Vec<PathBuf> = std::fs::read_dir(&jmods)
            .into_iter()
            .flatten()
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.extension().is_some_and(|ext| ext == "jmod"))
            .collect();
        modules.sort();
        return modules;
    }

    ["jre/lib/rt.jar", "lib/rt.jar"]
        .iter()
        .map(|relative| home.join(relative))
        .find(|path| path.is_file())
        .into_iter()
        .collect()
}

fn strip(mut class: ClassFile) -> ClassFile {
    for method in &mut class.methods {
        method.code = None;
    }
    class.source_pool = None;
    class
}

/// Collects the class entries of one library source.
fn class_entries(source: &Path) -> Result<Vec<(String, Vec<u8>)>> {
    if source.is_dir() {
        return Ok(tree_entries(source)?
            .into_iter()
            .filter(|(name, _)| name.ends_with(CLASS_SUFFIX))
            .collect());
    }

    let file = File::from_file(source)?;
    if let Some(zip) = file.data().strip_prefix(JMOD_MAGIC) {
        return Ok(zip_entries(zip)?
            .into_iter()
            .filter_map(|(name, data)| {
                let name = name.strip_prefix(JMOD_CLASSES)?.to_string();
                name.ends_with(CLASS_SUFFIX).then_some((name, data))
            })
            .collect());
    }
    if file.is_zip() {
        return Ok(zip_entries(file.data())?
            .into_iter()
            .filter(|(name, _)| name.ends_with(CLASS_SUFFIX))
            .collect());
    }
    Err(malformed_error!("Unsupported library source"))
}

fn scan(sources: &[PathBuf], strict: bool) -> Result<HashMap<String, ClassFile>> {
    let mut classes = HashMap::new();
    for source in sources {
        let entries = match class_entries(source) {
            Ok(entries) => entries,
            Err(error) if strict => {
                return Err(Error::Load {
                    entry: source.display().to_string(),
                    source: Box::new(error),
                });
            }
            Err(error) => {
                log::warn!("Skipping library {}: {error}", source.display());
                continue;
            }
        };

        let decoded: Vec<ClassFile> = entries
            .par_iter()
            .filter_map(
                |(entry, data)| match read_class(data, ReadOptions::declarations_only()) {
                    Ok(class) => Some(class),
                    Err(error) => {
                        log::warn!("Skipping {entry} in {}: {error}", source.display());
                        None
                    }
                },
            )
            .collect();

        let count = decoded.len();
        for class in decoded {
            classes.entry(class.name.clone()).or_insert_with(|| strip(class));
        }
        log::debug!("Indexed {count} classes from {}", source.display());
    }
    log::info!("Library index holds {} classes", classes.len());
    Ok(classes)
}
