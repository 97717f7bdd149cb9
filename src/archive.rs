//! Reading sources and writing destinations.
//!
//! A source is a jar (or any zip), a single class file or a directory tree. Every entry
//! ending in `.class` becomes a [`ClassFile`] keyed by its internal name; everything else,
//! including `module-info.class` and the versioned classes of multi-release jars, is kept as
//! an opaque resource under its relative path. Jars found inside a source directory are
//! expanded into the same load set.
//!
//! Versioned classes (`META-INF/versions/<n>/...`) are not rewritten by the passes, only
//! renamed along with the load set by [`crate::remap::Remapper`]. Call sites in them that
//! target an inlined accessor of another class are not updated.
//!
//! A destination is written atomically: all classes are encoded first, the output is
//! assembled in a hidden sibling of the destination and only then moved into place, so a
//! failing run never leaves a partially written destination behind. A destination ending in
//! `.jar` or `.zip` is written as an archive, anything else as a directory tree.
//!
//! # Examples
//!
//! ```rust,no_run
//! use classveil::archive::{read_source, write_destination};
//! use std::path::Path;
//!
//! let set = read_source(Path::new("app.jar"))?;
//! println!("{} classes", set.len());
//! write_destination(&set, Path::new("copy.jar"))?;
//! # Ok::<(), classveil::Error>(())
//! ```

use std::{
    fs,
    io::{BufWriter, Cursor, Read, Write},
    path::{Component, Path, PathBuf},
};

use rayon::prelude::*;
use walkdir::WalkDir;
use zip::{write::SimpleFileOptions, CompressionMethod, ZipArchive, ZipWriter};

use crate::{
    codec::{read_class, write_class, ReadOptions},
    model::{ClassFile, LoadSet},
    Error, File, Result,
};

/// Suffix of compiled class entries.
pub const CLASS_SUFFIX: &str = ".class";

/// Path of the jar manifest.
pub const MANIFEST: &str = "META-INF/MANIFEST.MF";

/// Directory of the version-specific classes of a multi-release jar.
pub const VERSIONS: &str = "META-INF/versions/";

/// Upper bound for the initial buffer of one zip entry.
const MAX_PREALLOC: u64 = 1 << 24;

/// Returns `true` for entries that are decoded into the program model.
#[must_use]
pub fn is_class_entry(path: &str) -> bool {
    path.ends_with(CLASS_SUFFIX)
        && !path.starts_with("META-INF/")
        && path.rsplit('/').next() != Some("module-info.class")
}

/// Splits a multi-release entry `META-INF/versions/<n>/<name>.class` into its version
/// directory (with trailing `/`) and the internal class name.
#[must_use]
pub fn versioned_class(path: &str) -> Option<(&str, &str)> {
    let rest = path.strip_prefix(VERSIONS)?;
    let (version, file) = rest.split_once('/')?;
    let name = file.strip_suffix(CLASS_SUFFIX)?;
    if version.is_empty()
        || !version.bytes().all(|b| b.is_ascii_digit())
        || name.is_empty()
        || name.rsplit('/').next() == Some("module-info")
    {
        return None;
    }
    Some((&path[..VERSIONS.len() + version.len() + 1], name))
}

/// Returns `true` if `path` names a jar or zip archive.
#[must_use]
pub fn is_archive_path(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("jar") || ext.eq_ignore_ascii_case("zip"))
}

/// Returns the main section value of `key` in the jar manifest, joining continuation lines.
#[must_use]
pub fn manifest_attribute(set: &LoadSet, key: &str) -> Option<String> {
    let manifest = String::from_utf8_lossy(set.resource(MANIFEST)?).into_owned();
    let mut lines = manifest.lines();
    while let Some(line) = lines.next() {
        if line.is_empty() {
            break;
        }
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        if !name.eq_ignore_ascii_case(key) {
            continue;
        }
        let mut value = value.trim_start().to_string();
        for continuation in lines.by_ref() {
            match continuation.strip_prefix(' ') {
                Some(rest) => value.push_str(rest),
                None => break,
            }
        }
        return Some(value.trim_end().to_string());
    }
    None
}

/// Replaces the main section value of `key` in the jar manifest, if present.
pub(crate) fn replace_manifest_attribute(set: &mut LoadSet, key: &str, value: &str) {
    let Some(data) = set.resource(MANIFEST) else {
        return;
    };
    let manifest = String::from_utf8_lossy(data).into_owned();
    let mut out = String::with_capacity(manifest.len());
    let mut lines = manifest.split_inclusive('\n').peekable();
    let mut in_main = true;
    while let Some(line) = lines.next() {
        let content = line.trim_end_matches(['\r', '\n']);
        if content.is_empty() {
            in_main = false;
        }
        let is_key = in_main
            && content
                .split_once(':')
                .is_some_and(|(name, _)| name.eq_ignore_ascii_case(key));
        if !is_key {
            out.push_str(line);
            continue;
        }
        while lines.peek().is_some_and(|next| next.starts_with(' ')) {
            lines.next();
        }
        let eol = &line[content.len()..];
        let eol = if eol.is_empty() { "\r\n" } else { eol };
        out.push_str(&format!("{key}: {value}{eol}"));
    }
    set.insert_resource(MANIFEST, out.into_bytes());
}

/// Reads every file entry of a zip archive.
pub(crate) fn zip_entries(data: &[u8]) -> Result<Vec<(String, Vec<u8>)>> {
    let mut archive = ZipArchive::new(Cursor::new(data))?;
    let mut entries = Vec::with_capacity(archive.len());
    for index in 0..archive.len() {
        let mut entry = archive.by_index(index)?;
        if entry.is_dir() {
            continue;
        }
        let name = entry.name().to_string();
        let capacity = usize::try_from(entry.size().min(MAX_PREALLOC)).unwrap_or(0);
        let mut data = Vec::with_capacity(capacity);
        entry.read_to_end(&mut data)?;
        entries.push((name, data));
    }
    Ok(entries)
}

/// Reads every file below `root`, keyed by its `/` separated relative path.
pub(crate) fn tree_entries(root: &Path) -> Result<Vec<(String, Vec<u8>)>> {
    let mut entries = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.map_err(std::io::Error::from)?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(root)
            .map_err(|_| malformed_error!("{} is outside of {}", entry.path().display(), root.display()))?;
        let key = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        entries.push((key, fs::read(entry.path())?));
    }
    Ok(entries)
}

pub(crate) fn load_error(entry: impl Into<String>, source: Error) -> Error {
    Error::Load {
        entry: entry.into(),
        source: Box::new(source),
    }
}

/// Collects the entries of a source, expanding jars nested in a directory tree.
fn source_entries(path: &Path) -> Result<Vec<(String, Vec<u8>)>> {
    let display = path.display().to_string();
    if path.is_dir() {
        let mut entries = Vec::new();
        for (relative, data) in tree_entries(path).map_err(|e| load_error(&display, e))? {
            if is_archive_path(Path::new(&relative)) {
                log::debug!("Expanding nested archive {relative}");
                let nested = zip_entries(&data).map_err(|e| load_error(&relative, e))?;
                entries.extend(nested);
            } else {
                entries.push((relative, data));
            }
        }
        return Ok(entries);
    }

    let file = File::from_file(path).map_err(|e| load_error(&display, e))?;
    if file.is_zip() {
        zip_entries(file.data()).map_err(|e| load_error(&display, e))
    } else if file.is_class() {
        let name = path
            .file_name()
            .map_or_else(|| display.clone(), |n| n.to_string_lossy().into_owned());
        Ok(vec![(name, file.data().to_vec())])
    } else {
        Err(load_error(
            display,
            malformed_error!("Neither a zip archive nor a class file"),
        ))
    }
}

/// Loads a jar, a class file or a directory tree into a new load set.
///
/// Class entries are decoded in parallel; the resulting set does not depend on the
/// decoding order.
///
/// # Errors
/// Returns [`Error::Load`] naming the offending entry (or the source itself) if it can not be
/// read or decoded, or if two entries decode to the same class name.
pub fn read_source(path: &Path) -> Result<LoadSet> {
    let entries = source_entries(path)?;

    let (classes, resources): (Vec<_>, Vec<_>) = entries
        .into_iter()
        .partition(|(entry, _)| is_class_entry(entry));

    let decoded: Vec<(String, ClassFile)> = classes
        .into_par_iter()
        .map(|(entry, data)| match read_class(&data, ReadOptions::default()) {
            Ok(class) => Ok((entry, class)),
            Err(error) => Err(load_error(entry, error)),
        })
        .collect::<Result<_>>()?;

    let mut set = LoadSet::new();
    for (entry, class) in decoded {
        let name = class.name.clone();
        if set.insert_class(class).is_some() {
            return Err(load_error(entry, Error::NameCollision(name)));
        }
    }
    for (entry, data) in resources {
        if set.resource(&entry).is_some() {
            log::debug!("Keeping first copy of duplicate entry {entry}");
            continue;
        }
        set.insert_resource(entry, data);
    }

    log::debug!(
        "Read {} classes and {} resources from {}",
        set.len(),
        set.resources().count(),
        path.display()
    );
    Ok(set)
}

/// Encodes every class and orders the output entries, manifest first.
fn encode_entries(set: &LoadSet) -> Result<Vec<(String, Vec<u8>)>> {
    let classes: Vec<&ClassFile> = set.classes().collect();
    let encoded: Vec<(String, Vec<u8>)> = classes
        .into_par_iter()
        .map(|class| Ok((format!("{}{CLASS_SUFFIX}", class.name), write_class(class)?)))
        .collect::<Result<_>>()?;

    let mut entries = Vec::with_capacity(encoded.len() + 1);
    if let Some(manifest) = set.resource(MANIFEST) {
        entries.push((MANIFEST.to_string(), manifest.to_vec()));
    }
    entries.extend(
        set.resources()
            .filter(|(path, _)| *path != MANIFEST)
            .map(|(path, data)| (path.to_string(), data.to_vec())),
    );
    entries.extend(encoded);
    Ok(entries)
}

/// Rejects entry paths that would escape the destination directory.
fn checked_relative(entry: &str) -> Result<PathBuf> {
    let relative = PathBuf::from(entry);
    if entry.is_empty()
        || relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
    {
        return Err(malformed_error!("Entry '{}' escapes the destination", entry));
    }
    Ok(relative)
}

fn write_tree(root: &Path, entries: &[(String, Vec<u8>)]) -> Result<()> {
    fs::create_dir_all(root)?;
    for (entry, data) in entries {
        let target = root.join(checked_relative(entry)?);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(target, data)?;
    }
    Ok(())
}

fn write_zip(target: &Path, entries: &[(String, Vec<u8>)]) -> Result<()> {
    let file = fs::File::create(target)?;
    let mut zip = ZipWriter::new(BufWriter::new(file));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    for (entry, data) in entries {
        zip.start_file(entry.as_str(), options)?;
        zip.write_all(data)?;
    }
    zip.finish()?.flush()?;
    Ok(())
}

/// Returns the hidden sibling the output is assembled in.
fn staging_path(destination: &Path) -> Result<PathBuf> {
    let name = destination
        .file_name()
        .ok_or_else(|| malformed_error!("Destination has no file name"))?;
    let parent = destination
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    Ok(parent.join(format!(".{}.classveil-tmp", name.to_string_lossy())))
}

fn remove_path(path: &Path) -> std::io::Result<()> {
    if path.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    }
}

fn write_atomic(set: &LoadSet, destination: &Path) -> Result<()> {
    let entries = encode_entries(set)?;
    let staging = staging_path(destination)?;
    if staging.exists() {
        remove_path(&staging)?;
    }

    let written = if is_archive_path(destination) {
        write_zip(&staging, &entries)
    } else {
        write_tree(&staging, &entries)
    };
    if let Err(error) = written {
        // Best effort, the original error is more useful than a cleanup failure
        let _ = remove_path(&staging);
        return Err(error);
    }

    if destination.exists() {
        remove_path(destination)?;
    }
    fs::rename(&staging, destination)?;
    Ok(())
}

/// Writes a load set to a jar, zip or directory tree.
///
/// Classes are written under `<internal name>.class`, resources verbatim under their path.
/// An existing destination is replaced only once the new output is complete.
///
/// # Errors
/// Returns [`Error::Write`] wrapping the encoding or filesystem failure.
pub fn write_destination(set: &LoadSet, destination: &Path) -> Result<()> {
    write_atomic(set, destination).map_err(|source| Error::Write {
        path: destination.to_path_buf(),
        source: Box::new(source),
    })?;
    log::info!(
        "Wrote {} classes and {} resources to {}",
        set.len(),
        set.resources().count(),
        destination.display()
    );
    Ok(())
}
