//! Example index built from `key location` manifests
//!
//! A source is either a single manifest file or a directory whose
//! `cegs.*.scp` files are concatenated in path order.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::error::{EgsError, Result};
use crate::MANIFEST_PATTERN;

/// One manifest entry
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExampleRef {
    /// Utterance key
    pub key: String,
    /// Rxfilename of the serialized example
    pub location: String,
}

impl ExampleRef {
    pub fn new(key: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            location: location.into(),
        }
    }
}

/// Ordered, immutable list of example references
#[derive(Debug, Clone, Default)]
pub struct ExampleIndex {
    refs: Vec<ExampleRef>,
    manifests: Vec<PathBuf>,
}

impl ExampleIndex {
    /// Build the index from a manifest file or a directory of manifests
    pub fn open(source: impl AsRef<Path>) -> Result<Self> {
        let source = source.as_ref();
        let manifests = if source.is_dir() {
            discover_manifests(source)?
        } else {
            vec![source.to_path_buf()]
        };

        let mut refs = Vec::new();
        for manifest in &manifests {
            let before = refs.len();
            read_manifest(manifest, &mut refs)?;
            if refs.len() == before {
                warn!("Manifest {} has no entries", manifest.display());
            }
        }

        let index = Self { refs, manifests };
        info!("Built example index: {}", index);
        Ok(index)
    }

    /// Index over references that did not come from a manifest
    pub fn from_refs(refs: Vec<ExampleRef>) -> Self {
        Self {
            refs,
            manifests: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.refs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.refs.is_empty()
    }

    pub fn get(&self, i: usize) -> Option<&ExampleRef> {
        self.refs.get(i)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ExampleRef> {
        self.refs.iter()
    }

    /// Manifests the index was read from, in read order
    pub fn manifests(&self) -> &[PathBuf] {
        &self.manifests
    }
}

impl<'a> IntoIterator for &'a ExampleIndex {
    type Item = &'a ExampleRef;
    type IntoIter = std::slice::Iter<'a, ExampleRef>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl fmt::Display for ExampleIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} examples from {} manifest(s)",
            self.refs.len(),
            self.manifests.len()
        )
    }
}

fn discover_manifests(dir: &Path) -> Result<Vec<PathBuf>> {
    let pattern = dir.join(MANIFEST_PATTERN);
    let pattern = pattern.to_str().ok_or_else(|| {
        EgsError::configuration(format!("directory {} is not valid UTF-8", dir.display()))
    })?;

    let mut manifests = Vec::new();
    for entry in glob::glob(pattern)
        .map_err(|e| EgsError::configuration(format!("bad manifest pattern {}: {}", pattern, e)))?
    {
        let path = entry.map_err(|e| {
            let location = e.path().display().to_string();
            EgsError::io(location, e.into_error())
        })?;
        if path.is_file() {
            manifests.push(path);
        }
    }

    if manifests.is_empty() {
        return Err(EgsError::configuration(format!(
            "no {} manifests found in {}",
            MANIFEST_PATTERN,
            dir.display()
        )));
    }
    Ok(manifests)
}

fn read_manifest(path: &Path, refs: &mut Vec<ExampleRef>) -> Result<()> {
    let display = path.display().to_string();
    let text = fs::read_to_string(path).map_err(|e| EgsError::io(&display, e))?;

    for (lineno, line) in text.lines().enumerate() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        match fields.as_slice() {
            [key, location] => refs.push(ExampleRef::new(*key, *location)),
            _ => {
                return Err(EgsError::Parse {
                    path: display,
                    line: lineno + 1,
                    reason: format!("expected 2 fields, got {}", fields.len()),
                })
            }
        }
    }
    Ok(())
}
