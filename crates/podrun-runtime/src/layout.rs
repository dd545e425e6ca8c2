//! The pod directory set.
//!
//! Six sibling directories under the pods root, each a flat namespace of
//! pod-UUID-named subdirectories. Which one holds a pod is half of its
//! phase; the other half is its lock.

use std::path::{Path, PathBuf};

use podrun_common::error::{PodrunError, Result};
use podrun_common::types::{Location, PodId};

/// An entry in a location directory that is not a well-formed pod.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorruptEntry {
    /// Path of the offending entry.
    pub path: PathBuf,
    /// What is wrong with it.
    pub reason: String,
}

/// Result of listing a single location directory.
#[derive(Debug, Default)]
pub struct Scan {
    /// Pods found, sorted by ID.
    pub pods: Vec<PodId>,
    /// Entries that are not pod directories.
    pub corrupt: Vec<CorruptEntry>,
}

/// Handle on a pods root.
#[derive(Debug, Clone)]
pub struct PodDirs {
    root: PathBuf,
}

impl PodDirs {
    /// Creates a handle for the given pods root. Nothing is touched on disk.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Creates the root and all six location directories if missing.
    ///
    /// # Errors
    ///
    /// Returns an error if a directory cannot be created.
    pub fn init(&self) -> Result<()> {
        for location in Location::ALL {
            let dir = self.location_dir(location);
            std::fs::create_dir_all(&dir).map_err(|e| PodrunError::io(&dir, e))?;
        }
        tracing::debug!(root = %self.root.display(), "pod directories ready");
        Ok(())
    }

    /// Returns the pods root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the directory for a location.
    #[must_use]
    pub fn location_dir(&self, location: Location) -> PathBuf {
        self.root.join(location.dir_name())
    }

    /// Returns where a pod directory would live in a location.
    #[must_use]
    pub fn pod_path(&self, location: Location, id: &PodId) -> PathBuf {
        self.location_dir(location).join(id.to_string())
    }

    /// Checks whether a pod directory exists in a location.
    ///
    /// # Errors
    ///
    /// Returns [`PodrunError::CorruptState`] if something other than a
    /// directory occupies the pod's name, or an I/O error.
    pub fn contains(&self, location: Location, id: &PodId) -> Result<bool> {
        let path = self.pod_path(location, id);
        match std::fs::symlink_metadata(&path) {
            Ok(meta) if meta.is_dir() => Ok(true),
            Ok(_) => Err(PodrunError::corrupt(path, "expected a pod directory")),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(PodrunError::io(path, e)),
        }
    }

    /// Lists the pods in a location.
    ///
    /// A missing location directory lists as empty.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be read.
    pub fn scan(&self, location: Location) -> Result<Scan> {
        let dir = self.location_dir(location);
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Scan::default()),
            Err(e) => return Err(PodrunError::io(&dir, e)),
        };

        let mut scan = Scan::default();
        for entry in entries {
            let entry = entry.map_err(|e| PodrunError::io(&dir, e))?;
            let path = entry.path();
            let Some(id) = entry.file_name().to_str().and_then(|n| PodId::parse(n).ok()) else {
                scan.corrupt.push(CorruptEntry {
                    path,
                    reason: "name is not a pod UUID".into(),
                });
                continue;
            };
            let file_type = match entry.file_type() {
                Ok(ft) => ft,
                // Moved away between readdir and stat.
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(PodrunError::io(&path, e)),
            };
            if !file_type.is_dir() {
                scan.corrupt.push(CorruptEntry {
                    path,
                    reason: "not a directory".into(),
                });
                continue;
            }
            scan.pods.push(id);
        }
        scan.pods.sort();
        for entry in &scan.corrupt {
            tracing::warn!(path = %entry.path.display(), reason = %entry.reason, "corrupt pod entry");
        }
        Ok(scan)
    }
}
