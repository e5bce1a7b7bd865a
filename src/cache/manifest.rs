//! Cache manifest recording the format and contents of a cache folder.
//!
//! Stored as JSON in `.cache-manifest.json` next to the atlas files:
//!
//! ```json
//! {
//!   "version": 1,
//!   "cell_size": 500,
//!   "entries": {
//!     "9f3c2a0b4d1e6f70": "Happy/Touch_Head/A_Start"
//!   }
//! }
//! ```
//!
//! A manifest with another version or cell size marks every cached atlas
//! as stale.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::Path;

/// Current cache format version.
pub const CACHE_FORMAT_VERSION: u32 = 1;

/// Default manifest filename.
pub const CACHE_MANIFEST_FILENAME: &str = ".cache-manifest.json";

/// Error during manifest operations.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ManifestError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Contents of a cache folder: cache file name to source folder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheManifest {
    pub version: u32,
    pub cell_size: u32,
    #[serde(default)]
    pub entries: BTreeMap<String, String>,
}

impl CacheManifest {
    pub fn new(cell_size: u32) -> Self {
        Self {
            version: CACHE_FORMAT_VERSION,
            cell_size,
            entries: BTreeMap::new(),
        }
    }

    /// Load a manifest from a file.
    ///
    /// Returns `Ok(None)` if the file doesn't exist.
    pub fn load(path: &Path) -> Result<Option<Self>, ManifestError> {
        if !path.exists() {
            return Ok(None);
        }
        let reader = BufReader::new(File::open(path)?);
        Ok(Some(serde_json::from_reader(reader)?))
    }

    pub fn load_from_dir(cache_dir: &Path) -> Result<Option<Self>, ManifestError> {
        Self::load(&cache_dir.join(CACHE_MANIFEST_FILENAME))
    }

    pub fn save(&self, path: &Path) -> Result<(), ManifestError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    pub fn save_to_dir(&self, cache_dir: &Path) -> Result<(), ManifestError> {
        self.save(&cache_dir.join(CACHE_MANIFEST_FILENAME))
    }

    /// Whether atlases described by this manifest can be reused.
    pub fn is_compatible(&self, cell_size: u32) -> bool {
        self.version == CACHE_FORMAT_VERSION && self.cell_size == cell_size
    }
}
