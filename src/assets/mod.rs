//! Asset discovery: pack location, tag parsing and the key index.

mod index;
mod provider;
mod tags;

use std::path::{Path, PathBuf};

use thiserror::Error;

pub use index::{is_frame_file, list_frame_files, AssetIndex};
pub use provider::{create_folder_through, resolve_folder, AssetPack};
pub use tags::{
    parse_asset_path, tokenize, Activity, AnimationKey, ParseContext, PetState, Transition,
};

pub(crate) use tags::numeric_tag;

/// Error locating an asset pack.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProviderError {
    /// A required folder does not exist
    #[error("{}", missing_folder_message(.folder, .parent, .remediation))]
    MissingFolder {
        folder: String,
        parent: PathBuf,
        remediation: Option<String>,
    },
    /// A folder name matches several directories that differ only by case
    #[error("Folder \"{folder}\" is ambiguous: {candidates:?}")]
    AmbiguousFolder {
        folder: String,
        candidates: Vec<PathBuf>,
    },
    /// File I/O error
    #[error("Failed to access {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ProviderError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

fn missing_folder_message(folder: &str, parent: &Path, remediation: &Option<String>) -> String {
    match remediation {
        Some(text) => text.clone(),
        None => format!("Folder \"{}\" not found in {}", folder, parent.display()),
    }
}

/// Error building the asset index.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum IndexError {
    /// The asset root does not exist or is not a directory
    #[error("Asset root not found: {}", .0.display())]
    MissingRoot(PathBuf),
    /// File I/O error while walking the tree
    #[error("Failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl IndexError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}
