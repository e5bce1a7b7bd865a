//! Asset pack location.
//!
//! An asset pack lives below an application root, e.g.
//! `<app>/VPetSimulator/mod/0000_core/pet/vup`. Folder names are matched
//! case-insensitively because packs are authored on case-insensitive file
//! systems.

use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info};

use super::ProviderError;

/// Resolve a chain of folder names below `base`, ignoring case.
///
/// Fails on the first folder that is missing, and on a folder name that
/// matches more than one directory.
pub fn resolve_folder<S: AsRef<str>>(base: &Path, folders: &[S]) -> Result<PathBuf, ProviderError> {
    let mut current = base.to_path_buf();
    for folder in folders {
        let folder = folder.as_ref();
        current = find_child_dir(&current, folder)?.ok_or_else(|| ProviderError::MissingFolder {
            folder: folder.to_string(),
            parent: current.clone(),
            remediation: None,
        })?;
    }
    Ok(current)
}

/// Like [`resolve_folder`], creating whatever is missing.
pub fn create_folder_through<S: AsRef<str>>(
    base: &Path,
    folders: &[S],
) -> Result<PathBuf, ProviderError> {
    let mut current = base.to_path_buf();
    for folder in folders {
        let folder = folder.as_ref();
        current = match find_child_dir(&current, folder)? {
            Some(existing) => existing,
            None => {
                let created = current.join(folder);
                fs::create_dir_all(&created).map_err(|e| ProviderError::io(&created, e))?;
                debug!("Created folder {}", created.display());
                created
            }
        };
    }
    Ok(current)
}

fn find_child_dir(parent: &Path, name: &str) -> Result<Option<PathBuf>, ProviderError> {
    if !parent.is_dir() {
        return Ok(None);
    }
    let mut matches = Vec::new();
    for entry in fs::read_dir(parent).map_err(|e| ProviderError::io(parent, e))? {
        let entry = entry.map_err(|e| ProviderError::io(parent, e))?;
        let is_dir = entry
            .file_type()
            .map_err(|e| ProviderError::io(parent, e))?
            .is_dir();
        if is_dir && entry.file_name().to_string_lossy().eq_ignore_ascii_case(name) {
            matches.push(entry.path());
        }
    }
    match matches.len() {
        0 => Ok(None),
        1 => Ok(matches.pop()),
        _ => {
            matches.sort();
            Err(ProviderError::AmbiguousFolder {
                folder: name.to_string(),
                candidates: matches,
            })
        }
    }
}

/// A located asset pack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetPack {
    /// The pack folder itself.
    pub root: PathBuf,
    /// Folder holding the pet graphics.
    pub gfx_root: PathBuf,
}

impl AssetPack {
    /// Locate `pack` below `app_root`, then the graphics folder chain below it.
    ///
    /// The pack folder is created when missing.
    ///
    /// A missing first graphics folder is the usual broken-install symptom,
    /// so its error carries remediation text for the user.
    pub fn locate<S: AsRef<str>>(
        app_root: &Path,
        pack: &str,
        gfx_path: &[S],
    ) -> Result<Self, ProviderError> {
        let root = create_folder_through(app_root, &[pack])?;

        let Some(first) = gfx_path.first() else {
            info!("Asset pack located at {}", root.display());
            return Ok(Self {
                gfx_root: root.clone(),
                root,
            });
        };
        let first = first.as_ref();
        if find_child_dir(&root, first)?.is_none() {
            return Err(ProviderError::MissingFolder {
                folder: first.to_string(),
                parent: root.clone(),
                remediation: Some(format!(
                    "Asset dependencies are not found. Please re-download the game. \
                     Make sure the folder \"{}\" exists in folder \"{}\" and is not empty.",
                    first, pack
                )),
            });
        }

        let gfx_root = resolve_folder(&root, gfx_path)?;
        info!("Asset pack located at {}", gfx_root.display());
        Ok(Self { root, gfx_root })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_resolve_folder_ignores_case() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("Mod/0000_Core/PET")).unwrap();

        let found = resolve_folder(temp.path(), &["mod", "0000_core", "pet"]).unwrap();
        assert_eq!(found, temp.path().join("Mod/0000_Core/PET"));
    }

    #[test]
    fn test_resolve_folder_missing() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("mod")).unwrap();

        let err = resolve_folder(temp.path(), &["mod", "core"]).unwrap_err();
        match err {
            ProviderError::MissingFolder { folder, parent, .. } => {
                assert_eq!(folder, "core");
                assert_eq!(parent, temp.path().join("mod"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_create_folder_through_reuses_existing_case() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("Cache")).unwrap();

        let dir = create_folder_through(temp.path(), &["cache", "vpetsim"]).unwrap();
        assert_eq!(dir, temp.path().join("Cache").join("vpetsim"));
        assert!(dir.is_dir());
    }

    #[test]
    fn test_locate_reports_remediation() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("VPetSimulator")).unwrap();

        let err = AssetPack::locate(temp.path(), "VPetSimulator", &["mod", "0000_core"]).unwrap_err();
        let text = err.to_string();
        assert!(text.contains("re-download"), "{text}");
        assert!(text.contains("\"mod\""), "{text}");
    }

    #[test]
    fn test_locate_creates_pack_folder() {
        let temp = TempDir::new().unwrap();

        let err = AssetPack::locate(temp.path(), "VPetSimulator", &["mod"]).unwrap_err();
        assert!(matches!(err, ProviderError::MissingFolder { .. }));
        assert!(temp.path().join("VPetSimulator").is_dir());
    }

    #[test]
    fn test_locate_full_chain() {
        let temp = TempDir::new().unwrap();
        let gfx = temp.path().join("VPetSimulator/mod/0000_core/pet/vup");
        fs::create_dir_all(&gfx).unwrap();

        let pack = AssetPack::locate(
            temp.path(),
            "vpetsimulator",
            &["mod", "0000_core", "pet", "vup"],
        )
        .unwrap();
        assert_eq!(pack.root, temp.path().join("VPetSimulator"));
        assert_eq!(pack.gfx_root, gfx);
    }
}
