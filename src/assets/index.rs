//! Asset index: animation keys mapped to source folders.
//!
//! Discovery walks the asset tree recursively. Every leaf directory (one
//! without subdirectories) is one animation unit: a single image is a still
//! picture, several images form a frame sequence. The first frame's path is
//! what gets tagged; the indexed value is the leaf directory relative to the
//! asset root.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, error, info};

use super::tags::{parse_asset_path, AnimationKey, ParseContext};
use super::IndexError;

/// Whether a path looks like an image frame the decoder understands.
pub fn is_frame_file(path: &Path) -> bool {
    path.is_file() && image::ImageFormat::from_path(path).is_ok()
}

/// Frame files of a sequence folder in lexical order.
///
/// Lexical order is frame order: the atlas builder appends in this order
/// and sequence construction recovers delays in this order.
pub fn list_frame_files(dir: &Path) -> Result<Vec<PathBuf>, IndexError> {
    let entries = fs::read_dir(dir).map_err(|e| IndexError::io(dir, e))?;
    let mut files = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| IndexError::io(dir, e))?.path();
        if is_frame_file(&path) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Lookup table from [`AnimationKey`] to the folder it was parsed from.
///
/// Built once at startup and read-only afterwards. Iteration follows
/// insertion order.
#[derive(Debug, Default)]
pub struct AssetIndex {
    entries: Vec<(AnimationKey, PathBuf)>,
    lookup: HashMap<AnimationKey, usize>,
}

impl AssetIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Discover and index every animation folder under `root`.
    pub fn discover(root: &Path) -> Result<Self, IndexError> {
        if !root.is_dir() {
            return Err(IndexError::MissingRoot(root.to_path_buf()));
        }
        let mut index = Self::new();
        index.load_dir(root, root)?;
        info!("Indexed {} animation folders under {}", index.len(), root.display());
        Ok(index)
    }

    fn load_dir(&mut self, dir: &Path, root: &Path) -> Result<(), IndexError> {
        let mut subdirs = Vec::new();
        for entry in fs::read_dir(dir).map_err(|e| IndexError::io(dir, e))? {
            let entry = entry.map_err(|e| IndexError::io(dir, e))?;
            let file_type = entry.file_type().map_err(|e| IndexError::io(dir, e))?;
            if file_type.is_dir() {
                subdirs.push(entry.path());
            }
        }
        subdirs.sort();

        if !subdirs.is_empty() {
            for sub in subdirs {
                self.load_dir(&sub, root)?;
            }
            return Ok(());
        }

        let files = list_frame_files(dir)?;
        let Some(first) = files.first() else {
            debug!("Skipping empty folder {}", dir.display());
            return Ok(());
        };
        if files.len() == 1 {
            debug!("Single frame asset at {}", dir.display());
        }

        let relative = dir.strip_prefix(root).unwrap_or(dir).to_path_buf();
        if let Some(key) = parse_asset_path(first, &ParseContext::new(root)) {
            self.add_index(key, relative);
        }
        Ok(())
    }

    /// Insert `key` unless it is already present.
    ///
    /// A duplicate is logged and the first registration is kept. Returns
    /// whether the entry was inserted.
    pub fn add_index(&mut self, key: AnimationKey, path: PathBuf) -> bool {
        if let Some(&existing) = self.lookup.get(&key) {
            error!(
                "Duplicate animation key [{}] for {}; keeping {}",
                key,
                path.display(),
                self.entries[existing].1.display()
            );
            return false;
        }
        self.lookup.insert(key.clone(), self.entries.len());
        self.entries.push((key, path));
        true
    }

    /// Source paths whose key matches `predicate`, in insertion order.
    pub fn search<'a, F>(&'a self, mut predicate: F) -> impl Iterator<Item = &'a Path> + 'a
    where
        F: FnMut(&AnimationKey) -> bool + 'a,
    {
        self.entries
            .iter()
            .filter(move |(key, _)| predicate(key))
            .map(|(_, path)| path.as_path())
    }

    /// Reverse lookup of the key registered for `path`.
    pub fn find_key_by_path(&self, path: &Path) -> Option<&AnimationKey> {
        self.entries.iter().find(|(_, p)| p == path).map(|(key, _)| key)
    }

    /// Same reverse lookup as [`find_key_by_path`](Self::find_key_by_path),
    /// returning the stored path alongside the key.
    pub fn info_by_path(&self, path: &Path) -> Option<(&AnimationKey, &Path)> {
        self.entries
            .iter()
            .find(|(_, p)| p == path)
            .map(|(key, p)| (key, p.as_path()))
    }

    pub fn get(&self, key: &AnimationKey) -> Option<&Path> {
        self.lookup.get(key).map(|&i| self.entries[i].1.as_path())
    }

    pub fn all_assets(&self) -> impl Iterator<Item = (&AnimationKey, &Path)> {
        self.entries.iter().map(|(key, path)| (key, path.as_path()))
    }

    /// Source folders of every entry, in insertion order.
    pub fn all_paths(&self) -> impl Iterator<Item = &Path> {
        self.entries.iter().map(|(_, path)| path.as_path())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::{Activity, PetState, Transition};
    use image::{Rgba, RgbaImage};
    use tempfile::TempDir;

    fn key(name: &str) -> AnimationKey {
        AnimationKey::new(name, Activity::Idle, PetState::Normal, Transition::Single, 7)
    }

    fn write_frame(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        RgbaImage::from_pixel(2, 2, Rgba([1, 2, 3, 255])).save(path).unwrap();
    }

    #[test]
    fn test_duplicate_registration_keeps_first() {
        let mut index = AssetIndex::new();
        assert!(index.add_index(key("a"), PathBuf::from("first")));
        assert!(!index.add_index(key("a"), PathBuf::from("second")));

        assert_eq!(index.all_assets().count(), 1);
        assert_eq!(index.get(&key("a")), Some(Path::new("first")));
    }

    #[test]
    fn test_search_keeps_insertion_order() {
        let mut index = AssetIndex::new();
        index.add_index(key("b"), PathBuf::from("b"));
        index.add_index(key("a"), PathBuf::from("a"));
        index.add_index(key("c"), PathBuf::from("c"));

        let found: Vec<_> = index.search(|k| k.name != "a").collect();
        assert_eq!(found, vec![Path::new("b"), Path::new("c")]);
    }

    #[test]
    fn test_reverse_lookup() {
        let mut index = AssetIndex::new();
        index.add_index(key("a"), PathBuf::from("x/y"));

        assert_eq!(index.find_key_by_path(Path::new("x/y")).map(|k| k.name.as_str()), Some("a"));
        assert!(index.find_key_by_path(Path::new("x")).is_none());
        assert!(index.info_by_path(Path::new("x/y")).is_some());
    }

    #[test]
    fn test_discover_leaf_folders() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        write_frame(&root.join("Happy/Touch_Head/A_Start/th_000_100.png"));
        write_frame(&root.join("Happy/Touch_Head/A_Start/th_001_100.png"));
        write_frame(&root.join("Happy/Touch_Head/B_Loop/th_000_100.png"));
        write_frame(&root.join("Nomal/Sleep/sleep_000_125.png"));
        write_frame(&root.join("Nomal/Dance/dance_000_100.png"));
        fs::create_dir_all(root.join("Nomal/Empty")).unwrap();
        fs::write(root.join("Nomal/Sleep/readme.txt"), "not a frame").unwrap();

        let index = AssetIndex::discover(root).unwrap();
        assert_eq!(index.len(), 3);

        let start = index
            .find_key_by_path(Path::new("Happy/Touch_Head/A_Start"))
            .unwrap();
        assert_eq!(start.activity, Activity::TouchHead);
        assert_eq!(start.state, PetState::Happy);
        assert_eq!(start.transition, Transition::Start);

        let sleep = index.find_key_by_path(Path::new("Nomal/Sleep")).unwrap();
        assert_eq!(sleep.activity, Activity::Sleep);
    }

    #[test]
    fn test_discover_missing_root() {
        let temp = TempDir::new().unwrap();
        let err = AssetIndex::discover(&temp.path().join("nope")).unwrap_err();
        assert!(matches!(err, IndexError::MissingRoot(_)));
    }

    #[test]
    fn test_list_frame_files_sorted() {
        let temp = TempDir::new().unwrap();
        write_frame(&temp.path().join("f_002_100.png"));
        write_frame(&temp.path().join("f_000_100.png"));
        write_frame(&temp.path().join("f_001_100.png"));
        fs::write(temp.path().join("notes.txt"), "x").unwrap();

        let files = list_frame_files(temp.path()).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["f_000_100.png", "f_001_100.png", "f_002_100.png"]);
    }
}
