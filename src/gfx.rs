//! Graphics service: owns the asset index, the atlas cache and every
//! runtime sequence built from it.
//!
//! Loading happens in four steps, normally driven by the simulation thread
//! before gameplay starts:
//!
//! 1. [`GfxService::init`] indexes the asset tree.
//! 2. [`GfxService::create_sprite_sheet_cache_if_not_exists`] packs missing atlases.
//! 3. [`GfxService::create_animation_sequences_info`] recovers frame lists.
//! 4. [`GfxService::preload_all_sequences`] binds an image resource to each.
//!
//! # Example
//!
//! ```ignore
//! let mut gfx = GfxService::new();
//! gfx.init(&pack.gfx_root)?;
//! gfx.create_sprite_sheet_cache_if_not_exists(&cache_dir, 500, &|_| {})?;
//! gfx.create_animation_sequences_info(500)?;
//! gfx.preload_all_sequences(LoadStrategy::MemoryHotLoad)?;
//! let idle = gfx.search_sequences(|k| k.activity == Activity::Idle);
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, info};
use thiserror::Error;

use crate::assets::{list_frame_files, AnimationKey, AssetIndex, IndexError};
use crate::cache::{verify_atlas, CacheBuild, CacheError, CacheReport, DEFAULT_CACHE_JOBS};
use crate::sheet::{
    build_sequence_frames, ImageResource, LoadStrategy, SequenceError, SheetError,
    SpriteSheetSequence,
};

/// Name used for a sequence whose folder has no index entry.
const FALLBACK_SEQUENCE_NAME: &str = "NO_NAME";

/// Error while loading graphics.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum GfxError {
    /// A step ran before [`GfxService::init`]
    #[error("Graphics service is not initialized")]
    NotInitialized,
    #[error(transparent)]
    Index(#[from] IndexError),
    #[error(transparent)]
    Cache(#[from] CacheError),
    /// A sequence's frame list could not be recovered
    #[error("Invalid sequence {}: {source}", .path.display())]
    Sequence {
        path: PathBuf,
        #[source]
        source: SequenceError,
    },
    /// A cache file could not be loaded
    #[error("Failed to load {}: {source}", .path.display())]
    Sheet {
        path: PathBuf,
        #[source]
        source: SheetError,
    },
}

struct SequenceEntry {
    cache_file: PathBuf,
    sequence: Arc<SpriteSheetSequence>,
}

/// Owner of every sprite sheet sequence.
pub struct GfxService {
    assets_root: Option<PathBuf>,
    index: AssetIndex,
    cache_jobs: usize,
    cached: Vec<(PathBuf, PathBuf)>,
    sequences: Vec<SequenceEntry>,
    by_source: HashMap<PathBuf, usize>,
}

impl Default for GfxService {
    fn default() -> Self {
        Self::new()
    }
}

impl GfxService {
    pub fn new() -> Self {
        Self {
            assets_root: None,
            index: AssetIndex::new(),
            cache_jobs: DEFAULT_CACHE_JOBS,
            cached: Vec::new(),
            sequences: Vec::new(),
            by_source: HashMap::new(),
        }
    }

    /// Number of workers used by the cache pass.
    pub fn with_cache_jobs(mut self, jobs: usize) -> Self {
        self.cache_jobs = jobs.max(1);
        self
    }

    /// Index the asset tree under `assets_root`.
    pub fn init(&mut self, assets_root: &Path) -> Result<(), GfxError> {
        self.index = AssetIndex::discover(assets_root)?;
        self.assets_root = Some(assets_root.to_path_buf());
        Ok(())
    }

    fn root(&self) -> Result<&Path, GfxError> {
        self.assets_root.as_deref().ok_or(GfxError::NotInitialized)
    }

    pub fn index(&self) -> &AssetIndex {
        &self.index
    }

    /// Pack an atlas for every indexed folder that has none yet.
    pub fn create_sprite_sheet_cache_if_not_exists(
        &mut self,
        cache_dir: &Path,
        cell_size: u32,
        progress: &(dyn Fn(f64) + Sync),
    ) -> Result<CacheReport, GfxError> {
        let root = self.root()?;
        let sources: Vec<PathBuf> = self.index.all_paths().map(Path::to_path_buf).collect();
        let report = CacheBuild::new(root, cache_dir, cell_size)
            .with_jobs(self.cache_jobs)
            .run(&sources, progress)?;
        self.cached = report.entries.clone();
        Ok(report)
    }

    /// Build the runtime sequence of every cached atlas.
    ///
    /// Frame delays come from the source frame names, in the same lexical
    /// order the atlas was packed in. Returns the number of sequences.
    pub fn create_animation_sequences_info(&mut self, cell_size: u32) -> Result<usize, GfxError> {
        let root = self.root()?.to_path_buf();
        let mut sequences = Vec::with_capacity(self.cached.len());
        let mut by_source = HashMap::with_capacity(self.cached.len());

        for (source, cache_file) in &self.cached {
            let source_dir = root.join(source);
            let sequence_err = |e| GfxError::Sequence {
                path: source_dir.clone(),
                source: e,
            };
            let files = list_frame_files(&source_dir)?;
            if files.is_empty() {
                return Err(sequence_err(SequenceError::NoFrames(source_dir.clone())));
            }
            let frames = build_sequence_frames(&files, cell_size).map_err(sequence_err)?;
            verify_atlas(cache_file, frames.len(), cell_size)?;

            let name = self
                .index
                .info_by_path(source)
                .map(|(key, _)| key.to_string())
                .unwrap_or_else(|| FALLBACK_SEQUENCE_NAME.to_string());
            let sequence = Arc::new(SpriteSheetSequence::new(name, cell_size, frames));
            debug!("Sequence {} from {}", sequence, source.display());

            by_source.insert(source.clone(), sequences.len());
            sequences.push(SequenceEntry {
                cache_file: cache_file.clone(),
                sequence,
            });
        }

        self.dispose();
        self.sequences = sequences;
        self.by_source = by_source;
        info!("Constructed {} animation sequences", self.sequences.len());
        Ok(self.sequences.len())
    }

    /// Sequences whose key matches `predicate`, in index order.
    pub fn search_sequences<F>(&self, predicate: F) -> Vec<Arc<SpriteSheetSequence>>
    where
        F: FnMut(&AnimationKey) -> bool,
    {
        self.search_sequences_with_keys(predicate)
            .into_iter()
            .map(|(_, sequence)| sequence)
            .collect()
    }

    /// Like [`search_sequences`](Self::search_sequences), keeping the keys.
    pub fn search_sequences_with_keys<F>(
        &self,
        mut predicate: F,
    ) -> Vec<(AnimationKey, Arc<SpriteSheetSequence>)>
    where
        F: FnMut(&AnimationKey) -> bool,
    {
        self.index
            .all_assets()
            .filter(|&(key, _)| predicate(key))
            .filter_map(|(key, path)| {
                self.by_source
                    .get(path)
                    .map(|&i| (key.clone(), Arc::clone(&self.sequences[i].sequence)))
            })
            .collect()
    }

    /// Bind an image resource to every sequence that has none.
    pub fn preload_all_sequences(&self, strategy: LoadStrategy) -> Result<(), GfxError> {
        for entry in &self.sequences {
            if entry.sequence.sprite().is_some() {
                continue;
            }
            let resource = ImageResource::load(&entry.cache_file, strategy).map_err(|source| {
                GfxError::Sheet {
                    path: entry.cache_file.clone(),
                    source,
                }
            })?;
            entry.sequence.attach_sprite(resource);
        }
        info!(
            "Preloaded {} sequences ({:?}), {} bytes resident",
            self.sequences.len(),
            strategy,
            self.total_used_bytes()
        );
        Ok(())
    }

    /// Aggregate resident memory of every sequence.
    pub fn total_used_bytes(&self) -> usize {
        self.sequences.iter().map(|e| e.sequence.used_bytes()).sum()
    }

    pub fn sequence_count(&self) -> usize {
        self.sequences.len()
    }

    /// Sequence built from the folder `source` (relative to the asset root).
    pub fn sequence_for_source(&self, source: &Path) -> Option<Arc<SpriteSheetSequence>> {
        self.by_source
            .get(source)
            .map(|&i| Arc::clone(&self.sequences[i].sequence))
    }

    /// Release every decoded atlas.
    pub fn dispose(&mut self) {
        for entry in &self.sequences {
            entry.sequence.dispose_sprite();
        }
        debug!("Disposed {} sequences", self.sequences.len());
    }
}

impl Drop for GfxService {
    fn drop(&mut self) {
        self.dispose();
    }
}
