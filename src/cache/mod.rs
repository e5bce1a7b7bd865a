//! Atlas cache: one packed sprite sheet per source animation folder.
//!
//! Cache files are named by a hash of the folder path relative to the asset
//! root (16 hex digits, no extension) and hold a PNG atlas. Building is
//! independent per folder and runs on a bounded number of scoped worker
//! threads.
//!
//! # Example
//!
//! ```ignore
//! use deskpet::cache::CacheBuild;
//!
//! let report = CacheBuild::new(&assets_root, &cache_dir, 500)
//!     .with_jobs(4)
//!     .run(&sources, &|p| println!("{:.0}%", p * 100.0))?;
//! println!("built {}, reused {}", report.built, report.reused);
//! ```

mod manifest;

use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use log::{debug, info, warn};
use thiserror::Error;

use crate::assets::{list_frame_files, IndexError};
use crate::hash::{normalize_relative, path_to_hash};
use crate::sheet::{SheetError, SpriteSheetBuilder};

pub use manifest::{CacheManifest, ManifestError, CACHE_FORMAT_VERSION, CACHE_MANIFEST_FILENAME};

/// Default number of cache workers.
pub const DEFAULT_CACHE_JOBS: usize = 4;

/// Error preparing the atlas cache.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CacheError {
    /// Two different source folders hash to the same cache file
    #[error(
        "Cache file {name} is claimed by both \"{}\" and \"{}\"",
        .first.display(),
        .second.display()
    )]
    Collision {
        name: String,
        first: PathBuf,
        second: PathBuf,
    },
    /// A source folder contains no frames
    #[error("No frame files in {}", .0.display())]
    NoFrames(PathBuf),
    /// Packing a source folder failed
    #[error("Failed to pack {}: {source}", .path.display())]
    Sheet {
        path: PathBuf,
        #[source]
        source: SheetError,
    },
    /// An atlas on disk does not match its source frames
    #[error(
        "Atlas {} is {}x{}, expected {}x{}",
        .path.display(), .found.0, .found.1, .expected.0, .expected.1
    )]
    AtlasMismatch {
        path: PathBuf,
        expected: (u32, u32),
        found: (u32, u32),
    },
    /// Reading the source tree failed
    #[error(transparent)]
    Index(#[from] IndexError),
    /// Manifest read or write failed
    #[error("Cache manifest error: {0}")]
    Manifest(#[from] ManifestError),
    /// File I/O error
    #[error("Failed to write {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// A worker thread panicked
    #[error("Cache worker panicked")]
    WorkerPanicked,
}

impl CacheError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Cache file name for a source folder relative to the asset root.
pub fn cache_file_name(source: &Path) -> String {
    path_to_hash(source)
}

/// Pack every frame of `source_dir` into `cache_file`.
///
/// The atlas is written to a sibling temporary file first so an interrupted
/// build never leaves a truncated cache file behind. Returns the frame count.
pub fn build_sequence_cache(
    source_dir: &Path,
    cache_file: &Path,
    cell_size: u32,
) -> Result<usize, CacheError> {
    let files = list_frame_files(source_dir)?;
    if files.is_empty() {
        return Err(CacheError::NoFrames(source_dir.to_path_buf()));
    }

    let sheet_err = |source| CacheError::Sheet {
        path: source_dir.to_path_buf(),
        source,
    };
    let mut builder = SpriteSheetBuilder::new(cell_size).map_err(sheet_err)?;
    for file in &files {
        let reader = File::open(file).map_err(|e| CacheError::io(file, e))?;
        builder
            .append_reader(reader)
            .map_err(|source| CacheError::Sheet {
                path: file.clone(),
                source,
            })?;
    }

    if let Some(parent) = cache_file.parent() {
        fs::create_dir_all(parent).map_err(|e| CacheError::io(parent, e))?;
    }
    let partial = cache_file.with_extension("partial");
    let writer = File::create(&partial).map_err(|e| CacheError::io(&partial, e))?;
    builder.save_to(BufWriter::new(writer)).map_err(sheet_err)?;
    fs::rename(&partial, cache_file).map_err(|e| CacheError::io(cache_file, e))?;

    debug!(
        "Packed {} frames from {} into {}",
        files.len(),
        source_dir.display(),
        cache_file.display()
    );
    Ok(files.len())
}

/// Check that an atlas on disk holds `frame_count` cells of `cell_size`.
pub fn verify_atlas(cache_file: &Path, frame_count: usize, cell_size: u32) -> Result<(), CacheError> {
    let found = image::io::Reader::open(cache_file)
        .and_then(|reader| reader.with_guessed_format())
        .map_err(|e| CacheError::io(cache_file, e))?
        .into_dimensions()
        .map_err(|e| CacheError::Sheet {
            path: cache_file.to_path_buf(),
            source: SheetError::Image(e),
        })?;
    let expected = (frame_count as u32 * cell_size, cell_size);
    if found != expected {
        return Err(CacheError::AtlasMismatch {
            path: cache_file.to_path_buf(),
            expected,
            found,
        });
    }
    Ok(())
}

/// Result of a cache pass.
#[derive(Debug, Clone, Default)]
pub struct CacheReport {
    /// Source folder (relative) to cache file, in source order
    pub entries: Vec<(PathBuf, PathBuf)>,
    /// Atlases packed during this pass
    pub built: usize,
    /// Atlases reused from a previous pass
    pub reused: usize,
}

impl CacheReport {
    pub fn cache_file(&self, source: &Path) -> Option<&Path> {
        self.entries
            .iter()
            .find(|(s, _)| s == source)
            .map(|(_, c)| c.as_path())
    }
}

/// One cache pass over a set of source folders.
pub struct CacheBuild<'a> {
    assets_root: &'a Path,
    cache_dir: &'a Path,
    cell_size: u32,
    jobs: usize,
    force: bool,
}

impl<'a> CacheBuild<'a> {
    pub fn new(assets_root: &'a Path, cache_dir: &'a Path, cell_size: u32) -> Self {
        Self {
            assets_root,
            cache_dir,
            cell_size,
            jobs: DEFAULT_CACHE_JOBS,
            force: false,
        }
    }

    /// Set the number of parallel jobs.
    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs.max(1);
        self
    }

    /// Rebuild every atlas even if it already exists.
    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn jobs(&self) -> usize {
        self.jobs
    }

    /// Build whatever is missing for `sources` (paths relative to the asset
    /// root), reporting progress in `0.0..=1.0` after each folder.
    pub fn run(
        &self,
        sources: &[PathBuf],
        progress: &(dyn Fn(f64) + Sync),
    ) -> Result<CacheReport, CacheError> {
        fs::create_dir_all(self.cache_dir).map_err(|e| CacheError::io(self.cache_dir, e))?;

        let previous = match CacheManifest::load_from_dir(self.cache_dir) {
            Ok(manifest) => manifest,
            Err(e) => {
                warn!("Ignoring unreadable cache manifest: {}", e);
                None
            }
        };
        let stale = self.force
            || previous
                .as_ref()
                .map_or(true, |m| !m.is_compatible(self.cell_size));
        if stale && previous.is_some() {
            info!("Cache in {} is stale, rebuilding", self.cache_dir.display());
        }
        let mut manifest = match previous {
            Some(manifest) if !stale => manifest,
            _ => CacheManifest::new(self.cell_size),
        };

        let jobs = self.assign_names(sources, &manifest)?;
        let outcomes = self.build_all(&jobs, stale, progress)?;

        let mut report = CacheReport::default();
        for ((source, name), built) in jobs.iter().zip(outcomes) {
            if built {
                report.built += 1;
            } else {
                report.reused += 1;
            }
            manifest
                .entries
                .insert(name.clone(), normalize_relative(source));
            report
                .entries
                .push((source.clone(), self.cache_dir.join(name)));
        }
        manifest.save_to_dir(self.cache_dir)?;

        info!(
            "Atlas cache ready: {} built, {} reused in {}",
            report.built,
            report.reused,
            self.cache_dir.display()
        );
        Ok(report)
    }

    /// Map each distinct source to its cache file name, rejecting collisions.
    fn assign_names(
        &self,
        sources: &[PathBuf],
        manifest: &CacheManifest,
    ) -> Result<Vec<(PathBuf, String)>, CacheError> {
        let mut claimed: HashMap<String, PathBuf> = HashMap::new();
        let mut jobs = Vec::with_capacity(sources.len());
        for source in sources {
            let name = cache_file_name(source);
            if let Some(first) = claimed.get(&name) {
                if normalize_relative(first) == normalize_relative(source) {
                    continue;
                }
                return Err(CacheError::Collision {
                    name,
                    first: first.clone(),
                    second: source.clone(),
                });
            }
            if let Some(recorded) = manifest.entries.get(&name) {
                if *recorded != normalize_relative(source) {
                    return Err(CacheError::Collision {
                        name,
                        first: PathBuf::from(recorded),
                        second: source.clone(),
                    });
                }
            }
            claimed.insert(name.clone(), source.clone());
            jobs.push((source.clone(), name));
        }
        Ok(jobs)
    }

    /// Run every job on scoped workers. Returns, per job, whether it was built.
    fn build_all(
        &self,
        jobs: &[(PathBuf, String)],
        stale: bool,
        progress: &(dyn Fn(f64) + Sync),
    ) -> Result<Vec<bool>, CacheError> {
        let total = jobs.len();
        let next_idx = AtomicUsize::new(0);
        let done = AtomicUsize::new(0);
        let failed = AtomicBool::new(false);
        let results: Mutex<Vec<(usize, Result<bool, CacheError>)>> =
            Mutex::new(Vec::with_capacity(total));

        let panicked = std::thread::scope(|s| {
            let workers: Vec<_> = (0..self.jobs.min(total))
                .map(|_| {
                    s.spawn(|| loop {
                        if failed.load(Ordering::SeqCst) {
                            break;
                        }
                        let idx = next_idx.fetch_add(1, Ordering::SeqCst);
                        if idx >= total {
                            break;
                        }

                        let (source, name) = &jobs[idx];
                        let result = self.build_one(source, name, stale);
                        if result.is_err() {
                            failed.store(true, Ordering::SeqCst);
                        }
                        let finished = done.fetch_add(1, Ordering::SeqCst) + 1;
                        progress(finished as f64 / total as f64);

                        results
                            .lock()
                            .unwrap_or_else(PoisonError::into_inner)
                            .push((idx, result));
                    })
                })
                .collect();
            let mut panicked = false;
            for worker in workers {
                panicked |= worker.join().is_err();
            }
            panicked
        });
        if panicked {
            return Err(CacheError::WorkerPanicked);
        }

        let mut results = results.into_inner().unwrap_or_else(PoisonError::into_inner);
        results.sort_by_key(|(idx, _)| *idx);
        let mut built = Vec::with_capacity(total);
        for (_, result) in results {
            built.push(result?);
        }
        Ok(built)
    }

    fn build_one(&self, source: &Path, name: &str, stale: bool) -> Result<bool, CacheError> {
        let cache_file = self.cache_dir.join(name);
        if !stale && cache_file.is_file() {
            return Ok(false);
        }
        build_sequence_cache(&self.assets_root.join(source), &cache_file, self.cell_size)?;
        Ok(true)
    }
}

/// Cached atlases by source folder, as recorded in a cache folder.
pub fn read_cache_entries(cache_dir: &Path) -> Result<BTreeMap<String, PathBuf>, CacheError> {
    let manifest = CacheManifest::load_from_dir(cache_dir)?.unwrap_or_else(|| CacheManifest::new(0));
    Ok(manifest
        .entries
        .into_iter()
        .map(|(name, source)| (source, cache_dir.join(name)))
        .collect())
}
