//! Cache command implementation and shared graphics loading

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use super::{EXIT_ERROR, EXIT_SUCCESS};
use crate::assets::{AssetIndex, AssetPack};
use crate::cache::CacheBuild;
use crate::config::DeskpetConfig;
use crate::gfx::GfxService;
use crate::logic::LogicError;

/// Progress callback printing a percentage line when stderr is a terminal.
pub(crate) fn progress_printer(label: &'static str) -> impl Fn(f64) + Sync {
    let interactive = atty::is(atty::Stream::Stderr);
    move |p: f64| {
        if interactive {
            eprint!("\r{} {:6.2}%", label, p * 100.0);
            if p >= 1.0 {
                eprintln!();
            }
            let _ = std::io::stderr().flush();
        } else {
            log::debug!("{} {:.2}%", label, p * 100.0);
        }
    }
}

fn locate(config: &DeskpetConfig) -> Result<PathBuf, LogicError> {
    let pack = AssetPack::locate(&config.assets.root, &config.assets.pack, &config.assets.gfx_path)?;
    Ok(pack.gfx_root)
}

/// Index, cache and build every sequence.
pub(crate) fn open_gfx(config: &DeskpetConfig) -> Result<GfxService, LogicError> {
    let gfx_root = locate(config)?;
    let mut gfx = GfxService::new().with_cache_jobs(config.cache.jobs);
    gfx.init(&gfx_root)?;
    gfx.create_sprite_sheet_cache_if_not_exists(
        &config.cache.provider_dir(),
        config.cache.cell_size,
        &progress_printer("Packing sprite sheets"),
    )?;
    gfx.create_animation_sequences_info(config.cache.cell_size)?;
    Ok(gfx)
}

fn build_caches(config: &DeskpetConfig, force: bool) -> Result<(usize, usize, PathBuf), LogicError> {
    let gfx_root = locate(config)?;
    let index = AssetIndex::discover(&gfx_root).map_err(crate::gfx::GfxError::from)?;
    let sources: Vec<PathBuf> = index.all_paths().map(Path::to_path_buf).collect();
    let cache_dir = config.cache.provider_dir();
    let report = CacheBuild::new(&gfx_root, &cache_dir, config.cache.cell_size)
        .with_jobs(config.cache.jobs)
        .with_force(force)
        .run(&sources, &progress_printer("Packing sprite sheets"))
        .map_err(crate::gfx::GfxError::from)?;
    Ok((report.built, report.reused, cache_dir))
}

/// Run the cache command
pub fn run_cache(config: &DeskpetConfig, force: bool) -> ExitCode {
    match build_caches(config, force) {
        Ok((built, reused, cache_dir)) => {
            println!(
                "Packed {} sprite sheets, reused {} ({}px cells) in {}",
                built,
                reused,
                config.cache.cell_size,
                cache_dir.display()
            );
            ExitCode::from(EXIT_SUCCESS)
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::from(EXIT_ERROR)
        }
    }
}
