//! Index command implementation

use std::process::ExitCode;

use super::{EXIT_ERROR, EXIT_SUCCESS};
use crate::assets::{Activity, AssetIndex, AssetPack, PetState};
use crate::config::DeskpetConfig;

/// Run the index command
pub fn run_index(
    config: &DeskpetConfig,
    activity: Option<Activity>,
    state: Option<PetState>,
) -> ExitCode {
    let assets = &config.assets;
    let pack = match AssetPack::locate(&assets.root, &assets.pack, &assets.gfx_path) {
        Ok(pack) => pack,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::from(EXIT_ERROR);
        }
    };
    let index = match AssetIndex::discover(&pack.gfx_root) {
        Ok(index) => index,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::from(EXIT_ERROR);
        }
    };

    let mut shown = 0;
    for (key, path) in index.all_assets() {
        if activity.is_some_and(|a| a != key.activity) || state.is_some_and(|s| s != key.state) {
            continue;
        }
        println!(
            "{:<24} {:<14} {:<6} {:<6} {}",
            key.name,
            key.activity.to_string(),
            key.state.to_string(),
            key.transition.to_string(),
            path.display()
        );
        shown += 1;
    }
    println!();
    println!("{} of {} animation folders in {}", shown, index.len(), pack.gfx_root.display());
    ExitCode::from(EXIT_SUCCESS)
}
