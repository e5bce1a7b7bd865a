//! Sequence listing and GIF preview commands

use std::path::Path;
use std::process::ExitCode;

use glob::Pattern;

use super::cache::open_gfx;
use super::{EXIT_ERROR, EXIT_INVALID_ARGS, EXIT_SUCCESS};
use crate::assets::AnimationKey;
use crate::config::DeskpetConfig;
use crate::gif::render_sequence_gif;
use crate::sheet::LoadStrategy;

/// Match either the folder name or the full sequence name, so phases of one
/// animation can be told apart (`'rise*Start'`).
fn matches_key(pattern: &Pattern, key: &AnimationKey) -> bool {
    pattern.matches(&key.name) || pattern.matches(&key.to_string())
}

fn name_pattern(name: Option<&str>) -> Result<Option<Pattern>, ExitCode> {
    match name.map(Pattern::new).transpose() {
        Ok(pattern) => Ok(pattern),
        Err(e) => {
            eprintln!("Error: invalid name pattern: {}", e);
            Err(ExitCode::from(EXIT_INVALID_ARGS))
        }
    }
}

/// Run the sequences command
pub fn run_sequences(config: &DeskpetConfig, name: Option<&str>) -> ExitCode {
    let pattern = match name_pattern(name) {
        Ok(pattern) => pattern,
        Err(code) => return code,
    };
    let gfx = match open_gfx(config) {
        Ok(gfx) => gfx,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::from(EXIT_ERROR);
        }
    };

    let matches = gfx.search_sequences_with_keys(|key| {
        pattern.as_ref().map_or(true, |p| matches_key(p, key))
    });
    for (key, sequence) in &matches {
        println!(
            "{:<24} {:<14} {:<6} {:<6} {:>3} frames {:>6}ms",
            key.name,
            key.activity.to_string(),
            key.state.to_string(),
            key.transition.to_string(),
            sequence.cell_counts(),
            sequence.duration_ms()
        );
    }
    println!();
    println!("{} of {} sequences", matches.len(), gfx.sequence_count());
    ExitCode::from(EXIT_SUCCESS)
}

/// Run the preview command
pub fn run_preview(config: &DeskpetConfig, name: &str, output: &Path, size: u32) -> ExitCode {
    let pattern = match name_pattern(Some(name)) {
        Ok(Some(pattern)) => pattern,
        Ok(None) => return ExitCode::from(EXIT_INVALID_ARGS),
        Err(code) => return code,
    };
    if size == 0 {
        eprintln!("Error: --size must be positive");
        return ExitCode::from(EXIT_INVALID_ARGS);
    }
    let gfx = match open_gfx(config) {
        Ok(gfx) => gfx,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::from(EXIT_ERROR);
        }
    };

    let Some(sequence) = gfx.search_sequences(|key| matches_key(&pattern, key)).into_iter().next()
    else {
        eprintln!("Error: no sequence matches '{}'", name);
        return ExitCode::from(EXIT_ERROR);
    };
    if let Err(e) = gfx.preload_all_sequences(LoadStrategy::Lazy) {
        eprintln!("Error: {}", e);
        return ExitCode::from(EXIT_ERROR);
    }

    match render_sequence_gif(&sequence, size, true, output) {
        Ok(frames) => {
            println!("Wrote {} ({} frames, {}ms)", output.display(), frames, sequence.duration_ms());
            ExitCode::from(EXIT_SUCCESS)
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::from(EXIT_ERROR)
        }
    }
}
