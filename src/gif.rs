//! Animated GIF preview of a sequence

use crate::render::{draw_frame, RenderError};
use crate::sheet::SpriteSheetSequence;
use image::codecs::gif::{GifEncoder, Repeat};
use image::{Delay, Frame};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

/// Render every frame of `sequence` into an animated GIF at `path`.
///
/// Each frame keeps its own delay. GIF delays have centisecond resolution,
/// so delays are rounded down to 10ms steps with a minimum of one step.
///
/// Returns the number of frames written; an empty sequence writes nothing.
pub fn render_sequence_gif(
    sequence: &SpriteSheetSequence,
    size: u32,
    loop_anim: bool,
    path: &Path,
) -> Result<usize, RenderError> {
    if sequence.cell_counts() == 0 {
        return Ok(0);
    }

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let file = File::create(path)?;
    let mut encoder = GifEncoder::new(BufWriter::new(file));
    let repeat = if loop_anim {
        Repeat::Infinite
    } else {
        Repeat::Finite(0)
    };
    encoder.set_repeat(repeat)?;

    for frame in sequence.frames() {
        let pixels = draw_frame(sequence, frame.index, (size, size))?;
        let delay_cs = (frame.delay_ms / 10).max(1);
        let delay = Delay::from_numer_denom_ms(delay_cs * 10, 1);
        encoder.encode_frame(Frame::from_parts(pixels, 0, 0, delay))?;
    }

    Ok(sequence.cell_counts())
}
