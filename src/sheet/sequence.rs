//! Runtime model of a packed animation sequence.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use crate::assets::numeric_tag;

use super::{ImageResource, SequenceError};

/// Pixel rectangle of one cell inside an atlas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl FrameRect {
    /// Rectangle of horizontal cell `index`.
    pub fn cell(index: usize, cell_size: u32) -> Self {
        Self {
            x: index as u32 * cell_size,
            y: 0,
            width: cell_size,
            height: cell_size,
        }
    }

    pub fn overlaps(&self, other: &FrameRect) -> bool {
        self.x < other.x + other.width
            && other.x < self.x + self.width
            && self.y < other.y + other.height
            && other.y < self.y + self.height
    }
}

/// One frame of a sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpriteSheetFrame {
    pub index: usize,
    pub delay_ms: u32,
    pub area: FrameRect,
}

/// A packed animation: frame list plus a lazily bound atlas image.
///
/// Frames are fixed at construction. The sprite can be attached once and
/// its pixels released and rematerialized any number of times.
pub struct SpriteSheetSequence {
    name: String,
    cell_size: u32,
    frames: Vec<SpriteSheetFrame>,
    sprite: OnceLock<ImageResource>,
}

impl SpriteSheetSequence {
    pub fn new(name: impl Into<String>, cell_size: u32, frames: Vec<SpriteSheetFrame>) -> Self {
        Self {
            name: name.into(),
            cell_size,
            frames,
            sprite: OnceLock::new(),
        }
    }

    /// Build a sequence from per-frame delays, laying frames out cell by cell.
    pub fn from_delays(name: impl Into<String>, cell_size: u32, delays: &[u32]) -> Self {
        let frames = delays
            .iter()
            .enumerate()
            .map(|(index, &delay_ms)| SpriteSheetFrame {
                index,
                delay_ms,
                area: FrameRect::cell(index, cell_size),
            })
            .collect();
        Self::new(name, cell_size, frames)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn cell_size(&self) -> u32 {
        self.cell_size
    }

    pub fn frames(&self) -> &[SpriteSheetFrame] {
        &self.frames
    }

    pub fn cell_counts(&self) -> usize {
        self.frames.len()
    }

    /// Sum of every frame delay.
    pub fn duration_ms(&self) -> u64 {
        self.frames.iter().map(|f| f.delay_ms as u64).sum()
    }

    /// Frame at `index`, or `None` past the end.
    pub fn try_get_frame(&self, index: usize) -> Option<&SpriteSheetFrame> {
        self.frames.get(index)
    }

    /// Attach the backing image. Returns `false` if one is already attached.
    pub fn attach_sprite(&self, sprite: ImageResource) -> bool {
        self.sprite.set(sprite).is_ok()
    }

    pub fn sprite(&self) -> Option<&ImageResource> {
        self.sprite.get()
    }

    /// Release the decoded atlas if the load strategy allows it.
    pub fn release_sprite(&self) -> bool {
        self.sprite.get().is_some_and(ImageResource::release)
    }

    pub(crate) fn dispose_sprite(&self) {
        if let Some(sprite) = self.sprite.get() {
            sprite.dispose();
        }
    }

    pub fn used_bytes(&self) -> usize {
        self.sprite.get().map_or(0, ImageResource::used_bytes)
    }
}

impl fmt::Debug for SpriteSheetSequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpriteSheetSequence")
            .field("name", &self.name)
            .field("cell_size", &self.cell_size)
            .field("frames", &self.frames.len())
            .field("sprite_attached", &self.sprite.get().is_some())
            .finish()
    }
}

impl fmt::Display for SpriteSheetSequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}ms)", self.name, self.duration_ms())
    }
}

/// Frame delay encoded in a frame file name.
///
/// The last underscore-delimited numeric token of the stem is the delay in
/// milliseconds, rounded to an integer: `blink_003_125.png` is 125 ms.
pub fn parse_frame_delay(path: &Path) -> Result<u32, SequenceError> {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    stem.rsplit('_')
        .find_map(numeric_tag)
        .filter(|delay| *delay >= 0.0 && *delay <= u32::MAX as f64)
        .map(|delay| delay.round() as u32)
        .ok_or_else(|| SequenceError::MissingDelay(path.to_path_buf()))
}

/// Frame list for the source frame files of one atlas, in the given order.
pub fn build_sequence_frames(
    files: &[PathBuf],
    cell_size: u32,
) -> Result<Vec<SpriteSheetFrame>, SequenceError> {
    files
        .iter()
        .enumerate()
        .map(|(index, file)| {
            Ok(SpriteSheetFrame {
                index,
                delay_ms: parse_frame_delay(file)?,
                area: FrameRect::cell(index, cell_size),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_frame_delay() {
        assert_eq!(parse_frame_delay(Path::new("a/blink_003_125.png")).unwrap(), 125);
        assert_eq!(parse_frame_delay(Path::new("f0_100.png")).unwrap(), 100);
        assert_eq!(parse_frame_delay(Path::new("x_62.5.png")).unwrap(), 63);
        assert_eq!(parse_frame_delay(Path::new("x_125_~a.png")).unwrap(), 125);
    }

    #[test]
    fn test_parse_frame_delay_missing() {
        let err = parse_frame_delay(Path::new("dir/blink.png")).unwrap_err();
        assert!(matches!(err, SequenceError::MissingDelay(_)));
        assert!(parse_frame_delay(Path::new("dir/blink_-5.png")).is_err());
    }

    #[test]
    fn test_build_sequence_frames_round_trip_delays() {
        let files: Vec<PathBuf> = ["f0_100.png", "f1_250.png", "f2_100.png"]
            .iter()
            .map(PathBuf::from)
            .collect();
        let frames = build_sequence_frames(&files, 10).unwrap();

        let summary: Vec<_> = frames.iter().map(|f| (f.index, f.delay_ms, f.area.x)).collect();
        assert_eq!(summary, vec![(0, 100, 0), (1, 250, 10), (2, 100, 20)]);

        let sequence = SpriteSheetSequence::new("f", 10, frames);
        assert_eq!(sequence.duration_ms(), 450);
        assert_eq!(sequence.to_string(), "(f, 450ms)");
    }

    #[test]
    fn test_try_get_frame_out_of_range() {
        let sequence = SpriteSheetSequence::from_delays("s", 4, &[10, 20]);
        assert!(sequence.try_get_frame(1).is_some());
        assert!(sequence.try_get_frame(2).is_none());
    }

    #[test]
    fn test_sprite_attaches_once() {
        let sequence = SpriteSheetSequence::from_delays("s", 1, &[10]);
        assert!(sequence.attach_sprite(ImageResource::from_image(image::RgbaImage::new(1, 1))));
        assert!(!sequence.attach_sprite(ImageResource::from_image(image::RgbaImage::new(1, 1))));
        assert_eq!(sequence.used_bytes(), 4);
        assert!(!sequence.release_sprite());
    }
}
