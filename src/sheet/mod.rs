//! Sprite sheets: atlas packing, the runtime sequence model and its
//! backing image resource.

mod builder;
mod resource;
mod sequence;

use std::path::{Path, PathBuf};

use thiserror::Error;

pub use builder::SpriteSheetBuilder;
pub use resource::{ImageResource, LoadStrategy};
pub use sequence::{
    build_sequence_frames, parse_frame_delay, FrameRect, SpriteSheetFrame, SpriteSheetSequence,
};

/// Error packing or decoding a sprite sheet.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SheetError {
    /// Cell size must be positive
    #[error("Cell size must be greater than zero")]
    InvalidCellSize,
    /// A frame is not square
    #[error("Frame must be square, got {width}x{height}")]
    NonSquareFrame { width: u32, height: u32 },
    /// Nothing to pack
    #[error("Sprite sheet has no frames")]
    Empty,
    /// An in-memory resource was asked to decode after being dropped
    #[error("Sprite sheet image is no longer available")]
    Released,
    /// Image decode or encode error
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
    /// Stream I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// File I/O error with the offending path
    #[error("Failed to read {}: {source}", .path.display())]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl SheetError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        Self::File {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Error recovering a sequence's frame list from its source files.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SequenceError {
    /// A frame file name does not end with a delay
    #[error("Frame file {} has no trailing delay in milliseconds", .0.display())]
    MissingDelay(PathBuf),
    /// A sequence folder has no frames
    #[error("No frame files in {}", .0.display())]
    NoFrames(PathBuf),
}
