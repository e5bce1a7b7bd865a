//! Frame drawing and render surfaces

use image::imageops::FilterType;
use image::RgbaImage;
use log::{debug, info};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::messages::FrameSnapshot;
use crate::sheet::{SheetError, SpriteSheetSequence};

/// Error type for render operations
#[derive(Debug)]
pub enum RenderError {
    /// IO error during file operations
    Io(io::Error),
    /// Image encoding error
    Image(image::ImageError),
    /// The atlas could not be materialized
    Sheet(SheetError),
    /// The sequence has no atlas attached
    NoSprite(String),
    /// The frame index is outside the sequence
    NoFrame { sequence: String, index: usize },
}

impl std::fmt::Display for RenderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RenderError::Io(e) => write!(f, "IO error: {}", e),
            RenderError::Image(e) => write!(f, "Image error: {}", e),
            RenderError::Sheet(e) => write!(f, "Sprite sheet error: {}", e),
            RenderError::NoSprite(name) => write!(f, "Sequence {} has no sprite attached", name),
            RenderError::NoFrame { sequence, index } => {
                write!(f, "Sequence {} has no frame {}", sequence, index)
            }
        }
    }
}

impl std::error::Error for RenderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RenderError::Io(e) => Some(e),
            RenderError::Image(e) => Some(e),
            RenderError::Sheet(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for RenderError {
    fn from(e: io::Error) -> Self {
        RenderError::Io(e)
    }
}

impl From<image::ImageError> for RenderError {
    fn from(e: image::ImageError) -> Self {
        RenderError::Image(e)
    }
}

impl From<SheetError> for RenderError {
    fn from(e: SheetError) -> Self {
        RenderError::Sheet(e)
    }
}

/// Draw frame `index` of `sequence`, scaled to `bounds`.
///
/// A released hot-load atlas is decoded for this frame only and stays
/// released; other strategies materialize the atlas on first use.
pub fn draw_frame(
    sequence: &SpriteSheetSequence,
    index: usize,
    bounds: (u32, u32),
) -> Result<RgbaImage, RenderError> {
    let frame = sequence
        .try_get_frame(index)
        .ok_or_else(|| RenderError::NoFrame {
            sequence: sequence.name().to_string(),
            index,
        })?;
    let sprite = sequence
        .sprite()
        .ok_or_else(|| RenderError::NoSprite(sequence.name().to_string()))?;
    let atlas = sprite.peek_or_decode_transient()?;

    let area = frame.area;
    let cell = image::imageops::crop_imm(atlas.as_ref(), area.x, area.y, area.width, area.height)
        .to_image();
    let (width, height) = bounds;
    if cell.dimensions() == bounds || width == 0 || height == 0 {
        return Ok(cell);
    }
    Ok(image::imageops::resize(&cell, width, height, FilterType::Triangle))
}

/// Save an RGBA image to a PNG file, creating parent directories.
pub fn save_png(image: &RgbaImage, path: &Path) -> Result<(), RenderError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }

    image.save_with_format(path, image::ImageFormat::Png)?;
    Ok(())
}

/// Something the pet can be drawn onto.
pub trait RenderSurface {
    /// Size frames are scaled to.
    fn bounds(&self) -> (u32, u32);

    /// Show `frame`, drawn from `snapshot`.
    fn present(&mut self, frame: &RgbaImage, snapshot: &FrameSnapshot) -> Result<(), RenderError>;
}

/// Writes every presented frame to a numbered PNG.
#[derive(Debug)]
pub struct PngDumpSurface {
    dir: PathBuf,
    bounds: (u32, u32),
    written: usize,
}

impl PngDumpSurface {
    pub fn new(dir: impl Into<PathBuf>, bounds: (u32, u32)) -> Self {
        Self {
            dir: dir.into(),
            bounds,
            written: 0,
        }
    }

    pub fn written(&self) -> usize {
        self.written
    }
}

impl RenderSurface for PngDumpSurface {
    fn bounds(&self) -> (u32, u32) {
        self.bounds
    }

    fn present(&mut self, frame: &RgbaImage, snapshot: &FrameSnapshot) -> Result<(), RenderError> {
        let sequence: String = snapshot
            .sequence
            .name()
            .chars()
            .map(|c| if c.is_alphanumeric() || c == '-' { c } else { '_' })
            .collect();
        let name = format!("{:05}_{}_{}.png", self.written, sequence, snapshot.index);
        save_png(frame, &self.dir.join(name))?;
        self.written += 1;
        Ok(())
    }
}

/// Only logs what would be shown.
#[derive(Debug, Default)]
pub struct LogSurface {
    bounds: (u32, u32),
    presented: usize,
    current: Option<Arc<SpriteSheetSequence>>,
}

impl LogSurface {
    pub fn new(bounds: (u32, u32)) -> Self {
        Self {
            bounds,
            ..Self::default()
        }
    }

    pub fn presented(&self) -> usize {
        self.presented
    }

    pub fn current(&self) -> Option<&Arc<SpriteSheetSequence>> {
        self.current.as_ref()
    }
}

impl RenderSurface for LogSurface {
    fn bounds(&self) -> (u32, u32) {
        self.bounds
    }

    fn present(&mut self, _frame: &RgbaImage, snapshot: &FrameSnapshot) -> Result<(), RenderError> {
        let changed = self
            .current
            .as_ref()
            .map_or(true, |current| !Arc::ptr_eq(current, &snapshot.sequence));
        if changed {
            info!("Showing {}", snapshot.sequence);
            self.current = Some(Arc::clone(&snapshot.sequence));
        }
        debug!("Frame {} of {}", snapshot.index, snapshot.sequence.name());
        self.presented += 1;
        Ok(())
    }
}

/// Draws snapshots onto a surface, skipping ones already shown.
#[derive(Debug, Default)]
pub struct Renderer {
    shown: Option<(Arc<SpriteSheetSequence>, usize)>,
}

impl Renderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Draw `snapshot` unless it is the frame already on `surface`.
    ///
    /// Returns whether anything was presented.
    pub fn render(
        &mut self,
        surface: &mut dyn RenderSurface,
        snapshot: &FrameSnapshot,
    ) -> Result<bool, RenderError> {
        if let Some((sequence, index)) = &self.shown {
            if Arc::ptr_eq(sequence, &snapshot.sequence) && *index == snapshot.index {
                return Ok(false);
            }
        }
        let frame = draw_frame(&snapshot.sequence, snapshot.index, surface.bounds())?;
        surface.present(&frame, snapshot)?;
        self.shown = Some((Arc::clone(&snapshot.sequence), snapshot.index));
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playback::SpriteSheetPlayer;
    use crate::sheet::{ImageResource, LoadStrategy};
    use image::Rgba;
    use tempfile::tempdir;

    /// Two 2x2 cells: red then blue.
    fn sequence() -> Arc<SpriteSheetSequence> {
        let mut atlas = RgbaImage::from_pixel(4, 2, Rgba([255, 0, 0, 255]));
        for y in 0..2 {
            for x in 2..4 {
                atlas.put_pixel(x, y, Rgba([0, 0, 255, 255]));
            }
        }
        let sequence = Arc::new(SpriteSheetSequence::from_delays("pair", 2, &[10, 10]));
        sequence.attach_sprite(ImageResource::from_image(atlas));
        sequence
    }

    #[test]
    fn test_draw_frame_crops_cell() {
        let sequence = sequence();
        let first = draw_frame(&sequence, 0, (2, 2)).unwrap();
        assert_eq!(*first.get_pixel(1, 1), Rgba([255, 0, 0, 255]));
        let second = draw_frame(&sequence, 1, (2, 2)).unwrap();
        assert_eq!(*second.get_pixel(0, 0), Rgba([0, 0, 255, 255]));
    }

    #[test]
    fn test_draw_frame_scales_to_bounds() {
        let frame = draw_frame(&sequence(), 1, (8, 8)).unwrap();
        assert_eq!(frame.dimensions(), (8, 8));
        assert_eq!(*frame.get_pixel(4, 4), Rgba([0, 0, 255, 255]));
    }

    #[test]
    fn test_draw_frame_out_of_range() {
        assert!(matches!(
            draw_frame(&sequence(), 2, (2, 2)),
            Err(RenderError::NoFrame { index: 2, .. })
        ));
    }

    #[test]
    fn test_draw_frame_without_sprite() {
        let bare = SpriteSheetSequence::from_delays("bare", 2, &[10]);
        assert!(matches!(
            draw_frame(&bare, 0, (2, 2)),
            Err(RenderError::NoSprite(_))
        ));
    }

    #[test]
    fn test_renderer_skips_unchanged_frame() {
        let dir = tempdir().unwrap();
        let mut surface = PngDumpSurface::new(dir.path().join("frames"), (2, 2));
        let mut renderer = Renderer::new();
        let snapshot = FrameSnapshot {
            sequence: sequence(),
            index: 0,
        };

        assert!(renderer.render(&mut surface, &snapshot).unwrap());
        assert!(!renderer.render(&mut surface, &snapshot).unwrap());
        let next = FrameSnapshot {
            index: 1,
            ..snapshot
        };
        assert!(renderer.render(&mut surface, &next).unwrap());
        assert_eq!(surface.written(), 2);
        assert!(dir.path().join("frames/00001_pair_1.png").exists());
    }

    fn hot_load_sequence(dir: &Path, name: &str) -> Arc<SpriteSheetSequence> {
        let path = dir.join(name);
        RgbaImage::from_pixel(4, 2, Rgba([0, 255, 0, 255]))
            .save_with_format(&path, image::ImageFormat::Png)
            .unwrap();
        let sequence = Arc::new(SpriteSheetSequence::from_delays(name, 2, &[10, 10]));
        sequence.attach_sprite(ImageResource::load(&path, LoadStrategy::HotLoad).unwrap());
        sequence
    }

    #[test]
    fn test_stale_snapshot_does_not_reload_released_atlas() {
        let dir = tempdir().unwrap();
        let first = hot_load_sequence(dir.path(), "first");
        let second = hot_load_sequence(dir.path(), "second");
        let mut player = SpriteSheetPlayer::new();

        player.play(Arc::clone(&first), true);
        first.sprite().unwrap().instance().unwrap();
        let stale = FrameSnapshot {
            sequence: Arc::clone(&first),
            index: 1,
        };
        player.play(Arc::clone(&second), true);
        assert!(!first.sprite().unwrap().is_loaded());

        let mut surface = LogSurface::new((2, 2));
        let mut renderer = Renderer::new();
        assert!(renderer.render(&mut surface, &stale).unwrap());
        assert!(!first.sprite().unwrap().is_loaded());
        assert!(!second.sprite().unwrap().is_loaded());
    }

    #[test]
    fn test_log_surface_tracks_sequence_identity() {
        let mut surface = LogSurface::new((2, 2));
        let mut renderer = Renderer::new();
        let start = sequence();
        let end = sequence();
        assert_eq!(start.name(), end.name());

        renderer
            .render(&mut surface, &FrameSnapshot { sequence: Arc::clone(&start), index: 0 })
            .unwrap();
        assert!(Arc::ptr_eq(surface.current().unwrap(), &start));
        renderer
            .render(&mut surface, &FrameSnapshot { sequence: Arc::clone(&end), index: 0 })
            .unwrap();
        assert!(Arc::ptr_eq(surface.current().unwrap(), &end));
        assert_eq!(surface.presented(), 2);
    }

    #[test]
    fn test_png_dump_replaces_spaces_in_names() {
        let dir = tempdir().unwrap();
        let mut surface = PngDumpSurface::new(dir.path(), (2, 2));
        let named = Arc::new(SpriteSheetSequence::from_delays("rise TouchHead Happy A", 2, &[10]));
        named.attach_sprite(ImageResource::from_image(RgbaImage::new(2, 2)));
        Renderer::new()
            .render(&mut surface, &FrameSnapshot { sequence: named, index: 0 })
            .unwrap();
        assert!(dir.path().join("00000_rise_TouchHead_Happy_A_0.png").exists());
    }

    #[test]
    fn test_log_surface_counts() {
        let mut surface = LogSurface::new((2, 2));
        let mut renderer = Renderer::new();
        let snapshot = FrameSnapshot {
            sequence: sequence(),
            index: 1,
        };
        renderer.render(&mut surface, &snapshot).unwrap();
        assert_eq!(surface.presented(), 1);
    }
}
