//! Sprite sheet packing - combines square frames into a horizontal atlas
//!
//! Frames are rescaled to a fixed cell size and laid out left to right in
//! append order, so frame `i` always occupies `[i * cell, (i + 1) * cell)`
//! horizontally and the full height of the atlas.

use std::io::{Read, Write};

use image::codecs::png::PngEncoder;
use image::imageops::{self, FilterType};
use image::{ColorType, ImageEncoder, RgbaImage};

use super::SheetError;

const BYTES_PER_PIXEL: usize = 4;

/// Row alignment of the packing buffer, in bytes.
const ATLAS_ROW_ALIGNMENT: usize = 16;

/// Accumulates frames and packs them into one atlas image.
///
/// # Example
///
/// ```
/// use deskpet::sheet::SpriteSheetBuilder;
/// use image::{Rgba, RgbaImage};
///
/// let mut builder = SpriteSheetBuilder::new(4).unwrap();
/// builder.append(&RgbaImage::from_pixel(8, 8, Rgba([255, 0, 0, 255]))).unwrap();
/// builder.append(&RgbaImage::from_pixel(4, 4, Rgba([0, 255, 0, 255]))).unwrap();
///
/// let atlas = builder.pack().unwrap();
/// assert_eq!(atlas.dimensions(), (8, 4));
/// ```
pub struct SpriteSheetBuilder {
    cell_size: u32,
    filter: FilterType,
    frames: Vec<RgbaImage>,
}

impl SpriteSheetBuilder {
    /// Create a builder for `cell_size` square cells.
    pub fn new(cell_size: u32) -> Result<Self, SheetError> {
        if cell_size == 0 {
            return Err(SheetError::InvalidCellSize);
        }
        Ok(Self {
            cell_size,
            filter: FilterType::Triangle,
            frames: Vec::new(),
        })
    }

    /// Resampling filter used when a frame is not already `cell_size`.
    pub fn with_filter(mut self, filter: FilterType) -> Self {
        self.filter = filter;
        self
    }

    pub fn cell_size(&self) -> u32 {
        self.cell_size
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    /// Pixel dimensions of the atlas [`pack`](Self::pack) would produce.
    pub fn atlas_size(&self) -> (u32, u32) {
        (self.frames.len() as u32 * self.cell_size, self.cell_size)
    }

    /// Decode one encoded frame from `reader` and buffer it.
    pub fn append_reader<R: Read>(&mut self, mut reader: R) -> Result<(), SheetError> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        let decoded = image::load_from_memory(&bytes)?;
        self.append(&decoded.to_rgba8())
    }

    /// Buffer a decoded frame, rescaling it to the cell size.
    ///
    /// Frames must be square.
    pub fn append(&mut self, frame: &RgbaImage) -> Result<(), SheetError> {
        let (width, height) = frame.dimensions();
        if width != height {
            return Err(SheetError::NonSquareFrame { width, height });
        }
        let cell = if width == self.cell_size {
            frame.clone()
        } else {
            imageops::resize(frame, self.cell_size, self.cell_size, self.filter)
        };
        self.frames.push(cell);
        Ok(())
    }

    /// Pack every buffered frame into one atlas.
    pub fn pack(&self) -> Result<RgbaImage, SheetError> {
        if self.frames.is_empty() {
            return Err(SheetError::Empty);
        }
        let (width, height) = self.atlas_size();
        let mut buffer = AtlasBuffer::new(width, height, ATLAS_ROW_ALIGNMENT);
        for (i, frame) in self.frames.iter().enumerate() {
            buffer.blit_cell(i, frame);
        }
        buffer.into_image().ok_or(SheetError::Empty)
    }

    /// Pack and write the atlas as PNG.
    pub fn save_to<W: Write>(&self, writer: W) -> Result<(), SheetError> {
        let atlas = self.pack()?;
        PngEncoder::new(writer).write_image(
            atlas.as_raw(),
            atlas.width(),
            atlas.height(),
            ColorType::Rgba8,
        )?;
        Ok(())
    }

    /// Release every buffered frame.
    pub fn clear(&mut self) {
        self.frames.clear();
        self.frames.shrink_to_fit();
    }
}

/// Writable RGBA buffer whose row stride may exceed `width * 4`.
struct AtlasBuffer {
    width: u32,
    height: u32,
    stride: usize,
    data: Vec<u8>,
}

impl AtlasBuffer {
    fn new(width: u32, height: u32, row_alignment: usize) -> Self {
        let row_bytes = width as usize * BYTES_PER_PIXEL;
        let align = row_alignment.max(1);
        let stride = row_bytes.div_ceil(align) * align;
        Self {
            width,
            height,
            stride,
            data: vec![0; stride * height as usize],
        }
    }

    /// Copy `frame` into horizontal cell `index`, row by row.
    fn blit_cell(&mut self, index: usize, frame: &RgbaImage) {
        let src = frame.as_raw();
        let src_stride = frame.width() as usize * BYTES_PER_PIXEL;
        let offset = index * src_stride;
        let rows = (frame.height() as usize).min(self.height as usize);
        for y in 0..rows {
            let dst = y * self.stride + offset;
            let src_row = y * src_stride;
            self.data[dst..dst + src_stride].copy_from_slice(&src[src_row..src_row + src_stride]);
        }
    }

    fn into_image(self) -> Option<RgbaImage> {
        let row_bytes = self.width as usize * BYTES_PER_PIXEL;
        if self.stride == row_bytes {
            return RgbaImage::from_raw(self.width, self.height, self.data);
        }
        let mut tight = Vec::with_capacity(row_bytes * self.height as usize);
        for row in self.data.chunks_exact(self.stride) {
            tight.extend_from_slice(&row[..row_bytes]);
        }
        RgbaImage::from_raw(self.width, self.height, tight)
    }
}
