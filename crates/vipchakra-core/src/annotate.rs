//! Face box annotation and the hex JPEG preview.

use crate::types::PixelBox;
use ab_glyph::{FontArc, PxScale};
use font8x8::{UnicodeFonts, BASIC_FONTS};
use image::codecs::jpeg::JpegEncoder;
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;
use std::io::Cursor;
use std::path::Path;
use thiserror::Error;

pub const JPEG_QUALITY: u8 = 90;
pub const PREVIEW_CHARS: usize = 200;

const BOX_COLOUR: Rgb<u8> = Rgb([0, 255, 0]);
const BOX_THICKNESS: u32 = 2;
const LABEL_SCALE: f32 = 18.0;
const LABEL_GAP: i32 = 4;
/// Each 8x8 bitmap glyph cell is drawn as a 2x2 block.
const BITMAP_PIXEL: i32 = 2;
const BITMAP_CELL: i32 = 8 * BITMAP_PIXEL;

#[derive(Error, Debug)]
pub enum AnnotateError {
    #[error("JPEG encoding failed: {0}")]
    Encode(#[from] image::ImageError),
    #[error("failed to read font {path}: {source}")]
    FontIo {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid font {0}")]
    InvalidFont(String),
}

/// Load a TrueType/OpenType font for label rendering.
pub fn load_font(path: &Path) -> Result<FontArc, AnnotateError> {
    let bytes = std::fs::read(path).map_err(|source| AnnotateError::FontIo {
        path: path.display().to_string(),
        source,
    })?;
    FontArc::try_from_vec(bytes).map_err(|_| AnnotateError::InvalidFont(path.display().to_string()))
}

/// How labels are rendered next to face boxes.
#[derive(Clone, Default)]
pub enum LabelFont {
    /// Built-in 8x8 bitmap glyphs (basic Latin).
    #[default]
    Bitmap,
    /// A TrueType/OpenType font loaded with [`load_font`].
    Outline(FontArc),
}

impl LabelFont {
    fn draw(&self, canvas: &mut RgbImage, bbox: PixelBox, label: &str) {
        match self {
            LabelFont::Bitmap => {
                let y = (bbox.y1 - BITMAP_CELL - LABEL_GAP).max(0);
                draw_bitmap_text(canvas, bbox.x1, y, label);
            }
            LabelFont::Outline(font) => {
                let y = (bbox.y1 - LABEL_SCALE as i32 - LABEL_GAP).max(0);
                draw_text_mut(canvas, BOX_COLOUR, bbox.x1, y, PxScale::from(LABEL_SCALE), font, label);
            }
        }
    }
}

/// One box to draw, with the text shown next to it.
#[derive(Debug, Clone, PartialEq)]
pub struct Annotation {
    pub bbox: PixelBox,
    pub label: String,
}

/// Drawing instructions collected during analysis and applied in one pass.
#[derive(Debug, Clone, Default)]
pub struct AnnotationPlan {
    annotations: Vec<Annotation>,
}

impl AnnotationPlan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, bbox: PixelBox, label: impl Into<String>) {
        self.annotations.push(Annotation {
            bbox,
            label: label.into(),
        });
    }

    pub fn len(&self) -> usize {
        self.annotations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.annotations.is_empty()
    }

    /// Draw every annotation onto a copy of `base`, each label above its box.
    pub fn apply(&self, base: &RgbImage, font: &LabelFont) -> RgbImage {
        let mut canvas = base.clone();
        for annotation in &self.annotations {
            draw_box(&mut canvas, annotation.bbox);
            font.draw(&mut canvas, annotation.bbox, &annotation.label);
        }
        canvas
    }
}

fn draw_box(canvas: &mut RgbImage, bbox: PixelBox) {
    for inset in 0..BOX_THICKNESS as i32 {
        let width = bbox.x2 - bbox.x1 - 2 * inset;
        let height = bbox.y2 - bbox.y1 - 2 * inset;
        if width <= 0 || height <= 0 {
            break;
        }
        let rect = Rect::at(bbox.x1 + inset, bbox.y1 + inset).of_size(width as u32, height as u32);
        draw_hollow_rect_mut(canvas, rect, BOX_COLOUR);
    }
}

/// Characters outside basic Latin are drawn as `?`. Pixels off the canvas are clipped.
fn draw_bitmap_text(canvas: &mut RgbImage, x: i32, y: i32, text: &str) {
    let (width, height) = (canvas.width() as i32, canvas.height() as i32);
    for (i, c) in text.chars().enumerate() {
        let Some(glyph) = BASIC_FONTS.get(c).or_else(|| BASIC_FONTS.get('?')) else {
            continue;
        };
        let cell_x = x + i as i32 * BITMAP_CELL;
        if cell_x >= width {
            break;
        }
        for (row, bits) in glyph.into_iter().enumerate() {
            for col in 0..8 {
                if bits & (1u8 << col) == 0 {
                    continue;
                }
                let px = cell_x + col * BITMAP_PIXEL;
                let py = y + row as i32 * BITMAP_PIXEL;
                for dy in 0..BITMAP_PIXEL {
                    for dx in 0..BITMAP_PIXEL {
                        let (tx, ty) = (px + dx, py + dy);
                        if (0..width).contains(&tx) && (0..height).contains(&ty) {
                            canvas.put_pixel(tx as u32, ty as u32, BOX_COLOUR);
                        }
                    }
                }
            }
        }
    }
}

/// Encode `image` as a JPEG.
pub fn encode_jpeg(image: &RgbImage) -> Result<Vec<u8>, AnnotateError> {
    let mut buf = Cursor::new(Vec::new());
    let encoder = JpegEncoder::new_with_quality(&mut buf, JPEG_QUALITY);
    image.write_with_encoder(encoder)?;
    Ok(buf.into_inner())
}

/// Hex encoding of the JPEG of `image`, cut to at most `chars` characters.
pub fn encode_preview(image: &RgbImage, chars: usize) -> Result<String, AnnotateError> {
    let mut hex = hex::encode(encode_jpeg(image)?);
    hex.truncate(chars);
    Ok(hex)
}
