//! Perceptual hash for near-duplicate image detection.
//!
//! DCT mean hash (pHash) over an 8×8 bit grid, rendered as 16 hex characters.

use image::RgbImage;
use img_hash::{HashAlg, HasherConfig};
use thiserror::Error;

const HASH_BITS_SIDE: u32 = 8;
const THUMBNAIL_SIDE: u32 = 256;

#[derive(Error, Debug)]
pub enum PhashError {
    #[error("failed to convert {0}x{1} image for hashing")]
    Conversion(u32, u32),
}

/// Perceptual hash of `image` as lowercase hex.
pub fn perceptual_hash(image: &RgbImage) -> Result<String, PhashError> {
    // Hashing only looks at a tiny DCT grid; shrink large inputs first.
    let thumbnail = if image.width() > THUMBNAIL_SIDE || image.height() > THUMBNAIL_SIDE {
        image::DynamicImage::ImageRgb8(image.clone())
            .thumbnail(THUMBNAIL_SIDE, THUMBNAIL_SIDE)
            .to_rgb8()
    } else {
        image.clone()
    };
    let (width, height) = thumbnail.dimensions();

    // img_hash links its own `image` release; hand it the raw pixels.
    let hash_input = img_hash::image::RgbImage::from_raw(width, height, thumbnail.into_raw())
        .ok_or(PhashError::Conversion(width, height))?;

    let hasher = HasherConfig::new()
        .hash_size(HASH_BITS_SIDE, HASH_BITS_SIDE)
        .hash_alg(HashAlg::Mean)
        .preproc_dct()
        .to_hasher();
    let hash = hasher.hash_image(&img_hash::image::DynamicImage::ImageRgb8(hash_input));

    Ok(hex::encode(hash.as_bytes()))
}
