//! Image checks and the crop/resize step.

use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView};

use super::{ALLOWED_CONTENT_TYPES, CapturedImage, MAX_IMAGE_BYTES};
use crate::error::ImageError;

const JPEG_QUALITY: u8 = 90;

/// Check content type and size before anything else touches the bytes.
pub fn validate_image(image: &CapturedImage) -> Result<(), ImageError> {
    if image.is_empty() {
        return Err(ImageError::Empty);
    }
    if !ALLOWED_CONTENT_TYPES.contains(&image.content_type.as_str()) {
        return Err(ImageError::UnsupportedType {
            content_type: image.content_type.clone(),
        });
    }
    if image.len() > MAX_IMAGE_BYTES {
        return Err(ImageError::TooLarge {
            size: image.len(),
            max: MAX_IMAGE_BYTES,
        });
    }
    Ok(())
}

/// Largest centered square inside the image.
pub fn crop_to_square(img: &DynamicImage) -> DynamicImage {
    let (width, height) = img.dimensions();
    let size = width.min(height);
    let x = (width - size) / 2;
    let y = (height - size) / 2;
    img.crop_imm(x, y, size, size)
}

/// Validate, center-crop, resize to `target` x `target` and re-encode as JPEG.
///
/// CPU-bound; async callers should run it on a blocking thread.
pub fn prepare_profile_image(
    image: &CapturedImage,
    target: u32,
) -> Result<CapturedImage, ImageError> {
    validate_image(image)?;
    let decoded =
        image::load_from_memory(&image.bytes).map_err(|e| ImageError::Decode(e.to_string()))?;
    let square = crop_to_square(&decoded);
    let resized = square.resize_exact(target, target, FilterType::Lanczos3);
    let rgb = DynamicImage::ImageRgb8(resized.to_rgb8());

    let mut out = Cursor::new(Vec::new());
    rgb.write_with_encoder(JpegEncoder::new_with_quality(&mut out, JPEG_QUALITY))
        .map_err(|e| ImageError::Encode(e.to_string()))?;
    Ok(CapturedImage::new(out.into_inner(), "image/jpeg"))
}
