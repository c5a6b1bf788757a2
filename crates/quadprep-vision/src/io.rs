// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Image loading and saving at the pipeline boundary. Decoding failures are
// reported as `ImageLoad` so the pipeline never receives a missing image.

use std::path::Path;

use image::{DynamicImage, ImageFormat};
use quadprep_core::error::{QuadprepError, Result};
use tracing::{debug, info, instrument};

/// Load an image from a file path.
#[instrument(skip_all, fields(path = %path.as_ref().display()))]
pub fn load_image(path: impl AsRef<Path>) -> Result<DynamicImage> {
    let img = image::open(path.as_ref()).map_err(|err| {
        QuadprepError::ImageLoad(format!("failed to open {}: {}", path.as_ref().display(), err))
    })?;
    info!(width = img.width(), height = img.height(), "Image loaded");
    Ok(img)
}

/// Decode an image from raw encoded bytes (JPEG, PNG, TIFF, etc.).
#[instrument(skip(data), fields(data_len = data.len()))]
pub fn decode_image(data: &[u8]) -> Result<DynamicImage> {
    let img = image::load_from_memory(data)
        .map_err(|err| QuadprepError::ImageLoad(format!("failed to decode image: {}", err)))?;
    debug!(width = img.width(), height = img.height(), "Image decoded from bytes");
    Ok(img)
}

/// Write an image to a file. The format is inferred from the extension;
/// JPEG outputs use `jpeg_quality` (1-100).
#[instrument(skip(image), fields(path = %path.as_ref().display()))]
pub fn save_image(image: &DynamicImage, path: impl AsRef<Path>, jpeg_quality: u8) -> Result<()> {
    let path = path.as_ref();
    let format = ImageFormat::from_path(path).map_err(|err| {
        QuadprepError::ImageSave(format!("unsupported output {}: {}", path.display(), err))
    })?;

    if format == ImageFormat::Jpeg {
        let file = std::fs::File::create(path)?;
        let mut writer = std::io::BufWriter::new(file);
        let encoder =
            image::codecs::jpeg::JpegEncoder::new_with_quality(&mut writer, jpeg_quality.clamp(1, 100));
        image.to_rgb8().write_with_encoder(encoder).map_err(|err| {
            QuadprepError::ImageSave(format!("JPEG encoding failed for {}: {}", path.display(), err))
        })?;
        return Ok(());
    }

    image.save_with_format(path, format).map_err(|err| {
        QuadprepError::ImageSave(format!("failed to save image to {}: {}", path.display(), err))
    })
}

/// Encode an image as PNG bytes.
pub fn encode_png(image: &DynamicImage) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    let mut cursor = std::io::Cursor::new(&mut buffer);
    image
        .write_to(&mut cursor, ImageFormat::Png)
        .map_err(|err| QuadprepError::ImageSave(format!("PNG encoding failed: {}", err)))?;
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};

    #[test]
    fn missing_file_is_a_load_error() {
        let err = load_image("/definitely/not/here.png").unwrap_err();
        assert!(matches!(err, QuadprepError::ImageLoad(_)));
    }

    #[test]
    fn garbage_bytes_are_a_load_error() {
        let err = decode_image(b"not an image").unwrap_err();
        assert!(matches!(err, QuadprepError::ImageLoad(_)));
    }

    #[test]
    fn png_round_trip_preserves_pixels() {
        let img = DynamicImage::ImageLuma8(GrayImage::from_fn(16, 9, |x, y| Luma([(x * 10 + y) as u8])));
        let bytes = encode_png(&img).expect("encode");
        let back = decode_image(&bytes).expect("decode");
        assert_eq!(back.to_luma8(), img.to_luma8());
    }

    #[test]
    fn jpeg_save_writes_a_readable_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("out.jpg");
        let img = DynamicImage::ImageLuma8(GrayImage::from_pixel(32, 32, Luma([128u8])));
        save_image(&img, &path, 85).expect("save");
        let back = load_image(&path).expect("load");
        assert_eq!((back.width(), back.height()), (32, 32));
    }
}
