//! Image decoding for texture loads.

use std::path::Path;

use image::DynamicImage;

use crate::error::{RhiError, RhiResult};
use crate::types::ImageFormat;

use super::desc::RawImageData;

fn decode_error(source: &str, err: impl std::fmt::Display) -> RhiError {
    RhiError::ResourceCreationFailed(format!("failed to decode {source}: {err}"))
}

/// Convert a decoded image to RGBA8, or RGBA32F for float images.
fn to_raw(image: DynamicImage) -> RawImageData {
    let (width, height) = (image.width(), image.height());
    match image {
        DynamicImage::ImageRgb32F(_) | DynamicImage::ImageRgba32F(_) => {
            let texels = image.to_rgba32f();
            RawImageData::new_2d(
                bytemuck::cast_slice(texels.as_raw()).to_vec(),
                ImageFormat::R32G32B32A32Sfloat,
                width,
                height,
            )
        }
        _ => RawImageData::new_2d(
            image.to_rgba8().into_raw(),
            ImageFormat::R8G8B8A8Unorm,
            width,
            height,
        ),
    }
}

/// Decode an image file.
pub fn decode_file(path: &Path) -> RhiResult<RawImageData> {
    let bytes = std::fs::read(path)
        .map_err(|err| RhiError::Io(format!("{}: {err}", path.display())))?;
    let source = path.display().to_string();
    let image = match image::ImageFormat::from_path(path) {
        Ok(format) => image::load_from_memory_with_format(&bytes, format),
        Err(_) => image::load_from_memory(&bytes),
    }
    .map_err(|err| decode_error(&source, err))?;
    log::debug!("Decoded {} ({}x{})", source, image.width(), image.height());
    Ok(to_raw(image))
}

/// Decode encoded image bytes, using `extension` to pick the container.
pub fn decode_binary(data: &[u8], extension: &str) -> RhiResult<RawImageData> {
    let image = match image::ImageFormat::from_extension(extension) {
        Some(format) => image::load_from_memory_with_format(data, format),
        None => image::load_from_memory(data),
    }
    .map_err(|err| decode_error(&format!("{extension} image"), err))?;
    Ok(to_raw(image))
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use image::{ImageBuffer, Rgba};

    use super::*;

    #[test]
    fn test_decode_png() {
        let source: ImageBuffer<Rgba<u8>, Vec<u8>> =
            ImageBuffer::from_fn(4, 2, |x, y| Rgba([x as u8, y as u8, 7, 255]));
        let mut encoded = Cursor::new(Vec::new());
        source.write_to(&mut encoded, image::ImageFormat::Png).unwrap();

        let raw = decode_binary(encoded.get_ref(), "png").unwrap();
        assert_eq!(raw.format, ImageFormat::R8G8B8A8Unorm);
        assert_eq!((raw.width, raw.height), (4, 2));
        assert_eq!(&raw.data[4..8], &[1, 0, 7, 255]);
    }

    #[test]
    fn test_decode_garbage_fails() {
        assert!(decode_binary(&[1, 2, 3, 4], "png").is_err());
    }
}
