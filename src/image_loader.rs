use crate::coords::Size;
use crate::error::ClientError;
use egui::ColorImage;
use image::{DynamicImage, ImageFormat};

/// A decoded raw image ready for texture upload.
///
/// `natural_size` is the size of the encoded image. The pixels may have been
/// downscaled for the GPU; box geometry always refers to the natural size.
pub struct LoadedImage {
    pub image: ColorImage,
    pub natural_size: Size,
}

pub fn decode_image(bytes: &[u8], max_dimension: Option<u32>) -> Result<LoadedImage, ClientError> {
    let format = image::guess_format(bytes)
        .map_err(|err| ClientError::Decode(format!("Failed to determine format: {err}")))?;
    decode_with_format(bytes, format, max_dimension)
}

fn decode_with_format(
    bytes: &[u8],
    format: ImageFormat,
    max_dimension: Option<u32>,
) -> Result<LoadedImage, ClientError> {
    let mut image = image::load_from_memory_with_format(bytes, format)
        .map_err(|err| ClientError::Decode(format!("Failed to decode image: {err}")))?;
    let natural_size = Size::new(image.width() as f32, image.height() as f32);

    if let Some(max_dim) = max_dimension {
        let (w, h) = (image.width(), image.height());
        if w > max_dim || h > max_dim {
            let scale = (max_dim as f32) / (w.max(h) as f32);
            let new_w = ((w as f32 * scale) as u32).max(1);
            let new_h = ((h as f32 * scale) as u32).max(1);
            log::debug!("Downscaling {w}x{h} image to {new_w}x{new_h} for display");
            image = image.thumbnail(new_w, new_h);
        }
    }

    Ok(LoadedImage {
        image: color_image_from_dynamic(image),
        natural_size,
    })
}

fn color_image_from_dynamic(image: DynamicImage) -> ColorImage {
    let rgba = image.to_rgba8();
    let size = [rgba.width() as usize, rgba.height() as usize];
    ColorImage::from_rgba_unmultiplied(size, &rgba.into_raw())
}
