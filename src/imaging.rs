//! Decoding and orientation helpers shared by the loader and the local backend.

use std::io::Cursor;

use image::DynamicImage;
use image::imageops::FilterType;
use tracing::debug;

use crate::platform::{ContentMode, Orientation, Size};

/// Decode encoded image bytes and rotate them upright.
///
/// Returns `None` for bytes the `image` crate cannot decode.
pub fn decode_oriented(bytes: &[u8], orientation: Orientation) -> Option<DynamicImage> {
    match image::load_from_memory(bytes) {
        Ok(img) => Some(apply_orientation(img, orientation)),
        Err(err) => {
            debug!(%err, len = bytes.len(), "image data not decodable");
            None
        }
    }
}

/// Read the EXIF orientation tag from encoded bytes, if present.
pub fn read_orientation(bytes: &[u8]) -> Orientation {
    let mut cursor = Cursor::new(bytes);
    let Ok(exif) = exif::Reader::new().read_from_container(&mut cursor) else {
        return Orientation::Up;
    };
    exif.get_field(exif::Tag::Orientation, exif::In::PRIMARY)
        .and_then(|field| field.value.get_uint(0))
        .map(|v| Orientation::from_exif(v as u16))
        .unwrap_or_default()
}

pub fn apply_orientation(img: DynamicImage, orientation: Orientation) -> DynamicImage {
    match orientation {
        Orientation::Up => img,
        Orientation::UpMirrored => img.fliph(),
        Orientation::Down => img.rotate180(),
        Orientation::DownMirrored => img.flipv(),
        // transpose
        Orientation::LeftMirrored => img.rotate90().fliph(),
        Orientation::Right => img.rotate90(),
        // transverse
        Orientation::RightMirrored => img.rotate270().fliph(),
        Orientation::Left => img.rotate270(),
    }
}

/// Scale `img` for a request of `target` pixels.
///
/// Fill crops to exactly the target; fit keeps the whole image inside it.
pub fn render_for_target(img: &DynamicImage, target: Size, mode: ContentMode) -> DynamicImage {
    let (width, height) = target_pixels(target);
    match mode {
        ContentMode::AspectFill => img.resize_to_fill(width, height, FilterType::Triangle),
        ContentMode::AspectFit => img.resize(width, height, FilterType::Triangle),
    }
}

/// Cheap preview at a quarter of the target, never below one pixel.
pub fn render_preview(img: &DynamicImage, target: Size, mode: ContentMode) -> DynamicImage {
    let quarter = Size::new(target.width / 4.0, target.height / 4.0);
    let (width, height) = target_pixels(quarter);
    match mode {
        ContentMode::AspectFill => img.resize_to_fill(width, height, FilterType::Nearest),
        ContentMode::AspectFit => img.thumbnail(width, height),
    }
}

fn target_pixels(size: Size) -> (u32, u32) {
    let clamp = |v: f64| v.round().clamp(1.0, f64::from(u32::MAX)) as u32;
    (clamp(size.width), clamp(size.height))
}
