//! Decoding raw benchmark files into fixed-shape byte tensors.

use crate::tensor::ChwTensor;
use crate::types::{DatasetResult, MvtecError};
use image::imageops::FilterType;
use image::{ImageBuffer, Rgb, RgbImage};
use std::path::Path;

/// Load one image or mask file, force it to 3-channel color, and repack it as
/// a (3, H, W) byte tensor. With a `target` of (height, width) the image is
/// resized to exactly that shape; without one its native size is preserved.
pub fn load_image_tensor(path: &Path, target: Option<(u32, u32)>) -> DatasetResult<ChwTensor> {
    let img = image::open(path)
        .map_err(|e| MvtecError::Image {
            path: path.to_path_buf(),
            source: e,
        })?
        .to_rgb8();
    Ok(image_to_tensor(&img, target))
}

/// Repack a decoded color image into CHW bytes, resizing first if a target
/// shape is given. Resizing interpolates bilinearly over float pixel values
/// and truncates back to the byte range.
pub fn image_to_tensor(img: &RgbImage, target: Option<(u32, u32)>) -> ChwTensor {
    match target {
        None => rgb_to_chw(img),
        Some((height, width)) if (height, width) == (img.height(), img.width()) => {
            rgb_to_chw(img)
        }
        Some((height, width)) => {
            let floats: ImageBuffer<Rgb<f32>, Vec<f32>> =
                ImageBuffer::from_fn(img.width(), img.height(), |x, y| {
                    let p = img.get_pixel(x, y);
                    Rgb([p[0] as f32, p[1] as f32, p[2] as f32])
                });
            let resized = image::imageops::resize(&floats, width, height, FilterType::Triangle);
            let (w, h) = (resized.width(), resized.height());
            let mut data = Vec::with_capacity(3 * w as usize * h as usize);
            for c in 0..3 {
                for y in 0..h {
                    for x in 0..w {
                        data.push(resized.get_pixel(x, y)[c] as u8);
                    }
                }
            }
            ChwTensor::from_bytes(3, h, w, data)
        }
    }
}

fn rgb_to_chw(img: &RgbImage) -> ChwTensor {
    let (w, h) = (img.width(), img.height());
    let mut data = Vec::with_capacity(3 * w as usize * h as usize);
    for c in 0..3 {
        for y in 0..h {
            for x in 0..w {
                data.push(img.get_pixel(x, y)[c]);
            }
        }
    }
    ChwTensor::from_bytes(3, h, w, data)
}

/// Derive the ground-truth mask filename paired with an image filename:
/// `003.png` maps to `003_mask.png`.
pub fn mask_name_for(img_name: &str) -> String {
    match img_name.rsplit_once('.') {
        Some((stem, ext)) => format!("{stem}_mask.{ext}"),
        None => format!("{img_name}_mask"),
    }
}
