//! Rendering stacked samples into an image-grid file.

use crate::tensor::{ChwTensor, TensorData};
use crate::types::{DatasetResult, MvtecError};
use image::RgbImage;
use std::path::Path;

/// Tile a stack of CHW byte tensors into one grid image and write it to
/// `path`. Tensors must share one spatial shape; 1-channel maps are expanded
/// to r=g=b. With `normalize`, each tile is min-max stretched to the full
/// byte range on its own.
pub fn render_grid(
    images: &[ChwTensor],
    path: &Path,
    tiles_per_row: usize,
    normalize: bool,
) -> DatasetResult<()> {
    if images.is_empty() || tiles_per_row == 0 {
        return Err(MvtecError::Precondition(
            "render_grid needs at least one image and a positive tile count".to_string(),
        ));
    }
    let (height, width) = (images[0].height(), images[0].width());
    let rows = images.len().div_ceil(tiles_per_row);
    let mut canvas = RgbImage::new(width * tiles_per_row as u32, height * rows as u32);

    for (i, tensor) in images.iter().enumerate() {
        if tensor.height() != height || tensor.width() != width {
            return Err(MvtecError::Other(
                "render_grid requires equally sized tiles".to_string(),
            ));
        }
        let tile = match tensor.channels() {
            3 => tensor.clone(),
            1 => tensor.expand_to_rgb()?,
            c => {
                return Err(MvtecError::Other(format!(
                    "render_grid expects 1- or 3-channel tiles, got {c}"
                )));
            }
        };
        let bytes = tile_bytes(&tile, normalize)?;
        let plane = height as usize * width as usize;
        let (x0, y0) = (
            (i % tiles_per_row) as u32 * width,
            (i / tiles_per_row) as u32 * height,
        );
        for y in 0..height {
            for x in 0..width {
                let at = y as usize * width as usize + x as usize;
                canvas.put_pixel(
                    x0 + x,
                    y0 + y,
                    image::Rgb([bytes[at], bytes[plane + at], bytes[2 * plane + at]]),
                );
            }
        }
    }

    canvas.save(path).map_err(|e| MvtecError::Image {
        path: path.to_path_buf(),
        source: e,
    })
}

fn tile_bytes(tile: &ChwTensor, normalize: bool) -> DatasetResult<Vec<u8>> {
    let bytes = match tile.data() {
        TensorData::U8(b) => b.clone(),
        TensorData::F32(_) => {
            return Err(MvtecError::Other(
                "render_grid requires byte tensors".to_string(),
            ));
        }
    };
    if !normalize {
        return Ok(bytes);
    }
    let min = bytes.iter().copied().min().unwrap_or(0);
    let max = bytes.iter().copied().max().unwrap_or(0);
    if max == min {
        return Ok(bytes);
    }
    let range = (max - min) as u32;
    Ok(bytes
        .iter()
        .map(|b| ((*b - min) as u32 * 255 / range) as u8)
        .collect())
}
