//! Burn-compatible batch assembly over the live dataset view.

use crate::store::{MvtecDataset, Sample};
use crate::types::{DatasetResult, MvtecError};
use burn::tensor::backend::Backend;
use burn::tensor::{Int, Tensor};

pub struct MvtecBatch<B: Backend> {
    /// (n, 3, h, w) images scaled to [0, 1].
    pub images: Tensor<B, 4>,
    pub labels: Tensor<B, 1, Int>,
    /// (n, h, w) ground-truth maps scaled to [0, 1].
    pub gt_maps: Tensor<B, 3>,
}

impl MvtecDataset {
    /// Assemble the given sample indices into device tensors. All retrieved
    /// samples must share one spatial shape.
    pub fn assemble_batch<B: Backend>(
        &self,
        indices: &[usize],
        device: &B::Device,
    ) -> DatasetResult<MvtecBatch<B>> {
        let mut images_buf: Vec<f32> = Vec::new();
        let mut maps_buf: Vec<f32> = Vec::new();
        let mut labels_buf: Vec<i32> = Vec::new();
        let mut expected: Option<(u32, u32)> = None;

        for &index in indices {
            let sample = self.get(index)?;
            let dims = sample.image.dimensions();
            match expected {
                None => expected = Some(dims),
                Some(sz) if sz != dims => {
                    return Err(MvtecError::Other(
                        "batch contains varying image sizes; transforms must produce a consistent shape"
                            .to_string(),
                    ));
                }
                _ => {}
            }
            let (w, h) = dims;
            for c in 0..3 {
                for y in 0..h {
                    for x in 0..w {
                        images_buf.push(sample.image.get_pixel(x, y)[c] as f32 / 255.0);
                    }
                }
            }
            for y in 0..h {
                for x in 0..w {
                    maps_buf.push(sample.gt.get_pixel(x, y)[0] as f32 / 255.0);
                }
            }
            labels_buf.push(sample.label);
        }

        let (w, h) = expected.ok_or_else(|| {
            MvtecError::Precondition("assemble_batch needs at least one index".to_string())
        })?;
        let n = indices.len();
        let images = Tensor::<B, 1>::from_floats(images_buf.as_slice(), device)
            .reshape([n, 3, h as usize, w as usize]);
        let gt_maps = Tensor::<B, 1>::from_floats(maps_buf.as_slice(), device)
            .reshape([n, h as usize, w as usize]);
        let labels = Tensor::<B, 1, Int>::from_ints(labels_buf.as_slice(), device);
        Ok(MvtecBatch {
            images,
            labels,
            gt_maps,
        })
    }
}

impl burn::data::dataset::Dataset<Sample> for MvtecDataset {
    fn get(&self, index: usize) -> Option<Sample> {
        MvtecDataset::get(self, index).ok()
    }

    fn len(&self) -> usize {
        MvtecDataset::len(self)
    }
}
