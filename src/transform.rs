//! Externally supplied transform hooks applied during sample retrieval.
//!
//! Augmentation policy lives in the consuming pipeline; this crate only fixes
//! where each hook runs in the retrieval sequence.

use crate::tensor::ChwTensor;
use image::{GrayImage, RgbImage};

/// Joint transform over (image, ground-truth map, label), applied on raw
/// tensors before conversion to displayable form. May return float payloads;
/// outputs are re-encoded to bytes afterwards.
pub type JointTransform =
    Box<dyn Fn(ChwTensor, ChwTensor, i32) -> (ChwTensor, ChwTensor, i32) + Send + Sync>;

/// Paired transform over the displayable (image, map) forms.
pub type ImageGtTransform = Box<dyn Fn(RgbImage, GrayImage) -> (RgbImage, GrayImage) + Send + Sync>;

/// Final image-only transform.
pub type ImageTransform = Box<dyn Fn(RgbImage) -> RgbImage + Send + Sync>;

/// Label transform, applied once per retrieval.
pub type TargetTransform = Box<dyn Fn(i32) -> i32 + Send + Sync>;

#[derive(Default)]
pub struct Transforms {
    pub all_transform: Option<JointTransform>,
    pub img_gt_transform: Option<ImageGtTransform>,
    pub transform: Option<ImageTransform>,
    pub target_transform: Option<TargetTransform>,
}
