//! MVTec-AD dataset preparation and access for anomaly-detection pipelines.
//!
//! This crate provides utilities for:
//! - One-time conversion of the raw benchmark tree into a cached tensor archive
//! - Indexed retrieval of (image, label, ground-truth map) samples with
//!   externally supplied transforms and label-polarity re-encoding
//! - Archive download and generic compressed-file extraction
//! - Sample-grid rendering

pub mod archive;
pub mod builder;
pub mod fetch;
pub mod grid;
pub mod raw;
pub mod store;
pub mod tensor;
pub mod transform;
pub mod types;

#[cfg(feature = "burn-runtime")]
pub mod batch;

pub use archive::CachedArchive;
pub use builder::{build_from_tree, ensure_cache};
pub use fetch::{extract, fetch_and_extract};
pub use grid::render_grid;
pub use store::{DatasetConfig, MvtecDataset, Sample};
pub use tensor::{ChwTensor, GtMapStack, TensorData, TensorStack};
pub use transform::Transforms;
pub use types::{
    CacheKey, DatasetResult, MvtecError, RawSource, Split, CLASSES, MVTEC_URL,
    NORMAL_ANOMALY_LABEL, NORMAL_ANOMALY_LABEL_IDX,
};

#[cfg(feature = "burn-runtime")]
pub use batch::MvtecBatch;
