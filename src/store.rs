//! The live, indexed view over one split of the cached archive.

use crate::archive::CachedArchive;
use crate::builder;
use crate::grid;
use crate::tensor::{remap_table, ChwTensor, GtMapStack, TensorStack};
use crate::transform::Transforms;
use crate::types::{CacheKey, DatasetResult, MvtecError, RawSource, Split};
use image::{GrayImage, RgbImage};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// How many times every parallel sequence is repeated when enlargement is on.
const ENLARGE_FACTOR: usize = 10;

#[derive(Debug, Clone)]
pub struct DatasetConfig {
    /// Dataset root; caches and downloads live under `<root>/mvtec`.
    pub root: PathBuf,
    pub split: Split,
    /// Target (height, width) of the normalized cache.
    pub shape: (u32, u32),
    /// Build the cache when it is missing. With this off, a missing cache is
    /// an error.
    pub download: bool,
    /// Repeat every parallel sequence tenfold by concatenation.
    pub enlarge: bool,
    /// Class indices considered nominal by the consuming pipeline. Only used
    /// by the original-resolution ground-truth accessor.
    pub normal_classes: Vec<usize>,
    /// Raw label value denoting a nominal sample. Must be 0 or 1.
    pub nominal_label: u8,
    /// Raw label value denoting an anomalous sample. Must be 0 or 1.
    pub anomalous_label: u8,
    pub source: RawSource,
    pub verbose: bool,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("data"),
            split: Split::Train,
            shape: (300, 300),
            download: true,
            enlarge: false,
            normal_classes: Vec::new(),
            nominal_label: 0,
            anomalous_label: 1,
            source: RawSource::default(),
            verbose: true,
        }
    }
}

/// One retrieved sample in displayable form. The ground-truth map codes
/// nominal/anomalous pixels as `nominal_label * 255` / `anomalous_label * 255`.
pub struct Sample {
    pub image: RgbImage,
    pub label: i32,
    pub gt: GrayImage,
}

pub struct MvtecDataset {
    split: Split,
    root: PathBuf,
    source: RawSource,
    verbose: bool,
    data: TensorStack,
    targets: Vec<i32>,
    gt: Option<TensorStack>,
    anomaly_labels: Option<Vec<i32>>,
    anomaly_label_strings: Vec<String>,
    normal_classes: Vec<usize>,
    nominal_label: u8,
    anomalous_label: u8,
    transforms: Transforms,
    orig_gtmaps: OnceLock<GtMapStack>,
}

impl MvtecDataset {
    /// Open the view for `config.split`, building the resolution-keyed cache
    /// first if it is missing or corrupt.
    pub fn new(config: DatasetConfig, transforms: Transforms) -> DatasetResult<Self> {
        if config.nominal_label > 1
            || config.anomalous_label > 1
            || config.nominal_label == config.anomalous_label
        {
            return Err(MvtecError::InvalidPolarity {
                nominal: config.nominal_label,
                anomalous: config.anomalous_label,
            });
        }

        let (height, width) = config.shape;
        let key = CacheKey::Resized { height, width };
        if config.verbose {
            eprintln!(
                "[mvtec] loading dataset from {}...",
                key.path(&config.root).display()
            );
        }
        let archive = if config.download {
            builder::ensure_cache(&config.root, key, &config.source, config.verbose)?
        } else {
            CachedArchive::load(&key.path(&config.root))?
        };

        let (mut data, mut targets, mut gt, mut anomaly_labels) = match config.split {
            Split::Train => (archive.train_data, archive.train_labels, None, None),
            Split::Test | Split::TestAnomalyLabelTarget => (
                archive.test_data,
                archive.test_labels,
                Some(archive.test_maps),
                Some(archive.test_anomaly_labels),
            ),
        };

        if config.enlarge {
            data = data.repeated(ENLARGE_FACTOR);
            targets = repeat_vec(&targets, ENLARGE_FACTOR);
            gt = gt.map(|g| g.repeated(ENLARGE_FACTOR));
            anomaly_labels = anomaly_labels.map(|a| repeat_vec(&a, ENLARGE_FACTOR));
        }

        if config.nominal_label != 0 && config.verbose {
            eprintln!(
                "[mvtec] swapping labels: anomalies are {} and nominals are {}, same for ground-truth maps",
                config.anomalous_label, config.nominal_label
            );
        }

        Ok(Self {
            split: config.split,
            root: config.root,
            source: config.source,
            verbose: config.verbose,
            data,
            targets,
            gt,
            anomaly_labels,
            anomaly_label_strings: archive.anomaly_label_strings,
            normal_classes: config.normal_classes,
            nominal_label: config.nominal_label,
            anomalous_label: config.anomalous_label,
            transforms,
            orig_gtmaps: OnceLock::new(),
        })
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn split(&self) -> Split {
        self.split
    }

    /// Defect-category names indexed by id.
    pub fn anomaly_label_strings(&self) -> &[String] {
        &self.anomaly_label_strings
    }

    /// Raw (untransformed) labels, parallel to the sample sequence.
    pub fn targets(&self) -> &[i32] {
        &self.targets
    }

    /// Retrieve one (image, label, ground-truth map) triple with all
    /// configured transforms and the label-polarity re-encoding applied.
    pub fn get(&self, index: usize) -> DatasetResult<Sample> {
        let image = self.data.get(index).ok_or(MvtecError::IndexOutOfBounds {
            index,
            len: self.len(),
        })?;
        let raw_label = self.targets[index];

        let mut label = match self.split {
            Split::TestAnomalyLabelTarget => {
                let ids = self
                    .anomaly_labels
                    .as_ref()
                    .expect("test splits always carry defect-category ids");
                ids[index]
            }
            _ => raw_label,
        };
        if let Some(t) = &self.transforms.target_transform {
            label = t(label);
        }

        // Generator-synthesized train masks always use the 255 = anomalous
        // convention keyed on the raw label; the polarity re-encoding below
        // would otherwise double-invert them.
        let gt = match &self.gt {
            Some(stack) => stack.get(index).ok_or(MvtecError::IndexOutOfBounds {
                index,
                len: stack.len(),
            })?,
            None => {
                let init = if self.anomalous_label == 1 {
                    raw_label
                } else {
                    1 - raw_label
                };
                let fill = if init != 0 { 255 } else { 0 };
                ChwTensor::full(1, self.data.height(), self.data.width(), fill)
            }
        };

        let (image, gt) = match &self.transforms.all_transform {
            Some(t) => {
                let (img, gt, lbl) = t(image, gt, label);
                label = lbl;
                (img.into_byte_image(), gt.into_byte_mask())
            }
            None => (image, gt),
        };

        let mut img = image.to_rgb_image()?;
        let mut gt_img = gt.to_gray_image()?;

        if let Some(t) = &self.transforms.img_gt_transform {
            let (i, g) = t(img, gt_img);
            img = i;
            gt_img = g;
        }
        if let Some(t) = &self.transforms.transform {
            img = t(img);
        }

        if self.nominal_label != 0 {
            let table = remap_table(self.nominal_label, self.anomalous_label);
            for p in gt_img.pixels_mut() {
                p[0] = table[p[0] as usize];
            }
        }

        Ok(Sample {
            image: img,
            label,
            gt: gt_img,
        })
    }

    /// Ground-truth maps of the single configured normal class at their
    /// original resolution, as floats in [0, 1]. Builds and loads the
    /// class-keyed cache on first use and memoizes the result.
    ///
    /// Only valid on test splits, with exactly one normal class, and without
    /// a joint transform (which could not be applied to these maps).
    pub fn original_gtmaps_normal_class(&self) -> DatasetResult<&GtMapStack> {
        if self.split == Split::Train {
            return Err(MvtecError::Precondition(
                "original ground-truth maps are only available for test splits".to_string(),
            ));
        }
        if self.normal_classes.len() != 1 {
            return Err(MvtecError::Precondition(format!(
                "exactly one normal class must be configured, got {}",
                self.normal_classes.len()
            )));
        }
        if self.transforms.all_transform.is_some() {
            return Err(MvtecError::Precondition(
                "a configured joint transform cannot be applied to original-resolution maps"
                    .to_string(),
            ));
        }
        if let Some(maps) = self.orig_gtmaps.get() {
            return Ok(maps);
        }
        let class = self.normal_classes[0];
        let archive = builder::ensure_cache(
            &self.root,
            CacheKey::OriginalForClass { class },
            &self.source,
            self.verbose,
        )?;
        let maps = archive.test_maps.to_unit_floats();
        let _ = self.orig_gtmaps.set(maps);
        Ok(self
            .orig_gtmaps
            .get()
            .expect("side table was just initialized"))
    }

    /// Render a per-class preview grid: for each requested class, up to `size`
    /// images grouped by defect category, followed by their ground-truth
    /// maps. With `separate`, one grid file per class (class id appended to
    /// the file stem); otherwise a single combined grid.
    pub fn render_preview(
        &self,
        path: &Path,
        size: usize,
        separate: bool,
        classes: &[usize],
    ) -> DatasetResult<()> {
        let gt = self.gt.as_ref().ok_or_else(|| {
            MvtecError::Precondition("previews require a test split".to_string())
        })?;
        let anomaly_labels = self
            .anomaly_labels
            .as_ref()
            .expect("test splits always carry defect-category ids");

        let mut pics: Vec<ChwTensor> = Vec::new();
        for &cls in classes {
            let mut categories: Vec<i32> = anomaly_labels
                .iter()
                .zip(&self.targets)
                .filter(|(_, t)| **t == cls as i32)
                .map(|(a, _)| *a)
                .collect();
            categories.sort_unstable();
            categories.dedup();
            if categories.is_empty() {
                continue;
            }
            let per_category = size / categories.len();

            for pass in 0..2 {
                let mut counter = 0;
                for &cat in &categories {
                    if counter >= size {
                        if pass == 0 {
                            eprintln!(
                                "Warning: for class {cls} there are more defect categories ({}) \
                                 than the grid fits ({size}); some are skipped",
                                categories.len()
                            );
                        }
                        break;
                    }
                    let mut n = per_category.max(1);
                    if cat == 0 && per_category > 0 {
                        n = per_category + size % categories.len();
                    }
                    for i in self.select_indices(cls as i32, cat, n) {
                        let pic = if pass == 0 {
                            self.data.get(i)
                        } else {
                            gt.get(i).map(|m| m.expand_to_rgb()).transpose()?
                        };
                        pics.push(pic.ok_or(MvtecError::IndexOutOfBounds {
                            index: i,
                            len: self.len(),
                        })?);
                    }
                    counter += n;
                }
            }

            if separate {
                grid::render_grid(&pics, &class_grid_path(path, cls), size, true)?;
                pics.clear();
            }
        }
        if !separate {
            grid::render_grid(&pics, path, size, true)?;
        }
        Ok(())
    }

    fn select_indices(&self, cls: i32, category: i32, n: usize) -> Vec<usize> {
        let ids = match &self.anomaly_labels {
            Some(ids) => ids,
            None => return Vec::new(),
        };
        self.targets
            .iter()
            .zip(ids)
            .enumerate()
            .filter(|(_, (t, a))| **t == cls && **a == category)
            .map(|(i, _)| i)
            .take(n)
            .collect()
    }
}

fn repeat_vec<T: Clone>(values: &[T], n: usize) -> Vec<T> {
    let mut out = Vec::with_capacity(values.len() * n);
    for _ in 0..n {
        out.extend_from_slice(values);
    }
    out
}

fn class_grid_path(path: &Path, cls: usize) -> PathBuf {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("preview");
    let ext = path.extension().and_then(|s| s.to_str()).unwrap_or("png");
    path.with_file_name(format!("{stem}_{cls}.{ext}"))
}
