//! One-time conversion of the raw benchmark tree into a cached archive.

use crate::archive::CachedArchive;
use crate::fetch;
use crate::raw::{load_image_tensor, mask_name_for};
use crate::tensor::{ChwTensor, TensorStack};
use crate::types::{
    CacheKey, DatasetResult, MvtecError, RawSource, BASE_FOLDER, CLASSES, NORMAL_ANOMALY_LABEL,
};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Load the cached archive for `key`, building it first when it is missing or
/// fails its integrity check. Building fetches and extracts the raw tree into
/// scratch space (or reads `RawSource::LocalTree` in place), walks it in
/// lexicographic order, and persists the stacked result.
pub fn ensure_cache(
    root: &Path,
    key: CacheKey,
    source: &RawSource,
    verbose: bool,
) -> DatasetResult<CachedArchive> {
    let cache_path = key.path(root);
    match CachedArchive::load(&cache_path) {
        Ok(archive) => {
            if verbose {
                eprintln!("[mvtec] using cached archive {}", cache_path.display());
            }
            return Ok(archive);
        }
        Err(MvtecError::Io { ref source, .. }) if source.kind() == io::ErrorKind::NotFound => {}
        Err(MvtecError::CorruptCache { ref msg, .. }) => {
            eprintln!(
                "Warning: cache {} failed its integrity check ({msg}); rebuilding",
                cache_path.display()
            );
        }
        Err(e) => return Err(e),
    }

    let archive = build(root, key, source, verbose)?;
    if let Some(parent) = cache_path.parent() {
        fs::create_dir_all(parent).map_err(|e| MvtecError::Io {
            path: parent.to_path_buf(),
            source: e,
        })?;
    }
    archive.save(&cache_path)?;
    if verbose {
        eprintln!("[mvtec] wrote cache {}", cache_path.display());
    }
    Ok(archive)
}

/// Build an archive without consulting or writing the cache.
pub fn build(
    root: &Path,
    key: CacheKey,
    source: &RawSource,
    verbose: bool,
) -> DatasetResult<CachedArchive> {
    match source {
        RawSource::LocalTree(tree) => build_from_tree(tree, key, verbose),
        RawSource::Download { url } => {
            let scratch = tempfile::tempdir().map_err(|e| MvtecError::Io {
                path: PathBuf::from("tempdir"),
                source: e,
            })?;
            let tree = fetch::fetch_and_extract(url, &root.join(BASE_FOLDER), scratch.path())?;
            build_from_tree(&tree, key, verbose)
        }
    }
}

/// Walk an extracted raw tree (`<tree>/<class>/{train,test}/<defect-category>/<file>`
/// plus the parallel `ground_truth` directories) and assemble every field.
pub fn build_from_tree(tree: &Path, key: CacheKey, verbose: bool) -> DatasetResult<CachedArchive> {
    let target = key.target_shape();
    let classes: Vec<(usize, &str)> = match key {
        CacheKey::Resized { .. } => CLASSES.iter().copied().enumerate().collect(),
        CacheKey::OriginalForClass { class } => {
            let name = CLASSES.get(class).copied().ok_or_else(|| {
                MvtecError::Precondition(format!(
                    "class index {class} out of range for {} classes",
                    CLASSES.len()
                ))
            })?;
            vec![(class, name)]
        }
    };

    let mut train_data: Vec<ChwTensor> = Vec::new();
    let mut train_labels: Vec<i32> = Vec::new();
    let mut test_data: Vec<ChwTensor> = Vec::new();
    let mut test_labels: Vec<i32> = Vec::new();
    let mut test_maps: Vec<ChwTensor> = Vec::new();
    let mut test_anomaly_labels: Vec<i32> = Vec::new();
    let mut anomaly_names: Vec<String> = vec![NORMAL_ANOMALY_LABEL.to_string()];

    for (cls_idx, cls_name) in classes {
        if verbose {
            eprintln!("[mvtec] processing class {cls_name}...");
        }
        let class_dir = tree.join(cls_name);

        let test_dir = class_dir.join("test");
        for category in sorted_entry_names(&test_dir)? {
            let category_dir = test_dir.join(&category);
            for img_name in sorted_entry_names(&category_dir)? {
                let sample = load_image_tensor(&category_dir.join(&img_name), target)?;
                let mask = if category != NORMAL_ANOMALY_LABEL {
                    let mask_path = class_dir
                        .join("ground_truth")
                        .join(&category)
                        .join(mask_name_for(&img_name));
                    load_image_tensor(&mask_path, target)?
                } else {
                    sample.zeros_like()
                };
                test_data.push(sample);
                test_labels.push(cls_idx as i32);
                test_maps.push(mask);
                test_anomaly_labels.push(anomaly_id(&mut anomaly_names, &category));
            }
        }

        let train_dir = class_dir.join("train");
        for category in sorted_entry_names(&train_dir)? {
            let category_dir = train_dir.join(&category);
            for img_name in sorted_entry_names(&category_dir)? {
                train_data.push(load_image_tensor(&category_dir.join(&img_name), target)?);
                train_labels.push(cls_idx as i32);
            }
        }
    }

    Ok(CachedArchive {
        train_data: TensorStack::stack(3, &train_data)?,
        train_labels,
        test_data: TensorStack::stack(3, &test_data)?,
        test_labels,
        // masks are stored as r=g=b color images; keep one grayscale channel
        test_maps: TensorStack::stack(3, &test_maps)?.first_channel(),
        test_anomaly_labels,
        anomaly_label_strings: anomaly_names,
    })
}

/// Directory entry names in lexicographic order, for reproducible sample
/// ordering and defect-category id assignment.
fn sorted_entry_names(dir: &Path) -> DatasetResult<Vec<String>> {
    let entries = fs::read_dir(dir).map_err(|e| MvtecError::Io {
        path: dir.to_path_buf(),
        source: e,
    })?;
    let mut names = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| MvtecError::Io {
            path: dir.to_path_buf(),
            source: e,
        })?;
        if let Some(name) = entry.file_name().to_str() {
            names.push(name.to_string());
        }
    }
    names.sort();
    Ok(names)
}

/// Id for a defect-category name, assigning fresh ids in first-seen order.
/// The normal sentinel is seeded at id 0 before any assignment.
fn anomaly_id(names: &mut Vec<String>, category: &str) -> i32 {
    match names.iter().position(|n| n == category) {
        Some(i) => i as i32,
        None => {
            names.push(category.to_string());
            (names.len() - 1) as i32
        }
    }
}
