//! Integration tests for the one-time build and the cached archive container.

mod common;

use common::{create_synthetic_tree, TEST_TOTAL, TRAIN_PER_CLASS};
use mvtec_dataset::{
    build_from_tree, ensure_cache, CacheKey, CachedArchive, MvtecError, RawSource, CLASSES,
    NORMAL_ANOMALY_LABEL,
};
use std::fs;

const KEY: CacheKey = CacheKey::Resized {
    height: 8,
    width: 8,
};

#[test]
fn build_assembles_parallel_sequences_of_equal_length() -> anyhow::Result<()> {
    let tree = tempfile::tempdir()?;
    create_synthetic_tree(tree.path());

    let archive = build_from_tree(tree.path(), KEY, false)?;

    assert_eq!(archive.train_data.len(), CLASSES.len() * TRAIN_PER_CLASS);
    assert_eq!(archive.train_data.len(), archive.train_labels.len());
    assert_eq!(archive.test_data.len(), TEST_TOTAL);
    assert_eq!(archive.test_data.len(), archive.test_labels.len());
    assert_eq!(archive.test_data.len(), archive.test_maps.len());
    assert_eq!(archive.test_data.len(), archive.test_anomaly_labels.len());

    // every referenced defect-category id has a name
    let names = archive.anomaly_label_strings.len() as i32;
    assert!(archive.test_anomaly_labels.iter().all(|id| *id < names));

    // images are 3-channel, maps collapsed to one grayscale channel
    assert_eq!(archive.test_data.channels(), 3);
    assert_eq!(archive.test_maps.channels(), 1);
    assert_eq!(archive.test_maps.height(), 8);
    assert_eq!(archive.test_maps.width(), 8);
    Ok(())
}

#[test]
fn defect_category_ids_follow_first_seen_lexicographic_order() -> anyhow::Result<()> {
    let tree = tempfile::tempdir()?;
    create_synthetic_tree(tree.path());

    let archive = build_from_tree(tree.path(), KEY, false)?;

    // bottle traverses good/hole/scratch, cable then introduces crack
    assert_eq!(archive.anomaly_label_strings[0], NORMAL_ANOMALY_LABEL);
    assert_eq!(
        archive.anomaly_label_strings,
        vec!["good", "hole", "scratch", "crack"]
    );
    assert_eq!(
        &archive.test_anomaly_labels[..5],
        &[0, 1, 2, 3, 0],
        "bottle's categories come first, then cable's crack before its good"
    );
    assert!(archive.test_anomaly_labels[5..].iter().all(|id| *id == 0));
    Ok(())
}

#[test]
fn normal_test_samples_get_all_zero_maps_and_defects_keep_theirs() -> anyhow::Result<()> {
    let tree = tempfile::tempdir()?;
    create_synthetic_tree(tree.path());

    let archive = build_from_tree(tree.path(), KEY, false)?;

    let good = archive.test_maps.get(0).unwrap();
    assert!(good.bytes().unwrap().iter().all(|b| *b == 0));

    // cable's crack mask is stored at native size, so its white block survives
    // byte-exact
    let crack = archive.test_maps.get(3).unwrap();
    assert!(crack.bytes().unwrap().contains(&255));
    assert!(crack.bytes().unwrap().contains(&0));
    Ok(())
}

#[test]
fn building_twice_yields_identical_archives() -> anyhow::Result<()> {
    let tree = tempfile::tempdir()?;
    create_synthetic_tree(tree.path());

    let first = build_from_tree(tree.path(), KEY, false)?;
    let second = build_from_tree(tree.path(), KEY, false)?;
    assert_eq!(first, second);
    Ok(())
}

#[test]
fn ensure_cache_round_trips_through_the_container() -> anyhow::Result<()> {
    let tree = tempfile::tempdir()?;
    create_synthetic_tree(tree.path());
    let root = tempfile::tempdir()?;
    let source = RawSource::LocalTree(tree.path().to_path_buf());

    let built = ensure_cache(root.path(), KEY, &source, false)?;
    let cache_path = KEY.path(root.path());
    assert!(cache_path.exists());

    let loaded = CachedArchive::load(&cache_path)?;
    assert_eq!(built, loaded);

    // a second call serves the cache instead of rebuilding
    let cached = ensure_cache(root.path(), KEY, &source, false)?;
    assert_eq!(built, cached);
    Ok(())
}

#[test]
fn corrupt_cache_is_detected_and_rebuilt() -> anyhow::Result<()> {
    let tree = tempfile::tempdir()?;
    create_synthetic_tree(tree.path());
    let root = tempfile::tempdir()?;
    let source = RawSource::LocalTree(tree.path().to_path_buf());

    let built = ensure_cache(root.path(), KEY, &source, false)?;
    let cache_path = KEY.path(root.path());

    let mut bytes = fs::read(&cache_path)?;
    let at = bytes.len() - 10;
    bytes[at] ^= 0xff;
    fs::write(&cache_path, &bytes)?;

    assert!(matches!(
        CachedArchive::load(&cache_path),
        Err(MvtecError::CorruptCache { .. })
    ));

    let rebuilt = ensure_cache(root.path(), KEY, &source, false)?;
    assert_eq!(built, rebuilt);
    assert_eq!(CachedArchive::load(&cache_path)?, built);
    Ok(())
}

#[test]
fn original_resolution_build_is_scoped_to_one_class_at_native_size() -> anyhow::Result<()> {
    let tree = tempfile::tempdir()?;
    create_synthetic_tree(tree.path());

    let archive = build_from_tree(tree.path(), CacheKey::OriginalForClass { class: 0 }, false)?;

    // only the first class's samples, at their native 10x6 resolution
    assert_eq!(archive.test_data.len(), 3);
    assert_eq!(archive.train_data.len(), TRAIN_PER_CLASS);
    assert_eq!(archive.test_data.height(), 6);
    assert_eq!(archive.test_data.width(), 10);
    assert!(archive.test_labels.iter().all(|l| *l == 0));

    assert!(matches!(
        build_from_tree(
            tree.path(),
            CacheKey::OriginalForClass {
                class: CLASSES.len()
            },
            false
        ),
        Err(MvtecError::Precondition(_))
    ));
    Ok(())
}

#[test]
fn cache_filenames_encode_their_key() {
    assert_eq!(
        CacheKey::Resized {
            height: 300,
            width: 300
        }
        .filename(),
        "admvtec_300x300.pt"
    );
    assert_eq!(
        CacheKey::OriginalForClass { class: 7 }.filename(),
        "admvtec_orig_cls7.pt"
    );
}

#[test]
fn mask_filenames_derive_from_image_filenames() {
    assert_eq!(mvtec_dataset::raw::mask_name_for("003.png"), "003_mask.png");
    assert_eq!(mvtec_dataset::raw::mask_name_for("012.jpg"), "012_mask.jpg");
}
