//! Shared synthetic raw-tree fixtures for integration tests.
#![allow(dead_code)]

use image::{GrayImage, Rgb, RgbImage};
use mvtec_dataset::CLASSES;
use std::fs;
use std::path::Path;

/// Defect categories of the first two synthetic classes. Everything else only
/// has anomaly-free samples.
pub const BOTTLE_DEFECTS: [&str; 2] = ["hole", "scratch"];
pub const CABLE_DEFECT: &str = "crack";

pub const TRAIN_PER_CLASS: usize = 2;
/// 15 good test samples plus three defect samples (hole, scratch, crack).
pub const TEST_TOTAL: usize = CLASSES.len() + 3;

/// Lay out a miniature raw tree mirroring the benchmark structure:
/// `<root>/<class>/{train,test}/<category>/<file>` plus parallel
/// `ground_truth` mask directories for defect categories.
pub fn create_synthetic_tree(root: &Path) {
    for (cls_idx, cls) in CLASSES.iter().enumerate() {
        let class_dir = root.join(cls);
        let (w, h) = class_dims(cls_idx);

        let train_good = class_dir.join("train").join("good");
        fs::create_dir_all(&train_good).unwrap();
        for i in 0..TRAIN_PER_CLASS {
            write_image(
                &train_good.join(format!("{i:03}.png")),
                w,
                h,
                (cls_idx * 16 + i) as u8,
            );
        }

        let test_good = class_dir.join("test").join("good");
        fs::create_dir_all(&test_good).unwrap();
        write_image(&test_good.join("000.png"), w, h, (cls_idx * 16 + 8) as u8);

        let defects: &[&str] = match cls_idx {
            0 => &BOTTLE_DEFECTS,
            1 => &[CABLE_DEFECT],
            _ => &[],
        };
        for (d_idx, defect) in defects.iter().enumerate() {
            let img_dir = class_dir.join("test").join(defect);
            let mask_dir = class_dir.join("ground_truth").join(defect);
            fs::create_dir_all(&img_dir).unwrap();
            fs::create_dir_all(&mask_dir).unwrap();
            write_image(
                &img_dir.join("000.png"),
                w,
                h,
                (cls_idx * 16 + 10 + d_idx) as u8,
            );
            write_mask(&mask_dir.join("000_mask.png"), w, h);
        }
    }
}

/// The first class keeps a distinctive native size so original-resolution
/// builds are observable; every other class is 8x8.
pub fn class_dims(cls_idx: usize) -> (u32, u32) {
    if cls_idx == 0 {
        (10, 6)
    } else {
        (8, 8)
    }
}

fn write_image(path: &Path, w: u32, h: u32, seed: u8) {
    let img = RgbImage::from_fn(w, h, |x, y| {
        Rgb([seed, (x * 20) as u8, (y * 20) as u8])
    });
    img.save(path).unwrap();
}

/// White 2x2 block in the top-left corner, black elsewhere. Stored as
/// grayscale; the loader forces masks to r=g=b color like real mask files.
fn write_mask(path: &Path, w: u32, h: u32) {
    let mask = GrayImage::from_fn(w, h, |x, y| {
        image::Luma([if x < 2 && y < 2 { 255 } else { 0 }])
    });
    mask.save(path).unwrap();
}
