//! Integration tests for archive fetching and generic extraction.

use flate2::write::GzEncoder;
use flate2::Compression;
use mvtec_dataset::{extract, fetch_and_extract, MvtecError};
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

fn make_payload_dir(root: &Path) -> std::path::PathBuf {
    let payload = root.join("payload");
    fs::create_dir_all(payload.join("inner")).unwrap();
    fs::write(payload.join("a.txt"), b"alpha").unwrap();
    fs::write(payload.join("inner").join("b.txt"), b"beta").unwrap();
    payload
}

#[test]
fn extracts_tar_gz_archives() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let payload = make_payload_dir(tmp.path());

    let archive_path = tmp.path().join("payload.tar.gz");
    let encoder = GzEncoder::new(File::create(&archive_path)?, Compression::default());
    let mut builder = tar::Builder::new(encoder);
    builder.append_dir_all("payload", &payload)?;
    builder.into_inner()?.finish()?;

    let dst = tmp.path().join("out");
    extract(&archive_path, &dst)?;
    assert_eq!(fs::read(dst.join("payload").join("a.txt"))?, b"alpha");
    assert_eq!(
        fs::read(dst.join("payload").join("inner").join("b.txt"))?,
        b"beta"
    );
    Ok(())
}

#[test]
fn extracts_plain_tar_archives() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let payload = make_payload_dir(tmp.path());

    let archive_path = tmp.path().join("payload.tar");
    let mut builder = tar::Builder::new(File::create(&archive_path)?);
    builder.append_dir_all("payload", &payload)?;
    builder.into_inner()?;

    let dst = tmp.path().join("out");
    extract(&archive_path, &dst)?;
    assert_eq!(fs::read(dst.join("payload").join("a.txt"))?, b"alpha");
    Ok(())
}

#[test]
fn extracts_single_gzip_files_next_to_their_stem() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let archive_path = tmp.path().join("notes.txt.gz");
    let mut encoder = GzEncoder::new(File::create(&archive_path)?, Compression::default());
    encoder.write_all(b"gamma")?;
    encoder.finish()?;

    let dst = tmp.path().join("out");
    extract(&archive_path, &dst)?;
    assert_eq!(fs::read(dst.join("notes.txt"))?, b"gamma");
    Ok(())
}

#[test]
fn extracts_zip_archives() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let archive_path = tmp.path().join("payload.zip");
    let mut writer = zip::ZipWriter::new(File::create(&archive_path)?);
    writer.start_file("a.txt", zip::write::SimpleFileOptions::default())?;
    writer.write_all(b"alpha")?;
    writer.start_file("inner/b.txt", zip::write::SimpleFileOptions::default())?;
    writer.write_all(b"beta")?;
    writer.finish()?;

    let dst = tmp.path().join("out");
    extract(&archive_path, &dst)?;
    assert_eq!(fs::read(dst.join("a.txt"))?, b"alpha");
    assert_eq!(fs::read(dst.join("inner").join("b.txt"))?, b"beta");
    Ok(())
}

#[test]
fn rejects_unsupported_archive_formats() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let archive_path = tmp.path().join("payload.rar");
    fs::write(&archive_path, b"not really an archive")?;

    assert!(matches!(
        extract(&archive_path, &tmp.path().join("out")),
        Err(MvtecError::UnsupportedArchive { .. })
    ));
    Ok(())
}

#[test]
fn fetch_reuses_a_locally_placed_archive_without_network() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let payload = make_payload_dir(tmp.path());

    let download_root = tmp.path().join("downloads");
    fs::create_dir_all(&download_root)?;
    let encoder = GzEncoder::new(
        File::create(download_root.join("payload.tar.gz"))?,
        Compression::default(),
    );
    let mut builder = tar::Builder::new(encoder);
    builder.append_dir_all("payload", &payload)?;
    builder.into_inner()?.finish()?;

    // the host is unreachable on purpose; the pre-placed file must win
    let dst = tmp.path().join("scratch");
    let extracted = fetch_and_extract(
        "https://example.invalid/payload.tar.gz",
        &download_root,
        &dst,
    )?;
    assert_eq!(extracted, dst);
    assert_eq!(fs::read(dst.join("payload").join("a.txt"))?, b"alpha");
    Ok(())
}

#[test]
fn non_http_urls_fail_with_manual_placement_instructions() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let result = fetch_and_extract(
        "ftp://guest@example.invalid/data.tar.xz",
        &tmp.path().join("downloads"),
        &tmp.path().join("scratch"),
    );
    match result {
        Err(MvtecError::Download { msg, .. }) => assert!(msg.contains("manually")),
        other => panic!("expected a download error, got {other:?}"),
    }
    Ok(())
}
