//! Archive download and generic compressed-file extraction.

use crate::types::{DatasetResult, MvtecError};
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

/// Obtain the benchmark archive and extract it under `extract_root`, returning
/// the extracted tree root. A file already present at
/// `<download_root>/<archive name>` is reused without touching the network.
pub fn fetch_and_extract(
    url: &str,
    download_root: &Path,
    extract_root: &Path,
) -> DatasetResult<PathBuf> {
    fs::create_dir_all(download_root).map_err(|e| MvtecError::Io {
        path: download_root.to_path_buf(),
        source: e,
    })?;
    let filename = url.rsplit('/').next().filter(|s| !s.is_empty()).unwrap_or("archive");
    let archive = download_root.join(filename);
    if !archive.exists() {
        download(url, &archive)?;
    }
    eprintln!(
        "[mvtec] extracting {} to {}",
        archive.display(),
        extract_root.display()
    );
    extract(&archive, extract_root)?;
    Ok(extract_root.to_path_buf())
}

fn download(url: &str, dest: &Path) -> DatasetResult<()> {
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(MvtecError::Download {
            url: url.to_string(),
            msg: format!(
                "only http(s) downloads are supported; place the archive manually at {}",
                dest.display()
            ),
        });
    }
    eprintln!("[mvtec] downloading {url}");
    let response = ureq::get(url).call().map_err(|e| MvtecError::Download {
        url: url.to_string(),
        msg: e.to_string(),
    })?;
    let mut reader = response.into_reader();
    let mut out = File::create(dest).map_err(|e| MvtecError::Io {
        path: dest.to_path_buf(),
        source: e,
    })?;
    if let Err(e) = io::copy(&mut reader, &mut out) {
        // never leave a truncated archive behind
        drop(out);
        let _ = fs::remove_file(dest);
        return Err(MvtecError::Download {
            url: url.to_string(),
            msg: e.to_string(),
        });
    }
    Ok(())
}

/// Extract a compressed archive into `destination`, dispatching on the
/// archive's extension: tar, tar.gz/tgz, gzip, zip, and tar.xz are supported.
pub fn extract(archive: &Path, destination: &Path) -> DatasetResult<()> {
    fs::create_dir_all(destination).map_err(|e| MvtecError::Io {
        path: destination.to_path_buf(),
        source: e,
    })?;
    let name = archive
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    let open = || {
        File::open(archive).map_err(|e| MvtecError::Io {
            path: archive.to_path_buf(),
            source: e,
        })
    };
    let unpack_err = |e: io::Error| MvtecError::Io {
        path: archive.to_path_buf(),
        source: e,
    };

    if name.ends_with(".tar.xz") {
        let decoder = xz2::read::XzDecoder::new(open()?);
        tar::Archive::new(decoder)
            .unpack(destination)
            .map_err(unpack_err)
    } else if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
        let decoder = flate2::read::GzDecoder::new(open()?);
        tar::Archive::new(decoder)
            .unpack(destination)
            .map_err(unpack_err)
    } else if name.ends_with(".tar") {
        tar::Archive::new(open()?)
            .unpack(destination)
            .map_err(unpack_err)
    } else if name.ends_with(".gz") {
        let stem = name.trim_end_matches(".gz").to_string();
        let out_path = destination.join(stem);
        let mut decoder = flate2::read::GzDecoder::new(open()?);
        let mut out = File::create(&out_path).map_err(|e| MvtecError::Io {
            path: out_path.clone(),
            source: e,
        })?;
        io::copy(&mut decoder, &mut out).map_err(|e| MvtecError::Io {
            path: out_path.clone(),
            source: e,
        })?;
        Ok(())
    } else if name.ends_with(".zip") {
        let mut zip = zip::ZipArchive::new(open()?).map_err(|e| MvtecError::Other(format!(
            "failed to open zip archive {}: {e}",
            archive.display()
        )))?;
        zip.extract(destination).map_err(|e| MvtecError::Other(format!(
            "failed to extract zip archive {}: {e}",
            archive.display()
        )))
    } else {
        Err(MvtecError::UnsupportedArchive {
            path: archive.to_path_buf(),
        })
    }
}
