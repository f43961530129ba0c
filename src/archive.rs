//! The cached archive container: one file persisting every stacked field of a
//! built dataset, with an embedded integrity digest.
//!
//! Layout: `ADMV` magic, format version, SHA-256 digest of the payload,
//! payload length, payload. The payload is a fixed sequence of keyed
//! sections (`train_data`, `train_labels`, `test_data`, `test_labels`,
//! `test_maps`, `test_anomaly_labels`, `anomaly_label_strings`), each
//! carrying its own dimensions. All integers are little-endian.

use crate::tensor::TensorStack;
use crate::types::{DatasetResult, MvtecError};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;

const MAGIC: &[u8; 4] = b"ADMV";
const VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq)]
pub struct CachedArchive {
    pub train_data: TensorStack,
    pub train_labels: Vec<i32>,
    pub test_data: TensorStack,
    pub test_labels: Vec<i32>,
    /// Single-channel ground-truth maps, parallel to `test_data`.
    pub test_maps: TensorStack,
    pub test_anomaly_labels: Vec<i32>,
    /// Defect-category names indexed by id; id 0 is the normal sentinel.
    pub anomaly_label_strings: Vec<String>,
}

impl CachedArchive {
    pub fn save(&self, path: &Path) -> DatasetResult<()> {
        let mut payload = Vec::new();
        put_stack(&mut payload, "train_data", &self.train_data);
        put_i32s(&mut payload, "train_labels", &self.train_labels);
        put_stack(&mut payload, "test_data", &self.test_data);
        put_i32s(&mut payload, "test_labels", &self.test_labels);
        put_stack(&mut payload, "test_maps", &self.test_maps);
        put_i32s(&mut payload, "test_anomaly_labels", &self.test_anomaly_labels);
        put_strings(&mut payload, "anomaly_label_strings", &self.anomaly_label_strings);

        let digest = Sha256::digest(&payload);
        let mut file = Vec::with_capacity(payload.len() + 48);
        file.extend_from_slice(MAGIC);
        file.extend_from_slice(&VERSION.to_le_bytes());
        file.extend_from_slice(&digest);
        file.extend_from_slice(&(payload.len() as u64).to_le_bytes());
        file.extend_from_slice(&payload);
        fs::write(path, file).map_err(|e| MvtecError::Io {
            path: path.to_path_buf(),
            source: e,
        })
    }

    pub fn load(path: &Path) -> DatasetResult<Self> {
        let raw = fs::read(path).map_err(|e| MvtecError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let corrupt = |msg: &str| MvtecError::CorruptCache {
            path: path.to_path_buf(),
            msg: msg.to_string(),
        };
        if raw.len() < 48 {
            return Err(corrupt("file shorter than the container header"));
        }
        if &raw[0..4] != MAGIC {
            return Err(corrupt("bad magic"));
        }
        let version = u32::from_le_bytes([raw[4], raw[5], raw[6], raw[7]]);
        if version != VERSION {
            return Err(corrupt("unsupported container version"));
        }
        let stored_digest = &raw[8..40];
        let payload_len = u64::from_le_bytes(raw[40..48].try_into().expect("slice is 8 bytes"));
        let payload = &raw[48..];
        if payload.len() as u64 != payload_len {
            return Err(corrupt("payload length mismatch"));
        }
        if Sha256::digest(payload).as_slice() != stored_digest {
            return Err(corrupt("checksum mismatch"));
        }

        let mut reader = Reader { path, buf: payload, pos: 0 };
        let train_data = reader.read_stack("train_data")?;
        let train_labels = reader.read_i32s("train_labels")?;
        let test_data = reader.read_stack("test_data")?;
        let test_labels = reader.read_i32s("test_labels")?;
        let test_maps = reader.read_stack("test_maps")?;
        let test_anomaly_labels = reader.read_i32s("test_anomaly_labels")?;
        let anomaly_label_strings = reader.read_strings("anomaly_label_strings")?;
        if reader.pos != reader.buf.len() {
            return Err(corrupt("trailing bytes after the final section"));
        }
        Ok(Self {
            train_data,
            train_labels,
            test_data,
            test_labels,
            test_maps,
            test_anomaly_labels,
            anomaly_label_strings,
        })
    }
}

fn put_key(buf: &mut Vec<u8>, key: &str) {
    buf.extend_from_slice(&(key.len() as u32).to_le_bytes());
    buf.extend_from_slice(key.as_bytes());
}

fn put_stack(buf: &mut Vec<u8>, key: &str, stack: &TensorStack) {
    put_key(buf, key);
    buf.extend_from_slice(&(stack.len() as u64).to_le_bytes());
    buf.extend_from_slice(&(stack.channels() as u32).to_le_bytes());
    buf.extend_from_slice(&stack.height().to_le_bytes());
    buf.extend_from_slice(&stack.width().to_le_bytes());
    buf.extend_from_slice(stack.bytes());
}

fn put_i32s(buf: &mut Vec<u8>, key: &str, values: &[i32]) {
    put_key(buf, key);
    buf.extend_from_slice(&(values.len() as u64).to_le_bytes());
    for v in values {
        buf.extend_from_slice(&v.to_le_bytes());
    }
}

fn put_strings(buf: &mut Vec<u8>, key: &str, values: &[String]) {
    put_key(buf, key);
    buf.extend_from_slice(&(values.len() as u64).to_le_bytes());
    for v in values {
        buf.extend_from_slice(&(v.len() as u32).to_le_bytes());
        buf.extend_from_slice(v.as_bytes());
    }
}

struct Reader<'a> {
    path: &'a Path,
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn corrupt(&self, msg: String) -> MvtecError {
        MvtecError::CorruptCache {
            path: self.path.to_path_buf(),
            msg,
        }
    }

    fn take(&mut self, n: usize) -> DatasetResult<&'a [u8]> {
        if self.pos + n > self.buf.len() {
            return Err(self.corrupt("truncated section".to_string()));
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn read_u32(&mut self) -> DatasetResult<u32> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes(b.try_into().expect("slice is 4 bytes")))
    }

    fn read_u64(&mut self) -> DatasetResult<u64> {
        let b = self.take(8)?;
        Ok(u64::from_le_bytes(b.try_into().expect("slice is 8 bytes")))
    }

    fn expect_key(&mut self, key: &str) -> DatasetResult<()> {
        let len = self.read_u32()? as usize;
        let found = self.take(len)?;
        if found != key.as_bytes() {
            return Err(self.corrupt(format!(
                "expected section {key:?}, found {:?}",
                String::from_utf8_lossy(found)
            )));
        }
        Ok(())
    }

    fn read_stack(&mut self, key: &str) -> DatasetResult<TensorStack> {
        self.expect_key(key)?;
        let len = self.read_u64()? as usize;
        let channels = self.read_u32()? as usize;
        let height = self.read_u32()?;
        let width = self.read_u32()?;
        let bytes = len
            .checked_mul(channels)
            .and_then(|v| v.checked_mul(height as usize))
            .and_then(|v| v.checked_mul(width as usize))
            .ok_or_else(|| self.corrupt(format!("section {key:?} dims overflow")))?;
        let data = self.take(bytes)?.to_vec();
        TensorStack::from_raw(len, channels, height, width, data)
            .map_err(|e| self.corrupt(format!("section {key:?}: {e}")))
    }

    fn read_i32s(&mut self, key: &str) -> DatasetResult<Vec<i32>> {
        self.expect_key(key)?;
        let count = self.read_u64()? as usize;
        let bytes = self.take(count.checked_mul(4).ok_or_else(|| {
            self.corrupt(format!("section {key:?} count overflow"))
        })?)?;
        Ok(bytes
            .chunks_exact(4)
            .map(|c| i32::from_le_bytes(c.try_into().expect("chunk is 4 bytes")))
            .collect())
    }

    fn read_strings(&mut self, key: &str) -> DatasetResult<Vec<String>> {
        self.expect_key(key)?;
        let count = self.read_u64()? as usize;
        let mut out = Vec::with_capacity(count.min(1024));
        for _ in 0..count {
            let len = self.read_u32()? as usize;
            let bytes = self.take(len)?;
            let s = std::str::from_utf8(bytes)
                .map_err(|_| self.corrupt(format!("section {key:?} holds invalid utf-8")))?;
            out.push(s.to_string());
        }
        Ok(out)
    }
}
