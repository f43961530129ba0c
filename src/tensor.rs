//! Flat CHW tensor buffers backing samples and cached archives.

use crate::types::{DatasetResult, MvtecError};
use image::{GrayImage, RgbImage};

#[derive(Debug, Clone, PartialEq)]
pub enum TensorData {
    U8(Vec<u8>),
    F32(Vec<f32>),
}

/// A single sample tensor in channel-major (channel, height, width) layout.
///
/// Images are 3-channel, ground-truth maps 1-channel. Byte payloads are the
/// persisted form; float payloads only appear transiently as transform output.
#[derive(Debug, Clone, PartialEq)]
pub struct ChwTensor {
    channels: usize,
    height: u32,
    width: u32,
    data: TensorData,
}

impl ChwTensor {
    pub fn from_bytes(channels: usize, height: u32, width: u32, data: Vec<u8>) -> Self {
        debug_assert_eq!(data.len(), channels * height as usize * width as usize);
        Self {
            channels,
            height,
            width,
            data: TensorData::U8(data),
        }
    }

    pub fn from_floats(channels: usize, height: u32, width: u32, data: Vec<f32>) -> Self {
        debug_assert_eq!(data.len(), channels * height as usize * width as usize);
        Self {
            channels,
            height,
            width,
            data: TensorData::F32(data),
        }
    }

    pub fn full(channels: usize, height: u32, width: u32, value: u8) -> Self {
        let elems = channels * height as usize * width as usize;
        Self::from_bytes(channels, height, width, vec![value; elems])
    }

    /// An all-zero byte tensor with the same shape as `self`.
    pub fn zeros_like(&self) -> Self {
        Self::full(self.channels, self.height, self.width, 0)
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn data(&self) -> &TensorData {
        &self.data
    }

    pub fn is_u8(&self) -> bool {
        matches!(self.data, TensorData::U8(_))
    }

    pub fn bytes(&self) -> Option<&[u8]> {
        match &self.data {
            TensorData::U8(b) => Some(b),
            TensorData::F32(_) => None,
        }
    }

    /// Re-encode an image tensor to bytes. Float payloads are min-max
    /// normalized into the full 0..=255 range; byte payloads pass through.
    pub fn into_byte_image(self) -> Self {
        match self.data {
            TensorData::U8(_) => self,
            TensorData::F32(f) => {
                let min = f.iter().copied().fold(f32::INFINITY, f32::min);
                let max = f.iter().copied().fold(f32::NEG_INFINITY, f32::max);
                let bytes = if max > min {
                    f.iter()
                        .map(|v| ((v - min) / (max - min) * 255.0) as u8)
                        .collect()
                } else {
                    vec![0u8; f.len()]
                };
                Self::from_bytes(self.channels, self.height, self.width, bytes)
            }
        }
    }

    /// Re-encode a ground-truth map to bytes. Float payloads are read as a
    /// fractional [0, 1] mask and scaled by 255; byte payloads pass through.
    pub fn into_byte_mask(self) -> Self {
        match self.data {
            TensorData::U8(_) => self,
            TensorData::F32(f) => {
                let bytes = f.iter().map(|v| (v * 255.0) as u8).collect();
                Self::from_bytes(self.channels, self.height, self.width, bytes)
            }
        }
    }

    /// Repack a 3-channel byte tensor into a displayable color image.
    pub fn to_rgb_image(&self) -> DatasetResult<RgbImage> {
        let bytes = self.displayable_bytes(3)?;
        let plane = self.height as usize * self.width as usize;
        let (w, h) = (self.width, self.height);
        Ok(RgbImage::from_fn(w, h, |x, y| {
            let at = y as usize * w as usize + x as usize;
            image::Rgb([bytes[at], bytes[plane + at], bytes[2 * plane + at]])
        }))
    }

    /// Repack a 1-channel byte tensor into a displayable grayscale image.
    pub fn to_gray_image(&self) -> DatasetResult<GrayImage> {
        let bytes = self.displayable_bytes(1)?;
        GrayImage::from_raw(self.width, self.height, bytes.to_vec()).ok_or_else(|| {
            MvtecError::Other("ground-truth map buffer does not match its dimensions".to_string())
        })
    }

    /// Expand a 1-channel tensor to r=g=b color for grid rendering.
    pub fn expand_to_rgb(&self) -> DatasetResult<Self> {
        let bytes = self.displayable_bytes(1)?;
        let mut data = Vec::with_capacity(bytes.len() * 3);
        for _ in 0..3 {
            data.extend_from_slice(bytes);
        }
        Ok(Self::from_bytes(3, self.height, self.width, data))
    }

    fn displayable_bytes(&self, channels: usize) -> DatasetResult<&[u8]> {
        if self.channels != channels {
            return Err(MvtecError::Other(format!(
                "expected a {channels}-channel byte tensor, got {} channels",
                self.channels
            )));
        }
        self.bytes().ok_or_else(|| {
            MvtecError::Other("tensor must be re-encoded to bytes before display".to_string())
        })
    }
}

/// A batched stack of equally shaped byte tensors, stored as one flat
/// (sample, channel, height, width) buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct TensorStack {
    len: usize,
    channels: usize,
    height: u32,
    width: u32,
    data: Vec<u8>,
}

impl TensorStack {
    /// Stack byte samples into one batched buffer. All samples must share the
    /// given channel count and one spatial shape.
    pub fn stack(channels: usize, samples: &[ChwTensor]) -> DatasetResult<Self> {
        let (height, width) = match samples.first() {
            Some(first) => (first.height(), first.width()),
            None => (0, 0),
        };
        let elems = channels * height as usize * width as usize;
        let mut data = Vec::with_capacity(elems * samples.len());
        for sample in samples {
            if sample.channels() != channels
                || sample.height() != height
                || sample.width() != width
            {
                return Err(MvtecError::Other(
                    "stack contains varying tensor shapes; set a target shape to force consistency"
                        .to_string(),
                ));
            }
            match sample.data() {
                TensorData::U8(b) => data.extend_from_slice(b),
                TensorData::F32(_) => {
                    return Err(MvtecError::Other(
                        "stack requires byte tensors".to_string(),
                    ));
                }
            }
        }
        Ok(Self {
            len: samples.len(),
            channels,
            height,
            width,
            data,
        })
    }

    pub fn from_raw(
        len: usize,
        channels: usize,
        height: u32,
        width: u32,
        data: Vec<u8>,
    ) -> DatasetResult<Self> {
        let expected = len * channels * height as usize * width as usize;
        if data.len() != expected {
            return Err(MvtecError::Other(format!(
                "stack payload holds {} bytes, dims require {expected}",
                data.len()
            )));
        }
        Ok(Self {
            len,
            channels,
            height,
            width,
            data,
        })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    /// Copy one sample out of the batched buffer.
    pub fn get(&self, index: usize) -> Option<ChwTensor> {
        if index >= self.len {
            return None;
        }
        let elems = self.channels * self.height as usize * self.width as usize;
        let start = index * elems;
        Some(ChwTensor::from_bytes(
            self.channels,
            self.height,
            self.width,
            self.data[start..start + elems].to_vec(),
        ))
    }

    /// Repeat the whole stack `n` times by concatenation, preserving per-item
    /// order within each repetition block.
    pub fn repeated(mut self, n: usize) -> Self {
        let block = self.data.clone();
        for _ in 1..n {
            self.data.extend_from_slice(&block);
        }
        self.len *= n;
        self
    }

    /// Collapse an r=g=b color stack to its first channel (grayscale maps are
    /// stored as equal-valued color images in the raw tree).
    pub fn first_channel(&self) -> TensorStack {
        let plane = self.height as usize * self.width as usize;
        let elems = self.channels * plane;
        let mut data = Vec::with_capacity(self.len * plane);
        for i in 0..self.len {
            let start = i * elems;
            data.extend_from_slice(&self.data[start..start + plane]);
        }
        TensorStack {
            len: self.len,
            channels: 1,
            height: self.height,
            width: self.width,
            data,
        }
    }

    /// Convert byte values to floats in [0, 1].
    pub fn to_unit_floats(&self) -> GtMapStack {
        GtMapStack {
            len: self.len,
            height: self.height,
            width: self.width,
            data: self.data.iter().map(|b| *b as f32 / 255.0).collect(),
        }
    }
}

/// Stacked single-channel ground-truth maps as floats in [0, 1].
#[derive(Debug, Clone, PartialEq)]
pub struct GtMapStack {
    pub len: usize,
    pub height: u32,
    pub width: u32,
    pub data: Vec<f32>,
}

impl GtMapStack {
    pub fn get(&self, index: usize) -> Option<&[f32]> {
        if index >= self.len {
            return None;
        }
        let plane = self.height as usize * self.width as usize;
        Some(&self.data[index * plane..(index + 1) * plane])
    }
}

/// Lookup table permuting ground-truth pixel codes for a non-default label
/// polarity: identity everywhere except 0 -> nominal*255 and 255 -> anomalous*255.
/// Interpolation-induced intermediate values are left untouched.
pub fn remap_table(nominal: u8, anomalous: u8) -> [u8; 256] {
    let mut table = [0u8; 256];
    for (v, slot) in table.iter_mut().enumerate() {
        *slot = v as u8;
    }
    table[0] = nominal.saturating_mul(255);
    table[255] = anomalous.saturating_mul(255);
    table
}
