//! Row-major float RGB pixel storage.
//!
//! Samples use 8-bit channel semantics normalized to `[0, 1]`. Intermediate stages may leave the
//! unit range (gradient responses are signed); only [`PixelBuffer::to_rgba8`] clamps.
use std::sync::atomic::{AtomicU32, Ordering};

use crate::foundation::error::{ParconvError, ParconvResult};

/// One RGB sample triple.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Rgb {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Rgb {
    pub const BLACK: Rgb = Rgb::splat(0.0);
    pub const WHITE: Rgb = Rgb::splat(1.0);

    pub const fn new(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b }
    }

    pub const fn splat(v: f32) -> Self {
        Self { r: v, g: v, b: v }
    }

    /// Largest per-channel absolute difference.
    pub fn max_abs_diff(self, other: Rgb) -> f32 {
        (self.r - other.r)
            .abs()
            .max((self.g - other.g).abs())
            .max((self.b - other.b).abs())
    }
}

/// Flat row-major RGB buffer; index `i` maps to `(i % width, i / width)`.
#[derive(Clone, Debug, PartialEq)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    samples: Vec<Rgb>,
}

impl PixelBuffer {
    /// Wrap `samples`, which must hold exactly `width * height` entries.
    pub fn new(width: u32, height: u32, samples: Vec<Rgb>) -> ParconvResult<Self> {
        let expected = pixel_count(width, height)?;
        if samples.len() != expected {
            let got_h = if width == 0 {
                0
            } else {
                u32::try_from(samples.len() / width as usize).unwrap_or(u32::MAX)
            };
            return Err(ParconvError::dimension_mismatch(
                (width, height),
                (width, got_h),
            ));
        }
        Ok(Self {
            width,
            height,
            samples,
        })
    }

    pub fn filled(width: u32, height: u32, px: Rgb) -> ParconvResult<Self> {
        let n = pixel_count(width, height)?;
        Self::new(width, height, vec![px; n])
    }

    /// Build a buffer by evaluating `f(x, y)` for every pixel in row-major order.
    pub fn from_fn(
        width: u32,
        height: u32,
        mut f: impl FnMut(u32, u32) -> Rgb,
    ) -> ParconvResult<Self> {
        let n = pixel_count(width, height)?;
        let mut samples = Vec::with_capacity(n);
        for y in 0..height {
            for x in 0..width {
                samples.push(f(x, y));
            }
        }
        Self::new(width, height, samples)
    }

    /// Decode tightly packed RGBA8 (alpha is ignored).
    pub fn from_rgba8(width: u32, height: u32, data: &[u8]) -> ParconvResult<Self> {
        let n = pixel_count(width, height)?;
        if data.len() != n * 4 {
            return Err(ParconvError::codec(format!(
                "expected {} RGBA8 bytes for {width}x{height}, got {}",
                n * 4,
                data.len()
            )));
        }
        let samples = data
            .chunks_exact(4)
            .map(|px| {
                Rgb::new(
                    f32::from(px[0]) / 255.0,
                    f32::from(px[1]) / 255.0,
                    f32::from(px[2]) / 255.0,
                )
            })
            .collect();
        Self::new(width, height, samples)
    }

    /// Encode to opaque RGBA8, clamping every channel to `[0, 1]` first.
    pub fn to_rgba8(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.samples.len() * 4);
        for px in &self.samples {
            out.extend_from_slice(&[quantize(px.r), quantize(px.g), quantize(px.b), 255]);
        }
        out
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn samples(&self) -> &[Rgb] {
        &self.samples
    }

    pub fn into_samples(self) -> Vec<Rgb> {
        self.samples
    }

    #[inline]
    pub fn get(&self, x: u32, y: u32) -> Rgb {
        self.samples[y as usize * self.width as usize + x as usize]
    }

    #[inline]
    pub fn at(&self, index: usize) -> Rgb {
        self.samples[index]
    }

    /// Largest per-channel absolute difference against `other`.
    pub fn max_abs_diff(&self, other: &PixelBuffer) -> ParconvResult<f32> {
        self.ensure_same_dimensions(other)?;
        Ok(self
            .samples
            .iter()
            .zip(&other.samples)
            .map(|(a, b)| a.max_abs_diff(*b))
            .fold(0.0, f32::max))
    }

    pub(crate) fn ensure_same_dimensions(&self, other: &PixelBuffer) -> ParconvResult<()> {
        if self.dimensions() != other.dimensions() {
            return Err(ParconvError::dimension_mismatch(
                self.dimensions(),
                other.dimensions(),
            ));
        }
        Ok(())
    }
}

pub(crate) fn pixel_count(width: u32, height: u32) -> ParconvResult<usize> {
    let n = u64::from(width) * u64::from(height);
    if n > u64::from(u32::MAX) {
        return Err(ParconvError::invalid_configuration(format!(
            "{width}x{height} exceeds the addressable pixel count"
        )));
    }
    Ok(n as usize)
}

fn quantize(v: f32) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0).round() as u8
}

/// Output storage shared by concurrently running workers.
///
/// Each pixel owns three atomic cells holding `f32` bits. Workers write disjoint indices with
/// relaxed stores; visibility to the coordinator comes from the stage's completion barrier.
pub(crate) struct AtomicSamples {
    cells: Vec<AtomicU32>,
}

impl AtomicSamples {
    pub(crate) fn new(len: usize) -> Self {
        Self {
            cells: (0..len * 3).map(|_| AtomicU32::new(0)).collect(),
        }
    }

    #[inline]
    pub(crate) fn store(&self, index: usize, px: Rgb) {
        let base = index * 3;
        self.cells[base].store(px.r.to_bits(), Ordering::Relaxed);
        self.cells[base + 1].store(px.g.to_bits(), Ordering::Relaxed);
        self.cells[base + 2].store(px.b.to_bits(), Ordering::Relaxed);
    }

    pub(crate) fn into_samples(self) -> Vec<Rgb> {
        let mut bits = self.cells.into_iter().map(AtomicU32::into_inner);
        let mut out = Vec::with_capacity(bits.len() / 3);
        while let (Some(r), Some(g), Some(b)) = (bits.next(), bits.next(), bits.next()) {
            out.push(Rgb::new(f32::from_bits(r), f32::from_bits(g), f32::from_bits(b)));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_rejects_wrong_sample_count() {
        let err = PixelBuffer::new(2, 2, vec![Rgb::BLACK; 3]).unwrap_err();
        assert!(matches!(err, ParconvError::DimensionMismatch { .. }));
    }

    #[test]
    fn index_maps_row_major() {
        let buf = PixelBuffer::from_fn(3, 2, |x, y| Rgb::new(x as f32, y as f32, 0.0)).unwrap();
        assert_eq!(buf.at(4), Rgb::new(1.0, 1.0, 0.0));
        assert_eq!(buf.get(2, 1), buf.at(5));

        let samples = buf.into_samples();
        assert_eq!(samples.len(), 6);
        assert_eq!(samples[5], Rgb::new(2.0, 1.0, 0.0));
    }

    #[test]
    fn rgba8_conversion_clamps_and_sets_opaque_alpha() {
        let buf = PixelBuffer::new(
            3,
            1,
            vec![Rgb::new(-0.5, 0.5, 2.0), Rgb::BLACK, Rgb::WHITE],
        )
        .unwrap();
        let bytes = buf.to_rgba8();
        assert_eq!(&bytes[0..4], &[0, 128, 255, 255]);
        assert_eq!(&bytes[4..8], &[0, 0, 0, 255]);
        assert_eq!(&bytes[8..12], &[255, 255, 255, 255]);

        let back = PixelBuffer::from_rgba8(3, 1, &bytes).unwrap();
        assert_eq!(back.at(2), Rgb::WHITE);
    }

    #[test]
    fn from_rgba8_checks_length() {
        assert!(PixelBuffer::from_rgba8(2, 2, &[0u8; 15]).is_err());
    }

    #[test]
    fn atomic_samples_round_trip_bits() {
        let sink = AtomicSamples::new(2);
        sink.store(1, Rgb::new(-1.25, 0.5, 3.0));
        let samples = sink.into_samples();
        assert_eq!(samples, vec![Rgb::BLACK, Rgb::new(-1.25, 0.5, 3.0)]);
    }

    #[test]
    fn max_abs_diff_requires_matching_dimensions() {
        let a = PixelBuffer::filled(2, 2, Rgb::BLACK).unwrap();
        let b = PixelBuffer::filled(2, 1, Rgb::BLACK).unwrap();
        assert!(a.max_abs_diff(&b).is_err());
        let c = PixelBuffer::filled(2, 2, Rgb::splat(0.25)).unwrap();
        assert_eq!(a.max_abs_diff(&c).unwrap(), 0.25);
    }
}
