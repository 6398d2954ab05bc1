use image::{GrayImage, Luma};
use imageproc::contrast::{self, ThresholdType};
use ndarray::{Array3, ArrayView3, Zip};

use super::types::{ForegroundMask, Result, SubtractorError};

// Fixed-point luma weights (0.299, 0.587, 0.114) scaled by 2^14
const LUMA_SHIFT: u32 = 14;
const LUMA_R: u32 = 4899;
const LUMA_G: u32 = 9617;
const LUMA_B: u32 = 1868;

/// Per-sample absolute difference of two frames with identical layout
pub fn abs_diff(current: ArrayView3<u8>, background: ArrayView3<u8>) -> Array3<u8> {
    Zip::from(&current)
        .and(&background)
        .map_collect(|&c, &b| c.abs_diff(b))
}

/// Reduce a 1- or 3-channel (height, width, channel) array to a single
/// intensity channel
///
/// Three-channel data is read as RGB and weighted with the standard luma
/// coefficients. Single-channel data is copied as is.
pub fn to_luma(samples: ArrayView3<u8>) -> GrayImage {
    let (height, width, channels) = samples.dim();
    GrayImage::from_fn(width as u32, height as u32, |x, y| {
        let (x, y) = (x as usize, y as usize);
        if channels < 3 {
            return Luma([samples[[y, x, 0]]]);
        }

        let r = samples[[y, x, 0]] as u32;
        let g = samples[[y, x, 1]] as u32;
        let b = samples[[y, x, 2]] as u32;
        let luma = (r * LUMA_R + g * LUMA_G + b * LUMA_B + (1 << (LUMA_SHIFT - 1))) >> LUMA_SHIFT;
        Luma([luma.min(255) as u8])
    })
}

/// Map an out-of-range index back into `0..len` by mirroring around the
/// edge pixels without repeating them (`gfedcb|abcdefgh|gfedcba`)
fn reflect_101(index: isize, len: usize) -> usize {
    if len == 1 {
        return 0;
    }

    let period = 2 * (len as isize - 1);
    let i = index.rem_euclid(period);
    if i >= len as isize {
        (period - i) as usize
    } else {
        i as usize
    }
}

/// Sum of `k` consecutive reflect-101 samples of a line starting at `start`
///
/// The mirrored sequence repeats every `2 * (len - 1)` samples, so whole
/// periods are added at once and only the remainder is walked.
fn window_sum(start: isize, k: usize, len: usize, sample: impl Fn(usize) -> u128) -> u128 {
    let period = if len == 1 { 1 } else { 2 * (len - 1) };
    let cycles = (k / period) as u128;

    let period_sum: u128 = if cycles > 0 {
        (0..period as isize).map(|i| sample(reflect_101(i, len))).sum()
    } else {
        0
    };
    let rest: u128 = (start..start + (k % period) as isize)
        .map(|i| sample(reflect_101(i, len)))
        .sum();

    cycles * period_sum + rest
}

/// Normalized `size` x `size` box blur with reflect-101 borders
///
/// The kernel anchor sits at `size / 2`, so even sizes extend one pixel
/// further to the left/top than to the right/bottom. A size of 1 returns
/// a copy of the input. Kernels larger than the image keep wrapping the
/// mirrored border, which is not the same as a plain image average.
pub fn box_blur(image: &GrayImage, size: u32) -> GrayImage {
    let _span = tracing::debug_span!("box_blur").entered();

    let (width, height) = image.dimensions();
    if size <= 1 || width == 0 || height == 0 {
        return image.clone();
    }

    let (w, h) = (width as usize, height as usize);
    let k = size as usize;
    let anchor = (size / 2) as isize;
    let src = image.as_raw();

    // Horizontal window sums
    let mut rows = vec![0u128; w * h];
    for y in 0..h {
        let line = &src[y * w..(y + 1) * w];
        for x in 0..w {
            rows[y * w + x] = window_sum(x as isize - anchor, k, w, |i| line[i] as u128);
        }
    }

    // Vertical sums and normalization
    let area = (size as u128).pow(2);
    let mut out = GrayImage::new(width, height);
    for y in 0..h {
        for x in 0..w {
            let sum = window_sum(y as isize - anchor, k, h, |j| rows[j * w + x]);
            let value = (sum + area / 2) / area;
            out.put_pixel(x as u32, y as u32, Luma([value.min(255) as u8]));
        }
    }

    out
}

/// Binary threshold: pixels strictly above `threshold` become 255, others 0
pub fn binarize(image: &GrayImage, threshold: f64) -> ForegroundMask {
    let (width, height) = image.dimensions();
    if threshold.is_nan() || threshold >= 255.0 {
        return GrayImage::new(width, height);
    }
    if threshold < 0.0 {
        return GrayImage::from_pixel(width, height, Luma([255]));
    }

    // Integer samples: v > t  <=>  v > floor(t)
    contrast::threshold(image, threshold.floor() as u8, ThresholdType::Binary)
}

/// Pixel-wise AND of two masks
///
/// Used to combine several estimators run over the same stream; a pixel
/// stays foreground only if every model agrees. Masks of different sizes
/// are rejected.
pub fn intersect(a: &ForegroundMask, b: &ForegroundMask) -> Result<ForegroundMask> {
    if a.dimensions() != b.dimensions() {
        return Err(SubtractorError::ShapeMismatch {
            expected: a.dimensions(),
            found: b.dimensions(),
        });
    }

    let (width, height) = a.dimensions();
    let raw = a
        .as_raw()
        .iter()
        .zip(b.as_raw())
        .map(|(&left, &right)| left & right)
        .collect();
    GrayImage::from_raw(width, height, raw).ok_or(SubtractorError::ShapeMismatch {
        expected: a.dimensions(),
        found: b.dimensions(),
    })
}
