//! Deterministic image filters.
//!
//! [`apply_pipeline`] runs the continuous control stack in a fixed order:
//! brightness, contrast, blur, sharpen, grayscale, rotation, horizontal flip,
//! vertical flip. Reordering changes the output. Every stage is skipped at its
//! identity value, and running it at identity would give the same pixels.

mod edges;
mod kernels;
mod named;

use image::{imageops, RgbImage};
use lumen_contracts::session::ControlParams;

pub use edges::detect_edges;
pub use named::{apply_named, odd_kernel, FlipDirection, NamedOperation, OperationOutcome};

/// Sigma of the blurred copy the sharpen control subtracts.
const SHARPEN_SIGMA: f64 = 3.0;

/// Renders `source` under `params`. The source is never modified.
pub fn apply_pipeline(source: &RgbImage, params: &ControlParams) -> RgbImage {
    let params = params.clamped();
    let mut image = source.clone();

    if params.brightness != 0 {
        image = adjust_linear(&image, 1.0, f64::from(params.brightness));
    }
    if params.contrast != 1.0 {
        image = adjust_linear(&image, params.contrast, 0.0);
    }
    if params.blur > 0 {
        let size = params.blur as usize * 2 + 1;
        image = kernels::gaussian_blur(&image, size, 0.0);
    }
    if params.sharpen > 0.0 {
        let size = kernels::kernel_size_for_sigma(SHARPEN_SIGMA);
        image = unsharp_mask(&image, params.sharpen * 0.5, size, SHARPEN_SIGMA);
    }
    if params.grayscale {
        image = grayscale(&image);
    }
    if params.rotation % 360 != 0 {
        image = rotate(&image, f64::from(params.rotation));
    }
    if params.flip_horizontal {
        imageops::flip_horizontal_in_place(&mut image);
    }
    if params.flip_vertical {
        imageops::flip_vertical_in_place(&mut image);
    }
    image
}

/// `clamp(round(v * alpha + beta), 0, 255)` on every channel.
pub(crate) fn adjust_linear(image: &RgbImage, alpha: f64, beta: f64) -> RgbImage {
    let mut out = image.clone();
    let values: &mut [u8] = &mut out;
    for value in values.iter_mut() {
        *value = saturate(f64::from(*value) * alpha + beta);
    }
    out
}

/// `v * (1 + weight) - blurred(v) * weight`, saturated.
pub(crate) fn unsharp_mask(image: &RgbImage, weight: f64, size: usize, sigma: f64) -> RgbImage {
    let blurred = kernels::gaussian_blur(image, size, sigma);
    let mut out = image.clone();
    let values: &mut [u8] = &mut out;
    for (value, soft) in values.iter_mut().zip(blurred.as_raw().iter()) {
        *value = saturate(f64::from(*value) * (1.0 + weight) - f64::from(*soft) * weight);
    }
    out
}

pub(crate) fn luminance(r: u8, g: u8, b: u8) -> u8 {
    saturate(0.299 * f64::from(r) + 0.587 * f64::from(g) + 0.114 * f64::from(b))
}

/// Luminance collapse, written back to all three channels.
pub(crate) fn grayscale(image: &RgbImage) -> RgbImage {
    let mut out = image.clone();
    for pixel in out.pixels_mut() {
        let y = luminance(pixel[0], pixel[1], pixel[2]);
        pixel.0 = [y, y, y];
    }
    out
}

/// Counter-clockwise rotation about `(w / 2, h / 2)` on a same-size canvas.
///
/// Bilinear sampling; anything mapped from outside the source is black, so
/// corners clip.
pub(crate) fn rotate(image: &RgbImage, degrees: f64) -> RgbImage {
    let (width, height) = image.dimensions();
    let (cos, sin) = if degrees % 90.0 == 0.0 {
        match (degrees / 90.0).rem_euclid(4.0) as u8 {
            0 => (1.0, 0.0),
            1 => (0.0, 1.0),
            2 => (-1.0, 0.0),
            _ => (0.0, -1.0),
        }
    } else {
        let radians = degrees.to_radians();
        (radians.cos(), radians.sin())
    };
    let cx = f64::from(width / 2);
    let cy = f64::from(height / 2);

    let mut out = RgbImage::new(width, height);
    for (x, y, pixel) in out.enumerate_pixels_mut() {
        let dx = f64::from(x) - cx;
        let dy = f64::from(y) - cy;
        let sx = cos * dx - sin * dy + cx;
        let sy = sin * dx + cos * dy + cy;
        pixel.0 = sample_bilinear(image, sx, sy);
    }
    out
}

fn sample_bilinear(image: &RgbImage, x: f64, y: f64) -> [u8; 3] {
    let x0 = x.floor();
    let y0 = y.floor();
    let fx = x - x0;
    let fy = y - y0;
    let taps = [
        (x0, y0, (1.0 - fx) * (1.0 - fy)),
        (x0 + 1.0, y0, fx * (1.0 - fy)),
        (x0, y0 + 1.0, (1.0 - fx) * fy),
        (x0 + 1.0, y0 + 1.0, fx * fy),
    ];
    let mut acc = [0f64; 3];
    for (tx, ty, weight) in taps {
        if weight == 0.0 {
            continue;
        }
        if tx < 0.0 || ty < 0.0 || tx >= f64::from(image.width()) || ty >= f64::from(image.height())
        {
            continue;
        }
        let pixel = image.get_pixel(tx as u32, ty as u32);
        for c in 0..3 {
            acc[c] += weight * f64::from(pixel[c]);
        }
    }
    [saturate(acc[0]), saturate(acc[1]), saturate(acc[2])]
}

pub(crate) fn saturate(value: f64) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}
