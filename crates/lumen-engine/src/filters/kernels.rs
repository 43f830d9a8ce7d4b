use image::RgbImage;

const SMALL_KERNELS: [&[f32]; 4] = [
    &[1.0],
    &[0.25, 0.5, 0.25],
    &[0.0625, 0.25, 0.375, 0.25, 0.0625],
    &[0.03125, 0.109375, 0.21875, 0.28125, 0.21875, 0.109375, 0.03125],
];

/// Normalized 1-D Gaussian weights for an odd `size`.
///
/// With `sigma <= 0` the sigma is derived from the size, and sizes up to 7
/// use the fixed binomial tables.
pub(crate) fn gaussian_kernel(size: usize, sigma: f64) -> Vec<f32> {
    let size = size.max(1) | 1;
    if sigma <= 0.0 && size <= 7 {
        return SMALL_KERNELS[size / 2].to_vec();
    }
    let sigma = if sigma > 0.0 {
        sigma
    } else {
        ((size as f64 - 1.0) * 0.5 - 1.0) * 0.3 + 0.8
    };
    let center = (size as f64 - 1.0) * 0.5;
    let scale = -0.5 / (sigma * sigma);
    let raw: Vec<f64> = (0..size)
        .map(|i| {
            let x = i as f64 - center;
            (scale * x * x).exp()
        })
        .collect();
    let sum: f64 = raw.iter().sum();
    raw.into_iter().map(|w| (w / sum) as f32).collect()
}

/// Kernel size implied by a sigma when the caller gives none (8-bit images).
pub(crate) fn kernel_size_for_sigma(sigma: f64) -> usize {
    ((sigma * 3.0 * 2.0 + 1.0).round() as usize) | 1
}

/// Mirror index without repeating the edge pixel: `-1 -> 1`, `len -> len - 2`.
pub(crate) fn reflect_101(index: isize, len: usize) -> usize {
    if len <= 1 {
        return 0;
    }
    let len = len as isize;
    let period = 2 * (len - 1);
    let mut i = index.rem_euclid(period);
    if i >= len {
        i = period - i;
    }
    i as usize
}

/// Separable Gaussian smoothing with reflected borders.
pub(crate) fn gaussian_blur(image: &RgbImage, size: usize, sigma: f64) -> RgbImage {
    let kernel = gaussian_kernel(size, sigma);
    let (width, height) = (image.width() as usize, image.height() as usize);
    if width == 0 || height == 0 {
        return image.clone();
    }
    let radius = (kernel.len() / 2) as isize;
    let src = image.as_raw();

    let mut horizontal = vec![0f32; width * height * 3];
    for y in 0..height {
        let row = y * width * 3;
        for x in 0..width {
            let mut acc = [0f32; 3];
            for (k, weight) in kernel.iter().enumerate() {
                let sx = reflect_101(x as isize + k as isize - radius, width);
                let base = row + sx * 3;
                for c in 0..3 {
                    acc[c] += weight * f32::from(src[base + c]);
                }
            }
            let out = row + x * 3;
            horizontal[out..out + 3].copy_from_slice(&acc);
        }
    }

    let mut output = RgbImage::new(image.width(), image.height());
    let dst: &mut [u8] = &mut output;
    for y in 0..height {
        for x in 0..width {
            let mut acc = [0f32; 3];
            for (k, weight) in kernel.iter().enumerate() {
                let sy = reflect_101(y as isize + k as isize - radius, height);
                let base = (sy * width + x) * 3;
                for c in 0..3 {
                    acc[c] += weight * horizontal[base + c];
                }
            }
            let out = (y * width + x) * 3;
            for c in 0..3 {
                dst[out + c] = saturate(acc[c]);
            }
        }
    }
    output
}

pub(crate) fn saturate(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

#[cfg(test)]
mod tests {
    use image::{Rgb, RgbImage};

    use super::{gaussian_blur, gaussian_kernel, kernel_size_for_sigma, reflect_101};

    #[test]
    fn kernels_are_normalized_and_symmetric() {
        for size in [1, 3, 5, 7, 9, 11, 51] {
            let kernel = gaussian_kernel(size, 0.0);
            assert_eq!(kernel.len(), size);
            let sum: f32 = kernel.iter().sum();
            assert!((sum - 1.0).abs() < 1e-5, "size {size} sums to {sum}");
            for i in 0..size / 2 {
                assert!((kernel[i] - kernel[size - 1 - i]).abs() < 1e-7);
            }
        }
    }

    #[test]
    fn sigma_three_implies_nineteen_taps() {
        assert_eq!(kernel_size_for_sigma(3.0), 19);
        assert_eq!(gaussian_kernel(19, 3.0).len(), 19);
    }

    #[test]
    fn reflect_skips_the_edge_pixel() {
        assert_eq!(reflect_101(-1, 5), 1);
        assert_eq!(reflect_101(-2, 5), 2);
        assert_eq!(reflect_101(5, 5), 3);
        assert_eq!(reflect_101(2, 5), 2);
        assert_eq!(reflect_101(-7, 1), 0);
    }

    #[test]
    fn flat_image_stays_flat() {
        let image = RgbImage::from_pixel(6, 4, Rgb([90, 120, 200]));
        assert_eq!(gaussian_blur(&image, 11, 0.0), image);
    }

    #[test]
    fn blur_spreads_a_single_bright_pixel() {
        let mut image = RgbImage::new(9, 9);
        image.put_pixel(4, 4, Rgb([255, 255, 255]));
        let blurred = gaussian_blur(&image, 5, 0.0);
        assert!(blurred.get_pixel(4, 4)[0] < 255);
        assert!(blurred.get_pixel(3, 4)[0] > 0);
        assert_eq!(blurred.get_pixel(0, 0)[0], 0);
    }
}
