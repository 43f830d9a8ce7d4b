use std::collections::VecDeque;

use image::{Rgb, RgbImage};

use super::kernels::reflect_101;
use super::luminance;

// tan(22.5°) and tan(67.5°) split gradient directions into four sectors.
const TAN_22_5: f32 = 0.414_213_56;
const TAN_67_5: f32 = 2.414_213_6;

/// Canny-style edge map: Sobel gradients on the luminance plane, non-maximum
/// suppression, then hysteresis between the two thresholds. Edge pixels are
/// white, everything else black, in all three channels.
pub fn detect_edges(image: &RgbImage, threshold1: f64, threshold2: f64) -> RgbImage {
    let (width, height) = (image.width() as usize, image.height() as usize);
    if width == 0 || height == 0 {
        return image.clone();
    }
    let low = threshold1.min(threshold2) as f32;
    let high = threshold1.max(threshold2) as f32;

    let gray: Vec<f32> = image
        .pixels()
        .map(|p| f32::from(luminance(p[0], p[1], p[2])))
        .collect();
    let at = |x: isize, y: isize| -> f32 {
        gray[reflect_101(y, height) * width + reflect_101(x, width)]
    };

    let mut gx = vec![0f32; width * height];
    let mut gy = vec![0f32; width * height];
    let mut magnitude = vec![0f32; width * height];
    for y in 0..height as isize {
        for x in 0..width as isize {
            let dx = (at(x + 1, y - 1) + 2.0 * at(x + 1, y) + at(x + 1, y + 1))
                - (at(x - 1, y - 1) + 2.0 * at(x - 1, y) + at(x - 1, y + 1));
            let dy = (at(x - 1, y + 1) + 2.0 * at(x, y + 1) + at(x + 1, y + 1))
                - (at(x - 1, y - 1) + 2.0 * at(x, y - 1) + at(x + 1, y - 1));
            let i = y as usize * width + x as usize;
            gx[i] = dx;
            gy[i] = dy;
            magnitude[i] = dx.abs() + dy.abs();
        }
    }

    // 0 = suppressed, 1 = weak candidate, 2 = strong
    let mut class = vec![0u8; width * height];
    let mag = |x: isize, y: isize| -> f32 {
        if x < 0 || y < 0 || x >= width as isize || y >= height as isize {
            0.0
        } else {
            magnitude[y as usize * width + x as usize]
        }
    };
    let mut queue = VecDeque::new();
    for y in 0..height as isize {
        for x in 0..width as isize {
            let i = y as usize * width + x as usize;
            let m = magnitude[i];
            if m <= low {
                continue;
            }
            let ax = gx[i].abs();
            let ay = gy[i].abs();
            let (before, after) = if ay <= ax * TAN_22_5 {
                (mag(x - 1, y), mag(x + 1, y))
            } else if ay >= ax * TAN_67_5 {
                (mag(x, y - 1), mag(x, y + 1))
            } else if (gx[i] >= 0.0) == (gy[i] >= 0.0) {
                (mag(x - 1, y - 1), mag(x + 1, y + 1))
            } else {
                (mag(x + 1, y - 1), mag(x - 1, y + 1))
            };
            if m > before && m >= after {
                if m > high {
                    class[i] = 2;
                    queue.push_back((x, y));
                } else {
                    class[i] = 1;
                }
            }
        }
    }

    while let Some((x, y)) = queue.pop_front() {
        for ny in y - 1..=y + 1 {
            for nx in x - 1..=x + 1 {
                if nx < 0 || ny < 0 || nx >= width as isize || ny >= height as isize {
                    continue;
                }
                let n = ny as usize * width + nx as usize;
                if class[n] == 1 {
                    class[n] = 2;
                    queue.push_back((nx, ny));
                }
            }
        }
    }

    RgbImage::from_fn(image.width(), image.height(), |x, y| {
        if class[y as usize * width + x as usize] == 2 {
            Rgb([255, 255, 255])
        } else {
            Rgb([0, 0, 0])
        }
    })
}
