//! Pixel-level building blocks for the filter pipeline: convolution with
//! reflected borders, Gaussian kernels, and HSV conversion.

use image::{Rgb, RgbImage};

/// Map an out-of-range coordinate back into `0..len` by mirroring around the
/// edge pixels without repeating them (`dcb|abcd|cba`).
fn reflect_101(mut i: i64, len: i64) -> u32 {
    if len == 1 {
        return 0;
    }
    while i < 0 || i >= len {
        if i < 0 {
            i = -i;
        }
        if i >= len {
            i = 2 * (len - 1) - i;
        }
    }
    i as u32
}

fn saturate(v: f32) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}

/// Convolve every channel with a 3x3 kernel (row-major).
pub fn convolve_3x3(image: &RgbImage, kernel: &[f32; 9]) -> RgbImage {
    let (width, height) = image.dimensions();
    let (w, h) = (i64::from(width), i64::from(height));

    RgbImage::from_fn(width, height, |x, y| {
        let mut acc = [0.0f32; 3];
        for ky in 0..3i64 {
            for kx in 0..3i64 {
                let weight = kernel[(ky * 3 + kx) as usize];
                if weight == 0.0 {
                    continue;
                }
                let sx = reflect_101(i64::from(x) + kx - 1, w);
                let sy = reflect_101(i64::from(y) + ky - 1, h);
                let px = image.get_pixel(sx, sy);
                for c in 0..3 {
                    acc[c] += weight * f32::from(px[c]);
                }
            }
        }
        Rgb([saturate(acc[0]), saturate(acc[1]), saturate(acc[2])])
    })
}

/// Sigma used for a Gaussian of the given (odd) size when none is requested.
pub fn sigma_for_kernel(ksize: u32) -> f32 {
    0.3 * ((ksize as f32 - 1.0) * 0.5 - 1.0) + 0.8
}

/// Normalized 1-D Gaussian weights of length `ksize`.
pub fn gaussian_kernel(ksize: u32) -> Vec<f32> {
    let sigma = sigma_for_kernel(ksize);
    let center = (ksize as f32 - 1.0) / 2.0;
    let weights: Vec<f32> = (0..ksize)
        .map(|i| {
            let d = i as f32 - center;
            (-(d * d) / (2.0 * sigma * sigma)).exp()
        })
        .collect();
    let sum: f32 = weights.iter().sum();
    weights.into_iter().map(|w| w / sum).collect()
}

/// Separable Gaussian blur with an explicit odd kernel size.
pub fn gaussian_blur(image: &RgbImage, ksize: u32) -> RgbImage {
    let kernel = gaussian_kernel(ksize);
    let radius = i64::from(ksize / 2);
    let (width, height) = image.dimensions();
    let (w, h) = (i64::from(width), i64::from(height));

    // Horizontal pass into a float buffer keeps precision for the vertical pass.
    let mut horizontal = vec![[0.0f32; 3]; (width as usize) * (height as usize)];
    for y in 0..height {
        for x in 0..width {
            let mut acc = [0.0f32; 3];
            for (k, weight) in kernel.iter().enumerate() {
                let sx = reflect_101(i64::from(x) + k as i64 - radius, w);
                let px = image.get_pixel(sx, y);
                for c in 0..3 {
                    acc[c] += weight * f32::from(px[c]);
                }
            }
            horizontal[(y * width + x) as usize] = acc;
        }
    }

    RgbImage::from_fn(width, height, |x, y| {
        let mut acc = [0.0f32; 3];
        for (k, weight) in kernel.iter().enumerate() {
            let sy = reflect_101(i64::from(y) + k as i64 - radius, h);
            let px = horizontal[(sy * width + x) as usize];
            for c in 0..3 {
                acc[c] += weight * px[c];
            }
        }
        Rgb([saturate(acc[0]), saturate(acc[1]), saturate(acc[2])])
    })
}

/// RGB (0-255) to HSV with hue in degrees, saturation in 0..=1, value in 0..=255.
pub fn rgb_to_hsv(px: Rgb<u8>) -> (f32, f32, f32) {
    let [r, g, b] = px.0.map(f32::from);
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;

    let hue = if delta == 0.0 {
        0.0
    } else if max == r {
        60.0 * ((g - b) / delta).rem_euclid(6.0)
    } else if max == g {
        60.0 * ((b - r) / delta + 2.0)
    } else {
        60.0 * ((r - g) / delta + 4.0)
    };
    let saturation = if max == 0.0 { 0.0 } else { delta / max };

    (hue, saturation, max)
}

/// Inverse of [`rgb_to_hsv`].
pub fn hsv_to_rgb(hue: f32, saturation: f32, value: f32) -> Rgb<u8> {
    let chroma = value * saturation;
    let h = (hue / 60.0).rem_euclid(6.0);
    let x = chroma * (1.0 - (h % 2.0 - 1.0).abs());
    let (r, g, b) = match h as u32 {
        0 => (chroma, x, 0.0),
        1 => (x, chroma, 0.0),
        2 => (0.0, chroma, x),
        3 => (0.0, x, chroma),
        4 => (x, 0.0, chroma),
        _ => (chroma, 0.0, x),
    };
    let m = value - chroma;
    Rgb([saturate(r + m), saturate(g + m), saturate(b + m)])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reflect_101() {
        assert_eq!(reflect_101(-1, 5), 1);
        assert_eq!(reflect_101(-2, 5), 2);
        assert_eq!(reflect_101(5, 5), 3);
        assert_eq!(reflect_101(2, 5), 2);
        assert_eq!(reflect_101(-7, 1), 0);
        // Radius larger than the image keeps bouncing until in range
        assert!(reflect_101(-12, 3) < 3);
    }

    #[test]
    fn test_gaussian_kernel_normalized_and_symmetric() {
        for ksize in [1, 3, 5, 11, 51] {
            let kernel = gaussian_kernel(ksize);
            assert_eq!(kernel.len(), ksize as usize);
            let sum: f32 = kernel.iter().sum();
            assert!((sum - 1.0).abs() < 1e-5);
            for i in 0..kernel.len() / 2 {
                assert!((kernel[i] - kernel[kernel.len() - 1 - i]).abs() < 1e-6);
            }
        }
    }

    #[test]
    fn test_flat_image_survives_convolution() {
        let flat = RgbImage::from_pixel(9, 7, Rgb([120, 80, 40]));
        let sharpen = [0.0, -1.0, 0.0, -1.0, 5.0, -1.0, 0.0, -1.0, 0.0];
        assert_eq!(convolve_3x3(&flat, &sharpen), flat);
        assert_eq!(gaussian_blur(&flat, 5), flat);
    }

    #[test]
    fn test_blur_spreads_a_single_bright_pixel() {
        let mut img = RgbImage::new(11, 11);
        img.put_pixel(5, 5, Rgb([255, 255, 255]));
        let blurred = gaussian_blur(&img, 5);
        assert!(blurred.get_pixel(5, 5)[0] < 255);
        assert!(blurred.get_pixel(6, 5)[0] > 0);
        assert_eq!(blurred.get_pixel(0, 0)[0], 0);
    }

    #[test]
    fn test_hsv_roundtrip() {
        for px in [
            Rgb([0, 0, 0]),
            Rgb([255, 255, 255]),
            Rgb([200, 30, 90]),
            Rgb([12, 250, 40]),
            Rgb([60, 70, 200]),
        ] {
            let (h, s, v) = rgb_to_hsv(px);
            assert_eq!(hsv_to_rgb(h, s, v), px);
        }
    }

    #[test]
    fn test_gray_has_zero_saturation() {
        let (_, s, v) = rgb_to_hsv(Rgb([128, 128, 128]));
        assert_eq!(s, 0.0);
        assert_eq!(v, 128.0);
    }
}
