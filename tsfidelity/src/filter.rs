//! Separable convolution with reflect boundary handling.
//!
//! The windowed statistics behind both the relevance mask and the SSIM maps
//! are 2-D convolutions with separable kernels, so each is computed as two
//! 1-D passes. Each pass writes its output transposed, which turns the
//! vertical pass into another cache-friendly horizontal pass.

use crate::image::ImageF;

/// Reflects a coordinate outside the valid range back inside it.
///
/// The edge pixel is duplicated at the boundary (-1 maps to 0, -2 to 1,
/// `len` to `len - 1`), repeating for kernels wider than the image.
#[inline]
pub(crate) fn reflect(mut x: isize, len: usize) -> usize {
    let n = len as isize;
    loop {
        if x < 0 {
            x = -x - 1;
        } else if x >= n {
            x = 2 * n - 1 - x;
        } else {
            return x as usize;
        }
    }
}

/// Uniform averaging kernel of the given size.
pub(crate) fn uniform_kernel(size: usize) -> Vec<f32> {
    vec![1.0 / size as f32; size]
}

/// Normalized 1-D Gaussian kernel with the given sigma and radius.
pub(crate) fn gaussian_kernel(sigma: f32, radius: usize) -> Vec<f32> {
    let scaler = -1.0 / (2.0 * sigma * sigma);
    let r = radius as isize;
    let mut kernel = Vec::with_capacity(2 * radius + 1);
    for i in -r..=r {
        kernel.push((scaler * (i * i) as f32).exp());
    }
    let sum: f32 = kernel.iter().sum();
    for w in &mut kernel {
        *w /= sum;
    }
    kernel
}

/// One horizontal convolution pass; the result is written transposed.
fn convolve_rows_transpose(input: &ImageF, kernel: &[f32]) -> ImageF {
    let width = input.width();
    let height = input.height();
    let half = kernel.len() as isize / 2;

    let mut out = ImageF::new(height, width);
    for y in 0..height {
        let row = input.row(y);
        for x in 0..width {
            let mut sum = 0.0f32;
            for (j, &k) in kernel.iter().enumerate() {
                sum += row[reflect(x as isize + j as isize - half, width)] * k;
            }
            // transposed write
            out.set(y, x, sum);
        }
    }
    out
}

/// Applies the same 1-D kernel along rows and then columns.
///
/// Equivalent to a full 2-D convolution with the kernel's outer product.
pub(crate) fn separable_filter(input: &ImageF, kernel: &[f32]) -> ImageF {
    let tmp = convolve_rows_transpose(input, kernel);
    convolve_rows_transpose(&tmp, kernel)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reflect_duplicates_edge() {
        assert_eq!(reflect(-1, 5), 0);
        assert_eq!(reflect(-2, 5), 1);
        assert_eq!(reflect(0, 5), 0);
        assert_eq!(reflect(4, 5), 4);
        assert_eq!(reflect(5, 5), 4);
        assert_eq!(reflect(6, 5), 3);
        // Kernel wider than the image keeps bouncing
        assert_eq!(reflect(-4, 2), 0);
        assert_eq!(reflect(5, 2), 1);
    }

    #[test]
    fn kernels_are_normalized() {
        let u = uniform_kernel(11);
        assert!((u.iter().sum::<f32>() - 1.0).abs() < 1e-6);

        let g = gaussian_kernel(1.5, 5);
        assert_eq!(g.len(), 11);
        assert!((g.iter().sum::<f32>() - 1.0).abs() < 1e-6);
        // symmetric, peaked at the center
        for i in 0..5 {
            assert_eq!(g[i], g[10 - i]);
            assert!(g[i] < g[5]);
        }
    }

    #[test]
    fn filter_preserves_constant_image() {
        let img = ImageF::filled(17, 9, 3.25);
        let out = separable_filter(&img, &uniform_kernel(5));
        for &v in out.data() {
            assert!((v - 3.25).abs() < 1e-4, "got {v}");
        }
    }

    #[test]
    fn filter_spreads_a_spike() {
        let mut img = ImageF::new(9, 9);
        img.set(4, 4, 1.0);
        let out = separable_filter(&img, &uniform_kernel(3));
        assert!(out.get(4, 4) > 0.0);
        assert!(out.get(3, 3) > 0.0);
        assert!((out.get(0, 0)).abs() < 1e-9);
        // total mass is preserved by a normalized kernel away from borders
        let total: f32 = out.data().iter().sum();
        assert!((total - 1.0).abs() < 1e-4);
    }
}
