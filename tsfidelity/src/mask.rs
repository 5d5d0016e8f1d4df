//! OR-convolution relevance mask.
//!
//! Line plots are mostly background; averaging an error metric over the
//! whole canvas drowns the line in identical empty pixels. The mask marks
//! every pixel within box-distance `(W-1)/2` of ink in either image, and
//! the masked metric variants restrict their means to it.

use crate::filter::reflect;
use crate::image::{ImageF, Mask};
use crate::Error;

/// Default dilation window size.
pub const DEFAULT_WIN_SIZE: usize = 11;

/// Builds the dilated union-of-ink mask for two single-channel images.
///
/// A pixel is non-background when its value is greater than zero in either
/// input. The union is dilated by a `win_size` x `win_size` box: one 1-D
/// box convolution along rows, one along columns (reflect boundary), then
/// a `> 0` threshold. The counts are integers, so the separable form
/// matches a direct 2-D convolution bit for bit.
///
/// Swapping the two inputs yields the identical mask.
///
/// # Errors
/// `ShapeMismatch` if the images differ in dimensions; `InvalidParameter`
/// if `win_size` is zero or even.
pub fn or_conv_mask(img1: &ImageF, img2: &ImageF, win_size: usize) -> Result<Mask, Error> {
    if !img1.same_size(img2) {
        return Err(Error::ShapeMismatch {
            w1: img1.width(),
            h1: img1.height(),
            w2: img2.width(),
            h2: img2.height(),
        });
    }
    if win_size == 0 || win_size % 2 == 0 {
        return Err(Error::InvalidParameter {
            what: format!("mask window size must be odd, got {win_size}"),
        });
    }

    let width = img1.width();
    let height = img1.height();

    let joined: Vec<u32> = img1
        .data()
        .iter()
        .zip(img2.data())
        .map(|(&a, &b)| u32::from(a > 0.0 || b > 0.0))
        .collect();

    // both passes write transposed, landing back in row-major order
    let pass1 = box_count_pass(&joined, width, height, win_size);
    let pass2 = box_count_pass(&pass1, height, width, win_size);

    Ok(Mask::from_vec(
        pass2.iter().map(|&count| count > 0).collect(),
        width,
        height,
    ))
}

/// 1-D box-count pass along rows; the result is written transposed.
fn box_count_pass(src: &[u32], width: usize, height: usize, win: usize) -> Vec<u32> {
    let half = win as isize / 2;
    let mut out = vec![0u32; width * height];
    for y in 0..height {
        let row = &src[y * width..(y + 1) * width];
        for x in 0..width {
            let mut sum = 0u32;
            for j in 0..win {
                sum += row[reflect(x as isize + j as isize - half, width)];
            }
            out[x * height + y] = sum;
        }
    }
    out
}
