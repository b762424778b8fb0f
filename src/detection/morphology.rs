//! Morphology with rectangular structuring elements.
//!
//! `imageproc::morphology` covers the square cleanup element through its
//! norm-based operators; line-shaped elements (40x1 horizontal, 1x9
//! vertical) are applied here as separable sliding min/max filters. Pixels
//! outside the image never take part in a window.

use image::GrayImage;
use imageproc::distance_transform::Norm;
use imageproc::morphology;
use std::collections::VecDeque;

/// Rectangular structuring element anchored at `(width / 2, height / 2)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RectKernel {
    pub width: u32,
    pub height: u32,
}

impl RectKernel {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width: width.max(1),
            height: height.max(1),
        }
    }

    pub fn horizontal(width: u32) -> Self {
        Self::new(width, 1)
    }

    pub fn vertical(height: u32) -> Self {
        Self::new(1, height)
    }
}

pub fn erode(image: &GrayImage, kernel: RectKernel) -> GrayImage {
    let ax = (kernel.width / 2) as usize;
    let ay = (kernel.height / 2) as usize;
    let rows = filter_rows(image, ax, kernel.width as usize - 1 - ax, false);
    filter_cols(&rows, ay, kernel.height as usize - 1 - ay, false)
}

/// Dilation uses the reflected element so that `open` and `close` are
/// exact for even-sized kernels too.
pub fn dilate(image: &GrayImage, kernel: RectKernel) -> GrayImage {
    let ax = (kernel.width / 2) as usize;
    let ay = (kernel.height / 2) as usize;
    let rows = filter_rows(image, kernel.width as usize - 1 - ax, ax, true);
    filter_cols(&rows, kernel.height as usize - 1 - ay, ay, true)
}

pub fn open(image: &GrayImage, kernel: RectKernel) -> GrayImage {
    dilate(&erode(image, kernel), kernel)
}

pub fn close(image: &GrayImage, kernel: RectKernel) -> GrayImage {
    erode(&dilate(image, kernel), kernel)
}

/// Square opening for speckle removal. Odd sizes go through imageproc.
pub fn open_square(image: &GrayImage, size: u32) -> GrayImage {
    if size % 2 == 1 && size / 2 <= u8::MAX as u32 {
        morphology::open(image, Norm::LInf, (size / 2) as u8)
    } else {
        open(image, RectKernel::new(size, size))
    }
}

/// Square closing for bridging small gaps. Odd sizes go through imageproc.
pub fn close_square(image: &GrayImage, size: u32) -> GrayImage {
    if size % 2 == 1 && size / 2 <= u8::MAX as u32 {
        morphology::close(image, Norm::LInf, (size / 2) as u8)
    } else {
        close(image, RectKernel::new(size, size))
    }
}

/// Pixel-wise saturating `a - b`.
pub fn subtract(a: &GrayImage, b: &GrayImage) -> GrayImage {
    let mut out = a.clone();
    for (dst, src) in out.pixels_mut().zip(b.pixels()) {
        dst[0] = dst[0].saturating_sub(src[0]);
    }
    out
}

fn filter_rows(image: &GrayImage, before: usize, after: usize, take_max: bool) -> GrayImage {
    let (width, height) = image.dimensions();
    if before == 0 && after == 0 {
        return image.clone();
    }
    let mut out = GrayImage::new(width, height);
    let w = width as usize;
    let src = image.as_raw();
    let dst: &mut [u8] = &mut out;
    for row in 0..height as usize {
        let range = row * w..(row + 1) * w;
        sliding_extreme(&src[range.clone()], &mut dst[range], before, after, take_max);
    }
    out
}

fn filter_cols(image: &GrayImage, before: usize, after: usize, take_max: bool) -> GrayImage {
    let (width, height) = image.dimensions();
    let mut out = image.clone();
    if before == 0 && after == 0 {
        return out;
    }
    let (w, h) = (width as usize, height as usize);
    let src = image.as_raw();
    let dst: &mut [u8] = &mut out;
    let mut column = vec![0u8; h];
    let mut filtered = vec![0u8; h];
    for x in 0..w {
        for y in 0..h {
            column[y] = src[y * w + x];
        }
        sliding_extreme(&column, &mut filtered, before, after, take_max);
        for y in 0..h {
            dst[y * w + x] = filtered[y];
        }
    }
    out
}

/// `out[i]` = min (or max) of `input[i - before ..= i + after]`, clipped to
/// the slice. Monotonic deque, linear in the slice length.
fn sliding_extreme(input: &[u8], out: &mut [u8], before: usize, after: usize, take_max: bool) {
    let n = input.len();
    let mut window: VecDeque<usize> = VecDeque::new();
    let mut next = 0;
    for i in 0..n {
        let hi = (i + after).min(n - 1);
        while next <= hi {
            let v = input[next];
            while let Some(&back) = window.back() {
                let worse = if take_max { input[back] <= v } else { input[back] >= v };
                if worse {
                    window.pop_back();
                } else {
                    break;
                }
            }
            window.push_back(next);
            next += 1;
        }
        let lo = i.saturating_sub(before);
        while let Some(&front) = window.front() {
            if front < lo {
                window.pop_front();
            } else {
                break;
            }
        }
        out[i] = window.front().map(|&j| input[j]).unwrap_or(0);
    }
}
