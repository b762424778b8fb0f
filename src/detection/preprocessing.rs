use image::{DynamicImage, GrayImage, Luma};
use imageproc::contrast::otsu_level;
use imageproc::edges::canny;
use imageproc::filter::gaussian_blur_f32;
use imageproc::map::map_colors;
use tracing::debug;

use crate::config::{BinarizeMode, BinarizeParams, MorphologyOrder};
use crate::detection::morphology::{self, RectKernel};

/// Convert image to grayscale
pub fn to_grayscale(img: &DynamicImage) -> GrayImage {
    img.to_luma8()
}

/// Apply Gaussian blur to reduce noise
pub fn apply_blur(img: &GrayImage, sigma: f32) -> GrayImage {
    if sigma <= 0.0 {
        return img.clone();
    }
    gaussian_blur_f32(img, sigma)
}

/// Detect edges using Canny edge detector
pub fn detect_edges(img: &GrayImage, low_threshold: f32, high_threshold: f32) -> GrayImage {
    canny(img, low_threshold, high_threshold)
}

/// Sigma OpenCV-style Gaussian kernels use for a given odd size.
pub fn sigma_for_kernel(size: u32) -> f32 {
    0.3 * ((size as f32 - 1.0) * 0.5 - 1.0) + 0.8
}

/// Produce the canonical binary mask: ink = 255, background = 0.
///
/// A raster without contrast has no ink and yields an all-background mask.
pub fn binarize(img: &DynamicImage, params: &BinarizeParams) -> GrayImage {
    let gray = to_grayscale(img);
    binarize_gray(&gray, params)
}

pub fn binarize_gray(gray: &GrayImage, params: &BinarizeParams) -> GrayImage {
    let (width, height) = gray.dimensions();
    let (lo, hi) = gray
        .pixels()
        .fold((u8::MAX, u8::MIN), |(lo, hi), p| (lo.min(p[0]), hi.max(p[0])));
    if width == 0 || height == 0 || lo == hi {
        debug!(width, height, "no contrast, returning empty mask");
        return GrayImage::new(width, height);
    }

    let mut binary = match params.mode {
        BinarizeMode::AdaptiveGaussian => adaptive_gaussian(gray, params.block_size, params.c),
        BinarizeMode::OtsuInverse => {
            let level = otsu_level(gray);
            debug!(level, "otsu level");
            inverse_threshold(gray, level)
        }
        BinarizeMode::FixedInverse => inverse_threshold(gray, params.fixed_level),
    };

    if params.remove_horizontal_lines {
        binary = remove_horizontal_lines(&binary, params.line_removal_width);
    }

    match params.morphology {
        MorphologyOrder::None => binary,
        MorphologyOrder::OpenClose => {
            let opened = morphology::open_square(&binary, params.kernel_size);
            morphology::close_square(&opened, params.kernel_size)
        }
        MorphologyOrder::CloseOpen => {
            let closed = morphology::close_square(&binary, params.kernel_size);
            morphology::open_square(&closed, params.kernel_size)
        }
    }
}

/// Pixels brighter than `level` become background, the rest ink.
pub fn inverse_threshold(gray: &GrayImage, level: u8) -> GrayImage {
    map_colors(gray, |p: Luma<u8>| if p[0] > level { Luma([0u8]) } else { Luma([255u8]) })
}

/// Ink where a pixel is at least `c` darker than its Gaussian-weighted
/// neighbourhood mean.
pub fn adaptive_gaussian(gray: &GrayImage, block_size: u32, c: f32) -> GrayImage {
    let local_mean = gaussian_blur_f32(gray, sigma_for_kernel(block_size));
    let mut out = GrayImage::new(gray.width(), gray.height());
    for (x, y, pixel) in gray.enumerate_pixels() {
        let threshold = local_mean.get_pixel(x, y)[0] as f32 - c;
        let value = if pixel[0] as f32 > threshold { 0u8 } else { 255u8 };
        out.put_pixel(x, y, Luma([value]));
    }
    out
}

/// Runs of ink at least `width` pixels long on a single row.
pub fn horizontal_lines(binary: &GrayImage, width: u32) -> GrayImage {
    morphology::open(binary, RectKernel::horizontal(width))
}

/// Strip long horizontal runs (staff lines) while keeping glyph ink.
pub fn remove_horizontal_lines(binary: &GrayImage, width: u32) -> GrayImage {
    let lines = horizontal_lines(binary, width);
    morphology::subtract(binary, &lines)
}
