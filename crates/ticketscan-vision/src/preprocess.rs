// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Frame preprocessing: downscale to working resolution, grayscale, and
// morphological/Gaussian denoising ahead of edge detection. Operates on the
// camera buffer in place via borrowed `image` views; every grayscale stage
// output is a pooled working buffer.

use image::imageops::{self, FilterType};
use image::{GrayImage, ImageBuffer, Luma, Pixel, Rgb, Rgba};
use imageproc::filter::gaussian_blur_f32;
use imageproc::morphology::{Mask, grayscale_dilate, grayscale_erode};
use ticketscan_core::error::{Result, ScanError};
use ticketscan_core::{DetectorConfig, Frame, PixelFormat};
use tracing::{debug, instrument};

use crate::buffers::{BufferPool, WorkingBuffer};

/// Compute the working resolution `floor(W/f) x floor(H/f)`.
///
/// Fails when either side collapses to zero.
pub fn working_size(frame_width: u32, frame_height: u32, factor: u32) -> Result<(u32, u32)> {
    let factor = factor.max(1);
    let (scaled_width, scaled_height) = (frame_width / factor, frame_height / factor);
    if scaled_width == 0 || scaled_height == 0 {
        return Err(ScanError::Dimension {
            frame_width,
            frame_height,
            factor,
            scaled_width,
            scaled_height,
        });
    }
    Ok((scaled_width, scaled_height))
}

/// A frame resampled to working resolution, still in its source layout.
pub struct Downscaled {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    data: Vec<u8>,
}

/// Stateless preprocessing steps, parameterised once from the configuration.
pub struct Preprocessor {
    morph_mask: Mask,
    blur_sigma: f32,
}

impl Preprocessor {
    pub fn new(config: &DetectorConfig) -> Self {
        Self {
            morph_mask: elliptical_mask(config.morph_kernel_size),
            blur_sigma: sigma_for_kernel(config.blur_kernel_size),
        }
    }

    /// Resample the frame to `width` x `height` with bilinear filtering.
    #[instrument(skip(self, frame), fields(from_w = frame.width(), from_h = frame.height()))]
    pub fn downscale(&self, frame: &Frame, width: u32, height: u32) -> Result<Downscaled> {
        frame.check_layout()?;
        let data = match frame.format() {
            PixelFormat::Luma8 => resize_packed::<Luma<u8>>(frame, width, height)?,
            PixelFormat::Rgb8 => resize_packed::<Rgb<u8>>(frame, width, height)?,
            // Resampling is channel-agnostic, so BGRA rides on the RGBA path.
            PixelFormat::Rgba8 | PixelFormat::Bgra8 => {
                resize_packed::<Rgba<u8>>(frame, width, height)?
            }
        };
        debug!(width, height, "frame downscaled");
        Ok(Downscaled {
            width,
            height,
            format: frame.format(),
            data,
        })
    }

    /// Collapse the downscaled frame to one luma channel in a pooled buffer.
    pub fn grayscale<'p>(
        &self,
        source: &Downscaled,
        pool: &'p BufferPool,
    ) -> Result<WorkingBuffer<'p>> {
        let mut gray = pool.acquire(source.width, source.height)?;
        let channels = source.format.channels();
        let expected = gray.len() * channels;
        if source.data.len() != expected {
            return Err(ScanError::Image(format!(
                "downscaled buffer holds {} bytes, expected {expected}",
                source.data.len()
            )));
        }

        let (r, b) = match source.format {
            PixelFormat::Bgra8 => (2, 0),
            _ => (0, 2),
        };
        for (dst, px) in gray.iter_mut().zip(source.data.chunks_exact(channels)) {
            *dst = if channels == 1 {
                px[0]
            } else {
                luma(px[r], px[1], px[b])
            };
        }
        Ok(gray)
    }

    /// Morphological opening: erode then dilate. Removes small bright specks.
    pub fn open<'p>(&self, image: &GrayImage, pool: &'p BufferPool) -> Result<WorkingBuffer<'p>> {
        let eroded = pool.adopt(grayscale_erode(image, &self.morph_mask))?;
        pool.adopt(grayscale_dilate(&eroded, &self.morph_mask))
    }

    /// Morphological closing: dilate then erode. Fills small dark gaps.
    pub fn close<'p>(&self, image: &GrayImage, pool: &'p BufferPool) -> Result<WorkingBuffer<'p>> {
        let dilated = pool.adopt(grayscale_dilate(image, &self.morph_mask))?;
        pool.adopt(grayscale_erode(&dilated, &self.morph_mask))
    }

    /// Gaussian blur to knock down residual high-frequency noise.
    pub fn blur<'p>(&self, image: &GrayImage, pool: &'p BufferPool) -> Result<WorkingBuffer<'p>> {
        pool.adopt(gaussian_blur_f32(image, self.blur_sigma))
    }
}

fn resize_packed<P>(frame: &Frame, width: u32, height: u32) -> Result<Vec<u8>>
where
    P: Pixel<Subpixel = u8> + 'static,
{
    let view: ImageBuffer<P, &[u8]> =
        ImageBuffer::from_raw(frame.width(), frame.height(), frame.data()).ok_or_else(|| {
            ScanError::BufferFormat {
                width: frame.width(),
                height: frame.height(),
                format: frame.format(),
                expected: frame.expected_len(),
                actual: frame.data().len(),
            }
        })?;
    Ok(imageops::resize(&view, width, height, FilterType::Triangle).into_raw())
}

/// ITU-R BT.601 luma in 14-bit fixed point.
fn luma(r: u8, g: u8, b: u8) -> u8 {
    let y = (r as u32 * 4899 + g as u32 * 9617 + b as u32 * 1868 + (1 << 13)) >> 14;
    y.min(255) as u8
}

/// Elliptical structuring element inscribed in a `size` x `size` square.
///
/// For size 5 this yields the familiar shape with single-pixel tips on the
/// first and last rows and full middle rows.
pub fn elliptical_mask(size: u32) -> Mask {
    let size = size.max(1);
    let radius = (size / 2) as i64;
    let mut image = GrayImage::new(size, size);
    for row in 0..size as i64 {
        let dy = row - radius;
        let reach = if radius == 0 {
            0.0
        } else {
            let r2 = (radius * radius) as f64;
            radius as f64 * ((r2 - (dy * dy) as f64).max(0.0) / r2).sqrt()
        };
        let dx = reach.round() as i64;
        let first = (radius - dx).max(0);
        let last = (radius + dx).min(size as i64 - 1);
        for col in first..=last {
            image.put_pixel(col as u32, row as u32, Luma([255]));
        }
    }
    Mask::from_image(&image, radius as u8, radius as u8)
}

/// Gaussian sigma conventionally paired with a `size`-tap kernel.
pub fn sigma_for_kernel(size: u32) -> f32 {
    0.3 * ((size as f32 - 1.0) * 0.5 - 1.0) + 0.8
}
