//! Application icon.
//!
//! The icon is drawn procedurally at every size and packed into a single ICO
//! container of 32-bit DIB images. An existing icon file is never touched.
use std::{io::Write, path::Path};

use crate::error::{format_error, ProvisionError, ProvisionErrorKind};

/// Pixel sizes packed into the icon, smallest first.
pub const ICON_SIZES: [u32; 9] = [16, 20, 24, 32, 40, 48, 64, 128, 256];

const SUPERSAMPLE: u32 = 4;

const ICONDIR_LEN: u32 = 6;
const ICONDIRENTRY_LEN: u32 = 16;
const BITMAPINFOHEADER_LEN: u32 = 40;

const BACKGROUND: [u8; 3] = [0x1e, 0x1e, 0x2e];
const RING: [u8; 3] = [0x89, 0xb4, 0xfa];
const DOT: [u8; 3] = [0xf3, 0x8b, 0xa8];

/// Square RGBA image, rows top to bottom.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IconImage {
    size: u32,
    rgba: Vec<u8>,
}

impl IconImage {
    /// Creates an image from RGBA pixels.
    pub fn new(size: u32, rgba: Vec<u8>) -> Result<Self, ProvisionError> {
        if size == 0 || size > 256 || rgba.len() != (size * size * 4) as usize {
            return Err(ProvisionError::new(ProvisionErrorKind::InvalidInput)
                .with_context(format!("bad icon image of size {size}")));
        }

        Ok(Self { size, rgba })
    }

    /// Returns the width and height in pixels.
    pub fn size(&self) -> u32 {
        self.size
    }

    /// Returns the RGBA value at the given pixel.
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let index = ((y * self.size + x) * 4) as usize;
        let mut pixel = [0; 4];
        pixel.copy_from_slice(&self.rgba[index..index + 4]);
        pixel
    }

    fn and_mask_row_len(&self) -> u32 {
        self.size.div_ceil(32) * 4
    }

    fn dib_len(&self) -> u32 {
        BITMAPINFOHEADER_LEN
            + self.size * self.size * 4
            + self.and_mask_row_len() * self.size
    }
}

/// Outcome of [`ensure_icon()`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IconStatus {
    /// The file already existed and was left alone.
    Existing,
    /// The file was generated.
    Generated,
    /// The file could not be written; shortcuts fall back to a default icon.
    Missing,
}

impl IconStatus {
    /// Returns whether an icon file is available.
    pub fn is_available(&self) -> bool {
        !matches!(self, Self::Missing)
    }
}

/// Generates the icon file unless it exists.
///
/// A write failure is logged as a warning and reported as [`IconStatus::Missing`].
pub fn ensure_icon(path: &Path) -> IconStatus {
    if path.exists() {
        tracing::debug!(?path, "icon exists");
        return IconStatus::Existing;
    }

    tracing::info!(?path, "generating icon");

    match write_icon(path) {
        Ok(()) => IconStatus::Generated,
        Err(error) => {
            tracing::warn!(?path, error = %format_error(&error), "could not generate icon");
            IconStatus::Missing
        }
    }
}

fn write_icon(path: &Path) -> Result<(), ProvisionError> {
    let images = ICON_SIZES
        .iter()
        .map(|&size| render_glyph(size))
        .collect::<Vec<_>>();

    let mut buf = Vec::new();
    encode_ico(&images, &mut buf)?;

    crate::os::write_file_atomic(path, &buf, false)
}

/// Draws the app glyph: a dark rounded square holding an aperture ring and a
/// record dot.
pub fn render_glyph(size: u32) -> IconImage {
    let mut rgba = Vec::with_capacity((size * size * 4) as usize);
    let samples = SUPERSAMPLE * SUPERSAMPLE;

    for y in 0..size {
        for x in 0..size {
            let mut sum = [0u32; 3];
            let mut covered = 0u32;

            for sy in 0..SUPERSAMPLE {
                for sx in 0..SUPERSAMPLE {
                    let u = (x as f32 + (sx as f32 + 0.5) / SUPERSAMPLE as f32) / size as f32;
                    let v = (y as f32 + (sy as f32 + 0.5) / SUPERSAMPLE as f32) / size as f32;

                    if let Some(color) = glyph_sample(u, v) {
                        covered += 1;
                        for (total, channel) in sum.iter_mut().zip(color) {
                            *total += channel as u32;
                        }
                    }
                }
            }

            if covered == 0 {
                rgba.extend_from_slice(&[0, 0, 0, 0]);
            } else {
                for total in sum {
                    rgba.push((total / covered) as u8);
                }
                rgba.push((covered * 255 / samples) as u8);
            }
        }
    }

    IconImage { size, rgba }
}

/// Returns the colour at a point in unit coordinates, topmost layer first.
fn glyph_sample(u: f32, v: f32) -> Option<[u8; 3]> {
    let dot = distance(u, v, 0.72, 0.28);
    if dot <= 0.09 {
        return Some(DOT);
    }

    let ring = distance(u, v, 0.5, 0.54);
    if (0.18..=0.29).contains(&ring) {
        return Some(RING);
    }

    if in_rounded_square(u, v, 0.04, 0.2) {
        return Some(BACKGROUND);
    }

    None
}

fn distance(u: f32, v: f32, cu: f32, cv: f32) -> f32 {
    ((u - cu).powi(2) + (v - cv).powi(2)).sqrt()
}

fn in_rounded_square(u: f32, v: f32, inset: f32, radius: f32) -> bool {
    let half = 0.5 - inset;
    let qu = ((u - 0.5).abs() - (half - radius)).max(0.0);
    let qv = ((v - 0.5).abs() - (half - radius)).max(0.0);

    (u - 0.5).abs() <= half && (v - 0.5).abs() <= half && (qu * qu + qv * qv).sqrt() <= radius
}

/// Packs images into an ICO container.
///
/// Each entry is a `BITMAPINFOHEADER` DIB with bottom-up BGRA rows followed
/// by an all-zero AND mask; alpha carries the transparency.
pub fn encode_ico<W: Write>(images: &[IconImage], mut writer: W) -> Result<(), ProvisionError> {
    if images.is_empty() || images.len() > u16::MAX as usize {
        return Err(ProvisionError::new(ProvisionErrorKind::InvalidInput)
            .with_context("icon needs at least one image"));
    }

    writer.write_all(&0u16.to_le_bytes())?;
    writer.write_all(&1u16.to_le_bytes())?;
    writer.write_all(&(images.len() as u16).to_le_bytes())?;

    let mut offset = ICONDIR_LEN + ICONDIRENTRY_LEN * images.len() as u32;

    for image in images {
        // 256 is stored as 0 in the one-byte dimension fields.
        let dimension = if image.size >= 256 { 0 } else { image.size as u8 };

        writer.write_all(&[dimension, dimension, 0, 0])?;
        writer.write_all(&1u16.to_le_bytes())?;
        writer.write_all(&32u16.to_le_bytes())?;
        writer.write_all(&image.dib_len().to_le_bytes())?;
        writer.write_all(&offset.to_le_bytes())?;

        offset += image.dib_len();
    }

    for image in images {
        write_dib(image, &mut writer)?;
    }

    writer.flush()?;

    Ok(())
}

fn write_dib<W: Write>(image: &IconImage, writer: &mut W) -> Result<(), ProvisionError> {
    let size = image.size;
    let image_len = image.dib_len() - BITMAPINFOHEADER_LEN;

    writer.write_all(&BITMAPINFOHEADER_LEN.to_le_bytes())?;
    writer.write_all(&(size as i32).to_le_bytes())?;
    // Height covers both the colour and the mask bitmaps.
    writer.write_all(&(size as i32 * 2).to_le_bytes())?;
    writer.write_all(&1u16.to_le_bytes())?;
    writer.write_all(&32u16.to_le_bytes())?;
    writer.write_all(&0u32.to_le_bytes())?;
    writer.write_all(&image_len.to_le_bytes())?;
    writer.write_all(&0i32.to_le_bytes())?;
    writer.write_all(&0i32.to_le_bytes())?;
    writer.write_all(&0u32.to_le_bytes())?;
    writer.write_all(&0u32.to_le_bytes())?;

    let mut row = Vec::with_capacity(size as usize * 4);

    for y in (0..size).rev() {
        row.clear();
        for x in 0..size {
            let [r, g, b, a] = image.pixel(x, y);
            row.extend_from_slice(&[b, g, r, a]);
        }
        writer.write_all(&row)?;
    }

    let mask = vec![0u8; (image.and_mask_row_len() * size) as usize];
    writer.write_all(&mask)?;

    Ok(())
}
