//! Overlay compositing module - turns one source photo into one output file
//!
//! Includes:
//! - Image decoding
//! - EXIF orientation correction
//! - Landscape/portrait overlay selection
//! - Overlay resize and alpha blend
//! - Atomic JPEG encoding

use std::collections::BTreeMap;
use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, RgbImage, imageops};

use crate::common::errors::PipelineError;
use crate::common::{JPEG_QUALITY, OUTPUT_EXTENSION, PROCESSED_MARKER};
use crate::utils::PathExt;
use crate::workflow::types::Orientation;

// ────────────────────────────────────────────────────────────────
// Public API
// ────────────────────────────────────────────────────────────────

/// Composite the orientation-matched overlay onto the photo at `source_path`
/// and write the result into `output_folder`.
///
/// The overlay is stretched to the exact corrected source dimensions, blended
/// with its per-pixel alpha, flattened to RGB and encoded as JPEG. The output
/// file is either fully written or not written at all; an existing file at
/// the destination is overwritten without warning.
pub fn composite(
    source_path: &Path,
    landscape_overlay: Option<&Path>,
    portrait_overlay: Option<&Path>,
    output_folder: &Path,
    file_prefix: &str,
) -> Result<PathBuf, PipelineError> {
    let file_in_memory = fs::read(source_path).map_err(|e| PipelineError::DecodeFailed {
        path: source_path.to_path_buf(),
        cause: anyhow::Error::new(e).context("failed to read source file into memory"),
    })?;

    let mut source =
        image::load_from_memory(&file_in_memory).map_err(|e| PipelineError::DecodeFailed {
            path: source_path.to_path_buf(),
            cause: anyhow::Error::new(e).context("failed to decode source image"),
        })?;

    // Orientation metadata must be applied before the landscape/portrait
    // decision, or sideways portraits would pick the landscape overlay.
    let exif_vec = generate_exif_fields(&file_in_memory);
    fix_image_orientation(&exif_vec, &mut source);

    let (width, height) = (source.width(), source.height());
    let orientation = Orientation::from_dimensions(width, height);

    let overlay_path = select_overlay(orientation, landscape_overlay, portrait_overlay)?;
    let overlay = image::open(overlay_path).map_err(|e| PipelineError::DecodeFailed {
        path: overlay_path.to_path_buf(),
        cause: anyhow::Error::new(e).context("failed to decode overlay image"),
    })?;

    let blended = blend_overlay(&source, &overlay, width, height);

    let output_path = output_file_path(source_path, output_folder, file_prefix);
    encode_jpeg(&blended, &output_path).map_err(|cause| PipelineError::EncodeFailed {
        path: source_path.to_path_buf(),
        cause,
    })?;

    Ok(output_path)
}

/// Output naming rule: `{prefix}{stem}_processed.jpg`, always a JPEG no
/// matter what the source extension was.
pub fn output_file_path(source_path: &Path, output_folder: &Path, file_prefix: &str) -> PathBuf {
    output_folder.join(format!(
        "{}{}{}.{}",
        file_prefix,
        source_path.stem_str(),
        PROCESSED_MARKER,
        OUTPUT_EXTENSION
    ))
}

// ────────────────────────────────────────────────────────────────
// Overlay Selection
// ────────────────────────────────────────────────────────────────

/// The overlay for the source's orientation, never the other one: falling
/// back silently would put a portrait frame on a landscape photo.
fn select_overlay<'a>(
    orientation: Orientation,
    landscape_overlay: Option<&'a Path>,
    portrait_overlay: Option<&'a Path>,
) -> Result<&'a Path, PipelineError> {
    let configured = match orientation {
        Orientation::Landscape => landscape_overlay,
        Orientation::Portrait => portrait_overlay,
    };
    match configured {
        None => Err(PipelineError::OverlayMissing {
            orientation,
            detail: "not configured".into(),
        }),
        Some(path) if !path.is_file() => Err(PipelineError::OverlayMissing {
            orientation,
            detail: format!("no file at {:?}", path),
        }),
        Some(path) => Ok(path),
    }
}

// ────────────────────────────────────────────────────────────────
// EXIF Orientation Correction
// ────────────────────────────────────────────────────────────────

/// Collect EXIF fields as display strings, keyed by tag name. Files without
/// EXIF (plain PNGs, stripped JPEGs) simply yield an empty map.
pub fn generate_exif_fields(file_in_memory: &[u8]) -> BTreeMap<String, String> {
    let mut exif_vec = BTreeMap::new();
    let mut cursor = Cursor::new(file_in_memory);
    if let Ok(exif) = exif::Reader::new().read_from_container(&mut cursor) {
        for field in exif.fields() {
            exif_vec.insert(
                field.tag.to_string(),
                field.display_value().with_unit(&exif).to_string(),
            );
        }
    }
    exif_vec
}

/// Rotate the decoded pixels so they match the displayed orientation.
/// Mirrored orientation values are left alone.
pub fn fix_image_orientation(
    exif_vec: &BTreeMap<String, String>,
    dynamic_image: &mut DynamicImage,
) {
    if let Some(orientation) = exif_vec.get("Orientation") {
        match orientation.as_str() {
            "row 0 at right and column 0 at top" => {
                *dynamic_image = dynamic_image.rotate90();
            }
            "row 0 at bottom and column 0 at right" => {
                *dynamic_image = dynamic_image.rotate180();
            }
            "row 0 at left and column 0 at bottom" => {
                *dynamic_image = dynamic_image.rotate270();
            }
            _ => (),
        }
    }
}

// ────────────────────────────────────────────────────────────────
// Blend
// ────────────────────────────────────────────────────────────────

/// Stretch the overlay to the exact source dimensions (aspect deliberately
/// not preserved), alpha-blend it over the source and flatten to RGB.
fn blend_overlay(
    source: &DynamicImage,
    overlay: &DynamicImage,
    width: u32,
    height: u32,
) -> RgbImage {
    let overlay_resized = overlay
        .resize_exact(width, height, FilterType::Lanczos3)
        .to_rgba8();

    let mut canvas = source.to_rgba8();
    imageops::overlay(&mut canvas, &overlay_resized, 0, 0);

    DynamicImage::ImageRgba8(canvas).to_rgb8()
}

// ────────────────────────────────────────────────────────────────
// Encoding
// ────────────────────────────────────────────────────────────────

/// Encode to a buffer, stage next to the destination and rename into place,
/// so a failed write never leaves a truncated output behind.
fn encode_jpeg(image: &RgbImage, output_path: &Path) -> Result<()> {
    let mut buffer = Vec::new();
    let encoder = JpegEncoder::new_with_quality(Cursor::new(&mut buffer), JPEG_QUALITY);
    image
        .write_with_encoder(encoder)
        .context("jpeg encoding failed")?;

    let staging_path = output_path.with_extension("tmp");
    fs::write(&staging_path, &buffer)
        .context(format!("failed to write staging file {:?}", staging_path))?;
    fs::rename(&staging_path, output_path).context(format!(
        "failed to move staging file into place at {:?}",
        output_path
    ))?;

    Ok(())
}
