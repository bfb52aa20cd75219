//! Image and SVG export of heatmaps and participant maps.
//!
//! Encoding always happens in memory first; a file is only written once
//! the complete document exists, so a failed export leaves nothing behind.

use std::io::Cursor;
use std::path::{Path, PathBuf};

use image::{DynamicImage, ImageFormat, Rgb, RgbImage, RgbaImage};
use mental_map_heatmap::Grid;
use mental_map_survey_models::GridCellSize;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use thiserror::Error;

use crate::RendererConfig;
use crate::canvas::CanvasRenderer;
use crate::projection::{Projection, Viewport, WebMercator};
use crate::surface::SvgSurface;
use crate::vector::VectorRenderer;

/// Relative padding around exported content.
pub const EXPORT_PADDING: f64 = 0.05;

/// Output format of an export.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Png,
    Jpeg,
    Svg,
}

impl ExportFormat {
    /// File extension without the dot.
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpg",
            Self::Svg => "svg",
        }
    }

    /// Whether the format is a raster image.
    #[must_use]
    pub const fn is_raster(self) -> bool {
        matches!(self, Self::Png | Self::Jpeg)
    }
}

/// Errors from exporting a map.
#[derive(Debug, Error)]
pub enum ExportError {
    /// Image encoding failed.
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// Writing the output failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The SVG writer produced invalid UTF-8.
    #[error("SVG encoding error: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    /// The format cannot hold this kind of output.
    #[error("Format {format} is not supported for this export")]
    UnsupportedFormat {
        /// The rejected format.
        format: ExportFormat,
    },

    /// There is nothing to draw.
    #[error("Nothing to export")]
    Empty,
}

/// Replaces every character outside `[A-Za-z0-9-]` with `_`.
#[must_use]
pub fn sanitize_label(label: &str) -> String {
    label
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect()
}

/// `Heatmap_<selection>_grid<size>.<ext>`
#[must_use]
pub fn heatmap_file_name(selection_label: &str, grid_size: GridCellSize, format: ExportFormat) -> String {
    format!(
        "Heatmap_{}_grid{grid_size}.{}",
        sanitize_label(selection_label),
        format.extension()
    )
}

/// `MentalMap_<participant>_<question>_mit_Karte.<ext>`
#[must_use]
pub fn participant_file_name(
    participant_code: &str,
    question_label: &str,
    format: ExportFormat,
) -> String {
    format!(
        "MentalMap_{}_{}_mit_Karte.{}",
        sanitize_label(participant_code),
        sanitize_label(question_label),
        format.extension()
    )
}

/// Encodes a rendered frame as PNG or JPEG.
///
/// JPEG has no alpha channel, so the frame is composited onto white first.
///
/// # Errors
///
/// * [`ExportError::UnsupportedFormat`] for [`ExportFormat::Svg`]
/// * [`ExportError::Image`] if encoding fails
pub fn encode_raster(image: &RgbaImage, format: ExportFormat) -> Result<Vec<u8>, ExportError> {
    let mut bytes = Vec::new();
    match format {
        ExportFormat::Png => DynamicImage::ImageRgba8(image.clone())
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)?,
        ExportFormat::Jpeg => DynamicImage::ImageRgb8(flatten_onto_white(image))
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Jpeg)?,
        ExportFormat::Svg => return Err(ExportError::UnsupportedFormat { format }),
    }
    Ok(bytes)
}

/// Alpha-composites `image` over an opaque white background.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn flatten_onto_white(image: &RgbaImage) -> RgbImage {
    RgbImage::from_fn(image.width(), image.height(), |x, y| {
        let [r, g, b, a] = image.get_pixel(x, y).0;
        let alpha = f32::from(a) / 255.0;
        let blend = |c: u8| {
            f32::from(c)
                .mul_add(alpha, 255.0 * (1.0 - alpha))
                .round()
                .clamp(0.0, 255.0) as u8
        };
        Rgb([blend(r), blend(g), blend(b)])
    })
}

/// Serializes an [`SvgSurface`] into a complete document.
///
/// # Errors
///
/// Returns [`ExportError`] if the writer fails.
pub fn encode_svg(surface: &SvgSurface, projection: &dyn Projection) -> Result<Vec<u8>, ExportError> {
    let mut bytes = Vec::new();
    surface.write_svg(&mut bytes, projection)?;
    // Validate before handing the document out.
    let document = String::from_utf8(bytes)?;
    Ok(document.into_bytes())
}

/// Options for a heatmap export.
#[derive(Debug, Clone, Copy)]
pub struct HeatmapExportOptions {
    pub format: ExportFormat,
    pub width: u32,
    pub height: u32,
    pub min_overlap: u32,
    pub visual_blur: bool,
}

/// Renders a whole grid, fitted to its bounds, into export bytes.
///
/// Raster formats use the canvas renderer and SVG the vector renderer, so
/// both honour the same qualifying rule.
///
/// # Errors
///
/// * [`ExportError::Empty`] for an empty grid
/// * [`ExportError::Image`] / [`ExportError::Io`] if encoding fails
pub fn export_heatmap(
    grid: &Grid,
    options: &HeatmapExportOptions,
    config: &RendererConfig,
) -> Result<Vec<u8>, ExportError> {
    let bounds = grid.bounds().ok_or(ExportError::Empty)?;
    let viewport = Viewport::fit(
        bounds,
        options.width,
        options.height,
        EXPORT_PADDING,
        grid.cell_size(),
    );
    let projection = WebMercator::new(viewport);

    if options.format.is_raster() {
        let mut renderer = CanvasRenderer::new(*config);
        let drawn = renderer.redraw(grid, options.min_overlap, options.visual_blur, &projection);
        log::info!("Exporting {} heatmap cells as {}", drawn.len(), options.format);
        encode_raster(renderer.image(), options.format)
    } else {
        let mut surface = SvgSurface::new();
        let drawn = VectorRenderer::new(*config).render(&mut surface, grid, options.min_overlap);
        log::info!("Exporting {} heatmap cells as {}", drawn.len(), options.format);
        encode_svg(&surface, &projection)
    }
}

/// Writes export bytes to `dir/file_name`, creating `dir` if needed.
///
/// # Errors
///
/// Returns [`ExportError::Io`] if the directory or file cannot be written.
pub fn write_export(dir: &Path, file_name: &str, bytes: &[u8]) -> Result<PathBuf, ExportError> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(file_name);
    std::fs::write(&path, bytes)?;
    log::info!("Wrote {} ({} bytes)", path.display(), bytes.len());
    Ok(path)
}
