#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Heatmap rendering and export.
//!
//! Two strategies draw the same set of qualifying cells:
//!
//! - **Canvas** ([`canvas::CanvasRenderer`]) paints only the cells visible
//!   in the current viewport into an RGBA raster and is used for fine grids
//!   where one shape per cell would be too many.
//! - **Vector** ([`vector::VectorRenderer`]) adds one rectangle per cell to a
//!   [`vector::MapSurface`], tracking the handles it created so it can
//!   remove exactly those again.
//!
//! [`RenderStrategy::for_cell_size`] picks between them using
//! [`RendererConfig::canvas_threshold_degrees`]. Every structural change is
//! a full clear and redraw.

pub mod canvas;
pub mod export;
pub mod projection;
pub mod ramp;
pub mod surface;
pub mod vector;
pub mod viewer;

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

pub use export::ExportError;

/// Tunables shared by both renderers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RendererConfig {
    /// Cell sizes strictly below this many degrees use the canvas path.
    pub canvas_threshold_degrees: f64,
    /// Opacity of the weakest drawn cell.
    pub alpha_floor: f32,
    /// Opacity of the strongest drawn cell.
    pub alpha_ceiling: f32,
    /// Gaussian sigma (pixels) of the optional visual blur.
    pub blur_sigma: f32,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            canvas_threshold_degrees: 0.051,
            alpha_floor: 0.35,
            alpha_ceiling: 0.85,
            blur_sigma: 1.5,
        }
    }
}

/// Which renderer draws a grid.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum RenderStrategy {
    /// Viewport-clipped raster.
    Canvas,
    /// One shape per qualifying cell.
    Vector,
}

impl RenderStrategy {
    /// Canvas for cell sizes below the configured threshold, vector
    /// otherwise.
    #[must_use]
    pub fn for_cell_size(cell_size: f64, config: &RendererConfig) -> Self {
        if cell_size < config.canvas_threshold_degrees {
            Self::Canvas
        } else {
            Self::Vector
        }
    }
}
