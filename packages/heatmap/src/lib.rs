#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Overlap-density heatmap engine for mental map survey responses.
//!
//! Turns a set of participant geometries into a dense latitude/longitude
//! grid of overlap counts:
//!
//! 1. [`normalize`] extracts polygon rings and points from loosely
//!    structured `GeoJSON` (tolerating erroneous `Feature` nesting).
//! 2. [`raster`] samples every candidate cell's lower-left corner against
//!    each ring with the even-odd rule, counting hits and tracking which
//!    feature owns each cell. The async entry point yields to the runtime
//!    in fixed batches and aborts once its [`generation`] ticket has been
//!    superseded.
//! 3. [`smooth`] applies an optional 3×3 mean filter.
//! 4. [`owner`] resolves the feature behind a cell, including the halo
//!    fallback for smoothed edges.
//!
//! The grid uses naive equirectangular degree cells; it makes no attempt
//! at area-correct projection.

pub mod generation;
pub mod grid;
pub mod normalize;
pub mod owner;
pub mod progress;
pub mod raster;
pub mod smooth;

use std::collections::BTreeSet;

use mental_map_survey_models::SurveyFeature;
use thiserror::Error;

pub use generation::{Generation, GenerationTicket};
pub use grid::{CellKey, Grid, OWNER_EMPTY, OWNER_MULTIPLE};
pub use raster::{rasterize, rasterize_now};

/// Errors from rasterization.
#[derive(Debug, Error)]
pub enum RasterizeError {
    /// A newer request replaced this one before it finished.
    #[error("Rasterization superseded by generation {current} (was {requested})")]
    Superseded {
        /// Generation this run was started for.
        requested: u64,
        /// Generation that is current now.
        current: u64,
    },

    /// The cell size is zero, negative or not finite.
    #[error("Invalid cell size: {cell_size}")]
    InvalidCellSize {
        /// The rejected cell size in degrees.
        cell_size: f64,
    },

    /// The shapes span more cells than one grid may hold.
    #[error("Extent of {lng_span}° x {lat_span}° is too large for {cell_size}° cells")]
    ExtentTooLarge {
        /// Longitude extent in degrees.
        lng_span: f64,
        /// Latitude extent in degrees.
        lat_span: f64,
        /// Requested cell size in degrees.
        cell_size: f64,
    },
}

/// Returns the features answering one of the selected questions, in their
/// original order.
///
/// Owner indices in a [`Grid`] built from the result refer to positions in
/// the returned vector.
#[must_use]
pub fn select_features(
    features: &[SurveyFeature],
    selected_question_ids: &BTreeSet<String>,
) -> Vec<SurveyFeature> {
    features
        .iter()
        .filter(|f| selected_question_ids.contains(&f.question_id))
        .cloned()
        .collect()
}
