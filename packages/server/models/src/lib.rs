#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! API request and response types for the mental map analysis server.
//!
//! These types are serialized to JSON for the REST API. They are separate
//! from the engine types to allow independent evolution of the API
//! contract.

use mental_map_survey_models::{GridCellSize, SelectionState};
use serde::{Deserialize, Serialize};

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiHealth {
    /// Whether the server is healthy.
    pub healthy: bool,
    /// Server version.
    pub version: String,
}

/// Query parameters selecting and configuring a heatmap.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeatmapQueryParams {
    /// Comma-separated question ids; all questions when absent.
    pub questions: Option<String>,
    /// Grid cell size (`"0.05"`, `"0.1"`, `"0.25"` or `"0.5"`).
    pub grid_size: Option<GridCellSize>,
    /// Minimum overlap for a cell to be returned.
    pub min_overlap: Option<u32>,
    /// Apply 3×3 smoothing.
    pub smoothing: Option<bool>,
}

impl HeatmapQueryParams {
    /// Applies these parameters on top of `base`.
    ///
    /// Parameters that are absent keep the value from `base`; an empty
    /// `questions` list selects nothing.
    #[must_use]
    pub fn apply_to(&self, base: &SelectionState) -> SelectionState {
        let mut selection = base.clone();
        if let Some(questions) = &self.questions {
            selection.selected_question_ids = questions
                .split(',')
                .map(str::trim)
                .filter(|q| !q.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(grid_size) = self.grid_size {
            selection.grid_size = grid_size;
        }
        if let Some(min_overlap) = self.min_overlap {
            selection.min_overlap_threshold = min_overlap;
        }
        if let Some(smoothing) = self.smoothing {
            selection.smoothing_enabled = smoothing;
        }
        selection
    }
}

/// Query parameters for a tooltip lookup.
///
/// Repeats the heatmap parameters because the tooltip is computed against
/// the same grid.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TooltipQueryParams {
    /// Cursor latitude.
    pub lat: f64,
    /// Cursor longitude.
    pub lng: f64,
    pub questions: Option<String>,
    pub grid_size: Option<GridCellSize>,
    pub min_overlap: Option<u32>,
    pub smoothing: Option<bool>,
}

impl TooltipQueryParams {
    /// The heatmap part of the query.
    #[must_use]
    pub fn heatmap(&self) -> HeatmapQueryParams {
        HeatmapQueryParams {
            questions: self.questions.clone(),
            grid_size: self.grid_size,
            min_overlap: self.min_overlap,
            smoothing: self.smoothing,
        }
    }
}

/// Query parameters for a reverse lookup.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ReverseGeocodeParams {
    pub lat: f64,
    pub lng: f64,
}

/// One qualifying heatmap cell.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiHeatmapCell {
    /// Latitude key (`floor(lat / cellSize)`).
    pub lat_key: i64,
    /// Longitude key (`floor(lng / cellSize)`).
    pub lng_key: i64,
    /// Raw count or smoothed value.
    pub value: f32,
    /// Ramp color as `#rrggbb`.
    pub color: String,
    /// Fill opacity.
    pub opacity: f32,
}

/// A computed heatmap.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiHeatmap {
    /// Study the heatmap was computed for.
    pub study_id: String,
    /// Label of the selected questions, as used in export file names.
    pub selection_label: String,
    /// Cell size in degrees.
    pub cell_size: f64,
    /// `"canvas"` or `"vector"`.
    pub render_strategy: String,
    /// Number of cells along the longitude axis.
    pub width: usize,
    /// Number of cells along the latitude axis.
    pub height: usize,
    /// Latitude key of the first row.
    pub min_lat_key: i64,
    /// Longitude key of the first column.
    pub min_lng_key: i64,
    /// Largest value in the grid.
    pub max_value: f32,
    /// Whether values are smoothed.
    pub smoothed: bool,
    /// Whether the selection spans more than the large-area limit.
    pub area_too_large: bool,
    /// Whether nothing was rasterized.
    pub empty: bool,
    /// Features that fed the grid.
    pub feature_count: usize,
    /// Qualifying cells in grid order.
    pub cells: Vec<ApiHeatmapCell>,
}

/// Tooltip content for a hovered point.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiTooltip {
    pub lat_key: i64,
    pub lng_key: i64,
    /// Value as displayed (whole or two decimals).
    pub count_label: String,
    /// Owning participant, if exactly one.
    pub participant_code: Option<String>,
    /// Resolved place name, if available without waiting.
    pub location: Option<String>,
    /// Place name or the loading placeholder.
    pub location_text: String,
}

/// How a reverse lookup was answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ApiLookupStatus {
    Cached,
    Fetched,
    Throttled,
    InFlight,
    Failed,
}

/// Result of a reverse lookup.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiReverseGeocode {
    pub status: ApiLookupStatus,
    /// Formatted place name when resolved.
    pub label: Option<String>,
    /// ISO country code when resolved.
    pub country_code: Option<String>,
}
