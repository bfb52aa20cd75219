#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Survey response geometry, grid size and selection types.
//!
//! These types describe what a participant drew on the map (one
//! [`SurveyFeature`] per geometric answer) and how a researcher has
//! configured the heatmap analysis ([`SelectionState`]). They are shared by
//! the rasterizer, the renderers, the analysis session and the API layer.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use geo::{Coord, LineString};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Participant code used when a response carries none.
pub const UNKNOWN_PARTICIPANT: &str = "unknown";

/// Heatmap grid cell size in degrees.
///
/// The analysis UI offers exactly these four choices. The string form is
/// the decimal degree value (e.g. `"0.25"`), which is also what appears in
/// exported file names.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Default,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
pub enum GridCellSize {
    /// 0.05° cells
    #[serde(rename = "0.05")]
    #[strum(serialize = "0.05")]
    Finest,
    /// 0.1° cells
    #[default]
    #[serde(rename = "0.1")]
    #[strum(serialize = "0.1")]
    Fine,
    /// 0.25° cells
    #[serde(rename = "0.25")]
    #[strum(serialize = "0.25")]
    Coarse,
    /// 0.5° cells
    #[serde(rename = "0.5")]
    #[strum(serialize = "0.5")]
    Coarsest,
}

impl GridCellSize {
    /// Returns the cell edge length in degrees.
    #[must_use]
    pub const fn degrees(self) -> f64 {
        match self {
            Self::Finest => 0.05,
            Self::Fine => 0.1,
            Self::Coarse => 0.25,
            Self::Coarsest => 0.5,
        }
    }

    /// Returns all variants from finest to coarsest.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[Self::Finest, Self::Fine, Self::Coarse, Self::Coarsest]
    }
}

/// The geometry of a single survey answer.
///
/// Coordinates follow `GeoJSON` order: `x` is longitude and `y` is latitude.
/// Only outer rings are kept; polygon holes are not represented.
#[derive(Debug, Clone, PartialEq)]
pub enum FeatureGeometry {
    /// Outer ring of a polygon.
    Polygon(LineString<f64>),
    /// Outer rings of each member polygon.
    MultiPolygon(Vec<LineString<f64>>),
    /// A single marker.
    Point(Coord<f64>),
}

impl FeatureGeometry {
    /// Returns the polygon rings of this geometry (empty for points).
    #[must_use]
    pub fn rings(&self) -> &[LineString<f64>] {
        match self {
            Self::Polygon(ring) => std::slice::from_ref(ring),
            Self::MultiPolygon(rings) => rings,
            Self::Point(_) => &[],
        }
    }

    /// Returns the `GeoJSON` type name of this geometry.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Polygon(_) => "Polygon",
            Self::MultiPolygon(_) => "MultiPolygon",
            Self::Point(_) => "Point",
        }
    }
}

/// One participant's geometric answer to one question.
#[derive(Debug, Clone, PartialEq)]
pub struct SurveyFeature {
    /// Composite identifier (`responseIndex_subIndex`, or the source `id`).
    pub id: String,
    /// Question this answer belongs to.
    pub question_id: String,
    /// Participant code, [`UNKNOWN_PARTICIPANT`] when absent.
    pub participant_code: String,
    /// When the response was recorded.
    pub created_at: Option<DateTime<Utc>>,
    /// Normalized geometry.
    pub geometry: FeatureGeometry,
}

impl SurveyFeature {
    /// Returns the polygon rings flipped to `[lat, lng]` pairs, the order
    /// most web map libraries expect.
    #[must_use]
    pub fn lat_lng_rings(&self) -> Vec<Vec<[f64; 2]>> {
        self.geometry
            .rings()
            .iter()
            .map(|ring| ring.coords().map(|c| [c.y, c.x]).collect())
            .collect()
    }
}

/// Researcher-controlled heatmap configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionState {
    /// Questions whose answers feed the grid.
    pub selected_question_ids: BTreeSet<String>,
    /// Cells below this overlap are neither drawn nor shown in tooltips.
    pub min_overlap_threshold: u32,
    /// Apply the 3×3 smoothing pass.
    pub smoothing_enabled: bool,
    /// Blur the rendered canvas (pure rendering effect).
    pub visual_blur_enabled: bool,
    /// Grid cell size.
    pub grid_size: GridCellSize,
}

impl SelectionState {
    /// Adds or removes a question from the selection.
    ///
    /// Returns `true` if the question is selected afterwards.
    pub fn toggle_question(&mut self, question_id: &str) -> bool {
        if self.selected_question_ids.remove(question_id) {
            false
        } else {
            self.selected_question_ids.insert(question_id.to_string());
            true
        }
    }

    /// Selects every question in `labels`.
    pub fn select_all(&mut self, labels: &QuestionLabels) {
        self.selected_question_ids = labels.ids().map(str::to_string).collect();
    }

    /// Whether a change from `self` to `other` requires the grid to be
    /// recomputed (as opposed to only re-rendered).
    #[must_use]
    pub fn requires_recompute(&self, other: &Self) -> bool {
        self.selected_question_ids != other.selected_question_ids
            || self.grid_size != other.grid_size
            || self.smoothing_enabled != other.smoothing_enabled
    }
}

/// Mapping from question id to display text.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QuestionLabels(BTreeMap<String, String>);

impl QuestionLabels {
    /// Wraps an existing id → label map.
    #[must_use]
    pub const fn new(labels: BTreeMap<String, String>) -> Self {
        Self(labels)
    }

    /// Returns the label for a question, falling back to its id.
    #[must_use]
    pub fn label_for<'a>(&'a self, question_id: &'a str) -> &'a str {
        self.0.get(question_id).map_or(question_id, String::as_str)
    }

    /// Iterates question ids in sorted order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Number of known questions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no questions are known.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Registers a label for a question id.
    pub fn insert(&mut self, question_id: impl Into<String>, label: impl Into<String>) {
        self.0.insert(question_id.into(), label.into());
    }
}

impl FromIterator<(String, String)> for QuestionLabels {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grid_cell_size_string_roundtrip() {
        for size in GridCellSize::all() {
            let parsed: GridCellSize = size.to_string().parse().unwrap();
            assert_eq!(parsed, *size);
            assert!((parsed.degrees() - size.to_string().parse::<f64>().unwrap()).abs() < 1e-12);
        }
        assert!("0.3".parse::<GridCellSize>().is_err());
    }

    #[test]
    fn grid_cell_size_serde_uses_degrees() {
        let json = serde_json::to_string(&GridCellSize::Coarse).unwrap();
        assert_eq!(json, "\"0.25\"");
    }

    #[test]
    fn toggle_question_adds_then_removes() {
        let mut selection = SelectionState::default();
        assert!(selection.toggle_question("q1"));
        assert!(selection.selected_question_ids.contains("q1"));
        assert!(!selection.toggle_question("q1"));
        assert!(selection.selected_question_ids.is_empty());
    }

    #[test]
    fn threshold_change_does_not_require_recompute() {
        let before = SelectionState::default();
        let mut after = before.clone();
        after.min_overlap_threshold = 3;
        after.visual_blur_enabled = true;
        assert!(!before.requires_recompute(&after));

        after.smoothing_enabled = true;
        assert!(before.requires_recompute(&after));
    }

    #[test]
    fn label_falls_back_to_id() {
        let mut labels = QuestionLabels::default();
        labels.insert("q1", "Where do you feel safe?");
        assert_eq!(labels.label_for("q1"), "Where do you feel safe?");
        assert_eq!(labels.label_for("q2"), "q2");
    }

    #[test]
    fn lat_lng_rings_flip_axis_order() {
        let feature = SurveyFeature {
            id: "0_0".to_string(),
            question_id: "q1".to_string(),
            participant_code: UNKNOWN_PARTICIPANT.to_string(),
            created_at: None,
            geometry: FeatureGeometry::Polygon(LineString::from(vec![
                (11.0, 48.0),
                (12.0, 48.0),
                (12.0, 49.0),
            ])),
        };
        assert_eq!(
            feature.lat_lng_rings(),
            vec![vec![[48.0, 11.0], [48.0, 12.0], [49.0, 12.0]]]
        );
    }
}
