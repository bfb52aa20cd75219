#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Heatmap analysis session for one study.
//!
//! An [`AnalysisSession`] holds a study's normalized features, its
//! question labels and the researcher's [`SelectionState`]. Changing the
//! selection, grid size or smoothing invalidates the current
//! [`HeatmapLayer`]; a recompute takes a fresh generation ticket so that
//! a slower earlier run can never overwrite a newer result.
//!
//! The [`tooltip`] module drives hover tooltips over an installed layer.

pub mod source;
pub mod tooltip;

use std::collections::BTreeSet;
use std::sync::Arc;

use mental_map_heatmap::normalize::normalize_collection;
use mental_map_heatmap::progress::ProgressCallback;
use mental_map_heatmap::{Generation, GenerationTicket, Grid, RasterizeError, select_features};
use mental_map_survey_models::{QuestionLabels, SelectionState, SurveyFeature};

pub use source::{ResponseSource, SourceError};

/// Selection label used when every question is selected.
pub const ALL_QUESTIONS_LABEL: &str = "Alle_Fragen";

/// Selection label used when no question is selected.
pub const NO_QUESTIONS_LABEL: &str = "Keine_Fragen";

/// Errors from loading or analysing a study.
#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    /// The study's responses could not be loaded.
    #[error("Failed to load study: {0}")]
    Load(#[from] SourceError),

    /// A newer recompute was started before this one finished.
    #[error("Heatmap superseded by generation {current} (was {requested})")]
    Superseded {
        /// Generation this run was started for.
        requested: u64,
        /// Generation that is current now.
        current: u64,
    },

    /// The grid could not be built.
    #[error(transparent)]
    Rasterize(RasterizeError),
}

impl From<RasterizeError> for AnalysisError {
    fn from(e: RasterizeError) -> Self {
        match e {
            RasterizeError::Superseded { requested, current } => {
                Self::Superseded { requested, current }
            }
            other => Self::Rasterize(other),
        }
    }
}

/// A computed grid together with the features its owner indices refer to.
#[derive(Debug, Clone)]
pub struct HeatmapLayer {
    /// Overlap grid, smoothed when the selection asked for it.
    pub grid: Grid,
    /// Selected features in rasterization order.
    pub features: Vec<SurveyFeature>,
    /// Generation this layer was computed for.
    pub generation: u64,
}

impl HeatmapLayer {
    /// Participant code of the feature at owner index `owner`.
    #[must_use]
    pub fn participant_for_owner(&self, owner: usize) -> Option<&str> {
        self.features
            .get(owner)
            .map(|feature| feature.participant_code.as_str())
    }
}

/// Work for one recompute, detached from the session so that it can run
/// while the session keeps accepting selection changes.
#[derive(Debug)]
pub struct RecomputeJob {
    ticket: GenerationTicket,
    features: Vec<SurveyFeature>,
    cell_size: f64,
    smoothing: bool,
}

impl RecomputeJob {
    /// Generation this job was started for.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.ticket.id()
    }

    /// Rasterizes the selected features and smooths when enabled.
    ///
    /// # Errors
    ///
    /// Returns [`AnalysisError::Superseded`] if a newer job was prepared
    /// while this one was running.
    pub async fn run(self, progress: &dyn ProgressCallback) -> Result<HeatmapLayer, AnalysisError> {
        let mut grid =
            mental_map_heatmap::rasterize(&self.features, self.cell_size, &self.ticket, progress)
                .await?;
        if self.smoothing && !grid.is_empty() {
            grid = grid.with_smoothing();
        }
        Ok(HeatmapLayer {
            grid,
            features: self.features,
            generation: self.ticket.id(),
        })
    }
}

/// Selection, features and current heatmap of one study.
#[derive(Debug)]
pub struct AnalysisSession {
    features: Vec<SurveyFeature>,
    labels: QuestionLabels,
    selection: SelectionState,
    generation: Generation,
    layer: Option<Arc<HeatmapLayer>>,
}

impl AnalysisSession {
    /// Creates a session with every question selected.
    #[must_use]
    pub fn new(features: Vec<SurveyFeature>, labels: QuestionLabels) -> Self {
        let mut session = Self {
            features,
            labels,
            selection: SelectionState::default(),
            generation: Generation::new(),
            layer: None,
        };
        session.selection.selected_question_ids = session.question_ids();
        session
    }

    /// Creates a session from a raw `FeatureCollection`.
    #[must_use]
    pub fn from_collection(collection: &serde_json::Value, labels: QuestionLabels) -> Self {
        Self::new(normalize_collection(collection), labels)
    }

    /// Loads a study from `source`.
    ///
    /// # Errors
    ///
    /// Returns [`AnalysisError::Load`] if the responses or labels cannot be
    /// fetched.
    pub async fn load(source: &dyn ResponseSource, study_id: &str) -> Result<Self, AnalysisError> {
        let collection = source.fetch_responses(study_id).await?;
        let labels = source.fetch_question_labels(study_id).await?;
        let session = Self::from_collection(&collection, labels);
        log::info!(
            "Loaded study {study_id}: {} features, {} questions",
            session.features.len(),
            session.question_ids().len()
        );
        Ok(session)
    }

    #[must_use]
    pub fn features(&self) -> &[SurveyFeature] {
        &self.features
    }

    #[must_use]
    pub const fn labels(&self) -> &QuestionLabels {
        &self.labels
    }

    #[must_use]
    pub const fn selection(&self) -> &SelectionState {
        &self.selection
    }

    /// The installed layer, if one has been computed since the last
    /// change that invalidated it.
    #[must_use]
    pub fn layer(&self) -> Option<Arc<HeatmapLayer>> {
        self.layer.clone()
    }

    /// Every question id known from the labels or seen in a feature.
    #[must_use]
    pub fn question_ids(&self) -> BTreeSet<String> {
        self.labels
            .ids()
            .map(str::to_string)
            .chain(self.features.iter().map(|f| f.question_id.clone()))
            .collect()
    }

    /// Replaces the selection.
    ///
    /// Returns `true` if the grid has to be recomputed. In that case the
    /// current layer is dropped and running jobs are superseded; a change
    /// that only affects rendering keeps the layer.
    pub fn update_selection(&mut self, selection: SelectionState) -> bool {
        let recompute = self.selection.requires_recompute(&selection);
        self.selection = selection;
        if recompute {
            self.generation.cancel_all();
            self.layer = None;
        }
        recompute
    }

    /// Starts a recompute for the current selection, superseding any job
    /// prepared earlier.
    #[must_use]
    pub fn prepare(&self) -> RecomputeJob {
        let ticket = self.generation.next_ticket();
        let features = select_features(&self.features, &self.selection.selected_question_ids);
        log::debug!(
            "Recompute {} with {} of {} features at {}°",
            ticket.id(),
            features.len(),
            self.features.len(),
            self.selection.grid_size
        );
        RecomputeJob {
            ticket,
            features,
            cell_size: self.selection.grid_size.degrees(),
            smoothing: self.selection.smoothing_enabled,
        }
    }

    /// Installs a finished layer if its generation is still current.
    ///
    /// # Errors
    ///
    /// Returns [`AnalysisError::Superseded`] for a stale layer; the
    /// installed layer is left untouched.
    pub fn install(&mut self, layer: HeatmapLayer) -> Result<Arc<HeatmapLayer>, AnalysisError> {
        let current = self.generation.current();
        if layer.generation != current {
            log::debug!(
                "Discarding stale heatmap {} (current {current})",
                layer.generation
            );
            return Err(AnalysisError::Superseded {
                requested: layer.generation,
                current,
            });
        }
        let layer = Arc::new(layer);
        self.layer = Some(Arc::clone(&layer));
        Ok(layer)
    }

    /// Prepares, runs and installs a recompute.
    ///
    /// # Errors
    ///
    /// Returns [`AnalysisError`] if the run was superseded or the grid
    /// could not be built.
    pub async fn recompute(
        &mut self,
        progress: &dyn ProgressCallback,
    ) -> Result<Arc<HeatmapLayer>, AnalysisError> {
        let layer = self.prepare().run(progress).await?;
        self.install(layer)
    }

    /// Label describing the selected questions, used in export file
    /// names.
    ///
    /// [`ALL_QUESTIONS_LABEL`] when every known question is selected,
    /// otherwise the selected questions' labels joined with `_`.
    #[must_use]
    pub fn selection_label(&self) -> String {
        let selected = &self.selection.selected_question_ids;
        if selected.is_empty() {
            return NO_QUESTIONS_LABEL.to_string();
        }
        if self.question_ids().is_subset(selected) {
            return ALL_QUESTIONS_LABEL.to_string();
        }
        selected
            .iter()
            .map(|id| self.labels.label_for(id))
            .collect::<Vec<_>>()
            .join("_")
    }
}
