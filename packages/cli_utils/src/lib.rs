#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Shared CLI utilities for the mental map toolchain.
//!
//! [`IndicatifProgress`] drives terminal bars from the rasterizer's
//! [`ProgressCallback`]. [`init_logger`] routes `log` output through
//! `indicatif-log-bridge` so log lines and bars share the terminal.

use std::sync::Arc;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use mental_map_heatmap::Grid;
use mental_map_heatmap::progress::ProgressCallback;

pub use indicatif::MultiProgress;

/// An `indicatif` [`ProgressBar`] that implements [`ProgressCallback`].
pub struct IndicatifProgress {
    bar: ProgressBar,
    /// Applied by `set_total()`; spinners become bars at that point.
    bar_style: ProgressStyle,
}

fn style(template: &str) -> ProgressStyle {
    ProgressStyle::with_template(template)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=>-")
}

impl IndicatifProgress {
    fn attach(
        multi: &MultiProgress,
        bar: ProgressBar,
        message: &str,
        bar_style: ProgressStyle,
    ) -> Arc<dyn ProgressCallback> {
        let bar = multi.add(bar);
        bar.set_message(message.to_string());
        Arc::new(Self { bar, bar_style })
    }

    /// Spinner for a rasterization run. The shape count is only known once
    /// the rasterizer has extracted rings and points, so the bar appears on
    /// [`ProgressCallback::set_total()`].
    #[must_use]
    pub fn shapes_bar(multi: &MultiProgress, message: &str) -> Arc<dyn ProgressCallback> {
        let bar = ProgressBar::new_spinner();
        bar.enable_steady_tick(Duration::from_millis(80));
        bar.set_style(
            ProgressStyle::with_template("{spinner:.magenta} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        Self::attach(
            multi,
            bar,
            message,
            style("  {msg} [{bar:40.magenta/dim}] {pos}/{len} shapes ({per_sec})"),
        )
    }

    /// Bar over a known number of steps, e.g. the questions of a
    /// participant export.
    #[must_use]
    pub fn steps_bar(
        multi: &MultiProgress,
        message: &str,
        total: u64,
    ) -> Arc<dyn ProgressCallback> {
        let bar_style = style("{msg:<24} [{bar:40.blue/dim}] {pos}/{len} [{elapsed}]");
        let bar = ProgressBar::new(total).with_style(bar_style.clone());
        Self::attach(multi, bar, message, bar_style)
    }
}

impl ProgressCallback for IndicatifProgress {
    fn set_total(&self, total: u64) {
        self.bar.set_length(total);
        self.bar.reset();
        self.bar.set_style(self.bar_style.clone());
    }

    fn set_position(&self, pos: u64) {
        self.bar.set_position(pos);
    }

    fn inc(&self, delta: u64) {
        self.bar.inc(delta);
    }

    fn set_message(&self, msg: String) {
        self.bar.set_message(msg);
    }

    fn finish(&self, msg: String) {
        self.bar.finish_with_message(msg);
    }

    fn finish_and_clear(&self) {
        self.bar.finish_and_clear();
    }
}

/// Initializes the global logger wrapped in `indicatif-log-bridge` so that
/// `log::info!` and friends are suspended while progress bars redraw.
///
/// Returns the [`MultiProgress`] that all progress bars must be added to.
#[must_use]
pub fn init_logger() -> MultiProgress {
    let multi = MultiProgress::new();

    let logger = pretty_env_logger::formatted_builder()
        .parse_env("RUST_LOG")
        .build();
    let level = logger.filter();

    indicatif_log_bridge::LogWrapper::new(multi.clone(), logger)
        .try_init()
        .ok();

    log::set_max_level(level);

    multi
}

/// One-line description of a computed grid for terminal output.
///
/// Mentions the large-area warning so it is not lost among log lines.
#[must_use]
pub fn grid_summary(grid: &Grid, min_overlap: u32) -> String {
    if grid.is_empty() {
        return "Empty grid: no geometries in the selected questions".to_string();
    }
    let qualifying = grid.qualifying_cells(min_overlap).count();
    let mut summary = format!(
        "{}x{} cells of {}°, {qualifying} with overlap >= {}, max {}{}",
        grid.width(),
        grid.height(),
        grid.cell_size(),
        min_overlap.max(1),
        grid.format_value(grid.max_value()),
        if grid.is_smoothed() { " (smoothed)" } else { "" },
    );
    if grid.area_too_large() {
        summary.push_str(" [area unusually large]");
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use mental_map_heatmap::rasterize_now;
    use mental_map_survey_models::{FeatureGeometry, SurveyFeature};

    fn point(lng: f64, lat: f64) -> SurveyFeature {
        SurveyFeature {
            id: format!("{lng}_{lat}"),
            question_id: "q1".to_string(),
            participant_code: "P1".to_string(),
            created_at: None,
            geometry: FeatureGeometry::Point(geo::Coord { x: lng, y: lat }),
        }
    }

    #[test]
    fn summarizes_points() {
        let grid = rasterize_now(&[point(1.0, 1.0), point(1.0, 1.0), point(2.0, 1.0)], 0.5).unwrap();
        assert_eq!(
            grid_summary(&grid, 2),
            "3x1 cells of 0.5°, 1 with overlap >= 2, max 2"
        );
    }

    #[test]
    fn summarizes_empty_grid() {
        assert!(grid_summary(&Grid::empty(0.1), 0).starts_with("Empty grid"));
    }
}
