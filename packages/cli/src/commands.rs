//! The operations behind each subcommand.
//!
//! Shared by the `clap` entry point and the interactive menu, which
//! builds the same argument structs from prompts.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use mental_map_analysis::source::ResponseSource;
use mental_map_analysis::tooltip::{HoverResult, TooltipController, TooltipEvent};
use mental_map_analysis::{AnalysisSession, HeatmapLayer};
use mental_map_cli_utils::{IndicatifProgress, MultiProgress, grid_summary};
use mental_map_geocoder::ReverseGeocodeService;
use mental_map_heatmap::progress::ProgressCallback;
use mental_map_render::export::{
    ExportFormat, HeatmapExportOptions, export_heatmap, heatmap_file_name, participant_file_name,
    write_export,
};
use mental_map_render::viewer::ParticipantView;
use mental_map_render::{ExportError, RenderStrategy, RendererConfig};
use mental_map_survey_models::{GridCellSize, SelectionState};
use tokio::sync::mpsc;

/// Upper bound on a reverse lookup once the debounce has elapsed.
const LOOKUP_TIMEOUT: Duration = Duration::from_secs(12);

/// Which questions feed the grid and how it is computed.
#[derive(Debug, Clone, Args)]
pub struct SelectionArgs {
    /// Comma-separated question ids (default: all questions)
    #[arg(long)]
    pub questions: Option<String>,
    /// Grid cell size in degrees: 0.05, 0.1, 0.25 or 0.5
    #[arg(long, default_value = "0.1")]
    pub grid_size: GridCellSize,
    /// Minimum overlap for a cell to be drawn or hovered
    #[arg(long, default_value_t = 1)]
    pub min_overlap: u32,
    /// Apply 3×3 smoothing before rendering
    #[arg(long)]
    pub smoothing: bool,
}

impl SelectionArgs {
    /// Applies these arguments on top of a session's default selection.
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
        selection.grid_size = self.grid_size;
        selection.min_overlap_threshold = self.min_overlap;
        selection.smoothing_enabled = self.smoothing;
        selection
    }
}

/// Image size and destination of an export.
#[derive(Debug, Clone, Args)]
pub struct OutputArgs {
    /// Output format: png, jpeg or svg
    #[arg(long, default_value = "png")]
    pub format: ExportFormat,
    /// Image width in pixels
    #[arg(long, default_value_t = 1600)]
    pub width: u32,
    /// Image height in pixels
    #[arg(long, default_value_t = 1200)]
    pub height: u32,
    /// Directory to write exports to
    #[arg(long, default_value = "exports")]
    pub out_dir: PathBuf,
}

#[derive(Debug, Clone, Args)]
pub struct HeatmapArgs {
    /// Study identifier
    pub study: String,
    #[command(flatten)]
    pub selection: SelectionArgs,
    /// Blur the rendered image (does not change cell values)
    #[arg(long)]
    pub blur: bool,
    #[command(flatten)]
    pub output: OutputArgs,
}

#[derive(Debug, Clone, Args)]
pub struct ParticipantArgs {
    /// Study identifier
    pub study: String,
    /// Participant code
    pub participant: String,
    /// Export only this question (default: one map per answered question)
    #[arg(long)]
    pub question: Option<String>,
    #[command(flatten)]
    pub output: OutputArgs,
}

#[derive(Debug, Clone, Args)]
pub struct HoverArgs {
    /// Study identifier
    pub study: String,
    /// Latitude of the hovered point
    #[arg(allow_negative_numbers = true)]
    pub lat: f64,
    /// Longitude of the hovered point
    #[arg(allow_negative_numbers = true)]
    pub lng: f64,
    #[command(flatten)]
    pub selection: SelectionArgs,
}

async fn compute_layer(
    source: &dyn ResponseSource,
    study: &str,
    selection: &SelectionArgs,
    progress: &dyn ProgressCallback,
) -> Result<(AnalysisSession, Arc<HeatmapLayer>), Box<dyn std::error::Error>> {
    let mut session = AnalysisSession::load(source, study).await?;
    let selection = selection.apply_to(session.selection());
    session.update_selection(selection);
    let layer = session.recompute(progress).await?;
    log::info!(
        "{}",
        grid_summary(&layer.grid, session.selection().min_overlap_threshold)
    );
    Ok((session, layer))
}

/// Computes a heatmap and writes it as an image.
///
/// # Errors
///
/// Returns an error if the study cannot be loaded, the grid is empty, or
/// the image cannot be encoded or written.
pub async fn heatmap(
    source: &dyn ResponseSource,
    multi: &MultiProgress,
    args: &HeatmapArgs,
) -> Result<PathBuf, Box<dyn std::error::Error>> {
    let progress = IndicatifProgress::shapes_bar(multi, "Rasterizing responses");
    let (session, layer) =
        compute_layer(source, &args.study, &args.selection, progress.as_ref()).await?;

    let config = RendererConfig::default();
    let strategy = RenderStrategy::for_cell_size(layer.grid.cell_size(), &config);
    log::debug!("{}° cells use the {strategy} renderer on a live map", layer.grid.cell_size());

    let options = HeatmapExportOptions {
        format: args.output.format,
        width: args.output.width,
        height: args.output.height,
        min_overlap: session.selection().min_overlap_threshold,
        visual_blur: args.blur,
    };
    let bytes = export_heatmap(&layer.grid, &options, &config)?;
    let file_name = heatmap_file_name(
        &session.selection_label(),
        session.selection().grid_size,
        args.output.format,
    );
    Ok(write_export(&args.output.out_dir, &file_name, &bytes)?)
}

/// Writes one map per question answered by a participant.
///
/// Questions where the participant drew nothing are skipped with a
/// warning.
///
/// # Errors
///
/// Returns an error if the study cannot be loaded, the participant has no
/// map answers, or an export cannot be encoded or written.
pub async fn participant(
    source: &dyn ResponseSource,
    multi: &MultiProgress,
    args: &ParticipantArgs,
) -> Result<Vec<PathBuf>, Box<dyn std::error::Error>> {
    let session = AnalysisSession::load(source, &args.study).await?;
    let labels = session.labels();
    let view = ParticipantView::new(session.features(), &args.participant);

    let question_ids: Vec<String> = args.question.as_ref().map_or_else(
        || view.question_ids().into_iter().map(str::to_string).collect(),
        |q| vec![q.clone()],
    );
    if question_ids.is_empty() {
        return Err(format!("Participant {} has no map answers", args.participant).into());
    }

    let progress = IndicatifProgress::steps_bar(multi, "Exporting maps", question_ids.len() as u64);
    let mut written = Vec::with_capacity(question_ids.len());
    for question_id in &question_ids {
        let label = labels.label_for(question_id);
        progress.set_message(label.to_string());

        let bytes = match view.for_question(question_id).export(
            args.output.format,
            args.output.width,
            args.output.height,
            labels,
        ) {
            Ok(bytes) => bytes,
            Err(ExportError::Empty) => {
                log::warn!(
                    "Participant {} has no shapes for {label}, skipping",
                    args.participant
                );
                progress.inc(1);
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        let file_name = participant_file_name(&args.participant, label, args.output.format);
        written.push(write_export(&args.output.out_dir, &file_name, &bytes)?);
        progress.inc(1);
    }
    progress.finish(format!("Exported {} maps", written.len()));
    Ok(written)
}

/// Shows the tooltip for one point, waiting for the place name.
///
/// # Errors
///
/// Returns an error if the study cannot be loaded or the geocoder cannot
/// be configured.
pub async fn hover(
    source: &dyn ResponseSource,
    multi: &MultiProgress,
    args: &HoverArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let progress = IndicatifProgress::shapes_bar(multi, "Rasterizing responses");
    let (session, layer) =
        compute_layer(source, &args.study, &args.selection, progress.as_ref()).await?;

    let service = Arc::new(ReverseGeocodeService::from_registry()?);
    let wait = service.debounce() + LOOKUP_TIMEOUT;
    let (mut controller, mut events) = TooltipController::new(service);

    let min_overlap = session.selection().min_overlap_threshold;
    let HoverResult::Shown(content) = controller.on_hover(&layer, min_overlap, args.lat, args.lng)
    else {
        println!(
            "No cell with overlap >= {} at ({}, {})",
            min_overlap.max(1),
            args.lat,
            args.lng
        );
        return Ok(());
    };

    println!("Overlap:     {}", content.count_label);
    println!(
        "Participant: {}",
        content.participant_code.as_deref().unwrap_or("-")
    );

    let location = match content.location.clone() {
        Some(location) => Some(location),
        None => tokio::time::timeout(wait, next_location(&mut events))
            .await
            .ok()
            .flatten(),
    };
    println!(
        "Location:    {}",
        location.as_deref().unwrap_or_else(|| content.location_text())
    );
    Ok(())
}

async fn next_location(events: &mut mpsc::UnboundedReceiver<TooltipEvent>) -> Option<String> {
    while let Some(event) = events.recv().await {
        if let TooltipEvent::LocationResolved { location, .. } = event {
            return Some(location);
        }
    }
    None
}
