//! Menu-driven mode used when no subcommand is given.
//!
//! Prompts for the same settings the subcommands take and runs the
//! matching operation from [`crate::commands`].

use std::path::PathBuf;
use std::sync::Arc;

use dialoguer::{Confirm, Input, Select};
use mental_map_analysis::source::{FileResponseSource, HttpResponseSource, ResponseSource};
use mental_map_cli_utils::MultiProgress;
use mental_map_render::export::ExportFormat;
use mental_map_survey_models::GridCellSize;

use crate::commands::{self, HeatmapArgs, HoverArgs, OutputArgs, ParticipantArgs, SelectionArgs};

/// Top-level tool selection.
enum Tool {
    Heatmap,
    Participant,
    Hover,
    Server,
}

impl Tool {
    const ALL: &[Self] = &[Self::Heatmap, Self::Participant, Self::Hover, Self::Server];

    #[must_use]
    const fn label(&self) -> &'static str {
        match self {
            Self::Heatmap => "Export heatmap",
            Self::Participant => "Export participant maps",
            Self::Hover => "Look up a point",
            Self::Server => "Start server",
        }
    }
}

const FORMATS: &[ExportFormat] = &[ExportFormat::Png, ExportFormat::Jpeg, ExportFormat::Svg];

/// Shows the tool menu and runs the chosen tool.
///
/// # Errors
///
/// Returns an error if a prompt fails or the chosen operation fails.
pub async fn run(
    multi: &MultiProgress,
    data_dir: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    println!("Mental Map Toolchain");
    println!();

    let labels: Vec<&str> = Tool::ALL.iter().map(Tool::label).collect();
    let idx = Select::new()
        .with_prompt("What would you like to do?")
        .items(&labels)
        .default(0)
        .interact()?;

    match Tool::ALL[idx] {
        Tool::Heatmap => {
            let (source, study) = prompt_study(data_dir)?;
            let args = HeatmapArgs {
                study,
                selection: prompt_selection()?,
                blur: Confirm::new()
                    .with_prompt("Blur the image?")
                    .default(false)
                    .interact()?,
                output: prompt_output()?,
            };
            let path = commands::heatmap(source.as_ref(), multi, &args).await?;
            println!("Wrote {}", path.display());
        }
        Tool::Participant => {
            let (source, study) = prompt_study(data_dir)?;
            let participant: String = Input::new()
                .with_prompt("Participant code")
                .interact_text()?;
            let question: String = Input::new()
                .with_prompt("Question id (empty for all)")
                .allow_empty(true)
                .interact_text()?;
            let args = ParticipantArgs {
                study,
                participant,
                question: Some(question.trim().to_string()).filter(|q| !q.is_empty()),
                output: prompt_output()?,
            };
            for path in commands::participant(source.as_ref(), multi, &args).await? {
                println!("Wrote {}", path.display());
            }
        }
        Tool::Hover => {
            let (source, study) = prompt_study(data_dir)?;
            let lat: f64 = Input::new().with_prompt("Latitude").interact_text()?;
            let lng: f64 = Input::new().with_prompt("Longitude").interact_text()?;
            let args = HoverArgs {
                study,
                lat,
                lng,
                selection: prompt_selection()?,
            };
            commands::hover(source.as_ref(), multi, &args).await?;
        }
        Tool::Server => {
            // The server uses actix-web's runtime, so we need to run it
            // in a blocking task to avoid nesting tokio runtimes.
            tokio::task::spawn_blocking(|| {
                actix_web::rt::System::new().block_on(mental_map_server::interactive::run())
            })
            .await??;
        }
    }

    Ok(())
}

/// Asks where responses come from and which study to load.
fn prompt_study(
    data_dir: Option<PathBuf>,
) -> Result<(Arc<dyn ResponseSource>, String), Box<dyn std::error::Error>> {
    let default = data_dir
        .map(|d| d.display().to_string())
        .unwrap_or_default();
    let dir: String = Input::new()
        .with_prompt("Study directory (empty for the study API)")
        .allow_empty(true)
        .default(default)
        .interact_text()?;

    let dir = dir.trim();
    let source: Arc<dyn ResponseSource> = if dir.is_empty() {
        Arc::new(HttpResponseSource::from_env()?)
    } else {
        Arc::new(FileResponseSource::new(dir))
    };

    let study: String = Input::new().with_prompt("Study id").interact_text()?;
    Ok((source, study))
}

fn prompt_selection() -> Result<SelectionArgs, Box<dyn std::error::Error>> {
    let questions: String = Input::new()
        .with_prompt("Question ids, comma-separated (empty for all)")
        .allow_empty(true)
        .interact_text()?;

    let sizes: Vec<String> = GridCellSize::all()
        .iter()
        .map(|s| format!("{s}°"))
        .collect();
    let size_idx = Select::new()
        .with_prompt("Grid cell size")
        .items(&sizes)
        .default(1)
        .interact()?;

    let min_overlap: u32 = Input::new()
        .with_prompt("Minimum overlap")
        .default(1)
        .interact_text()?;

    let smoothing = Confirm::new()
        .with_prompt("Smooth the grid?")
        .default(false)
        .interact()?;

    Ok(SelectionArgs {
        questions: Some(questions).filter(|q| !q.trim().is_empty()),
        grid_size: GridCellSize::all()[size_idx],
        min_overlap,
        smoothing,
    })
}

fn prompt_output() -> Result<OutputArgs, Box<dyn std::error::Error>> {
    let names: Vec<&str> = FORMATS.iter().map(|f| f.as_ref()).collect();
    let format_idx = Select::new()
        .with_prompt("Format")
        .items(&names)
        .default(0)
        .interact()?;

    let width: u32 = Input::new()
        .with_prompt("Width (px)")
        .default(1600)
        .interact_text()?;
    let height: u32 = Input::new()
        .with_prompt("Height (px)")
        .default(1200)
        .interact_text()?;
    let out_dir: String = Input::new()
        .with_prompt("Output directory")
        .default("exports".to_string())
        .interact_text()?;

    Ok(OutputArgs {
        format: FORMATS[format_idx],
        width,
        height,
        out_dir: PathBuf::from(out_dir),
    })
}
