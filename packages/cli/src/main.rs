#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Command-line toolchain for mental map heatmap analysis.
//!
//! Exports study heatmaps and participant maps, looks up the tooltip for
//! a point, and starts the API server. Without a subcommand it falls back
//! to an interactive `dialoguer` menu.
//!
//! Uses `indicatif-log-bridge` (via [`mental_map_cli_utils::init_logger`])
//! to route `log` output through `indicatif::MultiProgress` so that log
//! lines and progress bars never fight for the terminal.

mod commands;
mod interactive;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use mental_map_analysis::source::{FileResponseSource, HttpResponseSource, ResponseSource};

use crate::commands::{HeatmapArgs, HoverArgs, ParticipantArgs};

#[derive(Parser)]
#[command(name = "mental_map", about = "Mental map survey heatmap toolchain")]
struct Cli {
    /// Read studies from exported files in this directory instead of the
    /// study API (`MENTAL_MAP_API_URL`)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute a study heatmap and export it as PNG, JPEG or SVG
    Heatmap(HeatmapArgs),
    /// Export one participant's maps, one file per question
    Participant(ParticipantArgs),
    /// Show the tooltip (overlap, participant, place name) for a point
    Hover(HoverArgs),
    /// Start the API server
    Serve,
}

/// Builds the response source: exported files when `data_dir` is given,
/// the study API otherwise.
fn response_source(
    data_dir: Option<PathBuf>,
) -> Result<Arc<dyn ResponseSource>, Box<dyn std::error::Error>> {
    Ok(match data_dir {
        Some(dir) => Arc::new(FileResponseSource::new(dir)),
        None => Arc::new(HttpResponseSource::from_env()?),
    })
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = mental_map_cli_utils::init_logger();
    let cli = Cli::parse();

    let Some(command) = cli.command else {
        return interactive::run(&multi, cli.data_dir).await;
    };

    let source = response_source(cli.data_dir)?;
    match command {
        Commands::Heatmap(args) => {
            let path = commands::heatmap(source.as_ref(), &multi, &args).await?;
            println!("Wrote {}", path.display());
        }
        Commands::Participant(args) => {
            for path in commands::participant(source.as_ref(), &multi, &args).await? {
                println!("Wrote {}", path.display());
            }
        }
        Commands::Hover(args) => commands::hover(source.as_ref(), &multi, &args).await?,
        Commands::Serve => {
            // The server uses actix-web's runtime, so we need to run it
            // in a blocking task to avoid nesting tokio runtimes.
            tokio::task::spawn_blocking(move || {
                let config = mental_map_server::ServerConfig::from_env();
                actix_web::rt::System::new().block_on(mental_map_server::serve(source, config))
            })
            .await??;
        }
    }

    Ok(())
}
