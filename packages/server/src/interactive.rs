//! Interactive mode for the server.
//!
//! Prompts for the listen address and where studies come from, then
//! starts the server without touching the process environment.

use std::sync::Arc;

use dialoguer::{Confirm, Input};
use mental_map_analysis::source::{FileResponseSource, HttpResponseSource, ResponseSource};

use crate::ServerConfig;

/// Prompts for a [`ServerConfig`] and a study directory, then runs
/// [`super::serve`].
///
/// Prompt failures (e.g. no terminal) fall back to the environment
/// defaults. An empty study directory selects the study API.
///
/// # Errors
///
/// Returns an `std::io::Result` error if the study API client cannot be
/// built or the server fails to start.
#[allow(clippy::future_not_send)]
pub async fn run() -> std::io::Result<()> {
    println!("Mental Map Analysis Server");
    println!();

    let defaults = ServerConfig::from_env();
    let config = ServerConfig {
        bind_addr: Input::new()
            .with_prompt("Bind address")
            .default(defaults.bind_addr.clone())
            .interact_text()
            .unwrap_or_else(|_| defaults.bind_addr.clone()),
        port: Input::new()
            .with_prompt("Port")
            .default(defaults.port)
            .interact_text()
            .unwrap_or(defaults.port),
    };

    let data_dir: String = Input::new()
        .with_prompt("Study directory (empty for the study API)")
        .allow_empty(true)
        .default(std::env::var(super::DATA_DIR_ENV).unwrap_or_default())
        .interact_text()
        .unwrap_or_default();

    let source: Arc<dyn ResponseSource> = match data_dir.trim() {
        "" => Arc::new(HttpResponseSource::from_env().map_err(std::io::Error::other)?),
        dir => Arc::new(FileResponseSource::new(dir)),
    };

    let start = Confirm::new()
        .with_prompt(format!("Start server on {}:{}?", config.bind_addr, config.port))
        .default(true)
        .interact()
        .unwrap_or(true);
    if !start {
        println!("Cancelled.");
        return Ok(());
    }

    super::serve(source, config).await
}
