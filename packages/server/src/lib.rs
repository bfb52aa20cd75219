#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Actix-Web API server for mental map heatmap analysis.
//!
//! Serves overlap heatmaps, their vector rendering as `GeoJSON`, hover
//! tooltips and reverse lookups for the analysis frontend. Survey
//! responses come from the study API (`MENTAL_MAP_API_URL`) or, when
//! `MENTAL_MAP_DATA_DIR` is set, from exported files. Heatmaps are
//! computed per request and never stored.

mod handlers;
pub mod interactive;

use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{App, HttpServer, middleware, web};
use mental_map_analysis::source::{FileResponseSource, HttpResponseSource, ResponseSource};
use mental_map_geocoder::ReverseGeocodeService;
use mental_map_render::RendererConfig;

/// Environment variable pointing at a directory of exported studies.
pub const DATA_DIR_ENV: &str = "MENTAL_MAP_DATA_DIR";

/// Shared application state.
pub struct AppState {
    /// Where study responses are loaded from.
    pub source: Arc<dyn ResponseSource>,
    /// Process-wide reverse geocoder with its cache and rate limit.
    pub geocoder: Arc<ReverseGeocodeService>,
    /// Renderer tunables for colors and strategy selection.
    pub renderer: RendererConfig,
}

/// Where the HTTP server listens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Interface to bind, `127.0.0.1` by default.
    pub bind_addr: String,
    /// TCP port, 8080 by default.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

impl ServerConfig {
    /// Reads `BIND_ADDR` and `PORT`, keeping the default for anything
    /// unset or unparsable.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            bind_addr: std::env::var("BIND_ADDR").unwrap_or(defaults.bind_addr),
            port: std::env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
        }
    }
}

/// Registers the `/api` routes.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .route("/health", web::get().to(handlers::health))
            .route("/studies/{id}/heatmap", web::get().to(handlers::heatmap))
            .route(
                "/studies/{id}/heatmap.geojson",
                web::get().to(handlers::heatmap_geojson),
            )
            .route("/studies/{id}/tooltip", web::get().to(handlers::tooltip))
            .route("/geocode/reverse", web::get().to(handlers::reverse_geocode)),
    );
}

/// Builds the response source from [`DATA_DIR_ENV`], falling back to the
/// study API.
///
/// # Errors
///
/// Returns an `std::io::Result` error if the HTTP client cannot be built.
pub fn response_source_from_env() -> std::io::Result<Arc<dyn ResponseSource>> {
    if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
        log::info!("Loading studies from {dir}");
        return Ok(Arc::new(FileResponseSource::new(dir)));
    }
    let source = HttpResponseSource::from_env().map_err(std::io::Error::other)?;
    Ok(Arc::new(source))
}

/// Starts the mental map API server.
///
/// Initializes logging, reads the response source and listen address from
/// the environment and delegates to [`serve`]. This is a regular async function; the
/// caller is responsible for providing the async runtime (e.g. via
/// `#[actix_web::main]`).
///
/// # Errors
///
/// Returns an `std::io::Result` error if the source or geocoder cannot be
/// configured, or if the HTTP server fails to bind or encounters a runtime
/// error.
#[allow(clippy::future_not_send)]
pub async fn run_server() -> std::io::Result<()> {
    // Ignore error if a logger was already set (e.g., by the CLI)
    pretty_env_logger::try_init_custom_env("RUST_LOG").ok();

    serve(response_source_from_env()?, ServerConfig::from_env()).await
}

/// Serves the API for studies from `source`.
///
/// The reverse geocoder is configured from the embedded service registry.
///
/// # Errors
///
/// Returns an `std::io::Result` error if the geocoder cannot be
/// configured, or if the HTTP server fails to bind or encounters a runtime
/// error.
#[allow(clippy::future_not_send)]
pub async fn serve(source: Arc<dyn ResponseSource>, config: ServerConfig) -> std::io::Result<()> {
    log::info!("Configuring reverse geocoder...");
    let geocoder = ReverseGeocodeService::from_registry().map_err(std::io::Error::other)?;

    let state = web::Data::new(AppState {
        source,
        geocoder: Arc::new(geocoder),
        renderer: RendererConfig::default(),
    });

    log::info!("Starting server on {}:{}", config.bind_addr, config.port);

    HttpServer::new(move || {
        let cors = Cors::permissive();

        App::new()
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .app_data(state.clone())
            .configure(configure)
    })
    .bind((config.bind_addr, config.port))?
    .run()
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::Duration;

    use actix_web::http::StatusCode;
    use actix_web::test;
    use mental_map_geocoder::admin_labels::ADMIN_LABEL_TABLE;
    use mental_map_geocoder::{GeocodeError, RawAddress, ReverseGeocoder};

    struct FixedGeocoder;

    #[async_trait::async_trait]
    impl ReverseGeocoder for FixedGeocoder {
        async fn reverse(&self, _lat: f64, _lng: f64) -> Result<RawAddress, GeocodeError> {
            Ok(RawAddress {
                village: Some("Plouha".to_string()),
                country_code: Some("fr".to_string()),
                ..RawAddress::default()
            })
        }
    }

    fn study_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "mental_map_server_{name}_{}",
            std::process::id()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        let square = |lng: f64, lat: f64, code: &str| {
            serde_json::json!({
                "type": "Feature",
                "properties": {"question_id": "q1", "participant_code": code},
                "geometry": {"type": "Polygon", "coordinates": [[
                    [lng, lat], [lng + 1.0, lat], [lng + 1.0, lat + 1.0],
                    [lng, lat + 1.0], [lng, lat]
                ]]}
            })
        };
        let collection = serde_json::json!({
            "type": "FeatureCollection",
            "features": [square(-3.0, 48.0, "A"), square(-2.5, 48.5, "B")]
        });
        std::fs::write(dir.join("s1.geojson"), collection.to_string()).unwrap();
        std::fs::write(
            dir.join("s1.questions.json"),
            serde_json::json!({"q1": "Zuhause"}).to_string(),
        )
        .unwrap();
        dir
    }

    fn state(dir: PathBuf) -> web::Data<AppState> {
        web::Data::new(AppState {
            source: Arc::new(FileResponseSource::new(dir)),
            geocoder: Arc::new(ReverseGeocodeService::new(
                Arc::new(FixedGeocoder),
                &ADMIN_LABEL_TABLE,
                Duration::from_millis(1000),
                Duration::from_millis(250),
            )),
            renderer: RendererConfig::default(),
        })
    }

    #[::core::prelude::v1::test]
    fn server_config_defaults_to_localhost() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_addr, "127.0.0.1");
        assert_eq!(config.port, 8080);
    }

    #[actix_web::test]
    async fn health_reports_version() {
        let app = test::init_service(App::new().configure(configure)).await;
        let req = test::TestRequest::get().uri("/api/health").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["healthy"], true);
    }

    #[actix_web::test]
    async fn heatmap_returns_qualifying_cells() {
        let dir = study_dir("heatmap");
        let app =
            test::init_service(App::new().app_data(state(dir.clone())).configure(configure)).await;

        let req = test::TestRequest::get()
            .uri("/api/studies/s1/heatmap?gridSize=0.25&minOverlap=2")
            .to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["selectionLabel"], "Alle_Fragen");
        assert_eq!(body["renderStrategy"], "vector");
        assert_eq!(body["empty"], false);
        let cells = body["cells"].as_array().unwrap();
        assert!(!cells.is_empty());
        assert!(cells.iter().all(|c| c["value"].as_f64().unwrap() >= 2.0));

        std::fs::remove_dir_all(dir).unwrap();
    }

    #[actix_web::test]
    async fn geojson_has_one_feature_per_cell() {
        let dir = study_dir("geojson");
        let app =
            test::init_service(App::new().app_data(state(dir.clone())).configure(configure)).await;

        let req = test::TestRequest::get()
            .uri("/api/studies/s1/heatmap.geojson?gridSize=0.5")
            .to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["type"], "FeatureCollection");
        assert!(!body["features"].as_array().unwrap().is_empty());

        std::fs::remove_dir_all(dir).unwrap();
    }

    #[actix_web::test]
    async fn tooltip_includes_participant_and_location() {
        let dir = study_dir("tooltip");
        let app =
            test::init_service(App::new().app_data(state(dir.clone())).configure(configure)).await;

        let req = test::TestRequest::get()
            .uri("/api/studies/s1/tooltip?lat=48.25&lng=-2.75&gridSize=0.1")
            .to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["countLabel"], "1");
        assert_eq!(body["participantCode"], "A");
        assert_eq!(body["location"], "Commune: Plouha");

        let req = test::TestRequest::get()
            .uri("/api/studies/s1/tooltip?lat=10&lng=10")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        std::fs::remove_dir_all(dir).unwrap();
    }

    #[actix_web::test]
    async fn missing_study_is_bad_gateway() {
        let dir = study_dir("missing");
        let app =
            test::init_service(App::new().app_data(state(dir.clone())).configure(configure)).await;

        let req = test::TestRequest::get()
            .uri("/api/studies/nope/heatmap")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);

        std::fs::remove_dir_all(dir).unwrap();
    }

    #[actix_web::test]
    async fn reverse_lookup_is_cached() {
        let dir = study_dir("reverse");
        let app =
            test::init_service(App::new().app_data(state(dir.clone())).configure(configure)).await;

        let req = test::TestRequest::get()
            .uri("/api/geocode/reverse?lat=48.6&lng=-2.9")
            .to_request();
        let first: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(first["status"], "fetched");

        let req = test::TestRequest::get()
            .uri("/api/geocode/reverse?lat=48.6&lng=-2.9")
            .to_request();
        let second: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(second["status"], "cached");
        assert_eq!(second["countryCode"], "fr");

        std::fs::remove_dir_all(dir).unwrap();
    }
}
