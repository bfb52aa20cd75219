//! HTTP handler functions for the mental map analysis API.

use std::sync::Arc;

use actix_web::{HttpResponse, web};
use mental_map_analysis::tooltip::TooltipContent;
use mental_map_analysis::{AnalysisError, AnalysisSession, HeatmapLayer};
use mental_map_geocoder::LookupOutcome;
use mental_map_heatmap::progress::NullProgress;
use mental_map_render::RenderStrategy;
use mental_map_render::ramp::{alpha, intensity, ramp_rgb, to_hex};
use mental_map_render::surface::GeoJsonSurface;
use mental_map_render::vector::VectorRenderer;
use mental_map_server_models::{
    ApiHealth, ApiHeatmap, ApiHeatmapCell, ApiLookupStatus, ApiReverseGeocode, ApiTooltip,
    HeatmapQueryParams, ReverseGeocodeParams, TooltipQueryParams,
};

use crate::AppState;

/// `GET /api/health`
pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(ApiHealth {
        healthy: true,
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// `GET /api/studies/{id}/heatmap`
///
/// Computes the overlap grid for the requested selection and returns its
/// summary and qualifying cells.
pub async fn heatmap(
    state: web::Data<AppState>,
    path: web::Path<String>,
    params: web::Query<HeatmapQueryParams>,
) -> HttpResponse {
    let study_id = path.into_inner();
    let (session, layer) = match compute(&state, &study_id, &params).await {
        Ok(computed) => computed,
        Err(e) => return error_response(&study_id, &e),
    };

    let grid = &layer.grid;
    let min_overlap = session.selection().min_overlap_threshold;
    let max_value = grid.max_value();
    let cells = grid
        .qualifying_cells(min_overlap)
        .map(|(_, key, value)| {
            let t = intensity(value, max_value);
            ApiHeatmapCell {
                lat_key: key.lat_key,
                lng_key: key.lng_key,
                value,
                color: to_hex(ramp_rgb(t)),
                opacity: alpha(t, &state.renderer),
            }
        })
        .collect();

    HttpResponse::Ok().json(ApiHeatmap {
        study_id,
        selection_label: session.selection_label(),
        cell_size: grid.cell_size(),
        render_strategy: RenderStrategy::for_cell_size(grid.cell_size(), &state.renderer)
            .to_string(),
        width: grid.width(),
        height: grid.height(),
        min_lat_key: grid.min_lat_key(),
        min_lng_key: grid.min_lng_key(),
        max_value,
        smoothed: grid.is_smoothed(),
        area_too_large: grid.area_too_large(),
        empty: grid.is_empty(),
        feature_count: layer.features.len(),
        cells,
    })
}

/// `GET /api/studies/{id}/heatmap.geojson`
///
/// Qualifying cells as styled rectangles, as the vector renderer draws
/// them.
pub async fn heatmap_geojson(
    state: web::Data<AppState>,
    path: web::Path<String>,
    params: web::Query<HeatmapQueryParams>,
) -> HttpResponse {
    let study_id = path.into_inner();
    let (session, layer) = match compute(&state, &study_id, &params).await {
        Ok(computed) => computed,
        Err(e) => return error_response(&study_id, &e),
    };

    let mut surface = GeoJsonSurface::new();
    VectorRenderer::new(state.renderer).render(
        &mut surface,
        &layer.grid,
        session.selection().min_overlap_threshold,
    );
    HttpResponse::Ok()
        .content_type("application/geo+json")
        .json(surface.to_feature_collection())
}

/// `GET /api/studies/{id}/tooltip`
///
/// Tooltip content for the cell under `lat`/`lng`. The place name is
/// included when the cache or an unthrottled lookup can provide it;
/// clients are expected to debounce their calls.
pub async fn tooltip(
    state: web::Data<AppState>,
    path: web::Path<String>,
    params: web::Query<TooltipQueryParams>,
) -> HttpResponse {
    let study_id = path.into_inner();
    let (session, layer) = match compute(&state, &study_id, &params.heatmap()).await {
        Ok(computed) => computed,
        Err(e) => return error_response(&study_id, &e),
    };

    let min_overlap = session.selection().min_overlap_threshold;
    let Some(mut content) = TooltipContent::for_point(&layer, min_overlap, params.lat, params.lng)
    else {
        return HttpResponse::NotFound().json(serde_json::json!({
            "error": "No qualifying cell at this point"
        }));
    };

    content.location = state
        .geocoder
        .lookup(params.lat, params.lng)
        .await
        .location()
        .map(|location| location.label.clone());

    HttpResponse::Ok().json(ApiTooltip {
        lat_key: content.cell.lat_key,
        lng_key: content.cell.lng_key,
        location_text: content.location_text().to_string(),
        count_label: content.count_label,
        participant_code: content.participant_code,
        location: content.location,
    })
}

/// `GET /api/geocode/reverse`
///
/// Cached, throttled reverse lookup.
pub async fn reverse_geocode(
    state: web::Data<AppState>,
    params: web::Query<ReverseGeocodeParams>,
) -> HttpResponse {
    let outcome = state.geocoder.lookup(params.lat, params.lng).await;
    let status = match &outcome {
        LookupOutcome::Cached(_) => ApiLookupStatus::Cached,
        LookupOutcome::Fetched(_) => ApiLookupStatus::Fetched,
        LookupOutcome::Throttled => ApiLookupStatus::Throttled,
        LookupOutcome::InFlight => ApiLookupStatus::InFlight,
        LookupOutcome::Failed => ApiLookupStatus::Failed,
    };
    let location = outcome.location();

    HttpResponse::Ok().json(ApiReverseGeocode {
        status,
        label: location.map(|l| l.label.clone()),
        country_code: location.and_then(|l| l.country_code.clone()),
    })
}

/// Loads a study and computes the layer for the requested selection.
async fn compute(
    state: &AppState,
    study_id: &str,
    params: &HeatmapQueryParams,
) -> Result<(AnalysisSession, Arc<HeatmapLayer>), AnalysisError> {
    let mut session = AnalysisSession::load(state.source.as_ref(), study_id).await?;
    let selection = params.apply_to(session.selection());
    session.update_selection(selection);
    let layer = session.recompute(&NullProgress).await?;
    Ok((session, layer))
}

fn error_response(study_id: &str, e: &AnalysisError) -> HttpResponse {
    let body = serde_json::json!({ "error": e.to_string() });
    match e {
        AnalysisError::Load(_) => {
            log::error!("Failed to load study {study_id}: {e}");
            HttpResponse::BadGateway().json(body)
        }
        AnalysisError::Superseded { .. } => {
            log::warn!("Heatmap for study {study_id} superseded: {e}");
            HttpResponse::Conflict().json(body)
        }
        AnalysisError::Rasterize(_) => {
            log::warn!("Invalid heatmap request for study {study_id}: {e}");
            HttpResponse::BadRequest().json(body)
        }
    }
}
