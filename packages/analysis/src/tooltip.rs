//! Hover tooltip state machine.
//!
//! Hovering a qualifying cell shows its overlap value and owning
//! participant right away, with a placeholder where the place name goes.
//! The place name arrives later as a [`TooltipEvent::LocationResolved`]
//! once the hover has rested for the service's debounce interval and the
//! reverse lookup has answered. Leaving the cell or moving to another one
//! cancels the pending timer; at most one timer exists at a time.

use std::sync::{Arc, Mutex, PoisonError};

use mental_map_geocoder::ReverseGeocodeService;
use mental_map_heatmap::CellKey;
use mental_map_heatmap::grid::Grid;
use mental_map_heatmap::owner::resolve_owner;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::HeatmapLayer;

/// Shown until the place name is known.
pub const LOADING_LOCATION: &str = "Ort wird geladen…";

/// What the tooltip displays for one cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TooltipContent {
    /// The hovered cell.
    pub cell: CellKey,
    /// Overlap value, whole for raw grids and two decimals when smoothed.
    pub count_label: String,
    /// Participant owning the cell, if exactly one feature does.
    pub participant_code: Option<String>,
    /// Resolved place name; `None` while loading or after a failure.
    pub location: Option<String>,
}

impl TooltipContent {
    /// Place name, or [`LOADING_LOCATION`] if not resolved.
    #[must_use]
    pub fn location_text(&self) -> &str {
        self.location.as_deref().unwrap_or(LOADING_LOCATION)
    }

    /// Builds the content for the cell under `(lat, lng)`.
    ///
    /// Returns `None` if the point is outside the grid or the cell does not
    /// qualify under `min_overlap`.
    #[must_use]
    pub fn for_point(layer: &HeatmapLayer, min_overlap: u32, lat: f64, lng: f64) -> Option<Self> {
        let grid = &layer.grid;
        let idx = grid.cell_at(lat, lng)?;
        let value = grid.values()[idx];
        if !Grid::qualifies(value, min_overlap) {
            return None;
        }
        Some(Self {
            cell: grid.key_at(idx),
            count_label: grid.format_value(value),
            participant_code: resolve_owner(grid, idx)
                .and_then(|owner| layer.participant_for_owner(owner))
                .map(str::to_string),
            location: None,
        })
    }
}

/// Updates for whatever displays the tooltip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TooltipEvent {
    /// Show (or replace) the tooltip.
    Show(TooltipContent),
    /// Fill in the place name of the tooltip for `cell`.
    LocationResolved {
        /// Cell the lookup was started for.
        cell: CellKey,
        /// Resolved place name.
        location: String,
    },
    /// Hide the tooltip.
    Hide,
}

/// Immediate result of a hover.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HoverResult {
    /// Nothing qualifying under the cursor.
    Hidden,
    /// Still over the cell already shown.
    Unchanged,
    /// Entered a new qualifying cell.
    Shown(TooltipContent),
}

/// The tooltip on screen, tied to the layer it was computed from.
///
/// A recompute reuses cell keys for different values (smoothing) or
/// different places (grid size), so a key alone does not identify it.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ShownCell {
    generation: u64,
    cell_size_bits: u64,
    content: TooltipContent,
}

/// Tooltip driver for one map view.
///
/// Must be used inside a tokio runtime.
pub struct TooltipController {
    service: Arc<ReverseGeocodeService>,
    events: mpsc::UnboundedSender<TooltipEvent>,
    current: Arc<Mutex<Option<ShownCell>>>,
    pending: Option<JoinHandle<()>>,
}

impl TooltipController {
    /// Creates a controller and the receiver for its events.
    #[must_use]
    pub fn new(
        service: Arc<ReverseGeocodeService>,
    ) -> (Self, mpsc::UnboundedReceiver<TooltipEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        (
            Self {
                service,
                events,
                current: Arc::new(Mutex::new(None)),
                pending: None,
            },
            rx,
        )
    }

    /// Cell currently shown, if any.
    #[must_use]
    pub fn current_cell(&self) -> Option<CellKey> {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|shown| shown.content.cell)
    }

    /// Handles the cursor moving to `(lat, lng)` over `layer`.
    ///
    /// Returns [`HoverResult::Unchanged`] only while the cursor stays in
    /// the cell shown from the same layer; after a recompute the cell is
    /// shown afresh.
    pub fn on_hover(
        &mut self,
        layer: &HeatmapLayer,
        min_overlap: u32,
        lat: f64,
        lng: f64,
    ) -> HoverResult {
        let Some(mut content) = TooltipContent::for_point(layer, min_overlap, lat, lng) else {
            self.on_leave();
            return HoverResult::Hidden;
        };

        let shown = ShownCell {
            generation: layer.generation,
            cell_size_bits: layer.grid.cell_size().to_bits(),
            content: content.clone(),
        };
        {
            let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
            if current.as_ref() == Some(&shown) {
                return HoverResult::Unchanged;
            }
            *current = Some(shown.clone());
        }
        self.cancel_pending();

        content.location = self.service.cached(lat, lng).map(|location| location.label);
        let _ = self.events.send(TooltipEvent::Show(content.clone()));

        if content.location.is_none() {
            self.schedule_lookup(shown, lat, lng);
        }
        HoverResult::Shown(content)
    }

    /// Handles the cursor leaving the heatmap.
    pub fn on_leave(&mut self) {
        self.cancel_pending();
        let previous = self
            .current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if previous.is_some() {
            let _ = self.events.send(TooltipEvent::Hide);
        }
    }

    fn cancel_pending(&mut self) {
        if let Some(handle) = self.pending.take() {
            handle.abort();
        }
    }

    fn schedule_lookup(&mut self, shown: ShownCell, lat: f64, lng: f64) {
        let service = Arc::clone(&self.service);
        let events = self.events.clone();
        let current = Arc::clone(&self.current);

        self.pending = Some(tokio::spawn(async move {
            tokio::time::sleep(service.debounce()).await;

            // Detached: aborting mid-request would leave the cache key pending.
            tokio::spawn(async move {
                let outcome = service.lookup(lat, lng).await;
                let Some(location) = outcome.location() else {
                    return;
                };
                let still_shown = current
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .as_ref()
                    == Some(&shown);
                if still_shown {
                    let _ = events.send(TooltipEvent::LocationResolved {
                        cell: shown.content.cell,
                        location: location.label.clone(),
                    });
                }
            });
        }));
    }
}

impl Drop for TooltipController {
    fn drop(&mut self) {
        self.cancel_pending();
    }
}
