#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Drawing controller for the collection side of a mental map survey.
//!
//! A participant answers a spatial question by sketching polygons or
//! placing points. Toolbar buttons hold a [`Toolbar`] bound to a
//! [`DrawingController`] rather than reaching for global callbacks, and
//! [`SketchPad`] turns the collected vertices into a `GeoJSON` geometry for
//! storage.

use geo::Coord;
use geojson::{Geometry, Value};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use thiserror::Error;

/// Vertices needed before a freehand stroke becomes a polygon.
pub const MIN_POLYGON_VERTICES: usize = 3;

/// What the next stroke produces.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DrawMode {
    /// Freehand outline closed into a polygon.
    Polygon,
    /// Every vertex becomes its own point.
    Point,
}

/// Errors from collecting sketch input.
#[derive(Debug, Error, PartialEq)]
pub enum CollectError {
    /// A vertex arrived while no drawing mode was active.
    #[error("Not drawing")]
    NotDrawing,

    /// A vertex with a NaN or infinite coordinate.
    #[error("Non-finite coordinate ({lng}, {lat})")]
    NonFiniteCoordinate {
        /// Longitude as received.
        lng: f64,
        /// Latitude as received.
        lat: f64,
    },
}

/// Controls freehand drawing on the collection map.
pub trait DrawingController {
    /// Begins a new stroke in `mode`, finishing any stroke in progress.
    fn start(&mut self, mode: DrawMode);

    /// Finishes the current stroke.
    fn stop(&mut self);

    /// Discards everything drawn so far.
    fn clear(&mut self);

    /// The active mode, if a stroke is in progress.
    fn mode(&self) -> Option<DrawMode>;
}

/// In-memory sketch of one answer.
#[derive(Debug, Default, Clone)]
pub struct SketchPad {
    mode: Option<DrawMode>,
    stroke: Vec<Coord<f64>>,
    polygons: Vec<Vec<Coord<f64>>>,
    points: Vec<Coord<f64>>,
}

impl SketchPad {
    /// An empty sketch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a vertex to the current stroke.
    ///
    /// # Errors
    ///
    /// * [`CollectError::NotDrawing`] if no mode is active
    /// * [`CollectError::NonFiniteCoordinate`] for NaN/infinite input
    pub fn add_vertex(&mut self, lng: f64, lat: f64) -> Result<(), CollectError> {
        let Some(mode) = self.mode else {
            return Err(CollectError::NotDrawing);
        };
        if !(lng.is_finite() && lat.is_finite()) {
            return Err(CollectError::NonFiniteCoordinate { lng, lat });
        }

        let coord = Coord { x: lng, y: lat };
        match mode {
            DrawMode::Polygon => self.stroke.push(coord),
            DrawMode::Point => self.points.push(coord),
        }
        Ok(())
    }

    /// Finished polygons (open rings, `[lng, lat]`).
    #[must_use]
    pub fn polygons(&self) -> &[Vec<Coord<f64>>] {
        &self.polygons
    }

    /// Placed points.
    #[must_use]
    pub fn points(&self) -> &[Coord<f64>] {
        &self.points
    }

    /// Whether nothing has been finished yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.polygons.is_empty() && self.points.is_empty()
    }

    /// The finished shapes as a single `GeoJSON` geometry.
    ///
    /// One polygon becomes a `Polygon`, several a `MultiPolygon`, a single
    /// point a `Point`. Any other mix is wrapped in a
    /// `GeometryCollection`. Returns `None` when nothing was drawn.
    #[must_use]
    pub fn to_geometry(&self) -> Option<Geometry> {
        let polygons: Vec<Vec<Vec<Vec<f64>>>> =
            self.polygons.iter().map(|ring| vec![closed_ring(ring)]).collect();
        let points: Vec<Vec<f64>> = self.points.iter().map(|c| vec![c.x, c.y]).collect();

        let value = match (polygons.len(), points.len()) {
            (0, 0) => return None,
            (1, 0) => Value::Polygon(polygons.into_iter().next()?),
            (_, 0) => Value::MultiPolygon(polygons),
            (0, 1) => Value::Point(points.into_iter().next()?),
            _ => Value::GeometryCollection(
                polygons
                    .into_iter()
                    .map(|p| Geometry::new(Value::Polygon(p)))
                    .chain(points.into_iter().map(|p| Geometry::new(Value::Point(p))))
                    .collect(),
            ),
        };
        Some(Geometry::new(value))
    }

    fn finish_stroke(&mut self) {
        let stroke = std::mem::take(&mut self.stroke);
        if stroke.is_empty() {
            return;
        }
        if stroke.len() < MIN_POLYGON_VERTICES {
            log::debug!("Discarding stroke with {} vertices", stroke.len());
            return;
        }
        self.polygons.push(stroke);
    }
}

impl DrawingController for SketchPad {
    fn start(&mut self, mode: DrawMode) {
        self.finish_stroke();
        log::debug!("Drawing started in {mode} mode");
        self.mode = Some(mode);
    }

    fn stop(&mut self) {
        self.finish_stroke();
        self.mode = None;
    }

    fn clear(&mut self) {
        self.mode = None;
        self.stroke.clear();
        self.polygons.clear();
        self.points.clear();
    }

    fn mode(&self) -> Option<DrawMode> {
        self.mode
    }
}

fn closed_ring(ring: &[Coord<f64>]) -> Vec<Vec<f64>> {
    let mut positions: Vec<Vec<f64>> = ring.iter().map(|c| vec![c.x, c.y]).collect();
    if let (Some(first), Some(last)) = (ring.first(), ring.last())
        && first != last
    {
        positions.push(vec![first.x, first.y]);
    }
    positions
}

/// Actions bound to the collection toolbar buttons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum ToolbarAction {
    /// Start a polygon stroke.
    DrawPolygon,
    /// Start placing points.
    PlacePoint,
    /// Finish the current stroke.
    Finish,
    /// Discard the sketch.
    Clear,
}

/// Toolbar buttons bound to one controller.
pub struct Toolbar<'a> {
    controller: &'a mut dyn DrawingController,
}

impl<'a> Toolbar<'a> {
    /// Binds the toolbar to `controller`.
    pub fn new(controller: &'a mut dyn DrawingController) -> Self {
        Self { controller }
    }

    /// Handles a button press.
    pub fn press(&mut self, action: ToolbarAction) {
        match action {
            ToolbarAction::DrawPolygon => self.controller.start(DrawMode::Polygon),
            ToolbarAction::PlacePoint => self.controller.start(DrawMode::Point),
            ToolbarAction::Finish => self.controller.stop(),
            ToolbarAction::Clear => self.controller.clear(),
        }
    }
}
