//! One-shape-per-cell renderer for coarse grids.
//!
//! The renderer never asks the surface what it contains. It remembers the
//! [`ShapeHandle`]s it added and removes exactly those on [`VectorRenderer::clear`],
//! so other layers drawn on the same surface (basemap, participant shapes)
//! survive a redraw.

use geo::{Coord, LineString, Rect};
use mental_map_heatmap::{CellKey, Grid};
use serde::{Deserialize, Serialize};

use crate::RendererConfig;
use crate::ramp::{alpha, intensity, ramp_rgb};

/// Opaque identifier of a shape added to a [`MapSurface`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ShapeHandle(pub u64);

/// Geometry of a shape in geographic coordinates (`x` = longitude).
#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    /// Axis-aligned rectangle, e.g. one grid cell.
    Rect(Rect<f64>),
    /// Closed or open outer ring.
    Polygon(LineString<f64>),
    /// Fixed-size marker.
    Marker(Coord<f64>),
}

/// Fill and outline of a shape.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShapeStyle {
    pub fill: [u8; 3],
    pub fill_opacity: f32,
    pub stroke: Option<[u8; 3]>,
}

/// A map layer shapes can be added to and removed from.
pub trait MapSurface {
    /// Adds a shape with an optional popup text.
    fn add_shape(&mut self, shape: Shape, style: ShapeStyle, popup: Option<String>) -> ShapeHandle;

    /// Removes a previously added shape. Returns whether it existed.
    fn remove_shape(&mut self, handle: ShapeHandle) -> bool;

    /// Number of shapes currently on the surface.
    fn shape_count(&self) -> usize;
}

/// Draws qualifying cells as rectangles on a [`MapSurface`].
#[derive(Debug, Clone, Default)]
pub struct VectorRenderer {
    config: RendererConfig,
    handles: Vec<ShapeHandle>,
}

impl VectorRenderer {
    #[must_use]
    pub const fn new(config: RendererConfig) -> Self {
        Self {
            config,
            handles: Vec::new(),
        }
    }

    /// Handles of the shapes this renderer currently owns.
    #[must_use]
    pub fn handles(&self) -> &[ShapeHandle] {
        &self.handles
    }

    /// Clears the previous frame and adds one rectangle per qualifying cell.
    ///
    /// Returns the keys of the drawn cells in grid order.
    pub fn render(
        &mut self,
        surface: &mut dyn MapSurface,
        grid: &Grid,
        min_overlap: u32,
    ) -> Vec<CellKey> {
        self.clear(surface);

        let max_value = grid.max_value();
        let mut drawn = Vec::new();
        for (_, key, value) in grid.qualifying_cells(min_overlap) {
            let t = intensity(value, max_value);
            let style = ShapeStyle {
                fill: ramp_rgb(t),
                fill_opacity: alpha(t, &self.config),
                stroke: None,
            };
            let popup = format!("Overlap: {}", grid.format_value(value));
            let handle = surface.add_shape(Shape::Rect(grid.cell_bounds(key)), style, Some(popup));
            self.handles.push(handle);
            drawn.push(key);
        }

        log::debug!("Vector render added {} cell shapes", drawn.len());
        drawn
    }

    /// Removes every shape this renderer added, and nothing else.
    pub fn clear(&mut self, surface: &mut dyn MapSurface) {
        for handle in self.handles.drain(..) {
            if !surface.remove_shape(handle) {
                log::debug!("Shape {handle:?} already removed from surface");
            }
        }
    }
}
