//! Viewport-clipped raster renderer for fine grids.

use std::collections::BTreeSet;

use image::{Rgba, RgbaImage};
use mental_map_heatmap::{CellKey, Grid};

use crate::RendererConfig;
use crate::projection::Projection;
use crate::ramp::cell_color;

/// Paints qualifying cells into an RGBA image.
///
/// Each [`Self::redraw`] clears the image and paints only the cells that
/// intersect the viewport, with a one-cell margin so partially visible
/// edge cells are not lost while panning.
#[derive(Debug, Clone)]
pub struct CanvasRenderer {
    config: RendererConfig,
    image: RgbaImage,
}

impl CanvasRenderer {
    #[must_use]
    pub fn new(config: RendererConfig) -> Self {
        Self {
            config,
            image: RgbaImage::new(0, 0),
        }
    }

    /// The last painted frame.
    #[must_use]
    pub const fn image(&self) -> &RgbaImage {
        &self.image
    }

    #[must_use]
    pub fn into_image(self) -> RgbaImage {
        self.image
    }

    /// Clears and repaints the frame for the projection's viewport.
    ///
    /// `visual_blur` applies a Gaussian blur to the finished frame. It is
    /// purely cosmetic and independent of numeric smoothing.
    ///
    /// Returns the keys of the cells that were painted.
    pub fn redraw(
        &mut self,
        grid: &Grid,
        min_overlap: u32,
        visual_blur: bool,
        projection: &dyn Projection,
    ) -> BTreeSet<CellKey> {
        let viewport = projection.viewport();
        self.image = RgbaImage::from_pixel(viewport.width, viewport.height, Rgba([0, 0, 0, 0]));

        let mut drawn = BTreeSet::new();
        let Some(((lat_lo, lat_hi), (lng_lo, lng_hi))) = visible_key_range(grid, projection) else {
            return drawn;
        };

        let max_value = grid.max_value();
        let values = grid.values();

        for lat_key in lat_lo..=lat_hi {
            for lng_key in lng_lo..=lng_hi {
                let key = CellKey { lat_key, lng_key };
                let Some(idx) = grid.index(key) else {
                    continue;
                };
                let value = values[idx];
                if !Grid::qualifies(value, min_overlap) {
                    continue;
                }

                let bounds = grid.cell_bounds(key);
                let lower_left = projection.project(bounds.min());
                let upper_right = projection.project(bounds.max());
                let (x0, x1) = pixel_span(lower_left.x, upper_right.x, viewport.width);
                let (y0, y1) = pixel_span(upper_right.y, lower_left.y, viewport.height);
                if x0 >= x1 || y0 >= y1 {
                    continue;
                }

                let color = cell_color(value, max_value, &self.config);
                for y in y0..y1 {
                    for x in x0..x1 {
                        self.image.put_pixel(x, y, color);
                    }
                }
                drawn.insert(key);
            }
        }

        if visual_blur && self.config.blur_sigma > 0.0 && !drawn.is_empty() {
            self.image = image::imageops::blur(&self.image, self.config.blur_sigma);
        }

        log::debug!(
            "Canvas redraw painted {} cells into {}x{}",
            drawn.len(),
            viewport.width,
            viewport.height
        );
        drawn
    }
}

/// Inclusive key ranges of grid cells intersecting the viewport, padded
/// by one cell and clipped to the grid.
#[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
fn visible_key_range(grid: &Grid, projection: &dyn Projection) -> Option<((i64, i64), (i64, i64))> {
    if grid.is_empty() {
        return None;
    }
    let s = grid.cell_size();
    let bounds = projection.viewport().bounds;

    let grid_lat_hi = grid.min_lat_key() + grid.height() as i64 - 1;
    let grid_lng_hi = grid.min_lng_key() + grid.width() as i64 - 1;

    let lat_lo = ((bounds.min().y / s).floor() as i64 - 1).max(grid.min_lat_key());
    let lat_hi = ((bounds.max().y / s).floor() as i64 + 1).min(grid_lat_hi);
    let lng_lo = ((bounds.min().x / s).floor() as i64 - 1).max(grid.min_lng_key());
    let lng_hi = ((bounds.max().x / s).floor() as i64 + 1).min(grid_lng_hi);

    (lat_lo <= lat_hi && lng_lo <= lng_hi).then_some(((lat_lo, lat_hi), (lng_lo, lng_hi)))
}

/// Half-open pixel range covering `[lo, hi)`, clipped to `[0, limit)`.
/// Sub-pixel cells still get one pixel when on screen.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn pixel_span(lo: f64, hi: f64, limit: u32) -> (u32, u32) {
    let max = f64::from(limit);
    let start = lo.round().clamp(0.0, max) as u32;
    let end = hi.round().clamp(0.0, max) as u32;
    if end <= start && start < limit && lo < max && hi > 0.0 {
        (start, start + 1)
    } else {
        (start, end)
    }
}
