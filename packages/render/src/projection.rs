//! Geographic to screen projection.

use geo::{Coord, Rect};

/// Latitude limit of the Web Mercator projection.
pub const MAX_MERCATOR_LAT: f64 = 85.051_128_78;

/// Visible geographic extent and its pixel size.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    /// Visible extent (`x` = longitude, `y` = latitude).
    pub bounds: Rect<f64>,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Viewport {
    /// A viewport showing `bounds` on a `width` × `height` surface.
    #[must_use]
    pub const fn new(bounds: Rect<f64>, width: u32, height: u32) -> Self {
        Self {
            bounds,
            width,
            height,
        }
    }

    /// A viewport fitted around `bounds`, padded by `padding` (fraction of
    /// the extent) on each side. Degenerate extents are widened to
    /// `min_span` degrees so single points stay visible.
    #[must_use]
    pub fn fit(bounds: Rect<f64>, width: u32, height: u32, padding: f64, min_span: f64) -> Self {
        let span_x = bounds.width().max(min_span);
        let span_y = bounds.height().max(min_span);
        let center = bounds.center();
        let half_x = span_x.mul_add(padding, span_x / 2.0);
        let half_y = span_y.mul_add(padding, span_y / 2.0);
        Self::new(
            Rect::new(
                Coord {
                    x: center.x - half_x,
                    y: (center.y - half_y).max(-MAX_MERCATOR_LAT),
                },
                Coord {
                    x: center.x + half_x,
                    y: (center.y + half_y).min(MAX_MERCATOR_LAT),
                },
            ),
            width,
            height,
        )
    }
}

/// Maps geographic coordinates to pixel coordinates of a viewport.
pub trait Projection {
    /// The viewport this projection draws into.
    fn viewport(&self) -> &Viewport;

    /// Pixel position (`x` right, `y` down) of a geographic coordinate.
    fn project(&self, coord: Coord<f64>) -> Coord<f64>;
}

/// Spherical Web Mercator stretched over a [`Viewport`].
#[derive(Debug, Clone, Copy)]
pub struct WebMercator {
    viewport: Viewport,
    min: Coord<f64>,
    scale_x: f64,
    scale_y: f64,
}

impl WebMercator {
    /// Projection for `viewport`.
    #[must_use]
    pub fn new(viewport: Viewport) -> Self {
        let min = mercator(viewport.bounds.min());
        let max = mercator(viewport.bounds.max());
        let span_x = max.x - min.x;
        let span_y = max.y - min.y;
        Self {
            viewport,
            min,
            scale_x: if span_x > 0.0 { f64::from(viewport.width) / span_x } else { 0.0 },
            scale_y: if span_y > 0.0 { f64::from(viewport.height) / span_y } else { 0.0 },
        }
    }
}

impl Projection for WebMercator {
    fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    fn project(&self, coord: Coord<f64>) -> Coord<f64> {
        let m = mercator(coord);
        Coord {
            x: (m.x - self.min.x) * self.scale_x,
            y: f64::from(self.viewport.height) - (m.y - self.min.y) * self.scale_y,
        }
    }
}

fn mercator(coord: Coord<f64>) -> Coord<f64> {
    let lat = coord.y.clamp(-MAX_MERCATOR_LAT, MAX_MERCATOR_LAT).to_radians();
    Coord {
        x: coord.x.to_radians(),
        y: (std::f64::consts::FRAC_PI_4 + lat / 2.0).tan().ln(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn viewport() -> Viewport {
        Viewport::new(
            Rect::new(Coord { x: 0.0, y: 40.0 }, Coord { x: 10.0, y: 50.0 }),
            200,
            100,
        )
    }

    #[test]
    fn corners_map_to_screen_corners() {
        let projection = WebMercator::new(viewport());
        let top_left = projection.project(Coord { x: 0.0, y: 50.0 });
        let bottom_right = projection.project(Coord { x: 10.0, y: 40.0 });
        assert!(top_left.x.abs() < 1e-9 && top_left.y.abs() < 1e-9);
        assert!((bottom_right.x - 200.0).abs() < 1e-9);
        assert!((bottom_right.y - 100.0).abs() < 1e-9);
    }

    #[test]
    fn mercator_stretches_higher_latitudes() {
        let projection = WebMercator::new(viewport());
        let lower = projection.project(Coord { x: 5.0, y: 41.0 }).y
            - projection.project(Coord { x: 5.0, y: 40.0 }).y;
        let upper = projection.project(Coord { x: 5.0, y: 50.0 }).y
            - projection.project(Coord { x: 5.0, y: 49.0 }).y;
        assert!(upper.abs() > lower.abs());
    }

    #[test]
    fn fit_widens_degenerate_bounds() {
        let point = Coord { x: 2.5, y: 48.8 };
        let fitted = Viewport::fit(Rect::new(point, point), 100, 100, 0.1, 0.01);
        assert!(fitted.bounds.width() > 0.01);
        assert!(fitted.bounds.height() > 0.01);
        let center = fitted.bounds.center();
        assert!((center.x - 2.5).abs() < 1e-9);
    }
}
