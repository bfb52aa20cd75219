//! Polygon and point rasterization onto a [`Grid`].
//!
//! Each ring is sampled only over the cells covered by its own bounding
//! box. A cell counts as covered when its lower-left corner
//! `(lng_key · s, lat_key · s)` is inside the ring under the even-odd
//! rule. Points skip ray casting and land on the nearest grid key.
//!
//! Ownership is per feature while counts are per ring hit: a feature whose
//! rings overlap counts its shared cells more than once but stays the
//! single owner.

use geo::{BoundingRect, Coord, LineString, Rect};
use mental_map_survey_models::SurveyFeature;

use crate::generation::GenerationTicket;
use crate::grid::{CellKey, Grid};
use crate::normalize::{Shapes, extract_shapes};
use crate::progress::ProgressCallback;
use crate::RasterizeError;

/// Number of rings processed between cooperative yields.
pub const YIELD_BATCH: usize = 50;

/// Extent (degrees, either axis) above which a grid is flagged as large.
pub const LARGE_AREA_DEGREES: f64 = 15.0;

/// Even-odd ray-casting test of `point` against `ring`.
///
/// The ring may be open or closed. Points on the left or bottom edge of
/// an axis-aligned ring count as inside, points on the right or top edge
/// as outside.
#[must_use]
pub fn ring_contains(ring: &LineString<f64>, point: Coord<f64>) -> bool {
    let coords = &ring.0;
    let Some(last) = coords.len().checked_sub(1) else {
        return false;
    };

    let mut inside = false;
    let mut j = last;
    for (i, ci) in coords.iter().enumerate() {
        let cj = coords[j];
        if (ci.y > point.y) != (cj.y > point.y)
            && point.x < (cj.x - ci.x) * (point.y - ci.y) / (cj.y - ci.y) + ci.x
        {
            inside = !inside;
        }
        j = i;
    }
    inside
}

/// Rasterizes features synchronously without yielding.
///
/// # Errors
///
/// Returns [`RasterizeError::InvalidCellSize`] for a non-positive or
/// non-finite cell size and [`RasterizeError::ExtentTooLarge`] when the
/// shapes cover more than [`MAX_CELLS`](crate::grid::MAX_CELLS) cells.
pub fn rasterize_now(features: &[SurveyFeature], cell_size: f64) -> Result<Grid, RasterizeError> {
    let shapes = extract_shapes(features);
    let Some(mut builder) = GridBuilder::new(&shapes, cell_size)? else {
        return Ok(Grid::empty(cell_size));
    };

    for (ring, owner) in &shapes.rings {
        builder.add_ring(ring, *owner);
    }
    for (point, owner) in &shapes.points {
        builder.add_point(*point, *owner);
    }

    Ok(builder.grid)
}

/// Rasterizes features, yielding to the runtime every [`YIELD_BATCH`]
/// rings.
///
/// The ticket is checked at every yield point and once more before
/// returning, so a run that has been superseded never hands back a grid.
///
/// # Errors
///
/// Returns [`RasterizeError::Superseded`] when a newer ticket was issued
/// while this run was in progress, [`RasterizeError::InvalidCellSize`]
/// for a non-positive or non-finite cell size, or
/// [`RasterizeError::ExtentTooLarge`] for an oversized extent.
pub async fn rasterize(
    features: &[SurveyFeature],
    cell_size: f64,
    ticket: &GenerationTicket,
    progress: &dyn ProgressCallback,
) -> Result<Grid, RasterizeError> {
    let shapes = extract_shapes(features);
    let Some(mut builder) = GridBuilder::new(&shapes, cell_size)? else {
        log::debug!("No shapes to rasterize (generation {})", ticket.id());
        progress.finish("Nothing to rasterize".to_string());
        return Ok(Grid::empty(cell_size));
    };

    progress.set_total(shapes.len() as u64);
    progress.set_message(format!(
        "Rasterizing {} rings and {} points",
        shapes.rings.len(),
        shapes.points.len()
    ));

    for (i, (ring, owner)) in shapes.rings.iter().enumerate() {
        if i > 0 && i % YIELD_BATCH == 0 {
            tokio::task::yield_now().await;
            if let Err(e) = ensure_current(ticket) {
                progress.finish_and_clear();
                return Err(e);
            }
            progress.set_position(i as u64);
        }
        builder.add_ring(ring, *owner);
    }
    progress.set_position(shapes.rings.len() as u64);

    for (point, owner) in &shapes.points {
        builder.add_point(*point, *owner);
    }
    progress.inc(shapes.points.len() as u64);

    if let Err(e) = ensure_current(ticket) {
        progress.finish_and_clear();
        return Err(e);
    }

    let grid = builder.grid;
    log::debug!(
        "Rasterized {} shapes into {}x{} grid (generation {})",
        shapes.len(),
        grid.width(),
        grid.height(),
        ticket.id()
    );
    progress.finish(format!("Rasterized {} shapes", shapes.len()));
    Ok(grid)
}

fn ensure_current(ticket: &GenerationTicket) -> Result<(), RasterizeError> {
    if ticket.is_current() {
        Ok(())
    } else {
        Err(RasterizeError::Superseded {
            requested: ticket.id(),
            current: ticket.latest(),
        })
    }
}

struct GridBuilder {
    grid: Grid,
}

impl GridBuilder {
    /// Allocates the grid over the union bounding box of all shapes.
    ///
    /// Returns `Ok(None)` when there are no shapes.
    fn new(shapes: &Shapes<'_>, cell_size: f64) -> Result<Option<Self>, RasterizeError> {
        if !(cell_size.is_finite() && cell_size > 0.0) {
            return Err(RasterizeError::InvalidCellSize { cell_size });
        }

        let Some(bounds) = union_bounds(shapes) else {
            return Ok(None);
        };

        let area_too_large =
            bounds.width() > LARGE_AREA_DEGREES || bounds.height() > LARGE_AREA_DEGREES;
        if area_too_large {
            log::warn!(
                "Heatmap area too large ({:.1}° x {:.1}°); rasterization may be slow and memory hungry",
                bounds.width(),
                bounds.height()
            );
        }

        let lat_keys = key_range(bounds.min().y, bounds.max().y, cell_size);
        let lng_keys = key_range(bounds.min().x, bounds.max().x, cell_size);

        let grid = Grid::allocate(cell_size, lat_keys, lng_keys, area_too_large).ok_or(
            RasterizeError::ExtentTooLarge {
                lng_span: bounds.width(),
                lat_span: bounds.height(),
                cell_size,
            },
        )?;
        Ok(Some(Self { grid }))
    }

    #[allow(clippy::cast_precision_loss)]
    fn add_ring(&mut self, ring: &LineString<f64>, owner: usize) {
        let Some(bounds) = ring.bounding_rect() else {
            return;
        };
        let s = self.grid.cell_size();
        let (lat_lo, lat_hi) = key_range(bounds.min().y, bounds.max().y, s);
        let (lng_lo, lng_hi) = key_range(bounds.min().x, bounds.max().x, s);

        for lat_key in lat_lo..=lat_hi {
            let y = lat_key as f64 * s;
            for lng_key in lng_lo..=lng_hi {
                let corner = Coord {
                    x: lng_key as f64 * s,
                    y,
                };
                if !ring_contains(ring, corner) {
                    continue;
                }
                if let Some(idx) = self.grid.index(CellKey { lat_key, lng_key }) {
                    self.grid.record_hit(idx, owner);
                }
            }
        }
    }

    /// Counts the point in the nearest key, `round(coord / s)`. Hover
    /// lookups ([`Grid::cell_at`]) floor instead, so a point whose scaled
    /// coordinate has a fraction of .5 or more is hovered one cell below
    /// or left of where it was counted. Change both or neither.
    #[allow(clippy::cast_possible_truncation)]
    fn add_point(&mut self, point: Coord<f64>, owner: usize) {
        let s = self.grid.cell_size();
        let key = CellKey {
            lat_key: (point.y / s).round() as i64,
            lng_key: (point.x / s).round() as i64,
        };
        if let Some(idx) = self.grid.index(key) {
            self.grid.record_hit(idx, owner);
        }
    }
}

#[allow(clippy::cast_possible_truncation)]
fn key_range(min: f64, max: f64, cell_size: f64) -> (i64, i64) {
    (
        (min / cell_size).floor() as i64,
        (max / cell_size).ceil() as i64,
    )
}

fn union_bounds(shapes: &Shapes<'_>) -> Option<Rect<f64>> {
    let ring_rects = shapes.rings.iter().filter_map(|(ring, _)| ring.bounding_rect());
    let point_rects = shapes.points.iter().map(|(p, _)| Rect::new(*p, *p));

    ring_rects.chain(point_rects).reduce(|a, b| {
        Rect::new(
            Coord {
                x: a.min().x.min(b.min().x),
                y: a.min().y.min(b.min().y),
            },
            Coord {
                x: a.max().x.max(b.max().x),
                y: a.max().y.max(b.max().y),
            },
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::Generation;
    use crate::grid::{OWNER_EMPTY, OWNER_MULTIPLE};
    use crate::progress::NullProgress;
    use mental_map_survey_models::FeatureGeometry;

    fn feature(id: &str, geometry: FeatureGeometry) -> SurveyFeature {
        SurveyFeature {
            id: id.to_string(),
            question_id: "q1".to_string(),
            participant_code: format!("P-{id}"),
            created_at: None,
            geometry,
        }
    }

    fn square(x0: f64, y0: f64, size: f64) -> LineString<f64> {
        LineString::from(vec![
            (x0, y0),
            (x0 + size, y0),
            (x0 + size, y0 + size),
            (x0, y0 + size),
            (x0, y0),
        ])
    }

    fn touched_keys(grid: &Grid) -> Vec<(CellKey, f32, i32)> {
        grid.counts()
            .iter()
            .enumerate()
            .filter(|(_, c)| **c > 0.0)
            .map(|(idx, c)| (grid.key_at(idx), *c, grid.owners()[idx]))
            .collect()
    }

    #[test]
    fn ring_contains_uses_even_odd_rule() {
        let triangle = LineString::from(vec![(0.0, 0.0), (0.0, 1.0), (1.0, 0.0)]);
        assert!(ring_contains(&triangle, Coord { x: 0.2, y: 0.2 }));
        assert!(ring_contains(&triangle, Coord { x: 0.0, y: 0.0 }));
        assert!(!ring_contains(&triangle, Coord { x: 0.5, y: 0.5 }));
        assert!(!ring_contains(&triangle, Coord { x: 0.8, y: 0.8 }));
        assert!(!ring_contains(&LineString::new(vec![]), Coord { x: 0.0, y: 0.0 }));
    }

    #[test]
    fn triangle_at_half_degree_hits_lower_left_corners_inside() {
        let features = vec![feature(
            "0_0",
            FeatureGeometry::Polygon(LineString::from(vec![(0.0, 0.0), (0.0, 1.0), (1.0, 0.0)])),
        )];
        let grid = rasterize_now(&features, 0.5).unwrap();

        assert_eq!((grid.width(), grid.height()), (3, 3));
        // Corners (0,0), (0.5,0) and (0,0.5) are inside; (0.5,0.5) lies on
        // the hypotenuse and is outside under the even-odd rule.
        let keys: Vec<CellKey> = touched_keys(&grid).into_iter().map(|(k, _, _)| k).collect();
        assert_eq!(
            keys,
            vec![
                CellKey { lat_key: 0, lng_key: 0 },
                CellKey { lat_key: 0, lng_key: 1 },
                CellKey { lat_key: 1, lng_key: 0 },
            ]
        );
    }

    #[test]
    fn point_increments_exactly_one_cell() {
        let features = vec![feature("0_0", FeatureGeometry::Point(Coord { x: 2.5, y: 48.8 }))];
        let grid = rasterize_now(&features, 0.1).unwrap();

        let touched = touched_keys(&grid);
        assert_eq!(touched.len(), 1);
        let (key, count, owner) = touched[0];
        assert_eq!(key, CellKey { lat_key: 488, lng_key: 25 });
        assert!((count - 1.0).abs() < f32::EPSILON);
        assert_eq!(owner, 0);
        let total: f32 = grid.counts().iter().sum();
        assert!((total - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn point_rounds_while_hover_floors() {
        let features = vec![feature("0_0", FeatureGeometry::Point(Coord { x: 0.08, y: 0.08 }))];
        let grid = rasterize_now(&features, 0.1).unwrap();

        let counted = touched_keys(&grid);
        assert_eq!(counted.len(), 1);
        assert_eq!(counted[0].0, CellKey { lat_key: 1, lng_key: 1 });

        let hovered = grid.cell_at(0.08, 0.08).unwrap();
        assert_eq!(grid.key_at(hovered), CellKey { lat_key: 0, lng_key: 0 });
        assert!(grid.counts()[hovered].abs() < f32::EPSILON);
    }

    #[test]
    fn non_overlapping_features_have_single_owners() {
        let features = vec![
            feature("a", FeatureGeometry::Polygon(square(0.0, 0.0, 1.0))),
            feature("b", FeatureGeometry::Polygon(square(3.0, 3.0, 1.0))),
        ];
        let grid = rasterize_now(&features, 0.5).unwrap();

        let touched = touched_keys(&grid);
        assert_eq!(touched.len(), 8);
        for (key, count, owner) in touched {
            assert!((count - 1.0).abs() < f32::EPSILON);
            assert_ne!(owner, OWNER_MULTIPLE);
            let expected = i32::from(key.lng_key >= 6);
            assert_eq!(owner, expected, "cell {key:?}");
        }
    }

    #[test]
    fn fully_overlapping_features_are_marked_multiple() {
        let features = vec![
            feature("a", FeatureGeometry::Polygon(square(0.0, 0.0, 1.0))),
            feature("b", FeatureGeometry::Polygon(square(0.0, 0.0, 1.0))),
        ];
        let grid = rasterize_now(&features, 0.5).unwrap();

        let touched = touched_keys(&grid);
        assert_eq!(touched.len(), 4);
        for (_, count, owner) in touched {
            assert!((count - 2.0).abs() < f32::EPSILON);
            assert_eq!(owner, OWNER_MULTIPLE);
        }
    }

    #[test]
    fn duplicated_feature_doubles_counts_but_keeps_owner() {
        let duplicate = feature("r1_0", FeatureGeometry::Polygon(square(0.0, 0.0, 1.0)));
        let features = vec![duplicate.clone(), duplicate];
        let grid = rasterize_now(&features, 0.5).unwrap();

        for (_, count, owner) in touched_keys(&grid) {
            assert!((count - 2.0).abs() < f32::EPSILON);
            assert_eq!(owner, 0);
        }
    }

    #[test]
    fn overlapping_rings_of_one_feature_double_count() {
        let features = vec![feature(
            "0_0",
            FeatureGeometry::MultiPolygon(vec![square(0.0, 0.0, 1.0), square(0.0, 0.0, 1.0)]),
        )];
        let grid = rasterize_now(&features, 0.5).unwrap();

        let touched = touched_keys(&grid);
        assert_eq!(touched.len(), 4);
        for (_, count, owner) in touched {
            assert!((count - 2.0).abs() < f32::EPSILON);
            assert_eq!(owner, 0);
        }
    }

    #[test]
    fn interior_cells_belong_to_sole_polygon() {
        let features = vec![feature("a", FeatureGeometry::Polygon(square(0.0, 0.0, 2.0)))];
        let grid = rasterize_now(&features, 0.25).unwrap();

        for idx in 0..grid.counts().len() {
            let bounds = grid.cell_bounds(grid.key_at(idx));
            let corner = bounds.min();
            let strictly_inside =
                corner.x > 0.0 && corner.x < 2.0 && corner.y > 0.0 && corner.y < 2.0;
            if strictly_inside {
                assert_eq!(grid.owners()[idx], 0, "cell at {corner:?}");
                assert!((grid.counts()[idx] - 1.0).abs() < f32::EPSILON);
            }
        }
    }

    #[test]
    fn empty_input_returns_zero_area_grid() {
        let grid = rasterize_now(&[], 0.1).unwrap();
        assert!(grid.is_empty());
        assert_eq!(grid.counts().len(), 0);
    }

    #[test]
    fn invalid_cell_size_is_rejected() {
        let features = vec![feature("a", FeatureGeometry::Point(Coord { x: 0.0, y: 0.0 }))];
        assert!(matches!(
            rasterize_now(&features, 0.0),
            Err(RasterizeError::InvalidCellSize { .. })
        ));
        assert!(matches!(
            rasterize_now(&features, f64::NAN),
            Err(RasterizeError::InvalidCellSize { .. })
        ));
    }

    #[test]
    fn wide_extent_is_flagged() {
        let features = vec![
            feature("a", FeatureGeometry::Point(Coord { x: 0.0, y: 0.0 })),
            feature("b", FeatureGeometry::Point(Coord { x: 20.0, y: 0.5 })),
        ];
        let grid = rasterize_now(&features, 0.5).unwrap();
        assert!(grid.area_too_large());

        let small = rasterize_now(&features[..1], 0.5).unwrap();
        assert!(!small.area_too_large());
        assert!(small.owners().iter().any(|o| *o != OWNER_EMPTY));
    }

    #[test]
    fn far_apart_coordinates_are_rejected_without_panicking() {
        let features = vec![
            feature("a", FeatureGeometry::Point(Coord { x: 1e300, y: 0.0 })),
            feature("b", FeatureGeometry::Point(Coord { x: -1e300, y: 0.0 })),
        ];
        assert!(matches!(
            rasterize_now(&features, 0.1),
            Err(RasterizeError::ExtentTooLarge { .. })
        ));

        let stray = vec![
            feature("a", FeatureGeometry::Point(Coord { x: 0.0, y: 0.0 })),
            feature("b", FeatureGeometry::Point(Coord { x: 1e6, y: 1e6 })),
        ];
        assert!(matches!(
            rasterize_now(&stray, 0.05),
            Err(RasterizeError::ExtentTooLarge { .. })
        ));
    }

    fn many_squares(n: usize) -> Vec<SurveyFeature> {
        (0..n)
            .map(|i| {
                #[allow(clippy::cast_precision_loss)]
                let offset = (i % 10) as f64 * 0.1;
                feature(&format!("{i}_0"), FeatureGeometry::Polygon(square(offset, offset, 1.0)))
            })
            .collect()
    }

    #[tokio::test]
    async fn async_rasterize_matches_synchronous_result() {
        let features = many_squares(120);
        let ticket = Generation::new().next_ticket();

        let grid = rasterize(&features, 0.1, &ticket, &NullProgress).await.unwrap();
        assert_eq!(grid, rasterize_now(&features, 0.1).unwrap());
    }

    #[tokio::test]
    async fn superseded_run_returns_no_grid() {
        let features = many_squares(120);
        let generation = Generation::new();
        let stale = generation.next_ticket();
        let _newer = generation.next_ticket();

        let result = rasterize(&features, 0.1, &stale, &NullProgress).await;
        assert!(matches!(
            result,
            Err(RasterizeError::Superseded { requested: 1, current: 2 })
        ));
    }

    #[tokio::test]
    async fn small_superseded_run_is_rejected_at_the_end() {
        let features = many_squares(3);
        let generation = Generation::new();
        let stale = generation.next_ticket();
        generation.cancel_all();

        assert!(rasterize(&features, 0.1, &stale, &NullProgress).await.is_err());
    }
}
