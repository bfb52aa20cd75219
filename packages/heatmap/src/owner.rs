//! Owner resolution for hover lookups.
//!
//! Smoothing spreads a single feature's count into neighbouring cells
//! where it can meet another feature's halo. Such a cell is marked
//! [`OWNER_MULTIPLE`] even though visually it belongs to one drawing, so
//! a multiple-owner cell whose value is within [`HALO_TOLERANCE`] of `1`
//! is resolved against its 3×3 neighbourhood.

use crate::grid::{Grid, OWNER_MULTIPLE};
use crate::smooth::SMOOTHING_WINDOW_CELLS;

/// Half of one smoothing step (`1 / (2 · 9)`).
#[allow(clippy::cast_precision_loss)]
pub const HALO_TOLERANCE: f32 = 1.0 / (2.0 * SMOOTHING_WINDOW_CELLS as f32);

/// Feature index owning the cell at `idx`, if exactly one feature does.
///
/// A direct owner is returned as is. A [`OWNER_MULTIPLE`] cell whose value
/// is within [`HALO_TOLERANCE`] of `1` resolves to the single distinct
/// non-negative owner among its neighbours; if there are zero or several,
/// there is no owner.
#[must_use]
pub fn resolve_owner(grid: &Grid, idx: usize) -> Option<usize> {
    let owner = *grid.owners().get(idx)?;
    if let Ok(direct) = usize::try_from(owner) {
        return Some(direct);
    }
    if owner != OWNER_MULTIPLE {
        return None;
    }

    let value = grid.values()[idx];
    if (value - 1.0).abs() > HALO_TOLERANCE {
        return None;
    }

    let mut found: Option<usize> = None;
    for neighbour in grid.neighbourhood(idx) {
        let Ok(candidate) = usize::try_from(grid.owners()[neighbour]) else {
            continue;
        };
        match found {
            None => found = Some(candidate),
            Some(existing) if existing != candidate => return None,
            Some(_) => {}
        }
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::{CellKey, OWNER_EMPTY};

    fn grid_with(owners: &[(i64, i64, usize)], size: (i64, i64)) -> Grid {
        let mut grid = Grid::allocate(1.0, (0, size.0 - 1), (0, size.1 - 1), false).unwrap();
        for (lat_key, lng_key, owner) in owners {
            let idx = grid.index(CellKey { lat_key: *lat_key, lng_key: *lng_key }).unwrap();
            grid.record_hit(idx, *owner);
        }
        grid
    }

    #[test]
    fn tolerance_is_half_a_smoothing_step() {
        assert!((HALO_TOLERANCE - 1.0 / 18.0).abs() < f32::EPSILON);
    }

    #[test]
    fn direct_owner_is_returned() {
        let grid = grid_with(&[(0, 0, 3)], (2, 2));
        assert_eq!(resolve_owner(&grid, 0), Some(3));
    }

    #[test]
    fn empty_cell_has_no_owner() {
        let grid = grid_with(&[(0, 0, 3)], (2, 2));
        assert_eq!(grid.owners()[3], OWNER_EMPTY);
        assert_eq!(resolve_owner(&grid, 3), None);
        assert_eq!(resolve_owner(&grid, 99), None);
    }

    fn halo_grid(extra: &[(usize, usize)]) -> Grid {
        let mut grid = Grid::allocate(1.0, (0, 2), (0, 2), false).unwrap();
        grid.record_hit(0, 5);
        for (idx, owner) in extra {
            grid.record_hit(*idx, *owner);
        }
        grid.record_hit(4, 5);
        grid.record_hit(4, 6);
        let mut values = vec![0.0; 9];
        values[4] = 1.0 + HALO_TOLERANCE / 2.0;
        grid.with_smoothed_values(values)
    }

    #[test]
    fn halo_cell_resolves_to_single_neighbour_owner() {
        let grid = halo_grid(&[]);
        assert_eq!(grid.owners()[4], OWNER_MULTIPLE);
        assert_eq!(resolve_owner(&grid, 4), Some(5));
    }

    #[test]
    fn halo_with_two_neighbour_owners_stays_unresolved() {
        let grid = halo_grid(&[(8, 6)]);
        assert_eq!(resolve_owner(&grid, 4), None);
    }

    #[test]
    fn genuine_overlap_is_not_a_halo() {
        let mut grid = Grid::allocate(1.0, (0, 2), (0, 2), false).unwrap();
        grid.record_hit(0, 5);
        grid.record_hit(4, 5);
        grid.record_hit(4, 6);
        assert!((grid.values()[4] - 2.0).abs() < f32::EPSILON);
        assert_eq!(resolve_owner(&grid, 4), None);
    }
}
