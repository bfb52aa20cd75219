//! 3×3 box smoothing of overlap counts.

use crate::grid::Grid;

/// Cells in the full smoothing window.
pub const SMOOTHING_WINDOW_CELLS: usize = 9;

/// Mean of each cell's 3×3 neighbourhood.
///
/// Neighbours outside the grid are excluded from both the sum and the
/// divisor, so edge cells average over fewer cells. Owners are left
/// untouched.
#[must_use]
pub fn smooth(grid: &Grid) -> Vec<f32> {
    let counts = grid.counts();
    (0..counts.len())
        .map(|idx| {
            let (sum, n) = grid
                .neighbourhood(idx)
                .fold((0.0_f32, 0_u16), |(sum, n), i| (sum + counts[i], n + 1));
            if n == 0 { 0.0 } else { sum / f32::from(n) }
        })
        .collect()
}
