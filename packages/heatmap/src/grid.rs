//! Dense latitude/longitude overlap grid.
//!
//! Cells are addressed by integer keys `floor(coordinate / cell_size)`.
//! Storage is row-major with latitude rows, starting at the grid's minimum
//! keys.

use geo::{Coord, Rect};
use serde::{Deserialize, Serialize};

/// Owner value for a cell no feature has touched.
pub const OWNER_EMPTY: i32 = -1;

/// Owner value for a cell touched by more than one feature.
pub const OWNER_MULTIPLE: i32 = -2;

/// Most cells one grid may hold: the whole globe at 0.05° cells.
pub const MAX_CELLS: usize = 7_201 * 3_601;

/// Integer address of a grid cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CellKey {
    /// `floor(lat / cell_size)` for hover lookups; the cell's lower edge.
    pub lat_key: i64,
    /// `floor(lng / cell_size)` for hover lookups; the cell's left edge.
    pub lng_key: i64,
}

/// Overlap counts, optional smoothed values and per-cell owners.
#[derive(Debug, Clone, PartialEq)]
pub struct Grid {
    width: usize,
    height: usize,
    min_lat_key: i64,
    min_lng_key: i64,
    cell_size: f64,
    counts: Vec<f32>,
    smoothed: Option<Vec<f32>>,
    owners: Vec<i32>,
    area_too_large: bool,
}

impl Grid {
    /// A zero-area grid. Renderers treat it as "nothing to draw".
    #[must_use]
    pub const fn empty(cell_size: f64) -> Self {
        Self {
            width: 0,
            height: 0,
            min_lat_key: 0,
            min_lng_key: 0,
            cell_size,
            counts: Vec::new(),
            smoothed: None,
            owners: Vec::new(),
            area_too_large: false,
        }
    }

    /// Allocates a zeroed grid spanning the inclusive key ranges.
    ///
    /// Returns `None` when the ranges overflow or would need more than
    /// [`MAX_CELLS`] cells.
    pub(crate) fn allocate(
        cell_size: f64,
        lat_keys: (i64, i64),
        lng_keys: (i64, i64),
        area_too_large: bool,
    ) -> Option<Self> {
        let span = |(lo, hi): (i64, i64)| {
            hi.checked_sub(lo)?
                .checked_add(1)
                .and_then(|n| usize::try_from(n).ok())
        };
        let height = span(lat_keys)?;
        let width = span(lng_keys)?;
        let len = width.checked_mul(height).filter(|len| *len <= MAX_CELLS)?;
        Some(Self {
            width,
            height,
            min_lat_key: lat_keys.0,
            min_lng_key: lng_keys.0,
            cell_size,
            counts: vec![0.0; len],
            smoothed: None,
            owners: vec![OWNER_EMPTY; len],
            area_too_large,
        })
    }

    /// Number of cells along the longitude axis.
    #[must_use]
    pub const fn width(&self) -> usize {
        self.width
    }

    /// Number of cells along the latitude axis.
    #[must_use]
    pub const fn height(&self) -> usize {
        self.height
    }

    /// Smallest latitude key in the grid.
    #[must_use]
    pub const fn min_lat_key(&self) -> i64 {
        self.min_lat_key
    }

    /// Smallest longitude key in the grid.
    #[must_use]
    pub const fn min_lng_key(&self) -> i64 {
        self.min_lng_key
    }

    /// Cell edge length in degrees.
    #[must_use]
    pub const fn cell_size(&self) -> f64 {
        self.cell_size
    }

    /// Whether the grid has no cells at all.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Whether the source data spanned more than the comfortable extent.
    #[must_use]
    pub const fn area_too_large(&self) -> bool {
        self.area_too_large
    }

    /// Raw overlap counts.
    #[must_use]
    pub fn counts(&self) -> &[f32] {
        &self.counts
    }

    /// Smoothed values, if the smoothing pass ran.
    #[must_use]
    pub fn smoothed(&self) -> Option<&[f32]> {
        self.smoothed.as_deref()
    }

    /// Whether [`Self::values`] returns smoothed values.
    #[must_use]
    pub const fn is_smoothed(&self) -> bool {
        self.smoothed.is_some()
    }

    /// Values used for rendering and tooltips: smoothed when available,
    /// raw counts otherwise.
    #[must_use]
    pub fn values(&self) -> &[f32] {
        self.smoothed.as_deref().unwrap_or(&self.counts)
    }

    /// Owner per cell ([`OWNER_EMPTY`], [`OWNER_MULTIPLE`] or a feature index).
    #[must_use]
    pub fn owners(&self) -> &[i32] {
        &self.owners
    }

    /// Largest value in [`Self::values`], `0.0` for an empty grid.
    #[must_use]
    pub fn max_value(&self) -> f32 {
        self.values().iter().copied().fold(0.0, f32::max)
    }

    /// Display form of a cell value: whole counts for raw grids, two
    /// decimals once smoothed.
    #[must_use]
    pub fn format_value(&self, value: f32) -> String {
        if self.is_smoothed() {
            format!("{value:.2}")
        } else {
            format!("{}", value.round())
        }
    }

    /// Attaches smoothed values computed by [`crate::smooth::smooth`].
    #[must_use]
    pub fn with_smoothing(mut self) -> Self {
        self.smoothed = Some(crate::smooth::smooth(&self));
        self
    }

    /// Flat index of a key, if it lies inside the grid.
    #[must_use]
    pub fn index(&self, key: CellKey) -> Option<usize> {
        let row = usize::try_from(key.lat_key.checked_sub(self.min_lat_key)?).ok()?;
        let col = usize::try_from(key.lng_key.checked_sub(self.min_lng_key)?).ok()?;
        (row < self.height && col < self.width).then_some(row * self.width + col)
    }

    /// Key of a flat index.
    ///
    /// # Panics
    ///
    /// Panics in debug builds if `idx` is out of range.
    #[must_use]
    #[allow(clippy::cast_possible_wrap)]
    pub fn key_at(&self, idx: usize) -> CellKey {
        debug_assert!(idx < self.counts.len(), "cell index {idx} out of range");
        CellKey {
            lat_key: self.min_lat_key + (idx / self.width) as i64,
            lng_key: self.min_lng_key + (idx % self.width) as i64,
        }
    }

    /// Key of the cell whose extent contains the given position.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn key_for(&self, lat: f64, lng: f64) -> Option<CellKey> {
        if !(lat.is_finite() && lng.is_finite()) || self.cell_size <= 0.0 {
            return None;
        }
        Some(CellKey {
            lat_key: (lat / self.cell_size).floor() as i64,
            lng_key: (lng / self.cell_size).floor() as i64,
        })
    }

    /// Flat index of the cell under a cursor position.
    #[must_use]
    pub fn cell_at(&self, lat: f64, lng: f64) -> Option<usize> {
        self.key_for(lat, lng).and_then(|key| self.index(key))
    }

    /// Geographic extent of a cell (`x` = longitude, `y` = latitude).
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn cell_bounds(&self, key: CellKey) -> Rect<f64> {
        let s = self.cell_size;
        Rect::new(
            Coord {
                x: key.lng_key as f64 * s,
                y: key.lat_key as f64 * s,
            },
            Coord {
                x: (key.lng_key + 1) as f64 * s,
                y: (key.lat_key + 1) as f64 * s,
            },
        )
    }

    /// Geographic extent of the whole grid, `None` when empty.
    #[must_use]
    #[allow(clippy::cast_possible_wrap)]
    pub fn bounds(&self) -> Option<Rect<f64>> {
        if self.is_empty() {
            return None;
        }
        let lower_left = self.cell_bounds(CellKey {
            lat_key: self.min_lat_key,
            lng_key: self.min_lng_key,
        });
        let upper_right = self.cell_bounds(CellKey {
            lat_key: self.min_lat_key + self.height as i64 - 1,
            lng_key: self.min_lng_key + self.width as i64 - 1,
        });
        Some(Rect::new(lower_left.min(), upper_right.max()))
    }

    /// Whether a cell value is drawn and hoverable under `min_overlap`.
    #[must_use]
    pub fn qualifies(value: f32, min_overlap: u32) -> bool {
        #[allow(clippy::cast_precision_loss)]
        let threshold = min_overlap as f32;
        value > 0.0 && value >= threshold
    }

    /// Iterates the qualifying cells as `(index, key, value)`.
    pub fn qualifying_cells(&self, min_overlap: u32) -> impl Iterator<Item = (usize, CellKey, f32)> {
        self.values()
            .iter()
            .enumerate()
            .filter(move |(_, v)| Self::qualifies(**v, min_overlap))
            .map(|(idx, v)| (idx, self.key_at(idx), *v))
    }

    /// Flat indices of the 3×3 neighbourhood around `idx` (including
    /// `idx` itself), clipped to the grid.
    pub fn neighbourhood(&self, idx: usize) -> impl Iterator<Item = usize> + '_ {
        let row = idx / self.width.max(1);
        let col = idx % self.width.max(1);
        let rows = row.saturating_sub(1)..=(row + 1).min(self.height.saturating_sub(1));
        rows.flat_map(move |r| {
            let cols = col.saturating_sub(1)..=(col + 1).min(self.width.saturating_sub(1));
            cols.map(move |c| r * self.width + c)
        })
    }

    #[cfg(test)]
    pub(crate) fn with_smoothed_values(mut self, values: Vec<f32>) -> Self {
        self.smoothed = Some(values);
        self
    }

    /// Counts one hit on a cell and updates its owner.
    pub(crate) fn record_hit(&mut self, idx: usize, owner: usize) {
        self.counts[idx] += 1.0;
        let owner = i32::try_from(owner).unwrap_or(OWNER_MULTIPLE);
        let current = self.owners[idx];
        if current == OWNER_EMPTY {
            self.owners[idx] = owner;
        } else if current != owner {
            self.owners[idx] = OWNER_MULTIPLE;
        }
    }
}
