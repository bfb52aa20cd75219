//! Process-wide reverse geocoding cache.
//!
//! Entries are keyed by coordinates rounded to 4 decimals (about 11 m) and
//! are never evicted. A key is marked pending while its request is in
//! flight so concurrent hovers over the same spot do not fetch twice.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Mutex, PoisonError};

use crate::ResolvedLocation;

/// Decimal places kept in a cache key.
pub const KEY_DECIMALS: i32 = 4;

/// Coordinate bucket used as cache key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CoordKey {
    lat_e4: i64,
    lng_e4: i64,
}

impl CoordKey {
    /// Rounds a coordinate to [`KEY_DECIMALS`] places. `None` for
    /// non-finite input.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn new(lat: f64, lng: f64) -> Option<Self> {
        if !(lat.is_finite() && lng.is_finite()) {
            return None;
        }
        let scale = 10f64.powi(KEY_DECIMALS);
        Some(Self {
            lat_e4: (lat * scale).round() as i64,
            lng_e4: (lng * scale).round() as i64,
        })
    }
}

impl fmt::Display for CoordKey {
    #[allow(clippy::cast_precision_loss)]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scale = 10f64.powi(KEY_DECIMALS);
        write!(
            f,
            "{:.4},{:.4}",
            self.lat_e4 as f64 / scale,
            self.lng_e4 as f64 / scale
        )
    }
}

#[derive(Debug, Clone)]
enum Slot {
    Pending,
    Resolved(ResolvedLocation),
}

/// Result of [`AddressCache::claim`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Claim {
    /// Already resolved.
    Cached(ResolvedLocation),
    /// Another caller is fetching this key.
    InFlight,
    /// The caller now owns the fetch and must [`AddressCache::complete`] or
    /// [`AddressCache::release`] it.
    Claimed,
}

/// Coordinate-keyed location cache.
#[derive(Debug, Default)]
pub struct AddressCache {
    slots: Mutex<BTreeMap<CoordKey, Slot>>,
}

impl AddressCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolved location for a key, if any.
    #[must_use]
    pub fn get(&self, key: CoordKey) -> Option<ResolvedLocation> {
        let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        match slots.get(&key) {
            Some(Slot::Resolved(location)) => Some(location.clone()),
            _ => None,
        }
    }

    /// Checks the key and, if it is neither cached nor pending, marks it
    /// pending in the same critical section.
    pub fn claim(&self, key: CoordKey) -> Claim {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        match slots.get(&key) {
            Some(Slot::Resolved(location)) => Claim::Cached(location.clone()),
            Some(Slot::Pending) => Claim::InFlight,
            None => {
                slots.insert(key, Slot::Pending);
                Claim::Claimed
            }
        }
    }

    /// Stores the result of a claimed fetch.
    pub fn complete(&self, key: CoordKey, location: ResolvedLocation) {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, Slot::Resolved(location));
    }

    /// Gives up a claimed fetch so a later hover can try again.
    pub fn release(&self, key: CoordKey) {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        if matches!(slots.get(&key), Some(Slot::Pending)) {
            slots.remove(&key);
        }
    }

    /// Number of resolved entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|slot| matches!(slot, Slot::Resolved(_)))
            .count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RawAddress;

    fn location(label: &str) -> ResolvedLocation {
        ResolvedLocation {
            label: label.to_string(),
            country_code: None,
            address: RawAddress::default(),
        }
    }

    #[test]
    fn keys_round_to_four_decimals() {
        assert_eq!(CoordKey::new(48.856_61, 2.352_21), CoordKey::new(48.856_64, 2.352_18));
        assert_ne!(CoordKey::new(48.8566, 2.3522), CoordKey::new(48.8567, 2.3522));
        assert_eq!(CoordKey::new(f64::NAN, 0.0), None);
        assert_eq!(CoordKey::new(48.856_61, -2.352_21).unwrap().to_string(), "48.8566,-2.3522");
    }

    #[test]
    fn claim_then_complete() {
        let cache = AddressCache::new();
        let key = CoordKey::new(1.0, 2.0).unwrap();

        assert_eq!(cache.claim(key), Claim::Claimed);
        assert_eq!(cache.claim(key), Claim::InFlight);
        assert!(cache.get(key).is_none());
        assert!(cache.is_empty());

        cache.complete(key, location("Somewhere"));
        assert_eq!(cache.claim(key), Claim::Cached(location("Somewhere")));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn release_allows_a_retry() {
        let cache = AddressCache::new();
        let key = CoordKey::new(1.0, 2.0).unwrap();
        assert_eq!(cache.claim(key), Claim::Claimed);
        cache.release(key);
        assert_eq!(cache.claim(key), Claim::Claimed);
    }

    #[test]
    fn release_keeps_resolved_entries() {
        let cache = AddressCache::new();
        let key = CoordKey::new(1.0, 2.0).unwrap();
        cache.complete(key, location("Kept"));
        cache.release(key);
        assert_eq!(cache.get(key), Some(location("Kept")));
    }
}
