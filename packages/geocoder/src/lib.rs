#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Reverse geocoding for heatmap tooltips.
//!
//! Turns the hovered map coordinate into a human-readable place
//! name. The public Nominatim instance allows **1 request per second**, so
//! lookups go through [`service::ReverseGeocodeService`], which
//!
//! 1. answers from the process-wide [`cache::AddressCache`] (coordinates
//!    rounded to 4 decimals) when it can,
//! 2. drops a lookup for a key that is already being fetched,
//! 3. skips the request silently when the [`throttle::RateLimiter`]
//!    interval has not elapsed since the last real request, and
//! 4. otherwise fetches, formats the address with the
//!    [`admin_labels::AdminLabelTable`] and caches the result.
//!
//! Provider settings (endpoint, rate limit, hover debounce) come from the
//! TOML files under `services/`, embedded by [`service_registry`].

pub mod admin_labels;
pub mod cache;
pub mod nominatim;
pub mod service;
pub mod service_registry;
pub mod throttle;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use service::{LookupOutcome, ReverseGeocodeService};

/// Address parts returned by a reverse geocoder.
///
/// Every field is optional; providers return whatever subset applies to
/// the location.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawAddress {
    pub city: Option<String>,
    pub town: Option<String>,
    pub village: Option<String>,
    pub municipality: Option<String>,
    pub county: Option<String>,
    pub state: Option<String>,
    pub region: Option<String>,
    pub country: Option<String>,
    pub country_code: Option<String>,
}

impl RawAddress {
    /// The most specific settlement name available.
    #[must_use]
    pub fn locality(&self) -> Option<&str> {
        self.city
            .as_deref()
            .or(self.town.as_deref())
            .or(self.village.as_deref())
            .or(self.municipality.as_deref())
    }

    /// First-level administrative area (`state`, falling back to `region`).
    #[must_use]
    pub fn first_level(&self) -> Option<&str> {
        self.state.as_deref().or(self.region.as_deref())
    }
}

/// A formatted location ready for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedLocation {
    /// Human-readable location string.
    pub label: String,
    /// Lower-case ISO 3166-1 alpha-2 code, if known.
    pub country_code: Option<String>,
    /// The address it was built from.
    pub address: RawAddress,
}

/// Errors from reverse geocoding.
#[derive(Debug, Error)]
pub enum GeocodeError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Response parsing failed.
    #[error("Parse error: {message}")]
    Parse {
        /// Description of the parsing failure.
        message: String,
    },

    /// The provider rejected the request with `429 Too Many Requests`.
    #[error("Rate limit exceeded")]
    RateLimited,

    /// The provider answered with an unexpected status.
    #[error("Unexpected HTTP status {status}")]
    Status {
        /// HTTP status code.
        status: u16,
    },

    /// A service configuration is missing or malformed.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the problem.
        message: String,
    },
}

/// A reverse geocoding backend.
#[async_trait::async_trait]
pub trait ReverseGeocoder: Send + Sync {
    /// Resolves a coordinate to its address parts.
    ///
    /// # Errors
    ///
    /// Returns [`GeocodeError`] if the request or response parsing fails.
    async fn reverse(&self, lat: f64, lng: f64) -> Result<RawAddress, GeocodeError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locality_prefers_city_then_town_then_village() {
        let mut address = RawAddress {
            village: Some("Kleindorf".to_string()),
            ..RawAddress::default()
        };
        assert_eq!(address.locality(), Some("Kleindorf"));
        address.town = Some("Mittelstadt".to_string());
        assert_eq!(address.locality(), Some("Mittelstadt"));
        address.city = Some("Großstadt".to_string());
        assert_eq!(address.locality(), Some("Großstadt"));
    }

    #[test]
    fn first_level_falls_back_to_region() {
        let address = RawAddress {
            region: Some("Île-de-France".to_string()),
            ..RawAddress::default()
        };
        assert_eq!(address.first_level(), Some("Île-de-France"));
    }

    #[test]
    fn raw_address_tolerates_missing_fields() {
        let address: RawAddress = serde_json::from_str(r#"{"country": "Deutschland"}"#).unwrap();
        assert_eq!(address.country.as_deref(), Some("Deutschland"));
        assert!(address.locality().is_none());
    }
}
