//! Nominatim / OpenStreetMap reverse geocoder client.
//!
//! The public instance allows **1 request per second** and requires an
//! identifying `User-Agent`. Rate limiting is the caller's job (see
//! [`crate::service::ReverseGeocodeService`]).
//!
//! See <https://nominatim.org/release-docs/develop/api/Reverse/>

use std::time::Duration;

use crate::service_registry::{GeocodingService, ProviderConfig};
use crate::{GeocodeError, RawAddress, ReverseGeocoder};

/// Environment variable overriding the `User-Agent` header.
pub const USER_AGENT_ENV: &str = "MENTAL_MAP_USER_AGENT";

/// `User-Agent` used when [`USER_AGENT_ENV`] is unset.
pub const DEFAULT_USER_AGENT: &str = concat!("mental-map/", env!("CARGO_PKG_VERSION"));

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Reverse geocoding against a Nominatim instance.
#[derive(Debug, Clone)]
pub struct NominatimClient {
    client: reqwest::Client,
    base_url: String,
    zoom: u8,
}

impl NominatimClient {
    /// Creates a client for `base_url` (the `/reverse` endpoint).
    ///
    /// # Errors
    ///
    /// Returns [`GeocodeError::Http`] if the HTTP client cannot be built.
    pub fn new(base_url: &str, user_agent: &str, zoom: u8) -> Result<Self, GeocodeError> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.to_string(),
            zoom,
        })
    }

    /// Creates a client from a registry entry, taking the `User-Agent`
    /// from [`USER_AGENT_ENV`].
    ///
    /// # Errors
    ///
    /// Returns [`GeocodeError::Http`] if the HTTP client cannot be built.
    pub fn from_service(service: &GeocodingService) -> Result<Self, GeocodeError> {
        let user_agent =
            std::env::var(USER_AGENT_ENV).unwrap_or_else(|_| DEFAULT_USER_AGENT.to_string());
        let ProviderConfig::Nominatim { base_url, zoom, .. } = &service.provider;
        log::debug!("Nominatim reverse geocoder at {base_url} (zoom {zoom})");
        Self::new(base_url, &user_agent, *zoom)
    }
}

#[async_trait::async_trait]
impl ReverseGeocoder for NominatimClient {
    async fn reverse(&self, lat: f64, lng: f64) -> Result<RawAddress, GeocodeError> {
        let resp = self
            .client
            .get(&self.base_url)
            .query(&[
                ("lat", lat.to_string()),
                ("lon", lng.to_string()),
                ("format", "jsonv2".to_string()),
                ("addressdetails", "1".to_string()),
                ("zoom", self.zoom.to_string()),
            ])
            .send()
            .await?;

        let status = resp.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(GeocodeError::RateLimited);
        }
        if !status.is_success() {
            return Err(GeocodeError::Status {
                status: status.as_u16(),
            });
        }

        let body: serde_json::Value = resp.json().await?;
        parse_response(&body)
    }
}

/// Parses a Nominatim `jsonv2` reverse response.
///
/// A response without an `address` object yields an empty [`RawAddress`];
/// an `error` member (e.g. `"Unable to geocode"` over open sea) is a
/// parse error.
///
/// # Errors
///
/// Returns [`GeocodeError::Parse`] for error responses or a malformed
/// `address` object.
pub fn parse_response(body: &serde_json::Value) -> Result<RawAddress, GeocodeError> {
    if let Some(error) = body.get("error") {
        return Err(GeocodeError::Parse {
            message: format!(
                "Nominatim error: {}",
                error.as_str().unwrap_or("unknown error")
            ),
        });
    }

    let Some(address) = body.get("address") else {
        return Ok(RawAddress::default());
    };

    serde_json::from_value(address.clone()).map_err(|e| GeocodeError::Parse {
        message: format!("Malformed address in Nominatim response: {e}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_nominatim_reverse_result() {
        let body = serde_json::json!({
            "place_id": 1,
            "lat": "48.8566",
            "lon": "2.3522",
            "display_name": "Paris, Île-de-France, France",
            "address": {
                "city": "Paris",
                "state": "Île-de-France",
                "ISO3166-2-lvl4": "FR-IDF",
                "country": "France",
                "country_code": "fr"
            }
        });
        let address = parse_response(&body).unwrap();
        assert_eq!(address.city.as_deref(), Some("Paris"));
        assert_eq!(address.state.as_deref(), Some("Île-de-France"));
        assert_eq!(address.country_code.as_deref(), Some("fr"));
        assert!(address.county.is_none());
    }

    #[test]
    fn missing_address_is_empty() {
        let body = serde_json::json!({"place_id": 1});
        assert_eq!(parse_response(&body).unwrap(), RawAddress::default());
    }

    #[test]
    fn error_member_is_a_parse_error() {
        let body = serde_json::json!({"error": "Unable to geocode"});
        let err = parse_response(&body).unwrap_err();
        assert!(err.to_string().contains("Unable to geocode"));
    }
}
