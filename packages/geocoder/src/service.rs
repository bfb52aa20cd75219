//! Cached, throttled reverse lookups.

use std::sync::Arc;
use std::time::Duration;

use crate::admin_labels::{ADMIN_LABEL_TABLE, AdminLabelTable};
use crate::cache::{AddressCache, Claim, CoordKey};
use crate::nominatim::NominatimClient;
use crate::service_registry::{self, GeocodingService};
use crate::throttle::RateLimiter;
use crate::{GeocodeError, ResolvedLocation, ReverseGeocoder};

/// What happened to a lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupOutcome {
    /// Answered from the cache without a request.
    Cached(ResolvedLocation),
    /// Fetched from the provider and cached.
    Fetched(ResolvedLocation),
    /// Skipped because the last real request was too recent.
    Throttled,
    /// Skipped because the same key is already being fetched.
    InFlight,
    /// The request failed or the coordinate was invalid; nothing cached.
    Failed,
}

impl LookupOutcome {
    /// The location, if the lookup produced one.
    #[must_use]
    pub const fn location(&self) -> Option<&ResolvedLocation> {
        match self {
            Self::Cached(location) | Self::Fetched(location) => Some(location),
            Self::Throttled | Self::InFlight | Self::Failed => None,
        }
    }
}

/// Process-wide reverse geocoding front end.
///
/// Shared behind an `Arc` by every tooltip and request handler so that the
/// cache and the rate limit apply to the whole process.
pub struct ReverseGeocodeService {
    geocoder: Arc<dyn ReverseGeocoder>,
    labels: &'static AdminLabelTable,
    cache: AddressCache,
    limiter: RateLimiter,
    debounce: Duration,
}

impl ReverseGeocodeService {
    /// Creates a service around any [`ReverseGeocoder`].
    #[must_use]
    pub fn new(
        geocoder: Arc<dyn ReverseGeocoder>,
        labels: &'static AdminLabelTable,
        rate_limit: Duration,
        debounce: Duration,
    ) -> Self {
        Self {
            geocoder,
            labels,
            cache: AddressCache::new(),
            limiter: RateLimiter::new(rate_limit),
            debounce,
        }
    }

    /// Creates a Nominatim-backed service from a registry entry.
    ///
    /// # Errors
    ///
    /// Returns [`GeocodeError`] if the HTTP client cannot be built.
    pub fn from_service(service: &GeocodingService) -> Result<Self, GeocodeError> {
        let client = NominatimClient::from_service(service)?;
        log::info!(
            "Reverse geocoding via {} (rate limit {:?}, debounce {:?})",
            service.name,
            service.rate_limit(),
            service.debounce()
        );
        Ok(Self::new(
            Arc::new(client),
            &ADMIN_LABEL_TABLE,
            service.rate_limit(),
            service.debounce(),
        ))
    }

    /// Creates a service for the default registry entry.
    ///
    /// # Errors
    ///
    /// Returns [`GeocodeError`] if the registry is unusable or the HTTP
    /// client cannot be built.
    pub fn from_registry() -> Result<Self, GeocodeError> {
        Self::from_service(&service_registry::default_service()?)
    }

    /// How long a hover must rest before a lookup should start.
    #[must_use]
    pub const fn debounce(&self) -> Duration {
        self.debounce
    }

    /// The cache backing this service.
    #[must_use]
    pub const fn cache(&self) -> &AddressCache {
        &self.cache
    }

    /// Synchronous cache lookup.
    #[must_use]
    pub fn cached(&self, lat: f64, lng: f64) -> Option<ResolvedLocation> {
        CoordKey::new(lat, lng).and_then(|key| self.cache.get(key))
    }

    /// Resolves a coordinate, honouring cache, in-flight de-duplication
    /// and the rate limit, in that order.
    ///
    /// Failures are logged and reported as [`LookupOutcome::Failed`]; they
    /// are never retried.
    pub async fn lookup(&self, lat: f64, lng: f64) -> LookupOutcome {
        let Some(key) = CoordKey::new(lat, lng) else {
            log::warn!("Reverse lookup for non-finite coordinate ({lat}, {lng})");
            return LookupOutcome::Failed;
        };

        match self.cache.claim(key) {
            Claim::Cached(location) => return LookupOutcome::Cached(location),
            Claim::InFlight => return LookupOutcome::InFlight,
            Claim::Claimed => {}
        }

        if !self.limiter.try_acquire() {
            log::debug!("Reverse lookup for {key} throttled");
            self.cache.release(key);
            return LookupOutcome::Throttled;
        }

        match self.geocoder.reverse(lat, lng).await {
            Ok(address) => {
                let location = self.labels.describe(&address);
                log::debug!("Resolved {key} to {}", location.label);
                self.cache.complete(key, location.clone());
                LookupOutcome::Fetched(location)
            }
            Err(e) => {
                log::warn!("Reverse lookup for {key} failed: {e}");
                self.cache.release(key);
                LookupOutcome::Failed
            }
        }
    }
}
