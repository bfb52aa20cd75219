//! Per-country names for administrative levels.
//!
//! What Nominatim calls `state`, `county` and `city` is a *Bundesland*,
//! *Landkreis* and *Gemeinde* in Germany but a *région*, *département* and
//! *commune* in France. [`ADMIN_LABEL_TABLE`] holds the local terms keyed
//! by lower-case ISO 3166-1 alpha-2 code and formats a [`RawAddress`] with
//! them.

use crate::{RawAddress, ResolvedLocation};

/// Label shown when an address has no usable parts.
pub const UNKNOWN_LOCATION: &str = "Unknown location";

/// Local terms for three administrative levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdminLabels {
    /// First level (`state` / `region`).
    pub region: &'static str,
    /// Second level (`county`).
    pub department: &'static str,
    /// Settlement (`city` / `town` / `village`).
    pub commune: &'static str,
}

impl AdminLabels {
    #[must_use]
    pub const fn new(region: &'static str, department: &'static str, commune: &'static str) -> Self {
        Self {
            region,
            department,
            commune,
        }
    }
}

/// Lookup table from country code to [`AdminLabels`].
#[derive(Debug, Clone, Copy)]
pub struct AdminLabelTable {
    entries: &'static [(&'static str, AdminLabels)],
    fallback: AdminLabels,
}

/// The shared table used by every tooltip.
pub const ADMIN_LABEL_TABLE: AdminLabelTable = AdminLabelTable {
    entries: &[
        ("at", AdminLabels::new("Bundesland", "Bezirk", "Gemeinde")),
        ("au", AdminLabels::new("State", "Local government area", "Suburb")),
        ("be", AdminLabels::new("Région", "Province", "Commune")),
        ("br", AdminLabels::new("Estado", "Mesorregião", "Município")),
        ("ca", AdminLabels::new("Province", "County", "Municipality")),
        ("ch", AdminLabels::new("Kanton", "Bezirk", "Gemeinde")),
        ("cn", AdminLabels::new("Province", "Prefecture", "County")),
        ("cz", AdminLabels::new("Kraj", "Okres", "Obec")),
        ("de", AdminLabels::new("Bundesland", "Landkreis", "Gemeinde")),
        ("dk", AdminLabels::new("Region", "Kommune", "By")),
        ("es", AdminLabels::new("Comunidad autónoma", "Provincia", "Municipio")),
        ("fi", AdminLabels::new("Maakunta", "Seutukunta", "Kunta")),
        ("fr", AdminLabels::new("Région", "Département", "Commune")),
        ("gb", AdminLabels::new("Country", "County", "Town")),
        ("gr", AdminLabels::new("Periféreia", "Nomós", "Dímos")),
        ("hu", AdminLabels::new("Régió", "Megye", "Település")),
        ("ie", AdminLabels::new("Province", "County", "Town")),
        ("in", AdminLabels::new("State", "District", "City")),
        ("it", AdminLabels::new("Regione", "Provincia", "Comune")),
        ("jp", AdminLabels::new("Prefecture", "District", "Municipality")),
        ("lu", AdminLabels::new("Canton", "Commune", "Localité")),
        ("mx", AdminLabels::new("Estado", "Municipio", "Localidad")),
        ("nl", AdminLabels::new("Provincie", "Gemeente", "Plaats")),
        ("no", AdminLabels::new("Fylke", "Kommune", "Sted")),
        ("pl", AdminLabels::new("Województwo", "Powiat", "Gmina")),
        ("pt", AdminLabels::new("Distrito", "Concelho", "Freguesia")),
        ("ro", AdminLabels::new("Regiune", "Județ", "Comună")),
        ("se", AdminLabels::new("Län", "Kommun", "Ort")),
        ("sk", AdminLabels::new("Kraj", "Okres", "Obec")),
        ("us", AdminLabels::new("State", "County", "City")),
    ],
    fallback: AdminLabels::new("Region", "District", "Locality"),
};

impl AdminLabelTable {
    /// Labels for a country code (case-insensitive), or the generic
    /// fallback.
    #[must_use]
    pub fn labels_for(&self, country_code: Option<&str>) -> &AdminLabels {
        country_code
            .and_then(|code| {
                self.entries
                    .iter()
                    .find(|(c, _)| c.eq_ignore_ascii_case(code.trim()))
            })
            .map_or(&self.fallback, |(_, labels)| labels)
    }

    /// Number of countries with specific labels.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Formats `address` as `"<commune>: X, <department>: Y, <region>: Z, Country"`,
    /// skipping the parts that are absent.
    #[must_use]
    pub fn describe(&self, address: &RawAddress) -> ResolvedLocation {
        let country_code = address
            .country_code
            .as_deref()
            .map(|c| c.trim().to_ascii_lowercase())
            .filter(|c| !c.is_empty());
        let labels = self.labels_for(country_code.as_deref());

        let mut parts = Vec::with_capacity(4);
        if let Some(locality) = non_empty(address.locality()) {
            parts.push(format!("{}: {locality}", labels.commune));
        }
        if let Some(county) = non_empty(address.county.as_deref()) {
            parts.push(format!("{}: {county}", labels.department));
        }
        if let Some(region) = non_empty(address.first_level()) {
            parts.push(format!("{}: {region}", labels.region));
        }
        if let Some(country) = non_empty(address.country.as_deref()) {
            parts.push(country.to_string());
        }

        let label = if parts.is_empty() {
            UNKNOWN_LOCATION.to_string()
        } else {
            parts.join(", ")
        };

        ResolvedLocation {
            label,
            country_code,
            address: address.clone(),
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
