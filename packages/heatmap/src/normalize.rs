//! Normalizes stored survey responses into [`SurveyFeature`] values.
//!
//! The collection UI has historically stored geometries wrapped in one or
//! two extra `{"type": "Feature", "geometry": ...}` layers, with
//! coordinates sometimes serialized as strings. Everything here is
//! tolerant: a malformed geometry produces `None` (or is skipped) and never
//! an error.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDateTime, Utc};
use geo::{Coord, LineString};
use mental_map_survey_models::{FeatureGeometry, SurveyFeature, UNKNOWN_PARTICIPANT};
use serde_json::Value;

/// How many erroneous `Feature` wrappers are peeled off a geometry.
const MAX_FEATURE_NESTING: usize = 2;

/// Minimum number of vertices for a usable ring.
const MIN_RING_VERTICES: usize = 3;

/// Normalizes a `FeatureCollection` (or a bare array of features).
///
/// Features without a `question_id` or without any usable geometry are
/// dropped. A `GeometryCollection` expands into one feature per usable
/// member, numbered by sub-index in the composite id.
#[must_use]
pub fn normalize_collection(collection: &Value) -> Vec<SurveyFeature> {
    let features = match collection {
        Value::Array(features) => features.as_slice(),
        other => other
            .get("features")
            .and_then(Value::as_array)
            .map_or(&[][..], Vec::as_slice),
    };

    let mut out = Vec::with_capacity(features.len());
    for (response_index, feature) in features.iter().enumerate() {
        let before = out.len();
        normalize_feature(response_index, feature, &mut out);
        if out.len() == before {
            log::debug!("Dropped response feature {response_index}: no usable geometry");
        }
    }
    out
}

fn normalize_feature(response_index: usize, feature: &Value, out: &mut Vec<SurveyFeature>) {
    let props = feature.get("properties").unwrap_or(&Value::Null);

    let Some(question_id) = props.get("question_id").and_then(scalar_to_string) else {
        return;
    };

    let participant_code = props
        .get("participant_code")
        .and_then(scalar_to_string)
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| UNKNOWN_PARTICIPANT.to_string());

    let response_id = props
        .get("id")
        .and_then(scalar_to_string)
        .unwrap_or_else(|| response_index.to_string());

    let created_at = props
        .get("created_at")
        .and_then(Value::as_str)
        .and_then(parse_timestamp);

    let Some(geometry) = feature.get("geometry") else {
        return;
    };

    let geometries = match unwrap_nesting(geometry) {
        Some(g) if type_of(g) == Some("GeometryCollection") => g
            .get("geometries")
            .and_then(Value::as_array)
            .map(|members| members.iter().map(normalize_geometry).collect::<Vec<_>>())
            .unwrap_or_default(),
        _ => vec![normalize_geometry(geometry)],
    };

    for (sub_index, geometry) in geometries.into_iter().enumerate() {
        let Some(geometry) = geometry else {
            continue;
        };
        out.push(SurveyFeature {
            id: format!("{response_id}_{sub_index}"),
            question_id: question_id.clone(),
            participant_code: participant_code.clone(),
            created_at,
            geometry,
        });
    }
}

/// Normalizes one geometry value.
///
/// Peels up to two `Feature` wrappers, then reads the geometry `type`:
///
/// * `Polygon` keeps only the outer ring (holes are ignored).
/// * `MultiPolygon` keeps the outer ring of every member; unusable members
///   are skipped.
/// * `Point` keeps the single position.
///
/// Returns `None` when nothing usable remains.
#[must_use]
pub fn normalize_geometry(value: &Value) -> Option<FeatureGeometry> {
    let geometry = unwrap_nesting(value)?;
    let coordinates = geometry.get("coordinates")?;

    match type_of(geometry)? {
        "Polygon" => parse_ring(coordinates.get(0)?).map(FeatureGeometry::Polygon),
        "MultiPolygon" => {
            let rings: Vec<LineString<f64>> = coordinates
                .as_array()?
                .iter()
                .filter_map(|polygon| polygon.get(0).and_then(parse_ring))
                .collect();
            (!rings.is_empty()).then_some(FeatureGeometry::MultiPolygon(rings))
        }
        "Point" => parse_position(coordinates).map(FeatureGeometry::Point),
        _ => None,
    }
}

/// Rings and points ready for rasterization, tagged with owner indices.
#[derive(Debug, Default)]
pub struct Shapes<'a> {
    /// `(outer ring, owner index)` for every polygon ring.
    pub rings: Vec<(&'a LineString<f64>, usize)>,
    /// `(position, owner index)` for every point.
    pub points: Vec<(Coord<f64>, usize)>,
}

impl Shapes<'_> {
    /// Total number of shapes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rings.len() + self.points.len()
    }

    /// Whether there is nothing to rasterize.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rings.is_empty() && self.points.is_empty()
    }
}

/// Splits features into rings and points.
///
/// The owner index of a shape is the position of its feature in
/// `features`, except that a feature repeated with the same `id` maps to
/// the position of its first occurrence. Duplicated input therefore
/// double-counts cells without marking them as multiply owned.
#[must_use]
pub fn extract_shapes(features: &[SurveyFeature]) -> Shapes<'_> {
    let mut first_seen: HashMap<&str, usize> = HashMap::new();
    let mut shapes = Shapes::default();

    for (idx, feature) in features.iter().enumerate() {
        let owner = *first_seen.entry(feature.id.as_str()).or_insert(idx);
        match &feature.geometry {
            FeatureGeometry::Point(point) => shapes.points.push((*point, owner)),
            geometry => shapes
                .rings
                .extend(geometry.rings().iter().map(|ring| (ring, owner))),
        }
    }

    shapes
}

fn unwrap_nesting(value: &Value) -> Option<&Value> {
    let mut geometry = value;
    for _ in 0..MAX_FEATURE_NESTING {
        if type_of(geometry) != Some("Feature") {
            break;
        }
        geometry = geometry.get("geometry")?;
    }
    (type_of(geometry) != Some("Feature")).then_some(geometry)
}

fn type_of(value: &Value) -> Option<&str> {
    value.get("type").and_then(Value::as_str)
}

fn parse_ring(value: &Value) -> Option<LineString<f64>> {
    let coords = value
        .as_array()?
        .iter()
        .map(parse_position)
        .collect::<Option<Vec<_>>>()?;
    (coords.len() >= MIN_RING_VERTICES).then(|| LineString::new(coords))
}

/// Reads a `[lng, lat]` pair. Non-finite values and positions outside
/// [-180, 180] × [-90, 90] are rejected.
fn parse_position(value: &Value) -> Option<Coord<f64>> {
    let pair = value.as_array()?;
    let x = parse_number(pair.first()?);
    let y = parse_number(pair.get(1)?);
    if !(x.is_finite() && y.is_finite()) {
        return None;
    }
    if !((-180.0..=180.0).contains(&x) && (-90.0..=90.0).contains(&y)) {
        log::debug!("Dropped out-of-range position [{x}, {y}]");
        return None;
    }
    Some(Coord { x, y })
}

fn parse_number(value: &Value) -> f64 {
    match value {
        Value::Number(n) => n.as_f64().unwrap_or(f64::NAN),
        Value::String(s) => s.trim().parse().unwrap_or(f64::NAN),
        _ => f64::NAN,
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
                .ok()
                .map(|naive| naive.and_utc())
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn square() -> Value {
        json!([[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0], [0.0, 0.0]])
    }

    #[test]
    fn polygon_keeps_outer_ring_only() {
        let geometry = json!({
            "type": "Polygon",
            "coordinates": [square(), [[0.2, 0.2], [0.4, 0.2], [0.4, 0.4], [0.2, 0.2]]]
        });
        let Some(FeatureGeometry::Polygon(ring)) = normalize_geometry(&geometry) else {
            panic!("expected polygon");
        };
        assert_eq!(ring.0.len(), 5);
    }

    #[test]
    fn unwraps_two_levels_of_feature_nesting() {
        let geometry = json!({
            "type": "Feature",
            "geometry": {
                "type": "Feature",
                "geometry": { "type": "Point", "coordinates": [2.5, 48.8] }
            }
        });
        assert_eq!(
            normalize_geometry(&geometry),
            Some(FeatureGeometry::Point(Coord { x: 2.5, y: 48.8 }))
        );
    }

    #[test]
    fn three_levels_of_nesting_are_rejected() {
        let geometry = json!({
            "type": "Feature",
            "geometry": {
                "type": "Feature",
                "geometry": {
                    "type": "Feature",
                    "geometry": { "type": "Point", "coordinates": [2.5, 48.8] }
                }
            }
        });
        assert_eq!(normalize_geometry(&geometry), None);
    }

    #[test]
    fn string_coordinates_are_parsed() {
        let geometry = json!({ "type": "Point", "coordinates": ["2.5", " 48.8 "] });
        assert_eq!(
            normalize_geometry(&geometry),
            Some(FeatureGeometry::Point(Coord { x: 2.5, y: 48.8 }))
        );
    }

    #[test]
    fn ring_with_unparseable_coordinate_is_discarded_entirely() {
        let geometry = json!({
            "type": "Polygon",
            "coordinates": [[[0.0, 0.0], [1.0, "abc"], [1.0, 1.0], [0.0, 0.0]]]
        });
        assert_eq!(normalize_geometry(&geometry), None);
    }

    #[test]
    fn multipolygon_skips_bad_members() {
        let geometry = json!({
            "type": "MultiPolygon",
            "coordinates": [
                [square()],
                [[[5.0, 5.0], [null, 6.0], [6.0, 6.0], [5.0, 5.0]]],
                []
            ]
        });
        let Some(FeatureGeometry::MultiPolygon(rings)) = normalize_geometry(&geometry) else {
            panic!("expected multipolygon");
        };
        assert_eq!(rings.len(), 1);
    }

    #[test]
    fn malformed_input_yields_none() {
        for value in [
            json!(null),
            json!({}),
            json!({ "type": "Polygon" }),
            json!({ "type": "Polygon", "coordinates": 5 }),
            json!({ "type": "LineString", "coordinates": [[0, 0], [1, 1]] }),
            json!({ "type": "Polygon", "coordinates": [[[0, 0], [1, 1]]] }),
            json!({ "type": "Point", "coordinates": [1] }),
        ] {
            assert_eq!(normalize_geometry(&value), None, "{value}");
        }
    }

    #[test]
    fn out_of_range_positions_are_dropped() {
        for value in [
            json!({ "type": "Point", "coordinates": [1e300, 0] }),
            json!({ "type": "Point", "coordinates": [-180.5, 10] }),
            json!({ "type": "Point", "coordinates": [10, "90.01"] }),
            json!({
                "type": "Polygon",
                "coordinates": [[[0, 0], [1e6, 1e6], [1, 1], [0, 0]]]
            }),
        ] {
            assert_eq!(normalize_geometry(&value), None, "{value}");
        }
        assert_eq!(
            normalize_geometry(&json!({ "type": "Point", "coordinates": [-180, 90] })),
            Some(FeatureGeometry::Point(Coord { x: -180.0, y: 90.0 }))
        );
    }

    #[test]
    fn collection_reads_properties_and_defaults() {
        let collection = json!({
            "type": "FeatureCollection",
            "features": [
                {
                    "type": "Feature",
                    "properties": {
                        "question_id": "q1",
                        "participant_code": "ABC",
                        "id": 17,
                        "created_at": "2024-05-01T10:00:00Z"
                    },
                    "geometry": { "type": "Polygon", "coordinates": [square()] }
                },
                {
                    "type": "Feature",
                    "properties": { "question_id": 3, "created_at": "2024-05-01 10:00:00" },
                    "geometry": { "type": "Point", "coordinates": [1, 2] }
                },
                {
                    "type": "Feature",
                    "properties": { "participant_code": "NOQ" },
                    "geometry": { "type": "Point", "coordinates": [1, 2] }
                },
                {
                    "type": "Feature",
                    "properties": { "question_id": "q1" },
                    "geometry": { "type": "Point", "coordinates": [1, "NaN"] }
                }
            ]
        });

        let features = normalize_collection(&collection);
        assert_eq!(features.len(), 2);

        assert_eq!(features[0].id, "17_0");
        assert_eq!(features[0].participant_code, "ABC");
        assert!(features[0].created_at.is_some());

        assert_eq!(features[1].id, "1_0");
        assert_eq!(features[1].question_id, "3");
        assert_eq!(features[1].participant_code, UNKNOWN_PARTICIPANT);
        assert!(features[1].created_at.is_some());
    }

    #[test]
    fn geometry_collection_expands_with_sub_indices() {
        let collection = json!({
            "features": [{
                "properties": { "question_id": "q1", "participant_code": "P" },
                "geometry": {
                    "type": "GeometryCollection",
                    "geometries": [
                        { "type": "Point", "coordinates": [1, 2] },
                        { "type": "Point", "coordinates": ["x", 2] },
                        { "type": "Polygon", "coordinates": [square()] }
                    ]
                }
            }]
        });

        let ids: Vec<String> = normalize_collection(&collection)
            .into_iter()
            .map(|f| f.id)
            .collect();
        assert_eq!(ids, vec!["0_0", "0_2"]);
    }

    #[test]
    fn empty_collection_yields_nothing() {
        assert!(normalize_collection(&json!({ "type": "FeatureCollection", "features": [] })).is_empty());
        assert!(normalize_collection(&json!("garbage")).is_empty());
    }

    #[test]
    fn extract_shapes_maps_duplicates_to_first_owner() {
        let collection = json!([
            {
                "properties": { "question_id": "q1", "id": "r1" },
                "geometry": { "type": "Polygon", "coordinates": [square()] }
            },
            {
                "properties": { "question_id": "q1", "id": "r1" },
                "geometry": { "type": "Polygon", "coordinates": [square()] }
            },
            {
                "properties": { "question_id": "q1", "id": "r2" },
                "geometry": { "type": "Point", "coordinates": [0.5, 0.5] }
            }
        ]);
        let features = normalize_collection(&collection);
        let shapes = extract_shapes(&features);

        let ring_owners: Vec<usize> = shapes.rings.iter().map(|(_, o)| *o).collect();
        assert_eq!(ring_owners, vec![0, 0]);
        assert_eq!(shapes.points, vec![(Coord { x: 0.5, y: 0.5 }, 2)]);
        assert_eq!(shapes.len(), 3);
    }
}
