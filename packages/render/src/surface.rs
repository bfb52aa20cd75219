//! [`MapSurface`] implementations that collect shapes for output.

use std::collections::BTreeMap;
use std::io::Write;

use geo::{Coord, LineString, Rect};
use geojson::{Feature, FeatureCollection, Geometry, JsonObject, Value};

use crate::projection::Projection;
use crate::ramp::to_hex;
use crate::vector::{MapSurface, Shape, ShapeHandle, ShapeStyle};

/// Radius of a marker in SVG output, in pixels.
const MARKER_RADIUS_PX: f64 = 5.0;

#[derive(Debug, Clone)]
struct Entry {
    shape: Shape,
    style: ShapeStyle,
    popup: Option<String>,
}

#[derive(Debug, Clone, Default)]
struct Shapes {
    next: u64,
    entries: BTreeMap<ShapeHandle, Entry>,
}

impl Shapes {
    fn add(&mut self, entry: Entry) -> ShapeHandle {
        self.next += 1;
        let handle = ShapeHandle(self.next);
        self.entries.insert(handle, entry);
        handle
    }
}

/// Collects shapes as `GeoJSON` features.
#[derive(Debug, Clone, Default)]
pub struct GeoJsonSurface {
    shapes: Shapes,
}

impl GeoJsonSurface {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All shapes in insertion order as a `FeatureCollection`.
    ///
    /// Each feature carries `fill`, `fillOpacity`, optional `stroke` and
    /// optional `popup` properties.
    #[must_use]
    pub fn to_feature_collection(&self) -> FeatureCollection {
        let features = self
            .shapes
            .entries
            .values()
            .map(|entry| {
                let mut properties = JsonObject::new();
                properties.insert("fill".to_string(), to_hex(entry.style.fill).into());
                properties.insert(
                    "fillOpacity".to_string(),
                    f64::from(entry.style.fill_opacity).into(),
                );
                if let Some(stroke) = entry.style.stroke {
                    properties.insert("stroke".to_string(), to_hex(stroke).into());
                }
                if let Some(popup) = &entry.popup {
                    properties.insert("popup".to_string(), popup.clone().into());
                }
                Feature {
                    bbox: None,
                    geometry: Some(Geometry::new(shape_value(&entry.shape))),
                    id: None,
                    properties: Some(properties),
                    foreign_members: None,
                }
            })
            .collect();

        FeatureCollection {
            bbox: None,
            features,
            foreign_members: None,
        }
    }
}

impl MapSurface for GeoJsonSurface {
    fn add_shape(&mut self, shape: Shape, style: ShapeStyle, popup: Option<String>) -> ShapeHandle {
        self.shapes.add(Entry { shape, style, popup })
    }

    fn remove_shape(&mut self, handle: ShapeHandle) -> bool {
        self.shapes.entries.remove(&handle).is_some()
    }

    fn shape_count(&self) -> usize {
        self.shapes.entries.len()
    }
}

fn shape_value(shape: &Shape) -> Value {
    match shape {
        Shape::Rect(rect) => Value::Polygon(vec![closed_positions(&rect_ring(*rect))]),
        Shape::Polygon(ring) => Value::Polygon(vec![closed_positions(ring)]),
        Shape::Marker(c) => Value::Point(vec![c.x, c.y]),
    }
}

fn rect_ring(rect: Rect<f64>) -> LineString<f64> {
    let (min, max) = (rect.min(), rect.max());
    LineString::from(vec![
        (min.x, min.y),
        (max.x, min.y),
        (max.x, max.y),
        (min.x, max.y),
    ])
}

fn closed_positions(ring: &LineString<f64>) -> Vec<Vec<f64>> {
    let mut positions: Vec<Vec<f64>> = ring.coords().map(|c| vec![c.x, c.y]).collect();
    if !ring.is_closed()
        && let Some(first) = ring.0.first()
    {
        positions.push(vec![first.x, first.y]);
    }
    positions
}

/// Collects shapes and writes them as a standalone SVG document.
#[derive(Debug, Clone, Default)]
pub struct SvgSurface {
    shapes: Shapes,
}

impl SvgSurface {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes the SVG document for the projection's viewport.
    ///
    /// # Errors
    ///
    /// Propagates I/O errors from `out`.
    pub fn write_svg<W: Write>(&self, out: &mut W, projection: &dyn Projection) -> std::io::Result<()> {
        let viewport = projection.viewport();
        let (width, height) = (viewport.width, viewport.height);
        let bounds = viewport.bounds;

        writeln!(out, r#"<?xml version="1.0" encoding="UTF-8" standalone="no"?>"#)?;
        writeln!(
            out,
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{width}" height="{height}" viewBox="0 0 {width} {height}" data-lon-min="{}" data-lon-max="{}" data-lat-min="{}" data-lat-max="{}">"#,
            bounds.min().x,
            bounds.max().x,
            bounds.min().y,
            bounds.max().y,
        )?;
        writeln!(out, r##"<rect width="100%" height="100%" fill="#ffffff"/>"##)?;

        for entry in self.shapes.entries.values() {
            let paint = paint_attributes(&entry.style);
            let title = entry
                .popup
                .as_deref()
                .map(|p| format!("<title>{}</title>", escape_xml(p)))
                .unwrap_or_default();

            match &entry.shape {
                Shape::Rect(rect) => {
                    let a = projection.project(rect.min());
                    let b = projection.project(rect.max());
                    writeln!(
                        out,
                        r#"<rect x="{:.2}" y="{:.2}" width="{:.2}" height="{:.2}" {paint}>{title}</rect>"#,
                        a.x.min(b.x),
                        a.y.min(b.y),
                        (b.x - a.x).abs(),
                        (b.y - a.y).abs(),
                    )?;
                }
                Shape::Polygon(ring) => {
                    let points: Vec<String> = ring
                        .coords()
                        .map(|c| {
                            let p = projection.project(*c);
                            format!("{:.2},{:.2}", p.x, p.y)
                        })
                        .collect();
                    writeln!(
                        out,
                        r#"<polygon points="{}" {paint}>{title}</polygon>"#,
                        points.join(" ")
                    )?;
                }
                Shape::Marker(c) => {
                    let p: Coord<f64> = projection.project(*c);
                    writeln!(
                        out,
                        r#"<circle cx="{:.2}" cy="{:.2}" r="{MARKER_RADIUS_PX}" {paint}>{title}</circle>"#,
                        p.x, p.y,
                    )?;
                }
            }
        }

        writeln!(out, "</svg>")?;
        Ok(())
    }
}

impl MapSurface for SvgSurface {
    fn add_shape(&mut self, shape: Shape, style: ShapeStyle, popup: Option<String>) -> ShapeHandle {
        self.shapes.add(Entry { shape, style, popup })
    }

    fn remove_shape(&mut self, handle: ShapeHandle) -> bool {
        self.shapes.entries.remove(&handle).is_some()
    }

    fn shape_count(&self) -> usize {
        self.shapes.entries.len()
    }
}

fn paint_attributes(style: &ShapeStyle) -> String {
    let stroke = style.stroke.map_or_else(
        || r#"stroke="none""#.to_string(),
        |s| format!(r#"stroke="{}" stroke-width="1""#, to_hex(s)),
    );
    format!(
        r#"fill="{}" fill-opacity="{:.2}" {stroke}"#,
        to_hex(style.fill),
        style.fill_opacity
    )
}

fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(ch),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::projection::{Viewport, WebMercator};

    fn style() -> ShapeStyle {
        ShapeStyle {
            fill: [255, 0, 0],
            fill_opacity: 0.5,
            stroke: Some([0, 0, 0]),
        }
    }

    fn cell() -> Shape {
        Shape::Rect(Rect::new(Coord { x: 0.0, y: 0.0 }, Coord { x: 0.5, y: 0.5 }))
    }

    #[test]
    fn geojson_features_carry_style_and_popup() {
        let mut surface = GeoJsonSurface::new();
        surface.add_shape(cell(), style(), Some("Overlap: 2".to_string()));

        let collection = surface.to_feature_collection();
        assert_eq!(collection.features.len(), 1);
        let feature = &collection.features[0];
        assert_eq!(
            feature.property("fill").and_then(|v| v.as_str()),
            Some("#ff0000")
        );
        assert_eq!(
            feature.property("popup").and_then(|v| v.as_str()),
            Some("Overlap: 2")
        );
        let Some(Value::Polygon(rings)) = feature.geometry.as_ref().map(|g| g.value.clone()) else {
            panic!("expected polygon geometry");
        };
        assert_eq!(rings[0].len(), 5);
        assert_eq!(rings[0].first(), rings[0].last());
    }

    #[test]
    fn removed_shapes_are_not_emitted() {
        let mut surface = GeoJsonSurface::new();
        let handle = surface.add_shape(cell(), style(), None);
        surface.add_shape(Shape::Marker(Coord { x: 1.0, y: 1.0 }), style(), None);
        assert!(surface.remove_shape(handle));
        assert!(!surface.remove_shape(handle));

        let collection = surface.to_feature_collection();
        assert_eq!(collection.features.len(), 1);
        assert!(matches!(
            collection.features[0].geometry.as_ref().map(|g| &g.value),
            Some(Value::Point(_))
        ));
    }

    #[test]
    fn svg_document_contains_every_shape() {
        let mut surface = SvgSurface::new();
        surface.add_shape(cell(), style(), Some("A & B".to_string()));
        surface.add_shape(
            Shape::Polygon(LineString::from(vec![(0.0, 0.0), (0.5, 0.0), (0.0, 0.5)])),
            style(),
            None,
        );
        surface.add_shape(Shape::Marker(Coord { x: 0.25, y: 0.25 }), style(), None);

        let projection = WebMercator::new(Viewport::new(
            Rect::new(Coord { x: 0.0, y: 0.0 }, Coord { x: 1.0, y: 1.0 }),
            100,
            100,
        ));
        let mut out = Vec::new();
        surface.write_svg(&mut out, &projection).unwrap();
        let svg = String::from_utf8(out).unwrap();

        assert!(svg.starts_with("<?xml"));
        assert!(svg.trim_end().ends_with("</svg>"));
        assert!(svg.contains("<rect x="));
        assert!(svg.contains("<polygon points="));
        assert!(svg.contains("<circle "));
        assert!(svg.contains("<title>A &amp; B</title>"));
    }
}
