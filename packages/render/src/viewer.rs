//! Map of a single participant's answers.
//!
//! Each question gets its own color from [`QUESTION_PALETTE`], assigned in
//! question-id order so the same question keeps its color across
//! participants. The view is fitted to the bounds of the drawn shapes.

use std::collections::{BTreeMap, BTreeSet};

use geo::{BoundingRect, Coord, LineString, Rect};
use image::{Pixel, Rgba, RgbaImage};
use mental_map_heatmap::raster::ring_contains;
use mental_map_survey_models::{FeatureGeometry, QuestionLabels, SurveyFeature};

use crate::export::{ExportError, ExportFormat, encode_raster, encode_svg};
use crate::projection::{Projection, Viewport, WebMercator};
use crate::surface::SvgSurface;
use crate::vector::{MapSurface, Shape, ShapeHandle, ShapeStyle};

/// Colors cycled through for the questions of a participant map.
pub const QUESTION_PALETTE: [[u8; 3]; 8] = [
    [0x1f, 0x77, 0xb4],
    [0xff, 0x7f, 0x0e],
    [0x2c, 0xa0, 0x2c],
    [0xd6, 0x27, 0x28],
    [0x94, 0x67, 0xbd],
    [0x8c, 0x56, 0x4b],
    [0xe3, 0x77, 0xc2],
    [0x17, 0xbe, 0xcf],
];

/// Fill opacity of participant shapes.
pub const SHAPE_OPACITY: f32 = 0.45;

/// Radius of point markers in raster output, in pixels.
const MARKER_RADIUS_PX: i64 = 5;

/// Smallest extent (degrees) a fitted view may have.
const MIN_VIEW_SPAN: f64 = 0.01;

/// Relative padding around a fitted view.
const VIEW_PADDING: f64 = 0.1;

/// Assigns palette colors to question ids in sorted order.
#[must_use]
pub fn question_colors<'a>(question_ids: impl IntoIterator<Item = &'a str>) -> BTreeMap<String, [u8; 3]> {
    let sorted: BTreeSet<&str> = question_ids.into_iter().collect();
    sorted
        .into_iter()
        .zip(QUESTION_PALETTE.iter().cycle())
        .map(|(id, color)| (id.to_string(), *color))
        .collect()
}

/// One participant's features, optionally narrowed to one question.
#[derive(Debug, Clone)]
pub struct ParticipantView<'a> {
    participant_code: String,
    features: Vec<&'a SurveyFeature>,
}

impl<'a> ParticipantView<'a> {
    /// Collects the features of `participant_code`.
    #[must_use]
    pub fn new(features: &'a [SurveyFeature], participant_code: &str) -> Self {
        Self {
            participant_code: participant_code.to_string(),
            features: features
                .iter()
                .filter(|f| f.participant_code == participant_code)
                .collect(),
        }
    }

    /// The same participant restricted to one question.
    #[must_use]
    pub fn for_question(&self, question_id: &str) -> Self {
        Self {
            participant_code: self.participant_code.clone(),
            features: self
                .features
                .iter()
                .copied()
                .filter(|f| f.question_id == question_id)
                .collect(),
        }
    }

    #[must_use]
    pub fn participant_code(&self) -> &str {
        &self.participant_code
    }

    #[must_use]
    pub fn features(&self) -> &[&'a SurveyFeature] {
        &self.features
    }

    /// Question ids this participant answered spatially.
    #[must_use]
    pub fn question_ids(&self) -> BTreeSet<&'a str> {
        self.features.iter().map(|f| f.question_id.as_str()).collect()
    }

    /// Bounding box of all shapes, `None` without features.
    #[must_use]
    pub fn bounds(&self) -> Option<Rect<f64>> {
        self.features
            .iter()
            .filter_map(|f| match &f.geometry {
                FeatureGeometry::Point(c) => Some(Rect::new(*c, *c)),
                geometry => geometry
                    .rings()
                    .iter()
                    .filter_map(BoundingRect::bounding_rect)
                    .reduce(union),
            })
            .reduce(union)
    }

    /// Viewport fitted around [`Self::bounds`].
    #[must_use]
    pub fn viewport(&self, width: u32, height: u32) -> Option<Viewport> {
        self.bounds()
            .map(|b| Viewport::fit(b, width, height, VIEW_PADDING, MIN_VIEW_SPAN))
    }

    /// Adds every shape to `surface`, colored by question, with the
    /// question label as popup.
    pub fn draw(
        &self,
        surface: &mut dyn MapSurface,
        colors: &BTreeMap<String, [u8; 3]>,
        labels: &QuestionLabels,
    ) -> Vec<ShapeHandle> {
        let mut handles = Vec::new();
        for feature in &self.features {
            let style = ShapeStyle {
                fill: color_for(colors, &feature.question_id),
                fill_opacity: SHAPE_OPACITY,
                stroke: Some(color_for(colors, &feature.question_id)),
            };
            let popup = labels.label_for(&feature.question_id).to_string();
            match &feature.geometry {
                FeatureGeometry::Point(c) => {
                    handles.push(surface.add_shape(Shape::Marker(*c), style, Some(popup)));
                }
                geometry => {
                    for ring in geometry.rings() {
                        handles.push(surface.add_shape(
                            Shape::Polygon(ring.clone()),
                            style,
                            Some(popup.clone()),
                        ));
                    }
                }
            }
        }
        handles
    }

    /// Paints the shapes into an RGBA frame.
    ///
    /// # Errors
    ///
    /// Returns [`ExportError::Empty`] when the participant has no shapes.
    pub fn render_raster(
        &self,
        width: u32,
        height: u32,
        colors: &BTreeMap<String, [u8; 3]>,
    ) -> Result<RgbaImage, ExportError> {
        let viewport = self.viewport(width, height).ok_or(ExportError::Empty)?;
        let projection = WebMercator::new(viewport);
        let mut image = RgbaImage::new(width, height);

        for feature in &self.features {
            let [r, g, b] = color_for(colors, &feature.question_id);
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let color = Rgba([r, g, b, (SHAPE_OPACITY * 255.0).round() as u8]);
            match &feature.geometry {
                FeatureGeometry::Point(c) => fill_marker(&mut image, projection.project(*c), color),
                geometry => {
                    for ring in geometry.rings() {
                        let screen: LineString<f64> =
                            ring.coords().map(|c| projection.project(*c)).collect();
                        fill_ring(&mut image, &screen, color);
                    }
                }
            }
        }
        Ok(image)
    }

    /// Renders and encodes the participant map.
    ///
    /// # Errors
    ///
    /// * [`ExportError::Empty`] when the participant has no shapes
    /// * [`ExportError::Image`] / [`ExportError::Io`] if encoding fails
    pub fn export(
        &self,
        format: ExportFormat,
        width: u32,
        height: u32,
        labels: &QuestionLabels,
    ) -> Result<Vec<u8>, ExportError> {
        let colors = question_colors(labels.ids().chain(self.question_ids()));
        if format.is_raster() {
            let image = self.render_raster(width, height, &colors)?;
            encode_raster(&image, format)
        } else {
            let viewport = self.viewport(width, height).ok_or(ExportError::Empty)?;
            let mut surface = SvgSurface::new();
            self.draw(&mut surface, &colors, labels);
            encode_svg(&surface, &WebMercator::new(viewport))
        }
    }
}

fn color_for(colors: &BTreeMap<String, [u8; 3]>, question_id: &str) -> [u8; 3] {
    colors.get(question_id).copied().unwrap_or(QUESTION_PALETTE[0])
}

fn union(a: Rect<f64>, b: Rect<f64>) -> Rect<f64> {
    Rect::new(
        Coord {
            x: a.min().x.min(b.min().x),
            y: a.min().y.min(b.min().y),
        },
        Coord {
            x: a.max().x.max(b.max().x),
            y: a.max().y.max(b.max().y),
        },
    )
}

/// Blends `color` into every pixel whose centre lies inside `ring`
/// (screen coordinates).
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn fill_ring(image: &mut RgbaImage, ring: &LineString<f64>, color: Rgba<u8>) {
    let Some(bounds) = ring.bounding_rect() else {
        return;
    };
    let (w, h) = (f64::from(image.width()), f64::from(image.height()));
    let x0 = bounds.min().x.floor().clamp(0.0, w) as u32;
    let x1 = bounds.max().x.ceil().clamp(0.0, w) as u32;
    let y0 = bounds.min().y.floor().clamp(0.0, h) as u32;
    let y1 = bounds.max().y.ceil().clamp(0.0, h) as u32;

    for y in y0..y1 {
        for x in x0..x1 {
            let centre = Coord {
                x: f64::from(x) + 0.5,
                y: f64::from(y) + 0.5,
            };
            if ring_contains(ring, centre) {
                image.get_pixel_mut(x, y).blend(&color);
            }
        }
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn fill_marker(image: &mut RgbaImage, centre: Coord<f64>, color: Rgba<u8>) {
    let (cx, cy) = (centre.x.round() as i64, centre.y.round() as i64);
    for dy in -MARKER_RADIUS_PX..=MARKER_RADIUS_PX {
        for dx in -MARKER_RADIUS_PX..=MARKER_RADIUS_PX {
            if dx * dx + dy * dy > MARKER_RADIUS_PX * MARKER_RADIUS_PX {
                continue;
            }
            let (Ok(x), Ok(y)) = (u32::try_from(cx + dx), u32::try_from(cy + dy)) else {
                continue;
            };
            if x < image.width() && y < image.height() {
                image.get_pixel_mut(x, y).blend(&color);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::GeoJsonSurface;

    fn feature(id: &str, participant: &str, question: &str, geometry: FeatureGeometry) -> SurveyFeature {
        SurveyFeature {
            id: id.to_string(),
            question_id: question.to_string(),
            participant_code: participant.to_string(),
            created_at: None,
            geometry,
        }
    }

    fn square(x0: f64, y0: f64) -> FeatureGeometry {
        FeatureGeometry::Polygon(LineString::from(vec![
            (x0, y0),
            (x0 + 0.1, y0),
            (x0 + 0.1, y0 + 0.1),
            (x0, y0 + 0.1),
        ]))
    }

    fn fixtures() -> Vec<SurveyFeature> {
        vec![
            feature("0_0", "P1", "home", square(2.3, 48.8)),
            feature("1_0", "P2", "home", square(5.0, 45.0)),
            feature("2_0", "P1", "work", FeatureGeometry::Point(Coord { x: 2.35, y: 48.86 })),
        ]
    }

    fn labels() -> QuestionLabels {
        [
            ("home".to_string(), "Wo wohnen Sie?".to_string()),
            ("work".to_string(), "Wo arbeiten Sie?".to_string()),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn colors_are_stable_per_question() {
        let a = question_colors(["work", "home"]);
        let b = question_colors(["home", "work", "home"]);
        assert_eq!(a, b);
        assert_eq!(a["home"], QUESTION_PALETTE[0]);
        assert_eq!(a["work"], QUESTION_PALETTE[1]);
    }

    #[test]
    fn palette_cycles_beyond_its_length() {
        let ids: Vec<String> = (0..10).map(|i| format!("q{i:02}")).collect();
        let colors = question_colors(ids.iter().map(String::as_str));
        assert_eq!(colors["q08"], QUESTION_PALETTE[0]);
    }

    #[test]
    fn view_contains_only_the_participant() {
        let features = fixtures();
        let view = ParticipantView::new(&features, "P1");
        assert_eq!(view.features().len(), 2);
        assert_eq!(view.question_ids(), BTreeSet::from(["home", "work"]));

        let bounds = view.bounds().unwrap();
        assert!(bounds.max().x < 3.0);
        assert_eq!(view.for_question("work").features().len(), 1);
    }

    #[test]
    fn draw_adds_one_shape_per_ring_or_point() {
        let features = fixtures();
        let view = ParticipantView::new(&features, "P1");
        let mut surface = GeoJsonSurface::new();
        let colors = question_colors(view.question_ids());

        let handles = view.draw(&mut surface, &colors, &labels());
        assert_eq!(handles.len(), 2);

        let collection = surface.to_feature_collection();
        let popups: Vec<&str> = collection
            .features
            .iter()
            .filter_map(|f| f.property("popup").and_then(|v| v.as_str()))
            .collect();
        assert_eq!(popups, vec!["Wo wohnen Sie?", "Wo arbeiten Sie?"]);
    }

    #[test]
    fn raster_paints_shapes() {
        let features = fixtures();
        let view = ParticipantView::new(&features, "P1");
        let colors = question_colors(view.question_ids());
        let image = view.render_raster(128, 128, &colors).unwrap();
        assert!(image.pixels().any(|p| p.0[3] > 0));
    }

    #[test]
    fn unknown_participant_has_nothing_to_export() {
        let features = fixtures();
        let view = ParticipantView::new(&features, "nobody");
        assert!(view.bounds().is_none());
        assert!(matches!(
            view.export(ExportFormat::Png, 64, 64, &labels()),
            Err(ExportError::Empty)
        ));
    }

    #[test]
    fn svg_export_draws_every_shape() {
        let features = fixtures();
        let view = ParticipantView::new(&features, "P1");
        let svg = String::from_utf8(view.export(ExportFormat::Svg, 200, 200, &labels()).unwrap())
            .unwrap();
        assert_eq!(svg.matches("<polygon ").count(), 1);
        assert_eq!(svg.matches("<circle ").count(), 1);
    }
}
