//! Blue → cyan → green → yellow → red intensity ramp.

use image::Rgba;

use crate::RendererConfig;

/// Ramp stops as `(intensity, rgb)`.
const STOPS: [(f32, [u8; 3]); 5] = [
    (0.0, [0, 0, 255]),
    (0.25, [0, 255, 255]),
    (0.5, [0, 255, 0]),
    (0.75, [255, 255, 0]),
    (1.0, [255, 0, 0]),
];

/// RGB color for an intensity in `[0, 1]` (clamped).
#[must_use]
pub fn ramp_rgb(intensity: f32) -> [u8; 3] {
    let t = if intensity.is_nan() { 0.0 } else { intensity.clamp(0.0, 1.0) };

    for pair in STOPS.windows(2) {
        let (t0, c0) = pair[0];
        let (t1, c1) = pair[1];
        if t <= t1 {
            let f = (t - t0) / (t1 - t0);
            return [lerp(c0[0], c1[0], f), lerp(c0[1], c1[1], f), lerp(c0[2], c1[2], f)];
        }
    }
    STOPS[STOPS.len() - 1].1
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn lerp(a: u8, b: u8, f: f32) -> u8 {
    f32::from(b)
        .mul_add(f, f32::from(a) * (1.0 - f))
        .round()
        .clamp(0.0, 255.0) as u8
}

/// `value / max_value`, or `0` when the grid has no positive maximum.
#[must_use]
pub fn intensity(value: f32, max_value: f32) -> f32 {
    if max_value > 0.0 {
        (value / max_value).clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Opacity for an intensity, linear between the configured floor and
/// ceiling.
#[must_use]
pub fn alpha(intensity: f32, config: &RendererConfig) -> f32 {
    let t = intensity.clamp(0.0, 1.0);
    (config.alpha_ceiling - config.alpha_floor).mul_add(t, config.alpha_floor)
}

/// RGBA pixel for a cell value.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn cell_color(value: f32, max_value: f32, config: &RendererConfig) -> Rgba<u8> {
    let t = intensity(value, max_value);
    let [r, g, b] = ramp_rgb(t);
    let a = (alpha(t, config) * 255.0).round().clamp(0.0, 255.0) as u8;
    Rgba([r, g, b, a])
}

/// `#rrggbb` form of an RGB triple.
#[must_use]
pub fn to_hex([r, g, b]: [u8; 3]) -> String {
    format!("#{r:02x}{g:02x}{b:02x}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoints_are_blue_and_red() {
        assert_eq!(ramp_rgb(0.0), [0, 0, 255]);
        assert_eq!(ramp_rgb(1.0), [255, 0, 0]);
        assert_eq!(ramp_rgb(0.5), [0, 255, 0]);
    }

    #[test]
    fn out_of_range_intensity_is_clamped() {
        assert_eq!(ramp_rgb(-3.0), [0, 0, 255]);
        assert_eq!(ramp_rgb(7.0), [255, 0, 0]);
        assert_eq!(ramp_rgb(f32::NAN), [0, 0, 255]);
    }

    #[test]
    fn midpoints_interpolate_between_stops() {
        assert_eq!(ramp_rgb(0.125), [0, 128, 255]);
        assert_eq!(ramp_rgb(0.875), [255, 128, 0]);
    }

    #[test]
    fn alpha_spans_floor_to_ceiling() {
        let config = RendererConfig::default();
        assert!((alpha(0.0, &config) - config.alpha_floor).abs() < 1e-6);
        assert!((alpha(1.0, &config) - config.alpha_ceiling).abs() < 1e-6);
    }

    #[test]
    fn zero_max_gives_zero_intensity() {
        assert!(intensity(3.0, 0.0).abs() < f32::EPSILON);
        assert!((intensity(2.0, 4.0) - 0.5).abs() < f32::EPSILON);
    }

    #[test]
    fn hex_formatting() {
        assert_eq!(to_hex([255, 0, 16]), "#ff0010");
    }
}
