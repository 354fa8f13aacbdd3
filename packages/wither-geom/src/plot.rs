//! plot.rs — Per-batch raster diagnostic
//!
//! Draws one PNG per fused batch: observer origins, nominal rays, both
//! wedge-bound bearings, the feasible polygon, the point estimate with
//! its error circle, and the ground truth when the harness knows it.
//! Strictly a diagnostic artifact; nothing in the pipeline reads it back.

use std::path::Path;

use image::{Rgb, RgbImage};
use wither_types::{Observation, Polygon, Vec2};

use crate::ray::{observation_to_ray, observation_to_wedge, RayChoice};

const BG: Rgb<u8> = Rgb([18, 20, 28]);
const OBSERVER: Rgb<u8> = Rgb([240, 200, 60]);
const RAY: Rgb<u8> = Rgb([110, 110, 130]);
const WEDGE: Rgb<u8> = Rgb([200, 120, 40]);
const REGION: Rgb<u8> = Rgb([70, 200, 110]);
const ESTIMATE: Rgb<u8> = Rgb([235, 70, 70]);
const TRUTH: Rgb<u8> = Rgb([80, 200, 240]);

/// Everything one frame needs. Rays and wedges are re-derived from the
/// observations so the plot always matches what fusion actually saw.
pub struct DiagnosticScene<'a> {
    pub observations: &'a [Observation],
    pub estimate: Vec2,
    pub error_radius: f64,
    pub region: Option<&'a Polygon>,
    pub truth: Option<Vec2>,
}

struct Frame {
    min: Vec2,
    scale: f64,
    size: u32,
}

impl Frame {
    fn fit(scene: &DiagnosticScene<'_>, size: u32) -> Frame {
        let mut min = Vec2::new(f64::INFINITY, f64::INFINITY);
        let mut max = Vec2::new(f64::NEG_INFINITY, f64::NEG_INFINITY);
        let mut take = |p: Vec2| {
            min.x = min.x.min(p.x);
            min.z = min.z.min(p.z);
            max.x = max.x.max(p.x);
            max.z = max.z.max(p.z);
        };
        for obs in scene.observations {
            take(obs.observer_pos);
        }
        take(scene.estimate);
        if let Some(t) = scene.truth {
            take(t);
        }
        if let Some(region) = scene.region {
            for &v in &region.vertices {
                take(v);
            }
        }
        // Pad 8% so markers at the hull are not clipped.
        let span = (max.x - min.x).max(max.z - min.z).max(1.0);
        let pad = span * 0.08;
        min = Vec2::new(min.x - pad, min.z - pad);
        let scale = (size as f64 - 1.0) / (span + 2.0 * pad);
        Frame { min, scale, size }
    }

    fn to_px(&self, p: Vec2) -> (i64, i64) {
        let x = ((p.x - self.min.x) * self.scale).round() as i64;
        // Flip z so north is up in the image.
        let y = self.size as i64 - 1 - ((p.z - self.min.z) * self.scale).round() as i64;
        (x, y)
    }
}

fn put(img: &mut RgbImage, x: i64, y: i64, color: Rgb<u8>) {
    if x >= 0 && y >= 0 && (x as u32) < img.width() && (y as u32) < img.height() {
        img.put_pixel(x as u32, y as u32, color);
    }
}

/// Bresenham segment, clipped per pixel.
fn line(img: &mut RgbImage, from: (i64, i64), to: (i64, i64), color: Rgb<u8>) {
    let (mut x0, mut y0) = from;
    let (x1, y1) = to;
    let dx = (x1 - x0).abs();
    let dy = -(y1 - y0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;
    let limit = 4 * img.width() as i64 + 4 * img.height() as i64;
    for _ in 0..limit {
        put(img, x0, y0, color);
        if x0 == x1 && y0 == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x0 += sx;
        }
        if e2 <= dx {
            err += dx;
            y0 += sy;
        }
    }
}

fn cross_marker(img: &mut RgbImage, center: (i64, i64), arm: i64, color: Rgb<u8>) {
    let (cx, cy) = center;
    line(img, (cx - arm, cy), (cx + arm, cy), color);
    line(img, (cx, cy - arm), (cx, cy + arm), color);
}

fn circle(img: &mut RgbImage, frame: &Frame, center: Vec2, radius: f64, color: Rgb<u8>) {
    if !radius.is_finite() || radius <= 0.0 {
        return;
    }
    const STEPS: usize = 256;
    let mut prev = None;
    for i in 0..=STEPS {
        let theta = 2.0 * std::f64::consts::PI * i as f64 / STEPS as f64;
        let p = Vec2::new(center.x + radius * theta.cos(), center.z + radius * theta.sin());
        let px = frame.to_px(p);
        if let Some(prev) = prev {
            line(img, prev, px, color);
        }
        prev = Some(px);
    }
}

/// Render the scene to a square RGB frame.
pub fn render(scene: &DiagnosticScene<'_>, size: u32) -> RgbImage {
    let frame = Frame::fit(scene, size);
    let mut img = RgbImage::from_pixel(size, size, BG);

    // World-extent used to stretch rays past the frame edge.
    let reach = (frame.size as f64 / frame.scale) * 2.0;

    for obs in scene.observations {
        if let Ok(ray) = observation_to_ray(obs, RayChoice::Center) {
            let far = ray.origin.add(ray.direction.scale(reach));
            line(&mut img, frame.to_px(ray.origin), frame.to_px(far), RAY);
        }
        if let Ok(wedge) = observation_to_wedge(obs) {
            for theta in [wedge.theta_min, wedge.theta_max] {
                let far = Vec2::new(
                    wedge.apex.x + reach * theta.cos(),
                    wedge.apex.z + reach * theta.sin(),
                );
                line(&mut img, frame.to_px(wedge.apex), frame.to_px(far), WEDGE);
            }
        }
    }

    if let Some(region) = scene.region {
        let n = region.vertices.len();
        for i in 0..n {
            let a = frame.to_px(region.vertices[i]);
            let b = frame.to_px(region.vertices[(i + 1) % n]);
            line(&mut img, a, b, REGION);
        }
    }

    for obs in scene.observations {
        cross_marker(&mut img, frame.to_px(obs.observer_pos), 4, OBSERVER);
    }

    circle(&mut img, &frame, scene.estimate, scene.error_radius, ESTIMATE);
    cross_marker(&mut img, frame.to_px(scene.estimate), 6, ESTIMATE);

    if let Some(truth) = scene.truth {
        cross_marker(&mut img, frame.to_px(truth), 6, TRUTH);
    }

    img
}

/// Render and write a PNG. The directory must already exist.
pub fn save_png(
    scene: &DiagnosticScene<'_>,
    size: u32,
    path: &Path,
) -> Result<(), image::ImageError> {
    render(scene, size).save(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::{synthesize_batch, Pattern};

    #[test]
    fn render_produces_nonuniform_frame() {
        let event = Vec2::new(250_000.0, -150_000.0);
        let batch = synthesize_batch(Pattern::Grid, 4, 160_000.0, event, 160.0, 0);
        let scene = DiagnosticScene {
            observations: &batch,
            estimate: event,
            error_radius: 500.0,
            region: None,
            truth: Some(event),
        };
        let img = render(&scene, 256);
        assert_eq!(img.dimensions(), (256, 256));
        // Something must have been drawn over the background.
        let painted = img.pixels().filter(|&&p| p != BG).count();
        assert!(painted > 100, "only {painted} pixels painted");
    }
}
