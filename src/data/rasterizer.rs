// ============================================================
// Layer 4 - Stroke Rasterizer
// ============================================================
// Turns a Drawing into a square grayscale image.
//
// Strokes are drawn on a 256x256 canvas (the coordinate range
// of the simplified dataset), then the canvas is resampled to
// the model's input size:
//
//   Drawing ──► 256x256 canvas ──► bilinear resize ──► size x size
//
// Time colouring encodes stroke order as brightness: the first
// stroke is 255, each later stroke 13 darker, bottoming out at
// 125 from the eleventh stroke on. Without it every stroke is
// 255.
//
// Thick lines are drawn as capsules: every pixel whose centre
// lies within line_width / 2 of the segment is painted, which
// also gives round joins between consecutive segments.
// Later segments overwrite earlier ones.

use anyhow::{bail, Result};
use image::{imageops, imageops::FilterType, GrayImage, Luma};
use serde::{Deserialize, Serialize};

use crate::domain::drawing::Drawing;

/// Side of the drawing canvas before resampling.
pub const BASE_SIZE: u32 = 256;

/// Rendering parameters shared by every image of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderOptions {
    pub size: u32,
    pub line_width: u32,
    pub time_color: bool,
}

impl RenderOptions {
    pub fn new(size: u32, line_width: u32, time_color: bool) -> Result<Self> {
        if size == 0 {
            bail!("render size must be positive");
        }
        Ok(Self { size, line_width, time_color })
    }
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self { size: 64, line_width: 6, time_color: true }
    }
}

/// Brightness of stroke `index` (0-based).
pub fn stroke_intensity(index: usize, time_color: bool) -> u8 {
    if time_color {
        (255 - index.min(10) * 13) as u8
    } else {
        255
    }
}

/// Render `drawing` to a `size` x `size` image.
///
/// Deterministic and side-effect free.
pub fn rasterize(drawing: &Drawing, options: &RenderOptions) -> GrayImage {
    let mut canvas = GrayImage::new(BASE_SIZE, BASE_SIZE);

    for (t, stroke) in drawing.strokes().iter().enumerate() {
        let color = Luma([stroke_intensity(t, options.time_color)]);
        for (from, to) in stroke.segments() {
            draw_segment(&mut canvas, from, to, color, options.line_width);
        }
    }

    if options.size == BASE_SIZE {
        canvas
    } else {
        imageops::resize(&canvas, options.size, options.size, FilterType::Triangle)
    }
}

/// Map a pixel to the [-1, 1] range the model is trained on.
pub fn normalize_pixel(value: u8) -> f32 {
    value as f32 / 127.5 - 1.0
}

/// Inverse of [`normalize_pixel`], clamped to a valid byte.
pub fn denormalize_pixel(value: f32) -> u8 {
    ((value + 1.0) * 127.5).round().clamp(0.0, 255.0) as u8
}

fn draw_segment(
    img: &mut GrayImage,
    from: (i32, i32),
    to: (i32, i32),
    color: Luma<u8>,
    line_width: u32,
) {
    let from = (i64::from(from.0), i64::from(from.1));
    let to = (i64::from(to.0), i64::from(to.1));
    if line_width <= 1 {
        draw_thin_segment(img, from, to, color);
    } else {
        draw_thick_segment(img, from, to, color, f64::from(line_width) / 2.0);
    }
}

fn put_clipped(img: &mut GrayImage, x: i64, y: i64, color: Luma<u8>) {
    let (w, h) = img.dimensions();
    if x >= 0 && y >= 0 && x < i64::from(w) && y < i64::from(h) {
        img.put_pixel(x as u32, y as u32, color);
    }
}

type Point = (i64, i64);

/// Liang-Barsky clip of a segment to the square `[lo, hi]`.
/// Endpoints inside the square are returned untouched.
fn clip_segment(from: Point, to: Point, lo: i64, hi: i64) -> Option<(Point, Point)> {
    let (x0, y0) = (from.0 as f64, from.1 as f64);
    let (dx, dy) = (to.0 as f64 - x0, to.1 as f64 - y0);
    let (lo_f, hi_f) = (lo as f64, hi as f64);
    let (mut t0, mut t1) = (0.0_f64, 1.0_f64);

    for (p, q) in [(-dx, x0 - lo_f), (dx, hi_f - x0), (-dy, y0 - lo_f), (dy, hi_f - y0)] {
        if p == 0.0 {
            if q < 0.0 {
                return None;
            }
            continue;
        }
        let r = q / p;
        if p < 0.0 {
            if r > t1 {
                return None;
            }
            t0 = t0.max(r);
        } else {
            if r < t0 {
                return None;
            }
            t1 = t1.min(r);
        }
    }

    let at = |t: f64, end: Point| {
        if t == 0.0 || t == 1.0 {
            end
        } else {
            (
                ((x0 + t * dx).round() as i64).clamp(lo, hi),
                ((y0 + t * dy).round() as i64).clamp(lo, hi),
            )
        }
    };
    Some((at(t0, from), at(t1, to)))
}

// Bresenham, all octants, walked only over the part near the canvas.
fn draw_thin_segment(img: &mut GrayImage, from: Point, to: Point, color: Luma<u8>) {
    let (w, h) = img.dimensions();
    let hi = i64::from(w.max(h));
    let Some((from, to)) = clip_segment(from, to, -1, hi) else {
        return;
    };

    let (mut x, mut y) = from;
    let dx = (to.0 - x).abs();
    let dy = -(to.1 - y).abs();
    let sx = if x < to.0 { 1 } else { -1 };
    let sy = if y < to.1 { 1 } else { -1 };
    let mut err = dx + dy;

    loop {
        put_clipped(img, x, y, color);
        if (x, y) == to {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x += sx;
        }
        if e2 <= dx {
            err += dx;
            y += sy;
        }
    }
}

fn draw_thick_segment(img: &mut GrayImage, from: Point, to: Point, color: Luma<u8>, radius: f64) {
    let (w, h) = img.dimensions();
    let reach = radius.ceil() as i64;
    let x0 = (from.0.min(to.0) - reach).max(0);
    let y0 = (from.1.min(to.1) - reach).max(0);
    let x1 = (from.0.max(to.0) + reach).min(i64::from(w) - 1);
    let y1 = (from.1.max(to.1) + reach).min(i64::from(h) - 1);
    if x0 > x1 || y0 > y1 {
        return;
    }

    let (ax, ay) = (from.0 as f64, from.1 as f64);
    let (vx, vy) = ((to.0 - from.0) as f64, (to.1 - from.1) as f64);
    let len_sq = vx * vx + vy * vy;
    let r_sq = radius * radius;

    for y in y0..=y1 {
        for x in x0..=x1 {
            let (px, py) = (x as f64 - ax, y as f64 - ay);
            let t = if len_sq > 0.0 {
                ((px * vx + py * vy) / len_sq).clamp(0.0, 1.0)
            } else {
                0.0
            };
            let (dx, dy) = (px - t * vx, py - t * vy);
            if dx * dx + dy * dy <= r_sq {
                img.put_pixel(x as u32, y as u32, color);
            }
        }
    }
}
