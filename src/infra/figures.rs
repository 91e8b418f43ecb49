// ============================================================
// Layer 6 - Figures
// ============================================================
// Two pictures are written next to the checkpoint:
//
//   gs.png    - an n x n grid of training images, inverted so the
//               strokes are dark on white (always written)
//   hist.png  - accuracy and log-loss curves per epoch, training
//               vs validation (needs the `plots` feature)

use std::path::Path;

use anyhow::{bail, Context, Result};
use image::{GrayImage, Luma};

use crate::data::rasterizer::denormalize_pixel;
use crate::domain::blocks::ImageBlock;
use crate::domain::history::History;

/// Tiles per side of the sample grid.
pub const SAMPLE_GRID_SIDE: usize = 8;

/// Pixels of white space between grid tiles.
const TILE_GAP: u32 = 2;

/// Tile the first `n * n` images of a block into one picture.
/// Missing images leave their tile blank.
pub fn render_grid(images: &ImageBlock, n: usize) -> Result<GrayImage> {
    if n == 0 {
        bail!("grid side must be at least 1");
    }
    let size = images.size() as u32;
    let side = n as u32 * size + (n as u32 - 1) * TILE_GAP;
    let mut grid = GrayImage::from_pixel(side, side, Luma([255]));

    for index in 0..(n * n).min(images.len()) {
        let Some(pixels) = images.image(index) else { break };
        let left = (index % n) as u32 * (size + TILE_GAP);
        let top = (index / n) as u32 * (size + TILE_GAP);
        for (offset, &value) in pixels.iter().enumerate() {
            let x = offset as u32 % size;
            let y = offset as u32 / size;
            // (1 - v) / 2 * 255: strokes dark, background white
            grid.put_pixel(left + x, top + y, Luma([255 - denormalize_pixel(value)]));
        }
    }
    Ok(grid)
}

pub fn save_sample_grid(images: &ImageBlock, n: usize, path: &Path) -> Result<()> {
    render_grid(images, n)?
        .save(path)
        .with_context(|| format!("Cannot write sample grid '{}'", path.display()))?;
    tracing::info!("Saved {n}x{n} sample grid to '{}'", path.display());
    Ok(())
}

/// Draw the training history, or warn when plotting is compiled out.
pub fn plot_history(history: &History, path: &Path) -> Result<()> {
    #[cfg(feature = "plots")]
    {
        draw_history(history, path).map_err(|e| {
            anyhow::anyhow!("Cannot draw history plot '{}': {e}", path.display())
        })?;
        tracing::info!("Saved history plot to '{}'", path.display());
    }
    #[cfg(not(feature = "plots"))]
    {
        tracing::warn!(
            "Skipping history plot '{}' for {} epochs: built without the `plots` feature",
            path.display(),
            history.epochs.len(),
        );
    }
    Ok(())
}

#[cfg(feature = "plots")]
fn draw_history(history: &History, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    use crate::domain::history::EpochMetrics;
    use plotters::prelude::*;

    type Curve = (&'static str, fn(&EpochMetrics) -> f64);
    let panels: [(&str, [Curve; 2]); 2] = [
        ("Accuracy", [
            ("Validation Accuracy", |m: &EpochMetrics| m.val_accuracy),
            ("Training Accuracy", |m: &EpochMetrics| m.accuracy),
        ]),
        ("MLogLoss", [
            ("Validation MLogLoss", |m: &EpochMetrics| m.val_loss),
            ("Training MLogLoss", |m: &EpochMetrics| m.loss),
        ]),
    ];

    let root = BitMapBackend::new(path, (1600, 1000)).into_drawing_area();
    root.fill(&WHITE)?;
    let areas = root.split_evenly((2, 1));
    let x_max = (history.epochs.len() as f64).max(2.0);

    for (area, (title, curves)) in areas.iter().zip(panels) {
        let series: Vec<Vec<(f64, f64)>> = curves
            .iter()
            .map(|(_, value)| {
                history
                    .epochs
                    .iter()
                    .map(|m| (m.epoch as f64, value(m)))
                    .filter(|(_, v)| v.is_finite())
                    .collect()
            })
            .collect();

        let (lo, hi) = series
            .iter()
            .flatten()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &(_, v)| (lo.min(v), hi.max(v)));
        let (lo, hi) = if lo.is_finite() { (lo, hi) } else { (0.0, 1.0) };
        let pad = ((hi - lo) * 0.05).max(1e-3);

        let mut chart = ChartBuilder::on(area)
            .margin(20)
            .caption(title, ("sans-serif", 28))
            .x_label_area_size(45)
            .y_label_area_size(60)
            .build_cartesian_2d(1f64..x_max, (lo - pad)..(hi + pad))?;
        chart.configure_mesh().x_desc("Epoch").y_desc(title).draw()?;

        for ((label, _), (points, color)) in curves.iter().zip(series.into_iter().zip([BLUE, RED])) {
            chart
                .draw_series(LineSeries::new(points, color.stroke_width(4)))?
                .label(*label)
                .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color.filled()));
        }
        chart
            .configure_series_labels()
            .background_style(WHITE.mix(0.8))
            .border_style(BLACK)
            .draw()?;
    }
    root.present()?;
    Ok(())
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grid_inverts_and_tiles() {
        // Two 2x2 images: all background (-1) and all stroke (+1)
        let images = ImageBlock::new(2, vec![-1.0, -1.0, -1.0, -1.0, 1.0, 1.0, 1.0, 1.0]).unwrap();
        let grid = render_grid(&images, 2).unwrap();

        assert_eq!(grid.dimensions(), (2 * 2 + TILE_GAP, 2 * 2 + TILE_GAP));
        assert_eq!(grid.get_pixel(0, 0)[0], 255);
        assert_eq!(grid.get_pixel(2 + TILE_GAP, 0)[0], 0);
        // Third and fourth tiles have no image
        assert_eq!(grid.get_pixel(0, 2 + TILE_GAP)[0], 255);
    }

    #[test]
    fn test_zero_grid_is_an_error() {
        let images = ImageBlock::new(2, vec![0.0; 4]).unwrap();
        assert!(render_grid(&images, 0).is_err());
    }

    #[test]
    fn test_save_sample_grid_writes_png() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("gs.png");
        let images = ImageBlock::new(4, vec![0.0; 16 * 3]).unwrap();
        save_sample_grid(&images, 2, &path).unwrap();

        let img = image::open(&path).unwrap();
        assert_eq!(img.width(), 2 * 4 + TILE_GAP);
    }

    #[test]
    fn test_plot_history_never_fails_on_empty_history() {
        let tmp = tempfile::tempdir().unwrap();
        plot_history(&History::default(), &tmp.path().join("hist.png")).unwrap();
    }
}
