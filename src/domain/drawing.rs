// ============================================================
// Layer 3 - Drawing Domain Type
// ============================================================
// A doodle is an ordered list of pen strokes. Each stroke is a
// pair of coordinate lists captured in time order:
//
//   [[x0, x1, x2, ...], [y0, y1, y2, ...]]
//
// Shard files store the whole drawing as JSON text, e.g.
//
//   [[[17, 40, 61], [80, 52, 49]], [[60, 95], [50, 50]]]
//
// Raw (unsimplified) exports carry a third list of timestamps.
// It is accepted and dropped: rendering only needs positions.

use std::str::FromStr;

use thiserror::Error;

/// Reasons a serialized drawing can be rejected.
#[derive(Debug, Error)]
pub enum DrawingError {
    #[error("drawing is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("stroke {stroke} has {lists} coordinate lists, expected at least 2")]
    MissingAxis { stroke: usize, lists: usize },

    #[error("stroke {stroke} has {xs} x values but {ys} y values")]
    LengthMismatch { stroke: usize, xs: usize, ys: usize },

    #[error("stroke {stroke} has no points")]
    EmptyStroke { stroke: usize },
}

/// One continuous pen movement. `xs` and `ys` always have the same
/// non-zero length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stroke {
    xs: Vec<i32>,
    ys: Vec<i32>,
}

impl Stroke {
    fn checked(stroke: usize, xs: Vec<i32>, ys: Vec<i32>) -> Result<Self, DrawingError> {
        if xs.len() != ys.len() {
            return Err(DrawingError::LengthMismatch {
                stroke,
                xs: xs.len(),
                ys: ys.len(),
            });
        }
        if xs.is_empty() {
            return Err(DrawingError::EmptyStroke { stroke });
        }
        Ok(Self { xs, ys })
    }

    /// Points in capture order.
    pub fn points(&self) -> impl Iterator<Item = (i32, i32)> + '_ {
        self.xs.iter().copied().zip(self.ys.iter().copied())
    }

    /// Consecutive point pairs. A single-point stroke has none.
    pub fn segments(&self) -> impl Iterator<Item = ((i32, i32), (i32, i32))> + '_ {
        self.points().zip(self.points().skip(1))
    }
}

/// A complete doodle: strokes in the order they were drawn.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Drawing {
    strokes: Vec<Stroke>,
}

impl Drawing {
    pub fn strokes(&self) -> &[Stroke] {
        &self.strokes
    }
}

impl FromStr for Drawing {
    type Err = DrawingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw: Vec<Vec<Vec<i32>>> = serde_json::from_str(s)?;
        let mut strokes = Vec::with_capacity(raw.len());

        for (index, lists) in raw.into_iter().enumerate() {
            let count = lists.len();
            let mut lists = lists.into_iter();
            let (Some(xs), Some(ys)) = (lists.next(), lists.next()) else {
                return Err(DrawingError::MissingAxis { stroke: index, lists: count });
            };
            strokes.push(Stroke::checked(index, xs, ys)?);
        }

        Ok(Self { strokes })
    }
}
