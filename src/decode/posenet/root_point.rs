use crate::{decode::sigmoid, pose::constants::LOCAL_MAXIMUM_RADIUS};
use itertools::iproduct;
use ndarray::{s, Array4};
use ordered_float::NotNan;
use tracing::trace;

/// A heatmap local maximum that seeds one pose.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(super) struct RootPoint {
    pub(super) id: usize,
    pub(super) x: f32,
    pub(super) y: f32,
    /// 0-100.
    pub(super) confidence: NotNan<f32>,
}

/// Whether `score` is at least as large as every other score in the window around `(row, col)`.
fn score_is_max_in_local_window(
    heatmap: &Array4<f32>,
    score: f32,
    row: usize,
    col: usize,
    id: usize,
    radius: usize,
) -> bool {
    let (_, rows, cols, _) = heatmap.dim();
    let y_start = row.saturating_sub(radius);
    let y_end = (row + radius + 1).min(rows);
    let x_start = col.saturating_sub(radius);
    let x_end = (col + radius + 1).min(cols);
    heatmap
        .slice(s![0, y_start..y_end, x_start..x_end, id])
        .iter()
        .all(|&value| value <= score)
}

/// Collect every heatmap cell that is strictly above `threshold` and dominates its window,
/// ordered by decreasing confidence.
///
/// `threshold` is a logit, comparable with raw heatmap values.
pub(super) fn extract_root_points(
    heatmap: &Array4<f32>,
    offsets: &Array4<f32>,
    threshold: f32,
    paxel_width: f32,
    paxel_height: f32,
) -> Vec<RootPoint> {
    let (_, rows, cols, num_parts) = heatmap.dim();
    let mut root_points = Vec::new();

    for (row, col, id) in iproduct!(0..rows, 0..cols, 0..num_parts) {
        let score = heatmap[[0, row, col, id]];
        // values at the threshold are rejected, NaN never passes
        if !(score > threshold) {
            continue;
        }

        if !score_is_max_in_local_window(heatmap, score, row, col, id, LOCAL_MAXIMUM_RADIUS) {
            continue;
        }

        let confidence = match NotNan::new(sigmoid(score) * 100.0) {
            Ok(confidence) => confidence,
            Err(_) => continue,
        };

        let y = row as f32 * paxel_height + offsets[[0, row, col, id]];
        let x = col as f32 * paxel_width + offsets[[0, row, col, id + num_parts]];

        trace!(message = "root keypoint", id, x, y, confidence = confidence.into_inner());

        root_points.push(RootPoint {
            id,
            x,
            y,
            confidence,
        });
    }

    root_points.sort_by_key(|root| std::cmp::Reverse(root.confidence));
    root_points
}
