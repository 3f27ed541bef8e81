use crate::*;
use ndarray::*;

/// Compute intersection over union of two boxes.
///
/// # Returns
///
/// The intersection over union in [0.0, 1.0]. Boxes that do not overlap, and pairs whose union area is not positive, score `0.0`.
pub fn iou(a: &BoundingBox, b: &BoundingBox) -> f32 {
    let x1 = a.x().max(b.x());
    let y1 = a.y().max(b.y());
    let x2 = (a.x() + a.width()).min(b.x() + b.width());
    let y2 = (a.y() + a.height()).min(b.y() + b.height());

    let area_intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    let area_union = a.area().max(0.0) + b.area().max(0.0) - area_intersection;

    if area_union <= 0.0 {
        0.0
    } else {
        (area_intersection / area_union).clamp(0.0, 1.0)
    }
}

/// Compute intersection over union against many candidates at once.
///
/// # Parameters
///
/// * `bbox`: A bounding box in format `(top left x, top left y, width, height)`.
/// * `candidates`: A matrix of candidate bounding boxes (one per row) in the same format as `bbox`.
///
/// # Returns
///
/// The intersection over union in [0.0, 1.0] between the `bbox` and each candidate.
pub fn intersection_over_union(bbox: &Array1<f32>, candidates: &Array2<f32>) -> Array1<f32> {
    let bbox_tl = bbox.slice(s![..2]).to_owned();
    let bbox_br = &bbox_tl + &bbox.slice(s![2..4]);
    let candidates_tl = candidates.slice(s![.., 0..2]).to_owned();
    let candidates_br = &candidates_tl + &candidates.slice(s![.., 2..4]);

    let tl = stack!(
        Axis(1),
        candidates_tl.slice(s![.., 0]).mapv(|v| v.max(bbox_tl[0])),
        candidates_tl.slice(s![.., 1]).mapv(|v| v.max(bbox_tl[1]))
    );
    let br = stack!(
        Axis(1),
        candidates_br.slice(s![.., 0]).mapv(|v| v.min(bbox_br[0])),
        candidates_br.slice(s![.., 1]).mapv(|v| v.min(bbox_br[1]))
    );
    let wh = (br - tl).mapv(|v| v.max(0.0));

    let area_intersection = wh.map_axis(Axis(1), |v| v[0] * v[1]);
    let area_bbox = (bbox[2] * bbox[3]).max(0.0);
    let area_candidates = candidates.map_axis(Axis(1), |v| (v[2] * v[3]).max(0.0));

    let area_union = area_candidates + area_bbox - &area_intersection;

    Zip::from(&area_intersection)
        .and(&area_union)
        .map_collect(|&intersection, &union| {
            if union <= 0.0 {
                0.0
            } else {
                (intersection / union).clamp(0.0, 1.0)
            }
        })
}

/// Returns the largest intersection over union between `bbox` and any of `boxes`, or `0.0` if `boxes` is empty.
pub fn max_iou(bbox: &BoundingBox, boxes: &[BoundingBox]) -> f32 {
    if boxes.is_empty() {
        return 0.0;
    }

    let candidates = Array2::from_shape_fn((boxes.len(), 4), |(row, col)| {
        let candidate = &boxes[row];
        match col {
            0 => candidate.x(),
            1 => candidate.y(),
            2 => candidate.width(),
            _ => candidate.height(),
        }
    });

    intersection_over_union(&bbox.to_tlwh(), &candidates)
        .fold(0.0_f32, |accumulator, &value| accumulator.max(value))
}
