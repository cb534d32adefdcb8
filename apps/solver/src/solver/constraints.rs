//! Per-attempt placement model: turns resolved footprints and a candidate
//! bound into a `ConstraintModel` for the oracle, and reads placements back
//! out of a satisfying assignment.

use std::collections::HashMap;

use crate::solver::models::PlacedBuilding;
use crate::solver::oracle::{Assignment, Constraint, ConstraintModel, Precedence, VarId};

/// A graph node with its catalog footprint already looked up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlacementItem {
    pub node_id: String,
    /// Extent along y.
    pub width: u32,
    /// Extent along x.
    pub length: u32,
}

impl PlacementItem {
    /// Footprint area, `width × length`.
    pub fn area(&self) -> u64 {
        u64::from(self.width) * u64::from(self.length)
    }
}

#[derive(Debug, Clone)]
pub struct PlacementModel {
    pub model: ConstraintModel,
    /// `(x, y)` variables per item, in item order.
    positions: Vec<(VarId, VarId)>,
}

impl PlacementModel {
    /// Builds the model for one attempt at `width × height`.
    ///
    /// - `0 <= x`, `x + length <= width`, `0 <= y`, `y + width <= height`
    /// - the first item is pinned at the origin (symmetry breaking)
    /// - among the other items, equal footprints are kept in `(x, y)`
    ///   lexicographic order (symmetry breaking)
    /// - every unordered pair is separated left, right, below or above
    pub fn build(items: &[PlacementItem], width: u32, height: u32) -> Self {
        let mut placement = Self::build_unpinned(items, width, height);
        let Some(&(x, y)) = placement.positions.first() else {
            return placement;
        };
        placement.model.add(Constraint::Equals { var: x, value: 0 });
        placement.model.add(Constraint::Equals { var: y, value: 0 });

        // Swapping two equal footprints maps a layout onto another valid one.
        let mut last_of_shape: HashMap<(u32, u32), usize> = HashMap::new();
        for (i, item) in items.iter().enumerate().skip(1) {
            if let Some(prev) = last_of_shape.insert((item.width, item.length), i) {
                let (px, py) = placement.positions[prev];
                let (cx, cy) = placement.positions[i];
                placement.model.add(Constraint::LexLeq {
                    first: vec![px, py],
                    second: vec![cx, cy],
                });
            }
        }
        placement
    }

    /// Same model without the origin pin.
    pub fn build_unpinned(items: &[PlacementItem], width: u32, height: u32) -> Self {
        let mut model = ConstraintModel::new();
        let mut positions = Vec::with_capacity(items.len());

        for item in items {
            let x = model.new_var(format!("{}_x", item.node_id));
            let y = model.new_var(format!("{}_y", item.node_id));
            model.add(Constraint::AtLeast { var: x, value: 0 });
            model.add(Constraint::AtLeast { var: y, value: 0 });
            model.add(Constraint::AtMost {
                var: x,
                offset: i64::from(item.length),
                limit: i64::from(width),
            });
            model.add(Constraint::AtMost {
                var: y,
                offset: i64::from(item.width),
                limit: i64::from(height),
            });
            positions.push((x, y));
        }

        for i in 0..items.len() {
            for j in (i + 1)..items.len() {
                let (xi, yi) = positions[i];
                let (xj, yj) = positions[j];
                let (a, b) = (&items[i], &items[j]);
                model.add(Constraint::AnyOf(vec![
                    precedes(xi, a.length, xj),
                    precedes(xj, b.length, xi),
                    precedes(yi, a.width, yj),
                    precedes(yj, b.width, yi),
                ]));
            }
        }

        if !fits_by_area(items, width, height) {
            // Implied by the constraints above; an empty disjunction lets the
            // oracle reject the bound without searching.
            model.add(Constraint::AnyOf(Vec::new()));
        }

        Self { model, positions }
    }

    /// Reads placements out of a satisfying assignment, in item order.
    pub fn placements(&self, items: &[PlacementItem], assignment: &Assignment) -> Vec<PlacedBuilding> {
        items
            .iter()
            .zip(&self.positions)
            .map(|(item, &(x, y))| PlacedBuilding {
                node_id: item.node_id.clone(),
                x: assignment.value(x),
                y: assignment.value(y),
                width: item.width,
                length: item.length,
            })
            .collect()
    }
}

fn precedes(before: VarId, gap: u32, after: VarId) -> Precedence {
    Precedence {
        before,
        gap: i64::from(gap),
        after,
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Area bound
// ────────────────────────────────────────────────────────────────────────────

/// Largest `k` tried for the dual feasible functions below.
const MAX_DFF_K: u64 = 8;

/// `k · u⁽ᵏ⁾(size)` on a bin of `capacity`, where `u⁽ᵏ⁾` is the Fekete–Schepers
/// dual feasible function. `k = 0` stands for the identity (plain area).
fn scaled_dff(size: u64, capacity: u64, k: u64) -> u64 {
    if k == 0 {
        size
    } else if ((k + 1) * size) % capacity == 0 {
        size * k
    } else {
        ((k + 1) * size / capacity) * capacity
    }
}

/// False only when no packing of `items` into `width × height` can exist.
///
/// For dual feasible functions `f` (along x) and `g` (along y), every
/// feasible packing has `Σ f(length)·g(width) <= W·H`. Plain area is the
/// identity case; the others charge items that cannot share a row or column
/// with many of their peers for the space they waste.
pub fn fits_by_area(items: &[PlacementItem], width: u32, height: u32) -> bool {
    let (w, h) = (u64::from(width), u64::from(height));
    if items.is_empty() {
        return true;
    }
    // Oversized or degenerate cases fail on domains alone.
    if w == 0 || h == 0 || items.iter().any(|i| u64::from(i.length) > w || u64::from(i.width) > h) {
        return true;
    }

    for kx in 0..=MAX_DFF_K {
        for ky in 0..=MAX_DFF_K {
            let charged: u128 = items
                .iter()
                .map(|i| {
                    u128::from(scaled_dff(u64::from(i.length), w, kx))
                        * u128::from(scaled_dff(u64::from(i.width), h, ky))
                })
                .sum();
            let capacity = u128::from(w * h) * u128::from(kx.max(1)) * u128::from(ky.max(1));
            if charged > capacity {
                return false;
            }
        }
    }
    true
}

/// Area shared by two placed footprints.
pub fn overlap_area(a: &PlacedBuilding, b: &PlacedBuilding) -> i64 {
    let dx = (a.x + i64::from(a.length)).min(b.x + i64::from(b.length)) - a.x.max(b.x);
    let dy = (a.y + i64::from(a.width)).min(b.y + i64::from(b.width)) - a.y.max(b.y);
    dx.max(0) * dy.max(0)
}
