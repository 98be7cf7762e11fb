//! Splitting a world box into bricks and pencils.
//!
//! Every decomposition enumerates its boxes with dimension 0 varying fastest
//! and dimension 2 slowest. The communication layer indexes boxes by that
//! position, so the order is part of the contract.

use crate::error::{PencilFftError, Result};
use crate::geometry::{check_axis, Box3d};

/// Start of slice `i` when `n` indexes are cut into `parts` near-equal
/// contiguous slices, larger slices first.
fn slice_start(n: usize, parts: usize, i: usize) -> usize {
    i * (n / parts) + i.min(n % parts)
}

/// Splits `world` into `grid[0] * grid[1] * grid[2]` bricks.
///
/// Dimension `d` is cut into `grid[d]` contiguous slices whose sizes differ
/// by at most one, the larger slices coming first. Bricks are enumerated with
/// dimension 0 fastest and dimension 2 slowest.
///
/// # Errors
/// * `InvalidDecomposition` if some `grid[d]` is zero or exceeds the extent
///   of the world along `d` (empty slices are never produced).
pub fn split_world(world: &Box3d, grid: [usize; 3]) -> Result<Vec<Box3d>> {
    let sizes = world.sizes();
    for d in 0..3 {
        if grid[d] == 0 || grid[d] > sizes[d] {
            return Err(PencilFftError::InvalidDecomposition {
                world: *world,
                grid: grid.to_vec(),
                reason: format!(
                    "dimension {} of extent {} cannot be cut into {} non-empty slices",
                    d, sizes[d], grid[d]
                ),
            });
        }
    }

    // Bounds are exclusive and reach high + 1, so they live in i64. Every
    // corner lies inside the world, which makes the final narrowing exact.
    let low = world.low();
    let bound =
        |d: usize, i: usize| i64::from(low[d]) + slice_start(sizes[d], grid[d], i) as i64;
    let first = |d: usize, i: usize| bound(d, i) as i32;
    let last = |d: usize, i: usize| (bound(d, i + 1) - 1) as i32;

    let mut bricks = Vec::with_capacity(grid.iter().product());
    for k in 0..grid[2] {
        for j in 0..grid[1] {
            for i in 0..grid[0] {
                bricks.push(Box3d::new(
                    [first(0, i), first(1, j), first(2, k)],
                    [last(0, i), last(1, j), last(2, k)],
                )?);
            }
        }
    }
    Ok(bricks)
}

/// Splits `world` into pencils that keep `axis` whole.
///
/// Of the two remaining dimensions the smaller-indexed one (mid) is cut into
/// `grid[0]` slices and the larger-indexed one (outer) into `grid[1]`
/// slices. Without a hint the pencils come with mid varying fastest and
/// outer slowest.
///
/// A non-empty `order_hint` holds the boxes currently owned by each grid
/// position; the pencils are then permuted so that position `i` receives the
/// pencil overlapping `order_hint[i]` the most (see [`reorder`]).
///
/// # Errors
/// * `InvalidAxis` if `axis > 2`.
/// * `InvalidDecomposition` if a dimension cannot be cut into non-empty
///   slices, or if the hint does not hold one box per pencil.
pub fn make_pencils(
    world: &Box3d,
    grid: [usize; 2],
    axis: usize,
    order_hint: &[Box3d],
) -> Result<Vec<Box3d>> {
    check_axis(axis)?;
    let brick_grid = match axis {
        0 => [1, grid[0], grid[1]],
        1 => [grid[0], 1, grid[1]],
        _ => [grid[0], grid[1], 1],
    };
    let pencils = split_world(world, brick_grid)?;

    if order_hint.is_empty() {
        return Ok(pencils);
    }
    if order_hint.len() != pencils.len() {
        return Err(PencilFftError::InvalidDecomposition {
            world: *world,
            grid: grid.to_vec(),
            reason: format!(
                "order hint holds {} boxes for {} pencils",
                order_hint.len(),
                pencils.len()
            ),
        });
    }
    Ok(reorder(order_hint, pencils))
}

/// Permutes `boxes` so that position `i` holds the not yet assigned box with
/// the largest overlap with `hint[i]`; the first maximum wins ties.
///
/// Boxes left over once the hint is exhausted keep their relative order at
/// the end.
pub fn reorder(hint: &[Box3d], boxes: Vec<Box3d>) -> Vec<Box3d> {
    let mut taken = vec![false; boxes.len()];
    let mut result = Vec::with_capacity(boxes.len());

    for reference in hint {
        let mut best: Option<(usize, u128)> = None;
        for (j, candidate) in boxes.iter().enumerate() {
            if taken[j] {
                continue;
            }
            let overlap = candidate.overlap(reference);
            if best.map_or(true, |(_, best_overlap)| overlap > best_overlap) {
                best = Some((j, overlap));
            }
        }
        match best {
            Some((j, _)) => {
                taken[j] = true;
                result.push(boxes[j]);
            }
            None => break,
        }
    }

    result.extend(
        boxes
            .iter()
            .zip(&taken)
            .filter(|(_, used)| !**used)
            .map(|(b, _)| *b),
    );
    result
}
