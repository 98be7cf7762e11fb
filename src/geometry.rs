//! Box algebra over the global 3-D index space.
//!
//! A [`Box3d`] is the unit of ownership of every decomposition in the crate:
//! pencils, bricks and logic-plan stages are all sequences of boxes. Corners
//! are inclusive and the local data of a box is laid out with dimension 0
//! contiguous, then dimension 1, then dimension 2.

use std::fmt;

use crate::error::{PencilFftError, Result};

/// Axis-aligned rectangular region with inclusive low and high corners.
///
/// Boxes are immutable values. The only way to build one is through
/// [`Box3d::new`], which guarantees `low[d] <= high[d]` on every axis, so
/// `size(d) >= 1` and `volume() >= 1` always hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Box3d {
    low: [i32; 3],
    high: [i32; 3],
}

impl Box3d {
    /// Creates a box from its inclusive corners.
    ///
    /// # Errors
    /// * `InvalidBox` if `low[d] > high[d]` on some axis `d`.
    pub fn new(low: [i32; 3], high: [i32; 3]) -> Result<Self> {
        if let Some(axis) = (0..3).find(|&d| low[d] > high[d]) {
            return Err(PencilFftError::InvalidBox { low, high, axis });
        }
        Ok(Self { low, high })
    }

    pub fn low(&self) -> [i32; 3] {
        self.low
    }

    pub fn high(&self) -> [i32; 3] {
        self.high
    }

    /// Number of indexes along dimension `d`.
    ///
    /// # Panics
    /// If `d > 2`.
    pub fn size(&self, d: usize) -> usize {
        (i64::from(self.high[d]) - i64::from(self.low[d]) + 1) as usize
    }

    pub fn sizes(&self) -> [usize; 3] {
        [self.size(0), self.size(1), self.size(2)]
    }

    /// Total number of indexes in the box, `None` when it does not fit in
    /// `usize`.
    pub fn count(&self) -> Option<usize> {
        self.size(0)
            .checked_mul(self.size(1))?
            .checked_mul(self.size(2))
    }

    /// Exact number of indexes in the box. Every size is at most `2^32`, so
    /// the product always fits.
    pub fn volume(&self) -> u128 {
        self.sizes().iter().map(|&n| n as u128).product()
    }

    /// Intersection with `other`, `None` when the boxes are disjoint.
    pub fn collide(&self, other: &Box3d) -> Option<Box3d> {
        let mut low = [0; 3];
        let mut high = [0; 3];
        for d in 0..3 {
            low[d] = self.low[d].max(other.low[d]);
            high[d] = self.high[d].min(other.high[d]);
            if low[d] > high[d] {
                return None;
            }
        }
        Some(Box3d { low, high })
    }

    /// Number of indexes shared with `other`.
    pub fn overlap(&self, other: &Box3d) -> u128 {
        self.collide(other).map_or(0, |shared| shared.volume())
    }

    /// True when `other` lies entirely inside this box.
    pub fn contains(&self, other: &Box3d) -> bool {
        (0..3).all(|d| self.low[d] <= other.low[d] && other.high[d] <= self.high[d])
    }

    /// The box holding the Hermitian-compacted output of a real transform
    /// along `axis`: `size(axis) / 2 + 1` entries starting at `low[axis]`.
    ///
    /// # Errors
    /// * `InvalidAxis` if `axis > 2`.
    pub fn r2c(&self, axis: usize) -> Result<Box3d> {
        check_axis(axis)?;
        let mut high = self.high;
        // never exceeds self.high[axis], so the narrowing is exact
        high[axis] = (i64::from(self.low[axis]) + (self.size(axis) / 2) as i64) as i32;
        Ok(Box3d {
            low: self.low,
            high,
        })
    }
}

impl fmt::Display for Box3d {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({}, {}, {})-({}, {}, {})",
            self.low[0], self.low[1], self.low[2], self.high[0], self.high[1], self.high[2]
        )
    }
}

pub(crate) fn check_axis(axis: usize) -> Result<()> {
    if axis > 2 {
        return Err(PencilFftError::InvalidAxis { axis });
    }
    Ok(())
}

/// Reconstructs the world box from a set of boxes: the low corner is the
/// component-wise minimum of all lows, the high corner the component-wise
/// maximum of all highs.
///
/// This is the left inverse of every decomposition in [`crate::pencils`].
///
/// # Errors
/// * `EmptyBoxSet` if `boxes` is empty.
pub fn find_world(boxes: &[Box3d]) -> Result<Box3d> {
    let (first, rest) = boxes
        .split_first()
        .ok_or_else(|| PencilFftError::EmptyBoxSet("cannot reconstruct a world".to_string()))?;

    let mut world = *first;
    for b in rest {
        for d in 0..3 {
            world.low[d] = world.low[d].min(b.low[d]);
            world.high[d] = world.high[d].max(b.high[d]);
        }
    }
    Ok(world)
}

/// Checks that `boxes` partition `world`: every box lies inside the world,
/// no two boxes overlap and the volumes add up to the world volume.
pub fn world_complete(boxes: &[Box3d], world: &Box3d) -> bool {
    if !boxes.iter().all(|b| world.contains(b)) {
        return false;
    }
    let total: u128 = boxes.iter().map(Box3d::volume).sum();
    if total != world.volume() {
        return false;
    }
    boxes
        .iter()
        .enumerate()
        .all(|(i, a)| boxes[i + 1..].iter().all(|b| a.collide(b).is_none()))
}
