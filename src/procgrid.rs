//! Process-grid sizing.
//!
//! A pencil decomposition tiles the two dimensions orthogonal to the pencil
//! axis with a `p0 x p1` grid of processes. For a fixed process count the
//! communication surface of that tiling is bounded by the grid perimeter, so
//! [`make_procgrid`] picks the divisor pair with the smallest `p0 + p1`.

use crate::error::{PencilFftError, Result};
use crate::geometry::Box3d;

/// All divisor pairs `[a, n / a]` of `n` with `1 <= a < n`, in strictly
/// increasing order of `a`.
///
/// Both orientations of a pair show up (`[5, 187]` and `[187, 5]`), only the
/// trivial `[n, 1]` is left out.
pub fn factor_pairs(n: usize) -> Vec<[usize; 2]> {
    (1..n).filter(|a| n % a == 0).map(|a| [a, n / a]).collect()
}

/// The 2-D process grid `[p0, p1]` with `p0 * p1 == n` minimizing `p0 + p1`,
/// ties going to the smaller `p0`.
///
/// # Errors
/// * `InvalidProcessCount` if `n == 0`.
pub fn make_procgrid(n: usize) -> Result<[usize; 2]> {
    if n == 0 {
        return Err(PencilFftError::InvalidProcessCount(n));
    }
    let mut best = [1, n];
    for candidate in factor_pairs(n) {
        if candidate[0] + candidate[1] < best[0] + best[1] {
            best = candidate;
        }
    }
    Ok(best)
}

/// The 3-D process grid for a brick decomposition of `world` that minimizes
/// the surface `b0*b1 + b1*b2 + b0*b2` of the average brick, where
/// `b[d] = size(d) / p[d]`. The surface is evaluated exactly in `u128`, so
/// worlds spanning the whole `i32` range are handled too.
///
/// Only grids that give every process a non-empty brick are considered; the
/// first minimum in the enumeration order (`p0` then `p1` increasing) wins.
///
/// # Errors
/// * `InvalidProcessCount` if `n == 0`.
/// * `InvalidDecomposition` if no grid with `n` processes fits the world.
pub fn proc_setup_min_surface(world: &Box3d, n: usize) -> Result<[usize; 3]> {
    if n == 0 {
        return Err(PencilFftError::InvalidProcessCount(n));
    }
    let sizes = world.sizes();
    let surface = |grid: [usize; 3]| {
        let b = [0, 1, 2].map(|d| (sizes[d] / grid[d]) as u128);
        b[0] * b[1] + b[1] * b[2] + b[0] * b[2]
    };

    let mut best: Option<([usize; 3], u128)> = None;
    for p0 in (1..=n).filter(|p| n % p == 0) {
        let rest = n / p0;
        for p1 in (1..=rest).filter(|p| rest % p == 0) {
            let grid = [p0, p1, rest / p1];
            if (0..3).any(|d| grid[d] > sizes[d]) {
                continue;
            }
            let s = surface(grid);
            if best.map_or(true, |(_, best_surface)| s < best_surface) {
                best = Some((grid, s));
            }
        }
    }

    best.map(|(grid, _)| grid)
        .ok_or_else(|| PencilFftError::InvalidDecomposition {
            world: *world,
            grid: vec![n],
            reason: "no process grid gives every process a non-empty brick".to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_factor_pairs() {
        let reference = vec![[1, 935], [5, 187], [11, 85], [17, 55], [55, 17], [85, 11], [187, 5]];
        assert_eq!(factor_pairs(935), reference);

        assert_eq!(factor_pairs(27), vec![[1, 27], [3, 9], [9, 3]]);
        assert!(factor_pairs(1).is_empty());
    }

    #[test]
    fn test_make_procgrid() -> Result<()> {
        assert_eq!(make_procgrid(20)?, [4, 5]);
        assert_eq!(make_procgrid(17)?, [1, 17]);
        assert_eq!(make_procgrid(6561)?, [81, 81]);
        assert_eq!(make_procgrid(323)?, [17, 19]);
        assert_eq!(make_procgrid(128)?, [8, 16]);
        assert_eq!(make_procgrid(1)?, [1, 1]);
        Ok(())
    }

    #[test]
    fn test_make_procgrid_zero() {
        assert!(matches!(
            make_procgrid(0),
            Err(PencilFftError::InvalidProcessCount(0))
        ));
    }

    #[test]
    fn test_min_surface_grid() -> Result<()> {
        let cube = Box3d::new([0, 0, 0], [63, 63, 63])?;
        assert_eq!(proc_setup_min_surface(&cube, 8)?, [2, 2, 2]);
        assert_eq!(proc_setup_min_surface(&cube, 1)?, [1, 1, 1]);

        // a flat world is never split along its thin dimension
        let flat = Box3d::new([0, 0, 0], [127, 127, 0])?;
        let grid = proc_setup_min_surface(&flat, 4)?;
        assert_eq!(grid[2], 1);
        assert_eq!(grid[0] * grid[1], 4);
        Ok(())
    }

    #[test]
    fn test_min_surface_grid_of_full_range_world() -> Result<()> {
        let full = Box3d::new([i32::MIN; 3], [i32::MAX; 3])?;
        assert_eq!(proc_setup_min_surface(&full, 1)?, [1, 1, 1]);
        assert_eq!(proc_setup_min_surface(&full, 8)?, [2, 2, 2]);
        Ok(())
    }

    #[test]
    fn test_min_surface_grid_too_many_processes() -> Result<()> {
        let tiny = Box3d::new([0, 0, 0], [1, 1, 1])?;
        assert!(matches!(
            proc_setup_min_surface(&tiny, 9),
            Err(PencilFftError::InvalidDecomposition { .. })
        ));
        Ok(())
    }

    proptest! {
        #[test]
        fn test_factor_pairs_are_divisors(n in 1usize..5000) {
            let pairs = factor_pairs(n);
            for pair in &pairs {
                prop_assert_eq!(pair[0] * pair[1], n);
            }
            for window in pairs.windows(2) {
                prop_assert!(window[0][0] < window[1][0]);
            }
            let divisors = (1..n).filter(|a| n % a == 0).count();
            prop_assert_eq!(pairs.len(), divisors);
        }

        #[test]
        fn test_procgrid_minimizes_perimeter(n in 1usize..5000) {
            let grid = make_procgrid(n).unwrap();
            prop_assert_eq!(grid[0] * grid[1], n);
            let brute = (1..=n)
                .filter(|a| n % a == 0)
                .map(|a| a + n / a)
                .min()
                .unwrap();
            prop_assert_eq!(grid[0] + grid[1], brute);
            prop_assert!(grid[0] <= grid[1]);
        }
    }
}
