//! Logic plan of a full 3-D transform.
//!
//! Given the boxes every rank owns before and after the transform, the plan
//! lists, for each transform axis in turn, the pencils each rank must hold
//! while the 1-D transforms along that axis run. The communication layer
//! moves data between consecutive shapes; executors are built per stage
//! from the rank's box and the stage axis.

use crate::error::{PencilFftError, Result};
use crate::geometry::{check_axis, find_world, world_complete, Box3d};
use crate::pencils::make_pencils;
use crate::procgrid::make_procgrid;

/// Options steering the construction of a [`LogicPlan`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanOptions {
    /// Hint every stage with the boxes of the previous one, so that each
    /// rank keeps as much of its data as possible between stages.
    pub use_reorder: bool,
    /// Order in which the axes are transformed.
    pub axis_order: [usize; 3],
}

impl Default for PlanOptions {
    fn default() -> Self {
        Self {
            use_reorder: true,
            axis_order: [0, 1, 2],
        }
    }
}

impl PlanOptions {
    /// # Errors
    /// * `InvalidOptions` if `axis_order` is not a permutation of `0, 1, 2`.
    pub fn validate(&self) -> Result<()> {
        let mut seen = [false; 3];
        for &axis in &self.axis_order {
            if axis > 2 || seen[axis] {
                return Err(PencilFftError::InvalidOptions(format!(
                    "axis order {:?} is not a permutation of 0, 1, 2",
                    self.axis_order
                )));
            }
            seen[axis] = true;
        }
        Ok(())
    }
}

/// Pencils held by every rank while transforming along `axis`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogicStage {
    pub axis: usize,
    /// One box per rank, the input of the stage transforms.
    pub boxes: Vec<Box3d>,
    /// True when the stage runs the real-to-complex transform; the output
    /// boxes are then the `r2c` shrinks of `boxes`.
    pub r2c: bool,
}

impl LogicStage {
    /// Boxes holding the output of the stage.
    pub fn output_boxes(&self) -> Result<Vec<Box3d>> {
        if !self.r2c {
            return Ok(self.boxes.clone());
        }
        self.boxes.iter().map(|b| b.r2c(self.axis)).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogicPlan {
    world: Box3d,
    complex_world: Box3d,
    proc_grid: [usize; 2],
    in_boxes: Vec<Box3d>,
    out_boxes: Vec<Box3d>,
    stages: Vec<LogicStage>,
}

impl LogicPlan {
    /// Builds the stages for a transform from `in_boxes` to `out_boxes`.
    ///
    /// With `r2c_axis` set, the first stage runs the real-to-complex
    /// transform along that axis and every later stage, as well as
    /// `out_boxes`, lives in the shrunk complex world.
    ///
    /// # Errors
    /// * `EmptyBoxSet` if there are no input boxes.
    /// * `IncompleteWorld` if either box set fails to partition its world or
    ///   the two sets have a different number of ranks.
    /// * `InvalidOptions` if the options are malformed or the r2c axis is not
    ///   transformed first.
    /// * `InvalidDecomposition` if the world cannot be cut into one pencil
    ///   per rank.
    pub fn new(
        in_boxes: &[Box3d],
        out_boxes: &[Box3d],
        r2c_axis: Option<usize>,
        options: PlanOptions,
    ) -> Result<Self> {
        options.validate()?;
        let world = find_world(in_boxes)?;
        if !world_complete(in_boxes, &world) {
            return Err(PencilFftError::IncompleteWorld(format!(
                "input boxes do not partition {}",
                world
            )));
        }
        if out_boxes.len() != in_boxes.len() {
            return Err(PencilFftError::IncompleteWorld(format!(
                "{} input boxes but {} output boxes",
                in_boxes.len(),
                out_boxes.len()
            )));
        }

        let complex_world = match r2c_axis {
            Some(axis) => {
                check_axis(axis)?;
                if options.axis_order[0] != axis {
                    return Err(PencilFftError::InvalidOptions(format!(
                        "r2c axis {} must be transformed first, axis order is {:?}",
                        axis, options.axis_order
                    )));
                }
                world.r2c(axis)?
            }
            None => world,
        };
        if !world_complete(out_boxes, &complex_world) {
            return Err(PencilFftError::IncompleteWorld(format!(
                "output boxes do not partition {}",
                complex_world
            )));
        }

        let proc_grid = make_procgrid(in_boxes.len())?;
        let mut previous = in_boxes.to_vec();
        let mut stages = Vec::with_capacity(3);
        for (position, &axis) in options.axis_order.iter().enumerate() {
            let r2c = position == 0 && r2c_axis.is_some();
            let stage_world = if position == 0 { world } else { complex_world };
            let hint: &[Box3d] = if options.use_reorder { &previous } else { &[] };
            let boxes = make_pencils(&stage_world, proc_grid, axis, hint)?;
            let stage = LogicStage { axis, boxes, r2c };
            previous = stage.output_boxes()?;
            stages.push(stage);
        }

        tracing::debug!(
            world = %world,
            ranks = in_boxes.len(),
            grid = ?proc_grid,
            r2c = ?r2c_axis,
            "built logic plan"
        );
        Ok(Self {
            world,
            complex_world,
            proc_grid,
            in_boxes: in_boxes.to_vec(),
            out_boxes: out_boxes.to_vec(),
            stages,
        })
    }

    /// The real (or complex, without r2c) input world.
    pub fn world(&self) -> &Box3d {
        &self.world
    }

    /// The world of the transform output, shrunk along the r2c axis.
    pub fn complex_world(&self) -> &Box3d {
        &self.complex_world
    }

    pub fn proc_grid(&self) -> [usize; 2] {
        self.proc_grid
    }

    pub fn in_boxes(&self) -> &[Box3d] {
        &self.in_boxes
    }

    pub fn out_boxes(&self) -> &[Box3d] {
        &self.out_boxes
    }

    pub fn stages(&self) -> &[LogicStage] {
        &self.stages
    }

    /// Factor that turns the un-normalized backward transform of the full
    /// world into the true inverse.
    pub fn normalization(&self) -> f64 {
        1.0 / self.world.volume() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pencils::split_world;

    #[test]
    fn test_options_validation() {
        assert!(PlanOptions::default().validate().is_ok());
        let repeated = PlanOptions {
            axis_order: [0, 0, 2],
            ..PlanOptions::default()
        };
        assert!(matches!(
            repeated.validate(),
            Err(PencilFftError::InvalidOptions(_))
        ));
    }

    #[test]
    fn test_c2c_plan() -> Result<()> {
        let world = Box3d::new([0, 0, 0], [7, 9, 11])?;
        let bricks = split_world(&world, [2, 2, 1])?;
        let plan = LogicPlan::new(&bricks, &bricks, None, PlanOptions::default())?;

        assert_eq!(plan.proc_grid(), [2, 2]);
        assert_eq!(plan.stages().len(), 3);
        for (stage, axis) in plan.stages().iter().zip(0..3) {
            assert_eq!(stage.axis, axis);
            assert!(!stage.r2c);
            assert!(world_complete(&stage.boxes, &world));
            for b in &stage.boxes {
                assert_eq!(b.size(axis), world.size(axis));
            }
        }
        assert_eq!(plan.normalization(), 1.0 / 960.0);
        Ok(())
    }

    #[test]
    fn test_reorder_keeps_local_data() -> Result<()> {
        let world = Box3d::new([0, 0, 0], [7, 7, 7])?;
        let pencils_z = make_pencils(&world, [2, 2], 2, &[])?;
        let plan = LogicPlan::new(
            &pencils_z,
            &pencils_z,
            None,
            PlanOptions {
                use_reorder: true,
                axis_order: [2, 1, 0],
            },
        )?;
        // the ranks already hold z-pencils, nothing moves in the first stage
        assert_eq!(plan.stages()[0].boxes, pencils_z);
        Ok(())
    }

    #[test]
    fn test_r2c_plan() -> Result<()> {
        let world = Box3d::new([0, 0, 0], [9, 5, 3])?;
        let in_boxes = split_world(&world, [1, 2, 2])?;
        let complex_world = world.r2c(0)?;
        let out_boxes = split_world(&complex_world, [1, 2, 2])?;

        let plan = LogicPlan::new(&in_boxes, &out_boxes, Some(0), PlanOptions::default())?;
        assert_eq!(plan.complex_world().sizes(), [6, 6, 4]);

        let first = &plan.stages()[0];
        assert!(first.r2c);
        assert!(world_complete(&first.boxes, &world));
        assert!(world_complete(&first.output_boxes()?, &complex_world));
        for stage in &plan.stages()[1..] {
            assert!(world_complete(&stage.boxes, &complex_world));
        }
        Ok(())
    }

    #[test]
    fn test_r2c_axis_must_come_first() -> Result<()> {
        let world = Box3d::new([0, 0, 0], [3, 3, 3])?;
        let out = vec![world.r2c(1)?];
        assert!(matches!(
            LogicPlan::new(&[world], &out, Some(1), PlanOptions::default()),
            Err(PencilFftError::InvalidOptions(_))
        ));
        Ok(())
    }

    #[test]
    fn test_incomplete_inputs() -> Result<()> {
        let a = Box3d::new([0, 0, 0], [3, 3, 3])?;
        let b = Box3d::new([2, 0, 0], [5, 3, 3])?;
        assert!(matches!(
            LogicPlan::new(&[a, b], &[a, b], None, PlanOptions::default()),
            Err(PencilFftError::IncompleteWorld(_))
        ));
        assert!(matches!(
            LogicPlan::new(&[], &[], None, PlanOptions::default()),
            Err(PencilFftError::EmptyBoxSet(_))
        ));
        Ok(())
    }
}
