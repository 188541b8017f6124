// src/motion/mod.rs - trajectory planning and step generation

pub mod block;
pub mod controller;
pub mod joint;
pub mod planner;
pub mod segment;
pub mod stepper;

pub use block::Block;
pub use controller::SegmentStepper;
pub use joint::Joint;
pub use planner::Planner;
pub use segment::Segment;
pub use stepper::{Stepper, StepperState};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PlanError {
    #[error("unsolvable profile on axis {axis}: x={x} off by {err} steps")]
    Unsolvable { axis: usize, x: u32, err: f64 },
    #[error("move has {got} displacements, planner has {expected} joints")]
    AxisCountMismatch { got: usize, expected: usize },
}

/// Sign of a value as -1, 0 or 1.
pub fn sign(x: f64) -> i8 {
    if x > 0.0 {
        1
    } else if x < 0.0 {
        -1
    } else {
        0
    }
}

/// Two directions agree if either is zero or both have the same sign.
pub fn same_sign(a: i8, b: i8) -> bool {
    a == 0 || b == 0 || a == b
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_of_values() {
        assert_eq!(sign(10.0), 1);
        assert_eq!(sign(-0.5), -1);
        assert_eq!(sign(0.0), 0);
    }

    #[test]
    fn same_sign_treats_zero_as_wildcard() {
        assert!(same_sign(0, 1));
        assert!(same_sign(-1, 0));
        assert!(same_sign(1, 1));
        assert!(!same_sign(1, -1));
    }
}
