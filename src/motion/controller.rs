// src/motion/controller.rs - drives planned segments through the step engines

use crate::motion::planner::Planner;
use crate::motion::stepper::{Stepper, StepperState};

/// Pulls segments off the planner queue and steps them out.
///
/// Owns one [`StepperState`] per joint. When every axis is idle the oldest
/// segment's phases are loaded; a segment is retired only once every axis
/// reports done, so axes stay in lock-step across the move boundary.
#[derive(Debug)]
pub struct SegmentStepper {
    states: Vec<StepperState>,
    active_axes: usize,
    total_ticks: u64,
    time: f64,
}

impl SegmentStepper {
    pub fn new(n_joints: usize) -> Self {
        Self {
            states: (0..n_joints).map(|_| StepperState::new()).collect(),
            active_axes: 0,
            total_ticks: 0,
            time: 0.0,
        }
    }

    /// Advance all axes by one pulse period. Returns the number of axes
    /// still active. An empty queue is benign and reports zero activity.
    pub fn next<S: Stepper>(
        &mut self,
        dt: f64,
        planner: &mut Planner,
        sinks: &mut [S],
    ) -> usize {
        self.time += dt;
        self.total_ticks += 1;

        if self.active_axes == 0 {
            if let Some(seg) = planner.front() {
                tracing::trace!(segment = seg.n, "loading segment into steppers");
                for (state, phases) in self.states.iter_mut().zip(seg.stepper_blocks()) {
                    state.load_phases(phases);
                }
            }
        }

        let mut active = 0;
        for (state, sink) in self.states.iter_mut().zip(sinks.iter_mut()) {
            if state.next(dt, sink) {
                active += 1;
            }
        }
        self.active_axes = active;

        if active == 0 && !planner.is_empty() {
            planner.pop_front();
        }

        active
    }

    /// Run until the planner queue is drained.
    pub fn run<S: Stepper>(&mut self, dt: f64, planner: &mut Planner, sinks: &mut [S]) {
        while !planner.is_empty() {
            self.next(dt, planner, sinks);
        }
    }

    pub fn active_axes(&self) -> usize {
        self.active_axes
    }

    pub fn total_ticks(&self) -> u64 {
        self.total_ticks
    }

    /// Wall-clock time advanced so far, seconds.
    pub fn elapsed(&self) -> f64 {
        self.time
    }
}
