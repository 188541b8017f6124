// src/motion/stepper.rs - per-axis step interval engine and output sinks

use crate::motion::sign;

/// One phase of a block's profile, signed: `x` carries the direction.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StepPhase {
    pub x: i32,
    pub vi: f64,
    pub vf: f64,
}

/// Abstract step output. Production implementations drive step/direction
/// pins; test implementations count pulses.
///
/// `set_direction` latches the direction for the whole phase; `write_step`
/// asserts a step pulse and `clear_step` finishes the previous one.
pub trait Stepper {
    fn write_step(&mut self);
    fn clear_step(&mut self);
    fn set_direction(&mut self, direction: i8);
}

impl<T: Stepper + ?Sized> Stepper for Box<T> {
    fn write_step(&mut self) {
        (**self).write_step()
    }
    fn clear_step(&mut self) {
        (**self).clear_step()
    }
    fn set_direction(&mut self, direction: i8) {
        (**self).set_direction(direction)
    }
}

/// Test sink: accumulates the signed step count and the raw pulse count.
#[derive(Debug, Default, Clone)]
pub struct CountingStepper {
    direction: i8,
    /// Net signed position, steps.
    pub count: i64,
    /// Total number of step pulses, regardless of direction.
    pub pulses: u64,
    /// Level of the step line after the last tick.
    pub step_state: bool,
}

impl Stepper for CountingStepper {
    fn write_step(&mut self) {
        self.count += self.direction as i64;
        self.pulses += 1;
        self.step_state = true;
    }

    fn clear_step(&mut self) {
        self.step_state = false;
    }

    fn set_direction(&mut self, direction: i8) {
        self.direction = direction;
    }
}

/// Sink that drops everything; useful for timing runs.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullStepper;

impl Stepper for NullStepper {
    fn write_step(&mut self) {}
    fn clear_step(&mut self) {}
    fn set_direction(&mut self, _direction: i8) {}
}

/// Online step-interval engine for one axis.
///
/// Consumes up to three phases `(x, vi, vf)` and, per fixed-period tick,
/// decides whether to assert a step. Instead of precomputing pulse times it
/// integrates `1/v`: `delay` is the current inter-step interval and
/// `delay_counter` accumulates elapsed time, carrying the fractional
/// remainder across steps so timing error self-corrects.
///
/// The pulse period must satisfy `dt < 1/v_max`; at most one step is
/// emitted per tick.
#[derive(Debug, Clone, Default)]
pub struct StepperState {
    phases: [StepPhase; 3],
    phase_n: usize,

    steps_left: i32,
    direction: i8,

    t: f64,
    t_f: f64,
    phase_t: f64,
    delay: f64,
    delay_counter: f64,

    a: f64,
    vi: f64,

    done: bool,
}

impl StepperState {
    pub fn new() -> Self {
        Self {
            done: true,
            ..Self::default()
        }
    }

    /// Queue a block's three phases. The first tick after loading starts
    /// phase A.
    pub fn load_phases(&mut self, phases: [StepPhase; 3]) {
        self.phases = phases;
        self.phase_n = 0;
        self.steps_left = 0;
        self.done = false;
    }

    fn next_phase(&mut self, dt: f64, sink: &mut dyn Stepper) {
        let p = self.phases[self.phase_n];

        self.direction = sign(p.x as f64);
        self.steps_left = p.x.abs();
        self.vi = p.vi;

        self.t_f = if p.vi + p.vf != 0.0 {
            (2.0 * self.steps_left as f64 / (p.vi + p.vf)).abs()
        } else {
            0.0
        };
        self.a = if self.t_f != 0.0 {
            (p.vf - p.vi) / self.t_f
        } else {
            0.0
        };

        self.phase_t = 0.0;

        // Slow start: base the first delay on the velocity one tick in, so a
        // phase that begins near rest doesn't fire a step immediately.
        let v = self.a * dt + p.vi;
        self.delay = if v != 0.0 { (1.0 / v).abs() } else { 0.0 };
        self.delay_counter += dt;

        self.phase_n += 1;
        sink.set_direction(self.direction);
    }

    /// Advance one pulse period. Returns false once all phases are spent.
    pub fn next(&mut self, dt: f64, sink: &mut dyn Stepper) -> bool {
        if self.steps_left <= 0 {
            if self.done || self.phase_n >= self.phases.len() {
                self.done = true;
                return false;
            }
            self.next_phase(dt, sink);
        }

        if self.steps_left > 0 && self.delay_counter >= self.delay {
            self.delay_counter -= self.delay;
            self.steps_left -= 1;
            sink.write_step();
        } else {
            sink.clear_step();
        }

        let v = self.vi + self.a * self.phase_t;
        self.delay = if v != 0.0 { (1.0 / v).abs() } else { 1.0 };

        self.delay_counter += dt;
        self.t += dt;
        self.phase_t += dt;

        true
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Total time advanced since construction, seconds.
    pub fn elapsed(&self) -> f64 {
        self.t
    }
}
