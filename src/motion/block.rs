// src/motion/block.rs - single-axis trapezoidal profile solver

use crate::motion::joint::Joint;
use crate::motion::{same_sign, sign, PlanError};

/// Moves shorter than this are exempt from the 1-step area consistency
/// check; rounding noise dominates them.
const AREA_CHECK_MIN_X: f64 = 25.0;

/// How a boundary velocity should be resolved before planning.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BvHint {
    /// Leave the current value alone.
    Keep,
    /// Inherit from the adjoining block: the prior's `v_1` for `v_0`,
    /// the next's `v_0` for `v_1`.
    Neighbor,
    /// The joint's maximum velocity.
    Max,
    /// An explicit value.
    At(f64),
}

/// The per-axis portion of a segment: distance `x` covered by an
/// accel/cruise/decel velocity trapezoid over the segment's duration.
///
/// `x` is an unsigned step count; the original sign of the move lives in
/// `d`. All velocities are magnitudes.
#[derive(Debug, Clone)]
pub struct Block {
    pub x: f64,
    pub d: i8,
    pub t: f64,

    pub t_a: f64,
    pub t_c: f64,
    pub t_d: f64,

    pub x_a: f64,
    pub x_c: f64,
    pub x_d: f64,

    pub v_0: f64,
    pub v_c: f64,
    pub v_1: f64,

    pub joint: Joint,
}

/// Distance and time to change velocity from `v_i` to `v_f` at the
/// joint's maximum acceleration.
pub fn accel_xt(v_i: f64, v_f: f64, a_max: f64) -> (f64, f64) {
    if v_f == v_i {
        return (0.0, 0.0);
    }
    let a = if v_f < v_i { -a_max } else { a_max };
    let t = (v_f - v_i) / a;
    let x = (v_i + v_f) / 2.0 * t;
    (x, t)
}

/// Combined distance and time for the accel (`v_0`→`v_c`) and decel
/// (`v_c`→`v_1`) phases.
pub fn accel_acd(v_0: f64, v_c: f64, v_1: f64, a_max: f64) -> (f64, f64) {
    let (x_a, t_a) = accel_xt(v_0, v_c, a_max);
    let (x_d, t_d) = accel_xt(v_c, v_1, a_max);
    (x_a + x_d, t_a + t_d)
}

/// Binary search for a root of `f` over `[v_min, v_max]`, starting from
/// `v_guess`. Terminates when the integer-rounded error reaches zero or the
/// bracket narrows below one step/s; returns the last guess when the
/// iteration cap is hit.
pub fn binary_search<F: Fn(f64) -> f64>(
    f: F,
    mut v_min: f64,
    mut v_guess: f64,
    mut v_max: f64,
) -> f64 {
    for _ in 0..20 {
        let err = f(v_guess);

        if err.round() > 0.0 {
            let old = v_guess;
            v_guess = (v_max + v_guess) / 2.0;
            v_min = old;
        } else if err.round() < 0.0 {
            let old = v_guess;
            v_guess = (v_min + v_guess) / 2.0;
            v_max = old;
        } else {
            return v_guess;
        }

        if (v_min - v_max).abs() < 1.0 {
            return v_guess;
        }
    }
    v_guess
}

/// True when the velocity profile is S-shaped at the boundary: the prior
/// block's tail and the current block's head curve in opposing directions,
/// which marks the boundary as worth re-planning.
pub fn bent(prior: &Block, current: &Block) -> bool {
    let pd = prior.d as f64;
    let cd = current.d as f64;

    let s1 = sign(pd * prior.v_c - pd * prior.v_1);
    let s2 = sign(cd * current.v_0 - cd * current.v_c);

    (s1 as i32) * (s2 as i32) < 0
}

/// Velocity where a straight line from the prior cruise to the next cruise
/// crosses the boundary, or their mean when both ramp times are zero.
pub fn mean_bv(prior: &Block, next: &Block) -> f64 {
    let ramp_t = prior.t_d + next.t_a;
    if ramp_t == 0.0 {
        return (next.v_c + prior.v_c) / 2.0;
    }
    let a = (next.v_c - prior.v_c) / ramp_t;
    prior.v_c + a * prior.t_d
}

impl Block {
    pub fn new(x: i32, joint: Joint) -> Self {
        Self {
            x: (x as f64).abs(),
            d: sign(x as f64),
            t: 0.0,
            t_a: 0.0,
            t_c: 0.0,
            t_d: 0.0,
            x_a: 0.0,
            x_c: 0.0,
            x_d: 0.0,
            v_0: 0.0,
            v_c: 0.0,
            v_1: 0.0,
            joint,
        }
    }

    /// Reconcile the boundary velocities with the distance before solving.
    ///
    /// Hints are resolved first, then a direction reversal (or a zero-length
    /// neighbor) forces `v_0` to zero, then both ends are clipped so the
    /// block can actually cover `x` without exceeding `a_max`, and finally
    /// both are capped at `v_max`.
    pub fn set_bv(
        &mut self,
        v_0: BvHint,
        v_1: BvHint,
        prior: Option<&Block>,
        next: Option<&Block>,
    ) {
        match v_0 {
            BvHint::Keep => {}
            BvHint::Neighbor => {
                if let Some(p) = prior {
                    self.v_0 = p.v_1;
                }
            }
            BvHint::Max => self.v_0 = self.joint.v_max,
            BvHint::At(v) => self.v_0 = v,
        }
        match v_1 {
            BvHint::Keep => {}
            BvHint::Neighbor => {
                if let Some(n) = next {
                    self.v_1 = n.v_0;
                }
            }
            BvHint::Max => self.v_1 = self.joint.v_max,
            BvHint::At(v) => self.v_1 = v,
        }

        if let Some(p) = prior {
            if !same_sign(p.d, self.d) || p.x == 0.0 || self.x == 0.0 {
                self.v_0 = 0.0;
            }
        }

        let a = self.joint.a_max;
        let (x_stop, _) = accel_xt(self.v_0, 0.0, a);
        let x_rem = self.x - x_stop;

        if x_rem < 0.0 {
            // Too fast to stop within x: shed entry velocity, end at rest.
            self.v_0 = self.v_0.min((2.0 * a * self.x).sqrt()).floor();
            self.v_1 = 0.0;
        } else if self.x == 0.0 {
            self.v_0 = 0.0;
            self.v_1 = 0.0;
        } else {
            self.v_1 = self.v_1.min((2.0 * a * x_rem).sqrt()).floor();
        }

        self.v_0 = self.v_0.min(self.joint.v_max);
        self.v_1 = self.v_1.min(self.joint.v_max);
    }

    /// Shortest reasonable time to cover `x` with the current boundary
    /// velocities. Applies the one-third rule: the cruise gets at least half
    /// the combined ramp time, so no phase degenerates into a spike.
    pub fn min_time(&self) -> f64 {
        let j = &self.joint;

        let v_c = if self.x == 0.0 {
            0.0
        } else if self.x < 2.0 * j.small_x {
            // Triangular profile: the sympy solution of x_c(v_c) = 0.
            (4.0 * j.a_max * self.x + 2.0 * self.v_0 * self.v_0 + 2.0 * self.v_1 * self.v_1)
                .sqrt()
                / 2.0
        } else {
            j.v_max
        };

        let (x_ad, t_ad) = accel_acd(self.v_0, v_c, self.v_1, j.a_max);
        let t_c = if v_c != 0.0 { (self.x - x_ad) / v_c } else { 0.0 };
        let t_c = t_c.max(t_ad / 2.0);

        t_c + t_ad
    }

    /// Find the cruise velocity whose trapezoid covers `x` in time `t`.
    ///
    /// With `t` unset the block's own minimum time is used. If the solved
    /// profile cannot cover `x` within one step (on a move worth checking),
    /// boundaries are relaxed in order: drop `v_1`, drop `v_0`, let `t`
    /// expand to the pure ramp time. A block that still cannot be made
    /// consistent is reported as unsolvable.
    pub fn plan(
        &mut self,
        t: Option<f64>,
        v_0: BvHint,
        v_1: BvHint,
        prior: Option<&Block>,
        next: Option<&Block>,
    ) -> Result<(), PlanError> {
        let mut t = t.unwrap_or_else(|| self.min_time());

        self.set_bv(v_0, v_1, prior, next);

        if self.x == 0.0 || t == 0.0 {
            self.zero();
            self.t_c = t;
            self.t = t;
            return Ok(());
        }

        let mut relax = 0;
        loop {
            self.solve(t);

            if self.is_consistent() {
                return Ok(());
            }

            if relax < 1 && self.v_1 > 0.0 {
                tracing::debug!(x = self.x, "relaxing v_1 to solve profile");
                self.v_1 = 0.0;
                relax = 1;
                continue;
            }
            if relax < 2 && self.v_0 > 0.0 {
                tracing::debug!(x = self.x, "relaxing v_0 to solve profile");
                self.v_0 = 0.0;
                relax = 2;
                continue;
            }
            if relax < 3 {
                t = self.t_a + self.t_d;
                relax = 3;
                continue;
            }

            return Err(PlanError::Unsolvable {
                axis: self.joint.n,
                x: self.x as u32,
                err: self.area() - self.x,
            });
        }
    }

    /// One solver pass at a fixed duration.
    fn solve(&mut self, t: f64) {
        let j = self.joint;
        let (x, v_0, v_1) = (self.x, self.v_0, self.v_1);

        let err = move |v_c: f64| {
            let (x_ad, t_ad) = accel_acd(v_0, v_c, v_1, j.a_max);
            let t_c = (t - t_ad).max(0.0);
            let x_c = v_c.max(0.0) * t_c;
            x - (x_ad + x_c)
        };

        let v_c = binary_search(err, 0.0, x / t, j.v_max);
        self.v_c = v_c.min(j.v_max);

        let (x_a, _) = accel_xt(self.v_0, self.v_c, j.a_max);
        let (x_d, _) = accel_xt(self.v_c, self.v_1, j.a_max);
        self.x_a = x_a;
        self.x_d = x_d;
        self.x_c = self.x - (x_a + x_d);

        self.t_a = ((self.v_c - self.v_0) / j.a_max).abs();
        self.t_d = ((self.v_c - self.v_1) / j.a_max).abs();

        if self.x_c.round() == 0.0 && self.x_c < 0.0 {
            self.x_c = 0.0;
        }

        self.t_c = if self.v_c != 0.0 {
            (self.x_c / self.v_c).abs()
        } else {
            0.0
        };

        self.t = self.t_a + self.t_c + self.t_d;
    }

    fn is_consistent(&self) -> bool {
        if self.x_c < 0.0 {
            return false;
        }
        if self.x > AREA_CHECK_MIN_X && (self.area() - self.x).round().abs() > 1.0 {
            return false;
        }
        true
    }

    /// Distance covered by the profile as the area under the velocity curve.
    /// Ought to always match `x` after a successful plan.
    pub fn area(&self) -> f64 {
        let (x_ad, t_ad) = accel_acd(self.v_0, self.v_c, self.v_1, self.joint.a_max);
        // Round off float dust so a t_c of -1e-12 doesn't go negative.
        let t_c = ((self.t - t_ad) * 1e8).round() / 1e8;
        x_ad + self.v_c * t_c.max(0.0)
    }

    /// Halve one boundary velocity to widen the feasible set for the next
    /// replan pass. Works down from whichever end is still above half of
    /// `v_max`, then from whichever is still above 1.
    pub fn limit_bv(&mut self) {
        let half = self.joint.v_max / 2.0;

        if self.v_1 > half {
            self.v_1 = (self.v_1 / 2.0).floor();
            return;
        }
        if self.v_0 > half {
            self.v_0 = (self.v_0 / 2.0).floor();
            return;
        }
        if self.v_1 > 1.0 {
            self.v_1 = (self.v_1 / 2.0).floor();
            return;
        }
        if self.v_0 > 1.0 {
            self.v_0 = (self.v_0 / 2.0).floor();
        }
    }

    pub fn zero(&mut self) {
        self.x_a = 0.0;
        self.x_c = 0.0;
        self.x_d = 0.0;
        self.t_a = 0.0;
        self.t_c = 0.0;
        self.t_d = 0.0;
        self.v_0 = 0.0;
        self.v_c = 0.0;
        self.v_1 = 0.0;
        self.t = 0.0;
    }

    /// The three signed stepper phases (x, vi, vf) for this block. Distances
    /// are integer steps; the cruise phase absorbs the rounding remainder so
    /// the three phases sum to exactly `d·x`.
    pub fn stepper_phases(&self) -> [crate::motion::stepper::StepPhase; 3] {
        use crate::motion::stepper::StepPhase;

        let d = self.d as f64;
        let x = self.x.round() as i32;
        let mut x_a = self.x_a.round() as i32;
        let mut x_d = self.x_d.round() as i32;
        let mut x_c = x - x_a - x_d;
        if x_c < 0 {
            // Rounding pushed the ramps past x; take the remainder back.
            if x_a >= -x_c {
                x_a += x_c;
            } else {
                x_d += x_c;
            }
            x_c = 0;
        }

        let di = self.d as i32;
        [
            StepPhase {
                x: di * x_a,
                vi: d * self.v_0,
                vf: d * self.v_c,
            },
            StepPhase {
                x: di * x_c,
                vi: d * self.v_c,
                vf: d * self.v_c,
            },
            StepPhase {
                x: di * x_d,
                vi: d * self.v_c,
                vf: d * self.v_1,
            },
        ]
    }

    pub fn dump(&self, tag: Option<&str>) -> serde_json::Value {
        let mut v = serde_json::json!({
            "_type": "block",
            "x": self.x,
            "d": self.d,
            "t": self.t,
            "t_a": self.t_a,
            "t_c": self.t_c,
            "t_d": self.t_d,
            "x_a": self.x_a,
            "x_c": self.x_c,
            "x_d": self.x_d,
            "v_0": self.v_0,
            "v_c": self.v_c,
            "v_1": self.v_1,
        });
        if let Some(tag) = tag {
            v["_tag"] = tag.into();
        }
        v
    }
}

impl std::fmt::Display for Block {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let d = self.d as f64;
        write!(
            f,
            "[{:5.0} {:6.0} {:5.0}\u{2197}{:<6.0} {:6.0} {:5.0}\u{2198}{:<6.0} {:5.0} {:5.0}]",
            self.v_0,
            d * self.x_a,
            self.t_a * 1000.0,
            self.v_c,
            d * self.x_c,
            self.t_c * 1000.0,
            d * self.x_d,
            self.t_d * 1000.0,
            self.v_1,
        )
    }
}
