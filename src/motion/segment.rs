// src/motion/segment.rs - one move across all axes, sharing a common duration

use crate::motion::block::{Block, BvHint};
use crate::motion::joint::Joint;
use crate::motion::stepper::StepPhase;
use crate::motion::PlanError;

/// Blocks shorter than this are ignored by the convergence metric; their
/// times are noisy at step resolution and errors in them don't matter.
const TIME_ERR_MIN_X: f64 = 100.0;

/// RMS spread of block times below which the segment counts as converged.
const TIME_ERR_CONVERGED: f64 = 1e-3;

const MAX_PLAN_ITERATIONS: usize = 10;

/// One move for all joints. Owns a [`Block`] per joint and assigns them a
/// single common duration so every axis starts and stops together.
#[derive(Debug, Clone)]
pub struct Segment {
    /// Sequence number within the planner.
    pub n: u32,
    /// Shared duration, seconds.
    pub t: f64,
    pub blocks: Vec<Block>,
    /// The signed move that created this segment.
    pub moves: Vec<i32>,
    /// Caller-requested duration, if the move carried one.
    pub(crate) requested_t: Option<f64>,
}

impl Segment {
    pub fn new(n: u32, joints: &[Joint], moves: &[i32]) -> Self {
        let blocks = joints
            .iter()
            .zip(moves)
            .map(|(j, &x)| Block::new(x, *j))
            .collect();

        Self {
            n,
            t: 0.0,
            blocks,
            moves: moves.to_vec(),
            requested_t: None,
        }
    }

    /// Assign a common duration to all blocks and plan them coherently.
    ///
    /// Iterates: pick a candidate duration, plan every block at it, measure
    /// the RMS spread of the achieved times, and relax the boundaries of any
    /// block that fell short. The candidate never drops below twice the
    /// slowest joint's full-range accel time, which keeps short moves from
    /// degenerating into velocity spikes.
    pub fn plan(
        &mut self,
        t: Option<f64>,
        v_0: BvHint,
        v_1: BvHint,
        prior: Option<&Segment>,
        next: Option<&Segment>,
    ) -> Result<(), PlanError> {
        let t = t.or(self.requested_t);

        let lower_bound = 2.0
            * self
                .blocks
                .iter()
                .map(|b| b.joint.max_at)
                .fold(0.0, f64::max);

        let mut converged = false;
        for iter in 0..MAX_PLAN_ITERATIONS {
            let target = match t {
                Some(t) => t,
                None if iter < 2 => self
                    .blocks
                    .iter()
                    .map(Block::min_time)
                    .fold(lower_bound, f64::max),
                None => self.blocks.iter().map(|b| b.t).fold(lower_bound, f64::max),
            };

            // Boundary hints bind on the first pass only; later passes must
            // not resurrect velocities that limit_bv has shed.
            let (h0, h1) = if iter == 0 {
                (v_0, v_1)
            } else {
                (BvHint::Keep, BvHint::Keep)
            };

            for i in 0..self.blocks.len() {
                let pb = prior.map(|s| &s.blocks[i]);
                let nb = next.map(|s| &s.blocks[i]);
                self.blocks[i].plan(Some(target), h0, h1, pb, nb)?;
            }

            if self.time_err_rms() < TIME_ERR_CONVERGED {
                converged = true;
                break;
            }

            for b in &mut self.blocks {
                if target - b.t > TIME_ERR_CONVERGED {
                    b.limit_bv();
                }
            }
        }

        if !converged && self.time_err_rms() >= TIME_ERR_CONVERGED {
            tracing::warn!(
                segment = self.n,
                rms = self.time_err_rms(),
                "segment times failed to converge"
            );
        }

        self.t = self.blocks.iter().map(|b| b.t).fold(0.0, f64::max);
        Ok(())
    }

    /// Shortest duration any block in this segment could accept.
    pub fn min_time(&self) -> f64 {
        self.blocks.iter().map(Block::min_time).fold(0.0, f64::max)
    }

    /// RMS spread of the block times around their mean, ignoring very short
    /// axes.
    pub fn time_err_rms(&self) -> f64 {
        let times: Vec<f64> = self
            .blocks
            .iter()
            .filter(|b| b.x > TIME_ERR_MIN_X)
            .map(|b| (b.t * 1e6).round() / 1e6)
            .collect();

        if times.is_empty() {
            return 0.0;
        }

        let mean = times.iter().sum::<f64>() / times.len() as f64;
        times.iter().map(|t| (t - mean) * (t - mean)).sum::<f64>().sqrt()
    }

    /// RMS mismatch between the prior segment's exit velocities and the next
    /// segment's entry velocities.
    pub fn boundary_error(prior: &Segment, next: &Segment) -> f64 {
        prior
            .blocks
            .iter()
            .zip(&next.blocks)
            .map(|(p, n)| (p.v_1 - n.v_0) * (p.v_1 - n.v_0))
            .sum::<f64>()
            .sqrt()
    }

    pub fn v0(&self) -> Vec<f64> {
        self.blocks.iter().map(|b| b.v_0).collect()
    }

    pub fn v1(&self) -> Vec<f64> {
        self.blocks.iter().map(|b| b.v_1).collect()
    }

    /// Per-axis stepper phases, ready to load into a `StepperState`.
    pub fn stepper_blocks(&self) -> Vec<[StepPhase; 3]> {
        self.blocks.iter().map(Block::stepper_phases).collect()
    }

    pub fn dump(&self, tag: Option<&str>) -> serde_json::Value {
        let blocks: Vec<_> = self.blocks.iter().map(|b| b.dump(None)).collect();
        let mut v = serde_json::json!({
            "_type": "segment",
            "move": self.moves,
            "blocks": blocks,
        });
        if let Some(tag) = tag {
            v["_tag"] = tag.into();
        }
        v
    }
}

impl std::fmt::Display for Segment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:7.4} ", self.t)?;
        for b in &self.blocks {
            write!(f, "{b}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn joints(n: usize) -> Vec<Joint> {
        (0..n).map(|i| Joint::new(i, 5_000.0, 50_000.0)).collect()
    }

    fn check_segment(s: &Segment) {
        for b in &s.blocks {
            if b.x == 0.0 {
                continue;
            }
            assert!((b.area() - b.x).abs() < 2.0, "area mismatch: {b:?}");
            assert!(b.v_c <= b.joint.v_max + 1e-9);
            // Every planned axis spans the common duration.
            assert!(
                (b.t - s.t).abs() < 2e-3,
                "block t {} vs segment t {}",
                b.t,
                s.t
            );
        }
    }

    #[test]
    fn plans_mixed_distances_to_common_time() {
        let j = joints(3);
        let mut s = Segment::new(0, &j, &[1000, 400, 240]);
        s.plan(None, BvHint::Keep, BvHint::Keep, None, None).unwrap();

        assert!(s.t > 0.0);
        assert!(s.time_err_rms() < 1e-3);
        check_segment(&s);

        // Rest-to-rest, so the common duration is the slowest block's
        // minimum time.
        assert!((s.t - s.min_time()).abs() < 1e-3);
    }

    #[test]
    fn plans_with_unit_axis() {
        let j = joints(3);
        let mut s = Segment::new(0, &j, &[1000, 1, 499]);
        s.plan(None, BvHint::Keep, BvHint::Keep, None, None).unwrap();

        assert!(s.time_err_rms() < 1e-3);
        check_segment(&s);

        // The single-step axis crawls across the whole duration.
        assert!(s.blocks[1].v_c < 100.0);
    }

    #[test]
    fn identical_axes_get_identical_blocks() {
        let j = joints(2);
        let mut s = Segment::new(0, &j, &[1000, 1000]);
        s.plan(None, BvHint::Keep, BvHint::Keep, None, None).unwrap();

        let (a, b) = (&s.blocks[0], &s.blocks[1]);
        assert_eq!(a.v_c, b.v_c);
        assert_eq!(a.t, b.t);
        assert_eq!(a.x_c, b.x_c);
        check_segment(&s);
    }

    #[test]
    fn zero_axis_spans_segment_time() {
        let j = joints(2);
        let mut s = Segment::new(0, &j, &[0, 2000]);
        s.plan(None, BvHint::Keep, BvHint::Keep, None, None).unwrap();

        let z = &s.blocks[0];
        assert_eq!(z.v_0, 0.0);
        assert_eq!(z.v_c, 0.0);
        assert_eq!(z.v_1, 0.0);
        assert_eq!(z.x_a + z.x_c + z.x_d, 0.0);
        assert!((z.t_c - z.t).abs() < 1e-12);
        assert!(s.t > 0.0);
    }

    #[test]
    fn duration_floor_binds_short_moves() {
        let j = joints(2);
        let mut s = Segment::new(0, &j, &[10, 10]);
        s.plan(None, BvHint::Keep, BvHint::Keep, None, None).unwrap();

        // 2 * max_at = 0.2 s for these joints.
        assert!(s.t >= 0.2 - 1e-9);
    }

    #[test]
    fn boundary_error_is_rms_over_axes() {
        let j = joints(2);
        let mut a = Segment::new(0, &j, &[1000, 1000]);
        let mut b = Segment::new(1, &j, &[1000, 1000]);
        a.blocks[0].v_1 = 300.0;
        a.blocks[1].v_1 = 400.0;
        b.blocks[0].v_0 = 0.0;
        b.blocks[1].v_0 = 0.0;
        assert_eq!(Segment::boundary_error(&a, &b), 500.0);
        assert_eq!(a.v1(), vec![300.0, 400.0]);
        assert_eq!(b.v0(), vec![0.0, 0.0]);
    }

    #[test]
    fn dump_shape() {
        let j = joints(2);
        let mut s = Segment::new(3, &j, &[100, -100]);
        s.plan(None, BvHint::Keep, BvHint::Keep, None, None).unwrap();
        let d = s.dump(Some("S"));
        assert_eq!(d["_type"], "segment");
        assert_eq!(d["move"][1], -100);
        assert_eq!(d["blocks"].as_array().unwrap().len(), 2);
        assert_eq!(d["_tag"], "S");
    }
}
