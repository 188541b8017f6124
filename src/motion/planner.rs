// src/motion/planner.rs - move queue and boundary look-back replanning

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::motion::block::{bent, mean_bv, BvHint};
use crate::motion::joint::Joint;
use crate::motion::segment::Segment;
use crate::motion::PlanError;

/// Cap on look-back passes per inserted move. In random workloads only a
/// few percent of moves need more than two.
const MAX_LOOKBACK_ITERATIONS: usize = 15;

/// Boundary velocity mismatch (RMS, steps/s) below which two adjacent
/// segments count as consistent.
const BOUNDARY_EPS: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MoveType {
    Relative,
    Absolute,
    Jog,
    Home,
    None,
}

/// A caller-supplied command: signed step counts for every joint.
#[derive(Debug, Clone)]
pub struct Move {
    pub seq: u32,
    pub move_type: MoveType,
    /// Requested duration in microseconds; zero means minimum time.
    pub t: u32,
    pub x: Vec<i32>,
}

impl Move {
    pub fn relative(x: Vec<i32>) -> Self {
        Self {
            seq: 0,
            move_type: MoveType::Relative,
            t: 0,
            x,
        }
    }
}

/// Ordered queue of planned segments.
///
/// Accepting a move appends a segment and runs the look-back loop, which
/// revisits recent segment boundaries until adjacent exit/entry velocities
/// agree. Committed segments further back are never touched again, so the
/// amortized cost per move stays near constant.
#[derive(Debug)]
pub struct Planner {
    joints: Vec<Joint>,
    segments: VecDeque<Segment>,
    position: Vec<i64>,
    seg_num: u32,
}

impl Planner {
    pub fn new(joints: Vec<Joint>) -> Self {
        let joints: Vec<Joint> = joints
            .into_iter()
            .enumerate()
            .map(|(i, mut j)| {
                j.n = i;
                j
            })
            .collect();
        let n = joints.len();

        Self {
            joints,
            segments: VecDeque::new(),
            position: vec![0; n],
            seg_num: 0,
        }
    }

    pub fn joints(&self) -> &[Joint] {
        &self.joints
    }

    /// Queue a move command. Absolute moves are differenced against the
    /// planner position; jogs and homes plan like relative moves.
    pub fn push_move(&mut self, m: &Move) -> Result<(), PlanError> {
        if m.move_type == MoveType::None {
            return Ok(());
        }
        if m.x.len() != self.joints.len() {
            return Err(PlanError::AxisCountMismatch {
                got: m.x.len(),
                expected: self.joints.len(),
            });
        }

        let x: Vec<i32> = match m.move_type {
            MoveType::Absolute => m
                .x
                .iter()
                .zip(&self.position)
                .map(|(&x, &p)| (x as i64 - p) as i32)
                .collect(),
            _ => m.x.clone(),
        };

        let requested_t = if m.t > 0 { Some(m.t as f64 / 1e6) } else { None };
        self.append(x, requested_t)
    }

    /// Queue a relative move.
    pub fn move_by(&mut self, x: &[i32]) -> Result<(), PlanError> {
        if x.len() != self.joints.len() {
            return Err(PlanError::AxisCountMismatch {
                got: x.len(),
                expected: self.joints.len(),
            });
        }
        self.append(x.to_vec(), None)
    }

    fn append(&mut self, x: Vec<i32>, requested_t: Option<f64>) -> Result<(), PlanError> {
        for (p, &dx) in self.position.iter_mut().zip(&x) {
            *p += dx as i64;
        }

        let mut seg = Segment::new(self.seg_num, &self.joints, &x);
        seg.requested_t = requested_t;
        self.seg_num += 1;
        self.segments.push_back(seg);

        self.replan()
    }

    /// The look-back loop: plan the newest boundary, then let any
    /// discontinuity ripple backward a handful of segments.
    ///
    /// At each visited boundary the prior segment is replanned toward the
    /// current one and vice versa; a bent boundary (prior tail and current
    /// head ramping in opposite directions) is snapped to the straight-line
    /// velocity when the change is within the pass's limit. The limit
    /// tightens from `v_max` to `v_max/2` to zero as passes accumulate, so
    /// the window always freezes.
    fn replan(&mut self) -> Result<(), PlanError> {
        let n = self.segments.len();
        if n == 0 {
            return Ok(());
        }
        if n == 1 {
            return self.segments[0].plan(None, BvHint::At(0.0), BvHint::At(0.0), None, None);
        }

        let mut idx = n - 1;
        for iter in 0..MAX_LOOKBACK_ITERATIONS {
            if idx >= n {
                break;
            }

            let segs = self.segments.make_contiguous();
            let (head, tail) = segs.split_at_mut(idx);
            let current = &mut tail[0];
            let (pre, prior_s) = head.split_at_mut(idx - 1);
            let prior = &mut prior_s[0];
            let pre_prior = pre.last();

            prior.plan(
                None,
                BvHint::Keep,
                BvHint::Neighbor,
                pre_prior,
                Some(&*current),
            )?;
            current.plan(None, BvHint::Neighbor, BvHint::Keep, Some(&*prior), None)?;

            let mut bends = 0;
            for i in 0..self.joints.len() {
                if !bent(&prior.blocks[i], &current.blocks[i]) {
                    continue;
                }
                let vm = mean_bv(&prior.blocks[i], &current.blocks[i]);
                let limit = match iter {
                    0 | 1 => self.joints[i].v_max,
                    2 | 3 => self.joints[i].v_max / 2.0,
                    _ => 0.0,
                };
                if (prior.blocks[i].v_1 - vm).abs() <= limit {
                    prior.blocks[i].v_1 = vm;
                    current.blocks[i].v_0 = vm;
                    bends += 1;
                }
            }

            if bends > 0 {
                // Re-solve both sides so the profiles match the snapped
                // boundary even if the window freezes after this pass.
                prior.plan(None, BvHint::Keep, BvHint::Keep, pre_prior, Some(&*current))?;
                current.plan(None, BvHint::Keep, BvHint::Keep, Some(&*prior), None)?;
            }

            let upstream_err = pre_prior
                .map_or(false, |pp| Segment::boundary_error(pp, prior) > BOUNDARY_EPS);

            tracing::debug!(
                iter,
                idx,
                bends,
                upstream_err,
                "look-back pass at segment boundary"
            );

            if bends > 0 || upstream_err {
                if idx > 1 {
                    idx -= 1;
                }
            } else if Segment::boundary_error(prior, current) > BOUNDARY_EPS {
                // Stay on this boundary and reconcile it again.
            } else {
                idx += 1;
            }
        }

        Ok(())
    }

    /// Accumulated signed displacement per joint.
    pub fn position(&self) -> &[i64] {
        &self.position
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Total planned duration of the queued segments, seconds.
    pub fn queue_time(&self) -> f64 {
        self.segments.iter().map(|s| s.t).sum()
    }

    pub fn segment(&self, i: usize) -> Option<&Segment> {
        self.segments.get(i)
    }

    pub fn front(&self) -> Option<&Segment> {
        self.segments.front()
    }

    pub fn pop_front(&mut self) -> Option<Segment> {
        self.segments.pop_front()
    }

    /// Drop every queued segment. The planner position is untouched: the
    /// discarded motion was already accounted for when it was queued.
    pub fn clear(&mut self) {
        tracing::warn!(dropped = self.segments.len(), "clearing segment queue");
        self.segments.clear();
    }

    pub fn dump(&self, tag: Option<&str>) -> serde_json::Value {
        let joints: Vec<_> = self.joints.iter().map(|j| j.dump(None)).collect();
        let segments: Vec<_> = self.segments.iter().map(|s| s.dump(None)).collect();
        let mut v = serde_json::json!({
            "_type": "planner",
            "joints": joints,
            "segments": segments,
        });
        if let Some(tag) = tag {
            v["_tag"] = tag.into();
        }
        v
    }
}

impl std::fmt::Display for Planner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for j in &self.joints {
            writeln!(f, "joint {} v_max {:7.0} a_max {:9.0}", j.n, j.v_max, j.a_max)?;
        }
        for s in &self.segments {
            writeln!(f, "{s}")?;
        }
        Ok(())
    }
}
