// src/motion/joint.rs - static per-axis motion limits

use serde::{Deserialize, Serialize};

/// Static limits for one mechanical axis: one motor, one degree of freedom.
///
/// Velocities are in steps/s, accelerations in steps/s². Both must be
/// positive; `crate::config` rejects anything else before a `Joint` is built.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Joint {
    /// Axis index within the planner.
    pub n: usize,
    /// Maximum velocity, steps/s.
    pub v_max: f64,
    /// Maximum acceleration, steps/s².
    pub a_max: f64,
    /// Distance below which a triangular profile cannot reach `v_max`.
    pub small_x: f64,
    /// Time to accelerate from rest to `v_max`.
    pub max_at: f64,
}

impl Joint {
    pub fn new(n: usize, v_max: f64, a_max: f64) -> Self {
        Self {
            n,
            v_max,
            a_max,
            small_x: (v_max * v_max) / (2.0 * a_max),
            max_at: v_max / a_max,
        }
    }

    pub fn dump(&self, tag: Option<&str>) -> serde_json::Value {
        let mut v = serde_json::json!({
            "_type": "joint",
            "n": self.n,
            "v_max": self.v_max,
            "a_max": self.a_max,
        });
        if let Some(tag) = tag {
            v["_tag"] = tag.into();
        }
        v
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_limits() {
        let j = Joint::new(0, 5_000.0, 50_000.0);
        assert_eq!(j.small_x, 250.0);
        assert_eq!(j.max_at, 0.1);
    }

    #[test]
    fn dump_shape() {
        let j = Joint::new(2, 100.0, 1_000.0);
        let d = j.dump(Some("J"));
        assert_eq!(d["_type"], "joint");
        assert_eq!(d["n"], 2);
        assert_eq!(d["_tag"], "J");
    }
}
