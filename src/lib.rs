// src/lib.rs - pulseplan: trajectory planning and step pulse generation

pub mod config;
pub mod input;
pub mod motion;

pub use config::{load_config, Config, ConfigError, JointConfig};
pub use input::{parse_moves, parse_program, InputError, Program};
pub use motion::block::Block;
pub use motion::controller::SegmentStepper;
pub use motion::joint::Joint;
pub use motion::planner::{Move, MoveType, Planner};
pub use motion::segment::Segment;
pub use motion::stepper::{CountingStepper, NullStepper, StepPhase, Stepper, StepperState};
pub use motion::PlanError;
