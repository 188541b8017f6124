// src/main.rs - CLI front-end over the planner and step generator

use std::io;
use std::process::ExitCode;

use clap::{CommandFactory, Parser};

use pulseplan::motion::stepper::CountingStepper;
use pulseplan::{load_config, parse_moves, parse_program, Planner, SegmentStepper};

/// Plan coordinated stepper moves and generate step pulses.
///
/// Reads a move program from stdin: the first line holds the joint count,
/// the next lines give `v_max a_max` per joint, and every remaining line is
/// one move with a signed step count per joint. Lines starting with `#` or
/// a space are comments. With `--config`, joint limits come from the TOML
/// file instead and stdin carries only move lines.
#[derive(Debug, Parser)]
#[command(name = "pulseplan", version, disable_help_flag = true)]
struct Args {
    /// Plan the moves and print the planned segments
    #[arg(short = 'p', long)]
    planner: bool,

    /// Plan the moves, then run them through the step generator and report
    /// per-axis step totals
    #[arg(short = 's', long)]
    stepper: bool,

    /// Emit JSON instead of text
    #[arg(short = 'j', long)]
    json: bool,

    /// Read joint limits and the pulse period from a TOML file
    #[arg(short = 'c', long, value_name = "FILE")]
    config: Option<String>,

    /// Print help
    #[arg(short = 'h', long)]
    help: bool,
}

/// Default pulse period, seconds. 5 µs keeps a safety factor of 4 over a
/// 50 000 steps/s joint.
const DEFAULT_DT: f64 = 5e-6;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();

    if args.help || (!args.planner && !args.stepper) {
        let _ = Args::command().print_help();
        println!();
        return ExitCode::from(1);
    }

    let (joints, moves, dt) = if let Some(path) = &args.config {
        let config = match load_config(path) {
            Ok(c) => c,
            Err(e) => {
                tracing::error!("failed to load config '{path}': {e}");
                return ExitCode::FAILURE;
            }
        };
        let joints = config.joints();
        match parse_moves(io::stdin().lock(), joints.len()) {
            Ok(moves) => (joints, moves, config.period()),
            Err(e) => {
                tracing::error!("failed to parse moves: {e}");
                return ExitCode::FAILURE;
            }
        }
    } else {
        match parse_program(io::stdin().lock()) {
            Ok(p) => (p.joints, p.moves, DEFAULT_DT),
            Err(e) => {
                tracing::error!("failed to parse input: {e}");
                return ExitCode::FAILURE;
            }
        }
    };

    let mut planner = Planner::new(joints);
    for m in &moves {
        if let Err(e) = planner.move_by(m) {
            tracing::error!("failed to plan move {m:?}: {e}");
            return ExitCode::FAILURE;
        }
    }

    if args.stepper {
        run_stepper(planner, dt, args.json)
    } else {
        if args.json {
            println!("{}", planner.dump(None));
        } else {
            print!("{planner}");
        }
        ExitCode::SUCCESS
    }
}

fn run_stepper(mut planner: Planner, dt: f64, json: bool) -> ExitCode {
    let n = planner.joints().len();
    let planned_time = planner.queue_time();

    let mut stepper = SegmentStepper::new(n);
    let mut sinks = vec![CountingStepper::default(); n];
    stepper.run(dt, &mut planner, &mut sinks);

    if json {
        let counts: Vec<i64> = sinks.iter().map(|s| s.count).collect();
        let pulses: Vec<u64> = sinks.iter().map(|s| s.pulses).collect();
        println!(
            "{}",
            serde_json::json!({
                "_type": "stepper_run",
                "counts": counts,
                "pulses": pulses,
                "ticks": stepper.total_ticks(),
                "elapsed": stepper.elapsed(),
                "planned_time": planned_time,
            })
        );
    } else {
        println!(
            "elapsed {:.6} s over {} ticks (planned {:.6} s)",
            stepper.elapsed(),
            stepper.total_ticks(),
            planned_time
        );
        for (i, s) in sinks.iter().enumerate() {
            println!("axis {i}: {} steps ({} pulses)", s.count, s.pulses);
        }
    }
    ExitCode::SUCCESS
}
