// src/input.rs - whitespace-integer text front-end

use std::io::BufRead;

use thiserror::Error;

use crate::motion::joint::Joint;

#[derive(Debug, Error)]
pub enum InputError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("line {line}: {msg}")]
    Malformed { line: usize, msg: String },
    #[error("input ended after {got} of {expected} joint definitions")]
    TruncatedJoints { got: usize, expected: usize },
    #[error("input is empty")]
    Empty,
}

/// A parsed move program: joint limits followed by one move per line.
#[derive(Debug, Clone)]
pub struct Program {
    pub joints: Vec<Joint>,
    pub moves: Vec<Vec<i32>>,
}

/// Pull every integer token out of a line, ignoring anything that isn't one.
fn integer_words(line: &str) -> Vec<i64> {
    line.split_whitespace()
        .filter_map(|w| w.parse().ok())
        .collect()
}

/// Lines starting with `#` or a space are comments; blank lines are skipped.
fn is_comment(line: &str) -> bool {
    line.is_empty() || line.starts_with('#') || line.starts_with(' ')
}

/// Parse a move program.
///
/// The first data line holds the joint count. The next `n_joints` lines hold
/// `v_max a_max` per joint. Every following line is one move: `n_joints`
/// signed step counts.
pub fn parse_program<R: BufRead>(reader: R) -> Result<Program, InputError> {
    let mut joints: Vec<Joint> = Vec::new();
    let mut moves = Vec::new();
    let mut n_joints: Option<usize> = None;

    for (line_n, line) in reader.lines().enumerate() {
        let line = line?;
        if is_comment(&line) {
            continue;
        }
        let ints = integer_words(&line);
        if ints.is_empty() {
            continue;
        }

        let Some(n) = n_joints else {
            let n = ints[0];
            if n <= 0 {
                return Err(InputError::Malformed {
                    line: line_n + 1,
                    msg: format!("joint count must be positive, got {n}"),
                });
            }
            n_joints = Some(n as usize);
            continue;
        };

        if joints.len() < n {
            if ints.len() < 2 {
                return Err(InputError::Malformed {
                    line: line_n + 1,
                    msg: "joint definition needs v_max and a_max".to_string(),
                });
            }
            if ints[0] <= 0 || ints[1] <= 0 {
                return Err(InputError::Malformed {
                    line: line_n + 1,
                    msg: format!("joint limits must be positive, got {} {}", ints[0], ints[1]),
                });
            }
            joints.push(Joint::new(joints.len(), ints[0] as f64, ints[1] as f64));
            continue;
        }

        if ints.len() != n {
            return Err(InputError::Malformed {
                line: line_n + 1,
                msg: format!("move has {} displacements, expected {n}", ints.len()),
            });
        }
        moves.push(ints.iter().map(|&x| x as i32).collect());
    }

    let Some(n) = n_joints else {
        return Err(InputError::Empty);
    };
    if joints.len() < n {
        return Err(InputError::TruncatedJoints {
            got: joints.len(),
            expected: n,
        });
    }

    Ok(Program { joints, moves })
}

/// Parse bare move lines for a machine whose joints are already configured:
/// one move per line, `n_joints` signed step counts each.
pub fn parse_moves<R: BufRead>(reader: R, n_joints: usize) -> Result<Vec<Vec<i32>>, InputError> {
    let mut moves = Vec::new();

    for (line_n, line) in reader.lines().enumerate() {
        let line = line?;
        if is_comment(&line) {
            continue;
        }
        let ints = integer_words(&line);
        if ints.is_empty() {
            continue;
        }
        if ints.len() != n_joints {
            return Err(InputError::Malformed {
                line: line_n + 1,
                msg: format!("move has {} displacements, expected {n_joints}", ints.len()),
            });
        }
        moves.push(ints.iter().map(|&x| x as i32).collect());
    }

    Ok(moves)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn parses_joints_and_moves() {
        let text = "2\n5000 50000\n5000 50000\n1000 1000\n-500 200\n";
        let p = parse_program(Cursor::new(text)).unwrap();
        assert_eq!(p.joints.len(), 2);
        assert_eq!(p.joints[0].v_max, 5_000.0);
        assert_eq!(p.joints[1].a_max, 50_000.0);
        assert_eq!(p.moves, vec![vec![1000, 1000], vec![-500, 200]]);
    }

    #[test]
    fn skips_comments_and_blanks() {
        let text = "# fixture\n1\n\n5000 50000\n# a move\n 100 <- indented comment\n250\n";
        let p = parse_program(Cursor::new(text)).unwrap();
        assert_eq!(p.joints.len(), 1);
        assert_eq!(p.moves, vec![vec![250]]);
    }

    #[test]
    fn rejects_non_positive_joint_limits() {
        let text = "1\n0 50000\n100\n";
        assert!(matches!(
            parse_program(Cursor::new(text)),
            Err(InputError::Malformed { .. })
        ));
        let text = "1\n5000 -1\n100\n";
        assert!(matches!(
            parse_program(Cursor::new(text)),
            Err(InputError::Malformed { .. })
        ));
    }

    #[test]
    fn rejects_short_move_line() {
        let text = "2\n5000 50000\n5000 50000\n100\n";
        assert!(matches!(
            parse_program(Cursor::new(text)),
            Err(InputError::Malformed { .. })
        ));
    }

    #[test]
    fn rejects_truncated_joint_table() {
        let text = "3\n5000 50000\n5000 50000\n";
        assert!(matches!(
            parse_program(Cursor::new(text)),
            Err(InputError::TruncatedJoints {
                got: 2,
                expected: 3
            })
        ));
    }

    #[test]
    fn rejects_empty_input() {
        assert!(matches!(
            parse_program(Cursor::new("")),
            Err(InputError::Empty)
        ));
        assert!(matches!(
            parse_program(Cursor::new("# only comments\n")),
            Err(InputError::Empty)
        ));
    }

    #[test]
    fn parses_bare_moves_for_configured_machine() {
        let text = "# moves only\n100 -200\n300 400\n";
        let moves = parse_moves(Cursor::new(text), 2).unwrap();
        assert_eq!(moves, vec![vec![100, -200], vec![300, 400]]);

        assert!(matches!(
            parse_moves(Cursor::new("1 2 3\n"), 2),
            Err(InputError::Malformed { .. })
        ));
    }

    #[test]
    fn ignores_non_numeric_tokens() {
        let text = "1 joints\n5000 50000 ; x\n42\n";
        let p = parse_program(Cursor::new(text)).unwrap();
        assert_eq!(p.moves, vec![vec![42]]);
    }
}
