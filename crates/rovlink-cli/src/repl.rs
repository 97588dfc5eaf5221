//! Teleoperation prompt for controller mode.
//!
//! Commands:
//!   move <dir> [secs]    – drive forward/backward/left/right (default 2 s)
//!   stop                 – stop immediately
//!   say <file>           – send an audio clip to the speaker
//!   face <shape> [secs]  – play a short mouth animation (a e i o u m f closed)
//!   status               – list known actuator sessions
//!   use <id>             – pick the actuator that receives commands
//!   help                 – show this list
//!   quit | exit          – shut the controller down

use std::path::PathBuf;
use std::sync::Arc;

use colored::Colorize;
use rovlink_controller::RobotController;
use rovlink_types::{
    DEFAULT_MOVE_DURATION_SECS, Direction, EyeState, Keyframe, MouthShape, RovError,
};
use rustyline::error::ReadlineError;
use tokio::sync::watch;

const DEFAULT_FACE_SECS: f64 = 1.0;

#[derive(Debug, Clone, PartialEq)]
pub enum TeleopCommand {
    Move { direction: Direction, secs: f64 },
    Stop,
    Say { path: PathBuf },
    Face { shape: MouthShape, secs: f64 },
    Status,
    Use { actuator_id: String },
    Help,
    Quit,
}

/// Parse one prompt line.  The error is a message for the operator.
pub fn parse(line: &str) -> Result<TeleopCommand, String> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Err("empty command".to_string());
    };
    let args: Vec<&str> = words.collect();

    let cmd = match (verb.to_ascii_lowercase().as_str(), args.as_slice()) {
        ("move" | "m", [dir]) => TeleopCommand::Move {
            direction: parse_direction(dir)?,
            secs: DEFAULT_MOVE_DURATION_SECS,
        },
        ("move" | "m", [dir, secs]) => TeleopCommand::Move {
            direction: parse_direction(dir)?,
            secs: parse_secs(secs)?,
        },
        ("stop" | "s", []) => TeleopCommand::Stop,
        ("say", [path]) => TeleopCommand::Say {
            path: PathBuf::from(path),
        },
        ("face", [shape]) => TeleopCommand::Face {
            shape: parse_mouth(shape)?,
            secs: DEFAULT_FACE_SECS,
        },
        ("face", [shape, secs]) => TeleopCommand::Face {
            shape: parse_mouth(shape)?,
            secs: parse_secs(secs)?,
        },
        ("status", []) => TeleopCommand::Status,
        ("use", [id]) => TeleopCommand::Use {
            actuator_id: id.to_string(),
        },
        ("help" | "?", []) => TeleopCommand::Help,
        ("quit" | "exit", []) => TeleopCommand::Quit,
        ("move" | "m" | "stop" | "s" | "say" | "face" | "status" | "use" | "help" | "?"
        | "quit" | "exit", _) => return Err(format!("wrong arguments for '{verb}'; try 'help'")),
        _ => return Err(format!("unknown command '{verb}'; try 'help'")),
    };
    Ok(cmd)
}

fn parse_direction(word: &str) -> Result<Direction, String> {
    word.parse().map_err(|e: RovError| e.to_string())
}

fn parse_secs(word: &str) -> Result<f64, String> {
    match word.parse::<f64>() {
        Ok(secs) if secs.is_finite() && secs > 0.0 => Ok(secs),
        _ => Err(format!("'{word}' is not a positive number of seconds")),
    }
}

fn parse_mouth(word: &str) -> Result<MouthShape, String> {
    Ok(match word.to_ascii_lowercase().as_str() {
        "a" => MouthShape::A,
        "e" => MouthShape::E,
        "i" => MouthShape::I,
        "o" => MouthShape::O,
        "u" => MouthShape::U,
        "m" => MouthShape::M,
        "f" => MouthShape::F,
        "closed" | "x" => MouthShape::Closed,
        other => return Err(format!("unknown mouth shape '{other}'")),
    })
}

/// Open on `shape`, blink at the midpoint, close at the end.
pub fn face_keyframes(shape: MouthShape, secs: f64) -> Vec<Keyframe> {
    let secs = secs as f32;
    vec![
        Keyframe {
            time: 0.0,
            mouth_shape: shape,
            eye_state: EyeState::Open,
        },
        Keyframe {
            time: secs / 2.0,
            mouth_shape: shape,
            eye_state: EyeState::Half,
        },
        Keyframe {
            time: secs,
            mouth_shape: MouthShape::Closed,
            eye_state: EyeState::Open,
        },
    ]
}

/// Run the prompt on the current (blocking) thread until the operator quits
/// or `shutdown` fires.  Leaving the prompt always triggers shutdown.
pub fn run(controller: RobotController, mut target: String, shutdown: Arc<watch::Sender<bool>>) {
    let config = rustyline::Config::builder().auto_add_history(true).build();
    let mut rl = match rustyline::DefaultEditor::with_config(config) {
        Ok(editor) => editor,
        Err(e) => {
            tracing::error!(error = %e, "failed to create line editor; prompt disabled");
            return;
        }
    };

    println!("  Type {} for a list of commands.\n", "help".bold().cyan());

    loop {
        if *shutdown.borrow() {
            break;
        }
        let prompt = format!("{}> ", target);
        let line = match rl.readline(&prompt) {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(e) => {
                tracing::error!(error = %e, "readline error");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        match parse(&line) {
            Ok(TeleopCommand::Quit) => break,
            Ok(TeleopCommand::Help) => print_help(),
            Ok(TeleopCommand::Use { actuator_id }) => {
                println!("  commands now go to {}", actuator_id.bold());
                target = actuator_id;
            }
            Ok(TeleopCommand::Status) => print_status(&controller),
            Ok(cmd) => report(execute(&controller, &target, cmd)),
            Err(msg) => println!("  {}", msg.red()),
        }
    }

    println!("{}", "Goodbye.".green());
    shutdown.send_replace(true);
}

/// Send a command-bearing teleop action to `target`.
fn execute(controller: &RobotController, target: &str, cmd: TeleopCommand) -> Result<(), RovError> {
    match cmd {
        TeleopCommand::Move { direction, secs } => controller.send_movement(target, direction, secs),
        TeleopCommand::Stop => controller.send_stop(target),
        TeleopCommand::Say { path } => {
            let audio = std::fs::read(&path).map_err(|e| {
                RovError::InvalidCommand(format!("cannot read {}: {e}", path.display()))
            })?;
            controller.send_speech(target, audio)
        }
        TeleopCommand::Face { shape, secs } => {
            controller.send_face_animation(target, face_keyframes(shape, secs), secs)
        }
        TeleopCommand::Status | TeleopCommand::Use { .. } | TeleopCommand::Help | TeleopCommand::Quit => {
            Ok(())
        }
    }
}

fn report(result: Result<(), RovError>) {
    match result {
        Ok(()) => println!("  {}", "sent".green()),
        Err(e) => println!("  {}: {e}", "failed".red()),
    }
}

fn print_status(controller: &RobotController) {
    let sessions = controller.sessions();
    if sessions.is_empty() {
        println!("  {}", "no actuator has connected yet".dimmed());
        return;
    }
    for s in sessions {
        let state = if s.connected {
            "connected".green()
        } else {
            "disconnected".yellow()
        };
        println!(
            "  {:<16} {:<12} last seen {}",
            s.actuator_id.bold(),
            state,
            s.last_seen_at.format("%H:%M:%S")
        );
    }
}

fn print_help() {
    println!();
    println!("  {}", "Teleop commands".bold().underline());
    println!("  {}  drive forward/backward/left/right", "move <dir> [secs]  ".cyan());
    println!("  {}  stop immediately", "stop               ".cyan());
    println!("  {}  play an audio file on the speaker", "say <file>         ".cyan());
    println!("  {}  mouth animation (a e i o u m f closed)", "face <shape> [secs]".cyan());
    println!("  {}  list actuator sessions", "status             ".cyan());
    println!("  {}  choose the target actuator", "use <id>           ".cyan());
    println!("  {}  leave and shut down", "quit               ".cyan());
    println!();
}
