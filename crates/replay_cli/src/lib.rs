use std::io::Write;
use std::time::{Duration, Instant};

use engine::{ActionKind, Coord, GameSession, SessionSettings, Vec2};

pub const DEFAULT_STEP_MS: u64 = 50;
pub const DEFAULT_VIEWPORT_PX: u32 = 800;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayOptions {
    pub viewer: Option<String>,
    /// Simulated time between consecutive script commands.
    pub step_ms: u64,
    pub viewport_px: u32,
}

impl Default for ReplayOptions {
    fn default() -> Self {
        Self {
            viewer: None,
            step_ms: DEFAULT_STEP_MS,
            viewport_px: DEFAULT_VIEWPORT_PX,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptCommand {
    /// Raw server message text.
    Receive(String),
    Click(Coord),
    Press(ActionKind),
    Digit(u8),
    Submit,
    Cancel,
    Zoom(i32),
    Wait(u64),
    Disconnect(String),
}

const ACTION_KINDS: [ActionKind; 5] = [
    ActionKind::Move,
    ActionKind::Attack,
    ActionKind::Give,
    ActionKind::Upgrade,
    ActionKind::Vote,
];

/// Parses a replay script. Blank lines and `#` comments are skipped; a
/// line starting with `{` is shorthand for `recv`.
pub fn parse_script(content: &str) -> Result<Vec<ScriptCommand>, String> {
    let mut commands = Vec::new();
    for (index, line) in content.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let command = parse_line(trimmed).map_err(|error| format!("line {}: {error}", index + 1))?;
        commands.push(command);
    }
    Ok(commands)
}

fn parse_line(line: &str) -> Result<ScriptCommand, String> {
    if line.starts_with('{') {
        return Ok(ScriptCommand::Receive(line.to_string()));
    }
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };
    let command = match word {
        "recv" => {
            if rest.is_empty() {
                return Err("recv requires a message".to_string());
            }
            ScriptCommand::Receive(rest.to_string())
        }
        "click" => ScriptCommand::Click(
            rest.parse::<Coord>()
                .map_err(|error| format!("invalid click target: {error}"))?,
        ),
        "press" => {
            let kind = ACTION_KINDS
                .into_iter()
                .find(|kind| kind.label() == rest)
                .ok_or_else(|| format!("unknown action '{rest}'"))?;
            ScriptCommand::Press(kind)
        }
        "digit" => {
            let digit = rest
                .parse::<u8>()
                .ok()
                .filter(|digit| *digit <= 9)
                .ok_or_else(|| format!("invalid digit '{rest}'"))?;
            ScriptCommand::Digit(digit)
        }
        "submit" => no_args(word, rest, ScriptCommand::Submit)?,
        "cancel" => no_args(word, rest, ScriptCommand::Cancel)?,
        "zoom" => ScriptCommand::Zoom(
            rest.parse::<i32>()
                .map_err(|_| format!("invalid zoom steps '{rest}' (expected i32)"))?,
        ),
        "wait" => ScriptCommand::Wait(
            rest.parse::<u64>()
                .map_err(|_| format!("invalid wait '{rest}' (expected milliseconds)"))?,
        ),
        "disconnect" => ScriptCommand::Disconnect(if rest.is_empty() {
            "connection closed".to_string()
        } else {
            rest.to_string()
        }),
        other => return Err(format!("unknown command '{other}'")),
    };
    Ok(command)
}

fn no_args(word: &str, rest: &str, command: ScriptCommand) -> Result<ScriptCommand, String> {
    if rest.is_empty() {
        Ok(command)
    } else {
        Err(format!("{word} takes no arguments"))
    }
}

/// Plays `script` against a fresh session on a simulated clock and writes
/// every outbound message, rejected input and the final state to `out`.
pub fn run<W: Write>(script: &str, opts: &ReplayOptions, out: &mut W) -> Result<(), String> {
    let commands = parse_script(script)?;
    let start = Instant::now();
    let mut elapsed = Duration::ZERO;
    let step = Duration::from_millis(opts.step_ms);
    let mut session = GameSession::new(
        SessionSettings::default(),
        opts.viewer.clone(),
        opts.viewport_px,
        opts.viewport_px,
    );

    for command in commands {
        if let ScriptCommand::Wait(ms) = command {
            elapsed += Duration::from_millis(ms);
        }
        let now = start + elapsed;
        let stamp = elapsed.as_millis();
        match command {
            ScriptCommand::Receive(text) => {
                if let Err(error) = session.handle_server_text(&text, now) {
                    write_line(out, &format!("[{stamp}ms] rejected: {error}"))?;
                }
            }
            ScriptCommand::Click(coord) => {
                let point = cell_point(&session, coord);
                if !session.click_at(point, now) {
                    write_line(out, &format!("[{stamp}ms] click {coord} ignored"))?;
                }
            }
            ScriptCommand::Press(kind) => {
                if !session.press_action(kind, now) {
                    write_line(out, &format!("[{stamp}ms] {} unavailable", kind.label()))?;
                }
            }
            ScriptCommand::Digit(digit) => session.prompt_digit(digit),
            ScriptCommand::Submit => {
                if !session.submit_prompt(now) {
                    write_line(out, &format!("[{stamp}ms] submit refused"))?;
                }
            }
            ScriptCommand::Cancel => {
                if !session.cancel_prompt() {
                    session.clear_selection();
                }
            }
            ScriptCommand::Zoom(steps) => {
                session.zoom_steps(steps);
            }
            ScriptCommand::Wait(_) => {}
            ScriptCommand::Disconnect(reason) => session.connection_lost(&reason),
        }

        session.poll_timers(now);
        session.frame(now);
        for message in session.take_outbound() {
            let text = message.to_json().map_err(|error| error.to_string())?;
            write_line(out, &format!("[{stamp}ms] sent {text}"))?;
        }
        elapsed += step;
    }

    write_summary(&session, out)
}

fn cell_point(session: &GameSession, coord: Coord) -> Vec2 {
    session.camera().cell_center(coord)
}

fn write_summary<W: Write>(session: &GameSession, out: &mut W) -> Result<(), String> {
    write_line(out, &format!("status {}", session.status().label()))?;
    if let Some(state) = session.state() {
        for player in state.players.values() {
            let pos = player
                .position
                .map_or_else(|| "-".to_string(), |pos| pos.to_string());
            write_line(
                out,
                &format!(
                    "player {} pos={pos} hp={} ap={} range={} vote={}",
                    player.name,
                    player.hp,
                    player.ap,
                    player.range,
                    player.vote.as_deref().unwrap_or("-")
                ),
            )?;
        }
        if let Some(winner) = &state.winner {
            write_line(out, &format!("winner {winner}"))?;
        }
    }
    for notice in session.notices() {
        write_line(out, &format!("notice {notice}"))?;
    }
    Ok(())
}

fn write_line<W: Write>(out: &mut W, line: &str) -> Result<(), String> {
    writeln!(out, "{line}").map_err(|error| format!("failed to write output: {error}"))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn snapshot_line() -> String {
        json!({
            "type": "gameState",
            "state": {
                "dim": 4,
                "players": {
                    "A": { "pos": "0,0", "hp": 3, "ap": 2, "range": 2 },
                    "B": { "pos": "0,1", "hp": 3, "ap": 1, "range": 2 }
                }
            }
        })
        .to_string()
    }

    fn replay(script: &str, viewer: &str) -> String {
        let opts = ReplayOptions {
            viewer: Some(viewer.to_string()),
            ..ReplayOptions::default()
        };
        let mut out = Vec::new();
        run(script, &opts, &mut out).expect("replay");
        String::from_utf8(out).expect("utf8")
    }

    #[test]
    fn parse_script_skips_blank_and_comment_lines() {
        let commands = parse_script("# setup\n\n  click 1,2 \npress attack\nwait 300\n{\"type\":\"x\"}\n")
            .expect("script");
        assert_eq!(
            commands,
            vec![
                ScriptCommand::Click(Coord::new(1, 2)),
                ScriptCommand::Press(ActionKind::Attack),
                ScriptCommand::Wait(300),
                ScriptCommand::Receive("{\"type\":\"x\"}".to_string()),
            ]
        );
    }

    #[test]
    fn parse_errors_name_the_line() {
        let err = parse_script("submit\nfly away\n").expect_err("unknown command");
        assert_eq!(err, "line 2: unknown command 'fly'");
        let err = parse_script("digit 12").expect_err("bad digit");
        assert_eq!(err, "line 1: invalid digit '12'");
        let err = parse_script("cancel now").expect_err("extra args");
        assert_eq!(err, "line 1: cancel takes no arguments");
    }

    #[test]
    fn single_press_sends_minimal_attack_after_window() {
        let script = format!("{}\nclick 0,1\npress attack\nwait 300\n", snapshot_line());
        let output = replay(&script, "A");
        assert!(
            output.contains(r#"sent {"type":"attack","patient":"B","amount":1}"#),
            "{output}"
        );
        assert!(output.contains("status live"), "{output}");
    }

    #[test]
    fn double_press_opens_prompt_for_amount() {
        let script = format!(
            "{}\nclick 0,1\npress give\npress give\ndigit 2\nsubmit\n",
            snapshot_line()
        );
        let output = replay(&script, "A");
        assert!(
            output.contains(r#"sent {"type":"give","patient":"B","amount":2}"#),
            "{output}"
        );
    }

    #[test]
    fn bad_diff_desynchronizes_until_next_snapshot() {
        let bad = json!({ "type": "updates", "updates": [{ "player": "Z", "stat": "hp", "val": 1 }] });
        let script = format!("{}\n{}\n", snapshot_line(), bad);
        let output = replay(&script, "A");
        assert!(output.contains("rejected:"), "{output}");
        assert!(output.contains("status desynchronized"), "{output}");

        let recovered = replay(&format!("{}\n{}\n{}\n", snapshot_line(), bad, snapshot_line()), "A");
        assert!(recovered.contains("status live"), "{recovered}");
    }

    #[test]
    fn summary_lists_players_and_connection_notice() {
        let script = format!("{}\ndisconnect socket reset\n", snapshot_line());
        let output = replay(&script, "A");
        assert!(output.contains("player A pos=0,0 hp=3 ap=2 range=2 vote=-"), "{output}");
        assert!(output.contains("player B pos=0,1 hp=3 ap=1 range=2 vote=-"), "{output}");
        assert!(output.contains("status failed"), "{output}");
        assert!(output.contains("notice Connection lost. Press R to reload."), "{output}");
    }
}
