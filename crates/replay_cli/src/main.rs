use std::env;
use std::fs;
use std::io;
use std::process::ExitCode;

use replay_cli::{run, ReplayOptions, DEFAULT_STEP_MS, DEFAULT_VIEWPORT_PX};

fn main() -> ExitCode {
    match run_cli() {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("{message}");
            ExitCode::from(1)
        }
    }
}

fn run_cli() -> Result<(), String> {
    let args = env::args().skip(1).collect::<Vec<_>>();
    if args.is_empty() {
        return Err(usage_text());
    }
    if args[0] == "-h" || args[0] == "--help" {
        print_usage();
        return Ok(());
    }

    let mut options = ReplayOptions::default();
    let mut index = 0usize;
    while index < args.len() {
        match args[index].as_str() {
            "--viewer" => {
                let value = args
                    .get(index + 1)
                    .ok_or_else(|| "missing value for --viewer".to_string())?;
                options.viewer = Some(value.clone());
                index += 2;
            }
            "--step-ms" => {
                let value = args
                    .get(index + 1)
                    .ok_or_else(|| "missing value for --step-ms".to_string())?;
                options.step_ms = value
                    .parse::<u64>()
                    .map_err(|_| format!("invalid --step-ms value '{value}' (expected u64)"))?;
                index += 2;
            }
            "--viewport" => {
                let value = args
                    .get(index + 1)
                    .ok_or_else(|| "missing value for --viewport".to_string())?;
                options.viewport_px = value
                    .parse::<u32>()
                    .ok()
                    .filter(|px| *px > 0)
                    .ok_or_else(|| format!("invalid --viewport value '{value}' (expected u32 > 0)"))?;
                index += 2;
            }
            _ => break,
        }
    }

    let path = args
        .get(index)
        .ok_or_else(|| "missing script path".to_string())?;
    if args.len() > index + 1 {
        return Err(format!("unexpected argument '{}'", args[index + 1]));
    }
    let script = fs::read_to_string(path)
        .map_err(|error| format!("failed to read script file '{path}': {error}"))?;

    run(&script, &options, &mut io::stdout())
}

fn print_usage() {
    println!("{}", usage_text());
}

fn usage_text() -> String {
    [
        "replay - feed a recorded message script through a headless game session".to_string(),
        String::new(),
        "Usage:".to_string(),
        "  replay [--viewer <name>] [--step-ms <u64>] [--viewport <px>] <script>".to_string(),
        String::new(),
        "Script lines (blank lines and # comments are skipped):".to_string(),
        "  recv <json> | {json}   deliver a server message".to_string(),
        "  click <r>,<c>          click a cell".to_string(),
        "  press <action>         move, attack, give, upgrade or vote".to_string(),
        "  digit <0-9> | submit | cancel".to_string(),
        "  zoom <steps> | wait <ms> | disconnect [reason]".to_string(),
        String::new(),
        "Defaults:".to_string(),
        format!("  --step-ms {DEFAULT_STEP_MS}"),
        format!("  --viewport {DEFAULT_VIEWPORT_PX}"),
    ]
    .join("\n")
}
