use std::process::ExitCode;

mod app;

fn main() -> ExitCode {
    match app::bootstrap::build_app() {
        Some(wiring) => app::loop_runner::run(wiring),
        None => ExitCode::FAILURE,
    }
}
