use std::process::ExitCode;

use engine::run_app;
use tracing::error;

mod bootstrap;
mod config;
mod sim;

pub(crate) fn run() -> ExitCode {
    bootstrap::init_tracing();

    let wiring = match bootstrap::build_app() {
        Ok(wiring) => wiring,
        Err(error) => {
            error!(error = %error, "bootstrap_failed");
            return ExitCode::FAILURE;
        }
    };

    if let Err(error) = run_app(wiring.config, wiring.simulation, wiring.world) {
        error!(error = %error, "startup_failed");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}
