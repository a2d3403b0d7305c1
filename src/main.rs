use std::process::ExitCode;

use clap::Parser;
use retouchfe::cli;

fn main() -> ExitCode {
    // -- GUI mode -----------------------------------------------------
    // Without --input/-i a window is opened; the session log is only written there.
    #[cfg(feature = "gui")]
    if !cli::CliArgs::is_cli_mode() {
        retouchfe::logger::init();
        return match retouchfe::gui::run() {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                tracing::error!(error = %e, "window closed with an error");
                eprintln!("error: {}", e);
                ExitCode::FAILURE
            }
        };
    }

    // -- CLI / headless mode ---------------------------------------------
    cli::run(cli::CliArgs::parse())
}
