use std::process::ExitCode;

use parley_config::{Config, ConfigError};

fn main() -> ExitCode {
    let config = match Config::load() {
        Ok(config) => config,
        Err(ConfigError::Cli(error)) => error.exit(),
        Err(error) => {
            eprintln!("parleyd: {error}");
            return ExitCode::FAILURE;
        }
    };

    match parleyd::run(&config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("parleyd: {error}");
            ExitCode::FAILURE
        }
    }
}
