pub mod backup;
#[cfg(feature = "app")]
pub mod cli;
pub mod commands;
pub mod filter;
pub mod logging;
pub mod models;
pub mod notify;
pub mod repeat;
pub mod scheduler;
pub mod services;
pub mod state;
pub mod stats;
pub mod storage;

#[cfg(all(feature = "app", not(test)))]
pub fn run() -> std::process::ExitCode {
    use clap::Parser;
    use std::process::ExitCode;

    let cli = cli::Cli::parse();
    let Some(data_dir) = cli
        .data_dir
        .clone()
        .or_else(|| dirs::data_dir().map(|dir| dir.join("todo-app")))
    else {
        eprintln!("error: no data directory available; pass --data-dir");
        return ExitCode::FAILURE;
    };

    if let Err(err) = logging::init_logging(&data_dir) {
        eprintln!("failed to initialize logging: {err}");
    }

    let services = match services::Services::open(data_dir) {
        Ok(services) => services,
        Err(err) => {
            log::error!("failed to open data directory: {err}");
            eprintln!("error: {err}");
            return ExitCode::FAILURE;
        }
    };
    cli::execute(&services, cli.command, cli.json)
}
