// src/main.rs

use std::process::ExitCode;

use assetdag::{cli, logging};

#[tokio::main]
async fn main() -> ExitCode {
    let args = cli::parse();
    if let Err(err) = logging::init_logging(args.log_level) {
        eprintln!("assetdag error: {err:?}");
        return ExitCode::FAILURE;
    }

    match assetdag::run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("assetdag error: {err:?}");
            ExitCode::FAILURE
        }
    }
}
