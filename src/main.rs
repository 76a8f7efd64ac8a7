mod cli;
mod config;
mod engine;
mod error;
mod model;
mod orchestrator;
mod paths;
mod storage;
mod text_summary;
mod urls;

use clap::Parser;
use tracing_subscriber::EnvFilter;

/// Logs go to stderr so `--json` output on stdout stays parseable.
fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

#[tokio::main]
async fn main() {
    let args = cli::Cli::parse();
    init_tracing(args.verbose);
    let json = args.json();

    match cli::run(args).await {
        // Exit explicitly so lingering blocking tasks (stdin reader) don't hold the process.
        Ok(()) => std::process::exit(0),
        Err(e) => {
            if json {
                let body = model::BatchResponse::Error {
                    message: e.to_string(),
                };
                match serde_json::to_string_pretty(&body) {
                    Ok(out) => println!("{out}"),
                    Err(_) => eprintln!("Error: {e:#}"),
                }
            } else {
                eprintln!("Error: {e:#}");
            }
            std::process::exit(1);
        }
    }
}
