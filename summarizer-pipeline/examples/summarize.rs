use std::{env, path::PathBuf, process::ExitCode, sync::Arc};

use common::utils::config::get_config;
use summarizer_pipeline::{summarize_scoped, OpenAiServices, SummarizerConfig};
use tracing::error;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .try_init()
        .ok();

    let mut args = env::args().skip(1);
    let Some(question) = args.next() else {
        eprintln!("usage: summarize <question> <file>...");
        return ExitCode::FAILURE;
    };
    let file_paths: Vec<PathBuf> = args.map(PathBuf::from).collect();

    let config = match get_config() {
        Ok(config) => config,
        Err(err) => {
            error!(error = %err, "failed to load configuration");
            return ExitCode::FAILURE;
        }
    };
    let services = Arc::new(OpenAiServices::from_config(&config));

    match summarize_scoped(services, SummarizerConfig::default(), &file_paths, &question).await {
        Ok(answer) => {
            println!("{answer}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!(error = %err, "summarization failed");
            ExitCode::FAILURE
        }
    }
}
