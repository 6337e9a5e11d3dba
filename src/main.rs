use std::path::{Path, PathBuf};
use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use llama_worker::config::{LoadFailurePolicy, LogFormat, LoggingSettings, ModelSettings, Settings};
use llama_worker::llm::{initialize, GenerateError, PromptFormat, TextGenerator};
use llama_worker::server::{ApiServer, AppState};
use llama_worker::worker::{Job, JobHandler};

/// The loaded backend behind the job handler
type Model = Box<dyn TextGenerator>;

/// Serverless llama.cpp inference worker
#[derive(Parser)]
#[command(name = "llama-worker", version, about)]
struct Cli {
    /// Directory containing default.toml and local.toml (defaults to ./config)
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Serve jobs over the local HTTP endpoint (default)
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
    },
    /// Run a single job and print its output as JSON
    Run {
        /// Job JSON, e.g. '{"input": {"prompt": "Hello"}}'
        #[arg(long, conflicts_with = "test_input_file")]
        test_input: Option<String>,
        /// File holding the job JSON
        #[arg(long, default_value = "test_input.json")]
        test_input_file: PathBuf,
    },
}

/// Main entry point for the worker
///
/// Loads settings, initializes logging and the model, then either serves
/// jobs over HTTP or runs one job from test input.
///
/// # Errors
/// Returns an error if settings are invalid, the model cannot be loaded and
/// the failure policy is `abort`, or the server fails to bind.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load settings first
    let settings = match &cli.config_dir {
        Some(dir) => Settings::from_sources(dir, std::env::vars().collect()),
        None => Settings::new(),
    }
    .context("Failed to load settings")?;

    let _guard = init_logging(&settings.logging)?;
    info!("llama-worker starting up...");
    info!(
        model = %settings.model.path.display(),
        n_ctx = settings.model.n_ctx,
        n_gpu_layers = settings.model.n_gpu_layers,
        n_batch = settings.model.n_batch,
        api = ?settings.model.api,
        "Settings loaded"
    );

    let handler = build_handler(&settings)?;
    let output_field = settings.worker.output_field;

    match cli.command.unwrap_or(Command::Serve { host: None, port: None }) {
        Command::Serve { host, port } => {
            let server = ApiServer::new(
                AppState::new(handler, output_field),
                host.unwrap_or_else(|| settings.server.host.clone()),
                port.unwrap_or(settings.server.port),
            );
            server.start().await.map_err(|e| anyhow!(e))?;
        }
        Command::Run { test_input, test_input_file } => {
            let job = read_test_input(test_input, &test_input_file)?;
            let mut handler = handler;
            let result = tokio::task::spawn_blocking(move || handler.handle(&job)).await?;
            println!("{}", serde_json::to_string_pretty(&result.to_output(output_field))?);
        }
    }

    Ok(())
}

/// Sets up the tracing subscriber. Logs go to stdout unless a log directory
/// is configured, in which case they go to a daily-rolling file there.
fn init_logging(logging: &LoggingSettings) -> anyhow::Result<WorkerGuard> {
    let (writer, guard) = match &logging.file {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
            tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, "llama-worker"))
        }
        None => tracing_appender::non_blocking(std::io::stdout()),
    };

    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(logging.file.is_none())
        .with_thread_ids(true)
        .with_target(false);

    match logging.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }

    Ok(guard)
}

#[cfg(feature = "llama")]
fn load_backend(model: &ModelSettings) -> Result<Model, GenerateError> {
    let generator = llama_worker::llm::LlamaGenerator::load(model)?;
    Ok(Box::new(generator))
}

#[cfg(not(feature = "llama"))]
fn load_backend(_model: &ModelSettings) -> Result<Model, GenerateError> {
    Err("this binary was built without the `llama` feature".into())
}

/// Loads the model and wraps it in a job handler, applying the configured
/// load failure policy.
fn build_handler(settings: &Settings) -> anyhow::Result<JobHandler<Model>> {
    let format = PromptFormat::from_settings(&settings.model);

    match initialize(&settings.model, &settings.generation, load_backend) {
        Ok(model) => Ok(JobHandler::new(model, settings.generation.clone(), format)),
        Err(e) => match settings.worker.on_load_failure {
            LoadFailurePolicy::Abort => {
                error!("FATAL: Initialization failed: {}", e);
                Err(anyhow::Error::new(e).context("Model initialization failed"))
            }
            LoadFailurePolicy::Continue => {
                error!("Initialization failed, serving without a model: {}", e);
                let model = settings.model.clone();
                let defaults = settings.generation.clone();
                Ok(JobHandler::without_model(settings.generation.clone(), format)
                    .with_reloader(move || initialize(&model, &defaults, load_backend)))
            }
        },
    }
}

/// Reads the job for `run`: inline JSON if given, otherwise the input file.
fn read_test_input(inline: Option<String>, file: &Path) -> anyhow::Result<Job> {
    let raw = match inline {
        Some(raw) => raw,
        None => std::fs::read_to_string(file)
            .with_context(|| format!("Failed to read test input from {}", file.display()))?,
    };
    let mut job: Job = serde_json::from_str(&raw).context("Test input is not a valid job")?;
    job.id.get_or_insert_with(|| "local_test".to_string());
    Ok(job)
}
