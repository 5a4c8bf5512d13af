use anyhow::{anyhow, Result};
use clap::Parser;
use gmail_classifier::auth::OAuthClient;
use gmail_classifier::cli::{self, Cli, Commands, ProgressReporter};
use gmail_classifier::config::{self, Config};
use gmail_classifier::error::PipelineError;
use gmail_classifier::pipeline::Pipeline;
use indicatif::MultiProgress;
use serde::Serialize;
use std::io::Write;
use std::process;
use std::sync::{Arc, Mutex};
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;

/// A writer that prints through MultiProgress to avoid progress bar conflicts
#[derive(Clone)]
struct MultiProgressWriter {
    multi: Arc<MultiProgress>,
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl MultiProgressWriter {
    fn new(multi: Arc<MultiProgress>) -> Self {
        Self {
            multi,
            buffer: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl Write for MultiProgressWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut buffer = self.buffer.lock().unwrap_or_else(|e| e.into_inner());
        buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        let mut buffer = self.buffer.lock().unwrap_or_else(|e| e.into_inner());
        if !buffer.is_empty() {
            let msg = String::from_utf8_lossy(&buffer);
            let msg = msg.trim_end_matches('\n');
            if !msg.is_empty() {
                let _ = self.multi.println(msg);
            }
            buffer.clear();
        }
        Ok(())
    }
}

impl Drop for MultiProgressWriter {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}

/// MakeWriter implementation for tracing
#[derive(Clone)]
struct MultiProgressMakeWriter {
    multi: Arc<MultiProgress>,
}

impl<'a> MakeWriter<'a> for MultiProgressMakeWriter {
    type Writer = MultiProgressWriter;

    fn make_writer(&'a self) -> Self::Writer {
        MultiProgressWriter::new(Arc::clone(&self.multi))
    }
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        if let Some(PipelineError::AuthError(_)) = e.downcast_ref::<PipelineError>() {
            eprintln!("\nProvide --access-token, or --refresh-token with GOOGLE_CLIENT_ID/GOOGLE_CLIENT_SECRET set.");
        }
        eprintln!("\nFor help, run: gmail-classify --help");
        process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("gmail_classifier=debug,info"))
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("gmail_classifier=info,warn,error"))
    };

    // With --json stdout carries data only, so progress is hidden and logs go straight to stderr
    let (progress, writer) = if cli.json {
        (ProgressReporter::hidden(), BoxMakeWriter::new(std::io::stderr))
    } else {
        let multi = Arc::new(MultiProgress::new());
        let writer = BoxMakeWriter::new(MultiProgressMakeWriter {
            multi: Arc::clone(&multi),
        });
        (ProgressReporter::new(multi), writer)
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    if let Commands::InitConfig { output, force } = &cli.command {
        if output.exists() && !force {
            return Err(PipelineError::ConfigError(format!(
                "Configuration file already exists at {:?}. Use --force to overwrite.",
                output
            ))
            .into());
        }

        Config::create_example(output).await?;

        println!("Created example configuration file at: {:?}", output);
        println!("\nKey settings to review:");
        println!("  - gmail.default_limit: How many recent messages to fetch");
        println!("  - gmail.max_concurrent_fetches: Parallel metadata requests");
        println!("  - classification.model: Chat model used for classification");
        return Ok(());
    }

    let config = Config::load(&cli.config).await?;

    let oauth = match OAuthClient::from_env() {
        Ok(client) => Some(client),
        Err(e) => {
            tracing::debug!("Token refresh unavailable: {}", e);
            None
        }
    };
    let pipeline = Pipeline::from_config(config, oauth)?;
    let default_limit = pipeline.config().gmail.default_limit;
    let mut credential = cli.credential();

    match &cli.command {
        Commands::List { limit } => {
            let limit = limit.unwrap_or(default_limit);
            let summaries = progress
                .track(
                    &format!("Fetching {} message summaries...", limit),
                    pipeline.list_summaries(&mut credential, limit),
                    |s| format!("Fetched {} summaries", s.len()),
                )
                .await?;

            emit(cli.json, &summaries, |s| cli::render_summaries(s))?;
        }

        Commands::Show { id } => {
            let message = progress
                .track(
                    &format!("Fetching message {}...", id),
                    pipeline.fetch_full(&mut credential, id),
                    |m| format!("Fetched message {}", m.id),
                )
                .await?;

            emit(cli.json, &message, cli::render_full_message)?;
        }

        Commands::Classify {
            limit,
            input,
            api_key,
        } => {
            let api_key = config::resolve_api_key(api_key.as_deref()).ok_or_else(|| {
                anyhow!("No API key for classification. Pass --api-key or set OPENAI_API_KEY.")
            })?;

            let summaries = match input {
                Some(path) => cli::load_summaries(path).await?,
                None => {
                    let limit = limit.unwrap_or(default_limit);
                    progress
                        .track(
                            &format!("Fetching {} message summaries...", limit),
                            pipeline.list_summaries(&mut credential, limit),
                            |s| format!("Fetched {} summaries", s.len()),
                        )
                        .await?
                }
            };

            let results = progress
                .track(
                    &format!(
                        "Classifying {} emails with {}...",
                        summaries.len(),
                        pipeline.config().classification.model
                    ),
                    pipeline.classify(&api_key, &summaries),
                    |r| format!("Classified {} emails", r.len()),
                )
                .await?;

            emit(cli.json, &results, |r| cli::render_classifications(r))?;
        }

        Commands::InitConfig { .. } => unreachable!("handled before configuration is loaded"),
    }

    Ok(())
}

/// Print `value` as pretty JSON or through the given table renderer
fn emit<T, F>(json: bool, value: &T, render: F) -> Result<()>
where
    T: Serialize + ?Sized,
    F: FnOnce(&T) -> String,
{
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        print!("{}", render(value));
    }
    Ok(())
}
