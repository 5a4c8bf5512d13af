//! Command-line interface

use clap::{Parser, Subcommand};
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::collections::HashMap;
use std::fmt::Write as _;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::error::{PipelineError, Result};
use crate::models::{ClassificationResult, Credential, EmailCategory, FullMessage, MessageSummary};

#[derive(Parser, Debug)]
#[command(name = "gmail-classify")]
#[command(version)]
#[command(about = "Extract and classify recent Gmail messages", long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml", global = true)]
    pub config: PathBuf,

    /// OAuth2 access token for the Gmail API
    #[arg(long, env = "GMAIL_ACCESS_TOKEN", hide_env_values = true, global = true)]
    pub access_token: Option<String>,

    /// OAuth2 refresh token, used when no access token is given
    #[arg(long, env = "GMAIL_REFRESH_TOKEN", hide_env_values = true, global = true)]
    pub refresh_token: Option<String>,

    /// Print results as JSON instead of a table
    #[arg(long, global = true)]
    pub json: bool,

    /// Verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub fn credential(&self) -> Credential {
        Credential::new(self.access_token.clone(), self.refresh_token.clone())
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List summaries of the most recent messages
    List {
        /// Number of messages (defaults to gmail.default_limit)
        #[arg(short, long)]
        limit: Option<u32>,
    },

    /// Show one message with its extracted body
    Show {
        /// Gmail message id
        id: String,
    },

    /// Classify recent messages, or summaries read from a JSON file
    Classify {
        /// Number of messages to fetch (ignored with --input)
        #[arg(short, long)]
        limit: Option<u32>,

        /// JSON file containing an array of message summaries
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// API key for the classification model
        #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
        api_key: Option<String>,
    },

    /// Generate example configuration file
    InitConfig {
        /// Path to create config file
        #[arg(short, long, default_value = "config.toml")]
        output: PathBuf,

        /// Overwrite existing file
        #[arg(long)]
        force: bool,
    },
}

/// Truncate a string to max_len characters, adding "..." if truncated
fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        format!("{}...", s.chars().take(max_len.saturating_sub(3)).collect::<String>())
    }
}

/// Progress reporter using indicatif
pub struct ProgressReporter {
    multi: Arc<MultiProgress>,
    spinner_style: ProgressStyle,
}

impl ProgressReporter {
    pub fn new(multi: Arc<MultiProgress>) -> Self {
        let spinner_style = ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed:>6}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ");

        Self {
            multi,
            spinner_style,
        }
    }

    /// Reporter that draws nothing, for machine-readable output
    pub fn hidden() -> Self {
        Self::new(Arc::new(MultiProgress::with_draw_target(
            ProgressDrawTarget::hidden(),
        )))
    }

    pub fn add_spinner(&self, msg: &str) -> ProgressBar {
        let pb = self.multi.add(ProgressBar::new_spinner());
        pb.set_style(self.spinner_style.clone());
        pb.set_message(msg.to_string());
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    }

    /// Finish a spinner and clear it from the multi-progress display
    pub fn finish_spinner(&self, pb: &ProgressBar, msg: &str) {
        pb.finish_and_clear();
        if !self.multi.is_hidden() {
            eprintln!("  ✓ {}", msg);
        }
    }

    /// Spin while `task` runs. The `done` line is printed only on success;
    /// on failure the spinner is cleared and the error returned.
    pub async fn track<T, Fut, D>(&self, msg: &str, task: Fut, done: D) -> Result<T>
    where
        Fut: Future<Output = Result<T>>,
        D: FnOnce(&T) -> String,
    {
        let pb = self.add_spinner(msg);
        match task.await {
            Ok(value) => {
                self.finish_spinner(&pb, &done(&value));
                Ok(value)
            }
            Err(e) => {
                pb.finish_and_clear();
                Err(e)
            }
        }
    }
}

/// Read summaries previously written by `list --json`
pub async fn load_summaries(path: &Path) -> Result<Vec<MessageSummary>> {
    let content = tokio::fs::read_to_string(path).await?;
    let summaries: Vec<MessageSummary> = serde_json::from_str(&content).map_err(|e| {
        PipelineError::ValidationError(format!(
            "{:?} is not a JSON array of message summaries: {}",
            path, e
        ))
    })?;
    Ok(summaries)
}

pub fn render_summaries(summaries: &[MessageSummary]) -> String {
    if summaries.is_empty() {
        return "No messages found.\n".to_string();
    }

    let mut out = String::new();
    let _ = writeln!(out, "{:<18} {:<30} {:<40} {}", "ID", "FROM", "SUBJECT", "DATE");
    for summary in summaries {
        let _ = writeln!(
            out,
            "{:<18} {:<30} {:<40} {}",
            truncate_string(&summary.id, 18),
            truncate_string(&summary.from, 30),
            truncate_string(&summary.subject, 40),
            summary.date
        );
    }
    out
}

pub fn render_full_message(message: &FullMessage) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "ID:      {}", message.id);
    if let Some(thread_id) = &message.thread_id {
        let _ = writeln!(out, "Thread:  {}", thread_id);
    }
    let _ = writeln!(out, "From:    {}", message.from);
    let _ = writeln!(out, "To:      {}", message.to);
    let _ = writeln!(out, "Subject: {}", message.subject);
    let _ = writeln!(out, "Date:    {}", message.date);
    let _ = writeln!(out, "Format:  {}", if message.is_html { "html" } else { "text" });
    let _ = writeln!(out);
    let _ = writeln!(out, "{}", message.body_text);
    out
}

/// Results table followed by a per-category breakdown
pub fn render_classifications(results: &[ClassificationResult]) -> String {
    if results.is_empty() {
        return "No classifications returned.\n".to_string();
    }

    let mut out = String::new();
    let _ = writeln!(out, "{:<12} {:<30} {:<40} {}", "CATEGORY", "FROM", "SUBJECT", "REASON");
    for result in results {
        let _ = writeln!(
            out,
            "{:<12} {:<30} {:<40} {}",
            result.category.as_str(),
            truncate_string(&result.from, 30),
            truncate_string(&result.subject, 40),
            result.reason
        );
    }

    let mut counts: HashMap<EmailCategory, usize> = HashMap::new();
    for result in results {
        *counts.entry(result.category).or_insert(0) += 1;
    }

    let _ = writeln!(out);
    let _ = writeln!(out, "Breakdown:");
    for category in EmailCategory::ALL {
        if let Some(count) = counts.get(&category) {
            let pct = (*count as f32 / results.len() as f32) * 100.0;
            let _ = writeln!(out, "  {:<12} {:>4} ({:.1}%)", category.as_str(), count, pct);
        }
    }
    out
}
