//! Gmail Extraction & Classification
//!
//! Pulls recent messages from a Gmail mailbox, reconstructs readable bodies
//! from their MIME trees, and sorts message summaries into a fixed set of
//! categories with a chat-completion model.
//!
//! # Overview
//!
//! - **Credentials**: refresh a missing access token from a refresh token
//! - **Mail client**: list summaries and fetch full messages over the Gmail REST API
//! - **Body extraction**: first plain-text and first HTML part of a MIME tree
//! - **Normalization**: HTML to whitespace-collapsed plain text
//! - **Classification**: one model call per batch, reply re-associated by id
//!
//! # Example Usage
//!
//! ```no_run
//! use gmail_classifier::{auth::OAuthClient, config::Config, models::Credential, pipeline::Pipeline};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.toml".as_ref()).await?;
//!     let pipeline = Pipeline::from_config(config, OAuthClient::from_env().ok())?;
//!
//!     let mut credential = Credential::new(None, Some("refresh-token".to_string()));
//!     let summaries = pipeline.list_summaries(&mut credential, 15).await?;
//!     let results = pipeline.classify("sk-...", &summaries).await?;
//!
//!     for result in results {
//!         println!("{} -> {}", result.subject, result.category);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Module Organization
//!
//! - [`auth`] - Token refresh and credential upkeep
//! - [`client`] - Gmail API client with bounded concurrency and retry logic
//! - [`extractor`] - MIME tree walk and body decoding
//! - [`normalize`] - Markup stripping
//! - [`classifier`] - Prompt construction and reply parsing
//! - [`llm`] - Chat model seam and OpenAI implementation
//! - [`pipeline`] - Consumer-facing entry points
//! - [`cli`] - Command-line interface and output rendering
//! - [`config`] - Configuration management
//! - [`error`] - Error types and result aliases
//! - [`models`] - Core data structures

pub mod auth;
pub mod classifier;
pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod extractor;
pub mod llm;
pub mod models;
pub mod normalize;
pub mod pipeline;

// Re-export commonly used types for convenience
pub use error::{PipelineError, Result};

// Core data models
pub use models::{
    ClassificationResult, Credential, EmailCategory, ExtractedBody, FullMessage, MessageSummary,
    MimePart,
};

pub use auth::{CredentialManager, TokenRefresher};
pub use classifier::EmailClassifier;
pub use client::{GmailClient, MailClient};
pub use extractor::{decode_body_data, extract_body};
pub use llm::ChatModel;
pub use normalize::strip_markup;
pub use pipeline::Pipeline;
