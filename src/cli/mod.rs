//! CLI module
//!
//! `call` runs one tool against a dataset file, `serve` answers
//! newline-delimited tool requests on stdin, `status` shows configuration.
//! Results go to stdout as JSON; logs go to stderr.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use crate::config::Config;
use crate::error::QueryError;
use crate::session::Session;
use crate::tools::{self, tool_definitions, ToolRequest, ToolResponse};

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Parser)]
#[command(name = "repo-query")]
#[command(version, about = "Query tools over repository metadata", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a single tool call
    Call {
        /// Tool name (e.g. list_repos, semantic_search)
        tool: String,

        /// JSON arguments object
        #[arg(short, long)]
        args: Option<String>,

        /// Dataset file to upload first (defaults to DATA_FILE_PATH)
        #[arg(short, long)]
        data: Option<PathBuf>,

        /// Pretty-print the result
        #[arg(short, long)]
        pretty: bool,
    },

    /// Answer JSON tool requests from stdin, one per line
    Serve {
        /// Dataset file to upload at startup (defaults to DATA_FILE_PATH)
        #[arg(short, long)]
        data: Option<PathBuf>,
    },

    /// Show configuration and available tools
    Status,
}

// ============================================================================
// CLI Runner
// ============================================================================

pub async fn run(cli: Cli) -> Result<()> {
    let config = Config::from_env().context("Invalid configuration")?;

    match cli.command {
        Commands::Call {
            tool,
            args,
            data,
            pretty,
        } => cmd_call(&config, &tool, args.as_deref(), data, pretty).await,
        Commands::Serve { data } => cmd_serve(&config, data).await,
        Commands::Status => cmd_status(&config).await,
    }
}

// ============================================================================
// Command Implementations
// ============================================================================

/// Session with the configured embedder, preloaded when a dataset is known
async fn open_session(config: &Config, data: Option<PathBuf>) -> Result<Session> {
    let session = Session::from_config(config);

    if let Some(path) = data.or_else(|| config.data_file_path.clone()) {
        let summary = session
            .upload_file(&path)
            .await
            .with_context(|| format!("Failed to load dataset {}", path.display()))?;
        tracing::info!(
            "Preloaded {} repositories from {}",
            summary.repository_count,
            path.display()
        );
    }

    Ok(session)
}

async fn cmd_call(
    config: &Config,
    tool: &str,
    args: Option<&str>,
    data: Option<PathBuf>,
    pretty: bool,
) -> Result<()> {
    let arguments: Value = match args {
        Some(raw) => serde_json::from_str(raw).context("--args is not valid JSON")?,
        None => Value::Null,
    };

    let session = open_session(config, data).await?;
    let response = tools::handle(
        &session,
        ToolRequest {
            tool: tool.to_string(),
            arguments,
        },
    )
    .await;

    let output = if pretty {
        serde_json::to_string_pretty(&response)?
    } else {
        serde_json::to_string(&response)?
    };
    println!("{}", output);

    if response.is_error() {
        std::process::exit(1);
    }
    Ok(())
}

/// One session for the whole stream; an `upload_data` line replaces its dataset.
async fn cmd_serve(config: &Config, data: Option<PathBuf>) -> Result<()> {
    let session = open_session(config, data).await?;
    tracing::info!(session = %session.id(), "Serving tool requests on stdin");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let response = respond(&session, line).await;
        let mut encoded = serde_json::to_vec(&response)?;
        encoded.push(b'\n');

        stdout.write_all(&encoded).await.context("Failed to write stdout")?;
        stdout.flush().await?;
    }

    session.clear();
    tracing::info!(session = %session.id(), "Input closed, session ended");
    Ok(())
}

async fn respond(session: &Session, line: &str) -> ToolResponse {
    match serde_json::from_str::<ToolRequest>(line) {
        Ok(request) => tools::handle(session, request).await,
        Err(e) => ToolResponse::failure(&QueryError::validation(format!(
            "Malformed request, expected {{\"tool\": ..., \"arguments\": {{...}}}}: {}",
            e
        ))),
    }
}

async fn cmd_status(config: &Config) -> Result<()> {
    println!("repo-query v{}", env!("CARGO_PKG_VERSION"));
    println!();

    println!("[*] Embedding provider: {} ({})", config.provider, config.embedding_model);
    if config.has_api_key() {
        println!("[OK] OPENAI_API_KEY: set");
    } else {
        println!("[!] OPENAI_API_KEY: not set");
    }
    println!("[*] Index build timeout: {}s", config.embedding_timeout.as_secs());

    match &config.data_file_path {
        Some(path) => print_data_file(path).await,
        None => println!("[*] DATA_FILE_PATH: not set"),
    }

    println!();
    println!("Tools:");
    for definition in tool_definitions() {
        println!("  {:<26} {}", definition.name, truncate_text(definition.description, 60));
    }

    Ok(())
}

async fn print_data_file(path: &Path) {
    match tokio::fs::metadata(path).await {
        Ok(meta) => println!(
            "[OK] Data file: {} ({})",
            path.display(),
            format_bytes(meta.len())
        ),
        Err(e) => println!("[!] Data file: {} ({})", path.display(), e),
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Truncate on char boundaries
fn truncate_text(text: &str, max_chars: usize) -> String {
    let cleaned = text.replace('\n', " ").replace('\r', "");
    let cleaned = cleaned.trim();

    if cleaned.chars().count() <= max_chars {
        cleaned.to_string()
    } else {
        let truncated: String = cleaned.chars().take(max_chars).collect();
        format!("{}...", truncated)
    }
}

fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;

    if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_call() {
        let cli = Cli::try_parse_from([
            "repo-query",
            "call",
            "list_repos",
            "--args",
            r#"{"limit": 5}"#,
            "--data",
            "repos.json",
        ])
        .unwrap();

        match cli.command {
            Commands::Call { tool, args, data, pretty } => {
                assert_eq!(tool, "list_repos");
                assert_eq!(args.as_deref(), Some(r#"{"limit": 5}"#));
                assert_eq!(data, Some(PathBuf::from("repos.json")));
                assert!(!pretty);
            }
            _ => panic!("expected call"),
        }
    }

    #[tokio::test]
    async fn test_respond_rejects_malformed_line() {
        let session = Session::new(None);
        let response = respond(&session, "not json").await;
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["error"]["kind"], "ValidationError");

        let response = respond(&session, r#"{"tool": "get_statistics"}"#).await;
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["error"]["kind"], "SessionNotInitializedError");
    }

    #[tokio::test]
    async fn test_open_session_preloads_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("repos.json");
        std::fs::write(&path, r#"[{"name": "a/b"}, {"name": "c/d"}]"#).unwrap();

        let session = open_session(&Config::default(), Some(path)).await.unwrap();
        assert_eq!(session.dataset().unwrap().len(), 2);

        let missing = open_session(&Config::default(), Some(dir.path().join("nope.json"))).await;
        assert!(missing.is_err());
    }

    #[test]
    fn test_truncate_text() {
        assert_eq!(truncate_text("hello", 10), "hello");
        assert_eq!(truncate_text("hello world", 5), "hello...");
        assert_eq!(truncate_text("hello\nworld", 20), "hello world");
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(500), "500 B");
        assert_eq!(format_bytes(1536), "1.50 KB");
        assert_eq!(format_bytes(1048576), "1.00 MB");
    }
}
