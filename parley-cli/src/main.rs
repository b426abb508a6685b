//! parley-cli — terminal client for the Parley HTTP API
//!
//! Talks to a running `parley-server` over its public JSON envelope.
//!
//! # Subcommands
//! - `ask <prompt> [--save]`                  — ask the model, optionally persist the pair
//! - `save --prompt <p> --response <r>`       — persist a prompt/response pair
//! - `history [--json]`                       — list the 50 most recent conversations
//! - `ping`                                   — liveness check

use clap::{Parser, Subcommand};
use serde::Deserialize;

const DEFAULT_SERVER: &str = "http://127.0.0.1:3001";

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Debug, Parser)]
#[command(
    name = "parley-cli",
    version,
    about = "Parley — ask an LLM, keep the answers"
)]
struct Cli {
    /// Parley HTTP server URL (overrides PARLEY_SERVER_URL env var)
    #[arg(long, env = "PARLEY_SERVER_URL", default_value = DEFAULT_SERVER)]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Send a prompt to the model and print the answer
    Ask {
        /// Prompt text
        prompt: String,

        /// Persist the prompt/response pair after a successful answer
        #[arg(long)]
        save: bool,
    },

    /// Persist a prompt/response pair
    Save {
        #[arg(long)]
        prompt: String,

        #[arg(long)]
        response: String,
    },

    /// Show the most recent conversations, newest first
    History {
        /// Print the raw JSON array instead of a readable listing
        #[arg(long)]
        json: bool,
    },

    /// Check that the server is alive
    Ping,
}

// ============================================================================
// API Response Types
// ============================================================================

/// The uniform `{ success, ... }` envelope. Payload fields are optional so a
/// single type parses every endpoint's reply.
#[derive(Debug, Deserialize)]
pub struct ApiEnvelope {
    pub success: bool,
    pub response: Option<String>,
    pub message: Option<String>,
    pub data: Option<Vec<HistoryEntry>>,
    pub error: Option<String>,
    pub details: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub id: String,
    pub prompt: String,
    pub response: String,
    pub created_at: String,
}

/// Turn a failed envelope into a one-line error message.
pub fn envelope_error(env: &ApiEnvelope) -> String {
    let base = env.error.clone().unwrap_or_else(|| "unknown error".to_string());
    match &env.details {
        Some(serde_json::Value::String(s)) => format!("{} ({})", base, s),
        Some(other) => format!("{} ({})", base, other),
        None => base,
    }
}

/// Single-line preview, capped at `max` characters.
pub fn preview(text: &str, max: usize) -> String {
    let line = text.lines().find(|l| !l.trim().is_empty()).unwrap_or("");
    let mut out: String = line.chars().take(max).collect();
    if line.chars().count() > max || text.lines().filter(|l| !l.trim().is_empty()).count() > 1 {
        out.push('…');
    }
    out
}

// ============================================================================
// HTTP Client Calls
// ============================================================================

fn client(timeout_secs: u64) -> anyhow::Result<reqwest::blocking::Client> {
    Ok(reqwest::blocking::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()?)
}

fn post_envelope(url: &str, body: serde_json::Value) -> anyhow::Result<ApiEnvelope> {
    let resp = client(90)?
        .post(url)
        .json(&body)
        .send()
        .map_err(|e| anyhow::anyhow!("connection failed to {}: {}", url, e))?;

    let status = resp.status();
    resp.json::<ApiEnvelope>()
        .map_err(|e| anyhow::anyhow!("server returned {} with unreadable body: {}", status, e))
}

fn do_save(server: &str, prompt: &str, response: &str) -> anyhow::Result<()> {
    let url = format!("{}/api/save", server);
    let env = post_envelope(
        &url,
        serde_json::json!({ "prompt": prompt, "response": response }),
    )?;

    if !env.success {
        anyhow::bail!(envelope_error(&env));
    }
    eprintln!("{}", env.message.as_deref().unwrap_or("Conversation saved"));
    Ok(())
}

fn do_ask(server: &str, prompt: &str, save: bool) -> anyhow::Result<()> {
    let url = format!("{}/api/ask-ai", server);
    let env = post_envelope(&url, serde_json::json!({ "prompt": prompt }))?;

    if !env.success {
        anyhow::bail!(envelope_error(&env));
    }

    let answer = env.response.unwrap_or_default();
    println!("{}", answer);

    if save {
        do_save(server, prompt, &answer)?;
    }
    Ok(())
}

fn do_history(server: &str, json_output: bool) -> anyhow::Result<()> {
    let url = format!("{}/api/history", server);
    let resp = client(30)?
        .get(&url)
        .send()
        .map_err(|e| anyhow::anyhow!("connection failed to {}: {}", url, e))?;
    let env: ApiEnvelope = resp.json()?;

    if !env.success {
        anyhow::bail!(envelope_error(&env));
    }

    let entries = env.data.unwrap_or_default();

    if json_output {
        let items: Vec<serde_json::Value> = entries
            .iter()
            .map(|e| {
                serde_json::json!({
                    "id": e.id,
                    "prompt": e.prompt,
                    "response": e.response,
                    "createdAt": e.created_at,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&items)?);
        return Ok(());
    }

    if entries.is_empty() {
        eprintln!("No conversations saved yet");
        return Ok(());
    }
    for e in &entries {
        println!("{}  {}", e.created_at, e.id);
        println!("  > {}", preview(&e.prompt, 80));
        println!("  < {}\n", preview(&e.response, 80));
    }
    Ok(())
}

fn do_ping(server: &str) -> anyhow::Result<()> {
    let url = format!("{}/ping", server);
    match client(10)?.get(&url).send() {
        Ok(r) if r.status().is_success() => {
            let body: serde_json::Value = r.json().unwrap_or_default();
            println!("Parley server: {}", body["status"].as_str().unwrap_or("unknown"));
            println!("Timestamp:     {}", body["timestamp"].as_str().unwrap_or("?"));
            Ok(())
        }
        Ok(r) => anyhow::bail!("server unhealthy (HTTP {})", r.status()),
        Err(e) => anyhow::bail!("cannot reach {} — {}", url, e),
    }
}

// ============================================================================
// Main
// ============================================================================

fn main() {
    let cli = Cli::parse();
    let server = cli.server.trim_end_matches('/').to_string();

    let result = match cli.command {
        Commands::Ask { prompt, save } => do_ask(&server, &prompt, save),
        Commands::Save { prompt, response } => do_save(&server, &prompt, &response),
        Commands::History { json } => do_history(&server, json),
        Commands::Ping => do_ping(&server),
    };

    if let Err(e) = result {
        eprintln!("parley-cli: {}", e);
        std::process::exit(1);
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_ask_success_envelope() {
        let env: ApiEnvelope =
            serde_json::from_str(r#"{"success":true,"response":"Hi there!"}"#).unwrap();
        assert!(env.success);
        assert_eq!(env.response.as_deref(), Some("Hi there!"));
    }

    #[test]
    fn test_parses_history_envelope() {
        let raw = r#"{"success":true,"data":[
            {"id":"7b5c24ab-1234-5678-9abc-def012345678","prompt":"Hello","response":"Hi there!","createdAt":"2026-02-23T10:00:00Z"}
        ]}"#;
        let env: ApiEnvelope = serde_json::from_str(raw).unwrap();
        let data = env.data.unwrap();
        assert_eq!(data.len(), 1);
        assert_eq!(data[0].prompt, "Hello");
        assert_eq!(data[0].created_at, "2026-02-23T10:00:00Z");
    }

    #[test]
    fn test_envelope_error_includes_details() {
        let env: ApiEnvelope = serde_json::from_str(
            r#"{"success":false,"error":"Failed to get AI response","details":"timeout"}"#,
        )
        .unwrap();
        assert_eq!(envelope_error(&env), "Failed to get AI response (timeout)");

        let env: ApiEnvelope =
            serde_json::from_str(r#"{"success":false,"error":"Prompt is required"}"#).unwrap();
        assert_eq!(envelope_error(&env), "Prompt is required");
    }

    #[test]
    fn test_envelope_error_without_message_falls_back() {
        let env: ApiEnvelope = serde_json::from_str(r#"{"success":false}"#).unwrap();
        assert_eq!(envelope_error(&env), "unknown error");
    }

    #[test]
    fn test_preview_truncates_and_marks() {
        assert_eq!(preview("short", 80), "short");
        assert_eq!(preview(&"A".repeat(100), 10), format!("{}…", "A".repeat(10)));
        assert_eq!(preview("\n\nfirst\nsecond", 80), "first…");
        assert_eq!(preview("", 80), "");
    }
}
