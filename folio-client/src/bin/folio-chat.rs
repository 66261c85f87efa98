//! folio-chat – talk to a folio relay from the terminal.
//!
//! Reads one prompt per line from stdin and prints the answer as it
//! streams in. `/quit` (or end of input) exits.

use std::io::Write;

use anyhow::Context;
use clap::Parser;
use folio_client::{ChatSession, RelayClient, SendError, send};
use folio_types::Role;
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Parser, Debug)]
#[command(name = "folio-chat")]
#[command(version, about = "Terminal chat against a folio relay")]
struct Cli {
    /// Base URL of the relay
    #[arg(long, env = "FOLIO_RELAY_URL", default_value = "http://localhost:3000")]
    url: String,

    /// Tracing filter for diagnostics on stderr
    #[arg(long, env = "FOLIO_LOG", default_value = "warn")]
    log: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let env_filter = tracing_subscriber::EnvFilter::try_new(&cli.log)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    let client = RelayClient::new(&cli.url).context("failed to build HTTP client")?;
    let mut session = ChatSession::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    println!("Connected to {} (type /quit to exit)", client.invoke_url());
    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else { break };
        let prompt = line.trim();
        if prompt == "/quit" {
            break;
        }

        let mut shown = String::new();
        let result = send(&client, &mut session, prompt, |snapshot| {
            let Some(last) = snapshot.last().filter(|m| m.role == Role::Assistant) else { return };
            print_suffix(&mut shown, &last.content);
        })
        .await;
        println!();

        match result {
            Ok(_) => {}
            Err(SendError::Submit(_)) => {}
            Err(e) => eprintln!("({e})"),
        }
    }

    Ok(())
}

/// Print what `content` adds to what is already on screen. Content that no
/// longer extends it (the error text) starts a fresh line.
fn print_suffix(shown: &mut String, content: &str) {
    let mut out = std::io::stdout();
    let _ = match content.strip_prefix(shown.as_str()) {
        Some(suffix) => write!(out, "{suffix}"),
        None => write!(out, "\n{content}"),
    };
    let _ = out.flush();
    shown.clear();
    shown.push_str(content);
}
