//! HTTP client gateway (v1)
//!
//! # Architecture Overview
//!
//! ```text
//!                  ┌───────────────────────────────────────────────────────┐
//!                  │                      GATEWAY                          │
//!   inbound        │  ┌──────────┐   ┌──────────┐   ┌───────────┐          │
//!   messages ──────┼─▶│descriptor│──▶│  rate    │──▶│ multipart │          │
//!   (stdin)        │  │ builder  │   │ limiter  │   │ assembler │          │
//!                  │  └──────────┘   └──────────┘   └─────┬─────┘          │
//!                  │                                      ▼                │
//!                  │  ┌──────────┐   ┌──────────┐   ┌───────────┐          │      Upstream
//!                  │  │ retry    │◀──│ response │◀──│   http    │◀─────────┼───── HTTP
//!                  │  │classifier│   │descriptor│   │ dispatcher│──────────┼────▶ server
//!                  │  └────┬─────┘   └──────────┘   └───────────┘          │
//!                  │       ▼                                               │
//!                  │  ┌────────────┐   ┌──────────┐                        │
//!                  │  │externalizer│──▶│ outcome  │──▶ output              │
//!                  │  │ + analytics│   │  router  │──▶ retry_feedback      │
//!                  │  └────────────┘   └──────────┘──▶ analytics  (stdout) │
//!                  └───────────────────────────────────────────────────────┘
//! ```
//!
//! Inbound messages are JSON lines `{"headers": {...}, "payload": ...}`;
//! every routed message is written back as a JSON line tagged with its sink.

use clap::Parser;
use serde::Serialize;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use httpclient_gateway::config::{load_config, GatewayConfig};
use httpclient_gateway::lifecycle::{signals, startup, Shutdown};
use httpclient_gateway::{Message, RunningGateway, Sink};

#[derive(Parser)]
#[command(name = "httpclient-gateway")]
#[command(about = "Turns request messages into HTTP calls and responses back into messages", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[derive(Serialize)]
struct RoutedLine<'a> {
    sink: &'static str,
    #[serde(flatten)]
    message: &'a Message,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => GatewayConfig::default(),
    };

    let gateway = startup::initialize(&config)?;
    tracing::info!("httpclient-gateway v0.1.0 starting");

    let shutdown = Shutdown::new();
    let RunningGateway { input, sinks, task } = gateway.start(shutdown.subscribe());

    let writers = [
        spawn_writer(Sink::Output, sinks.output),
        spawn_writer(Sink::RetryFeedback, sinks.retry_feedback),
        spawn_writer(Sink::Analytics, sinks.analytics),
    ];

    let mut reader = tokio::spawn(forward_stdin(input, shutdown.subscribe()));
    tokio::select! {
        _ = signals::shutdown_signal() => shutdown.trigger(),
        _ = &mut reader => {}
    }

    task.await?;
    for writer in writers {
        writer.await?;
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Feed stdin JSON lines into the gateway until EOF or shutdown.
async fn forward_stdin(input: mpsc::Sender<Message>, mut shutdown: broadcast::Receiver<()>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            _ = shutdown.recv() => break,
            line = lines.next_line() => line,
        };
        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                tracing::error!(error = %e, "Failed to read stdin");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<Message>(&line) {
            Ok(message) => {
                if input.send(message).await.is_err() {
                    break;
                }
            }
            Err(e) => tracing::warn!(error = %e, "Skipping unparsable input line"),
        }
    }
}

fn spawn_writer(sink: Sink, mut rx: mpsc::Receiver<Message>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            let line = RoutedLine {
                sink: sink.as_str(),
                message: &message,
            };
            match serde_json::to_string(&line) {
                Ok(json) => println!("{}", json),
                Err(e) => tracing::error!(sink = %sink, error = %e, "Failed to encode message"),
            }
        }
    })
}
