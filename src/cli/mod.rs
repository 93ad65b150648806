//! Command-line interface.
//!
//! Thin shell over the command engine: each subcommand maps to one engine
//! command, and responses are rendered for a terminal instead of JSON.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use console::style;

use crate::commands::{Command, CommandEngine, CommandResponse};
use crate::config::SettingsStore;
use crate::image::ImageBlob;
use crate::models::FieldType;

#[derive(Parser)]
#[command(name = "fieldsnap")]
#[command(about = "OCR field extraction for Japanese business documents")]
#[command(version)]
pub struct Cli {
    /// Config file path (overrides the default location)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum FieldArg {
    PhoneNumber,
    PayeeName,
    Phonetic,
    Clipboard,
    Freeform,
}

impl From<FieldArg> for FieldType {
    fn from(arg: FieldArg) -> Self {
        match arg {
            FieldArg::PhoneNumber => FieldType::PhoneNumber,
            FieldArg::PayeeName => FieldType::PayeeName,
            FieldArg::Phonetic => FieldType::Phonetic,
            FieldArg::Clipboard => FieldType::Clipboard,
            FieldArg::Freeform => FieldType::Freeform,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Extract text from an image file
    Process {
        /// Path to a PNG or JPEG image
        file: PathBuf,

        /// Semantic field to extract
        #[arg(long, value_enum)]
        field: Option<FieldArg>,

        /// Tab id for single-flight bookkeeping
        #[arg(long)]
        tab: Option<i64>,
    },

    /// Run the pipeline against a synthetic image
    Test,

    /// Show backend availability
    Status,

    /// Drop all cached results
    ClearCache,

    /// Verify an API key against the remote service
    TestKey {
        /// Key to verify
        key: String,
    },
}

/// Peek at argv for the verbose flag before clap runs, so logging can be
/// initialized first.
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let store = match &cli.config {
        Some(path) => SettingsStore::open(path.clone()),
        None => SettingsStore::open_default(),
    }
    .context("failed to open settings")?;

    let engine = CommandEngine::new(Arc::new(store))
        .await
        .context("failed to initialize command engine")?;

    match cli.command {
        Commands::Process { file, field, tab } => {
            let bytes = tokio::fs::read(&file)
                .await
                .with_context(|| format!("failed to read {}", file.display()))?;
            let mime = detect_mime(&bytes);
            let image = ImageBlob::new(bytes, mime);
            let response = engine
                .handle(Command::ProcessImage {
                    image_data: image.to_base64(),
                    field: field.map(FieldType::from),
                    tab_id: tab,
                })
                .await;
            render(&response);
        }
        Commands::Test => {
            let response = engine.handle(Command::TestOcr).await;
            render(&response);
        }
        Commands::Status => {
            let response = engine.handle(Command::GetOcrStatus).await;
            render(&response);
        }
        Commands::ClearCache => {
            let response = engine.handle(Command::ClearCache).await;
            render(&response);
        }
        Commands::TestKey { key } => {
            let response = engine.handle(Command::TestApiKey { api_key: key }).await;
            render(&response);
        }
    }

    Ok(())
}

fn render(response: &CommandResponse) {
    match response {
        CommandResponse::Ocr { outcome, .. } => {
            println!("{} {}", style("✓").green().bold(), outcome.text);
            if let Some(phone) = &outcome.phone {
                if !phone.is_empty() {
                    println!("  {} {}", style("phone:").dim(), phone);
                }
            }
            println!(
                "  {} {} ({:.0}% confidence, {}ms)",
                style("via").dim(),
                outcome.source.as_str(),
                outcome.confidence * 100.0,
                outcome.processing_time_ms
            );
        }
        CommandResponse::Status { status, .. } => {
            println!(
                "local model:  {}",
                availability(status.local_llm_available, &status.local_llm_status)
            );
            println!(
                "remote API:   {}",
                if status.gemini_api_available {
                    style("configured").green().to_string()
                } else {
                    style("no API key").yellow().to_string()
                }
            );
            println!("priority:     {}", status.current_priority);
        }
        CommandResponse::TestOcr { method, time, .. } => {
            println!(
                "{} pipeline ok via {} in {}ms",
                style("✓").green().bold(),
                method,
                time
            );
        }
        CommandResponse::Ack { message, .. } => {
            match message {
                Some(message) => println!("{} {}", style("✓").green().bold(), message),
                None => println!("{}", style("✓").green().bold()),
            }
        }
        CommandResponse::Error { error, .. } => {
            eprintln!("{} {}", style("✗").red().bold(), error);
        }
    }
}

fn availability(available: bool, detail: &str) -> String {
    if available {
        style("available").green().to_string()
    } else {
        format!("{} ({})", style("unavailable").yellow(), detail)
    }
}

/// MIME type from the file's magic bytes; unrecognized input is labelled PNG
/// and left for the pipeline's decode step to reject.
fn detect_mime(data: &[u8]) -> &'static str {
    image::guess_format(data)
        .map(|format| format.to_mime_type())
        .unwrap_or("image/png")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mime_detected_from_magic_bytes() {
        assert_eq!(
            detect_mime(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]),
            "image/png"
        );
        assert_eq!(detect_mime(&[0xFF, 0xD8, 0xFF, 0xE0]), "image/jpeg");
        assert_eq!(detect_mime(b"RIFF\x00\x00\x00\x00WEBPVP8 "), "image/webp");
        assert_eq!(detect_mime(b"not an image"), "image/png");
    }
}
