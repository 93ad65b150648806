//! fieldsnap - OCR field extraction for Japanese business documents.
//!
//! Captures an image, runs it through a local-first inference pipeline, and
//! post-processes the text into clean phone numbers, company names, and
//! readings.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (before anything else)
    let _ = dotenvy::dotenv();

    let default_filter = if fieldsnap::cli::is_verbose() {
        "fieldsnap=info"
    } else {
        "fieldsnap=warn"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    fieldsnap::cli::run().await
}
