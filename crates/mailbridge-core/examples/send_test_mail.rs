//! Send the Graph API connection probe for a configured identity
//!
//! Run with: cargo run -p mailbridge-core --example send_test_mail
//!
//! Expects the Azure app registration in the environment:
//! MAILBRIDGE_CLIENT_ID, MAILBRIDGE_CLIENT_SECRET, MAILBRIDGE_TENANT_ID,
//! MAILBRIDGE_SENDER. Without a stored refresh token the client-credentials
//! grant is used, so the app needs the application Mail.Send permission.

use anyhow::Context;
use mailbridge_core::{Credential, DiagnosticsLog, Mailer};
use std::sync::Arc;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?
        .block_on(run())
}

async fn run() -> anyhow::Result<()> {
    let credential = Credential {
        client_id: env("MAILBRIDGE_CLIENT_ID")?,
        client_secret: env("MAILBRIDGE_CLIENT_SECRET")?,
        tenant_id: env("MAILBRIDGE_TENANT_ID")?,
        sender_email: env("MAILBRIDGE_SENDER")?,
        redirect_uri: None,
    };

    let diagnostics = Arc::new(DiagnosticsLog::default());
    let mailer = Mailer::new(credential, None, diagnostics.clone())?;

    println!("Sending connection probe...");
    match mailer.test_connection().await {
        Ok(receipt) => {
            println!("Accepted with status {}", receipt.status);
            if let Some(request_id) = receipt.request_id {
                println!("Graph request-id: {}", request_id);
            }
        }
        Err(e) => println!("Probe failed: {}", e),
    }

    println!("\nDiagnostics:");
    for entry in diagnostics.recent(10).iter().rev() {
        println!("  [{}] {} {}", entry.level, entry.timestamp, entry.message);
    }

    Ok(())
}

fn env(name: &str) -> anyhow::Result<String> {
    std::env::var(name).with_context(|| format!("{} is not set", name))
}
