//! `verity anchors` command: list the legacy global trust anchors.

use clap::Args;
use serde::Serialize;
use verity_agent::trust::AnchorSnapshot;
use verity_agent::LegacyTrustAnchors;
use verity_core::VerityConfig;

use crate::output::{format_timestamp, new_table, print_json};

#[derive(Args)]
pub struct AnchorsArgs {
    /// Print JSON instead of a table
    #[arg(long)]
    pub json: bool,
}

/// JSON output entry for the anchors command.
#[derive(Debug, Serialize)]
struct AnchorEntry {
    subject: String,
    /// Base64 DER certificate
    certificate: String,
    /// Base64 DER SubjectPublicKeyInfo
    public_key: String,
}

fn entries(snapshot: &AnchorSnapshot) -> Vec<AnchorEntry> {
    snapshot
        .certificates()
        .iter()
        .map(|cert| AnchorEntry {
            subject: cert.subject().to_string(),
            certificate: cert.encoded_certificate(),
            public_key: cert.encoded_public_key(),
        })
        .collect()
}

pub async fn execute(
    args: AnchorsArgs,
    config: &VerityConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let anchors = LegacyTrustAnchors::from_config(config);
    let snapshot = anchors.snapshot();

    if let Some(error) = snapshot.error() {
        tracing::warn!(
            path = %anchors.path().display(),
            error = %error,
            "Trust anchors unavailable"
        );
    }

    if args.json {
        return print_json(&entries(&snapshot));
    }

    let mut table = new_table(&["#", "SUBJECT", "SIZE"]);
    for (i, cert) in snapshot.certificates().iter().enumerate() {
        table.add_row(vec![
            i.to_string(),
            cert.subject().to_string(),
            format!("{} B", cert.der().len()),
        ]);
    }
    println!("{table}");

    match snapshot.modified() {
        Some(modified) => println!(
            "\n{} certificate(s) from {}, modified {}",
            snapshot.len(),
            anchors.path().display(),
            format_timestamp(modified)
        ),
        None => println!("\nNo trust anchors at {}", anchors.path().display()),
    }
    Ok(())
}
