//! `verity resolve` command: show the TLS policy a host record resolves to.
//!
//! Reads a host record as JSON (the persisted camelCase form) and prints the
//! resolved `TlsPolicyChoice`. Exits non-zero when the host has no usable
//! policy and no default is configured.

use std::path::PathBuf;

use clap::Args;
use serde::Serialize;
use verity_agent::{PolicyResolution, TlsPolicyResolver};
use verity_core::{HostRecord, TlsPolicyChoice, VerityConfig, VerityError};

use crate::output::print_json;

#[derive(Args)]
pub struct ResolveArgs {
    /// Host record JSON file
    pub host_file: PathBuf,
}

/// Where the printed policy came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
enum PolicySource {
    Host,
    Default,
}

/// JSON output for the resolve command.
#[derive(Debug, Serialize)]
struct ResolveOutput {
    host: String,
    source: PolicySource,
    policy: TlsPolicyChoice,
}

pub async fn execute(
    args: ResolveArgs,
    config: &VerityConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let data = std::fs::read_to_string(&args.host_file)
        .map_err(|e| format!("Failed to read {}: {}", args.host_file.display(), e))?;
    let record: HostRecord = serde_json::from_str(&data)
        .map_err(|e| format!("Invalid host record {}: {}", args.host_file.display(), e))?;

    let resolver = TlsPolicyResolver::from_config(config);
    print_json(&resolve_host(&resolver, &record, config)?)
}

fn resolve_host(
    resolver: &TlsPolicyResolver,
    record: &HostRecord,
    config: &VerityConfig,
) -> Result<ResolveOutput, VerityError> {
    let host = record.label().to_string();

    let reason = match resolver.resolve_detailed(record) {
        PolicyResolution::Resolved(policy) => {
            return Ok(ResolveOutput {
                host,
                source: PolicySource::Host,
                policy,
            })
        }
        PolicyResolution::Unrecognized(name) => {
            format!("unrecognized legacy TLS policy '{}'", name)
        }
        PolicyResolution::NotConfigured => "no TLS policy".to_string(),
    };

    match config.default_policy_id() {
        Some(id) => Ok(ResolveOutput {
            host,
            source: PolicySource::Default,
            policy: TlsPolicyChoice::PolicyId(id.to_string()),
        }),
        None => Err(VerityError::missing(&host, reason)),
    }
}
