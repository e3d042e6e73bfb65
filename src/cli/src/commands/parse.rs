//! `verity parse` command: parse a vendor connection string.
//!
//! Prints the parsed connection as JSON. The password is never printed.

use clap::Args;
use serde::Serialize;
use verity_core::ConnectionString;

use crate::output::print_json;

#[derive(Args)]
pub struct ParseArgs {
    /// Connection string, `<vendor>:<url>[;<username>;<password>]`
    pub connection: String,

    /// Host name of the attested host
    #[arg(long)]
    pub host: Option<String>,

    /// IP address of the attested host
    #[arg(long)]
    pub ip: Option<String>,

    /// Port of the attested host
    #[arg(long)]
    pub port: Option<u16>,
}

/// JSON output for the parse command.
#[derive(Debug, Serialize)]
struct ParseOutput {
    vendor: String,
    protocol: &'static str,
    url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    username: Option<String>,
    /// Whether credentials carry a password
    has_password: bool,
    management_server: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    management_port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    attested_address: Option<String>,
    /// Canonical form with the password redacted
    display: String,
}

impl From<&ConnectionString> for ParseOutput {
    fn from(conn: &ConnectionString) -> Self {
        Self {
            vendor: conn.vendor().to_string(),
            protocol: conn.vendor_protocol(),
            url: conn.url().to_string(),
            username: conn.username().map(str::to_string),
            has_password: conn.password().is_some(),
            management_server: conn.management_server_name().to_string(),
            management_port: conn.management_port(),
            attested_address: conn.attested_address().map(str::to_string),
            display: conn.to_string(),
        }
    }
}

pub async fn execute(args: ParseArgs) -> Result<(), Box<dyn std::error::Error>> {
    let conn = ConnectionString::parse(
        &args.connection,
        args.host.as_deref(),
        args.ip.as_deref(),
        args.port,
    )?;
    print_json(&ParseOutput::from(&conn))
}
