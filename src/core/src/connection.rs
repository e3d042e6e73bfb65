//! Vendor connection string parsing.
//!
//! Parses descriptors like `vmware:https://vcenter.example.com:443/sdk;admin;secret`
//! into a vendor tag, a management URL and optional credentials.

use crate::error::{Result, VerityError};
use crate::vendor::Vendor;

/// Placeholder printed instead of a password.
const REDACTED: &str = "***";

/// Parsed vendor connection string.
///
/// Only produced by [`ConnectionString::parse`]; there is no default value.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionString {
    vendor: Vendor,
    /// URL text exactly as given
    url: String,
    parsed_url: url::Url,
    username: Option<String>,
    password: Option<String>,
    /// Host record fallbacks describing the attested host itself
    host_name: Option<String>,
    ip_address: Option<String>,
    port: Option<u16>,
}

impl ConnectionString {
    /// Parse `<vendor>:<url>[;<username>;<password>]`.
    ///
    /// `host_name`, `ip_address` and `port` come from the host record. They never
    /// change the vendor, url or credentials; they describe the attested host,
    /// which can differ from the management server named in the url.
    pub fn parse(
        text: &str,
        host_name: Option<&str>,
        ip_address: Option<&str>,
        port: Option<u16>,
    ) -> Result<Self> {
        let text = text.trim();
        if text.is_empty() {
            let present = |s: &&str| !s.trim().is_empty();
            let host = host_name
                .filter(present)
                .or(ip_address.filter(present))
                .unwrap_or("<unknown>");
            return Err(VerityError::missing(host, "no vendor connection string"));
        }

        let (vendor_part, rest) = text
            .split_once(':')
            .ok_or_else(|| parse_error(text, "expected '<vendor>:<url>'"))?;

        let vendor: Vendor = vendor_part.parse().map_err(|e| parse_error(text, e))?;

        let mut parts = rest.splitn(3, ';');
        let url_text = parts.next().unwrap_or_default().trim();
        let username = parts.next();
        let password = parts.next();

        if url_text.is_empty() {
            return Err(parse_error(text, "empty url"));
        }

        let (username, password) = match (username, password) {
            (None, None) => (None, None),
            (Some(u), Some(p)) => (Some(u.to_string()), Some(p.to_string())),
            _ => return Err(parse_error(text, "username given without password")),
        };

        let parsed_url = url::Url::parse(url_text)
            .map_err(|e| parse_error(text, format!("invalid url: {}", e)))?;
        if parsed_url.host_str().map_or(true, str::is_empty) {
            return Err(parse_error(text, "url has no host"));
        }

        Ok(Self {
            vendor,
            url: url_text.to_string(),
            parsed_url,
            username,
            password,
            host_name: non_empty(host_name),
            ip_address: non_empty(ip_address),
            port: port.filter(|p| *p != 0),
        })
    }

    pub fn vendor(&self) -> Vendor {
        self.vendor
    }

    /// Lowercase protocol tag of the vendor (`intel`, `citrix`, `vmware`).
    pub fn vendor_protocol(&self) -> &'static str {
        self.vendor.protocol_tag()
    }

    /// The url exactly as it appeared in the connection text.
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    pub fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }

    /// Host component of the url.
    ///
    /// This is the network target the agent connects to. For vCenter or
    /// XenCenter it is the management server, not the attested host.
    pub fn management_server_name(&self) -> &str {
        self.parsed_url.host_str().unwrap_or_default()
    }

    /// Port of the management server: explicit url port, then the scheme
    /// default, then the host record port.
    pub fn management_port(&self) -> Option<u16> {
        self.parsed_url.port_or_known_default().or(self.port)
    }

    /// Address of the attested host from the record (hostname preferred over IP).
    pub fn attested_address(&self) -> Option<&str> {
        self.host_name.as_deref().or(self.ip_address.as_deref())
    }

    /// Connection text without the vendor prefix, credentials included.
    pub fn connection_string(&self) -> String {
        match (&self.username, &self.password) {
            (Some(u), Some(p)) => format!("{};{};{}", self.url, u, p),
            _ => self.url.clone(),
        }
    }

    /// Full connection text including the vendor prefix and credentials.
    pub fn to_prefixed_string(&self) -> String {
        format!("{}:{}", self.vendor_protocol(), self.connection_string())
    }
}

impl std::str::FromStr for ConnectionString {
    type Err = VerityError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s, None, None, None)
    }
}

impl std::fmt::Display for ConnectionString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.vendor_protocol(), self.url)?;
        if let Some(ref username) = self.username {
            write!(f, ";{};{}", username, REDACTED)?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for ConnectionString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionString")
            .field("vendor", &self.vendor)
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| REDACTED))
            .field("host_name", &self.host_name)
            .field("ip_address", &self.ip_address)
            .field("port", &self.port)
            .finish()
    }
}

/// Replace the password segment of raw connection text.
pub fn redact(text: &str) -> String {
    let mut parts = text.splitn(3, ';');
    let head = parts.next().unwrap_or_default();
    match (parts.next(), parts.next()) {
        (Some(user), Some(_)) => format!("{};{};{}", head, user, REDACTED),
        (Some(user), None) => format!("{};{}", head, user),
        _ => head.to_string(),
    }
}

fn parse_error(text: &str, reason: impl Into<String>) -> VerityError {
    VerityError::Parse {
        input: redact(text),
        reason: reason.into(),
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
