use std::net::IpAddr;
use url::{Host, Url};

/// Accepts `true/false`, `1/0`, `yes/no` and `on/off`, ignoring case.
pub fn parse_bool_flag(raw: &str) -> Option<bool> {
    let lowered = raw.trim().to_ascii_lowercase();
    match lowered.as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Boolean env flag; unset or unparsable values yield `default`.
pub fn env_flag(name: &str, default: bool) -> bool {
    std::env::var(name)
        .ok()
        .as_deref()
        .and_then(parse_bool_flag)
        .unwrap_or(default)
}

/// True when `url` points at this machine: `localhost`, a loopback address
/// or the unspecified address.
pub fn is_local_endpoint_url(url: &str) -> bool {
    let Ok(parsed) = Url::parse(url.trim()) else {
        return false;
    };
    let ip = match parsed.host() {
        Some(Host::Domain(domain)) => return domain.eq_ignore_ascii_case("localhost"),
        Some(Host::Ipv4(addr)) => IpAddr::V4(addr),
        Some(Host::Ipv6(addr)) => IpAddr::V6(addr),
        None => return false,
    };
    ip.is_loopback() || ip.is_unspecified()
}

/// Lower-cased scheme of `url`, if it parses.
pub fn url_scheme(url: &str) -> Option<String> {
    Url::parse(url.trim())
        .ok()
        .map(|parsed| parsed.scheme().to_ascii_lowercase())
}
