//! Utility functions for minipd

use crate::common::{Error, Result};
use tonic::codegen::http::Uri;

/// Strip the scheme from a member client URL, keeping `host:port`.
///
/// PD reports client URLs such as `http://10.0.0.2:2379`; channels are keyed
/// by the bare address. Inputs without a scheme are accepted as-is once they
/// parse as an authority.
pub fn normalize_member_url(url: &str) -> Result<String> {
    let url = url.trim();
    let uri: Uri = url
        .parse()
        .map_err(|e| Error::InvalidUrl(format!("{}: {}", url, e)))?;

    let host = uri
        .host()
        .filter(|h| !h.is_empty())
        .ok_or_else(|| Error::InvalidUrl(format!("{}: missing host", url)))?;
    let port = uri
        .port_u16()
        .ok_or_else(|| Error::InvalidUrl(format!("{}: missing port", url)))?;

    Ok(format!("{}:{}", host, port))
}

/// Parse duration string (e.g., "500ms", "30s", "5m", "1h")
pub fn parse_duration(s: &str) -> Result<std::time::Duration> {
    let s = s.trim();
    if s.is_empty() {
        return Err(Error::InvalidConfig("empty duration".into()));
    }

    let (num_str, unit) = if let Some(num) = s.strip_suffix("ms") {
        (num, "ms")
    } else {
        s.split_at(s.len() - s.chars().last().map_or(0, char::len_utf8))
    };

    let num: u64 = num_str
        .parse()
        .map_err(|_| Error::InvalidConfig(format!("invalid duration: {}", s)))?;

    let (num, unit_secs) = match unit {
        "ms" => return Ok(std::time::Duration::from_millis(num)),
        "s" => (num, 1),
        "m" => (num, 60),
        "h" => (num, 3600),
        _ => {
            return Err(Error::InvalidConfig(format!(
                "unknown duration unit: {}",
                unit
            )))
        }
    };

    num.checked_mul(unit_secs)
        .map(std::time::Duration::from_secs)
        .ok_or_else(|| Error::InvalidConfig(format!("duration out of range: {}", s)))
}
