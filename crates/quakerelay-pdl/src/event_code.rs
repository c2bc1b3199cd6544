use std::fmt;

use crate::error::PdlError;

/// Regional seismic network prefixes known to issue alert products. Event
/// codes are `<network><product-code>` with no separator, so this table is
/// what lets us tell where the network id stops.
pub const KNOWN_NETWORK_PREFIXES: [&str; 9] =
    ["bk", "ci", "cidev", "ew", "nc", "nn", "pt", "us", "uw"];

// Two characters of network id plus at least eight of product code.
const MIN_EVENT_CODE_LEN: usize = 10;

/// A composite PDL event code split into its network source and product
/// code. Only constructed through [`EventCode::parse`]; the invariants
/// (alphabetic source of length >= 2, overall length >= 10) hold for every
/// instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventCode {
    source: String,
    code: String,
}

impl EventCode {
    /// Splits a raw event code such as `ew1665727384` or `cidev123456789`.
    ///
    /// The longest entry of [`KNOWN_NETWORK_PREFIXES`] that prefixes the
    /// input wins (`cidev...` parses as `cidev`, never `ci`). Unrecognized
    /// prefixes fall back to the first two characters so a stale table
    /// degrades to a guess instead of an outage; the fallback is rejected
    /// when those characters are not alphabetic, which catches bare product
    /// codes passed without a network id.
    pub fn parse(raw: &str) -> Result<EventCode, PdlError> {
        if raw.chars().count() < MIN_EVENT_CODE_LEN {
            return Err(PdlError::MalformedEventCode {
                raw: raw.to_string(),
                reason: format!("shorter than the minimum of {MIN_EVENT_CODE_LEN} characters"),
            });
        }

        let matched = KNOWN_NETWORK_PREFIXES
            .iter()
            .filter(|prefix| raw.starts_with(**prefix))
            .max_by_key(|prefix| prefix.len());
        if let Some(prefix) = matched {
            return Ok(EventCode {
                source: (*prefix).to_string(),
                code: raw[prefix.len()..].to_string(),
            });
        }

        let source: String = raw.chars().take(2).collect();
        let code: String = raw.chars().skip(2).collect();
        if !source.chars().all(char::is_alphabetic) {
            return Err(PdlError::MalformedEventCode {
                raw: raw.to_string(),
                reason: format!("no alphabetic network prefix found (got \"{source}\")"),
            });
        }
        tracing::warn!(
            event_code = raw,
            assumed_source = %source,
            "unrecognized network prefix, defaulting to the first two characters; \
             the known-network table likely needs a new entry"
        );

        Ok(EventCode { source, code })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    /// The wire form used for `--code=`: source and product code rejoined.
    pub fn combined(&self) -> String {
        format!("{}{}", self.source, self.code)
    }
}

impl fmt::Display for EventCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.source, self.code)
    }
}
