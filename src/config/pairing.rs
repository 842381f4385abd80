//! Pairing payload, `scheme://host[:port]/tpos/{tenant}?pos={location}&auth={token}`.

use std::{collections::HashMap, str::FromStr};

use serde_json::Value;
use snafu::prelude::*;

use super::{keys, ConfigError, ConfigStore};

/// Parse string as pairing payload error
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)), module(error), context(suffix(false)))]
pub enum ParsePairingError {
    /// the str is not a valid url
    #[snafu(display("{s} is an invalid url: {source}"))]
    InvalidURL {
        /// string be parsed
        s: String,
        /// source error
        source: url::ParseError,
    },

    /// the parsed url has no host
    #[snafu(display("the pairing url {s} has no host"))]
    NoHost {
        /// the url
        s: String,
    },

    /// the path is not `/tpos/{tenant}`
    #[snafu(display("the pairing url {s} has no /tpos/{{id}} path"))]
    NotTposPath {
        /// the url
        s: String,
    },

    /// missing or blank `pos` query
    #[snafu(display("the pairing url {s} has no pos"))]
    NoLocation {
        /// the url
        s: String,
    },

    /// missing or blank `auth` query
    #[snafu(display("the pairing url {s} has no auth"))]
    NoAuth {
        /// the url
        s: String,
    },
}

/// Parsed pairing payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairingPayload {
    /// `host[:port]`
    pub origin: String,
    /// tenant id, second path segment
    pub tenant_id: String,
    /// location id, from `pos` query
    pub location_id: String,
    /// bearer token, from `auth` query
    pub bearer: String,
}

impl PairingPayload {
    /// Persist the four identity keys in one batch.
    pub fn save_to(&self, store: &dyn ConfigStore) -> Result<(), ConfigError> {
        store.set_all(vec![
            (keys::ORIGIN, Value::String(self.origin.clone())),
            (keys::TENANT_ID, Value::String(self.tenant_id.clone())),
            (keys::BEARER, Value::String(self.bearer.clone())),
            (keys::LOCATION_ID, Value::String(self.location_id.clone())),
        ])?;

        log::info!("Saved config from pairing url");

        Ok(())
    }
}

impl FromStr for PairingPayload {
    type Err = ParsePairingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let url = url::Url::parse(s.trim())
            .with_context(|_| error::InvalidURL { s: s.to_string() })?;

        let host = url.host_str().context(error::NoHost { s })?;
        let origin = match url.port().or_else(|| written_port(s.trim())) {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        };

        let segments = url
            .path_segments()
            .map(|segs| segs.filter(|seg| !seg.is_empty()).collect::<Vec<_>>())
            .unwrap_or_default();

        ensure!(
            segments.len() >= 2 && segments[0] == "tpos",
            error::NotTposPath { s }
        );

        let tenant_id = segments[1].to_string();

        let query = url.query_pairs().collect::<HashMap<_, _>>();

        let location_id = query
            .get("pos")
            .filter(|val| !val.trim().is_empty())
            .context(error::NoLocation { s })?;

        let bearer = query
            .get("auth")
            .filter(|val| !val.trim().is_empty())
            .context(error::NoAuth { s })?;

        Ok(Self {
            origin,
            tenant_id,
            location_id: location_id.to_string(),
            bearer: bearer.to_string(),
        })
    }
}

/// Port as written in the authority of `s`.
///
/// `Url` forgets a port equal to the scheme default, but the origin must keep it.
fn written_port(s: &str) -> Option<u16> {
    let (_, rest) = s.split_once("://")?;
    let authority = rest.split(|c| matches!(c, '/' | '?' | '#')).next()?;
    let host_port = authority.rsplit('@').next()?;

    let port = match host_port.rfind(']') {
        Some(end) => host_port[end + 1..].strip_prefix(':')?,
        None => host_port.rsplit_once(':')?.1,
    };

    port.parse().ok()
}
