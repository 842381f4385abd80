//! Backend HTTP API response types

use serde::Deserialize;

/// data type for api `/api/v1/fiat/stripe/connection_token`
#[derive(Debug, Deserialize)]
pub struct ConnectionTokenData {
    /// connection token secret
    #[serde(default)]
    pub secret: Option<String>,
}
