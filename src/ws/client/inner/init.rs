use snafu::prelude::*;

use super::{gateway::ClientStateGateway, ClientInner};
use crate::{config::ConnectionConfig, ws::ClientOptions};

/// Error when build feed url from config
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)), module(error), context(suffix(false)))]
pub(crate) enum FeedURLError {
    /// origin or tenant id is blank
    #[snafu(display("feed origin or tenant id is not configured"))]
    Unconfigured,

    /// config forms an invalid url
    #[snafu(display("{url} is an invalid feed url: {source}"))]
    InvalidURL {
        /// the url
        url: String,
        /// source error
        source: url::ParseError,
    },

    /// the url has no host
    #[snafu(display("the feed url {url} has no host"))]
    NoHost {
        /// the url
        url: String,
    },
}

#[derive(Debug)]
pub(crate) struct ClientStateInit {
    pub config: ConnectionConfig,
    pub options: ClientOptions,
}

impl ClientInner<ClientStateInit> {
    pub(crate) fn into_gateway(self) -> Result<ClientInner<ClientStateGateway>, FeedURLError> {
        let config = self.state.config;

        ensure!(config.has_feed_identity(), error::Unconfigured);

        let scheme = if self.state.options.secure { "wss" } else { "ws" };
        let raw = format!(
            "{}://{}/api/v1/ws/{}",
            scheme,
            config.origin.trim(),
            config.tenant_id.trim()
        );

        let url = url::Url::parse(&raw).with_context(|_| error::InvalidURL { url: &raw })?;

        ensure!(url.host().is_some(), error::NoHost { url: &raw });

        log::debug!("Feed url: {}", url);
        log::debug!("Move to gateway state");

        Ok(ClientInner {
            state: ClientStateGateway {
                url,
                options: self.state.options,
            },
        })
    }
}
