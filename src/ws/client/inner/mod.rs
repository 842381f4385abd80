mod backoff;
mod gateway;
mod init;
mod streaming;
mod supervisor;

pub(super) use supervisor::{Command, Supervisor};

pub use gateway::ConnectGatewayError;
pub use streaming::{ConnectionError, EventStream};

/// One feed connection attempt, moving through init -> gateway -> streaming.
#[derive(Debug)]
pub(crate) struct ClientInner<S> {
    pub state: S,
}
