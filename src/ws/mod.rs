//! Backend event feed client
//!
//! The feed is one long lived websocket at `wss://{origin}/api/v1/ws/{tenant}`,
//! every text frame carries a [`PaymentEvent`].

mod client;
pub mod message;

pub use client::{
    Client, ClientOptions, ConnectGatewayError, ConnectionError, ConnectionState, EventStream,
};
pub use message::{NotActionable, PaymentEvent, PaymentRequest};
