// xpanel-api: Async Rust client for the X-Plane web API (REST + websocket)

pub mod client;
pub mod error;
pub mod models;
pub mod transport;
pub mod websocket;

pub use client::SimClient;
pub use error::Error;
pub use models::{CommandId, DatarefId, PushUpdate, PushValue};
pub use transport::TransportConfig;
pub use websocket::DatarefSubscription;
