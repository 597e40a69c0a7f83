//! Realtime review fan-out over WebSockets.

pub mod hub;
pub mod protocol;
pub mod ws;

pub use hub::Hub;
pub use ws::HeartbeatConfig;
