pub mod chain;
pub mod handshake;
pub mod service;
pub mod transport;
