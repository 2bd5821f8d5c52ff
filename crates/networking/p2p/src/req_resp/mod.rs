pub mod codec;
pub mod error;
pub mod messages;
pub mod protocol_id;
