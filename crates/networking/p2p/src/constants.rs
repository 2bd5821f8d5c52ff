use std::time::Duration;

/// The maximum allowed size of an uncompressed request or response payload.
pub const MAX_PAYLOAD_SIZE: u64 = 10485760;

/// Default deadline for a single request/response round trip.
pub const RESP_TIMEOUT: Duration = Duration::from_secs(10);
