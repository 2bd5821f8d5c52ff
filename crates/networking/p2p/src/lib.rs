pub mod constants;
pub mod network_state;
pub mod peer;
pub mod req_resp;
