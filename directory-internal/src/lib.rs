pub mod access_gate; // page lock and quota decision for the contact listing
pub mod auth; // identity resolution from request headers
pub mod clock; // reference timezone and the quota day
pub mod config_parser; // directory gateway config file
pub mod endpoints; // API endpoints
pub mod error; // error handling
pub mod gateway_util; // utilities for gateway
pub mod listing; // agency and contact listing
pub mod observability; // utilities for observability (logs, metrics, etc.)
pub mod quota; // daily contact view quota
mod testing;

pub mod built_info {
    #![expect(clippy::allow_attributes)]
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}
