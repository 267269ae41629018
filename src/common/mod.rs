//! Common utilities and types shared across minipd

pub mod codec;
pub mod config;
pub mod error;
pub mod utils;

pub use codec::{decode_bytes, encode_bytes};
pub use config::PdConfig;
pub use error::{Error, Result};
pub use utils::{normalize_member_url, parse_duration};
