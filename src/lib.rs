//! # minipd
//!
//! A client for a replicated placement driver (PD) cluster with:
//! - Leader discovery from a list of seed addresses
//! - Transparent failover when the leader moves or reports a cluster error
//! - Globally ordered timestamps from the timestamp oracle (TSO)
//! - Key → region, region id → region and store id → store lookups
//!
//! ## Architecture
//!
//! ```text
//!  caller
//!    │  get_timestamp / get_region_by_key / get_store ...
//! ┌──▼──────────────────────────────┐
//! │ PdClient (facade)               │
//! │   CallExecutor ── retry loop ───┼──► failover ─┐
//! └──┬──────────────────────────────┘              │
//!    │ current()                                   │
//! ┌──▼──────────────────────────────┐              │
//! │ LeaderTracker                   │◄─────────────┘
//! │   LeaderHandle {addr, stub}     │◄── Refresher (every 60s)
//! └──┬──────────────────────────────┘
//!    │ gRPC (ChannelFactory)
//! ┌──▼───────┐  ┌──────────┐  ┌──────────┐
//! │  PD 1    │  │  PD 2    │  │  PD 3    │
//! │ (leader) │  │          │  │          │
//! └──────────┘  └──────────┘  └──────────┘
//! ```
//!
//! ## Usage
//!
//! ```no_run
//! # async fn run() -> minipd::Result<()> {
//! use minipd::{PdClient, PdConfig};
//!
//! let client = PdClient::connect(PdConfig::new(["10.0.0.1:2379", "10.0.0.2:2379"])).await?;
//! let ts = client.get_timestamp().await?;
//! let region = client.get_region_by_key(b"user_42").await?;
//! println!("{:?} {}", ts, region.id());
//! client.close();
//! # Ok(())
//! # }
//! ```
//!
//! ### CLI
//! ```bash
//! minipd --pd 10.0.0.1:2379,10.0.0.2:2379 tso
//! minipd --pd 10.0.0.1:2379 region --key user_42
//! minipd --pd 10.0.0.1:2379 store 1 --json
//! ```

#![allow(clippy::result_large_err)]

pub mod common;
pub mod pd;
pub mod proto;

// Re-export commonly used types
pub use common::{Error, PdConfig, Result};
pub use pd::{BlockingPdClient, IsolationLevel, PdClient, Region, Timestamp};

/// Current version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build info
pub const BUILD_INFO: &str = concat!(env!("CARGO_PKG_VERSION"), " (", env!("CARGO_PKG_NAME"), ")");
