//! Placement driver client
//!
//! The client is responsible for:
//! - Tracking the PD leader (discovery, gated failover, periodic refresh)
//! - Retrying calls across leader changes
//! - Timestamp allocation over a duplex stream
//! - Region and store lookups

pub mod blocking;
pub mod channel;
pub mod client;
pub mod executor;
pub mod leader;
pub mod refresher;
pub mod region;
pub mod timestamp;

pub use blocking::BlockingPdClient;
pub use channel::{ChannelFactory, GrpcChannelFactory, GrpcPdStub, PdRpc};
pub use client::{ClientState, PdClient};
pub use executor::{cluster_error, CallExecutor, CallFuture, PdResponse};
pub use leader::{FailoverOutcome, LeaderHandle, LeaderTracker};
pub use region::{IsolationLevel, Region};
pub use timestamp::Timestamp;
