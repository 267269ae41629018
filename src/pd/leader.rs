//! PD leader tracking
//!
//! [`LeaderTracker`] owns the only mutable shared state of the client: the
//! current [`LeaderHandle`], whose install time doubles as the failover rate
//! gate. Handles are immutable and swapped whole; readers get an `Arc`
//! snapshot and keep using it even after a newer handle has been installed.

use crate::common::{normalize_member_url, Error, PdConfig, Result};
use crate::pd::channel::{ChannelFactory, PdRpc};
use crate::proto::pdpb;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Immutable snapshot of the connection to one PD leader.
pub struct LeaderHandle {
    address: String,
    stub: Arc<dyn PdRpc>,
    created_at: Instant,
}

impl LeaderHandle {
    fn new(address: String, stub: Arc<dyn PdRpc>) -> Self {
        Self {
            address,
            stub,
            created_at: Instant::now(),
        }
    }

    /// Bare `host:port` of the leader
    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn stub(&self) -> &Arc<dyn PdRpc> {
        &self.stub
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }
}

impl std::fmt::Debug for LeaderHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LeaderHandle")
            .field("address", &self.address)
            .field("created_at", &self.created_at)
            .finish()
    }
}

/// What a [`LeaderTracker::failover`] call ended up doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailoverOutcome {
    /// A new handle is current
    Installed,
    /// The reported leader is the current one
    Unchanged,
    /// Skipped: the current handle was installed within the gate window
    Gated,
    /// No membership information or no leader URL
    Unavailable,
    /// Membership was fetched but the leader could not be used
    Failed,
    /// The tracker was released
    Closed,
}

/// Holds the current PD leader and moves it when leadership changes.
pub struct LeaderTracker {
    seeds: Vec<String>,
    factory: Arc<dyn ChannelFactory>,
    timeout: Duration,
    gate: Duration,
    current: RwLock<Option<Arc<LeaderHandle>>>,
    failover_lock: Mutex<()>,
    closed: AtomicBool,
}

impl LeaderTracker {
    pub fn new(config: &PdConfig, factory: Arc<dyn ChannelFactory>) -> Self {
        Self {
            seeds: config
                .pd_addrs
                .iter()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            factory,
            timeout: config.timeout(),
            gate: config.failover_gate(),
            current: RwLock::new(None),
            failover_lock: Mutex::new(()),
            closed: AtomicBool::new(false),
        }
    }

    /// Current leader handle.
    pub fn current(&self) -> Result<Arc<LeaderHandle>> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::Closed);
        }
        self.snapshot().ok_or(Error::NoLeader)
    }

    fn snapshot(&self) -> Option<Arc<LeaderHandle>> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Probe the seeds in order and return the first membership answer.
    pub async fn discover_members(&self) -> Option<pdpb::GetMembersResponse> {
        for seed in &self.seeds {
            match self.query_members(seed).await {
                Ok(resp) => return Some(resp),
                Err(e) => tracing::debug!("PD seed {} unavailable: {}", seed, e),
            }
        }
        tracing::warn!("No PD seed answered the membership query ({:?})", self.seeds);
        None
    }

    async fn query_members(&self, seed: &str) -> Result<pdpb::GetMembersResponse> {
        let address = normalize_member_url(seed)?;
        let stub = self.factory.connect(&address)?;
        let request = pdpb::GetMembersRequest {
            header: Some(pdpb::RequestHeader::default()),
        };
        match tokio::time::timeout(self.timeout, stub.get_members(request)).await {
            Ok(resp) => Ok(resp?),
            Err(_) => Err(Error::Grpc(tonic::Status::deadline_exceeded(format!(
                "GetMembers exceeded {:?}",
                self.timeout
            )))),
        }
    }

    /// Point the tracker at the leader reported by `hint`, or by a fresh
    /// membership query when no hint is given.
    ///
    /// Concurrent calls are serialized. Once a handle is installed, further
    /// calls within the gate window do nothing. Failures keep the previous
    /// handle.
    pub async fn failover(&self, hint: Option<pdpb::GetMembersResponse>) -> FailoverOutcome {
        let requested_at = Instant::now();
        let _guard = self.failover_lock.lock().await;

        if self.closed.load(Ordering::Acquire) {
            return FailoverOutcome::Closed;
        }
        if let Some(handle) = self.snapshot() {
            // someone else switched leaders while we waited for the lock
            if handle.created_at > requested_at {
                return FailoverOutcome::Gated;
            }
            if requested_at.saturating_duration_since(handle.created_at) < self.gate {
                return FailoverOutcome::Gated;
            }
        }

        self.switch_leader(hint).await
    }

    async fn switch_leader(&self, hint: Option<pdpb::GetMembersResponse>) -> FailoverOutcome {
        let members = match hint {
            Some(members) => members,
            None => match self.discover_members().await {
                Some(members) => members,
                None => return FailoverOutcome::Unavailable,
            },
        };

        let Some(url) = members
            .leader
            .as_ref()
            .and_then(|leader| leader.client_urls.first())
        else {
            tracing::debug!("PD membership reports no leader client URL");
            return FailoverOutcome::Unavailable;
        };

        let address = match normalize_member_url(url) {
            Ok(address) => address,
            Err(e) => {
                tracing::error!("Error updating PD leader: {}", e);
                return FailoverOutcome::Failed;
            }
        };

        if let Some(current) = self.snapshot() {
            if current.address == address {
                return FailoverOutcome::Unchanged;
            }
        }

        let stub = match self.factory.connect(&address) {
            Ok(stub) => stub,
            Err(e) => {
                tracing::error!("Error updating PD leader to {}: {}", address, e);
                return FailoverOutcome::Failed;
            }
        };

        if !self.install(Arc::new(LeaderHandle::new(address.clone(), stub))) {
            return FailoverOutcome::Closed;
        }
        tracing::info!("Switched to new PD leader: {}", address);
        FailoverOutcome::Installed
    }

    fn install(&self, handle: Arc<LeaderHandle>) -> bool {
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        if self.closed.load(Ordering::Acquire) {
            return false;
        }
        *current = Some(handle);
        true
    }

    /// Drop the current handle; later `current()` calls fail with `Closed`.
    pub fn release(&self) -> Option<Arc<LeaderHandle>> {
        self.closed.store(true, Ordering::Release);
        self.current
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}
