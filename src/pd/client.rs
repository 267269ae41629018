//! PD client facade

use crate::common::{encode_bytes, Error, PdConfig, Result};
use crate::pd::channel::{ChannelFactory, GrpcChannelFactory};
use crate::pd::executor::{CallExecutor, CallFuture};
use crate::pd::leader::{LeaderHandle, LeaderTracker};
use crate::pd::refresher::Refresher;
use crate::pd::region::{IsolationCell, IsolationLevel, Region};
use crate::pd::timestamp::Timestamp;
use crate::proto::{metapb, pdpb};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::runtime::Handle;

/// Lifecycle of a [`PdClient`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Uninitialized,
    ClusterIdentified,
    LeaderResolving,
    Ready,
    Closed,
}

impl std::fmt::Display for ClientState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClientState::Uninitialized => write!(f, "uninitialized"),
            ClientState::ClusterIdentified => write!(f, "cluster-identified"),
            ClientState::LeaderResolving => write!(f, "leader-resolving"),
            ClientState::Ready => write!(f, "ready"),
            ClientState::Closed => write!(f, "closed"),
        }
    }
}

fn advance(state: &mut ClientState, next: ClientState) {
    tracing::debug!("PD client {} -> {}", state, next);
    *state = next;
}

/// Client of a PD cluster: timestamps, regions and stores.
///
/// Construction discovers the cluster, pins its id into every request
/// header, resolves the leader and starts the background refresh. All
/// calls retry on transport or cluster errors, failing over to the newly
/// reported leader between attempts.
pub struct PdClient {
    header: pdpb::RequestHeader,
    tso_request: pdpb::TsoRequest,
    tracker: Arc<LeaderTracker>,
    factory: Arc<dyn ChannelFactory>,
    executor: CallExecutor,
    isolation: Arc<IsolationCell>,
    refresher: Refresher,
    state: Mutex<ClientState>,
}

impl PdClient {
    /// Connect using tonic channels, over TLS when a CA is configured.
    pub async fn connect(config: PdConfig) -> Result<Self> {
        let factory =
            GrpcChannelFactory::from_config(&config).map_err(|e| Error::Init(e.to_string()))?;
        Self::connect_with(config, Arc::new(factory)).await
    }

    /// Connect through a caller-provided channel factory.
    pub async fn connect_with(config: PdConfig, factory: Arc<dyn ChannelFactory>) -> Result<Self> {
        config
            .validate()
            .map_err(|e| Error::Init(e.to_string()))?;
        let runtime = Handle::try_current().map_err(|e| Error::Init(e.to_string()))?;

        let tracker = Arc::new(LeaderTracker::new(&config, factory.clone()));
        let mut state = ClientState::Uninitialized;

        let (header, leader) = match Self::init_cluster(&tracker, &mut state).await {
            Ok(resolved) => resolved,
            Err(e) => {
                if let Some(handle) = tracker.release() {
                    factory.release(handle.address());
                }
                tracing::error!("PD client initialization failed in state {}: {}", state, e);
                return Err(e);
            }
        };

        let refresher = Refresher::start(tracker.clone(), config.refresh_interval());
        advance(&mut state, ClientState::Ready);
        tracing::info!(
            "PD client ready: cluster {} via leader {}",
            header.cluster_id,
            leader.address()
        );

        Ok(Self {
            tso_request: pdpb::TsoRequest {
                header: Some(header.clone()),
                count: 1,
            },
            header,
            executor: CallExecutor::new(tracker.clone(), &config, runtime),
            tracker,
            factory,
            isolation: Arc::new(IsolationCell::new(config.isolation_level)),
            refresher,
            state: Mutex::new(state),
        })
    }

    async fn init_cluster(
        tracker: &LeaderTracker,
        state: &mut ClientState,
    ) -> Result<(pdpb::RequestHeader, Arc<LeaderHandle>)> {
        let members = tracker
            .discover_members()
            .await
            .ok_or_else(|| Error::Init("failed to init client for PD cluster".into()))?;

        let cluster_id = members
            .header
            .as_ref()
            .map(|h| h.cluster_id)
            .unwrap_or_default();
        advance(state, ClientState::ClusterIdentified);
        let header = pdpb::RequestHeader { cluster_id };

        advance(state, ClientState::LeaderResolving);
        tracker.failover(Some(members)).await;
        let leader = tracker
            .current()
            .map_err(|_| Error::Init("error updating PD leader".into()))?;
        Ok((header, leader))
    }

    /// Allocate one timestamp, waiting for the answer.
    ///
    /// Returns `Ok(None)` if the wait was interrupted before a timestamp
    /// arrived.
    pub async fn get_timestamp(&self) -> Result<Option<Timestamp>> {
        match self.get_timestamp_async().await {
            Ok(ts) => Ok(Some(ts)),
            Err(Error::Interrupted) => {
                tracing::warn!("Timestamp wait interrupted");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    pub fn get_timestamp_async(&self) -> CallFuture<Timestamp> {
        let request = self.tso_request.clone();
        self.executor.call_stream_with_retry(
            "tso",
            move || request.clone(),
            |resp: pdpb::TsoResponse| {
                resp.timestamp
                    .map(Timestamp::from)
                    .ok_or_else(|| Error::Internal("TSO response carries no timestamp".into()))
            },
        )
    }

    /// Region containing the raw `key`.
    pub async fn get_region_by_key(&self, key: &[u8]) -> Result<Region> {
        let resp = self
            .executor
            .call_with_retry("get_region", self.region_request(key), |leader, req| {
                async move { leader.stub().get_region(req).await }
            })
            .await?;
        Ok(wrap_region(resp, self.isolation.get()))
    }

    pub fn get_region_by_key_async(&self, key: &[u8]) -> CallFuture<Region> {
        let isolation = self.isolation.clone();
        self.executor.spawn_with_retry(
            "get_region",
            self.region_request(key),
            |leader: Arc<LeaderHandle>, req| async move { leader.stub().get_region(req).await },
            move |resp| Ok(wrap_region(resp, isolation.get())),
        )
    }

    /// Both key lookups share this builder so the key is always encoded.
    fn region_request(
        &self,
        key: &[u8],
    ) -> impl Fn() -> pdpb::GetRegionRequest + Send + Sync + 'static {
        let header = self.header.clone();
        let region_key = encode_bytes(key);
        move || pdpb::GetRegionRequest {
            header: Some(header.clone()),
            region_key: region_key.clone(),
        }
    }

    pub async fn get_region_by_id(&self, region_id: u64) -> Result<Region> {
        let resp = self
            .executor
            .call_with_retry(
                "get_region_by_id",
                self.region_id_request(region_id),
                |leader, req| async move { leader.stub().get_region_by_id(req).await },
            )
            .await?;
        Ok(wrap_region(resp, self.isolation.get()))
    }

    pub fn get_region_by_id_async(&self, region_id: u64) -> CallFuture<Region> {
        let isolation = self.isolation.clone();
        self.executor.spawn_with_retry(
            "get_region_by_id",
            self.region_id_request(region_id),
            |leader: Arc<LeaderHandle>, req| async move {
                leader.stub().get_region_by_id(req).await
            },
            move |resp| Ok(wrap_region(resp, isolation.get())),
        )
    }

    fn region_id_request(
        &self,
        region_id: u64,
    ) -> impl Fn() -> pdpb::GetRegionByIdRequest + Send + Sync + 'static {
        let header = self.header.clone();
        move || pdpb::GetRegionByIdRequest {
            header: Some(header.clone()),
            region_id,
        }
    }

    pub async fn get_store(&self, store_id: u64) -> Result<metapb::Store> {
        let resp = self
            .executor
            .call_with_retry("get_store", self.store_request(store_id), |leader, req| {
                async move { leader.stub().get_store(req).await }
            })
            .await?;
        Ok(resp.store.unwrap_or_default())
    }

    pub fn get_store_async(&self, store_id: u64) -> CallFuture<metapb::Store> {
        self.executor.spawn_with_retry(
            "get_store",
            self.store_request(store_id),
            |leader: Arc<LeaderHandle>, req| async move { leader.stub().get_store(req).await },
            |resp: pdpb::GetStoreResponse| Ok(resp.store.unwrap_or_default()),
        )
    }

    fn store_request(
        &self,
        store_id: u64,
    ) -> impl Fn() -> pdpb::GetStoreRequest + Send + Sync + 'static {
        let header = self.header.clone();
        move || pdpb::GetStoreRequest {
            header: Some(header.clone()),
            store_id,
        }
    }

    /// Raw membership as reported by the first reachable seed.
    pub async fn get_members(&self) -> Option<pdpb::GetMembersResponse> {
        self.tracker.discover_members().await
    }

    /// Applies to regions resolved after this call.
    pub fn set_isolation_level(&self, level: IsolationLevel) {
        self.isolation.set(level);
    }

    pub fn isolation_level(&self) -> IsolationLevel {
        self.isolation.get()
    }

    pub fn cluster_id(&self) -> u64 {
        self.header.cluster_id
    }

    pub fn header(&self) -> &pdpb::RequestHeader {
        &self.header
    }

    /// Current leader handle.
    pub fn leader(&self) -> Result<Arc<LeaderHandle>> {
        self.tracker.current()
    }

    pub fn tracker(&self) -> &Arc<LeaderTracker> {
        &self.tracker
    }

    pub fn state(&self) -> ClientState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_refreshing(&self) -> bool {
        !self.refresher.is_stopped()
    }

    /// Stop the background refresh and release the leader connection.
    ///
    /// Safe to call more than once; calls in flight finish on the handle
    /// they already hold.
    pub fn close(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if *state == ClientState::Closed {
            return;
        }
        advance(&mut state, ClientState::Closed);

        self.refresher.stop();
        if let Some(handle) = self.tracker.release() {
            self.factory.release(handle.address());
        }
        tracing::info!("PD client for cluster {} closed", self.header.cluster_id);
    }
}

impl Drop for PdClient {
    fn drop(&mut self) {
        self.close();
    }
}

fn wrap_region(resp: pdpb::GetRegionResponse, isolation: IsolationLevel) -> Region {
    Region::new(resp.region.unwrap_or_default(), resp.leader, isolation)
}
