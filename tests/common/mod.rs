//! In-memory PD cluster for client tests

#![allow(dead_code)]

use futures_util::stream::{self, StreamExt};
use minipd::pd::channel::{ChannelFactory, PdRpc, TsoRequestStream, TsoResponseStream};
use minipd::proto::{metapb, pdpb};
use minipd::{PdConfig, Result};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tonic::Status;

pub const CLUSTER_ID: u64 = 7;
pub const SEED: &str = "10.0.0.1:2379";
pub const LEADER_URL: &str = "http://10.0.0.2:2379";
pub const LEADER_ADDR: &str = "10.0.0.2:2379";

/// Shared state of every mock member.
pub struct MockCluster {
    pub cluster_id: u64,
    leader_urls: Mutex<Vec<String>>,
    unreachable: Mutex<HashSet<String>>,
    cluster_error: AtomicBool,
    delay: Mutex<Option<Duration>>,
    connects: Mutex<Vec<String>>,
    member_calls: AtomicUsize,
    data_calls: Mutex<Vec<String>>,
    region_keys: Mutex<Vec<Vec<u8>>>,
    logical: AtomicI64,
}

impl MockCluster {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            cluster_id: CLUSTER_ID,
            leader_urls: Mutex::new(vec![LEADER_URL.to_string()]),
            unreachable: Mutex::new(HashSet::new()),
            cluster_error: AtomicBool::new(false),
            delay: Mutex::new(None),
            connects: Mutex::new(Vec::new()),
            member_calls: AtomicUsize::new(0),
            data_calls: Mutex::new(Vec::new()),
            region_keys: Mutex::new(Vec::new()),
            logical: AtomicI64::new(0),
        })
    }

    pub fn factory(self: &Arc<Self>) -> Arc<dyn ChannelFactory> {
        Arc::new(MockFactory {
            cluster: self.clone(),
        })
    }

    pub fn set_leader_urls(&self, urls: &[&str]) {
        *self.leader_urls.lock().unwrap() = urls.iter().map(|u| u.to_string()).collect();
    }

    pub fn set_unreachable(&self, address: &str, unreachable: bool) {
        let mut set = self.unreachable.lock().unwrap();
        if unreachable {
            set.insert(address.to_string());
        } else {
            set.remove(address);
        }
    }

    pub fn set_cluster_error(&self, on: bool) {
        self.cluster_error.store(on, Ordering::SeqCst);
    }

    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.lock().unwrap() = delay;
    }

    pub fn connects_to(&self, address: &str) -> usize {
        self.connects
            .lock()
            .unwrap()
            .iter()
            .filter(|a| a.as_str() == address)
            .count()
    }

    pub fn member_calls(&self) -> usize {
        self.member_calls.load(Ordering::SeqCst)
    }

    /// Addresses that served region, store and TSO calls, in order
    pub fn data_calls(&self) -> Vec<String> {
        self.data_calls.lock().unwrap().clone()
    }

    pub fn region_keys(&self) -> Vec<Vec<u8>> {
        self.region_keys.lock().unwrap().clone()
    }

    fn check_reachable(&self, address: &str) -> std::result::Result<(), Status> {
        if self.unreachable.lock().unwrap().contains(address) {
            return Err(Status::unavailable(format!("{} unreachable", address)));
        }
        Ok(())
    }

    async fn data_call(&self, address: &str) -> std::result::Result<pdpb::ResponseHeader, Status> {
        self.check_reachable(address)?;
        self.data_calls.lock().unwrap().push(address.to_string());
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.header())
    }

    fn header(&self) -> pdpb::ResponseHeader {
        let error = self
            .cluster_error
            .load(Ordering::SeqCst)
            .then(|| pdpb::Error {
                r#type: pdpb::ErrorType::NotBootstrapped as i32,
                message: "cluster is not bootstrapped".into(),
            });
        pdpb::ResponseHeader {
            cluster_id: self.cluster_id,
            error,
        }
    }
}

pub fn leader_peer() -> metapb::Peer {
    metapb::Peer { id: 11, store_id: 1 }
}

struct MockFactory {
    cluster: Arc<MockCluster>,
}

impl ChannelFactory for MockFactory {
    fn connect(&self, address: &str) -> Result<Arc<dyn PdRpc>> {
        self.cluster.connects.lock().unwrap().push(address.to_string());
        Ok(Arc::new(MockMember {
            address: address.to_string(),
            cluster: self.cluster.clone(),
        }))
    }
}

struct MockMember {
    address: String,
    cluster: Arc<MockCluster>,
}

#[tonic::async_trait]
impl PdRpc for MockMember {
    async fn get_members(
        &self,
        _req: pdpb::GetMembersRequest,
    ) -> std::result::Result<pdpb::GetMembersResponse, Status> {
        self.cluster.member_calls.fetch_add(1, Ordering::SeqCst);
        self.cluster.check_reachable(&self.address)?;
        let leader = pdpb::Member {
            name: "pd-leader".into(),
            member_id: 2,
            peer_urls: vec![],
            client_urls: self.cluster.leader_urls.lock().unwrap().clone(),
        };
        Ok(pdpb::GetMembersResponse {
            header: Some(pdpb::ResponseHeader {
                cluster_id: self.cluster.cluster_id,
                error: None,
            }),
            members: vec![leader.clone()],
            leader: Some(leader),
        })
    }

    async fn get_region(
        &self,
        req: pdpb::GetRegionRequest,
    ) -> std::result::Result<pdpb::GetRegionResponse, Status> {
        let header = self.cluster.data_call(&self.address).await?;
        self.cluster
            .region_keys
            .lock()
            .unwrap()
            .push(req.region_key.clone());
        Ok(pdpb::GetRegionResponse {
            header: Some(header),
            region: Some(metapb::Region {
                id: 1,
                ..Default::default()
            }),
            leader: Some(leader_peer()),
        })
    }

    async fn get_region_by_id(
        &self,
        req: pdpb::GetRegionByIdRequest,
    ) -> std::result::Result<pdpb::GetRegionResponse, Status> {
        let header = self.cluster.data_call(&self.address).await?;
        Ok(pdpb::GetRegionResponse {
            header: Some(header),
            region: Some(metapb::Region {
                id: req.region_id,
                peers: vec![leader_peer()],
                ..Default::default()
            }),
            leader: Some(leader_peer()),
        })
    }

    async fn get_store(
        &self,
        req: pdpb::GetStoreRequest,
    ) -> std::result::Result<pdpb::GetStoreResponse, Status> {
        let header = self.cluster.data_call(&self.address).await?;
        Ok(pdpb::GetStoreResponse {
            header: Some(header),
            store: Some(metapb::Store {
                id: req.store_id,
                address: format!("store-{}:20160", req.store_id),
                state: metapb::StoreState::Up as i32,
                labels: vec![],
            }),
        })
    }

    async fn tso(
        &self,
        mut requests: TsoRequestStream,
    ) -> std::result::Result<TsoResponseStream, Status> {
        let header = self.cluster.data_call(&self.address).await?;
        let Some(req) = requests.next().await else {
            return Err(Status::invalid_argument("empty TSO stream"));
        };
        let logical = self.cluster.logical.fetch_add(req.count as i64, Ordering::SeqCst);
        let resp = pdpb::TsoResponse {
            header: Some(header),
            count: req.count,
            timestamp: Some(pdpb::Timestamp {
                physical: 1_700_000_000_000,
                logical: logical + 1,
            }),
        };
        Ok(stream::iter(vec![Ok(resp)]).boxed())
    }
}

/// Config for tests: no failover gate, quick deadlines.
pub fn config(seeds: &[&str]) -> PdConfig {
    PdConfig {
        timeout_ms: 500,
        failover_gate_ms: Some(0),
        ..PdConfig::new(seeds.iter().copied())
    }
}
