//! Thread-blocking PD client
//!
//! Wraps [`PdClient`] together with its own tokio runtime for callers that
//! are not async. Do not use it from inside an async context: every call
//! blocks the current thread on the runtime.

use crate::common::{PdConfig, Result};
use crate::pd::channel::ChannelFactory;
use crate::pd::client::PdClient;
use crate::pd::region::{IsolationLevel, Region};
use crate::pd::timestamp::Timestamp;
use crate::proto::{metapb, pdpb};
use std::sync::Arc;
use tokio::runtime::{Builder, Runtime};

pub struct BlockingPdClient {
    // dropped before the runtime
    client: PdClient,
    runtime: Runtime,
}

impl BlockingPdClient {
    pub fn connect(config: PdConfig) -> Result<Self> {
        let runtime = Self::runtime()?;
        let client = runtime.block_on(PdClient::connect(config))?;
        Ok(Self { client, runtime })
    }

    pub fn connect_with(config: PdConfig, factory: Arc<dyn ChannelFactory>) -> Result<Self> {
        let runtime = Self::runtime()?;
        let client = runtime.block_on(PdClient::connect_with(config, factory))?;
        Ok(Self { client, runtime })
    }

    fn runtime() -> Result<Runtime> {
        Ok(Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("minipd-worker")
            .enable_all()
            .build()?)
    }

    pub fn get_timestamp(&self) -> Result<Option<Timestamp>> {
        self.runtime.block_on(self.client.get_timestamp())
    }

    pub fn get_region_by_key(&self, key: &[u8]) -> Result<Region> {
        self.runtime.block_on(self.client.get_region_by_key(key))
    }

    pub fn get_region_by_id(&self, region_id: u64) -> Result<Region> {
        self.runtime.block_on(self.client.get_region_by_id(region_id))
    }

    pub fn get_store(&self, store_id: u64) -> Result<metapb::Store> {
        self.runtime.block_on(self.client.get_store(store_id))
    }

    pub fn get_members(&self) -> Option<pdpb::GetMembersResponse> {
        self.runtime.block_on(self.client.get_members())
    }

    pub fn set_isolation_level(&self, level: IsolationLevel) {
        self.client.set_isolation_level(level);
    }

    pub fn cluster_id(&self) -> u64 {
        self.client.cluster_id()
    }

    /// The async client, for calls that should not block.
    pub fn client(&self) -> &PdClient {
        &self.client
    }

    pub fn close(&self) {
        self.client.close();
    }
}
