//! PD RPC stubs and the channel factory that builds them
//!
//! The rest of the client only sees [`PdRpc`] trait objects handed out by a
//! [`ChannelFactory`]; transport details (addressing, TLS, connection reuse)
//! stay behind these two seams.

use crate::common::{Error, PdConfig, Result};
use crate::proto::pdpb::{self, pd_client::PdClient as PdGrpcClient};
use futures_util::stream::{BoxStream, Stream, StreamExt};
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tonic::transport::{Certificate, Channel, ClientTlsConfig, Endpoint};
use tonic::Status;

/// Outbound half of a TSO stream
pub type TsoRequestStream = Pin<Box<dyn Stream<Item = pdpb::TsoRequest> + Send + 'static>>;

/// Inbound half of a TSO stream
pub type TsoResponseStream = BoxStream<'static, std::result::Result<pdpb::TsoResponse, Status>>;

/// Calls understood by a PD member.
#[tonic::async_trait]
pub trait PdRpc: Send + Sync {
    async fn get_members(
        &self,
        req: pdpb::GetMembersRequest,
    ) -> std::result::Result<pdpb::GetMembersResponse, Status>;

    async fn get_region(
        &self,
        req: pdpb::GetRegionRequest,
    ) -> std::result::Result<pdpb::GetRegionResponse, Status>;

    async fn get_region_by_id(
        &self,
        req: pdpb::GetRegionByIdRequest,
    ) -> std::result::Result<pdpb::GetRegionResponse, Status>;

    async fn get_store(
        &self,
        req: pdpb::GetStoreRequest,
    ) -> std::result::Result<pdpb::GetStoreResponse, Status>;

    /// Opens a duplex TSO stream fed by `requests`.
    async fn tso(
        &self,
        requests: TsoRequestStream,
    ) -> std::result::Result<TsoResponseStream, Status>;
}

/// Hands out reusable RPC stubs per member address (`host:port`).
pub trait ChannelFactory: Send + Sync {
    fn connect(&self, address: &str) -> Result<Arc<dyn PdRpc>>;

    /// Drop anything cached for `address`.
    fn release(&self, _address: &str) {}
}

/// PD stub over the tonic-generated client
#[derive(Clone)]
pub struct GrpcPdStub {
    inner: PdGrpcClient<Channel>,
}

impl GrpcPdStub {
    pub fn new(channel: Channel) -> Self {
        Self {
            inner: PdGrpcClient::new(channel),
        }
    }
}

#[tonic::async_trait]
impl PdRpc for GrpcPdStub {
    async fn get_members(
        &self,
        req: pdpb::GetMembersRequest,
    ) -> std::result::Result<pdpb::GetMembersResponse, Status> {
        let mut client = self.inner.clone();
        Ok(client.get_members(req).await?.into_inner())
    }

    async fn get_region(
        &self,
        req: pdpb::GetRegionRequest,
    ) -> std::result::Result<pdpb::GetRegionResponse, Status> {
        let mut client = self.inner.clone();
        Ok(client.get_region(req).await?.into_inner())
    }

    async fn get_region_by_id(
        &self,
        req: pdpb::GetRegionByIdRequest,
    ) -> std::result::Result<pdpb::GetRegionResponse, Status> {
        let mut client = self.inner.clone();
        Ok(client.get_region_by_id(req).await?.into_inner())
    }

    async fn get_store(
        &self,
        req: pdpb::GetStoreRequest,
    ) -> std::result::Result<pdpb::GetStoreResponse, Status> {
        let mut client = self.inner.clone();
        Ok(client.get_store(req).await?.into_inner())
    }

    async fn tso(
        &self,
        requests: TsoRequestStream,
    ) -> std::result::Result<TsoResponseStream, Status> {
        let mut client = self.inner.clone();
        Ok(client
            .tso(TsoRequestBody(requests))
            .await?
            .into_inner()
            .boxed())
    }
}

/// Concrete wrapper around [`TsoRequestStream`]; passing the boxed trait
/// object straight to tonic trips a higher-ranked lifetime error in rustc.
struct TsoRequestBody(TsoRequestStream);

impl Stream for TsoRequestBody {
    type Item = pdpb::TsoRequest;

    fn poll_next(
        mut self: Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Option<Self::Item>> {
        self.0.as_mut().poll_next(cx)
    }
}

/// Builds lazily-connected tonic channels and caches one per address.
pub struct GrpcChannelFactory {
    connect_timeout: Duration,
    timeout: Duration,
    tls: Option<ClientTlsConfig>,
    channels: Mutex<HashMap<String, Channel>>,
}

impl GrpcChannelFactory {
    /// `timeout` is the connection-level request deadline; it also bounds
    /// TSO streams, which get no per-call deadline of their own.
    pub fn new(connect_timeout: Duration, timeout: Duration) -> Self {
        Self {
            connect_timeout,
            timeout,
            tls: None,
            channels: Mutex::new(HashMap::new()),
        }
    }

    /// Factory for `config`, with TLS when `tls_ca_path` is set.
    pub fn from_config(config: &PdConfig) -> Result<Self> {
        let factory = Self::new(config.connect_timeout(), config.timeout());
        let Some(ca_path) = &config.tls_ca_path else {
            return Ok(factory);
        };

        let pem = std::fs::read(ca_path)?;
        let mut tls = ClientTlsConfig::new().ca_certificate(Certificate::from_pem(pem));
        if let Some(domain) = &config.tls_domain {
            tls = tls.domain_name(domain.clone());
        }
        Ok(factory.with_tls(tls))
    }

    pub fn with_tls(mut self, tls: ClientTlsConfig) -> Self {
        self.tls = Some(tls);
        self
    }

    pub fn is_tls(&self) -> bool {
        self.tls.is_some()
    }

    fn channel(&self, address: &str) -> Result<Channel> {
        let mut channels = self
            .channels
            .lock()
            .map_err(|_| Error::Internal("channel cache poisoned".into()))?;
        if let Some(channel) = channels.get(address) {
            return Ok(channel.clone());
        }

        let scheme = if self.tls.is_some() { "https" } else { "http" };
        let mut endpoint = Endpoint::from_shared(format!("{}://{}", scheme, address))?
            .connect_timeout(self.connect_timeout)
            .timeout(self.timeout)
            .tcp_nodelay(true);
        if let Some(tls) = &self.tls {
            endpoint = endpoint.tls_config(tls.clone())?;
        }

        let channel = endpoint.connect_lazy();
        channels.insert(address.to_string(), channel.clone());
        tracing::debug!("Created channel to {}", address);
        Ok(channel)
    }
}

impl ChannelFactory for GrpcChannelFactory {
    fn connect(&self, address: &str) -> Result<Arc<dyn PdRpc>> {
        let channel = self.channel(address)?;
        Ok(Arc::new(GrpcPdStub::new(channel)))
    }

    fn release(&self, address: &str) {
        if let Ok(mut channels) = self.channels.lock() {
            channels.remove(address);
        }
    }
}
