//! Retrying call dispatch against the current PD leader
//!
//! Every PD call goes through one retry loop ([`CallExecutor::invoke`]). The
//! public call shapes only differ in how an attempt is dispatched and how
//! the result reaches the caller:
//!
//! - [`CallExecutor::call_with_retry`]: unary, awaited in place, each attempt
//!   bounded by the configured deadline.
//! - [`CallExecutor::spawn_with_retry`]: the same, run on a spawned task and
//!   delivered through a [`CallFuture`].
//! - [`CallExecutor::call_stream_with_retry`]: one request written to a TSO
//!   duplex stream, one response read back, delivered through a
//!   [`CallFuture`].

use crate::common::{Error, PdConfig, Result};
use crate::pd::leader::{LeaderHandle, LeaderTracker};
use crate::proto::pdpb;
use futures_util::StreamExt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{ready, Context, Poll};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tonic::Status;

/// Responses that carry a PD response header.
pub trait PdResponse {
    fn header(&self) -> Option<&pdpb::ResponseHeader>;
}

macro_rules! impl_pd_response {
    ($($ty:ty),* $(,)?) => {
        $(
            impl PdResponse for $ty {
                fn header(&self) -> Option<&pdpb::ResponseHeader> {
                    self.header.as_ref()
                }
            }
        )*
    };
}

impl_pd_response!(
    pdpb::GetMembersResponse,
    pdpb::GetRegionResponse,
    pdpb::GetStoreResponse,
    pdpb::TsoResponse,
);

/// Cluster-level error carried by a response header, if any.
///
/// A response without one is a success even when its payload is empty.
pub fn cluster_error<R: PdResponse>(resp: &R) -> Option<&pdpb::Error> {
    resp.header().and_then(|header| header.error.as_ref())
}

/// Result of a call running on its own task.
///
/// Resolves to [`Error::Interrupted`] when the task is aborted before it
/// produced a value.
#[must_use = "futures do nothing unless awaited"]
pub struct CallFuture<T> {
    task: JoinHandle<Result<T>>,
}

impl<T: Send + 'static> CallFuture<T> {
    pub(crate) fn spawn<F>(runtime: &Handle, future: F) -> Self
    where
        F: Future<Output = Result<T>> + Send + 'static,
    {
        Self {
            task: runtime.spawn(future),
        }
    }
}

impl<T> CallFuture<T> {
    /// Cancel the call; awaiting the future afterwards yields `Interrupted`.
    pub fn abort(&self) {
        self.task.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl<T> Future for CallFuture<T> {
    type Output = Result<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match ready!(Pin::new(&mut self.task).poll(cx)) {
            Ok(result) => Poll::Ready(result),
            Err(e) if e.is_cancelled() => Poll::Ready(Err(Error::Interrupted)),
            Err(e) => Poll::Ready(Err(Error::Internal(format!("call task failed: {}", e)))),
        }
    }
}

/// Dispatches PD calls on the current leader, failing over between attempts.
///
/// Future-based calls run on the runtime the executor was created on, so
/// they can be started from threads outside of it.
#[derive(Clone)]
pub struct CallExecutor {
    tracker: Arc<LeaderTracker>,
    runtime: Handle,
    timeout: Duration,
    max_attempts: usize,
}

impl CallExecutor {
    pub fn new(tracker: Arc<LeaderTracker>, config: &PdConfig, runtime: Handle) -> Self {
        Self {
            tracker,
            runtime,
            timeout: config.timeout(),
            max_attempts: config.max_attempts.max(1),
        }
    }

    pub fn tracker(&self) -> &Arc<LeaderTracker> {
        &self.tracker
    }

    /// Unary call awaited in place, each attempt bounded by the deadline.
    ///
    /// `build` is invoked once per attempt; `call` issues the RPC on the
    /// handle current at that attempt.
    pub async fn call_with_retry<Req, Resp, B, F, Fut>(
        &self,
        method: &'static str,
        build: B,
        call: F,
    ) -> Result<Resp>
    where
        Resp: PdResponse,
        B: Fn() -> Req,
        F: Fn(Arc<LeaderHandle>, Req) -> Fut,
        Fut: Future<Output = std::result::Result<Resp, Status>>,
    {
        let timeout = self.timeout;
        self.invoke(method, build, |handle, req| {
            let attempt = call(handle, req);
            async move {
                match tokio::time::timeout(timeout, attempt).await {
                    Ok(resp) => resp.map_err(Error::from),
                    Err(_) => Err(Error::Grpc(Status::deadline_exceeded(format!(
                        "{} exceeded {:?} deadline",
                        method, timeout
                    )))),
                }
            }
        })
        .await
    }

    /// Unary call run on a spawned task; `adapt` turns the response into
    /// the caller's value on the completion path.
    pub fn spawn_with_retry<Req, Resp, T, B, F, Fut, A>(
        &self,
        method: &'static str,
        build: B,
        call: F,
        adapt: A,
    ) -> CallFuture<T>
    where
        Req: Send + 'static,
        Resp: PdResponse + Send + 'static,
        T: Send + 'static,
        B: Fn() -> Req + Send + Sync + 'static,
        F: Fn(Arc<LeaderHandle>, Req) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<Resp, Status>> + Send + 'static,
        A: FnOnce(Resp) -> Result<T> + Send + 'static,
    {
        let executor = self.clone();
        CallFuture::spawn(&self.runtime, async move {
            let resp = executor.call_with_retry(method, build, call).await?;
            adapt(resp)
        })
    }

    /// Timestamp allocation over a duplex stream.
    ///
    /// Each attempt opens a stream on the current leader, writes exactly one
    /// request, closes the input and waits for the single response. No
    /// per-call deadline is added; the channel's own timeout applies.
    pub fn call_stream_with_retry<T, B, A>(
        &self,
        method: &'static str,
        build: B,
        adapt: A,
    ) -> CallFuture<T>
    where
        T: Send + 'static,
        B: Fn() -> pdpb::TsoRequest + Send + Sync + 'static,
        A: FnOnce(pdpb::TsoResponse) -> Result<T> + Send + 'static,
    {
        let executor = self.clone();
        CallFuture::spawn(&self.runtime, async move {
            let resp = executor
                .invoke(method, build, |handle, req| exchange_one(handle, req))
                .await?;
            adapt(resp)
        })
    }

    async fn invoke<Req, Resp, B, D, Fut>(
        &self,
        method: &'static str,
        build: B,
        dispatch: D,
    ) -> Result<Resp>
    where
        Resp: PdResponse,
        B: Fn() -> Req,
        D: Fn(Arc<LeaderHandle>, Req) -> Fut,
        Fut: Future<Output = Result<Resp>>,
    {
        let mut last_err = Error::NoLeader;

        for attempt in 1..=self.max_attempts {
            let outcome = match self.tracker.current() {
                Ok(handle) => dispatch(handle, build()).await,
                Err(e) => Err(e),
            };

            match outcome {
                Ok(resp) => match cluster_error(&resp) {
                    None => return Ok(resp),
                    Some(err) => last_err = Error::cluster(err),
                },
                Err(e) if e.is_retryable() => last_err = e,
                Err(e) => return Err(e),
            }

            if attempt < self.max_attempts {
                tracing::warn!(
                    "PD {} attempt {}/{} failed: {}, failing over",
                    method,
                    attempt,
                    self.max_attempts,
                    last_err
                );
                let outcome = self.tracker.failover(None).await;
                tracing::debug!("PD failover after {} failure: {:?}", method, outcome);
            }
        }

        Err(last_err)
    }
}

async fn exchange_one(
    handle: Arc<LeaderHandle>,
    req: pdpb::TsoRequest,
) -> Result<pdpb::TsoResponse> {
    let (sink, requests) = mpsc::channel(1);
    sink.send(req)
        .await
        .map_err(|_| Error::Grpc(Status::cancelled("TSO request stream closed")))?;
    // end of input
    drop(sink);

    let mut responses = handle
        .stub()
        .tso(Box::pin(ReceiverStream::new(requests)))
        .await?;
    match responses.next().await {
        Some(resp) => Ok(resp?),
        None => Err(Error::Grpc(Status::unavailable(
            "TSO stream closed without a response",
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header_with_error(kind: pdpb::ErrorType) -> Option<pdpb::ResponseHeader> {
        Some(pdpb::ResponseHeader {
            cluster_id: 7,
            error: Some(pdpb::Error {
                r#type: kind as i32,
                message: "boom".into(),
            }),
        })
    }

    #[test]
    fn test_cluster_error_detection() {
        let ok = pdpb::GetRegionResponse {
            header: Some(pdpb::ResponseHeader {
                cluster_id: 7,
                error: None,
            }),
            ..Default::default()
        };
        assert!(cluster_error(&ok).is_none());

        // empty payload without an error is still a success
        assert!(cluster_error(&pdpb::GetStoreResponse::default()).is_none());

        let failed = pdpb::TsoResponse {
            header: header_with_error(pdpb::ErrorType::NotBootstrapped),
            ..Default::default()
        };
        let err = cluster_error(&failed).unwrap();
        assert_eq!(err.r#type(), pdpb::ErrorType::NotBootstrapped);
    }

    #[tokio::test]
    async fn test_aborted_call_future_is_interrupted() {
        let future: CallFuture<u64> = CallFuture::spawn(&Handle::current(), async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(1)
        });
        future.abort();
        assert!(matches!(future.await, Err(Error::Interrupted)));
    }

    #[tokio::test]
    async fn test_call_future_pending_until_task_completes() {
        let (tx, rx) = tokio::sync::oneshot::channel::<u64>();
        let pending = CallFuture::spawn(&Handle::current(), async move {
            rx.await.map_err(|_| Error::Interrupted)
        });
        let mut call = tokio_test::task::spawn(pending);

        tokio_test::assert_pending!(call.poll());
        tx.send(3).unwrap();
        while !call.is_woken() {
            tokio::task::yield_now().await;
        }
        assert_eq!(tokio_test::assert_ready!(call.poll()).unwrap(), 3);
    }

    #[tokio::test]
    async fn test_call_future_passes_result() {
        let future = CallFuture::spawn(&Handle::current(), async { Ok::<_, Error>(5u64) });
        assert_eq!(future.await.unwrap(), 5);

        let future: CallFuture<u64> =
            CallFuture::spawn(&Handle::current(), async { Err(Error::NoLeader) });
        assert!(matches!(future.await, Err(Error::NoLeader)));
    }
}
