use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use ai_agent::{DispatchError, ToolDispatcher};
use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::protocol::{CorrelationId, ToolRequest, ToolResponse, ToolResult};

const DEFAULT_CHANNEL_CAPACITY: usize = 32;

#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub channel_capacity: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

#[derive(Debug, Error)]
#[error("execution bridge is no longer listening")]
pub struct BridgeClosed;

/// Pending-response slots keyed by correlation id.
///
/// Dispatch inserts, the listener resolves and timeouts or cancellations
/// retire. Each slot is removed exactly once, whichever path gets there first.
#[derive(Debug, Default)]
struct PendingTable {
    slots: Mutex<HashMap<CorrelationId, oneshot::Sender<ToolResult>>>,
    closed: AtomicBool,
}

impl PendingTable {
    fn lock(&self) -> MutexGuard<'_, HashMap<CorrelationId, oneshot::Sender<ToolResult>>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn register(&self, id: CorrelationId) -> Option<oneshot::Receiver<ToolResult>> {
        let mut slots = self.lock();
        if self.closed.load(Ordering::SeqCst) {
            return None;
        }
        let (tx, rx) = oneshot::channel();
        slots.insert(id, tx);
        Some(rx)
    }

    fn resolve(&self, response: ToolResponse) -> bool {
        let sender = self.lock().remove(&response.correlation_id);
        match sender {
            Some(sender) => sender.send(response.result).is_ok(),
            None => false,
        }
    }

    fn retire(&self, id: CorrelationId) -> bool {
        self.lock().remove(&id).is_some()
    }

    // Dropping the senders wakes every waiter with a disconnect.
    fn close(&self) {
        let mut slots = self.lock();
        self.closed.store(true, Ordering::SeqCst);
        slots.clear();
    }

    fn len(&self) -> usize {
        self.lock().len()
    }
}

/// Retires a slot when the dispatch that owns it finishes or is dropped.
struct SlotGuard<'a> {
    table: &'a PendingTable,
    id: CorrelationId,
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        if self.table.retire(self.id) {
            debug!(target: "execution_bridge", correlation_id = %self.id, "retired pending slot");
        }
    }
}

/// The page-side end of the boundary channel.
pub struct RemoteEndpoint {
    requests: mpsc::Receiver<ToolRequest>,
    responses: mpsc::Sender<ToolResponse>,
}

impl RemoteEndpoint {
    pub async fn next_request(&mut self) -> Option<ToolRequest> {
        self.requests.recv().await
    }

    pub async fn respond(&self, response: ToolResponse) -> Result<(), BridgeClosed> {
        self.responses.send(response).await.map_err(|_| BridgeClosed)
    }
}

/// Sends tool calls to the page execution context and matches the answers
/// that come back by correlation id.
pub struct ExecutionBridge {
    outbound: mpsc::Sender<ToolRequest>,
    pending: Arc<PendingTable>,
    next_id: AtomicU64,
    listener: JoinHandle<()>,
}

impl ExecutionBridge {
    /// Create the bridge and the endpoint the page side serves.
    ///
    /// Must be called from inside a tokio runtime: the response listener is
    /// spawned immediately.
    pub fn connect(config: BridgeConfig) -> (Self, RemoteEndpoint) {
        let capacity = config.channel_capacity.max(1);
        let (request_tx, request_rx) = mpsc::channel(capacity);
        let (response_tx, response_rx) = mpsc::channel(capacity);
        let pending = Arc::new(PendingTable::default());
        let listener = tokio::spawn(listen(pending.clone(), response_rx));

        let bridge = Self {
            outbound: request_tx,
            pending,
            next_id: AtomicU64::new(1),
            listener,
        };
        let endpoint = RemoteEndpoint {
            requests: request_rx,
            responses: response_tx,
        };
        (bridge, endpoint)
    }

    pub fn pending_requests(&self) -> usize {
        self.pending.len()
    }

    pub async fn dispatch(
        &self,
        tool: &str,
        argument: Option<&str>,
        limit: Duration,
    ) -> Result<String, DispatchError> {
        let id = CorrelationId::new(self.next_id.fetch_add(1, Ordering::SeqCst));
        let disconnected = || DispatchError::Disconnected {
            tool: tool.to_string(),
        };

        let receiver = self.pending.register(id).ok_or_else(disconnected)?;
        let _slot = SlotGuard {
            table: &self.pending,
            id,
        };

        let request = ToolRequest {
            correlation_id: id,
            tool: tool.to_string(),
            argument: argument.map(str::to_string),
        };
        info!(target: "execution_bridge", correlation_id = %id, tool, "sending tool request");

        let exchange = async {
            self.outbound
                .send(request)
                .await
                .map_err(|_| disconnected())?;
            receiver.await.map_err(|_| disconnected())
        };

        let result = match timeout(limit, exchange).await {
            Ok(result) => result?,
            Err(_) => {
                warn!(
                    target: "execution_bridge",
                    correlation_id = %id,
                    tool,
                    timeout = ?limit,
                    "tool did not respond in time"
                );
                return Err(DispatchError::Timeout {
                    tool: tool.to_string(),
                    timeout: limit,
                });
            }
        };

        match result {
            ToolResult::Output(text) => Ok(text),
            ToolResult::Error(message) => Err(DispatchError::Execution {
                tool: tool.to_string(),
                message,
            }),
            ToolResult::UnknownTool => Err(DispatchError::ToolNotFound {
                tool: tool.to_string(),
            }),
        }
    }
}

impl Drop for ExecutionBridge {
    fn drop(&mut self) {
        self.listener.abort();
        self.pending.close();
    }
}

#[async_trait]
impl ToolDispatcher for ExecutionBridge {
    async fn dispatch(
        &self,
        tool: &str,
        argument: Option<&str>,
        timeout: Duration,
    ) -> Result<String, DispatchError> {
        ExecutionBridge::dispatch(self, tool, argument, timeout).await
    }
}

async fn listen(pending: Arc<PendingTable>, mut inbound: mpsc::Receiver<ToolResponse>) {
    while let Some(response) = inbound.recv().await {
        let id = response.correlation_id;
        if pending.resolve(response) {
            debug!(target: "execution_bridge", correlation_id = %id, "tool response delivered");
        } else {
            warn!(
                target: "execution_bridge",
                correlation_id = %id,
                "discarding tool response with no pending request"
            );
        }
    }
    debug!(target: "execution_bridge", "boundary channel closed");
    pending.close();
}
