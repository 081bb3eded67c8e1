use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc::{self, error::SendError, UnboundedReceiver, UnboundedSender};
use tokio::time::Instant;
use tracing::{debug, info};

use chatrelay_core::domain::conversation::SenderId;
use chatrelay_core::domain::message::InboundMessage;

use crate::runtime::{TurnOrchestrator, TurnReport};

#[async_trait]
pub trait TurnHandler: Send + Sync + 'static {
    async fn handle(&self, inbound: InboundMessage) -> TurnReport;
}

#[async_trait]
impl TurnHandler for TurnOrchestrator {
    async fn handle(&self, inbound: InboundMessage) -> TurnReport {
        self.handle_message(inbound).await
    }
}

type WorkerMap = HashMap<SenderId, UnboundedSender<InboundMessage>>;

/// Serializes turns per sender while letting different senders run in
/// parallel. Each active sender owns one worker task that exits after
/// `idle_timeout` without input.
#[derive(Clone)]
pub struct TurnQueue {
    handler: Arc<dyn TurnHandler>,
    workers: Arc<Mutex<WorkerMap>>,
    in_flight: Arc<AtomicUsize>,
    idle_timeout: Duration,
}

impl TurnQueue {
    pub fn new(handler: Arc<dyn TurnHandler>, idle_timeout: Duration) -> Self {
        Self {
            handler,
            workers: Arc::new(Mutex::new(HashMap::new())),
            in_flight: Arc::new(AtomicUsize::new(0)),
            idle_timeout,
        }
    }

    /// Must be called from within a tokio runtime.
    pub fn submit(&self, inbound: InboundMessage) {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        let sender_id = inbound.sender_id.clone();

        let mut workers = lock(&self.workers);
        let inbound = match workers.get(&sender_id) {
            Some(channel) => match channel.send(inbound) {
                Ok(()) => return,
                // Worker is gone without deregistering; start a fresh one.
                Err(SendError(inbound)) => inbound,
            },
            None => inbound,
        };

        let (channel, receiver) = mpsc::unbounded_channel();
        workers.insert(sender_id.clone(), channel);
        drop(workers);

        debug!(event_name = "turn.queue.worker_started", sender_id = %sender_id, "starting sender worker");
        tokio::spawn(run_worker(self.clone(), sender_id, inbound, receiver));
    }

    pub fn pending(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn active_senders(&self) -> usize {
        lock(&self.workers).len()
    }

    /// Waits until every submitted turn has finished or `deadline` passes.
    /// Returns `true` when nothing is left in flight.
    pub async fn drain(&self, deadline: Duration) -> bool {
        let until = Instant::now() + deadline;
        loop {
            let pending = self.pending();
            if pending == 0 {
                return true;
            }
            if Instant::now() >= until {
                info!(
                    event_name = "turn.queue.drain_expired",
                    pending,
                    "drain deadline reached with turns still in flight"
                );
                return false;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
    }

    /// Under the map lock: either pick up a message that raced in, or
    /// deregister so the next submit starts a new worker.
    fn retire_or_take(
        &self,
        sender_id: &SenderId,
        receiver: &mut UnboundedReceiver<InboundMessage>,
    ) -> Option<InboundMessage> {
        let mut workers = lock(&self.workers);
        match receiver.try_recv() {
            Ok(inbound) => Some(inbound),
            Err(_) => {
                workers.remove(sender_id);
                None
            }
        }
    }
}

fn lock(workers: &Mutex<WorkerMap>) -> MutexGuard<'_, WorkerMap> {
    workers.lock().unwrap_or_else(PoisonError::into_inner)
}

async fn run_worker(
    queue: TurnQueue,
    sender_id: SenderId,
    first: InboundMessage,
    mut receiver: UnboundedReceiver<InboundMessage>,
) {
    let mut next = Some(first);
    loop {
        let inbound = match next.take() {
            Some(inbound) => inbound,
            None => match tokio::time::timeout(queue.idle_timeout, receiver.recv()).await {
                Ok(Some(inbound)) => inbound,
                Ok(None) => break,
                Err(_) => match queue.retire_or_take(&sender_id, &mut receiver) {
                    Some(inbound) => inbound,
                    None => break,
                },
            },
        };

        let report = queue.handler.handle(inbound).await;
        queue.in_flight.fetch_sub(1, Ordering::SeqCst);
        debug!(
            event_name = "turn.queue.processed",
            sender_id = %sender_id,
            correlation_id = %report.correlation_id.0,
            final_state = report.final_state.as_str(),
            "queued turn processed"
        );
    }

    debug!(event_name = "turn.queue.worker_stopped", sender_id = %sender_id, "sender worker idle, stopping");
}
