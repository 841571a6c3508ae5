//! Request/response bridge to the crypto worker.
//!
//! The worker is a dedicated OS thread that owns the `CryptoEngine` and with
//! it the private key. Callers talk to it only through two queues:
//!
//! ```text
//! invoke() --Request{id, op}--> worker thread --Response{id, result}--> router task
//!    ^                                                                     |
//!    +---------------- oneshot, looked up in the pending table by id ------+
//! ```
//!
//! Ids come from a monotonic counter, so they are unique for the channel's
//! lifetime. A pending entry is removed exactly once: by the router when the
//! reply arrives, or by the caller's guard if the call is dropped first.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, trace};

use duet_crypto::{CryptoEngine, CryptoError, CryptoResult};

pub type RequestId = u64;

/// Named operations the worker performs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    GenerateKeypair,
    Encrypt { plaintext: String, recipient: String },
    Decrypt { ciphertext: String },
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Self::GenerateKeypair => "generate-keypair",
            Self::Encrypt { .. } => "encrypt",
            Self::Decrypt { .. } => "decrypt",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OffloadError {
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error("crypto worker has stopped")]
    WorkerGone,
}

struct Request {
    id: RequestId,
    op: Operation,
}

struct Response {
    id: RequestId,
    result: CryptoResult<String>,
}

type PendingTable = Arc<Mutex<HashMap<RequestId, oneshot::Sender<CryptoResult<String>>>>>;

fn lock(table: &PendingTable) -> MutexGuard<'_, HashMap<RequestId, oneshot::Sender<CryptoResult<String>>>> {
    table.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Handle to the crypto worker. Cheap to clone; all clones share one worker.
#[derive(Clone)]
pub struct OffloadChannel {
    next_id: Arc<AtomicU64>,
    pending: PendingTable,
    requests: mpsc::UnboundedSender<Request>,
}

impl OffloadChannel {
    /// Start the worker thread and the reply router.
    /// Must be called from within a tokio runtime.
    pub fn spawn<E: CryptoEngine>(engine: E) -> std::io::Result<Self> {
        let (requests_tx, requests_rx) = mpsc::unbounded_channel();
        let (responses_tx, responses_rx) = mpsc::unbounded_channel();
        let pending: PendingTable = Arc::new(Mutex::new(HashMap::new()));

        std::thread::Builder::new()
            .name("duet-crypto".into())
            .spawn(move || run_worker(engine, requests_rx, responses_tx))?;
        tokio::spawn(route_responses(responses_rx, pending.clone()));

        Ok(Self {
            next_id: Arc::new(AtomicU64::new(1)),
            pending,
            requests: requests_tx,
        })
    }

    /// Run `op` on the worker and wait for its correlated reply.
    pub async fn invoke(&self, op: Operation) -> Result<String, OffloadError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        lock(&self.pending).insert(id, tx);
        let _guard = PendingGuard {
            id,
            pending: &self.pending,
        };

        trace!("offload #{} {}", id, op.name());
        self.requests
            .send(Request { id, op })
            .map_err(|_| OffloadError::WorkerGone)?;

        // A worker that dies with our request still queued never replies;
        // its dropped receiver closes the request queue instead.
        let result = tokio::select! {
            biased;
            reply = rx => reply.map_err(|_| OffloadError::WorkerGone)?,
            _ = self.requests.closed() => return Err(OffloadError::WorkerGone),
        };
        Ok(result?)
    }

    /// Generate the keypair and return the encoded public key.
    pub async fn generate_keypair(&self) -> Result<String, OffloadError> {
        self.invoke(Operation::GenerateKeypair).await
    }

    pub async fn encrypt(&self, plaintext: &str, recipient: &str) -> Result<String, OffloadError> {
        self.invoke(Operation::Encrypt {
            plaintext: plaintext.to_string(),
            recipient: recipient.to_string(),
        })
        .await
    }

    pub async fn decrypt(&self, ciphertext: &str) -> Result<String, OffloadError> {
        self.invoke(Operation::Decrypt {
            ciphertext: ciphertext.to_string(),
        })
        .await
    }

    /// Calls still waiting for a reply.
    pub fn pending(&self) -> usize {
        lock(&self.pending).len()
    }
}

/// Deregisters the caller's listener if the call ends before the router
/// fulfils it (cancelled future, worker gone).
struct PendingGuard<'a> {
    id: RequestId,
    pending: &'a PendingTable,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        lock(self.pending).remove(&self.id);
    }
}

fn run_worker<E: CryptoEngine>(
    mut engine: E,
    mut requests: mpsc::UnboundedReceiver<Request>,
    responses: mpsc::UnboundedSender<Response>,
) {
    while let Some(Request { id, op }) = requests.blocking_recv() {
        let result = match op {
            Operation::GenerateKeypair => engine.generate_keypair(),
            Operation::Encrypt {
                plaintext,
                recipient,
            } => engine.encrypt(&plaintext, &recipient),
            Operation::Decrypt { ciphertext } => engine.decrypt(&ciphertext),
        };
        if responses.send(Response { id, result }).is_err() {
            break;
        }
    }
    debug!("crypto worker stopped");
}

async fn route_responses(mut responses: mpsc::UnboundedReceiver<Response>, pending: PendingTable) {
    while let Some(Response { id, result }) = responses.recv().await {
        let waiter = lock(&pending).remove(&id);
        match waiter {
            Some(tx) => {
                let _ = tx.send(result);
            }
            None => trace!("offload #{} reply arrived after its caller left", id),
        }
    }
    // Worker is gone: wake every remaining caller with WorkerGone.
    lock(&pending).clear();
}
