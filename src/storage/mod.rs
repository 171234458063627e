//! In-process stand-in for the hosted document store and auth service.
//!
//! Expenses live as JSON documents and are decoded on every read, live
//! listeners are re-evaluated after each write, and accounts keep argon2
//! password hashes. Tests and the demo binary run against it; production
//! builds plug a vendor SDK in behind the same traits.

mod accounts;
mod documents;

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{Map, Value};
use tokio::sync::mpsc;

use crate::auth::services::FederatedKeys;
use crate::config::AppConfig;
use crate::error::GatewayError;
use crate::expenses::{Expense, FeedQuery};
use crate::lock;

use accounts::Account;

pub struct MemoryBackend {
    store: Arc<Mutex<Store>>,
    keys: FederatedKeys,
    online: AtomicBool,
    write_latency: Mutex<Duration>,
}

#[derive(Default)]
struct Store {
    documents: BTreeMap<String, Map<String, Value>>,
    accounts: HashMap<String, Account>,
    session: Option<String>,
    listeners: HashMap<u64, Listener>,
    next_listener: u64,
}

struct Listener {
    owner: String,
    query: FeedQuery,
    tx: mpsc::UnboundedSender<Vec<Expense>>,
}

impl MemoryBackend {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            store: Arc::new(Mutex::new(Store::default())),
            keys: FederatedKeys::from(&config.federated),
            online: AtomicBool::new(true),
            write_latency: Mutex::new(Duration::ZERO),
        }
    }

    /// Keys of the identity provider this backend trusts.
    pub fn federated_keys(&self) -> &FederatedKeys {
        &self.keys
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    /// Delay applied before every document write.
    pub fn set_write_latency(&self, latency: Duration) {
        *lock(&self.write_latency) = latency;
    }

    /// Stores a document verbatim, bypassing validation and ownership stamping.
    pub fn insert_raw_document(&self, id: &str, doc: Map<String, Value>) {
        let mut store = lock(&self.store);
        store.documents.insert(id.to_string(), doc);
        store.notify();
    }

    pub fn document(&self, id: &str) -> Option<Map<String, Value>> {
        lock(&self.store).documents.get(id).cloned()
    }

    pub fn active_listeners(&self) -> usize {
        lock(&self.store).listeners.len()
    }

    fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    fn require_online(&self, offline: GatewayError) -> Result<(), GatewayError> {
        if self.is_online() {
            Ok(())
        } else {
            Err(offline)
        }
    }

    async fn simulate_latency(&self) {
        let latency = *lock(&self.write_latency);
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }
}
