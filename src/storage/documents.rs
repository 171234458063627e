use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use time::format_description::well_known::Rfc3339;
use time::{Month, OffsetDateTime};
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::{Listener, MemoryBackend, Store};
use crate::error::GatewayError;
use crate::expenses::repo::decode_snapshot;
use crate::expenses::{month_range, Category, Expense, ExpenseGateway, FeedQuery};
use crate::lock;
use crate::subscription::{ListenerGuard, Subscription};

const PERMISSION_DENIED: &str = "permission denied: missing or insufficient permissions";
const UNAVAILABLE: &str = "the service is currently unavailable";

impl Store {
    /// Current result of `query` for `owner`, evaluated on the raw fields the
    /// way the hosted store filters them.
    pub(super) fn snapshot(&self, owner: &str, query: &FeedQuery) -> Vec<Expense> {
        let range = match query {
            FeedQuery::Month { month, year } => match month_range(*month, *year) {
                Ok(range) => Some(range),
                Err(e) => {
                    warn!(error = %e, "month outside the supported calendar");
                    return Vec::new();
                }
            },
            _ => None,
        };

        let matching = self.documents.iter().filter(|(_, doc)| {
            if raw_str(doc, "userId") != Some(owner) {
                return false;
            }
            match query {
                FeedQuery::All => true,
                FeedQuery::Category(category) => raw_str(doc, "category") == Some(category.name()),
                FeedQuery::Month { .. } => match (range, raw_date(doc)) {
                    (Some((start, end)), Some(date)) => start <= date && date <= end,
                    _ => false,
                },
            }
        });
        decode_snapshot(matching)
    }

    /// Closes the live queries opened by anyone other than the current
    /// principal. Their consumers see the feed end.
    pub(super) fn drop_foreign_listeners(&mut self) {
        let session = self.session.clone();
        let before = self.listeners.len();
        self.listeners
            .retain(|_, l| session.as_deref() == Some(l.owner.as_str()));
        let dropped = before - self.listeners.len();
        if dropped > 0 {
            debug!(dropped, "closed listeners of a previous session");
        }
    }

    /// Pushes fresh results to every listener, dropping the ones nobody reads.
    pub(super) fn notify(&mut self) {
        let updates: Vec<(u64, Vec<Expense>)> = self
            .listeners
            .iter()
            .map(|(id, l)| (*id, self.snapshot(&l.owner, &l.query)))
            .collect();
        for (id, expenses) in updates {
            let delivered = self
                .listeners
                .get(&id)
                .map(|l| l.tx.send(expenses).is_ok())
                .unwrap_or(false);
            if !delivered {
                debug!(listener = id, "listener gone, removing");
                self.listeners.remove(&id);
            }
        }
    }
}

fn raw_str<'a>(doc: &'a Map<String, Value>, field: &str) -> Option<&'a str> {
    doc.get(field).and_then(Value::as_str)
}

fn raw_date(doc: &Map<String, Value>) -> Option<OffsetDateTime> {
    raw_str(doc, "date").and_then(|s| OffsetDateTime::parse(s, &Rfc3339).ok())
}

impl MemoryBackend {
    fn open_listener(&self, query: FeedQuery) -> Subscription<Vec<Expense>> {
        let mut store = lock(&self.store);
        let Some(owner) = store.session.clone() else {
            debug!(?query, "no signed-in user, live query completes empty");
            return Subscription::completed(Vec::new());
        };

        let (tx, rx) = mpsc::unbounded_channel();
        let _ = tx.send(store.snapshot(&owner, &query));
        let id = store.next_listener;
        store.next_listener += 1;
        store.listeners.insert(id, Listener { owner, query, tx });
        debug!(listener = id, ?query, "listener registered");

        let weak = Arc::downgrade(&self.store);
        Subscription::new(
            rx,
            ListenerGuard::new(move || {
                if let Some(store) = weak.upgrade() {
                    lock(&store).listeners.remove(&id);
                    debug!(listener = id, "listener released");
                }
            }),
        )
    }
}

#[async_trait]
impl ExpenseGateway for MemoryBackend {
    #[instrument(skip_all)]
    async fn create_expense(&self, mut expense: Expense) -> Result<String, GatewayError> {
        self.simulate_latency().await;
        self.require_online(GatewayError::NetworkUnavailable)?;

        let mut store = lock(&self.store);
        let owner = store.session.clone().ok_or(GatewayError::Unauthenticated)?;
        let now = OffsetDateTime::now_utc();
        expense.owner_id = owner;
        expense.created_at = now;
        expense.updated_at = now;

        let id = Uuid::new_v4().to_string();
        store.documents.insert(id.clone(), expense.to_document());
        store.notify();
        info!(expense_id = %id, "expense document created");
        Ok(id)
    }

    #[instrument(skip_all, fields(expense_id = %expense.id))]
    async fn update_expense(&self, mut expense: Expense) -> Result<(), GatewayError> {
        self.simulate_latency().await;
        self.require_online(GatewayError::Backend(UNAVAILABLE.into()))?;

        let mut store = lock(&self.store);
        let owner = store.session.clone().ok_or(GatewayError::Unauthenticated)?;
        if expense.id.is_empty() {
            return Err(GatewayError::InvalidId);
        }
        let created_at = match store.documents.get(&expense.id) {
            None => {
                return Err(GatewayError::Backend(format!(
                    "no document to update: {}",
                    expense.id
                )))
            }
            Some(existing) if raw_str(existing, "userId") != Some(owner.as_str()) => {
                warn!("update of a document owned by someone else");
                return Err(GatewayError::Backend(PERMISSION_DENIED.into()));
            }
            Some(existing) => existing.get("createdAt").cloned(),
        };

        expense.owner_id = owner;
        expense.updated_at = OffsetDateTime::now_utc();
        let mut doc = expense.to_document();
        if let Some(created_at) = created_at {
            doc.insert("createdAt".into(), created_at);
        }
        store.documents.insert(expense.id.clone(), doc);
        store.notify();
        info!("expense document updated");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_expense(&self, id: &str) -> Result<(), GatewayError> {
        self.simulate_latency().await;
        self.require_online(GatewayError::Backend(UNAVAILABLE.into()))?;
        if id.is_empty() {
            return Err(GatewayError::Backend("invalid document path".into()));
        }

        let mut store = lock(&self.store);
        let Some(owner) = store.session.clone() else {
            return Err(GatewayError::Backend(PERMISSION_DENIED.into()));
        };
        if let Some(existing) = store.documents.get(id) {
            if raw_str(existing, "userId") != Some(owner.as_str()) {
                warn!("delete of a document owned by someone else");
                return Err(GatewayError::Backend(PERMISSION_DENIED.into()));
            }
        }
        if store.documents.remove(id).is_some() {
            store.notify();
            info!("expense document deleted");
        }
        Ok(())
    }

    fn subscribe_all_expenses(&self) -> Subscription<Vec<Expense>> {
        self.open_listener(FeedQuery::All)
    }

    fn subscribe_expenses_by_month(&self, month: Month, year: i32) -> Subscription<Vec<Expense>> {
        self.open_listener(FeedQuery::Month { month, year })
    }

    fn subscribe_expenses_by_category(&self, category: Category) -> Subscription<Vec<Expense>> {
        self.open_listener(FeedQuery::Category(category))
    }
}
