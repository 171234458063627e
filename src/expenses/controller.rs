use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use time::OffsetDateTime;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use super::dto::{ExpenseFilter, ExpenseState, ExpenseTotals, FeedQuery};
use super::repo::ExpenseGateway;
use super::repo_types::{Category, Expense};
use super::services::validate_expense_input;
use crate::config::AppConfig;
use crate::error::GatewayError;
use crate::lock;
use crate::subscription::ListenerGuard;

/// Observable state of the expense list screen.
///
/// Cheap to clone; all clones share the same state slots and live feed.
/// Must be created inside a tokio runtime, the live feed runs as a task.
#[derive(Clone)]
pub struct ExpenseController {
    inner: Arc<Inner>,
}

struct Inner {
    gateway: Arc<dyn ExpenseGateway>,
    state: watch::Sender<ExpenseState>,
    filter: watch::Sender<ExpenseFilter>,
    expenses: watch::Sender<Vec<Expense>>,
    totals: watch::Sender<ExpenseTotals>,
    feed: Mutex<Feed>,
    create_timeout: Duration,
    max_name_length: usize,
}

/// The active live subscription. `generation` identifies it; emissions
/// tagged with an older generation are discarded.
#[derive(Default)]
struct Feed {
    generation: u64,
    guard: Option<ListenerGuard>,
    task: Option<JoinHandle<()>>,
}

impl Feed {
    fn cancel(&mut self) {
        if let Some(guard) = self.guard.take() {
            guard.release();
        }
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for Feed {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl ExpenseController {
    pub fn new(gateway: Arc<dyn ExpenseGateway>, config: &AppConfig) -> Self {
        let controller = Self {
            inner: Arc::new(Inner {
                gateway,
                state: watch::Sender::new(ExpenseState::Idle),
                filter: watch::Sender::new(ExpenseFilter::default()),
                expenses: watch::Sender::new(Vec::new()),
                totals: watch::Sender::new(ExpenseTotals::default()),
                feed: Mutex::new(Feed::default()),
                create_timeout: config.expense_create_timeout,
                max_name_length: config.max_expense_name_length,
            }),
        };
        controller.load_expenses();
        controller
    }

    pub fn state(&self) -> watch::Receiver<ExpenseState> {
        self.inner.state.subscribe()
    }

    pub fn current_state(&self) -> ExpenseState {
        self.inner.state.borrow().clone()
    }

    pub fn filter(&self) -> watch::Receiver<ExpenseFilter> {
        self.inner.filter.subscribe()
    }

    pub fn current_filter(&self) -> ExpenseFilter {
        *self.inner.filter.borrow()
    }

    pub fn expenses(&self) -> watch::Receiver<Vec<Expense>> {
        self.inner.expenses.subscribe()
    }

    pub fn totals(&self) -> watch::Receiver<ExpenseTotals> {
        self.inner.totals.subscribe()
    }

    pub fn current_totals(&self) -> ExpenseTotals {
        self.inner.totals.borrow().clone()
    }

    /// Validates locally, then creates the expense under the configured timeout.
    #[instrument(skip_all, fields(category = %category))]
    pub async fn add(
        &self,
        name: &str,
        amount_text: &str,
        category: Category,
        date: OffsetDateTime,
        notes: &str,
    ) {
        let input = match validate_expense_input(name, amount_text, self.inner.max_name_length) {
            Ok(input) => input,
            Err(e) => {
                warn!(error = %e, "add expense rejected");
                self.set_state(ExpenseState::Error(e.to_string()));
                return;
            }
        };

        self.set_state(ExpenseState::Loading);
        let expense = Expense::draft(input.name, input.amount, category, date, notes);
        let pending = self.inner.gateway.create_expense(expense);
        let next = match tokio::time::timeout(self.inner.create_timeout, pending).await {
            Ok(Ok(id)) => {
                info!(expense_id = %id, "expense created");
                ExpenseState::Success
            }
            Ok(Err(e)) => {
                error!(error = %e, "create expense failed");
                ExpenseState::Error(e.to_string())
            }
            Err(_) => {
                error!(timeout = ?self.inner.create_timeout, "create expense timed out");
                ExpenseState::Error(GatewayError::Timeout.to_string())
            }
        };
        self.set_state(next);
    }

    /// Same validation as `add`; no timeout is applied here.
    #[instrument(skip_all, fields(expense_id = %id, category = %category))]
    pub async fn update(
        &self,
        id: &str,
        name: &str,
        amount_text: &str,
        category: Category,
        date: OffsetDateTime,
        notes: &str,
    ) {
        let input = match validate_expense_input(name, amount_text, self.inner.max_name_length) {
            Ok(input) => input,
            Err(e) => {
                warn!(error = %e, "update expense rejected");
                self.set_state(ExpenseState::Error(e.to_string()));
                return;
            }
        };

        self.set_state(ExpenseState::Loading);
        let mut expense = Expense::draft(input.name, input.amount, category, date, notes);
        expense.id = id.to_string();
        let next = match self.inner.gateway.update_expense(expense).await {
            Ok(()) => {
                info!("expense updated");
                ExpenseState::Success
            }
            Err(e) => {
                error!(error = %e, "update expense failed");
                ExpenseState::Error(e.to_string())
            }
        };
        self.set_state(next);
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, id: &str) {
        self.set_state(ExpenseState::Loading);
        let next = match self.inner.gateway.delete_expense(id).await {
            Ok(()) => {
                info!("expense deleted");
                ExpenseState::Success
            }
            Err(e) => {
                error!(error = %e, "delete expense failed");
                ExpenseState::Error(e.to_string())
            }
        };
        self.set_state(next);
    }

    pub fn set_filter(&self, filter: ExpenseFilter) {
        self.inner.filter.send_replace(filter);
        self.load_expenses();
    }

    pub fn clear_filter(&self) {
        self.set_filter(ExpenseFilter::default());
    }

    pub fn show_current_month(&self) {
        self.set_filter(ExpenseFilter::current_month());
    }

    /// Restarts the live feed with the current filter, e.g. after sign-in.
    pub fn refresh(&self) {
        self.load_expenses();
    }

    /// Back to `Idle` once the presentation layer consumed a terminal state.
    pub fn reset_state(&self) {
        self.set_state(ExpenseState::Idle);
    }

    fn set_state(&self, next: ExpenseState) {
        self.inner.state.send_replace(next);
    }

    fn load_expenses(&self) {
        let query = self.inner.filter.borrow().query();
        let gateway = &self.inner.gateway;

        // the old listener is released under the lock, before the new one
        // can apply anything
        let mut feed = lock(&self.inner.feed);
        feed.cancel();
        feed.generation += 1;

        let subscription = match query {
            FeedQuery::All => gateway.subscribe_all_expenses(),
            FeedQuery::Month { month, year } => gateway.subscribe_expenses_by_month(month, year),
            FeedQuery::Category(category) => gateway.subscribe_expenses_by_category(category),
        };
        let (rx, guard) = subscription.into_parts();
        let generation = feed.generation;
        feed.guard = Some(guard);
        feed.task = Some(tokio::spawn(run_feed(
            Arc::downgrade(&self.inner),
            generation,
            rx,
        )));
        debug!(?query, generation, "expense feed started");
    }
}

impl Inner {
    /// Returns false once this feed has been superseded.
    fn apply_emission(&self, generation: u64, expenses: Vec<Expense>) -> bool {
        let feed = lock(&self.feed);
        if feed.generation != generation {
            debug!(generation, current = feed.generation, "stale expense emission dropped");
            return false;
        }
        let totals = ExpenseTotals::from_expenses(&expenses);
        debug!(count = expenses.len(), total = totals.total, "expense list updated");
        self.expenses.send_replace(expenses);
        self.totals.send_replace(totals);
        true
    }
}

async fn run_feed(
    inner: Weak<Inner>,
    generation: u64,
    mut rx: mpsc::UnboundedReceiver<Vec<Expense>>,
) {
    while let Some(expenses) = rx.recv().await {
        let Some(inner) = inner.upgrade() else {
            break;
        };
        if !inner.apply_emission(generation, expenses) {
            break;
        }
    }
    debug!(generation, "expense feed ended");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subscription::Subscription;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};
    use time::macros::datetime;
    use time::Month;

    enum CreateBehaviour {
        Succeed,
        Fail(GatewayError),
        Hang,
    }

    struct OpenFeed {
        query: FeedQuery,
        tx: mpsc::UnboundedSender<Vec<Expense>>,
        released: Arc<AtomicBool>,
    }

    struct ScriptedGateway {
        create_behaviour: Mutex<CreateBehaviour>,
        created: Mutex<Vec<Expense>>,
        updated: Mutex<Vec<Expense>>,
        deleted: Mutex<Vec<String>>,
        delete_error: Mutex<Option<GatewayError>>,
        feeds: Mutex<Vec<OpenFeed>>,
    }

    impl ScriptedGateway {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                create_behaviour: Mutex::new(CreateBehaviour::Succeed),
                created: Mutex::new(Vec::new()),
                updated: Mutex::new(Vec::new()),
                deleted: Mutex::new(Vec::new()),
                delete_error: Mutex::new(None),
                feeds: Mutex::new(Vec::new()),
            })
        }

        fn open(&self, query: FeedQuery) -> Subscription<Vec<Expense>> {
            let (tx, rx) = mpsc::unbounded_channel();
            let released = Arc::new(AtomicBool::new(false));
            let flag = released.clone();
            self.feeds.lock().unwrap().push(OpenFeed {
                query,
                tx,
                released,
            });
            Subscription::new(
                rx,
                ListenerGuard::new(move || flag.store(true, Ordering::SeqCst)),
            )
        }

        fn emit(&self, index: usize, list: Vec<Expense>) {
            let _ = self.feeds.lock().unwrap()[index].tx.send(list);
        }

        fn queries(&self) -> Vec<FeedQuery> {
            self.feeds.lock().unwrap().iter().map(|f| f.query).collect()
        }

        fn released(&self, index: usize) -> bool {
            self.feeds.lock().unwrap()[index]
                .released
                .load(Ordering::SeqCst)
        }

        fn write_calls(&self) -> usize {
            self.created.lock().unwrap().len()
                + self.updated.lock().unwrap().len()
                + self.deleted.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl ExpenseGateway for ScriptedGateway {
        async fn create_expense(&self, expense: Expense) -> Result<String, GatewayError> {
            self.created.lock().unwrap().push(expense);
            let outcome = match &*self.create_behaviour.lock().unwrap() {
                CreateBehaviour::Succeed => Some(Ok("new-id".to_string())),
                CreateBehaviour::Fail(e) => Some(Err(e.clone())),
                CreateBehaviour::Hang => None,
            };
            match outcome {
                Some(result) => result,
                None => std::future::pending().await,
            }
        }

        async fn update_expense(&self, expense: Expense) -> Result<(), GatewayError> {
            self.updated.lock().unwrap().push(expense);
            Ok(())
        }

        async fn delete_expense(&self, id: &str) -> Result<(), GatewayError> {
            self.deleted.lock().unwrap().push(id.to_string());
            match self.delete_error.lock().unwrap().clone() {
                Some(e) => Err(e),
                None => Ok(()),
            }
        }

        fn subscribe_all_expenses(&self) -> Subscription<Vec<Expense>> {
            self.open(FeedQuery::All)
        }

        fn subscribe_expenses_by_month(
            &self,
            month: Month,
            year: i32,
        ) -> Subscription<Vec<Expense>> {
            self.open(FeedQuery::Month { month, year })
        }

        fn subscribe_expenses_by_category(&self, category: Category) -> Subscription<Vec<Expense>> {
            self.open(FeedQuery::Category(category))
        }
    }

    fn controller(gateway: &Arc<ScriptedGateway>) -> ExpenseController {
        let config = AppConfig {
            expense_create_timeout: Duration::from_millis(50),
            ..AppConfig::default()
        };
        ExpenseController::new(gateway.clone(), &config)
    }

    fn stored(id: &str, amount: f64, category: Category) -> Expense {
        let mut e = Expense::draft(id, amount, category, datetime!(2024-03-10 12:00 UTC), "");
        e.id = id.to_string();
        e.owner_id = "u1".into();
        e
    }

    async fn wait_for<T: Clone>(rx: &mut watch::Receiver<T>, pred: impl FnMut(&T) -> bool) -> T {
        tokio::time::timeout(Duration::from_secs(2), rx.wait_for(pred))
            .await
            .expect("timed out waiting for state")
            .expect("sender dropped")
            .clone()
    }

    fn today() -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }

    #[tokio::test]
    async fn starts_with_unfiltered_feed_and_derives_totals() {
        let gateway = ScriptedGateway::new();
        let ctrl = controller(&gateway);
        assert_eq!(gateway.queries(), vec![FeedQuery::All]);

        gateway.emit(
            0,
            vec![
                stored("a", 3.5, Category::Food),
                stored("b", 20.0, Category::Housing),
                stored("c", 1.5, Category::Food),
            ],
        );
        let mut totals = ctrl.totals();
        let totals = wait_for(&mut totals, |t| t.total > 0.0).await;
        assert_eq!(totals.total, 25.0);
        assert_eq!(totals.for_category(Category::Food), 5.0);
        assert_eq!(totals.for_category(Category::Housing), 20.0);
        assert_eq!(ctrl.expenses().borrow().len(), 3);
    }

    #[tokio::test]
    async fn add_coffee_then_emission_bumps_total() {
        let gateway = ScriptedGateway::new();
        let ctrl = controller(&gateway);
        let mut totals = ctrl.totals();

        gateway.emit(0, vec![stored("rent", 500.0, Category::Housing)]);
        wait_for(&mut totals, |t| t.total == 500.0).await;

        ctrl.add("Coffee", "3.5", Category::Food, today(), "").await;
        assert_eq!(ctrl.current_state(), ExpenseState::Success);
        {
            let created = gateway.created.lock().unwrap();
            assert_eq!(created.len(), 1);
            assert_eq!(created[0].amount, 3.5);
            assert_eq!(created[0].category, Category::Food);
            assert!(created[0].id.is_empty());
        }

        gateway.emit(
            0,
            vec![
                stored("coffee", 3.5, Category::Food),
                stored("rent", 500.0, Category::Housing),
            ],
        );
        let after = wait_for(&mut totals, |t| t.total != 500.0).await;
        assert_eq!(after.total, 503.5);
    }

    #[tokio::test]
    async fn blank_name_fails_without_io() {
        let gateway = ScriptedGateway::new();
        let ctrl = controller(&gateway);
        ctrl.add("", "10", Category::Food, today(), "").await;
        assert_eq!(ctrl.current_state(), ExpenseState::Error("name required".into()));
        assert_eq!(gateway.write_calls(), 0);
    }

    #[tokio::test]
    async fn unparseable_amount_fails_without_io() {
        let gateway = ScriptedGateway::new();
        let ctrl = controller(&gateway);
        ctrl.add("Rent", "abc", Category::Housing, today(), "").await;
        assert_eq!(ctrl.current_state(), ExpenseState::Error("invalid amount".into()));
        assert_eq!(gateway.write_calls(), 0);
    }

    #[tokio::test]
    async fn add_succeeds_only_for_positive_numbers() {
        let cases = [
            ("1", true),
            ("0.01", true),
            ("99999.99", true),
            ("0", false),
            ("-5", false),
            ("ten", false),
            ("", false),
        ];
        for (text, accepted) in cases {
            let gateway = ScriptedGateway::new();
            let ctrl = controller(&gateway);
            ctrl.add("Item", text, Category::Other, today(), "").await;
            assert_eq!(gateway.write_calls() == 1, accepted, "amount {text:?}");
            assert_eq!(
                ctrl.current_state() == ExpenseState::Success,
                accepted,
                "amount {text:?}"
            );
        }
    }

    #[tokio::test]
    async fn create_timeout_has_its_own_message() {
        let gateway = ScriptedGateway::new();
        *gateway.create_behaviour.lock().unwrap() = CreateBehaviour::Hang;
        let ctrl = controller(&gateway);
        ctrl.add("Taxi", "12", Category::Transport, today(), "").await;
        assert_eq!(
            ctrl.current_state(),
            ExpenseState::Error(GatewayError::Timeout.to_string())
        );
    }

    #[tokio::test]
    async fn backend_failure_surfaces_message() {
        let gateway = ScriptedGateway::new();
        *gateway.create_behaviour.lock().unwrap() =
            CreateBehaviour::Fail(GatewayError::Unauthenticated);
        let ctrl = controller(&gateway);
        ctrl.add("Taxi", "12", Category::Transport, today(), "").await;
        assert_eq!(
            ctrl.current_state(),
            ExpenseState::Error(GatewayError::Unauthenticated.to_string())
        );
    }

    #[tokio::test]
    async fn update_validates_then_writes_with_id() {
        let gateway = ScriptedGateway::new();
        let ctrl = controller(&gateway);

        ctrl.update("e1", "Gym", "-3", Category::Health, today(), "").await;
        assert_eq!(ctrl.current_state(), ExpenseState::Error("invalid amount".into()));
        assert_eq!(gateway.write_calls(), 0);

        ctrl.update("e1", "Gym", "30", Category::Health, today(), "monthly")
            .await;
        assert_eq!(ctrl.current_state(), ExpenseState::Success);
        let updated = gateway.updated.lock().unwrap();
        assert_eq!(updated[0].id, "e1");
        assert_eq!(updated[0].notes, "monthly");
    }

    #[tokio::test]
    async fn delete_resolves_from_gateway() {
        let gateway = ScriptedGateway::new();
        let ctrl = controller(&gateway);
        ctrl.delete("e1").await;
        assert_eq!(ctrl.current_state(), ExpenseState::Success);

        *gateway.delete_error.lock().unwrap() = Some(GatewayError::Backend("boom".into()));
        ctrl.delete("e2").await;
        assert_eq!(
            ctrl.current_state(),
            ExpenseState::Error("backend error: boom".into())
        );
        assert_eq!(*gateway.deleted.lock().unwrap(), vec!["e1", "e2"]);
    }

    #[tokio::test]
    async fn reset_state_returns_to_idle() {
        let gateway = ScriptedGateway::new();
        let ctrl = controller(&gateway);
        ctrl.add("", "1", Category::Other, today(), "").await;
        assert!(matches!(ctrl.current_state(), ExpenseState::Error(_)));
        ctrl.reset_state();
        assert_eq!(ctrl.current_state(), ExpenseState::Idle);
    }

    #[tokio::test]
    async fn month_filter_wins_when_both_dimensions_set() {
        let gateway = ScriptedGateway::new();
        let ctrl = controller(&gateway);
        let filter = ExpenseFilter {
            category: Some(Category::Food),
            month: Some(Month::March),
            year: Some(2024),
        };
        ctrl.set_filter(filter);
        assert_eq!(ctrl.current_filter(), filter);
        assert_eq!(
            gateway.queries().last(),
            Some(&FeedQuery::Month {
                month: Month::March,
                year: 2024
            })
        );
    }

    #[tokio::test]
    async fn clear_filter_twice_resubscribes_unfiltered() {
        let gateway = ScriptedGateway::new();
        let ctrl = controller(&gateway);
        ctrl.set_filter(ExpenseFilter::by_category(Category::Education));
        ctrl.clear_filter();
        ctrl.clear_filter();
        assert_eq!(
            gateway.queries(),
            vec![
                FeedQuery::All,
                FeedQuery::Category(Category::Education),
                FeedQuery::All,
                FeedQuery::All,
            ]
        );
        assert_eq!(ctrl.current_filter(), ExpenseFilter::default());
        assert!(gateway.released(0) && gateway.released(1) && gateway.released(2));
        assert!(!gateway.released(3));
    }

    #[tokio::test]
    async fn switching_filter_cancels_before_new_emissions_apply() {
        let gateway = ScriptedGateway::new();
        let ctrl = controller(&gateway);
        let mut expenses = ctrl.expenses();

        ctrl.set_filter(ExpenseFilter::by_category(Category::Food));
        gateway.emit(1, vec![stored("food", 4.0, Category::Food)]);
        wait_for(&mut expenses, |l| l.len() == 1 && l[0].id == "food").await;

        ctrl.set_filter(ExpenseFilter::by_month(Month::March, 2024));
        assert!(gateway.released(1), "category listener released on switch");

        // a late emission from the old feed must not land
        gateway.emit(1, vec![stored("stale", 99.0, Category::Food)]);
        gateway.emit(2, vec![stored("march", 7.0, Category::Other)]);
        wait_for(&mut expenses, |l| l.first().map(|e| e.id.as_str()) == Some("march")).await;

        tokio::time::sleep(Duration::from_millis(20)).await;
        let current = ctrl.expenses().borrow().clone();
        assert_eq!(current.len(), 1);
        assert_eq!(current[0].id, "march");
        assert_eq!(ctrl.current_totals().total, 7.0);
    }

    #[tokio::test]
    async fn dropping_controller_releases_feed() {
        let gateway = ScriptedGateway::new();
        let ctrl = controller(&gateway);
        let clone = ctrl.clone();
        drop(ctrl);
        assert!(!gateway.released(0));
        drop(clone);
        assert!(gateway.released(0));
    }

    #[tokio::test]
    async fn show_current_month_uses_month_feed() {
        let gateway = ScriptedGateway::new();
        let ctrl = controller(&gateway);
        ctrl.show_current_month();
        let now = OffsetDateTime::now_utc();
        assert_eq!(
            gateway.queries().last(),
            Some(&FeedQuery::Month {
                month: now.month(),
                year: now.year()
            })
        );
    }
}
