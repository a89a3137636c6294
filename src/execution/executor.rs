use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration};

use crate::api::{venue_errors, VenueGateway};
use crate::error::TradingError;
use crate::execution::SharedLedger;
use crate::models::{OrderHandle, OrderRecord, OrderRequest, Side};
use crate::Result;

/// Fatal errors raised by order monitors, consumed by the trading loop
pub type FaultReceiver = mpsc::UnboundedReceiver<TradingError>;

/// Poll cadence and deadlines for order monitors
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionSettings {
    pub poll_interval: Duration,
    pub max_poll_attempts: u32,
    /// Wall-clock limit on a monitor, raced against the poll budget
    pub order_timeout: Duration,
    /// Refuse every order without contacting the venue
    pub execution_safety: bool,
}

impl Default for ExecutionSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(3),
            max_poll_attempts: 10,
            order_timeout: Duration::from_secs(60),
            execution_safety: false,
        }
    }
}

/// How an order's monitor finished
#[derive(Debug, Clone, PartialEq)]
pub enum OrderOutcome {
    Filled,
    Failed(String),
    /// `attempts` is the number of status polls made before giving up
    TimedOut { attempts: u32 },
}

impl OrderOutcome {
    /// `Ok` for a fill, the matching order error otherwise
    pub fn into_result(self, order_id: &str) -> Result<()> {
        match self {
            OrderOutcome::Filled => Ok(()),
            OrderOutcome::Failed(reason) => Err(TradingError::OrderFailed {
                order_id: order_id.to_string(),
                reason,
            }),
            OrderOutcome::TimedOut { attempts } => Err(TradingError::TimedOut {
                order_id: order_id.to_string(),
                attempts,
            }),
        }
    }
}

/// An order the venue accepted, with its monitor running
#[derive(Debug)]
pub struct SubmittedOrder {
    pub handle: OrderHandle,
    pub venue: String,
    pub venue_order_id: String,
    monitor: JoinHandle<Result<OrderOutcome>>,
}

impl SubmittedOrder {
    /// Wait for the monitor to settle the order
    ///
    /// Callers never need to; the monitor settles the ledger on its own.
    pub async fn settled(self) -> Result<OrderOutcome> {
        match self.monitor.await {
            Ok(result) => result,
            Err(e) => Err(TradingError::Gateway(format!("order monitor aborted: {}", e))),
        }
    }

    /// Wait for the order and fail unless it filled
    pub async fn filled(self) -> Result<()> {
        let order_id = self.venue_order_id.clone();
        self.settled().await?.into_result(&order_id)
    }
}

/// Submits orders and hands each one to an independent monitor task
#[derive(Clone)]
pub struct OrderExecutor {
    gateway: Arc<dyn VenueGateway>,
    ledger: SharedLedger,
    settings: ExecutionSettings,
    faults: mpsc::UnboundedSender<TradingError>,
}

impl OrderExecutor {
    pub fn new(
        gateway: Arc<dyn VenueGateway>,
        ledger: SharedLedger,
        settings: ExecutionSettings,
    ) -> (Self, FaultReceiver) {
        let (faults, fault_rx) = mpsc::unbounded_channel();

        let executor = Self {
            gateway,
            ledger,
            settings,
            faults,
        };
        (executor, fault_rx)
    }

    pub fn ledger(&self) -> &SharedLedger {
        &self.ledger
    }

    /// Submit an order and spawn its monitor
    ///
    /// Returns once the venue has acknowledged the order; it does not wait
    /// for a fill. A rejected submission spawns nothing and needs no cancel.
    pub async fn execute(&self, request: OrderRequest) -> Result<SubmittedOrder> {
        let rejected = |reason: String| TradingError::SubmissionFailed {
            venue: request.venue.clone(),
            reason,
        };

        if self.settings.execution_safety {
            tracing::warn!(
                asset = %request.asset,
                side = %request.side,
                "Execution safety on, not submitting"
            );
            return Err(rejected("execution safety enabled".to_string()));
        }

        let ack = self
            .gateway
            .submit_order(&request)
            .await
            .map_err(|e| rejected(e.to_string()))?;

        if let Some(reason) = venue_errors(&ack.errors) {
            return Err(rejected(reason));
        }
        if ack.venue_order_id.is_empty() {
            return Err(rejected("venue returned no order id".to_string()));
        }

        let venue = if ack.venue.is_empty() {
            request.venue.clone()
        } else {
            ack.venue
        };
        let venue_order_id = ack.venue_order_id;

        tracing::info!(
            side = %request.side,
            size = %request.size,
            asset = %request.asset,
            base = %request.base_asset,
            price = %request.price,
            venue = %venue,
            order_id = %venue_order_id,
            "Order submitted"
        );

        let record = OrderRecord::submitted(&request, venue.clone(), venue_order_id.clone());
        let handle = self.ledger.record_submission(record);

        let monitor = OrderMonitor {
            gateway: self.gateway.clone(),
            ledger: self.ledger.clone(),
            settings: self.settings.clone(),
            faults: self.faults.clone(),
            handle,
            venue: venue.clone(),
            venue_order_id: venue_order_id.clone(),
            request,
            polls: AtomicU32::new(0),
        };

        Ok(SubmittedOrder {
            handle,
            venue,
            venue_order_id,
            monitor: tokio::spawn(monitor.run()),
        })
    }
}

/// Tracks one order from acknowledgement to a settled ledger entry
struct OrderMonitor {
    gateway: Arc<dyn VenueGateway>,
    ledger: SharedLedger,
    settings: ExecutionSettings,
    faults: mpsc::UnboundedSender<TradingError>,
    handle: OrderHandle,
    venue: String,
    venue_order_id: String,
    request: OrderRequest,
    polls: AtomicU32,
}

impl OrderMonitor {
    async fn run(self) -> Result<OrderOutcome> {
        let outcome = tokio::select! {
            outcome = self.poll_until_terminal() => outcome,
            _ = sleep(self.settings.order_timeout) => {
                tracing::warn!(
                    order_id = %self.venue_order_id,
                    timeout = ?self.settings.order_timeout,
                    "Order deadline elapsed"
                );
                OrderOutcome::TimedOut { attempts: self.polls.load(Ordering::SeqCst) }
            }
        };

        self.settle(outcome).await
    }

    async fn poll_until_terminal(&self) -> OrderOutcome {
        let max_attempts = self.settings.max_poll_attempts;

        for attempt in 1..=max_attempts {
            self.polls.store(attempt, Ordering::SeqCst);

            let report = match self
                .gateway
                .order_status(&self.venue, &self.venue_order_id)
                .await
            {
                Ok(report) => report,
                Err(e) => return OrderOutcome::Failed(e.to_string()),
            };

            // Venue messages on a status poll are informational; the order stays live
            if let Some(reason) = venue_errors(&report.errors) {
                tracing::warn!(
                    order_id = %self.venue_order_id,
                    attempt,
                    "Venue reported errors on status poll: {}",
                    reason
                );
            }

            tracing::info!(
                order_id = %self.venue_order_id,
                venue = %self.venue,
                attempt,
                status = ?report.status,
                filled = %report.filled_amount,
                "Order status"
            );

            if report.status.is_filled() {
                return OrderOutcome::Filled;
            }

            if attempt < max_attempts {
                sleep(self.settings.poll_interval).await;
            }
        }

        tracing::warn!(
            order_id = %self.venue_order_id,
            attempts = max_attempts,
            "Order still working after poll budget"
        );
        OrderOutcome::TimedOut {
            attempts: max_attempts,
        }
    }

    async fn settle(&self, outcome: OrderOutcome) -> Result<OrderOutcome> {
        match &outcome {
            OrderOutcome::Filled => {
                // An exit removes the position keyed by its entry price
                let price = match self.request.side {
                    Side::Buy => self.request.price,
                    Side::Sell => self.request.entry_price.unwrap_or(self.request.price),
                };
                self.ledger.apply_fill(
                    &self.request.asset,
                    self.request.side,
                    self.request.size,
                    price,
                );
                self.ledger.mark_complete(self.handle, true);
                tracing::info!(order_id = %self.venue_order_id, "Order filled");
            }
            OrderOutcome::Failed(_) | OrderOutcome::TimedOut { .. } => {
                if let Err(e) = outcome.clone().into_result(&self.venue_order_id) {
                    tracing::error!(venue = %self.venue, "CRITICAL - {}", e);
                }
                self.ledger.mark_complete(self.handle, false);
                self.cancel().await?;
            }
        }

        Ok(outcome)
    }

    /// One-shot cancel; a failure here leaves the order's true state unknown
    async fn cancel(&self) -> Result<()> {
        tracing::info!(order_id = %self.venue_order_id, venue = %self.venue, "Cancelling unsuccessful order");

        let failure = match self
            .gateway
            .cancel_order(&self.venue, &self.venue_order_id)
            .await
        {
            Ok(ack) => venue_errors(&ack.errors),
            Err(e) => Some(e.to_string()),
        };

        let Some(reason) = failure else {
            tracing::info!(order_id = %self.venue_order_id, "Order cancelled");
            return Ok(());
        };

        tracing::error!(
            order_id = %self.venue_order_id,
            venue = %self.venue,
            "Cancel failed, order state unknown: {}",
            reason
        );

        let _ = self.faults.send(self.unresolved(reason.clone()));
        Err(self.unresolved(reason))
    }

    fn unresolved(&self, reason: String) -> TradingError {
        TradingError::UnresolvedOrderState {
            venue: self.venue.clone(),
            order_id: self.venue_order_id.clone(),
            reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{CancelAck, StatusReport, SubmitAck, VenueError};
    use crate::execution::Ledger;
    use crate::models::OrderStatus;
    use async_trait::async_trait;
    use rust_decimal::Decimal;
    use std::collections::VecDeque;
    use std::str::FromStr;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Gateway that replays scripted status responses
    #[derive(Default)]
    struct ScriptedGateway {
        reject_submit: Option<String>,
        venue_error_on_submit: Option<String>,
        statuses: Mutex<VecDeque<Result<StatusReport>>>,
        status_delay: Option<Duration>,
        fail_cancel: bool,
        submits: AtomicUsize,
        status_calls: AtomicUsize,
        cancels: AtomicUsize,
    }

    impl ScriptedGateway {
        fn with_statuses(statuses: &[&str]) -> Self {
            Self {
                statuses: Mutex::new(statuses.iter().map(|s| Ok(report(s))).collect()),
                ..Default::default()
            }
        }
    }

    fn report(status: &str) -> StatusReport {
        StatusReport {
            status: OrderStatus::from(status),
            filled_amount: "0".to_string(),
            errors: vec![],
        }
    }

    #[async_trait]
    impl VenueGateway for ScriptedGateway {
        async fn submit_order(&self, request: &OrderRequest) -> Result<SubmitAck> {
            self.submits.fetch_add(1, Ordering::SeqCst);
            if let Some(reason) = &self.reject_submit {
                return Err(TradingError::Gateway(reason.clone()));
            }
            let errors = self
                .venue_error_on_submit
                .iter()
                .map(|m| VenueError { message: m.clone() })
                .collect();
            Ok(SubmitAck {
                venue: request.venue.clone(),
                venue_order_id: format!("oid-{}", self.submits.load(Ordering::SeqCst)),
                errors,
            })
        }

        async fn order_status(&self, _venue: &str, _order_id: &str) -> Result<StatusReport> {
            self.status_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.status_delay {
                sleep(delay).await;
            }
            self.statuses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(report("OPEN")))
        }

        async fn cancel_order(&self, _venue: &str, _order_id: &str) -> Result<CancelAck> {
            self.cancels.fetch_add(1, Ordering::SeqCst);
            if self.fail_cancel {
                return Err(TradingError::Gateway("connection reset".to_string()));
            }
            Ok(CancelAck::default())
        }
    }

    fn dec(value: &str) -> Decimal {
        Decimal::from_str(value).unwrap()
    }

    fn buy_btc() -> OrderRequest {
        OrderRequest {
            asset: "btc".to_string(),
            base_asset: "usd".to_string(),
            venue: "GDAX".to_string(),
            side: Side::Buy,
            size: dec("1.0"),
            price: dec("50000"),
            entry_price: None,
        }
    }

    fn executor_for(gateway: Arc<ScriptedGateway>) -> (OrderExecutor, FaultReceiver) {
        OrderExecutor::new(gateway, Ledger::shared(), ExecutionSettings::default())
    }

    #[tokio::test(start_paused = true)]
    async fn test_fill_opens_position() {
        let gateway = Arc::new(ScriptedGateway::with_statuses(&["OPEN", "PARTIAL_FILL", "FILL"]));
        let (executor, _faults) = executor_for(gateway.clone());

        let order = executor.execute(buy_btc()).await.unwrap();
        let handle = order.handle;
        assert!(executor.ledger().has_in_flight_order());

        assert_eq!(order.settled().await.unwrap(), OrderOutcome::Filled);

        let ledger = executor.ledger();
        let record = ledger.order(handle).unwrap();
        assert!(record.is_complete);
        assert!(record.is_filled);
        assert_eq!(ledger.current_position("btc").unwrap().size, dec("1.0"));
        assert_eq!(gateway.status_calls.load(Ordering::SeqCst), 3);
        assert_eq!(gateway.cancels.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_complete_status_counts_as_fill() {
        let gateway = Arc::new(ScriptedGateway::with_statuses(&["COMPLETE"]));
        let (executor, _faults) = executor_for(gateway);

        let order = executor.execute(buy_btc()).await.unwrap();
        assert_eq!(order.settled().await.unwrap(), OrderOutcome::Filled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sell_fill_closes_position() {
        let gateway = Arc::new(ScriptedGateway::with_statuses(&["FILL"]));
        let (executor, _faults) = executor_for(gateway);
        executor
            .ledger()
            .apply_fill("btc", Side::Buy, dec("1.0"), dec("50000"));

        let sell = OrderRequest {
            side: Side::Sell,
            price: dec("52000"),
            entry_price: Some(dec("50000")),
            ..buy_btc()
        };
        let order = executor.execute(sell).await.unwrap();
        order.settled().await.unwrap();

        assert!(executor.ledger().positions().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_rejection_spawns_nothing() {
        let gateway = Arc::new(ScriptedGateway {
            reject_submit: Some("connection refused".to_string()),
            ..Default::default()
        });
        let (executor, _faults) = executor_for(gateway.clone());

        let result = executor.execute(buy_btc()).await;

        assert!(matches!(result, Err(TradingError::SubmissionFailed { .. })));
        assert!(executor.ledger().orders().is_empty());
        assert_eq!(gateway.status_calls.load(Ordering::SeqCst), 0);
        assert_eq!(gateway.cancels.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_venue_rejection_is_submission_failure() {
        let gateway = Arc::new(ScriptedGateway {
            venue_error_on_submit: Some("insufficient balance".to_string()),
            ..Default::default()
        });
        let (executor, _faults) = executor_for(gateway);

        let result = executor.execute(buy_btc()).await;
        match result {
            Err(TradingError::SubmissionFailed { reason, .. }) => {
                assert_eq!(reason, "insufficient balance")
            }
            other => panic!("expected submission failure, got {:?}", other),
        }
        assert!(!executor.ledger().has_in_flight_order());
    }

    #[tokio::test(start_paused = true)]
    async fn test_execution_safety_blocks_submission() {
        let gateway = Arc::new(ScriptedGateway::default());
        let settings = ExecutionSettings {
            execution_safety: true,
            ..Default::default()
        };
        let (executor, _faults) = OrderExecutor::new(gateway.clone(), Ledger::shared(), settings);

        let result = executor.execute(buy_btc()).await;
        assert!(matches!(result, Err(TradingError::SubmissionFailed { .. })));
        assert_eq!(gateway.submits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_error_fails_without_retry() {
        let gateway = Arc::new(ScriptedGateway {
            statuses: Mutex::new(VecDeque::from(vec![
                Err(TradingError::Gateway("502".to_string())),
                Ok(report("FILL")),
            ])),
            ..Default::default()
        });
        let (executor, _faults) = executor_for(gateway.clone());

        let order = executor.execute(buy_btc()).await.unwrap();
        let handle = order.handle;
        let outcome = order.settled().await.unwrap();

        assert!(matches!(outcome, OrderOutcome::Failed(_)));
        assert_eq!(gateway.status_calls.load(Ordering::SeqCst), 1);
        assert_eq!(gateway.cancels.load(Ordering::SeqCst), 1);

        let record = executor.ledger().order(handle).unwrap();
        assert!(record.is_complete);
        assert!(!record.is_filled);
        assert!(executor.ledger().positions().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_poll_budget_times_out_and_cancels() {
        let gateway = Arc::new(ScriptedGateway::default());
        let (executor, _faults) = executor_for(gateway.clone());

        let order = executor.execute(buy_btc()).await.unwrap();
        let handle = order.handle;

        assert_eq!(
            order.settled().await.unwrap(),
            OrderOutcome::TimedOut { attempts: 10 }
        );
        assert_eq!(gateway.status_calls.load(Ordering::SeqCst), 10);
        assert_eq!(gateway.cancels.load(Ordering::SeqCst), 1);
        assert!(!executor.ledger().order(handle).unwrap().is_filled);
        assert!(!executor.ledger().has_in_flight_order());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_gateway_hits_deadline() {
        let gateway = Arc::new(ScriptedGateway {
            status_delay: Some(Duration::from_secs(3600)),
            ..Default::default()
        });
        let (executor, _faults) = executor_for(gateway.clone());

        let started = tokio::time::Instant::now();
        let order = executor.execute(buy_btc()).await.unwrap();

        assert_eq!(
            order.settled().await.unwrap(),
            OrderOutcome::TimedOut { attempts: 1 }
        );
        assert!(started.elapsed() >= Duration::from_secs(60));
        assert!(started.elapsed() < Duration::from_secs(3600));
        assert_eq!(gateway.status_calls.load(Ordering::SeqCst), 1);
        assert_eq!(gateway.cancels.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_venue_errors_keep_polling() {
        let mut limited = report("OPEN");
        limited.errors = vec![VenueError {
            message: "rate limited".to_string(),
        }];
        let gateway = Arc::new(ScriptedGateway {
            statuses: Mutex::new(VecDeque::from(vec![Ok(limited), Ok(report("FILL"))])),
            ..Default::default()
        });
        let (executor, _faults) = executor_for(gateway.clone());

        let order = executor.execute(buy_btc()).await.unwrap();

        assert_eq!(order.settled().await.unwrap(), OrderOutcome::Filled);
        assert_eq!(gateway.status_calls.load(Ordering::SeqCst), 2);
        assert_eq!(gateway.cancels.load(Ordering::SeqCst), 0);
        assert!(executor.ledger().current_position("btc").is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_filled_reports_order_errors() {
        let gateway = Arc::new(ScriptedGateway::default());
        let (executor, _faults) = executor_for(gateway);
        let order = executor.execute(buy_btc()).await.unwrap();
        match order.filled().await {
            Err(TradingError::TimedOut { order_id, attempts }) => {
                assert_eq!(order_id, "oid-1");
                assert_eq!(attempts, 10);
            }
            other => panic!("expected a timeout, got {:?}", other),
        }

        let gateway = Arc::new(ScriptedGateway {
            statuses: Mutex::new(VecDeque::from(vec![Err(TradingError::Gateway(
                "502".to_string(),
            ))])),
            ..Default::default()
        });
        let (executor, _faults) = executor_for(gateway);
        let order = executor.execute(buy_btc()).await.unwrap();
        assert!(matches!(
            order.filled().await,
            Err(TradingError::OrderFailed { .. })
        ));

        let gateway = Arc::new(ScriptedGateway::with_statuses(&["FILL"]));
        let (executor, _faults) = executor_for(gateway);
        let order = executor.execute(buy_btc()).await.unwrap();
        tokio_test::assert_ok!(order.filled().await);
    }

    #[test]
    fn test_outcome_maps_to_order_errors() {
        assert!(OrderOutcome::Filled.into_result("oid-1").is_ok());
        assert!(matches!(
            OrderOutcome::Failed("rejected".to_string()).into_result("oid-1"),
            Err(TradingError::OrderFailed { ref reason, .. }) if reason == "rejected"
        ));
        assert!(matches!(
            OrderOutcome::TimedOut { attempts: 3 }.into_result("oid-1"),
            Err(TradingError::TimedOut { attempts: 3, .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_cancel_is_fatal() {
        let gateway = Arc::new(ScriptedGateway {
            fail_cancel: true,
            ..Default::default()
        });
        let (executor, mut faults) = executor_for(gateway);

        let order = executor.execute(buy_btc()).await.unwrap();
        let result = order.settled().await;

        assert!(matches!(
            result,
            Err(TradingError::UnresolvedOrderState { .. })
        ));
        let fault = faults.recv().await.unwrap();
        assert!(fault.is_fatal());
    }
}
