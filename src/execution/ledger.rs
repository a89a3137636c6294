use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::models::{OrderHandle, OrderRecord, Position, Side};

pub type SharedLedger = Arc<Ledger>;

#[derive(Debug, Default)]
struct LedgerState {
    positions: Vec<Position>,
    orders: Vec<OrderRecord>,
}

/// Open positions and the log of submitted orders
///
/// Every operation takes the single lock for its whole duration, so the
/// driver and the order monitors never observe a half-applied update.
#[derive(Debug, Default)]
pub struct Ledger {
    state: Mutex<LedgerState>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedLedger {
        Arc::new(Self::new())
    }

    // A monitor that panicked mid-update cannot leave the lists torn: every
    // mutation below is a single push, retain, or flag flip.
    fn lock(&self) -> MutexGuard<'_, LedgerState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// True while any submitted order has not completed
    pub fn has_in_flight_order(&self) -> bool {
        self.lock().orders.iter().any(|o| !o.is_complete)
    }

    /// Log a freshly submitted order in the not-complete state
    pub fn record_submission(&self, record: OrderRecord) -> OrderHandle {
        let handle = record.handle;
        let mut state = self.lock();

        tracing::debug!(
            handle = %handle,
            venue = %record.venue,
            order_id = %record.venue_order_id,
            "Recorded submission"
        );
        state.orders.push(record);
        handle
    }

    /// Close out an order, marking it filled if `filled` is set
    ///
    /// An order completes once; later calls for the same handle are ignored.
    pub fn mark_complete(&self, handle: OrderHandle, filled: bool) {
        let mut state = self.lock();

        match state.orders.iter_mut().find(|o| o.handle == handle) {
            Some(order) if order.is_complete => {
                tracing::warn!(handle = %handle, "Order already complete, ignoring");
            }
            Some(order) => {
                order.is_complete = true;
                if filled {
                    order.is_filled = true;
                }
            }
            None => {
                tracing::warn!(handle = %handle, "No order recorded for handle");
            }
        }
    }

    /// Reconcile a confirmed fill into the position list
    ///
    /// A buy opens a position. A sell removes the position matching
    /// (asset, size, price) exactly; if none matches the list is left as is
    /// and `false` is returned.
    pub fn apply_fill(&self, asset: &str, side: Side, size: Decimal, price: Decimal) -> bool {
        let mut state = self.lock();

        match side {
            Side::Buy => {
                state.positions.push(Position {
                    asset: asset.to_string(),
                    size,
                    entry_price: price,
                    opened_at: Utc::now(),
                });
                tracing::info!(asset = %asset, %size, %price, "Opened position");
                true
            }
            Side::Sell => {
                let before = state.positions.len();
                state.positions.retain(|p| {
                    !(p.asset == asset && p.size == size && p.entry_price == price)
                });

                let removed = state.positions.len() < before;
                if removed {
                    tracing::info!(asset = %asset, %size, %price, "Closed position");
                } else {
                    tracing::warn!(
                        asset = %asset,
                        %size,
                        %price,
                        "Exit fill matched no open position"
                    );
                }
                removed
            }
        }
    }

    pub fn current_position(&self, asset: &str) -> Option<Position> {
        self.lock().positions.iter().find(|p| p.asset == asset).cloned()
    }

    /// The position the rotation strategy is currently holding, if any
    pub fn held_position(&self) -> Option<Position> {
        self.lock().positions.first().cloned()
    }

    pub fn positions(&self) -> Vec<Position> {
        self.lock().positions.clone()
    }

    pub fn orders(&self) -> Vec<OrderRecord> {
        self.lock().orders.clone()
    }

    pub fn order(&self, handle: OrderHandle) -> Option<OrderRecord> {
        self.lock().orders.iter().find(|o| o.handle == handle).cloned()
    }
}
