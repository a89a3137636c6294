use rust_decimal::Decimal;
use std::future::Future;
use tokio::time::{interval, Duration, MissedTickBehavior};

use crate::error::TradingError;
use crate::execution::{FaultReceiver, OrderExecutor, PriceFeed, SharedLedger};
use crate::models::{BookLevel, OrderHandle, OrderRequest, Position, Side};
use crate::strategy::{MomentumSelector, Selection};
use crate::Result;

/// Entry sizes are rounded to this many decimal places
const SIZE_DECIMALS: u32 = 4;

#[derive(Debug, Clone, PartialEq)]
pub struct TraderSettings {
    /// Quote currency spent on each entry
    pub capital: Decimal,
    pub tick_interval: Duration,
}

/// What a single tick decided
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// The winner's score did not reach the minimum
    BelowThreshold { asset: String, score: f64 },
    /// An earlier order has not settled yet
    AwaitingExecution,
    /// We already hold the winner
    AlreadyHeld { asset: String },
    Entered { asset: String, order: OrderHandle },
    Rotated {
        exited: String,
        exit_order: OrderHandle,
        entered: String,
        entry_order: OrderHandle,
    },
}

/// Fixed-interval driver: collect quotes, rank assets, rotate into the winner
pub struct MomentumTrader {
    feed: PriceFeed,
    selector: MomentumSelector,
    executor: OrderExecutor,
    faults: FaultReceiver,
    settings: TraderSettings,
}

impl MomentumTrader {
    pub fn new(
        feed: PriceFeed,
        selector: MomentumSelector,
        executor: OrderExecutor,
        faults: FaultReceiver,
        settings: TraderSettings,
    ) -> Self {
        Self {
            feed,
            selector,
            executor,
            faults,
            settings,
        }
    }

    pub fn ledger(&self) -> &SharedLedger {
        self.executor.ledger()
    }

    pub fn feed(&self) -> &PriceFeed {
        &self.feed
    }

    /// Run ticks until `shutdown` resolves or an order ends up in an unknown state
    ///
    /// Errors inside a tick only abort that tick. A fault from an order
    /// monitor is returned as is.
    pub async fn run<F>(&mut self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        let mut ticker = interval(self.settings.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tracing::info!(
            assets = ?self.feed.assets(),
            every = ?self.settings.tick_interval,
            capital = %self.settings.capital,
            "🔄 Trading loop started"
        );

        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    tracing::info!("Trading loop shutting down");
                    return Ok(());
                }
                Some(fault) = self.faults.recv() => {
                    return Err(halt(fault));
                }
                _ = ticker.tick() => {}
            }

            match self.tick().await {
                Ok(outcome) => tracing::debug!(?outcome, "Tick complete"),
                Err(e) if e.is_fatal() => return Err(halt(e)),
                Err(e) if e.is_tick_local() => tracing::info!("Skipping tick: {}", e),
                Err(e) => tracing::warn!("Tick aborted: {}", e),
            }
        }
    }

    /// One pass of collect, select, decide
    pub async fn tick(&mut self) -> Result<TickOutcome> {
        self.feed.collect().await?;

        let selection = self
            .selector
            .select(self.feed.assets(), &self.feed.quotes().asks)?;

        tracing::info!(
            asset = %selection.asset,
            gain = selection.gain,
            score = selection.score,
            "Biggest gainer"
        );

        if !selection.qualifies {
            return Ok(TickOutcome::BelowThreshold {
                asset: selection.asset,
                score: selection.score,
            });
        }

        let ledger = self.executor.ledger();
        if ledger.has_in_flight_order() {
            tracing::info!("Order in flight, holding off");
            return Ok(TickOutcome::AwaitingExecution);
        }

        // The winner may sit behind another position the last rotation failed to close
        if ledger.current_position(&selection.asset).is_some() {
            return Ok(TickOutcome::AlreadyHeld {
                asset: selection.asset,
            });
        }

        match ledger.held_position() {
            Some(held) => self.rotate(held, selection).await,
            None => {
                let order = self.enter(&selection).await?;
                Ok(TickOutcome::Entered {
                    asset: selection.asset,
                    order,
                })
            }
        }
    }

    async fn rotate(&self, held: Position, selection: Selection) -> Result<TickOutcome> {
        tracing::info!(from = %held.asset, to = %selection.asset, "🔁 Rotating position");

        let bid = self.touch(&held.asset, Side::Sell)?;
        let exit = OrderRequest {
            asset: held.asset.clone(),
            base_asset: self.feed.base_asset().to_string(),
            venue: bid.venue,
            side: Side::Sell,
            size: held.size,
            price: bid.price,
            entry_price: Some(held.entry_price),
        };
        let exit_order = self.executor.execute(exit).await?;

        let entry_order = self.enter(&selection).await?;

        Ok(TickOutcome::Rotated {
            exited: held.asset,
            exit_order: exit_order.handle,
            entered: selection.asset,
            entry_order,
        })
    }

    async fn enter(&self, selection: &Selection) -> Result<OrderHandle> {
        let offer = self.touch(&selection.asset, Side::Buy)?;
        let size = entry_size(self.settings.capital, offer.price).ok_or_else(|| {
            TradingError::MarketData {
                asset: selection.asset.clone(),
                reason: format!("cannot size an entry at price {}", offer.price),
            }
        })?;

        tracing::info!(
            asset = %selection.asset,
            %size,
            price = %offer.price,
            venue = %offer.venue,
            "📈 Entering position"
        );

        let entry = OrderRequest {
            asset: selection.asset.clone(),
            base_asset: self.feed.base_asset().to_string(),
            venue: offer.venue,
            side: Side::Buy,
            size,
            price: offer.price,
            entry_price: None,
        };
        let order = self.executor.execute(entry).await?;
        Ok(order.handle)
    }

    /// Best offer to buy at or best bid to sell into, from this tick's book
    fn touch(&self, asset: &str, side: Side) -> Result<BookLevel> {
        let book = self.feed.book(asset);
        let level = match side {
            Side::Buy => book.and_then(|b| b.best_offer()),
            Side::Sell => book.and_then(|b| b.best_bid()),
        };

        level.cloned().ok_or_else(|| TradingError::MarketData {
            asset: asset.to_string(),
            reason: format!("no {} side to trade against", side),
        })
    }
}

/// `capital / price`, rounded; `None` for a non-positive price or a size
/// that rounds away to nothing
pub fn entry_size(capital: Decimal, price: Decimal) -> Option<Decimal> {
    if price <= Decimal::ZERO {
        return None;
    }
    capital
        .checked_div(price)
        .map(|size| size.round_dp(SIZE_DECIMALS))
        .filter(|size| !size.is_zero())
}

fn halt(fault: TradingError) -> TradingError {
    tracing::error!("🛑 CRITICAL - halting trading loop: {}", fault);
    fault
}
