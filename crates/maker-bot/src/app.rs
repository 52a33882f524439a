//! Main application orchestration.
//!
//! One cooperative event loop owns all control flow. Stream tasks only
//! enqueue raw messages; the loop drains both queues, runs health and
//! risk checks, refreshes quotes, and flushes the audit log. Fatal
//! errors fall through to the shutdown sequence: best-effort
//! cancellation, snapshot save, audit close.

use crate::config::{AppConfig, TradingMode};
use crate::error::{AppError, AppResult};
use crate::strategy::{MarketView, QuoteStrategy};
use chrono::Utc;
use maker_core::{ClientOrderId, MarketInfo, Order, OrderStatus, OrderType, Price, Qty, Side, TimeInForce};
use maker_gateway::{
    stream, AccountEvent, ExchangeClient, GatewayError, OrderRequest, RestTransport, RetryPolicy,
    WsFeed, WsFeedConfig,
};
use maker_persistence::{AuditLog, AuditRecord, Snapshot, SnapshotStore, SNAPSHOT_VERSION};
use maker_risk::{DailyLossGuard, HaltLatch, VolatilityBreaker};
use maker_state::{StateExport, StateStore, StateStoreConfig};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// The market-making engine.
pub struct Application<T: RestTransport> {
    config: AppConfig,
    client: ExchangeClient<T>,
    store: Arc<StateStore>,
    halt: Arc<HaltLatch>,
    vol_breaker: VolatilityBreaker,
    daily_guard: DailyLossGuard,
    strategy: Box<dyn QuoteStrategy>,
    snapshots: SnapshotStore,
    audit: AuditLog,
    market_info: Option<MarketInfo>,
    last_health_check: Option<Instant>,
    last_quote_refresh: Option<Instant>,
    last_metrics_flush: Option<Instant>,
    dry_run_seq: u64,
}

impl<T: RestTransport> Application<T> {
    pub fn new(config: AppConfig, transport: T, strategy: Box<dyn QuoteStrategy>) -> Self {
        let client = ExchangeClient::new(
            transport,
            config.category.clone(),
            RetryPolicy::new(
                config.retry.max_attempts,
                Duration::from_millis(config.retry.base_delay_ms),
                Duration::from_millis(config.retry.max_delay_ms),
            ),
            Duration::from_millis(config.retry.cancel_spacing_ms),
        );
        let store = Arc::new(StateStore::new(StateStoreConfig {
            ema_alpha: config.strategy.ema_alpha,
            history_window: Duration::from_secs(config.volatility_breaker.window_secs * 2),
            history_max_points: 4096,
        }));
        let halt = Arc::new(HaltLatch::new());
        let vol_breaker = VolatilityBreaker::new(config.volatility_breaker.clone());
        let daily_guard = DailyLossGuard::new(config.daily_loss.clone(), halt.clone());
        let snapshots = SnapshotStore::new(&config.persistence.state_file);
        let audit = AuditLog::new(
            &config.persistence.audit_dir,
            config.persistence.audit_buffer_size,
        );

        Self {
            config,
            client,
            store,
            halt,
            vol_breaker,
            daily_guard,
            strategy,
            snapshots,
            audit,
            market_info: None,
            last_health_check: None,
            last_quote_refresh: None,
            last_metrics_flush: None,
            dry_run_seq: 0,
        }
    }

    pub fn store(&self) -> &Arc<StateStore> {
        &self.store
    }

    pub fn halt_latch(&self) -> &Arc<HaltLatch> {
        &self.halt
    }

    /// Startup sequence. Failures here are fatal; the engine never
    /// enters the main loop with unknown state.
    pub async fn initialize(&mut self) -> AppResult<()> {
        info!(
            symbol = %self.config.symbol,
            mode = ?self.config.mode,
            "Initializing engine"
        );

        self.restore_snapshot()?;

        let info = self.fetch_market_info().await?;
        info!(
            symbol = %info.symbol,
            tick = %info.price_tick,
            step = %info.qty_step,
            "Market info loaded"
        );
        self.market_info = Some(info);

        self.establish_initial_account().await?;

        if self.config.is_live() {
            self.client
                .set_leverage(&self.config.symbol, self.config.leverage)
                .await
                .map_err(|e| AppError::InitialState(format!("set_leverage: {e}")))?;

            let remote = self
                .client
                .open_orders(&self.config.symbol)
                .await
                .map_err(|e| AppError::InitialState(format!("open_orders: {e}")))?;
            let report = self.store.reconcile_with(&remote);
            for order_id in &report.adopted {
                if let Some(order) = self.store.active_orders().iter().find(|o| &o.order_id == order_id) {
                    self.audit_order(order, Some("reconciled: adopted from exchange"));
                }
            }
        }

        info!(
            active_orders = self.store.active_order_count(),
            "Initialization complete"
        );
        Ok(())
    }

    /// Run the engine until shutdown or a fatal error. The shutdown
    /// sequence always executes before returning.
    pub async fn run(mut self) -> AppResult<()> {
        let (market_tx, market_rx) = mpsc::channel::<String>(1024);
        let (account_tx, account_rx) = mpsc::channel::<String>(1024);

        let mut feed_handles = Vec::new();
        if self.config.mode != TradingMode::Simulation {
            let public = WsFeed::new(self.public_feed_config(), market_tx);
            feed_handles.push(tokio::spawn(public.run()));

            if self.config.is_live() {
                let private = WsFeed::new(self.private_feed_config(), account_tx);
                feed_handles.push(tokio::spawn(private.run()));
            }
        }

        let outcome = self.event_loop(Some(market_rx), Some(account_rx)).await;
        if let Err(ref e) = outcome {
            error!(error = %e, "Engine stopping on fatal error");
        }

        self.shutdown().await;
        for handle in feed_handles {
            handle.abort();
        }
        outcome
    }

    async fn event_loop(
        &mut self,
        mut market_rx: Option<mpsc::Receiver<String>>,
        mut account_rx: Option<mpsc::Receiver<String>>,
    ) -> AppResult<()> {
        let mut tick =
            tokio::time::interval(Duration::from_millis(self.config.system.loop_interval_ms));
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        info!("Entering main event loop");
        loop {
            tokio::select! {
                maybe = recv_opt(&mut market_rx) => match maybe {
                    Some(text) => self.on_market_message(&text),
                    None => {
                        if self.config.mode == TradingMode::Simulation {
                            market_rx = None;
                        } else {
                            return Err(AppError::StreamClosed("market data".to_string()));
                        }
                    }
                },
                maybe = recv_opt(&mut account_rx) => match maybe {
                    Some(text) => self.on_account_message(&text),
                    None => {
                        if self.config.is_live() {
                            return Err(AppError::StreamClosed("account events".to_string()));
                        }
                        account_rx = None;
                    }
                },
                _ = tick.tick() => {
                    self.on_tick().await?;
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("Shutdown signal received");
                    return Ok(());
                }
            }
        }
    }

    // --- message handling ---

    fn on_market_message(&self, text: &str) {
        match stream::parse_market_message(text) {
            Ok(Some(event)) => {
                if let (Some(bid), Some(ask)) = (event.best_bid(), event.best_ask()) {
                    self.store.apply_orderbook(bid, ask);
                }
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Bad market message"),
        }
    }

    fn on_account_message(&mut self, text: &str) {
        let event = match stream::parse_account_message(text) {
            Ok(Some(event)) => event,
            Ok(None) => return,
            Err(e) => {
                warn!(error = %e, "Bad account message");
                return;
            }
        };

        match event {
            AccountEvent::Orders(updates) => {
                let symbol = self.config.symbol.clone();
                for update in updates.iter().filter(|u| u.symbol == symbol) {
                    let outcome = self.store.apply_order_update(update);
                    debug!(order_id = %update.order_id, ?outcome, "Order event applied");
                    self.audit_append(AuditRecord::OrderEvent {
                        timestamp: Utc::now(),
                        order_id: update.order_id.clone(),
                        client_order_id: update.client_order_id.clone(),
                        symbol: update.symbol.clone(),
                        side: update.side,
                        order_type: OrderType::Limit,
                        price: Price::new(update.price),
                        qty: Qty::new(update.qty),
                        status: update.order_status,
                        cum_filled_qty: Qty::new(update.cum_exec_qty),
                        message: None,
                    });
                }
            }
            AccountEvent::Executions(executions) => {
                let symbol = self.config.symbol.clone();
                for exec in executions.iter().filter(|e| e.symbol == symbol) {
                    let Some(fill) = self.store.apply_execution(exec) else {
                        continue;
                    };
                    if !self.config.is_live() {
                        // Virtual balance accounting for simulated fills.
                        let notional = fill.exec_qty.notional(fill.exec_price);
                        let delta = match fill.side {
                            Side::Buy => -(notional + fill.fee),
                            Side::Sell => notional - fill.fee,
                        };
                        self.store.adjust_balance(delta);
                    }
                    self.audit_append(AuditRecord::TradeFill {
                        timestamp: fill.executed_at,
                        order_id: fill.order_id.clone(),
                        trade_id: fill.trade_id.clone(),
                        symbol: fill.symbol.clone(),
                        side: fill.side,
                        exec_price: fill.exec_price,
                        exec_qty: fill.exec_qty,
                        fee: fill.fee,
                        fee_currency: fill.fee_currency.clone(),
                        realized_pnl_impact: fill.realized_pnl_impact,
                        liquidity_role: fill.liquidity_role,
                    });
                }
            }
            AccountEvent::Positions(positions) => {
                for position in positions.iter().filter(|p| p.symbol == self.config.symbol) {
                    self.store.apply_position_update(position);
                }
            }
            AccountEvent::Wallet(coins) => {
                let quote_currency = self.config.quote_currency.clone();
                for coin in coins.iter().filter(|c| c.coin == quote_currency) {
                    self.store.apply_wallet_update(coin);
                    self.audit_append(AuditRecord::BalanceUpdate {
                        timestamp: Utc::now(),
                        currency: coin.coin.clone(),
                        wallet_balance: coin.wallet_balance,
                        available_balance: coin.available_balance,
                    });
                }
            }
        }
    }

    // --- tick pipeline ---

    async fn on_tick(&mut self) -> AppResult<()> {
        let now = Utc::now();

        // Stale market data: stop quoting until the stream recovers.
        if self.config.mode != TradingMode::Simulation {
            let stale_after = Duration::from_millis(self.config.system.market_data_stale_timeout_ms);
            match self.store.market_data_age() {
                Some(age) if age <= stale_after => {}
                Some(_) => {
                    warn!("Market data stale, cancelling open orders");
                    self.cancel_all_orders().await;
                    return Ok(());
                }
                None => return Ok(()), // nothing received yet
            }
        }

        // Periodic REST health check corrects any drift the stream missed.
        if due(self.last_health_check, self.config.system.health_check_interval_ms) {
            self.refresh_account().await;
            self.last_health_check = Some(Instant::now());
        }

        // Daily-loss breaker.
        let view = self.store.account_view();
        self.daily_guard.roll_if_new_day(now.date_naive(), view.balance);
        let total_capital = view.balance + view.metrics.unrealized_pnl(self.store.mid_price());
        if let Some(loss_pct) = self.daily_guard.evaluate(total_capital) {
            return Err(AppError::DailyLossHalt { loss_pct });
        }

        // Volatility breaker.
        let window = Duration::from_secs(self.vol_breaker.config().window_secs);
        let endpoints = self.store.price_window_endpoints(window);
        if let Some(trip) = self.vol_breaker.evaluate(now, endpoints) {
            warn!(
                change_pct = %trip.change_pct,
                paused_until = %trip.paused_until,
                "Volatility pause, cancelling open orders"
            );
            self.cancel_all_orders().await;
        }

        // Quote management.
        if !self.halt.is_halted()
            && self.vol_breaker.quoting_allowed(now)
            && due(self.last_quote_refresh, self.config.system.order_refresh_interval_ms)
        {
            self.manage_quotes().await?;
            self.sweep_stale_orders().await;
            self.last_quote_refresh = Some(Instant::now());
        }

        // Periodic status snapshot into the audit log.
        if due(self.last_metrics_flush, self.config.system.status_report_interval_ms) {
            self.flush_metrics();
            self.last_metrics_flush = Some(Instant::now());
        }

        Ok(())
    }

    async fn manage_quotes(&mut self) -> AppResult<()> {
        let Some(info) = self.market_info.clone() else {
            return Ok(());
        };

        let view = self.store.account_view();
        let market_view = MarketView {
            smoothed_mid: self.store.smoothed_mid(),
            balance: view.balance,
            position_qty: view.position_qty,
        };
        if market_view.smoothed_mid.is_zero() {
            debug!("Waiting for first mid-price before quoting");
            return Ok(());
        }

        let Some(quotes) = self.strategy.target_quotes(&market_view, &info) else {
            return Ok(());
        };

        // The engine owns rounding: everything submitted sits on the
        // venue's tick/step grid.
        let bid_price = info.round_price(quotes.bid_price);
        let ask_price = info.round_price(quotes.ask_price);
        let bid_qty = info.round_qty(quotes.bid_qty);
        let ask_qty = info.round_qty(quotes.ask_qty);

        // Keep one fresh order per side, cancel the rest.
        let band = self.config.strategy.order_stale_threshold_pct;
        let mut keep_bid = false;
        let mut keep_ask = false;
        let mut cancels = Vec::new();
        for order in self.store.active_orders() {
            let target = match order.side {
                Side::Buy => bid_price,
                Side::Sell => ask_price,
            };
            let fresh = target.is_positive()
                && (order.price.inner() - target.inner()).abs() <= target.inner() * band;
            let slot = match order.side {
                Side::Buy => &mut keep_bid,
                Side::Sell => &mut keep_ask,
            };
            if fresh && !*slot {
                *slot = true;
            } else {
                cancels.push(order);
            }
        }
        for order in cancels {
            self.cancel_order(&order).await;
        }

        if !keep_bid {
            if info.meets_minimums(bid_price, bid_qty) {
                self.place_quote(Side::Buy, bid_price, bid_qty, &info).await?;
            } else {
                debug!(price = %bid_price, qty = %bid_qty, "Bid below venue minimums, skipping");
            }
        }
        if !keep_ask {
            if info.meets_minimums(ask_price, ask_qty) {
                self.place_quote(Side::Sell, ask_price, ask_qty, &info).await?;
            } else {
                debug!(price = %ask_price, qty = %ask_qty, "Ask below venue minimums, skipping");
            }
        }

        Ok(())
    }

    async fn place_quote(
        &mut self,
        side: Side,
        price: Price,
        qty: Qty,
        info: &MarketInfo,
    ) -> AppResult<()> {
        let client_order_id = ClientOrderId::new(side);

        if !self.config.is_live() {
            self.dry_run_seq += 1;
            let order = Order {
                order_id: format!("dry-{}", self.dry_run_seq),
                client_order_id,
                symbol: info.symbol.clone(),
                side,
                order_type: OrderType::Limit,
                price,
                qty,
                cum_filled_qty: Qty::ZERO,
                status: OrderStatus::New,
                reduce_only: false,
                created_at: Utc::now(),
            };
            info!(side = %side, price = %price, qty = %qty, "Simulated quote placed");
            self.audit_order(&order, Some("simulated placement"));
            self.store.insert_order(order);
            return Ok(());
        }

        let request = OrderRequest {
            category: self.config.category.clone(),
            symbol: self.config.symbol.clone(),
            side,
            order_type: "Limit".to_string(),
            qty,
            price,
            time_in_force: TimeInForce::PostOnly,
            client_order_id: client_order_id.to_string(),
            reduce_only: false,
        };

        match self.client.place_order(&request).await {
            Ok(placed) => {
                let order = Order {
                    order_id: placed.order_id,
                    client_order_id,
                    symbol: self.config.symbol.clone(),
                    side,
                    order_type: OrderType::Limit,
                    price,
                    qty,
                    cum_filled_qty: Qty::ZERO,
                    status: OrderStatus::New,
                    reduce_only: false,
                    created_at: Utc::now(),
                };
                info!(
                    order_id = %order.order_id,
                    side = %side,
                    price = %price,
                    qty = %qty,
                    "Quote placed"
                );
                self.audit_order(&order, Some("placed"));
                self.store.insert_order(order);
                Ok(())
            }
            Err(e @ GatewayError::Auth(_)) => Err(AppError::Gateway(e)),
            Err(GatewayError::InsufficientBalance { code, msg }) => {
                warn!(code, %msg, side = %side, "Insufficient balance, skipping this quote");
                Ok(())
            }
            Err(e) => {
                // Parameter errors and unexpected rejections abandon
                // this attempt; the loop re-quotes next refresh.
                error!(error = %e, side = %side, "Order placement failed");
                Ok(())
            }
        }
    }

    async fn cancel_order(&mut self, order: &Order) {
        if !self.config.is_live() {
            self.store.remove_order(&order.order_id);
            self.audit_order(order, Some("simulated cancel"));
            return;
        }

        match self
            .client
            .cancel_order(&self.config.symbol, &order.order_id)
            .await
        {
            Ok(cancelled) => {
                // Gone either way: cancelled now, or already off the book.
                self.store.remove_order(&order.order_id);
                let note = if cancelled { "cancelled" } else { "already gone" };
                self.audit_order(order, Some(note));
            }
            Err(e) => {
                // Keep it locally; the order stream or the next
                // reconcile settles its true state.
                error!(order_id = %order.order_id, error = %e, "Cancel failed");
            }
        }
    }

    async fn cancel_all_orders(&mut self) {
        if self.store.active_order_count() == 0 && !self.config.is_live() {
            return;
        }
        info!("Cancelling all open orders");

        if self.config.is_live() {
            if let Err(e) = self.client.cancel_all(&self.config.symbol).await {
                error!(error = %e, "cancel_all failed");
                return;
            }
        }
        self.store.clear_orders();
    }

    async fn sweep_stale_orders(&mut self) {
        let max_age = chrono::Duration::milliseconds(self.config.system.stale_order_max_age_ms as i64);
        let now = Utc::now();
        let stale: Vec<Order> = self
            .store
            .active_orders()
            .into_iter()
            .filter(|o| now - o.created_at > max_age)
            .collect();

        for order in stale {
            warn!(order_id = %order.order_id, "Order exceeded max age, cancelling");
            self.cancel_order(&order).await;
        }
    }

    // --- account management ---

    async fn refresh_account(&mut self) {
        if !self.config.is_live() {
            // Virtual account: position mirrors the cost-basis ledger.
            let view = self.store.account_view();
            self.store.set_account(
                view.balance,
                view.available_balance,
                view.metrics.current_holdings,
                Decimal::ZERO,
            );
            return;
        }

        let balance = match self.client.wallet_balance(&self.config.quote_currency).await {
            Ok(balance) => balance,
            Err(e) => {
                warn!(error = %e, "Health check: balance fetch failed");
                return;
            }
        };
        let (position_qty, unrealized) = match self.client.position(&self.config.symbol).await {
            Ok(Some(p)) => (p.signed_qty(), p.unrealised_pnl),
            Ok(None) => (Decimal::ZERO, Decimal::ZERO),
            Err(e) => {
                warn!(error = %e, "Health check: position fetch failed");
                return;
            }
        };

        self.store.set_account(
            balance.wallet_balance,
            balance.available_balance,
            position_qty,
            unrealized,
        );
        self.audit_append(AuditRecord::BalanceUpdate {
            timestamp: Utc::now(),
            currency: self.config.quote_currency.clone(),
            wallet_balance: balance.wallet_balance,
            available_balance: balance.available_balance,
        });
        debug!(
            balance = %balance.wallet_balance,
            position = %position_qty,
            "Health check refreshed account"
        );
    }

    async fn establish_initial_account(&mut self) -> AppResult<()> {
        if !self.config.is_live() {
            let view = self.store.account_view();
            if view.balance.is_zero() {
                self.store.set_account(
                    self.config.initial_virtual_capital,
                    self.config.initial_virtual_capital,
                    view.metrics.current_holdings,
                    Decimal::ZERO,
                );
                info!(
                    balance = %self.config.initial_virtual_capital,
                    "Virtual balance initialized"
                );
            }
        } else {
            let balance = self
                .client
                .wallet_balance(&self.config.quote_currency)
                .await
                .map_err(|e| AppError::InitialState(format!("wallet_balance: {e}")))?;
            let (position_qty, unrealized) = match self
                .client
                .position(&self.config.symbol)
                .await
                .map_err(|e| AppError::InitialState(format!("position: {e}")))?
            {
                Some(p) => (p.signed_qty(), p.unrealised_pnl),
                None => (Decimal::ZERO, Decimal::ZERO),
            };
            self.store.set_account(
                balance.wallet_balance,
                balance.available_balance,
                position_qty,
                unrealized,
            );
            info!(
                balance = %balance.wallet_balance,
                position = %position_qty,
                "Initial account state loaded"
            );
        }

        let balance = self.store.account_view().balance;
        self.daily_guard
            .roll_if_new_day(Utc::now().date_naive(), balance);
        Ok(())
    }

    async fn fetch_market_info(&mut self) -> AppResult<MarketInfo> {
        if self.config.mode == TradingMode::Simulation {
            return Ok(MarketInfo {
                symbol: self.config.symbol.clone(),
                price_tick: Price::new(Decimal::new(1, 2)),
                qty_step: Qty::new(Decimal::new(1, 3)),
                min_order_qty: Qty::new(Decimal::new(1, 3)),
                min_notional: Decimal::from(5),
                maker_fee_rate: Decimal::new(2, 4),
                taker_fee_rate: Decimal::new(55, 5),
            });
        }

        self.client
            .instrument_info(&self.config.symbol)
            .await
            .map_err(|e| AppError::MarketInfo(e.to_string()))
    }

    // --- persistence ---

    fn restore_snapshot(&mut self) -> AppResult<()> {
        let snapshot = self
            .snapshots
            .load()
            .map_err(|e| AppError::InitialState(format!("snapshot restore: {e}")))?;
        let Some(snapshot) = snapshot else {
            return Ok(());
        };

        if snapshot.symbol != self.config.symbol {
            warn!(
                snapshot_symbol = %snapshot.symbol,
                configured = %self.config.symbol,
                "Snapshot is for a different symbol, ignoring"
            );
            return Ok(());
        }

        self.store.restore(StateExport {
            mid_price: snapshot.mid_price,
            smoothed_mid: snapshot.smoothed_mid,
            price_history: snapshot.price_history,
            balance: snapshot.balance,
            available_balance: snapshot.available_balance,
            position_qty: snapshot.position_qty,
            metrics: snapshot.metrics,
            active_orders: snapshot.active_orders,
        });
        self.vol_breaker
            .restore_timers(snapshot.paused_until, snapshot.cooldown_until);
        self.daily_guard
            .restore_baseline(snapshot.daily_baseline_capital, snapshot.daily_baseline_date);

        info!(saved_at = %snapshot.saved_at, "State restored from snapshot");
        Ok(())
    }

    fn build_snapshot(&self) -> Snapshot {
        let export = self.store.export();
        let (paused_until, cooldown_until) = self.vol_breaker.timers();
        let (daily_baseline_capital, daily_baseline_date) = self.daily_guard.baseline();

        Snapshot {
            version: SNAPSHOT_VERSION,
            symbol: self.config.symbol.clone(),
            mid_price: export.mid_price,
            smoothed_mid: export.smoothed_mid,
            balance: export.balance,
            available_balance: export.available_balance,
            position_qty: export.position_qty,
            active_orders: export.active_orders,
            metrics: export.metrics,
            price_history: export.price_history,
            paused_until,
            cooldown_until,
            daily_baseline_capital,
            daily_baseline_date,
            saved_at: Utc::now(),
        }
    }

    async fn shutdown(&mut self) {
        info!("Shutting down: cancelling orders, persisting state");

        if self.config.is_live() && self.store.active_order_count() > 0 {
            match self.client.cancel_all(&self.config.symbol).await {
                Ok(()) => self.store.clear_orders(),
                // Orders we could not cancel stay in the snapshot so a
                // restart can reconcile them.
                Err(e) => error!(error = %e, "Best-effort cancel_all failed during shutdown"),
            }
        }

        if let Err(e) = self.snapshots.save(&self.build_snapshot()) {
            error!(error = %e, "Failed to save shutdown snapshot");
        }

        self.flush_metrics();
        if let Err(e) = self.audit.close() {
            warn!(error = %e, "Failed to close audit log");
        }

        info!("Shutdown complete");
    }

    // --- audit helpers ---

    fn flush_metrics(&mut self) {
        let view = self.store.account_view();
        let mid = self.store.mid_price();
        let unrealized = view.metrics.unrealized_pnl(mid);
        let (baseline, _) = self.daily_guard.baseline();
        let total_capital = view.balance + unrealized;
        let daily_pnl = total_capital - baseline;
        let daily_loss_pct = if baseline > Decimal::ZERO {
            ((baseline - total_capital) / baseline).to_f64().unwrap_or(0.0)
        } else {
            0.0
        };

        self.audit_append(AuditRecord::BotMetrics {
            timestamp: Utc::now(),
            total_trades: view.metrics.total_trades,
            net_realized_pnl: view.metrics.net_realized_pnl(),
            realized_pnl: view.metrics.realized_pnl,
            unrealized_pnl: unrealized,
            gross_profit: view.metrics.gross_profit,
            gross_loss: view.metrics.gross_loss,
            total_fees: view.metrics.total_fees,
            wins: view.metrics.wins,
            losses: view.metrics.losses,
            win_rate: view.metrics.win_rate(),
            current_holdings: view.metrics.current_holdings,
            average_entry_price: view.metrics.average_entry_price,
            daily_pnl,
            daily_loss_pct,
        });
        if let Err(e) = self.audit.flush() {
            warn!(error = %e, "Audit flush failed");
        }
    }

    fn audit_order(&mut self, order: &Order, message: Option<&str>) {
        self.audit_append(AuditRecord::OrderEvent {
            timestamp: Utc::now(),
            order_id: order.order_id.clone(),
            client_order_id: order.client_order_id.to_string(),
            symbol: order.symbol.clone(),
            side: order.side,
            order_type: order.order_type,
            price: order.price,
            qty: order.qty,
            status: order.status,
            cum_filled_qty: order.cum_filled_qty,
            message: message.map(str::to_string),
        });
    }

    fn audit_append(&mut self, record: AuditRecord) {
        // The audit log is observe-only; failures never break control flow.
        if let Err(e) = self.audit.append(record) {
            warn!(error = %e, "Audit append failed");
        }
    }

    // --- feed wiring ---

    fn public_feed_config(&self) -> WsFeedConfig {
        WsFeedConfig {
            url: self.config.ws_public_url.clone(),
            topics: vec![format!("orderbook.1.{}", self.config.symbol)],
            ..self.base_feed_config()
        }
    }

    fn private_feed_config(&self) -> WsFeedConfig {
        WsFeedConfig {
            url: self.config.ws_private_url.clone(),
            topics: ["order", "execution", "position", "wallet"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            ..self.base_feed_config()
        }
    }

    fn base_feed_config(&self) -> WsFeedConfig {
        WsFeedConfig {
            url: String::new(),
            topics: Vec::new(),
            heartbeat_timeout: Duration::from_millis(self.config.websocket.heartbeat_timeout_ms),
            ping_interval: Duration::from_millis(self.config.websocket.ping_interval_ms),
            reconnect_base_delay: Duration::from_millis(self.config.websocket.reconnect_base_delay_ms),
            reconnect_max_delay: Duration::from_millis(self.config.websocket.reconnect_max_delay_ms),
            max_reconnect_attempts: self.config.websocket.max_reconnect_attempts,
        }
    }
}

/// Receive from an optional channel; a missing channel pends forever.
async fn recv_opt(rx: &mut Option<mpsc::Receiver<String>>) -> Option<String> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

fn due(last: Option<Instant>, interval_ms: u64) -> bool {
    last.map_or(true, |t| t.elapsed() >= Duration::from_millis(interval_ms))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TradingMode;
    use crate::strategy::FixedSpreadQuoter;
    use async_trait::async_trait;
    use maker_gateway::{Envelope, RestOp};
    use rust_decimal_macros::dec;
    use serde_json::{json, Value};
    use tempfile::TempDir;

    /// Scripted transport: instrument metadata and empty account state.
    struct StubTransport;

    #[async_trait]
    impl RestTransport for StubTransport {
        async fn send(&self, op: RestOp, _params: Value) -> maker_gateway::GatewayResult<Envelope> {
            let result = match op {
                RestOp::InstrumentsInfo => json!({
                    "list": [{
                        "symbol": "BTCUSDT",
                        "priceFilter": {"tickSize": "0.01"},
                        "lotSizeFilter": {
                            "qtyStep": "0.001",
                            "minOrderQty": "0.001",
                            "minNotionalValue": "5"
                        }
                    }]
                }),
                RestOp::WalletBalance => json!({
                    "list": [{"coin": [{
                        "coin": "USDT",
                        "walletBalance": "10000",
                        "availableBalance": "10000"
                    }]}]
                }),
                RestOp::PositionList | RestOp::OpenOrders => json!({"list": []}),
                _ => json!({}),
            };
            Ok(Envelope::ok(result))
        }
    }

    fn test_config(mode: TradingMode, dir: &TempDir) -> AppConfig {
        let mut config = AppConfig::default();
        config.mode = mode;
        config.system.order_refresh_interval_ms = 0;
        config.system.status_report_interval_ms = 3_600_000;
        config.system.health_check_interval_ms = 3_600_000;
        config.persistence.state_file = dir
            .path()
            .join("state.json")
            .to_string_lossy()
            .into_owned();
        config.persistence.audit_dir = dir.path().join("audit").to_string_lossy().into_owned();
        config
    }

    fn test_app(mode: TradingMode, dir: &TempDir) -> Application<StubTransport> {
        let config = test_config(mode, dir);
        let strategy = Box::new(FixedSpreadQuoter::from_config(&config.strategy));
        Application::new(config, StubTransport, strategy)
    }

    fn book_message(bid: &str, ask: &str) -> String {
        format!(
            r#"{{"topic":"orderbook.1.BTCUSDT","data":{{"b":[["{bid}","1"]],"a":[["{ask}","1"]]}}}}"#
        )
    }

    #[tokio::test]
    async fn test_dry_run_places_both_quotes() {
        let dir = TempDir::new().unwrap();
        let mut app = test_app(TradingMode::DryRun, &dir);
        app.initialize().await.unwrap();

        app.on_market_message(&book_message("99.95", "100.05"));
        app.on_tick().await.unwrap();

        let orders = app.store().active_orders();
        assert_eq!(orders.len(), 2);
        let bid = orders.iter().find(|o| o.side == Side::Buy).unwrap();
        let ask = orders.iter().find(|o| o.side == Side::Sell).unwrap();
        assert!(bid.price < ask.price);
        // 0.5% of 10000 = 50 USDT at mid 100 -> 0.5, on the step grid.
        assert_eq!(bid.qty, Qty::new(dec!(0.5)));
        assert_eq!(bid.status, OrderStatus::New);
    }

    #[tokio::test]
    async fn test_fresh_quotes_not_replaced() {
        let dir = TempDir::new().unwrap();
        let mut app = test_app(TradingMode::DryRun, &dir);
        app.initialize().await.unwrap();

        app.on_market_message(&book_message("99.95", "100.05"));
        app.on_tick().await.unwrap();
        let first: Vec<String> = app
            .store()
            .active_orders()
            .into_iter()
            .map(|o| o.order_id)
            .collect();

        // Unchanged market: the same orders survive the next refresh.
        app.on_tick().await.unwrap();
        let second: Vec<String> = app
            .store()
            .active_orders()
            .into_iter()
            .map(|o| o.order_id)
            .collect();

        assert_eq!(first.len(), 2);
        for id in &first {
            assert!(second.contains(id));
        }
    }

    #[tokio::test]
    async fn test_volatility_trip_cancels_and_blocks_quoting() {
        let dir = TempDir::new().unwrap();
        let mut app = test_app(TradingMode::DryRun, &dir);
        app.initialize().await.unwrap();

        app.on_market_message(&book_message("99.95", "100.05"));
        app.on_tick().await.unwrap();
        assert_eq!(app.store().active_order_count(), 2);

        // A 6% move inside the window versus a 5% threshold.
        app.on_market_message(&book_message("105.95", "106.05"));
        app.on_tick().await.unwrap();

        assert_eq!(app.store().active_order_count(), 0);
        assert!(app.vol_breaker.is_paused(Utc::now()));

        // Still paused: no new quotes on subsequent ticks.
        app.on_tick().await.unwrap();
        assert_eq!(app.store().active_order_count(), 0);
    }

    #[tokio::test]
    async fn test_daily_loss_halts_engine() {
        let dir = TempDir::new().unwrap();
        let mut app = test_app(TradingMode::DryRun, &dir);
        app.initialize().await.unwrap();

        app.on_market_message(&book_message("99.95", "100.05"));

        // Baseline was captured at 10000; capital dropped 12% with a
        // 10% maximum.
        app.store().set_account(dec!(8800), dec!(8800), dec!(0), dec!(0));
        let result = app.on_tick().await;

        assert!(matches!(result, Err(AppError::DailyLossHalt { .. })));
        assert!(app.halt_latch().is_halted());
    }

    #[tokio::test]
    async fn test_fill_event_updates_position() {
        let dir = TempDir::new().unwrap();
        let mut app = test_app(TradingMode::DryRun, &dir);
        app.initialize().await.unwrap();

        let execution = r#"{
            "topic": "execution",
            "data": [{
                "orderId": "o-1",
                "execId": "t-1",
                "symbol": "BTCUSDT",
                "side": "Buy",
                "execPrice": "100",
                "execQty": "10",
                "execFee": "0.1",
                "feeCurrency": "USDT",
                "isMaker": true
            }]
        }"#;
        app.on_account_message(execution);

        let view = app.store().account_view();
        assert_eq!(view.metrics.current_holdings, dec!(10));
        assert_eq!(view.metrics.average_entry_price, Price::new(dec!(100)));
        // Virtual balance paid the notional and the fee.
        assert_eq!(view.balance, dec!(10000) - dec!(1000.1));

        // The same trade again changes nothing.
        app.on_account_message(execution);
        let view = app.store().account_view();
        assert_eq!(view.metrics.current_holdings, dec!(10));
        assert_eq!(view.metrics.total_trades, 1);
    }

    #[tokio::test]
    async fn test_unknown_order_event_adopted() {
        let dir = TempDir::new().unwrap();
        let mut app = test_app(TradingMode::DryRun, &dir);
        app.initialize().await.unwrap();

        let order_event = r#"{
            "topic": "order",
            "data": [{
                "orderId": "ghost-1",
                "orderLinkId": "mm_b_x",
                "symbol": "BTCUSDT",
                "side": "Buy",
                "orderType": "Limit",
                "price": "99",
                "qty": "1",
                "cumExecQty": "0.5",
                "orderStatus": "PartiallyFilled",
                "reduceOnly": false
            }]
        }"#;
        app.on_account_message(order_event);

        let orders = app.store().active_orders();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].order_id, "ghost-1");
    }

    #[tokio::test]
    async fn test_shutdown_snapshot_round_trips() {
        let dir = TempDir::new().unwrap();
        let mut app = test_app(TradingMode::DryRun, &dir);
        app.initialize().await.unwrap();

        app.on_market_message(&book_message("99.95", "100.05"));
        app.on_tick().await.unwrap();
        let orders_before = app.store().active_order_count();
        app.shutdown().await;

        // A fresh application restores the same state.
        let mut restarted = test_app(TradingMode::DryRun, &dir);
        restarted.initialize().await.unwrap();
        assert_eq!(restarted.store().active_order_count(), orders_before);
        assert_eq!(restarted.store().account_view().balance, dec!(10000));
        assert!(restarted.store().mid_price().is_positive());
    }

    #[tokio::test]
    async fn test_stale_market_data_cancels_orders() {
        let dir = TempDir::new().unwrap();
        let mut app = test_app(TradingMode::DryRun, &dir);
        app.config.system.market_data_stale_timeout_ms = 0;
        app.initialize().await.unwrap();

        app.on_market_message(&book_message("99.95", "100.05"));
        app.store().insert_order(Order {
            order_id: "o-1".to_string(),
            client_order_id: ClientOrderId::new(Side::Buy),
            symbol: "BTCUSDT".to_string(),
            side: Side::Buy,
            order_type: OrderType::Limit,
            price: Price::new(dec!(99)),
            qty: Qty::new(dec!(1)),
            cum_filled_qty: Qty::ZERO,
            status: OrderStatus::New,
            reduce_only: false,
            created_at: Utc::now(),
        });

        // Zero tolerance: the data is immediately stale, orders go away
        // and no quoting happens.
        tokio::time::sleep(Duration::from_millis(5)).await;
        app.on_tick().await.unwrap();
        assert_eq!(app.store().active_order_count(), 0);
    }
}
