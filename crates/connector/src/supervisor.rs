//! Stream supervisor
//!
//! Keeps one combined ticker stream alive per batch. The supervisor is a small
//! state machine:
//!
//! ```text
//! Connecting --ok--> Streaming --end/error--> Backoff --sleep--> Connecting
//!      \--error-----------------------------/
//! any state --shutdown--> Cancelled
//! ```
//!
//! Every tick received while streaming is routed to its price-book slot.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::aggregator::PriceBook;
use crate::batcher::BatchDescriptor;
use crate::messages::Tick;
use crate::metrics::BatchMetrics;
use crate::shutdown::{cancelled, is_cancelled};
use crate::traits::{TickSource, TickStream};

pub const DEFAULT_BACKOFF_FLOOR_SECS: u64 = 1;
pub const DEFAULT_BACKOFF_CEILING_SECS: u64 = 30;

/// Exponential reconnect delay: starts at `floor`, doubles after every sleep,
/// capped at `ceiling`. A successful connect resets it to `floor`.
#[derive(Debug, Clone)]
pub struct Backoff {
    floor: Duration,
    ceiling: Duration,
    current: Duration,
}

impl Backoff {
    pub fn new(floor: Duration, ceiling: Duration) -> Self {
        let ceiling = ceiling.max(floor);
        Self {
            floor,
            ceiling,
            current: floor,
        }
    }

    /// Delay the next backoff sleep will use
    pub fn current(&self) -> Duration {
        self.current
    }

    /// Double the delay (saturating at the ceiling) and return the new value
    pub fn advance(&mut self) -> Duration {
        self.current = self.current.saturating_mul(2).min(self.ceiling);
        self.current
    }

    pub fn reset(&mut self) {
        self.current = self.floor;
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(
            Duration::from_secs(DEFAULT_BACKOFF_FLOOR_SECS),
            Duration::from_secs(DEFAULT_BACKOFF_CEILING_SECS),
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Connecting,
    Streaming,
    Backoff,
    Cancelled,
}

pub struct Supervisor {
    batch: Arc<BatchDescriptor>,
    source: Arc<dyn TickSource>,
    prices: Arc<PriceBook>,
    backoff: Backoff,
    state: SupervisorState,
    stream: Option<TickStream>,
    consecutive_failures: u32,
    metrics: BatchMetrics,
}

impl Supervisor {
    pub fn new(
        batch: Arc<BatchDescriptor>,
        source: Arc<dyn TickSource>,
        prices: Arc<PriceBook>,
    ) -> Self {
        let metrics = BatchMetrics::new(batch.id);
        Self {
            batch,
            source,
            prices,
            backoff: Backoff::default(),
            state: SupervisorState::Connecting,
            stream: None,
            consecutive_failures: 0,
            metrics,
        }
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn state(&self) -> SupervisorState {
        self.state
    }

    pub fn backoff(&self) -> &Backoff {
        &self.backoff
    }

    /// Perform one state transition and return the new state.
    ///
    /// `Streaming` consumes the stream until it ends, so a single step can
    /// last as long as the connection does. Every await races shutdown.
    pub async fn step(&mut self, shutdown: &mut watch::Receiver<bool>) -> SupervisorState {
        if is_cancelled(shutdown) {
            self.state = SupervisorState::Cancelled;
        }

        let next = match self.state {
            SupervisorState::Connecting => self.connect(shutdown).await,
            SupervisorState::Streaming => self.consume(shutdown).await,
            SupervisorState::Backoff => self.wait_backoff(shutdown).await,
            SupervisorState::Cancelled => SupervisorState::Cancelled,
        };

        if next == SupervisorState::Cancelled {
            self.stream = None;
            self.metrics.set_disconnected();
        }
        self.state = next;
        next
    }

    /// Drive the state machine until shutdown
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(
            batch = self.batch.id,
            markets = self.batch.len(),
            "Starting stream supervisor"
        );
        self.metrics.set_markets_subscribed(self.batch.len());

        while self.step(&mut shutdown).await != SupervisorState::Cancelled {}

        info!(batch = self.batch.id, "Stream supervisor stopped");
    }

    async fn connect(&mut self, shutdown: &mut watch::Receiver<bool>) -> SupervisorState {
        let result = tokio::select! {
            _ = cancelled(shutdown) => return SupervisorState::Cancelled,
            result = self.source.subscribe(self.batch.wire_symbols()) => result,
        };

        match result {
            Ok(stream) => {
                if self.consecutive_failures > 0 {
                    info!(
                        batch = self.batch.id,
                        after_failures = self.consecutive_failures,
                        "Stream reconnected"
                    );
                } else {
                    info!(batch = self.batch.id, "Stream connected");
                }
                self.backoff.reset();
                self.consecutive_failures = 0;
                self.stream = Some(stream);
                self.metrics.set_connected();
                SupervisorState::Streaming
            }
            Err(e) => {
                warn!(batch = self.batch.id, error = %e, "Stream connection failed");
                SupervisorState::Backoff
            }
        }
    }

    async fn consume(&mut self, shutdown: &mut watch::Receiver<bool>) -> SupervisorState {
        let Some(mut stream) = self.stream.take() else {
            return SupervisorState::Connecting;
        };

        loop {
            let tick = tokio::select! {
                _ = cancelled(shutdown) => return SupervisorState::Cancelled,
                tick = stream.next() => tick,
            };

            match tick {
                Some(tick) => self.route(tick),
                None => break,
            }
        }

        warn!(batch = self.batch.id, "Stream ended");
        self.metrics.set_disconnected();
        SupervisorState::Backoff
    }

    async fn wait_backoff(&mut self, shutdown: &mut watch::Receiver<bool>) -> SupervisorState {
        let delay = self.backoff.current();
        self.consecutive_failures += 1;
        self.metrics.inc_reconnects();
        info!(
            batch = self.batch.id,
            delay_secs = delay.as_secs_f64(),
            failures = self.consecutive_failures,
            "Reconnecting after backoff"
        );

        tokio::select! {
            _ = cancelled(shutdown) => return SupervisorState::Cancelled,
            _ = tokio::time::sleep(delay) => {}
        }

        self.backoff.advance();
        SupervisorState::Connecting
    }

    fn route(&self, tick: Tick) {
        match self.batch.route(&tick.symbol) {
            Some(slot) => {
                self.prices.update(slot, tick.price);
                self.metrics.inc_ticks();
            }
            None => {
                debug!(batch = self.batch.id, symbol = %tick.symbol, "Dropping unmapped tick");
                self.metrics.inc_dropped("unmapped");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{tick, Attempt, ScriptedSource};
    use quotes::MarketPair;
    use tokio::time::Instant;

    fn batch() -> Arc<BatchDescriptor> {
        Arc::new(BatchDescriptor::new(
            0,
            vec![MarketPair::new("BTC", "USDT"), MarketPair::new("ETH", "USDT")],
        ))
    }

    fn supervisor(source: Arc<ScriptedSource>) -> (Supervisor, Arc<PriceBook>) {
        let batch = batch();
        let prices = Arc::new(PriceBook::new(batch.pairs().to_vec()));
        (Supervisor::new(batch, source, prices.clone()), prices)
    }

    #[test]
    fn test_backoff_doubles_to_ceiling() {
        let mut backoff = Backoff::default();
        let mut delays = vec![backoff.current().as_secs()];
        for _ in 0..6 {
            delays.push(backoff.advance().as_secs());
        }
        assert_eq!(delays, vec![1, 2, 4, 8, 16, 30, 30]);

        backoff.reset();
        assert_eq!(backoff.current(), Duration::from_secs(1));
    }

    #[test]
    fn test_backoff_ceiling_never_below_floor() {
        let mut backoff = Backoff::new(Duration::from_secs(5), Duration::from_secs(1));
        assert_eq!(backoff.advance(), Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_connects_follow_backoff_schedule() {
        let source = Arc::new(ScriptedSource::failing());
        let (mut sup, _) = supervisor(source.clone());
        let (_tx, mut rx) = watch::channel(false);

        assert_eq!(sup.step(&mut rx).await, SupervisorState::Backoff);

        let mut waited = Vec::new();
        for _ in 0..7 {
            let start = Instant::now();
            assert_eq!(sup.step(&mut rx).await, SupervisorState::Connecting);
            waited.push(start.elapsed().as_secs());
            assert_eq!(sup.step(&mut rx).await, SupervisorState::Backoff);
        }

        assert_eq!(waited, vec![1, 2, 4, 8, 16, 30, 30]);
        assert_eq!(source.calls(), 8);
    }

    #[tokio::test(start_paused = true)]
    async fn test_successful_connect_resets_backoff() {
        let source = Arc::new(ScriptedSource::new(
            vec![
                Attempt::Fail,
                Attempt::Fail,
                Attempt::Fail,
                Attempt::Ticks(vec![tick("BTCUSDT", 50000.0)]),
            ],
            Attempt::Fail,
        ));
        let (sup, prices) = supervisor(source.clone());
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(sup.run(rx));

        tokio::time::sleep(Duration::from_secs(20)).await;
        tx.send(true).unwrap();
        handle.await.unwrap();

        // fail, +1s fail, +2s fail, +4s connect then end, +1s fail, +2s fail, +4s fail
        let times = source.call_times();
        let gaps: Vec<u64> = times
            .windows(2)
            .map(|w| (w[1] - w[0]).as_secs())
            .collect();
        assert_eq!(&gaps[..6], &[1, 2, 4, 1, 2, 4]);
        assert_eq!(prices.get(0), Some(50000.0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticks_routed_and_unmapped_dropped() {
        let source = Arc::new(ScriptedSource::new(
            vec![Attempt::Ticks(vec![
                tick("BTCUSDT", 50000.0),
                tick("DOGEUSDT", 0.2),
                tick("ethusdt", 3000.0),
                tick("BTCUSDT", 50100.0),
            ])],
            Attempt::Fail,
        ));
        let (mut sup, prices) = supervisor(source);
        let (_tx, mut rx) = watch::channel(false);

        assert_eq!(sup.step(&mut rx).await, SupervisorState::Streaming);
        assert_eq!(sup.step(&mut rx).await, SupervisorState::Backoff);

        assert_eq!(prices.get(0), Some(50100.0));
        assert_eq!(prices.get(1), Some(3000.0));
        assert_eq!(prices.populated(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_backoff() {
        let source = Arc::new(ScriptedSource::failing());
        let (mut sup, _) = supervisor(source.clone());
        sup = sup.with_backoff(Backoff::new(
            Duration::from_secs(3600),
            Duration::from_secs(3600),
        ));
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(sup.run(rx));

        tokio::time::sleep(Duration::from_secs(5)).await;
        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("supervisor did not stop")
            .unwrap();
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_connect() {
        let source = Arc::new(ScriptedSource::new(Vec::new(), Attempt::Hang));
        let (sup, _) = supervisor(source);
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(sup.run(rx));

        tokio::time::sleep(Duration::from_secs(5)).await;
        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("supervisor did not stop")
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_while_streaming() {
        let source = Arc::new(ScriptedSource::new(
            vec![Attempt::Endless(vec![tick("BTCUSDT", 1.5)])],
            Attempt::Fail,
        ));
        let (mut sup, prices) = supervisor(source);
        let (tx, mut rx) = watch::channel(false);

        assert_eq!(sup.step(&mut rx).await, SupervisorState::Streaming);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(10)).await;
            tx.send(true).unwrap();
        });
        assert_eq!(sup.step(&mut rx).await, SupervisorState::Cancelled);
        assert_eq!(sup.state(), SupervisorState::Cancelled);
        assert_eq!(prices.get(0), Some(1.5));
    }

    #[tokio::test]
    async fn test_already_cancelled_does_not_connect() {
        let source = Arc::new(ScriptedSource::failing());
        let (mut sup, _) = supervisor(source.clone());
        let (tx, mut rx) = watch::channel(false);
        tx.send(true).unwrap();

        assert_eq!(sup.step(&mut rx).await, SupervisorState::Cancelled);
        assert_eq!(source.calls(), 0);
    }
}
