//! Scripted tick sources for supervisor and ingestion tests.

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio::time::Instant;

use crate::error::ConnectorError;
use crate::messages::Tick;
use crate::traits::{TickSource, TickStream};

/// Outcome of one `subscribe` call
#[derive(Clone)]
pub enum Attempt {
    /// Connection refused
    Fail,
    /// Connect, deliver the ticks, then end the stream
    Ticks(Vec<Tick>),
    /// Connect, deliver the ticks, then stay open forever
    Endless(Vec<Tick>),
    /// Connection attempt never completes
    Hang,
}

pub struct ScriptedSource {
    script: Mutex<VecDeque<Attempt>>,
    /// Used once the script runs out
    fallback: Attempt,
    calls: AtomicUsize,
    call_times: Mutex<Vec<Instant>>,
}

impl ScriptedSource {
    pub fn new(script: Vec<Attempt>, fallback: Attempt) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback,
            calls: AtomicUsize::new(0),
            call_times: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self::new(Vec::new(), Attempt::Fail)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn call_times(&self) -> Vec<Instant> {
        self.call_times.lock().unwrap().clone()
    }
}

pub fn tick(symbol: &str, price: f64) -> Tick {
    Tick {
        symbol: symbol.to_string(),
        price,
    }
}

#[async_trait]
impl TickSource for ScriptedSource {
    async fn subscribe(&self, _symbols: &[String]) -> Result<TickStream, ConnectorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.call_times.lock().unwrap().push(Instant::now());
        let attempt = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());

        match attempt {
            Attempt::Fail => Err(ConnectorError::ConnectionFailed("refused".into())),
            Attempt::Ticks(ticks) => Ok(stream::iter(ticks).boxed()),
            Attempt::Endless(ticks) => Ok(stream::iter(ticks).chain(stream::pending()).boxed()),
            Attempt::Hang => futures_util::future::pending().await,
        }
    }
}
