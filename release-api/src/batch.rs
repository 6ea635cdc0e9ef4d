//! Bounded-concurrency fan-out of per-issue work.
//!
//! Items are processed in consecutive chunks of `batch_size`. Chunks run one
//! after another with `batch_delay` between them; items inside a chunk run
//! concurrently. One orchestrator lives for the whole process and owns a
//! semaphore of `max_concurrency` permits; every chunk of every run, and any
//! caller of `acquire`, draws from it. Each item gets `per_call_timeout`, and
//! the whole run is bounded by `overall_timeout`. A failing, panicking or slow
//! item never affects its siblings.

use crate::metrics_defs::{ANALYSES_INFLIGHT, BATCH_ITEM_OUTCOMES};
use serde::Deserialize;
use shared::{counter, gauge};
use std::collections::HashMap;
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::{Id, JoinError, JoinSet};
use tokio::time::{Instant, sleep, sleep_until, timeout};

fn default_max_concurrency() -> usize {
    5
}

fn default_batch_size() -> usize {
    10
}

fn default_batch_delay_ms() -> u64 {
    500
}

fn default_per_call_timeout_secs() -> u64 {
    120
}

fn default_overall_timeout_secs() -> u64 {
    900
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct BatchSettings {
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_batch_delay_ms")]
    pub batch_delay_ms: u64,
    #[serde(default = "default_per_call_timeout_secs")]
    pub per_call_timeout_secs: u64,
    #[serde(default = "default_overall_timeout_secs")]
    pub overall_timeout_secs: u64,
}

impl Default for BatchSettings {
    fn default() -> Self {
        BatchSettings {
            max_concurrency: default_max_concurrency(),
            batch_size: default_batch_size(),
            batch_delay_ms: default_batch_delay_ms(),
            per_call_timeout_secs: default_per_call_timeout_secs(),
            overall_timeout_secs: default_overall_timeout_secs(),
        }
    }
}

impl BatchSettings {
    pub fn batch_delay(&self) -> Duration {
        Duration::from_millis(self.batch_delay_ms)
    }

    pub fn per_call_timeout(&self) -> Duration {
        Duration::from_secs(self.per_call_timeout_secs)
    }

    pub fn overall_timeout(&self) -> Duration {
        Duration::from_secs(self.overall_timeout_secs)
    }
}

/// Terminal state of one item.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ItemStatus {
    Succeeded,
    Failed(String),
    TimedOut,
    /// Never started because the overall deadline passed first.
    Skipped,
}

impl ItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemStatus::Succeeded => "success",
            ItemStatus::Failed(_) => "failure",
            ItemStatus::TimedOut => "timeout",
            ItemStatus::Skipped => "skipped",
        }
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            ItemStatus::Succeeded => None,
            ItemStatus::Failed(reason) => Some(reason),
            ItemStatus::TimedOut => Some("timeout"),
            ItemStatus::Skipped => Some("skipped after overall timeout"),
        }
    }
}

#[derive(Debug)]
pub struct ItemOutcome<T> {
    pub key: String,
    pub status: ItemStatus,
    pub payload: Option<T>,
}

impl<T> ItemOutcome<T> {
    fn new(key: String, status: ItemStatus) -> Self {
        ItemOutcome {
            key,
            status,
            payload: None,
        }
    }
}

#[derive(Debug)]
pub struct BatchResult<T> {
    /// One entry per submitted item, in submission order.
    pub outcomes: Vec<ItemOutcome<T>>,
    pub timed_out: bool,
}

impl<T> BatchResult<T> {
    pub fn success_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.status == ItemStatus::Succeeded)
            .count()
    }

    pub fn failure_count(&self) -> usize {
        self.outcomes.len() - self.success_count()
    }
}

/// Anything the orchestrator can schedule. The key identifies the item in
/// outcomes and logs.
pub trait BatchItem: Send + 'static {
    fn item_key(&self) -> String;
}

impl BatchItem for atlassian::Issue {
    fn item_key(&self) -> String {
        self.key.clone()
    }
}

impl BatchItem for String {
    fn item_key(&self) -> String {
        self.clone()
    }
}

/// Keeps the in-flight gauge honest on every exit path, including abort.
struct InFlight;

impl InFlight {
    fn enter() -> Self {
        gauge!(ANALYSES_INFLIGHT).increment(1.0);
        InFlight
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        gauge!(ANALYSES_INFLIGHT).decrement(1.0);
    }
}

/// One held unit of analysis concurrency. Dropping it frees the permit.
pub struct Slot {
    _permit: OwnedSemaphorePermit,
    _in_flight: InFlight,
}

async fn acquire_slot(semaphore: Arc<Semaphore>) -> Option<Slot> {
    let permit = semaphore.acquire_owned().await.ok()?;
    Some(Slot {
        _permit: permit,
        _in_flight: InFlight::enter(),
    })
}

pub struct BatchOrchestrator {
    settings: BatchSettings,
    semaphore: Arc<Semaphore>,
}

impl BatchOrchestrator {
    pub fn new(settings: BatchSettings) -> Self {
        let semaphore = Arc::new(Semaphore::new(settings.max_concurrency.max(1)));
        BatchOrchestrator {
            settings,
            semaphore,
        }
    }

    pub fn settings(&self) -> &BatchSettings {
        &self.settings
    }

    /// Waits for a permit from the shared limiter, for work that runs outside
    /// `run`. `None` only if the limiter was closed.
    pub async fn acquire(&self) -> Option<Slot> {
        acquire_slot(self.semaphore.clone()).await
    }

    pub async fn run<I, T, E, F, Fut>(&self, items: Vec<I>, process: F) -> BatchResult<T>
    where
        I: BatchItem,
        T: Send + 'static,
        E: Display + Send + 'static,
        F: Fn(I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let deadline = sleep_until(Instant::now() + self.settings.overall_timeout());
        tokio::pin!(deadline);

        let keys: Vec<String> = items.iter().map(BatchItem::item_key).collect();
        let mut slots: Vec<Option<ItemOutcome<T>>> = keys.iter().map(|_| None).collect();
        let process = Arc::new(process);
        let chunk_size = self.settings.batch_size.max(1);
        let chunk_count = items.len().div_ceil(chunk_size);
        let mut timed_out = false;

        let mut pending = items.into_iter().enumerate().peekable();
        let mut chunk_no = 0;

        while pending.peek().is_some() {
            if chunk_no > 0 {
                tracing::debug!(chunk = chunk_no, delay = ?self.settings.batch_delay(), "Waiting before next chunk");
                tokio::select! {
                    _ = sleep(self.settings.batch_delay()) => {}
                    _ = &mut deadline => {
                        timed_out = true;
                        break;
                    }
                }
            }

            let mut join_set = JoinSet::new();
            let mut task_index: HashMap<Id, TaskEntry> = HashMap::new();

            for (index, item) in pending.by_ref().take(chunk_size) {
                let semaphore = self.semaphore.clone();
                let process = process.clone();
                let per_call_timeout = self.settings.per_call_timeout();
                let started = Arc::new(AtomicBool::new(false));
                let task_started = started.clone();

                let handle = join_set.spawn(async move {
                    let Some(_slot) = acquire_slot(semaphore).await else {
                        return (index, Err(ItemStatus::Failed("concurrency limiter closed".into())));
                    };
                    task_started.store(true, Ordering::SeqCst);

                    match timeout(per_call_timeout, process(item)).await {
                        Ok(Ok(payload)) => (index, Ok(payload)),
                        Ok(Err(e)) => (index, Err(ItemStatus::Failed(e.to_string()))),
                        Err(_) => (index, Err(ItemStatus::TimedOut)),
                    }
                });
                task_index.insert(handle.id(), TaskEntry { index, started });
            }

            tracing::debug!(
                chunk = chunk_no + 1,
                chunks = chunk_count,
                size = join_set.len(),
                "Processing chunk"
            );

            while !join_set.is_empty() {
                tokio::select! {
                    Some(join_result) = join_set.join_next_with_id() => {
                        record(join_result, &task_index, &keys, &mut slots);
                    }
                    _ = &mut deadline => {
                        tracing::warn!(
                            remaining = join_set.len(),
                            "Overall timeout reached, aborting in-flight items"
                        );
                        timed_out = true;
                        join_set.abort_all();
                        break;
                    }
                }
            }

            if timed_out {
                // Items that finished right before the abort keep their result.
                while let Some(join_result) = join_set.join_next_with_id().await {
                    record(join_result, &task_index, &keys, &mut slots);
                }
                break;
            }

            chunk_no += 1;
        }

        let outcomes: Vec<ItemOutcome<T>> = slots
            .into_iter()
            .zip(keys)
            .map(|(slot, key)| slot.unwrap_or_else(|| ItemOutcome::new(key, ItemStatus::Skipped)))
            .collect();

        for outcome in &outcomes {
            counter!(BATCH_ITEM_OUTCOMES, "status" => outcome.status.as_str()).increment(1);
        }

        BatchResult {
            outcomes,
            timed_out,
        }
    }
}

type TaskOutput<T> = (usize, Result<T, ItemStatus>);

struct TaskEntry {
    index: usize,
    /// Set once the task holds a permit.
    started: Arc<AtomicBool>,
}

fn record<T>(
    join_result: Result<(Id, TaskOutput<T>), JoinError>,
    task_index: &HashMap<Id, TaskEntry>,
    keys: &[String],
    slots: &mut [Option<ItemOutcome<T>>],
) {
    match join_result {
        Ok((_, (index, Ok(payload)))) => {
            slots[index] = Some(ItemOutcome {
                key: keys[index].clone(),
                status: ItemStatus::Succeeded,
                payload: Some(payload),
            });
        }
        Ok((_, (index, Err(status)))) => {
            tracing::info!(key = %keys[index], status = status.as_str(), reason = status.reason(), "Item did not succeed");
            slots[index] = Some(ItemOutcome::new(keys[index].clone(), status));
        }
        Err(e) => {
            let Some(entry) = task_index.get(&e.id()) else {
                return;
            };
            let index = entry.index;
            let status = if e.is_cancelled() {
                if entry.started.load(Ordering::SeqCst) {
                    ItemStatus::TimedOut
                } else {
                    ItemStatus::Skipped
                }
            } else {
                tracing::error!(key = %keys[index], error = %e, "Item task panicked");
                ItemStatus::Failed(format!("task panicked: {e}"))
            };
            slots[index] = Some(ItemOutcome::new(keys[index].clone(), status));
        }
    }
}
