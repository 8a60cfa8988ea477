//! Window scoring
//!
//! Scoring has no data dependency between windows, so it can run on a pool
//! of worker threads. Aggregation cannot: it needs results in window order.
//! Workers claim batches from a shared cursor and send them, tagged with
//! their first window index, to a single consumer that restores order
//! through a [`ReorderBuffer`] before handing each result on. Workers never
//! run more than a fixed number of batches ahead of the consumer, so memory
//! stays bounded however slow an individual window is.

use std::any::Any;
use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Condvar, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use crate::cancel::CancelToken;
use crate::classifier::{score_batch, WindowClassifier};
use crate::error::{ClassifierError, ScanError};
use crate::types::{Signal, StopReason, Window};
use crate::windower::WindowPlan;

/// Batches each worker may have in flight beyond the consumer
const IN_FLIGHT_BATCHES_PER_WORKER: usize = 4;

/// How often the consumer wakes to check a cancel token
const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(5);

pub type ScoreResult = Result<f64, ClassifierError>;

/// Restores window order for batches that complete out of order
#[derive(Debug)]
pub struct ReorderBuffer<T> {
    pending: BTreeMap<usize, Vec<T>>,
    next_expected: usize,
}

impl<T> Default for ReorderBuffer<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ReorderBuffer<T> {
    pub fn new() -> Self {
        Self {
            pending: BTreeMap::new(),
            next_expected: 0,
        }
    }

    /// Store a batch whose first item has window index `first_index`
    pub fn insert(&mut self, first_index: usize, items: Vec<T>) {
        self.pending.insert(first_index, items);
    }

    /// Next batch that continues the released prefix, if it has arrived
    pub fn pop_ready(&mut self) -> Option<(usize, Vec<T>)> {
        let first = self.next_expected;
        let items = self.pending.remove(&first)?;
        self.next_expected += items.len();
        Some((first, items))
    }

    /// Window index of the first result not yet released
    pub fn next_expected(&self) -> usize {
        self.next_expected
    }

    /// Batches waiting for an earlier batch
    pub fn pending_batches(&self) -> usize {
        self.pending.len()
    }
}

/// Stop conditions checked between batches
#[derive(Debug, Clone)]
pub struct ScanBudget<'a> {
    pub cancel: Option<&'a CancelToken>,
    pub deadline: Option<Instant>,
    pub call_budget: Option<Duration>,
}

impl ScanBudget<'_> {
    fn stop_reason(&self) -> Option<StopReason> {
        if self.cancel.is_some_and(|c| c.is_cancelled()) {
            return Some(StopReason::Cancelled);
        }
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            return Some(StopReason::Timeout);
        }
        None
    }

    /// Longest the consumer may block before rechecking stop conditions;
    /// `None` means it can wait for the next batch indefinitely
    fn max_wait(&self) -> Option<Duration> {
        let until_deadline = self
            .deadline
            .map(|d| d.saturating_duration_since(Instant::now()));
        match (self.cancel, until_deadline) {
            (Some(_), Some(remaining)) => Some(remaining.min(CANCEL_POLL_INTERVAL)),
            (Some(_), None) => Some(CANCEL_POLL_INTERVAL),
            (None, remaining) => remaining,
        }
    }
}

/// Blocks workers that are too far ahead of the consumer
#[derive(Debug)]
struct ReleaseGate {
    state: Mutex<GateState>,
    moved: Condvar,
}

#[derive(Debug)]
struct GateState {
    released: usize,
    closed: bool,
}

impl ReleaseGate {
    fn new(released: usize) -> Self {
        Self {
            state: Mutex::new(GateState {
                released,
                closed: false,
            }),
            moved: Condvar::new(),
        }
    }

    /// Wait until window `first` may be scored; false once the gate is closed
    fn wait_for(&self, first: usize) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        while !state.closed && first >= state.released {
            state = self
                .moved
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
        !state.closed
    }

    fn advance(&self, released: usize) {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .released = released;
        self.moved.notify_all();
    }

    fn close(&self) {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .closed = true;
        self.moved.notify_all();
    }
}

/// Score every window of `plan` and pass results to `on_result` in window order
///
/// Returns `Ok(Some(reason))` when the scan stopped early, `Ok(None)` when
/// every window was handed on, or the first error `on_result` raised.
pub fn score_windows<F>(
    signal: &Signal,
    plan: &WindowPlan,
    classifier: &dyn WindowClassifier,
    workers: usize,
    batch_size: usize,
    budget: &ScanBudget<'_>,
    on_result: F,
) -> Result<Option<StopReason>, ScanError>
where
    F: FnMut(Window, ScoreResult) -> Result<(), ScanError>,
{
    let batch_size = batch_size.max(1);
    if workers <= 1 {
        score_sequential(signal, plan, classifier, batch_size, budget, on_result)
    } else {
        score_parallel(signal, plan, classifier, workers, batch_size, budget, on_result)
    }
}

/// Score windows `first..end`; a classifier panic fails every window of the batch
fn score_range(
    signal: &Signal,
    plan: &WindowPlan,
    classifier: &dyn WindowClassifier,
    first: usize,
    end: usize,
    call_budget: Option<Duration>,
) -> Vec<ScoreResult> {
    let windows: Vec<Window> = (first..end).filter_map(|i| plan.window(i)).collect();
    let inputs: Vec<&[f32]> = windows.iter().map(|w| signal.slice(w)).collect();
    match panic::catch_unwind(AssertUnwindSafe(|| {
        score_batch(classifier, &inputs, call_budget)
    })) {
        Ok(results) => results,
        Err(payload) => {
            let message = format!("classifier panicked: {}", panic_message(payload.as_ref()));
            tracing::warn!(first, end, error = %message, "classifier panicked");
            vec![Err(ClassifierError::Runtime(message)); inputs.len()]
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

fn release<F>(
    plan: &WindowPlan,
    first: usize,
    results: Vec<ScoreResult>,
    on_result: &mut F,
) -> Result<(), ScanError>
where
    F: FnMut(Window, ScoreResult) -> Result<(), ScanError>,
{
    for (offset, result) in results.into_iter().enumerate() {
        if let Some(window) = plan.window(first + offset) {
            on_result(window, result)?;
        }
    }
    Ok(())
}

fn score_sequential<F>(
    signal: &Signal,
    plan: &WindowPlan,
    classifier: &dyn WindowClassifier,
    batch_size: usize,
    budget: &ScanBudget<'_>,
    mut on_result: F,
) -> Result<Option<StopReason>, ScanError>
where
    F: FnMut(Window, ScoreResult) -> Result<(), ScanError>,
{
    let total = plan.len();
    let mut first = 0;

    while first < total {
        if let Some(reason) = budget.stop_reason() {
            return Ok(Some(reason));
        }
        let end = (first + batch_size).min(total);
        let results = score_range(signal, plan, classifier, first, end, budget.call_budget);
        release(plan, first, results, &mut on_result)?;
        first = end;
    }

    Ok(None)
}

fn score_parallel<F>(
    signal: &Signal,
    plan: &WindowPlan,
    classifier: &dyn WindowClassifier,
    workers: usize,
    batch_size: usize,
    budget: &ScanBudget<'_>,
    mut on_result: F,
) -> Result<Option<StopReason>, ScanError>
where
    F: FnMut(Window, ScoreResult) -> Result<(), ScanError>,
{
    let total = plan.len();
    let lookahead = workers * IN_FLIGHT_BATCHES_PER_WORKER * batch_size;
    let cursor = AtomicUsize::new(0);
    let gate = ReleaseGate::new(lookahead);
    let call_budget = budget.call_budget;

    thread::scope(|scope| {
        let (tx, rx) = mpsc::channel::<(usize, Vec<ScoreResult>)>();

        for worker in 0..workers {
            let tx = tx.clone();
            let (cursor, gate) = (&cursor, &gate);
            let cancel = budget.cancel;
            scope.spawn(move || {
                tracing::trace!(worker, "scoring worker started");
                loop {
                    if cancel.is_some_and(|c| c.is_cancelled()) {
                        break;
                    }
                    let first = cursor.fetch_add(batch_size, Ordering::AcqRel);
                    if first >= total || !gate.wait_for(first) {
                        break;
                    }
                    let end = (first + batch_size).min(total);
                    let results = score_range(signal, plan, classifier, first, end, call_budget);
                    if tx.send((first, results)).is_err() {
                        break;
                    }
                }
            });
        }
        drop(tx);

        let mut buffer = ReorderBuffer::new();
        let outcome = loop {
            if let Some(reason) = budget.stop_reason() {
                break Ok(Some(reason));
            }
            let received = match budget.max_wait() {
                Some(timeout) => rx.recv_timeout(timeout),
                None => rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
            };
            match received {
                Ok((first, results)) => {
                    buffer.insert(first, results);
                    let mut failure = None;
                    while let Some((first, results)) = buffer.pop_ready() {
                        if let Err(err) = release(plan, first, results, &mut on_result) {
                            failure = Some(err);
                            break;
                        }
                        gate.advance(buffer.next_expected() + lookahead);
                    }
                    if let Some(err) = failure {
                        break Err(err);
                    }
                    if buffer.next_expected() >= total {
                        break Ok(None);
                    }
                }
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => {
                    // Workers only exit early on cancellation
                    break Ok(budget.stop_reason().or(Some(StopReason::Cancelled)));
                }
            }
        };

        gate.close();
        if buffer.pending_batches() > 0 {
            tracing::debug!(
                pending = buffer.pending_batches(),
                "discarding out-of-order batches after early stop"
            );
        }
        outcome
    })
}
