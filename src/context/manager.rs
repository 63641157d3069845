//! Conversation context engine
//!
//! [`ContextManager`] is the session handle. It owns the turn store and the
//! summary list behind one lock, records turns synchronously, builds
//! budgeted windows on demand, and compresses old history in the background.
//!
//! A summarization pass snapshots the oldest block under a read lock, builds
//! the summary without holding any lock, then removes the covered prefix and
//! appends the summary in a single write-locked step. Readers therefore see
//! either the turns or their summary, never both and never neither.

use super::models::{AttachmentContext, ChatMessage, ContextWindow, ConversationSummary, ConversationTurn};
use super::prompt::PromptAssembler;
use super::scorer::Scorer;
use super::selector::WindowSelector;
use super::similarity::{NoSimilarity, SimilarityScorer};
use super::stats::ConversationStats;
use super::summarizer::{ExtractiveSummarizer, Summarizer};
use super::token_estimator::{FallbackEstimator, TokenEstimator};
use super::turn_store::TurnStore;
use crate::config::{Config, SummarizationConfig};
use crate::error::Result;
use crate::metrics::METRICS;
use crate::time_operation;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Result of one committed summarization pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummarizationOutcome {
    /// Turns removed from the store by this pass
    pub turns_evicted: usize,
    pub tokens_saved: i64,
    /// Summaries held after the commit
    pub summaries_total: usize,
}

/// Snapshot of the conversation for display
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationReport {
    pub stats: ConversationStats,
    pub current_context_tokens: usize,
    pub key_points: Vec<String>,
    pub summary: Option<String>,
}

/// Everything guarded by the engine lock
#[derive(Debug, Default)]
struct EngineState {
    store: TurnStore,
    summaries: Vec<ConversationSummary>,
    overflow_drops: u64,
    /// Bumped by `clear` so stale passes discard their commit
    generation: u64,
}

/// Handle on the background pass `settle` waits for
enum PendingPass {
    /// Spawned on the ambient tokio runtime
    Task(JoinHandle<()>),
    /// Running on a dedicated worker thread, signalled on completion
    Worker(oneshot::Receiver<()>),
}

/// State shared with background summarization tasks
struct Shared {
    state: RwLock<EngineState>,
    summarizer: Arc<dyn Summarizer>,
    config: SummarizationConfig,
    in_flight: AtomicBool,
}

impl Shared {
    fn read(&self) -> RwLockReadGuard<'_, EngineState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, EngineState> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }

    fn needs_summary(&self) -> bool {
        self.config.enabled && self.read().store.len() >= self.config.threshold
    }

    /// Run passes until the store drops below the threshold
    ///
    /// Returns false when a pass failed or was skipped with the store still
    /// at the threshold.
    async fn drain(&self) -> bool {
        loop {
            match self.summarize_once().await {
                Ok(Some(_)) if self.needs_summary() => continue,
                Ok(_) => return !self.needs_summary(),
                Err(e) => {
                    warn!("Background summarization failed: {}", e);
                    return false;
                }
            }
        }
    }

    /// Drain while holding the in-flight flag, then release it
    ///
    /// An append that crossed the threshold while the flag was held could
    /// not schedule a pass, so the store is checked again after release.
    async fn run_passes(&self) {
        loop {
            let settled = self.drain().await;
            if !self.release(settled) {
                break;
            }
            debug!("Threshold crossed during pass, draining again");
        }
    }

    /// Release the in-flight flag, reclaiming it when `recheck` is set and
    /// the store is back at the threshold
    fn release(&self, recheck: bool) -> bool {
        self.in_flight.store(false, Ordering::SeqCst);
        recheck && self.needs_summary() && self.try_claim()
    }

    fn try_claim(&self) -> bool {
        self.in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// One snapshot, summarize, commit cycle
    async fn summarize_once(&self) -> Result<Option<SummarizationOutcome>> {
        let (block, generation) = {
            let state = self.read();
            if state.store.len() < self.config.threshold {
                return Ok(None);
            }
            (state.store.oldest(self.config.block_size()), state.generation)
        };

        let Some(last_seq) = block.last().map(|t| t.seq) else {
            return Ok(None);
        };

        let summary = match time_operation!(
            METRICS.summarization_duration,
            "summarize",
            self.summarizer.summarize(&block).await
        ) {
            Ok(Some(summary)) => summary,
            Ok(None) => {
                METRICS.record_summarization("skipped", 0);
                return Ok(None);
            }
            Err(e) => {
                METRICS.record_summarization("failed", 0);
                return Err(e);
            }
        };

        let tokens_saved = summary.tokens_saved;
        let outcome = {
            let mut state = self.write();
            if state.generation != generation {
                drop(state);
                METRICS.record_summarization("discarded", 0);
                debug!("Conversation cleared during summarization, discarding summary");
                return Ok(None);
            }
            let evicted = state.store.evict_through(last_seq);
            state.summaries.push(summary);
            if let Some(max_age) = self.config.max_summary_age() {
                prune_older_than(&mut state.summaries, max_age);
            }
            SummarizationOutcome {
                turns_evicted: evicted.len(),
                tokens_saved,
                summaries_total: state.summaries.len(),
            }
        };

        METRICS.record_summarization("committed", tokens_saved);
        info!(
            "Summarized {} turns, saved {} tokens ({} summaries held)",
            outcome.turns_evicted, outcome.tokens_saved, outcome.summaries_total
        );

        Ok(Some(outcome))
    }
}

/// Conversation context engine for one session
pub struct ContextManager {
    shared: Arc<Shared>,
    scorer: Scorer,
    selector: WindowSelector,
    assembler: PromptAssembler,
    config: Config,
    pending: Mutex<Option<PendingPass>>,
}

impl ContextManager {
    /// Create with tiktoken when available, no similarity adapter and the extractive summarizer
    pub fn new(config: Config) -> Result<Self> {
        Self::with_adapters(
            config,
            Arc::new(FallbackEstimator::detect()),
            Arc::new(NoSimilarity),
        )
    }

    /// Create with explicit tokenizer and similarity adapters
    pub fn with_adapters(
        config: Config,
        estimator: Arc<dyn TokenEstimator>,
        similarity: Arc<dyn SimilarityScorer>,
    ) -> Result<Self> {
        Self::with_summarizer(config, estimator, similarity, Arc::new(ExtractiveSummarizer))
    }

    /// Create with every collaborator supplied
    pub fn with_summarizer(
        config: Config,
        estimator: Arc<dyn TokenEstimator>,
        similarity: Arc<dyn SimilarityScorer>,
        summarizer: Arc<dyn Summarizer>,
    ) -> Result<Self> {
        config.validate()?;

        let shared = Arc::new(Shared {
            state: RwLock::new(EngineState {
                store: TurnStore::new(config.history.capacity),
                summaries: Vec::new(),
                overflow_drops: 0,
                generation: 0,
            }),
            summarizer,
            config: config.summarization.clone(),
            in_flight: AtomicBool::new(false),
        });

        info!(
            "Context manager ready: capacity={}, threshold={}, budget={}, policy={:?}",
            config.history.capacity,
            config.summarization.threshold,
            config.window.max_context_tokens,
            config.window.policy
        );

        Ok(Self {
            shared,
            scorer: Scorer::new(config.scoring.clone(), estimator, similarity),
            selector: WindowSelector::new(config.window.clone()),
            assembler: PromptAssembler::new(config.prompt.clone()),
            config,
            pending: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Record a completed exchange and return its turn id
    ///
    /// Never waits on summarization. Crossing the threshold schedules a
    /// background pass on the ambient tokio runtime, or on a worker thread
    /// when there is none.
    pub fn record_turn(
        &self,
        user_message: &str,
        assistant_message: &str,
        attachment_ids: Vec<String>,
    ) -> String {
        let turn = self.scorer.build_turn(user_message, assistant_message, attachment_ids);
        let importance = turn.importance_score;
        let tokens = turn.tokens_used;

        let (outcome, resident) = {
            let mut state = self.shared.write();
            let outcome = state.store.append(turn);
            if outcome.dropped.is_some() {
                state.overflow_drops += 1;
            }
            (outcome, state.store.len())
        };

        METRICS.record_turn(outcome.dropped.is_some());
        debug!(
            "Recorded turn {} (importance {:.2}, {} tokens, {} resident)",
            outcome.id, importance, tokens, resident
        );

        if self.shared.config.enabled && resident >= self.shared.config.threshold {
            self.schedule_summarization();
        }

        outcome.id
    }

    fn schedule_summarization(&self) {
        if !self.shared.try_claim() {
            debug!("Summarization already in flight");
            return;
        }

        let shared = self.shared.clone();
        let pass = match Handle::try_current() {
            Ok(handle) => PendingPass::Task(handle.spawn(async move {
                shared.run_passes().await;
            })),
            Err(_) => {
                let (done_tx, done_rx) = oneshot::channel();
                let spawned = std::thread::Builder::new()
                    .name("context-summarizer".to_string())
                    .spawn(move || {
                        match tokio::runtime::Builder::new_current_thread().enable_all().build() {
                            Ok(runtime) => runtime.block_on(shared.run_passes()),
                            Err(e) => {
                                warn!("Cannot build summarization runtime: {}", e);
                                shared.in_flight.store(false, Ordering::SeqCst);
                            }
                        }
                        let _ = done_tx.send(());
                    });

                if let Err(e) = spawned {
                    warn!("Cannot spawn summarization worker: {}", e);
                    self.shared.in_flight.store(false, Ordering::SeqCst);
                    return;
                }
                PendingPass::Worker(done_rx)
            }
        };

        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        *pending = Some(pass);
    }

    /// Wait for the in-flight background pass, if any
    pub async fn settle(&self) {
        let task = self
            .pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();

        match task {
            Some(PendingPass::Task(task)) => {
                if let Err(e) = task.await {
                    warn!("Summarization task ended abnormally: {}", e);
                    self.shared.in_flight.store(false, Ordering::SeqCst);
                }
            }
            Some(PendingPass::Worker(done)) => {
                if done.await.is_err() {
                    warn!("Summarization worker ended abnormally");
                    self.shared.in_flight.store(false, Ordering::SeqCst);
                }
            }
            None => {}
        }
    }

    /// Run one pass now if the store is still at or over the threshold
    ///
    /// Calling it again once the store is below the threshold does nothing.
    pub async fn maybe_summarize(&self) -> Option<SummarizationOutcome> {
        self.settle().await;

        if !self.shared.config.enabled {
            return None;
        }
        if !self.shared.try_claim() {
            return None;
        }

        let result = self.shared.summarize_once().await;
        self.shared.in_flight.store(false, Ordering::SeqCst);

        match result {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!("Summarization failed: {}", e);
                None
            }
        }
    }

    /// Build a window for `query` under `token_budget`
    pub fn build_window(
        &self,
        query: &str,
        attachments: &[AttachmentContext],
        token_budget: usize,
    ) -> ContextWindow {
        let (turns, summaries) = {
            let state = self.shared.read();
            (state.store.all(), state.summaries.clone())
        };

        let window = self
            .selector
            .select(&self.scorer, &turns, &summaries, query, attachments, token_budget);

        METRICS.record_window(window.total_tokens, window.is_degraded());
        if window.is_degraded() && !turns.is_empty() {
            warn!(
                "Token budget {} exhausted by reserves, no history selected",
                token_budget
            );
        }

        window
    }

    /// Build a window under the configured default budget
    pub fn build_window_default(&self, query: &str, attachments: &[AttachmentContext]) -> ContextWindow {
        self.build_window(query, attachments, self.config.window.max_context_tokens)
    }

    /// Full message list for the generation backend
    pub fn build_prompt(&self, query: &str, attachments: &[AttachmentContext]) -> Vec<ChatMessage> {
        let window = self.build_window_default(query, attachments);
        self.assembler.assemble(&window, attachments, query)
    }

    pub fn get_stats(&self) -> ConversationStats {
        let state = self.shared.read();
        ConversationStats::compute(state.store.iter(), &state.summaries, state.overflow_drops)
    }

    /// Stats plus the window a generic query would receive
    pub fn report(&self, query: &str) -> ConversationReport {
        let stats = self.get_stats();
        let window = self.build_window_default(query, &[]);
        ConversationReport {
            stats,
            current_context_tokens: window.total_tokens,
            key_points: window.key_points,
            summary: window.summary,
        }
    }

    /// Drop summaries whose period ended more than `max_age` ago
    pub fn prune_summaries(&self, max_age: Duration) -> usize {
        let mut state = self.shared.write();
        let removed = prune_older_than(&mut state.summaries, max_age);
        if removed > 0 {
            info!("Pruned {} summaries older than {:?}", removed, max_age);
        }
        removed
    }

    /// Forget all turns and summaries
    ///
    /// A pass still in flight discards its summary instead of committing it.
    pub fn clear(&self) {
        let mut state = self.shared.write();
        let resident = state.store.len();
        state.store.evict(resident);
        state.summaries.clear();
        state.overflow_drops = 0;
        state.generation += 1;
        debug!("Conversation cleared");
    }

    /// Resident turns, oldest first
    pub fn turns(&self) -> Vec<ConversationTurn> {
        self.shared.read().store.all()
    }

    /// Summaries in creation order
    pub fn summaries(&self) -> Vec<ConversationSummary> {
        self.shared.read().summaries.clone()
    }
}

fn prune_older_than(summaries: &mut Vec<ConversationSummary>, max_age: Duration) -> usize {
    let Ok(max_age) = chrono::Duration::from_std(max_age) else {
        return 0;
    };
    let Some(cutoff) = Utc::now().checked_sub_signed(max_age) else {
        return 0;
    };

    let before = summaries.len();
    summaries.retain(|s| s.period_end >= cutoff);
    before - summaries.len()
}
