//! Capacity-bounded, insertion-ordered turn storage
//!
//! Two independent reclaim policies act on the store: FIFO overflow on
//! append (the hard backstop implemented here) and threshold-driven
//! summarization, which removes a committed prefix via [`TurnStore::evict_through`].

use super::models::ConversationTurn;
use std::collections::VecDeque;
use tracing::warn;

/// Default maximum number of resident turns
pub const DEFAULT_CAPACITY: usize = 1000;

/// Result of appending a turn
#[derive(Debug, Clone)]
pub struct AppendOutcome {
    pub id: String,
    pub seq: u64,
    /// Turn dropped by FIFO overflow, if the store was full
    pub dropped: Option<ConversationTurn>,
}

/// Bounded FIFO arena of conversation turns
#[derive(Debug, Clone)]
pub struct TurnStore {
    turns: VecDeque<ConversationTurn>,
    capacity: usize,
    next_seq: u64,
}

impl TurnStore {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            turns: VecDeque::with_capacity(capacity.min(DEFAULT_CAPACITY)),
            capacity,
            next_seq: 1,
        }
    }

    /// Append a turn, dropping the oldest one if the store is full
    pub fn append(&mut self, mut turn: ConversationTurn) -> AppendOutcome {
        let dropped = if self.turns.len() >= self.capacity {
            let oldest = self.turns.pop_front();
            if let Some(ref old) = oldest {
                warn!(
                    "Turn store at capacity ({}), dropping oldest turn {}",
                    self.capacity, old.id
                );
            }
            oldest
        } else {
            None
        };

        turn.seq = self.next_seq;
        self.next_seq += 1;

        let outcome = AppendOutcome {
            id: turn.id.clone(),
            seq: turn.seq,
            dropped,
        };
        self.turns.push_back(turn);
        outcome
    }

    /// The n oldest turns, oldest first
    pub fn oldest(&self, n: usize) -> Vec<ConversationTurn> {
        self.turns.iter().take(n).cloned().collect()
    }

    /// All turns, oldest first
    pub fn all(&self) -> Vec<ConversationTurn> {
        self.turns.iter().cloned().collect()
    }

    /// Iterate resident turns, oldest first
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &ConversationTurn> + ExactSizeIterator {
        self.turns.iter()
    }

    /// Remove the n oldest turns, returning how many were removed
    pub fn evict(&mut self, n: usize) -> usize {
        let n = n.min(self.turns.len());
        self.turns.drain(..n);
        n
    }

    /// Remove every leading turn whose sequence number is at most `seq`
    ///
    /// Turns are ordered by `seq`, so this always removes a prefix. Turns
    /// already dropped by overflow are simply not found.
    pub fn evict_through(&mut self, seq: u64) -> Vec<ConversationTurn> {
        let count = self.turns.iter().take_while(|t| t.seq <= seq).count();
        self.turns.drain(..count).collect()
    }

    pub fn get(&self, id: &str) -> Option<&ConversationTurn> {
        self.turns.iter().find(|t| t.id == id)
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Sum of resident turn tokens
    pub fn total_tokens(&self) -> usize {
        self.turns.iter().map(|t| t.tokens_used).sum()
    }
}

impl Default for TurnStore {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
