//! Process-lifetime buffer of rendered conversation turns.

use std::{collections::VecDeque, sync::Arc};

use tokio::sync::Mutex;

/// Handle to the single history buffer shared by every command handler.
///
/// Every mutation goes through the mutex, so concurrent stateful commands are applied one at a
/// time in lock-acquisition order.
pub type SharedHistory = Arc<Mutex<ConversationHistory>>;

/// Ordered turns used as completion context.
///
/// Growth is unbounded unless a cap is configured with [`ConversationHistory::with_max_turns`],
/// in which case the oldest turn is evicted first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConversationHistory {
    turns: VecDeque<String>,
    max_turns: Option<usize>,
}

impl ConversationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_turns(max_turns: usize) -> Self {
        Self {
            turns: VecDeque::new(),
            max_turns: Some(max_turns.max(1)),
        }
    }

    pub fn into_shared(self) -> SharedHistory {
        Arc::new(Mutex::new(self))
    }

    pub fn append(&mut self, turn: impl Into<String>) {
        self.turns.push_back(turn.into());
        if let Some(max_turns) = self.max_turns {
            while self.turns.len() > max_turns {
                self.turns.pop_front();
            }
        }
    }

    pub fn reset(&mut self) {
        self.turns.clear();
    }

    pub fn snapshot(&self) -> String {
        self.turns.iter().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn max_turns(&self) -> Option<usize> {
        self.max_turns
    }

    pub fn turns(&self) -> impl Iterator<Item = &str> {
        self.turns.iter().map(String::as_str)
    }
}
