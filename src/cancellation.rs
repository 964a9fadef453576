//! Cancellation framework: CancellationToken + generation guard.
//! A new selection supersedes the in-flight one; the stale resolve observes
//! its guard between gateway calls and bails out before writing results.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;

/// Tracks the current request generation. Advancing cancels every token
/// handed out for prior generations.
pub struct TaskGeneration {
    current_token: RwLock<CancellationToken>,
    generation: Arc<AtomicU64>,
}

impl TaskGeneration {
    pub fn new() -> Self {
        Self {
            current_token: RwLock::new(CancellationToken::new()),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Cancel all in-flight work, advance the generation, and return the
    /// guard for the new request.
    pub fn cancel_and_advance(&self) -> GenerationGuard {
        let mut token_guard = self.current_token.write();
        token_guard.cancel();
        let new_root = CancellationToken::new();
        let child = new_root.child_token();
        *token_guard = new_root;
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        GenerationGuard {
            generation: Arc::clone(&self.generation),
            my_generation: generation,
            token: child,
        }
    }

    /// Guard for the current generation without cancelling anything.
    pub fn guard(&self) -> GenerationGuard {
        let token_guard = self.current_token.read();
        GenerationGuard {
            generation: Arc::clone(&self.generation),
            my_generation: self.generation.load(Ordering::SeqCst),
            token: token_guard.child_token(),
        }
    }

    /// Read current generation.
    pub fn current_generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Cancel all current tasks without advancing the generation.
    pub fn cancel_all(&self) {
        self.current_token.read().cancel();
    }
}

/// Guard that a task checks before each suspension point and result write.
/// If the generation has advanced past `my_generation`, the task is stale.
#[derive(Clone)]
pub struct GenerationGuard {
    generation: Arc<AtomicU64>,
    my_generation: u64,
    token: CancellationToken,
}

impl GenerationGuard {
    /// Returns true if this task is still the current generation.
    #[inline]
    pub fn is_current(&self) -> bool {
        self.generation.load(Ordering::SeqCst) == self.my_generation
    }

    /// Returns true if cancellation has been requested.
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Returns true if the task should continue (not cancelled and still
    /// current).
    #[inline]
    pub fn should_continue(&self) -> bool {
        !self.is_cancelled() && self.is_current()
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn my_generation(&self) -> u64 {
        self.my_generation
    }
}
