use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// Single-slot handoff with keep-only-latest semantics.
///
/// The producer overwrites whatever is pending; the consumer takes the newest
/// value or nothing. Effective queue depth is 1.
#[derive(Debug)]
pub struct LatestSlot<T> {
    pending: Mutex<Option<Arc<T>>>,
    /// Incremented on every publish
    sequence: AtomicU64,
    /// Values replaced before anyone took them
    overwritten: AtomicU64,
}

impl<T> LatestSlot<T> {
    pub fn new() -> Self {
        Self {
            pending: Mutex::new(None),
            sequence: AtomicU64::new(0),
            overwritten: AtomicU64::new(0),
        }
    }

    /// 新しい値で上書きし、発行番号を返す
    pub fn publish(&self, value: T) -> u64 {
        self.publish_arc(Arc::new(value))
    }

    /// 共有済みの値をそのまま発行する
    pub fn publish_arc(&self, value: Arc<T>) -> u64 {
        let replaced = {
            let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
            pending.replace(value).is_some()
        };
        if replaced {
            self.overwritten.fetch_add(1, Ordering::Relaxed);
        }
        self.sequence.fetch_add(1, Ordering::Release) + 1
    }

    /// 未消費の最新値を取り出す。なければ None
    pub fn take(&self) -> Option<Arc<T>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner).take()
    }

    /// Whether a value is waiting to be taken
    pub fn has_pending(&self) -> bool {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner).is_some()
    }

    /// Drop any pending value without consuming it.
    pub fn clear(&self) {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner).take();
    }

    pub fn sequence(&self) -> u64 {
        self.sequence.load(Ordering::Acquire)
    }

    pub fn overwritten(&self) -> u64 {
        self.overwritten.load(Ordering::Relaxed)
    }
}

impl<T> Default for LatestSlot<T> {
    fn default() -> Self {
        Self::new()
    }
}
