//! 按键防抖

use std::sync::Mutex;
use std::time::{Duration, Instant};

/// 默认防抖窗口
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(100);

/// 一次性防抖标志
///
/// 接受一次按键后，在 `window` 内的后续按键全部丢弃。
/// 被丢弃的按键不会延长窗口。
#[derive(Debug)]
pub struct Debouncer {
    window: Duration,
    last_accepted: Mutex<Option<Instant>>,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_accepted: Mutex::new(None),
        }
    }

    pub fn try_acquire(&self) -> bool {
        self.try_acquire_at(Instant::now())
    }

    pub fn try_acquire_at(&self, now: Instant) -> bool {
        let mut last = self
            .last_accepted
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        if let Some(prev) = *last
            && now.saturating_duration_since(prev) < self.window
        {
            return false;
        }

        *last = Some(now);
        true
    }
}

impl Default for Debouncer {
    fn default() -> Self {
        Self::new(DEFAULT_DEBOUNCE)
    }
}
