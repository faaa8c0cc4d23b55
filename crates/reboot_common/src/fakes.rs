//! In-memory implementations of every capability trait.
//!
//! Used by the unit tests here, the scenario tests and the daemon's wiring
//! tests. None of them touch the system.

use crate::ports::{Checker, Journal, JournalEntry, Reboot, UptimeSource};
use crate::precondition::HourClock;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

// ============================================================================
// Checker
// ============================================================================

#[derive(Debug, Clone)]
enum Answer {
    Healthy(bool),
    Error(String),
}

/// Checker whose answer is set by the test. Starts out healthy.
#[derive(Debug)]
pub struct FakeChecker {
    name: String,
    answer: Mutex<Answer>,
    delay: Mutex<Duration>,
    calls: AtomicUsize,
}

impl FakeChecker {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            answer: Mutex::new(Answer::Healthy(true)),
            delay: Mutex::new(Duration::ZERO),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn set_healthy(&self, healthy: bool) {
        *lock(&self.answer) = Answer::Healthy(healthy);
    }

    pub fn set_error(&self, message: &str) {
        *lock(&self.answer) = Answer::Error(message.to_string());
    }

    /// Sleep this long (on the tokio clock) before answering
    pub fn set_delay(&self, delay: Duration) {
        *lock(&self.delay) = delay;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Checker for FakeChecker {
    fn name(&self) -> &str {
        &self.name
    }

    async fn is_healthy(&self) -> Result<bool> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = *lock(&self.delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        match lock(&self.answer).clone() {
            Answer::Healthy(healthy) => Ok(healthy),
            Answer::Error(message) => Err(anyhow!(message)),
        }
    }
}

// ============================================================================
// Clock
// ============================================================================

/// Hour clock frozen at a settable hour
#[derive(Debug)]
pub struct FixedClock {
    hour: AtomicU32,
}

impl FixedClock {
    pub fn new(hour: u32) -> Self {
        Self {
            hour: AtomicU32::new(hour),
        }
    }

    pub fn set(&self, hour: u32) {
        self.hour.store(hour, Ordering::SeqCst);
    }
}

impl HourClock for FixedClock {
    fn current_hour(&self) -> u32 {
        self.hour.load(Ordering::SeqCst)
    }
}

// ============================================================================
// Reboot
// ============================================================================

/// Counts reboot invocations; can be told to fail
#[derive(Debug, Default)]
pub struct FakeReboot {
    calls: AtomicUsize,
    fail: AtomicBool,
}

impl FakeReboot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Reboot for FakeReboot {
    async fn reboot(&self) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(anyhow!("reboot refused"));
        }
        Ok(())
    }
}

// ============================================================================
// Journal
// ============================================================================

/// Keeps journal entries in memory
#[derive(Debug, Default)]
pub struct MemoryJournal {
    entries: Mutex<Vec<JournalEntry>>,
    fail: AtomicBool,
}

impl MemoryJournal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn entries(&self) -> Vec<JournalEntry> {
        lock(&self.entries).clone()
    }
}

#[async_trait]
impl Journal for MemoryJournal {
    async fn record(&self, entry: &JournalEntry) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(anyhow!("journal is read-only"));
        }
        lock(&self.entries).push(entry.clone());
        Ok(())
    }
}

// ============================================================================
// Uptime
// ============================================================================

/// Uptime source with a settable value; `None` makes reads fail
#[derive(Debug)]
pub struct FakeUptime {
    uptime: Mutex<Option<Duration>>,
}

impl FakeUptime {
    pub fn new(uptime: Duration) -> Self {
        Self {
            uptime: Mutex::new(Some(uptime)),
        }
    }

    pub fn unavailable() -> Self {
        Self {
            uptime: Mutex::new(None),
        }
    }

    pub fn set(&self, uptime: Duration) {
        *lock(&self.uptime) = Some(uptime);
    }
}

impl UptimeSource for FakeUptime {
    fn uptime(&self) -> Result<Duration> {
        lock(&self.uptime).ok_or_else(|| anyhow!("uptime unavailable"))
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
