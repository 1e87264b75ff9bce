use std::sync::{Arc, Mutex};

/// Single-argument user notification ("toast").
pub trait Notifier: Send + Sync {
    fn toast(&self, message: &str);
}

/// Asks the user to approve a destructive action.
pub trait Confirm: Send + Sync {
    fn confirm(&self, prompt: &str) -> bool;
}

/// Rebuilds all in-memory application state from storage (a full reload).
pub trait Reinitialize: Send + Sync {
    fn reinitialize(&self);
}

/// Notifier that drops every message.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentNotifier;

impl Notifier for SilentNotifier {
    fn toast(&self, _message: &str) {}
}

/// Notifier that keeps every message, for tests and smoke runs.
#[derive(Debug, Default, Clone)]
pub struct RecordingNotifier {
    messages: Arc<Mutex<Vec<String>>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().map(|m| m.clone()).unwrap_or_default()
    }
}

impl Notifier for RecordingNotifier {
    fn toast(&self, message: &str) {
        if let Ok(mut messages) = self.messages.lock() {
            messages.push(message.to_string());
        }
    }
}

/// Fixed answer to every confirmation prompt.
#[derive(Debug, Clone, Copy)]
pub struct AutoConfirm(pub bool);

impl Confirm for AutoConfirm {
    fn confirm(&self, _prompt: &str) -> bool {
        self.0
    }
}

/// Reinitializer that only counts how often it was triggered.
#[derive(Debug, Default, Clone)]
pub struct CountingReinitializer {
    count: Arc<Mutex<usize>>,
}

impl CountingReinitializer {
    pub fn count(&self) -> usize {
        self.count.lock().map(|c| *c).unwrap_or(0)
    }
}

impl Reinitialize for CountingReinitializer {
    fn reinitialize(&self) {
        if let Ok(mut count) = self.count.lock() {
            *count += 1;
        }
    }
}
