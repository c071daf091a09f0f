//! Notification center
//!
//! An instantiated service owned by the composition root. Notifications are
//! queued by `present*` and promoted one per [`NotificationCenter::tick`],
//! so a burst of failures becomes a readable sequence instead of a wall.

use crate::config::NotifyConfig;
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tracing::debug;

pub type NotificationId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Error,
}

/// A notification shown to the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub id: NotificationId,
    pub title: String,
    /// User-facing text
    pub message: String,
    /// Full error text, kept for a detail view
    pub detail: Option<String>,
    pub severity: Severity,
    pub duration: Duration,
    /// Vertical offset in the visible stack
    pub offset: u32,
    /// When the notification became visible; `None` while queued
    pub shown_at: Option<Instant>,
}

/// What a [`NotificationCenter::tick`] changed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Notification promoted from the queue
    pub shown: Option<NotificationId>,
    /// Notifications whose duration elapsed
    pub expired: Vec<NotificationId>,
    /// Notifications pushed out by newer ones
    pub evicted: Vec<NotificationId>,
}

impl TickReport {
    pub fn is_empty(&self) -> bool {
        self.shown.is_none() && self.expired.is_empty() && self.evicted.is_empty()
    }
}

/// Extract the user-facing part of a backend error
///
/// Backend errors look like `code | message [trace]`; the text between the
/// first `|` and the first `[` is returned. Falls back to the raw text.
pub fn extract_error_message(raw: &str) -> &str {
    let before_trace = raw.split('[').next().unwrap_or(raw);
    match before_trace.split('|').nth(1).map(str::trim) {
        Some(user_part) if !user_part.is_empty() => user_part,
        _ => raw,
    }
}

#[derive(Debug)]
pub struct NotificationCenter {
    config: NotifyConfig,
    next_id: NotificationId,
    queue: VecDeque<Notification>,
    active: Vec<Notification>,
}

impl NotificationCenter {
    pub fn new(config: NotifyConfig) -> Self {
        Self {
            config,
            next_id: 1,
            queue: VecDeque::new(),
            active: Vec::new(),
        }
    }

    /// Queue an informational notification
    pub fn present(&mut self, title: impl Into<String>, message: impl Into<String>) -> NotificationId {
        let duration = self.config.default_duration();
        self.enqueue(title.into(), message.into(), None, Severity::Info, duration)
    }

    /// Queue an error notification built from a raw backend error
    pub fn present_error(&mut self, title: impl Into<String>, raw: impl Into<String>) -> NotificationId {
        let raw = raw.into();
        let message = extract_error_message(&raw).to_string();
        let duration = self.config.default_duration();
        self.enqueue(title.into(), message, Some(raw), Severity::Error, duration)
    }

    fn enqueue(
        &mut self,
        title: String,
        message: String,
        detail: Option<String>,
        severity: Severity,
        duration: Duration,
    ) -> NotificationId {
        let id = self.next_id;
        self.next_id += 1;
        debug!(id, title = %title, ?severity, "Notification queued");
        self.queue.push_back(Notification {
            id,
            title,
            message,
            detail,
            severity,
            duration,
            offset: 0,
            shown_at: None,
        });
        id
    }

    /// Advance the center to `now`
    ///
    /// Expires elapsed notifications, promotes at most one queued
    /// notification and evicts the oldest ones beyond `max_visible`.
    pub fn tick(&mut self, now: Instant) -> TickReport {
        let mut report = TickReport::default();

        self.active.retain(|n| {
            let alive = n
                .shown_at
                .is_none_or(|shown| now.saturating_duration_since(shown) < n.duration);
            if !alive {
                report.expired.push(n.id);
            }
            alive
        });

        if let Some(mut next) = self.queue.pop_front() {
            next.shown_at = Some(now);
            report.shown = Some(next.id);
            self.active.push(next);
        }

        if self.active.len() > self.config.max_visible {
            let excess = self.active.len() - self.config.max_visible;
            report
                .evicted
                .extend(self.active.drain(..excess).map(|n| n.id));
        }

        if !report.is_empty() {
            self.restack();
            debug!(
                shown = ?report.shown,
                expired = report.expired.len(),
                evicted = report.evicted.len(),
                "Notifications updated"
            );
        }
        report
    }

    /// Remove one notification, visible or queued
    pub fn dismiss(&mut self, id: NotificationId) -> bool {
        if let Some(pos) = self.active.iter().position(|n| n.id == id) {
            self.active.remove(pos);
            self.restack();
            return true;
        }
        if let Some(pos) = self.queue.iter().position(|n| n.id == id) {
            self.queue.remove(pos);
            return true;
        }
        false
    }

    /// Remove every notification; returns how many were removed
    pub fn dismiss_all(&mut self) -> usize {
        let removed = self.pending();
        self.active.clear();
        self.queue.clear();
        removed
    }

    /// Visible and queued notifications
    pub fn pending(&self) -> usize {
        self.active.len() + self.queue.len()
    }

    /// Whether a "dismiss all" control should be offered
    pub fn show_dismiss_all(&self) -> bool {
        self.active.len() > 1
    }

    pub fn active(&self) -> &[Notification] {
        &self.active
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    fn restack(&mut self) {
        let spacing = self.config.stack_spacing;
        for (index, notification) in self.active.iter_mut().enumerate() {
            notification.offset = index as u32 * spacing;
        }
    }
}

impl Default for NotificationCenter {
    fn default() -> Self {
        Self::new(NotifyConfig::default())
    }
}
