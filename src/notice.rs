//! Transient user notifications ("toasts").

use crate::constants::{MAX_VISIBLE_TOASTS, TOAST_LIFETIME};
use std::collections::VecDeque;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone)]
pub struct Notice {
    pub level: NoticeLevel,
    pub text: String,
    pub created_at: Instant,
}

#[derive(Debug, Default)]
pub struct Notices {
    queue: VecDeque<Notice>,
}

impl Notices {
    pub fn push(&mut self, level: NoticeLevel, text: impl Into<String>) {
        self.push_at(level, text, Instant::now());
    }

    pub fn push_at(&mut self, level: NoticeLevel, text: impl Into<String>, now: Instant) {
        let text = text.into();
        match level {
            NoticeLevel::Error => log::error!("{text}"),
            NoticeLevel::Warning => log::warn!("{text}"),
            NoticeLevel::Info | NoticeLevel::Success => log::info!("{text}"),
        }
        self.queue.push_back(Notice {
            level,
            text,
            created_at: now,
        });
        while self.queue.len() > MAX_VISIBLE_TOASTS {
            self.queue.pop_front();
        }
    }

    pub fn info(&mut self, text: impl Into<String>) {
        self.push(NoticeLevel::Info, text);
    }

    pub fn success(&mut self, text: impl Into<String>) {
        self.push(NoticeLevel::Success, text);
    }

    pub fn warning(&mut self, text: impl Into<String>) {
        self.push(NoticeLevel::Warning, text);
    }

    pub fn error(&mut self, text: impl Into<String>) {
        self.push(NoticeLevel::Error, text);
    }

    /// Drops notices older than their lifetime.
    pub fn prune(&mut self, now: Instant) {
        self.queue
            .retain(|notice| now.saturating_duration_since(notice.created_at) < TOAST_LIFETIME);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Notice> {
        self.queue.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn last(&self) -> Option<&Notice> {
        self.queue.back()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_notices_expire() {
        let start = Instant::now();
        let mut notices = Notices::default();
        notices.push_at(NoticeLevel::Success, "Saved", start);
        notices.push_at(NoticeLevel::Info, "Later", start + Duration::from_secs(2));

        notices.prune(start + Duration::from_secs(1));
        assert_eq!(notices.len(), 2);

        notices.prune(start + TOAST_LIFETIME);
        assert_eq!(notices.len(), 1);
        assert_eq!(notices.last().map(|n| n.text.as_str()), Some("Later"));
    }

    #[test]
    fn test_queue_is_capped() {
        let mut notices = Notices::default();
        for i in 0..MAX_VISIBLE_TOASTS + 3 {
            notices.info(format!("notice {i}"));
        }
        assert_eq!(notices.len(), MAX_VISIBLE_TOASTS);
        assert_eq!(
            notices.iter().next().map(|n| n.text.clone()),
            Some("notice 3".to_string())
        );
    }
}
