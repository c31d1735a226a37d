// SPDX-License-Identifier: CEPL-1.0
//! User-facing failure notices.
//!
//! Import failures and steady-state GPU failures end up here instead of
//! tearing the session down. The frontend drains the queue once per frame.

use std::collections::VecDeque;
use std::fmt;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Notice {
    pub title: String,
    pub message: String,
}

impl Notice {
    pub fn new(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.title, self.message)
    }
}

/// Bounded FIFO of pending notices. Oldest entries are dropped first.
#[derive(Debug)]
pub struct Notifications {
    queue: VecDeque<Notice>,
    capacity: usize,
}

impl Default for Notifications {
    fn default() -> Self {
        Self::with_capacity(16)
    }
}

impl Notifications {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            queue: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    /// Queue a notice and mirror it to the log.
    pub fn push(&mut self, notice: Notice) {
        tracing::error!("{notice}");
        if self.queue.len() == self.capacity {
            self.queue.pop_front();
        }
        self.queue.push_back(notice);
    }

    /// Shorthand for reporting any error chain under a title.
    pub fn report(&mut self, title: &str, err: &dyn fmt::Display) {
        self.push(Notice::new(title, err.to_string()));
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn drain(&mut self) -> impl Iterator<Item = Notice> + '_ {
        self.queue.drain(..)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drains_in_arrival_order() {
        let mut n = Notifications::default();
        n.push(Notice::new("Import Error", "bad header"));
        n.push(Notice::new("GPU Error", "out of memory"));
        let got: Vec<_> = n.drain().map(|x| x.title).collect();
        assert_eq!(got, vec!["Import Error", "GPU Error"]);
        assert!(n.is_empty());
    }

    #[test]
    fn drops_oldest_when_full() {
        let mut n = Notifications::with_capacity(2);
        for i in 0..3 {
            n.push(Notice::new(format!("t{i}"), "m"));
        }
        assert_eq!(n.len(), 2);
        let got: Vec<_> = n.drain().map(|x| x.title).collect();
        assert_eq!(got, vec!["t1", "t2"]);
    }

    #[test]
    fn report_uses_display_text() {
        let mut n = Notifications::default();
        n.report("Import Error", &"file not found");
        let notice = n.drain().next().unwrap();
        assert_eq!(notice.to_string(), "Import Error: file not found");
    }
}
