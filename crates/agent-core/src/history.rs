//! Bounded history windows.

use serde::{Deserialize, Serialize};

/// A single prompt entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatEntry {
    /// "system", "user" or "assistant".
    pub role: String,
    pub content: String,
}

impl ChatEntry {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// The bounded window handed to an agent: one system preamble plus at most
/// `max_entries` of the most recent non-system conversation entries, oldest
/// first. Total length never exceeds `max_entries + 1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Window {
    entries: Vec<ChatEntry>,
}

impl Window {
    /// Build a window from the preamble and the conversation tail.
    ///
    /// `conversation` is expected oldest-first; only its trailing
    /// `max_entries` non-system entries are kept. System entries inside the
    /// conversation are dropped — the preamble is the single system entry.
    pub fn build(
        preamble: impl Into<String>,
        conversation: &[ChatEntry],
        max_entries: usize,
    ) -> Self {
        let tail: Vec<ChatEntry> = conversation
            .iter()
            .filter(|e| e.role != "system")
            .cloned()
            .collect();
        let start = tail.len().saturating_sub(max_entries);

        let mut entries = Vec::with_capacity(max_entries + 1);
        entries.push(ChatEntry::system(preamble));
        entries.extend_from_slice(&tail[start..]);

        Self { entries }
    }

    /// The entries in prompt order.
    pub fn entries(&self) -> &[ChatEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_caps_at_n_plus_one() {
        let conversation: Vec<ChatEntry> = (0..20)
            .map(|i| {
                if i % 2 == 0 {
                    ChatEntry::user(format!("u{i}"))
                } else {
                    ChatEntry::assistant(format!("a{i}"))
                }
            })
            .collect();

        let window = Window::build("preamble", &conversation, 10);
        assert_eq!(window.len(), 11);
        assert_eq!(window.entries()[0].role, "system");
        assert_eq!(window.entries()[1].content, "u10");
        assert_eq!(window.entries()[10].content, "a19");
    }

    #[test]
    fn embedded_system_entries_are_dropped() {
        let conversation = vec![
            ChatEntry::user("hi"),
            ChatEntry::system("stray"),
            ChatEntry::assistant("hello"),
        ];
        let window = Window::build("preamble", &conversation, 10);
        assert_eq!(window.len(), 3);
        assert!(window.entries()[1..].iter().all(|e| e.role != "system"));
    }

    #[test]
    fn short_conversations_fit_whole() {
        let conversation = vec![ChatEntry::user("hi")];
        let window = Window::build("preamble", &conversation, 10);
        assert_eq!(window.len(), 2);
    }
}
