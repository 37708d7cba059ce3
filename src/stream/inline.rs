//! Inline thinking-tag handling (`<think>...</think>` inside plain text).

/// Result of splitting a string into answer text and thinking text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InlineSplit {
    pub text: String,
    pub thinking: String,
}

/// A configured opening/closing tag pair.
#[derive(Debug, Clone)]
pub struct ThinkTags {
    open: String,
    close: String,
}

impl Default for ThinkTags {
    fn default() -> Self {
        Self::new(
            crate::config::DEFAULT_THINK_OPEN_TAG,
            crate::config::DEFAULT_THINK_CLOSE_TAG,
        )
    }
}

impl ThinkTags {
    pub fn new(open: impl Into<String>, close: impl Into<String>) -> Self {
        Self {
            open: open.into(),
            close: close.into(),
        }
    }

    pub fn open(&self) -> &str {
        &self.open
    }

    pub fn close(&self) -> &str {
        &self.close
    }

    pub fn has_open(&self, text: &str) -> bool {
        text.contains(&self.open)
    }

    pub fn has_close(&self, text: &str) -> bool {
        text.contains(&self.close)
    }

    /// Both an opening tag and a closing tag after it.
    pub fn has_pair(&self, text: &str) -> bool {
        text.find(&self.open)
            .is_some_and(|start| text[start + self.open.len()..].contains(&self.close))
    }

    /// Remove tag markers, leaving the content between them.
    pub fn strip_markers(&self, text: &str) -> String {
        text.replace(&self.open, "").replace(&self.close, "")
    }

    /// Demultiplex text and thinking spans, scanning left to right.
    ///
    /// An unterminated opening tag turns everything after it into thinking.
    /// Multiple thinking spans are joined with a newline; both halves are trimmed.
    pub fn split(&self, input: &str) -> InlineSplit {
        let mut text = String::new();
        let mut spans: Vec<&str> = Vec::new();
        let mut rest = input;

        loop {
            let Some(start) = rest.find(&self.open) else {
                text.push_str(rest);
                break;
            };
            text.push_str(&rest[..start]);
            let after_open = &rest[start + self.open.len()..];
            match after_open.find(&self.close) {
                Some(end) => {
                    spans.push(&after_open[..end]);
                    rest = &after_open[end + self.close.len()..];
                }
                None => {
                    spans.push(after_open);
                    break;
                }
            }
        }

        InlineSplit {
            text: text.trim().to_string(),
            thinking: spans
                .iter()
                .map(|span| span.trim())
                .filter(|span| !span.is_empty())
                .collect::<Vec<_>>()
                .join("\n")
                .trim()
                .to_string(),
        }
    }

    /// Split a chunk that closes a thinking span opened by an earlier chunk.
    pub fn split_continuation(&self, input: &str) -> InlineSplit {
        self.split(&format!("{}{}", self.open, input))
    }
}
