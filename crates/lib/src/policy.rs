//! Topic filter and reply post-processing.

/// Admits a message when it mentions at least one keyword.
#[derive(Debug, Clone)]
pub struct TopicFilter {
    keywords: Vec<String>,
}

impl TopicFilter {
    /// Blank keywords are dropped. ASCII letters match case-insensitively; other text matches exactly.
    pub fn new(keywords: &[String]) -> Self {
        Self {
            keywords: keywords
                .iter()
                .map(|k| k.trim().to_ascii_lowercase())
                .filter(|k| !k.is_empty())
                .collect(),
        }
    }

    /// True when the text contains any keyword, or when there are no keywords at all.
    pub fn is_on_topic(&self, text: &str) -> bool {
        if self.keywords.is_empty() {
            return true;
        }
        let text = text.to_ascii_lowercase();
        self.keywords.iter().any(|k| text.contains(k.as_str()))
    }
}

const ELLIPSIS: char = '…';

/// Trim the model's answer and cap it at `max_chars` characters (not bytes, at least one).
/// Returns None when nothing is left to send.
pub fn finalize_reply(raw: &str, max_chars: usize) -> Option<String> {
    let text = raw.trim();
    if text.is_empty() {
        return None;
    }
    let max_chars = max_chars.max(1);
    if text.chars().count() <= max_chars {
        return Some(text.to_string());
    }
    let mut out: String = text.chars().take(max_chars - 1).collect();
    out.truncate(out.trim_end().len());
    out.push(ELLIPSIS);
    Some(out)
}
