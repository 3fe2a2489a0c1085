const COMBINING_DOT_ABOVE: char = '\u{307}';

/// Keyword heuristic deciding whether a message is on topic.
#[derive(Debug, Clone)]
pub struct TopicClassifier {
    keywords: Vec<String>,
}

impl TopicClassifier {
    #[must_use]
    pub fn new<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut keywords: Vec<String> = keywords
            .into_iter()
            .map(|keyword| normalize(keyword.as_ref()))
            .filter(|keyword| !keyword.is_empty())
            .collect();
        keywords.sort();
        keywords.dedup();
        Self { keywords }
    }

    /// An empty keyword set accepts every message.
    #[must_use]
    pub fn is_in_domain(&self, text: &str) -> bool {
        if self.keywords.is_empty() {
            return true;
        }
        let text = normalize(text);
        self.keywords
            .iter()
            .any(|keyword| text.contains(keyword.as_str()))
    }

    #[must_use]
    pub fn keyword_count(&self) -> usize {
        self.keywords.len()
    }
}

/// Lowercases and folds the Turkish dotted/dotless `i` so `ARI`, `Arı` and
/// `arı` compare equal, then collapses whitespace runs.
fn normalize(text: &str) -> String {
    let folded: String = text
        .to_lowercase()
        .chars()
        .filter(|ch| *ch != COMBINING_DOT_ABOVE)
        .map(|ch| if ch == 'ı' { 'i' } else { ch })
        .collect();
    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}
