use crate::config::ConfigHandle;

/// Case-insensitive keyword gate
///
/// The keyword set is read from the configuration handle on every call, so
/// edits made while the process runs apply to the next message.
#[derive(Debug, Clone)]
pub struct KeywordFilter {
    config: ConfigHandle,
}

impl KeywordFilter {
    /// Filter reading its keywords from `config`
    pub fn new(config: ConfigHandle) -> Self {
        Self { config }
    }

    /// True if any configured keyword occurs in `text`
    #[must_use]
    pub fn matches(&self, text: &str) -> bool {
        self.matched_keyword(text).is_some()
    }

    /// First configured keyword that occurs in `text`
    #[must_use]
    pub fn matched_keyword(&self, text: &str) -> Option<String> {
        let haystack = text.to_lowercase();
        self.config
            .keywords()
            .into_iter()
            .map(|keyword| keyword.trim().to_string())
            .find(|keyword| !keyword.is_empty() && haystack.contains(&keyword.to_lowercase()))
    }
}
