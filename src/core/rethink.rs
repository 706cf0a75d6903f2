//! Pure text rewrites applied to turns before they enter history.

use std::sync::Arc;

use regex::Regex;

use crate::core::assembler::DelimiterTag;
use crate::core::constants::RE2_TEMPLATE;
use crate::core::error::ConfigError;

/// A pure text transformation injected into [`ConversationState`].
///
/// [`ConversationState`]: crate::core::conversation::ConversationState
pub type Rewrite = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// Pattern-based rewrite of assistant text, used so reasoning markers that
/// slipped into the visible answer are not fed back to the model.
#[derive(Debug, Clone)]
pub struct RethinkRewrite {
    pattern: Regex,
    replacement: String,
}

impl RethinkRewrite {
    pub fn new(pattern: &str, replacement: impl Into<String>) -> Result<Self, ConfigError> {
        Ok(Self {
            pattern: Regex::new(pattern)?,
            replacement: replacement.into(),
        })
    }

    /// Removes whole `<tag>...</tag>` regions plus the whitespace after them.
    pub fn strip_tag(tag: &DelimiterTag) -> Result<Self, ConfigError> {
        let pattern = format!(
            r"(?s){}.*?{}\s*",
            regex::escape(tag.open()),
            regex::escape(tag.close())
        );
        Self::new(&pattern, "")
    }

    pub fn apply(&self, text: &str) -> String {
        self.pattern
            .replace_all(text, self.replacement.as_str())
            .into_owned()
    }

    pub fn into_rewrite(self) -> Rewrite {
        Arc::new(move |text: &str| self.apply(text))
    }
}

/// Re-reading prompt: the question is repeated so the model reads it twice.
pub fn re_read(prompt: &str) -> String {
    RE2_TEMPLATE.replace("{message}", prompt)
}

pub fn re_read_rewrite() -> Rewrite {
    Arc::new(re_read)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_tag_removes_regions_and_trailing_space() {
        let rewrite = RethinkRewrite::strip_tag(&DelimiterTag::default()).expect("valid");
        assert_eq!(
            rewrite.apply("<think>plan\nmore</think>\n\nAnswer <think>x</think> here"),
            "Answer here"
        );
        assert_eq!(rewrite.apply("no markers"), "no markers");
    }

    #[test]
    fn strip_tag_escapes_tag_names() {
        let rewrite = RethinkRewrite::strip_tag(&DelimiterTag::new("a.b")).expect("valid");
        assert_eq!(rewrite.apply("<a.b>x</a.b>y<aXb>z</aXb>"), "y<aXb>z</aXb>");
    }

    #[test]
    fn custom_pattern_with_captures() {
        let rewrite = RethinkRewrite::new(r"(?m)^Reasoning: (.*)$", "[$1]").expect("valid");
        assert_eq!(rewrite.apply("Reasoning: because\nDone"), "[because]\nDone");
    }

    #[test]
    fn malformed_pattern_is_a_configuration_error() {
        let err = RethinkRewrite::new("(unclosed", "").expect_err("should fail");
        assert!(matches!(err, ConfigError::RethinkPattern(_)));
    }

    #[test]
    fn re_read_states_question_twice() {
        assert_eq!(re_read("Why?"), "Why?\nRead the question again:\nWhy?");
        let rewrite = re_read_rewrite();
        assert_eq!(rewrite("a"), "a\nRead the question again:\na");
    }
}
