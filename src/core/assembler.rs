//! Delimiter-aware reassembly of streamed completion text.
//!
//! Models that "think out loud" wrap their reasoning in a tag such as
//! `<think>...</think>`. Fragments arrive from the transport cut at arbitrary
//! byte positions, so a marker can straddle any number of fragments. The
//! [`ChunkAssembler`] holds back only the shortest suffix that could still
//! grow into the marker it is waiting for and classifies everything else as
//! soon as it arrives.
//!
//! Output is coalesced per polarity: an event is released once at least
//! `min_chunk_size` characters are ready, when the polarity is about to flip,
//! or at end of stream. Coalescing changes how many events are produced, never
//! the text they carry.

use std::collections::vec_deque::Drain;
use std::collections::VecDeque;

use crate::core::constants::DEFAULT_COT_TAG;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassifiedEvent {
    Visible(String),
    Thought(String),
}

impl ClassifiedEvent {
    pub fn text(&self) -> &str {
        match self {
            ClassifiedEvent::Visible(text) | ClassifiedEvent::Thought(text) => text,
        }
    }

    pub fn is_thought(&self) -> bool {
        matches!(self, ClassifiedEvent::Thought(_))
    }

    fn new(polarity: Polarity, text: String) -> Self {
        match polarity {
            Polarity::Visible => ClassifiedEvent::Visible(text),
            Polarity::Thought => ClassifiedEvent::Thought(text),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Polarity {
    Visible,
    Thought,
}

/// Opening and closing markers derived from a tag name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelimiterTag {
    open: String,
    close: String,
}

impl DelimiterTag {
    pub fn new(name: &str) -> Self {
        Self {
            open: format!("<{name}>"),
            close: format!("</{name}>"),
        }
    }

    pub fn open(&self) -> &str {
        &self.open
    }

    pub fn close(&self) -> &str {
        &self.close
    }
}

impl Default for DelimiterTag {
    fn default() -> Self {
        Self::new(DEFAULT_COT_TAG)
    }
}

#[derive(Debug)]
pub struct ChunkAssembler {
    tag: Option<DelimiterTag>,
    min_chunk_size: usize,
    mode: Polarity,
    /// Text that may be the beginning of the marker for the current mode.
    pending: String,
    ready: String,
    ready_chars: usize,
    ready_polarity: Polarity,
    out: VecDeque<ClassifiedEvent>,
}

impl ChunkAssembler {
    /// Builds an assembler; `None` disables thought detection entirely and
    /// every fragment is classified as visible.
    pub fn new(tag: Option<DelimiterTag>, min_chunk_size: usize) -> Self {
        Self {
            tag,
            min_chunk_size,
            mode: Polarity::Visible,
            pending: String::new(),
            ready: String::new(),
            ready_chars: 0,
            ready_polarity: Polarity::Visible,
            out: VecDeque::new(),
        }
    }

    /// True while the stream is inside an unterminated thought region.
    pub fn in_thought(&self) -> bool {
        self.mode == Polarity::Thought
    }

    /// Feeds one fragment and drains whatever became classifiable.
    pub fn push(&mut self, fragment: &str) -> Drain<'_, ClassifiedEvent> {
        if !fragment.is_empty() {
            self.pending.push_str(fragment);
            self.scan();
        }
        self.out.drain(..)
    }

    /// Releases coalesced output early without touching a held-back marker
    /// prefix. Used when an out-of-band event must be ordered after it.
    pub fn flush_ready(&mut self) -> Drain<'_, ClassifiedEvent> {
        self.release();
        self.out.drain(..)
    }

    /// Ends the stream: held-back text is emitted literally with the current
    /// polarity, even when it looks like a partial marker.
    pub fn finish(mut self) -> Vec<ClassifiedEvent> {
        let rest = std::mem::take(&mut self.pending);
        self.emit(self.mode, &rest);
        self.release();
        self.out.into_iter().collect()
    }

    fn scan(&mut self) {
        let Some(tag) = self.tag.as_ref() else {
            let text = std::mem::take(&mut self.pending);
            self.emit(Polarity::Visible, &text);
            return;
        };
        let (open, close) = (tag.open.clone(), tag.close.clone());

        loop {
            let marker = match self.mode {
                Polarity::Visible => open.as_str(),
                Polarity::Thought => close.as_str(),
            };

            if let Some(index) = self.pending.find(marker) {
                let remainder = self.pending.split_off(index + marker.len());
                let before = std::mem::replace(&mut self.pending, remainder);
                self.emit(self.mode, &before[..index]);
                self.release();
                self.mode = match self.mode {
                    Polarity::Visible => Polarity::Thought,
                    Polarity::Thought => Polarity::Visible,
                };
                continue;
            }

            let held = partial_marker_suffix(&self.pending, marker);
            let keep = self.pending.split_off(self.pending.len() - held);
            let text = std::mem::replace(&mut self.pending, keep);
            self.emit(self.mode, &text);
            return;
        }
    }

    fn emit(&mut self, polarity: Polarity, text: &str) {
        if text.is_empty() {
            return;
        }
        if polarity != self.ready_polarity {
            self.release();
            self.ready_polarity = polarity;
        }
        self.ready.push_str(text);
        self.ready_chars += text.chars().count();
        if self.ready_chars >= self.min_chunk_size {
            self.release();
        }
    }

    fn release(&mut self) {
        if self.ready.is_empty() {
            return;
        }
        let text = std::mem::take(&mut self.ready);
        self.ready_chars = 0;
        self.out
            .push_back(ClassifiedEvent::new(self.ready_polarity, text));
    }
}

/// Length in bytes of the longest suffix of `text` that is a non-empty proper
/// prefix of `marker`.
fn partial_marker_suffix(text: &str, marker: &str) -> usize {
    let longest = text.len().min(marker.len().saturating_sub(1));
    (1..=longest)
        .rev()
        .find(|&len| {
            let start = text.len() - len;
            text.is_char_boundary(start) && marker.starts_with(&text[start..])
        })
        .unwrap_or(0)
}

/// Concatenates adjacent events of the same polarity.
pub fn coalesce(events: &[ClassifiedEvent]) -> Vec<ClassifiedEvent> {
    let mut merged: Vec<ClassifiedEvent> = Vec::new();
    for event in events {
        match (merged.last_mut(), event) {
            (Some(ClassifiedEvent::Visible(acc)), ClassifiedEvent::Visible(text))
            | (Some(ClassifiedEvent::Thought(acc)), ClassifiedEvent::Thought(text)) => {
                acc.push_str(text)
            }
            _ => merged.push(event.clone()),
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(fragments: &[&str], min_chunk_size: usize) -> Vec<ClassifiedEvent> {
        let mut assembler = ChunkAssembler::new(Some(DelimiterTag::default()), min_chunk_size);
        let mut events = Vec::new();
        for fragment in fragments {
            events.extend(assembler.push(fragment));
        }
        events.extend(assembler.finish());
        events
    }

    fn texts(events: &[ClassifiedEvent], thought: bool) -> String {
        events
            .iter()
            .filter(|event| event.is_thought() == thought)
            .map(ClassifiedEvent::text)
            .collect()
    }

    fn visible(text: &str) -> ClassifiedEvent {
        ClassifiedEvent::Visible(text.to_string())
    }

    fn thought(text: &str) -> ClassifiedEvent {
        ClassifiedEvent::Thought(text.to_string())
    }

    #[test]
    fn marker_split_across_fragments() {
        let events = run(&["Hel", "lo <thi", "nk>reasoning</thin", "k> world"], 10);
        assert_eq!(
            coalesce(&events),
            vec![visible("Hello "), thought("reasoning"), visible(" world")]
        );
    }

    #[test]
    fn unterminated_thought_is_flushed_at_end() {
        let events = run(&["<think>unterminated"], 10);
        assert_eq!(events, vec![thought("unterminated")]);
    }

    #[test]
    fn opening_marker_that_never_arrives_stays_visible() {
        let events = run(&["plain ", "answer <th"], 0);
        assert_eq!(coalesce(&events), vec![visible("plain answer <th")]);
    }

    #[test]
    fn held_back_prefix_that_does_not_complete_is_rescanned() {
        let mut assembler = ChunkAssembler::new(Some(DelimiterTag::default()), 0);
        let first: Vec<_> = assembler.push("a <thin").collect();
        assert_eq!(first, vec![visible("a ")]);

        let second: Vec<_> = assembler.push("g> b").collect();
        assert_eq!(second, vec![visible("<thing> b")]);
        assert!(assembler.finish().is_empty());
    }

    #[test]
    fn held_back_prefix_can_restart_the_marker() {
        // "<<think>" must not swallow the first '<'.
        let events = run(&["x<", "<think>y</think>"], 0);
        assert_eq!(coalesce(&events), vec![visible("x<"), thought("y")]);
    }

    #[test]
    fn empty_fragments_are_ignored() {
        let events = run(&["", "<think>", "", "a", "", "</think>", "", "b", ""], 0);
        assert_eq!(events, vec![thought("a"), visible("b")]);
    }

    #[test]
    fn empty_thought_region_does_not_disturb_classification() {
        let events = run(&["before<think></think>after<think>t</think>"], 0);
        assert_eq!(
            coalesce(&events),
            vec![visible("beforeafter"), thought("t")]
        );
    }

    #[test]
    fn nested_open_marker_inside_thought_is_literal() {
        let events = run(&["<think>a<think>b</think>c"], 0);
        assert_eq!(coalesce(&events), vec![thought("a<think>b"), visible("c")]);
    }

    #[test]
    fn stray_close_marker_outside_thought_is_literal() {
        let events = run(&["a</think>b"], 0);
        assert_eq!(coalesce(&events), vec![visible("a</think>b")]);
    }

    #[test]
    fn unterminated_marker_prefix_inside_thought_is_emitted_literally() {
        let events = run(&["<think>abc</thi"], 0);
        assert_eq!(coalesce(&events), vec![thought("abc</thi")]);
    }

    #[test]
    fn one_fragment_with_many_transitions() {
        let events = run(&["a<think>b</think>c<think>d</think>e"], 0);
        assert_eq!(
            events,
            vec![
                visible("a"),
                thought("b"),
                visible("c"),
                thought("d"),
                visible("e")
            ]
        );
    }

    #[test]
    fn coalescing_releases_at_threshold() {
        let events = run(&["ab", "cd", "ef", "gh"], 4);
        assert_eq!(events, vec![visible("abcd"), visible("efgh")]);

        let events = run(&["ab", "cd", "e"], 4);
        assert_eq!(events, vec![visible("abcd"), visible("e")]);
    }

    #[test]
    fn threshold_counts_characters_not_bytes() {
        let mut assembler = ChunkAssembler::new(None, 3);
        assert_eq!(assembler.push("éé").count(), 0);
        assert_eq!(assembler.push("é").collect::<Vec<_>>(), vec![visible("ééé")]);
    }

    #[test]
    fn disabled_tag_classifies_everything_as_visible() {
        let mut assembler = ChunkAssembler::new(None, 0);
        let events: Vec<_> = assembler.push("<think>x</think>").collect();
        assert_eq!(events, vec![visible("<think>x</think>")]);
    }

    #[test]
    fn custom_tag_and_multibyte_marker() {
        let mut assembler = ChunkAssembler::new(Some(DelimiterTag::new("思考")), 0);
        let mut events = Vec::new();
        for fragment in ["前<思", "考>内", "容</思", "考>後"] {
            events.extend(assembler.push(fragment));
        }
        events.extend(assembler.finish());
        assert_eq!(
            coalesce(&events),
            vec![visible("前"), thought("内容"), visible("後")]
        );
    }

    #[test]
    fn flush_ready_keeps_partial_marker() {
        let mut assembler = ChunkAssembler::new(Some(DelimiterTag::default()), 100);
        assert_eq!(assembler.push("hello <th").count(), 0);
        let flushed: Vec<_> = assembler.flush_ready().collect();
        assert_eq!(flushed, vec![visible("hello ")]);
        let rest: Vec<_> = assembler.push("ink>x").collect();
        assert!(rest.is_empty());
        assert!(assembler.in_thought());
        assert_eq!(assembler.finish(), vec![thought("x")]);
    }

    fn splits(text: &str, cuts: &[usize]) -> Vec<String> {
        let mut pieces = Vec::new();
        let mut start = 0;
        for &cut in cuts {
            pieces.push(text[start..cut].to_string());
            start = cut;
        }
        pieces.push(text[start..].to_string());
        pieces
    }

    #[test]
    fn any_split_preserves_both_channels_and_all_text() {
        let source = "Hi <think>step one</think> done";
        let expected_visible = "Hi  done";
        let expected_thought = "step one";

        for a in 0..=source.len() {
            for b in a..=source.len() {
                let pieces = splits(source, &[a, b]);
                let refs: Vec<&str> = pieces.iter().map(String::as_str).collect();
                for min_chunk_size in [0, 3, 64] {
                    let events = run(&refs, min_chunk_size);
                    assert_eq!(texts(&events, false), expected_visible, "cuts {a},{b}");
                    assert_eq!(texts(&events, true), expected_thought, "cuts {a},{b}");
                }
            }
        }
    }

    #[test]
    fn single_character_fragments_match_whole_input() {
        let source = "x<think>a</thin</think>y<th";
        let chars: Vec<String> = source.chars().map(String::from).collect();
        let refs: Vec<&str> = chars.iter().map(String::as_str).collect();

        let whole = coalesce(&run(&[source], 0));
        assert_eq!(whole, vec![visible("x"), thought("a</thin"), visible("y<th")]);
        for min_chunk_size in [0, 1, 5, 1000] {
            assert_eq!(coalesce(&run(&refs, min_chunk_size)), whole);
        }
    }

    #[test]
    fn unterminated_input_loses_nothing() {
        let fragments = ["a<thi", "nk>b<", "/th"];
        let events = run(&fragments, 2);
        let all: String = events.iter().map(ClassifiedEvent::text).collect();
        assert_eq!(all, "ab</th");
        assert_eq!(coalesce(&events), vec![visible("a"), thought("b</th")]);
    }

    #[test]
    fn partial_suffix_detection() {
        assert_eq!(partial_marker_suffix("abc<th", "<think>"), 3);
        assert_eq!(partial_marker_suffix("abc<think", "<think>"), 6);
        assert_eq!(partial_marker_suffix("abc", "<think>"), 0);
        assert_eq!(partial_marker_suffix("", "<think>"), 0);
        assert_eq!(partial_marker_suffix("<", "<"), 0);
    }
}
