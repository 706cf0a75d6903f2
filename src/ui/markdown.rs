//! Markdown to ANSI-styled terminal text.
//!
//! Only the block and inline constructs that show up in chat answers are
//! styled; anything else degrades to its text content.

use pulldown_cmark::{CodeBlockKind, Event, HeadingLevel, Options, Parser, Tag, TagEnd};

const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";
const ITALIC: &str = "\x1b[3m";
const UNDERLINE: &str = "\x1b[4m";
const STRIKE: &str = "\x1b[9m";
const CYAN: &str = "\x1b[36m";
const YELLOW: &str = "\x1b[33m";
const BLUE: &str = "\x1b[34m";
const RESET: &str = "\x1b[0m";

#[derive(Clone, Debug)]
enum ListKind {
    Unordered,
    Ordered(u64),
}

#[derive(Default)]
struct AnsiWriter {
    out: String,
    /// Active inline styles, re-applied after every reset.
    styles: Vec<&'static str>,
    lists: Vec<ListKind>,
    quote_depth: usize,
    in_code_block: bool,
    link_urls: Vec<String>,
    at_line_start: bool,
}

impl AnsiWriter {
    fn push_style(&mut self, style: &'static str) {
        self.styles.push(style);
        self.out.push_str(style);
    }

    fn pop_style(&mut self) {
        self.styles.pop();
        self.out.push_str(RESET);
        for style in &self.styles {
            self.out.push_str(style);
        }
    }

    fn line_prefix(&mut self) {
        if !self.at_line_start {
            return;
        }
        self.at_line_start = false;
        if self.quote_depth > 0 {
            self.out.push_str(DIM);
            for _ in 0..self.quote_depth {
                self.out.push_str("│ ");
            }
            self.out.push_str(RESET);
            for style in &self.styles {
                self.out.push_str(style);
            }
        }
        if self.in_code_block {
            self.out.push_str("    ");
        }
    }

    fn text(&mut self, text: &str) {
        let mut lines = text.split('\n').peekable();
        while let Some(line) = lines.next() {
            if !line.is_empty() {
                self.line_prefix();
                self.out.push_str(line);
            }
            if lines.peek().is_some() {
                self.newline();
            }
        }
    }

    fn newline(&mut self) {
        self.out.push('\n');
        self.at_line_start = true;
    }

    fn end_block(&mut self) {
        if !self.at_line_start {
            self.newline();
        }
    }

    fn blank_line(&mut self) {
        self.end_block();
        if self.lists.is_empty() && !self.out.is_empty() && !self.out.ends_with("\n\n") {
            self.newline();
        }
    }

    fn start(&mut self, tag: Tag<'_>) {
        match tag {
            Tag::Paragraph => {}
            Tag::Heading { level, .. } => {
                self.blank_line();
                self.line_prefix();
                let marks = match level {
                    HeadingLevel::H1 => "#",
                    HeadingLevel::H2 => "##",
                    HeadingLevel::H3 => "###",
                    _ => "####",
                };
                self.push_style(BOLD);
                if level == HeadingLevel::H1 {
                    self.push_style(UNDERLINE);
                }
                self.out.push_str(marks);
                self.out.push(' ');
            }
            Tag::BlockQuote(_) => {
                self.end_block();
                self.quote_depth += 1;
            }
            Tag::CodeBlock(kind) => {
                self.blank_line();
                if let CodeBlockKind::Fenced(lang) = kind {
                    if !lang.is_empty() {
                        self.line_prefix();
                        self.out.push_str(DIM);
                        self.out.push_str(&lang);
                        self.out.push_str(RESET);
                        self.newline();
                    }
                }
                self.in_code_block = true;
                self.push_style(YELLOW);
            }
            Tag::List(start) => {
                self.end_block();
                self.lists.push(match start {
                    Some(n) => ListKind::Ordered(n),
                    None => ListKind::Unordered,
                });
            }
            Tag::Item => {
                self.end_block();
                self.line_prefix();
                let depth = self.lists.len().saturating_sub(1);
                self.out.push_str(&"  ".repeat(depth));
                match self.lists.last_mut() {
                    Some(ListKind::Ordered(n)) => {
                        self.out.push_str(&format!("{n}. "));
                        *n += 1;
                    }
                    _ => self.out.push_str("• "),
                }
            }
            Tag::Emphasis => self.push_style(ITALIC),
            Tag::Strong => self.push_style(BOLD),
            Tag::Strikethrough => self.push_style(STRIKE),
            Tag::Link { dest_url, .. } => {
                self.link_urls.push(dest_url.to_string());
                self.push_style(UNDERLINE);
                self.push_style(BLUE);
            }
            _ => {}
        }
    }

    fn end(&mut self, tag: TagEnd) {
        match tag {
            TagEnd::Paragraph => self.blank_line(),
            TagEnd::Heading(level) => {
                self.pop_style();
                if level == HeadingLevel::H1 {
                    self.pop_style();
                }
                self.blank_line();
            }
            TagEnd::BlockQuote(_) => {
                self.quote_depth = self.quote_depth.saturating_sub(1);
                self.blank_line();
            }
            TagEnd::CodeBlock => {
                self.pop_style();
                self.in_code_block = false;
                self.blank_line();
            }
            TagEnd::List(_) => {
                self.lists.pop();
                self.blank_line();
            }
            TagEnd::Item => self.end_block(),
            TagEnd::Emphasis | TagEnd::Strong | TagEnd::Strikethrough => self.pop_style(),
            TagEnd::Link => {
                self.pop_style();
                self.pop_style();
                if let Some(url) = self.link_urls.pop() {
                    self.out.push_str(&format!(" {DIM}({url}){RESET}"));
                    for style in &self.styles {
                        self.out.push_str(style);
                    }
                }
            }
            _ => {}
        }
    }
}

/// Renders a complete markdown document for an ANSI terminal.
pub fn render_ansi(markdown: &str) -> String {
    let mut writer = AnsiWriter {
        at_line_start: true,
        ..Default::default()
    };

    for event in Parser::new_ext(markdown, Options::all()) {
        match event {
            Event::Start(tag) => writer.start(tag),
            Event::End(tag) => writer.end(tag),
            Event::Text(text) => writer.text(&text),
            Event::Code(code) => {
                writer.line_prefix();
                writer.push_style(CYAN);
                writer.out.push_str(&code);
                writer.pop_style();
            }
            Event::SoftBreak => writer.text(" "),
            Event::HardBreak => writer.newline(),
            Event::Rule => {
                writer.blank_line();
                writer.line_prefix();
                writer.out.push_str(DIM);
                writer.out.push_str(&"─".repeat(40));
                writer.out.push_str(RESET);
                writer.blank_line();
            }
            Event::TaskListMarker(done) => {
                writer.out.push_str(if done { "[x] " } else { "[ ] " });
            }
            Event::Html(html) | Event::InlineHtml(html) => writer.text(&html),
            _ => {}
        }
    }

    let trimmed_len = writer.out.trim_end_matches('\n').len();
    writer.out.truncate(trimmed_len);
    writer.out.push('\n');
    writer.out
}
