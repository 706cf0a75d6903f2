//! Terminal renderers for classified events.
//!
//! Visible text goes to the answer writer (stdout in practice) and thought
//! text to a separate chain-of-thought writer, so piping stdout captures the
//! answer alone. Which renderer is used is decided once at startup.

use std::fs::OpenOptions;
use std::io::{self, IsTerminal, Write};

use tracing::debug;

use crate::core::assembler::ClassifiedEvent;
use crate::core::session::EventSink;
use crate::ui::markdown::render_ansi;

/// ANSI escape code for dim text (used for thinking blocks).
const ANSI_DIM: &str = "\x1b[2m";

/// ANSI escape code for italic text (used for thinking blocks).
const ANSI_ITALIC: &str = "\x1b[3m";

/// ANSI escape code to reset all styling.
const ANSI_RESET: &str = "\x1b[0m";

/// ANSI escape code for cyan text (used for tool names).
const ANSI_CYAN: &str = "\x1b[36m";

pub type BoxWriter = Box<dyn Write + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RenderFormat {
    #[default]
    Plain,
    Markdown,
}

/// An [`EventSink`] that also carries chat-level notices.
pub trait Renderer: EventSink {
    /// Status lines such as tool results; never part of the answer stream.
    fn notice(&mut self, text: &str) -> io::Result<()>;

    fn as_sink(&mut self) -> &mut dyn EventSink;
}

/// Opens the chain-of-thought target. A bare number is taken as a file
/// descriptor; anything that cannot be opened falls back to stderr.
pub fn open_cot_writer(target: &str) -> (BoxWriter, bool) {
    let path = if !target.is_empty() && target.chars().all(|c| c.is_ascii_digit()) {
        format!("/dev/fd/{target}")
    } else {
        target.to_string()
    };

    match OpenOptions::new().append(true).open(&path) {
        Ok(file) => {
            let styled = file.is_terminal();
            (Box::new(file), styled)
        }
        Err(e) => {
            debug!(path = %path, error = %e, "chain-of-thought target unavailable, using stderr");
            let stderr = io::stderr();
            let styled = stderr.is_terminal();
            (Box::new(stderr), styled)
        }
    }
}

/// Writes thought text, keeping the dim/italic style open across events.
struct ThoughtWriter {
    out: BoxWriter,
    styled: bool,
    open: bool,
}

impl ThoughtWriter {
    fn write(&mut self, text: &str) -> io::Result<()> {
        if !self.open {
            self.open = true;
            if self.styled {
                write!(self.out, "{ANSI_DIM}{ANSI_ITALIC}")?;
            }
        }
        self.out.write_all(text.as_bytes())?;
        self.out.flush()
    }

    fn close(&mut self) -> io::Result<()> {
        if !self.open {
            return Ok(());
        }
        self.open = false;
        if self.styled {
            write!(self.out, "{ANSI_RESET}")?;
        }
        writeln!(self.out)?;
        self.out.flush()
    }

    fn notice(&mut self, text: &str) -> io::Result<()> {
        self.close()?;
        if self.styled {
            writeln!(self.out, "{ANSI_CYAN}{text}{ANSI_RESET}")?;
        } else {
            writeln!(self.out, "{text}")?;
        }
        self.out.flush()
    }
}

/// Streams visible text as it arrives.
pub struct PlainRenderer {
    out: BoxWriter,
    thoughts: ThoughtWriter,
    ends_with_newline: bool,
}

impl PlainRenderer {
    pub fn new(out: BoxWriter, cot: BoxWriter, styled: bool) -> Self {
        Self {
            out,
            thoughts: ThoughtWriter {
                out: cot,
                styled,
                open: false,
            },
            ends_with_newline: true,
        }
    }
}

impl EventSink for PlainRenderer {
    fn handle(&mut self, event: &ClassifiedEvent) -> io::Result<()> {
        match event {
            ClassifiedEvent::Thought(text) => self.thoughts.write(text),
            ClassifiedEvent::Visible(text) => {
                self.thoughts.close()?;
                if text.is_empty() {
                    return Ok(());
                }
                self.out.write_all(text.as_bytes())?;
                self.ends_with_newline = text.ends_with('\n');
                self.out.flush()
            }
        }
    }

    fn tool_call(&mut self, name: &str) -> io::Result<()> {
        self.thoughts.notice(&format!("🔧 {name}"))
    }

    fn finish(&mut self) -> io::Result<()> {
        self.thoughts.close()?;
        if !self.ends_with_newline {
            writeln!(self.out)?;
            self.ends_with_newline = true;
        }
        self.out.flush()
    }
}

impl Renderer for PlainRenderer {
    fn notice(&mut self, text: &str) -> io::Result<()> {
        self.thoughts.notice(text)
    }

    fn as_sink(&mut self) -> &mut dyn EventSink {
        self
    }
}

/// Buffers the visible answer and renders it as markdown when the
/// response ends. Thought text still streams live.
pub struct MarkdownRenderer {
    out: BoxWriter,
    thoughts: ThoughtWriter,
    buffer: String,
}

impl MarkdownRenderer {
    pub fn new(out: BoxWriter, cot: BoxWriter, styled: bool) -> Self {
        Self {
            out,
            thoughts: ThoughtWriter {
                out: cot,
                styled,
                open: false,
            },
            buffer: String::new(),
        }
    }
}

impl EventSink for MarkdownRenderer {
    fn handle(&mut self, event: &ClassifiedEvent) -> io::Result<()> {
        match event {
            ClassifiedEvent::Thought(text) => self.thoughts.write(text),
            ClassifiedEvent::Visible(text) => {
                self.thoughts.close()?;
                self.buffer.push_str(text);
                Ok(())
            }
        }
    }

    fn tool_call(&mut self, name: &str) -> io::Result<()> {
        self.thoughts.notice(&format!("🔧 {name}"))
    }

    fn finish(&mut self) -> io::Result<()> {
        self.thoughts.close()?;
        let text = std::mem::take(&mut self.buffer);
        if !text.trim().is_empty() {
            self.out.write_all(render_ansi(&text).as_bytes())?;
        }
        self.out.flush()
    }
}

impl Renderer for MarkdownRenderer {
    fn notice(&mut self, text: &str) -> io::Result<()> {
        self.thoughts.notice(text)
    }

    fn as_sink(&mut self) -> &mut dyn EventSink {
        self
    }
}

pub fn build_renderer(
    format: RenderFormat,
    out: BoxWriter,
    cot: BoxWriter,
    styled: bool,
) -> Box<dyn Renderer> {
    match format {
        RenderFormat::Plain => Box::new(PlainRenderer::new(out, cot, styled)),
        RenderFormat::Markdown => Box::new(MarkdownRenderer::new(out, cot, styled)),
    }
}
