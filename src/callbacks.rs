//! Lifecycle events raised while a turn runs, and the handlers that observe them.
//!
//! The chain and the model client describe what they are doing with a [`CallbackEvent`].
//! A [`CallbackHandler`] matches on the events it cares about and ignores the rest.

use std::io::{self, Stdout, Write};

use crate::Error;
use crate::interrupt::Interrupt;
use crate::render::{Color, paint};
use crate::types::ChatMessage;

/// Something that happened during a turn.
#[derive(Debug, Clone, Copy)]
pub enum CallbackEvent<'a> {
    /// A model call is about to be made with this prompt.
    LlmStart { prompt: &'a [ChatMessage] },
    /// The model produced the next fragment of its response.
    LlmNewToken(&'a str),
    /// The model call finished with the full response text.
    LlmEnd { output: &'a str },
    /// The model call failed.
    LlmError(&'a Error),
    /// A chain began processing the given input.
    ChainStart { input: &'a str },
    /// A chain finished with the given output.
    ChainEnd { output: &'a str },
    /// A chain failed.
    ChainError(&'a Error),
    /// A tool was invoked.
    ToolStart { name: &'a str, input: &'a str },
    /// A tool returned.
    ToolEnd { output: &'a str },
    /// A tool failed.
    ToolError(&'a Error),
    /// Free-form text emitted by a component.
    Text(&'a str),
    /// An agent decided on an action.
    AgentAction { tool: &'a str, input: &'a str },
    /// An agent finished.
    AgentFinish { output: &'a str },
}

/// Observes the events of a turn.
pub trait CallbackHandler: Send {
    /// Handle one event. Handlers never fail.
    fn handle(&mut self, event: CallbackEvent<'_>);

    /// Returns true if an in-flight model call should stop.
    fn should_interrupt(&self) -> bool {
        false
    }
}

/// Writes each streamed token as it arrives and ignores every other event.
pub struct StreamingStdoutHandler<W: Write + Send = Stdout> {
    out: W,
    use_color: bool,
    interrupt: Option<Interrupt>,
}

impl StreamingStdoutHandler<Stdout> {
    /// Creates a handler that prints green tokens to stdout.
    pub fn new() -> Self {
        Self::with_writer(io::stdout(), true)
    }

    /// Creates a stdout handler with the specified color setting.
    pub fn with_color(use_color: bool) -> Self {
        Self::with_writer(io::stdout(), use_color)
    }
}

impl Default for StreamingStdoutHandler<Stdout> {
    fn default() -> Self {
        Self::new()
    }
}

impl<W: Write + Send> StreamingStdoutHandler<W> {
    /// Creates a handler on any writer.
    pub fn with_writer(out: W, use_color: bool) -> Self {
        Self {
            out,
            use_color,
            interrupt: None,
        }
    }

    /// Attaches an interrupt, typically raised by a Ctrl-C handler.
    pub fn with_interrupt(mut self, interrupt: Interrupt) -> Self {
        self.interrupt = Some(interrupt);
        self
    }

    /// Consumes the handler, returning the writer.
    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write + Send> CallbackHandler for StreamingStdoutHandler<W> {
    fn handle(&mut self, event: CallbackEvent<'_>) {
        if let CallbackEvent::LlmNewToken(token) = event {
            // A closed stdout must not abort the turn.
            let _ = write!(self.out, "{}", paint(token, Color::Green, self.use_color));
            let _ = self.out.flush();
        }
    }

    fn should_interrupt(&self) -> bool {
        self.interrupt
            .as_ref()
            .is_some_and(Interrupt::is_triggered)
    }
}

/// A handler that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHandler;

impl CallbackHandler for NoopHandler {
    fn handle(&mut self, _: CallbackEvent<'_>) {}
}
