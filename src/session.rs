//! The interactive turn loop.
//!
//! The loop itself is ordinary blocking code: it reads a line, then blocks on the chain's
//! turn to completion before reading the next one. Only one turn is ever in flight.

use std::io::Write;

use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tokio::runtime::Runtime;
use tracing::debug;

use crate::callbacks::CallbackHandler;
use crate::chain::ConversationChain;
use crate::error::{Error, Result};
use crate::interrupt::Interrupt;
use crate::llm::ChatModel;
use crate::memory::Memory;
use crate::render::{Color, Printer, paint};

/// What a [`LineSource`] produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Line {
    /// A line of text, without its line terminator.
    Text(String),
    /// The user pressed Ctrl-C.
    Interrupted,
    /// Input is exhausted.
    Eof,
}

/// Where the loop reads user input from.
pub trait LineSource {
    fn read_line(&mut self, prompt: &str) -> Result<Line>;
}

impl LineSource for DefaultEditor {
    fn read_line(&mut self, prompt: &str) -> Result<Line> {
        match self.readline(prompt) {
            Ok(line) => {
                if !line.trim().is_empty() {
                    let _ = self.add_history_entry(line.as_str());
                }
                Ok(Line::Text(line))
            }
            Err(ReadlineError::Interrupted) => Ok(Line::Interrupted),
            Err(ReadlineError::Eof) => Ok(Line::Eof),
            Err(err) => Err(err.into()),
        }
    }
}

/// The states of the turn loop.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TurnState {
    AwaitingInput,
    Submitting,
    StreamingResponse,
    Interrupted,
}

/// How the loop ended.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum LoopExit {
    /// The user ended the conversation; the farewell has been printed.
    Interrupted,
}

/// Drives a [`ConversationChain`] from a [`LineSource`].
pub struct TurnLoop<M: Memory, L: ChatModel, H: CallbackHandler, W: Write> {
    chain: ConversationChain<M, L>,
    handler: H,
    printer: Printer<W>,
    interrupt: Interrupt,
    state: TurnState,
    turns: u64,
}

impl<M: Memory, L: ChatModel, H: CallbackHandler, W: Write> TurnLoop<M, L, H, W> {
    pub fn new(chain: ConversationChain<M, L>, handler: H, printer: Printer<W>) -> Self {
        Self {
            chain,
            handler,
            printer,
            interrupt: Interrupt::new(),
            state: TurnState::AwaitingInput,
            turns: 0,
        }
    }

    /// Ends the loop when `interrupt` is raised, including in the middle of a turn.
    pub fn with_interrupt(mut self, interrupt: Interrupt) -> Self {
        self.interrupt = interrupt;
        self
    }

    pub fn state(&self) -> TurnState {
        self.state
    }

    /// Number of turns submitted so far.
    pub fn turns(&self) -> u64 {
        self.turns
    }

    pub fn chain(&self) -> &ConversationChain<M, L> {
        &self.chain
    }

    /// Consumes the loop, returning its parts.
    pub fn into_parts(self) -> (ConversationChain<M, L>, H, Printer<W>) {
        (self.chain, self.handler, self.printer)
    }

    /// Run until the user interrupts.
    ///
    /// Ctrl-C at the prompt, end of input, or an interrupt raised during a turn all end the
    /// loop with the farewell. An interrupt that lands after a turn has finished ends the loop
    /// before the next prompt. Any other error is returned without the farewell.
    pub fn run(&mut self, runtime: &Runtime, source: &mut dyn LineSource) -> Result<LoopExit> {
        let prompt = paint("", Color::Green, self.printer.use_color());
        loop {
            self.state = TurnState::AwaitingInput;
            if self.interrupt.take() {
                return self.say_farewell();
            }
            let line = match source.read_line(&prompt)? {
                Line::Text(line) => line,
                Line::Interrupted | Line::Eof => return self.say_farewell(),
            };
            match self.submit(runtime, &line) {
                Ok(()) => {}
                Err(err) if err.is_abort() => {
                    debug!("turn interrupted");
                    return self.say_farewell();
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Submit one line. Empty lines are skipped without calling the chain.
    ///
    /// The turn races the interrupt; an interrupted turn is dropped wherever it is and
    /// returns [`Error::Abort`](crate::Error::Abort).
    pub fn submit(&mut self, runtime: &Runtime, line: &str) -> Result<()> {
        let input = line.trim_end_matches(['\r', '\n']);
        if input.is_empty() {
            self.state = TurnState::AwaitingInput;
            return Ok(());
        }
        if self.interrupt.take() {
            return Err(Error::abort("interrupted before submitting"));
        }
        self.state = TurnState::Submitting;
        self.turns += 1;
        debug!(turn = self.turns, "submitting turn");
        self.state = TurnState::StreamingResponse;
        let chain = &mut self.chain;
        let handler = &mut self.handler;
        let response = runtime.block_on(self.interrupt.race(chain.run(input, handler)))?;
        // The response has already streamed; print it again in full.
        self.printer.println(&response, Color::Green)?;
        self.state = TurnState::AwaitingInput;
        Ok(())
    }

    fn say_farewell(&mut self) -> Result<LoopExit> {
        self.state = TurnState::Interrupted;
        self.printer.farewell()?;
        Ok(LoopExit::Interrupted)
    }
}
