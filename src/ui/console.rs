// Console controller - Bridges line input with the counter store
//
// Commands are dispatched to a CounterStore; value changes come back through
// the store's broadcast channel and are handed to the display callback.

use crate::state::{CounterChange, CounterStore};
use anyhow::{Context, Result};
use std::io::BufRead;
use std::str::FromStr;
use thiserror::Error;
use tokio::sync::broadcast::{self, error::TryRecvError};

pub const HELP: &str = "\
Commands:
  + | inc [n]   increase the counter by n (default 1)
  - | dec [n]   decrease the counter by n (default 1)
  lock          ignore increments and decrements
  unlock        accept increments and decrements again
  show          print the current value
  help          print this help
  quit          exit";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleCommand {
    Increment(i64),
    Decrement(i64),
    Lock,
    Unlock,
    Show,
    Help,
    Quit,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ParseCommandError {
    #[error("Unknown command '{0}', type 'help' for a list of commands")]
    Unknown(String),

    #[error("Invalid step '{0}', expected a whole number")]
    InvalidStep(String),
}

impl FromStr for ConsoleCommand {
    type Err = ParseCommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let name = words.next().unwrap_or_default();
        let mut step = || -> Result<i64, ParseCommandError> {
            match words.next() {
                Some(word) => word
                    .parse()
                    .map_err(|_| ParseCommandError::InvalidStep(word.to_string())),
                None => Ok(1),
            }
        };

        match name.to_ascii_lowercase().as_str() {
            "+" | "inc" | "increment" => step().map(ConsoleCommand::Increment),
            "-" | "dec" | "decrement" => step().map(ConsoleCommand::Decrement),
            "lock" => Ok(ConsoleCommand::Lock),
            "unlock" => Ok(ConsoleCommand::Unlock),
            "show" => Ok(ConsoleCommand::Show),
            "help" | "?" => Ok(ConsoleCommand::Help),
            "quit" | "exit" | "q" => Ok(ConsoleCommand::Quit),
            _ => Err(ParseCommandError::Unknown(line.trim().to_string())),
        }
    }
}

/// Whether the input loop should keep reading
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// Console front end for a [`CounterStore`]
///
/// The display callback receives every new counter value as a string, plus
/// replies to `show`, `help` and malformed input.
pub struct ConsoleController<D>
where
    D: FnMut(&str),
{
    store: CounterStore,
    changes: broadcast::Receiver<CounterChange>,
    display: D,
}

impl<D> ConsoleController<D>
where
    D: FnMut(&str),
{
    pub fn new(store: CounterStore, display: D) -> Self {
        let changes = store.subscribe();
        Self {
            store,
            changes,
            display,
        }
    }

    pub fn store(&self) -> &CounterStore {
        &self.store
    }

    /// Handle one input line; blank lines are ignored
    pub fn handle_line(&mut self, line: &str) -> Flow {
        if line.trim().is_empty() {
            return Flow::Continue;
        }

        match line.parse::<ConsoleCommand>() {
            Ok(command) => self.dispatch(command),
            Err(e) => {
                tracing::debug!("Rejected console input: {}", e);
                (self.display)(&e.to_string());
                Flow::Continue
            }
        }
    }

    pub fn dispatch(&mut self, command: ConsoleCommand) -> Flow {
        tracing::debug!("Console command: {:?}", command);

        let flow = match command {
            ConsoleCommand::Increment(step) => {
                self.store.increment(step);
                Flow::Continue
            }
            ConsoleCommand::Decrement(step) => {
                self.store.decrement(step);
                Flow::Continue
            }
            ConsoleCommand::Lock => {
                self.store.lock();
                Flow::Continue
            }
            ConsoleCommand::Unlock => {
                self.store.unlock();
                Flow::Continue
            }
            ConsoleCommand::Show => {
                let value = self.store.value();
                (self.display)(&value.to_string());
                Flow::Continue
            }
            ConsoleCommand::Help => {
                (self.display)(HELP);
                Flow::Continue
            }
            ConsoleCommand::Quit => Flow::Quit,
        };

        self.drain_changes();
        flow
    }

    /// Show the initial value, then process lines until `quit` or end of input
    pub fn run<R: BufRead>(&mut self, input: R) -> Result<()> {
        let initial = self.store.value();
        (self.display)(&initial.to_string());

        for line in input.lines() {
            let line = line.context("Failed to read console input")?;
            if self.handle_line(&line) == Flow::Quit {
                break;
            }
        }

        tracing::debug!("Console closed at value {}", self.store.value());
        Ok(())
    }

    fn drain_changes(&mut self) {
        loop {
            match self.changes.try_recv() {
                Ok(CounterChange::ValueChanged { value }) => {
                    (self.display)(&value.to_string());
                }
                Err(TryRecvError::Lagged(skipped)) => {
                    tracing::warn!("Console display lagged, skipped {} updates", skipped);
                }
                Err(TryRecvError::Empty | TryRecvError::Closed) => break,
            }
        }
    }
}
