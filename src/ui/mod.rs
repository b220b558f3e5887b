// UI module - console front end for the bounded counter
//
// ConsoleController reads commands from any BufRead and reports counter
// values through an injected display callback.

pub mod console;

pub use console::{ConsoleCommand, ConsoleController, Flow, HELP, ParseCommandError};
