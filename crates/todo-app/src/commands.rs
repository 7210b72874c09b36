//! Terminal commands driving the login screen and app state.

use crate::form::{Field, FormAction};
use crate::lifecycle::{AppState, UnknownAppState};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Set(Field, String),
    Press(FormAction),
    State(AppState),
    Status,
    Help,
    Quit,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum CommandError {
    #[error("Unknown command: {0}")]
    Unknown(String),

    #[error("Missing argument for '{0}'")]
    MissingArgument(&'static str),

    #[error(transparent)]
    State(#[from] UnknownAppState),
}

impl Command {
    pub fn parse(line: &str) -> Result<Self, CommandError> {
        let line = line.trim();
        let (name, rest) = match line.split_once(char::is_whitespace) {
            Some((name, rest)) => (name, rest.trim()),
            None => (line, ""),
        };

        match name.to_ascii_lowercase().as_str() {
            "email" => Ok(Command::Set(Field::Email, rest.to_string())),
            "password" => Ok(Command::Set(Field::Password, rest.to_string())),
            "signin" => Ok(Command::Press(FormAction::SignIn)),
            "signup" => Ok(Command::Press(FormAction::SignUp)),
            "state" => {
                if rest.is_empty() {
                    return Err(CommandError::MissingArgument("state"));
                }
                Ok(Command::State(rest.parse()?))
            }
            "status" => Ok(Command::Status),
            "help" | "?" => Ok(Command::Help),
            "quit" | "exit" => Ok(Command::Quit),
            other => Err(CommandError::Unknown(other.to_string())),
        }
    }
}

pub const HELP: &str = "\
Commands:
  email <value>       set the email field
  password <value>    set the password field
  signin | signup     press an action button
  state <s>           report app state: active, inactive, background
  status              show form and client status
  help                show this help
  quit                exit";
