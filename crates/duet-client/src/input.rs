use thiserror::Error;

use duet_types::models::{RoomName, RoomNameError};

/// One line typed by the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserInput {
    Say(String),
    Join(RoomName),
    Quit,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum InputError {
    #[error("usage: /join <room>")]
    MissingRoom,
    #[error("invalid room name: {0}")]
    Room(#[from] RoomNameError),
    #[error("unknown command /{0} (try /join <room> or /quit)")]
    UnknownCommand(String),
}

/// Parse a line of terminal input. Blank lines yield `None`.
/// A leading `//` sends a literal message starting with `/`.
pub fn parse_line(line: &str) -> Result<Option<UserInput>, InputError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    if let Some(escaped) = line.strip_prefix("//") {
        return Ok(Some(UserInput::Say(format!("/{escaped}"))));
    }

    let Some(command) = line.strip_prefix('/') else {
        return Ok(Some(UserInput::Say(line.to_string())));
    };

    let (name, arg) = command
        .split_once(char::is_whitespace)
        .map_or((command, ""), |(name, arg)| (name, arg.trim()));
    match name {
        "join" if arg.is_empty() => Err(InputError::MissingRoom),
        "join" => Ok(Some(UserInput::Join(RoomName::new(arg)?))),
        "quit" | "exit" => Ok(Some(UserInput::Quit)),
        other => Err(InputError::UnknownCommand(other.to_string())),
    }
}
