//! Parsing of the ASCII command protocol.

use std::{fmt, str::FromStr};

use crate::error::ProtocolError;

/// A command received from a client.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    /// Switch the microwave off and close the connection.
    Close,
    /// Read the power meter.
    GetPower,
    /// Switch the microwave RF and amplifier off.
    MwOff,
    /// Start recording the log.
    StartLog,
    /// Stop recording and send the log.
    StopLog,
    /// Read the field sensor.
    GetField,
    /// Ramp the microwave power to the given dBm.
    SetPower(f64),
    /// Tune the source to the given MHz.
    SetFreq(f64),
    /// Ramp the magnet to the given gauss.
    SetField(f64),
    /// Lock onto the reflection dip within the given window in GHz.
    DipLock(f64, f64),
}

impl Command {
    /// The verb of the command as it appears on the wire.
    pub fn verb(&self) -> &'static str {
        match self {
            Command::Close => "CLOSE",
            Command::GetPower => "GET_POWER",
            Command::MwOff => "MW_OFF",
            Command::StartLog => "START_LOG",
            Command::StopLog => "STOP_LOG",
            Command::GetField => "GET_FIELD",
            Command::SetPower(_) => "SET_POWER",
            Command::SetFreq(_) => "SET_FREQ",
            Command::SetField(_) => "SET_FIELD",
            Command::DipLock(..) => "DIP_LOCK",
        }
    }
}

impl FromStr for Command {
    type Err = ProtocolError;

    /// Parse one command line. Tokens are separated by whitespace.
    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let verb = tokens.first().copied().unwrap_or_default();
        let arg = |i: usize| parse_arg(verb, tokens[i]);

        match (verb, tokens.len()) {
            ("CLOSE", 1) => Ok(Command::Close),
            ("GET_POWER", 1) => Ok(Command::GetPower),
            ("MW_OFF", 1) => Ok(Command::MwOff),
            ("START_LOG", 1) => Ok(Command::StartLog),
            ("STOP_LOG", 1) => Ok(Command::StopLog),
            ("GET_FIELD", 1) => Ok(Command::GetField),
            ("SET_POWER", 2) => Ok(Command::SetPower(arg(1)?)),
            ("SET_FREQ", 2) => Ok(Command::SetFreq(arg(1)?)),
            ("SET_FIELD", 2) => Ok(Command::SetField(arg(1)?)),
            ("DIP_LOCK", 3) => Ok(Command::DipLock(arg(1)?, arg(2)?)),
            (_, arity) => Err(ProtocolError::UnknownCommand {
                verb: verb.to_string(),
                arity,
            }),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::SetPower(x) | Command::SetFreq(x) | Command::SetField(x) => {
                write!(f, "{} {x}", self.verb())
            }
            Command::DipLock(start, stop) => write!(f, "{} {start} {stop}", self.verb()),
            _ => f.write_str(self.verb()),
        }
    }
}

fn parse_arg(verb: &str, token: &str) -> Result<f64, ProtocolError> {
    match token.parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(value),
        _ => Err(ProtocolError::InvalidArgument {
            verb: verb.to_string(),
            arg: token.to_string(),
        }),
    }
}

/// Reassembles newline-terminated lines from socket reads.
///
/// A read may end in the middle of a line. That tail is kept until the rest arrives.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: String,
}

impl LineBuffer {
    pub fn new() -> Self {
        LineBuffer::default()
    }

    /// Append received bytes and return every line completed by them, without the newline.
    pub fn push(&mut self, data: &[u8]) -> Vec<String> {
        self.pending.push_str(&String::from_utf8_lossy(data));
        let Some(last_newline) = self.pending.rfind('\n') else {
            return Vec::new();
        };
        let tail = self.pending.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.pending, tail);
        complete
            .lines()
            .map(|line| line.trim().to_string())
            .collect()
    }

    /// Drop any partial line.
    pub fn clear(&mut self) {
        self.pending.clear();
    }

    /// Whether a partial line is waiting for its newline.
    #[cfg(test)]
    fn has_partial(&self) -> bool {
        !self.pending.is_empty()
    }
}
