//! Error types of the command server.

use odnp_interface::InstrumentError;
use thiserror::Error;

/// Errors of the field and power ramp controllers.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RampError {
    /// The current needed for a field setpoint is negative or above the hard ceiling of the magnet.
    #[error("Current setpoint of {requested:.3} A is outside the safety range of 0 to {limit:.1} A")]
    SafetyLimitExceeded {
        /// Current that would have been commanded, in A.
        requested: f64,
        /// The ceiling, in A.
        limit: f64,
    },
    /// A microwave power setpoint is above the configured maximum.
    #[error("Power setpoint of {requested:.1} dBm exceeds the safety limit of {limit:.1} dBm")]
    PowerLimitExceeded {
        /// Power that would have been commanded, in dBm.
        requested: f64,
        /// The ceiling, in dBm.
        limit: f64,
    },
    /// The supply did not respond while its output was being switched on.
    #[error("Magnet power supply not connected: {0}")]
    HardwareNotConnected(#[source] InstrumentError),
    /// The field never read within tolerance three times in a row.
    #[error(
        "Could not stabilize the field at {target:.2} G within {tries} tries, last reading was {measured:.2} G"
    )]
    StabilizationTimeout {
        /// Requested field in G.
        target: f64,
        /// Last field reading in G.
        measured: f64,
        /// Number of tries that were allowed.
        tries: usize,
    },
    /// The field reading cannot be used to rescale the calibration.
    #[error("Field reading of {0} G cannot be used to recalibrate the magnet")]
    InvalidFieldReading(f64),
    /// Any other instrument failure, passed on unchanged.
    #[error(transparent)]
    Instrument(#[from] InstrumentError),
}

/// A command line that could not be turned into a command.
#[derive(Debug, Clone, PartialEq, Error)]
#[non_exhaustive]
pub enum ProtocolError {
    /// The verb is unknown or does not take the given number of arguments.
    #[error("Unknown command {verb} with {arity} token(s)")]
    UnknownCommand {
        /// First token of the line.
        verb: String,
        /// Number of tokens including the verb.
        arity: usize,
    },
    /// An argument is not a finite number.
    #[error("Invalid argument {arg:?} for {verb}")]
    InvalidArgument {
        /// The verb the argument belongs to.
        verb: String,
        /// The offending token.
        arg: String,
    },
}

/// Errors that abort a single command. The connection survives them.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ServerError {
    /// The command line could not be parsed.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    /// A field or power ramp failed.
    #[error(transparent)]
    Ramp(#[from] RampError),
    /// The frequency may not be changed in the current microwave state.
    #[error("Frequency change refused: {0}")]
    Interlock(String),
    /// An instrument failed outside of a ramp.
    #[error(transparent)]
    Instrument(#[from] InstrumentError),
    /// The log could not be serialized.
    #[error("Failed to serialize the log: {0}")]
    Serialize(#[from] serde_json::Error),
    /// Reading from or writing to the client failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
