//! Blocking transports for the instruments of the ODNP command server.
//!
//! Every instrument on the bench (DC supply, gaussmeter, power meter, microwave bridge) speaks a
//! line-based ASCII protocol over either a raw TCP socket or a serial port. This crate provides
//! the [`InstrumentInterface`] trait that the drivers are written against, a generic
//! [`Instrument`] implementation over anything that is [`std::io::Read`] and
//! [`std::io::Write`], constructors for TCP/IP and serial ports, and a
//! [`LoopbackInterface`] that scripts the traffic for driver tests.
//!
//! # Example
//!
//! ```no_run
//! use odnp_interface::{InstrumentInterface, TcpIpInterface};
//!
//! let mut supply = TcpIpInterface::simple("192.168.1.20:5025").unwrap();
//! println!("{}", supply.query("*IDN?").unwrap());
//! ```

#![warn(missing_docs)]

mod instrument;
mod loopback;
#[cfg(feature = "serial")]
mod serial;
mod tcp_ip;

pub use instrument::Instrument;
pub use loopback::LoopbackInterface;
#[cfg(feature = "serial")]
pub use serial::SerialInterface;
pub use tcp_ip::TcpIpInterface;

use std::time::{Duration, Instant};

use thiserror::Error;

/// The error enum for all transports and drivers.
///
/// Drivers return this error for every command they send, such that failures propagate with the
/// `?` operator all the way up to the command server.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum InstrumentError {
    /// A float setpoint is outside of what the instrument accepts.
    #[error("Float value {value} is out of range. Allowed range is [{min}, {max}]")]
    FloatValueOutOfRange {
        /// The rejected value.
        value: f64,
        /// Smallest accepted value.
        min: f64,
        /// Largest accepted value.
        max: f64,
    },
    /// An argument passed to a driver function is invalid.
    #[error("{0}")]
    InvalidArgument(String),
    /// Error when reading from/writing to an interface. See [`std::io::Error`] for more details.
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// The instrument reported an error condition, e.g., a missing probe.
    #[error("{0}")]
    InstrumentStatus(String),
    /// The response of the instrument could not be interpreted by the driver.
    #[error("Response from instrument could not be parsed. Response was: {0}")]
    ResponseParseError(String),
    #[cfg(feature = "serial")]
    /// Opening or configuring a serial port failed.
    #[error(transparent)]
    Serialport(#[from] serialport::Error),
    /// No terminator arrived within the timeout of the interface.
    #[error("Timeout occured while waiting for a response from the instrument ({0:?}).")]
    Timeout(Duration),
    /// No complete response to a query arrived within the timeout of the interface.
    #[error("Timeout occured while waiting for a response to query: {query} ({timeout:?}).")]
    TimeoutQuery {
        /// The query that was sent.
        query: String,
        /// The timeout that was exceeded.
        timeout: Duration,
    },
}

/// The `InstrumentInterface` trait that all instrument drivers are generic over.
///
/// Implementors only provide raw byte access and the terminator handling. Sending commands,
/// reading terminated lines and querying are built on top of that.
pub trait InstrumentInterface {
    /// Fill `buf` completely with bytes received from the instrument.
    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), InstrumentError>;

    /// Write raw bytes to the instrument and flush them.
    fn write_raw(&mut self, data: &[u8]) -> Result<(), InstrumentError>;

    /// The terminator that ends every line in both directions.
    fn get_terminator(&self) -> &str;

    /// Replace the terminator, e.g., with `"\r\n"` for instruments that require it.
    fn set_terminator(&mut self, terminator: &str);

    /// How long to wait for a full line before giving up.
    fn get_timeout(&self) -> Duration {
        Duration::from_secs(3)
    }

    /// Send a command to the instrument. The terminator is appended automatically.
    fn sendcmd(&mut self, cmd: &str) -> Result<(), InstrumentError> {
        let line = format!("{cmd}{}", self.get_terminator());
        self.write_raw(line.as_bytes())
    }

    /// Read one line from the instrument and return it trimmed, without the terminator.
    ///
    /// Bytes are read one at a time until the received data ends with the terminator. Interfaces
    /// that signal a read timeout through [`std::io::ErrorKind::TimedOut`] or
    /// [`std::io::ErrorKind::WouldBlock`] are reported as [`InstrumentError::Timeout`].
    fn read_until_terminator(&mut self) -> Result<String, InstrumentError> {
        let terminator = self.get_terminator().as_bytes().to_vec();
        let timeout = self.get_timeout();
        let tic = Instant::now();
        let mut response = Vec::new();
        let mut single = [0u8];

        while tic.elapsed() < timeout {
            match self.read_exact(&mut single) {
                Ok(()) => response.push(single[0]),
                Err(InstrumentError::Io(e))
                    if matches!(
                        e.kind(),
                        std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock
                    ) =>
                {
                    return Err(InstrumentError::Timeout(timeout));
                }
                Err(e) => return Err(e),
            }
            if response.ends_with(&terminator) {
                response.truncate(response.len() - terminator.len());
                return match String::from_utf8(response) {
                    Ok(line) => Ok(line.trim().to_string()),
                    Err(e) => Err(InstrumentError::ResponseParseError(
                        String::from_utf8_lossy(e.as_bytes()).into_owned(),
                    )),
                };
            }
        }
        Err(InstrumentError::Timeout(timeout))
    }

    /// Send a command and return the line the instrument answers with.
    fn query(&mut self, cmd: &str) -> Result<String, InstrumentError> {
        self.sendcmd(cmd)?;
        self.read_until_terminator().map_err(|e| match e {
            InstrumentError::Timeout(timeout) => InstrumentError::TimeoutQuery {
                query: cmd.to_string(),
                timeout,
            },
            other => other,
        })
    }

    /// Query the instrument and parse the answer as a float.
    fn query_f64(&mut self, cmd: &str) -> Result<f64, InstrumentError> {
        let response = self.query(cmd)?;
        response
            .parse::<f64>()
            .map_err(|_| InstrumentError::ResponseParseError(response))
    }
}
