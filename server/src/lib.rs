//! TCP command server for ODNP experiments.
//!
//! Clients send short ASCII commands to ramp the magnetic field, ramp and tune the microwave
//! source, read the instruments and record a log of the microwave detectors. The server talks to
//! the bench through four narrow traits (see [`facade`]), implemented by the drivers of
//! `odnp-drivers` and by a simulated bench.
//!
//! # Protocol
//!
//! | Command                  | Reply                                      |
//! |--------------------------|--------------------------------------------|
//! | `SET_FIELD <G>`          | measured field, two decimals               |
//! | `GET_FIELD`              | measured field, two decimals               |
//! | `SET_POWER <dBm>`        | source power readback, one decimal         |
//! | `GET_POWER`              | power meter reading, one decimal           |
//! | `SET_FREQ <MHz>`         | none                                       |
//! | `DIP_LOCK <GHz> <GHz>`   | dip frequency in Hz, no decimals           |
//! | `MW_OFF`                 | none                                       |
//! | `START_LOG`              | none                                       |
//! | `STOP_LOG`               | the log, see [`log_session`]               |
//! | `CLOSE`                  | none, the connection is closed             |
//!
//! Text replies end with a newline. A failing command is answered with `ERROR <message>` and
//! the rest of its batch is dropped.
//!
//! # Example
//!
//! ```no_run
//! use std::net::TcpListener;
//!
//! use odnp_server::{CommandServer, Hardware, ServerConfig, SystemClock};
//!
//! let listener = TcpListener::bind("127.0.0.1:6002").unwrap();
//! let mut server = CommandServer::new(Hardware::simulated(), ServerConfig::default(), SystemClock);
//! server.serve(&listener).unwrap();
//! ```

pub mod clock;
pub mod command;
pub mod config;
pub mod error;
pub mod facade;
pub mod field_ramp;
pub mod hardware;
pub mod log_session;
pub mod power_ramp;
pub mod server;
pub mod sim;

#[cfg(test)]
mod testing;

pub use clock::{Clock, ManualClock, SystemClock};
pub use command::Command;
pub use config::{ConfigError, ServerConfig};
pub use error::{ProtocolError, RampError, ServerError};
pub use field_ramp::{Calibration, adjust_field, ramp_field};
pub use hardware::{ConnectError, Hardware};
pub use log_session::{LogSession, SampleRecord};
pub use power_ramp::{PowerRamp, PowerRampReport};
pub use server::{CommandServer, Connection, Reply};
