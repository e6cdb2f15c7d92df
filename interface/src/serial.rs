//! Blocking serial transport using the `serialport` crate.

use std::time::Duration;

use serialport::{SerialPort, SerialPortBuilder};

use crate::{Instrument, InstrumentError};

/// Constructors for an [`Instrument`] talking over a serial port.
#[derive(Debug)]
pub struct SerialInterface {}

impl SerialInterface {
    /// Open a port with 8N1 framing and a three second timeout.
    ///
    /// # Arguments
    /// * `port` - Name of the serial port, e.g., `"/dev/ttyUSB0"` or `"COM3"`.
    /// * `baud_rate` - Baud rate of the instrument.
    pub fn simple(
        port: &str,
        baud_rate: u32,
    ) -> Result<Instrument<Box<dyn SerialPort>>, InstrumentError> {
        let builder = serialport::new(port, baud_rate).timeout(Duration::from_secs(3));
        Self::full(builder)
    }

    /// Open a port from a fully configured [`SerialPortBuilder`].
    ///
    /// Use this for instruments with unusual framing, e.g. the 7O1 gaussmeter.
    pub fn full(
        builder: SerialPortBuilder,
    ) -> Result<Instrument<Box<dyn SerialPort>>, InstrumentError> {
        let port = builder.open()?;
        let timeout = port.timeout();
        Ok(Instrument::new(port, timeout))
    }
}
