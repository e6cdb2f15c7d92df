//! Driver for the Hall probe gaussmeter.

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use odnp_interface::{Instrument, InstrumentError, InstrumentInterface, SerialInterface};
use serialport::SerialPort;

/// A SerialInterface for the gaussmeter.
///
/// The gaussmeter talks 7 data bits, odd parity, one stop bit at 57600 baud.
#[derive(Debug)]
pub struct SerialInterfaceGaussmeter {}

impl SerialInterfaceGaussmeter {
    /// Open the serial port of the gaussmeter with the correct framing and a 3 s timeout.
    ///
    /// Arguments:
    /// * `port` - The name of the serial port, e.g., `"/dev/ttyUSB1"` or `"COM4"`.
    pub fn simple(port: &str) -> Result<Instrument<Box<dyn SerialPort>>, InstrumentError> {
        let port = serialport::new(port, 57600)
            .timeout(Duration::from_secs(3))
            .parity(serialport::Parity::Odd)
            .data_bits(serialport::DataBits::Seven)
            .stop_bits(serialport::StopBits::One);
        SerialInterface::full(port)
    }
}

/// A rust driver for the gaussmeter. Fields are reported in gauss.
pub struct Gaussmeter<T: InstrumentInterface> {
    interface: Arc<Mutex<T>>,
}

impl<T: InstrumentInterface> Gaussmeter<T> {
    /// Create a new gaussmeter driver. No command is sent to the instrument.
    ///
    /// # Arguments
    /// * `interface` - An interface that implements the [`InstrumentInterface`] trait.
    pub fn try_new(interface: T) -> Result<Self, InstrumentError> {
        let mut intf = interface;
        intf.set_terminator("\r\n");
        Ok(Gaussmeter {
            interface: Arc::new(Mutex::new(intf)),
        })
    }

    /// Query the identification string of the gaussmeter.
    pub fn get_name(&mut self) -> Result<String, InstrumentError> {
        let mut intf = self.interface.lock().expect("Mutex should not be poisoned");
        intf.query("*IDN?")
    }

    /// Read the field in gauss.
    ///
    /// The meter reports an overload as `OL` or a value of `±9.999E+99`, which is returned as an
    /// instrument status error.
    pub fn get_field(&mut self) -> Result<f64, InstrumentError> {
        let response = {
            let mut intf = self.interface.lock().expect("Mutex should not be poisoned");
            intf.query("RDGFIELD?")?
        };
        if response.eq_ignore_ascii_case("OL") {
            return Err(InstrumentError::InstrumentStatus(
                "Gaussmeter reading overloaded".to_string(),
            ));
        }
        let field = response
            .parse::<f64>()
            .map_err(|_| InstrumentError::ResponseParseError(response.clone()))?;
        if field.abs() >= 9.999e99 {
            return Err(InstrumentError::InstrumentStatus(
                "Gaussmeter reading overloaded".to_string(),
            ));
        }
        Ok(field)
    }

    /// Zero the probe. The probe must sit in a field-free region, i.e., the magnet must be off.
    pub fn zero_probe(&mut self) -> Result<(), InstrumentError> {
        let mut intf = self.interface.lock().expect("Mutex should not be poisoned");
        intf.sendcmd("ZPROBE")
    }
}

impl<T: InstrumentInterface> Clone for Gaussmeter<T> {
    fn clone(&self) -> Self {
        Self {
            interface: self.interface.clone(),
        }
    }
}
