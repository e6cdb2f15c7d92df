//! Driver for the SCPI programmable DC supply that drives the electromagnet.

use std::sync::{Arc, Mutex};

use measurements::{Current, Voltage};
use odnp_interface::{InstrumentError, InstrumentInterface};

use crate::{check_range, parse_status};

/// Largest current the supply can source, in amperes.
const MAX_CURRENT_A: f64 = 30.0;
/// Largest voltage the supply can source, in volts.
const MAX_VOLTAGE_V: f64 = 30.0;

/// A rust driver for a SCPI DC power supply in constant-current operation.
///
/// The current setpoint acts as the current limit of the supply: with the voltage limit set
/// high enough, the magnet draws exactly the programmed current.
pub struct DcSupply<T: InstrumentInterface> {
    interface: Arc<Mutex<T>>,
}

impl<T: InstrumentInterface> DcSupply<T> {
    /// Create a new supply driver. No command is sent to the instrument.
    ///
    /// # Arguments
    /// * `interface` - An interface that implements the [`InstrumentInterface`] trait.
    pub fn try_new(interface: T) -> Result<Self, InstrumentError> {
        let mut intf = interface;
        intf.set_terminator("\n");
        Ok(DcSupply {
            interface: Arc::new(Mutex::new(intf)),
        })
    }

    /// Query the identification string of the supply.
    pub fn get_name(&mut self) -> Result<String, InstrumentError> {
        self.query("*IDN?")
    }

    /// Return whether the output of the supply is enabled.
    pub fn get_output(&mut self) -> Result<bool, InstrumentError> {
        let response = self.query("OUTP?")?;
        parse_status(&response)
    }

    /// Enable or disable the output.
    pub fn set_output(&mut self, on: bool) -> Result<(), InstrumentError> {
        self.sendcmd(if on { "OUTP ON" } else { "OUTP OFF" })
    }

    /// Program the voltage limit.
    pub fn set_voltage_limit(&mut self, voltage: Voltage) -> Result<(), InstrumentError> {
        let volts = voltage.as_volts();
        check_range(volts, 0.0, MAX_VOLTAGE_V)?;
        self.sendcmd(&format!("VOLT {volts:.3}"))
    }

    /// Program the current limit, i.e., the magnet current.
    pub fn set_current_limit(&mut self, current: Current) -> Result<(), InstrumentError> {
        let amps = current.as_amperes();
        check_range(amps, 0.0, MAX_CURRENT_A)?;
        self.sendcmd(&format!("CURR {amps:.3}"))
    }

    /// Measure the current that is actually flowing through the magnet.
    pub fn get_current(&mut self) -> Result<Current, InstrumentError> {
        let mut intf = self.interface.lock().expect("Mutex should not be poisoned");
        Ok(Current::from_amperes(intf.query_f64("MEAS:CURR?")?))
    }

    fn sendcmd(&mut self, cmd: &str) -> Result<(), InstrumentError> {
        let mut intf = self.interface.lock().expect("Mutex should not be poisoned");
        intf.sendcmd(cmd)
    }

    fn query(&mut self, cmd: &str) -> Result<String, InstrumentError> {
        let mut intf = self.interface.lock().expect("Mutex should not be poisoned");
        intf.query(cmd)
    }
}

impl<T: InstrumentInterface> Clone for DcSupply<T> {
    fn clone(&self) -> Self {
        Self {
            interface: self.interface.clone(),
        }
    }
}
