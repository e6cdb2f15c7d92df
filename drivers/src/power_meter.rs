//! Driver for the microwave power meter.

use std::sync::{Arc, Mutex};

use odnp_interface::{InstrumentError, InstrumentInterface};

/// A rust driver for a SCPI microwave power meter configured to report dBm.
pub struct PowerMeter<T: InstrumentInterface> {
    interface: Arc<Mutex<T>>,
}

impl<T: InstrumentInterface> PowerMeter<T> {
    /// Create a new power meter driver. No command is sent to the instrument.
    pub fn try_new(interface: T) -> Result<Self, InstrumentError> {
        let mut intf = interface;
        intf.set_terminator("\n");
        Ok(PowerMeter {
            interface: Arc::new(Mutex::new(intf)),
        })
    }

    /// Query the identification string of the power meter.
    pub fn get_name(&mut self) -> Result<String, InstrumentError> {
        let mut intf = self.interface.lock().expect("Mutex should not be poisoned");
        intf.query("*IDN?")
    }

    /// Trigger a measurement and return the power in dBm.
    pub fn get_power_dbm(&mut self) -> Result<f64, InstrumentError> {
        let mut intf = self.interface.lock().expect("Mutex should not be poisoned");
        intf.query_f64("MEAS?")
    }
}

impl<T: InstrumentInterface> Clone for PowerMeter<T> {
    fn clone(&self) -> Self {
        Self {
            interface: self.interface.clone(),
        }
    }
}
