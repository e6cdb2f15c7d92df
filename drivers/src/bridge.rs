//! Driver for the X-band microwave bridge: source, amplifier and reflection detector.

use std::{
    sync::{Arc, Mutex},
    thread,
    time::Duration,
};

use log::debug;
use measurements::Frequency;
use odnp_interface::{Instrument, InstrumentError, InstrumentInterface, SerialInterface};
use serialport::SerialPort;

use crate::{check_range, parse_status};

/// Output power range of the source in dBm.
const POWER_RANGE_DBM: (f64, f64) = (0.0, 40.0);
/// Tuning range of the source in kHz.
const FREQ_RANGE_KHZ: (f64, f64) = (9.2e6, 9.9e6);

/// A SerialInterface for the microwave bridge (115200 baud, 8N1).
#[derive(Debug)]
pub struct SerialInterfaceBridge {}

impl SerialInterfaceBridge {
    /// Open the serial port of the bridge with a 3 s timeout.
    ///
    /// Arguments:
    /// * `port` - The name of the serial port, e.g., `"/dev/ttyACM0"`.
    pub fn simple(port: &str) -> Result<Instrument<Box<dyn SerialPort>>, InstrumentError> {
        let port = serialport::new(port, 115200).timeout(Duration::from_secs(3));
        SerialInterface::full(port)
    }
}

/// A rust driver for the microwave bridge.
///
/// The bridge takes power in tenths of dBm and frequencies in kHz on the wire. This driver
/// converts from and to dBm and [`Frequency`].
pub struct MicrowaveBridge<T: InstrumentInterface> {
    interface: Arc<Mutex<T>>,
    dip_settle: Duration,
}

impl<T: InstrumentInterface> MicrowaveBridge<T> {
    /// Create a new bridge driver. No command is sent to the instrument.
    ///
    /// # Arguments
    /// * `interface` - An interface that implements the [`InstrumentInterface`] trait.
    pub fn try_new(interface: T) -> Result<Self, InstrumentError> {
        let mut intf = interface;
        intf.set_terminator("\r\n");
        Ok(MicrowaveBridge {
            interface: Arc::new(Mutex::new(intf)),
            dip_settle: Duration::from_millis(20),
        })
    }

    /// Set how long to wait after each frequency step of a dip sweep before reading the
    /// reflected power.
    pub fn set_dip_settle(&mut self, settle: Duration) {
        self.dip_settle = settle;
    }

    /// Query the identification string of the bridge.
    pub fn get_name(&mut self) -> Result<String, InstrumentError> {
        self.query("*IDN?")
    }

    /// Switch the waveguide relay between the bridge and the resonator.
    pub fn set_waveguide(&mut self, on: bool) -> Result<(), InstrumentError> {
        self.sendcmd(&format!("wgstatus {}", on as u8))
    }

    /// Enable or disable the RF output of the source.
    pub fn set_rf(&mut self, on: bool) -> Result<(), InstrumentError> {
        self.sendcmd(&format!("rfstatus {}", on as u8))
    }

    /// Return whether the RF output of the source is enabled.
    pub fn get_rf(&mut self) -> Result<bool, InstrumentError> {
        let response = self.query("rfstatus?")?;
        parse_status(&response)
    }

    /// Enable or disable the power amplifier.
    pub fn set_amplifier(&mut self, on: bool) -> Result<(), InstrumentError> {
        self.sendcmd(&format!("ampstatus {}", on as u8))
    }

    /// Command the output power in dBm. The bridge resolves 0.1 dB.
    pub fn set_power(&mut self, dbm: f64) -> Result<(), InstrumentError> {
        check_range(dbm, POWER_RANGE_DBM.0, POWER_RANGE_DBM.1)?;
        self.sendcmd(&format!("power {}", (dbm * 10.0).round() as i64))
    }

    /// Read back the output power of the source in dBm.
    pub fn get_power(&mut self) -> Result<f64, InstrumentError> {
        Ok(self.query_f64("power?")? / 10.0)
    }

    /// Tune the source to the given frequency.
    pub fn set_frequency(&mut self, freq: Frequency) -> Result<(), InstrumentError> {
        let khz = freq.as_kilohertz().round();
        check_range(khz, FREQ_RANGE_KHZ.0, FREQ_RANGE_KHZ.1)?;
        self.sendcmd(&format!("freq {}", khz as i64))
    }

    /// Read back the frequency of the source.
    pub fn get_frequency(&mut self) -> Result<Frequency, InstrumentError> {
        Ok(Frequency::from_kilohertz(self.query_f64("freq?")?))
    }

    /// Reflected power on the receiver diode in mV.
    pub fn get_reflected_power(&mut self) -> Result<f64, InstrumentError> {
        self.query_f64("rxpowermv?")
    }

    /// Forward power on the transmitter diode in mV.
    pub fn get_forward_power(&mut self) -> Result<f64, InstrumentError> {
        self.query_f64("txpowermv?")
    }

    /// Sweep `[start, stop]` in steps of `step`, tune to the frequency with the lowest
    /// reflected power and return it.
    ///
    /// # Arguments
    /// * `start` - Lower edge of the search window.
    /// * `stop` - Upper edge of the search window, must be above `start`.
    /// * `step` - Frequency increment of the sweep.
    pub fn lock_dip(
        &mut self,
        start: Frequency,
        stop: Frequency,
        step: Frequency,
    ) -> Result<Frequency, InstrumentError> {
        let start_khz = start.as_kilohertz().round();
        let stop_khz = stop.as_kilohertz().round();
        let step_khz = step.as_kilohertz().round();
        if stop_khz <= start_khz {
            return Err(InstrumentError::InvalidArgument(format!(
                "Dip search window is empty: {start_khz} kHz to {stop_khz} kHz"
            )));
        }
        if step_khz < 1.0 {
            return Err(InstrumentError::InvalidArgument(format!(
                "Dip search step must be at least 1 kHz, got {step_khz} kHz"
            )));
        }
        check_range(start_khz, FREQ_RANGE_KHZ.0, FREQ_RANGE_KHZ.1)?;
        check_range(stop_khz, FREQ_RANGE_KHZ.0, FREQ_RANGE_KHZ.1)?;

        let mut best = (start_khz, f64::INFINITY);
        let mut khz = start_khz;
        while khz <= stop_khz {
            self.sendcmd(&format!("freq {}", khz as i64))?;
            if !self.dip_settle.is_zero() {
                thread::sleep(self.dip_settle);
            }
            let rx = self.get_reflected_power()?;
            if rx < best.1 {
                best = (khz, rx);
            }
            khz += step_khz;
        }
        debug!("Dip found at {} kHz ({} mV reflected)", best.0, best.1);
        self.sendcmd(&format!("freq {}", best.0 as i64))?;
        Ok(Frequency::from_kilohertz(best.0))
    }

    fn sendcmd(&mut self, cmd: &str) -> Result<(), InstrumentError> {
        let mut intf = self.interface.lock().expect("Mutex should not be poisoned");
        intf.sendcmd(cmd)
    }

    fn query(&mut self, cmd: &str) -> Result<String, InstrumentError> {
        let mut intf = self.interface.lock().expect("Mutex should not be poisoned");
        intf.query(cmd)
    }

    fn query_f64(&mut self, cmd: &str) -> Result<f64, InstrumentError> {
        let mut intf = self.interface.lock().expect("Mutex should not be poisoned");
        intf.query_f64(cmd)
    }
}

impl<T: InstrumentInterface> Clone for MicrowaveBridge<T> {
    fn clone(&self) -> Self {
        Self {
            interface: self.interface.clone(),
            dip_settle: self.dip_settle,
        }
    }
}
