//! A simulated bench for `--simulate` and for the integration tests.
//!
//! The supply and the gaussmeter share one magnet, the bridge and the power meter share one
//! microwave path. The magnet is deliberately a few percent off the default calibration so that
//! a field ramp has to recalibrate.

use std::sync::{Arc, Mutex};

use measurements::{Current, Frequency, Voltage};
use odnp_interface::InstrumentError;

use crate::facade::{FieldSensor, MagnetSupply, MicrowaveSource, PowerSensor};

/// True gain of the simulated magnet in A/G.
const TRUE_CURRENT_PER_GAUSS: f64 = 0.004_75;
/// Probe offset before the first zeroing, in G.
const PROBE_OFFSET: f64 = 1.2;
/// Center of the resonator dip.
const DIP_MHZ: f64 = 9_401.3;
/// Half width of the resonator dip.
const DIP_HALF_WIDTH_MHZ: f64 = 1.5;
/// Step of the simulated dip sweep.
const DIP_STEP_MHZ: f64 = 0.1;

#[derive(Debug)]
struct Magnet {
    output: bool,
    current: f64,
    voltage_limit: f64,
    probe_offset: f64,
}

impl Magnet {
    fn field(&self) -> f64 {
        let current = if self.output { self.current } else { 0.0 };
        current / TRUE_CURRENT_PER_GAUSS + self.probe_offset
    }
}

#[derive(Debug)]
struct Microwave {
    waveguide: bool,
    rf: bool,
    amplifier: bool,
    power_dbm: f64,
    freq_mhz: f64,
}

impl Microwave {
    fn radiating(&self) -> bool {
        self.rf && self.amplifier
    }

    /// Reflected power in mV. The resonator absorbs most of the power at the dip.
    fn reflected_mv(&self) -> f64 {
        if !self.rf {
            return 0.0;
        }
        let detuning = (self.freq_mhz - DIP_MHZ) / DIP_HALF_WIDTH_MHZ;
        let coupled = if self.waveguide { 0.9 } else { 0.0 };
        self.forward_mv() * (1.0 - coupled / (1.0 + detuning * detuning))
    }

    fn forward_mv(&self) -> f64 {
        if !self.rf {
            return 0.0;
        }
        let gain = if self.amplifier { 10.0 } else { 1.0 };
        gain * (20.0 + 5.0 * self.power_dbm)
    }
}

/// The shared state of the simulated bench. Instruments are handed out as handles.
#[derive(Debug, Clone)]
pub struct SimLab {
    magnet: Arc<Mutex<Magnet>>,
    microwave: Arc<Mutex<Microwave>>,
}

impl Default for SimLab {
    fn default() -> Self {
        SimLab {
            magnet: Arc::new(Mutex::new(Magnet {
                output: false,
                current: 0.0,
                voltage_limit: 0.0,
                probe_offset: PROBE_OFFSET,
            })),
            microwave: Arc::new(Mutex::new(Microwave {
                waveguide: false,
                rf: false,
                amplifier: false,
                power_dbm: 0.0,
                freq_mhz: 9_400.0,
            })),
        }
    }
}

impl SimLab {
    pub fn sensor(&self) -> SimSensor {
        SimSensor {
            magnet: self.magnet.clone(),
        }
    }

    pub fn supply(&self) -> SimSupply {
        SimSupply {
            magnet: self.magnet.clone(),
        }
    }

    pub fn source(&self) -> SimSource {
        SimSource {
            microwave: self.microwave.clone(),
        }
    }

    pub fn meter(&self) -> SimMeter {
        SimMeter {
            microwave: self.microwave.clone(),
        }
    }
}

/// Gaussmeter of the simulated bench.
#[derive(Debug, Clone)]
pub struct SimSensor {
    magnet: Arc<Mutex<Magnet>>,
}

impl FieldSensor for SimSensor {
    fn read_field(&mut self) -> Result<f64, InstrumentError> {
        let magnet = self.magnet.lock().expect("Mutex should not be poisoned");
        Ok(magnet.field())
    }

    fn zero_probe(&mut self) -> Result<(), InstrumentError> {
        let mut magnet = self.magnet.lock().expect("Mutex should not be poisoned");
        magnet.probe_offset -= magnet.field();
        Ok(())
    }
}

/// Magnet supply of the simulated bench.
#[derive(Debug, Clone)]
pub struct SimSupply {
    magnet: Arc<Mutex<Magnet>>,
}

impl MagnetSupply for SimSupply {
    fn output(&mut self) -> Result<bool, InstrumentError> {
        Ok(self.magnet.lock().expect("Mutex should not be poisoned").output)
    }

    fn set_output(&mut self, on: bool) -> Result<(), InstrumentError> {
        self.magnet.lock().expect("Mutex should not be poisoned").output = on;
        Ok(())
    }

    fn set_voltage_limit(&mut self, limit: Voltage) -> Result<(), InstrumentError> {
        self.magnet
            .lock()
            .expect("Mutex should not be poisoned")
            .voltage_limit = limit.as_volts();
        Ok(())
    }

    fn set_current_limit(&mut self, limit: Current) -> Result<(), InstrumentError> {
        let amperes = limit.as_amperes();
        if !(0.0..=30.0).contains(&amperes) {
            return Err(InstrumentError::FloatValueOutOfRange {
                value: amperes,
                min: 0.0,
                max: 30.0,
            });
        }
        self.magnet.lock().expect("Mutex should not be poisoned").current = amperes;
        Ok(())
    }

    fn measured_current(&mut self) -> Result<Current, InstrumentError> {
        let magnet = self.magnet.lock().expect("Mutex should not be poisoned");
        let flowing = if magnet.output && magnet.voltage_limit > 0.0 {
            magnet.current
        } else {
            0.0
        };
        Ok(Current::from_amperes(flowing))
    }
}

/// Microwave bridge of the simulated bench.
#[derive(Debug, Clone)]
pub struct SimSource {
    microwave: Arc<Mutex<Microwave>>,
}

impl SimSource {
    fn state(&self) -> std::sync::MutexGuard<'_, Microwave> {
        self.microwave.lock().expect("Mutex should not be poisoned")
    }
}

impl MicrowaveSource for SimSource {
    fn set_waveguide(&mut self, on: bool) -> Result<(), InstrumentError> {
        self.state().waveguide = on;
        Ok(())
    }

    fn set_rf(&mut self, on: bool) -> Result<(), InstrumentError> {
        self.state().rf = on;
        Ok(())
    }

    fn rf_enabled(&mut self) -> Result<bool, InstrumentError> {
        Ok(self.state().rf)
    }

    fn set_amplifier(&mut self, on: bool) -> Result<(), InstrumentError> {
        self.state().amplifier = on;
        Ok(())
    }

    fn set_power(&mut self, dbm: f64) -> Result<(), InstrumentError> {
        if !(0.0..=40.0).contains(&dbm) {
            return Err(InstrumentError::FloatValueOutOfRange {
                value: dbm,
                min: 0.0,
                max: 40.0,
            });
        }
        // The real source resolves 0.1 dB.
        self.state().power_dbm = (dbm * 10.0).round() / 10.0;
        Ok(())
    }

    fn read_power(&mut self) -> Result<f64, InstrumentError> {
        Ok(self.state().power_dbm)
    }

    fn set_frequency(&mut self, freq: Frequency) -> Result<(), InstrumentError> {
        self.state().freq_mhz = freq.as_megahertz();
        Ok(())
    }

    fn lock_dip(
        &mut self,
        start: Frequency,
        stop: Frequency,
    ) -> Result<Frequency, InstrumentError> {
        let (start, stop) = (start.as_megahertz(), stop.as_megahertz());
        if stop <= start {
            return Err(InstrumentError::InvalidArgument(format!(
                "Dip search window is empty: {start} MHz to {stop} MHz"
            )));
        }
        let mut state = self.state();
        let mut best = (start, f64::INFINITY);
        let points = ((stop - start) / DIP_STEP_MHZ).round() as usize;
        for i in 0..=points {
            state.freq_mhz = start + i as f64 * DIP_STEP_MHZ;
            let reflected = state.reflected_mv();
            if reflected < best.1 {
                best = (state.freq_mhz, reflected);
            }
        }
        state.freq_mhz = best.0;
        Ok(Frequency::from_megahertz(best.0))
    }

    fn reflected_power(&mut self) -> Result<f64, InstrumentError> {
        Ok(self.state().reflected_mv())
    }

    fn forward_power(&mut self) -> Result<f64, InstrumentError> {
        Ok(self.state().forward_mv())
    }
}

/// Power meter of the simulated bench, coupled to the bridge output.
#[derive(Debug, Clone)]
pub struct SimMeter {
    microwave: Arc<Mutex<Microwave>>,
}

impl PowerSensor for SimMeter {
    fn read_meter_power(&mut self) -> Result<f64, InstrumentError> {
        let state = self.microwave.lock().expect("Mutex should not be poisoned");
        if state.radiating() {
            Ok(state.power_dbm - 0.3)
        } else {
            Ok(-70.0)
        }
    }
}
