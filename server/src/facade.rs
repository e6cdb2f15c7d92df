//! The narrow view of the instruments that the controllers and the command loop work with.
//!
//! Every call may block on hardware I/O. Implementations exist for the real drivers (see
//! [`crate::hardware`]) and for the simulated lab (see [`crate::sim`]).

use measurements::{Current, Frequency, Voltage};
use odnp_interface::InstrumentError;

/// The magnetic-field sensor at the sample position. Fields are in gauss.
pub trait FieldSensor {
    /// Read the field.
    fn read_field(&mut self) -> Result<f64, InstrumentError>;

    /// Zero the probe. Only meaningful while the magnet is off.
    fn zero_probe(&mut self) -> Result<(), InstrumentError>;
}

/// The DC supply driving the electromagnet.
pub trait MagnetSupply {
    /// Whether the output is enabled.
    fn output(&mut self) -> Result<bool, InstrumentError>;

    /// Enable or disable the output.
    fn set_output(&mut self, on: bool) -> Result<(), InstrumentError>;

    /// Program the voltage limit.
    fn set_voltage_limit(&mut self, limit: Voltage) -> Result<(), InstrumentError>;

    /// Program the current limit, which sets the magnet current.
    fn set_current_limit(&mut self, limit: Current) -> Result<(), InstrumentError>;

    /// Measure the current flowing through the magnet.
    fn measured_current(&mut self) -> Result<Current, InstrumentError>;
}

/// Microwave source with waveguide switch, amplifier and reflection detector.
pub trait MicrowaveSource {
    /// Switch the waveguide to the resonator.
    fn set_waveguide(&mut self, on: bool) -> Result<(), InstrumentError>;

    /// Enable or disable the RF output.
    fn set_rf(&mut self, on: bool) -> Result<(), InstrumentError>;

    /// Whether the RF output is enabled.
    fn rf_enabled(&mut self) -> Result<bool, InstrumentError>;

    /// Enable or disable the amplifier.
    fn set_amplifier(&mut self, on: bool) -> Result<(), InstrumentError>;

    /// Command the output power in dBm.
    fn set_power(&mut self, dbm: f64) -> Result<(), InstrumentError>;

    /// Output power as read back from the source, in dBm.
    fn read_power(&mut self) -> Result<f64, InstrumentError>;

    /// Tune the source.
    fn set_frequency(&mut self, freq: Frequency) -> Result<(), InstrumentError>;

    /// Find the reflection dip within `[start, stop]`, tune to it and return its frequency.
    fn lock_dip(&mut self, start: Frequency, stop: Frequency)
    -> Result<Frequency, InstrumentError>;

    /// Reflected power detector reading.
    fn reflected_power(&mut self) -> Result<f64, InstrumentError>;

    /// Forward power detector reading.
    fn forward_power(&mut self) -> Result<f64, InstrumentError>;
}

/// The external microwave power meter.
pub trait PowerSensor {
    /// Measure the power in dBm.
    fn read_meter_power(&mut self) -> Result<f64, InstrumentError>;
}
