//! The instruments of the bench, as used by the command server.

use log::info;
use measurements::{Current, Frequency, Voltage};
use odnp_drivers::{
    DcSupply, Gaussmeter, MicrowaveBridge, PowerMeter, SerialInterfaceBridge,
    SerialInterfaceGaussmeter,
};
use odnp_interface::{InstrumentError, InstrumentInterface, TcpIpInterface};
use thiserror::Error;

use crate::{
    config::InstrumentsConfig,
    facade::{FieldSensor, MagnetSupply, MicrowaveSource, PowerSensor},
    sim,
};

/// Errors while connecting to the bench.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConnectError {
    #[error(transparent)]
    Instrument(#[from] InstrumentError),
    #[error("{instrument} identified as {found:?}, expected it to contain {expected:?}")]
    Identity {
        instrument: &'static str,
        expected: String,
        found: String,
    },
}

/// All instruments the server talks to.
pub struct Hardware {
    pub sensor: Box<dyn FieldSensor>,
    pub supply: Box<dyn MagnetSupply>,
    pub source: Box<dyn MicrowaveSource>,
    pub meter: Box<dyn PowerSensor>,
}

impl Hardware {
    /// Open every instrument and check its identity.
    ///
    /// Nothing is switched or ramped, the instruments are only asked for their names.
    pub fn connect(config: &InstrumentsConfig) -> Result<Self, ConnectError> {
        let mut supply = DcSupply::try_new(TcpIpInterface::full(
            config.supply_address.as_str(),
            config.timeout(),
        )?)?;
        verify("Magnet supply", supply.get_name()?, &config.supply_idn)?;

        let mut gaussmeter =
            Gaussmeter::try_new(SerialInterfaceGaussmeter::simple(&config.gaussmeter_port)?)?;
        verify("Gaussmeter", gaussmeter.get_name()?, &config.gaussmeter_idn)?;

        let mut meter = PowerMeter::try_new(TcpIpInterface::full(
            config.meter_address.as_str(),
            config.timeout(),
        )?)?;
        verify("Power meter", meter.get_name()?, &config.meter_idn)?;

        let mut bridge =
            MicrowaveBridge::try_new(SerialInterfaceBridge::simple(&config.bridge_port)?)?;
        verify("Microwave bridge", bridge.get_name()?, &config.bridge_idn)?;

        Ok(Hardware {
            sensor: Box::new(gaussmeter),
            supply: Box::new(supply),
            source: Box::new(BridgeSource {
                bridge,
                dip_step: Frequency::from_kilohertz(config.dip_step_khz),
            }),
            meter: Box::new(meter),
        })
    }

    /// The simulated bench, see [`sim`].
    pub fn simulated() -> Self {
        let lab = sim::SimLab::default();
        Hardware {
            sensor: Box::new(lab.sensor()),
            supply: Box::new(lab.supply()),
            source: Box::new(lab.source()),
            meter: Box::new(lab.meter()),
        }
    }
}

fn verify(
    instrument: &'static str,
    found: String,
    expected: &Option<String>,
) -> Result<(), ConnectError> {
    match expected {
        Some(expected) if !found.contains(expected.as_str()) => Err(ConnectError::Identity {
            instrument,
            expected: expected.clone(),
            found,
        }),
        _ => {
            info!("{instrument} connected: {found}");
            Ok(())
        }
    }
}

impl<T: InstrumentInterface> FieldSensor for Gaussmeter<T> {
    fn read_field(&mut self) -> Result<f64, InstrumentError> {
        self.get_field()
    }

    fn zero_probe(&mut self) -> Result<(), InstrumentError> {
        Gaussmeter::zero_probe(self)
    }
}

impl<T: InstrumentInterface> MagnetSupply for DcSupply<T> {
    fn output(&mut self) -> Result<bool, InstrumentError> {
        self.get_output()
    }

    fn set_output(&mut self, on: bool) -> Result<(), InstrumentError> {
        DcSupply::set_output(self, on)
    }

    fn set_voltage_limit(&mut self, limit: Voltage) -> Result<(), InstrumentError> {
        DcSupply::set_voltage_limit(self, limit)
    }

    fn set_current_limit(&mut self, limit: Current) -> Result<(), InstrumentError> {
        DcSupply::set_current_limit(self, limit)
    }

    fn measured_current(&mut self) -> Result<Current, InstrumentError> {
        self.get_current()
    }
}

impl<T: InstrumentInterface> PowerSensor for PowerMeter<T> {
    fn read_meter_power(&mut self) -> Result<f64, InstrumentError> {
        self.get_power_dbm()
    }
}

/// The bridge together with the resolution of its dip search.
pub struct BridgeSource<T: InstrumentInterface> {
    pub bridge: MicrowaveBridge<T>,
    pub dip_step: Frequency,
}

impl<T: InstrumentInterface> MicrowaveSource for BridgeSource<T> {
    fn set_waveguide(&mut self, on: bool) -> Result<(), InstrumentError> {
        self.bridge.set_waveguide(on)
    }

    fn set_rf(&mut self, on: bool) -> Result<(), InstrumentError> {
        self.bridge.set_rf(on)
    }

    fn rf_enabled(&mut self) -> Result<bool, InstrumentError> {
        self.bridge.get_rf()
    }

    fn set_amplifier(&mut self, on: bool) -> Result<(), InstrumentError> {
        self.bridge.set_amplifier(on)
    }

    fn set_power(&mut self, dbm: f64) -> Result<(), InstrumentError> {
        self.bridge.set_power(dbm)
    }

    fn read_power(&mut self) -> Result<f64, InstrumentError> {
        self.bridge.get_power()
    }

    fn set_frequency(&mut self, freq: Frequency) -> Result<(), InstrumentError> {
        self.bridge.set_frequency(freq)
    }

    fn lock_dip(
        &mut self,
        start: Frequency,
        stop: Frequency,
    ) -> Result<Frequency, InstrumentError> {
        self.bridge.lock_dip(start, stop, self.dip_step)
    }

    fn reflected_power(&mut self) -> Result<f64, InstrumentError> {
        self.bridge.get_reflected_power()
    }

    fn forward_power(&mut self) -> Result<f64, InstrumentError> {
        self.bridge.get_forward_power()
    }
}
