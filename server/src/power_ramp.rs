//! Staged microwave power ramp.
//!
//! The amplifier must not see large power jumps, so upward ramps are split into steps of at most
//! `max_step_db`. After each step the source readback is polled until it catches up.

use std::time::Duration;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::{clock::Clock, error::RampError, facade::MicrowaveSource};

/// Half the 0.1 dB resolution of the source. A readback this close below a setpoint counts as
/// reached.
const READBACK_TOLERANCE_DB: f64 = 0.05;

/// Tuning of the power ramp, read from the `[power]` section of the configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct PowerRampSettings {
    /// Largest upward step in dB.
    pub max_step_db: f64,
    /// Highest power that may be commanded, in dBm.
    pub max_power_dbm: f64,
    /// Readback polls per step before moving on.
    pub poll_tries: usize,
    /// Wait between readback polls, in ms.
    pub poll_interval_ms: u64,
    /// Highest power at which the frequency may be changed, in dBm.
    pub freq_change_max_dbm: f64,
}

impl Default for PowerRampSettings {
    fn default() -> Self {
        PowerRampSettings {
            max_step_db: 3.0,
            max_power_dbm: 40.0,
            poll_tries: 30,
            poll_interval_ms: 100,
            freq_change_max_dbm: 10.0,
        }
    }
}

/// Outcome of a power ramp.
#[derive(Debug, Clone, PartialEq)]
pub struct PowerRampReport {
    /// Every power commanded to the source, in order, in dBm.
    pub commanded: Vec<f64>,
    /// The commanded steps whose readback never caught up.
    pub unsettled: Vec<f64>,
    /// The readback after the last step, in dBm.
    pub final_power: f64,
}

impl PowerRampReport {
    /// Whether every step was reached.
    pub fn settled(&self) -> bool {
        self.unsettled.is_empty()
    }
}

/// Power ramp controller of one client connection.
///
/// The waveguide, RF and amplifier are switched on before the first ramp of a connection and
/// stay on until [`PowerRamp::reset`].
#[derive(Debug, Clone)]
pub struct PowerRamp {
    settings: PowerRampSettings,
    outputs_enabled: bool,
}

impl PowerRamp {
    pub fn new(settings: PowerRampSettings) -> Self {
        PowerRamp {
            settings,
            outputs_enabled: false,
        }
    }

    /// Whether this connection already switched the microwave outputs on.
    #[cfg(test)]
    fn outputs_enabled(&self) -> bool {
        self.outputs_enabled
    }

    /// Forget that the outputs were switched on, e.g., after they were switched off.
    pub fn reset(&mut self) {
        self.outputs_enabled = false;
    }

    /// Ramp the source to `target` dBm.
    ///
    /// Upward moves are staged in steps of at most `max_step_db` above the last commanded value.
    /// Downward moves go in one step. A step whose readback does not arrive within the polling
    /// budget is logged and reported, the ramp carries on.
    pub fn set_power<M, C>(
        &mut self,
        target: f64,
        source: &mut M,
        clock: &C,
    ) -> Result<PowerRampReport, RampError>
    where
        M: MicrowaveSource + ?Sized,
        C: Clock + ?Sized,
    {
        if !(target <= self.settings.max_power_dbm) {
            return Err(RampError::PowerLimitExceeded {
                requested: target,
                limit: self.settings.max_power_dbm,
            });
        }

        if !self.outputs_enabled {
            info!("Enabling waveguide, RF and amplifier");
            source.set_waveguide(true)?;
            source.set_rf(true)?;
            source.set_amplifier(true)?;
            self.outputs_enabled = true;
        }

        let mut report = PowerRampReport {
            commanded: Vec::new(),
            unsettled: Vec::new(),
            final_power: f64::NAN,
        };
        let mut last = source.read_power()?;
        while target > last + self.settings.max_step_db {
            last += self.settings.max_step_db;
            self.step(last, source, clock, &mut report)?;
        }
        self.step(target, source, clock, &mut report)?;
        report.final_power = source.read_power()?;
        Ok(report)
    }

    fn step<M, C>(
        &self,
        dbm: f64,
        source: &mut M,
        clock: &C,
        report: &mut PowerRampReport,
    ) -> Result<(), RampError>
    where
        M: MicrowaveSource + ?Sized,
        C: Clock + ?Sized,
    {
        debug!("Commanding {dbm:.1} dBm");
        source.set_power(dbm)?;
        report.commanded.push(dbm);

        let interval = Duration::from_millis(self.settings.poll_interval_ms);
        let mut readback = f64::NAN;
        for _ in 0..self.settings.poll_tries {
            readback = source.read_power()?;
            if readback >= dbm - READBACK_TOLERANCE_DB {
                return Ok(());
            }
            clock.sleep(interval);
        }
        warn!(
            "Source did not reach {dbm:.1} dBm after {} polls, readback is {readback:.1} dBm",
            self.settings.poll_tries
        );
        report.unsettled.push(dbm);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use rstest::*;

    use super::*;
    use crate::testing::{Event, JournalClock, MockSource, journal};

    #[fixture]
    fn ramp() -> PowerRamp {
        PowerRamp::new(PowerRampSettings::default())
    }

    #[rstest]
    #[case(0.0, 12.0, vec![3.0, 6.0, 9.0, 12.0])]
    #[case(0.0, 2.5, vec![2.5])]
    #[case(10.0, 17.5, vec![13.0, 16.0, 17.5])]
    #[case(20.0, 5.0, vec![5.0])]
    #[case(0.0, 3.0, vec![3.0])]
    fn test_staged_steps(
        mut ramp: PowerRamp,
        #[case] start: f64,
        #[case] target: f64,
        #[case] expected: Vec<f64>,
    ) {
        let jrnl = journal();
        let mut source = MockSource::new(start, &jrnl);
        let clock = JournalClock::new(&jrnl);

        let report = ramp.set_power(target, &mut source, &clock).unwrap();
        assert_eq!(report.commanded, expected);
        assert!(report.settled());
        assert_eq!(report.final_power, target);
    }

    /// No commanded step is ever more than 3 dB above the previous one.
    #[rstest]
    fn test_step_bound(mut ramp: PowerRamp) {
        let jrnl = journal();
        let mut source = MockSource::new(0.0, &jrnl);
        let clock = JournalClock::new(&jrnl);

        let report = ramp.set_power(37.3, &mut source, &clock).unwrap();
        let mut previous = 0.0;
        for dbm in report.commanded {
            assert!(dbm - previous <= 3.0);
            previous = dbm;
        }
        assert_eq!(previous, 37.3);
    }

    /// The outputs are switched on once per connection, before the first power command.
    #[rstest]
    fn test_outputs_enabled_once(mut ramp: PowerRamp) {
        let jrnl = journal();
        let mut source = MockSource::new(0.0, &jrnl);
        let clock = JournalClock::new(&jrnl);

        ramp.set_power(2.0, &mut source, &clock).unwrap();
        ramp.set_power(4.0, &mut source, &clock).unwrap();
        assert!(ramp.outputs_enabled());
        assert_eq!(
            *jrnl.borrow(),
            vec![
                Event::Waveguide(true),
                Event::Rf(true),
                Event::Amplifier(true),
                Event::SetPower(2.0),
                Event::SetPower(4.0),
            ]
        );

        ramp.reset();
        ramp.set_power(1.0, &mut source, &clock).unwrap();
        assert_eq!(
            jrnl.borrow().iter().filter(|e| **e == Event::Rf(true)).count(),
            2
        );
    }

    /// A slow readback is polled with the configured interval.
    #[rstest]
    fn test_polls_until_reached(mut ramp: PowerRamp) {
        let jrnl = journal();
        let mut source = MockSource::new(0.0, &jrnl).with_lag(4);
        let clock = JournalClock::new(&jrnl);

        let report = ramp.set_power(2.0, &mut source, &clock).unwrap();
        assert!(report.settled());
        let sleeps = jrnl
            .borrow()
            .iter()
            .filter(|e| **e == Event::Sleep(Duration::from_millis(100)))
            .count();
        assert_eq!(sleeps, 4);
    }

    /// A readback that never arrives is reported but does not fail the ramp.
    #[rstest]
    fn test_unsettled_is_soft(mut ramp: PowerRamp) {
        let jrnl = journal();
        let mut source = MockSource::new(0.0, &jrnl).with_shortfall(0.5);
        let clock = JournalClock::new(&jrnl);

        let report = ramp.set_power(6.0, &mut source, &clock).unwrap();
        assert_eq!(report.commanded, vec![3.0, 6.0]);
        assert_eq!(report.unsettled, vec![3.0, 6.0]);
        assert_eq!(report.final_power, 5.5);
        assert_eq!(
            jrnl.borrow()
                .iter()
                .filter(|e| matches!(e, Event::Sleep(_)))
                .count(),
            60
        );
    }

    #[rstest]
    #[case(40.5)]
    #[case(f64::NAN)]
    fn test_power_limit(mut ramp: PowerRamp, #[case] target: f64) {
        let jrnl = journal();
        let mut source = MockSource::new(0.0, &jrnl);
        let clock = JournalClock::new(&jrnl);

        let result = ramp.set_power(target, &mut source, &clock);
        assert!(matches!(result, Err(RampError::PowerLimitExceeded { .. })));
        assert!(jrnl.borrow().is_empty());
        assert!(!ramp.outputs_enabled());
    }
}
