//! Tests for the power meter driver.

use rstest::*;

use odnp_drivers::PowerMeter;
use odnp_interface::LoopbackInterface;

#[rstest]
fn test_get_power_dbm() {
    let lbk = LoopbackInterface::new(vec!["*IDN?", "MEAS?"], vec!["ACME,PM-9,77,3.0", "-4.27"], "\n");
    let mut inst = PowerMeter::try_new(lbk).unwrap();
    assert_eq!(inst.get_name().unwrap(), "ACME,PM-9,77,3.0");
    assert_eq!(inst.get_power_dbm().unwrap(), -4.27);
}
