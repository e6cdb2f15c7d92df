//! Tests for the gaussmeter driver.

use rstest::*;

use odnp_drivers::Gaussmeter;
use odnp_interface::{InstrumentError, LoopbackInterface};

fn crt_inst(host2inst: Vec<&str>, inst2host: Vec<&str>) -> Gaussmeter<LoopbackInterface> {
    Gaussmeter::try_new(LoopbackInterface::new(host2inst, inst2host, "\r\n")).unwrap()
}

#[rstest]
fn test_get_field() {
    let mut inst = crt_inst(vec!["RDGFIELD?"], vec!["+3.4982E+03"]);
    assert_eq!(inst.get_field().unwrap(), 3498.2);
}

#[rstest]
#[case("OL")]
#[case("+9.999E+99")]
fn test_get_field_overload(#[case] response: &str) {
    let mut inst = crt_inst(vec!["RDGFIELD?"], vec![response]);
    assert!(matches!(
        inst.get_field(),
        Err(InstrumentError::InstrumentStatus(_))
    ));
}

#[rstest]
fn test_get_field_garbage() {
    let mut inst = crt_inst(vec!["RDGFIELD?"], vec!["NOPROBE"]);
    assert!(matches!(
        inst.get_field(),
        Err(InstrumentError::ResponseParseError(_))
    ));
}

#[rstest]
fn test_zero_probe_and_name() {
    let mut inst = crt_inst(vec!["*IDN?", "ZPROBE"], vec!["LSCI,MODEL475,0,1.0"]);
    assert_eq!(inst.get_name().unwrap(), "LSCI,MODEL475,0,1.0");
    inst.zero_probe().unwrap();
}
