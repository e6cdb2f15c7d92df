//! Tests for the generic [`Instrument`] interface.

use std::{collections::VecDeque, time::Duration};

use rstest::*;

use odnp_interface::{Instrument, InstrumentError, InstrumentInterface};

/// Empty instrument with the default three second timeout.
#[fixture]
fn empt_inst() -> Instrument<VecDeque<u8>> {
    Instrument::new(VecDeque::new(), Duration::from_secs(3))
}

/// Instrument holding an unterminated response and no time to wait for the rest.
#[fixture]
fn no_term_inst() -> Instrument<VecDeque<u8>> {
    Instrument::new(VecDeque::from(b"resp".to_vec()), Duration::from_secs(0))
}

#[rstest]
fn test_instrument_terminator(mut empt_inst: Instrument<VecDeque<u8>>) {
    assert_eq!(empt_inst.get_terminator(), "\n");
    empt_inst.set_terminator("\r\n");
    assert_eq!(empt_inst.get_terminator(), "\r\n");
}

#[rstest]
fn test_instrument_timeout(empt_inst: Instrument<VecDeque<u8>>) {
    assert_eq!(empt_inst.get_timeout(), Duration::from_secs(3));
}

/// `VecDeque<u8>` reads back what was written, so a command comes back as its own response.
#[rstest]
fn test_instrument_echo_query(mut empt_inst: Instrument<VecDeque<u8>>) {
    assert_eq!(empt_inst.query("12.50").unwrap(), "12.50");
    assert_eq!(empt_inst.query_f64("-3.5").unwrap(), -3.5);
}

#[rstest]
fn test_instrument_custom_terminator(mut empt_inst: Instrument<VecDeque<u8>>) {
    empt_inst.set_terminator("\r\n");
    empt_inst.write_raw(b"first\r\nsecond\r\n").unwrap();
    assert_eq!(empt_inst.read_until_terminator().unwrap(), "first");
    assert_eq!(empt_inst.read_until_terminator().unwrap(), "second");
}

#[rstest]
fn test_instrument_read_until_terminator_timeout(mut no_term_inst: Instrument<VecDeque<u8>>) {
    match no_term_inst.read_until_terminator() {
        Err(InstrumentError::Timeout(timeout)) => assert_eq!(timeout, Duration::from_secs(0)),
        other => panic!("Expected timeout error, got {other:?}"),
    }
}

#[rstest]
fn test_instrument_query_timeout(mut no_term_inst: Instrument<VecDeque<u8>>) {
    match no_term_inst.query("FIELD?") {
        Err(InstrumentError::TimeoutQuery { query, timeout }) => {
            assert_eq!(query, "FIELD?");
            assert_eq!(timeout, Duration::from_secs(0));
        }
        other => panic!("Expected query timeout error, got {other:?}"),
    }
}
