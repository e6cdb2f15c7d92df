//! In-memory log of microwave detector readings.
//!
//! While a session is active the server appends one sample per idle tick and one per received
//! command. [`LogSession::stop`] drains everything into a single blob:
//!
//! ```text
//! {"1":"SET_POWER 12.0",...}ENDDICT[{"time":1.5,"reflected_power":..,"forward_power":..,"cmd":1},...]ENDARRAY
//! ```
//!
//! The dictionary maps command ids to the command text. Samples taken while idle carry id `0`.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Marks the end of the command dictionary in a drained log.
pub const END_DICT: &[u8] = b"ENDDICT";
/// Marks the end of the sample array in a drained log.
pub const END_ARRAY: &[u8] = b"ENDARRAY";

/// One reading of the detectors.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleRecord {
    pub timestamp: DateTime<Utc>,
    pub reflected_power: f64,
    pub forward_power: f64,
    /// The command that was received when the sample was taken, if any.
    pub command: Option<String>,
}

/// A sample as it appears on the wire.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct WireSample {
    /// Seconds since the Unix epoch.
    pub time: f64,
    pub reflected_power: f64,
    pub forward_power: f64,
    /// Key into the command dictionary, `0` for idle samples.
    pub cmd: u32,
}

/// The log session of the server.
#[derive(Debug, Default)]
pub struct LogSession {
    active: bool,
    samples: Vec<SampleRecord>,
}

impl LogSession {
    pub fn new() -> Self {
        LogSession::default()
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Number of samples recorded since the last stop.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Start recording. Starting an active session keeps its samples.
    pub fn start(&mut self) {
        self.active = true;
    }

    /// Append a sample.
    pub fn add(&mut self, sample: SampleRecord) {
        self.samples.push(sample);
    }

    /// Stop recording and drain the samples into the wire format.
    pub fn stop(&mut self) -> Result<Vec<u8>, serde_json::Error> {
        self.active = false;
        let samples = std::mem::take(&mut self.samples);
        encode(&samples)
    }
}

fn encode(samples: &[SampleRecord]) -> Result<Vec<u8>, serde_json::Error> {
    let mut ids: HashMap<&str, u32> = HashMap::new();
    let mut dict: BTreeMap<u32, &str> = BTreeMap::new();
    let mut wire = Vec::with_capacity(samples.len());
    for sample in samples {
        let cmd = match sample.command.as_deref() {
            None => 0,
            Some(text) => *ids.entry(text).or_insert_with(|| {
                let id = dict.len() as u32 + 1;
                dict.insert(id, text);
                id
            }),
        };
        wire.push(WireSample {
            time: sample.timestamp.timestamp_micros() as f64 / 1e6,
            reflected_power: sample.reflected_power,
            forward_power: sample.forward_power,
            cmd,
        });
    }

    let mut out = serde_json::to_vec(&dict)?;
    out.extend_from_slice(END_DICT);
    serde_json::to_writer(&mut out, &wire)?;
    out.extend_from_slice(END_ARRAY);
    Ok(out)
}

/// A drained log after parsing.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedLog {
    pub commands: BTreeMap<u32, String>,
    pub samples: Vec<WireSample>,
}

/// Errors when parsing a drained log.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("Sentinel {0} not found")]
    MissingSentinel(&'static str),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Split the first complete log off `bytes` and parse it.
///
/// Returns the log and the number of bytes it occupied.
pub fn decode(bytes: &[u8]) -> Result<(DecodedLog, usize), DecodeError> {
    let dict_end = find(bytes, END_DICT).ok_or(DecodeError::MissingSentinel("ENDDICT"))?;
    let rest = &bytes[dict_end + END_DICT.len()..];
    let array_end = find(rest, END_ARRAY).ok_or(DecodeError::MissingSentinel("ENDARRAY"))?;

    let commands = serde_json::from_slice(&bytes[..dict_end])?;
    let samples = serde_json::from_slice(&rest[..array_end])?;
    let consumed = dict_end + END_DICT.len() + array_end + END_ARRAY.len();
    Ok((DecodedLog { commands, samples }, consumed))
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
