pub mod bank;
pub mod build;
pub mod extract;
pub mod inspect;
pub mod instrument;
pub mod node;
pub mod oscillator;
pub mod percussion;
pub mod records;

pub use bank::Bank;
pub use instrument::{Instrument, KeyRegion, StandardInstrument};
pub use node::{Layout, Node};
pub use oscillator::Oscillator;
pub use percussion::{PercussionEntry, PercussionKit};
pub use records::{Envelope, EnvelopePoint, RandEffect, SenseEffect, VelocityRegion};

/// Parses a byte offset given on the command line, either decimal or `0x` hex.
pub fn parse_offset(s: &str) -> Result<u64, std::num::ParseIntError> {
    match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => s.parse(),
    }
}

#[inline]
fn invalid_data(args: impl std::fmt::Display) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::InvalidData, args.to_string())
}

#[inline]
fn is_log_level(lvl: log::LevelFilter) -> bool {
    lvl <= log::STATIC_MAX_LEVEL && lvl <= log::max_level()
}
