//! Leaf records of an instrument bank. None of these hold pointers.

use crate::node::{seek_to, write_zeroes, Node};
use binrw::{
    io::{Read, Seek, SeekFrom, Write},
    BinRead, BinReaderExt, BinResult, BinWrite, BinWriterExt, Endian,
};
use serde::{Deserialize, Serialize};

/// Envelope point modes at or above this value end the point list.
pub const SENTINEL_MODE: u16 = 11;
/// Short envelopes are zero-padded up to this many bytes.
pub const ENVELOPE_MIN_LEN: usize = 32;
const POINT_LEN: usize = 6;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[binrw::binrw]
#[brw(big)]
pub struct VelocityRegion {
    #[brw(pad_after(3))]
    pub velocity: u8,
    pub wsys_id: u16,
    pub wave_id: u16,
    pub volume: f32,
    pub pitch: f32,
    #[brw(ignore)]
    #[serde(skip)]
    pub address: i32,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[binrw::binrw]
#[brw(big)]
pub struct SenseEffect {
    #[brw(pad_after(3))]
    pub target: u8,
    pub register: u8,
    pub key: u8,
    pub floor: f32,
    pub ceiling: f32,
    #[brw(ignore)]
    #[serde(skip)]
    pub address: i32,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[binrw::binrw]
#[brw(big)]
pub struct RandEffect {
    #[brw(pad_after(3))]
    pub target: u8,
    pub floor: f32,
    pub ceiling: f32,
    #[brw(ignore)]
    #[serde(skip)]
    pub address: i32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[binrw::binrw]
#[brw(big)]
pub struct EnvelopePoint {
    pub mode: u16,
    pub delay: u16,
    pub value: i16,
}

impl EnvelopePoint {
    #[inline]
    pub fn is_sentinel(&self) -> bool {
        self.mode >= SENTINEL_MODE
    }
}

/// Control points of an oscillator envelope. The last point, and only the
/// last, has a mode of [`SENTINEL_MODE`] or above.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub points: Vec<EnvelopePoint>,
    #[serde(skip)]
    pub address: i32,
}

impl Envelope {
    #[inline]
    pub fn new(points: Vec<EnvelopePoint>) -> Self {
        Self { points, address: 0 }
    }
    #[inline]
    fn payload_len(&self) -> usize {
        self.points.len() * POINT_LEN
    }
    fn check_terminated(&self, pos: u64) -> BinResult<()> {
        let message = match self.points.split_last() {
            None => "envelope has no points",
            Some((last, _)) if !last.is_sentinel() => "envelope does not end with a sentinel point",
            Some((_, rest)) if rest.iter().any(EnvelopePoint::is_sentinel) => {
                "envelope has a sentinel point before its end"
            }
            Some(_) => return Ok(()),
        };
        Err(binrw::Error::AssertFail {
            pos,
            message: message.into(),
        })
    }
}

/// Counts points up to and including the first sentinel.
fn count_points<R: Read + Seek>(reader: &mut R, endian: Endian) -> BinResult<usize> {
    let mut count = 0;
    loop {
        let mode: u16 = reader.read_type(endian)?;
        count += 1;
        if mode >= SENTINEL_MODE {
            return Ok(count);
        }
        let _delay_value: u32 = reader.read_type(endian)?;
    }
}

impl BinRead for Envelope {
    type Args<'a> = ();

    fn read_options<R: Read + Seek>(
        reader: &mut R,
        endian: Endian,
        _: Self::Args<'_>,
    ) -> BinResult<Self> {
        let start = reader.stream_position()?;
        let count = count_points(reader, endian)?;
        reader.seek(SeekFrom::Start(start))?;
        let points = (0..count)
            .map(|_| reader.read_type(endian))
            .collect::<BinResult<_>>()?;
        Ok(Self::new(points))
    }
}

impl BinWrite for Envelope {
    type Args<'a> = ();

    fn write_options<W: Write + Seek>(
        &self,
        writer: &mut W,
        endian: Endian,
        _: Self::Args<'_>,
    ) -> BinResult<()> {
        self.check_terminated(writer.stream_position()?)?;
        for point in &self.points {
            writer.write_type(point, endian)?;
        }
        let len = self.payload_len();
        if len <= ENVELOPE_MIN_LEN {
            write_zeroes(writer, ENVELOPE_MIN_LEN - len)?;
        }
        Ok(())
    }
}

impl Node for Envelope {
    fn address(&self) -> i32 {
        self.address
    }
    fn set_address(&mut self, address: i32) {
        self.address = address;
    }
    fn record_len(&self) -> u32 {
        self.payload_len().max(ENVELOPE_MIN_LEN) as u32
    }
    fn write_tree<W: Write + Seek>(&self, writer: &mut W, anchor: u64) -> BinResult<()> {
        seek_to(writer, anchor, self.address)?;
        writer.write_be(self)
    }
}

macro_rules! fixed_node {
    ($($ty:ty => $len:expr),* $(,)?) => {$(
        impl Node for $ty {
            fn address(&self) -> i32 {
                self.address
            }
            fn set_address(&mut self, address: i32) {
                self.address = address;
            }
            fn record_len(&self) -> u32 {
                $len
            }
            fn write_tree<W: Write + Seek>(&self, writer: &mut W, anchor: u64) -> BinResult<()> {
                seek_to(writer, anchor, self.address)?;
                writer.write_be(self)
            }
        }
    )*};
}

fixed_node! {
    VelocityRegion => 16,
    SenseEffect => 14,
    RandEffect => 12,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn point(mode: u16, delay: u16, value: i16) -> EnvelopePoint {
        EnvelopePoint { mode, delay, value }
    }

    fn encode(write: impl FnOnce(&mut Cursor<Vec<u8>>) -> BinResult<()>) -> Vec<u8> {
        let mut cur = Cursor::new(Vec::new());
        write(&mut cur).unwrap();
        cur.into_inner()
    }

    #[test]
    fn envelope_stops_at_first_sentinel() {
        let mut data = Vec::new();
        for p in [point(0, 10, 100), point(3, 20, -5), point(11, 0, 0), point(1, 1, 1)] {
            data.extend_from_slice(&encode(|c| c.write_be(&p)));
        }
        let env = Envelope::read_be(&mut Cursor::new(&data)).unwrap();
        assert_eq!(env.points, [point(0, 10, 100), point(3, 20, -5), point(11, 0, 0)]);
    }

    #[test]
    fn envelope_decodes_its_own_encoding() {
        let points: Vec<_> = (0..7u16)
            .map(|i| point(i, i * 3, -(i as i16)))
            .chain([point(13, 2, 9)])
            .collect();
        let env = Envelope::new(points.clone());
        let decoded = Envelope::read_be(&mut Cursor::new(encode(|c| c.write_be(&env)))).unwrap();
        assert_eq!(decoded.points, points);
    }

    #[test]
    fn short_envelope_is_padded_to_32_bytes() {
        let env = Envelope::new(vec![point(0, 1, 2), point(12, 0, 0)]);
        let bytes = encode(|c| c.write_be(&env));
        assert_eq!(bytes.len(), 32);
        assert!(bytes[12..].iter().all(|b| *b == 0));
        assert_eq!(env.record_len(), 32);
    }

    #[test]
    fn long_envelope_is_not_padded() {
        let mut points = vec![point(1, 1, 1); 5];
        points.push(point(11, 0, 0));
        let env = Envelope::new(points);
        assert_eq!(encode(|c| c.write_be(&env)).len(), 36);
        assert_eq!(env.record_len(), 36);
    }

    #[test]
    fn unterminated_envelope_fails_to_encode() {
        let mut cur = Cursor::new(Vec::new());
        let env = Envelope::new(vec![point(0, 1, 2)]);
        assert!(cur.write_be(&env).is_err());
        let env = Envelope::new(vec![point(11, 1, 2), point(11, 0, 0)]);
        assert!(cur.write_be(&env).is_err());
        assert!(cur.write_be(&Envelope::default()).is_err());
    }

    #[test]
    fn truncated_envelope_is_an_io_error() {
        let data = encode(|c| c.write_be(&point(0, 1, 2)));
        let err = Envelope::read_be(&mut Cursor::new(data)).unwrap_err();
        assert!(matches!(err, binrw::Error::Io(ref e) if e.kind() == std::io::ErrorKind::UnexpectedEof));
    }

    #[test]
    fn velocity_region_layout() {
        let region = VelocityRegion {
            velocity: 127,
            wsys_id: 1,
            wave_id: 2,
            volume: 1.0,
            pitch: 1.0,
            address: 0,
        };
        let bytes = encode(|c| c.write_be(&region));
        assert_eq!(
            bytes,
            [0x7f, 0, 0, 0, 0, 1, 0, 2, 0x3f, 0x80, 0, 0, 0x3f, 0x80, 0, 0]
        );
        assert_eq!(VelocityRegion::read(&mut Cursor::new(bytes)).unwrap(), region);
    }

    #[test]
    fn effect_layouts() {
        let sense = SenseEffect {
            target: 2,
            register: 4,
            key: 60,
            floor: 0.5,
            ceiling: 2.0,
            address: 0,
        };
        let bytes = encode(|c| c.write_be(&sense));
        assert_eq!(bytes.len(), sense.record_len() as usize);
        assert_eq!(&bytes[..6], [2, 0, 0, 0, 4, 60]);
        assert_eq!(SenseEffect::read(&mut Cursor::new(bytes)).unwrap(), sense);

        let rand = RandEffect {
            target: 1,
            floor: -1.0,
            ceiling: 1.0,
            address: 0,
        };
        let bytes = encode(|c| c.write_be(&rand));
        assert_eq!(bytes.len(), rand.record_len() as usize);
        assert_eq!(RandEffect::read(&mut Cursor::new(bytes)).unwrap(), rand);
    }
}
