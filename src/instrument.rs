use crate::{
    node::{address_of, read_offset_table, resolve, resolve_at, seek_to, write_zeroes, Layout, Node},
    oscillator::Oscillator,
    percussion::PercussionKit,
    records::{RandEffect, SenseEffect, VelocityRegion},
};
use binrw::{
    io::{Read, Seek, Write},
    BinRead, BinReaderExt, BinResult, BinWrite, BinWriterExt, Endian,
};
use serde::{Deserialize, Serialize};

pub const INST: u32 = u32::from_be_bytes(*b"INST");
pub const PER2: u32 = u32::from_be_bytes(*b"PER2");

/// Key regions are padded to a multiple of this length, counted from the
/// start of the record.
const KEY_REGION_ALIGN: u32 = 16;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Instrument {
    Standard(StandardInstrument),
    Percussion(PercussionKit),
}

/// Result of reading an instrument header.
#[derive(Clone, Debug, PartialEq)]
pub enum Tagged {
    Instrument(Instrument),
    /// The header held neither [`INST`] nor [`PER2`]. Treated as an absent slot.
    Unknown(u32),
}

impl Tagged {
    #[inline]
    pub fn into_instrument(self) -> Option<Instrument> {
        match self {
            Self::Instrument(inst) => Some(inst),
            Self::Unknown(_) => None,
        }
    }
}

impl Instrument {
    /// Reads the 4-byte variant tag at the current position and decodes the
    /// matching body. An unrecognized tag is not an error.
    pub fn read_tagged<R: Read + Seek>(
        reader: &mut R,
        endian: Endian,
        anchor: u64,
    ) -> BinResult<Tagged> {
        let tag: u32 = reader.read_type(endian)?;
        Ok(match tag {
            INST => Tagged::Instrument(Self::Standard(reader.read_type_args(endian, anchor)?)),
            PER2 => Tagged::Instrument(Self::Percussion(reader.read_type_args(endian, anchor)?)),
            tag => Tagged::Unknown(tag),
        })
    }
    #[inline]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Standard(_) => "INST",
            Self::Percussion(_) => "PER2",
        }
    }
}

impl BinWrite for Instrument {
    type Args<'a> = ();

    fn write_options<W: Write + Seek>(
        &self,
        writer: &mut W,
        endian: Endian,
        _: Self::Args<'_>,
    ) -> BinResult<()> {
        match self {
            Self::Standard(inst) => writer.write_type(inst, endian),
            Self::Percussion(kit) => writer.write_type(kit, endian),
        }
    }
}

impl Node for Instrument {
    fn address(&self) -> i32 {
        match self {
            Self::Standard(inst) => inst.address,
            Self::Percussion(kit) => kit.address,
        }
    }
    fn set_address(&mut self, address: i32) {
        match self {
            Self::Standard(inst) => inst.address = address,
            Self::Percussion(kit) => kit.address = address,
        }
    }
    fn record_len(&self) -> u32 {
        match self {
            Self::Standard(inst) => inst.record_len(),
            Self::Percussion(kit) => kit.record_len(),
        }
    }
    fn place(&mut self, layout: &mut Layout) {
        match self {
            Self::Standard(inst) => inst.place(layout),
            Self::Percussion(kit) => kit.place(layout),
        }
    }
    fn write_tree<W: Write + Seek>(&self, writer: &mut W, anchor: u64) -> BinResult<()> {
        match self {
            Self::Standard(inst) => inst.write_tree(writer, anchor),
            Self::Percussion(kit) => kit.write_tree(writer, anchor),
        }
    }
}

/// A pitched instrument mapping keys and velocities to waves.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StandardInstrument {
    pub pitch: f32,
    pub volume: f32,
    pub oscillators: [Option<Oscillator>; 2],
    pub sense_effects: [Option<SenseEffect>; 2],
    pub rand_effects: [Option<RandEffect>; 2],
    pub key_regions: Vec<Option<KeyRegion>>,
    #[serde(skip)]
    pub address: i32,
}

/// Reads the body that follows an [`INST`] tag. Writing emits the tag too.
impl BinRead for StandardInstrument {
    type Args<'a> = u64;

    fn read_options<R: Read + Seek>(
        reader: &mut R,
        endian: Endian,
        anchor: Self::Args<'_>,
    ) -> BinResult<Self> {
        let _reserved: u32 = reader.read_type(endian)?;
        let pitch = reader.read_type(endian)?;
        let volume = reader.read_type(endian)?;
        let refs: [i32; 6] = reader.read_type(endian)?;
        let key_offsets = read_offset_table(reader, endian)?;

        let [osc_a, osc_b, sense_a, sense_b, rand_a, rand_b] = refs;
        let mut osc = |offset| {
            resolve(reader, anchor, offset, |r| r.read_type_args::<Oscillator>(endian, anchor))
        };
        let oscillators = [osc(osc_a)?, osc(osc_b)?];
        let mut sense = |offset| resolve(reader, anchor, offset, |r| r.read_type::<SenseEffect>(endian));
        let sense_effects = [sense(sense_a)?, sense(sense_b)?];
        let mut rand = |offset| resolve(reader, anchor, offset, |r| r.read_type::<RandEffect>(endian));
        let rand_effects = [rand(rand_a)?, rand(rand_b)?];
        let key_regions = key_offsets
            .into_iter()
            .map(|offset| {
                resolve(reader, anchor, offset, |r| {
                    r.read_type_args::<KeyRegion>(endian, anchor)
                })
            })
            .collect::<BinResult<_>>()?;

        Ok(Self {
            pitch,
            volume,
            oscillators,
            sense_effects,
            rand_effects,
            key_regions,
            address: 0,
        })
    }
}

impl BinWrite for StandardInstrument {
    type Args<'a> = ();

    fn write_options<W: Write + Seek>(
        &self,
        writer: &mut W,
        endian: Endian,
        _: Self::Args<'_>,
    ) -> BinResult<()> {
        writer.write_type(&INST, endian)?;
        writer.write_type(&0u32, endian)?;
        writer.write_type(&self.pitch, endian)?;
        writer.write_type(&self.volume, endian)?;
        for osc in &self.oscillators {
            writer.write_type(&address_of(osc.as_ref()), endian)?;
        }
        for sense in &self.sense_effects {
            writer.write_type(&address_of(sense.as_ref()), endian)?;
        }
        for rand in &self.rand_effects {
            writer.write_type(&address_of(rand.as_ref()), endian)?;
        }
        writer.write_type(&(self.key_regions.len() as u32), endian)?;
        for key in &self.key_regions {
            writer.write_type(&address_of(key.as_ref()), endian)?;
        }
        Ok(())
    }
}

impl Node for StandardInstrument {
    fn address(&self) -> i32 {
        self.address
    }
    fn set_address(&mut self, address: i32) {
        self.address = address;
    }
    fn record_len(&self) -> u32 {
        44 + 4 * self.key_regions.len() as u32
    }
    fn place(&mut self, layout: &mut Layout) {
        self.address = layout.alloc(self.record_len());
        self.oscillators.iter_mut().flatten().for_each(|n| n.place(layout));
        self.sense_effects.iter_mut().flatten().for_each(|n| n.place(layout));
        self.rand_effects.iter_mut().flatten().for_each(|n| n.place(layout));
        self.key_regions.iter_mut().flatten().for_each(|n| n.place(layout));
    }
    fn write_tree<W: Write + Seek>(&self, writer: &mut W, anchor: u64) -> BinResult<()> {
        seek_to(writer, anchor, self.address)?;
        writer.write_be(self)?;
        for osc in self.oscillators.iter().flatten() {
            osc.write_tree(writer, anchor)?;
        }
        for sense in self.sense_effects.iter().flatten() {
            sense.write_tree(writer, anchor)?;
        }
        for rand in self.rand_effects.iter().flatten() {
            rand.write_tree(writer, anchor)?;
        }
        for key in self.key_regions.iter().flatten() {
            key.write_tree(writer, anchor)?;
        }
        Ok(())
    }
}

/// Velocity layers for the keys up to `base_key`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct KeyRegion {
    pub base_key: u8,
    pub velocities: Vec<VelocityRegion>,
    #[serde(skip)]
    pub address: i32,
}

impl BinRead for KeyRegion {
    type Args<'a> = u64;

    fn read_options<R: Read + Seek>(
        reader: &mut R,
        endian: Endian,
        anchor: Self::Args<'_>,
    ) -> BinResult<Self> {
        let base_key = reader.read_type(endian)?;
        let _reserved: [u8; 3] = reader.read_type(endian)?;
        let velocities = read_velocities(reader, endian, anchor)?;
        Ok(Self {
            base_key,
            velocities,
            address: 0,
        })
    }
}

impl KeyRegion {
    #[inline]
    fn payload_len(&self) -> u32 {
        8 + 4 * self.velocities.len() as u32
    }
}

impl BinWrite for KeyRegion {
    type Args<'a> = ();

    fn write_options<W: Write + Seek>(
        &self,
        writer: &mut W,
        endian: Endian,
        _: Self::Args<'_>,
    ) -> BinResult<()> {
        writer.write_type(&self.base_key, endian)?;
        write_zeroes(writer, 3)?;
        write_velocities(writer, endian, &self.velocities)?;
        write_zeroes(writer, (self.record_len() - self.payload_len()) as usize)
    }
}

impl Node for KeyRegion {
    fn address(&self) -> i32 {
        self.address
    }
    fn set_address(&mut self, address: i32) {
        self.address = address;
    }
    fn record_len(&self) -> u32 {
        self.payload_len().div_ceil(KEY_REGION_ALIGN) * KEY_REGION_ALIGN
    }
    fn place(&mut self, layout: &mut Layout) {
        self.address = layout.alloc(self.record_len());
        self.velocities.iter_mut().for_each(|v| v.place(layout));
    }
    fn write_tree<W: Write + Seek>(&self, writer: &mut W, anchor: u64) -> BinResult<()> {
        seek_to(writer, anchor, self.address)?;
        writer.write_be(self)?;
        for vel in &self.velocities {
            vel.write_tree(writer, anchor)?;
        }
        Ok(())
    }
}

/// Reads a counted velocity-region pointer table and follows every entry.
/// Velocity pointers have no absent marker.
pub(crate) fn read_velocities<R: Read + Seek>(
    reader: &mut R,
    endian: Endian,
    anchor: u64,
) -> BinResult<Vec<VelocityRegion>> {
    read_offset_table(reader, endian)?
        .into_iter()
        .map(|offset| resolve_at(reader, anchor, offset, |r| r.read_type::<VelocityRegion>(endian)))
        .collect()
}

pub(crate) fn write_velocities<W: Write + Seek>(
    writer: &mut W,
    endian: Endian,
    velocities: &[VelocityRegion],
) -> BinResult<()> {
    writer.write_type(&(velocities.len() as i32), endian)?;
    for vel in velocities {
        writer.write_type(&vel.address, endian)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn velocity(velocity: u8, wave_id: u16) -> VelocityRegion {
        VelocityRegion {
            velocity,
            wsys_id: 1,
            wave_id,
            volume: 1.0,
            pitch: 1.0,
            address: 0,
        }
    }

    fn sample() -> StandardInstrument {
        let mut inst = StandardInstrument {
            pitch: 1.0,
            volume: 0.8,
            oscillators: [Some(Oscillator::default()), None],
            sense_effects: [None, Some(SenseEffect::default())],
            rand_effects: [Some(RandEffect::default()), Some(RandEffect::default())],
            key_regions: vec![
                Some(KeyRegion {
                    base_key: 60,
                    velocities: vec![velocity(127, 2)],
                    address: 0,
                }),
                None,
                Some(KeyRegion {
                    base_key: 127,
                    velocities: vec![velocity(64, 3), velocity(127, 4)],
                    address: 0,
                }),
            ],
            address: 0,
        };
        inst.place(&mut Layout::new(0x40));
        inst
    }

    fn encode_tree(node: &impl Node) -> Vec<u8> {
        let mut cur = Cursor::new(Vec::new());
        node.write_tree(&mut cur, 0).unwrap();
        cur.into_inner()
    }

    fn decode(data: &[u8], at: u64) -> Tagged {
        let mut cur = Cursor::new(data);
        cur.set_position(at);
        let mut tagged = Instrument::read_tagged(&mut cur, Endian::Big, 0).unwrap();
        if let Tagged::Instrument(inst) = &mut tagged {
            inst.set_address(at as i32);
        }
        tagged
    }

    #[test]
    fn standard_instrument_decodes_its_own_tree() {
        let inst = sample();
        let data = encode_tree(&inst);
        let decoded = decode(&data, inst.address as u64);
        assert_eq!(decoded, Tagged::Instrument(Instrument::Standard(inst)));
    }

    #[test]
    fn zeroed_reference_is_absent() {
        let mut inst = sample();
        inst.rand_effects[1] = None;
        let data = encode_tree(&inst);
        let rand_b = inst.address as usize + 4 * 9;
        assert_eq!(data[rand_b..rand_b + 4], [0, 0, 0, 0]);

        let Tagged::Instrument(Instrument::Standard(decoded)) = decode(&data, inst.address as u64)
        else {
            panic!("expected a standard instrument");
        };
        assert!(decoded.rand_effects[1].is_none());
        assert_eq!(decoded, inst);
    }

    #[test]
    fn every_zeroed_reference_is_absent() {
        for index in 0..6 {
            let mut inst = StandardInstrument {
                oscillators: [Some(Oscillator::default()), Some(Oscillator::default())],
                sense_effects: [Some(SenseEffect::default()), Some(SenseEffect::default())],
                rand_effects: [Some(RandEffect::default()), Some(RandEffect::default())],
                ..Default::default()
            };
            match index {
                0 | 1 => inst.oscillators[index] = None,
                2 | 3 => inst.sense_effects[index - 2] = None,
                _ => inst.rand_effects[index - 4] = None,
            }
            inst.place(&mut Layout::new(0x40));
            let data = encode_tree(&inst);
            let field = inst.address as usize + 16 + 4 * index;
            assert_eq!(data[field..field + 4], [0, 0, 0, 0], "reference {index}");

            let Tagged::Instrument(decoded) = decode(&data, inst.address as u64) else {
                panic!("expected an instrument");
            };
            assert_eq!(decoded, Instrument::Standard(inst), "reference {index}");
            assert_eq!(encode_tree(&decoded), data, "reference {index}");
        }
    }

    #[test]
    fn unknown_tag_is_not_an_error() {
        let data = *b"ABCD\0\0\0\0";
        assert_eq!(decode(&data, 0), Tagged::Unknown(u32::from_be_bytes(*b"ABCD")));
        assert_eq!(decode(&data, 0).into_instrument(), None);
    }

    #[test]
    fn key_region_pads_to_16_bytes() {
        let region = KeyRegion {
            base_key: 60,
            velocities: vec![velocity(1, 1), velocity(2, 2)],
            address: 0,
        };
        let mut cur = Cursor::new(Vec::new());
        cur.write_be(&region).unwrap();
        let bytes = cur.into_inner();
        assert_eq!(bytes.len(), 16);
        assert_eq!(region.record_len(), 16);
        assert_eq!(bytes[..8], [60, 0, 0, 0, 0, 0, 0, 2]);

        let region = KeyRegion {
            velocities: vec![velocity(1, 1); 2 + 4],
            ..region
        };
        assert_eq!(region.record_len(), 32);
    }

    #[test]
    fn key_region_padding_is_relative_to_the_record() {
        let region = KeyRegion {
            base_key: 60,
            velocities: vec![velocity(127, 2)],
            address: 0,
        };
        let mut cur = Cursor::new(Vec::new());
        cur.set_position(8);
        cur.write_be(&region).unwrap();
        assert_eq!(cur.position(), 8 + region.record_len() as u64);
    }

    #[test]
    fn instrument_record_starts_with_tag() {
        let inst = sample();
        let mut cur = Cursor::new(Vec::new());
        cur.write_be(&Instrument::Standard(inst.clone())).unwrap();
        let bytes = cur.into_inner();
        assert_eq!(bytes[..4], *b"INST");
        assert_eq!(bytes.len() as u32, inst.record_len());
    }
}
