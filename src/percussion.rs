use crate::{
    instrument::{read_velocities, write_velocities, PER2},
    node::{address_of, check_slots, read_offsets, resolve, seek_to, write_zeroes, Layout, Node},
    records::VelocityRegion,
};
use binrw::{
    io::{Read, Seek, SeekFrom, Write},
    BinRead, BinReaderExt, BinResult, BinWrite, BinWriterExt, Endian,
};
use serde::{Deserialize, Serialize};

/// Number of key slots in a percussion kit.
pub const KIT_SLOTS: usize = 100;

const HEADER_PAD: usize = 0x84;
const FLAG1_PAD: usize = 0x70;
const FLAG2_PAD: usize = 0x1c;
const TRAILER_PAD: usize = 0x50;

/// Bytes following the [`PER2`] tag.
pub const KIT_BODY_LEN: usize =
    HEADER_PAD + KIT_SLOTS * 4 + FLAG1_PAD + KIT_SLOTS + FLAG2_PAD + KIT_SLOTS * 2 + TRAILER_PAD;

/// A drum kit: one optional entry per key.
///
/// The per-key flags are not stored with the entries. They live in two
/// parallel arrays after the pointer table, indexed by slot.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PercussionKit {
    pub sounds: Vec<Option<PercussionEntry>>,
    #[serde(skip)]
    pub address: i32,
}

impl Default for PercussionKit {
    fn default() -> Self {
        Self {
            sounds: vec![None; KIT_SLOTS],
            address: 0,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PercussionEntry {
    pub pitch: f32,
    pub volume: f32,
    pub velocities: Vec<VelocityRegion>,
    pub flag1: u8,
    pub flag2: u16,
    #[serde(skip)]
    pub address: i32,
}

#[inline]
fn skip<S: Seek>(stream: &mut S, len: usize) -> BinResult<()> {
    stream.seek(SeekFrom::Current(len as i64))?;
    Ok(())
}

/// Reads the body that follows a [`PER2`] tag. Writing emits the tag too.
impl BinRead for PercussionKit {
    type Args<'a> = u64;

    fn read_options<R: Read + Seek>(
        reader: &mut R,
        endian: Endian,
        anchor: Self::Args<'_>,
    ) -> BinResult<Self> {
        skip(reader, HEADER_PAD)?;
        let offsets = read_offsets(reader, endian, KIT_SLOTS)?;
        // entries may sit anywhere in the bank; come back here for the flags
        let table_end = reader.stream_position()?;
        let mut sounds = offsets
            .iter()
            .map(|&offset| {
                resolve(reader, anchor, offset, |r| {
                    r.read_type_args::<PercussionEntry>(endian, anchor)
                })
            })
            .collect::<BinResult<Vec<_>>>()?;
        reader.seek(SeekFrom::Start(table_end))?;

        skip(reader, FLAG1_PAD)?;
        for sound in sounds.iter_mut() {
            let flag: u8 = reader.read_type(endian)?;
            if let Some(sound) = sound {
                sound.flag1 = flag;
            }
        }
        skip(reader, FLAG2_PAD)?;
        for sound in sounds.iter_mut() {
            let flag: u16 = reader.read_type(endian)?;
            if let Some(sound) = sound {
                sound.flag2 = flag;
            }
        }
        skip(reader, TRAILER_PAD)?;

        log::trace!(
            "percussion kit with {} of {KIT_SLOTS} slots in use",
            sounds.iter().flatten().count()
        );
        Ok(Self {
            sounds,
            address: 0,
        })
    }
}

impl BinWrite for PercussionKit {
    type Args<'a> = ();

    fn write_options<W: Write + Seek>(
        &self,
        writer: &mut W,
        endian: Endian,
        _: Self::Args<'_>,
    ) -> BinResult<()> {
        check_slots(
            self.sounds.len(),
            KIT_SLOTS,
            writer.stream_position()?,
            "percussion",
        )?;
        let slots = || (0..KIT_SLOTS).map(move |i| self.sounds.get(i).and_then(Option::as_ref));
        writer.write_type(&PER2, endian)?;
        write_zeroes(writer, HEADER_PAD)?;
        for sound in slots() {
            writer.write_type(&address_of(sound), endian)?;
        }
        write_zeroes(writer, FLAG1_PAD)?;
        for sound in slots() {
            writer.write_type(&sound.map_or(0, |s| s.flag1), endian)?;
        }
        write_zeroes(writer, FLAG2_PAD)?;
        for sound in slots() {
            writer.write_type(&sound.map_or(0, |s| s.flag2), endian)?;
        }
        write_zeroes(writer, TRAILER_PAD)
    }
}

impl Node for PercussionKit {
    fn address(&self) -> i32 {
        self.address
    }
    fn set_address(&mut self, address: i32) {
        self.address = address;
    }
    fn record_len(&self) -> u32 {
        (4 + KIT_BODY_LEN) as u32
    }
    fn place(&mut self, layout: &mut Layout) {
        self.address = layout.alloc(self.record_len());
        self.sounds.iter_mut().flatten().for_each(|s| s.place(layout));
    }
    fn write_tree<W: Write + Seek>(&self, writer: &mut W, anchor: u64) -> BinResult<()> {
        seek_to(writer, anchor, self.address)?;
        writer.write_be(self)?;
        for sound in self.sounds.iter().flatten() {
            sound.write_tree(writer, anchor)?;
        }
        Ok(())
    }
}

/// Reads the entry record. The flags are filled in by the owning kit.
impl BinRead for PercussionEntry {
    type Args<'a> = u64;

    fn read_options<R: Read + Seek>(
        reader: &mut R,
        endian: Endian,
        anchor: Self::Args<'_>,
    ) -> BinResult<Self> {
        let pitch = reader.read_type(endian)?;
        let volume = reader.read_type(endian)?;
        let _reserved: u64 = reader.read_type(endian)?;
        let velocities = read_velocities(reader, endian, anchor)?;
        Ok(Self {
            pitch,
            volume,
            velocities,
            flag1: 0,
            flag2: 0,
            address: 0,
        })
    }
}

impl BinWrite for PercussionEntry {
    type Args<'a> = ();

    fn write_options<W: Write + Seek>(
        &self,
        writer: &mut W,
        endian: Endian,
        _: Self::Args<'_>,
    ) -> BinResult<()> {
        writer.write_type(&self.pitch, endian)?;
        writer.write_type(&self.volume, endian)?;
        write_zeroes(writer, 8)?;
        write_velocities(writer, endian, &self.velocities)
    }
}

impl Node for PercussionEntry {
    fn address(&self) -> i32 {
        self.address
    }
    fn set_address(&mut self, address: i32) {
        self.address = address;
    }
    fn record_len(&self) -> u32 {
        20 + 4 * self.velocities.len() as u32
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
