//! The top-level `IBNK` chunk.
//!
//! Every offset inside a bank, at any depth, is measured from the position of
//! the `IBNK` tag. That position is the anchor handed down to every nested read.

use crate::{
    instrument::{Instrument, Tagged},
    node::{address_of, check_slots, read_offsets, seek_to, write_zeroes, Layout, Node, RECORD_ALIGN},
};
use binrw::{
    io::{Read, Seek, SeekFrom, Write},
    BinRead, BinReaderExt, BinResult, BinWrite, BinWriterExt, Endian,
};
use serde::{Deserialize, Serialize};
use std::io::Cursor;

pub const IBNK: u32 = u32::from_be_bytes(*b"IBNK");
pub const BANK: u32 = u32::from_be_bytes(*b"BANK");

/// Number of instrument slots in a bank.
pub const BANK_SLOTS: usize = 240;
/// Position of the `BANK` tag relative to the anchor.
const TABLE_OFFSET: u64 = 0x20;
/// Bytes taken by the chunk header and the instrument table.
pub const BANK_HEADER_LEN: u32 = TABLE_OFFSET as u32 + 4 + BANK_SLOTS as u32 * 4;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Bank {
    pub size: u32,
    pub global_id: u32,
    pub instruments: Vec<Option<Instrument>>,
    /// Slots whose pointer led to an unrecognized instrument tag.
    #[serde(skip)]
    pub skipped: Vec<SkippedSlot>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SkippedSlot {
    pub slot: usize,
    pub offset: i32,
    pub tag: u32,
}

impl Default for Bank {
    fn default() -> Self {
        Self::new(0)
    }
}

fn expect_magic<R: Read + Seek>(reader: &mut R, endian: Endian, magic: u32) -> BinResult<()> {
    let pos = reader.stream_position()?;
    let found: u32 = reader.read_type(endian)?;
    if found != magic {
        return Err(binrw::Error::BadMagic {
            pos,
            found: Box::new(found),
        });
    }
    Ok(())
}

impl Bank {
    pub fn new(global_id: u32) -> Self {
        Self {
            size: 0,
            global_id,
            instruments: vec![None; BANK_SLOTS],
            skipped: Vec::new(),
        }
    }
    /// Decodes the bank whose `IBNK` tag sits at `offset` in `data`.
    pub fn from_bytes(data: &[u8], offset: u64) -> BinResult<Self> {
        let mut cur = Cursor::new(data);
        cur.set_position(offset);
        Self::read_be(&mut cur)
    }
    /// Populated slots with their index.
    pub fn instruments(&self) -> impl Iterator<Item = (usize, &Instrument)> {
        self.instruments
            .iter()
            .enumerate()
            .filter_map(|(slot, inst)| inst.as_ref().map(|inst| (slot, inst)))
    }
    /// Assigns fresh output addresses to every node and updates `size`.
    pub fn layout(&mut self) {
        let mut layout = Layout::new(BANK_HEADER_LEN);
        for inst in self.instruments.iter_mut().flatten() {
            inst.place(&mut layout);
        }
        self.size = layout.end();
        log::debug!("laid out bank {} in {:#x} bytes", self.global_id, self.size);
    }
    /// Writes the bank record at `anchor`, then every instrument tree at
    /// `anchor + address`. Addresses are taken as they are; nothing is
    /// recomputed here.
    pub fn write_tree<W: Write + Seek>(&self, writer: &mut W, anchor: u64) -> BinResult<()> {
        writer.seek(SeekFrom::Start(anchor))?;
        writer.write_be(self)?;
        for (_, inst) in self.instruments() {
            inst.write_tree(writer, anchor)?;
        }
        Ok(())
    }
    /// Encodes the tree at its current addresses.
    ///
    /// The buffer is zero-filled up to `size`, but never past the aligned end
    /// of the last written record, so a bogus `size` cannot inflate it.
    pub fn encode(&self) -> BinResult<Vec<u8>> {
        let mut cur = Cursor::new(Vec::new());
        self.write_tree(&mut cur, 0)?;
        let mut data = cur.into_inner();
        let end = (self.size as usize).min(data.len().next_multiple_of(RECORD_ALIGN as usize));
        if data.len() < end {
            data.resize(end, 0);
        }
        Ok(data)
    }
    /// Lays out and encodes the bank.
    pub fn pack(&mut self) -> BinResult<Vec<u8>> {
        self.layout();
        self.encode()
    }
}

impl BinRead for Bank {
    type Args<'a> = ();

    fn read_options<R: Read + Seek>(
        reader: &mut R,
        endian: Endian,
        _: Self::Args<'_>,
    ) -> BinResult<Self> {
        let anchor = reader.stream_position()?;
        expect_magic(reader, endian, IBNK)?;
        let size = reader.read_type(endian)?;
        let global_id = reader.read_type(endian)?;
        reader.seek(SeekFrom::Start(anchor + TABLE_OFFSET))?;
        expect_magic(reader, endian, BANK)?;
        let offsets = read_offsets(reader, endian, BANK_SLOTS)?;

        let mut instruments = Vec::with_capacity(BANK_SLOTS);
        let mut skipped = Vec::new();
        for (slot, offset) in offsets.into_iter().enumerate() {
            if offset == 0 {
                instruments.push(None);
                continue;
            }
            seek_to(reader, anchor, offset)?;
            match Instrument::read_tagged(reader, endian, anchor)? {
                Tagged::Instrument(mut inst) => {
                    inst.set_address(offset);
                    log::debug!("slot {slot}: {} at {offset:#x}", inst.kind());
                    instruments.push(Some(inst));
                }
                Tagged::Unknown(tag) => {
                    log::warn!(
                        "slot {slot}: unknown instrument tag {tag:#010x} at {offset:#x}, leaving it empty"
                    );
                    skipped.push(SkippedSlot { slot, offset, tag });
                    instruments.push(None);
                }
            }
        }

        Ok(Self {
            size,
            global_id,
            instruments,
            skipped,
        })
    }
}

impl BinWrite for Bank {
    type Args<'a> = ();

    fn write_options<W: Write + Seek>(
        &self,
        writer: &mut W,
        endian: Endian,
        _: Self::Args<'_>,
    ) -> BinResult<()> {
        check_slots(
            self.instruments.len(),
            BANK_SLOTS,
            writer.stream_position()?,
            "instrument",
        )?;
        writer.write_type(&IBNK, endian)?;
        writer.write_type(&self.size, endian)?;
        writer.write_type(&self.global_id, endian)?;
        write_zeroes(writer, TABLE_OFFSET as usize - 12)?;
        writer.write_type(&BANK, endian)?;
        for slot in 0..BANK_SLOTS {
            let inst = self.instruments.get(slot).and_then(Option::as_ref);
            writer.write_type(&address_of(inst), endian)?;
        }
        Ok(())
    }
}
