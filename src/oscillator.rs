use crate::{
    node::{address_of, resolve, seek_to, write_zeroes, Layout, Node},
    records::Envelope,
};
use binrw::{
    io::{Read, Seek, Write},
    BinRead, BinReaderExt, BinResult, BinWrite, BinWriterExt, Endian,
};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Oscillator {
    pub target: u8,
    pub rate: f32,
    pub attack: Option<Envelope>,
    pub release: Option<Envelope>,
    pub width: f32,
    pub vertex: f32,
    #[serde(skip)]
    pub address: i32,
}

impl BinRead for Oscillator {
    /// Bank anchor.
    type Args<'a> = u64;

    fn read_options<R: Read + Seek>(
        reader: &mut R,
        endian: Endian,
        anchor: Self::Args<'_>,
    ) -> BinResult<Self> {
        let target: u8 = reader.read_type(endian)?;
        let _reserved: [u8; 3] = reader.read_type(endian)?;
        let rate = reader.read_type(endian)?;
        let attack: i32 = reader.read_type(endian)?;
        let release: i32 = reader.read_type(endian)?;
        let width = reader.read_type(endian)?;
        let vertex = reader.read_type(endian)?;
        let attack = resolve(reader, anchor, attack, |r| r.read_type::<Envelope>(endian))?;
        let release = resolve(reader, anchor, release, |r| r.read_type::<Envelope>(endian))?;
        Ok(Self {
            target,
            rate,
            attack,
            release,
            width,
            vertex,
            address: 0,
        })
    }
}

impl BinWrite for Oscillator {
    type Args<'a> = ();

    fn write_options<W: Write + Seek>(
        &self,
        writer: &mut W,
        endian: Endian,
        _: Self::Args<'_>,
    ) -> BinResult<()> {
        writer.write_type(&self.target, endian)?;
        write_zeroes(writer, 3)?;
        writer.write_type(&self.rate, endian)?;
        writer.write_type(&address_of(self.attack.as_ref()), endian)?;
        writer.write_type(&address_of(self.release.as_ref()), endian)?;
        writer.write_type(&self.width, endian)?;
        writer.write_type(&self.vertex, endian)?;
        write_zeroes(writer, 8)
    }
}

impl Node for Oscillator {
    fn address(&self) -> i32 {
        self.address
    }
    fn set_address(&mut self, address: i32) {
        self.address = address;
    }
    fn record_len(&self) -> u32 {
        0x20
    }
    fn place(&mut self, layout: &mut Layout) {
        self.address = layout.alloc(self.record_len());
        for env in [&mut self.attack, &mut self.release].into_iter().flatten() {
            env.place(layout);
        }
    }
    fn write_tree<W: Write + Seek>(&self, writer: &mut W, anchor: u64) -> BinResult<()> {
        seek_to(writer, anchor, self.address)?;
        writer.write_be(self)?;
        for env in [&self.attack, &self.release].into_iter().flatten() {
            env.write_tree(writer, anchor)?;
        }
        Ok(())
    }
}
