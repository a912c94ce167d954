//! Plumbing shared by every record in a bank: anchor-relative seeking, pointer
//! resolution, and the output-address layout pass.

use binrw::{
    io::{Read, Seek, SeekFrom, Write},
    BinReaderExt, BinResult, Endian,
};

/// Alignment applied to the start of every record placed by [`Layout`].
pub const RECORD_ALIGN: u32 = 0x10;

/// A record that lives at an anchor-relative address inside an encoded bank.
///
/// A node's [`BinWrite`](binrw::BinWrite) impl emits only its own record. The
/// children are referenced by their already-assigned addresses, which is why
/// [`Node::write_tree`] has to visit them separately.
pub trait Node {
    /// Output address relative to the bank anchor. 0 until placed or decoded.
    fn address(&self) -> i32;
    fn set_address(&mut self, address: i32);
    /// Number of bytes the node's own record occupies when encoded.
    fn record_len(&self) -> u32;
    /// Assigns addresses to this node and everything below it.
    fn place(&mut self, layout: &mut Layout) {
        let address = layout.alloc(self.record_len());
        self.set_address(address);
    }
    /// Writes this node's record at `anchor + address`, then all of its children.
    ///
    /// Addresses must already be assigned, either by decoding or by [`Layout`].
    fn write_tree<W: Write + Seek>(&self, writer: &mut W, anchor: u64) -> BinResult<()>;
}

/// Sequential address allocator.
#[derive(Clone, Debug)]
pub struct Layout {
    cursor: u32,
}

impl Layout {
    #[inline]
    pub fn new(start: u32) -> Self {
        Self {
            cursor: align(start),
        }
    }
    pub fn alloc(&mut self, len: u32) -> i32 {
        let address = self.cursor;
        self.cursor = align(address + len);
        address as i32
    }
    /// End of the last placed record, aligned.
    #[inline]
    pub fn end(&self) -> u32 {
        self.cursor
    }
}

#[inline]
pub(crate) fn align(n: u32) -> u32 {
    (n + RECORD_ALIGN - 1) & !(RECORD_ALIGN - 1)
}

/// Moves the stream to `anchor + offset`.
pub(crate) fn seek_to<S: Seek>(stream: &mut S, anchor: u64, offset: i32) -> BinResult<u64> {
    let pos = anchor
        .checked_add_signed(offset as i64)
        .ok_or_else(|| binrw::Error::AssertFail {
            pos: anchor,
            message: format!("offset {offset:#x} points before the start of the stream"),
        })?;
    Ok(stream.seek(SeekFrom::Start(pos))?)
}

/// Follows `offset`, treating 0 as an absent reference.
pub(crate) fn resolve<R, T>(
    reader: &mut R,
    anchor: u64,
    offset: i32,
    read: impl FnOnce(&mut R) -> BinResult<T>,
) -> BinResult<Option<T>>
where
    R: Read + Seek,
    T: Node,
{
    if offset == 0 {
        return Ok(None);
    }
    resolve_at(reader, anchor, offset, read).map(Some)
}

/// Follows `offset` unconditionally and stamps the node with it.
pub(crate) fn resolve_at<R, T>(
    reader: &mut R,
    anchor: u64,
    offset: i32,
    read: impl FnOnce(&mut R) -> BinResult<T>,
) -> BinResult<T>
where
    R: Read + Seek,
    T: Node,
{
    seek_to(reader, anchor, offset)?;
    let mut node = read(reader)?;
    node.set_address(offset);
    Ok(node)
}

pub(crate) fn read_offsets<R: Read + Seek>(
    reader: &mut R,
    endian: Endian,
    count: usize,
) -> BinResult<Vec<i32>> {
    (0..count).map(|_| reader.read_type(endian)).collect()
}

#[inline]
pub(crate) fn address_of<T: Node>(node: Option<&T>) -> i32 {
    node.map_or(0, Node::address)
}

#[inline]
pub(crate) fn write_zeroes<W: Write>(writer: &mut W, len: usize) -> BinResult<()> {
    writer.write_all(&vec![0u8; len])?;
    Ok(())
}

/// Rejects a slot table that would not fit its fixed on-disk size.
pub(crate) fn check_slots(len: usize, max: usize, pos: u64, what: &str) -> BinResult<()> {
    if len > max {
        return Err(binrw::Error::AssertFail {
            pos,
            message: format!("{len} {what} slots exceed the table size of {max}"),
        });
    }
    Ok(())
}

/// Reads a `u32` count and that many offsets.
pub(crate) fn read_offset_table<R: Read + Seek>(
    reader: &mut R,
    endian: Endian,
) -> BinResult<Vec<i32>> {
    let count: i32 = reader.read_type(endian)?;
    let pos = reader.stream_position()?;
    let count = usize::try_from(count).map_err(|_| binrw::Error::AssertFail {
        pos,
        message: format!("negative table length {count}"),
    })?;
    read_offsets(reader, endian, count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn layout_aligns_each_record() {
        let mut layout = Layout::new(0x3e4);
        assert_eq!(layout.alloc(48), 0x3f0);
        assert_eq!(layout.alloc(14), 0x420);
        assert_eq!(layout.alloc(32), 0x430);
        assert_eq!(layout.end(), 0x450);
    }

    #[test]
    fn negative_offsets_are_rejected() {
        let mut cur = Cursor::new(vec![0u8; 16]);
        assert_eq!(seek_to(&mut cur, 8, -4).unwrap(), 4);
        assert!(matches!(
            seek_to(&mut cur, 8, -12),
            Err(binrw::Error::AssertFail { .. })
        ));
    }

    #[test]
    fn offset_table_reads_count_then_entries() {
        let data = [0, 0, 0, 2, 0, 0, 0, 0x10, 0, 0, 0, 0];
        let offsets = read_offset_table(&mut Cursor::new(data), Endian::Big).unwrap();
        assert_eq!(offsets, [0x10, 0]);
    }
}
