//! Binary primitives for the persisted tree format
//!
//! Fixed-width integers are big-endian. Variable-length integers are unsigned
//! LEB128: seven data bits per byte, least significant group first, high bit
//! set on every byte except the last.
//!
//! Reads are checked and return `None` when the input runs out or a varint
//! does not fit in 64 bits; callers turn that into a corruption error with
//! their own context. Writes go through [`bytes::BufMut`].

use bytes::BufMut;

/// Longest LEB128 encoding of a `u64`
pub const MAX_VARINT_LEN: usize = 10;

/// Number of bytes `value` occupies as a varint
#[inline]
pub fn varint_len(mut value: u64) -> usize {
    let mut len = 1;
    while value >= 0x80 {
        value >>= 7;
        len += 1;
    }
    len
}

/// Append `value` as a LEB128 varint
#[inline]
pub fn write_varint<B: BufMut>(buf: &mut B, mut value: u64) {
    loop {
        let mut byte = (value & 0x7F) as u8;
        value >>= 7;
        if value != 0 {
            byte |= 0x80;
        }
        buf.put_u8(byte);
        if value == 0 {
            break;
        }
    }
}

/// Decode a varint from the front of `data`, returning (value, bytes_read)
#[inline]
pub fn read_varint(data: &[u8]) -> Option<(u64, usize)> {
    let mut value: u64 = 0;
    let mut shift: u32 = 0;
    for (i, &byte) in data.iter().enumerate() {
        if i == MAX_VARINT_LEN - 1 && byte > 0x01 {
            // The tenth byte may only carry the top bit of a u64.
            return None;
        }
        value |= ((byte & 0x7F) as u64) << shift;
        if byte & 0x80 == 0 {
            return Some((value, i + 1));
        }
        shift += 7;
    }
    None
}

/// Append a big-endian u16
#[inline]
pub fn write_u16_be<B: BufMut>(buf: &mut B, value: u16) {
    buf.put_u16(value);
}

/// Append a big-endian u32
#[inline]
pub fn write_u32_be<B: BufMut>(buf: &mut B, value: u32) {
    buf.put_u32(value);
}

/// Read a big-endian u16 from the front of `data`
#[inline]
pub fn read_u16_be(data: &[u8]) -> Option<u16> {
    let bytes: [u8; 2] = data.get(..2)?.try_into().ok()?;
    Some(u16::from_be_bytes(bytes))
}

/// Read a big-endian u32 from the front of `data`
#[inline]
pub fn read_u32_be(data: &[u8]) -> Option<u32> {
    let bytes: [u8; 4] = data.get(..4)?.try_into().ok()?;
    Some(u32::from_be_bytes(bytes))
}

/// Forward-only cursor over a borrowed buffer
#[derive(Debug, Clone)]
pub struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    /// Start reading at the beginning of `data`
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Current offset from the start of the buffer
    #[inline]
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Bytes left after the cursor
    #[inline]
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// True once every byte has been consumed
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Read one byte
    pub fn read_u8(&mut self) -> Option<u8> {
        let byte = *self.data.get(self.pos)?;
        self.pos += 1;
        Some(byte)
    }

    /// Read a big-endian u16
    pub fn read_u16_be(&mut self) -> Option<u16> {
        let value = read_u16_be(&self.data[self.pos..])?;
        self.pos += 2;
        Some(value)
    }

    /// Read a big-endian u32
    pub fn read_u32_be(&mut self) -> Option<u32> {
        let value = read_u32_be(&self.data[self.pos..])?;
        self.pos += 4;
        Some(value)
    }

    /// Read a LEB128 varint
    pub fn read_varint(&mut self) -> Option<u64> {
        let (value, used) = read_varint(&self.data[self.pos..])?;
        self.pos += used;
        Some(value)
    }

    /// Borrow the next `len` bytes
    pub fn read_bytes(&mut self, len: usize) -> Option<&'a [u8]> {
        let end = self.pos.checked_add(len)?;
        let bytes = self.data.get(self.pos..end)?;
        self.pos = end;
        Some(bytes)
    }
}
