use std::io::{self, Cursor};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use crate::{ClassFileError, Result};

type Endian = BigEndian;

/// Bounds-checked, forward-only big-endian reader over a byte slice.
///
/// Offsets reported in errors are absolute: a reader created with [`ByteReader::sub`] keeps the
/// offset of its first byte within the outermost buffer.
pub struct ByteReader<'a> {
    r: Cursor<&'a [u8]>,
    base: usize,
}
impl<'a> ByteReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self::with_base(buf, 0)
    }

    pub fn with_base(buf: &'a [u8], base: usize) -> Self {
        Self {
            r: Cursor::new(buf),
            base,
        }
    }

    /// Position relative to the start of this reader's slice.
    pub fn position(&self) -> usize {
        self.r.position() as usize
    }

    /// Absolute offset of the next byte to be read.
    pub fn offset(&self) -> usize {
        self.base + self.position()
    }

    /// Absolute offset one past the last readable byte.
    pub fn end_offset(&self) -> usize {
        self.base + self.r.get_ref().len()
    }

    pub fn remaining(&self) -> usize {
        self.r.get_ref().len() - self.position()
    }

    pub fn ensure(&self, needed: usize) -> Result<()> {
        if self.remaining() < needed {
            return Err(ClassFileError::TruncatedInput {
                offset: self.offset(),
                needed,
            });
        }
        Ok(())
    }

    pub fn read_u1(&mut self) -> Result<u8> {
        self.read_with(1, |r| r.read_u8())
    }

    pub fn read_u2(&mut self) -> Result<u16> {
        self.read_with(2, |r| r.read_u16::<Endian>())
    }

    pub fn read_u4(&mut self) -> Result<u32> {
        self.read_with(4, |r| r.read_u32::<Endian>())
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        self.read_with(8, |r| r.read_u64::<Endian>())
    }

    pub fn read_i1(&mut self) -> Result<i8> {
        self.read_with(1, |r| r.read_i8())
    }

    pub fn read_i2(&mut self) -> Result<i16> {
        self.read_with(2, |r| r.read_i16::<Endian>())
    }

    pub fn read_i4(&mut self) -> Result<i32> {
        self.read_with(4, |r| r.read_i32::<Endian>())
    }

    pub fn read_i64(&mut self) -> Result<i64> {
        self.read_with(8, |r| r.read_i64::<Endian>())
    }

    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        self.ensure(n)?;
        let buf: &'a [u8] = *self.r.get_ref();
        let start = self.position();
        self.r.set_position((start + n) as u64);
        Ok(&buf[start..start + n])
    }

    /// Splits off the next `n` bytes as an independent reader.
    pub fn sub(&mut self, n: usize) -> Result<ByteReader<'a>> {
        let base = self.offset();
        Ok(ByteReader::with_base(self.read_bytes(n)?, base))
    }

    fn read_with<T>(
        &mut self,
        needed: usize,
        read: impl FnOnce(&mut Cursor<&'a [u8]>) -> io::Result<T>,
    ) -> Result<T> {
        self.ensure(needed)?;
        let offset = self.offset();
        read(&mut self.r).map_err(|_| ClassFileError::TruncatedInput { offset, needed })
    }
}

/// Growable big-endian writer.
///
/// Writing never fails: the `io::Result`s of [`WriteBytesExt`] on a `Vec` are always `Ok`.
#[derive(Debug, Default)]
pub struct ByteWriter {
    buf: Vec<u8>,
}
impl ByteWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn position(&self) -> usize {
        self.buf.len()
    }

    pub fn write_u1(&mut self, value: u8) {
        let _ = self.buf.write_u8(value);
    }

    pub fn write_u2(&mut self, value: u16) {
        let _ = self.buf.write_u16::<Endian>(value);
    }

    pub fn write_u4(&mut self, value: u32) {
        let _ = self.buf.write_u32::<Endian>(value);
    }

    pub fn write_u64(&mut self, value: u64) {
        let _ = self.buf.write_u64::<Endian>(value);
    }

    pub fn write_i1(&mut self, value: i8) {
        let _ = self.buf.write_i8(value);
    }

    pub fn write_i2(&mut self, value: i16) {
        let _ = self.buf.write_i16::<Endian>(value);
    }

    pub fn write_i4(&mut self, value: i32) {
        let _ = self.buf.write_i32::<Endian>(value);
    }

    pub fn write_i64(&mut self, value: i64) {
        let _ = self.buf.write_i64::<Endian>(value);
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }
}
