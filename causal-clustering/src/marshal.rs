//! Byte encodings for values that are persisted or shipped between members.
//!
//! All integers are big-endian. A truncated input surfaces as
//! [`io::ErrorKind::UnexpectedEof`], which durable readers treat as the end of
//! the valid prefix.

use std::io::{self, Read, Write};

/// A value with a fixed binary layout.
pub trait Marshal: Sized {
    fn marshal<W: Write>(&self, writer: &mut W) -> io::Result<()>;

    fn unmarshal<R: Read>(reader: &mut R) -> io::Result<Self>;

    /// Marshals into a fresh buffer.
    fn to_bytes(&self) -> io::Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.marshal(&mut buf)?;
        Ok(buf)
    }
}

pub(crate) fn write_i64<W: Write>(writer: &mut W, value: i64) -> io::Result<()> {
    writer.write_all(&value.to_be_bytes())
}

pub(crate) fn read_i64<R: Read>(reader: &mut R) -> io::Result<i64> {
    let mut buf = [0u8; 8];
    reader.read_exact(&mut buf)?;
    Ok(i64::from_be_bytes(buf))
}

pub(crate) fn write_u64<W: Write>(writer: &mut W, value: u64) -> io::Result<()> {
    writer.write_all(&value.to_be_bytes())
}

pub(crate) fn read_u64<R: Read>(reader: &mut R) -> io::Result<u64> {
    let mut buf = [0u8; 8];
    reader.read_exact(&mut buf)?;
    Ok(u64::from_be_bytes(buf))
}

pub(crate) fn write_i32<W: Write>(writer: &mut W, value: i32) -> io::Result<()> {
    writer.write_all(&value.to_be_bytes())
}

pub(crate) fn read_i32<R: Read>(reader: &mut R) -> io::Result<i32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(i32::from_be_bytes(buf))
}

pub(crate) fn read_u8<R: Read>(reader: &mut R) -> io::Result<u8> {
    let mut buf = [0u8; 1];
    reader.read_exact(&mut buf)?;
    Ok(buf[0])
}

pub(crate) fn invalid_data(message: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, message.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integers_are_big_endian() -> io::Result<()> {
        let mut buf = Vec::new();
        write_i64(&mut buf, 1)?;
        write_i32(&mut buf, 2)?;
        assert_eq!(buf, vec![0, 0, 0, 0, 0, 0, 0, 1, 0, 0, 0, 2]);

        let mut reader = &buf[..];
        assert_eq!(read_i64(&mut reader)?, 1);
        assert_eq!(read_i32(&mut reader)?, 2);
        Ok(())
    }

    #[test]
    fn truncated_input_is_unexpected_eof() {
        let mut reader: &[u8] = &[0, 0, 1];
        let err = read_i64(&mut reader).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }
}
