//! Checked reading and writing of the primitive wire types.
//!
//! The send side builds frames in a [`bytes::BytesMut`] and can never fail;
//! the receive side works on a [`bytes::Buf`] and returns [`WireError`] on any
//! malformed input. A decode error means the peer is broken and the connection
//! should be torn down.

use bytes::{Buf, BufMut};
use thiserror::Error;

/// Decoding errors. Any of these terminates the connection.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WireError {
    #[error("message truncated")]
    Truncated,
    #[error("string is not valid UTF-8")]
    BadUtf8,
    #[error("varint longer than 10 bytes")]
    VarIntTooLong,
    #[error("unknown message tag {0:#04x}")]
    UnknownTag(u8),
    #[error("bad value for {0}")]
    BadValue(&'static str),
}

/// Checked reads of the primitive wire types from any [`Buf`].
pub trait WireRead {
    fn read_u8(&mut self) -> Result<u8, WireError>;
    fn read_u16(&mut self) -> Result<u16, WireError>;
    fn read_i16(&mut self) -> Result<i16, WireError>;
    fn read_i32(&mut self) -> Result<i32, WireError>;
    fn read_bool(&mut self) -> Result<bool, WireError>;
    fn read_varint(&mut self) -> Result<u64, WireError>;
    fn read_string(&mut self) -> Result<String, WireError>;
    fn read_blob(&mut self) -> Result<Vec<u8>, WireError>;
}

impl<B: Buf> WireRead for B {
    fn read_u8(&mut self) -> Result<u8, WireError> {
        if self.remaining() < 1 {
            return Err(WireError::Truncated);
        }
        Ok(self.get_u8())
    }

    fn read_u16(&mut self) -> Result<u16, WireError> {
        if self.remaining() < 2 {
            return Err(WireError::Truncated);
        }
        Ok(self.get_u16_le())
    }

    fn read_i16(&mut self) -> Result<i16, WireError> {
        if self.remaining() < 2 {
            return Err(WireError::Truncated);
        }
        Ok(self.get_i16_le())
    }

    fn read_i32(&mut self) -> Result<i32, WireError> {
        if self.remaining() < 4 {
            return Err(WireError::Truncated);
        }
        Ok(self.get_i32_le())
    }

    fn read_bool(&mut self) -> Result<bool, WireError> {
        Ok(self.read_u8()? != 0)
    }

    fn read_varint(&mut self) -> Result<u64, WireError> {
        let mut value: u64 = 0;
        let mut shift = 0;
        loop {
            let byte = self.read_u8()?;
            value |= u64::from(byte & 0x7f) << shift;
            if byte & 0x80 == 0 {
                return Ok(value);
            }
            shift += 7;
            if shift >= 70 {
                return Err(WireError::VarIntTooLong);
            }
        }
    }

    fn read_string(&mut self) -> Result<String, WireError> {
        let raw = self.read_blob()?;
        String::from_utf8(raw).map_err(|_| WireError::BadUtf8)
    }

    fn read_blob(&mut self) -> Result<Vec<u8>, WireError> {
        let len = self.read_varint()? as usize;
        if self.remaining() < len {
            return Err(WireError::Truncated);
        }
        let mut raw = vec![0u8; len];
        self.copy_to_slice(&mut raw);
        Ok(raw)
    }
}

/// Writes of the primitive wire types into any [`BufMut`].
pub trait WireWrite {
    fn write_u8(&mut self, v: u8);
    fn write_u16(&mut self, v: u16);
    fn write_i16(&mut self, v: i16);
    fn write_i32(&mut self, v: i32);
    fn write_bool(&mut self, v: bool);
    fn write_varint(&mut self, v: u64);
    fn write_string(&mut self, s: &str);
    fn write_blob(&mut self, raw: &[u8]);
}

impl<B: BufMut> WireWrite for B {
    fn write_u8(&mut self, v: u8) {
        self.put_u8(v);
    }

    fn write_u16(&mut self, v: u16) {
        self.put_u16_le(v);
    }

    fn write_i16(&mut self, v: i16) {
        self.put_i16_le(v);
    }

    fn write_i32(&mut self, v: i32) {
        self.put_i32_le(v);
    }

    fn write_bool(&mut self, v: bool) {
        self.put_u8(if v { 1 } else { 0 });
    }

    fn write_varint(&mut self, mut v: u64) {
        loop {
            let byte = (v & 0x7f) as u8;
            v >>= 7;
            if v == 0 {
                self.put_u8(byte);
                return;
            }
            self.put_u8(byte | 0x80);
        }
    }

    fn write_string(&mut self, s: &str) {
        self.write_blob(s.as_bytes());
    }

    fn write_blob(&mut self, raw: &[u8]) {
        self.write_varint(raw.len() as u64);
        self.put_slice(raw);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::{Bytes, BytesMut};

    #[test]
    fn varint_round_trip() {
        for v in [0u64, 1, 127, 128, 300, 16383, 16384, u32::MAX as u64, u64::MAX] {
            let mut buf = BytesMut::new();
            buf.write_varint(v);
            let mut bytes = Bytes::from(buf.to_vec());
            assert_eq!(bytes.read_varint(), Ok(v));
            assert_eq!(bytes.remaining(), 0);
        }
    }

    #[test]
    fn varint_single_byte_for_small_values() {
        let mut buf = BytesMut::new();
        buf.write_varint(5);
        assert_eq!(buf.as_ref(), &[5]);
    }

    #[test]
    fn string_round_trip() {
        let mut buf = BytesMut::new();
        buf.write_string("två knights ❤");
        let mut bytes = Bytes::from(buf.to_vec());
        assert_eq!(bytes.read_string().unwrap(), "två knights ❤");
    }

    #[test]
    fn truncated_reads_are_errors() {
        let mut bytes = Bytes::from_static(&[0x05, b'a', b'b']);
        assert_eq!(bytes.read_string(), Err(WireError::Truncated));

        let mut bytes = Bytes::from_static(&[0x01]);
        assert_eq!(bytes.read_i32(), Err(WireError::Truncated));
    }

    #[test]
    fn overlong_varint_is_an_error() {
        let mut bytes = Bytes::from_static(&[0xff; 11]);
        assert_eq!(bytes.read_varint(), Err(WireError::VarIntTooLong));
    }
}
