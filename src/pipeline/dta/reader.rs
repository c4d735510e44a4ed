//! Bounds-checked cursor over the raw bytes of a `.dta` file.

use super::DtaError;

pub struct ByteReader<'a> {
    buf: &'a [u8],
    pos: usize,
    big_endian: bool,
}

impl<'a> ByteReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self {
            buf,
            pos: 0,
            big_endian: false,
        }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn seek(&mut self, pos: usize) -> Result<(), DtaError> {
        if pos > self.buf.len() {
            return Err(DtaError::Truncated {
                offset: pos,
                needed: 0,
                len: self.buf.len(),
            });
        }
        self.pos = pos;
        Ok(())
    }

    pub fn set_big_endian(&mut self, big_endian: bool) {
        self.big_endian = big_endian;
    }

    pub fn is_big_endian(&self) -> bool {
        self.big_endian
    }

    pub fn bytes(&mut self, n: usize) -> Result<&'a [u8], DtaError> {
        let end = self.pos.checked_add(n).filter(|&e| e <= self.buf.len());
        match end {
            Some(end) => {
                let slice = &self.buf[self.pos..end];
                self.pos = end;
                Ok(slice)
            }
            None => Err(DtaError::Truncated {
                offset: self.pos,
                needed: n,
                len: self.buf.len(),
            }),
        }
    }

    pub fn skip(&mut self, n: usize) -> Result<(), DtaError> {
        self.bytes(n).map(|_| ())
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], DtaError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.bytes(N)?);
        Ok(out)
    }

    pub fn u8(&mut self) -> Result<u8, DtaError> {
        Ok(self.array::<1>()?[0])
    }

    pub fn u16(&mut self) -> Result<u16, DtaError> {
        let b = self.array::<2>()?;
        Ok(if self.big_endian {
            u16::from_be_bytes(b)
        } else {
            u16::from_le_bytes(b)
        })
    }

    pub fn u32(&mut self) -> Result<u32, DtaError> {
        let b = self.array::<4>()?;
        Ok(if self.big_endian {
            u32::from_be_bytes(b)
        } else {
            u32::from_le_bytes(b)
        })
    }

    pub fn u64(&mut self) -> Result<u64, DtaError> {
        let b = self.array::<8>()?;
        Ok(if self.big_endian {
            u64::from_be_bytes(b)
        } else {
            u64::from_le_bytes(b)
        })
    }

    pub fn i8(&mut self) -> Result<i8, DtaError> {
        Ok(self.u8()? as i8)
    }

    pub fn i16(&mut self) -> Result<i16, DtaError> {
        Ok(self.u16()? as i16)
    }

    pub fn i32(&mut self) -> Result<i32, DtaError> {
        Ok(self.u32()? as i32)
    }

    pub fn f32(&mut self) -> Result<f32, DtaError> {
        Ok(f32::from_bits(self.u32()?))
    }

    pub fn f64(&mut self) -> Result<f64, DtaError> {
        Ok(f64::from_bits(self.u64()?))
    }

    /// Unsigned integer stored in `n` bytes (`n <= 8`) in file byte order.
    pub fn uint_n(&mut self, n: usize) -> Result<u64, DtaError> {
        let bytes = self.bytes(n)?;
        let fold = |acc: u64, b: &u8| (acc << 8) | u64::from(*b);
        Ok(if self.big_endian {
            bytes.iter().fold(0, fold)
        } else {
            bytes.iter().rev().fold(0, fold)
        })
    }

    pub fn peek_tag(&self, tag: &str) -> bool {
        self.buf[self.pos..].starts_with(tag.as_bytes())
    }

    pub fn expect_tag(&mut self, tag: &str) -> Result<(), DtaError> {
        if !self.peek_tag(tag) {
            return Err(DtaError::MissingTag {
                tag: tag.to_string(),
                offset: self.pos,
            });
        }
        self.pos += tag.len();
        Ok(())
    }
}
