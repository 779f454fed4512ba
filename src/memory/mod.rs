//! Guest linear memory access
//!
//! Bounds-checked little-endian reads and writes against the guest's linear
//! memory. Addresses are `u64` so that `sp + offset` arithmetic on 32-bit
//! guest pointers cannot overflow; anything past the end of memory is an
//! [`Error::OutOfBounds`] and is never truncated.

use crate::error::{Error, Result};

/// A borrowed view of guest linear memory
pub struct Memory<'a> {
    data: &'a mut [u8],
}

macro_rules! accessors {
    ($($get:ident, $set:ident, $ty:ty;)*) => {
        $(
            #[doc = concat!("Load a little-endian `", stringify!($ty), "`")]
            pub fn $get(&self, addr: u64) -> Result<$ty> {
                let mut bytes = [0u8; std::mem::size_of::<$ty>()];
                let len = bytes.len() as u64;
                bytes.copy_from_slice(self.bytes(addr, len)?);
                Ok(<$ty>::from_le_bytes(bytes))
            }

            #[doc = concat!("Store a little-endian `", stringify!($ty), "`")]
            pub fn $set(&mut self, addr: u64, val: $ty) -> Result<()> {
                let bytes = val.to_le_bytes();
                self.bytes_mut(addr, bytes.len() as u64)?.copy_from_slice(&bytes);
                Ok(())
            }
        )*
    };
}

impl<'a> Memory<'a> {
    pub fn new(data: &'a mut [u8]) -> Self {
        Self { data }
    }

    /// Current size in bytes
    pub fn size(&self) -> usize {
        self.data.len()
    }

    fn range(&self, addr: u64, len: u64) -> Result<std::ops::Range<usize>> {
        let out_of_bounds = || Error::OutOfBounds {
            addr,
            len,
            size: self.data.len(),
        };
        let end = addr.checked_add(len).ok_or_else(out_of_bounds)?;
        if end > self.data.len() as u64 {
            return Err(out_of_bounds());
        }
        Ok(addr as usize..end as usize)
    }

    /// Borrow a window of memory
    pub fn bytes(&self, addr: u64, len: u64) -> Result<&[u8]> {
        let range = self.range(addr, len)?;
        Ok(&self.data[range])
    }

    /// Mutably borrow a window of memory
    pub fn bytes_mut(&mut self, addr: u64, len: u64) -> Result<&mut [u8]> {
        let range = self.range(addr, len)?;
        Ok(&mut self.data[range])
    }

    /// Copy `data` into memory at `addr`
    pub fn write(&mut self, addr: u64, data: &[u8]) -> Result<()> {
        self.bytes_mut(addr, data.len() as u64)?.copy_from_slice(data);
        Ok(())
    }

    accessors! {
        get_u8, set_u8, u8;
        get_i8, set_i8, i8;
        get_u16, set_u16, u16;
        get_i16, set_i16, i16;
        get_u32, set_u32, u32;
        get_i32, set_i32, i32;
        get_u64, set_u64, u64;
        get_i64, set_i64, i64;
        get_f64, set_f64, f64;
    }

    /// Read the `(pointer, length)` pair of a guest slice header at `addr`
    pub fn slice_header(&self, addr: u64) -> Result<(u64, u64)> {
        let ptr = self.get_i64(addr)?;
        let len = self.get_i64(addr + 8)?;
        if ptr < 0 || len < 0 {
            return Err(Error::abi(format!(
                "negative slice header at {}: ptr={} len={}",
                addr, ptr, len
            )));
        }
        Ok((ptr as u64, len as u64))
    }

    /// Borrow the bytes of the guest slice whose header sits at `addr`
    pub fn load_slice(&mut self, addr: u64) -> Result<&mut [u8]> {
        let (ptr, len) = self.slice_header(addr)?;
        self.bytes_mut(ptr, len)
    }

    /// Load the guest string whose header sits at `addr`
    ///
    /// Invalid UTF-8 is replaced the same way a JavaScript `TextDecoder` would.
    pub fn load_string(&self, addr: u64) -> Result<String> {
        let (ptr, len) = self.slice_header(addr)?;
        Ok(String::from_utf8_lossy(self.bytes(ptr, len)?).into_owned())
    }

    /// Raw 8-byte cells of the guest value slice whose header sits at `addr`
    pub fn load_cells(&self, addr: u64) -> Result<Vec<u64>> {
        let (ptr, len) = self.slice_header(addr)?;
        let total = len
            .checked_mul(8)
            .ok_or_else(|| Error::abi(format!("value slice length {} overflows", len)))?;
        let window = self.bytes(ptr, total)?;
        Ok(window
            .chunks_exact(8)
            .map(|chunk| {
                let mut cell = [0u8; 8];
                cell.copy_from_slice(chunk);
                u64::from_le_bytes(cell)
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_little_endian_round_trip() {
        let mut buf = vec![0u8; 32];
        let mut mem = Memory::new(&mut buf);
        mem.set_i64(8, -2).unwrap();
        mem.set_u16(16, 0xBEEF).unwrap();
        mem.set_f64(24, 1.5).unwrap();
        assert_eq!(mem.get_i64(8).unwrap(), -2);
        assert_eq!(mem.get_u16(16).unwrap(), 0xBEEF);
        assert_eq!(mem.get_u8(16).unwrap(), 0xEF);
        assert_eq!(mem.get_f64(24).unwrap(), 1.5);
    }

    #[test]
    fn test_out_of_bounds_is_an_error() {
        let mut buf = vec![0u8; 16];
        let mut mem = Memory::new(&mut buf);
        assert!(matches!(mem.get_u64(12), Err(Error::OutOfBounds { addr: 12, len: 8, size: 16 })));
        assert!(mem.set_u32(13, 1).is_err());
        assert!(mem.bytes(u64::MAX, 2).is_err());
        assert!(mem.get_u64(8).is_ok());
    }

    #[test]
    fn test_load_slice_and_string() {
        let mut buf = vec![0u8; 64];
        let mut mem = Memory::new(&mut buf);
        mem.write(40, b"hello").unwrap();
        mem.set_i64(0, 40).unwrap();
        mem.set_i64(8, 5).unwrap();
        assert_eq!(mem.load_string(0).unwrap(), "hello");

        mem.load_slice(0).unwrap()[0] = b'j';
        assert_eq!(mem.load_string(0).unwrap(), "jello");

        mem.set_i64(8, 100).unwrap();
        assert!(mem.load_slice(0).is_err());
    }

    #[test]
    fn test_load_cells() {
        let mut buf = vec![0u8; 64];
        let mut mem = Memory::new(&mut buf);
        mem.set_u64(32, 7).unwrap();
        mem.set_u64(40, 9).unwrap();
        mem.set_i64(0, 32).unwrap();
        mem.set_i64(8, 2).unwrap();
        assert_eq!(mem.load_cells(0).unwrap(), vec![7, 9]);
    }
}
