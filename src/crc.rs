// Copyright 2025 Brian Langenberger
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! CRC-8 and CRC-16 checksums for FLAC frames

/// A running checksum over a stream of bytes
pub trait Checksum: Default {
    /// The finished checksum value
    type Output;

    /// Updates checksum with a single byte
    fn update(&mut self, byte: u8);

    /// Returns checksum of all bytes so far
    fn checksum(&self) -> Self::Output;
}

/// CRC-8 of FLAC frame headers (polynomial 0x07)
#[derive(Copy, Clone, Debug, Default)]
pub struct Crc8(u8);

const CRC8_TABLE: [u8; 256] = {
    let mut table = [0; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u8;
        let mut j = 0;
        while j < 8 {
            crc = if crc & 0x80 != 0 {
                (crc << 1) ^ 0x07
            } else {
                crc << 1
            };
            j += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
};

impl Checksum for Crc8 {
    type Output = u8;

    #[inline]
    fn update(&mut self, byte: u8) {
        self.0 = CRC8_TABLE[usize::from(self.0 ^ byte)];
    }

    #[inline]
    fn checksum(&self) -> u8 {
        self.0
    }
}

/// CRC-16 of whole FLAC frames (polynomial 0x8005)
#[derive(Copy, Clone, Debug, Default)]
pub struct Crc16(u16);

const CRC16_TABLE: [u16; 256] = {
    let mut table = [0; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = (i as u16) << 8;
        let mut j = 0;
        while j < 8 {
            crc = if crc & 0x8000 != 0 {
                (crc << 1) ^ 0x8005
            } else {
                crc << 1
            };
            j += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
};

impl Checksum for Crc16 {
    type Output = u16;

    #[inline]
    fn update(&mut self, byte: u8) {
        self.0 = (self.0 << 8) ^ CRC16_TABLE[usize::from((self.0 >> 8) as u8 ^ byte)];
    }

    #[inline]
    fn checksum(&self) -> u16 {
        self.0
    }
}

/// A writer which checksums all bytes passed through it
pub struct CrcWriter<W, C> {
    writer: W,
    crc: C,
}

impl<W, C: Checksum> CrcWriter<W, C> {
    /// Wraps writer with a fresh checksum
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            crc: C::default(),
        }
    }

    /// Returns wrapped writer and final checksum
    pub fn into_parts(self) -> (W, C::Output) {
        let checksum = self.crc.checksum();
        (self.writer, checksum)
    }
}

impl<W: std::io::Write, C: Checksum> std::io::Write for CrcWriter<W, C> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let written = self.writer.write(buf)?;
        buf[0..written].iter().for_each(|b| self.crc.update(*b));
        Ok(written)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.writer.flush()
    }
}

#[cfg(test)]
mod test {
    use super::{Checksum, Crc16, Crc8, CrcWriter};
    use std::io::Write;

    fn checksum<C: Checksum>(bytes: &[u8]) -> C::Output {
        let mut crc = C::default();
        bytes.iter().for_each(|b| crc.update(*b));
        crc.checksum()
    }

    #[test]
    fn test_crc8() {
        assert_eq!(checksum::<Crc8>(&[]), 0);
        assert_eq!(checksum::<Crc8>(&[0x01]), 0x07);
        assert_eq!(checksum::<Crc8>(&[0x02]), 0x0E);
        // CRC-8/SMBUS check value
        assert_eq!(checksum::<Crc8>(b"123456789"), 0xF4);
    }

    #[test]
    fn test_crc16() {
        assert_eq!(checksum::<Crc16>(&[]), 0);
        // CRC-16/UMTS check value
        assert_eq!(checksum::<Crc16>(b"123456789"), 0xFEE8);
    }

    #[test]
    fn test_crc_writer() {
        let mut w: CrcWriter<_, Crc16> = CrcWriter::new(Vec::new());
        w.write_all(b"1234").unwrap();
        w.write_all(b"56789").unwrap();
        let (bytes, crc) = w.into_parts();
        assert_eq!(bytes, b"123456789");
        assert_eq!(crc, 0xFEE8);
    }
}
