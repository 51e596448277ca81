// Copyright 2025 Brian Langenberger
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! For handling common FLAC stream items

use crate::Error;
use crate::crc::{Crc8, CrcWriter};
use bitstream_io::{BigEndian, BitWrite, BitWriter, ToBitStream};

/// A FLAC frame header using the variable blocking strategy
///
/// Because block sizes may differ from frame to frame,
/// each header carries the number of its first sample
/// rather than a frame number.
///
/// | Bits | Field |
/// |-----:|-------|
/// | 15   | sync code |
/// | 1    | blocking strategy (always variable) |
/// | 4    | block size |
/// | 4    | sample rate |
/// | 4    | channel assignment |
/// | 3    | bits-per-sample |
/// | 1    | padding |
/// | 8-56 | sample number |
/// | 0-16 | uncommon block size |
/// | 0-16 | uncommon sample rate |
/// | 8    | CRC-8 |
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct FrameHeader {
    /// The frame's block size, in samples
    pub block_size: u16,
    /// The stream's sample rate, in Hz
    pub sample_rate: u32,
    /// How the frame's channels are stored
    pub channel_assignment: ChannelAssignment,
    /// The stream's bits-per-sample
    pub bits_per_sample: u32,
    /// The number of the frame's first sample in the stream
    pub sample_number: u64,
}

impl FrameHeader {
    const SYNC_CODE: u16 = 0b111111111111100;

    /// The largest sample number which may be encoded (2³⁶ - 1)
    pub const MAX_SAMPLE_NUMBER: u64 = (1 << 36) - 1;

    /// Returns complete header bytes, including CRC-8
    ///
    /// # Errors
    ///
    /// Returns an error if the sample number is too large.
    pub fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        let mut w = BitWriter::endian(CrcWriter::<_, Crc8>::new(Vec::new()), BigEndian);
        w.build(self)?;
        let (mut bytes, crc8) = w.into_writer().into_parts();
        bytes.push(crc8);
        Ok(bytes)
    }
}

impl ToBitStream for FrameHeader {
    type Error = Error;

    fn to_writer<W: BitWrite + ?Sized>(&self, w: &mut W) -> Result<(), Self::Error> {
        let (encoded_block_size, uncommon_block_size) = match self.block_size {
            192 => (0b0001, None),
            576 => (0b0010, None),
            1152 => (0b0011, None),
            2304 => (0b0100, None),
            4608 => (0b0101, None),
            size @ (256 | 512 | 1024 | 2048 | 4096 | 8192 | 16384 | 32768) => {
                (size.trailing_zeros() as u8, None)
            }
            size @ 1..=256 => (0b0110, Some((8, size - 1))),
            size => (0b0111, Some((16, size - 1))),
        };

        let (encoded_sample_rate, uncommon_sample_rate) = match self.sample_rate {
            0 => (0b0000, None),
            88200 => (0b0001, None),
            176400 => (0b0010, None),
            192000 => (0b0011, None),
            8000 => (0b0100, None),
            16000 => (0b0101, None),
            22050 => (0b0110, None),
            24000 => (0b0111, None),
            32000 => (0b1000, None),
            44100 => (0b1001, None),
            48000 => (0b1010, None),
            96000 => (0b1011, None),
            rate if rate % 1000 == 0 && rate / 1000 <= 0xFF => (0b1100, Some((8, rate / 1000))),
            rate @ 1..=0xFFFF => (0b1101, Some((16, rate))),
            rate if rate % 10 == 0 && rate / 10 <= 0xFFFF => (0b1110, Some((16, rate / 10))),
            _ => (0b0000, None), // use STREAMINFO's
        };

        let encoded_bps = match self.bits_per_sample {
            8 => 0b001,
            12 => 0b010,
            16 => 0b100,
            20 => 0b101,
            24 => 0b110,
            32 => 0b111,
            _ => 0b000, // use STREAMINFO's
        };

        w.write::<15, u16>(Self::SYNC_CODE)?;
        w.write_bit(true)?; // variable blocking strategy
        w.write::<4, u8>(encoded_block_size)?;
        w.write::<4, u8>(encoded_sample_rate)?;
        w.write::<4, u8>(self.channel_assignment.code())?;
        w.write::<3, u8>(encoded_bps)?;
        w.pad(1)?;
        write_sample_number(w, self.sample_number)?;
        if let Some((bits, size)) = uncommon_block_size {
            w.write_var::<u16>(bits, size)?;
        }
        if let Some((bits, rate)) = uncommon_sample_rate {
            w.write_var::<u32>(bits, rate)?;
        }
        Ok(())
    }
}

/// Writes sample number using FLAC's UTF-8-like coding
fn write_sample_number<W: BitWrite + ?Sized>(w: &mut W, number: u64) -> Result<(), Error> {
    let continuation_bytes: u32 = match number {
        0..0x80 => return w.write::<8, u64>(number).map_err(Error::Io),
        0x80..0x800 => 1,
        0x800..0x10000 => 2,
        0x10000..0x200000 => 3,
        0x200000..0x4000000 => 4,
        0x4000000..0x80000000 => 5,
        0x80000000..=FrameHeader::MAX_SAMPLE_NUMBER => 6,
        _ => return Err(Error::InvalidSampleNumber),
    };

    // leading 1 bits give the total byte count
    w.write_unary::<0>(continuation_bytes + 1)?;
    let lead_bits = 6 - continuation_bytes;
    if lead_bits > 0 {
        w.write_var::<u64>(lead_bits, number >> (6 * continuation_bytes))?;
    }
    for byte in (0..continuation_bytes).rev() {
        w.write::<2, u8>(0b10)?;
        w.write::<6, u64>((number >> (6 * byte)) & 0b111111)?;
    }
    Ok(())
}

/// How a frame's channels are stored
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ChannelAssignment {
    /// Each channel stored as-is, with the given channel count
    Independent(u8),
    /// Left channel, then left minus right
    LeftSide,
    /// Left minus right, then right channel
    SideRight,
    /// Average of left and right, then left minus right
    MidSide,
}

impl ChannelAssignment {
    fn code(&self) -> u8 {
        match self {
            Self::Independent(channels) => channels - 1,
            Self::LeftSide => 0b1000,
            Self::SideRight => 0b1001,
            Self::MidSide => 0b1010,
        }
    }

    /// Returns number of subframes
    pub fn len(&self) -> u8 {
        match self {
            Self::Independent(channels) => *channels,
            Self::LeftSide | Self::SideRight | Self::MidSide => 2,
        }
    }

    /// Always returns false since frames have at least one subframe
    pub fn is_empty(&self) -> bool {
        false
    }
}

/// A subframe header
///
/// | Bits | Field |
/// |-----:|-------|
/// | 1    | padding |
/// | 6    | subframe type |
/// | 1    | wasted bits present |
/// | 0+   | wasted bits-per-sample, minus one, in unary |
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct SubframeHeader {
    /// The subframe's type
    pub type_: SubframeHeaderType,
    /// Number of low bits which are always zero
    pub wasted_bps: u32,
}

impl SubframeHeader {
    /// Returns header's size in bits
    pub fn bits(&self) -> u64 {
        8 + u64::from(self.wasted_bps)
    }
}

impl ToBitStream for SubframeHeader {
    type Error = std::io::Error;

    fn to_writer<W: BitWrite + ?Sized>(&self, w: &mut W) -> Result<(), Self::Error> {
        w.pad(1)?;
        w.write::<6, u8>(match self.type_ {
            SubframeHeaderType::Constant => 0b000000,
            SubframeHeaderType::Verbatim => 0b000001,
            SubframeHeaderType::Fixed(order) => 0b001000 | order,
        })?;
        match self.wasted_bps.checked_sub(1) {
            None => w.write_bit(false),
            Some(wasted) => {
                w.write_bit(true)?;
                w.write_unary::<1>(wasted)
            }
        }
    }
}

/// A subframe type
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SubframeHeaderType {
    /// A single value repeated for the whole block
    Constant,
    /// Uncompressed samples
    Verbatim,
    /// Fixed predictor of the given order (0 to 4)
    Fixed(u8),
}

#[cfg(test)]
mod test {
    use super::{ChannelAssignment, FrameHeader, SubframeHeader, SubframeHeaderType};
    use bitstream_io::{BigEndian, BitWrite, BitWriter};

    fn header(block_size: u16, sample_rate: u32, sample_number: u64) -> FrameHeader {
        FrameHeader {
            block_size,
            sample_rate,
            channel_assignment: ChannelAssignment::Independent(2),
            bits_per_sample: 16,
            sample_number,
        }
    }

    #[test]
    fn test_common_header() {
        let bytes = header(4096, 44100, 0).to_bytes().unwrap();
        assert_eq!(
            bytes,
            // sync + variable, 4096 + 44.1kHz, independent stereo + 16 bps,
            // sample number 0, CRC-8
            vec![0xFF, 0xF9, 0xC9, 0x18, 0x00, bytes[5]]
        );
        assert_eq!(bytes.len(), 6);
    }

    #[test]
    fn test_uncommon_sizes() {
        // 3072 samples stored as 16-bit size-1
        let bytes = header(3072, 44100, 0).to_bytes().unwrap();
        assert_eq!(bytes[2] >> 4, 0b0111);
        assert_eq!(&bytes[5..7], &3071u16.to_be_bytes());
        assert_eq!(bytes.len(), 8);

        // 100 samples stored as 8-bit size-1
        let bytes = header(100, 44100, 0).to_bytes().unwrap();
        assert_eq!(bytes[2] >> 4, 0b0110);
        assert_eq!(bytes[5], 99);

        // 11025 Hz stored as a 16-bit rate
        let bytes = header(4096, 11025, 0).to_bytes().unwrap();
        assert_eq!(bytes[2] & 0b1111, 0b1101);
        assert_eq!(&bytes[5..7], &11025u16.to_be_bytes());

        // a rate of 0 defers to STREAMINFO with no extra bytes
        let bytes = header(4096, 0, 0).to_bytes().unwrap();
        assert_eq!(bytes[2] & 0b1111, 0b0000);
        assert_eq!(bytes.len(), 6);
    }

    #[test]
    fn test_sample_numbers() {
        let number_bytes = |number: u64| {
            let bytes = header(4096, 44100, number).to_bytes().unwrap();
            bytes[4..bytes.len() - 1].to_vec()
        };

        assert_eq!(number_bytes(0x7F), vec![0x7F]);
        assert_eq!(number_bytes(0x80), vec![0xC2, 0x80]);
        assert_eq!(number_bytes(0x800), vec![0xE0, 0xA0, 0x80]);
        assert_eq!(number_bytes(0x10000), vec![0xF0, 0x90, 0x80, 0x80]);
        assert_eq!(
            number_bytes(FrameHeader::MAX_SAMPLE_NUMBER),
            vec![0xFE, 0xBF, 0xBF, 0xBF, 0xBF, 0xBF, 0xBF]
        );
        assert!(
            header(4096, 44100, FrameHeader::MAX_SAMPLE_NUMBER + 1)
                .to_bytes()
                .is_err()
        );
    }

    #[test]
    fn test_subframe_header() {
        let mut w = BitWriter::endian(Vec::new(), BigEndian);
        let header = SubframeHeader {
            type_: SubframeHeaderType::Fixed(2),
            wasted_bps: 3,
        };
        w.build(&header).unwrap();
        assert_eq!(header.bits(), 11);
        w.byte_align().unwrap();
        // 0 001010 1 001 padded
        assert_eq!(w.into_writer(), vec![0b0001_0101, 0b0010_0000]);
    }
}
