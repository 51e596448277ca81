// Copyright 2025 Brian Langenberger
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! For writing a FLAC file's metadata blocks
//!
//! Only the blocks an encoder needs are supported:
//!
//! | Block Type | Purpose |
//! |-----------:|---------|
//! | [STREAMINFO](`Streaminfo`) | stream information such as sample rate, channel count, etc. |
//! | PADDING | empty data which can easily be resized as needed |

use crate::Error;
use bitstream_io::{BigEndian, BitWrite, BitWriter, ToBitStream};
use std::num::NonZero;

const FLAC_TAG: &[u8; 4] = b"fLaC";

/// The largest PADDING block, in bytes (2²⁴ - 1)
pub const MAX_PADDING_SIZE: u32 = BlockHeader::MAX_SIZE;

/// A FLAC metadata block header
///
/// | Bits | Field | Meaning |
/// |-----:|------:|---------|
/// | 1    | `last` | final metadata block in file |
/// | 7    | `block_type` | type of block |
/// | 24   | `size` | block size, in bytes |
#[derive(Debug, Eq, PartialEq)]
struct BlockHeader {
    last: bool,
    block_type: BlockType,
    size: u32,
}

impl BlockHeader {
    const MAX_SIZE: u32 = (1 << 24) - 1;
}

impl ToBitStream for BlockHeader {
    type Error = std::io::Error;

    fn to_writer<W: BitWrite + ?Sized>(&self, w: &mut W) -> Result<(), Self::Error> {
        w.write_bit(self.last)?;
        w.write::<7, u8>(match self.block_type {
            BlockType::Streaminfo => 0,
            BlockType::Padding => 1,
        })?;
        w.write::<24, u32>(self.size)
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum BlockType {
    Streaminfo,
    Padding,
}

/// A STREAMINFO metadata block
///
/// This block contains metadata about the stream's contents.
///
/// It must *always* be present in a FLAC file,
/// must *always* be the first metadata block in the stream,
/// and must *not* be present more than once.
///
/// | Bits | Field | Meaning |
/// |-----:|------:|---------|
/// | 16   | `minimum_block_size` | minimum block size (in samples) in the stream
/// | 16   | `maximum_block_size` | maximum block size (in samples) in the stream
/// | 24   | `minimum_frame_size` | minimum frame size (in bytes) in the stream
/// | 24   | `maximum_frame_size` | maximum frame size (in bytes) in the stream
/// | 20   | `sample_rate` | stream's sample rate, in Hz
/// | 3    | `channels` | stream's channel count (+1)
/// | 5    | `bits_per_sample` | stream's bits-per-sample (+1)
/// | 36   | `total_samples` | stream's total channel-independent samples
/// | 16×8 | `md5` | decoded stream's MD5 sum hash
///
/// Values which haven't been observed yet are `None`
/// and are written as 0.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Streaminfo {
    /// The minimum block size (in samples) used in the stream
    pub minimum_block_size: Option<NonZero<u16>>,
    /// The maximum block size (in samples) used in the stream
    pub maximum_block_size: Option<NonZero<u16>>,
    /// The minimum framesize (in bytes) used in the stream
    pub minimum_frame_size: Option<NonZero<u32>>,
    /// The maximum framesize (in bytes) used in the stream
    pub maximum_frame_size: Option<NonZero<u32>>,
    /// Sample rate in Hz
    ///
    /// 0 indicates a non-audio stream.
    pub sample_rate: u32,
    /// Number of channels, from 1 to 8
    pub channels: NonZero<u8>,
    /// Number of bits-per-sample, from 4 to 32
    pub bits_per_sample: u32,
    /// Total number of interchannel samples in stream
    pub total_samples: Option<NonZero<u64>>,
    /// MD5 hash of unencoded audio data
    pub md5: Option<[u8; 16]>,
}

impl Streaminfo {
    /// The maximum size of a frame, in bytes (2²⁴ - 1)
    pub const MAX_FRAME_SIZE: u32 = (1 << 24) - 1;

    /// The maximum sample rate, in Hz (2²⁰ - 1)
    pub const MAX_SAMPLE_RATE: u32 = (1 << 20) - 1;

    /// The maximum number of channels (8)
    pub const MAX_CHANNELS: u8 = 8;

    /// The maximum number of total samples (2³⁶ - 1)
    pub const MAX_TOTAL_SAMPLES: u64 = (1 << 36) - 1;

    /// The smallest block size a stream may declare, in samples
    ///
    /// Only a stream's final block may be shorter.
    pub const MIN_BLOCK_SIZE: NonZero<u16> = NonZero::new(16).unwrap();

    /// Defined size of STREAMINFO block
    const SIZE: u32 = 0x22;

    /// Builds STREAMINFO with no observed block or frame sizes
    ///
    /// # Errors
    ///
    /// Returns an error if any of the parameters
    /// cannot be stored in a STREAMINFO block.
    pub fn new(sample_rate: u32, channels: usize, bits_per_sample: u32) -> Result<Self, Error> {
        Ok(Self {
            minimum_block_size: None,
            maximum_block_size: None,
            minimum_frame_size: None,
            maximum_frame_size: None,
            sample_rate: (0..=Self::MAX_SAMPLE_RATE)
                .contains(&sample_rate)
                .then_some(sample_rate)
                .ok_or(Error::InvalidSampleRate)?,
            channels: u8::try_from(channels)
                .ok()
                .filter(|c| *c <= Self::MAX_CHANNELS)
                .and_then(NonZero::new)
                .ok_or(Error::ExcessiveChannels)?,
            bits_per_sample: (4..=32)
                .contains(&bits_per_sample)
                .then_some(bits_per_sample)
                .ok_or(Error::InvalidBitsPerSample)?,
            total_samples: None,
            md5: None,
        })
    }

    /// Updates minimum and maximum block size with a new block
    ///
    /// The minimum never drops below [`Self::MIN_BLOCK_SIZE`]
    /// so that a short final block leaves the stream valid,
    /// unless every block is shorter than that,
    /// in which case the minimum equals the maximum.
    pub fn observe_block_size(&mut self, block_size: NonZero<u16>) {
        let floored = block_size.max(Self::MIN_BLOCK_SIZE);

        match &mut self.minimum_block_size {
            Some(min_size) => {
                *min_size = floored.min(*min_size);
            }
            min_size @ None => {
                *min_size = Some(floored);
            }
        }

        match &mut self.maximum_block_size {
            Some(max_size) => {
                *max_size = block_size.max(*max_size);
            }
            max_size @ None => {
                *max_size = Some(block_size);
            }
        }

        if let (Some(min_size), Some(max_size)) =
            (self.minimum_block_size, self.maximum_block_size)
        {
            if min_size > max_size {
                self.minimum_block_size = Some(max_size);
            }
        }
    }

    /// Updates minimum and maximum frame size with a new frame
    ///
    /// # Errors
    ///
    /// Returns an error if the frame is empty
    /// or too large to be stored.
    pub fn observe_frame_size(&mut self, frame_size: u64) -> Result<(), Error> {
        let size = u32::try_from(frame_size)
            .ok()
            .filter(|size| *size <= Self::MAX_FRAME_SIZE)
            .and_then(NonZero::new)
            .ok_or(Error::ExcessiveFrameSize)?;

        match &mut self.minimum_frame_size {
            Some(min_size) => {
                *min_size = size.min(*min_size);
            }
            min_size @ None => {
                *min_size = Some(size);
            }
        }

        match &mut self.maximum_frame_size {
            Some(max_size) => {
                *max_size = size.max(*max_size);
            }
            max_size @ None => {
                *max_size = Some(size);
            }
        }

        Ok(())
    }
}

impl ToBitStream for Streaminfo {
    type Error = std::io::Error;

    fn to_writer<W: BitWrite + ?Sized>(&self, w: &mut W) -> Result<(), Self::Error> {
        w.write::<16, u16>(self.minimum_block_size.map_or(0, NonZero::get))?;
        w.write::<16, u16>(self.maximum_block_size.map_or(0, NonZero::get))?;
        w.write::<24, u32>(self.minimum_frame_size.map_or(0, NonZero::get))?;
        w.write::<24, u32>(self.maximum_frame_size.map_or(0, NonZero::get))?;
        w.write::<20, u32>(self.sample_rate)?;
        w.write::<3, u8>(self.channels.get() - 1)?;
        w.write::<5, u32>(self.bits_per_sample - 1)?;
        w.write::<36, u64>(self.total_samples.map_or(0, NonZero::get))?;
        w.write_bytes(&self.md5.unwrap_or([0; 16]))?;
        Ok(())
    }
}

/// Writes the FLAC tag, STREAMINFO and an optional PADDING block
///
/// # Errors
///
/// Passes along any I/O error from the underlying stream,
/// or returns an error if the padding is too large.
pub fn write_blocks<W: std::io::Write>(
    w: W,
    streaminfo: &Streaminfo,
    padding: Option<u32>,
) -> Result<(), Error> {
    let mut w = BitWriter::endian(w, BigEndian);

    w.write_bytes(FLAC_TAG)?;

    w.build(&BlockHeader {
        last: padding.is_none(),
        block_type: BlockType::Streaminfo,
        size: Streaminfo::SIZE,
    })?;
    w.build(streaminfo)?;

    if let Some(size) = padding {
        if size > BlockHeader::MAX_SIZE {
            return Err(Error::ExcessivePadding);
        }

        w.build(&BlockHeader {
            last: true,
            block_type: BlockType::Padding,
            size,
        })?;
        w.pad(size * 8)?;
    }

    Ok(())
}
