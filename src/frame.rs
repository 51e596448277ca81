// Copyright 2025 Brian Langenberger
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! For estimating and writing complete FLAC frames
//!
//! [`FlacEstimator`] tries every channel assignment and
//! subframe type its [`SearchOptions`] allow and keeps the smallest.
//! Sizes are computed exactly, so a frame's estimate in bits
//! is always 8 times the bytes its [`FrameEncoder`] writes.

use crate::audio::Window;
use crate::crc::{Crc16, CrcWriter};
use crate::metadata::Streaminfo;
use crate::rice::MAX_PARTITION_ORDER;
use crate::segment::{SegmentEncoder, SegmentEstimator, SizeEstimate, StreamFormat};
use crate::stream::{ChannelAssignment, FrameHeader};
use crate::subframe::{MAX_FIXED_ORDER, SubframeEncoder};
use crate::{Counter, Error};
use arrayvec::ArrayVec;
use bitstream_io::{BigEndian, BitWrite, BitWriter};
use std::io::Write;

const MAX_CHANNELS: usize = 8;

/// How hard to search for each frame's smallest encoding
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct SearchOptions {
    /// Highest fixed predictor order to try (0 to 4)
    pub max_fixed_order: u8,
    /// Highest residual partition order to try (0 to 8)
    pub max_partition_order: u32,
    /// Whether to try stereo decorrelation on 2 channel streams
    pub try_stereo: bool,
}

impl SearchOptions {
    /// A quick search of low predictor and partition orders
    pub const FAST: Self = Self {
        max_fixed_order: 2,
        max_partition_order: 4,
        try_stereo: false,
    };

    /// An exhaustive search within FLAC's streamable subset
    pub const SUBSET_BEST: Self = Self {
        max_fixed_order: MAX_FIXED_ORDER,
        max_partition_order: MAX_PARTITION_ORDER,
        try_stereo: true,
    };
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self::SUBSET_BEST
    }
}

/// Finds the smallest FLAC frame for a window
#[derive(Copy, Clone, Debug, Default)]
pub struct FlacEstimator {
    options: SearchOptions,
}

impl FlacEstimator {
    /// Builds estimator with the given search options
    pub fn new(options: SearchOptions) -> Self {
        Self { options }
    }

    fn subframe(&self, samples: &[i64], bits_per_sample: u32) -> (SubframeEncoder, u64) {
        SubframeEncoder::best(
            samples,
            bits_per_sample,
            self.options.max_fixed_order,
            self.options.max_partition_order,
        )
    }
}

impl SegmentEstimator for FlacEstimator {
    type Encoder = FrameEncoder;

    fn estimate(
        &self,
        window: &Window,
        format: &StreamFormat,
    ) -> Result<SizeEstimate<FrameEncoder>, Error> {
        if !(4..=32).contains(&format.bits_per_sample) {
            return Err(Error::InvalidBitsPerSample);
        } else if format.sample_rate > Streaminfo::MAX_SAMPLE_RATE {
            return Err(Error::InvalidSampleRate);
        } else if window.channel_count() != format.channels {
            return Err(Error::ChannelsMismatch);
        } else if format.channels > MAX_CHANNELS {
            return Err(Error::ExcessiveChannels);
        }

        let block_size = u16::try_from(window.len())
            .ok()
            .filter(|size| *size > 0)
            .ok_or(Error::InvalidBlockSize)?;
        let bps = format.bits_per_sample;

        let independent = window
            .channels()
            .map(|channel| self.subframe(channel, bps))
            .collect::<ArrayVec<_, MAX_CHANNELS>>();

        let mut best = (
            ChannelAssignment::Independent(independent.len() as u8),
            independent.iter().map(|(_, bits)| bits).sum::<u64>(),
        );
        let mut subframes = independent
            .iter()
            .map(|(subframe, _)| subframe.clone())
            .collect::<ArrayVec<_, MAX_CHANNELS>>();

        if self.options.try_stereo && format.channels == 2 && bps < 32 {
            let [(left, left_bits), (right, right_bits)] = [&independent[0], &independent[1]];
            let (side, side_bits) = self.subframe(&side(window), bps + 1);
            let (mid, mid_bits) = self.subframe(&mid(window), bps);

            for (assignment, pair, bits) in [
                (
                    ChannelAssignment::LeftSide,
                    [left, &side],
                    left_bits + side_bits,
                ),
                (
                    ChannelAssignment::SideRight,
                    [&side, right],
                    side_bits + right_bits,
                ),
                (
                    ChannelAssignment::MidSide,
                    [&mid, &side],
                    mid_bits + side_bits,
                ),
            ] {
                if bits < best.1 {
                    best = (assignment, bits);
                    subframes = pair.into_iter().cloned().collect();
                }
            }
        }

        let (channel_assignment, subframe_bits) = best;

        let header = FrameHeader {
            block_size,
            sample_rate: format.sample_rate,
            channel_assignment,
            bits_per_sample: bps,
            sample_number: window.offset() as u64,
        };

        // header and CRC-8, byte-aligned subframes, CRC-16
        let bits = header.to_bytes()?.len() as u64 * 8 + subframe_bits.div_ceil(8) * 8 + 16;

        Ok(SizeEstimate {
            encoder: FrameEncoder { header, subframes },
            bits,
        })
    }
}

/// A chosen encoding of a single FLAC frame
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FrameEncoder {
    header: FrameHeader,
    subframes: ArrayVec<SubframeEncoder, MAX_CHANNELS>,
}

impl FrameEncoder {
    /// Returns the frame's header
    pub fn header(&self) -> &FrameHeader {
        &self.header
    }

    /// Writes frame header, subframes and CRC-16
    fn write<W: Write>(&self, window: &Window, writer: W) -> Result<u64, Error> {
        let bps = self.header.bits_per_sample;

        let mut w = BitWriter::endian(
            CrcWriter::<_, Crc16>::new(Counter::new(writer)),
            BigEndian,
        );

        w.write_bytes(&self.header.to_bytes()?)?;

        match self.header.channel_assignment {
            ChannelAssignment::Independent(_) => {
                for (subframe, channel) in self.subframes.iter().zip(window.channels()) {
                    subframe.write(&mut w, channel, bps)?;
                }
            }
            ChannelAssignment::LeftSide => {
                self.subframes[0].write(&mut w, window.channel(0), bps)?;
                self.subframes[1].write(&mut w, &side(window), bps + 1)?;
            }
            ChannelAssignment::SideRight => {
                self.subframes[0].write(&mut w, &side(window), bps + 1)?;
                self.subframes[1].write(&mut w, window.channel(1), bps)?;
            }
            ChannelAssignment::MidSide => {
                self.subframes[0].write(&mut w, &mid(window), bps)?;
                self.subframes[1].write(&mut w, &side(window), bps + 1)?;
            }
        }

        w.byte_align()?;

        let (mut counter, crc16) = w.into_writer().into_parts();
        counter.write_all(&crc16.to_be_bytes())?;
        Ok(counter.count)
    }
}

impl SegmentEncoder for FrameEncoder {
    #[inline]
    fn block_size(&self) -> usize {
        self.header.block_size.into()
    }

    fn emit<W: Write>(&self, window: &Window, writer: W) -> Result<u64, Error> {
        if window.len() != self.block_size() {
            Err(Error::InvalidBlockSize)
        } else if window.channel_count() != self.subframes.len() {
            Err(Error::ChannelsMismatch)
        } else {
            self.write(window, writer)
        }
    }
}

/// Left minus right
fn side(window: &Window) -> Vec<i64> {
    window
        .channel(0)
        .iter()
        .zip(window.channel(1))
        .map(|(l, r)| l - r)
        .collect()
}

/// Average of left and right, rounded down
fn mid(window: &Window) -> Vec<i64> {
    window
        .channel(0)
        .iter()
        .zip(window.channel(1))
        .map(|(l, r)| (l + r) >> 1)
        .collect()
}
