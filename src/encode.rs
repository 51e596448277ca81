// Copyright 2025 Brian Langenberger
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! For encoding PCM samples to FLAC files

use crate::audio::SampleBuffer;
use crate::frame::{FlacEstimator, SearchOptions};
use crate::metadata::{MAX_PADDING_SIZE, Streaminfo, write_blocks};
use crate::segment::{CostGrid, FrameRecord, Grid, Segmentation, StreamFormat};
use crate::{Counter, Error, stats};
use bitstream_io::{BitWrite, BitWriter, LittleEndian};
use log::{debug, info};
use std::io::{Seek, SeekFrom, Write};
use std::num::NonZero;

/// FLAC encoding options
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct EncodingOptions {
    grid: Grid,
    search: SearchOptions,
    padding: Option<u32>,
}

impl EncodingOptions {
    /// Assigns new base block size to options
    ///
    /// Every frame boundary falls on a multiple of this size.
    ///
    /// # Errors
    ///
    /// Returns an error if any multiplier would produce
    /// a block smaller than 16 or larger than 65535 samples.
    pub fn block_size(self, base: usize) -> Result<Self, Error> {
        Ok(Self {
            grid: subset_grid(Grid::new(base, self.grid.multipliers())?)?,
            ..self
        })
    }

    /// Assigns new block size multipliers to options
    ///
    /// Candidate block sizes are each multiplier
    /// times the base block size.
    ///
    /// # Errors
    ///
    /// Returns an error if the multipliers are empty, contain 0,
    /// or would produce a block smaller than 16
    /// or larger than 65535 samples.
    pub fn multipliers(self, multipliers: impl Into<Vec<usize>>) -> Result<Self, Error> {
        Ok(Self {
            grid: subset_grid(Grid::new(self.grid.base(), multipliers)?)?,
            ..self
        })
    }

    /// Assigns new per-frame search options
    pub fn search(self, search: SearchOptions) -> Self {
        Self { search, ..self }
    }

    /// Adds PADDING block of the given size after STREAMINFO
    ///
    /// # Errors
    ///
    /// Returns an error if the size exceeds 2²⁴ - 1 bytes.
    pub fn padding(self, size: u32) -> Result<Self, Error> {
        if size > MAX_PADDING_SIZE {
            return Err(Error::ExcessivePadding);
        }

        Ok(Self {
            padding: Some(size),
            ..self
        })
    }

    /// Removes any PADDING block
    pub fn no_padding(self) -> Self {
        Self {
            padding: None,
            ..self
        }
    }
}

// only a stream's final block may be shorter than 16 samples
fn subset_grid(grid: Grid) -> Result<Grid, Error> {
    let min_block = grid.base() * grid.multipliers().iter().min().copied().unwrap_or(0);
    if min_block < usize::from(Streaminfo::MIN_BLOCK_SIZE.get()) {
        Err(Error::InvalidBlockSize)
    } else {
        Ok(grid)
    }
}

impl Default for EncodingOptions {
    fn default() -> Self {
        Self {
            grid: Grid::default(),
            search: SearchOptions::default(),
            padding: None,
        }
    }
}

/// The outcome of encoding a stream
#[derive(Clone, Debug)]
pub struct EncodeSummary {
    /// Every frame written, in stream order
    pub frames: Vec<FrameRecord>,
    /// The final STREAMINFO block
    pub streaminfo: Streaminfo,
    /// The estimated size of all frames, in bits
    pub estimated_bits: u64,
    /// The size of all frames, in bytes
    pub frame_bytes: u64,
}

impl EncodeSummary {
    /// Returns histogram of frame block sizes
    pub fn block_sizes(&self) -> stats::Histogram {
        stats::block_sizes(&self.frames)
    }

    /// Returns histogram of frame sizes
    pub fn frame_sizes(&self) -> stats::Histogram {
        stats::frame_sizes(&self.frames)
    }

    /// Returns average compression ratio of each block size
    pub fn compression_ratios(&self) -> stats::Histogram {
        stats::compression_ratios(
            &self.frames,
            self.streaminfo.channels.get().into(),
            self.streaminfo.bits_per_sample,
        )
    }
}

/// Encodes a whole buffer of samples to a FLAC file
///
/// Writes the `fLaC` tag, STREAMINFO and any PADDING,
/// then the frames which together make the smallest stream.
/// Afterward, the writer is rewound to where the stream began
/// and STREAMINFO is rewritten with its final values.
/// The writer is left at the end of the stream.
///
/// `sample_rate` must be between 0 (for non-audio streams)
/// and 1048575 (a 20 bit field).
///
/// # Errors
///
/// Returns an error if the buffer is empty, too long,
/// in a format FLAC can't store,
/// or holds a sample outside of its bits-per-sample.
/// Passes along any I/O error from the writer,
/// in which case the stream is left incomplete.
pub fn encode_samples<W: Write + Seek>(
    mut writer: W,
    options: EncodingOptions,
    buffer: &SampleBuffer,
    sample_rate: u32,
) -> Result<EncodeSummary, Error> {
    let mut streaminfo = Streaminfo::new(
        sample_rate,
        buffer.channel_count(),
        buffer.bits_per_sample(),
    )?;

    streaminfo.total_samples = match u64::try_from(buffer.pcm_frames()) {
        Ok(0) => return Err(Error::NoSamples),
        Ok(total @ 1..=Streaminfo::MAX_TOTAL_SAMPLES) => NonZero::new(total),
        _ => return Err(Error::ExcessiveTotalSamples),
    };

    if !buffer.samples_in_range() {
        return Err(Error::SampleOutOfRange);
    }

    let start = writer.stream_position()?;
    write_blocks(writer.by_ref(), &streaminfo, options.padding)?;

    info!(
        "encoding {} samples in {} channels with base block size {} and multipliers {:?}",
        buffer.pcm_frames(),
        buffer.channel_count(),
        options.grid.base(),
        options.grid.multipliers()
    );

    let segmentation = Segmentation::solve(CostGrid::build(
        &FlacEstimator::new(options.search),
        buffer,
        &StreamFormat::new(buffer, sample_rate),
        &options.grid,
    )?);

    let mut output = Counter::new(writer.by_ref());
    let frames = segmentation.emit(buffer, &mut output, &mut streaminfo)?;
    let frame_bytes = output.count;

    debug!(
        "wrote {frame_bytes} bytes of frames, estimated {} bytes",
        segmentation.total_bits().div_ceil(8)
    );

    streaminfo.md5 = Some(audio_md5(buffer)?);

    let end = writer.stream_position()?;
    writer.seek(SeekFrom::Start(start))?;
    write_blocks(writer.by_ref(), &streaminfo, options.padding)?;
    writer.seek(SeekFrom::Start(end))?;

    let summary = EncodeSummary {
        frames,
        streaminfo,
        estimated_bits: segmentation.total_bits(),
        frame_bytes,
    };

    info!("{}", summary.block_sizes());

    Ok(summary)
}

/// MD5 of samples as little-endian bytes, interleaved
///
/// Each sample takes as many bytes as its bits-per-sample
/// requires, rounded up.
fn audio_md5(buffer: &SampleBuffer) -> std::io::Result<[u8; 16]> {
    let bits = buffer.bytes_per_sample() as u32 * 8;
    let mut w = BitWriter::endian(md5::Context::new(), LittleEndian);

    for sample in buffer.iter() {
        w.write_signed_var::<i32>(bits, sample)?;
    }
    w.byte_align()?;

    Ok(w.into_writer().compute().0)
}
