// Copyright 2025 Brian Langenberger
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! A FLAC encoder which searches for the best mix of block sizes
//!
//! Rather than split a stream into blocks of a single fixed size,
//! this encoder divides the stream into a grid of small cells
//! and estimates the encoded size of a frame starting at every
//! cell for each of several candidate block sizes.
//! A dynamic programming pass then finds the sequence of
//! frames with the smallest total size, and those frames
//! are written out using FLAC's variable blocking strategy.
//!
//! # Example
//!
//! ```
//! use flac_optimize::audio::SampleBuffer;
//! use flac_optimize::encode::{EncodingOptions, encode_samples};
//! use std::io::Cursor;
//!
//! // a short 16-bit stereo ramp
//! let samples = (0..20_000).map(|i| (i % 512) - 256).collect::<Vec<i32>>();
//! let buffer = SampleBuffer::from_interleaved(&samples, 2, 16);
//!
//! let mut flac = Cursor::new(vec![]);
//! let summary = encode_samples(
//!     &mut flac,
//!     EncodingOptions::default(),
//!     &buffer,
//!     44100,
//! ).unwrap();
//!
//! assert_eq!(summary.frames.iter().map(|f| f.block_size).sum::<usize>(), 10_000);
//! assert!(flac.get_ref().starts_with(b"fLaC"));
//! ```

#![warn(missing_docs)]

pub mod audio;
mod crc;
pub mod encode;
pub mod frame;
pub mod metadata;
mod rice;
pub mod segment;
pub mod stats;
pub mod stream;
mod subframe;

/// A FLAC encoding error
#[derive(Debug)]
pub enum Error {
    /// An I/O error from the underlying stream
    Io(std::io::Error),
    /// A base block size or candidate block size is out of range
    InvalidBlockSize,
    /// The set of block size multipliers is empty or contains zero
    InvalidMultipliers,
    /// The sample rate does not fit in STREAMINFO
    InvalidSampleRate,
    /// The bits-per-sample is outside of 4 to 32
    InvalidBitsPerSample,
    /// The channel count is outside of 1 to 8
    ExcessiveChannels,
    /// A window's channel count doesn't match the stream's
    ChannelsMismatch,
    /// The stream contains no samples
    NoSamples,
    /// The stream has more samples than STREAMINFO can hold
    ExcessiveTotalSamples,
    /// An encoded frame is too large for STREAMINFO
    ExcessiveFrameSize,
    /// An encoded frame's reported size differs from the bytes written
    FrameSizeMismatch,
    /// A frame's sample number is too large to encode
    InvalidSampleNumber,
    /// A PADDING block is too large for its block header
    ExcessivePadding,
    /// A sample doesn't fit in the stream's bits-per-sample
    SampleOutOfRange,
}

impl From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Self {
        Self::Io(error)
    }
}

impl std::error::Error for Error {}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => e.fmt(f),
            Self::InvalidBlockSize => "invalid block size".fmt(f),
            Self::InvalidMultipliers => "invalid block size multipliers".fmt(f),
            Self::InvalidSampleRate => "invalid sample rate".fmt(f),
            Self::InvalidBitsPerSample => "invalid bits-per-sample".fmt(f),
            Self::ExcessiveChannels => "excessive channel count".fmt(f),
            Self::ChannelsMismatch => "channel count mismatch".fmt(f),
            Self::NoSamples => "no samples to encode".fmt(f),
            Self::ExcessiveTotalSamples => "excessive total samples".fmt(f),
            Self::ExcessiveFrameSize => "encoded frame too large".fmt(f),
            Self::FrameSizeMismatch => "encoded frame size mismatch".fmt(f),
            Self::InvalidSampleNumber => "invalid frame sample number".fmt(f),
            Self::ExcessivePadding => "excessive PADDING block size".fmt(f),
            Self::SampleOutOfRange => "sample out of range for bits-per-sample".fmt(f),
        }
    }
}

/// A stream wrapper which counts the bytes passing through it
///
/// Frames are measured by taking the difference
/// of `count` before and after writing them.
#[derive(Debug)]
pub struct Counter<S> {
    /// The wrapped stream
    pub stream: S,
    /// Total bytes written so far
    pub count: u64,
}

impl<S> Counter<S> {
    /// Wraps stream with a count of 0
    pub fn new(stream: S) -> Self {
        Self { stream, count: 0 }
    }
}

impl<W: std::io::Write> std::io::Write for Counter<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let written = self.stream.write(buf)?;
        self.count += written as u64;
        Ok(written)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.stream.flush()
    }
}
