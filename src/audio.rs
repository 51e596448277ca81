// Copyright 2025 Brian Langenberger
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! For holding PCM samples to be encoded

/// A complete multichannel buffer of PCM samples
///
/// All channels have the same length.
/// The buffer is never modified once built;
/// encoders only read ranges of it as [`Window`]s.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct SampleBuffer {
    // all samples, stacked by channel
    samples: Vec<i32>,

    // total number of channels
    channels: usize,

    // total length of each channel in samples
    channel_len: usize,

    // bits-per-sample
    bits_per_sample: u32,
}

impl SampleBuffer {
    /// Builds buffer from interleaved samples
    ///
    /// Any trailing partial PCM frame is discarded.
    ///
    /// # Panics
    ///
    /// Panics if `channels` is 0.
    pub fn from_interleaved(samples: &[i32], channels: usize, bits_per_sample: u32) -> Self {
        assert!(channels > 0, "at least one channel is required");

        let channel_len = samples.len() / channels;

        Self {
            samples: (0..channels)
                .flat_map(|c| (0..channel_len).map(move |s| samples[(s * channels) + c]))
                .collect(),
            channels,
            channel_len,
            bits_per_sample,
        }
    }

    /// Builds buffer from individual channels
    ///
    /// # Panics
    ///
    /// Panics if no channels are given
    /// or if the channels differ in length.
    pub fn from_channels<C: AsRef<[i32]>>(channels: &[C], bits_per_sample: u32) -> Self {
        let channel_len = channels
            .first()
            .map(|c| c.as_ref().len())
            .expect("at least one channel is required");

        assert!(
            channels.iter().all(|c| c.as_ref().len() == channel_len),
            "all channels must be the same length"
        );

        Self {
            samples: channels
                .iter()
                .flat_map(|c| c.as_ref().iter().copied())
                .collect(),
            channels: channels.len(),
            channel_len,
            bits_per_sample,
        }
    }

    /// Returns channel count
    #[inline]
    pub fn channel_count(&self) -> usize {
        self.channels
    }

    /// Returns bits-per-sample
    #[inline]
    pub fn bits_per_sample(&self) -> u32 {
        self.bits_per_sample
    }

    /// Returns PCM frame count
    #[inline]
    pub fn pcm_frames(&self) -> usize {
        self.channel_len
    }

    /// Returns true if the buffer holds no PCM frames
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.channel_len == 0
    }

    /// Iterates over all channels
    #[inline]
    pub fn channels(&self) -> impl Iterator<Item = &[i32]> {
        // chunks_exact panics on a zero chunk size
        self.samples.chunks_exact(self.channel_len.max(1))
    }

    /// Iterates over all samples in interleaved order
    pub fn iter(&self) -> impl Iterator<Item = i32> {
        (0..self.samples.len()).map(|i| {
            let (sample, channel) = (i / self.channels, i % self.channels);
            self.samples[channel * self.channel_len + sample]
        })
    }

    /// Returns bytes-per-sample
    #[inline]
    pub fn bytes_per_sample(&self) -> usize {
        self.bits_per_sample.div_ceil(8) as usize
    }

    /// Whether every sample fits in a signed integer
    /// of the buffer's bits-per-sample
    pub fn samples_in_range(&self) -> bool {
        match self.bits_per_sample {
            bits @ 1..32 => {
                let range = -(1i32 << (bits - 1))..(1i32 << (bits - 1));
                self.samples.iter().all(|s| range.contains(s))
            }
            _ => true,
        }
    }

    /// Copies a range of samples from every channel into a new window
    ///
    /// Samples are widened to 64 bits so that predictors and
    /// stereo decorrelation can operate without overflow.
    /// A 32-bit sample passed through a 4th order fixed predictor
    /// (whose coefficients sum in magnitude to 16) needs at most 37 bits,
    /// and a side channel needs at most 33.
    ///
    /// # Panics
    ///
    /// Panics if `offset + len` exceeds the buffer's length.
    pub fn window(&self, offset: usize, len: usize) -> Window {
        assert!(
            offset + len <= self.channel_len,
            "window {}..{} exceeds buffer of {} samples",
            offset,
            offset + len,
            self.channel_len
        );

        let mut samples = Vec::with_capacity(self.channels * len);
        for channel in self.channels() {
            samples.extend(channel[offset..offset + len].iter().map(|s| i64::from(*s)));
        }

        Window {
            samples,
            channels: self.channels,
            len,
            offset,
        }
    }
}

/// An independent, widened copy of part of a [`SampleBuffer`]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Window {
    // widened samples, stacked by channel
    samples: Vec<i64>,
    channels: usize,
    len: usize,
    offset: usize,
}

impl Window {
    /// Returns the window's length in PCM frames
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true if the window contains no PCM frames
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns the position of the window's first PCM frame in its buffer
    #[inline]
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Returns channel count
    #[inline]
    pub fn channel_count(&self) -> usize {
        self.channels
    }

    /// Returns a single channel
    ///
    /// # Panics
    ///
    /// Panics if the channel is out of range.
    #[inline]
    pub fn channel(&self, channel: usize) -> &[i64] {
        &self.samples[channel * self.len..(channel + 1) * self.len]
    }

    /// Iterates over all channels
    pub fn channels(&self) -> impl Iterator<Item = &[i64]> {
        (0..self.channels).map(|c| self.channel(c))
    }
}
