// Copyright 2025 Brian Langenberger
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! For dividing a stream into frames of varying sizes
//!
//! Segmentation happens in three passes:
//!
//! 1. [`CostGrid::build`] divides the stream into a grid of
//!    `base` sample cells and, for every cell and every multiplier,
//!    asks a [`SegmentEstimator`] how large a frame
//!    of `multiplier × base` samples starting there would be.
//! 2. [`Segmentation::solve`] walks the grid backwards,
//!    finding the cheapest way to encode every suffix of the stream.
//!    The cheapest suffix starting at cell 0 is the cheapest stream.
//! 3. [`Segmentation::emit`] walks forward along those choices,
//!    writing each frame and updating the stream's statistics.
//!
//! # Example
//!
//! ```
//! use flac_optimize::Counter;
//! use flac_optimize::audio::SampleBuffer;
//! use flac_optimize::frame::{FlacEstimator, SearchOptions};
//! use flac_optimize::metadata::Streaminfo;
//! use flac_optimize::segment::{CostGrid, Grid, Segmentation, StreamFormat};
//!
//! let samples = (0..5000).map(|i| (i % 100) * 10).collect::<Vec<i32>>();
//! let buffer = SampleBuffer::from_interleaved(&samples, 1, 16);
//! let format = StreamFormat::new(&buffer, 44100);
//!
//! let grid = CostGrid::build(
//!     &FlacEstimator::new(SearchOptions::FAST),
//!     &buffer,
//!     &format,
//!     &Grid::new(256, [2, 4, 8]).unwrap(),
//! ).unwrap();
//!
//! let segmentation = Segmentation::solve(grid);
//!
//! let mut streaminfo = Streaminfo::new(44100, 1, 16).unwrap();
//! let mut output = Counter::new(vec![]);
//! let frames = segmentation.emit(&buffer, &mut output, &mut streaminfo).unwrap();
//!
//! assert_eq!(frames.iter().map(|f| f.block_size).sum::<usize>(), 5000);
//! assert_eq!(segmentation.total_bits(), output.count * 8);
//! ```

use crate::audio::{SampleBuffer, Window};
use crate::metadata::Streaminfo;
use crate::{Counter, Error};
use log::{debug, info, trace};
use std::num::NonZero;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

/// The parameters of the stream being segmented
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct StreamFormat {
    /// Channel count
    pub channels: usize,
    /// Bits-per-sample
    pub bits_per_sample: u32,
    /// Sample rate, in Hz
    pub sample_rate: u32,
}

impl StreamFormat {
    /// Takes stream format from the given buffer
    pub fn new(buffer: &SampleBuffer, sample_rate: u32) -> Self {
        Self {
            channels: buffer.channel_count(),
            bits_per_sample: buffer.bits_per_sample(),
            sample_rate,
        }
    }
}

/// An encoder along with the size of what it would encode
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SizeEstimate<E> {
    /// The encoder which achieves the estimate
    pub encoder: E,
    /// Estimated size of the encoded frame, in bits
    pub bits: u64,
}

/// Something which can find the cheapest way to encode a window
///
/// Estimates must be deterministic: the same window and format
/// must always produce the same encoder and size,
/// since the chosen encoder is run again on an identical window
/// when the stream is written.
pub trait SegmentEstimator: Sync {
    /// The encoder this estimator produces
    type Encoder: SegmentEncoder + Send;

    /// Returns the best encoder for the given window and its size
    ///
    /// # Errors
    ///
    /// Returns an error if no encoder can handle the window
    /// in the given format.
    fn estimate(
        &self,
        window: &Window,
        format: &StreamFormat,
    ) -> Result<SizeEstimate<Self::Encoder>, Error>;
}

/// A chosen way to encode a single frame
pub trait SegmentEncoder {
    /// The number of samples this encoder was chosen for
    fn block_size(&self) -> usize;

    /// Writes the window as a frame and returns the bytes written
    ///
    /// # Errors
    ///
    /// Passes along any error from the writer.
    fn emit<W: std::io::Write>(&self, window: &Window, writer: W) -> Result<u64, Error>;
}

/// The grid that all frame boundaries must fall on
///
/// Each candidate block size is `base` times one of the multipliers.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Grid {
    base: usize,
    multipliers: Vec<usize>,
}

impl Grid {
    /// Largest block size a FLAC frame can hold
    const MAX_BLOCK_SIZE: usize = u16::MAX as usize;

    /// Builds grid from base size and block size multipliers
    ///
    /// # Errors
    ///
    /// Returns an error if the base size is 0,
    /// if the multipliers are empty or contain 0,
    /// or if any candidate block size exceeds 65535 samples.
    pub fn new(base: usize, multipliers: impl Into<Vec<usize>>) -> Result<Self, Error> {
        let multipliers = multipliers.into();

        if base == 0 {
            return Err(Error::InvalidBlockSize);
        } else if multipliers.is_empty() || multipliers.contains(&0) {
            return Err(Error::InvalidMultipliers);
        } else if multipliers
            .iter()
            .any(|m| m.checked_mul(base).is_none_or(|s| s > Self::MAX_BLOCK_SIZE))
        {
            return Err(Error::InvalidBlockSize);
        }

        Ok(Self { base, multipliers })
    }

    /// Returns the size of a single grid cell, in samples
    #[inline]
    pub fn base(&self) -> usize {
        self.base
    }

    /// Returns block size multipliers, in search order
    #[inline]
    pub fn multipliers(&self) -> &[usize] {
        &self.multipliers
    }

    /// Returns number of grid positions for a stream of the given length
    #[inline]
    pub fn positions(&self, pcm_frames: usize) -> usize {
        pcm_frames.div_ceil(self.base)
    }
}

impl Default for Grid {
    fn default() -> Self {
        Self {
            base: 1024,
            multipliers: vec![3, 4, 5, 6],
        }
    }
}

/// Size estimates for every grid position and block size multiplier
#[derive(Debug)]
pub struct CostGrid<E> {
    grid: Grid,
    pcm_frames: usize,
    // indexed by grid position, then by multiplier
    cells: Vec<Vec<SizeEstimate<E>>>,
}

impl<E: SegmentEncoder + Send> CostGrid<E> {
    /// Estimates every candidate frame in the buffer
    ///
    /// The frame at each grid position for each multiplier
    /// is clamped to the end of the buffer.
    /// When built with the `rayon` feature,
    /// cells are estimated in parallel.
    ///
    /// # Errors
    ///
    /// Returns the first error from the estimator, if any,
    /// in which case the grid is discarded.
    pub fn build<S>(
        estimator: &S,
        buffer: &SampleBuffer,
        format: &StreamFormat,
        grid: &Grid,
    ) -> Result<Self, Error>
    where
        S: SegmentEstimator<Encoder = E>,
    {
        let pcm_frames = buffer.pcm_frames();
        let positions = grid.positions(pcm_frames);
        let multipliers = grid.multipliers.len();
        let progress = Progress::new(positions * multipliers);

        let cell = |index: usize| -> Result<SizeEstimate<E>, Error> {
            let (position, multiplier) = (index / multipliers, index % multipliers);
            let offset = position * grid.base;
            let len = (grid.multipliers[multiplier] * grid.base).min(pcm_frames - offset);
            let estimate = estimator.estimate(&buffer.window(offset, len), format)?;
            trace!("cell offset={offset} len={len} bits={}", estimate.bits);
            progress.tick();
            Ok(estimate)
        };

        #[cfg(feature = "rayon")]
        let cells: Vec<SizeEstimate<E>> = {
            use rayon::prelude::*;

            (0..positions * multipliers)
                .into_par_iter()
                .map(cell)
                .collect::<Result<_, Error>>()?
        };

        #[cfg(not(feature = "rayon"))]
        let cells: Vec<SizeEstimate<E>> = (0..positions * multipliers)
            .map(cell)
            .collect::<Result<_, Error>>()?;

        progress.finish();

        let mut cells = cells.into_iter();

        Ok(Self {
            grid: grid.clone(),
            pcm_frames,
            cells: (0..positions)
                .map(|_| cells.by_ref().take(multipliers).collect())
                .collect(),
        })
    }
}

impl<E> CostGrid<E> {
    /// Returns the estimate for a frame at the given position and multiplier
    ///
    /// Returns `None` if either is out of range.
    pub fn cell(&self, position: usize, multiplier: usize) -> Option<&SizeEstimate<E>> {
        self.cells.get(position)?.get(multiplier)
    }

    /// Returns number of grid positions
    pub fn positions(&self) -> usize {
        self.cells.len()
    }
}

/// The chosen frame at a grid position
#[derive(Debug)]
pub struct Choice<E> {
    /// Index of the chosen block size multiplier
    pub multiplier: usize,
    /// The encoder for a frame starting at this position
    pub encoder: E,
    /// The frame's estimated size, in bits
    pub bits: u64,
}

/// A written frame
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct FrameRecord {
    /// Number of the frame's first sample
    pub offset: usize,
    /// Frame's size in samples
    pub block_size: usize,
    /// Frame's size in bytes
    pub frame_size: u64,
    /// Frame's estimated size in bits
    pub estimated_bits: u64,
}

/// The cheapest way to divide a stream into frames
#[derive(Debug)]
pub struct Segmentation<E> {
    base: usize,
    pcm_frames: usize,
    // cheapest size of the stream from each position to the end
    best_cost: Vec<u64>,
    // the first frame of that cheapest suffix
    choices: Vec<Choice<E>>,
}

impl<E> Segmentation<E> {
    /// Finds the cheapest sequence of frames in the grid
    ///
    /// Since frames only move forward, grid positions
    /// are already in topological order and a single backwards
    /// pass suffices.
    /// Ties go to the earliest multiplier.
    pub fn solve(grid: CostGrid<E>) -> Self {
        let CostGrid {
            grid: Grid { base, multipliers },
            pcm_frames,
            cells,
        } = grid;

        let positions = cells.len();
        let mut best_cost = vec![0; positions + 1];
        let mut choices = Vec::with_capacity(positions);

        for (position, mut candidates) in cells.into_iter().enumerate().rev() {
            let mut best: Option<(usize, u64)> = None;

            for (index, (estimate, multiplier)) in
                candidates.iter().zip(multipliers.iter()).enumerate()
            {
                let cost = estimate
                    .bits
                    .saturating_add(best_cost[(position + multiplier).min(positions)]);

                if best.is_none_or(|(_, best)| cost < best) {
                    best = Some((index, cost));
                }
            }

            // grids always have at least one multiplier
            let (index, cost) = best.unwrap_or((0, 0));
            best_cost[position] = cost;

            let SizeEstimate { encoder, bits } = candidates.swap_remove(index);
            choices.push(Choice {
                multiplier: index,
                encoder,
                bits,
            });
        }

        choices.reverse();

        Self {
            base,
            pcm_frames,
            best_cost,
            choices,
        }
    }

    /// Returns estimated size of the whole stream, in bits
    pub fn total_bits(&self) -> u64 {
        self.best_cost[0]
    }

    /// Returns cheapest estimated size from each grid position to the end
    ///
    /// The final entry, for the end of the stream, is always 0.
    pub fn best_costs(&self) -> &[u64] {
        &self.best_cost
    }

    /// Returns the chosen frame at each grid position
    pub fn choices(&self) -> &[Choice<E>] {
        &self.choices
    }
}

impl<E: SegmentEncoder> Segmentation<E> {
    /// Returns the frame starting at the given sample, and its length
    fn frame_at(&self, offset: usize) -> Result<(&Choice<E>, usize), Error> {
        let choice = self
            .choices
            .get(offset / self.base)
            .ok_or(Error::InvalidBlockSize)?;

        match choice.encoder.block_size().min(self.pcm_frames - offset) {
            0 => Err(Error::InvalidBlockSize),
            len => Ok((choice, len)),
        }
    }

    /// Returns the block size of each frame to be written, in order
    ///
    /// # Errors
    ///
    /// Returns an error if a chosen encoder has a block size of 0.
    pub fn block_sizes(&self) -> Result<Vec<usize>, Error> {
        let mut sizes = Vec::new();
        let mut offset = 0;
        while offset < self.pcm_frames {
            let (_, len) = self.frame_at(offset)?;
            sizes.push(len);
            offset += len;
        }
        Ok(sizes)
    }

    /// Writes each chosen frame to the output in stream order
    ///
    /// Updates the STREAMINFO's minimum and maximum
    /// block and frame sizes as frames are written.
    ///
    /// # Errors
    ///
    /// Stops at the first error from the output,
    /// in which case any frames already written remain.
    /// Returns an error if a frame's reported size doesn't match
    /// the bytes the output received, or if the frame is too large
    /// for STREAMINFO.
    pub fn emit<W: std::io::Write>(
        &self,
        buffer: &SampleBuffer,
        output: &mut Counter<W>,
        streaminfo: &mut Streaminfo,
    ) -> Result<Vec<FrameRecord>, Error> {
        use std::io::Write;

        let mut records = Vec::new();
        let mut offset = 0;

        while offset < self.pcm_frames {
            let (choice, block_size) = self.frame_at(offset)?;

            let start = output.count;
            let reported = choice
                .encoder
                .emit(&buffer.window(offset, block_size), output.by_ref())?;
            let frame_size = output.count - start;

            if reported != frame_size {
                return Err(Error::FrameSizeMismatch);
            }

            streaminfo.observe_block_size(
                u16::try_from(block_size)
                    .ok()
                    .and_then(NonZero::new)
                    .ok_or(Error::InvalidBlockSize)?,
            );
            streaminfo.observe_frame_size(frame_size)?;

            debug!(
                "frame offset={offset} block size={block_size} bytes={frame_size} estimated bits={}",
                choice.bits
            );

            records.push(FrameRecord {
                offset,
                block_size,
                frame_size,
                estimated_bits: choice.bits,
            });

            offset += block_size;
        }

        Ok(records)
    }
}

/// Best-effort progress of grid building, reported to the log
struct Progress {
    done: AtomicUsize,
    total: usize,
    start: Instant,
}

impl Progress {
    fn new(total: usize) -> Self {
        Self {
            done: AtomicUsize::new(0),
            total,
            start: Instant::now(),
        }
    }

    fn tick(&self) {
        let done = self.done.fetch_add(1, Ordering::Relaxed) + 1;

        // roughly once per percent
        if (done * 100) / self.total != ((done - 1) * 100) / self.total {
            let progress = done as f64 / self.total as f64;
            let elapsed = self.start.elapsed().as_secs_f64();
            info!(
                "progress={:.2}% time remaining={}s",
                progress * 100.0,
                (elapsed / progress * (1.0 - progress)).round()
            );
        }
    }

    fn finish(&self) {
        info!(
            "estimated {} frames in {:.2}s",
            self.done.load(Ordering::Relaxed),
            self.start.elapsed().as_secs_f64()
        );
    }
}

#[cfg(test)]
mod test {
    use super::{CostGrid, Grid, Segmentation, SegmentEncoder, SegmentEstimator, SizeEstimate, StreamFormat};
    use crate::audio::{SampleBuffer, Window};
    use crate::metadata::Streaminfo;
    use crate::{Counter, Error};
    use std::collections::HashMap;
    use std::num::NonZero;

    /// Writes a fixed number of bytes for any window
    /// and reports a possibly different number
    #[derive(Debug)]
    struct FixedEncoder {
        block_size: usize,
        bytes: u64,
        reported: u64,
    }

    impl SegmentEncoder for FixedEncoder {
        fn block_size(&self) -> usize {
            self.block_size
        }

        fn emit<W: std::io::Write>(&self, window: &Window, mut writer: W) -> Result<u64, Error> {
            assert_eq!(window.len(), self.block_size);
            writer.write_all(&vec![0; self.bytes as usize])?;
            Ok(self.reported)
        }
    }

    /// Estimates whole bytes from a table keyed by window offset and length
    struct TableEstimator {
        bytes: HashMap<(usize, usize), u64>,
    }

    impl TableEstimator {
        // assigns random sizes to every possible window
        fn random(grid: &Grid, pcm_frames: usize) -> Self {
            let mut bytes = HashMap::new();
            for position in 0..grid.positions(pcm_frames) {
                let offset = position * grid.base();
                for m in grid.multipliers() {
                    bytes
                        .entry((offset, (m * grid.base()).min(pcm_frames - offset)))
                        .or_insert_with(|| fastrand::u64(1..100));
                }
            }
            Self { bytes }
        }

        // the cost of the frame at a grid position for a multiplier
        fn cost(&self, grid: &Grid, pcm_frames: usize, position: usize, multiplier: usize) -> u64 {
            let offset = position * grid.base();
            self.bytes[&(offset, (multiplier * grid.base()).min(pcm_frames - offset))] * 8
        }
    }

    impl SegmentEstimator for TableEstimator {
        type Encoder = FixedEncoder;

        fn estimate(
            &self,
            window: &Window,
            _format: &StreamFormat,
        ) -> Result<SizeEstimate<FixedEncoder>, Error> {
            let bytes = *self
                .bytes
                .get(&(window.offset(), window.len()))
                .ok_or(Error::InvalidBlockSize)?;

            Ok(SizeEstimate {
                encoder: FixedEncoder {
                    block_size: window.len(),
                    bytes,
                    reported: bytes,
                },
                bits: bytes * 8,
            })
        }
    }

    /// Estimates every window the same, whatever its encoder writes
    struct UniformEstimator {
        bytes: u64,
        reported: u64,
    }

    impl SegmentEstimator for UniformEstimator {
        type Encoder = FixedEncoder;

        fn estimate(
            &self,
            window: &Window,
            _format: &StreamFormat,
        ) -> Result<SizeEstimate<FixedEncoder>, Error> {
            Ok(SizeEstimate {
                encoder: FixedEncoder {
                    block_size: window.len(),
                    bytes: self.bytes,
                    reported: self.reported,
                },
                bits: self.reported * 8,
            })
        }
    }

    fn silence(pcm_frames: usize) -> SampleBuffer {
        SampleBuffer::from_channels(&[vec![0; pcm_frames]], 16)
    }

    fn solve(
        estimator: &TableEstimator,
        buffer: &SampleBuffer,
        grid: &Grid,
    ) -> Segmentation<FixedEncoder> {
        Segmentation::solve(
            CostGrid::build(estimator, buffer, &StreamFormat::new(buffer, 44100), grid).unwrap(),
        )
    }

    // every total of every possible sequence of frames
    fn all_totals(
        estimator: &TableEstimator,
        grid: &Grid,
        pcm_frames: usize,
        position: usize,
        so_far: u64,
        totals: &mut Vec<u64>,
    ) {
        let positions = grid.positions(pcm_frames);
        if position >= positions {
            totals.push(so_far);
        } else {
            for m in grid.multipliers() {
                all_totals(
                    estimator,
                    grid,
                    pcm_frames,
                    position + m,
                    so_far + estimator.cost(grid, pcm_frames, position, *m),
                    totals,
                );
            }
        }
    }

    #[test]
    fn test_grid_validation() {
        assert!(Grid::new(1024, [3, 4, 5, 6]).is_ok());
        assert!(matches!(Grid::new(0, [1]), Err(Error::InvalidBlockSize)));
        assert!(matches!(
            Grid::new(1024, Vec::<usize>::new()),
            Err(Error::InvalidMultipliers)
        ));
        assert!(matches!(
            Grid::new(1024, [1, 0]),
            Err(Error::InvalidMultipliers)
        ));
        assert!(matches!(
            Grid::new(16384, [4]),
            Err(Error::InvalidBlockSize)
        ));
        assert!(Grid::new(16383, [4]).is_ok());
        assert_eq!(Grid::default(), Grid::new(1024, [3, 4, 5, 6]).unwrap());
        assert_eq!(Grid::default().positions(4097), 5);
    }

    #[test]
    fn test_beats_greedy() {
        // positions at 0, 4 and 8
        let grid = Grid::new(4, [2, 3]).unwrap();
        let buffer = silence(10);

        let estimator = TableEstimator {
            bytes: HashMap::from([
                ((0, 8), 10), // cheapest first frame
                ((0, 10), 30),
                ((4, 6), 20),
                ((8, 2), 100), // but leaves an expensive remainder
            ]),
        };

        let segmentation = solve(&estimator, &buffer, &grid);
        assert_eq!(segmentation.total_bits(), 30 * 8);
        assert_eq!(segmentation.choices()[0].multiplier, 1);
        assert_eq!(segmentation.block_sizes().unwrap(), vec![10]);
        assert_eq!(
            segmentation.best_costs(),
            &[30 * 8, 20 * 8, 100 * 8, 0]
        );
    }

    #[test]
    fn test_brute_force() {
        for _ in 0..200 {
            let base = fastrand::usize(1..8);
            let multipliers = (0..fastrand::usize(1..=3))
                .map(|_| fastrand::usize(1..4))
                .collect::<Vec<_>>();
            let grid = Grid::new(base, multipliers).unwrap();
            let pcm_frames = fastrand::usize(1..=base * 6);
            let buffer = silence(pcm_frames);
            let estimator = TableEstimator::random(&grid, pcm_frames);

            let mut totals = Vec::new();
            all_totals(&estimator, &grid, pcm_frames, 0, 0, &mut totals);

            let segmentation = solve(&estimator, &buffer, &grid);
            assert_eq!(
                Some(segmentation.total_bits()),
                totals.iter().copied().min()
            );
        }
    }

    #[test]
    fn test_ties() {
        // equal costs favor the first multiplier
        let grid = Grid::new(4, [2, 1]).unwrap();
        let buffer = silence(8);
        let estimator = TableEstimator {
            bytes: HashMap::from([((0, 8), 2), ((0, 4), 1), ((4, 4), 1)]),
        };

        let segmentation = solve(&estimator, &buffer, &grid);
        assert_eq!(segmentation.total_bits(), 16);
        assert_eq!(segmentation.block_sizes().unwrap(), vec![8]);

        let grid = Grid::new(4, [1, 2]).unwrap();
        let segmentation = solve(&estimator, &buffer, &grid);
        assert_eq!(segmentation.block_sizes().unwrap(), vec![4, 4]);
    }

    #[test]
    fn test_tiling() {
        for _ in 0..100 {
            let grid = Grid::new(16, [1, 3, 4]).unwrap();
            let pcm_frames = fastrand::usize(1..1000);
            let buffer = silence(pcm_frames);
            let estimator = TableEstimator::random(&grid, pcm_frames);
            let segmentation = solve(&estimator, &buffer, &grid);

            let mut streaminfo = Streaminfo::new(44100, 1, 16).unwrap();
            let mut output = Counter::new(Vec::new());
            let frames = segmentation
                .emit(&buffer, &mut output, &mut streaminfo)
                .unwrap();

            // frames are contiguous and cover the whole buffer
            let mut offset = 0;
            for frame in &frames {
                assert_eq!(frame.offset, offset);
                assert_eq!(frame.offset % grid.base(), 0);
                offset += frame.block_size;
            }
            assert_eq!(offset, pcm_frames);

            // only the final frame may be short
            for frame in &frames[0..frames.len() - 1] {
                assert!(grid.multipliers().contains(&(frame.block_size / grid.base())));
                assert_eq!(frame.block_size % grid.base(), 0);
            }

            assert_eq!(
                frames.iter().map(|f| f.block_size).collect::<Vec<_>>(),
                segmentation.block_sizes().unwrap()
            );
            assert_eq!(output.count * 8, segmentation.total_bits());
            assert_eq!(output.stream.len() as u64, output.count);
        }
    }

    #[test]
    fn test_truncated_final_frame() {
        let grid = Grid::new(16, [4]).unwrap();
        let buffer = silence(16 * 4 * 2 + 5);
        let estimator = TableEstimator::random(&grid, buffer.pcm_frames());
        let segmentation = solve(&estimator, &buffer, &grid);

        let mut streaminfo = Streaminfo::new(44100, 1, 16).unwrap();
        let frames = segmentation
            .emit(&buffer, &mut Counter::new(std::io::sink()), &mut streaminfo)
            .unwrap();

        assert_eq!(
            frames.iter().map(|f| f.block_size).collect::<Vec<_>>(),
            vec![64, 64, 5]
        );
    }

    #[test]
    fn test_deterministic() {
        let grid = Grid::new(8, [2, 3, 5]).unwrap();
        let buffer = silence(500);
        let estimator = TableEstimator::random(&grid, buffer.pcm_frames());

        let first = solve(&estimator, &buffer, &grid);
        let second = solve(&estimator, &buffer, &grid);

        assert_eq!(first.total_bits(), second.total_bits());
        assert_eq!(
            first.choices().iter().map(|c| c.multiplier).collect::<Vec<_>>(),
            second.choices().iter().map(|c| c.multiplier).collect::<Vec<_>>()
        );
        assert_eq!(first.block_sizes().unwrap(), second.block_sizes().unwrap());
    }

    #[test]
    fn test_statistics() {
        let grid = Grid::new(32, [1, 2, 4]).unwrap();
        let buffer = silence(1000);
        let estimator = TableEstimator::random(&grid, buffer.pcm_frames());
        let segmentation = solve(&estimator, &buffer, &grid);

        let mut streaminfo = Streaminfo::new(44100, 1, 16).unwrap();
        let frames = segmentation
            .emit(&buffer, &mut Counter::new(std::io::sink()), &mut streaminfo)
            .unwrap();

        let block_sizes = frames.iter().map(|f| f.block_size as u16);
        assert_eq!(
            streaminfo.minimum_block_size,
            block_sizes.clone().min().map(|s| s.max(16)).and_then(NonZero::new)
        );
        assert_eq!(
            streaminfo.maximum_block_size,
            block_sizes.max().and_then(NonZero::new)
        );

        let frame_sizes = frames.iter().map(|f| f.frame_size as u32);
        assert_eq!(
            streaminfo.minimum_frame_size,
            frame_sizes.clone().min().and_then(NonZero::new)
        );
        assert_eq!(
            streaminfo.maximum_frame_size,
            frame_sizes.max().and_then(NonZero::new)
        );
    }

    #[test]
    fn test_estimator_failure() {
        let grid = Grid::new(16, [1, 2]).unwrap();
        let buffer = silence(100);
        let mut estimator = TableEstimator::random(&grid, buffer.pcm_frames());
        estimator.bytes.remove(&(48, 16));

        assert!(matches!(
            CostGrid::build(
                &estimator,
                &buffer,
                &StreamFormat::new(&buffer, 44100),
                &grid
            ),
            Err(Error::InvalidBlockSize)
        ));
    }

    #[test]
    fn test_output_failure() {
        /// Accepts a limited number of bytes, then fails
        struct Limited(usize);

        impl std::io::Write for Limited {
            fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
                match self.0.checked_sub(buf.len()) {
                    Some(remaining) => {
                        self.0 = remaining;
                        Ok(buf.len())
                    }
                    None => Err(std::io::Error::other("output full")),
                }
            }

            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }

        let grid = Grid::new(16, [1]).unwrap();
        let buffer = silence(160);
        let estimator = TableEstimator {
            bytes: (0..10).map(|i| ((i * 16, 16), 10)).collect(),
        };
        let segmentation = solve(&estimator, &buffer, &grid);

        let mut streaminfo = Streaminfo::new(44100, 1, 16).unwrap();
        let mut output = Counter::new(Limited(35));
        assert!(matches!(
            segmentation.emit(&buffer, &mut output, &mut streaminfo),
            Err(Error::Io(_))
        ));
        // the first three frames remain written
        assert_eq!(output.count, 30);
        assert_eq!(streaminfo.maximum_frame_size, NonZero::new(10));
    }

    #[test]
    fn test_frame_size_mismatch() {
        let grid = Grid::new(16, [1]).unwrap();
        let buffer = silence(48);
        let estimator = UniformEstimator {
            bytes: 10,
            reported: 11,
        };
        let segmentation = Segmentation::solve(
            CostGrid::build(&estimator, &buffer, &StreamFormat::new(&buffer, 44100), &grid)
                .unwrap(),
        );
        assert_eq!(segmentation.total_bits(), 3 * 88);

        let mut streaminfo = Streaminfo::new(44100, 1, 16).unwrap();
        let mut output = Counter::new(Vec::new());
        assert!(matches!(
            segmentation.emit(&buffer, &mut output, &mut streaminfo),
            Err(Error::FrameSizeMismatch)
        ));
        // nothing past the first frame is written
        assert_eq!(output.count, 10);
        assert_eq!(streaminfo.minimum_block_size, None);
        assert_eq!(streaminfo.minimum_frame_size, None);
        assert_eq!(streaminfo.maximum_frame_size, None);
    }

    #[test]
    fn test_excessive_frame_size() {
        let grid = Grid::new(16, [1]).unwrap();
        let buffer = silence(48);

        for bytes in [0, 1 << 24] {
            let estimator = UniformEstimator {
                bytes,
                reported: bytes,
            };
            let segmentation = Segmentation::solve(
                CostGrid::build(&estimator, &buffer, &StreamFormat::new(&buffer, 44100), &grid)
                    .unwrap(),
            );

            let mut streaminfo = Streaminfo::new(44100, 1, 16).unwrap();
            let mut output = Counter::new(std::io::sink());
            assert!(matches!(
                segmentation.emit(&buffer, &mut output, &mut streaminfo),
                Err(Error::ExcessiveFrameSize)
            ));
            // the walk stops at the first frame
            assert_eq!(output.count, bytes);
            assert_eq!(streaminfo.minimum_frame_size, None);
            assert_eq!(streaminfo.maximum_frame_size, None);
        }
    }

    #[test]
    fn test_empty_buffer() {
        let grid = Grid::default();
        let buffer = silence(0);
        let segmentation = solve(&TableEstimator::random(&grid, 0), &buffer, &grid);
        assert_eq!(segmentation.total_bits(), 0);
        assert!(segmentation.choices().is_empty());
        assert!(segmentation.block_sizes().unwrap().is_empty());
    }
}
