// Copyright 2025 Brian Langenberger
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! For summarizing the frames of an encoded stream
//!
//! Each summary is a [`Histogram`] which displays
//! as a bar graph normalized to its largest value.
//!
//! ```
//! use flac_optimize::segment::FrameRecord;
//! use flac_optimize::stats::block_sizes;
//!
//! let frames = [3072, 4096, 4096].map(|block_size| FrameRecord {
//!     offset: 0,
//!     block_size,
//!     frame_size: 1000,
//!     estimated_bits: 8000,
//! });
//!
//! assert_eq!(
//!     block_sizes(&frames).to_string(),
//!     concat!(
//!         "==================== Block sizes (samples) ====================\n",
//!         "\n",
//!         " 3072: ************************************************** (1)\n",
//!         " 4096: **************************************************",
//!         "************************************************** (2)\n",
//!     ),
//! );
//! ```

use crate::segment::FrameRecord;
use std::collections::BTreeMap;

const MAX_BAR_WIDTH: f64 = 100.0;

const FRAME_SIZE_STEP: u64 = 1000;

/// Labeled values displayed as a bar graph
#[derive(Clone, Debug, PartialEq)]
pub struct Histogram {
    heading: &'static str,
    rows: Vec<(String, f64)>,
}

impl Histogram {
    /// Returns graph's heading
    pub fn heading(&self) -> &str {
        self.heading
    }

    /// Returns labels and values, in display order
    pub fn rows(&self) -> &[(String, f64)] {
        &self.rows
    }
}

impl std::fmt::Display for Histogram {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "==================== {} ====================", self.heading)?;
        writeln!(f)?;

        let label_width = self.rows.iter().map(|(l, _)| l.len()).max().unwrap_or(0);
        // at least 1 to avoid dividing by zero
        let max_value = self.rows.iter().map(|(_, v)| *v).fold(1.0, f64::max);

        for (label, value) in &self.rows {
            let bar = (value / max_value * MAX_BAR_WIDTH).round() as usize;
            write!(f, "{label:<label_width$}: {} ", "*".repeat(bar))?;
            if value.fract() == 0.0 {
                writeln!(f, "({value:.0})")?;
            } else {
                writeln!(f, "({value})")?;
            }
        }

        Ok(())
    }
}

/// Counts frames of each block size
pub fn block_sizes(frames: &[FrameRecord]) -> Histogram {
    let mut counts = BTreeMap::new();
    for frame in frames {
        *counts.entry(frame.block_size).or_insert(0usize) += 1;
    }

    Histogram {
        heading: "Block sizes (samples)",
        rows: counts
            .into_iter()
            .map(|(size, count)| (format!("{size:5}"), count as f64))
            .collect(),
    }
}

/// Counts frames of each size, to the nearest 1000 bytes
///
/// Sizes between the smallest and largest with no frames are included.
pub fn frame_sizes(frames: &[FrameRecord]) -> Histogram {
    let mut counts = BTreeMap::new();
    for frame in frames {
        let bucket = (frame.frame_size + FRAME_SIZE_STEP / 2) / FRAME_SIZE_STEP;
        *counts.entry(bucket).or_insert(0usize) += 1;
    }

    if let (Some(first), Some(last)) = (
        counts.first_key_value().map(|(k, _)| *k),
        counts.last_key_value().map(|(k, _)| *k),
    ) {
        for bucket in first..last {
            counts.entry(bucket).or_insert(0);
        }
    }

    let width = counts
        .last_key_value()
        .map(|(k, _)| (k * FRAME_SIZE_STEP).to_string().len())
        .unwrap_or(0);

    Histogram {
        heading: "Frame sizes (bytes)",
        rows: counts
            .into_iter()
            .map(|(bucket, count)| {
                (
                    format!("{:width$}", bucket * FRAME_SIZE_STEP),
                    count as f64,
                )
            })
            .collect(),
    }
}

/// Average ratio of encoded to unencoded size for each block size
///
/// Smaller ratios indicate better compression.
pub fn compression_ratios(
    frames: &[FrameRecord],
    channels: usize,
    bits_per_sample: u32,
) -> Histogram {
    // block size -> (frame count, total bytes)
    let mut totals: BTreeMap<usize, (u64, u64)> = BTreeMap::new();
    for frame in frames {
        let (count, bytes) = totals.entry(frame.block_size).or_default();
        *count += 1;
        *bytes += frame.frame_size;
    }

    Histogram {
        heading: "Average compression ratio at block sizes",
        rows: totals
            .into_iter()
            .map(|(size, (count, bytes))| {
                let unencoded =
                    count as f64 * size as f64 * channels as f64 * f64::from(bits_per_sample) / 8.0;
                (format!("{size:5}"), bytes as f64 / unencoded)
            })
            .collect(),
    }
}
