// Copyright 2025 Brian Langenberger
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! For choosing and writing a single channel's subframe

use crate::rice::RiceCoding;
use crate::stream::{SubframeHeader, SubframeHeaderType};
use bitstream_io::BitWrite;

/// The highest fixed predictor order FLAC defines
pub const MAX_FIXED_ORDER: u8 = 4;

/// How one channel of a frame will be encoded
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SubframeEncoder {
    wasted_bps: u32,
    kind: SubframeKind,
}

#[derive(Clone, Debug, Eq, PartialEq)]
enum SubframeKind {
    Constant,
    Verbatim,
    Fixed { order: u8, coding: RiceCoding },
}

impl SubframeEncoder {
    /// Finds the smallest encoding of the given channel
    ///
    /// Returns the encoder along with its exact size in bits.
    pub fn best(
        samples: &[i64],
        bits_per_sample: u32,
        max_fixed_order: u8,
        max_partition_order: u32,
    ) -> (Self, u64) {
        let n = samples.len() as u64;

        if let Some((first, rest)) = samples.split_first() {
            if rest.iter().all(|s| s == first) {
                return (
                    Self {
                        wasted_bps: 0,
                        kind: SubframeKind::Constant,
                    },
                    8 + u64::from(bits_per_sample),
                );
            }
        }

        let wasted_bps = wasted_bps(samples).min(bits_per_sample - 1);
        let effective_bps = u64::from(bits_per_sample - wasted_bps);
        let header_bits = 8 + u64::from(wasted_bps);
        let shifted = samples
            .iter()
            .map(|s| s >> wasted_bps)
            .collect::<Vec<i64>>();

        let mut best = (
            Self {
                wasted_bps,
                kind: SubframeKind::Verbatim,
            },
            header_bits + n * effective_bps,
        );

        for order in 0..=max_fixed_order.min(MAX_FIXED_ORDER) {
            let Some(residuals) = fixed_residuals(&shifted, order) else {
                continue;
            };

            let (coding, residual_bits) = RiceCoding::best(
                &residuals,
                shifted.len(),
                usize::from(order),
                max_partition_order,
            );

            let bits = header_bits + u64::from(order) * effective_bps + residual_bits;
            if bits < best.1 {
                best = (
                    Self {
                        wasted_bps,
                        kind: SubframeKind::Fixed { order, coding },
                    },
                    bits,
                );
            }
        }

        best
    }

    /// Writes subframe for the given channel
    ///
    /// The channel and bits-per-sample must be the same
    /// as those the encoder was chosen for.
    pub fn write<W: BitWrite + ?Sized>(
        &self,
        w: &mut W,
        samples: &[i64],
        bits_per_sample: u32,
    ) -> std::io::Result<()> {
        let effective_bps = bits_per_sample - self.wasted_bps;

        match &self.kind {
            SubframeKind::Constant => {
                w.build(&SubframeHeader {
                    type_: SubframeHeaderType::Constant,
                    wasted_bps: 0,
                })?;
                w.write_signed_var::<i64>(bits_per_sample, samples.first().copied().unwrap_or(0))
            }
            SubframeKind::Verbatim => {
                w.build(&SubframeHeader {
                    type_: SubframeHeaderType::Verbatim,
                    wasted_bps: self.wasted_bps,
                })?;
                samples
                    .iter()
                    .try_for_each(|s| w.write_signed_var::<i64>(effective_bps, s >> self.wasted_bps))
            }
            SubframeKind::Fixed { order, coding } => {
                w.build(&SubframeHeader {
                    type_: SubframeHeaderType::Fixed(*order),
                    wasted_bps: self.wasted_bps,
                })?;

                let shifted = samples
                    .iter()
                    .map(|s| s >> self.wasted_bps)
                    .collect::<Vec<i64>>();

                shifted[0..usize::from(*order)]
                    .iter()
                    .try_for_each(|s| w.write_signed_var::<i64>(effective_bps, *s))?;

                let residuals = fixed_residuals(&shifted, *order).ok_or_else(|| {
                    std::io::Error::new(std::io::ErrorKind::InvalidData, "invalid residuals")
                })?;

                coding.write(w, &residuals, shifted.len(), usize::from(*order))
            }
        }
    }
}

/// Returns number of low bits which are zero in every sample
fn wasted_bps(samples: &[i64]) -> u32 {
    match samples.iter().fold(0, |acc, s| acc | s) {
        0 => 0,
        combined => combined.trailing_zeros(),
    }
}

/// Calculates residuals of a fixed predictor
///
/// Returns `None` if the block is shorter than the predictor's order
/// or if any residual won't fit in 32 bits, as decoders require.
fn fixed_residuals(samples: &[i64], order: u8) -> Option<Vec<i64>> {
    let order = usize::from(order);
    if samples.len() < order {
        return None;
    }

    let residuals = samples
        .windows(order + 1)
        .map(|w| match order {
            0 => w[0],
            1 => w[1] - w[0],
            2 => w[2] - 2 * w[1] + w[0],
            3 => w[3] - 3 * w[2] + 3 * w[1] - w[0],
            4 => w[4] - 4 * w[3] + 6 * w[2] - 4 * w[1] + w[0],
            _ => unreachable!(), // orders are capped at 4
        })
        .collect::<Vec<i64>>();

    residuals
        .iter()
        .all(|r| i32::try_from(*r).is_ok())
        .then_some(residuals)
}
