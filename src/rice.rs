// Copyright 2025 Brian Langenberger
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Partitioned Rice coding of prediction residuals

use arrayvec::ArrayVec;
use bitstream_io::BitWrite;

/// The largest partition order we'll search
pub const MAX_PARTITION_ORDER: u32 = 8;

const MAX_PARTITIONS: usize = 1 << MAX_PARTITION_ORDER;

// the largest parameter RICE2 can hold without escaping
const MAX_PARAMETER: usize = 30;

/// The residual coding method
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RiceMethod {
    /// 4-bit parameters, up to 14
    Rice,
    /// 5-bit parameters, up to 30
    Rice2,
}

impl RiceMethod {
    fn parameter_bits(self) -> u32 {
        match self {
            Self::Rice => 4,
            Self::Rice2 => 5,
        }
    }

    fn max_parameter(self) -> usize {
        match self {
            Self::Rice => 14,
            Self::Rice2 => MAX_PARAMETER,
        }
    }
}

/// The chosen Rice coding for a block of residuals
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RiceCoding {
    method: RiceMethod,
    partition_order: u32,
    parameters: ArrayVec<u8, MAX_PARTITIONS>,
}

impl RiceCoding {
    /// Finds the smallest coding of the given residuals
    ///
    /// `residuals` holds `block_size - predictor_order` values.
    /// Returns the coding along with its exact size in bits,
    /// including the method and partition order fields.
    pub fn best(
        residuals: &[i64],
        block_size: usize,
        predictor_order: usize,
        max_partition_order: u32,
    ) -> (Self, u64) {
        debug_assert_eq!(residuals.len() + predictor_order, block_size);

        let top_order = (0..=max_partition_order.min(MAX_PARTITION_ORDER))
            .rev()
            .find(|order| {
                *order == 0
                    || (block_size % (1 << order) == 0 && (block_size >> order) > predictor_order)
            })
            .unwrap_or(0);

        // per-partition residual counts and sums of (residual >> k) for each k
        let mut partitions: Vec<PartitionSums> =
            partition_lengths(block_size, predictor_order, top_order)
                .scan(residuals, |remaining, len| {
                    let (partition, rest) = remaining.split_at(len);
                    *remaining = rest;
                    Some(PartitionSums::new(partition))
                })
                .collect();

        let mut best: Option<(Self, u64)> = None;

        for order in (0..=top_order).rev() {
            for method in [RiceMethod::Rice, RiceMethod::Rice2] {
                let (parameters, bits) = partitions
                    .iter()
                    .map(|p| p.best_parameter(method.max_parameter()))
                    .fold(
                        (ArrayVec::new(), 0),
                        |(mut parameters, total), (parameter, bits)| {
                            parameters.push(parameter);
                            (parameters, total + bits)
                        },
                    );

                let bits = 2
                    + 4
                    + partitions.len() as u64 * u64::from(method.parameter_bits())
                    + bits;

                if best.as_ref().is_none_or(|(_, best_bits)| bits < *best_bits) {
                    best = Some((
                        Self {
                            method,
                            partition_order: order,
                            parameters,
                        },
                        bits,
                    ));
                }
            }

            if order > 0 {
                partitions = partitions
                    .chunks_exact(2)
                    .map(|pair| pair[0].merge(&pair[1]))
                    .collect();
            }
        }

        // at least one order is always tried
        best.unwrap_or_else(|| unreachable!())
    }

    /// Writes residuals using this coding
    pub fn write<W: BitWrite + ?Sized>(
        &self,
        w: &mut W,
        residuals: &[i64],
        block_size: usize,
        predictor_order: usize,
    ) -> std::io::Result<()> {
        w.write::<2, u8>(match self.method {
            RiceMethod::Rice => 0b00,
            RiceMethod::Rice2 => 0b01,
        })?;
        w.write::<4, u32>(self.partition_order)?;

        let mut residuals = residuals;
        for (len, parameter) in partition_lengths(block_size, predictor_order, self.partition_order)
            .zip(self.parameters.iter().copied())
        {
            let (partition, rest) = residuals.split_at(len);
            residuals = rest;

            w.write_var::<u8>(self.method.parameter_bits(), parameter)?;
            for residual in partition {
                let unsigned = zigzag(*residual);
                let quotient = u32::try_from(unsigned >> parameter).map_err(|_| {
                    std::io::Error::new(std::io::ErrorKind::InvalidData, "excessive residual")
                })?;
                w.write_unary::<1>(quotient)?;
                if parameter > 0 {
                    w.write_var::<u64>(u32::from(parameter), unsigned & ((1 << parameter) - 1))?;
                }
            }
        }

        Ok(())
    }
}

/// Maps signed residuals to unsigned: 0, -1, 1, -2, 2 ...
#[inline]
fn zigzag(residual: i64) -> u64 {
    ((residual << 1) ^ (residual >> 63)) as u64
}

/// Iterates over residual count of each partition
///
/// The first partition is shortened by the predictor's warm-up samples.
fn partition_lengths(
    block_size: usize,
    predictor_order: usize,
    partition_order: u32,
) -> impl Iterator<Item = usize> {
    let partition_len = block_size >> partition_order;
    (0..1usize << partition_order).map(move |i| match i {
        0 => partition_len - predictor_order,
        _ => partition_len,
    })
}

struct PartitionSums {
    len: u64,
    // sum of (residual >> k) for each parameter k
    sums: [u64; MAX_PARAMETER + 1],
}

impl PartitionSums {
    fn new(residuals: &[i64]) -> Self {
        let mut sums = [0; MAX_PARAMETER + 1];
        for unsigned in residuals.iter().copied().map(zigzag) {
            for (k, sum) in sums.iter_mut().enumerate() {
                *sum += unsigned >> k;
            }
        }
        Self {
            len: residuals.len() as u64,
            sums,
        }
    }

    fn merge(&self, other: &Self) -> Self {
        let mut sums = self.sums;
        sums.iter_mut()
            .zip(other.sums.iter())
            .for_each(|(s, o)| *s += o);
        Self {
            len: self.len + other.len,
            sums,
        }
    }

    /// Returns parameter with fewest bits, and those bits
    ///
    /// Each residual takes a unary quotient, its stop bit,
    /// and `k` remainder bits.
    fn best_parameter(&self, max_parameter: usize) -> (u8, u64) {
        (0..=max_parameter)
            .map(|k| (k as u8, self.sums[k] + self.len * (k as u64 + 1)))
            .min_by_key(|(_, bits)| *bits)
            .unwrap_or((0, 0))
    }
}
