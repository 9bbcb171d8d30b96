//! Partitioned-Rice residual decoding.
//!
//! Prediction residuals are entropy coded in 2^P partitions, each with its
//! own Rice parameter. A parameter at the field's maximum is an escape code
//! switching the partition to raw fixed-width samples.

use anyhow::{Result, bail};

use crate::structs::subframe::SubframeData;
use crate::utils::bitstream::BitReader;
use crate::utils::errors::{BitstreamError, SubframeError};

/// Residual coding method. Rice2 differs only in the width of the
/// per-partition parameter field: 5 bits instead of 4.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RiceCodingMethod {
    Rice,
    Rice2,
}

impl RiceCodingMethod {
    #[inline(always)]
    pub fn parameter_bits(self) -> u32 {
        match self {
            Self::Rice => 4,
            Self::Rice2 => 5,
        }
    }

    #[inline(always)]
    pub fn escape_code(self) -> u32 {
        (1 << self.parameter_bits()) - 1
    }
}

/// One subframe's decoded residual layout.
#[derive(Debug)]
pub struct PartitionedRice {
    pub method: RiceCodingMethod,
    pub partition_order: u32,
}

impl PartitionedRice {
    /// Decodes the residual section into `data.residual[order..block_size]`,
    /// recording per-partition Rice parameters in the reusable scratch vec.
    pub fn read(
        reader: &mut BitReader,
        block_size: usize,
        predictor_order: usize,
        data: &mut SubframeData,
    ) -> Result<Self> {
        let method = match reader.read_bits(2)? {
            0 => RiceCodingMethod::Rice,
            1 => RiceCodingMethod::Rice2,
            m => bail!(SubframeError::InvalidResidualMethod(m as u8)),
        };

        let partition_order = reader.read_bits(4)?;
        let partitions = 1usize << partition_order;
        let samples_per_partition = block_size >> partition_order;

        if partition_order > 0 {
            if block_size & (partitions - 1) != 0 || samples_per_partition < predictor_order {
                bail!(SubframeError::InvalidPartitionOrder(partition_order));
            }
        }

        data.rice_parameters.clear();

        let mut index = predictor_order;
        for p in 0..partitions {
            let count = if partition_order == 0 {
                block_size - predictor_order
            } else if p > 0 {
                samples_per_partition
            } else {
                samples_per_partition - predictor_order
            };

            let parameter = reader.read_bits(method.parameter_bits())?;
            data.rice_parameters.push(parameter);

            if parameter >= method.escape_code() {
                let raw_bits = reader.read_bits(5)?;
                for residual in &mut data.residual[index..index + count] {
                    *residual = reader.read_bits_signed(raw_bits)?;
                }
            } else {
                read_rice_block(reader, &mut data.residual[index..index + count], parameter)?;
            }

            index += count;
        }

        Ok(Self {
            method,
            partition_order,
        })
    }
}

fn read_rice_block(
    reader: &mut BitReader,
    dest: &mut [i32],
    parameter: u32,
) -> std::result::Result<(), BitstreamError> {
    if parameter == 0 {
        for sample in dest.iter_mut() {
            *sample = reader.read_unary_signed()?;
        }
    } else {
        for sample in dest.iter_mut() {
            let msbs = reader.read_unary()?;
            let lsbs = reader.read_bits(parameter)?;
            let uval = (((msbs as u64) << parameter) as u32) | lsbs;
            *sample = (uval >> 1) as i32 ^ -((uval & 1) as i32);
        }
    }

    Ok(())
}
