//! Subframe decoding.
//!
//! Each channel of a frame is one subframe: Constant, Verbatim, Fixed
//! (built-in predictors of order 0 to 4) or LPC (quantized coefficients,
//! order 1 to 32). Fixed and LPC subframes store `order` verbatim warmup
//! samples followed by a partitioned-Rice residual, then restore the signal
//! by running the predictor forward.

use anyhow::{Result, bail};

use crate::structs::residual::PartitionedRice;
use crate::utils::bitstream::BitReader;
use crate::utils::errors::SubframeError;

/// Largest LPC predictor order.
pub const MAX_LPC_ORDER: usize = 32;

const QLP_PRECISION_BITS: u32 = 4;
const QLP_SHIFT_BITS: u32 = 5;

/// Per-channel scratch for one subframe decode: destination and residual
/// slices into the frame decoder's reusable buffers, plus the per-partition
/// Rice parameter scratch.
#[derive(Debug)]
pub struct SubframeData<'a> {
    pub dest: &'a mut [i32],
    pub residual: &'a mut [i32],
    pub rice_parameters: &'a mut Vec<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubframeType {
    Constant,
    Verbatim,
    Fixed { order: usize },
    Lpc { order: usize },
}

#[derive(Debug)]
pub struct Subframe {
    pub subframe_type: SubframeType,
    pub wasted_bits: u32,
}

impl Subframe {
    /// Decodes one subframe into `data.dest[..block_size]`.
    ///
    /// `bits_per_sample` is the channel-adjusted depth from the frame header
    /// (the side channel of a decorrelated pair carries one extra bit).
    pub fn read(
        reader: &mut BitReader,
        block_size: usize,
        bits_per_sample: u32,
        data: &mut SubframeData,
    ) -> Result<Self> {
        let header = reader.read_bits(8)? as u8;
        if header & 0x80 != 0 {
            bail!(SubframeError::ReservedBitSet);
        }

        let mut bps = bits_per_sample;
        let mut wasted_bits = 0;
        if header & 1 != 0 {
            wasted_bits = reader.read_unary()? + 1;
            bps = match bps.checked_sub(wasted_bits) {
                Some(bps) if bps > 0 => bps,
                _ => bail!(SubframeError::InvalidWastedBits {
                    wasted: wasted_bits,
                    bits_per_sample,
                }),
            };
        }

        let type_field = header & 0xFE;
        let subframe_type = match type_field {
            0x00 => {
                let value = reader.read_bits_signed(bps)?;
                data.dest[..block_size].fill(value);
                SubframeType::Constant
            }
            0x02 => {
                for i in 0..block_size {
                    let value = reader.read_bits_signed(bps)?;
                    data.dest[i] = value;
                    data.residual[i] = value;
                }
                SubframeType::Verbatim
            }
            0x10..=0x18 => {
                let order = (type_field >> 1 & 0x7) as usize;
                decode_fixed(reader, block_size, bps, order, data)?;
                SubframeType::Fixed { order }
            }
            0x40.. => {
                let order = (type_field >> 1 & 0x1F) as usize + 1;
                decode_lpc(reader, block_size, bps, order, data)?;
                SubframeType::Lpc { order }
            }
            _ => bail!(SubframeError::InvalidType(type_field)),
        };

        if wasted_bits > 0 {
            for sample in &mut data.dest[..block_size] {
                *sample <<= wasted_bits;
            }
        }

        Ok(Self {
            subframe_type,
            wasted_bits,
        })
    }
}

fn read_warmup(
    reader: &mut BitReader,
    bps: u32,
    order: usize,
    block_size: usize,
    data: &mut SubframeData,
) -> Result<()> {
    if order > block_size {
        bail!(SubframeError::PredictorOrderTooLarge { order, block_size });
    }

    for i in 0..order {
        let value = reader.read_bits_signed(bps)?;
        data.dest[i] = value;
        data.residual[i] = value;
    }

    Ok(())
}

fn decode_fixed(
    reader: &mut BitReader,
    block_size: usize,
    bps: u32,
    order: usize,
    data: &mut SubframeData,
) -> Result<()> {
    read_warmup(reader, bps, order, block_size, data)?;
    PartitionedRice::read(reader, block_size, order, data)?;
    restore_fixed(order, data.residual, &mut data.dest[..block_size]);

    Ok(())
}

/// Runs the fixed predictor of the given order forward over the residual.
/// The coefficients are the closed-form difference reconstructions.
pub fn restore_fixed(order: usize, residual: &[i32], dest: &mut [i32]) {
    match order {
        0 => dest.copy_from_slice(&residual[..dest.len()]),
        1 => {
            for i in order..dest.len() {
                dest[i] = residual[i].wrapping_add(dest[i - 1]);
            }
        }
        2 => {
            for i in order..dest.len() {
                dest[i] = residual[i].wrapping_add(2i32.wrapping_mul(dest[i - 1]) - dest[i - 2]);
            }
        }
        3 => {
            for i in order..dest.len() {
                dest[i] = residual[i].wrapping_add(
                    3i32.wrapping_mul(dest[i - 1]) - 3i32.wrapping_mul(dest[i - 2]) + dest[i - 3],
                );
            }
        }
        4 => {
            for i in order..dest.len() {
                dest[i] = residual[i].wrapping_add(
                    4i32.wrapping_mul(dest[i - 1]) - 6i32.wrapping_mul(dest[i - 2])
                        + 4i32.wrapping_mul(dest[i - 3])
                        - dest[i - 4],
                );
            }
        }
        _ => unreachable!("fixed predictor order is 3 bits and validated to 0..=4"),
    }
}

fn decode_lpc(
    reader: &mut BitReader,
    block_size: usize,
    bps: u32,
    order: usize,
    data: &mut SubframeData,
) -> Result<()> {
    read_warmup(reader, bps, order, block_size, data)?;

    let precision_code = reader.read_bits(QLP_PRECISION_BITS)?;
    if precision_code == (1 << QLP_PRECISION_BITS) - 1 {
        bail!(SubframeError::InvalidCoefficientPrecision);
    }
    let precision = precision_code + 1;

    let shift = reader.read_bits_signed(QLP_SHIFT_BITS)?;
    if shift < 0 {
        bail!(SubframeError::NegativeShift(shift));
    }

    let mut coefficients = [0i32; MAX_LPC_ORDER];
    for coefficient in coefficients.iter_mut().take(order) {
        *coefficient = reader.read_bits_signed(precision)?;
    }

    PartitionedRice::read(reader, block_size, order, data)?;

    let coefficients = &coefficients[..order];
    let residual = &data.residual[..block_size];
    let dest = &mut data.dest[..block_size];
    if bps + precision + (order as u32).ilog2() <= 32 {
        restore_lpc(coefficients, shift as u32, residual, dest);
    } else {
        restore_lpc_wide(coefficients, shift as u32, residual, dest);
    }

    Ok(())
}

/// LPC restoration with 32-bit accumulation, valid when
/// `bps + precision + log2(order)` fits the accumulator. Wrapping arithmetic
/// so malformed input degrades to wrong samples instead of aborting.
pub fn restore_lpc(coefficients: &[i32], shift: u32, residual: &[i32], dest: &mut [i32]) {
    let order = coefficients.len();
    for i in order..dest.len() {
        let mut sum = 0i32;
        for (j, &coefficient) in coefficients.iter().enumerate() {
            sum = sum.wrapping_add(coefficient.wrapping_mul(dest[i - 1 - j]));
        }

        dest[i] = residual[i].wrapping_add(sum >> shift);
    }
}

/// LPC restoration with 64-bit accumulation for the wide case. Must produce
/// results identical to [`restore_lpc`] whenever both apply.
pub fn restore_lpc_wide(coefficients: &[i32], shift: u32, residual: &[i32], dest: &mut [i32]) {
    let order = coefficients.len();
    for i in order..dest.len() {
        let mut sum = 0i64;
        for (j, &coefficient) in coefficients.iter().enumerate() {
            sum += coefficient as i64 * dest[i - 1 - j] as i64;
        }

        dest[i] = residual[i].wrapping_add((sum >> shift) as i32);
    }
}
