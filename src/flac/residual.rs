//! The Rice-coded residual block shared by FIXED and LPC subframes
//! (spec "Residual block" / "Residual encoding").

use crate::bitstream::{BitReader, BitWriter, ByteSink};
use crate::error::{FlacError, Result};

/// A chosen partition order plus per-partition Rice parameters, ready
/// to be written by `write_residual`.
#[derive(Debug, Clone)]
pub struct ResidualPlan {
    pub coding_method: u8,
    pub partition_order: u32,
    pub parameters: Vec<u32>,
}

fn partition_bounds(sample_count: usize, order: usize, partition_count: usize, p: usize) -> (usize, usize) {
    let partition_samples = sample_count / partition_count - if p == 0 { order } else { 0 };
    let start = if p == 0 { 0 } else { p * sample_count / partition_count - order };
    (start, start + partition_samples)
}

fn max_partition_order(sample_count: usize, order: usize, max_partition_order: u32) -> u32 {
    let mut i = 0u32;
    while sample_count % (1usize << i) == 0
        && sample_count / (1usize << i) > order
        && i <= max_partition_order
    {
        i += 1;
    }
    if i > 0 {
        i - 1
    } else {
        0
    }
}

/// Chooses the partition order and per-partition Rice parameters
/// minimising the estimated encoded size, per the encoder's size model.
pub fn choose_residual_plan(
    residuals: &[i32],
    order: usize,
    sample_count: usize,
    max_rice_parameter: u32,
    max_residual_partition_order: u32,
) -> ResidualPlan {
    if sample_count == order {
        return ResidualPlan {
            coding_method: 0,
            partition_order: 0,
            parameters: vec![0],
        };
    }

    let max_p_order = max_partition_order(sample_count, order, max_residual_partition_order);
    let mut best_size = u64::MAX;
    let mut best_order = 0;
    let mut best_params = vec![0u32];

    for i in 0..=max_p_order {
        let partition_count = 1usize << i;
        let mut params = Vec::with_capacity(partition_count);
        let mut total_size: u64 = 0;

        for p in 0..partition_count {
            let (start, end) = partition_bounds(sample_count, order, partition_count, p);
            let partition_samples = end - start;
            let partition_sum: u64 = residuals[start..end].iter().map(|&v| (v as i64).unsigned_abs()).sum();

            let mut rice_param = if partition_sum > partition_samples as u64 {
                let p = ((partition_sum as f64) / (partition_samples as f64)).log2().ceil() as u32;
                p.min(max_rice_parameter)
            } else {
                0
            };
            if partition_samples == 0 {
                rice_param = 0;
            }

            let partition_size: i64 = 4
                + ((1 + rice_param as i64) * partition_samples as i64)
                + if rice_param > 0 {
                    (partition_sum >> (rice_param - 1)) as i64
                } else {
                    (partition_sum << 1) as i64
                }
                - (partition_samples as i64 / 2);

            total_size += partition_size.max(0) as u64;
            params.push(rice_param);
        }

        if total_size < best_size {
            best_size = total_size;
            best_order = i;
            best_params = params;
        }
    }

    let coding_method = if best_params.iter().any(|&p| p > 14) { 1 } else { 0 };

    ResidualPlan {
        coding_method,
        partition_order: best_order,
        parameters: best_params,
    }
}

/// Writes a residual block already planned by `choose_residual_plan`.
pub fn write_residual<S: ByteSink>(
    writer: &mut BitWriter<S>,
    residuals: &[i32],
    order: usize,
    sample_count: usize,
    plan: &ResidualPlan,
) -> Result<()> {
    let partition_count = 1usize << plan.partition_order;

    writer.write_unsigned(2, plan.coding_method as u32)?;
    writer.write_unsigned(4, plan.partition_order)?;

    let param_bits = if plan.coding_method == 1 { 5 } else { 4 };
    let escape = if plan.coding_method == 1 { 0x1F } else { 0xF };

    for p in 0..partition_count {
        let (start, end) = partition_bounds(sample_count, order, partition_count, p);
        let rice_parameter = plan.parameters[p];

        if rice_parameter >= escape {
            let max_abs = residuals[start..end]
                .iter()
                .map(|&v| (v as i64).unsigned_abs())
                .max()
                .unwrap_or(0);
            let bit_length = 64 - max_abs.leading_zeros();
            // The raw-bits field is 5 bits wide, so it can only ever hold
            // 0..=31; the +1 for the sign bit can overshoot that for
            // residuals near i32::MIN, so cap it instead of handing the
            // bitstream writer an out-of-range field value or bit count.
            let width = ((bit_length + 1).max(1)).min(31);
            writer.write_unsigned(param_bits, escape)?;
            writer.write_unsigned(5, width)?;
            for &value in &residuals[start..end] {
                writer.write_signed(width, value)?;
            }
            continue;
        }

        writer.write_unsigned(param_bits, rice_parameter)?;
        for &value in &residuals[start..end] {
            let unsigned = if value >= 0 {
                (value as u32) << 1
            } else {
                (((-(value as i64)) as u32 - 1) << 1) + 1
            };
            let msb = unsigned >> rice_parameter;
            writer.write_unary(1, msb)?;
            if rice_parameter > 0 {
                writer.write_unsigned(rice_parameter, unsigned & ((1u32 << rice_parameter) - 1))?;
            }
        }
    }

    Ok(())
}

/// Reads a residual block of `sample_count - order` entries.
pub fn read_residual(reader: &mut BitReader, order: usize, sample_count: usize) -> Result<Vec<i32>> {
    let coding_method = reader.read_unsigned(2)?;
    let partition_order = reader.read_unsigned(4)?;
    let partition_count = 1usize << partition_order;

    let (param_bits, escape) = match coding_method {
        0 => (4u32, 0xFu32),
        1 => (5u32, 0x1Fu32),
        _ => return Err(FlacError::InvalidCodingMethod.into()),
    };

    let mut residuals = Vec::with_capacity(sample_count.saturating_sub(order));

    for p in 0..partition_count {
        let partition_samples = if p == 0 {
            (sample_count / partition_count).saturating_sub(order)
        } else {
            sample_count / partition_count
        };

        let rice_parameter = reader.read_unsigned(param_bits)?;

        if rice_parameter == escape {
            let width = reader.read_unsigned(5)?;
            for _ in 0..partition_samples {
                residuals.push(reader.read_signed(width)?);
            }
        } else {
            for _ in 0..partition_samples {
                let msb = reader.read_unary(1)?;
                let lsb = if rice_parameter > 0 {
                    reader.read_unsigned(rice_parameter)?
                } else {
                    0
                };
                let value = (msb << rice_parameter) | lsb;
                let signed = if value & 1 == 0 {
                    (value >> 1) as i32
                } else {
                    -(((value >> 1) + 1) as i32)
                };
                residuals.push(signed);
            }
        }
    }

    Ok(residuals)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitstream::{BitEndian, SliceSource, VecSink};

    #[test]
    fn residual_round_trips_through_rice_coding() {
        let residuals: Vec<i32> = (-8..8).collect();
        let order = 0;
        let sample_count = residuals.len();
        let plan = choose_residual_plan(&residuals, order, sample_count, 30, 0);

        let mut writer = BitWriter::<VecSink>::recorder(BitEndian::Big);
        write_residual(&mut writer, &residuals, order, sample_count, &plan).unwrap();
        let data = writer.into_recorder_data().unwrap();

        let mut reader = BitReader::new(Box::new(SliceSource::new(data)), BitEndian::Big);
        let decoded = read_residual(&mut reader, order, sample_count).unwrap();
        assert_eq!(decoded, residuals);
    }

    #[test]
    fn escape_code_round_trips_large_residual() {
        let residuals = vec![1_000_000, -1_000_000, 0, 42];
        let order = 0;
        let sample_count = residuals.len();
        let plan = ResidualPlan {
            coding_method: 1,
            partition_order: 0,
            parameters: vec![0x1F],
        };

        let mut writer = BitWriter::<VecSink>::recorder(BitEndian::Big);
        write_residual(&mut writer, &residuals, order, sample_count, &plan).unwrap();
        let data = writer.into_recorder_data().unwrap();

        let mut reader = BitReader::new(Box::new(SliceSource::new(data)), BitEndian::Big);
        let decoded = read_residual(&mut reader, order, sample_count).unwrap();
        assert_eq!(decoded, residuals);
    }
}
