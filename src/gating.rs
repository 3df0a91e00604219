//! Gated block storage, integrated loudness and loudness range.
//!
//! Every completed measurement block is recorded in one of two storage
//! strategies. The precise mode keeps each block's energy in an append-only
//! list, growing without bound with programme length. The histogram mode
//! keeps only a counter per 0.1 LU bin over [-70, +5) LU, trading the list's
//! exactness for constant memory on arbitrarily long programmes.
//!
//! Blocks below the -70 LUFS absolute gate are silence by definition and are
//! never recorded, so both storages hold exactly the population the gated
//! computations operate on.

use once_cell::sync::Lazy;

use crate::error::{MeterError, Result};
use crate::{lufs_to_power, power_to_lufs};

/// Absolute gate threshold per EBU R128.
pub(crate) const ABSOLUTE_GATE_LUFS: f64 = -70.0;

/// Relative gate sits 10 LU below the pre-gated mean (energy factor).
const RELATIVE_GATE_FACTOR: f64 = 0.1;

/// The LRA relative gate sits 20 LU below the pre-gated mean (energy factor).
const LRA_GATE_FACTOR: f64 = 0.01;

const HISTOGRAM_BINS: usize = 750;
const BIN_WIDTH_LU: f64 = 0.1;

/// Energy of the absolute gate threshold.
static ABSOLUTE_GATE_ENERGY: Lazy<f64> = Lazy::new(|| lufs_to_power(ABSOLUTE_GATE_LUFS));

/// Linear energy of each histogram bin center.
static BIN_ENERGIES: Lazy<[f64; HISTOGRAM_BINS]> = Lazy::new(|| {
    let mut energies = [0.0; HISTOGRAM_BINS];
    for (i, energy) in energies.iter_mut().enumerate() {
        *energy = lufs_to_power(bin_loudness(i));
    }
    energies
});

/// Loudness at the center of bin `index`.
#[inline]
fn bin_loudness(index: usize) -> f64 {
    ABSOLUTE_GATE_LUFS + BIN_WIDTH_LU * (index as f64 + 0.5)
}

/// Bin index for a loudness value, clamping out-of-range values to the end
/// bins.
#[inline]
fn bin_index(lufs: f64) -> usize {
    let offset = (lufs - ABSOLUTE_GATE_LUFS) / BIN_WIDTH_LU;
    if offset < 0.0 {
        0
    } else {
        (offset as usize).min(HISTOGRAM_BINS - 1)
    }
}

/// Storage strategy for recorded blocks.
#[derive(Debug, Clone)]
enum BlockStorage {
    /// Append-only energies, one per recorded block.
    List(Vec<f64>),
    /// Counter per 0.1 LU bin.
    Histogram(Box<[u64; HISTOGRAM_BINS]>),
}

/// Records the loudness of completed measurement blocks for later gated
/// computation.
#[derive(Debug, Clone)]
pub(crate) struct GatingAccumulator {
    storage: BlockStorage,
}

impl GatingAccumulator {
    pub(crate) fn new(histogram: bool) -> Self {
        let storage = if histogram {
            BlockStorage::Histogram(Box::new([0; HISTOGRAM_BINS]))
        } else {
            BlockStorage::List(Vec::new())
        };
        Self { storage }
    }

    pub(crate) fn is_histogram(&self) -> bool {
        matches!(self.storage, BlockStorage::Histogram(_))
    }

    /// Forget all recorded blocks, keeping the storage strategy.
    pub(crate) fn clear(&mut self) {
        match &mut self.storage {
            BlockStorage::List(blocks) => blocks.clear(),
            BlockStorage::Histogram(bins) => bins.fill(0),
        }
    }

    /// Record one block energy, dropping it if below the absolute gate.
    pub(crate) fn record(&mut self, energy: f64) -> Result<()> {
        if energy < *ABSOLUTE_GATE_ENERGY {
            return Ok(());
        }
        match &mut self.storage {
            BlockStorage::List(blocks) => {
                blocks.try_reserve(1).map_err(|_| MeterError::OutOfMemory)?;
                blocks.push(energy);
            }
            BlockStorage::Histogram(bins) => {
                bins[bin_index(power_to_lufs(energy))] += 1;
            }
        }
        Ok(())
    }

    /// Sum and count of recorded blocks with energy at or above `gate`.
    fn sum_above(&self, gate: f64) -> (f64, u64) {
        match &self.storage {
            BlockStorage::List(blocks) => {
                let mut sum = 0.0;
                let mut count = 0;
                for &energy in blocks {
                    if energy >= gate {
                        sum += energy;
                        count += 1;
                    }
                }
                (sum, count)
            }
            BlockStorage::Histogram(bins) => {
                let mut sum = 0.0;
                let mut count = 0;
                for (i, &n) in bins.iter().enumerate() {
                    if n > 0 && BIN_ENERGIES[i] >= gate {
                        sum += n as f64 * BIN_ENERGIES[i];
                        count += n;
                    }
                }
                (sum, count)
            }
        }
    }
}

/// Gated integrated loudness over one or more accumulators.
///
/// Mixed storage strategies merge fine here: both reduce to a sum and a
/// count per gate pass.
pub(crate) fn integrated_loudness(accumulators: &[&GatingAccumulator]) -> f64 {
    let mut sum = 0.0;
    let mut count = 0;
    for acc in accumulators {
        let (s, n) = acc.sum_above(*ABSOLUTE_GATE_ENERGY);
        sum += s;
        count += n;
    }
    if count == 0 {
        return f64::NEG_INFINITY;
    }

    let gate = (sum / count as f64 * RELATIVE_GATE_FACTOR).max(*ABSOLUTE_GATE_ENERGY);
    let mut sum = 0.0;
    let mut count = 0;
    for acc in accumulators {
        let (s, n) = acc.sum_above(gate);
        sum += s;
        count += n;
    }
    if count == 0 {
        f64::NEG_INFINITY
    } else {
        power_to_lufs(sum / count as f64)
    }
}

/// The relative gate threshold, in LUFS, implied by the recorded blocks.
///
/// Negative infinity while nothing has passed the absolute gate.
pub(crate) fn relative_threshold(accumulators: &[&GatingAccumulator]) -> f64 {
    let mut sum = 0.0;
    let mut count = 0;
    for acc in accumulators {
        let (s, n) = acc.sum_above(*ABSOLUTE_GATE_ENERGY);
        sum += s;
        count += n;
    }
    if count == 0 {
        f64::NEG_INFINITY
    } else {
        power_to_lufs(sum / count as f64 * RELATIVE_GATE_FACTOR)
    }
}

/// Loudness range (EBU Tech 3342) over one or more accumulators.
///
/// All accumulators must share a storage strategy; percentiles interpolate
/// linearly in precise mode and fall on bin centers in histogram mode.
pub(crate) fn loudness_range(accumulators: &[&GatingAccumulator]) -> Result<f64> {
    let histogram = match accumulators.split_first() {
        Some((first, rest)) => {
            let histogram = first.is_histogram();
            if rest.iter().any(|acc| acc.is_histogram() != histogram) {
                return Err(MeterError::MixedStorage);
            }
            histogram
        }
        None => return Ok(0.0),
    };

    if histogram {
        Ok(range_from_histograms(accumulators))
    } else {
        range_from_lists(accumulators)
    }
}

fn range_from_lists(accumulators: &[&GatingAccumulator]) -> Result<f64> {
    let total: usize = accumulators
        .iter()
        .map(|acc| match &acc.storage {
            BlockStorage::List(blocks) => blocks.len(),
            BlockStorage::Histogram(_) => 0,
        })
        .sum();
    if total == 0 {
        return Ok(0.0);
    }

    let mut values = Vec::new();
    values
        .try_reserve_exact(total)
        .map_err(|_| MeterError::OutOfMemory)?;
    for acc in accumulators {
        if let BlockStorage::List(blocks) = &acc.storage {
            values.extend_from_slice(blocks);
        }
    }

    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let gate = mean * LRA_GATE_FACTOR;
    values.retain(|&energy| energy >= gate);
    if values.len() < 2 {
        return Ok(0.0);
    }

    for value in &mut values {
        *value = power_to_lufs(*value);
    }
    values.sort_unstable_by(|a, b| a.partial_cmp(b).expect("block loudness is never NaN"));

    Ok(percentile(&values, 0.95) - percentile(&values, 0.10))
}

/// Linearly interpolated percentile of an ascending slice.
fn percentile(sorted: &[f64], fraction: f64) -> f64 {
    let position = fraction * (sorted.len() - 1) as f64;
    let index = position as usize;
    let fract = position - index as f64;
    if index + 1 < sorted.len() {
        sorted[index] + fract * (sorted[index + 1] - sorted[index])
    } else {
        sorted[index]
    }
}

fn range_from_histograms(accumulators: &[&GatingAccumulator]) -> f64 {
    let mut bins = [0u64; HISTOGRAM_BINS];
    for acc in accumulators {
        if let BlockStorage::Histogram(theirs) = &acc.storage {
            for (bin, &n) in bins.iter_mut().zip(theirs.iter()) {
                *bin += n;
            }
        }
    }

    let mut sum = 0.0;
    let mut count = 0u64;
    for (i, &n) in bins.iter().enumerate() {
        if n > 0 {
            sum += n as f64 * BIN_ENERGIES[i];
            count += n;
        }
    }
    if count == 0 {
        return 0.0;
    }

    let gate = sum / count as f64 * LRA_GATE_FACTOR;
    let start = BIN_ENERGIES.iter().position(|&e| e >= gate).unwrap_or(0);
    let total: u64 = bins[start..].iter().sum();
    if total < 2 {
        return 0.0;
    }

    // Bin-edge approximation: take the first bin whose cumulative count
    // reaches the 1-based percentile rank.
    let low_rank = (total as f64 * 0.10) as u64 + 1;
    let high_rank = ((total as f64 * 0.95).ceil() as u64).clamp(1, total);
    let mut cumulative = 0u64;
    let mut low = None;
    let mut high = None;
    for (i, &n) in bins.iter().enumerate().skip(start) {
        cumulative += n;
        if low.is_none() && cumulative >= low_rank {
            low = Some(bin_loudness(i));
        }
        if cumulative >= high_rank {
            high = Some(bin_loudness(i));
            break;
        }
    }

    match (low, high) {
        (Some(low), Some(high)) => high - low,
        _ => 0.0,
    }
}
