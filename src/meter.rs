//! The loudness meter façade.
//!
//! [`LoudnessMeter`] binds the K-weighting filter bank, the sub-block energy
//! ring, the gated block stores, the peak trackers and the true-peak
//! oversampler behind the public measurement operations. One meter measures
//! one programme; several meters can be merged with
//! [`loudness_global_multiple`] and [`loudness_range_multiple`].

use bitflags::bitflags;
use tracing::debug;

use crate::channel::{default_map, ChannelRole};
use crate::energy::{BlockEnergy, MOMENTARY_SUBBLOCKS, SHORTTERM_SUBBLOCKS};
use crate::error::{MeterError, Result};
use crate::filter::KWeightingFilterBank;
use crate::gating::{self, GatingAccumulator};
use crate::oversample::Oversampler;
use crate::peak::PeakTracker;
use crate::power_to_lufs;
use crate::sample::Sample;
use crate::{MAX_CHANNELS, MIN_SAMPLE_RATE};

bitflags! {
    /// Measurement modes, combined at construction time.
    ///
    /// Each queryable measurement has a bit that must have been set when the
    /// meter was built. Wider windows imply the narrower ones they are
    /// computed from, so the composite constants already include their
    /// dependencies.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Mode: u32 {
        /// Momentary loudness over the last 400 ms.
        const M = 1;
        /// Short-term loudness over the last 3 s. Implies `M`.
        const S = (1 << 1) | Self::M.bits();
        /// Gated integrated loudness over the whole programme. Implies `M`.
        const I = (1 << 2) | Self::M.bits();
        /// Loudness range (EBU Tech 3342). Implies `S`.
        const LRA = (1 << 3) | Self::S.bits();
        /// Per-channel sample peak. Implies `M`.
        const SAMPLE_PEAK = (1 << 4) | Self::M.bits();
        /// Per-channel oversampled true peak. Implies `M`.
        const TRUE_PEAK = (1 << 5) | Self::M.bits();
        /// Store gated blocks in fixed-size histograms instead of growing
        /// lists, bounding memory on long programmes at 0.1 LU resolution.
        const HISTOGRAM = 1 << 6;
    }
}

/// Validated construction parameters for a [`LoudnessMeter`].
#[derive(Debug, Clone, Copy)]
pub struct MeterConfig {
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Number of interleaved channels.
    pub channels: u32,
    /// Enabled measurement modes.
    pub mode: Mode,
}

impl MeterConfig {
    /// Create a configuration.
    pub fn new(sample_rate: u32, channels: u32, mode: Mode) -> Self {
        Self {
            sample_rate,
            channels,
            mode,
        }
    }

    /// Check the parameters against the supported ranges.
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate < MIN_SAMPLE_RATE {
            return Err(MeterError::invalid_sample_rate(self.sample_rate));
        }
        if self.channels == 0 || self.channels > MAX_CHANNELS {
            return Err(MeterError::invalid_channel_count(self.channels));
        }
        Ok(())
    }
}

/// Snapshot of every enabled measurement.
///
/// Fields of measurements whose mode bit was not set are `None`. Peaks are
/// the maximum across channels.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LoudnessResults {
    /// Momentary loudness in LUFS.
    pub momentary: Option<f64>,
    /// Short-term loudness in LUFS.
    pub shortterm: Option<f64>,
    /// Gated integrated loudness in LUFS.
    pub integrated: Option<f64>,
    /// Loudness range in LU.
    pub range: Option<f64>,
    /// Largest per-channel sample peak, linear amplitude.
    pub sample_peak: Option<f64>,
    /// Largest per-channel true peak, linear amplitude.
    pub true_peak: Option<f64>,
}

/// EBU R128 / ITU-R BS.1770 loudness meter.
///
/// Frames are fed incrementally with [`add_frames`]; measurements are read
/// on demand. Feeding a programme in any partition of chunks produces the
/// same measurements as feeding it whole. Dropping the meter releases every
/// buffer it owns.
///
/// [`add_frames`]: Self::add_frames
#[derive(Debug, Clone)]
pub struct LoudnessMeter {
    mode: Mode,
    sample_rate: u32,
    channels: u32,
    channel_map: Vec<ChannelRole>,
    /// Cached weights of `channel_map`, kept in sync by `set_channel`.
    weights: Vec<f64>,
    filters: KWeightingFilterBank,
    energy: BlockEnergy,
    /// 400 ms blocks for integrated loudness.
    block_records: GatingAccumulator,
    /// 3 s records for loudness range.
    shortterm_records: GatingAccumulator,
    peaks: PeakTracker,
    oversampler: Option<Oversampler>,
    /// Per-channel staging buffer for one run of samples.
    scratch: Vec<f64>,
    frames_processed: u64,
    max_momentary: f64,
    max_shortterm: f64,
}

impl LoudnessMeter {
    /// Create a meter for the given sample rate, channel count and modes.
    pub fn new(sample_rate: u32, channels: u32, mode: Mode) -> Result<Self> {
        Self::with_config(MeterConfig::new(sample_rate, channels, mode))
    }

    /// Create a meter from a configuration.
    pub fn with_config(config: MeterConfig) -> Result<Self> {
        config.validate()?;
        debug!(
            sample_rate = config.sample_rate,
            channels = config.channels,
            mode = ?config.mode,
            "building loudness meter"
        );

        let channel_map = default_map(config.channels);
        let weights = channel_map.iter().map(|role| role.weight()).collect();
        let histogram = config.mode.contains(Mode::HISTOGRAM);
        let oversampler = config
            .mode
            .contains(Mode::TRUE_PEAK)
            .then(|| Oversampler::new(config.channels, config.sample_rate));

        Ok(Self {
            mode: config.mode,
            sample_rate: config.sample_rate,
            channels: config.channels,
            channel_map,
            weights,
            filters: KWeightingFilterBank::new(config.channels, config.sample_rate),
            energy: BlockEnergy::new(config.channels, config.sample_rate),
            block_records: GatingAccumulator::new(histogram),
            shortterm_records: GatingAccumulator::new(histogram),
            peaks: PeakTracker::new(config.channels),
            oversampler,
            scratch: Vec::new(),
            frames_processed: 0,
            max_momentary: f64::NEG_INFINITY,
            max_shortterm: f64::NEG_INFINITY,
        })
    }

    /// Enabled measurement modes.
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Current sample rate in Hz.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Current channel count.
    pub fn channels(&self) -> u32 {
        self.channels
    }

    /// The current channel map.
    pub fn channel_map(&self) -> &[ChannelRole] {
        &self.channel_map
    }

    /// Total frames consumed since construction or the last reset.
    pub fn frames_processed(&self) -> u64 {
        self.frames_processed
    }

    /// Programme duration consumed so far, in seconds.
    pub fn duration_seconds(&self) -> f64 {
        self.frames_processed as f64 / self.sample_rate as f64
    }

    /// Assign a role to one channel.
    pub fn set_channel(&mut self, index: u32, role: ChannelRole) -> Result<()> {
        if index >= self.channels {
            return Err(MeterError::invalid_channel_index(index, self.channels));
        }
        self.channel_map[index as usize] = role;
        self.weights[index as usize] = role.weight();
        Ok(())
    }

    /// Change sample rate and/or channel count.
    ///
    /// The unfinished 100 ms sub-block and the window history are discarded
    /// and the filters and oversampler rebuilt; recorded gating blocks are
    /// kept, since block loudness does not depend on the rate they were
    /// measured at. The channel map resets to the default only when the
    /// channel count changes. Returns [`MeterError::NoChange`] when both
    /// parameters equal the current ones.
    pub fn change_parameters(&mut self, sample_rate: u32, channels: u32) -> Result<()> {
        MeterConfig::new(sample_rate, channels, self.mode).validate()?;
        if sample_rate == self.sample_rate && channels == self.channels {
            return Err(MeterError::NoChange);
        }
        debug!(sample_rate, channels, "reconfiguring loudness meter");

        if channels != self.channels {
            self.channels = channels;
            self.channel_map = default_map(channels);
            self.weights = self.channel_map.iter().map(|role| role.weight()).collect();
            self.peaks = PeakTracker::new(channels);
        }
        self.sample_rate = sample_rate;
        self.filters = KWeightingFilterBank::new(self.channels, sample_rate);
        self.energy = BlockEnergy::new(self.channels, sample_rate);
        if self.mode.contains(Mode::TRUE_PEAK) {
            self.oversampler = Some(Oversampler::new(self.channels, sample_rate));
        }
        Ok(())
    }

    /// Return the meter to its freshly built state without reallocating.
    pub fn reset(&mut self) {
        self.filters.reset();
        self.energy.reset();
        self.block_records.clear();
        self.shortterm_records.clear();
        self.peaks.reset();
        if let Some(oversampler) = &mut self.oversampler {
            oversampler.reset();
        }
        self.frames_processed = 0;
        self.max_momentary = f64::NEG_INFINITY;
        self.max_shortterm = f64::NEG_INFINITY;
    }

    /// Feed interleaved frames in any supported sample format.
    ///
    /// The slice length must be a multiple of the channel count. Samples run
    /// through peak tracking, the K-weighting filter and sub-block energy
    /// accumulation; completed 400 ms and 3 s windows are recorded for the
    /// gated measurements.
    pub fn add_frames<S: Sample>(&mut self, interleaved: &[S]) -> Result<()> {
        let channels = self.channels as usize;
        if interleaved.len() % channels != 0 {
            return Err(MeterError::buffer_size_mismatch(
                interleaved.len(),
                self.channels,
            ));
        }
        let track_peaks =
            self.mode.contains(Mode::SAMPLE_PEAK) || self.mode.contains(Mode::TRUE_PEAK);

        let total_frames = interleaved.len() / channels;
        let mut offset = 0;
        while offset < total_frames {
            // Process up to the next sub-block boundary in one run per
            // channel, so the boundary bookkeeping stays out of the sample
            // loop.
            let take = (total_frames - offset).min(self.energy.subblock_remaining());
            for ch in 0..channels {
                self.scratch.clear();
                self.scratch.extend(
                    interleaved[offset * channels + ch..]
                        .iter()
                        .step_by(channels)
                        .take(take)
                        .map(|s| s.to_normalized()),
                );
                if track_peaks {
                    self.peaks.scan_samples(ch, &self.scratch);
                }
                if let Some(oversampler) = &mut self.oversampler {
                    let peak = oversampler.process_max(ch, &self.scratch);
                    self.peaks.update_true_peak(ch, peak);
                }
                self.filters.process_channel(ch, &mut self.scratch);
                self.energy.accumulate(ch, &self.scratch);
            }
            if self.energy.advance(take) {
                self.on_subblock_complete()?;
            }
            offset += take;
        }

        self.frames_processed += total_frames as u64;
        Ok(())
    }

    /// Record completed windows and update running maxima after a sub-block
    /// boundary.
    fn on_subblock_complete(&mut self) -> Result<()> {
        if let Some(energy) = self.energy.window_energy(MOMENTARY_SUBBLOCKS, &self.weights) {
            let loudness = power_to_lufs(energy);
            if loudness > self.max_momentary {
                self.max_momentary = loudness;
            }
            if self.mode.contains(Mode::I) {
                self.block_records.record(energy)?;
            }
        }
        if let Some(energy) = self.energy.window_energy(SHORTTERM_SUBBLOCKS, &self.weights) {
            let loudness = power_to_lufs(energy);
            if loudness > self.max_shortterm {
                self.max_shortterm = loudness;
            }
            if self.mode.contains(Mode::LRA) {
                self.shortterm_records.record(energy)?;
            }
        }
        Ok(())
    }

    /// Momentary loudness over the last 400 ms, in LUFS.
    ///
    /// Negative infinity until the first 400 ms of audio completed, and for
    /// silent windows.
    pub fn loudness_momentary(&self) -> Result<f64> {
        if !self.mode.contains(Mode::M) {
            return Err(MeterError::invalid_mode("loudness_momentary"));
        }
        Ok(self.window_loudness(MOMENTARY_SUBBLOCKS))
    }

    /// Short-term loudness over the last 3 s, in LUFS.
    pub fn loudness_shortterm(&self) -> Result<f64> {
        if !self.mode.contains(Mode::S) {
            return Err(MeterError::invalid_mode("loudness_shortterm"));
        }
        Ok(self.window_loudness(SHORTTERM_SUBBLOCKS))
    }

    fn window_loudness(&self, subblocks: usize) -> f64 {
        match self.energy.window_energy(subblocks, &self.weights) {
            Some(energy) => power_to_lufs(energy),
            None => f64::NEG_INFINITY,
        }
    }

    /// Gated integrated loudness of the programme so far, in LUFS.
    pub fn loudness_global(&self) -> Result<f64> {
        if !self.mode.contains(Mode::I) {
            return Err(MeterError::invalid_mode("loudness_global"));
        }
        Ok(gating::integrated_loudness(&[&self.block_records]))
    }

    /// Loudness range (EBU Tech 3342) of the programme so far, in LU.
    pub fn loudness_range(&self) -> Result<f64> {
        if !self.mode.contains(Mode::LRA) {
            return Err(MeterError::invalid_mode("loudness_range"));
        }
        gating::loudness_range(&[&self.shortterm_records])
    }

    /// The relative gate threshold derived from the blocks recorded so far,
    /// in LUFS. Negative infinity while no block passed the absolute gate.
    pub fn relative_threshold(&self) -> Result<f64> {
        if !self.mode.contains(Mode::I) {
            return Err(MeterError::invalid_mode("relative_threshold"));
        }
        Ok(gating::relative_threshold(&[&self.block_records]))
    }

    /// Largest momentary loudness seen so far, in LUFS.
    pub fn max_momentary(&self) -> Result<f64> {
        if !self.mode.contains(Mode::M) {
            return Err(MeterError::invalid_mode("max_momentary"));
        }
        Ok(self.max_momentary)
    }

    /// Largest short-term loudness seen so far, in LUFS.
    pub fn max_shortterm(&self) -> Result<f64> {
        if !self.mode.contains(Mode::S) {
            return Err(MeterError::invalid_mode("max_shortterm"));
        }
        Ok(self.max_shortterm)
    }

    /// Sample peak of one channel, linear amplitude where 1.0 is 0 dBFS.
    pub fn sample_peak(&self, channel: u32) -> Result<f64> {
        if !self.mode.contains(Mode::SAMPLE_PEAK) {
            return Err(MeterError::invalid_mode("sample_peak"));
        }
        if channel >= self.channels {
            return Err(MeterError::invalid_channel_index(channel, self.channels));
        }
        Ok(self.peaks.sample_peak(channel as usize))
    }

    /// True peak of one channel, linear amplitude where 1.0 is 0 dBFS.
    ///
    /// May exceed 1.0 for inter-sample peaks. At sample rates of 192 kHz and
    /// above the oversampler is bypassed and this equals the sample peak.
    pub fn true_peak(&self, channel: u32) -> Result<f64> {
        if !self.mode.contains(Mode::TRUE_PEAK) {
            return Err(MeterError::invalid_mode("true_peak"));
        }
        if channel >= self.channels {
            return Err(MeterError::invalid_channel_index(channel, self.channels));
        }
        Ok(self.peaks.true_peak(channel as usize))
    }

    /// Snapshot every enabled measurement at once.
    ///
    /// Disabled measurements are `None`; peaks report the maximum across
    /// channels.
    pub fn results(&self) -> LoudnessResults {
        let sample_peak = self.mode.contains(Mode::SAMPLE_PEAK).then(|| {
            (0..self.channels as usize)
                .map(|ch| self.peaks.sample_peak(ch))
                .fold(0.0, f64::max)
        });
        let true_peak = self.mode.contains(Mode::TRUE_PEAK).then(|| {
            (0..self.channels as usize)
                .map(|ch| self.peaks.true_peak(ch))
                .fold(0.0, f64::max)
        });
        LoudnessResults {
            momentary: self.loudness_momentary().ok(),
            shortterm: self.loudness_shortterm().ok(),
            integrated: self.loudness_global().ok(),
            range: self.loudness_range().ok(),
            sample_peak,
            true_peak,
        }
    }

    pub(crate) fn block_records(&self) -> &GatingAccumulator {
        &self.block_records
    }

    pub(crate) fn shortterm_records(&self) -> &GatingAccumulator {
        &self.shortterm_records
    }
}

/// Gated integrated loudness across several meters, in LUFS.
///
/// All recorded 400 ms blocks are merged into one virtual population before
/// gating, so the result equals a single meter that had consumed every
/// programme. The meters may differ in sample rate, channel count and
/// storage strategy; each must have been built with [`Mode::I`].
pub fn loudness_global_multiple(meters: &[&LoudnessMeter]) -> Result<f64> {
    let mut records = Vec::with_capacity(meters.len());
    for meter in meters {
        if !meter.mode.contains(Mode::I) {
            return Err(MeterError::invalid_mode("loudness_global_multiple"));
        }
        records.push(meter.block_records());
    }
    Ok(gating::integrated_loudness(&records))
}

/// Loudness range across several meters, in LU.
///
/// Merges all short-term records before gating. Each meter must have been
/// built with [`Mode::LRA`], and all meters must share the same storage
/// strategy (all precise or all [`Mode::HISTOGRAM`]); a mixed set returns
/// [`MeterError::MixedStorage`].
pub fn loudness_range_multiple(meters: &[&LoudnessMeter]) -> Result<f64> {
    let mut records = Vec::with_capacity(meters.len());
    for meter in meters {
        if !meter.mode.contains(Mode::LRA) {
            return Err(MeterError::invalid_mode("loudness_range_multiple"));
        }
        records.push(meter.shortterm_records());
    }
    gating::loudness_range(&records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    fn sine_stereo(freq: f64, amplitude: f64, rate: u32, seconds: f64) -> Vec<f64> {
        let frames = (rate as f64 * seconds) as usize;
        let mut samples = Vec::with_capacity(frames * 2);
        for i in 0..frames {
            let s = amplitude * (2.0 * PI * freq * i as f64 / rate as f64).sin();
            samples.push(s);
            samples.push(s);
        }
        samples
    }

    #[test]
    fn test_mode_implications() {
        assert!(Mode::S.contains(Mode::M));
        assert!(Mode::I.contains(Mode::M));
        assert!(Mode::LRA.contains(Mode::S));
        assert!(Mode::LRA.contains(Mode::M));
        assert!(Mode::SAMPLE_PEAK.contains(Mode::M));
        assert!(Mode::TRUE_PEAK.contains(Mode::M));
        assert!(!Mode::HISTOGRAM.contains(Mode::M));
        assert!(!Mode::I.contains(Mode::S));
    }

    #[test]
    fn test_construction_validation() {
        assert!(LoudnessMeter::new(48000, 2, Mode::I).is_ok());
        assert!(LoudnessMeter::new(8000, 1, Mode::M).is_ok());
        assert!(matches!(
            LoudnessMeter::new(7999, 2, Mode::I),
            Err(MeterError::InvalidSampleRate { rate: 7999 })
        ));
        assert!(matches!(
            LoudnessMeter::new(48000, 0, Mode::I),
            Err(MeterError::InvalidChannelCount { count: 0 })
        ));
        assert!(matches!(
            LoudnessMeter::new(48000, 65, Mode::I),
            Err(MeterError::InvalidChannelCount { count: 65 })
        ));
    }

    #[test]
    fn test_queries_require_mode() {
        let meter = LoudnessMeter::new(48000, 2, Mode::M).unwrap();
        assert!(meter.loudness_momentary().is_ok());
        assert!(matches!(
            meter.loudness_shortterm(),
            Err(MeterError::InvalidMode { .. })
        ));
        assert!(matches!(
            meter.loudness_global(),
            Err(MeterError::InvalidMode { .. })
        ));
        assert!(matches!(
            meter.loudness_range(),
            Err(MeterError::InvalidMode { .. })
        ));
        assert!(matches!(
            meter.sample_peak(0),
            Err(MeterError::InvalidMode { .. })
        ));
        assert!(matches!(
            meter.true_peak(0),
            Err(MeterError::InvalidMode { .. })
        ));
    }

    #[test]
    fn test_set_channel_bounds() {
        let mut meter = LoudnessMeter::new(48000, 2, Mode::I).unwrap();
        assert!(meter.set_channel(1, ChannelRole::DualMono).is_ok());
        assert_eq!(meter.channel_map()[1], ChannelRole::DualMono);
        assert!(matches!(
            meter.set_channel(2, ChannelRole::Left),
            Err(MeterError::InvalidChannelIndex {
                index: 2,
                channels: 2
            })
        ));
    }

    #[test]
    fn test_default_channel_map() {
        let meter = LoudnessMeter::new(48000, 6, Mode::I).unwrap();
        assert_eq!(
            meter.channel_map(),
            &[
                ChannelRole::Left,
                ChannelRole::Right,
                ChannelRole::Center,
                ChannelRole::Unused,
                ChannelRole::LeftSurround,
                ChannelRole::RightSurround,
            ]
        );
    }

    #[test]
    fn test_add_frames_rejects_ragged_buffer() {
        let mut meter = LoudnessMeter::new(48000, 2, Mode::I).unwrap();
        let samples = [0.0f64; 3];
        assert!(matches!(
            meter.add_frames(&samples),
            Err(MeterError::BufferSizeMismatch {
                len: 3,
                channels: 2
            })
        ));
    }

    #[test]
    fn test_no_change_reports_error() {
        let mut meter = LoudnessMeter::new(48000, 2, Mode::I).unwrap();
        assert!(matches!(
            meter.change_parameters(48000, 2),
            Err(MeterError::NoChange)
        ));
        assert!(meter.change_parameters(44100, 2).is_ok());
        assert_eq!(meter.sample_rate(), 44100);
    }

    #[test]
    fn test_reconfigure_resets_map_only_on_channel_change() {
        let mut meter = LoudnessMeter::new(48000, 2, Mode::I).unwrap();
        meter.set_channel(0, ChannelRole::DualMono).unwrap();

        meter.change_parameters(44100, 2).unwrap();
        assert_eq!(meter.channel_map()[0], ChannelRole::DualMono);

        meter.change_parameters(44100, 3).unwrap();
        assert_eq!(meter.channel_map()[0], ChannelRole::Left);
    }

    #[test]
    fn test_reconfigure_discards_partial_subblock() {
        let mut meter = LoudnessMeter::new(48000, 1, Mode::M).unwrap();
        // 50 ms of a loud tone, then reconfigure: that half bucket must not
        // contribute to any later window.
        let loud: Vec<f64> = (0..2400)
            .map(|i| (2.0 * PI * 1000.0 * i as f64 / 48000.0).sin())
            .collect();
        meter.add_frames(&loud).unwrap();
        meter.change_parameters(44100, 1).unwrap();

        let silence = vec![0.0f64; 44100];
        meter.add_frames(&silence).unwrap();
        assert_eq!(meter.loudness_momentary().unwrap(), f64::NEG_INFINITY);
    }

    #[test]
    fn test_momentary_undefined_until_window_full() {
        let mut meter = LoudnessMeter::new(48000, 2, Mode::M).unwrap();
        meter
            .add_frames(&sine_stereo(1000.0, 0.1, 48000, 0.3))
            .unwrap();
        assert_eq!(meter.loudness_momentary().unwrap(), f64::NEG_INFINITY);

        meter
            .add_frames(&sine_stereo(1000.0, 0.1, 48000, 0.2))
            .unwrap();
        assert!(meter.loudness_momentary().unwrap().is_finite());
    }

    #[test]
    fn test_dual_mono_counts_twice() {
        let amplitude = 0.1;
        let mono: Vec<f64> = (0..96000)
            .map(|i| amplitude * (2.0 * PI * 1000.0 * i as f64 / 48000.0).sin())
            .collect();

        let mut dual = LoudnessMeter::new(48000, 1, Mode::I).unwrap();
        dual.set_channel(0, ChannelRole::DualMono).unwrap();
        dual.add_frames(&mono).unwrap();

        let mut stereo = LoudnessMeter::new(48000, 2, Mode::I).unwrap();
        stereo
            .add_frames(&sine_stereo(1000.0, amplitude, 48000, 2.0))
            .unwrap();

        let a = dual.loudness_global().unwrap();
        let b = stereo.loudness_global().unwrap();
        assert!((a - b).abs() < 1e-9, "dual mono {a} vs stereo {b}");
    }

    #[test]
    fn test_unused_channel_excluded() {
        let mut meter = LoudnessMeter::new(48000, 2, Mode::I).unwrap();
        meter.set_channel(1, ChannelRole::Unused).unwrap();
        // Channel 1 carries a loud tone that must not register.
        let frames: Vec<f64> = (0..96000)
            .flat_map(|i| {
                let t = i as f64 / 48000.0;
                [0.0, 0.9 * (2.0 * PI * 1000.0 * t).sin()]
            })
            .collect();
        meter.add_frames(&frames).unwrap();
        assert_eq!(meter.loudness_global().unwrap(), f64::NEG_INFINITY);
    }

    #[test]
    fn test_results_snapshot_respects_modes() {
        let mut meter = LoudnessMeter::new(48000, 2, Mode::I | Mode::SAMPLE_PEAK).unwrap();
        meter
            .add_frames(&sine_stereo(1000.0, 0.1, 48000, 1.0))
            .unwrap();
        let results = meter.results();
        assert!(results.momentary.is_some());
        assert!(results.integrated.is_some());
        assert!(results.sample_peak.is_some());
        assert!(results.shortterm.is_none());
        assert!(results.range.is_none());
        assert!(results.true_peak.is_none());
    }

    #[test]
    fn test_reset_restores_initial_state() {
        let mut meter =
            LoudnessMeter::new(48000, 2, Mode::I | Mode::LRA | Mode::SAMPLE_PEAK).unwrap();
        meter
            .add_frames(&sine_stereo(1000.0, 0.5, 48000, 2.0))
            .unwrap();
        assert!(meter.frames_processed() > 0);

        meter.reset();
        assert_eq!(meter.frames_processed(), 0);
        assert_eq!(meter.duration_seconds(), 0.0);
        assert_eq!(meter.loudness_global().unwrap(), f64::NEG_INFINITY);
        assert_eq!(meter.sample_peak(0).unwrap(), 0.0);
        assert_eq!(meter.max_momentary().unwrap(), f64::NEG_INFINITY);
    }

    #[test]
    fn test_max_momentary_tracks_loud_passage() {
        let mut meter = LoudnessMeter::new(48000, 2, Mode::I).unwrap();
        meter
            .add_frames(&sine_stereo(1000.0, 0.02, 48000, 2.0))
            .unwrap();
        meter
            .add_frames(&sine_stereo(1000.0, 0.2, 48000, 2.0))
            .unwrap();
        meter
            .add_frames(&sine_stereo(1000.0, 0.02, 48000, 2.0))
            .unwrap();

        let max = meter.max_momentary().unwrap();
        let now = meter.loudness_momentary().unwrap();
        assert!(max > now + 15.0, "max {max} vs current {now}");
    }

    #[test]
    fn test_multiple_requires_mode_everywhere() {
        let with_i = LoudnessMeter::new(48000, 2, Mode::I).unwrap();
        let without_i = LoudnessMeter::new(48000, 2, Mode::S).unwrap();
        assert!(matches!(
            loudness_global_multiple(&[&with_i, &without_i]),
            Err(MeterError::InvalidMode { .. })
        ));
    }

    #[test]
    fn test_relative_threshold() {
        let mut meter = LoudnessMeter::new(48000, 2, Mode::I).unwrap();
        assert_eq!(meter.relative_threshold().unwrap(), f64::NEG_INFINITY);

        meter
            .add_frames(&sine_stereo(1000.0, 0.1, 48000, 5.0))
            .unwrap();
        let threshold = meter.relative_threshold().unwrap();
        let integrated = meter.loudness_global().unwrap();
        assert!((threshold - (integrated - 10.0)).abs() < 0.5);
    }
}
