//! K-weighting pre-filter (ITU-R BS.1770).
//!
//! Two cascaded biquad stages applied to each channel independently:
//! 1. High-shelf boosting frequencies above ~1681 Hz by +4 dB.
//! 2. High-pass removing content below ~38 Hz.
//!
//! Coefficients are derived from the analog prototype at construction time
//! via the bilinear transform with frequency pre-warping, so the filter is
//! correct at any supported sample rate.

use std::f64::consts::PI;

/// Biquad filter coefficients, `a0` normalized to 1.
#[derive(Debug, Clone, Copy)]
pub struct BiquadCoeffs {
    /// Feedforward coefficient b0.
    pub b0: f64,
    /// Feedforward coefficient b1.
    pub b1: f64,
    /// Feedforward coefficient b2.
    pub b2: f64,
    /// Feedback coefficient a1.
    pub a1: f64,
    /// Feedback coefficient a2.
    pub a2: f64,
}

impl BiquadCoeffs {
    /// High-shelf stage of the K-weighting pre-filter.
    ///
    /// Analog prototype constants from ITU-R BS.1770-4, discretized for the
    /// given sample rate by pre-warping the center frequency.
    pub fn k_weighting_shelf(sample_rate: u32) -> Self {
        let fc = 1681.974450955533;
        let gain_db = 3.999843853973347;
        let q = 0.7071752369554196;

        let k = (PI * fc / sample_rate as f64).tan();
        let k2 = k * k;
        let v0 = 10.0_f64.powf(gain_db / 20.0);
        let vb = v0.powf(0.4996667741545416);

        let a0 = 1.0 + k / q + k2;
        Self {
            b0: (v0 + vb * k / q + k2) / a0,
            b1: 2.0 * (k2 - v0) / a0,
            b2: (v0 - vb * k / q + k2) / a0,
            a1: 2.0 * (k2 - 1.0) / a0,
            a2: (1.0 - k / q + k2) / a0,
        }
    }

    /// High-pass stage of the K-weighting pre-filter.
    pub fn k_weighting_highpass(sample_rate: u32) -> Self {
        let fc = 38.13547087602444;
        let q = 0.5003270373238773;

        let k = (PI * fc / sample_rate as f64).tan();
        let k2 = k * k;

        // The RLB feedforward stays unscaled; only the feedback side is
        // normalized by a0. The symmetric (1, -2, 1) zeros cancel a constant
        // input exactly.
        let a0 = 1.0 + k / q + k2;
        Self {
            b0: 1.0,
            b1: -2.0,
            b2: 1.0,
            a1: 2.0 * (k2 - 1.0) / a0,
            a2: (1.0 - k / q + k2) / a0,
        }
    }
}

/// Biquad delay-line state for a single channel.
#[derive(Debug, Clone, Copy, Default)]
pub struct BiquadState {
    x1: f64,
    x2: f64,
    y1: f64,
    y2: f64,
}

impl BiquadState {
    /// Zero the delay line.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Process one sample through the difference equation
    /// `y[n] = b0*x[n] + b1*x[n-1] + b2*x[n-2] - a1*y[n-1] - a2*y[n-2]`.
    #[inline]
    pub fn process(&mut self, input: f64, coeffs: &BiquadCoeffs) -> f64 {
        let output = coeffs.b0 * input + coeffs.b1 * self.x1 + coeffs.b2 * self.x2
            - coeffs.a1 * self.y1
            - coeffs.a2 * self.y2;

        self.x2 = self.x1;
        self.x1 = input;
        self.y2 = self.y1;
        self.y1 = output;

        output
    }

    /// Flush sub-normal feedback state to zero.
    ///
    /// Sub-normal values in the recursive path cost an order of magnitude in
    /// throughput on common hardware; once the output has decayed below the
    /// smallest normal double it is silence for any measurement purpose.
    #[inline]
    pub fn flush_denormals(&mut self) {
        if self.y1.abs() < f64::MIN_POSITIVE {
            self.y1 = 0.0;
        }
        if self.y2.abs() < f64::MIN_POSITIVE {
            self.y2 = 0.0;
        }
    }
}

/// Multi-channel K-weighting filter bank.
///
/// Coefficients are shared across channels; each channel owns the delay
/// lines of both cascade stages.
#[derive(Debug, Clone)]
pub struct KWeightingFilterBank {
    shelf: BiquadCoeffs,
    highpass: BiquadCoeffs,
    /// Per-channel state, stage 1 then stage 2.
    states: Vec<[BiquadState; 2]>,
    sample_rate: u32,
}

impl KWeightingFilterBank {
    /// Build a filter bank for the given channel count and sample rate.
    ///
    /// Parameter validation happens in the meter façade; this constructor
    /// assumes a supported rate.
    pub fn new(channels: u32, sample_rate: u32) -> Self {
        debug_assert!(sample_rate > 0);
        Self {
            shelf: BiquadCoeffs::k_weighting_shelf(sample_rate),
            highpass: BiquadCoeffs::k_weighting_highpass(sample_rate),
            states: vec![[BiquadState::default(); 2]; channels as usize],
            sample_rate,
        }
    }

    /// Number of channels the bank was built for.
    pub fn channels(&self) -> u32 {
        self.states.len() as u32
    }

    /// Sample rate the coefficients were derived for.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Zero all per-channel delay lines.
    pub fn reset(&mut self) {
        for state in &mut self.states {
            state[0].reset();
            state[1].reset();
        }
    }

    /// Filter one channel's samples in place.
    ///
    /// The delay lines carry across calls, so feeding a signal in chunks is
    /// identical to feeding it whole.
    pub fn process_channel(&mut self, channel: usize, samples: &mut [f64]) {
        let [stage1, stage2] = &mut self.states[channel];
        for sample in samples.iter_mut() {
            let shelved = stage1.process(*sample, &self.shelf);
            *sample = stage2.process(shelved, &self.highpass);
        }
        stage1.flush_denormals();
        stage2.flush_denormals();
    }
}
