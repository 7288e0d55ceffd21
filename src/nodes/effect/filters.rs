//! Small filters used by the upmixer

use core::f64::consts::PI;

use dasp_ring_buffer::Fixed;

/// Below this, filter memories are flushed to zero
const DENORMAL_FLOOR: f64 = 1e-30;

#[inline]
fn flush(x: f64) -> f64 {
    if x.abs() < DENORMAL_FLOOR {
        0.0
    } else {
        x
    }
}

/// Direct form I biquad (RBJ cookbook coefficients)
#[derive(Clone, Debug)]
pub struct Biquad {
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,
    x1: f64,
    x2: f64,
    y1: f64,
    y2: f64,
}

impl Biquad {
    /// Second-order low-pass at `cutoff` Hz with quality factor `q`
    pub fn lowpass(cutoff: f32, q: f32, sample_rate: u32) -> Self {
        let w0 = 2.0 * PI * cutoff as f64 / sample_rate as f64;
        let cos_w0 = w0.cos();
        let alpha = w0.sin() / (2.0 * q as f64);

        let a0 = 1.0 + alpha;
        let b1 = (1.0 - cos_w0) / a0;

        Self {
            b0: b1 * 0.5,
            b1,
            b2: b1 * 0.5,
            a1: (-2.0 * cos_w0) / a0,
            a2: (1.0 - alpha) / a0,
            x1: 0.0,
            x2: 0.0,
            y1: 0.0,
            y2: 0.0,
        }
    }

    #[inline]
    pub fn process(&mut self, x: f32) -> f32 {
        let x = x as f64;
        let y = self.b0 * x + self.b1 * self.x1 + self.b2 * self.x2 - self.a1 * self.y1 - self.a2 * self.y2;
        self.x2 = self.x1;
        self.x1 = x;
        self.y2 = self.y1;
        self.y1 = flush(y);
        y as f32
    }

    pub fn reset(&mut self) {
        self.x1 = 0.0;
        self.x2 = 0.0;
        self.y1 = 0.0;
        self.y2 = 0.0;
    }
}

/// 4th-order Butterworth low-pass built from two cascaded biquads
#[derive(Clone, Debug)]
pub struct LowPass4 {
    stages: [Biquad; 2],
}

impl LowPass4 {
    pub fn butterworth(cutoff: f32, sample_rate: u32) -> Self {
        // pole-pair Qs of a 4th order Butterworth: 1 / (2 cos(pi/8)), 1 / (2 cos(3pi/8))
        let q1 = 1.0 / (2.0 * (core::f32::consts::PI / 8.0).cos());
        let q2 = 1.0 / (2.0 * (3.0 * core::f32::consts::PI / 8.0).cos());
        Self {
            stages: [
                Biquad::lowpass(cutoff, q1, sample_rate),
                Biquad::lowpass(cutoff, q2, sample_rate),
            ],
        }
    }

    #[inline]
    pub fn process(&mut self, x: f32) -> f32 {
        let y = self.stages[0].process(x);
        self.stages[1].process(y)
    }

    pub fn reset(&mut self) {
        self.stages.iter_mut().for_each(Biquad::reset);
    }
}

/// First-order all-pass: flat magnitude, frequency-dependent phase shift
#[derive(Clone, Debug)]
pub struct AllPass1 {
    coeff: f32,
    x1: f32,
    y1: f32,
}

impl AllPass1 {
    /// `coeff` must be in `(-1, 1)`
    pub fn new(coeff: f32) -> Self {
        Self { coeff: coeff.clamp(-0.99, 0.99), x1: 0.0, y1: 0.0 }
    }

    #[inline]
    pub fn process(&mut self, x: f32) -> f32 {
        let y = -self.coeff * x + self.x1 + self.coeff * self.y1;
        self.x1 = x;
        self.y1 = if y.is_subnormal() { 0.0 } else { y };
        y
    }

    pub fn reset(&mut self) {
        self.x1 = 0.0;
        self.y1 = 0.0;
    }
}

/// Fixed integer delay
pub struct DelayLine {
    ring: Option<Fixed<Vec<f32>>>,
}

impl DelayLine {
    /// A delay of `samples` samples; zero passes audio straight through
    pub fn new(samples: usize) -> Self {
        let ring = (samples > 0).then(|| Fixed::from(vec![0.0; samples]));
        Self { ring }
    }

    /// A delay of `ms` milliseconds, rounded down to whole samples
    pub fn from_ms(ms: f32, sample_rate: u32) -> Self {
        Self::new((ms.max(0.0) / 1000.0 * sample_rate as f32) as usize)
    }

    pub fn len(&self) -> usize {
        self.ring.as_ref().map_or(0, |r| r.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn process(&mut self, x: f32) -> f32 {
        match self.ring.as_mut() {
            // push hands back the sample written `len` pushes ago
            Some(ring) => ring.push(x),
            None => x,
        }
    }

    pub fn reset(&mut self) {
        if let Some(ring) = self.ring.as_mut() {
            ring.iter_mut().for_each(|s| *s = 0.0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rms(samples: &[f32]) -> f32 {
        (samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32).sqrt()
    }

    fn sine(freq: f32, sample_rate: u32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| (core::f32::consts::TAU * freq * i as f32 / sample_rate as f32).sin())
            .collect()
    }

    #[test]
    fn delay_line_delays() {
        let mut delay = DelayLine::new(3);
        let out: Vec<f32> = [1.0, 2.0, 3.0, 4.0, 5.0].iter().map(|&x| delay.process(x)).collect();
        assert_eq!(out, vec![0.0, 0.0, 0.0, 1.0, 2.0]);
        delay.reset();
        assert_eq!(delay.process(9.0), 0.0);
    }

    #[test]
    fn zero_delay_passes_through() {
        let mut delay = DelayLine::new(0);
        assert!(delay.is_empty());
        assert_eq!(delay.process(0.5), 0.5);
        assert_eq!(DelayLine::from_ms(5.0, 48000).len(), 240);
    }

    #[test]
    fn lowpass_keeps_bass_and_removes_treble() {
        let sr = 48000;
        let mut bass = LowPass4::butterworth(80.0, sr);
        let mut treble = LowPass4::butterworth(80.0, sr);

        let low: Vec<f32> = sine(30.0, sr, 48000).into_iter().map(|x| bass.process(x)).collect();
        let high: Vec<f32> = sine(2000.0, sr, 48000).into_iter().map(|x| treble.process(x)).collect();

        // skip the settling time
        let low_rms = rms(&low[24000..]);
        let high_rms = rms(&high[24000..]);
        assert!(low_rms > 0.6, "30 Hz attenuated too much: {low_rms}");
        assert!(high_rms < 1e-3, "2 kHz leaked through: {high_rms}");
    }

    #[test]
    fn allpass_preserves_energy() {
        let input = sine(1000.0, 48000, 48000);
        let mut ap = AllPass1::new(0.6);
        let out: Vec<f32> = input.iter().map(|&x| ap.process(x)).collect();
        let ratio = rms(&out[1000..]) / rms(&input[1000..]);
        assert!((ratio - 1.0).abs() < 0.01, "all-pass changed level by {ratio}");
        assert_ne!(out[100..200], input[100..200]);
    }
}
