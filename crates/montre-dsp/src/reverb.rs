//! The global reverberator.
//!
//! A pre-delay line feeds eight parallel lanes, each a diffusing comb
//! followed by an allpass, with an 8-point Walsh-Hadamard mix between the
//! stages. Every delay element applies frequency-dependent decay through a
//! low and a high shelf, so T60 can be longer in the lows and shorter in the
//! highs the way halls behave.

use std::f32::consts::PI;

/// First/second stage delay lengths, mutually prime.
const SIZES: [usize; 16] = [
    839, 5893, //
    1181, 6158, //
    1229, 6780, //
    2477, 6254, //
    2731, 6790, //
    1361, 9020, //
    3203, 8118, //
    1949, 10398,
];

/// Per-element feedback coefficients.
const FEEDB: [f32; 16] = [
    -0.6, 0.1, //
    0.6, 0.1, //
    0.6, 0.1, //
    -0.6, 0.1, //
    0.6, 0.1, //
    -0.6, 0.1, //
    -0.6, 0.1, //
    0.6, 0.1,
];

/// One recirculating delay with shelved decay.
#[derive(Debug)]
struct DelayElement {
    line: Vec<f32>,
    i: usize,
    fb: f32,
    gmf: f32,
    glo: f32,
    wlo: f32,
    whi: f32,
    slo: f32,
    shi: f32,
}

impl DelayElement {
    fn new(size: usize, fb: f32) -> Self {
        Self {
            line: vec![0.0; size],
            i: 0,
            fb,
            gmf: 0.0,
            glo: 0.0,
            wlo: 0.0,
            whi: 0.0,
            slo: 0.0,
            shi: 0.0,
        }
    }

    /// Mid-band gain for a T60 of `tmf` samples.
    fn set_t60mf(&mut self, tmf: f32) {
        self.gmf = 0.001f32.powf(self.line.len() as f32 / tmf);
    }

    /// Low-shelf boost for a low-band T60 of `tlo` samples at one-pole
    /// weight `wlo`.
    fn set_t60lo(&mut self, tlo: f32, wlo: f32) {
        self.glo = 0.001f32.powf(self.line.len() as f32 / tlo) / self.gmf - 1.0;
        self.wlo = wlo;
    }

    /// High-shelf cut for a high-band T60 of `thi` samples; `chi` is
    /// `1 - cos(2*pi*fhi/fs)`.
    fn set_t60hi(&mut self, thi: f32, chi: f32) {
        let g = 0.001f32.powf(self.line.len() as f32 / thi) / self.gmf;
        let t = (1.0 - g * g) / (2.0 * g * g * chi);
        self.whi = ((1.0 + 4.0 * t).sqrt() - 1.0) / (2.0 * t);
    }

    #[inline]
    fn process(&mut self, x: f32) -> f32 {
        let mut t = self.line[self.i] * self.gmf;
        self.slo += self.wlo * (t - self.slo);
        t += self.glo * self.slo;
        self.shi += self.whi * (t - self.shi);
        // The 1e-10 injection keeps the recirculation out of denormals.
        let t = x - self.fb * self.shi + 1e-10;
        self.line[self.i] = t;
        self.i += 1;
        if self.i == self.line.len() {
            self.i = 0;
        }
        self.shi + self.fb * t
    }
}

/// The eight-lane hall reverberator.
pub struct Reverb {
    line: Vec<f32>,
    idel: usize,
    i: usize,
    delm: Vec<DelayElement>,
    rate: f32,
    gain: f32,
    x: [f32; 8],
    z: f32,
}

impl Reverb {
    pub fn new(rate: f32) -> Self {
        let size = (0.15 * rate) as usize;
        let m = if rate < 64_000.0 { 1 } else { 2 };
        let delm = SIZES
            .iter()
            .zip(FEEDB)
            .map(|(&s, fb)| DelayElement::new(m * s, fb))
            .collect();
        let mut r = Self {
            line: vec![0.0; size],
            idel: 0,
            i: 0,
            delm,
            rate,
            gain: 1.0,
            x: [0.0; 8],
            z: 0.0,
        };
        r.set_delay(0.05);
        r.set_t60mf(4.0);
        r.set_t60lo(5.0, 250.0);
        r.set_t60hi(2.0, 4e3);
        r
    }

    /// Pre-delay in seconds, capped by the line length.
    pub fn set_delay(&mut self, del: f32) {
        self.idel = ((self.rate * del.max(0.01)) as usize).min(self.line.len());
    }

    /// Mid-band T60 in seconds. Output gain compensates so longer tails do
    /// not read louder.
    pub fn set_t60mf(&mut self, tmf: f32) {
        let t = tmf * self.rate;
        for d in &mut self.delm {
            d.set_t60mf(t);
        }
        self.gain = 1.0 / tmf.sqrt();
    }

    /// Low-band T60 in seconds below the shelf frequency `flo`.
    pub fn set_t60lo(&mut self, tlo: f32, flo: f32) {
        let t = tlo * self.rate;
        let w = 2.0 * PI * flo / self.rate;
        for d in &mut self.delm {
            d.set_t60lo(t, w);
        }
    }

    /// High-band T60 in seconds above the shelf frequency `fhi`.
    pub fn set_t60hi(&mut self, thi: f32, fhi: f32) {
        let t = thi * self.rate;
        let c = 1.0 - (2.0 * PI * fhi / self.rate).cos();
        for d in &mut self.delm {
            d.set_t60hi(t, c);
        }
    }

    /// Consume the reverb send `r` and add the tail into the B-format
    /// busses.
    pub fn process(
        &mut self,
        n: usize,
        gain: f32,
        r: &[f32],
        w: &mut [f32],
        x: &mut [f32],
        y: &mut [f32],
        z: &mut [f32],
    ) {
        let g = 0.125f32.sqrt();
        let gain = gain * self.gain;

        let len = self.line.len();
        let idel = self.idel;
        let line = &mut self.line;
        let delm = &mut self.delm;
        let xi = &mut self.x;
        let mut zz = self.z;
        let mut i = self.i;
        for k in 0..n.min(r.len()) {
            let j = if i >= idel { i - idel } else { i + len - idel };
            let v = line[j];

            // Light smoothing into the pre-delay keeps feedback leakage off.
            zz += 0.6 * (r[k] - zz) + 1e-10;
            line[i] = zz;
            i += 1;
            if i == len {
                i = 0;
            }

            for (lane, xv) in xi.iter_mut().enumerate() {
                *xv = delm[2 * lane].process(g * *xv + v);
            }

            // Walsh-Hadamard mixing: three sweeps over disjoint pairs.
            for stride in [1usize, 2, 4] {
                let mut a = 0;
                while a < 8 {
                    for b in a..a + stride {
                        let t = xi[b] - xi[b + stride];
                        xi[b] += xi[b + stride];
                        xi[b + stride] = t;
                    }
                    a += 2 * stride;
                }
            }

            w[k] += 1.25 * gain * xi[0];
            x[k] += gain * (xi[1] - 0.05 * xi[2]);
            y[k] += gain * xi[2];
            z[k] += gain * xi[4];

            for (lane, xv) in xi.iter_mut().enumerate() {
                *xv = delm[2 * lane + 1].process(*xv);
            }
        }
        self.i = i;
        self.z = zz;
    }
}
