//! Frequency-domain perturbations: FFT phase scrambling and DCT coefficient noise

use std::f64::consts::PI;
use std::sync::Arc;

use rand::{rngs::SmallRng, Rng};
use realfft::{ComplexToReal, RealFftPlanner, RealToComplex};
use rustfft::{num_complex::Complex, Fft, FftPlanner};

use crate::{
    effects::Effect,
    error::{EffectError, Result},
    video::types::{Frame, FrameContext},
};

/// Separable 2D FFT over a row-major `height x width` complex grid
pub struct Fft2d {
    width: usize,
    height: usize,
    row_forward: Arc<dyn Fft<f64>>,
    col_forward: Arc<dyn Fft<f64>>,
    row_inverse: Arc<dyn Fft<f64>>,
    col_inverse: Arc<dyn Fft<f64>>,
}

impl Fft2d {
    pub fn new(width: usize, height: usize) -> Self {
        let mut planner = FftPlanner::new();
        Self {
            width,
            height,
            row_forward: planner.plan_fft_forward(width),
            col_forward: planner.plan_fft_forward(height),
            row_inverse: planner.plan_fft_inverse(width),
            col_inverse: planner.plan_fft_inverse(height),
        }
    }

    pub fn forward(&self, data: &mut [Complex<f64>]) {
        self.row_forward.process(data);
        let mut columns = transpose(data, self.width, self.height);
        self.col_forward.process(&mut columns);
        data.copy_from_slice(&transpose(&columns, self.height, self.width));
    }

    /// Normalized inverse, so `inverse(forward(x)) == x`
    pub fn inverse(&self, data: &mut [Complex<f64>]) {
        let mut columns = transpose(data, self.width, self.height);
        self.col_inverse.process(&mut columns);
        data.copy_from_slice(&transpose(&columns, self.height, self.width));
        self.row_inverse.process(data);

        let scale = 1.0 / (self.width * self.height) as f64;
        data.iter_mut().for_each(|c| *c *= scale);
    }
}

fn transpose<T: Copy + Default>(data: &[T], width: usize, height: usize) -> Vec<T> {
    let mut out = vec![T::default(); data.len()];
    for y in 0..height {
        for x in 0..width {
            out[x * height + y] = data[y * width + x];
        }
    }
    out
}

/// Add uniform noise in `[-bound, bound]` to every bin's phase, keeping its magnitude
pub fn scramble_spectrum(spectrum: &mut [Complex<f64>], bound: f64, rng: &mut SmallRng) {
    for bin in spectrum.iter_mut() {
        let (magnitude, phase) = bin.to_polar();
        let jitter = rng.gen_range(-bound..=bound);
        *bin = Complex::from_polar(magnitude, phase + jitter);
    }
}

/// Per-channel FFT phase scramble
///
/// Each channel is transformed, its phase jittered by at most `frequency`
/// radians per bin, and rebuilt as the magnitude of the inverse transform.
pub struct PhaseScramble {
    pub frequency: f32,
}

impl Effect for PhaseScramble {
    fn name(&self) -> &str {
        "phase_scramble"
    }

    fn apply(&self, frame: &mut Frame, _ctx: &FrameContext, rng: &mut SmallRng) -> Result<()> {
        if self.frequency <= 0.0 {
            return Ok(());
        }

        let (width, height) = frame.dimensions();
        let (w, h) = (width as usize, height as usize);
        let fft = Fft2d::new(w, h);
        let image = frame.as_image_mut();

        for c in 0..3 {
            let mut grid: Vec<Complex<f64>> = image
                .pixels()
                .map(|p| Complex::new(p.0[c] as f64, 0.0))
                .collect();

            fft.forward(&mut grid);
            scramble_spectrum(&mut grid, self.frequency as f64, rng);
            fft.inverse(&mut grid);

            for (pixel, value) in image.pixels_mut().zip(grid.iter()) {
                pixel.0[c] = value.norm().min(255.0) as u8;
            }
        }
        Ok(())
    }
}

/// Orthonormal DCT-II / DCT-III of a fixed length, computed through a real FFT
/// of the even-symmetric extension
pub struct Dct1d {
    len: usize,
    forward: Arc<dyn RealToComplex<f64>>,
    inverse: Arc<dyn ComplexToReal<f64>>,
    twiddles: Vec<Complex<f64>>,
}

impl Dct1d {
    pub fn new(len: usize) -> Self {
        let mut planner = RealFftPlanner::<f64>::new();
        let twiddles = (0..len)
            .map(|k| Complex::from_polar(1.0, -PI * k as f64 / (2 * len) as f64))
            .collect();
        Self {
            len,
            forward: planner.plan_fft_forward(2 * len),
            inverse: planner.plan_fft_inverse(2 * len),
            twiddles,
        }
    }

    fn scale(&self, k: usize) -> f64 {
        let n = self.len as f64;
        if k == 0 {
            (1.0 / n).sqrt()
        } else {
            (2.0 / n).sqrt()
        }
    }

    /// DCT-II of `data` in place
    pub fn forward(&self, data: &mut [f64]) -> Result<()> {
        let n = self.len;
        let mut input = self.forward.make_input_vec();
        input[..n].copy_from_slice(data);
        for i in 0..n {
            input[2 * n - 1 - i] = data[i];
        }

        let mut spectrum = self.forward.make_output_vec();
        self.forward
            .process(&mut input, &mut spectrum)
            .map_err(|e| EffectError::precondition("dct", e.to_string()))?;

        for k in 0..n {
            data[k] = (spectrum[k] * self.twiddles[k]).re * 0.5 * self.scale(k);
        }
        Ok(())
    }

    /// DCT-III (inverse of [`Dct1d::forward`]) of `data` in place
    pub fn inverse(&self, data: &mut [f64]) -> Result<()> {
        let n = self.len;
        let mut spectrum = self.inverse.make_input_vec();
        spectrum[0] = Complex::new(data[0] * self.scale(0), 0.0);
        for k in 1..n {
            spectrum[k] = self.twiddles[k].conj() * (data[k] * self.scale(k) * 0.5);
        }
        spectrum[n] = Complex::new(0.0, 0.0);

        let mut output = self.inverse.make_output_vec();
        self.inverse
            .process(&mut spectrum, &mut output)
            .map_err(|e| EffectError::precondition("dct", e.to_string()))?;

        data.copy_from_slice(&output[..n]);
        Ok(())
    }
}

/// Separable 2D DCT over a row-major `height x width` grid
pub struct Dct2d {
    width: usize,
    height: usize,
    rows: Dct1d,
    cols: Dct1d,
}

impl Dct2d {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            rows: Dct1d::new(width),
            cols: Dct1d::new(height),
        }
    }

    pub fn forward(&self, data: &mut [f64]) -> Result<()> {
        for row in data.chunks_exact_mut(self.width) {
            self.rows.forward(row)?;
        }
        let mut columns = transpose(data, self.width, self.height);
        for column in columns.chunks_exact_mut(self.height) {
            self.cols.forward(column)?;
        }
        data.copy_from_slice(&transpose(&columns, self.height, self.width));
        Ok(())
    }

    pub fn inverse(&self, data: &mut [f64]) -> Result<()> {
        let mut columns = transpose(data, self.width, self.height);
        for column in columns.chunks_exact_mut(self.height) {
            self.cols.inverse(column)?;
        }
        data.copy_from_slice(&transpose(&columns, self.height, self.width));
        for row in data.chunks_exact_mut(self.width) {
            self.rows.inverse(row)?;
        }
        Ok(())
    }
}

/// Uniform noise on the high-frequency DCT coefficients of every channel
///
/// Only coefficients with `row >= h/4` and `col >= w/4` are touched, which
/// leaves the perceptually dominant low frequencies alone.
pub struct DctPerturbation {
    pub strength: f32,
}

impl Effect for DctPerturbation {
    fn name(&self) -> &str {
        "dct_perturbation"
    }

    fn apply(&self, frame: &mut Frame, _ctx: &FrameContext, rng: &mut SmallRng) -> Result<()> {
        let (width, height) = frame.dimensions();
        let (w, h) = (width as usize, height as usize);
        if w < 2 || h < 2 {
            return Err(EffectError::precondition("dct_perturbation", "frame too small").into());
        }

        let dct = Dct2d::new(w, h);
        let amplitude = self.strength as f64 * 255.0;
        let mut planes = Vec::with_capacity(3);

        for c in 0..3 {
            let mut plane: Vec<f64> = frame.as_image().pixels().map(|p| p.0[c] as f64).collect();
            dct.forward(&mut plane)?;
            if amplitude > 0.0 {
                for y in h / 4..h {
                    for x in w / 4..w {
                        plane[y * w + x] += rng.gen_range(-amplitude..=amplitude);
                    }
                }
            }
            dct.inverse(&mut plane)?;
            planes.push(plane);
        }

        for (i, pixel) in frame.as_image_mut().pixels_mut().enumerate() {
            for c in 0..3 {
                pixel.0[c] = planes[c][i].round().clamp(0.0, 255.0) as u8;
            }
        }
        Ok(())
    }
}
