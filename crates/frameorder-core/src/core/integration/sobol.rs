use super::IntegrationError;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub const MAX_DIMENSIONS: usize = 6;

const BITS: usize = 32;
const SCALE: f64 = 4294967296.0;

/// Joe-Kuo primitive polynomial data `(degree, coefficients, initial direction numbers)`
/// for dimensions 2 and up.
const JOE_KUO: [(usize, u32, &[u32]); MAX_DIMENSIONS - 1] = [
    (1, 0, &[1]),
    (2, 1, &[1, 3]),
    (3, 1, &[1, 3, 1]),
    (3, 2, &[1, 1, 1]),
    (4, 1, &[1, 1, 3, 3]),
];

/// A Gray-code Sobol' sequence in up to [`MAX_DIMENSIONS`] dimensions.
///
/// The all-zero first point is skipped. A non-zero digital shift XORs every coordinate with
/// a fixed random word, which keeps the low-discrepancy structure while making sequences
/// drawn for different Monte-Carlo replicas independent.
#[derive(Debug, Clone)]
pub struct SobolSequence {
    directions: Vec<[u32; BITS]>,
    state: Vec<u32>,
    shift: Vec<u32>,
    index: u64,
}

impl SobolSequence {
    pub fn new(dimensions: usize) -> Result<Self, IntegrationError> {
        if dimensions > MAX_DIMENSIONS {
            return Err(IntegrationError::TooManyDimensions {
                requested: dimensions,
                max: MAX_DIMENSIONS,
            });
        }
        let directions = (0..dimensions).map(direction_numbers).collect();
        Ok(Self {
            directions,
            state: vec![0; dimensions],
            shift: vec![0; dimensions],
            index: 0,
        })
    }

    /// Creates a digitally shifted sequence whose shift words are drawn from `seed`.
    pub fn with_shift(dimensions: usize, seed: u64) -> Result<Self, IntegrationError> {
        let mut sequence = Self::new(dimensions)?;
        let mut rng = StdRng::seed_from_u64(seed);
        for word in sequence.shift.iter_mut() {
            *word = rng.r#gen();
        }
        Ok(sequence)
    }

    pub fn dimensions(&self) -> usize {
        self.state.len()
    }

    /// Writes the next point (coordinates in `[0, 1)`) into `out`.
    pub fn next_into(&mut self, out: &mut [f64]) {
        let bit = (self.index.trailing_ones() as usize).min(BITS - 1);
        self.index += 1;
        for (d, value) in out.iter_mut().enumerate().take(self.state.len()) {
            self.state[d] ^= self.directions[d][bit];
            *value = f64::from(self.state[d] ^ self.shift[d]) / SCALE;
        }
    }
}

fn direction_numbers(dimension: usize) -> [u32; BITS] {
    let mut v = [0u32; BITS];
    if dimension == 0 {
        for (k, slot) in v.iter_mut().enumerate() {
            *slot = 1u32 << (BITS - 1 - k);
        }
        return v;
    }

    let (degree, coefficients, initial) = JOE_KUO[dimension - 1];
    for (k, m) in initial.iter().enumerate() {
        v[k] = m << (BITS - 1 - k);
    }
    for k in degree..BITS {
        let mut value = v[k - degree] ^ (v[k - degree] >> degree);
        for j in 1..degree {
            if (coefficients >> (degree - 1 - j)) & 1 == 1 {
                value ^= v[k - j];
            }
        }
        v[k] = value;
    }
    v
}
