//! NNUE network weights: a quantized input layer plus two small dense
//! layers, loaded from a binary weight file.

use std::io::Read;
use std::path::Path;

/// Fixed-point scale of the quantized input layer.
pub const QUANT_SCALE: i32 = 64;

/// File magic, little-endian `"SNNW"`.
const MAGIC: u32 = 0x574e_4e53;

/// Errors from loading a weight file.
#[derive(Debug, thiserror::Error)]
pub enum NnueError {
    /// The file could not be read.
    #[error("cannot read weight file: {0}")]
    Io(#[from] std::io::Error),
    /// The file does not start with the expected magic.
    #[error("not an NNUE weight file (bad magic {found:#x})")]
    BadMagic {
        /// The magic value found.
        found: u32,
    },
    /// The file ended before all declared weights were read.
    #[error("weight file truncated")]
    Truncated,
    /// Declared dimensions do not match the expected input size.
    #[error("weight file is for {found} inputs, expected {expected}")]
    WrongInputs {
        /// Input count in the file.
        found: usize,
        /// Input count required by the board size.
        expected: usize,
    },
}

/// Quantized first layer: `i16` weights, `i32` bias and accumulator.
///
/// Weights are stored row-major per feature, so adding a feature to the
/// accumulator is one contiguous row addition.
#[derive(Debug, Clone)]
pub struct QuantizedLayer {
    pub inputs: usize,
    pub neurons: usize,
    /// `inputs * neurons` weights, feature-major.
    pub weights: Vec<i16>,
    pub bias: Vec<i32>,
}

impl QuantizedLayer {
    /// The weight row of one feature.
    #[inline]
    pub fn row(&self, feature: usize) -> &[i16] {
        &self.weights[feature * self.neurons..(feature + 1) * self.neurons]
    }
}

/// Real-valued dense layer.
#[derive(Debug, Clone)]
pub struct DenseLayer {
    pub inputs: usize,
    pub neurons: usize,
    /// `inputs * neurons` weights, input-major.
    pub weights: Vec<f32>,
    pub bias: Vec<f32>,
}

impl DenseLayer {
    /// `output = weights^T * input + bias`, no activation.
    pub fn forward(&self, input: &[f32], output: &mut [f32]) {
        debug_assert_eq!(input.len(), self.inputs);
        debug_assert_eq!(output.len(), self.neurons);
        output.copy_from_slice(&self.bias);
        for (i, &x) in input.iter().enumerate() {
            if x == 0.0 {
                continue;
            }
            let row = &self.weights[i * self.neurons..(i + 1) * self.neurons];
            for (out, &w) in output.iter_mut().zip(row) {
                *out += x * w;
            }
        }
    }
}

/// Complete weight set for one rule variant.
#[derive(Debug, Clone)]
pub struct NnueWeights {
    pub layer_1: QuantizedLayer,
    pub layer_2: DenseLayer,
    pub layer_3: DenseLayer,
}

impl NnueWeights {
    /// Load weights from a binary file.
    ///
    /// Layout (little-endian): magic, three `u32` dimensions
    /// `(inputs, hidden_1, hidden_2)`, then layer 1 weights (`i16`) and
    /// bias (`i32`), layer 2 weights and bias (`f32`), layer 3 weights
    /// and bias (`f32`, one output neuron).
    pub fn load(path: &Path, expected_inputs: usize) -> Result<NnueWeights, NnueError> {
        let mut bytes = Vec::new();
        std::fs::File::open(path)?.read_to_end(&mut bytes)?;
        let mut reader = ByteReader { bytes: &bytes, pos: 0 };

        let magic = reader.u32()?;
        if magic != MAGIC {
            return Err(NnueError::BadMagic { found: magic });
        }
        let inputs = reader.u32()? as usize;
        let hidden_1 = reader.u32()? as usize;
        let hidden_2 = reader.u32()? as usize;
        if inputs != expected_inputs {
            return Err(NnueError::WrongInputs { found: inputs, expected: expected_inputs });
        }

        let layer_1 = QuantizedLayer {
            inputs,
            neurons: hidden_1,
            weights: reader.i16_vec(inputs * hidden_1)?,
            bias: reader.i32_vec(hidden_1)?,
        };
        let layer_2 = DenseLayer {
            inputs: hidden_1,
            neurons: hidden_2,
            weights: reader.f32_vec(hidden_1 * hidden_2)?,
            bias: reader.f32_vec(hidden_2)?,
        };
        let layer_3 = DenseLayer {
            inputs: hidden_2,
            neurons: 1,
            weights: reader.f32_vec(hidden_2)?,
            bias: reader.f32_vec(1)?,
        };
        Ok(NnueWeights { layer_1, layer_2, layer_3 })
    }

    /// All-zero weights of the given shape. Test helper; the forward
    /// pass then always yields the sigmoid midpoint.
    pub fn zeroed(inputs: usize, hidden_1: usize, hidden_2: usize) -> NnueWeights {
        NnueWeights {
            layer_1: QuantizedLayer {
                inputs,
                neurons: hidden_1,
                weights: vec![0; inputs * hidden_1],
                bias: vec![0; hidden_1],
            },
            layer_2: DenseLayer {
                inputs: hidden_1,
                neurons: hidden_2,
                weights: vec![0.0; hidden_1 * hidden_2],
                bias: vec![0.0; hidden_2],
            },
            layer_3: DenseLayer {
                inputs: hidden_2,
                neurons: 1,
                weights: vec![0.0; hidden_2],
                bias: vec![0.0; 1],
            },
        }
    }
}

struct ByteReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl ByteReader<'_> {
    fn take(&mut self, count: usize) -> Result<&[u8], NnueError> {
        if self.pos + count > self.bytes.len() {
            return Err(NnueError::Truncated);
        }
        let slice = &self.bytes[self.pos..self.pos + count];
        self.pos += count;
        Ok(slice)
    }

    fn u32(&mut self) -> Result<u32, NnueError> {
        let bytes = self.take(4)?;
        Ok(u32::from_le_bytes(bytes.try_into().unwrap()))
    }

    fn i16_vec(&mut self, count: usize) -> Result<Vec<i16>, NnueError> {
        let bytes = self.take(count * 2)?;
        Ok(bytes.chunks_exact(2).map(|c| i16::from_le_bytes([c[0], c[1]])).collect())
    }

    fn i32_vec(&mut self, count: usize) -> Result<Vec<i32>, NnueError> {
        let bytes = self.take(count * 4)?;
        Ok(bytes.chunks_exact(4).map(|c| i32::from_le_bytes([c[0], c[1], c[2], c[3]])).collect())
    }

    fn f32_vec(&mut self, count: usize) -> Result<Vec<f32>, NnueError> {
        let bytes = self.take(count * 4)?;
        Ok(bytes.chunks_exact(4).map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]])).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dense_layer_forward() {
        let layer = DenseLayer {
            inputs: 2,
            neurons: 2,
            weights: vec![1.0, 2.0, 3.0, 4.0],
            bias: vec![0.5, -0.5],
        };
        let mut output = [0.0f32; 2];
        layer.forward(&[1.0, 1.0], &mut output);
        assert_eq!(output, [4.5, 5.5]);
    }

    #[test]
    fn zeroed_weights_have_consistent_shapes() {
        let weights = NnueWeights::zeroed(101, 16, 8);
        assert_eq!(weights.layer_1.weights.len(), 101 * 16);
        assert_eq!(weights.layer_1.row(100).len(), 16);
        assert_eq!(weights.layer_2.weights.len(), 16 * 8);
        assert_eq!(weights.layer_3.neurons, 1);
    }

    #[test]
    fn load_rejects_bad_magic() {
        let dir = std::env::temp_dir().join("sente-nnue-test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("bad-magic.nnue");
        std::fs::write(&path, [0u8; 16]).unwrap();
        assert!(matches!(
            NnueWeights::load(&path, 100),
            Err(NnueError::BadMagic { .. })
        ));
    }

    #[test]
    fn load_roundtrip() {
        let inputs = 5usize;
        let h1 = 3usize;
        let h2 = 2usize;
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&MAGIC.to_le_bytes());
        bytes.extend_from_slice(&(inputs as u32).to_le_bytes());
        bytes.extend_from_slice(&(h1 as u32).to_le_bytes());
        bytes.extend_from_slice(&(h2 as u32).to_le_bytes());
        for i in 0..inputs * h1 {
            bytes.extend_from_slice(&(i as i16).to_le_bytes());
        }
        for i in 0..h1 {
            bytes.extend_from_slice(&(i as i32 * 10).to_le_bytes());
        }
        for i in 0..h1 * h2 + h2 + h2 + 1 {
            bytes.extend_from_slice(&(i as f32).to_le_bytes());
        }

        let dir = std::env::temp_dir().join("sente-nnue-test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("roundtrip.nnue");
        std::fs::write(&path, &bytes).unwrap();

        let weights = NnueWeights::load(&path, inputs).unwrap();
        assert_eq!(weights.layer_1.weights[4], 4);
        assert_eq!(weights.layer_1.bias, vec![0, 10, 20]);
        assert_eq!(weights.layer_2.weights.len(), h1 * h2);
        assert_eq!(weights.layer_3.bias.len(), 1);

        assert!(matches!(
            NnueWeights::load(&path, 999),
            Err(NnueError::WrongInputs { .. })
        ));
    }
}
