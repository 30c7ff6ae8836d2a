use crate::error::Error;
use ndarray::Array4;
use std::{cmp::Ordering, fmt, str::FromStr};

/// Storage type of a tensor's elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ElementType {
    Int8,
    #[serde(rename = "UINT8")]
    UInt8,
    Int32,
    #[serde(rename = "UINT32")]
    UInt32,
    Float32,
}

impl ElementType {
    pub fn size(self) -> usize {
        match self {
            Self::Int8 | Self::UInt8 => 1,
            Self::Int32 | Self::UInt32 | Self::Float32 => 4,
        }
    }

    /// Whether values of this type are stored as fixed-point and need dequantizing.
    pub fn is_quantized(self) -> bool {
        matches!(self, Self::Int8 | Self::UInt8)
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Int8 => "INT8",
            Self::UInt8 => "UINT8",
            Self::Int32 => "INT32",
            Self::UInt32 => "UINT32",
            Self::Float32 => "FLOAT32",
        };
        f.write_str(name)
    }
}

impl FromStr for ElementType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "INT8" => Ok(Self::Int8),
            "UINT8" => Ok(Self::UInt8),
            "INT32" => Ok(Self::Int32),
            "UINT32" => Ok(Self::UInt32),
            "FLOAT32" => Ok(Self::Float32),
            other => Err(format!("unknown tensor element type: {}", other)),
        }
    }
}

/// Affine parameters mapping fixed-point values back to real values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quantization {
    pub offset: f64,
    pub scale: f64,
}

impl Quantization {
    pub const IDENTITY: Self = Self {
        offset: 0.0,
        scale: 1.0,
    };

    pub fn new(offset: f64, scale: f64) -> Self {
        Self { offset, scale }
    }
}

impl Default for Quantization {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// A read-only view over one output buffer of an inference engine.
///
/// Data are laid out row-major according to the dimensions, in native byte order.
#[derive(Debug, Clone)]
pub struct Tensor<'a> {
    element_type: ElementType,
    dims: Vec<usize>,
    data: &'a [u8],
    quantization: Quantization,
}

impl<'a> Tensor<'a> {
    pub fn new(element_type: ElementType, dims: Vec<usize>, data: &'a [u8]) -> Result<Self, Error> {
        let expected = dims.iter().product::<usize>() * element_type.size();
        if data.len() != expected {
            return Err(Error::TensorSize {
                dims,
                element_type,
                expected,
                got: data.len(),
            });
        }
        Ok(Self {
            element_type,
            dims,
            data,
            quantization: Quantization::IDENTITY,
        })
    }

    pub fn with_quantization(mut self, quantization: Quantization) -> Self {
        self.quantization = quantization;
        self
    }

    pub fn element_type(&self) -> ElementType {
        self.element_type
    }

    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    pub fn num_dims(&self) -> usize {
        self.dims.len()
    }

    pub fn dim(&self, index: usize) -> Result<usize, Error> {
        self.dims
            .get(index)
            .copied()
            .ok_or_else(|| Error::GetDim(index, self.dims.len()))
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.data.len() / self.element_type.size()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn quantization(&self) -> Quantization {
        self.quantization
    }

    fn word(&self, index: usize) -> [u8; 4] {
        let mut word = [0; 4];
        word.copy_from_slice(&self.data[index * 4..index * 4 + 4]);
        word
    }

    /// The stored value at `index`, without dequantization.
    pub fn raw(&self, index: usize) -> f64 {
        match self.element_type {
            ElementType::Int8 => f64::from(self.data[index] as i8),
            ElementType::UInt8 => f64::from(self.data[index]),
            ElementType::Int32 => f64::from(i32::from_ne_bytes(self.word(index))),
            ElementType::UInt32 => f64::from(u32::from_ne_bytes(self.word(index))),
            ElementType::Float32 => f64::from(f32::from_ne_bytes(self.word(index))),
        }
    }

    /// The real value at `index`.
    ///
    /// 8-bit fixed-point values are mapped through `(raw - offset) * scale`, all
    /// other types are returned as stored.
    pub fn value(&self, index: usize, quantization: Quantization) -> f64 {
        let raw = self.raw(index);
        if self.element_type.is_quantized() {
            (raw - quantization.offset) * quantization.scale
        } else {
            raw
        }
    }

    /// Compare two stored values without dequantizing them.
    pub fn compare(&self, left: usize, right: usize) -> Ordering {
        self.raw(left)
            .partial_cmp(&self.raw(right))
            .unwrap_or(Ordering::Equal)
    }

    /// Dequantize a rank 4 tensor into an owned array.
    pub fn to_array4(&self, quantization: Quantization) -> Result<Array4<f32>, Error> {
        let shape = match *self.dims.as_slice() {
            [d0, d1, d2, d3] => (d0, d1, d2, d3),
            _ => return Err(Error::UnsupportedLayout(self.dims.clone())),
        };
        let values = (0..self.len())
            .map(|index| self.value(index, quantization) as f32)
            .collect();
        Array4::from_shape_vec(shape, values).map_err(Error::ConstructArray)
    }
}
