//! Dense array model shared by every container writer.
//!
//! A [`DenseArray`] is a row-major (C order) grid of one element type. The
//! constructor is the only place the shape/element-count invariant is
//! checked; every codec trusts it afterwards.

use std::fmt;

use crate::error::SampleError;

/// Element types the sample containers carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DType {
    Float32,
    Float64,
    Int32,
    Int64,
}

impl DType {
    /// Width of one element in bytes.
    pub fn element_size(self) -> usize {
        match self {
            DType::Float32 | DType::Int32 => 4,
            DType::Float64 | DType::Int64 => 8,
        }
    }

    /// NumPy array-protocol type string (always little-endian).
    pub fn numpy_descr(self) -> &'static str {
        match self {
            DType::Float32 => "<f4",
            DType::Float64 => "<f8",
            DType::Int32 => "<i4",
            DType::Int64 => "<i8",
        }
    }

    pub fn from_numpy_descr(descr: &str) -> Option<Self> {
        match descr {
            "<f4" => Some(DType::Float32),
            "<f8" => Some(DType::Float64),
            "<i4" => Some(DType::Int32),
            "<i8" => Some(DType::Int64),
            _ => None,
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DType::Float32 => "float32",
            DType::Float64 => "float64",
            DType::Int32 => "int32",
            DType::Int64 => "int64",
        };
        f.write_str(name)
    }
}

/// Typed element storage.
#[derive(Debug, Clone, PartialEq)]
pub enum ArrayData {
    Float32(Vec<f32>),
    Float64(Vec<f64>),
    Int32(Vec<i32>),
    Int64(Vec<i64>),
}

impl ArrayData {
    pub fn dtype(&self) -> DType {
        match self {
            ArrayData::Float32(_) => DType::Float32,
            ArrayData::Float64(_) => DType::Float64,
            ArrayData::Int32(_) => DType::Int32,
            ArrayData::Int64(_) => DType::Int64,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            ArrayData::Float32(values) => values.len(),
            ArrayData::Float64(values) => values.len(),
            ArrayData::Int32(values) => values.len(),
            ArrayData::Int64(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Raw little-endian element bytes in storage order.
    pub fn to_le_bytes(&self) -> Vec<u8> {
        match self {
            ArrayData::Float32(values) => encode_le(values, f32::to_le_bytes),
            ArrayData::Float64(values) => encode_le(values, f64::to_le_bytes),
            ArrayData::Int32(values) => encode_le(values, i32::to_le_bytes),
            ArrayData::Int64(values) => encode_le(values, i64::to_le_bytes),
        }
    }

    /// Rebuild typed storage from little-endian bytes.
    pub fn from_le_bytes(dtype: DType, bytes: &[u8]) -> Result<Self, SampleError> {
        if bytes.len() % dtype.element_size() != 0 {
            return Err(SampleError::Decode {
                reason: format!(
                    "{} bytes is not a whole number of {} elements",
                    bytes.len(),
                    dtype
                ),
            });
        }

        Ok(match dtype {
            DType::Float32 => ArrayData::Float32(decode_le(bytes, f32::from_le_bytes)),
            DType::Float64 => ArrayData::Float64(decode_le(bytes, f64::from_le_bytes)),
            DType::Int32 => ArrayData::Int32(decode_le(bytes, i32::from_le_bytes)),
            DType::Int64 => ArrayData::Int64(decode_le(bytes, i64::from_le_bytes)),
        })
    }
}

impl From<Vec<f32>> for ArrayData {
    fn from(values: Vec<f32>) -> Self {
        ArrayData::Float32(values)
    }
}

impl From<Vec<f64>> for ArrayData {
    fn from(values: Vec<f64>) -> Self {
        ArrayData::Float64(values)
    }
}

impl From<Vec<i32>> for ArrayData {
    fn from(values: Vec<i32>) -> Self {
        ArrayData::Int32(values)
    }
}

impl From<Vec<i64>> for ArrayData {
    fn from(values: Vec<i64>) -> Self {
        ArrayData::Int64(values)
    }
}

fn encode_le<T: Copy, const N: usize>(values: &[T], to_bytes: fn(T) -> [u8; N]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(values.len() * N);
    for value in values {
        bytes.extend_from_slice(&to_bytes(*value));
    }
    bytes
}

fn decode_le<T, const N: usize>(bytes: &[u8], from_bytes: fn([u8; N]) -> T) -> Vec<T> {
    bytes
        .chunks_exact(N)
        .map(|chunk| {
            let mut buf = [0u8; N];
            buf.copy_from_slice(chunk);
            from_bytes(buf)
        })
        .collect()
}

/// Number of elements a shape describes, or `None` if it overflows `usize`.
pub fn element_count(shape: &[usize]) -> Option<usize> {
    shape.iter().try_fold(1usize, |count, dim| count.checked_mul(*dim))
}

/// Homogeneous numeric grid with a fixed shape.
///
/// An empty shape is a scalar holding exactly one element.
#[derive(Debug, Clone, PartialEq)]
pub struct DenseArray {
    shape: Vec<usize>,
    data: ArrayData,
}

impl DenseArray {
    /// Build an array, checking that every dimension is positive and that the
    /// shape accounts for exactly the supplied elements.
    pub fn new(
        shape: impl Into<Vec<usize>>,
        data: impl Into<ArrayData>,
    ) -> Result<Self, SampleError> {
        let shape = shape.into();
        let data = data.into();
        let expected = element_count(&shape);
        if shape.contains(&0) || expected != Some(data.len()) {
            return Err(SampleError::InvalidShape {
                shape,
                elements: data.len(),
            });
        }
        Ok(Self { shape, data })
    }

    /// Rebuild an array from decoded container parts.
    pub fn from_le_bytes(
        shape: impl Into<Vec<usize>>,
        dtype: DType,
        bytes: &[u8],
    ) -> Result<Self, SampleError> {
        Self::new(shape, ArrayData::from_le_bytes(dtype, bytes)?)
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn dtype(&self) -> DType {
        self.data.dtype()
    }

    pub fn data(&self) -> &ArrayData {
        &self.data
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    /// Size of the raw element section in bytes.
    pub fn nbytes(&self) -> usize {
        self.len() * self.dtype().element_size()
    }

    pub fn to_le_bytes(&self) -> Vec<u8> {
        self.data.to_le_bytes()
    }

    /// `2x4x3`-style label used in log lines.
    pub fn shape_label(&self) -> String {
        if self.shape.is_empty() {
            return "scalar".to_string();
        }
        self.shape
            .iter()
            .map(|dim| dim.to_string())
            .collect::<Vec<_>>()
            .join("x")
    }
}
