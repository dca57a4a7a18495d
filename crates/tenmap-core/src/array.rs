//! Value arrays stored inside tensor blocks
//!
//! TenMap never performs arithmetic on block values. The only things the data
//! model needs from a numeric backend are captured by the [`Array`] trait:
//!
//! - a shape query,
//! - row-major contiguous read access,
//! - allocation of a new, zero-filled buffer of the same backend,
//! - row-major contiguous write access.
//!
//! Structural operations (merging blocks when moving keys, splitting blocks,
//! moving components) are expressed with these four primitives, so any
//! backend implementing them can be stored in a [`TensorBlock`](crate::TensorBlock).
//!
//! [`DenseArray`] is the provided backend, wrapping a dynamic-dimension
//! `f64` array from `scirs2_core`.
//!
//! # Examples
//!
//! ```
//! use tenmap_core::{Array, DenseArray};
//!
//! let array = DenseArray::from_vec(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &[2, 3]).unwrap();
//! assert_eq!(array.shape(), &[2, 3]);
//! assert_eq!(array.data()[4], 5.0);
//!
//! let other = array.create(&[4, 3]);
//! assert_eq!(other.shape(), &[4, 3]);
//! assert!(other.data().iter().all(|&v| v == 0.0));
//! ```

use scirs2_core::ndarray_ext::{ArrayD, IxDyn};
use std::any::Any;
use std::fmt;

use crate::error::{TensorError, TensorResult};

/// Minimal contract between TenMap and a dense numeric array
///
/// Implementations must always expose their data as a contiguous row-major
/// buffer of `shape.iter().product()` elements.
pub trait Array: Send + Sync + fmt::Debug {
    /// Shape of the array
    fn shape(&self) -> &[usize];

    /// Row-major contiguous view of the values
    fn data(&self) -> &[f64];

    /// Row-major contiguous mutable view of the values
    fn data_mut(&mut self) -> &mut [f64];

    /// Allocate a new zero-filled array of the same kind with the given shape
    fn create(&self, shape: &[usize]) -> Box<dyn Array>;

    /// Access to the concrete type, for downcasting
    fn as_any(&self) -> &dyn Any;

    /// Deep copy of this array, allocated through [`Array::create`]
    fn copy(&self) -> Box<dyn Array> {
        let mut copy = self.create(self.shape());
        copy.data_mut().copy_from_slice(self.data());
        copy
    }
}

/// Dense row-major `f64` array backed by `scirs2_core`
#[derive(Clone, PartialEq)]
pub struct DenseArray {
    data: ArrayD<f64>,
}

impl DenseArray {
    /// Zero-filled array with the given shape
    pub fn zeros(shape: &[usize]) -> Self {
        Self {
            data: ArrayD::zeros(IxDyn(shape)),
        }
    }

    /// Array filled with `value`
    pub fn from_elem(shape: &[usize], value: f64) -> Self {
        Self {
            data: ArrayD::from_elem(IxDyn(shape), value),
        }
    }

    /// Array from row-major values
    ///
    /// # Errors
    ///
    /// Returns [`TensorError::Array`] if `values.len()` does not match the
    /// number of elements implied by `shape`.
    pub fn from_vec(values: Vec<f64>, shape: &[usize]) -> TensorResult<Self> {
        let total: usize = shape.iter().product();
        if values.len() != total {
            return Err(TensorError::Array(format!(
                "shape {:?} requires {} elements, but got {}",
                shape,
                total,
                values.len()
            )));
        }
        let data = ArrayD::from_shape_vec(IxDyn(shape), values)
            .map_err(|e| TensorError::Array(e.to_string()))?;
        Ok(Self { data })
    }

    /// Wrap an existing array, converting it to standard (row-major) layout
    pub fn from_array(array: ArrayD<f64>) -> Self {
        let data = if array.is_standard_layout() {
            array
        } else {
            array.as_standard_layout().into_owned()
        };
        Self { data }
    }

    /// Borrow the underlying array
    pub fn as_array(&self) -> &ArrayD<f64> {
        &self.data
    }

    /// Extract the underlying array
    pub fn into_array(self) -> ArrayD<f64> {
        self.data
    }

    /// Row-major values
    pub fn as_slice(&self) -> &[f64] {
        self.data
            .as_slice()
            .expect("DenseArray is always in standard layout")
    }

    /// Box this array for storage in a block
    pub fn boxed(self) -> Box<dyn Array> {
        Box::new(self)
    }
}

impl Array for DenseArray {
    fn shape(&self) -> &[usize] {
        self.data.shape()
    }

    fn data(&self) -> &[f64] {
        self.as_slice()
    }

    fn data_mut(&mut self) -> &mut [f64] {
        self.data
            .as_slice_mut()
            .expect("DenseArray is always in standard layout")
    }

    fn create(&self, shape: &[usize]) -> Box<dyn Array> {
        Box::new(DenseArray::zeros(shape))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl fmt::Debug for DenseArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DenseArray")
            .field("shape", &self.data.shape())
            .field("data", &self.data)
            .finish()
    }
}

impl From<DenseArray> for Box<dyn Array> {
    fn from(array: DenseArray) -> Self {
        Box::new(array)
    }
}

/// Row-major strides (in elements) for `shape`
pub(crate) fn row_major_strides(shape: &[usize]) -> Vec<usize> {
    let mut strides = vec![1; shape.len()];
    for i in (0..shape.len().saturating_sub(1)).rev() {
        strides[i] = strides[i + 1] * shape[i + 1];
    }
    strides
}
