//! # tenmap-core
//!
//! Labeled block-sparse tensors for TenMap.
//!
//! This crate provides the data model of the TenMap stack:
//!
//! - **Labels** ([`Labels`]) - named, ordered, duplicate-free sets of integer
//!   rows with O(1) row lookup
//! - **Value arrays** ([`Array`], [`DenseArray`]) - the minimal contract a
//!   numeric backend must fulfill to be stored in a block
//! - **Blocks** ([`TensorBlock`]) - one dense array with Labels on every axis,
//!   and gradients with respect to named parameters
//! - **Tensor maps** ([`TensorMap`]) - blocks indexed by unique keys, with the
//!   structural operations moving dimensions between keys, samples, components
//!   and properties
//!
//! ## Core Principles
//!
//! ### Validated construction
//!
//! Every invariant (unique rows, shapes matching Labels, gradient samples
//! pointing to existing rows, consistent names across blocks) is checked when
//! an object is built. Nothing is mutable afterwards, except attaching new
//! gradients to a block, which re-checks the gradient invariants.
//!
//! ### Shared metadata
//!
//! Labels are held through `Arc`, so blocks and gradients produced by
//! structural operations share metadata with their inputs instead of copying it.
//!
//! ### SciRS2 Integration
//!
//! [`DenseArray`] stores its values in a `scirs2_core` dynamic-dimension array.
//!
//! ## Quick Start
//!
//! ```
//! use std::sync::Arc;
//! use tenmap_core::{DenseArray, Labels, TensorBlock, TensorMap};
//!
//! let properties = Arc::new(Labels::new(["n"], &[[0], [1]]).unwrap());
//! let block = |structures: &[[i32; 1]]| {
//!     TensorBlock::new(
//!         DenseArray::zeros(&[structures.len(), 2]),
//!         Labels::new(["structure"], structures).unwrap(),
//!         vec![],
//!         properties.clone(),
//!     )
//!     .unwrap()
//! };
//!
//! let keys = Labels::new(["species"], &[[1], [6]]).unwrap();
//! let map = TensorMap::new(keys, vec![block(&[[0], [1]]), block(&[[0]])]).unwrap();
//!
//! let merged = map.keys_to_samples(&["species"], true).unwrap();
//! assert_eq!(merged.len(), 1);
//! assert_eq!(merged.block_by_id(0).samples().count(), 3);
//! ```
//!
//! ## Error Handling
//!
//! All fallible operations return [`TensorResult`], with a [`TensorError`]
//! variant for every violated invariant.
//!
//! ## Features
//!
//! - `serde`: Serialization of [`Labels`] and [`MapConfig`]

pub mod array;
pub mod block;
pub mod error;
pub mod labels;
pub mod tensor;


pub use array::{Array, DenseArray};
pub use block::{TensorBlock, GRADIENT_SAMPLE_NAME};
pub use error::{TensorError, TensorResult};
pub use labels::{Labels, LabelsBuilder, LabelsIter, LabelsRow};
pub use tensor::{MapConfig, TensorMap};
