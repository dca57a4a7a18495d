//! # tenmap-io
//!
//! Self-describing binary containers for TenMap tensor maps.
//!
//! This crate provides:
//! - A versioned container format holding a [`TensorMap`], a single
//!   [`TensorBlock`] or a single [`Labels`], in either byte order
//! - Whole-map helpers ([`save`], [`load`], [`save_buffer`], [`load_buffer`])
//! - Streaming access ([`TensorMapWriter`], [`TensorMapReader`]) with an
//!   explicit state machine
//! - Optional CRC32 integrity trailer
//! - Memory-mapped loading (`mmap` feature)
//! - Tracing subscriber setup (`subscriber` feature)
//!
//! Decoding never trusts sizes read from the stream for allocation, and
//! every decoded object goes through the validating constructors of
//! `tenmap-core`: a container either loads completely or fails with an
//! [`IoError`].
//!
//! ## Example
//!
//! ```
//! use tenmap_core::{DenseArray, Labels, TensorBlock, TensorMap};
//!
//! let block = TensorBlock::new(
//!     DenseArray::from_vec(vec![1.0, 2.0], &[1, 2]).unwrap(),
//!     Labels::new(["structure"], &[[0]]).unwrap(),
//!     vec![],
//!     Labels::new(["n"], &[[0], [1]]).unwrap(),
//! )
//! .unwrap();
//! let map = TensorMap::new(Labels::new(["species"], &[[8]]).unwrap(), vec![block]).unwrap();
//!
//! let bytes = tenmap_io::save_buffer(&map).unwrap();
//! let loaded = tenmap_io::load_buffer(&bytes).unwrap();
//! assert!(loaded.is_identical(&map));
//! ```
//!
//! [`TensorMap`]: tenmap_core::TensorMap
//! [`TensorBlock`]: tenmap_core::TensorBlock
//! [`Labels`]: tenmap_core::Labels

pub mod config;
pub mod container;
pub mod error;
pub mod format;
pub mod reader;
pub mod tracing_support;
pub mod writer;

#[cfg(feature = "mmap")]
pub mod mmap_io;

mod primitives;


pub use config::{ReadConfig, WriteConfig};
pub use container::{
    load, load_block_buffer, load_buffer, load_labels_buffer, load_with, read, read_block,
    read_labels, save, save_block_buffer, save_buffer, save_labels_buffer, write, write_block,
    write_labels,
};
pub use error::{DeserializationError, IoError, IoResult};
pub use format::{ByteOrder, ContainerKind, Header, MAGIC, VERSION};
pub use primitives::MAX_GRADIENT_DEPTH;
pub use reader::{default_create_array, CreateArrayFn, ReaderState, TensorMapReader};
pub use tracing_support::{init_tracing, TracingConfig, TracingFormat};
pub use writer::{TensorMapWriter, WriterState};

#[cfg(feature = "mmap")]
pub use mmap_io::load_mmap;
