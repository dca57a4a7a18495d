//! # TenMap - Labeled Block-Sparse Tensors
//!
//! Tensor maps store data as a set of dense blocks indexed by integer keys,
//! with named integer Labels on every axis and gradients attached to each
//! block.
//!
//! This is the **meta crate** that re-exports all TenMap components for
//! convenient access.
//!
//! ## Quick Start
//!
//! ```
//! use tenmap::prelude::*;
//!
//! let block = TensorBlock::new(
//!     DenseArray::from_vec(vec![1.0, 2.0, 3.0, 4.0], &[2, 2])?,
//!     Labels::new(["structure"], &[[0], [1]])?,
//!     vec![],
//!     Labels::new(["n"], &[[0], [1]])?,
//! )?;
//! let map = TensorMap::new(Labels::new(["species"], &[[6]])?, vec![block])?;
//!
//! let merged = map.keys_to_samples(&["species"], false)?;
//! assert_eq!(merged.block_by_id(0).samples().names(), ["structure", "species"]);
//! # Ok::<(), anyhow::Error>(())
//! ```
//!
//! ## Components
//!
//! ### Data Model ([`core`])
//!
//! [`Labels`](core::Labels), value arrays, [`TensorBlock`](core::TensorBlock)
//! with gradients, and [`TensorMap`](core::TensorMap) with the key moves
//! (`keys_to_samples`, `keys_to_properties`, `samples_to_keys`,
//! `components_to_properties`).
//!
//! ### Containers ([`io`])
//!
//! Versioned binary containers for maps, blocks and Labels, in both byte
//! orders, with an optional CRC32 trailer and streaming access.
//!
//! Available when the `io` feature is enabled (default).
//!
//! ```
//! # #[cfg(feature = "io")]
//! # {
//! use tenmap::prelude::*;
//!
//! let map = TensorMap::empty(&["species"])?;
//! let bytes = save_buffer(&map)?;
//! assert!(load_buffer(&bytes)?.is_identical(&map));
//! # }
//! # Ok::<(), anyhow::Error>(())
//! ```
//!
//! ## Features
//!
//! - `io` (default): container format
//! - `mmap`: memory-mapped loading of containers
//! - `subscriber`: `tracing-subscriber` setup in `io::tracing_support`
//! - `serde`: serialization of Labels and configuration types
//! - `full`: enable all features

pub use tenmap_core as core;
#[cfg(feature = "io")]
pub use tenmap_io as io;

pub mod prelude {
    //! Prelude module for convenient imports
    //!
    //! # Example
    //!
    //! ```
    //! use tenmap::prelude::*;
    //!
    //! let keys = Labels::new(["species"], &[[1], [6]]).unwrap();
    //! assert_eq!(keys.position(&[6]), Some(1));
    //! ```

    // Data model
    pub use crate::core::{
        Array, DenseArray, Labels, LabelsBuilder, MapConfig, TensorBlock, TensorError,
        TensorMap, TensorResult,
    };

    // Containers
    #[cfg(feature = "io")]
    pub use crate::io::{
        load, load_buffer, save, save_buffer, IoError, IoResult, ReadConfig, TensorMapReader,
        TensorMapWriter, WriteConfig,
    };
}
