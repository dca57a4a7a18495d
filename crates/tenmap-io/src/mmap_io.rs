//! Memory-mapped loading of tensor map containers
//!
//! [`load_mmap`] maps the container file read-only and decodes it straight
//! from the mapped pages, avoiding an intermediate buffered copy of the
//! whole file.

use std::fs::File;
use std::path::Path;

use memmap2::Mmap;
use tenmap_core::TensorMap;
use tracing::debug_span;

use crate::container::load_buffer;
use crate::error::IoResult;

/// Load a map from the file at `path` through a read-only memory map
///
/// The file must not be modified by another process while it is being
/// loaded. The returned map owns its data and does not reference the file.
///
/// # Errors
///
/// Returns the same errors as [`load_buffer`], and [`IoError::Io`] if the
/// file can not be opened or mapped.
///
/// [`IoError::Io`]: crate::IoError::Io
pub fn load_mmap<P: AsRef<Path>>(path: P) -> IoResult<TensorMap> {
    let path = path.as_ref();
    let _span = debug_span!("load_mmap", path = %path.display()).entered();

    let file = File::open(path)?;
    // SAFETY: the map is only read during this call and never outlives it
    let mmap = unsafe { Mmap::map(&file)? };
    load_buffer(&mmap)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::save;
    use crate::error::IoError;
    use tenmap_core::{DenseArray, Labels, TensorBlock};

    #[test]
    fn test_mmap_matches_buffered_load() {
        let block = TensorBlock::new(
            DenseArray::from_vec((0..12).map(|i| i as f64).collect(), &[3, 4]).unwrap(),
            Labels::new(["s"], &[[0], [1], [2]]).unwrap(),
            vec![],
            Labels::new(["p"], &[[0], [1], [2], [3]]).unwrap(),
        )
        .unwrap();
        let map = TensorMap::new(Labels::single(), vec![block]).unwrap();

        let path = std::env::temp_dir().join("tenmap_io_mmap_roundtrip.tmap");
        save(&path, &map).unwrap();

        let loaded = load_mmap(&path).unwrap();
        assert!(loaded.is_identical(&map));

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_missing_file() {
        let path = std::env::temp_dir().join("tenmap_io_mmap_missing.tmap");
        assert!(matches!(load_mmap(&path), Err(IoError::Io(_))));
    }
}
