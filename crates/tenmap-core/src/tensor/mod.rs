//! Block-sparse tensors: a set of [`TensorBlock`]s indexed by key [`Labels`]
//!
//! A [`TensorMap`] associates each row of its `keys` with one block. All blocks
//! of a map share the same sample names, the same component layout, the same
//! set of gradient parameters and (unless
//! [`MapConfig::heterogeneous_properties`] is enabled) the same property
//! names. These invariants are checked once by [`TensorMap::new`], so every
//! map that exists is consistent.
//!
//! # Structural operations
//!
//! Maps are immutable; structural operations consume nothing and return a new
//! map:
//!
//! - [`TensorMap::keys_to_samples`] merges blocks along the sample axis
//! - [`TensorMap::keys_to_properties`] merges blocks along the property axis
//! - [`TensorMap::samples_to_keys`] splits blocks by sample values
//! - [`TensorMap::components_to_properties`] flattens component axes into
//!   the properties of every block
//!
//! # Examples
//!
//! ```
//! use std::sync::Arc;
//! use tenmap_core::{DenseArray, Labels, TensorBlock, TensorMap};
//!
//! let properties = Arc::new(Labels::new(["n"], &[[0]]).unwrap());
//! let block = |atom: i32| {
//!     TensorBlock::new(
//!         DenseArray::from_elem(&[1, 1], atom as f64),
//!         Labels::new(["atom"], &[[atom]]).unwrap(),
//!         vec![],
//!         properties.clone(),
//!     )
//!     .unwrap()
//! };
//!
//! let keys = Labels::new(["species"], &[[1], [6]]).unwrap();
//! let map = TensorMap::new(keys, vec![block(0), block(1)]).unwrap();
//!
//! let merged = map.keys_to_samples(&["species"], true).unwrap();
//! assert_eq!(merged.keys().names(), ["_"]);
//! assert_eq!(merged.block_by_id(0).samples().names(), ["atom", "species"]);
//! ```

mod components_to_properties;
mod gather;
mod keys_to_properties;
mod keys_to_samples;
mod samples_to_keys;

use std::collections::BTreeSet;
use std::sync::Arc;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::block::TensorBlock;
use crate::error::{TensorError, TensorResult};
use crate::labels::{Labels, LabelsBuilder};

/// Consistency rules applied when building a [`TensorMap`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MapConfig {
    /// Allow blocks with different property names
    pub heterogeneous_properties: bool,
}

impl MapConfig {
    /// Create the default (strict) configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Allow blocks of the same map to use different property names
    pub fn heterogeneous_properties(mut self, enable: bool) -> Self {
        self.heterogeneous_properties = enable;
        self
    }
}

/// Ordered collection of blocks indexed by unique keys
#[derive(Debug, Clone)]
pub struct TensorMap {
    keys: Arc<Labels>,
    blocks: Vec<TensorBlock>,
    config: MapConfig,
}

impl TensorMap {
    /// Create a map with the default [`MapConfig`]
    ///
    /// # Errors
    ///
    /// - [`TensorError::KeyCountMismatch`] if there is not one block per key
    /// - [`TensorError::InconsistentSamples`] if the sample names differ between blocks
    /// - [`TensorError::InconsistentComponents`] if the component names differ
    /// - [`TensorError::InconsistentProperties`] if the property names differ
    /// - [`TensorError::InconsistentGradients`] if blocks have different gradient parameters
    pub fn new(keys: impl Into<Arc<Labels>>, blocks: Vec<TensorBlock>) -> TensorResult<Self> {
        Self::with_config(keys, blocks, MapConfig::default())
    }

    /// Create a map with explicit consistency rules
    pub fn with_config(
        keys: impl Into<Arc<Labels>>,
        blocks: Vec<TensorBlock>,
        config: MapConfig,
    ) -> TensorResult<Self> {
        let keys = keys.into();
        if keys.count() != blocks.len() {
            return Err(TensorError::KeyCountMismatch {
                keys: keys.count(),
                blocks: blocks.len(),
            });
        }

        check_consistency(&blocks, &config)?;

        Ok(Self {
            keys,
            blocks,
            config,
        })
    }

    /// Map without any block, with the given key names
    pub fn empty<S: AsRef<str>>(names: &[S]) -> TensorResult<Self> {
        Self::new(Labels::empty(names)?, Vec::new())
    }

    /// Keys of this map, one row per block
    pub fn keys(&self) -> &Arc<Labels> {
        &self.keys
    }

    /// All blocks, in key order
    pub fn blocks(&self) -> &[TensorBlock] {
        &self.blocks
    }

    /// Configuration this map was validated with
    pub fn config(&self) -> MapConfig {
        self.config
    }

    /// Number of blocks
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Does this map contain no block?
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Iterate over `(key, block)` pairs in storage order
    pub fn iter(&self) -> impl ExactSizeIterator<Item = (&[i32], &TensorBlock)> {
        self.keys.iter().zip(&self.blocks)
    }

    /// Block at position `index`
    ///
    /// # Panics
    ///
    /// Panics if `index >= self.len()`.
    pub fn block_by_id(&self, index: usize) -> &TensorBlock {
        &self.blocks[index]
    }

    /// Block at position `index`, or `None` if out of bounds
    pub fn get_block(&self, index: usize) -> Option<&TensorBlock> {
        self.blocks.get(index)
    }

    /// Block associated with a full key row
    pub fn block_for_key(&self, key: &[i32]) -> Option<&TensorBlock> {
        self.keys.position(key).map(|i| &self.blocks[i])
    }

    /// Positions of the blocks whose key matches any row of `selection`
    ///
    /// `selection` can use any subset of the key dimensions.
    ///
    /// # Errors
    ///
    /// Returns [`TensorError::InvalidParameter`] if `selection` uses a
    /// dimension that is not a key dimension.
    pub fn blocks_matching_indices(&self, selection: &Labels) -> TensorResult<Vec<usize>> {
        self.keys.select(selection)
    }

    /// Blocks whose key matches any row of `selection`, in storage order
    ///
    /// # Examples
    ///
    /// ```
    /// use tenmap_core::{DenseArray, Labels, TensorBlock, TensorMap};
    ///
    /// let block = || {
    ///     TensorBlock::new(
    ///         DenseArray::zeros(&[1, 1]),
    ///         Labels::new(["s"], &[[0]]).unwrap(),
    ///         vec![],
    ///         Labels::new(["p"], &[[0]]).unwrap(),
    ///     )
    ///     .unwrap()
    /// };
    /// let keys = Labels::new(["l", "species"], &[[0, 1], [1, 1], [0, 6]]).unwrap();
    /// let map = TensorMap::new(keys, vec![block(), block(), block()]).unwrap();
    ///
    /// let selection = Labels::new(["l"], &[[0]]).unwrap();
    /// assert_eq!(map.blocks_matching(&selection).unwrap().len(), 2);
    /// ```
    pub fn blocks_matching(&self, selection: &Labels) -> TensorResult<Vec<&TensorBlock>> {
        Ok(self
            .blocks_matching_indices(selection)?
            .into_iter()
            .map(|i| &self.blocks[i])
            .collect())
    }

    /// Take the keys and blocks out of this map
    pub fn into_parts(self) -> (Arc<Labels>, Vec<TensorBlock>) {
        (self.keys, self.blocks)
    }

    /// Order-sensitive structural comparison of keys, blocks and configuration
    pub fn is_identical(&self, other: &TensorMap) -> bool {
        self.config == other.config
            && self.keys.is_identical(&other.keys)
            && self.blocks.len() == other.blocks.len()
            && self
                .blocks
                .iter()
                .zip(&other.blocks)
                .all(|(a, b)| a.is_identical(b))
    }
}

impl<'a> IntoIterator for &'a TensorMap {
    type Item = (&'a [i32], &'a TensorBlock);
    type IntoIter = std::iter::Zip<crate::labels::LabelsIter<'a>, std::slice::Iter<'a, TensorBlock>>;

    fn into_iter(self) -> Self::IntoIter {
        self.keys.iter().zip(self.blocks.iter())
    }
}

fn check_consistency(blocks: &[TensorBlock], config: &MapConfig) -> TensorResult<()> {
    let Some(first) = blocks.first() else {
        return Ok(());
    };

    let parameters: BTreeSet<&str> = first.gradient_parameters().into_iter().collect();
    let component_names: Vec<&[String]> = first.components().iter().map(|c| c.names()).collect();

    for (i, block) in blocks.iter().enumerate().skip(1) {
        if !block.samples().same_names(first.samples()) {
            return Err(TensorError::InconsistentSamples {
                block: i,
                expected: first.samples().names().to_vec(),
                got: block.samples().names().to_vec(),
            });
        }

        if block.components().len() != component_names.len() {
            return Err(TensorError::InconsistentComponents {
                block: i,
                reason: format!(
                    "expected {} component axes, got {}",
                    component_names.len(),
                    block.components().len()
                ),
            });
        }
        for (axis, (component, expected)) in
            block.components().iter().zip(&component_names).enumerate()
        {
            if component.names() != *expected {
                return Err(TensorError::InconsistentComponents {
                    block: i,
                    reason: format!(
                        "component axis {} has names {:?}, expected {:?}",
                        axis,
                        component.names(),
                        expected
                    ),
                });
            }
        }

        if !config.heterogeneous_properties && !block.properties().same_names(first.properties()) {
            return Err(TensorError::InconsistentProperties {
                block: i,
                expected: first.properties().names().to_vec(),
                got: block.properties().names().to_vec(),
            });
        }

        let got: BTreeSet<&str> = block.gradient_parameters().into_iter().collect();
        if got != parameters {
            return Err(TensorError::InconsistentGradients {
                block: i,
                expected: parameters.iter().map(|p| p.to_string()).collect(),
                got: got.iter().map(|p| p.to_string()).collect(),
            });
        }
    }

    Ok(())
}

/// Validate the list of key dimensions to move out of `keys`, returning
/// their indexes
///
/// The list must not be empty, must not contain duplicates, and every name
/// must be a key dimension.
pub(crate) fn moved_key_dimensions(keys: &Labels, names: &[&str]) -> TensorResult<Vec<usize>> {
    if names.is_empty() {
        return Err(TensorError::invalid_parameter(
            "the list of key dimensions to move can not be empty",
        ));
    }
    for (i, name) in names.iter().enumerate() {
        if names[..i].contains(name) {
            return Err(TensorError::invalid_parameter(format!(
                "key dimension '{}' is listed more than once",
                name
            )));
        }
    }
    keys.dimension_indices(names)
}

/// Group the blocks by the values of the key dimensions that are not moved
///
/// Returns the new keys and, for each of them, the positions of the blocks
/// in the group (in key order). Groups are ordered by first appearance. When
/// every key dimension is moved, all blocks form a single group with the
/// [`Labels::single`] key.
pub(crate) fn group_by_remaining_keys(
    keys: &Labels,
    moved: &[usize],
) -> TensorResult<(Labels, Vec<Vec<usize>>)> {
    let remaining: Vec<&str> = keys
        .names()
        .iter()
        .enumerate()
        .filter(|(i, _)| !moved.contains(i))
        .map(|(_, name)| name.as_str())
        .collect();

    if remaining.is_empty() {
        if keys.is_empty() {
            return Ok((LabelsBuilder::new(["_"]).finish()?, Vec::new()));
        }
        return Ok((Labels::single(), vec![(0..keys.count()).collect()]));
    }

    let (new_keys, mapping) = keys.project(&remaining)?;
    let mut groups = vec![Vec::new(); new_keys.count()];
    for (block, &group) in mapping.iter().enumerate() {
        groups[group].push(block);
    }
    Ok((new_keys, groups))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::array::DenseArray;

    fn block(samples: &[&str], properties: &[&str]) -> TensorBlock {
        let samples = Labels::from_flat(samples, vec![0; samples.len()]).unwrap();
        let properties = Labels::from_flat(properties, vec![0; properties.len()]).unwrap();
        TensorBlock::new(DenseArray::zeros(&[1, 1]), samples, vec![], properties).unwrap()
    }

    fn keys(count: i32) -> Labels {
        let values = (0..count).collect();
        Labels::from_flat(&["key"], values).unwrap()
    }

    #[test]
    fn test_key_count_mismatch() {
        let result = TensorMap::new(keys(2), vec![block(&["s"], &["p"])]);
        match result {
            Err(TensorError::KeyCountMismatch { keys, blocks }) => {
                assert_eq!(keys, 2);
                assert_eq!(blocks, 1);
            }
            other => panic!("expected KeyCountMismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_inconsistent_sample_names() {
        let result = TensorMap::new(keys(2), vec![block(&["s"], &["p"]), block(&["t"], &["p"])]);
        assert!(matches!(
            result,
            Err(TensorError::InconsistentSamples { block: 1, .. })
        ));
    }

    #[test]
    fn test_heterogeneous_properties() {
        let blocks = vec![block(&["s"], &["p"]), block(&["s"], &["q"])];
        let result = TensorMap::new(keys(2), blocks.clone());
        assert!(matches!(
            result,
            Err(TensorError::InconsistentProperties { .. })
        ));

        let config = MapConfig::new().heterogeneous_properties(true);
        let map = TensorMap::with_config(keys(2), blocks, config).unwrap();
        assert!(map.config().heterogeneous_properties);
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn test_inconsistent_gradients() {
        let gradient = TensorBlock::new(
            DenseArray::zeros(&[0, 1]),
            Labels::empty(&["sample"]).unwrap(),
            vec![],
            Labels::new(["p"], &[[0]]).unwrap(),
        )
        .unwrap();
        let with_gradient = block(&["s"], &["p"])
            .with_gradient("positions", gradient)
            .unwrap();

        let result = TensorMap::new(keys(2), vec![with_gradient, block(&["s"], &["p"])]);
        match result {
            Err(TensorError::InconsistentGradients {
                block,
                expected,
                got,
            }) => {
                assert_eq!(block, 1);
                assert_eq!(expected, vec!["positions".to_string()]);
                assert!(got.is_empty());
            }
            other => panic!("expected InconsistentGradients, got {:?}", other),
        }
    }

    #[test]
    fn test_selection() {
        let keys = Labels::new(["a", "b"], &[[0, 0], [0, 1], [1, 0]]).unwrap();
        let blocks = (0..3).map(|_| block(&["s"], &["p"])).collect();
        let map = TensorMap::new(keys, blocks).unwrap();

        assert!(map.block_for_key(&[0, 1]).is_some());
        assert!(map.block_for_key(&[1, 1]).is_none());
        assert!(map.get_block(3).is_none());

        let selection = Labels::new(["b"], &[[0]]).unwrap();
        assert_eq!(map.blocks_matching_indices(&selection).unwrap(), vec![0, 2]);
        assert_eq!(map.iter().count(), 3);
        assert_eq!((&map).into_iter().len(), 3);
    }

    #[test]
    fn test_empty_map() {
        let map = TensorMap::empty(&["a"]).unwrap();
        assert!(map.is_empty());
        assert_eq!(map.keys().names(), ["a"]);
    }

    #[test]
    fn test_group_by_remaining_keys() {
        let keys = Labels::new(["a", "b"], &[[0, 0], [1, 0], [0, 1], [2, 1]]).unwrap();
        let (new_keys, groups) = group_by_remaining_keys(&keys, &[0]).unwrap();
        assert_eq!(new_keys.names(), ["b"]);
        assert_eq!(new_keys.values(), &[0, 1]);
        assert_eq!(groups, vec![vec![0, 1], vec![2, 3]]);

        let (new_keys, groups) = group_by_remaining_keys(&keys, &[0, 1]).unwrap();
        assert!(new_keys.is_identical(&Labels::single()));
        assert_eq!(groups, vec![vec![0, 1, 2, 3]]);
    }

    #[test]
    fn test_moved_key_dimensions() {
        let keys = Labels::new(["a", "b"], &[[0, 0]]).unwrap();
        assert_eq!(moved_key_dimensions(&keys, &["b"]).unwrap(), vec![1]);
        assert!(moved_key_dimensions(&keys, &[]).is_err());
        assert!(moved_key_dimensions(&keys, &["a", "a"]).is_err());
        assert!(moved_key_dimensions(&keys, &["c"]).is_err());
    }
}
