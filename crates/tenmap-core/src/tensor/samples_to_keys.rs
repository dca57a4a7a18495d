use tracing::{debug, debug_span};

use super::gather::{gather_samples, Origin};
use super::TensorMap;
use crate::error::{TensorError, TensorResult};
use crate::labels::LabelsBuilder;

impl TensorMap {
    /// Move the sample dimensions `names` into the keys, splitting blocks
    ///
    /// Every block is split into one block per distinct value of `names` in
    /// its samples (in order of first appearance). The new keys are the old
    /// keys followed by the moved dimensions. Blocks without samples produce
    /// no new block.
    ///
    /// This is the inverse of [`TensorMap::keys_to_samples`], up to the
    /// order of the key dimensions and of the blocks.
    ///
    /// # Errors
    ///
    /// Returns [`TensorError::InvalidParameter`] if `names` is empty, repeated,
    /// not sample dimensions, already key dimensions, or covers every sample
    /// dimension.
    ///
    /// # Examples
    ///
    /// ```
    /// use tenmap_core::{DenseArray, Labels, TensorBlock, TensorMap};
    ///
    /// let block = TensorBlock::new(
    ///     DenseArray::zeros(&[3, 1]),
    ///     Labels::new(["structure", "atom"], &[[0, 0], [0, 1], [1, 0]]).unwrap(),
    ///     vec![],
    ///     Labels::new(["n"], &[[0]]).unwrap(),
    /// )
    /// .unwrap();
    /// let map = TensorMap::new(Labels::single(), vec![block]).unwrap();
    ///
    /// let split = map.samples_to_keys(&["structure"]).unwrap();
    /// assert_eq!(split.keys().names(), ["_", "structure"]);
    /// assert_eq!(split.len(), 2);
    /// assert_eq!(split.block_by_id(0).samples().count(), 2);
    /// ```
    pub fn samples_to_keys(&self, names: &[&str]) -> TensorResult<TensorMap> {
        let _span = debug_span!("samples_to_keys", ?names).entered();

        if names.is_empty() {
            return Err(TensorError::invalid_parameter(
                "the list of sample dimensions to move can not be empty",
            ));
        }
        for (i, name) in names.iter().enumerate() {
            if names[..i].contains(name) {
                return Err(TensorError::invalid_parameter(format!(
                    "sample dimension '{}' is listed more than once",
                    name
                )));
            }
            if self.keys.dimension_index(name).is_some() {
                return Err(TensorError::invalid_parameter(format!(
                    "can not move '{}' to keys: it is already a key dimension",
                    name
                )));
            }
        }

        let mut key_names = self.keys.names().to_vec();
        key_names.extend(names.iter().map(|n| n.to_string()));
        let mut new_keys = LabelsBuilder::new(&key_names);
        let mut blocks = Vec::new();

        for (key, block) in self.iter() {
            let samples = block.samples();
            let moved = samples.dimension_indices(names)?;
            let remaining: Vec<usize> = (0..samples.size())
                .filter(|d| !moved.contains(d))
                .collect();
            if remaining.is_empty() {
                return Err(TensorError::invalid_parameter(
                    "at least one sample dimension must stay in the blocks",
                ));
            }
            let remaining_names: Vec<&str> = remaining
                .iter()
                .map(|&d| samples.names()[d].as_str())
                .collect();

            let (values, mapping) = samples.project(names)?;
            for (split, value) in values.iter().enumerate() {
                let mut builder = LabelsBuilder::new(&remaining_names);
                let mut origin: Vec<Origin> = Vec::new();
                for (r, row) in samples.iter().enumerate() {
                    if mapping[r] == split {
                        let kept: Vec<i32> = remaining.iter().map(|&d| row[d]).collect();
                        builder.add(&kept);
                        origin.push((0, r));
                    }
                }

                let mut new_key = key.to_vec();
                new_key.extend_from_slice(value);
                new_keys.add(&new_key);
                blocks.push(gather_samples(&[block], builder.finish()?, &origin)?);
            }
        }

        debug!(
            blocks_before = self.blocks.len(),
            blocks_after = blocks.len(),
            "moved samples to keys"
        );
        TensorMap::with_config(new_keys.finish()?, blocks, self.config)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::array::DenseArray;
    use crate::block::TensorBlock;
    use crate::labels::Labels;

    fn properties() -> Arc<Labels> {
        Arc::new(Labels::new(["n"], &[[0]]).unwrap())
    }

    fn block() -> TensorBlock {
        let samples = Labels::new(["structure", "atom"], &[[0, 0], [1, 0], [0, 1]]).unwrap();
        let gradient = TensorBlock::new(
            DenseArray::from_vec(vec![10.0, 20.0], &[2, 1]).unwrap(),
            Labels::new(["sample", "atom"], &[[1, 0], [2, 1]]).unwrap(),
            vec![],
            properties(),
        )
        .unwrap();
        TensorBlock::new(
            DenseArray::from_vec(vec![1.0, 2.0, 3.0], &[3, 1]).unwrap(),
            samples,
            vec![],
            properties(),
        )
        .unwrap()
        .with_gradient("positions", gradient)
        .unwrap()
    }

    #[test]
    fn test_split_by_structure() {
        let keys = Labels::new(["species"], &[[8]]).unwrap();
        let map = TensorMap::new(keys, vec![block()]).unwrap();
        let split = map.samples_to_keys(&["structure"]).unwrap();

        assert_eq!(split.keys().names(), ["species", "structure"]);
        assert_eq!(split.keys().values(), &[8, 0, 8, 1]);

        let first = split.block_for_key(&[8, 0]).unwrap();
        assert_eq!(first.samples().names(), ["atom"]);
        assert_eq!(first.samples().values(), &[0, 1]);
        assert_eq!(first.values().data(), &[1.0, 3.0]);
        let gradient = first.gradient("positions").unwrap();
        assert_eq!(gradient.samples().values(), &[1, 1]);
        assert_eq!(gradient.values().data(), &[20.0]);

        let second = split.block_for_key(&[8, 1]).unwrap();
        assert_eq!(second.values().data(), &[2.0]);
        let gradient = second.gradient("positions").unwrap();
        assert_eq!(gradient.samples().values(), &[0, 0]);
        assert_eq!(gradient.values().data(), &[10.0]);
    }

    #[test]
    fn test_roundtrip_with_keys_to_samples() {
        let keys = Labels::new(["species"], &[[8]]).unwrap();
        let map = TensorMap::new(keys, vec![block()]).unwrap();

        let split = map.samples_to_keys(&["structure"]).unwrap();
        let merged = split.keys_to_samples(&["structure"], false).unwrap();
        let block = merged.block_by_id(0);

        assert_eq!(block.samples().names(), ["atom", "structure"]);
        let original = map.block_by_id(0);
        for (row, value) in original.samples().iter().zip(original.values().data()) {
            let position = block.samples().position(&[row[1], row[0]]).unwrap();
            assert_eq!(block.values().data()[position], *value);
        }
        assert_eq!(block.gradient("positions").unwrap().samples().count(), 2);
    }

    #[test]
    fn test_invalid_names() {
        let keys = Labels::new(["species"], &[[8]]).unwrap();
        let map = TensorMap::new(keys, vec![block()]).unwrap();
        assert!(map.samples_to_keys(&[]).is_err());
        assert!(map.samples_to_keys(&["species"]).is_err());
        assert!(map.samples_to_keys(&["structure", "atom"]).is_err());
        assert!(map.samples_to_keys(&["center"]).is_err());
    }
}
