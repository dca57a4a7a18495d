use tracing::{debug, debug_span};

use super::gather::{gather_samples, Origin};
use super::{group_by_remaining_keys, moved_key_dimensions, TensorMap};
use crate::block::TensorBlock;
use crate::error::{TensorError, TensorResult};
use crate::labels::{Labels, LabelsBuilder, LabelsRow};

impl TensorMap {
    /// Move the key dimensions `names` into the samples of the blocks
    ///
    /// Blocks whose keys only differ by the values of `names` are merged into a
    /// single block by concatenating their samples. The moved dimensions become
    /// new sample columns (after the existing ones) carrying the key value of
    /// the block each row came from. Gradient `sample` references are shifted
    /// to point at the merged rows.
    ///
    /// Groups keep the order in which their first block appears in the keys.
    /// Inside a merged block, rows are in block order then in original order,
    /// unless `sort_samples` is set, in which case rows are sorted
    /// lexicographically.
    ///
    /// # Errors
    ///
    /// - [`TensorError::InvalidParameter`] if `names` is empty, repeated or not key dimensions
    /// - [`TensorError::PropertyLabelsMismatch`] if blocks of a group have different properties
    /// - [`TensorError::InconsistentComponents`] if blocks of a group have different components
    /// - [`TensorError::AmbiguousSamples`] if a moved name is already a sample
    ///   name, or the merged samples would contain the same row twice
    ///
    /// # Examples
    ///
    /// ```
    /// use std::sync::Arc;
    /// use tenmap_core::{Array, DenseArray, Labels, TensorBlock, TensorMap};
    ///
    /// let properties = Arc::new(Labels::new(["n"], &[[0]]).unwrap());
    /// let first = TensorBlock::new(
    ///     DenseArray::from_vec(vec![1.0, 2.0], &[2, 1]).unwrap(),
    ///     Labels::new(["center"], &[[0], [1]]).unwrap(),
    ///     vec![],
    ///     properties.clone(),
    /// ).unwrap();
    /// let second = TensorBlock::new(
    ///     DenseArray::from_vec(vec![3.0], &[1, 1]).unwrap(),
    ///     Labels::new(["center"], &[[2]]).unwrap(),
    ///     vec![],
    ///     properties,
    /// ).unwrap();
    ///
    /// let keys = Labels::new(["species"], &[[1], [6]]).unwrap();
    /// let map = TensorMap::new(keys, vec![first, second]).unwrap();
    /// let merged = map.keys_to_samples(&["species"], false).unwrap();
    ///
    /// let block = merged.block_by_id(0);
    /// assert_eq!(block.samples().values(), &[0, 1, 1, 1, 2, 6]);
    /// assert_eq!(block.values().data(), &[1.0, 2.0, 3.0]);
    /// ```
    pub fn keys_to_samples(&self, names: &[&str], sort_samples: bool) -> TensorResult<TensorMap> {
        let _span = debug_span!("keys_to_samples", ?names, sort_samples).entered();

        let moved = moved_key_dimensions(&self.keys, names)?;
        let (new_keys, groups) = group_by_remaining_keys(&self.keys, &moved)?;

        let mut blocks = Vec::with_capacity(groups.len());
        for group in &groups {
            blocks.push(self.merge_samples_group(group, &moved, names, sort_samples)?);
        }

        debug!(
            blocks_before = self.blocks.len(),
            blocks_after = blocks.len(),
            "moved keys to samples"
        );
        TensorMap::with_config(new_keys, blocks, self.config)
    }

    fn merge_samples_group(
        &self,
        group: &[usize],
        moved: &[usize],
        names: &[&str],
        sort_samples: bool,
    ) -> TensorResult<TensorBlock> {
        let blocks: Vec<&TensorBlock> = group.iter().map(|&i| &self.blocks[i]).collect();
        let first = blocks[0];

        for name in names {
            if first.samples().dimension_index(name).is_some() {
                return Err(TensorError::AmbiguousSamples {
                    reason: format!("'{}' is already a sample dimension", name),
                });
            }
        }

        for (i, block) in blocks.iter().enumerate().skip(1) {
            if !block.properties().is_identical(first.properties()) {
                return Err(TensorError::PropertyLabelsMismatch {
                    context: format!(
                        "block for key {:?} can not be merged along samples with the block for key {:?}",
                        self.keys.row(group[i]),
                        self.keys.row(group[0])
                    ),
                });
            }
            if block.components().len() != first.components().len()
                || block
                    .components()
                    .iter()
                    .zip(first.components())
                    .any(|(a, b)| !a.is_identical(b))
            {
                return Err(TensorError::InconsistentComponents {
                    block: group[i],
                    reason: "components must be identical to merge blocks along samples"
                        .to_string(),
                });
            }
        }

        let mut rows: Vec<(LabelsRow, Origin)> = Vec::new();
        for (b, block) in blocks.iter().enumerate() {
            let key = self.keys.row(group[b]);
            for (r, sample) in block.samples().iter().enumerate() {
                let mut row = LabelsRow::from_slice(sample);
                row.extend(moved.iter().map(|&d| key[d]));
                rows.push((row, (b, r)));
            }
        }

        if sort_samples {
            rows.sort_by(|a, b| a.0.cmp(&b.0));
        }

        let mut sample_names = first.samples().names().to_vec();
        sample_names.extend(names.iter().map(|n| n.to_string()));

        let mut builder = LabelsBuilder::with_capacity(&sample_names, rows.len());
        for (row, _) in &rows {
            builder.add(row);
        }
        let samples = builder.finish().map_err(|e| match e {
            TensorError::DuplicateRow { row, .. } => TensorError::AmbiguousSamples {
                reason: format!("sample {:?} would appear more than once", row),
            },
            other => other,
        })?;

        let origin: Vec<Origin> = rows.into_iter().map(|(_, origin)| origin).collect();
        gather_samples(&blocks, samples, &origin)
    }
}
