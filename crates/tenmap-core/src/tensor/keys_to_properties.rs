use std::sync::Arc;

use tracing::{debug, debug_span};

use super::gather::{gather_properties, Origin};
use super::{group_by_remaining_keys, moved_key_dimensions, TensorMap};
use crate::block::TensorBlock;
use crate::error::{TensorError, TensorResult};
use crate::labels::{LabelsBuilder, LabelsRow};

impl TensorMap {
    /// Move the key dimensions `names` into the properties of the blocks
    ///
    /// Blocks whose keys only differ by the values of `names` are merged into a
    /// single block by concatenating their properties. The moved dimensions
    /// become new property columns (after the existing ones). All blocks in a
    /// group must have identical samples and components; their gradients may
    /// cover different samples, in which case the merged gradient contains the
    /// union of the gradient samples and missing entries are zero.
    ///
    /// Groups keep the order in which their first block appears in the keys.
    /// Inside a merged block, properties are in block order then in original
    /// order, unless `sort_properties` is set, in which case they are sorted
    /// lexicographically.
    ///
    /// # Errors
    ///
    /// - [`TensorError::InvalidParameter`] if `names` is empty, repeated, not key
    ///   dimensions, or already property dimensions
    /// - [`TensorError::SampleLabelsMismatch`] if blocks of a group have different samples
    /// - [`TensorError::InconsistentComponents`] if blocks of a group have different components
    /// - [`TensorError::InconsistentProperties`] if blocks of a group have
    ///   different property names
    pub fn keys_to_properties(
        &self,
        names: &[&str],
        sort_properties: bool,
    ) -> TensorResult<TensorMap> {
        let _span = debug_span!("keys_to_properties", ?names, sort_properties).entered();

        let moved = moved_key_dimensions(&self.keys, names)?;
        let (new_keys, groups) = group_by_remaining_keys(&self.keys, &moved)?;

        let mut blocks = Vec::with_capacity(groups.len());
        for group in &groups {
            blocks.push(self.merge_properties_group(group, &moved, names, sort_properties)?);
        }

        debug!(
            blocks_before = self.blocks.len(),
            blocks_after = blocks.len(),
            "moved keys to properties"
        );
        TensorMap::with_config(new_keys, blocks, self.config)
    }

    fn merge_properties_group(
        &self,
        group: &[usize],
        moved: &[usize],
        names: &[&str],
        sort_properties: bool,
    ) -> TensorResult<TensorBlock> {
        let blocks: Vec<&TensorBlock> = group.iter().map(|&i| &self.blocks[i]).collect();
        let first = blocks[0];

        for name in names {
            if first.properties().dimension_index(name).is_some() {
                return Err(TensorError::invalid_parameter(format!(
                    "can not move '{}' to properties: it is already a property dimension",
                    name
                )));
            }
        }

        for (i, block) in blocks.iter().enumerate().skip(1) {
            if !block.samples().is_identical(first.samples()) {
                return Err(TensorError::SampleLabelsMismatch { block: group[i] });
            }
            if !block.properties().same_names(first.properties()) {
                return Err(TensorError::InconsistentProperties {
                    block: group[i],
                    expected: first.properties().names().to_vec(),
                    got: block.properties().names().to_vec(),
                });
            }
        }

        let mut columns: Vec<(LabelsRow, Origin)> = Vec::new();
        for (b, block) in blocks.iter().enumerate() {
            let key = self.keys.row(group[b]);
            for (p, property) in block.properties().iter().enumerate() {
                let mut column = LabelsRow::from_slice(property);
                column.extend(moved.iter().map(|&d| key[d]));
                columns.push((column, (b, p)));
            }
        }

        if sort_properties {
            columns.sort_by(|a, b| a.0.cmp(&b.0));
        }

        let mut property_names = first.properties().names().to_vec();
        property_names.extend(names.iter().map(|n| n.to_string()));

        let mut builder = LabelsBuilder::with_capacity(&property_names, columns.len());
        for (column, _) in &columns {
            builder.add(column);
        }
        let properties = Arc::new(builder.finish()?);

        let origin: Vec<Origin> = columns.into_iter().map(|(_, origin)| origin).collect();
        let identity: Vec<usize> = (0..first.samples().count()).collect();
        let sample_mapping = vec![identity; blocks.len()];

        gather_properties(
            &blocks,
            Arc::clone(first.samples()),
            &sample_mapping,
            properties,
            &origin,
        )
    }
}
