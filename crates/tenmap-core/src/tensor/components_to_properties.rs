use std::sync::Arc;

use tracing::debug_span;

use super::TensorMap;
use crate::array::row_major_strides;
use crate::block::TensorBlock;
use crate::error::{TensorError, TensorResult};
use crate::labels::{Labels, LabelsBuilder};

impl TensorMap {
    /// Move the component axes containing the dimensions `names` into the
    /// properties of every block
    ///
    /// Each name must identify a whole component axis (a component Labels
    /// with a single dimension). The new properties are the product of the
    /// moved components (in the order of `names`, slowest varying first) and
    /// of the old properties (fastest varying). The moved dimensions come
    /// first in the new property names.
    ///
    /// # Errors
    ///
    /// Returns [`TensorError::InvalidParameter`] if `names` is empty, repeated,
    /// or does not name a single-dimension component axis.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::sync::Arc;
    /// use tenmap_core::{DenseArray, Labels, TensorBlock, TensorMap};
    ///
    /// let block = TensorBlock::new(
    ///     DenseArray::zeros(&[1, 3, 2]),
    ///     Labels::new(["s"], &[[0]]).unwrap(),
    ///     vec![Arc::new(Labels::new(["m"], &[[-1], [0], [1]]).unwrap())],
    ///     Labels::new(["n"], &[[0], [1]]).unwrap(),
    /// )
    /// .unwrap();
    /// let map = TensorMap::new(Labels::single(), vec![block]).unwrap();
    ///
    /// let moved = map.components_to_properties(&["m"]).unwrap();
    /// let block = moved.block_by_id(0);
    /// assert_eq!(block.shape(), &[1, 6]);
    /// assert_eq!(block.properties().names(), ["m", "n"]);
    /// ```
    pub fn components_to_properties(&self, names: &[&str]) -> TensorResult<TensorMap> {
        let _span = debug_span!("components_to_properties", ?names).entered();

        if names.is_empty() {
            return Err(TensorError::invalid_parameter(
                "the list of components to move can not be empty",
            ));
        }

        let mut blocks = Vec::with_capacity(self.blocks.len());
        for block in &self.blocks {
            let axes = component_axes(block, names)?;
            let properties = Arc::new(moved_properties(block, &axes)?);
            blocks.push(move_components(block, &axes, &properties)?);
        }

        TensorMap::with_config(Arc::clone(&self.keys), blocks, self.config)
    }
}

/// Find the component axis of every name, in the order of `names`
fn component_axes(block: &TensorBlock, names: &[&str]) -> TensorResult<Vec<usize>> {
    let mut axes = Vec::with_capacity(names.len());
    for name in names {
        let axis = block
            .components()
            .iter()
            .position(|c| c.names().len() == 1 && c.names()[0] == *name)
            .ok_or_else(|| {
                TensorError::invalid_parameter(format!(
                    "'{}' is not a single-dimension component of this block",
                    name
                ))
            })?;
        if axes.contains(&axis) {
            return Err(TensorError::invalid_parameter(format!(
                "component '{}' is listed more than once",
                name
            )));
        }
        axes.push(axis);
    }
    Ok(axes)
}

fn moved_properties(block: &TensorBlock, axes: &[usize]) -> TensorResult<Labels> {
    let components: Vec<&Labels> = axes.iter().map(|&a| &*block.components()[a]).collect();
    let properties = block.properties();

    let mut names: Vec<&str> = components.iter().map(|c| c.names()[0].as_str()).collect();
    names.extend(properties.names().iter().map(String::as_str));

    let moved_count: usize = components.iter().map(|c| c.count()).product();
    let mut builder = LabelsBuilder::with_capacity(&names, moved_count * properties.count());
    let mut index = vec![0usize; components.len()];
    for _ in 0..moved_count {
        let mut row: Vec<i32> = components
            .iter()
            .zip(&index)
            .map(|(c, &i)| c.row(i)[0])
            .collect();
        let prefix = row.len();
        for property in properties.iter() {
            row.truncate(prefix);
            row.extend_from_slice(property);
            builder.add(&row);
        }
        increment(&mut index, &components);
    }
    builder.finish()
}

/// Odometer-style increment of a multi-index, last position fastest
fn increment(index: &mut [usize], components: &[&Labels]) {
    for position in (0..index.len()).rev() {
        index[position] += 1;
        if index[position] < components[position].count() {
            return;
        }
        index[position] = 0;
    }
}

/// Rearrange `block` (and its gradients) so that the component `axes` become
/// part of the property axis
fn move_components(
    block: &TensorBlock,
    axes: &[usize],
    properties: &Arc<Labels>,
) -> TensorResult<TensorBlock> {
    let shape = block.shape();
    let rank = shape.len();
    // component i lives on array axis i + 1
    let moved_axes: Vec<usize> = axes.iter().map(|a| a + 1).collect();
    let kept_axes: Vec<usize> = (0..rank - 1).filter(|a| !moved_axes.contains(a)).collect();

    let mut new_shape: Vec<usize> = kept_axes.iter().map(|&a| shape[a]).collect();
    new_shape.push(properties.count());

    // strides of the old axes, expressed in the new array
    let new_strides = row_major_strides(&new_shape);
    let mut strides = vec![0usize; rank];
    for (i, &axis) in kept_axes.iter().enumerate() {
        strides[axis] = new_strides[i];
    }
    let mut property_stride = 1;
    strides[rank - 1] = property_stride;
    property_stride *= shape[rank - 1];
    for &axis in moved_axes.iter().rev() {
        strides[axis] = property_stride;
        property_stride *= shape[axis];
    }

    let mut values = block.values().create(&new_shape);
    {
        let input = block.values().data();
        let output = values.data_mut();
        let old_strides = row_major_strides(shape);
        for (flat, &value) in input.iter().enumerate() {
            let mut target = 0;
            for axis in 0..rank {
                let index = (flat / old_strides[axis]) % shape[axis];
                target += index * strides[axis];
            }
            output[target] = value;
        }
    }

    let components = block
        .components()
        .iter()
        .enumerate()
        .filter(|(i, _)| !axes.contains(i))
        .map(|(_, c)| Arc::clone(c))
        .collect();

    let mut result = TensorBlock::new(
        values,
        Arc::clone(block.samples()),
        components,
        Arc::clone(properties),
    )?;

    for (parameter, gradient) in block.gradients() {
        // gradient components start with the block components, so the same
        // axes can be moved
        let gradient = move_components(gradient, axes, properties)?;
        result.add_gradient(parameter, gradient)?;
    }

    Ok(result)
}
