//! Assembling new blocks from rows or columns of existing blocks
//!
//! Every structural move is a combination of two primitives:
//!
//! - [`gather_samples`] builds a block whose sample rows are taken from one or
//!   more source blocks (concatenation when merging, selection when splitting);
//! - [`gather_properties`] builds a block whose property columns are taken
//!   from one or more source blocks sharing the same samples.
//!
//! Both recurse into gradients, remapping the `sample` column so that gradient
//! rows keep pointing at the right parent row.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::block::TensorBlock;
use crate::error::{TensorError, TensorResult};
use crate::labels::{Labels, LabelsBuilder};

/// Position of one row (or column) of the output in the source blocks:
/// `(block index, row index inside that block)`
pub(crate) type Origin = (usize, usize);

/// Build a block with the given `samples`, where the output sample `j` is a
/// copy of sample `origin[j].1` of block `origin[j].0`
///
/// All blocks must share identical components and properties. Gradient rows
/// referencing a sample that is not part of `origin` are dropped.
pub(crate) fn gather_samples(
    blocks: &[&TensorBlock],
    samples: Labels,
    origin: &[Origin],
) -> TensorResult<TensorBlock> {
    let first = blocks
        .first()
        .ok_or_else(|| TensorError::invalid_parameter("can not gather samples from zero blocks"))?;
    debug_assert_eq!(samples.count(), origin.len());

    for (i, block) in blocks.iter().enumerate().skip(1) {
        check_identical_components(first, block, i)?;
        if !block.properties().is_identical(first.properties()) {
            return Err(TensorError::PropertyLabelsMismatch {
                context: format!(
                    "block {} does not have the same properties as the other blocks being merged",
                    i
                ),
            });
        }
    }
    let parameters = check_same_gradients(blocks)?;

    // values
    let mut shape = first.shape().to_vec();
    shape[0] = origin.len();
    let row_size: usize = shape[1..].iter().product();
    let mut values = first.values().create(&shape);
    {
        let output = values.data_mut();
        for (j, &(b, r)) in origin.iter().enumerate() {
            let input = blocks[b].values().data();
            output[j * row_size..(j + 1) * row_size]
                .copy_from_slice(&input[r * row_size..(r + 1) * row_size]);
        }
    }

    let mut new_positions: Vec<Vec<Option<usize>>> = blocks
        .iter()
        .map(|block| vec![None; block.samples().count()])
        .collect();
    for (j, &(b, r)) in origin.iter().enumerate() {
        new_positions[b][r] = Some(j);
    }

    let mut result = TensorBlock::new(
        values,
        samples,
        first.components().to_vec(),
        Arc::clone(first.properties()),
    )?;

    for parameter in parameters {
        let gradients: Vec<&TensorBlock> = blocks
            .iter()
            .map(|block| gradient_of(block, &parameter))
            .collect::<TensorResult<_>>()?;

        let names = gradients[0].samples().names();
        for (i, gradient) in gradients.iter().enumerate().skip(1) {
            if gradient.samples().names() != names {
                return Err(TensorError::invalid_gradient(
                    &parameter,
                    format!(
                        "block {} has gradient sample names {:?}, expected {:?}",
                        i,
                        gradient.samples().names(),
                        names
                    ),
                ));
            }
        }

        let mut builder = LabelsBuilder::new(names);
        let mut gradient_origin = Vec::new();
        for (b, gradient) in gradients.iter().enumerate() {
            for (r, row) in gradient.samples().iter().enumerate() {
                if let Some(j) = new_positions[b][row[0] as usize] {
                    let mut new_row = row.to_vec();
                    new_row[0] = j as i32;
                    builder.add(&new_row);
                    gradient_origin.push((b, r));
                }
            }
        }

        let gradient = gather_samples(&gradients, builder.finish()?, &gradient_origin)?;
        result.add_gradient(&parameter, gradient)?;
    }

    Ok(result)
}

/// Build a block with the given `properties`, where the output property `j`
/// is a copy of property `origin[j].1` of block `origin[j].0`
///
/// `samples` are the output samples, and `sample_mapping[b][r]` is the
/// position of sample `r` of block `b` in them. Entries missing from a
/// source block are filled with zeros; this happens in gradients, where
/// different blocks can have gradients for different samples.
pub(crate) fn gather_properties(
    blocks: &[&TensorBlock],
    samples: Arc<Labels>,
    sample_mapping: &[Vec<usize>],
    properties: Arc<Labels>,
    origin: &[Origin],
) -> TensorResult<TensorBlock> {
    let first = blocks.first().ok_or_else(|| {
        TensorError::invalid_parameter("can not gather properties from zero blocks")
    })?;
    debug_assert_eq!(properties.count(), origin.len());

    for (i, block) in blocks.iter().enumerate().skip(1) {
        check_identical_components(first, block, i)?;
    }
    let parameters = check_same_gradients(blocks)?;

    let mut shape = first.shape().to_vec();
    shape[0] = samples.count();
    let last = shape.len() - 1;
    shape[last] = origin.len();
    let component_size: usize = shape[1..last].iter().product();
    let new_count = origin.len();

    let mut values = first.values().create(&shape);
    {
        let output = values.data_mut();
        for (j, &(b, p)) in origin.iter().enumerate() {
            let block = blocks[b];
            let input = block.values().data();
            let old_count = block.properties().count();
            for (r, &s) in sample_mapping[b].iter().enumerate() {
                for c in 0..component_size {
                    let src = (r * component_size + c) * old_count + p;
                    let dst = (s * component_size + c) * new_count + j;
                    output[dst] = input[src];
                }
            }
        }
    }

    let mut result = TensorBlock::new(
        values,
        Arc::clone(&samples),
        first.components().to_vec(),
        Arc::clone(&properties),
    )?;

    for parameter in parameters {
        let gradients: Vec<&TensorBlock> = blocks
            .iter()
            .map(|block| gradient_of(block, &parameter))
            .collect::<TensorResult<_>>()?;

        // re-point every gradient row at the merged parent samples, then
        // merge the gradient samples of all blocks
        let names = gradients[0].samples().names().to_vec();
        let mut merged = LabelsBuilder::new(&names).finish()?;
        let mut gradient_mapping = Vec::with_capacity(gradients.len());
        for (b, gradient) in gradients.iter().enumerate() {
            if gradient.samples().names() != names.as_slice() {
                return Err(TensorError::invalid_gradient(
                    &parameter,
                    format!(
                        "block {} has gradient sample names {:?}, expected {:?}",
                        b,
                        gradient.samples().names(),
                        names
                    ),
                ));
            }

            let mut builder = LabelsBuilder::with_capacity(&names, gradient.samples().count());
            for row in gradient.samples().iter() {
                let mut new_row = row.to_vec();
                new_row[0] = sample_mapping[b][row[0] as usize] as i32;
                builder.add(&new_row);
            }
            let (union, _, mapping) = merged.union_with_mapping(&builder.finish()?)?;
            merged = union;
            gradient_mapping.push(mapping);
        }

        let gradient = gather_properties(
            &gradients,
            Arc::new(merged),
            &gradient_mapping,
            Arc::clone(&properties),
            origin,
        )?;
        result.add_gradient(&parameter, gradient)?;
    }

    Ok(result)
}

fn gradient_of<'a>(block: &'a TensorBlock, parameter: &str) -> TensorResult<&'a TensorBlock> {
    block.gradient(parameter).ok_or_else(|| {
        TensorError::invalid_gradient(parameter, "missing from one of the blocks being merged")
    })
}

fn check_identical_components(
    first: &TensorBlock,
    block: &TensorBlock,
    index: usize,
) -> TensorResult<()> {
    if block.components().len() != first.components().len() {
        return Err(TensorError::InconsistentComponents {
            block: index,
            reason: format!(
                "expected {} component axes, got {}",
                first.components().len(),
                block.components().len()
            ),
        });
    }
    for (axis, (a, b)) in first
        .components()
        .iter()
        .zip(block.components())
        .enumerate()
    {
        if !a.is_identical(b) {
            return Err(TensorError::InconsistentComponents {
                block: index,
                reason: format!("component axis {} differs", axis),
            });
        }
    }
    Ok(())
}

/// Check that all blocks have gradients for the same parameters, returning them
fn check_same_gradients(blocks: &[&TensorBlock]) -> TensorResult<Vec<String>> {
    let expected: BTreeSet<&str> = blocks[0].gradient_parameters().into_iter().collect();
    for (i, block) in blocks.iter().enumerate().skip(1) {
        let got: BTreeSet<&str> = block.gradient_parameters().into_iter().collect();
        if got != expected {
            return Err(TensorError::InconsistentGradients {
                block: i,
                expected: expected.iter().map(|s| s.to_string()).collect(),
                got: got.iter().map(|s| s.to_string()).collect(),
            });
        }
    }
    Ok(expected.into_iter().map(str::to_string).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::array::DenseArray;

    fn properties() -> Arc<Labels> {
        Arc::new(Labels::new(["n"], &[[0], [1]]).unwrap())
    }

    fn block(structure: i32, first_value: f64) -> TensorBlock {
        let samples = Labels::new(["structure"], &[[structure], [structure + 10]]).unwrap();
        let values: Vec<f64> = (0..4).map(|i| first_value + i as f64).collect();
        let values = DenseArray::from_vec(values, &[2, 2]).unwrap();
        let gradient = TensorBlock::new(
            DenseArray::from_elem(&[1, 2], first_value),
            Labels::new(["sample"], &[[1]]).unwrap(),
            vec![],
            properties(),
        )
        .unwrap();
        TensorBlock::new(values, samples, vec![], properties())
            .unwrap()
            .with_gradient("g", gradient)
            .unwrap()
    }

    #[test]
    fn test_gather_samples_concatenates_and_remaps_gradients() {
        let a = block(0, 0.0);
        let b = block(1, 100.0);
        let samples = Labels::new(["structure"], &[[0], [10], [1], [11]]).unwrap();
        let origin = [(0, 0), (0, 1), (1, 0), (1, 1)];

        let merged = gather_samples(&[&a, &b], samples, &origin).unwrap();
        assert_eq!(
            merged.values().data(),
            &[0.0, 1.0, 2.0, 3.0, 100.0, 101.0, 102.0, 103.0]
        );

        let gradient = merged.gradient("g").unwrap();
        assert_eq!(gradient.samples().values(), &[1, 3]);
        assert_eq!(gradient.values().data(), &[0.0, 0.0, 100.0, 100.0]);
    }

    #[test]
    fn test_gather_samples_drops_unreferenced_gradient_rows() {
        let a = block(0, 0.0);
        let samples = Labels::new(["structure"], &[[0]]).unwrap();
        let selected = gather_samples(&[&a], samples, &[(0, 0)]).unwrap();
        assert_eq!(selected.values().data(), &[0.0, 1.0]);
        assert_eq!(selected.gradient("g").unwrap().samples().count(), 0);
    }

    #[test]
    fn test_gather_properties_zero_fills_gradients() {
        let a = block(0, 5.0);
        let no_gradient_rows = TensorBlock::new(
            DenseArray::zeros(&[0, 2]),
            Labels::empty(&["sample"]).unwrap(),
            vec![],
            properties(),
        )
        .unwrap();
        let b = TensorBlock::new(
            DenseArray::from_elem(&[2, 2], 7.0),
            Arc::clone(a.samples()),
            vec![],
            properties(),
        )
        .unwrap()
        .with_gradient("g", no_gradient_rows)
        .unwrap();

        let new_properties =
            Arc::new(Labels::new(["n", "k"], &[[0, 0], [1, 0], [0, 1], [1, 1]]).unwrap());
        let origin = [(0, 0), (0, 1), (1, 0), (1, 1)];
        let identity = vec![vec![0, 1], vec![0, 1]];
        let merged = gather_properties(
            &[&a, &b],
            Arc::clone(a.samples()),
            &identity,
            new_properties,
            &origin,
        )
        .unwrap();

        assert_eq!(merged.shape(), &[2, 4]);
        assert_eq!(
            merged.values().data(),
            &[5.0, 6.0, 7.0, 7.0, 7.0, 8.0, 7.0, 7.0]
        );
        let gradient = merged.gradient("g").unwrap();
        assert_eq!(gradient.samples().values(), &[1]);
        assert_eq!(gradient.values().data(), &[5.0, 5.0, 0.0, 0.0]);
    }

    #[test]
    fn test_gather_requires_same_gradients() {
        let a = block(0, 0.0);
        let b = TensorBlock::new(
            DenseArray::zeros(&[2, 2]),
            Labels::new(["structure"], &[[1], [11]]).unwrap(),
            vec![],
            properties(),
        )
        .unwrap();
        let samples = Labels::new(["structure"], &[[0], [1]]).unwrap();
        let result = gather_samples(&[&a, &b], samples, &[(0, 0), (1, 0)]);
        assert!(matches!(
            result,
            Err(TensorError::InconsistentGradients { .. })
        ));
    }
}
