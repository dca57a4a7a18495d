//! Tensor blocks and their gradients
//!
//! A [`TensorBlock`] is one dense array together with the [`Labels`]
//! describing each of its axes:
//!
//! ```text
//! values.shape() == [samples.count(), components[0].count(), ..., properties.count()]
//! ```
//!
//! Blocks can carry gradients, stored as blocks themselves and indexed by the
//! name of the parameter they are taken with respect to. A gradient block
//! follows three extra rules relative to its parent:
//!
//! - its first sample dimension is called `sample` and contains the position
//!   of the corresponding row in the parent samples;
//! - its components start with the parent components (additional gradient
//!   components, such as the cartesian direction, come after);
//! - its properties are identical to the parent properties.
//!
//! # Examples
//!
//! ```
//! use std::sync::Arc;
//! use tenmap_core::{DenseArray, Labels, TensorBlock};
//!
//! let samples = Labels::new(["structure"], &[[0], [1]]).unwrap();
//! let properties = Arc::new(Labels::new(["n"], &[[0], [1], [2]]).unwrap());
//! let values = DenseArray::zeros(&[2, 3]);
//! let mut block = TensorBlock::new(values, samples, vec![], properties.clone()).unwrap();
//!
//! let gradient = TensorBlock::new(
//!     DenseArray::zeros(&[1, 3, 3]),
//!     Labels::new(["sample", "atom"], &[[1, 0]]).unwrap(),
//!     vec![Arc::new(Labels::new(["xyz"], &[[0], [1], [2]]).unwrap())],
//!     properties,
//! )
//! .unwrap();
//! block.add_gradient("positions", gradient).unwrap();
//! assert_eq!(block.gradient_parameters(), vec!["positions"]);
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::array::Array;
use crate::error::{TensorError, TensorResult};
use crate::labels::Labels;

/// Name of the first sample dimension of gradient blocks
pub const GRADIENT_SAMPLE_NAME: &str = "sample";

/// Dense values with per-axis Labels and optional gradients
pub struct TensorBlock {
    values: Box<dyn Array>,
    samples: Arc<Labels>,
    components: Vec<Arc<Labels>>,
    properties: Arc<Labels>,
    gradients: BTreeMap<String, TensorBlock>,
}

impl TensorBlock {
    /// Create a new block without gradients
    ///
    /// # Arguments
    ///
    /// * `values` - Dense array of shape `[samples, components..., properties]`
    /// * `samples` - Labels for the first axis
    /// * `components` - Labels for the intermediate axes (possibly none)
    /// * `properties` - Labels for the last axis
    ///
    /// # Errors
    ///
    /// - [`TensorError::ShapeMismatch`] if the array shape does not match the Labels
    /// - [`TensorError::DuplicateName`] if a component dimension name is used twice,
    ///   or is also used by the samples or properties
    pub fn new(
        values: impl Into<Box<dyn Array>>,
        samples: impl Into<Arc<Labels>>,
        components: Vec<Arc<Labels>>,
        properties: impl Into<Arc<Labels>>,
    ) -> TensorResult<Self> {
        let values = values.into();
        let samples = samples.into();
        let properties = properties.into();

        check_shape(values.shape(), &samples, &components, &properties)?;
        check_component_names(&samples, &components, &properties)?;

        Ok(Self {
            values,
            samples,
            components,
            properties,
            gradients: BTreeMap::new(),
        })
    }

    /// Consuming variant of [`TensorBlock::add_gradient`]
    pub fn with_gradient(mut self, parameter: &str, gradient: TensorBlock) -> TensorResult<Self> {
        self.add_gradient(parameter, gradient)?;
        Ok(self)
    }

    /// Attach the gradient of this block with respect to `parameter`
    ///
    /// # Errors
    ///
    /// - [`TensorError::DuplicateGradient`] if this parameter already has a gradient
    /// - [`TensorError::InvalidGradient`] if the gradient samples do not start
    ///   with a `sample` dimension, or its components do not start with the
    ///   block components
    /// - [`TensorError::PropertyLabelsMismatch`] if the properties are not identical
    /// - [`TensorError::InvalidSampleReference`] if a gradient sample refers to
    ///   a sample outside of this block
    pub fn add_gradient(&mut self, parameter: &str, gradient: TensorBlock) -> TensorResult<()> {
        if parameter.is_empty() {
            return Err(TensorError::invalid_parameter(
                "gradient parameter name can not be empty",
            ));
        }
        if self.gradients.contains_key(parameter) {
            return Err(TensorError::DuplicateGradient(parameter.to_string()));
        }

        let gradient_samples = gradient.samples.names();
        if gradient_samples.first().map(String::as_str) != Some(GRADIENT_SAMPLE_NAME) {
            return Err(TensorError::invalid_gradient(
                parameter,
                format!(
                    "the first sample dimension must be '{}', got {:?}",
                    GRADIENT_SAMPLE_NAME, gradient_samples
                ),
            ));
        }

        if gradient.components.len() < self.components.len() {
            return Err(TensorError::invalid_gradient(
                parameter,
                format!(
                    "expected at least {} components, got {}",
                    self.components.len(),
                    gradient.components.len()
                ),
            ));
        }
        for (i, (parent, component)) in self
            .components
            .iter()
            .zip(&gradient.components)
            .enumerate()
        {
            if !parent.is_identical(component) {
                return Err(TensorError::invalid_gradient(
                    parameter,
                    format!("component {} differs from the block component", i),
                ));
            }
        }

        if !gradient.properties.is_identical(&self.properties) {
            return Err(TensorError::PropertyLabelsMismatch {
                context: format!(
                    "the gradient with respect to '{}' must have the same properties as its block",
                    parameter
                ),
            });
        }

        let parent_count = self.samples.count();
        for (row, values) in gradient.samples.iter().enumerate() {
            let reference = values[0];
            if reference < 0 || reference as usize >= parent_count {
                return Err(TensorError::InvalidSampleReference {
                    row,
                    reference,
                    parent_count,
                });
            }
        }

        self.gradients.insert(parameter.to_string(), gradient);
        Ok(())
    }

    /// Values of this block
    pub fn values(&self) -> &dyn Array {
        &*self.values
    }

    /// Shape of the values
    pub fn shape(&self) -> &[usize] {
        self.values.shape()
    }

    /// Labels of the first axis
    pub fn samples(&self) -> &Arc<Labels> {
        &self.samples
    }

    /// Labels of the intermediate axes
    pub fn components(&self) -> &[Arc<Labels>] {
        &self.components
    }

    /// Labels of the last axis
    pub fn properties(&self) -> &Arc<Labels> {
        &self.properties
    }

    /// Gradient with respect to `parameter`, if any
    pub fn gradient(&self, parameter: &str) -> Option<&TensorBlock> {
        self.gradients.get(parameter)
    }

    /// All gradients, ordered by parameter name
    pub fn gradients(&self) -> impl Iterator<Item = (&str, &TensorBlock)> {
        self.gradients.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Parameters of the gradients, in order
    pub fn gradient_parameters(&self) -> Vec<&str> {
        self.gradients.keys().map(String::as_str).collect()
    }

    /// Number of gradients
    pub fn gradient_count(&self) -> usize {
        self.gradients.len()
    }

    /// Order-sensitive structural comparison
    ///
    /// Two blocks are identical when all their Labels are identical, their
    /// values are equal element by element, and their gradients are identical.
    pub fn is_identical(&self, other: &TensorBlock) -> bool {
        self.samples.is_identical(&other.samples)
            && self.components.len() == other.components.len()
            && self
                .components
                .iter()
                .zip(&other.components)
                .all(|(a, b)| a.is_identical(b))
            && self.properties.is_identical(&other.properties)
            && self.values.shape() == other.values.shape()
            && self.values.data() == other.values.data()
            && self.gradients.len() == other.gradients.len()
            && self
                .gradients
                .iter()
                .zip(&other.gradients)
                .all(|((p1, g1), (p2, g2))| p1 == p2 && g1.is_identical(g2))
    }

    /// Names of every component dimension
    pub(crate) fn component_names(&self) -> Vec<&str> {
        self.components
            .iter()
            .flat_map(|c| c.names().iter().map(String::as_str))
            .collect()
    }
}

impl Clone for TensorBlock {
    fn clone(&self) -> Self {
        Self {
            values: self.values.copy(),
            samples: Arc::clone(&self.samples),
            components: self.components.clone(),
            properties: Arc::clone(&self.properties),
            gradients: self.gradients.clone(),
        }
    }
}

impl fmt::Debug for TensorBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TensorBlock")
            .field("shape", &self.values.shape())
            .field("samples", &self.samples.names())
            .field(
                "components",
                &self.components.iter().map(|c| c.names()).collect::<Vec<_>>(),
            )
            .field("properties", &self.properties.names())
            .field("gradients", &self.gradient_parameters())
            .finish()
    }
}

fn check_shape(
    shape: &[usize],
    samples: &Labels,
    components: &[Arc<Labels>],
    properties: &Labels,
) -> TensorResult<()> {
    let mut expected = Vec::with_capacity(components.len() + 2);
    expected.push(samples.count());
    expected.extend(components.iter().map(|c| c.count()));
    expected.push(properties.count());

    if shape.len() != expected.len() {
        return Err(TensorError::shape_mismatch(
            "values",
            expected,
            shape.to_vec(),
        ));
    }

    let last = expected.len() - 1;
    for (axis, (&want, &got)) in expected.iter().zip(shape).enumerate() {
        if want != got {
            let name = if axis == 0 {
                "samples".to_string()
            } else if axis == last {
                "properties".to_string()
            } else {
                format!("components[{}]", axis - 1)
            };
            return Err(TensorError::shape_mismatch(name, vec![want], vec![got]));
        }
    }

    Ok(())
}

fn check_component_names(
    samples: &Labels,
    components: &[Arc<Labels>],
    properties: &Labels,
) -> TensorResult<()> {
    let mut seen: Vec<&str> = Vec::new();
    for component in components {
        for name in component.names() {
            if seen.contains(&name.as_str()) {
                return Err(TensorError::DuplicateName {
                    name: name.clone(),
                    context: "across component axes".to_string(),
                });
            }
            if samples.dimension_index(name).is_some() {
                return Err(TensorError::DuplicateName {
                    name: name.clone(),
                    context: "in both components and samples".to_string(),
                });
            }
            if properties.dimension_index(name).is_some() {
                return Err(TensorError::DuplicateName {
                    name: name.clone(),
                    context: "in both components and properties".to_string(),
                });
            }
            seen.push(name);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::array::DenseArray;

    fn properties() -> Arc<Labels> {
        Arc::new(Labels::new(["n"], &[[0], [1]]).unwrap())
    }

    fn xyz() -> Arc<Labels> {
        Arc::new(Labels::new(["xyz"], &[[0], [1], [2]]).unwrap())
    }

    fn block() -> TensorBlock {
        let samples = Labels::new(["structure", "atom"], &[[0, 0], [0, 1], [1, 0]]).unwrap();
        let values = DenseArray::from_vec((0..6).map(|i| i as f64).collect(), &[3, 2]).unwrap();
        TensorBlock::new(values, samples, vec![], properties()).unwrap()
    }

    fn gradient(rows: &[[i32; 2]]) -> TensorBlock {
        let samples = Labels::new(["sample", "atom"], rows).unwrap();
        let values = DenseArray::zeros(&[rows.len(), 3, 2]);
        TensorBlock::new(values, samples, vec![xyz()], properties()).unwrap()
    }

    #[test]
    fn test_shape_mismatch_on_samples() {
        let samples = Labels::new(["s"], &[[0], [1], [2]]).unwrap();
        let values = DenseArray::zeros(&[2, 2]);
        match TensorBlock::new(values, samples, vec![], properties()) {
            Err(TensorError::ShapeMismatch { axis, expected, got }) => {
                assert_eq!(axis, "samples");
                assert_eq!(expected, vec![3]);
                assert_eq!(got, vec![2]);
            }
            other => panic!("expected ShapeMismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_shape_mismatch_on_rank() {
        let samples = Labels::new(["s"], &[[0]]).unwrap();
        let values = DenseArray::zeros(&[1, 3, 2]);
        let result = TensorBlock::new(values, samples, vec![], properties());
        assert!(matches!(result, Err(TensorError::ShapeMismatch { .. })));
    }

    #[test]
    fn test_component_names_must_be_unique() {
        let samples = Labels::new(["s"], &[[0]]).unwrap();
        let values = DenseArray::zeros(&[1, 3, 3, 2]);
        let result = TensorBlock::new(values, samples, vec![xyz(), xyz()], properties());
        assert!(matches!(result, Err(TensorError::DuplicateName { .. })));

        let samples = Labels::new(["xyz"], &[[0]]).unwrap();
        let values = DenseArray::zeros(&[1, 3, 2]);
        let result = TensorBlock::new(values, samples, vec![xyz()], properties());
        assert!(matches!(result, Err(TensorError::DuplicateName { .. })));
    }

    #[test]
    fn test_add_gradient() {
        let mut block = block();
        block
            .add_gradient("positions", gradient(&[[0, 0], [2, 1]]))
            .unwrap();
        assert_eq!(block.gradient_count(), 1);
        assert_eq!(block.gradient("positions").unwrap().shape(), &[2, 3, 2]);

        let result = block.add_gradient("positions", gradient(&[[0, 0]]));
        assert!(matches!(result, Err(TensorError::DuplicateGradient(_))));
    }

    #[test]
    fn test_gradient_sample_reference_out_of_range() {
        let mut block = block();
        match block.add_gradient("positions", gradient(&[[0, 0], [3, 0]])) {
            Err(TensorError::InvalidSampleReference {
                row,
                reference,
                parent_count,
            }) => {
                assert_eq!(row, 1);
                assert_eq!(reference, 3);
                assert_eq!(parent_count, 3);
            }
            other => panic!("expected InvalidSampleReference, got {:?}", other),
        }

        let result = block.add_gradient("positions", gradient(&[[-1, 0]]));
        assert!(matches!(
            result,
            Err(TensorError::InvalidSampleReference { .. })
        ));
        assert_eq!(block.gradient_count(), 0);
    }

    #[test]
    fn test_gradient_properties_must_be_identical() {
        let mut block = block();
        let reordered = Labels::new(["n"], &[[1], [0]]).unwrap();
        let gradient = TensorBlock::new(
            DenseArray::zeros(&[1, 2]),
            Labels::new(["sample"], &[[0]]).unwrap(),
            vec![],
            reordered,
        )
        .unwrap();
        let result = block.add_gradient("cell", gradient);
        assert!(matches!(
            result,
            Err(TensorError::PropertyLabelsMismatch { .. })
        ));
    }

    #[test]
    fn test_gradient_samples_must_start_with_sample() {
        let mut block = block();
        let gradient = TensorBlock::new(
            DenseArray::zeros(&[1, 2]),
            Labels::new(["structure"], &[[0]]).unwrap(),
            vec![],
            properties(),
        )
        .unwrap();
        let result = block.add_gradient("cell", gradient);
        assert!(matches!(result, Err(TensorError::InvalidGradient { .. })));
    }

    #[test]
    fn test_clone_and_identical() {
        let block = block()
            .with_gradient("positions", gradient(&[[1, 1]]))
            .unwrap();
        let copy = block.clone();
        assert!(block.is_identical(&copy));
        assert!(Arc::ptr_eq(block.samples(), copy.samples()));
        assert!(!block.is_identical(&self::block()));
    }
}
