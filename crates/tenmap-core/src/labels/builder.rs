//! Validating builder for [`Labels`]

use std::collections::HashMap;

use super::{Labels, LabelsRow};
use crate::error::{TensorError, TensorResult};

/// Incremental builder for [`Labels`]
///
/// Rows are collected as-is by [`LabelsBuilder::add`]; every invariant is
/// checked once, by [`LabelsBuilder::finish`].
///
/// # Examples
///
/// ```
/// use tenmap_core::LabelsBuilder;
///
/// let mut builder = LabelsBuilder::new(["structure", "center"]);
/// builder.add(&[0, 0]).add(&[0, 1]).add(&[1, 0]);
/// let labels = builder.finish().unwrap();
/// assert_eq!(labels.count(), 3);
/// ```
#[derive(Debug, Clone)]
pub struct LabelsBuilder {
    names: Vec<String>,
    rows: Vec<LabelsRow>,
}

impl LabelsBuilder {
    /// Start building Labels with the given dimension names
    pub fn new<S: AsRef<str>>(names: impl IntoIterator<Item = S>) -> Self {
        Self::with_capacity(names, 0)
    }

    /// Start building Labels, reserving space for `capacity` rows
    pub fn with_capacity<S: AsRef<str>>(
        names: impl IntoIterator<Item = S>,
        capacity: usize,
    ) -> Self {
        Self {
            names: names.into_iter().map(|n| n.as_ref().to_string()).collect(),
            rows: Vec::with_capacity(capacity),
        }
    }

    /// Dimension names of the Labels being built
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Number of rows added so far
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Has no row been added yet?
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Add a row; the width is checked by [`LabelsBuilder::finish`]
    pub fn add(&mut self, row: &[i32]) -> &mut Self {
        self.rows.push(LabelsRow::from_slice(row));
        self
    }

    /// Validate everything and build the Labels
    ///
    /// # Errors
    ///
    /// - [`TensorError::InvalidName`] / [`TensorError::DuplicateName`] for bad names
    /// - [`TensorError::WidthMismatch`] when a row does not have one value per name
    /// - [`TensorError::DuplicateRow`] when a row is present twice
    /// - [`TensorError::InvalidParameter`] for rows in Labels without names
    pub fn finish(self) -> TensorResult<Labels> {
        validate_names(&self.names, "in the same labels")?;

        let width = self.names.len();
        if width == 0 && !self.rows.is_empty() {
            return Err(TensorError::invalid_parameter(
                "labels without dimension names can not contain rows",
            ));
        }

        let mut values = Vec::with_capacity(self.rows.len() * width);
        let mut positions = HashMap::with_capacity(self.rows.len());
        for (index, row) in self.rows.into_iter().enumerate() {
            if row.len() != width {
                return Err(TensorError::WidthMismatch {
                    index,
                    expected: width,
                    got: row.len(),
                });
            }

            values.extend_from_slice(&row);
            if let Some(row) = insert_unique(&mut positions, row, index) {
                return Err(TensorError::DuplicateRow {
                    names: self.names,
                    row: row.to_vec(),
                });
            }
        }

        Ok(Labels::from_validated(self.names, values, positions))
    }
}

/// Insert `row`, returning it back if it was already present
fn insert_unique(
    positions: &mut HashMap<LabelsRow, usize>,
    row: LabelsRow,
    index: usize,
) -> Option<LabelsRow> {
    use std::collections::hash_map::Entry;
    match positions.entry(row) {
        Entry::Occupied(entry) => Some(entry.key().clone()),
        Entry::Vacant(entry) => {
            entry.insert(index);
            None
        }
    }
}

/// Check that every name is a valid identifier and that names are unique
pub(crate) fn validate_names(names: &[String], context: &str) -> TensorResult<()> {
    for (i, name) in names.iter().enumerate() {
        validate_identifier(name)?;
        if names[..i].contains(name) {
            return Err(TensorError::DuplicateName {
                name: name.clone(),
                context: context.to_string(),
            });
        }
    }
    Ok(())
}

fn validate_identifier(name: &str) -> TensorResult<()> {
    let invalid = |reason: &str| TensorError::InvalidName {
        name: name.to_string(),
        reason: reason.to_string(),
    };

    let mut chars = name.chars();
    match chars.next() {
        None => return Err(invalid("names can not be empty")),
        Some(c) if c.is_ascii_digit() => return Err(invalid("names can not start with a digit")),
        Some(_) => {}
    }

    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(invalid(
            "names can only contain ASCII letters, digits and underscores",
        ));
    }

    Ok(())
}

/// Plain representation used for (de)serializing Labels through serde
#[cfg(feature = "serde")]
#[derive(serde::Serialize, serde::Deserialize)]
pub(super) struct RawLabels {
    names: Vec<String>,
    values: Vec<i32>,
}

#[cfg(feature = "serde")]
impl From<Labels> for RawLabels {
    fn from(labels: Labels) -> Self {
        RawLabels {
            names: labels.names,
            values: labels.values,
        }
    }
}

#[cfg(feature = "serde")]
impl TryFrom<RawLabels> for Labels {
    type Error = TensorError;

    fn try_from(raw: RawLabels) -> Result<Self, Self::Error> {
        Labels::from_flat(&raw.names, raw.values)
    }
}
