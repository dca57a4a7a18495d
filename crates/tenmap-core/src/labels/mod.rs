//! Named, ordered sets of integer rows
//!
//! [`Labels`] are the metadata attached to every axis of every tensor in
//! TenMap. A Labels instance has a list of dimension names and a list of rows;
//! each row contains one `i32` per dimension. Rows are unique, so a Labels is a
//! *set* of tuples, but the order of the rows is kept and defines the storage
//! order along the corresponding array axis.
//!
//! Labels are immutable once built. They are created through
//! [`LabelsBuilder`] (or the [`Labels::new`] shortcut for literal rows) which
//! validates the names, the row widths and the row uniqueness, and builds a
//! hash index used by [`Labels::position`].
//!
//! # Examples
//!
//! ```
//! use tenmap_core::Labels;
//!
//! let labels = Labels::new(["structure", "atom"], &[[0, 1], [0, 2], [1, 0]]).unwrap();
//! assert_eq!(labels.count(), 3);
//! assert_eq!(labels.size(), 2);
//! assert_eq!(labels.position(&[0, 2]), Some(1));
//! assert_eq!(labels.position(&[4, 4]), None);
//! ```

mod builder;
mod set_ops;

pub use builder::LabelsBuilder;

use smallvec::SmallVec;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::error::{TensorError, TensorResult};

/// A single row of a [`Labels`], stored inline for the common small widths
pub type LabelsRow = SmallVec<[i32; 4]>;

/// Immutable set of named integer rows with O(1) row lookup
///
/// Equality and hashing are set-style: two Labels are equal when they have
/// the same names (in the same order) and contain the same rows, regardless of
/// the row order. Use [`Labels::is_identical`] for the order-sensitive check.
#[derive(Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(
    feature = "serde",
    serde(try_from = "builder::RawLabels", into = "builder::RawLabels")
)]
pub struct Labels {
    names: Vec<String>,
    /// Row-major values, `count * names.len()` entries
    values: Vec<i32>,
    positions: HashMap<LabelsRow, usize>,
}

impl Labels {
    /// Create Labels from literal rows of a fixed width
    ///
    /// # Errors
    ///
    /// Returns an error if a name is invalid or repeated, or if the same row
    /// appears more than once.
    ///
    /// # Examples
    ///
    /// ```
    /// use tenmap_core::Labels;
    ///
    /// let species = Labels::new(["species"], &[[1], [6], [8]]).unwrap();
    /// assert_eq!(species.names(), ["species"]);
    /// assert_eq!(species.row(2), &[8]);
    /// ```
    pub fn new<const N: usize>(names: [&str; N], rows: &[[i32; N]]) -> TensorResult<Labels> {
        let mut builder = LabelsBuilder::with_capacity(names, rows.len());
        for row in rows {
            builder.add(row);
        }
        builder.finish()
    }

    /// Create Labels from flat row-major values
    ///
    /// # Errors
    ///
    /// Returns [`TensorError::WidthMismatch`] when `values.len()` is not a
    /// multiple of the number of names, and the usual builder errors otherwise.
    pub fn from_flat<S: AsRef<str>>(names: &[S], values: Vec<i32>) -> TensorResult<Labels> {
        let width = names.len();
        if width == 0 {
            if !values.is_empty() {
                return Err(TensorError::WidthMismatch {
                    index: 0,
                    expected: 0,
                    got: values.len(),
                });
            }
            return LabelsBuilder::new(names.iter().map(AsRef::as_ref)).finish();
        }

        if values.len() % width != 0 {
            return Err(TensorError::WidthMismatch {
                index: values.len() / width,
                expected: width,
                got: values.len() % width,
            });
        }

        let mut builder =
            LabelsBuilder::with_capacity(names.iter().map(AsRef::as_ref), values.len() / width);
        for row in values.chunks_exact(width) {
            builder.add(row);
        }
        builder.finish()
    }

    /// Labels with the given names and no rows
    pub fn empty<S: AsRef<str>>(names: &[S]) -> TensorResult<Labels> {
        LabelsBuilder::new(names.iter().map(AsRef::as_ref)).finish()
    }

    /// Labels with a single dimension named `_` and a single row `[0]`
    ///
    /// Used as the keys of a tensor map once every key dimension has been
    /// moved into the blocks, and as the component-free placeholder axis.
    pub fn single() -> Labels {
        let mut positions = HashMap::with_capacity(1);
        positions.insert(LabelsRow::from_slice(&[0]), 0);
        Labels {
            names: vec!["_".to_string()],
            values: vec![0],
            positions,
        }
    }

    /// Assemble Labels from already validated parts
    pub(crate) fn from_validated(
        names: Vec<String>,
        values: Vec<i32>,
        positions: HashMap<LabelsRow, usize>,
    ) -> Labels {
        debug_assert!(names.is_empty() || values.len() == positions.len() * names.len());
        Labels {
            names,
            values,
            positions,
        }
    }

    /// Dimension names, in order
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Number of dimensions (width of every row)
    pub fn size(&self) -> usize {
        self.names.len()
    }

    /// Number of rows
    pub fn count(&self) -> usize {
        self.positions.len()
    }

    /// Is this Labels free of rows?
    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// All values, in row-major order
    pub fn values(&self) -> &[i32] {
        &self.values
    }

    /// Row at `index`
    ///
    /// # Panics
    ///
    /// Panics if `index >= self.count()`.
    pub fn row(&self, index: usize) -> &[i32] {
        assert!(
            index < self.count(),
            "row index {} out of bounds for labels with {} rows",
            index,
            self.count()
        );
        let width = self.size();
        &self.values[index * width..(index + 1) * width]
    }

    /// Row at `index`, or `None` if out of bounds
    pub fn get(&self, index: usize) -> Option<&[i32]> {
        if index < self.count() {
            Some(self.row(index))
        } else {
            None
        }
    }

    /// Iterate over rows in storage order
    pub fn iter(&self) -> LabelsIter<'_> {
        LabelsIter {
            labels: self,
            index: 0,
        }
    }

    /// Position of `row` in these Labels
    ///
    /// # Complexity
    ///
    /// O(1) amortized, through the hash index built at construction.
    pub fn position(&self, row: &[i32]) -> Option<usize> {
        if row.len() != self.size() {
            return None;
        }
        self.positions.get(row).copied()
    }

    /// Does these Labels contain `row`?
    pub fn contains(&self, row: &[i32]) -> bool {
        self.position(row).is_some()
    }

    /// Index of the dimension called `name`
    pub fn dimension_index(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    /// Indexes of several dimensions
    ///
    /// # Errors
    ///
    /// Returns [`TensorError::InvalidParameter`] if one of the names is not
    /// part of these Labels.
    pub fn dimension_indices<S: AsRef<str>>(&self, names: &[S]) -> TensorResult<Vec<usize>> {
        names
            .iter()
            .map(|name| {
                let name = name.as_ref();
                self.dimension_index(name).ok_or_else(|| {
                    TensorError::invalid_parameter(format!(
                        "'{}' is not part of the dimensions {:?}",
                        name, self.names
                    ))
                })
            })
            .collect()
    }

    /// All values of the dimension called `name`, in row order
    pub fn column(&self, name: &str) -> Option<Vec<i32>> {
        let index = self.dimension_index(name)?;
        Some(self.iter().map(|row| row[index]).collect())
    }

    /// Order-sensitive comparison: same names, same rows in the same order
    pub fn is_identical(&self, other: &Labels) -> bool {
        self.names == other.names && self.values == other.values && self.count() == other.count()
    }

    /// Same names as `other`, in the same order
    pub fn same_names(&self, other: &Labels) -> bool {
        self.names == other.names
    }
}

/// Iterator over the rows of a [`Labels`]
#[derive(Debug, Clone)]
pub struct LabelsIter<'a> {
    labels: &'a Labels,
    index: usize,
}

impl<'a> Iterator for LabelsIter<'a> {
    type Item = &'a [i32];

    fn next(&mut self) -> Option<Self::Item> {
        let row = self.labels.get(self.index)?;
        self.index += 1;
        Some(row)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.labels.count() - self.index;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for LabelsIter<'_> {}

impl<'a> IntoIterator for &'a Labels {
    type Item = &'a [i32];
    type IntoIter = LabelsIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl PartialEq for Labels {
    fn eq(&self, other: &Labels) -> bool {
        self.names == other.names
            && self.count() == other.count()
            && self.iter().all(|row| other.contains(row))
    }
}

impl Eq for Labels {}

impl Hash for Labels {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.names.hash(state);
        self.count().hash(state);
        // order-independent combination, consistent with `PartialEq`
        let mut combined = 0u64;
        for row in self.iter() {
            let mut hasher = DefaultHasher::new();
            row.hash(&mut hasher);
            combined = combined.wrapping_add(hasher.finish());
        }
        state.write_u64(combined);
    }
}

impl fmt::Debug for Labels {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Labels")
            .field("names", &self.names)
            .field("count", &self.count())
            .field("rows", &self.iter().collect::<Vec<_>>())
            .finish()
    }
}

impl fmt::Display for Labels {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Labels({})", self.names.join(", "))?;
        for row in self.iter() {
            let values: Vec<String> = row.iter().map(|v| v.to_string()).collect();
            writeln!(f, "  ({})", values.join(", "))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_and_accessors() {
        let labels = Labels::new(["a", "b"], &[[0, 1], [1, 0], [2, 2]]).unwrap();
        assert_eq!(labels.names(), ["a", "b"]);
        assert_eq!(labels.size(), 2);
        assert_eq!(labels.count(), 3);
        assert!(!labels.is_empty());
        assert_eq!(labels.values(), &[0, 1, 1, 0, 2, 2]);
        assert_eq!(labels.row(1), &[1, 0]);
        assert_eq!(labels.get(3), None);
        assert_eq!(labels.column("b"), Some(vec![1, 0, 2]));
        assert_eq!(labels.column("c"), None);
    }

    #[test]
    fn test_position_roundtrip() {
        let labels = Labels::new(["x", "y", "z"], &[[3, 2, 1], [0, 0, 0], [-1, 5, 9]]).unwrap();
        for (i, row) in labels.iter().enumerate() {
            assert_eq!(labels.position(row), Some(i));
        }
        assert_eq!(labels.position(&[3, 2]), None);
        assert!(!labels.contains(&[1, 1, 1]));
    }

    #[test]
    fn test_duplicate_row() {
        let result = Labels::new(["a"], &[[0], [0]]);
        assert!(matches!(result, Err(TensorError::DuplicateRow { .. })));
    }

    #[test]
    fn test_from_flat_width_mismatch() {
        let result = Labels::from_flat(&["a", "b"], vec![0, 1, 2]);
        assert!(matches!(result, Err(TensorError::WidthMismatch { .. })));

        let labels = Labels::from_flat(&["a", "b"], vec![0, 1, 2, 3]).unwrap();
        assert_eq!(labels.count(), 2);
    }

    #[test]
    fn test_empty_and_single() {
        let empty = Labels::empty(&["a", "b"]).unwrap();
        assert_eq!(empty.count(), 0);
        assert_eq!(empty.size(), 2);
        assert_eq!(empty.iter().count(), 0);

        let single = Labels::single();
        assert_eq!(single.names(), ["_"]);
        assert_eq!(single.position(&[0]), Some(0));
    }

    #[test]
    fn test_set_equality_ignores_order() {
        let a = Labels::new(["a"], &[[0], [1], [2]]).unwrap();
        let b = Labels::new(["a"], &[[2], [0], [1]]).unwrap();
        let c = Labels::new(["b"], &[[0], [1], [2]]).unwrap();

        assert_eq!(a, b);
        assert!(!a.is_identical(&b));
        assert!(a.is_identical(&a.clone()));
        assert_ne!(a, c);

        let hash = |labels: &Labels| {
            let mut hasher = DefaultHasher::new();
            labels.hash(&mut hasher);
            hasher.finish()
        };
        assert_eq!(hash(&a), hash(&b));
    }

    #[test]
    fn test_dimension_indices() {
        let labels = Labels::new(["a", "b", "c"], &[[0, 1, 2]]).unwrap();
        assert_eq!(labels.dimension_indices(&["c", "a"]).unwrap(), vec![2, 0]);
        assert!(matches!(
            labels.dimension_indices(&["d"]),
            Err(TensorError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_display() {
        let labels = Labels::new(["a", "b"], &[[0, 1]]).unwrap();
        assert_eq!(labels.to_string(), "Labels(a, b)\n  (0, 1)\n");
    }
}
