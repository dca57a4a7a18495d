//! Set operations and selections over [`Labels`]

use std::collections::HashMap;

use super::{Labels, LabelsRow};
use crate::error::{TensorError, TensorResult};

impl Labels {
    fn check_same_names(&self, other: &Labels) -> TensorResult<()> {
        if self.names != other.names {
            return Err(TensorError::IncompatibleNames {
                first: self.names.clone(),
                second: other.names.clone(),
            });
        }
        Ok(())
    }

    /// Union of the rows of `self` and `other`
    ///
    /// Rows of `self` come first, in order, followed by the rows of `other`
    /// that are not in `self`, in order.
    ///
    /// # Errors
    ///
    /// Returns [`TensorError::IncompatibleNames`] if the names differ.
    ///
    /// # Examples
    ///
    /// ```
    /// use tenmap_core::Labels;
    ///
    /// let a = Labels::new(["x"], &[[0], [1]]).unwrap();
    /// let b = Labels::new(["x"], &[[1], [2]]).unwrap();
    /// let union = a.union(&b).unwrap();
    /// assert_eq!(union.values(), &[0, 1, 2]);
    /// ```
    pub fn union(&self, other: &Labels) -> TensorResult<Labels> {
        self.union_with_mapping(other).map(|(union, _, _)| union)
    }

    /// Union of `self` and `other`, with the position of every input row in
    /// the result
    ///
    /// The two returned vectors have `self.count()` and `other.count()`
    /// entries respectively.
    pub fn union_with_mapping(
        &self,
        other: &Labels,
    ) -> TensorResult<(Labels, Vec<usize>, Vec<usize>)> {
        self.check_same_names(other)?;

        let mut values = self.values.clone();
        let mut positions = self.positions.clone();
        let first_mapping = (0..self.count()).collect();

        let mut second_mapping = Vec::with_capacity(other.count());
        for row in other.iter() {
            let position = match positions.get(row) {
                Some(&position) => position,
                None => {
                    let position = positions.len();
                    positions.insert(LabelsRow::from_slice(row), position);
                    values.extend_from_slice(row);
                    position
                }
            };
            second_mapping.push(position);
        }

        let union = Labels::from_validated(self.names.clone(), values, positions);
        Ok((union, first_mapping, second_mapping))
    }

    /// Rows present in both `self` and `other`, in the order of `self`
    ///
    /// # Errors
    ///
    /// Returns [`TensorError::IncompatibleNames`] if the names differ.
    pub fn intersection(&self, other: &Labels) -> TensorResult<Labels> {
        self.intersection_with_mapping(other)
            .map(|(intersection, _, _)| intersection)
    }

    /// Intersection of `self` and `other`, with the position of every input
    /// row in the result (`None` for rows not in the intersection)
    #[allow(clippy::type_complexity)]
    pub fn intersection_with_mapping(
        &self,
        other: &Labels,
    ) -> TensorResult<(Labels, Vec<Option<usize>>, Vec<Option<usize>>)> {
        self.check_same_names(other)?;

        let mut values = Vec::new();
        let mut positions = HashMap::new();
        let mut first_mapping = Vec::with_capacity(self.count());
        for row in self.iter() {
            if other.contains(row) {
                let position = positions.len();
                positions.insert(LabelsRow::from_slice(row), position);
                values.extend_from_slice(row);
                first_mapping.push(Some(position));
            } else {
                first_mapping.push(None);
            }
        }

        let second_mapping = other
            .iter()
            .map(|row| positions.get(row).copied())
            .collect();

        let intersection = Labels::from_validated(self.names.clone(), values, positions);
        Ok((intersection, first_mapping, second_mapping))
    }

    /// Positions of the rows matching any row of `selection`
    ///
    /// `selection` can use a subset of the dimensions of `self`; a row matches
    /// when its values agree with a selection row on every selected dimension.
    /// Positions are returned in increasing order.
    ///
    /// # Errors
    ///
    /// Returns [`TensorError::InvalidParameter`] if `selection` uses a
    /// dimension that is not part of `self`.
    ///
    /// # Examples
    ///
    /// ```
    /// use tenmap_core::Labels;
    ///
    /// let keys = Labels::new(["l", "species"], &[[0, 1], [1, 1], [0, 6]]).unwrap();
    /// let selection = Labels::new(["species"], &[[1]]).unwrap();
    /// assert_eq!(keys.select(&selection).unwrap(), vec![0, 1]);
    /// ```
    pub fn select(&self, selection: &Labels) -> TensorResult<Vec<usize>> {
        let dimensions = self.dimension_indices(selection.names())?;

        if dimensions.len() == self.size() {
            // full rows, use the hash index directly
            let mut positions: Vec<usize> = selection
                .iter()
                .filter_map(|row| {
                    let reordered: LabelsRow = (0..self.size())
                        .map(|d| {
                            let i = dimensions.iter().position(|&s| s == d).unwrap_or(d);
                            row[i]
                        })
                        .collect();
                    self.position(&reordered)
                })
                .collect();
            positions.sort_unstable();
            positions.dedup();
            return Ok(positions);
        }

        let positions = self
            .iter()
            .enumerate()
            .filter(|(_, row)| {
                let projected: LabelsRow = dimensions.iter().map(|&d| row[d]).collect();
                selection.contains(&projected)
            })
            .map(|(i, _)| i)
            .collect();
        Ok(positions)
    }

    /// New Labels keeping only the given dimensions, with repeated rows
    /// collapsed (first appearance order)
    ///
    /// Returns the projected Labels and, for every row of `self`, the position
    /// of its projection.
    pub fn project(&self, names: &[&str]) -> TensorResult<(Labels, Vec<usize>)> {
        let dimensions = self.dimension_indices(names)?;

        let mut values = Vec::new();
        let mut positions: HashMap<LabelsRow, usize> = HashMap::new();
        let mut mapping = Vec::with_capacity(self.count());
        for row in self.iter() {
            let projected: LabelsRow = dimensions.iter().map(|&d| row[d]).collect();
            let next = positions.len();
            let position = *positions.entry(projected).or_insert_with_key(|projected| {
                values.extend_from_slice(projected);
                next
            });
            mapping.push(position);
        }

        let names = names.iter().map(|n| n.to_string()).collect();
        Ok((Labels::from_validated(names, values, positions), mapping))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_union_with_mapping() {
        let a = Labels::new(["a", "b"], &[[0, 0], [1, 0], [2, 0]]).unwrap();
        let b = Labels::new(["a", "b"], &[[2, 0], [3, 0], [0, 0]]).unwrap();

        let (union, first, second) = a.union_with_mapping(&b).unwrap();
        assert_eq!(union.values(), &[0, 0, 1, 0, 2, 0, 3, 0]);
        assert_eq!(first, vec![0, 1, 2]);
        assert_eq!(second, vec![2, 3, 0]);
        assert_eq!(union.position(&[3, 0]), Some(3));
    }

    #[test]
    fn test_intersection_with_mapping() {
        let a = Labels::new(["a"], &[[0], [1], [2], [3]]).unwrap();
        let b = Labels::new(["a"], &[[3], [5], [1]]).unwrap();

        let (intersection, first, second) = a.intersection_with_mapping(&b).unwrap();
        assert_eq!(intersection.values(), &[1, 3]);
        assert_eq!(first, vec![None, Some(0), None, Some(1)]);
        assert_eq!(second, vec![Some(1), None, Some(0)]);
    }

    #[test]
    fn test_incompatible_names() {
        let a = Labels::new(["a"], &[[0]]).unwrap();
        let b = Labels::new(["b"], &[[0]]).unwrap();
        assert!(matches!(
            a.union(&b),
            Err(TensorError::IncompatibleNames { .. })
        ));
        assert!(matches!(
            a.intersection(&b),
            Err(TensorError::IncompatibleNames { .. })
        ));
    }

    #[test]
    fn test_select_partial_and_full() {
        let keys = Labels::new(["a", "b"], &[[0, 1], [1, 1], [0, 2], [1, 2]]).unwrap();

        let partial = Labels::new(["a"], &[[1]]).unwrap();
        assert_eq!(keys.select(&partial).unwrap(), vec![1, 3]);

        let reordered = Labels::new(["b", "a"], &[[2, 0], [1, 1]]).unwrap();
        assert_eq!(keys.select(&reordered).unwrap(), vec![1, 2]);

        let missing = Labels::new(["a"], &[[7]]).unwrap();
        assert!(keys.select(&missing).unwrap().is_empty());

        let unknown = Labels::new(["c"], &[[0]]).unwrap();
        assert!(keys.select(&unknown).is_err());
    }

    #[test]
    fn test_project() {
        let labels = Labels::new(["a", "b"], &[[0, 5], [1, 5], [0, 6]]).unwrap();
        let (projected, mapping) = labels.project(&["b"]).unwrap();
        assert_eq!(projected.names(), ["b"]);
        assert_eq!(projected.values(), &[5, 6]);
        assert_eq!(mapping, vec![0, 0, 1]);
    }
}
