use nalgebra::DVector;
use std::collections::BTreeMap;

use crate::error::NestedKrigingError;
use crate::points::RescaledPoints;

/// A single subgroup's rescaled design points and response sub-vector.
pub struct Subgroup {
    pub points: RescaledPoints,
    pub y: DVector<f64>,
}

/// Dense-reindexes an arbitrary-label partition vector to `0..N-1`,
/// dropping empty labels and preserving within-group order, then splits
/// the point set and response vector accordingly.
///
/// Label values and their ordering carry no meaning: any bijection of
/// `clusters` produces the same set of subgroups (possibly enumerated in a
/// different order), which aggregation is invariant to since it only sums
/// over subgroups.
pub fn split_partition(
    clusters: &[i64],
    points: &RescaledPoints,
    y: &DVector<f64>,
) -> Result<Vec<Subgroup>, NestedKrigingError> {
    if clusters.len() != points.n() {
        return Err(NestedKrigingError::InvalidShape {
            argument: "clusters",
            expected: points.n().to_string(),
            actual: clusters.len().to_string(),
        });
    }
    if y.len() != points.n() {
        return Err(NestedKrigingError::InvalidShape {
            argument: "Y",
            expected: points.n().to_string(),
            actual: y.len().to_string(),
        });
    }

    // Stable, deterministic dense reindexing: sort distinct labels so that
    // relabelling (any bijection) always yields the same grouping.
    let mut label_to_indices: BTreeMap<i64, Vec<usize>> = BTreeMap::new();
    for (i, &label) in clusters.iter().enumerate() {
        label_to_indices.entry(label).or_default().push(i);
    }

    let subgroups = label_to_indices
        .into_values()
        .filter(|indices| !indices.is_empty())
        .map(|indices| {
            let sub_points = points.select_columns(&indices);
            let sub_y = DVector::from_iterator(indices.len(), indices.iter().map(|&i| y[i]));
            Subgroup { points: sub_points, y: sub_y }
        })
        .collect();

    Ok(subgroups)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::Kernel;
    use crate::params::CovarianceParams;
    use nalgebra::DMatrix;

    fn points4() -> RescaledPoints {
        let params = CovarianceParams::new(1, Kernel::Exponential, &[1.0], 1.0).unwrap();
        let raw = DMatrix::from_row_slice(4, 1, &[0.0, 1.0, 2.0, 3.0]);
        RescaledPoints::from_raw(&raw, &params, None).unwrap()
    }

    #[test]
    fn splits_preserving_within_group_order() {
        let points = points4();
        let y = DVector::from_vec(vec![10.0, 11.0, 12.0, 13.0]);

        let groups = split_partition(&[0, 1, 0, 1], &points, &y).unwrap();

        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].points.n(), 2);
        assert_eq!(groups[0].points.point(0)[0], 0.0);
        assert_eq!(groups[0].points.point(1)[0], 2.0);
        assert_eq!(groups[0].y.as_slice(), &[10.0, 12.0]);
    }

    #[test]
    fn arbitrary_labels_reindex_densely_and_drop_empties() {
        let points = points4();
        let y = DVector::from_vec(vec![10.0, 11.0, 12.0, 13.0]);

        let groups = split_partition(&[42, 42, -7, -7], &points, &y).unwrap();
        assert_eq!(groups.len(), 2);
        // label -7 < 42 in sorted order, so it becomes group 0
        assert_eq!(groups[0].y.as_slice(), &[12.0, 13.0]);
        assert_eq!(groups[1].y.as_slice(), &[10.0, 11.0]);
    }

    #[test]
    fn relabelling_by_bijection_does_not_change_grouping_content() {
        let points = points4();
        let y = DVector::from_vec(vec![10.0, 11.0, 12.0, 13.0]);

        let a = split_partition(&[0, 1, 0, 1], &points, &y).unwrap();
        let b = split_partition(&[100, 7, 100, 7], &points, &y).unwrap();

        let mut a_sets: Vec<Vec<f64>> = a.iter().map(|g| g.y.as_slice().to_vec()).collect();
        let mut b_sets: Vec<Vec<f64>> = b.iter().map(|g| g.y.as_slice().to_vec()).collect();
        a_sets.sort_by(|x, y| x.partial_cmp(y).unwrap());
        b_sets.sort_by(|x, y| x.partial_cmp(y).unwrap());

        assert_eq!(a_sets, b_sets);
    }
}
