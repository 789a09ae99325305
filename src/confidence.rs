use crate::tensor::OutputTensor;

/// Mean softmax max-class probability over all rows.
///
/// This is a heuristic for how peaked the output is, not a calibrated probability.
/// Each row contributes `1 / Σ exp(v - max)`, computed after shifting by the row
/// maximum so large scores cannot overflow. A row with `k` entries at `+inf`
/// contributes `1 / k`; a row with no finite entry contributes `1 / width`. An
/// empty tensor scores 0.0.
pub fn score(tensor: &OutputTensor) -> f64 {
    if tensor.is_empty() {
        return 0.0;
    }
    let total: f64 = tensor.iter_rows().map(row_max_probability).sum();
    total / tensor.rows() as f64
}

fn row_max_probability(row: &[f32]) -> f64 {
    if row.is_empty() {
        return 0.0;
    }
    // k infinite winners split the mass evenly.
    let infinite = row.iter().filter(|v| **v == f32::INFINITY).count();
    if infinite > 0 {
        return 1.0 / infinite as f64;
    }
    let max = row
        .iter()
        .copied()
        .filter(|v| v.is_finite())
        .fold(f32::NEG_INFINITY, f32::max);
    if !max.is_finite() {
        // Nothing usable (all -inf or NaN): treat the row as uniform.
        return 1.0 / row.len() as f64;
    }
    let max = f64::from(max);
    // The max entry contributes exp(0) = 1, so the sum is at least 1.
    let sum: f64 = row
        .iter()
        .map(|&v| f64::from(v) - max)
        .filter(|d| !d.is_nan())
        .map(f64::exp)
        .sum();
    1.0 / sum
}

#[cfg(test)]
mod tests {
    use super::score;
    use crate::tensor::OutputTensor;

    #[test]
    fn empty_tensor_scores_zero() {
        assert_eq!(score(&OutputTensor::empty()), 0.0);
    }

    #[test]
    fn uniform_row_scores_reciprocal_width() {
        let t = OutputTensor::from_rows(vec![vec![2.5; 4]]);
        assert!((score(&t) - 0.25).abs() < 1e-12);
    }

    #[test]
    fn dominant_entry_approaches_one() {
        let mut row = vec![0.0f32; 32000];
        row[17] = 80.0;
        let s = score(&OutputTensor::from_rows(vec![row]));
        assert!(s > 0.999_999 && s <= 1.0, "{s}");
    }

    #[test]
    fn huge_scores_do_not_overflow() {
        let t = OutputTensor::from_rows(vec![vec![1.0e30, 1.0e30 - 1.0e24, -1.0e30]]);
        let s = score(&t);
        assert!(s > 0.0 && s <= 1.0, "{s}");
    }

    #[test]
    fn rows_are_averaged() {
        let t = OutputTensor::from_rows(vec![vec![0.0, 0.0], vec![100.0, 0.0]]);
        let s = score(&t);
        assert!((s - 0.75).abs() < 1e-9, "{s}");
    }

    #[test]
    fn nonempty_tensor_is_in_unit_interval() {
        for row in [vec![0.0], vec![-3.0, 7.0, 1.5], vec![f32::MIN, f32::MAX]] {
            let s = score(&OutputTensor::from_rows(vec![row]));
            assert!(s > 0.0 && s <= 1.0, "{s}");
        }
    }

    #[test]
    fn infinite_entries_share_the_mass() {
        let inf = f32::INFINITY;
        assert_eq!(score(&OutputTensor::from_rows(vec![vec![inf, 0.0, 0.0]])), 1.0);
        assert_eq!(score(&OutputTensor::from_rows(vec![vec![inf, -1.0, inf, 2.0]])), 0.5);
    }

    #[test]
    fn row_without_finite_scores_is_uniform() {
        let s = score(&OutputTensor::from_rows(vec![vec![f32::NEG_INFINITY; 3]]));
        assert!((s - 1.0 / 3.0).abs() < 1e-12, "{s}");
        let s = score(&OutputTensor::from_rows(vec![vec![f32::NAN, f32::NEG_INFINITY]]));
        assert!((s - 0.5).abs() < 1e-12, "{s}");
    }

    #[test]
    fn zero_width_rows_contribute_nothing() {
        assert_eq!(score(&OutputTensor::from_rows(vec![vec![]])), 0.0);
    }
}
