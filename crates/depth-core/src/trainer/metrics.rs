//! Error statistics of predicted against true depths

use crate::models::{EvaluationSet, Metrics};

/// MAE, RMSE, R² and max error over paired values
///
/// R² is 1 for a perfect fit of a constant target and 0 for any other fit
/// of one, since the variance it is relative to is zero.
pub fn evaluate(actual: &[f64], predicted: &[f64], evaluated_on: EvaluationSet) -> Metrics {
    let n = actual.len().min(predicted.len());
    if n == 0 {
        return Metrics {
            mae: f64::NAN,
            rmse: f64::NAN,
            r2: f64::NAN,
            max_error: f64::NAN,
            samples: 0,
            evaluated_on,
        };
    }

    let mean = actual[..n].iter().sum::<f64>() / n as f64;
    let mut abs_sum = 0.0;
    let mut ss_res = 0.0;
    let mut ss_tot = 0.0;
    let mut max_error: f64 = 0.0;
    for (y, p) in actual.iter().zip(predicted) {
        let err = y - p;
        abs_sum += err.abs();
        ss_res += err * err;
        ss_tot += (y - mean) * (y - mean);
        max_error = max_error.max(err.abs());
    }

    let r2 = if ss_tot > 0.0 {
        1.0 - ss_res / ss_tot
    } else if ss_res == 0.0 {
        1.0
    } else {
        0.0
    };

    Metrics {
        mae: abs_sum / n as f64,
        rmse: (ss_res / n as f64).sqrt(),
        r2,
        max_error,
        samples: n,
        evaluated_on,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_values() {
        let m = evaluate(&[1.0, 2.0, 3.0, 4.0], &[1.0, 2.0, 4.0, 2.0], EvaluationSet::HeldOut);
        assert_eq!(m.samples, 4);
        assert!((m.mae - 0.75).abs() < 1e-12);
        assert!((m.rmse - (5.0f64 / 4.0).sqrt()).abs() < 1e-12);
        assert!((m.r2 - 0.0).abs() < 1e-12);
        assert_eq!(m.max_error, 2.0);
    }

    #[test]
    fn test_perfect_fit() {
        let m = evaluate(&[3.0, 5.0], &[3.0, 5.0], EvaluationSet::Training);
        assert_eq!(m.mae, 0.0);
        assert_eq!(m.r2, 1.0);
        assert_eq!(m.evaluated_on, EvaluationSet::Training);
    }

    #[test]
    fn test_constant_target() {
        assert_eq!(evaluate(&[4.0, 4.0], &[4.0, 4.0], EvaluationSet::HeldOut).r2, 1.0);
        assert_eq!(evaluate(&[4.0, 4.0], &[3.0, 4.0], EvaluationSet::HeldOut).r2, 0.0);
    }

    #[test]
    fn test_empty_is_nan() {
        let m = evaluate(&[], &[], EvaluationSet::HeldOut);
        assert_eq!(m.samples, 0);
        assert!(m.mae.is_nan());
    }
}
