use crate::domain::errors::AppError;

/// Equal error rate in percent, from per-utterance scores (higher means
/// more bonafide-like) and binary labels (1 = bonafide, 0 = spoof).
///
/// Sweeps thresholds from the highest score down; the EER sits where the
/// false-rejection and false-acceptance curves cross, linearly interpolated
/// between the bracketing sweep points.
pub fn calculate_eer(scores: &[f64], labels: &[i64]) -> Result<f64, AppError> {
    if scores.len() != labels.len() {
        return Err(AppError::Metric(format!(
            "scores and labels differ in length: {} vs {}",
            scores.len(),
            labels.len()
        )));
    }
    if scores.is_empty() {
        return Err(AppError::Metric("no scores to evaluate".into()));
    }
    let total_pos = labels.iter().filter(|&&l| l == 1).count();
    let total_neg = labels.len() - total_pos;
    if total_pos == 0 || total_neg == 0 {
        return Err(AppError::Metric(
            "both classes are required to compute an EER".into(),
        ));
    }

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| {
        scores[b]
            .partial_cmp(&scores[a])
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut true_pos = 0usize;
    let mut false_pos = 0usize;
    let mut prev = (0.0_f64, 1.0_f64);
    for &i in &order {
        if labels[i] == 1 {
            true_pos += 1;
        } else {
            false_pos += 1;
        }
        let fpr = false_pos as f64 / total_neg as f64;
        let fnr = 1.0 - true_pos as f64 / total_pos as f64;
        if fnr <= fpr {
            let (prev_fpr, prev_fnr) = prev;
            let denom = (fpr - prev_fpr) + (prev_fnr - fnr);
            let eer = if denom > 0.0 {
                let t = (prev_fnr - prev_fpr) / denom;
                prev_fpr + t * (fpr - prev_fpr)
            } else {
                (fpr + fnr) / 2.0
            };
            return Ok(eer * 100.0);
        }
        prev = (fpr, fnr);
    }
    Ok(100.0)
}
