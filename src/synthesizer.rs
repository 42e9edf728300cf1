//! Risk score and label synthesis
//!
//! Fills in risk scores and binary labels when the source lacks them:
//! - Risk: supplied value (clamped) when the corpus has numeric risk, else a
//!   weighted blend of category frequency and recency
//! - Labels: supplied labels are kept; missing ones come from a 75th
//!   percentile threshold over the risk histogram
//! - A dataset with any variation in risk never leaves without a positive row

use crate::types::{DatasetStatistics, IncidentRecord, LabeledRow, ScoredRow};

/// Weight of the category frequency component
pub const CATEGORY_WEIGHT: f64 = 0.6;

/// Weight of the recency component
pub const RECENCY_WEIGHT: f64 = 0.4;

/// Threshold that no risk score in [0, 1] can reach
pub const UNREACHABLE_THRESHOLD: f64 = 1.1;

/// Quantile of the risk distribution used as the positive threshold
pub const THRESHOLD_QUANTILE: f64 = 0.75;

const HISTOGRAM_BUCKETS: usize = 101;

/// Per-row risk scoring against one dataset's statistics
pub struct RiskLabelSynthesizer<'a> {
    statistics: &'a DatasetStatistics,
}

impl<'a> RiskLabelSynthesizer<'a> {
    pub fn new(statistics: &'a DatasetStatistics) -> Self {
        Self { statistics }
    }

    /// Risk score in [0, 1] for one record
    pub fn risk_score(&self, record: &IncidentRecord) -> f64 {
        match record.risk {
            Some(risk) if self.statistics.has_numeric_risk => risk.clamp(0.0, 1.0),
            _ => {
                let category = self.category_score(record.category.as_deref());
                let recency = self.recency_score(record.observed_at.timestamp());
                (CATEGORY_WEIGHT * category + RECENCY_WEIGHT * recency).clamp(0.0, 1.0)
            }
        }
    }

    /// Category frequency scaled between the corpus min and max counts.
    ///
    /// Unknown or empty categories score as the least frequent one.
    pub fn category_score(&self, category: Option<&str>) -> f64 {
        let min = self.statistics.min_count;
        let max = self.statistics.max_count;

        if max == min {
            return if max > 0 { 0.5 } else { 0.0 };
        }

        let count = category
            .and_then(|c| self.statistics.category_count(c))
            .unwrap_or(min);
        let scaled = (count as f64 - min as f64) / (max as f64 - min as f64);
        scaled.clamp(0.0, 1.0)
    }

    /// Position of `timestamp` within the observed time range, 0.5 when the
    /// range is empty
    pub fn recency_score(&self, timestamp: i64) -> f64 {
        match (self.statistics.min_time, self.statistics.time_span) {
            (Some(min_time), Some(span)) if span > 0 => {
                ((timestamp - min_time) as f64 / span as f64).clamp(0.0, 1.0)
            }
            _ => 0.5,
        }
    }

    /// Resolve the final 0/1 label of every row.
    ///
    /// Consumes the scored rows and returns new labelled rows in the same
    /// order. Supplied labels are never overwritten, except that when no row
    /// ends up positive while some risk is above zero, the rows sharing the
    /// maximum risk are promoted to positive.
    pub fn resolve_labels(rows: Vec<ScoredRow>) -> Vec<LabeledRow> {
        let all_labeled = rows.iter().all(|row| row.provided_label.is_some());
        let threshold = if all_labeled {
            UNREACHABLE_THRESHOLD
        } else {
            let risks: Vec<f64> = rows.iter().map(|row| row.risk).collect();
            risk_threshold(&risks)
        };

        let mut labels: Vec<u8> = rows
            .iter()
            .map(|row| {
                row.provided_label
                    .unwrap_or_else(|| u8::from(row.risk >= threshold && row.risk > 0.0))
            })
            .collect();

        let max_risk = rows
            .iter()
            .map(|row| row.risk)
            .fold(f64::NEG_INFINITY, f64::max);
        let has_positive = labels.iter().any(|&label| label == 1);

        if !has_positive && max_risk > 0.0 {
            for (label, row) in labels.iter_mut().zip(&rows) {
                if row.risk == max_risk {
                    *label = 1;
                }
            }
        }

        rows.into_iter()
            .zip(labels)
            .map(|(row, label)| LabeledRow {
                features: row.features,
                label,
                timestamp: row.timestamp,
            })
            .collect()
    }
}

/// Positive-label threshold from a 101-bucket risk histogram.
///
/// Returns [`UNREACHABLE_THRESHOLD`] when at most one bucket is populated;
/// otherwise the lower edge of the first bucket whose cumulative count reaches
/// rank `floor(0.75 * (n - 1)) + 1`.
pub fn risk_threshold(risks: &[f64]) -> f64 {
    let mut histogram = [0usize; HISTOGRAM_BUCKETS];
    for &risk in risks {
        histogram[risk_bucket(risk)] += 1;
    }

    let populated = histogram.iter().filter(|&&count| count > 0).count();
    if populated <= 1 {
        return UNREACHABLE_THRESHOLD;
    }

    let rank = (THRESHOLD_QUANTILE * (risks.len() - 1) as f64).floor() as usize + 1;
    let mut cumulative = 0;
    for (bucket, &count) in histogram.iter().enumerate() {
        cumulative += count;
        if cumulative >= rank {
            return bucket as f64 / 100.0;
        }
    }

    UNREACHABLE_THRESHOLD
}

fn risk_bucket(risk: f64) -> usize {
    let bucket = (risk.clamp(0.0, 1.0) * 100.0).floor();
    (bucket as usize).min(HISTOGRAM_BUCKETS - 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};
    use std::collections::BTreeMap;

    fn make_stats(counts: &[(&str, u64)], min_time: Option<i64>, max_time: Option<i64>) -> DatasetStatistics {
        let category_counts: BTreeMap<String, u64> = counts
            .iter()
            .map(|(name, count)| (name.to_string(), *count))
            .collect();
        DatasetStatistics {
            min_count: category_counts.values().copied().min().unwrap_or(0),
            max_count: category_counts.values().copied().max().unwrap_or(0),
            row_count: category_counts.values().sum(),
            category_counts,
            min_time,
            max_time,
            time_span: min_time.zip(max_time).map(|(a, b)| (b - a).max(0)),
            has_numeric_risk: false,
            skipped_rows: 0,
        }
    }

    fn make_record(category: Option<&str>, at: DateTime<Utc>, risk: Option<f64>) -> IncidentRecord {
        IncidentRecord {
            observed_at: at,
            latitude: 40.7,
            longitude: -74.0,
            category: category.map(str::to_string),
            risk,
            label: None,
        }
    }

    fn scored(risk: f64, label: Option<u8>) -> ScoredRow {
        ScoredRow {
            features: vec![risk],
            risk,
            provided_label: label,
            timestamp: 0,
        }
    }

    fn labels(rows: &[LabeledRow]) -> Vec<u8> {
        rows.iter().map(|r| r.label).collect()
    }

    #[test]
    fn test_single_category_scores_half() {
        let stats = make_stats(&[("theft", 7)], None, None);
        let synth = RiskLabelSynthesizer::new(&stats);
        assert_eq!(synth.category_score(Some("theft")), 0.5);
        assert_eq!(synth.category_score(None), 0.5);
    }

    #[test]
    fn test_zero_count_category_scores_zero() {
        let stats = make_stats(&[("uncategorized", 0)], None, None);
        let synth = RiskLabelSynthesizer::new(&stats);
        assert_eq!(synth.category_score(Some("uncategorized")), 0.0);
    }

    #[test]
    fn test_category_score_scales_between_counts() {
        let stats = make_stats(&[("a", 2), ("b", 6), ("c", 10)], None, None);
        let synth = RiskLabelSynthesizer::new(&stats);
        assert_eq!(synth.category_score(Some("a")), 0.0);
        assert_eq!(synth.category_score(Some("b")), 0.5);
        assert_eq!(synth.category_score(Some("c")), 1.0);
        assert_eq!(synth.category_score(Some("unseen")), 0.0);
    }

    #[test]
    fn test_recency_score() {
        let stats = make_stats(&[("a", 1)], Some(1_000), Some(2_000));
        let synth = RiskLabelSynthesizer::new(&stats);
        assert_eq!(synth.recency_score(1_000), 0.0);
        assert_eq!(synth.recency_score(1_500), 0.5);
        assert_eq!(synth.recency_score(2_000), 1.0);
        assert_eq!(synth.recency_score(5_000), 1.0);

        let flat = make_stats(&[("a", 1)], Some(1_000), Some(1_000));
        assert_eq!(RiskLabelSynthesizer::new(&flat).recency_score(1_000), 0.5);
    }

    #[test]
    fn test_risk_score_heuristic() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 1, 11, 0, 0, 0).unwrap();
        let stats = make_stats(
            &[("burglary", 1), ("assault", 3)],
            Some(start.timestamp()),
            Some(end.timestamp()),
        );
        let synth = RiskLabelSynthesizer::new(&stats);

        let newest_assault = make_record(Some("assault"), end, Some(0.05));
        assert!((synth.risk_score(&newest_assault) - 1.0).abs() < 1e-12);

        let oldest_burglary = make_record(Some("burglary"), start, None);
        assert_eq!(synth.risk_score(&oldest_burglary), 0.0);
    }

    #[test]
    fn test_risk_score_uses_numeric_column_when_present() {
        let mut stats = make_stats(&[("a", 1)], None, None);
        stats.has_numeric_risk = true;
        let synth = RiskLabelSynthesizer::new(&stats);
        let now = Utc::now();

        assert_eq!(synth.risk_score(&make_record(Some("a"), now, Some(0.42))), 0.42);
        assert_eq!(synth.risk_score(&make_record(Some("a"), now, Some(7.0))), 1.0);
        assert_eq!(synth.risk_score(&make_record(Some("a"), now, Some(-2.0))), 0.0);
        // Rows without a value fall back to the heuristic
        assert_eq!(
            synth.risk_score(&make_record(Some("a"), now, None)),
            CATEGORY_WEIGHT * 0.5 + RECENCY_WEIGHT * 0.5
        );
    }

    #[test]
    fn test_risk_threshold_percentile() {
        assert_eq!(risk_threshold(&[0.1, 0.2, 0.3, 0.4, 0.5]), 0.4);
        assert_eq!(risk_threshold(&[0.0, 1.0]), 0.0);
        assert_eq!(risk_threshold(&[0.0, 0.0, 0.0, 1.0]), 0.0);
        assert_eq!(risk_threshold(&[0.0, 0.5, 0.9, 0.95, 1.0]), 0.95);
    }

    #[test]
    fn test_risk_threshold_single_bucket_is_unreachable() {
        assert_eq!(risk_threshold(&[0.3, 0.3, 0.305]), UNREACHABLE_THRESHOLD);
        assert_eq!(risk_threshold(&[]), UNREACHABLE_THRESHOLD);
    }

    #[test]
    fn test_missing_labels_use_threshold() {
        let rows = vec![
            scored(0.1, None),
            scored(0.2, None),
            scored(0.3, Some(1)),
            scored(0.4, None),
            scored(0.5, Some(0)),
        ];
        let resolved = RiskLabelSynthesizer::resolve_labels(rows);
        assert_eq!(labels(&resolved), vec![0, 0, 1, 1, 0]);
    }

    #[test]
    fn test_identical_risk_promotes_without_threshold() {
        let rows = vec![scored(0.3, None), scored(0.3, None), scored(0.3, None)];
        let resolved = RiskLabelSynthesizer::resolve_labels(rows);
        assert_eq!(labels(&resolved), vec![1, 1, 1]);

        let rows = vec![scored(0.3, Some(0)), scored(0.3, None)];
        let resolved = RiskLabelSynthesizer::resolve_labels(rows);
        assert_eq!(labels(&resolved), vec![1, 1]);
    }

    #[test]
    fn test_zero_risk_never_promoted() {
        let rows = vec![scored(0.0, None), scored(0.0, Some(0))];
        let resolved = RiskLabelSynthesizer::resolve_labels(rows);
        assert_eq!(labels(&resolved), vec![0, 0]);
    }

    #[test]
    fn test_fully_labeled_without_positive_promotes_max_risk() {
        let rows = vec![scored(0.2, Some(0)), scored(0.9, Some(0)), scored(0.9, Some(0)), scored(0.5, Some(0))];
        let resolved = RiskLabelSynthesizer::resolve_labels(rows);
        assert_eq!(labels(&resolved), vec![0, 1, 1, 0]);
    }

    #[test]
    fn test_fully_labeled_dataset_is_unchanged() {
        let rows = vec![
            scored(0.1, Some(0)),
            scored(0.9, Some(0)),
            scored(0.2, Some(1)),
            scored(0.7, Some(1)),
        ];
        let expected_features: Vec<_> = rows.iter().map(|r| r.features.clone()).collect();

        let first = RiskLabelSynthesizer::resolve_labels(rows);
        assert_eq!(labels(&first), vec![0, 0, 1, 1]);

        let again: Vec<ScoredRow> = first
            .iter()
            .map(|row| ScoredRow {
                features: row.features.clone(),
                risk: row.features[0],
                provided_label: Some(row.label),
                timestamp: row.timestamp,
            })
            .collect();
        let second = RiskLabelSynthesizer::resolve_labels(again);
        assert_eq!(second, first);
        assert_eq!(
            second.iter().map(|r| r.features.clone()).collect::<Vec<_>>(),
            expected_features
        );
    }
}
