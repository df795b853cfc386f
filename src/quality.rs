use crate::schema::MonthlyRecord;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

pub const MAX_QUALITY_SCORE: u32 = 100;
pub const MIN_HISTORY_MONTHS: usize = 6;
pub const MIN_PLAN_COVERAGE: f64 = 0.8;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct QualityCheck {
    pub name: String,
    pub points: u32,
    pub passed: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct QualityReport {
    pub score: u32,
    pub checks: Vec<QualityCheck>,
}

impl QualityReport {
    /// Runs the fixed battery of completeness and consistency checks over the
    /// whole record list. An empty list scores 0 with no checks listed.
    pub fn evaluate(records: &[MonthlyRecord]) -> Self {
        if records.is_empty() {
            return Self::default();
        }

        let battery: [(&str, u32, bool); 9] = [
            (
                "period and VGV present",
                15,
                records.iter().all(|r| !r.period.is_empty() && r.vgv.is_some()),
            ),
            (
                "projected and realized flow present",
                15,
                records
                    .iter()
                    .all(|r| r.projected_flow.is_some() && r.realized_flow.is_some()),
            ),
            (
                "sales within VGV",
                10,
                records
                    .iter()
                    .all(|r| r.sales_value.unwrap_or(0.0) <= r.vgv.unwrap_or(0.0)),
            ),
            (
                "physical progress at most 100%",
                10,
                records
                    .iter()
                    .all(|r| r.physical_progress_pct.unwrap_or(0.0) <= 100.0),
            ),
            (
                "financial progress at most 100%",
                10,
                records
                    .iter()
                    .all(|r| r.financial_progress_pct.unwrap_or(0.0) <= 100.0),
            ),
            (
                "positive profitability reported",
                10,
                records
                    .iter()
                    .any(|r| r.profitability_pct.is_some_and(|p| p > 0.0)),
            ),
            (
                "at least six months of history",
                10,
                records.len() >= MIN_HISTORY_MONTHS,
            ),
            (
                "max exposure reported",
                10,
                records.iter().any(|r| r.max_exposure.is_some()),
            ),
            (
                "IRR reported",
                10,
                records.iter().any(|r| r.irr.is_some()),
            ),
        ];

        let checks: Vec<QualityCheck> = battery
            .into_iter()
            .map(|(name, points, passed)| QualityCheck {
                name: name.to_string(),
                points,
                passed,
            })
            .collect();

        let score = checks
            .iter()
            .filter(|c| c.passed)
            .map(|c| c.points)
            .sum::<u32>()
            .min(MAX_QUALITY_SCORE);

        Self { score, checks }
    }

    pub fn failed_checks(&self) -> impl Iterator<Item = &QualityCheck> {
        self.checks.iter().filter(|c| !c.passed)
    }
}

pub fn quality_score(records: &[MonthlyRecord]) -> u32 {
    QualityReport::evaluate(records).score
}

/// Fraction of distinct plan periods that also appear in the actuals.
pub fn plan_vs_actual_coverage(actual: &[MonthlyRecord], plan: &[MonthlyRecord]) -> f64 {
    if actual.is_empty() || plan.is_empty() {
        return 0.0;
    }

    let plan_periods: HashSet<&str> = plan.iter().map(|r| r.period.as_str()).collect();
    let actual_periods: HashSet<&str> = actual.iter().map(|r| r.period.as_str()).collect();

    let covered = plan_periods
        .iter()
        .filter(|p| actual_periods.contains(*p))
        .count();
    covered as f64 / plan_periods.len() as f64
}

pub fn validate_plan_vs_actual(actual: &[MonthlyRecord], plan: &[MonthlyRecord]) -> bool {
    !actual.is_empty() && !plan.is_empty() && plan_vs_actual_coverage(actual, plan) >= MIN_PLAN_COVERAGE
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete(period: &str) -> MonthlyRecord {
        MonthlyRecord {
            vgv: Some(1000.0),
            sales_value: Some(100.0),
            projected_flow: Some(-10.0),
            realized_flow: Some(-12.0),
            physical_progress_pct: Some(40.0),
            financial_progress_pct: Some(35.0),
            profitability_pct: Some(18.0),
            max_exposure: Some(500.0),
            irr: Some(14.0),
            ..MonthlyRecord::new(period)
        }
    }

    fn six_months() -> Vec<MonthlyRecord> {
        (1..=6).map(|m| complete(&format!("2025-{:02}", m))).collect()
    }

    #[test]
    fn test_empty_scores_zero() {
        assert_eq!(quality_score(&[]), 0);
        assert!(QualityReport::evaluate(&[]).checks.is_empty());
    }

    #[test]
    fn test_complete_consistent_history_scores_100() {
        let report = QualityReport::evaluate(&six_months());
        assert_eq!(report.score, 100);
        assert_eq!(report.failed_checks().count(), 0);
        assert_eq!(report.checks.iter().map(|c| c.points).sum::<u32>(), 100);
    }

    #[test]
    fn test_score_drops_with_each_failed_check() {
        let mut records = six_months();
        let full = quality_score(&records);

        records[2].sales_value = Some(5000.0);
        let one_failure = quality_score(&records);
        assert_eq!(one_failure, full - 10);

        records[3].realized_flow = None;
        let two_failures = quality_score(&records);
        assert_eq!(two_failures, one_failure - 15);

        records.truncate(5);
        assert_eq!(quality_score(&records), two_failures - 10);
    }

    #[test]
    fn test_plan_vs_actual_coverage() {
        let plan = six_months();
        let actual: Vec<MonthlyRecord> = plan[..5].to_vec();

        assert!((plan_vs_actual_coverage(&actual, &plan) - 5.0 / 6.0).abs() < 1e-12);
        assert!(validate_plan_vs_actual(&actual, &plan));
        assert!(!validate_plan_vs_actual(&actual[..4], &plan));
        assert!(!validate_plan_vs_actual(&[], &plan));
    }
}
