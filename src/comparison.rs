//! Cross-version variance analysis.
//!
//! A [`VersionHistory`] holds every uploaded version of a project. Two versions
//! are compared metric by metric over five aggregation periods, and each
//! variance can be classified against the metric's favorable direction.

use crate::error::{FeasibilityError, Result};
use crate::format::{format_currency, format_number, format_percentage};
use crate::schema::{MonthlyRecord, ProjectDataset, ProjectInfo};
use log::{debug, info};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Variances whose magnitude is under this are reported as neutral.
pub const NEUTRAL_VARIANCE_PCT: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonPeriod {
    Month,
    Ytd,
    Itd,
    Year,
    Projection,
}

impl ComparisonPeriod {
    pub const ALL: [ComparisonPeriod; 5] = [
        ComparisonPeriod::Month,
        ComparisonPeriod::Ytd,
        ComparisonPeriod::Itd,
        ComparisonPeriod::Year,
        ComparisonPeriod::Projection,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            ComparisonPeriod::Month => "month",
            ComparisonPeriod::Ytd => "ytd",
            ComparisonPeriod::Itd => "itd",
            ComparisonPeriod::Year => "year",
            ComparisonPeriod::Projection => "projection",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum MetricFormat {
    Currency,
    Number,
    Percentage,
}

impl MetricFormat {
    pub fn render(&self, value: f64) -> String {
        match self {
            MetricFormat::Currency => format_currency(Some(value)),
            MetricFormat::Number => format_number(Some(value)),
            MetricFormat::Percentage => format_percentage(Some(value)),
        }
    }
}

/// The metrics tracked across versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum MetricKey {
    SalesValue,
    UnitsSold,
    Vgv,
    RealizedFlow,
    ProjectedFlow,
    Profitability,
    PhysicalProgress,
    Receivables,
    Payables,
    DelinquencyValue,
}

impl MetricKey {
    pub fn label(&self) -> &'static str {
        match self {
            MetricKey::SalesValue => "Sales",
            MetricKey::UnitsSold => "Units sold",
            MetricKey::Vgv => "Total VGV",
            MetricKey::RealizedFlow => "Realized flow",
            MetricKey::ProjectedFlow => "Projected flow",
            MetricKey::Profitability => "Profitability %",
            MetricKey::PhysicalProgress => "Physical progress %",
            MetricKey::Receivables => "Receivables",
            MetricKey::Payables => "Payables",
            MetricKey::DelinquencyValue => "Delinquency",
        }
    }

    /// Spreadsheet column the metric is read from.
    pub fn column(&self) -> &'static str {
        match self {
            MetricKey::SalesValue => "vendas_valor",
            MetricKey::UnitsSold => "vendas_unid",
            MetricKey::Vgv => "vgv",
            MetricKey::RealizedFlow => "fluxo_real",
            MetricKey::ProjectedFlow => "fluxo_proj",
            MetricKey::Profitability => "rentabilidade_perc",
            MetricKey::PhysicalProgress => "avanco_fisico_perc",
            MetricKey::Receivables => "contas_receber",
            MetricKey::Payables => "contas_pagar",
            MetricKey::DelinquencyValue => "inadimplencia_valor",
        }
    }

    pub fn format(&self) -> MetricFormat {
        match self {
            MetricKey::UnitsSold => MetricFormat::Number,
            MetricKey::Profitability | MetricKey::PhysicalProgress => MetricFormat::Percentage,
            _ => MetricFormat::Currency,
        }
    }

    /// Whether an increase is good news. Only payables and delinquency are not.
    pub fn positive_is_favorable(&self) -> bool {
        !matches!(self, MetricKey::Payables | MetricKey::DelinquencyValue)
    }

    pub fn extract(&self, record: &MonthlyRecord) -> Option<f64> {
        match self {
            MetricKey::SalesValue => record.sales_value,
            MetricKey::UnitsSold => record.units_sold,
            MetricKey::Vgv => record.vgv,
            MetricKey::RealizedFlow => record.realized_flow,
            MetricKey::ProjectedFlow => record.projected_flow,
            MetricKey::Profitability => record.profitability_pct,
            MetricKey::PhysicalProgress => record.physical_progress_pct,
            MetricKey::Receivables => record.receivables,
            MetricKey::Payables => record.payables,
            MetricKey::DelinquencyValue => record.delinquency_value,
        }
    }
}

pub fn standard_metrics() -> [MetricKey; 10] {
    [
        MetricKey::SalesValue,
        MetricKey::UnitsSold,
        MetricKey::Vgv,
        MetricKey::RealizedFlow,
        MetricKey::ProjectedFlow,
        MetricKey::Profitability,
        MetricKey::PhysicalProgress,
        MetricKey::Receivables,
        MetricKey::Payables,
        MetricKey::DelinquencyValue,
    ]
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PeriodValues {
    pub month: f64,
    pub ytd: f64,
    pub itd: f64,
    pub year: f64,
    pub projection: f64,
}

impl PeriodValues {
    pub fn from_fn(mut f: impl FnMut(ComparisonPeriod) -> f64) -> Self {
        Self {
            month: f(ComparisonPeriod::Month),
            ytd: f(ComparisonPeriod::Ytd),
            itd: f(ComparisonPeriod::Itd),
            year: f(ComparisonPeriod::Year),
            projection: f(ComparisonPeriod::Projection),
        }
    }

    pub fn get(&self, period: ComparisonPeriod) -> f64 {
        match period {
            ComparisonPeriod::Month => self.month,
            ComparisonPeriod::Ytd => self.ytd,
            ComparisonPeriod::Itd => self.itd,
            ComparisonPeriod::Year => self.year,
            ComparisonPeriod::Projection => self.projection,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (ComparisonPeriod, f64)> + '_ {
        ComparisonPeriod::ALL.into_iter().map(|p| (p, self.get(p)))
    }
}

/// Value of `metric` for one dataset under one aggregation period.
///
/// `month` reads the latest record, the three cumulative periods sum every
/// record, and `projection` uses the declared VGV for the VGV metric and the
/// latest record otherwise. Absent values count as 0.
pub fn metric_value(dataset: &ProjectDataset, period: ComparisonPeriod, metric: MetricKey) -> f64 {
    let latest = || {
        dataset
            .latest_record()
            .and_then(|r| metric.extract(r))
            .unwrap_or(0.0)
    };

    match period {
        ComparisonPeriod::Month => latest(),
        ComparisonPeriod::Ytd | ComparisonPeriod::Itd | ComparisonPeriod::Year => dataset
            .records
            .iter()
            .filter_map(|r| metric.extract(r))
            .sum(),
        ComparisonPeriod::Projection => match metric {
            MetricKey::Vgv => dataset.declared_vgv().unwrap_or(0.0),
            _ => latest(),
        },
    }
}

/// Percentage variance of `current` against `previous`.
///
/// A zero base yields 100 when the current value is positive and 0 otherwise.
pub fn variance(current: f64, previous: f64) -> f64 {
    if previous == 0.0 {
        if current > 0.0 {
            100.0
        } else {
            0.0
        }
    } else {
        (current - previous) / previous.abs() * 100.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum VarianceAssessment {
    Favorable,
    Unfavorable,
    Neutral,
}

impl VarianceAssessment {
    pub fn classify(variance: f64, positive_is_favorable: bool) -> Self {
        if variance.abs() < NEUTRAL_VARIANCE_PCT {
            VarianceAssessment::Neutral
        } else if (variance > 0.0) == positive_is_favorable {
            VarianceAssessment::Favorable
        } else {
            VarianceAssessment::Unfavorable
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            VarianceAssessment::Favorable => "favorable",
            VarianceAssessment::Unfavorable => "unfavorable",
            VarianceAssessment::Neutral => "neutral",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct MetricComparison {
    pub metric: MetricKey,
    pub current: PeriodValues,
    pub previous: PeriodValues,
    pub variance: PeriodValues,
}

impl MetricComparison {
    pub fn between(current: &ProjectDataset, previous: &ProjectDataset, metric: MetricKey) -> Self {
        let current_values = PeriodValues::from_fn(|p| metric_value(current, p, metric));
        let previous_values = PeriodValues::from_fn(|p| metric_value(previous, p, metric));
        let variances =
            PeriodValues::from_fn(|p| variance(current_values.get(p), previous_values.get(p)));

        Self {
            metric,
            current: current_values,
            previous: previous_values,
            variance: variances,
        }
    }

    /// True when any period's variance exceeds `threshold_pct` in magnitude.
    pub fn is_significant(&self, threshold_pct: f64) -> bool {
        self.variance.iter().any(|(_, v)| v.abs() > threshold_pct)
    }

    pub fn assessment(&self, period: ComparisonPeriod) -> VarianceAssessment {
        VarianceAssessment::classify(
            self.variance.get(period),
            self.metric.positive_is_favorable(),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct VersionComparison {
    pub current_version: String,
    pub previous_version: String,
    pub significance_threshold_pct: f64,
    pub metrics: Vec<MetricComparison>,
}

impl VersionComparison {
    pub fn new(
        current: &ProjectDataset,
        previous: &ProjectDataset,
        significance_threshold_pct: f64,
    ) -> Self {
        Self {
            current_version: current.version().unwrap_or_default().to_string(),
            previous_version: previous.version().unwrap_or_default().to_string(),
            significance_threshold_pct,
            metrics: standard_metrics()
                .into_iter()
                .map(|m| MetricComparison::between(current, previous, m))
                .collect(),
        }
    }

    pub fn significant_metrics(&self) -> Vec<&MetricComparison> {
        self.metrics
            .iter()
            .filter(|m| m.is_significant(self.significance_threshold_pct))
            .collect()
    }

    pub fn metric(&self, key: MetricKey) -> Option<&MetricComparison> {
        self.metrics.iter().find(|m| m.metric == key)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Display table with values formatted per metric; only the month and
    /// projection columns are shown.
    pub fn to_markdown(&self) -> String {
        let mut output = String::new();
        output.push_str(&format!(
            "# Version {} vs {}\n\n",
            self.current_version, self.previous_version
        ));
        output.push_str("| Metric | Period | Current | Previous | Variance | Assessment |\n");
        output.push_str("|---|---|---|---|---|---|\n");

        for comparison in &self.metrics {
            let format = comparison.metric.format();
            for period in [ComparisonPeriod::Month, ComparisonPeriod::Projection] {
                output.push_str(&format!(
                    "| {}{} | {} | {} | {} | {} | {} |\n",
                    comparison.metric.label(),
                    if comparison.is_significant(self.significance_threshold_pct) {
                        " *"
                    } else {
                        ""
                    },
                    period.label(),
                    format.render(comparison.current.get(period)),
                    format.render(comparison.previous.get(period)),
                    format_percentage(Some(comparison.variance.get(period))),
                    comparison.assessment(period).label()
                ));
            }
        }

        output.push_str(&format!(
            "\n\\* variance above {}% in at least one period\n",
            format_number(Some(self.significance_threshold_pct))
        ));
        output
    }

    /// One row per metric and period.
    pub fn to_csv(&self) -> String {
        let mut output = String::new();
        output.push_str("Metric,Column,Period,Current,Previous,Variance %,Assessment\n");

        for comparison in &self.metrics {
            for period in ComparisonPeriod::ALL {
                output.push_str(&format!(
                    "{},{},{},{},{},{:.2},{}\n",
                    comparison.metric.label(),
                    comparison.metric.column(),
                    period.label(),
                    comparison.current.get(period),
                    comparison.previous.get(period),
                    comparison.variance.get(period),
                    comparison.assessment(period).label()
                ));
            }
        }

        output
    }
}

/// Ordered collection of every dataset version loaded in a session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VersionHistory {
    versions: Vec<ProjectDataset>,
}

impl VersionHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a dataset and returns its version tag.
    ///
    /// A dataset without a tag gets the lowest free one of `"1"`, `"2"`, ….
    /// A dataset whose tag is already present replaces that version in place.
    pub fn push(&mut self, mut dataset: ProjectDataset) -> String {
        let tag = match dataset.version().map(str::to_string) {
            Some(tag) => tag,
            None => {
                let tag = self.next_free_tag();
                dataset
                    .project_info
                    .get_or_insert_with(ProjectInfo::default)
                    .version = Some(tag.clone());
                tag
            }
        };

        match self.versions.iter().position(|d| d.version() == Some(tag.as_str())) {
            Some(index) => {
                info!("Replacing version {}", tag);
                self.versions[index] = dataset;
            }
            None => {
                debug!("Adding version {}", tag);
                self.versions.push(dataset);
            }
        }

        tag
    }

    fn next_free_tag(&self) -> String {
        (1..)
            .map(|n: usize| n.to_string())
            .find(|candidate| self.get(candidate).is_none())
            .unwrap_or_default()
    }

    pub fn get(&self, version: &str) -> Option<&ProjectDataset> {
        self.versions.iter().find(|d| d.version() == Some(version))
    }

    pub fn tags(&self) -> Vec<&str> {
        self.versions.iter().filter_map(|d| d.version()).collect()
    }

    pub fn latest(&self) -> Option<&ProjectDataset> {
        self.versions.last()
    }

    pub fn len(&self) -> usize {
        self.versions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ProjectDataset> {
        self.versions.iter()
    }

    /// Comparison needs at least two versions; both tags must exist.
    pub fn compare(
        &self,
        current: &str,
        previous: &str,
        significance_threshold_pct: f64,
    ) -> Result<VersionComparison> {
        let current_data = self
            .get(current)
            .ok_or_else(|| FeasibilityError::VersionNotFound(current.to_string()))?;
        let previous_data = self
            .get(previous)
            .ok_or_else(|| FeasibilityError::VersionNotFound(previous.to_string()))?;

        Ok(VersionComparison::new(
            current_data,
            previous_data,
            significance_threshold_pct,
        ))
    }
}

impl FromIterator<ProjectDataset> for VersionHistory {
    fn from_iter<I: IntoIterator<Item = ProjectDataset>>(iter: I) -> Self {
        let mut history = VersionHistory::new();
        for dataset in iter {
            history.push(dataset);
        }
        history
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dataset(version: Option<&str>, sales: &[f64], declared_vgv: Option<f64>) -> ProjectDataset {
        let records = sales
            .iter()
            .enumerate()
            .map(|(i, s)| MonthlyRecord {
                sales_value: Some(*s),
                vgv: Some(1000.0),
                payables: Some(*s / 2.0),
                ..MonthlyRecord::new(format!("2025-{:02}", i + 1))
            })
            .collect();

        ProjectDataset {
            records,
            milestones: Vec::new(),
            project_info: Some(ProjectInfo {
                version: version.map(str::to_string),
                vgv: declared_vgv,
                ..Default::default()
            }),
        }
    }

    #[test]
    fn test_variance_rules() {
        assert_eq!(variance(100.0, 100.0), 0.0);
        assert_eq!(variance(50.0, 0.0), 100.0);
        assert_eq!(variance(-50.0, 0.0), 0.0);
        assert_eq!(variance(0.0, 0.0), 0.0);
        assert_eq!(variance(90.0, -100.0), 190.0);
    }

    #[test]
    fn test_metric_value_per_period() {
        let data = dataset(Some("1"), &[100.0, 200.0, 300.0], Some(1500.0));

        assert_eq!(metric_value(&data, ComparisonPeriod::Month, MetricKey::SalesValue), 300.0);
        assert_eq!(metric_value(&data, ComparisonPeriod::Ytd, MetricKey::SalesValue), 600.0);
        assert_eq!(metric_value(&data, ComparisonPeriod::Projection, MetricKey::Vgv), 1500.0);
        assert_eq!(
            metric_value(&data, ComparisonPeriod::Projection, MetricKey::SalesValue),
            300.0
        );
        assert_eq!(
            metric_value(&ProjectDataset::default(), ComparisonPeriod::Itd, MetricKey::Payables),
            0.0
        );
    }

    #[test]
    fn test_assessment_follows_metric_direction() {
        assert_eq!(VarianceAssessment::classify(0.5, true), VarianceAssessment::Neutral);
        assert_eq!(VarianceAssessment::classify(-0.99, false), VarianceAssessment::Neutral);
        assert_eq!(VarianceAssessment::classify(10.0, true), VarianceAssessment::Favorable);
        assert_eq!(VarianceAssessment::classify(10.0, false), VarianceAssessment::Unfavorable);
        assert_eq!(VarianceAssessment::classify(-10.0, false), VarianceAssessment::Favorable);
    }

    #[test]
    fn test_history_assigns_sequential_tags() {
        let mut history = VersionHistory::new();
        assert_eq!(history.push(dataset(None, &[1.0], None)), "1");
        assert_eq!(history.push(dataset(Some("2.0"), &[1.0], None)), "2.0");
        assert_eq!(history.push(dataset(None, &[1.0], None)), "2");
        assert_eq!(history.tags(), vec!["1", "2.0", "2"]);

        history.push(dataset(Some("1"), &[5.0, 6.0], None));
        assert_eq!(history.len(), 3);
        assert_eq!(history.get("1").map(|d| d.records.len()), Some(2));
    }

    #[test]
    fn test_compare_significance_and_missing_version() {
        let history: VersionHistory = vec![
            dataset(Some("1.0"), &[100.0, 100.0], Some(1000.0)),
            dataset(Some("2.0"), &[100.0, 103.0], Some(1000.0)),
        ]
        .into_iter()
        .collect();

        let comparison = history.compare("2.0", "1.0", 5.0).unwrap();
        assert_eq!(comparison.metrics.len(), 10);

        let sales = comparison.metric(MetricKey::SalesValue).unwrap();
        assert!((sales.variance.month - 3.0).abs() < 1e-9);
        assert!(!sales.is_significant(5.0));
        assert_eq!(sales.assessment(ComparisonPeriod::Month), VarianceAssessment::Favorable);

        let payables = comparison.metric(MetricKey::Payables).unwrap();
        assert_eq!(payables.assessment(ComparisonPeriod::Month), VarianceAssessment::Unfavorable);
        assert!(comparison.significant_metrics().is_empty());

        assert!(matches!(
            history.compare("3.0", "1.0", 5.0),
            Err(FeasibilityError::VersionNotFound(v)) if v == "3.0"
        ));
    }

    #[test]
    fn test_markdown_formats_values_per_metric() {
        let mut current = dataset(Some("2"), &[100.0, 300.0], Some(1500.0));
        current.records[1].units_sold = Some(12.0);
        current.records[1].profitability_pct = Some(8.26);
        let previous = dataset(Some("1"), &[100.0, 200.0], Some(1500.0));

        let comparison = VersionComparison::new(&current, &previous, 5.0);
        let markdown = comparison.to_markdown();

        assert!(markdown.starts_with("# Version 2 vs 1"));
        assert!(markdown.contains("| Sales * | month | R$ 300 | R$ 200 | 50,0% | favorable |"));
        assert!(markdown.contains("| Units sold * | month | 12 | 0 |"));
        assert!(markdown.contains("| Profitability % * | month | 8,3% | 0,0% |"));
        assert!(markdown.contains("| Total VGV | projection | R$ 1.500 | R$ 1.500 | 0,0% | neutral |"));
    }

    #[test]
    fn test_to_csv_has_row_per_metric_and_period() {
        let history: VersionHistory = vec![
            dataset(Some("a"), &[100.0], None),
            dataset(Some("b"), &[200.0], None),
        ]
        .into_iter()
        .collect();
        let csv = history.compare("b", "a", 5.0).unwrap().to_csv();

        assert_eq!(csv.lines().count(), 1 + 10 * 5);
        assert!(csv.contains("Sales,vendas_valor,month,200,100,100.00,favorable"));
    }
}
