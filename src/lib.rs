//! # Feasibility Dashboard
//!
//! A library for turning a real-estate project's monthly spreadsheet into the
//! figures of an executive feasibility dashboard.
//!
//! ## Core Concepts
//!
//! - **Monthly records**: one row per `YYYY-MM` period with optional numeric fields.
//!   An absent value is never treated as zero.
//! - **Ingestion**: raw sheet rows are validated (missing required columns reject the
//!   upload) and normalized; unreadable cells become warnings.
//! - **Derivation**: KPIs, chart series, discounted cash-flow indicators, entity
//!   roll-ups and a data-quality score are pure functions of the records.
//! - **Versions and portfolio**: datasets are compared version against version, and
//!   several projects can be consolidated into a holding view.
//!
//! ## Example
//!
//! ```rust,ignore
//! use feasibility_dashboard::*;
//!
//! let workbook = RawWorkbook::from_json(&std::fs::read_to_string("upload.json")?)?;
//! let report = FeasibilityProcessor::process_workbook(&workbook, &AnalysisConfig::default())?;
//!
//! println!("{}", report.to_markdown());
//! ```

pub mod aggregator;
pub mod comparison;
pub mod demo;
pub mod entity;
pub mod error;
pub mod format;
pub mod ingestion;
pub mod metrics;
pub mod portfolio;
pub mod quality;
pub mod report;
pub mod schema;
pub mod timeline;
pub mod utils;

pub use aggregator::{available_periods, KpiSnapshot, SeriesAggregator};
pub use comparison::{
    metric_value, standard_metrics, variance, ComparisonPeriod, MetricComparison, MetricKey,
    PeriodValues, VarianceAssessment, VersionComparison, VersionHistory,
};
pub use demo::{demo_dataset, demo_plan_baseline, demo_versions};
pub use entity::{calculate_entity_results, EntityPolicy, EntityResults};
pub use error::{FeasibilityError, Result};
pub use format::{format_currency, format_number, format_percentage};
pub use ingestion::{ingest_workbook, validate_schema, IngestionReport, RawRow, RawWorkbook};
pub use metrics::{
    discounted_payback, irr, max_exposure, mirr, npv, profitability_index, solve_irr,
    CostRatioThresholds, CostRatios, DynamicIndicators, IrrEstimate, MarketRatios,
};
pub use portfolio::{consolidate_portfolio, PortfolioPolicy, PortfolioSummary};
pub use quality::{quality_score, validate_plan_vs_actual, QualityReport};
pub use report::DashboardReport;
pub use schema::*;
pub use timeline::Timeline;

use log::{debug, info, warn};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// What the dashboard is looking at. With no selected period the latest one is used.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DashboardFilters {
    pub selected_period: Option<String>,
    #[serde(default)]
    pub accumulated: bool,
}

impl DashboardFilters {
    pub fn month(period: impl Into<String>) -> Self {
        Self {
            selected_period: Some(period.into()),
            accumulated: false,
        }
    }

    pub fn accumulated_to(period: impl Into<String>) -> Self {
        Self {
            selected_period: Some(period.into()),
            accumulated: true,
        }
    }

    /// The period to analyze: the selection if it is a valid single month, the
    /// dataset's latest period otherwise, `None` for an empty dataset.
    pub fn resolve_period(&self, dataset: &ProjectDataset) -> Result<Option<String>> {
        match self.selected_period.as_deref().map(str::trim) {
            Some(period) => {
                utils::parse_period(period)?;
                Ok(Some(period.to_string()))
            }
            None => Ok(dataset.latest_record().map(|r| r.period.clone())),
        }
    }
}

/// Annual discount rate for a dataset: an explicit override wins, then the rate
/// declared in the project metadata (in percent), then the configured default.
pub fn resolve_discount_rate(
    dataset: &ProjectDataset,
    config: &AnalysisConfig,
    explicit: Option<f64>,
) -> f64 {
    explicit
        .or_else(|| {
            dataset
                .project_info
                .as_ref()
                .and_then(|i| i.discount_rate_pct)
                .map(|pct| pct / 100.0)
        })
        .unwrap_or(config.discount_rate)
}

pub struct FeasibilityProcessor;

impl FeasibilityProcessor {
    pub fn ingest(workbook: &RawWorkbook) -> Result<IngestionReport> {
        ingest_workbook(workbook).inspect_err(|e| {
            if e.is_blocking_ingestion_error() {
                warn!("Upload rejected: {}", e);
            }
        })
    }

    pub fn analyze(
        dataset: &ProjectDataset,
        filters: &DashboardFilters,
        config: &AnalysisConfig,
    ) -> Result<DashboardReport> {
        Self::analyze_with_discount_rate(dataset, filters, config, None)
    }

    pub fn analyze_with_discount_rate(
        dataset: &ProjectDataset,
        filters: &DashboardFilters,
        config: &AnalysisConfig,
        discount_rate: Option<f64>,
    ) -> Result<DashboardReport> {
        config.validate()?;
        let period = filters.resolve_period(dataset)?;
        let rate = resolve_discount_rate(dataset, config, discount_rate);

        info!(
            "Analyzing project {} (version {}) at {}",
            dataset.name().unwrap_or("unnamed"),
            dataset.version().unwrap_or("none"),
            period.as_deref().unwrap_or("no period")
        );
        debug!(
            "{} records, {} milestones, discount rate {:.4}, accumulated: {}",
            dataset.records.len(),
            dataset.milestones.len(),
            rate,
            filters.accumulated
        );

        let records = &dataset.records;
        let aggregator = SeriesAggregator::new(config);
        let policy = &config.entity_policy;

        let kpis = match period.as_deref() {
            Some(p) => aggregator.calculate_kpis(records, p, filters.accumulated),
            None => KpiSnapshot {
                accumulated: filters.accumulated,
                ..Default::default()
            },
        };

        let cost_ratios = CostRatios::from_dataset(dataset);
        let cost_assessment = cost_ratios.assess(&config.cost_thresholds);

        Ok(DashboardReport {
            project_name: dataset.name().map(str::to_string),
            version: dataset.version().map(str::to_string),
            selected_period: period,
            accumulated: filters.accumulated,
            available_periods: available_periods(records),
            kpis,
            cash_flow: aggregator.cash_flow_series(records),
            sales: aggregator.sales_series(records),
            progress: aggregator.progress_series(records),
            financial_progress: aggregator.financial_progress_series(records),
            operational_cash_flow: aggregator.operational_cash_flow_series(records),
            dre: aggregator.dre_rows(records, filters.accumulated),
            indicators: DynamicIndicators::from_records(
                records,
                rate,
                policy.mirr_financing_rate,
                policy.mirr_reinvestment_rate,
            ),
            cost_ratios,
            cost_assessment,
            market_ratios: MarketRatios::from_dataset(dataset),
            entities: calculate_entity_results(dataset, rate, policy),
            quality: QualityReport::evaluate(records),
            timeline: Timeline::from_milestones(&dataset.milestones),
            warnings: Vec::new(),
        })
    }

    /// Ingests a workbook and analyzes it at its latest period.
    pub fn process_workbook(
        workbook: &RawWorkbook,
        config: &AnalysisConfig,
    ) -> Result<DashboardReport> {
        let ingested = Self::ingest(workbook)?;
        let mut report =
            Self::analyze(&ingested.dataset, &DashboardFilters::default(), config)?;
        report.warnings = ingested.warnings;
        Ok(report)
    }

    pub fn compare_versions(
        history: &VersionHistory,
        current: &str,
        previous: &str,
        config: &AnalysisConfig,
    ) -> Result<VersionComparison> {
        let comparison = history.compare(current, previous, config.significance_threshold_pct)?;
        debug!(
            "Compared {} against {}: {} significant metrics",
            current,
            previous,
            comparison.significant_metrics().len()
        );
        Ok(comparison)
    }

    pub fn consolidate(projects: &[ProjectDataset], config: &AnalysisConfig) -> PortfolioSummary {
        consolidate_portfolio(projects, &config.portfolio_policy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_period_defaults_to_latest() {
        let dataset = ProjectDataset::new(vec![
            MonthlyRecord::new("2025-02"),
            MonthlyRecord::new("2025-04"),
        ]);

        let filters = DashboardFilters::default();
        assert_eq!(filters.resolve_period(&dataset).unwrap().as_deref(), Some("2025-04"));
        assert_eq!(
            filters.resolve_period(&ProjectDataset::default()).unwrap(),
            None
        );
    }

    #[test]
    fn test_resolve_period_rejects_non_canonical_selection() {
        let dataset = ProjectDataset::new(vec![MonthlyRecord::new("2025-02")]);

        for bad in ["Fev/25", "2025-13", "2025-00", "2025-01:2025-03"] {
            let result = DashboardFilters::month(bad).resolve_period(&dataset);
            assert!(
                matches!(result, Err(FeasibilityError::InvalidPeriod(_))),
                "{} should be rejected",
                bad
            );
        }
    }

    #[test]
    fn test_discount_rate_precedence() {
        let config = AnalysisConfig::default();
        let mut dataset = ProjectDataset::default();
        assert_eq!(resolve_discount_rate(&dataset, &config, None), 0.12);

        dataset.project_info = Some(ProjectInfo {
            discount_rate_pct: Some(10.0),
            ..Default::default()
        });
        assert_eq!(resolve_discount_rate(&dataset, &config, None), 0.1);
        assert_eq!(resolve_discount_rate(&dataset, &config, Some(0.2)), 0.2);
    }

    #[test]
    fn test_analyze_demo_dataset() {
        let demo = demo_dataset();
        let report = FeasibilityProcessor::analyze(
            &demo,
            &DashboardFilters::default(),
            &AnalysisConfig::default(),
        )
        .unwrap();

        assert_eq!(report.selected_period.as_deref(), Some("2025-05"));
        assert_eq!(report.cash_flow.len(), demo.records.len());
        assert_eq!(report.available_periods.first().map(String::as_str), Some("2025-05"));
        assert_eq!(report.quality.score, 100);
        assert_eq!(report.timeline.bars.len(), 7);
        assert_eq!(report.indicators.discount_rate, 0.12);

        let markdown = report.to_markdown();
        assert!(markdown.contains("# Feasibility Dashboard - Residencial Amazônia"));
        assert!(markdown.contains("## Data Quality: 100/100"));
    }

    #[test]
    fn test_analyze_rejects_invalid_config() {
        let config = AnalysisConfig {
            discount_rate: f64::NAN,
            ..Default::default()
        };
        let result =
            FeasibilityProcessor::analyze(&demo_dataset(), &DashboardFilters::default(), &config);
        assert!(matches!(result, Err(FeasibilityError::InvalidConfig { .. })));
    }
}
