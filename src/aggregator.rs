use crate::schema::{AnalysisConfig, MonthlyRecord};
use crate::utils::{percent_change, sort_by_period};
use log::debug;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ProfitabilityKpi {
    pub value: f64,
    pub payback_months: f64,
    /// Set when `value` was estimated from sales over payables.
    pub is_estimated: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct VgvKpi {
    pub value: f64,
    pub percent_sold: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct QuantityKpi {
    pub units: f64,
    pub value: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DelinquencyKpi {
    pub percentage: f64,
    pub value: f64,
}

/// Change of each headline KPI against the preceding period, in percent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct KpiVariation {
    pub profitability: f64,
    pub vgv: f64,
    pub percent_sold: f64,
    pub sales_value: f64,
    pub inventory_value: f64,
    pub delinquency_pct: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct KpiSnapshot {
    /// Period the snapshot was taken at; `None` when nothing matched.
    pub period: Option<String>,
    pub accumulated: bool,
    pub profitability: ProfitabilityKpi,
    pub vgv: VgvKpi,
    pub accumulated_sales: QuantityKpi,
    pub inventory: QuantityKpi,
    pub delinquency: DelinquencyKpi,
    pub variation: KpiVariation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CashFlowPoint {
    pub period: String,
    pub projected: f64,
    pub realized: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SalesPoint {
    pub period: String,
    pub sales: f64,
    pub target: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ProgressPoint {
    pub period: String,
    pub physical: f64,
    pub financial: f64,
    pub physical_projected: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FinancialProgressPoint {
    pub period: String,
    pub planned: f64,
    pub realized: f64,
    pub reference: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct OperationalCashFlowPoint {
    pub period: String,
    pub operational: f64,
    pub reference: f64,
}

/// One line of the simplified income statement: sales as revenue, payables as cost.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DreRow {
    pub period: String,
    pub revenue: f64,
    pub costs: f64,
    pub result: f64,
}

/// Builds KPI snapshots and chart series from monthly records.
///
/// Input order does not matter: every entry point sorts by period first and
/// borrows the records, so the caller's dataset is never touched.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesAggregator {
    sales_target_ratio: f64,
    reference_ratio: f64,
}

impl Default for SeriesAggregator {
    fn default() -> Self {
        Self::new(&AnalysisConfig::default())
    }
}

impl SeriesAggregator {
    pub fn new(config: &AnalysisConfig) -> Self {
        Self {
            sales_target_ratio: config.sales_target_ratio,
            reference_ratio: config.reference_line_ratio,
        }
    }

    /// KPIs at `selected`, either for that month alone or accumulated up to it,
    /// with the variation against the preceding period in the same mode.
    pub fn calculate_kpis(
        &self,
        records: &[MonthlyRecord],
        selected: &str,
        accumulated: bool,
    ) -> KpiSnapshot {
        let sorted = sort_by_period(records);

        let Some(mut current) = snapshot_at(&sorted, selected, accumulated) else {
            debug!("No records match period {}", selected);
            return KpiSnapshot {
                accumulated,
                ..Default::default()
            };
        };

        let previous_period = sorted
            .iter()
            .map(|r| r.period.as_str())
            .filter(|p| *p < selected)
            .next_back();

        if let Some(previous) = previous_period.and_then(|p| snapshot_at(&sorted, p, accumulated)) {
            current.variation = KpiVariation {
                profitability: percent_change(
                    current.profitability.value,
                    previous.profitability.value,
                ),
                vgv: percent_change(current.vgv.value, previous.vgv.value),
                percent_sold: percent_change(current.vgv.percent_sold, previous.vgv.percent_sold),
                sales_value: percent_change(
                    current.accumulated_sales.value,
                    previous.accumulated_sales.value,
                ),
                inventory_value: percent_change(current.inventory.value, previous.inventory.value),
                delinquency_pct: percent_change(
                    current.delinquency.percentage,
                    previous.delinquency.percentage,
                ),
            };
        }

        current
    }

    pub fn cash_flow_series(&self, records: &[MonthlyRecord]) -> Vec<CashFlowPoint> {
        sort_by_period(records)
            .into_iter()
            .map(|r| CashFlowPoint {
                period: r.period.clone(),
                projected: r.projected_flow.unwrap_or(0.0),
                realized: r.realized_flow.unwrap_or(0.0),
            })
            .collect()
    }

    /// Sales against target; a month without a target gets sales × target ratio.
    pub fn sales_series(&self, records: &[MonthlyRecord]) -> Vec<SalesPoint> {
        sort_by_period(records)
            .into_iter()
            .map(|r| {
                let sales = r.sales_value.unwrap_or(0.0);
                SalesPoint {
                    period: r.period.clone(),
                    sales,
                    target: r.sales_target.unwrap_or(sales * self.sales_target_ratio),
                }
            })
            .collect()
    }

    pub fn progress_series(&self, records: &[MonthlyRecord]) -> Vec<ProgressPoint> {
        sort_by_period(records)
            .into_iter()
            .map(|r| ProgressPoint {
                period: r.period.clone(),
                physical: r.physical_progress_pct.unwrap_or(0.0),
                financial: r.financial_progress_pct.unwrap_or(0.0),
                physical_projected: r.physical_progress_projected.unwrap_or(0.0),
            })
            .collect()
    }

    pub fn financial_progress_series(
        &self,
        records: &[MonthlyRecord],
    ) -> Vec<FinancialProgressPoint> {
        sort_by_period(records)
            .into_iter()
            .map(|r| {
                let planned = r.financial_progress_projected.unwrap_or(0.0);
                FinancialProgressPoint {
                    period: r.period.clone(),
                    planned,
                    realized: r.financial_progress_pct.unwrap_or(0.0),
                    reference: planned * self.reference_ratio,
                }
            })
            .collect()
    }

    pub fn operational_cash_flow_series(
        &self,
        records: &[MonthlyRecord],
    ) -> Vec<OperationalCashFlowPoint> {
        sort_by_period(records)
            .into_iter()
            .map(|r| OperationalCashFlowPoint {
                period: r.period.clone(),
                operational: r.realized_flow.unwrap_or(0.0),
                reference: r.projected_flow.unwrap_or(0.0) * self.reference_ratio,
            })
            .collect()
    }

    /// Per-month rows, or running totals when `accumulated` is set.
    pub fn dre_rows(&self, records: &[MonthlyRecord], accumulated: bool) -> Vec<DreRow> {
        let mut revenue_total = 0.0;
        let mut cost_total = 0.0;

        sort_by_period(records)
            .into_iter()
            .map(|r| {
                let revenue = r.sales_value.unwrap_or(0.0);
                let costs = r.payables.unwrap_or(0.0);
                revenue_total += revenue;
                cost_total += costs;

                let (revenue, costs) = if accumulated {
                    (revenue_total, cost_total)
                } else {
                    (revenue, costs)
                };

                DreRow {
                    period: r.period.clone(),
                    revenue,
                    costs,
                    result: revenue - costs,
                }
            })
            .collect()
    }
}

/// Distinct periods, newest first.
pub fn available_periods(records: &[MonthlyRecord]) -> Vec<String> {
    let mut periods: Vec<String> = records.iter().map(|r| r.period.clone()).collect();
    periods.sort_unstable_by(|a, b| b.cmp(a));
    periods.dedup();
    periods
}

fn snapshot_at(
    sorted: &[&MonthlyRecord],
    selected: &str,
    accumulated: bool,
) -> Option<KpiSnapshot> {
    let window: Vec<&MonthlyRecord> = sorted
        .iter()
        .copied()
        .filter(|r| {
            if accumulated {
                r.period.as_str() <= selected
            } else {
                r.period == selected
            }
        })
        .collect();

    let latest = *window.last()?;

    let (profitability, is_estimated) = match (
        latest.profitability_pct,
        latest.sales_value,
        latest.payables,
    ) {
        (Some(value), _, _) => (value, false),
        (None, Some(sales), Some(payables)) if payables != 0.0 => {
            ((sales / payables - 1.0) * 100.0, true)
        }
        _ => (0.0, false),
    };

    let payback_months = latest
        .payback_months
        .unwrap_or_else(|| estimate_payback(sorted));

    let (units, value) = if accumulated {
        window.iter().fold((0.0, 0.0), |(units, value), r| {
            (
                units + r.units_sold.unwrap_or(0.0),
                value + r.sales_value.unwrap_or(0.0),
            )
        })
    } else {
        (
            latest.units_sold.unwrap_or(0.0),
            latest.sales_value.unwrap_or(0.0),
        )
    };

    let vgv = latest.vgv.unwrap_or(0.0);
    let percent_sold = if vgv > 0.0 { value / vgv * 100.0 } else { 0.0 };

    let delinquency_pct = latest.delinquency_pct.unwrap_or(0.0);
    let delinquency_value = match (latest.delinquency_value, latest.receivables) {
        (Some(value), _) => value,
        (None, Some(receivables)) if delinquency_pct > 0.0 => delinquency_pct / 100.0 * receivables,
        _ => 0.0,
    };

    Some(KpiSnapshot {
        period: Some(latest.period.clone()),
        accumulated,
        profitability: ProfitabilityKpi {
            value: profitability,
            payback_months,
            is_estimated,
        },
        vgv: VgvKpi {
            value: vgv,
            percent_sold,
        },
        accumulated_sales: QuantityKpi { units, value },
        inventory: QuantityKpi {
            units: latest.inventory_units.unwrap_or(0.0),
            value: latest.inventory_value.unwrap_or(0.0),
        },
        delinquency: DelinquencyKpi {
            percentage: delinquency_pct,
            value: delinquency_value,
        },
        variation: KpiVariation::default(),
    })
}

// 1-based month in which the running realized flow over the full series
// first becomes non-negative, 0 if it never does.
fn estimate_payback(sorted: &[&MonthlyRecord]) -> f64 {
    let mut running = 0.0;
    for (i, record) in sorted.iter().enumerate() {
        running += record.realized_flow.unwrap_or(0.0);
        if running >= 0.0 {
            return (i + 1) as f64;
        }
    }
    0.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn record(period: &str, vgv: f64, sales: f64) -> MonthlyRecord {
        MonthlyRecord {
            vgv: Some(vgv),
            sales_value: Some(sales),
            ..MonthlyRecord::new(period)
        }
    }

    #[test]
    fn test_percent_sold_accumulated_and_single() {
        let records = vec![record("2025-02", 1000.0, 200.0), record("2025-01", 1000.0, 100.0)];
        let aggregator = SeriesAggregator::default();

        let accumulated = aggregator.calculate_kpis(&records, "2025-02", true);
        assert_eq!(accumulated.vgv.percent_sold, 30.0);
        assert_eq!(accumulated.accumulated_sales.value, 300.0);

        let single = aggregator.calculate_kpis(&records, "2025-02", false);
        assert_eq!(single.vgv.percent_sold, 20.0);
        assert_eq!(single.variation.sales_value, 100.0);
    }

    #[test]
    fn test_profitability_estimate_only_when_absent() {
        let mut estimated = record("2025-01", 1000.0, 120.0);
        estimated.payables = Some(100.0);
        let aggregator = SeriesAggregator::default();

        let kpis = aggregator.calculate_kpis(&[estimated.clone()], "2025-01", false);
        assert!(kpis.profitability.is_estimated);
        assert!((kpis.profitability.value - 20.0).abs() < 1e-9);

        estimated.profitability_pct = Some(0.0);
        let kpis = aggregator.calculate_kpis(&[estimated], "2025-01", false);
        assert!(!kpis.profitability.is_estimated);
        assert_eq!(kpis.profitability.value, 0.0);
    }

    #[test]
    fn test_payback_from_running_realized_flow() {
        let flows = [("2025-01", -100.0), ("2025-02", 40.0), ("2025-03", 70.0)];
        let records: Vec<MonthlyRecord> = flows
            .iter()
            .map(|(p, f)| MonthlyRecord {
                realized_flow: Some(*f),
                ..MonthlyRecord::new(*p)
            })
            .collect();

        let kpis = SeriesAggregator::default().calculate_kpis(&records, "2025-01", false);
        assert_eq!(kpis.profitability.payback_months, 3.0);
    }

    #[test]
    fn test_delinquency_value_derived_from_receivables() {
        let mut r = record("2025-01", 1000.0, 0.0);
        r.delinquency_pct = Some(2.0);
        r.receivables = Some(5000.0);

        let kpis = SeriesAggregator::default().calculate_kpis(&[r], "2025-01", false);
        assert_eq!(kpis.delinquency.value, 100.0);
    }

    #[test]
    fn test_unknown_period_gives_empty_snapshot() {
        let kpis =
            SeriesAggregator::default().calculate_kpis(&[record("2025-01", 1.0, 1.0)], "2030-01", false);
        assert_eq!(kpis.period, None);
        assert_eq!(kpis.vgv, VgvKpi::default());
    }

    #[test]
    fn test_series_are_sorted_with_fallbacks() {
        let mut jan = record("2025-01", 1000.0, 100.0);
        jan.projected_flow = Some(200.0);
        let mut feb = record("2025-02", 1000.0, 50.0);
        feb.sales_target = Some(80.0);
        let records = vec![feb, jan];
        let aggregator = SeriesAggregator::default();

        let sales = aggregator.sales_series(&records);
        assert_eq!(sales.len(), records.len());
        assert_eq!(sales[0].period, "2025-01");
        assert!((sales[0].target - 110.0).abs() < 1e-9);
        assert_eq!(sales[1].target, 80.0);

        let operational = aggregator.operational_cash_flow_series(&records);
        assert!((operational[0].reference - 190.0).abs() < 1e-9);
        assert_eq!(operational[1].operational, 0.0);
    }

    #[test]
    fn test_dre_accumulated_running_totals() {
        let mut jan = record("2025-01", 0.0, 100.0);
        jan.payables = Some(60.0);
        let mut feb = record("2025-02", 0.0, 50.0);
        feb.payables = Some(70.0);
        let aggregator = SeriesAggregator::default();

        let monthly = aggregator.dre_rows(&[feb.clone(), jan.clone()], false);
        assert_eq!(monthly[1].result, -20.0);

        let running = aggregator.dre_rows(&[feb, jan], true);
        assert_eq!(running[1].revenue, 150.0);
        assert_eq!(running[1].costs, 130.0);
        assert_eq!(running[1].result, 20.0);
    }

    #[test]
    fn test_available_periods_newest_first() {
        let records = vec![
            MonthlyRecord::new("2025-01"),
            MonthlyRecord::new("2025-03"),
            MonthlyRecord::new("2025-02"),
        ];
        assert_eq!(
            available_periods(&records),
            vec!["2025-03", "2025-02", "2025-01"]
        );
    }
}
