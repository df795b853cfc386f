//! Discounted cash-flow math and cost/market ratios.
//!
//! Every function here is total: degenerate input (empty vectors, zero
//! denominators, non-converging iterations) yields 0 or an empty struct rather
//! than an error, so the dashboard can always render something.

use crate::schema::{MonthlyRecord, ProjectDataset};
use crate::utils::{ratio_pct, sort_by_period};
use log::debug;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

const IRR_INITIAL_GUESS: f64 = 0.10;
const MAX_IRR_ITERATIONS: u32 = 100;
const CONVERGENCE_THRESHOLD: f64 = 1e-6;

/// Signed monthly flows in period order: realized flow, projected flow when the
/// realized one is absent. Index 0 is time zero.
pub fn cash_flow_vector(records: &[MonthlyRecord]) -> Vec<f64> {
    sort_by_period(records)
        .into_iter()
        .map(MonthlyRecord::cash_flow)
        .collect()
}

/// Net present value, `Σ F[t] / (1 + rate)^t`.
pub fn npv(cash_flows: &[f64], rate: f64) -> f64 {
    let one_plus_r = 1.0 + rate;
    let mut discount = 1.0;
    let mut result = 0.0;

    for (t, cf) in cash_flows.iter().enumerate() {
        if t > 0 {
            discount *= one_plus_r;
        }
        if discount == 0.0 {
            return 0.0;
        }
        result += cf / discount;
    }

    result
}

/// Outcome of the Newton-Raphson IRR search.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct IrrEstimate {
    /// Per-period rate as a fraction.
    pub rate: f64,
    pub iterations: u32,
    /// True when the NPV at `rate` fell under the convergence threshold.
    pub converged: bool,
}

impl IrrEstimate {
    pub fn as_percentage(&self) -> f64 {
        self.rate * 100.0
    }
}

/// Newton-Raphson search for the rate that zeroes the NPV.
///
/// Starts at 10% and runs at most 100 iterations, stopping early when either
/// the NPV or its derivative drops under `1e-6`. A step that would leave the
/// domain (rate ≤ -100% or non-finite) stops the search too; in every
/// non-converging case the last estimate is returned.
pub fn solve_irr(cash_flows: &[f64]) -> IrrEstimate {
    if cash_flows.len() < 2 {
        return IrrEstimate {
            rate: 0.0,
            iterations: 0,
            converged: false,
        };
    }

    let mut rate = IRR_INITIAL_GUESS;

    for i in 0..MAX_IRR_ITERATIONS {
        let one_plus_r = 1.0 + rate;
        let mut npv_val = 0.0;
        let mut dnpv = 0.0;

        for (t, cf) in cash_flows.iter().enumerate() {
            let factor = one_plus_r.powi(t as i32);
            npv_val += cf / factor;
            dnpv -= t as f64 * cf / (factor * one_plus_r);
        }

        if npv_val.abs() < CONVERGENCE_THRESHOLD {
            return IrrEstimate {
                rate,
                iterations: i + 1,
                converged: true,
            };
        }
        if dnpv.abs() < CONVERGENCE_THRESHOLD {
            debug!("IRR derivative vanished at rate {:.6} after {} iterations", rate, i + 1);
            return IrrEstimate {
                rate,
                iterations: i + 1,
                converged: false,
            };
        }

        let next = rate - npv_val / dnpv;
        if !next.is_finite() || next <= -1.0 {
            debug!("IRR step left the valid domain at rate {:.6}", rate);
            return IrrEstimate {
                rate,
                iterations: i + 1,
                converged: false,
            };
        }
        rate = next;
    }

    debug!(
        "IRR did not converge after {} iterations, last estimate {:.6}",
        MAX_IRR_ITERATIONS, rate
    );
    IrrEstimate {
        rate,
        iterations: MAX_IRR_ITERATIONS,
        converged: false,
    }
}

/// IRR as a percentage of the period rate.
pub fn irr(cash_flows: &[f64]) -> f64 {
    solve_irr(cash_flows).as_percentage()
}

/// Modified IRR as a percentage: negatives discounted at `financing_rate`,
/// positives compounded to the last period at `reinvestment_rate`.
pub fn mirr(cash_flows: &[f64], financing_rate: f64, reinvestment_rate: f64) -> f64 {
    let n = cash_flows.len();
    if n < 2 {
        return 0.0;
    }

    let negatives: Vec<f64> = cash_flows.iter().map(|f| f.min(0.0)).collect();
    let pv_negatives = npv(&negatives, financing_rate).abs();
    if pv_negatives == 0.0 {
        return 0.0;
    }

    let fv_positives: f64 = cash_flows
        .iter()
        .enumerate()
        .filter(|(_, f)| **f > 0.0)
        .map(|(t, f)| f * (1.0 + reinvestment_rate).powi((n - 1 - t) as i32))
        .sum();

    ((fv_positives / pv_negatives).powf(1.0 / (n - 1) as f64) - 1.0) * 100.0
}

/// First index at which the running sum discounted at `annual_rate / 12`
/// turns non-negative; `n` when it never does.
pub fn discounted_payback(cash_flows: &[f64], annual_rate: f64) -> usize {
    let monthly = 1.0 + annual_rate / 12.0;
    let mut balance = 0.0;

    for (t, cf) in cash_flows.iter().enumerate() {
        balance += cf / monthly.powi(t as i32);
        if balance >= 0.0 {
            return t;
        }
    }

    cash_flows.len()
}

/// PV of the inflows over PV of the absolute outflows.
pub fn profitability_index(cash_flows: &[f64], rate: f64) -> f64 {
    let benefits: Vec<f64> = cash_flows.iter().map(|f| f.max(0.0)).collect();
    let costs: Vec<f64> = cash_flows.iter().map(|f| (-f).max(0.0)).collect();

    let pv_costs = npv(&costs, rate);
    if pv_costs == 0.0 {
        0.0
    } else {
        npv(&benefits, rate) / pv_costs
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct MaxExposure {
    /// Absolute value of the most negative running balance.
    pub value: f64,
    /// Period where that balance was reached; `None` if it never went negative.
    pub period: Option<String>,
}

/// Walks the records chronologically accumulating `sales − (payables +
/// construction + land)` and reports the deepest point.
pub fn max_exposure(records: &[MonthlyRecord]) -> MaxExposure {
    let mut balance = 0.0;
    let mut deepest = 0.0;
    let mut period = None;

    for record in sort_by_period(records) {
        let inflow = record.sales_value.unwrap_or(0.0);
        let outflow = record.payables.unwrap_or(0.0)
            + record.construction_cost.unwrap_or(0.0)
            + record.land_cost.unwrap_or(0.0);
        balance += inflow - outflow;

        if balance < deepest {
            deepest = balance;
            period = Some(record.period.clone());
        }
    }

    MaxExposure {
        value: deepest.abs(),
        period,
    }
}

fn default_max_land_cost_pct() -> f64 {
    35.0
}

fn default_max_construction_cost_pct() -> f64 {
    60.0
}

fn default_min_profitability_pct() -> f64 {
    15.0
}

/// Reference limits for the cost ratios. They only drive informational flags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CostRatioThresholds {
    #[serde(default = "default_max_land_cost_pct")]
    pub max_land_cost_pct: f64,
    #[serde(default = "default_max_construction_cost_pct")]
    pub max_construction_cost_pct: f64,
    #[serde(default = "default_min_profitability_pct")]
    pub min_profitability_pct: f64,
}

impl Default for CostRatioThresholds {
    fn default() -> Self {
        Self {
            max_land_cost_pct: default_max_land_cost_pct(),
            max_construction_cost_pct: default_max_construction_cost_pct(),
            min_profitability_pct: default_min_profitability_pct(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CostRatios {
    pub land_cost_vgv_pct: f64,
    pub construction_cost_vgv_pct: f64,
    pub profitability_vgv_pct: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct CostRatioAssessment {
    pub land_within_limit: bool,
    pub construction_within_limit: bool,
    pub profitability_above_minimum: bool,
}

impl CostRatios {
    pub fn from_totals(land_cost: f64, construction_cost: f64, profit: f64, vgv: f64) -> Self {
        Self {
            land_cost_vgv_pct: ratio_pct(land_cost, vgv),
            construction_cost_vgv_pct: ratio_pct(construction_cost, vgv),
            profitability_vgv_pct: ratio_pct(profit, vgv),
        }
    }

    /// Totals over all records against the dataset's reference VGV.
    pub fn from_dataset(dataset: &ProjectDataset) -> Self {
        let records = &dataset.records;
        let land: f64 = records.iter().filter_map(|r| r.land_cost).sum();
        let construction: f64 = records.iter().filter_map(|r| r.construction_cost).sum();
        let profit: f64 = records.iter().filter_map(|r| r.operating_result).sum();

        Self::from_totals(land, construction, profit, reference_vgv(dataset))
    }

    pub fn assess(&self, thresholds: &CostRatioThresholds) -> CostRatioAssessment {
        CostRatioAssessment {
            land_within_limit: self.land_cost_vgv_pct < thresholds.max_land_cost_pct,
            construction_within_limit: self.construction_cost_vgv_pct
                < thresholds.max_construction_cost_pct,
            profitability_above_minimum: self.profitability_vgv_pct
                > thresholds.min_profitability_pct,
        }
    }
}

/// Plain quotient, 0 when the denominator is zero.
pub fn ratio_or_zero(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 {
        0.0
    } else {
        numerator / denominator
    }
}

pub fn price_per_area(vgv: f64, private_area: f64) -> f64 {
    ratio_or_zero(vgv, private_area)
}

pub fn price_per_unit(vgv: f64, units: f64) -> f64 {
    ratio_or_zero(vgv, units)
}

/// Share of the available units sold in the period, in percent.
pub fn sales_velocity(units_sold: f64, units_available: f64) -> f64 {
    ratio_pct(units_sold, units_available)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct MarketRatios {
    pub price_per_area: f64,
    pub price_per_unit: f64,
    pub sales_velocity_pct: f64,
}

impl MarketRatios {
    /// Uses the project metadata for areas and unit count; without metadata
    /// every ratio is 0.
    pub fn from_dataset(dataset: &ProjectDataset) -> Self {
        let Some(info) = dataset.project_info.as_ref() else {
            return Self::default();
        };

        let vgv = reference_vgv(dataset);
        let units = info.unit_count.unwrap_or(0.0);
        let sold: f64 = dataset.records.iter().filter_map(|r| r.units_sold).sum();

        Self {
            price_per_area: price_per_area(vgv, info.private_area_total.unwrap_or(0.0)),
            price_per_unit: price_per_unit(vgv, units),
            sales_velocity_pct: sales_velocity(sold, units),
        }
    }
}

/// VGV of the latest record, else the declared project VGV, else 0.
pub fn reference_vgv(dataset: &ProjectDataset) -> f64 {
    dataset
        .latest_record()
        .and_then(|r| r.vgv)
        .or_else(|| dataset.declared_vgv())
        .unwrap_or(0.0)
}

/// The discounted cash-flow indicators of one dataset, computed together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DynamicIndicators {
    pub discount_rate: f64,
    pub npv: f64,
    pub irr: IrrEstimate,
    pub mirr_pct: f64,
    pub profitability_index: f64,
    pub discounted_payback_months: usize,
    pub max_exposure: MaxExposure,
}

impl DynamicIndicators {
    pub fn from_records(
        records: &[MonthlyRecord],
        discount_rate: f64,
        financing_rate: f64,
        reinvestment_rate: f64,
    ) -> Self {
        let flows = cash_flow_vector(records);

        Self {
            discount_rate,
            npv: npv(&flows, discount_rate),
            irr: solve_irr(&flows),
            mirr_pct: mirr(&flows, financing_rate, reinvestment_rate),
            profitability_index: profitability_index(&flows, discount_rate),
            discounted_payback_months: discounted_payback(&flows, discount_rate),
            max_exposure: max_exposure(records),
        }
    }

    pub fn irr_pct(&self) -> f64 {
        self.irr.as_percentage()
    }
}
