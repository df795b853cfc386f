use crate::metrics::{cash_flow_vector, max_exposure, mirr, npv, ratio_or_zero, reference_vgv, solve_irr};
use crate::schema::ProjectDataset;
use crate::utils::ratio_pct;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Multipliers that turn project figures into holding figures.
///
/// These stand in for real inter-entity accounting and carry no meaning
/// beyond reproducing the dashboard's holding view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct EntityPolicy {
    pub holding_result_markup: f64,
    pub dividend_payout: f64,
    pub holding_npv_markup: f64,
    pub holding_irr_markup: f64,
    pub holding_exposure_markup: f64,
    pub mirr_financing_rate: f64,
    pub mirr_reinvestment_rate: f64,
    /// Share of the holding attributed to an outside investor. No investor
    /// entity is produced when unset.
    pub investor_share: Option<f64>,
}

impl Default for EntityPolicy {
    fn default() -> Self {
        Self {
            holding_result_markup: 1.15,
            dividend_payout: 0.6,
            holding_npv_markup: 1.1,
            holding_irr_markup: 1.05,
            holding_exposure_markup: 1.2,
            mirr_financing_rate: 0.08,
            mirr_reinvestment_rate: 0.10,
            investor_share: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ProjectEntity {
    pub result: f64,
    pub result_vgv_pct: f64,
    pub npv: f64,
    pub irr_pct: f64,
    pub financial_revenue: f64,
    pub financial_expense: f64,
    pub max_exposure: f64,
    pub max_exposure_period: Option<String>,
    pub land_cost_total: f64,
    pub land_cost_per_area: f64,
    pub land_cost_vgv_pct: f64,
    pub land_area_per_unit: f64,
}

/// Shape shared by the holding and the optional investor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct HoldingEntity {
    pub total_result: f64,
    pub dividends: f64,
    pub npv: f64,
    pub roi_pct: f64,
    pub irr_pct: f64,
    pub mirr_pct: f64,
    pub max_exposure: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct EntityResults {
    pub project: ProjectEntity,
    pub holding: HoldingEntity,
    pub investor: Option<HoldingEntity>,
}

pub fn calculate_entity_results(
    dataset: &ProjectDataset,
    discount_rate: f64,
    policy: &EntityPolicy,
) -> EntityResults {
    let records = &dataset.records;
    if records.is_empty() {
        return EntityResults::default();
    }

    let flows = cash_flow_vector(records);
    let exposure = max_exposure(records);
    let vgv = reference_vgv(dataset);
    let info = dataset.project_info.as_ref();

    let land_cost_total: f64 = records.iter().filter_map(|r| r.land_cost).sum();
    let result: f64 = records.iter().filter_map(|r| r.operating_result).sum();
    let project_npv = npv(&flows, discount_rate);
    let project_irr = solve_irr(&flows).as_percentage();

    let land_area = info.and_then(|i| i.land_area).unwrap_or(0.0);
    let units = info.and_then(|i| i.unit_count).unwrap_or(0.0);

    let project = ProjectEntity {
        result,
        result_vgv_pct: ratio_pct(result, vgv),
        npv: project_npv,
        irr_pct: project_irr,
        financial_revenue: records.iter().filter_map(|r| r.incorporation_revenue).sum(),
        financial_expense: records.iter().filter_map(|r| r.financing_cost).sum(),
        max_exposure: exposure.value,
        max_exposure_period: exposure.period,
        land_cost_total,
        land_cost_per_area: ratio_or_zero(land_cost_total, land_area),
        land_cost_vgv_pct: ratio_pct(land_cost_total, vgv),
        land_area_per_unit: if land_area > 0.0 {
            ratio_or_zero(land_area, units)
        } else {
            0.0
        },
    };

    let roi_pct = if result > 0.0 {
        ratio_pct(result, land_cost_total.abs())
    } else {
        0.0
    };

    let holding = HoldingEntity {
        total_result: result * policy.holding_result_markup,
        dividends: result * policy.dividend_payout,
        npv: project_npv * policy.holding_npv_markup,
        roi_pct,
        irr_pct: project_irr * policy.holding_irr_markup,
        mirr_pct: mirr(
            &flows,
            policy.mirr_financing_rate,
            policy.mirr_reinvestment_rate,
        ),
        max_exposure: exposure.value * policy.holding_exposure_markup,
    };

    let investor = policy.investor_share.map(|share| HoldingEntity {
        total_result: holding.total_result * share,
        dividends: holding.dividends * share,
        npv: holding.npv * share,
        max_exposure: holding.max_exposure * share,
        ..holding.clone()
    });

    EntityResults {
        project,
        holding,
        investor,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{MonthlyRecord, ProjectInfo};

    fn dataset() -> ProjectDataset {
        let months = [
            ("2025-01", -1000.0, 400.0, -50.0),
            ("2025-02", 300.0, 0.0, 150.0),
            ("2025-03", 300.0, 0.0, 150.0),
            ("2025-04", 300.0, 0.0, 150.0),
            ("2025-05", 300.0, 0.0, 100.0),
        ];
        let records = months
            .iter()
            .map(|(period, flow, land, result)| MonthlyRecord {
                realized_flow: Some(*flow),
                land_cost: Some(*land),
                operating_result: Some(*result),
                vgv: Some(5000.0),
                ..MonthlyRecord::new(*period)
            })
            .collect();

        ProjectDataset {
            records,
            milestones: Vec::new(),
            project_info: Some(ProjectInfo {
                land_area: Some(200.0),
                unit_count: Some(40.0),
                ..Default::default()
            }),
        }
    }

    #[test]
    fn test_project_and_holding_figures() {
        let results = calculate_entity_results(&dataset(), 0.10, &EntityPolicy::default());

        assert_eq!(results.project.result, 500.0);
        assert_eq!(results.project.result_vgv_pct, 10.0);
        assert!((results.project.npv + 49.04).abs() < 0.01);
        assert_eq!(results.project.land_cost_total, 400.0);
        assert_eq!(results.project.land_cost_per_area, 2.0);
        assert_eq!(results.project.land_cost_vgv_pct, 8.0);
        assert_eq!(results.project.land_area_per_unit, 5.0);
        assert_eq!(results.project.max_exposure, 400.0);
        assert_eq!(results.project.max_exposure_period.as_deref(), Some("2025-01"));

        assert!((results.holding.total_result - 575.0).abs() < 1e-9);
        assert_eq!(results.holding.dividends, 300.0);
        assert_eq!(results.holding.roi_pct, 125.0);
        assert!((results.holding.irr_pct - results.project.irr_pct * 1.05).abs() < 1e-9);
        assert!((results.holding.max_exposure - 480.0).abs() < 1e-9);
        assert!(results.investor.is_none());
    }

    #[test]
    fn test_investor_scales_holding() {
        let policy = EntityPolicy {
            investor_share: Some(0.25),
            ..Default::default()
        };
        let results = calculate_entity_results(&dataset(), 0.10, &policy);
        let investor = results.investor.unwrap();

        assert_eq!(investor.dividends, 75.0);
        assert_eq!(investor.roi_pct, results.holding.roi_pct);
        assert_eq!(investor.mirr_pct, results.holding.mirr_pct);
    }

    #[test]
    fn test_roi_zero_without_positive_result_or_land() {
        let mut data = dataset();
        for record in &mut data.records {
            record.land_cost = None;
        }
        let results = calculate_entity_results(&data, 0.10, &EntityPolicy::default());
        assert_eq!(results.holding.roi_pct, 0.0);

        let empty = calculate_entity_results(&ProjectDataset::default(), 0.10, &EntityPolicy::default());
        assert_eq!(empty, EntityResults::default());
    }
}
