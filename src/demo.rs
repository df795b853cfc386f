//! Sample datasets for exploring the dashboard without an upload.

use crate::schema::{
    CorrectionIndices, Milestone, MilestoneStatus, MonthlyRecord, ProjectDataset, ProjectInfo,
};
use chrono::{Days, NaiveDate};
use rand::Rng;
use rand_distr::{Distribution, Normal};

const DEMO_MONTHS: [&str; 9] = [
    "2024-09", "2024-10", "2024-11", "2024-12", "2025-01", "2025-02", "2025-03", "2025-04",
    "2025-05",
];

const DEMO_VGV: f64 = 76_914_000.0;
const DEMO_UNITS: f64 = 126.0;
const DEMO_LAND_AREA: f64 = 1170.0;
const DEMO_LAND_PRICE: f64 = 8_500_000.0;
const DEMO_PRIVATE_AREA: f64 = 4982.0;

const VERSION_MONTHS: [&str; 8] = [
    "2025-01", "2025-02", "2025-03", "2025-04", "2025-05", "2025-06", "2025-07", "2025-08",
];

const REALIZED_FLOW_NOISE_STD: f64 = 60_000.0;

/// A nine-month project with every extended field filled in and seven milestones.
/// The output is fully deterministic.
pub fn demo_dataset() -> ProjectDataset {
    let n = DEMO_MONTHS.len() as f64;

    let records = DEMO_MONTHS
        .iter()
        .enumerate()
        .map(|(index, month)| {
            let i = index as f64;
            let progress = (i + 1.0) / n;
            // every third month of the cycle the flow sign flips
            let outflow_month = (index % 8) % 3 == 0;

            let land_cost = DEMO_LAND_PRICE * (progress * 1.2).min(1.0);
            let construction_cost = DEMO_VGV * 0.45 * progress;
            let sales_value = DEMO_VGV * progress * 0.8;
            let incorporation_revenue = sales_value * 1.05;
            let revenue_taxes = incorporation_revenue * 0.08;
            let other_costs = DEMO_VGV * 0.05 * progress;
            let gross = incorporation_revenue - land_cost - construction_cost;
            let units_sold = (DEMO_UNITS * progress * 0.85).floor();
            let net_flow = sales_value - construction_cost - land_cost;

            MonthlyRecord {
                vgv: Some(DEMO_VGV),
                profitability_pct: Some(18.0 + (i * 0.3).sin() * 3.0),
                payback_months: Some((36.0 - i * 2.0).max(12.0)),
                units_sold: Some(units_sold),
                sales_value: Some(sales_value),
                sales_target: Some(sales_value * 1.1),
                inventory_units: Some(DEMO_UNITS - units_sold),
                inventory_value: Some(DEMO_VGV - sales_value),
                delinquency_pct: Some((2.5 + (i * 0.5).sin() * 1.5).max(0.0)),
                delinquency_value: Some(sales_value * 0.025),
                payables: Some(construction_cost + land_cost),
                receivables: Some(sales_value * 0.7),
                projected_flow: Some(net_flow * if outflow_month { -0.5 } else { 1.0 }),
                realized_flow: Some(net_flow * if outflow_month { -0.3 } else { 0.9 }),
                physical_progress_pct: Some((progress * 95.0).min(85.0)),
                physical_progress_projected: Some(((progress + 0.1) * 100.0).min(100.0)),
                financial_progress_pct: Some((progress * 90.0).min(80.0)),
                financial_progress_projected: Some(((progress + 0.05) * 100.0).min(95.0)),
                incorporation_revenue: Some(incorporation_revenue),
                revenue_taxes: Some(revenue_taxes),
                net_revenue: Some(incorporation_revenue - revenue_taxes),
                land_cost: Some(land_cost),
                construction_cost: Some(construction_cost),
                other_costs: Some(other_costs),
                operating_margin: Some(gross - other_costs),
                incorporation_expenses: Some(DEMO_VGV * 0.03 * progress),
                commercial_expenses: Some(DEMO_VGV * 0.04 * progress),
                administrative_expenses: Some(DEMO_VGV * 0.02 * progress),
                other_expenses: Some(DEMO_VGV * 0.01 * progress),
                operating_result: Some(gross * 0.85 - DEMO_VGV * 0.1 * progress),
                financing_cost: Some(DEMO_VGV * 0.08 * progress),
                npv: Some(gross * 0.7),
                irr: Some(15.0 + (i * 0.4).sin() * 3.0),
                mirr: Some(14.0 + (i * 0.3).sin() * 2.0),
                profitability_index: Some(1.2 + (i * 0.2).sin() * 0.3),
                discounted_payback: Some((24.0 - i).max(8.0)),
                max_exposure: Some((land_cost + construction_cost - sales_value).max(0.0)),
                max_exposure_date: Some(month.to_string()),
                land_cost_vgv_pct: Some(land_cost / DEMO_VGV * 100.0),
                construction_cost_vgv_pct: Some(construction_cost / DEMO_VGV * 100.0),
                profitability_vgv_pct: Some(gross / DEMO_VGV * 100.0),
                price_per_area: Some(DEMO_VGV / DEMO_PRIVATE_AREA),
                price_per_unit: Some(DEMO_VGV / DEMO_UNITS),
                sales_velocity_pct: Some(units_sold / DEMO_UNITS * 100.0),
                cub_per_area: Some(2800.0 + i * 50.0),
                bdi_pct: Some(25.0 + (i * 0.1).sin() * 2.0),
                construction_cost_per_area: Some(construction_cost / DEMO_PRIVATE_AREA),
                ..MonthlyRecord::new(*month)
            }
        })
        .collect();

    let milestone = |name: &str, start: &str, end: &str, status| Milestone {
        name: name.to_string(),
        start: start.to_string(),
        end: end.to_string(),
        status,
    };

    ProjectDataset {
        records,
        milestones: vec![
            milestone("Aprovação Projeto", "2024-01-15", "2024-03-30", MilestoneStatus::Completed),
            milestone("Lançamento Vendas", "2024-03-15", "2024-03-15", MilestoneStatus::Completed),
            milestone("Início da Obra", "2024-06-01", "2024-06-01", MilestoneStatus::Completed),
            milestone("Fundação", "2024-06-01", "2024-09-30", MilestoneStatus::Completed),
            milestone("Estrutura", "2024-09-01", "2025-06-30", MilestoneStatus::InProgress),
            milestone("Acabamento", "2025-06-01", "2026-08-31", MilestoneStatus::Planned),
            milestone("Entrega das Chaves", "2026-09-01", "2026-12-01", MilestoneStatus::Planned),
        ],
        project_info: Some(ProjectInfo {
            name: Some("Residencial Amazônia".to_string()),
            version: Some("3.2".to_string()),
            vgv: Some(DEMO_VGV),
            responsible: Some("João Silva".to_string()),
            created_at: Some("2024-01-15".to_string()),
            unit_count: Some(DEMO_UNITS),
            private_area_total: Some(DEMO_PRIVATE_AREA),
            private_area_avg: Some(DEMO_PRIVATE_AREA / DEMO_UNITS),
            construction_start: Some("2024-06-01".to_string()),
            construction_end: Some("2026-12-01".to_string()),
            duration_months: Some(30.0),
            land_area: Some(DEMO_LAND_AREA),
            land_price: Some(DEMO_LAND_PRICE),
            physical_swap_units: Some(4.0),
            financial_swap: Some(DEMO_LAND_PRICE * 0.15),
            launch_date: Some("2024-03-15".to_string()),
            sales_period_months: Some(36.0),
            discount_rate_pct: Some(12.0),
            correction_indices: Some(CorrectionIndices {
                incc: Some(4.2),
                ipca: Some(3.8),
                igp_m: Some(4.5),
            }),
        }),
    }
}

/// The feasibility-study baseline the demo project is measured against:
/// sales 10% higher, construction 5% cheaper, projections 15% more optimistic.
pub fn demo_plan_baseline(dataset: &ProjectDataset) -> Vec<MonthlyRecord> {
    dataset
        .records
        .iter()
        .map(|r| MonthlyRecord {
            sales_value: Some(r.sales_value.unwrap_or(0.0) * 1.1),
            construction_cost: Some(r.construction_cost.unwrap_or(0.0) * 0.95),
            projected_flow: Some(r.projected_flow.unwrap_or(0.0) * 1.15),
            ..r.clone()
        })
        .collect()
}

struct VersionProfile {
    tag: &'static str,
    name: &'static str,
    multiplier: f64,
    vgv: f64,
}

const VERSION_PROFILES: [VersionProfile; 3] = [
    VersionProfile {
        tag: "1.0",
        name: "Versão Inicial",
        multiplier: 0.85,
        vgv: 100_000_000.0,
    },
    VersionProfile {
        tag: "2.0",
        name: "Revisão Market",
        multiplier: 0.95,
        vgv: 115_000_000.0,
    },
    VersionProfile {
        tag: "2.1",
        name: "Residencial Via Nova",
        multiplier: 1.0,
        vgv: 120_000_000.0,
    },
];

/// Three successive versions (1.0, 2.0, 2.1) of an eight-month project.
///
/// Realized flow is the projected flow plus normally distributed noise drawn
/// from `rng`; seed it for reproducible output. Creation dates step back 30
/// days per version from `today`.
pub fn demo_versions<R: Rng + ?Sized>(rng: &mut R, today: NaiveDate) -> Vec<ProjectDataset> {
    let noise = Normal::new(0.0, REALIZED_FLOW_NOISE_STD).ok();

    VERSION_PROFILES
        .iter()
        .enumerate()
        .map(|(version_index, profile)| {
            let m = profile.multiplier;

            let records = VERSION_MONTHS
                .iter()
                .enumerate()
                .map(|(index, month)| {
                    let i = index as f64;
                    let sales = (3_500_000.0 + i * 500_000.0) * m;
                    let flow = (-800_000.0 + i * 300_000.0) * m;
                    let jitter = noise.as_ref().map_or(0.0, |n| n.sample(rng));

                    MonthlyRecord {
                        profitability_pct: Some((2.5 + i * 0.2) * m),
                        payback_months: Some(((18.0 - i) * (m + 0.1)).round()),
                        vgv: Some(profile.vgv),
                        units_sold: Some(((10.0 + i * 2.0) * m).round()),
                        sales_value: Some(sales),
                        inventory_units: Some(((90.0 - i * 2.0) * (2.0 - m)).round()),
                        inventory_value: Some((45_000_000.0 - i * 600_000.0) * m),
                        delinquency_pct: Some((1.2 - i * 0.1) * (2.0 - m)),
                        delinquency_value: Some((300_000.0 - i * 10_000.0) * (2.0 - m)),
                        payables: Some((4_200_000.0 - i * 200_000.0) * m),
                        receivables: Some((5_200_000.0 + i * 100_000.0) * m),
                        projected_flow: Some(flow),
                        realized_flow: Some(flow + jitter),
                        physical_progress_pct: Some(i * 12.5 * m),
                        physical_progress_projected: Some((i * 12.5 + 5.0) * m),
                        financial_progress_pct: Some(i * 10.0 * m),
                        sales_target: Some(sales * 1.1),
                        ..MonthlyRecord::new(*month)
                    }
                })
                .collect();

            let status_if = |done: bool, otherwise: MilestoneStatus| {
                if done {
                    MilestoneStatus::Completed
                } else {
                    otherwise
                }
            };
            let milestone = |name: &str, start: &str, end: &str, status| Milestone {
                name: name.to_string(),
                start: start.to_string(),
                end: end.to_string(),
                status,
            };

            let created_at = today
                .checked_sub_days(Days::new(30 * version_index as u64))
                .unwrap_or(today);

            ProjectDataset {
                records,
                milestones: vec![
                    milestone(
                        "Lançamento do Projeto",
                        "2025-01-01",
                        "2025-01-15",
                        status_if(version_index == 2, MilestoneStatus::Planned),
                    ),
                    milestone(
                        "Início das Obras",
                        "2025-02-01",
                        "2025-02-28",
                        status_if(version_index >= 1, MilestoneStatus::Planned),
                    ),
                    milestone(
                        "50% Vendido",
                        "2025-04-01",
                        "2025-06-30",
                        if version_index == 2 {
                            MilestoneStatus::InProgress
                        } else {
                            MilestoneStatus::Planned
                        },
                    ),
                    milestone(
                        "Obra 80% Concluída",
                        "2025-08-01",
                        "2025-10-31",
                        MilestoneStatus::Planned,
                    ),
                    milestone("Habite-se", "2025-11-01", "2025-12-31", MilestoneStatus::Planned),
                ],
                project_info: Some(ProjectInfo {
                    name: Some(profile.name.to_string()),
                    version: Some(profile.tag.to_string()),
                    vgv: Some(profile.vgv),
                    responsible: Some("Equipe Via.One".to_string()),
                    created_at: Some(created_at.format("%d/%m/%Y").to_string()),
                    ..Default::default()
                }),
            }
        })
        .collect()
}
