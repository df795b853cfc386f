use crate::aggregator::{
    CashFlowPoint, DreRow, FinancialProgressPoint, KpiSnapshot, OperationalCashFlowPoint,
    ProgressPoint, SalesPoint,
};
use crate::entity::EntityResults;
use crate::error::Result;
use crate::format::{format_currency, format_number, format_percentage};
use crate::ingestion::ValidationIssue;
use crate::metrics::{CostRatioAssessment, CostRatios, DynamicIndicators, MarketRatios};
use crate::quality::QualityReport;
use crate::timeline::Timeline;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Everything the executive dashboard shows for one dataset and filter choice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DashboardReport {
    pub project_name: Option<String>,
    pub version: Option<String>,
    pub selected_period: Option<String>,
    pub accumulated: bool,
    pub available_periods: Vec<String>,
    pub kpis: KpiSnapshot,
    pub cash_flow: Vec<CashFlowPoint>,
    pub sales: Vec<SalesPoint>,
    pub progress: Vec<ProgressPoint>,
    pub financial_progress: Vec<FinancialProgressPoint>,
    pub operational_cash_flow: Vec<OperationalCashFlowPoint>,
    pub dre: Vec<DreRow>,
    pub indicators: DynamicIndicators,
    pub cost_ratios: CostRatios,
    pub cost_assessment: CostRatioAssessment,
    pub market_ratios: MarketRatios,
    pub entities: EntityResults,
    pub quality: QualityReport,
    pub timeline: Timeline,
    /// Non-blocking issues raised while the upload was ingested.
    #[serde(default)]
    pub warnings: Vec<ValidationIssue>,
}

impl DashboardReport {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn generate_json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(DashboardReport)
    }

    pub fn to_markdown(&self) -> String {
        let mut output = String::new();

        output.push_str(&format!(
            "# Feasibility Dashboard - {}\n\n",
            self.project_name.as_deref().unwrap_or("Unnamed project")
        ));
        output.push_str(&format!(
            "Version: {} | Period: {} ({})\n\n",
            self.version.as_deref().unwrap_or("N/A"),
            self.selected_period.as_deref().unwrap_or("N/A"),
            if self.accumulated { "accumulated" } else { "monthly" }
        ));

        let kpis = &self.kpis;
        output.push_str("## Key Indicators\n\n");
        output.push_str("| Indicator | Value | Change |\n|---|---|---|\n");
        output.push_str(&format!(
            "| Profitability{} | {} | {} |\n",
            if kpis.profitability.is_estimated { " (estimated)" } else { "" },
            format_percentage(Some(kpis.profitability.value)),
            format_percentage(Some(kpis.variation.profitability))
        ));
        output.push_str(&format!(
            "| Payback (months) | {} | |\n",
            format_number(Some(kpis.profitability.payback_months))
        ));
        output.push_str(&format!(
            "| VGV | {} | {} |\n",
            format_currency(Some(kpis.vgv.value)),
            format_percentage(Some(kpis.variation.vgv))
        ));
        output.push_str(&format!(
            "| Sold | {} | {} |\n",
            format_percentage(Some(kpis.vgv.percent_sold)),
            format_percentage(Some(kpis.variation.percent_sold))
        ));
        output.push_str(&format!(
            "| Sales | {} ({} units) | {} |\n",
            format_currency(Some(kpis.accumulated_sales.value)),
            format_number(Some(kpis.accumulated_sales.units)),
            format_percentage(Some(kpis.variation.sales_value))
        ));
        output.push_str(&format!(
            "| Inventory | {} ({} units) | {} |\n",
            format_currency(Some(kpis.inventory.value)),
            format_number(Some(kpis.inventory.units)),
            format_percentage(Some(kpis.variation.inventory_value))
        ));
        output.push_str(&format!(
            "| Delinquency | {} ({}) | {} |\n\n",
            format_percentage(Some(kpis.delinquency.percentage)),
            format_currency(Some(kpis.delinquency.value)),
            format_percentage(Some(kpis.variation.delinquency_pct))
        ));

        let ind = &self.indicators;
        output.push_str("## Dynamic Indicators\n\n");
        output.push_str(&format!("- NPV: {}\n", format_currency(Some(ind.npv))));
        output.push_str(&format!(
            "- IRR: {}{}\n",
            format_percentage(Some(ind.irr_pct())),
            if ind.irr.converged { "" } else { " (not converged)" }
        ));
        output.push_str(&format!("- MIRR: {}\n", format_percentage(Some(ind.mirr_pct))));
        output.push_str(&format!(
            "- Profitability index: {}\n",
            format_number(Some(ind.profitability_index))
        ));
        output.push_str(&format!(
            "- Discounted payback: {} months\n",
            ind.discounted_payback_months
        ));
        output.push_str(&format!(
            "- Max exposure: {} ({})\n\n",
            format_currency(Some(ind.max_exposure.value)),
            ind.max_exposure.period.as_deref().unwrap_or("N/A")
        ));

        output.push_str("## Cost Ratios\n\n");
        let flag = |ok: bool| if ok { "ok" } else { "attention" };
        output.push_str(&format!(
            "- Land / VGV: {} ({})\n",
            format_percentage(Some(self.cost_ratios.land_cost_vgv_pct)),
            flag(self.cost_assessment.land_within_limit)
        ));
        output.push_str(&format!(
            "- Construction / VGV: {} ({})\n",
            format_percentage(Some(self.cost_ratios.construction_cost_vgv_pct)),
            flag(self.cost_assessment.construction_within_limit)
        ));
        output.push_str(&format!(
            "- Profitability / VGV: {} ({})\n\n",
            format_percentage(Some(self.cost_ratios.profitability_vgv_pct)),
            flag(self.cost_assessment.profitability_above_minimum)
        ));

        output.push_str("## Entities\n\n");
        output.push_str("| Entity | Result | NPV | IRR | Max exposure |\n|---|---|---|---|---|\n");
        let project = &self.entities.project;
        output.push_str(&format!(
            "| Project | {} | {} | {} | {} |\n",
            format_currency(Some(project.result)),
            format_currency(Some(project.npv)),
            format_percentage(Some(project.irr_pct)),
            format_currency(Some(project.max_exposure))
        ));
        let holdings = std::iter::once(("Holding", &self.entities.holding))
            .chain(self.entities.investor.iter().map(|i| ("Investor", i)));
        for (label, entity) in holdings {
            output.push_str(&format!(
                "| {} | {} | {} | {} | {} |\n",
                label,
                format_currency(Some(entity.total_result)),
                format_currency(Some(entity.npv)),
                format_percentage(Some(entity.irr_pct)),
                format_currency(Some(entity.max_exposure))
            ));
        }
        output.push('\n');

        output.push_str(&format!("## Data Quality: {}/100\n\n", self.quality.score));
        for check in &self.quality.checks {
            output.push_str(&format!(
                "- [{}] {} ({} pts)\n",
                if check.passed { "x" } else { " " },
                check.name,
                check.points
            ));
        }

        if !self.timeline.bars.is_empty() {
            output.push_str("\n## Milestones\n\n");
            for bar in &self.timeline.bars {
                output.push_str(&format!(
                    "- {}: {} to {} ({:?})\n",
                    bar.name, bar.start, bar.end, bar.status
                ));
            }
        }

        if !self.warnings.is_empty() {
            output.push_str("\n## Warnings\n\n");
            for warning in &self.warnings {
                output.push_str(&format!("- {}\n", warning.message));
            }
        }

        output
    }

    /// The income statement rows as CSV.
    pub fn dre_to_csv(&self) -> String {
        let mut output = String::new();
        output.push_str("Period,Revenue,Costs,Result\n");
        for row in &self.dre {
            output.push_str(&format!(
                "{},{:.2},{:.2},{:.2}\n",
                row.period, row.revenue, row.costs, row.result
            ));
        }
        output
    }
}
