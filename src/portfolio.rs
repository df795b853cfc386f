use crate::schema::{MonthlyRecord, ProjectDataset};
use crate::utils::ratio_pct;
use log::debug;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub const DEFAULT_PROJECT_NAME: &str = "Projeto";
pub const DEFAULT_PROJECT_VERSION: &str = "1.0";

/// Fixed splits used to synthesize the consolidated income statement.
///
/// These are illustrative constants, not accounting: the holding view has no
/// ledger behind it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct PortfolioPolicy {
    /// Financial revenue as a share of total sales.
    pub financial_revenue_share: f64,
    pub cost_of_units_sold: f64,
    pub commercial_expenses: f64,
    pub administrative_expenses: f64,
    /// Financial income as a share of total realized flow.
    pub financial_income_share: f64,
    /// Financial expense as a share of total payables.
    pub financial_expense_share: f64,
}

impl Default for PortfolioPolicy {
    fn default() -> Self {
        Self {
            financial_revenue_share: 0.02,
            cost_of_units_sold: 0.65,
            commercial_expenses: 0.08,
            administrative_expenses: 0.05,
            financial_income_share: 0.01,
            financial_expense_share: 0.02,
        }
    }
}

impl PortfolioPolicy {
    pub fn entries(&self) -> [(&'static str, f64); 6] {
        [
            ("financial_revenue_share", self.financial_revenue_share),
            ("cost_of_units_sold", self.cost_of_units_sold),
            ("commercial_expenses", self.commercial_expenses),
            ("administrative_expenses", self.administrative_expenses),
            ("financial_income_share", self.financial_income_share),
            ("financial_expense_share", self.financial_expense_share),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ProjectSummary {
    pub name: String,
    pub version: String,
    pub vgv: f64,
    pub accumulated_sales: f64,
    pub projected_flow_total: f64,
    pub realized_flow_total: f64,
    pub receivables_total: f64,
    pub payables_total: f64,
    pub profitability_pct: f64,
    pub physical_progress_pct: f64,
    pub percent_sold: f64,
}

impl ProjectSummary {
    pub fn from_dataset(dataset: &ProjectDataset) -> Self {
        let latest = dataset.latest_record();
        let records = &dataset.records;
        let sum = |f: fn(&MonthlyRecord) -> Option<f64>| -> f64 {
            records.iter().filter_map(f).sum()
        };

        let vgv = dataset
            .declared_vgv()
            .or_else(|| latest.and_then(|r| r.vgv))
            .unwrap_or(0.0);
        let accumulated_sales = sum(|r| r.sales_value);

        Self {
            name: dataset.name().unwrap_or(DEFAULT_PROJECT_NAME).to_string(),
            version: dataset.version().unwrap_or(DEFAULT_PROJECT_VERSION).to_string(),
            vgv,
            accumulated_sales,
            projected_flow_total: sum(|r| r.projected_flow),
            realized_flow_total: sum(|r| r.realized_flow),
            receivables_total: sum(|r| r.receivables),
            payables_total: sum(|r| r.payables),
            profitability_pct: latest.and_then(|r| r.profitability_pct).unwrap_or(0.0),
            physical_progress_pct: latest.and_then(|r| r.physical_progress_pct).unwrap_or(0.0),
            percent_sold: if vgv > 0.0 {
                ratio_pct(accumulated_sales, vgv)
            } else {
                0.0
            },
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PortfolioTotals {
    pub vgv: f64,
    pub sales: f64,
    pub projected_flow: f64,
    pub realized_flow: f64,
    pub receivables: f64,
    pub payables: f64,
}

impl PortfolioTotals {
    pub fn percent_sold(&self) -> f64 {
        if self.vgv > 0.0 {
            ratio_pct(self.sales, self.vgv)
        } else {
            0.0
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum LineKind {
    Revenue,
    Cost,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct IncomeStatementLine {
    pub name: String,
    pub value: f64,
    pub kind: LineKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct IncomeStatementSection {
    pub name: String,
    pub lines: Vec<IncomeStatementLine>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ConsolidatedIncomeStatement {
    pub sections: Vec<IncomeStatementSection>,
}

impl ConsolidatedIncomeStatement {
    pub fn synthesize(totals: &PortfolioTotals, policy: &PortfolioPolicy) -> Self {
        let line = |name: &str, value: f64, kind: LineKind| IncomeStatementLine {
            name: name.to_string(),
            value,
            kind,
        };

        Self {
            sections: vec![
                IncomeStatementSection {
                    name: "Operating revenue".to_string(),
                    lines: vec![
                        line("Real-estate sales", totals.sales, LineKind::Revenue),
                        line(
                            "Financial revenue",
                            totals.sales * policy.financial_revenue_share,
                            LineKind::Revenue,
                        ),
                    ],
                },
                IncomeStatementSection {
                    name: "Costs and expenses".to_string(),
                    lines: vec![
                        line(
                            "Cost of units sold",
                            totals.sales * policy.cost_of_units_sold,
                            LineKind::Cost,
                        ),
                        line(
                            "Commercial expenses",
                            totals.sales * policy.commercial_expenses,
                            LineKind::Cost,
                        ),
                        line(
                            "Administrative expenses",
                            totals.sales * policy.administrative_expenses,
                            LineKind::Cost,
                        ),
                    ],
                },
                IncomeStatementSection {
                    name: "Financial result".to_string(),
                    lines: vec![
                        line(
                            "Financial income",
                            totals.realized_flow * policy.financial_income_share,
                            LineKind::Revenue,
                        ),
                        line(
                            "Financial expenses",
                            totals.payables * policy.financial_expense_share,
                            LineKind::Cost,
                        ),
                    ],
                },
            ],
        }
    }

    fn total_of(&self, kind: LineKind) -> f64 {
        self.sections
            .iter()
            .flat_map(|s| s.lines.iter())
            .filter(|l| l.kind == kind)
            .map(|l| l.value)
            .sum()
    }

    pub fn total_revenue(&self) -> f64 {
        self.total_of(LineKind::Revenue)
    }

    pub fn total_costs(&self) -> f64 {
        self.total_of(LineKind::Cost)
    }

    pub fn net_result(&self) -> f64 {
        self.total_revenue() - self.total_costs()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PortfolioSummary {
    pub projects: Vec<ProjectSummary>,
    pub totals: PortfolioTotals,
    pub income_statement: ConsolidatedIncomeStatement,
}

/// Rolls every project up into holding-level totals. Totals are straight sums of
/// the per-project rows.
pub fn consolidate_portfolio(
    projects: &[ProjectDataset],
    policy: &PortfolioPolicy,
) -> PortfolioSummary {
    if projects.is_empty() {
        return PortfolioSummary::default();
    }

    let rows: Vec<ProjectSummary> = projects.iter().map(ProjectSummary::from_dataset).collect();

    let totals = rows.iter().fold(PortfolioTotals::default(), |acc, row| PortfolioTotals {
        vgv: acc.vgv + row.vgv,
        sales: acc.sales + row.accumulated_sales,
        projected_flow: acc.projected_flow + row.projected_flow_total,
        realized_flow: acc.realized_flow + row.realized_flow_total,
        receivables: acc.receivables + row.receivables_total,
        payables: acc.payables + row.payables_total,
    });
    debug!("Consolidated {} projects, total VGV {:.2}", rows.len(), totals.vgv);

    PortfolioSummary {
        income_statement: ConsolidatedIncomeStatement::synthesize(&totals, policy),
        projects: rows,
        totals,
    }
}
