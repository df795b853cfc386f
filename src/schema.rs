use crate::entity::EntityPolicy;
use crate::error::{FeasibilityError, Result};
use crate::metrics::CostRatioThresholds;
use crate::portfolio::PortfolioPolicy;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// One calendar month of a project's financial and operational snapshot.
///
/// Every numeric field is optional: an absent value is never the same as zero.
/// Fields serialize under the spreadsheet column names of the upload template.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct MonthlyRecord {
    #[serde(rename = "mes_ano")]
    #[schemars(description = "Canonical period key in YYYY-MM format, unique per dataset")]
    pub period: String,

    #[serde(rename = "rentabilidade_perc")]
    pub profitability_pct: Option<f64>,
    #[serde(rename = "pa_meses")]
    pub payback_months: Option<f64>,
    #[schemars(description = "Total sellable value (VGV) of the project as of this month")]
    pub vgv: Option<f64>,
    #[serde(rename = "vendas_unid")]
    pub units_sold: Option<f64>,
    #[serde(rename = "vendas_valor")]
    pub sales_value: Option<f64>,
    #[serde(rename = "estoque_unid")]
    pub inventory_units: Option<f64>,
    #[serde(rename = "estoque_valor")]
    pub inventory_value: Option<f64>,
    #[serde(rename = "inadimplencia_perc")]
    pub delinquency_pct: Option<f64>,
    #[serde(rename = "inadimplencia_valor")]
    pub delinquency_value: Option<f64>,
    #[serde(rename = "contas_pagar")]
    pub payables: Option<f64>,
    #[serde(rename = "contas_receber")]
    pub receivables: Option<f64>,
    #[serde(rename = "fluxo_proj")]
    pub projected_flow: Option<f64>,
    #[serde(rename = "fluxo_real")]
    pub realized_flow: Option<f64>,

    #[serde(rename = "avanco_fisico_perc")]
    pub physical_progress_pct: Option<f64>,
    #[serde(rename = "avanco_fisico_proj")]
    pub physical_progress_projected: Option<f64>,
    #[serde(rename = "avanco_financeiro_perc")]
    pub financial_progress_pct: Option<f64>,
    #[serde(rename = "avanco_financeiro_proj")]
    pub financial_progress_projected: Option<f64>,
    #[serde(rename = "vendas_meta")]
    pub sales_target: Option<f64>,

    // Income statement (DRE) lines
    #[serde(rename = "receita_incorporacao")]
    pub incorporation_revenue: Option<f64>,
    #[serde(rename = "impostos_receita")]
    pub revenue_taxes: Option<f64>,
    #[serde(rename = "receita_liquida")]
    pub net_revenue: Option<f64>,
    #[serde(rename = "custos_terreno")]
    pub land_cost: Option<f64>,
    #[serde(rename = "custos_construcao")]
    pub construction_cost: Option<f64>,
    #[serde(rename = "outros_custos")]
    pub other_costs: Option<f64>,
    #[serde(rename = "margem_operacional")]
    pub operating_margin: Option<f64>,
    #[serde(rename = "despesas_incorporacao")]
    pub incorporation_expenses: Option<f64>,
    #[serde(rename = "despesas_comerciais")]
    pub commercial_expenses: Option<f64>,
    #[serde(rename = "despesas_adm_spe")]
    pub administrative_expenses: Option<f64>,
    #[serde(rename = "outras_despesas")]
    pub other_expenses: Option<f64>,
    #[serde(rename = "resultado_operacional")]
    pub operating_result: Option<f64>,
    #[serde(rename = "custos_financiamento")]
    pub financing_cost: Option<f64>,

    // Dynamic indicators as reported by the spreadsheet
    #[serde(rename = "vpv_projeto")]
    pub npv: Option<f64>,
    #[serde(rename = "tir_projeto")]
    pub irr: Option<f64>,
    #[serde(rename = "mtir_projeto")]
    pub mirr: Option<f64>,
    #[serde(rename = "il_projeto")]
    pub profitability_index: Option<f64>,
    #[serde(rename = "payback_descontado")]
    pub discounted_payback: Option<f64>,
    #[serde(rename = "exposicao_maxima")]
    pub max_exposure: Option<f64>,
    #[serde(rename = "data_exposicao_maxima")]
    pub max_exposure_date: Option<String>,

    // Cost and market ratios
    #[serde(rename = "custo_terreno_vgv")]
    pub land_cost_vgv_pct: Option<f64>,
    #[serde(rename = "custo_construcao_vgv")]
    pub construction_cost_vgv_pct: Option<f64>,
    #[serde(rename = "lucratividade_vgv")]
    pub profitability_vgv_pct: Option<f64>,
    #[serde(rename = "preco_medio_m2")]
    pub price_per_area: Option<f64>,
    #[serde(rename = "preco_medio_uh")]
    pub price_per_unit: Option<f64>,
    #[serde(rename = "vso_percentual")]
    pub sales_velocity_pct: Option<f64>,

    // Technical references
    #[serde(rename = "cub_m2")]
    pub cub_per_area: Option<f64>,
    #[serde(rename = "bdi_percentual")]
    pub bdi_pct: Option<f64>,
    #[serde(rename = "custo_obra_m2_apv")]
    pub construction_cost_per_area: Option<f64>,
}

impl MonthlyRecord {
    pub fn new(period: impl Into<String>) -> Self {
        Self {
            period: period.into(),
            ..Default::default()
        }
    }

    /// Realized flow with the projected flow as fallback; this is the value that
    /// feeds every discounted cash-flow vector.
    pub fn cash_flow(&self) -> f64 {
        self.realized_flow.or(self.projected_flow).unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum MilestoneStatus {
    #[default]
    #[serde(rename = "planejado")]
    Planned,
    #[serde(rename = "em_andamento")]
    InProgress,
    #[serde(rename = "concluido")]
    Completed,
}

impl MilestoneStatus {
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().as_str() {
            "planejado" | "planned" => Some(Self::Planned),
            "em_andamento" | "in_progress" => Some(Self::InProgress),
            "concluido" | "concluído" | "completed" => Some(Self::Completed),
            _ => None,
        }
    }
}

/// A named schedule interval. Dates are kept as they were uploaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Milestone {
    #[serde(rename = "marco")]
    pub name: String,
    #[serde(rename = "inicio")]
    pub start: String,
    #[serde(rename = "fim")]
    pub end: String,
    #[serde(default)]
    pub status: MilestoneStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CorrectionIndices {
    pub incc: Option<f64>,
    pub ipca: Option<f64>,
    pub igp_m: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct ProjectInfo {
    #[serde(rename = "nome")]
    pub name: Option<String>,
    #[serde(rename = "versao")]
    #[schemars(description = "Version tag identifying the dataset within a comparison session")]
    pub version: Option<String>,
    pub vgv: Option<f64>,
    #[serde(rename = "responsavel")]
    pub responsible: Option<String>,
    #[serde(rename = "data_criacao")]
    pub created_at: Option<String>,
    #[serde(rename = "num_uhs")]
    pub unit_count: Option<f64>,
    #[serde(rename = "area_privativa_total")]
    pub private_area_total: Option<f64>,
    #[serde(rename = "area_privativa_media")]
    pub private_area_avg: Option<f64>,
    #[serde(rename = "data_inicio_obra")]
    pub construction_start: Option<String>,
    #[serde(rename = "data_termino_obra")]
    pub construction_end: Option<String>,
    #[serde(rename = "duracao_meses")]
    pub duration_months: Option<f64>,
    #[serde(rename = "area_terreno")]
    pub land_area: Option<f64>,
    #[serde(rename = "preco_terreno")]
    pub land_price: Option<f64>,
    #[serde(rename = "permuta_fisica")]
    pub physical_swap_units: Option<f64>,
    #[serde(rename = "permuta_financeira")]
    pub financial_swap: Option<f64>,
    #[serde(rename = "data_lancamento")]
    pub launch_date: Option<String>,
    #[serde(rename = "prazo_vendas_meses")]
    pub sales_period_months: Option<f64>,
    #[serde(rename = "taxa_desconto_vpl")]
    #[schemars(description = "Annual discount rate for NPV, in percent (12 means 12%)")]
    pub discount_rate_pct: Option<f64>,
    #[serde(rename = "indices_correcao")]
    pub correction_indices: Option<CorrectionIndices>,
}

/// A named, versioned collection of monthly records. This is both the unit of
/// "version" in comparisons and the unit of "project" in portfolio roll-ups.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ProjectDataset {
    #[serde(rename = "dados_mensais")]
    pub records: Vec<MonthlyRecord>,
    #[serde(rename = "marcos_projeto", default)]
    pub milestones: Vec<Milestone>,
    #[serde(rename = "projeto_info", default)]
    pub project_info: Option<ProjectInfo>,
}

impl ProjectDataset {
    pub fn new(records: Vec<MonthlyRecord>) -> Self {
        Self {
            records,
            ..Default::default()
        }
    }

    pub fn version(&self) -> Option<&str> {
        self.project_info.as_ref()?.version.as_deref()
    }

    pub fn name(&self) -> Option<&str> {
        self.project_info.as_ref()?.name.as_deref()
    }

    /// Records sorted by period, leaving the dataset itself untouched.
    pub fn sorted_records(&self) -> Vec<&MonthlyRecord> {
        crate::utils::sort_by_period(&self.records)
    }

    pub fn latest_record(&self) -> Option<&MonthlyRecord> {
        self.records.iter().max_by(|a, b| a.period.cmp(&b.period))
    }

    pub fn declared_vgv(&self) -> Option<f64> {
        self.project_info.as_ref()?.vgv
    }

    pub fn generate_json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(ProjectDataset)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

fn default_discount_rate() -> f64 {
    0.12
}

fn default_sales_target_ratio() -> f64 {
    1.1
}

fn default_reference_line_ratio() -> f64 {
    0.95
}

fn default_significance_threshold() -> f64 {
    5.0
}

/// Tunable parameters for an analysis run. Every policy constant here is a
/// simplification standing in for real inter-entity accounting; the defaults
/// reproduce the dashboard's reference behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AnalysisConfig {
    #[serde(default = "default_discount_rate")]
    #[schemars(description = "Annual discount rate as a fraction (0.12 = 12%)")]
    pub discount_rate: f64,

    #[serde(default = "default_sales_target_ratio")]
    #[schemars(description = "Sales target used when a month carries none, as a multiple of realized sales")]
    pub sales_target_ratio: f64,

    #[serde(default = "default_reference_line_ratio")]
    #[schemars(description = "Display baseline drawn as a fraction of the projected series")]
    pub reference_line_ratio: f64,

    #[serde(default = "default_significance_threshold")]
    #[schemars(description = "Absolute variance (percent) above which a metric is significant")]
    pub significance_threshold_pct: f64,

    #[serde(default)]
    pub entity_policy: EntityPolicy,

    #[serde(default)]
    pub portfolio_policy: PortfolioPolicy,

    #[serde(default)]
    pub cost_thresholds: CostRatioThresholds,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            discount_rate: default_discount_rate(),
            sales_target_ratio: default_sales_target_ratio(),
            reference_line_ratio: default_reference_line_ratio(),
            significance_threshold_pct: default_significance_threshold(),
            entity_policy: EntityPolicy::default(),
            portfolio_policy: PortfolioPolicy::default(),
            cost_thresholds: CostRatioThresholds::default(),
        }
    }
}

impl AnalysisConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn generate_json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(AnalysisConfig)
    }

    pub fn validate(&self) -> Result<()> {
        check_rate("discount_rate", self.discount_rate)?;
        check_non_negative("sales_target_ratio", self.sales_target_ratio)?;
        check_non_negative("reference_line_ratio", self.reference_line_ratio)?;
        check_non_negative("significance_threshold_pct", self.significance_threshold_pct)?;

        let entity = &self.entity_policy;
        check_non_negative("entity_policy.holding_result_markup", entity.holding_result_markup)?;
        check_non_negative("entity_policy.dividend_payout", entity.dividend_payout)?;
        check_non_negative("entity_policy.holding_npv_markup", entity.holding_npv_markup)?;
        check_non_negative("entity_policy.holding_irr_markup", entity.holding_irr_markup)?;
        check_non_negative(
            "entity_policy.holding_exposure_markup",
            entity.holding_exposure_markup,
        )?;
        check_rate("entity_policy.mirr_financing_rate", entity.mirr_financing_rate)?;
        check_rate(
            "entity_policy.mirr_reinvestment_rate",
            entity.mirr_reinvestment_rate,
        )?;
        if let Some(share) = entity.investor_share {
            if !(0.0..=1.0).contains(&share) {
                return Err(FeasibilityError::InvalidConfig {
                    field: "entity_policy.investor_share".to_string(),
                    details: format!("{} must be between 0.0 and 1.0", share),
                });
            }
        }

        for (field, value) in self.portfolio_policy.entries() {
            check_non_negative(&format!("portfolio_policy.{}", field), value)?;
        }

        let thresholds = &self.cost_thresholds;
        check_non_negative("cost_thresholds.max_land_cost_pct", thresholds.max_land_cost_pct)?;
        check_non_negative(
            "cost_thresholds.max_construction_cost_pct",
            thresholds.max_construction_cost_pct,
        )?;
        check_non_negative(
            "cost_thresholds.min_profitability_pct",
            thresholds.min_profitability_pct,
        )?;

        Ok(())
    }
}

fn check_rate(field: &str, value: f64) -> Result<()> {
    if !value.is_finite() || value <= -1.0 {
        return Err(FeasibilityError::InvalidConfig {
            field: field.to_string(),
            details: format!("{} must be a finite rate greater than -100%", value),
        });
    }
    Ok(())
}

fn check_non_negative(field: &str, value: f64) -> Result<()> {
    if !value.is_finite() || value < 0.0 {
        return Err(FeasibilityError::InvalidConfig {
            field: field.to_string(),
            details: format!("{} must be finite and non-negative", value),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_serializes_under_column_names() {
        let mut record = MonthlyRecord::new("2025-01");
        record.sales_value = Some(10.0);
        record.realized_flow = Some(-5.0);

        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"mes_ano\":\"2025-01\""));
        assert!(json.contains("\"vendas_valor\":10.0"));
        assert!(json.contains("\"fluxo_real\":-5.0"));

        let back: MonthlyRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn test_cash_flow_falls_back_to_projected() {
        let mut record = MonthlyRecord::new("2025-01");
        assert_eq!(record.cash_flow(), 0.0);

        record.projected_flow = Some(-100.0);
        assert_eq!(record.cash_flow(), -100.0);

        // an explicit zero realized flow is a real value, not a gap
        record.realized_flow = Some(0.0);
        assert_eq!(record.cash_flow(), 0.0);
    }

    #[test]
    fn test_latest_record_ignores_input_order() {
        let dataset = ProjectDataset::new(vec![
            MonthlyRecord::new("2025-03"),
            MonthlyRecord::new("2025-01"),
            MonthlyRecord::new("2025-02"),
        ]);

        assert_eq!(dataset.latest_record().unwrap().period, "2025-03");
        let order: Vec<&str> = dataset
            .sorted_records()
            .iter()
            .map(|r| r.period.as_str())
            .collect();
        assert_eq!(order, vec!["2025-01", "2025-02", "2025-03"]);
    }

    #[test]
    fn test_config_defaults_from_empty_json() {
        let config = AnalysisConfig::from_json("{}").unwrap();
        assert_eq!(config, AnalysisConfig::default());
        assert_eq!(config.discount_rate, 0.12);
        assert_eq!(config.entity_policy.holding_result_markup, 1.15);
        assert_eq!(config.portfolio_policy.cost_of_units_sold, 0.65);
    }

    #[test]
    fn test_config_rejects_invalid_rate() {
        let result = AnalysisConfig::from_json(r#"{ "discount_rate": -1.5 }"#);
        assert!(matches!(
            result,
            Err(FeasibilityError::InvalidConfig { ref field, .. }) if field == "discount_rate"
        ));

        let result = AnalysisConfig::from_json(
            r#"{ "entity_policy": { "investor_share": 1.5 } }"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_schema_generation() {
        let schema = serde_json::to_string_pretty(&ProjectDataset::generate_json_schema()).unwrap();
        assert!(schema.contains("dados_mensais"));
        assert!(schema.contains("mes_ano"));

        let config_schema =
            serde_json::to_string_pretty(&AnalysisConfig::generate_json_schema()).unwrap();
        assert!(config_schema.contains("discount_rate"));
    }
}
