use crate::error::{FeasibilityError, Result};
use crate::schema::{Milestone, MilestoneStatus, MonthlyRecord, ProjectDataset, ProjectInfo};
use crate::utils::{is_blank, is_canonical_period, normalize_number, normalize_period_value};
use log::{debug, info, warn};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeSet, HashMap};

/// One spreadsheet row as handed over by the sheet reader: column name to cell.
pub type RawRow = Map<String, Value>;

pub const PERIOD_COLUMN: &str = "mes_ano";

pub const REQUIRED_COLUMNS: [&str; 5] = [
    PERIOD_COLUMN,
    "vgv",
    "vendas_valor",
    "fluxo_proj",
    "fluxo_real",
];

/// Every numeric column understood by the monthly sheet.
pub const NUMERIC_COLUMNS: [&str; 46] = [
    "rentabilidade_perc",
    "pa_meses",
    "vgv",
    "vendas_unid",
    "vendas_valor",
    "estoque_unid",
    "estoque_valor",
    "inadimplencia_perc",
    "inadimplencia_valor",
    "contas_pagar",
    "contas_receber",
    "fluxo_proj",
    "fluxo_real",
    "avanco_fisico_perc",
    "avanco_fisico_proj",
    "avanco_financeiro_perc",
    "avanco_financeiro_proj",
    "vendas_meta",
    "receita_incorporacao",
    "impostos_receita",
    "receita_liquida",
    "custos_terreno",
    "custos_construcao",
    "outros_custos",
    "margem_operacional",
    "despesas_incorporacao",
    "despesas_comerciais",
    "despesas_adm_spe",
    "outras_despesas",
    "resultado_operacional",
    "custos_financiamento",
    "vpv_projeto",
    "tir_projeto",
    "mtir_projeto",
    "il_projeto",
    "payback_descontado",
    "exposicao_maxima",
    "custo_terreno_vgv",
    "custo_construcao_vgv",
    "lucratividade_vgv",
    "preco_medio_m2",
    "preco_medio_uh",
    "vso_percentual",
    "cub_m2",
    "bdi_percentual",
    "custo_obra_m2_apv",
];

const TEXT_COLUMNS: [&str; 1] = ["data_exposicao_maxima"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ValidationIssue {
    pub column: String,
    /// 1-based spreadsheet data row, when the issue is tied to one.
    pub row: Option<usize>,
    pub message: String,
    pub severity: Severity,
}

impl ValidationIssue {
    fn error(column: &str, message: String) -> Self {
        Self {
            column: column.to_string(),
            row: None,
            message,
            severity: Severity::Error,
        }
    }

    fn warning(column: &str, row: usize, message: String) -> Self {
        Self {
            column: column.to_string(),
            row: Some(row),
            message,
            severity: Severity::Warning,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SchemaValidation {
    pub is_valid: bool,
    pub errors: Vec<ValidationIssue>,
    pub warnings: Vec<ValidationIssue>,
    pub missing_columns: Vec<String>,
}

/// The sheets of an uploaded workbook after the binary reader is done with them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawWorkbook {
    #[serde(rename = "dados_mensais", default)]
    pub monthly: Vec<RawRow>,
    #[serde(rename = "marcos_projeto", default)]
    pub milestones: Vec<RawRow>,
    #[serde(rename = "projeto_info", default)]
    pub project_info: Option<ProjectInfo>,
}

impl RawWorkbook {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// A successfully ingested dataset plus the non-blocking issues found on the way.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionReport {
    pub dataset: ProjectDataset,
    pub warnings: Vec<ValidationIssue>,
}

/// Checks the monthly sheet before anything is normalized.
///
/// Missing required columns are errors; cells that cannot be read as a period or
/// a number are warnings.
pub fn validate_schema(rows: &[RawRow]) -> SchemaValidation {
    if rows.is_empty() {
        return SchemaValidation {
            is_valid: false,
            errors: vec![ValidationIssue::error(
                "general",
                "Spreadsheet is empty or the monthly data sheet was not found".to_string(),
            )],
            warnings: Vec::new(),
            missing_columns: REQUIRED_COLUMNS.iter().map(|c| c.to_string()).collect(),
        };
    }

    let available: BTreeSet<&str> = rows
        .iter()
        .flat_map(|row| row.keys().map(String::as_str))
        .collect();

    let missing_columns: Vec<String> = REQUIRED_COLUMNS
        .iter()
        .filter(|col| !available.contains(*col))
        .map(|col| col.to_string())
        .collect();

    let errors: Vec<ValidationIssue> = missing_columns
        .iter()
        .map(|col| ValidationIssue::error(col, format!("Required column '{}' not found", col)))
        .collect();

    let mut warnings = Vec::new();
    for (index, row) in rows.iter().enumerate() {
        let line = index + 1;

        match row.get(PERIOD_COLUMN) {
            Some(cell) if !is_blank(cell) => {
                let period = normalize_period_value(cell);
                if !is_canonical_period(&period) {
                    warnings.push(ValidationIssue::warning(
                        PERIOD_COLUMN,
                        line,
                        format!(
                            "Row {}: invalid date format '{}', row left out",
                            line, period
                        ),
                    ));
                }
            }
            _ => warnings.push(ValidationIssue::warning(
                PERIOD_COLUMN,
                line,
                format!("Row {}: period is empty, row left out", line),
            )),
        }

        for column in NUMERIC_COLUMNS {
            if let Some(cell) = row.get(column) {
                if !is_blank(cell) && normalize_number(cell).is_none() {
                    warnings.push(ValidationIssue::warning(
                        column,
                        line,
                        format!("Row {}: invalid numeric value in {}", line, column),
                    ));
                }
            }
        }
    }

    SchemaValidation {
        is_valid: errors.is_empty(),
        errors,
        warnings,
        missing_columns,
    }
}

/// Converts one raw row into a [`MonthlyRecord`]. Unknown columns are ignored and
/// unreadable cells become absent values.
pub fn normalize_row(row: &RawRow) -> Result<MonthlyRecord> {
    let mut normalized = Map::new();

    let period = row
        .get(PERIOD_COLUMN)
        .map(normalize_period_value)
        .unwrap_or_default();
    normalized.insert(PERIOD_COLUMN.to_string(), Value::String(period));

    for column in NUMERIC_COLUMNS {
        if let Some(number) = row.get(column).and_then(normalize_number) {
            normalized.insert(column.to_string(), Value::from(number));
        }
    }

    for column in TEXT_COLUMNS {
        if let Some(cell) = row.get(column).filter(|cell| !is_blank(cell)) {
            let text = match cell {
                Value::String(s) => s.trim().to_string(),
                other => normalize_period_value(other),
            };
            normalized.insert(column.to_string(), Value::String(text));
        }
    }

    Ok(serde_json::from_value(Value::Object(normalized))?)
}

/// Reads the optional milestones sheet. Blank cells become empty strings and an
/// unknown status falls back to planned with a warning.
pub fn parse_milestones(rows: &[RawRow]) -> (Vec<Milestone>, Vec<ValidationIssue>) {
    let mut warnings = Vec::new();

    let milestones = rows
        .iter()
        .enumerate()
        .map(|(index, row)| {
            let status = match text_cell(row, "status") {
                label if label.is_empty() => MilestoneStatus::Planned,
                label => MilestoneStatus::from_label(&label).unwrap_or_else(|| {
                    warnings.push(ValidationIssue::warning(
                        "status",
                        index + 1,
                        format!("Row {}: unknown milestone status '{}'", index + 1, label),
                    ));
                    MilestoneStatus::Planned
                }),
            };

            Milestone {
                name: text_cell(row, "marco"),
                start: text_cell(row, "inicio"),
                end: text_cell(row, "fim"),
                status,
            }
        })
        .collect();

    (milestones, warnings)
}

fn text_cell(row: &RawRow, column: &str) -> String {
    match row.get(column) {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

/// Validates and normalizes a whole workbook.
///
/// Empty input and missing required columns reject the upload; no partial
/// dataset is returned in that case. Everything else is reported as a warning
/// alongside the dataset.
pub fn ingest_workbook(workbook: &RawWorkbook) -> Result<IngestionReport> {
    let validation = validate_schema(&workbook.monthly);

    if workbook.monthly.is_empty() {
        return Err(FeasibilityError::EmptyInput);
    }
    if !validation.is_valid {
        warn!(
            "Rejecting upload, missing required columns: {}",
            validation.missing_columns.join(", ")
        );
        return Err(FeasibilityError::MissingColumns(validation.missing_columns));
    }

    let mut warnings = validation.warnings;
    let mut records: Vec<MonthlyRecord> = Vec::with_capacity(workbook.monthly.len());
    let mut positions: HashMap<String, usize> = HashMap::new();

    for (index, row) in workbook.monthly.iter().enumerate() {
        let record = normalize_row(row)?;

        // Rows without a usable period have no place on the time axis.
        if !is_canonical_period(&record.period) {
            debug!("Leaving out row {} with period '{}'", index + 1, record.period);
            continue;
        }

        match positions.get(&record.period) {
            Some(&existing) => {
                warnings.push(ValidationIssue::warning(
                    PERIOD_COLUMN,
                    index + 1,
                    format!(
                        "Row {}: period {} appears more than once, keeping the last row",
                        index + 1,
                        record.period
                    ),
                ));
                records[existing] = record;
            }
            None => {
                positions.insert(record.period.clone(), records.len());
                records.push(record);
            }
        }
    }

    let (milestones, milestone_warnings) = parse_milestones(&workbook.milestones);
    warnings.extend(milestone_warnings);

    for warning in &warnings {
        warn!("{}", warning.message);
    }
    info!(
        "Ingested {} monthly records and {} milestones ({} warnings)",
        records.len(),
        milestones.len(),
        warnings.len()
    );
    debug!(
        "Periods: {:?}",
        records.iter().map(|r| r.period.as_str()).collect::<Vec<_>>()
    );

    Ok(IngestionReport {
        dataset: ProjectDataset {
            records,
            milestones,
            project_info: workbook.project_info.clone(),
        },
        warnings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{cash_flow_vector, npv};
    use serde_json::json;

    fn row(value: Value) -> RawRow {
        match value {
            Value::Object(map) => map,
            _ => panic!("test rows must be objects"),
        }
    }

    fn complete_row(period: &str) -> RawRow {
        row(json!({
            "mes_ano": period,
            "vgv": 1000,
            "vendas_valor": "100,5",
            "fluxo_proj": -10,
            "fluxo_real": ""
        }))
    }

    #[test]
    fn test_missing_required_column_is_blocking() {
        let rows = vec![row(json!({
            "mes_ano": "2025-01",
            "vendas_valor": 10,
            "fluxo_proj": 1,
            "fluxo_real": 1
        }))];

        let validation = validate_schema(&rows);
        assert!(!validation.is_valid);
        assert_eq!(validation.missing_columns, vec!["vgv".to_string()]);

        let workbook = RawWorkbook {
            monthly: rows,
            ..Default::default()
        };
        match ingest_workbook(&workbook) {
            Err(FeasibilityError::MissingColumns(cols)) => assert_eq!(cols, vec!["vgv"]),
            other => panic!("expected MissingColumns, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_sheet_is_rejected() {
        let validation = validate_schema(&[]);
        assert!(!validation.is_valid);
        assert_eq!(validation.missing_columns.len(), REQUIRED_COLUMNS.len());

        let result = ingest_workbook(&RawWorkbook::default());
        assert!(matches!(result, Err(FeasibilityError::EmptyInput)));
    }

    #[test]
    fn test_normalize_row_keeps_absent_distinct_from_zero() {
        let mut raw = complete_row("Mar/25");
        raw.insert("contas_pagar".to_string(), json!(0));

        let record = normalize_row(&raw).unwrap();
        assert_eq!(record.period, "2025-03");
        assert_eq!(record.vgv, Some(1000.0));
        assert_eq!(record.sales_value, Some(100.5));
        assert_eq!(record.projected_flow, Some(-10.0));
        assert_eq!(record.realized_flow, None);
        assert_eq!(record.payables, Some(0.0));
        assert_eq!(record.profitability_pct, None);
    }

    #[test]
    fn test_bad_cells_are_warnings() {
        let mut bad = complete_row("not a date");
        bad.insert("vgv".to_string(), json!("lots"));
        let rows = vec![complete_row("2025-01"), bad];

        let workbook = RawWorkbook {
            monthly: rows,
            ..Default::default()
        };
        let report = ingest_workbook(&workbook).unwrap();

        assert_eq!(report.dataset.records.len(), 1);
        assert_eq!(report.dataset.records[0].period, "2025-01");
        assert_eq!(report.warnings.len(), 2);
        assert!(report
            .warnings
            .iter()
            .all(|w| w.severity == Severity::Warning && w.row == Some(2)));
    }

    #[test]
    fn test_duplicate_periods_keep_last_row() {
        let mut later = complete_row("2025-01");
        later.insert("vgv".to_string(), json!(2000));
        let workbook = RawWorkbook {
            monthly: vec![complete_row("2025-01"), complete_row("2025-02"), later],
            ..Default::default()
        };

        let report = ingest_workbook(&workbook).unwrap();
        assert_eq!(report.dataset.records.len(), 2);
        assert_eq!(report.dataset.records[0].vgv, Some(2000.0));
        assert_eq!(report.warnings.len(), 1);
    }

    #[test]
    fn test_rows_without_period_stay_off_the_cash_flow() {
        let flow_row = |period: Option<&str>, flow: f64| {
            let mut raw = row(json!({
                "vgv": 5000,
                "vendas_valor": 0,
                "fluxo_proj": flow,
                "fluxo_real": flow
            }));
            if let Some(period) = period {
                raw.insert(PERIOD_COLUMN.to_string(), json!(period));
            }
            raw
        };

        let workbook = RawWorkbook {
            monthly: vec![
                flow_row(Some("2025-01"), -1000.0),
                flow_row(Some("2025-02"), 300.0),
                flow_row(Some("2025-03"), 300.0),
                flow_row(Some("2025-04"), 300.0),
                flow_row(Some("2025-05"), 300.0),
                flow_row(None, 50.0),
                flow_row(Some("  "), 60.0),
                flow_row(Some("Feb/25"), 70.0),
                flow_row(Some("2025-13"), 80.0),
            ],
            ..Default::default()
        };

        let report = ingest_workbook(&workbook).unwrap();
        let periods: Vec<&str> = report
            .dataset
            .records
            .iter()
            .map(|r| r.period.as_str())
            .collect();
        assert_eq!(periods, vec!["2025-01", "2025-02", "2025-03", "2025-04", "2025-05"]);

        let flows = cash_flow_vector(&report.dataset.records);
        assert_eq!(flows, vec![-1000.0, 300.0, 300.0, 300.0, 300.0]);
        assert!((npv(&flows, 0.10) + 49.04).abs() < 0.01);

        let period_warnings: Vec<Option<usize>> = report
            .warnings
            .iter()
            .filter(|w| w.column == PERIOD_COLUMN)
            .map(|w| w.row)
            .collect();
        assert_eq!(period_warnings, vec![Some(6), Some(7), Some(8), Some(9)]);
    }

    #[test]
    fn test_parse_milestones() {
        let rows = vec![
            row(json!({"marco": "Foundation", "inicio": "2024-06-01", "fim": "2024-09-30", "status": "concluido"})),
            row(json!({"marco": "Structure", "inicio": "2024-09-01", "fim": "2025-06-30"})),
            row(json!({"marco": "Keys", "status": "soon"})),
        ];

        let (milestones, warnings) = parse_milestones(&rows);
        assert_eq!(milestones.len(), 3);
        assert_eq!(milestones[0].status, MilestoneStatus::Completed);
        assert_eq!(milestones[1].status, MilestoneStatus::Planned);
        assert_eq!(milestones[2].start, "");
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn test_workbook_from_json() {
        let json = r#"{
            "dados_mensais": [
                { "mes_ano": "2025-01", "vgv": 100, "vendas_valor": 10, "fluxo_proj": 1, "fluxo_real": 2 }
            ],
            "projeto_info": { "nome": "Tower A", "versao": "1.0" }
        }"#;

        let workbook = RawWorkbook::from_json(json).unwrap();
        let report = ingest_workbook(&workbook).unwrap();
        assert!(report.warnings.is_empty());
        assert_eq!(report.dataset.version(), Some("1.0"));
        assert_eq!(report.dataset.records[0].realized_flow, Some(2.0));
    }
}
