// crates/trellis-cli/src/commands/run.rs
//
// `trellis run <scenario>`: apply a scenario file to a fresh trust domain,
// then enforce every registered boundary against every entity.

use std::fs;

use clap::{Args, ValueEnum};
use serde::Serialize;
use tabled::{Table, Tabled};

use trellis_engine::{EngineConfig, OperationReport, Scenario, TrellisError, TrustDomain};

/// How a run report is printed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Operation and verdict tables.
    Table,
    /// The whole report as pretty JSON.
    Json,
}

/// Run a scenario file.
#[derive(Debug, Args)]
pub struct RunCmd {
    /// Path to a TOML scenario file.
    #[arg()]
    pub scenario: String,

    /// Output format.
    #[arg(long, value_enum, default_value = "table")]
    pub format: OutputFormat,
}

/// Errors raised before any operation runs.
#[derive(Debug, thiserror::Error)]
pub enum ScenarioError {
    #[error("could not read scenario {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("could not parse scenario {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid engine configuration: {0}")]
    Engine(#[from] TrellisError),
}

/// One boundary verdict for one entity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BoundaryVerdict {
    pub entity_id: String,
    pub boundary_id: String,
    pub verified: bool,
    pub confidence_score: f64,
    pub errors: Vec<String>,
}

/// Everything a scenario run produced.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub scenario: Option<String>,
    pub operations: Vec<OperationReport>,
    pub verdicts: Vec<BoundaryVerdict>,
}

impl RunReport {
    pub fn failed_operations(&self) -> usize {
        self.operations.iter().filter(|r| !r.success).count()
    }
}

#[derive(Tabled)]
struct OperationRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "Operation")]
    operation: String,
    #[tabled(rename = "Subject")]
    subject: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Result")]
    result: String,
}

#[derive(Tabled)]
struct VerdictRow {
    #[tabled(rename = "Entity")]
    entity: String,
    #[tabled(rename = "Boundary")]
    boundary: String,
    #[tabled(rename = "Verified")]
    verified: String,
    #[tabled(rename = "Confidence")]
    confidence: String,
    #[tabled(rename = "Errors")]
    errors: String,
}

impl From<&OperationReport> for OperationRow {
    fn from(report: &OperationReport) -> Self {
        let result = match (&report.outcome, &report.error) {
            (Some(outcome), _) => outcome.summary(),
            (None, Some(error)) => error.clone(),
            (None, None) => String::new(),
        };
        Self {
            index: report.index,
            operation: report.operation.clone(),
            subject: report.subject.clone(),
            status: if report.success {
                "ok".to_string()
            } else {
                format!("failed ({})", report.error_kind.as_deref().unwrap_or("unknown"))
            },
            result,
        }
    }
}

impl From<&BoundaryVerdict> for VerdictRow {
    fn from(v: &BoundaryVerdict) -> Self {
        Self {
            entity: v.entity_id.clone(),
            boundary: v.boundary_id.clone(),
            verified: if v.verified { "yes" } else { "no" }.to_string(),
            confidence: format!("{:.4}", v.confidence_score),
            errors: v.errors.join("; "),
        }
    }
}

/// Parse a TOML scenario.
pub fn parse_scenario(path: &str, contents: &str) -> Result<Scenario, ScenarioError> {
    toml::from_str(contents).map_err(|source| ScenarioError::Parse {
        path: path.to_string(),
        source,
    })
}

/// Apply a scenario to a fresh domain and collect boundary verdicts.
pub fn execute(scenario: Scenario, config: &EngineConfig) -> Result<RunReport, ScenarioError> {
    let mut domain = TrustDomain::new(config.clone())?;
    let name = scenario.name.clone();

    tracing::info!(
        scenario = name.as_deref().unwrap_or("unnamed"),
        operations = scenario.operations.len(),
        "Running scenario"
    );
    let operations = domain.apply_batch(scenario.operations);

    let mut verdicts = Vec::new();
    for entity_id in domain.entity_ids() {
        for (boundary_id, result) in domain.verify_all_boundaries(&entity_id) {
            verdicts.push(BoundaryVerdict {
                entity_id: entity_id.clone(),
                boundary_id,
                verified: result.verified,
                confidence_score: result.confidence_score,
                errors: result.errors,
            });
        }
    }

    Ok(RunReport {
        scenario: name,
        operations,
        verdicts,
    })
}

/// Run the scenario command.
pub fn run(cmd: &RunCmd, config: &EngineConfig) -> Result<(), Box<dyn std::error::Error>> {
    let contents = fs::read_to_string(&cmd.scenario).map_err(|source| ScenarioError::Read {
        path: cmd.scenario.clone(),
        source,
    })?;
    let scenario = parse_scenario(&cmd.scenario, &contents)?;
    let report = execute(scenario, config)?;

    match cmd.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Table => {
            if let Some(name) = &report.scenario {
                println!("Scenario: {}", name);
                println!();
            }
            let rows: Vec<OperationRow> = report.operations.iter().map(OperationRow::from).collect();
            println!("{}", Table::new(&rows));

            if report.verdicts.is_empty() {
                println!();
                println!("No trust boundaries registered.");
            } else {
                let rows: Vec<VerdictRow> = report.verdicts.iter().map(VerdictRow::from).collect();
                println!();
                println!("{}", Table::new(&rows));
            }

            println!();
            println!(
                "{} operation(s), {} failed",
                report.operations.len(),
                report.failed_operations()
            );
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCENARIO: &str = r#"
        name = "org rollout"

        [[operations]]
        op = "upsert_entity"
        entity_id = "org"
        base_score = 0.9
        context_scores = { security = 0.9 }

        [[operations]]
        op = "register_relationship"
        parent_id = "org"
        child_id = "team"

        [[operations]]
        op = "inherit"
        child_id = "team"

        [[operations]]
        op = "register_relationship"
        parent_id = "team"
        child_id = "org"

        [[operations]]
        op = "promote_tier"
        entity_id = "org"
        tier = "gold"

        [[operations]]
        op = "register_boundary"
        boundary_id = "secure"
        min_trust_score = 0.75
        required_context_scores = { security = 0.5 }
    "#;

    #[test]
    fn scenario_parses_from_toml() {
        let scenario = parse_scenario("inline", SCENARIO).unwrap();
        assert_eq!(scenario.name.as_deref(), Some("org rollout"));
        assert_eq!(scenario.operations.len(), 6);
        assert_eq!(scenario.operations[4].name(), "promote_tier");
    }

    #[test]
    fn execute_reports_failures_and_verdicts() {
        let scenario = parse_scenario("inline", SCENARIO).unwrap();
        let report = execute(scenario, &EngineConfig::default()).unwrap();

        let success: Vec<bool> = report.operations.iter().map(|r| r.success).collect();
        assert_eq!(success, vec![true, true, true, false, true, true]);
        assert_eq!(report.operations[3].error_kind.as_deref(), Some("conflict"));
        assert_eq!(report.failed_operations(), 1);

        // org passes at 0.9, team fails at 0.72.
        assert_eq!(report.verdicts.len(), 2);
        let org = report.verdicts.iter().find(|v| v.entity_id == "org").unwrap();
        let team = report.verdicts.iter().find(|v| v.entity_id == "team").unwrap();
        assert!(org.verified);
        assert!(!team.verified);
        assert!((team.confidence_score - 0.72).abs() < 1e-9);
    }

    #[test]
    fn unknown_operation_is_a_parse_error() {
        let err = parse_scenario("bad.toml", "[[operations]]\nop = \"teleport\"").unwrap_err();
        assert!(matches!(err, ScenarioError::Parse { .. }));
    }
}
