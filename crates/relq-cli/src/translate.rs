//! `translate` and `fingerprint` commands

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use relq_ir::{Inputs, Select, Value};
use relq_sql::{
    dialect_by_name, CommandBuilder, DbCommand, Plan, ProjectedColumn, SqlTranslator, ValueRow,
};
use serde::Serialize;
use tracing::{debug, Level};

use crate::cli::{FingerprintArgs, OutputFormat, TranslateArgs};
use crate::config::Config;
use crate::log_event;

/// A parameter as reported: bound value when inputs were supplied,
/// otherwise the host expression it will be computed from.
#[derive(Debug, Serialize)]
struct ParameterReport {
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    value: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    source: Option<relq_ir::Expr>,
}

#[derive(Debug, Serialize)]
struct Report<'a> {
    fingerprint: String,
    dialect: &'static str,
    /// None when the text depends on list inputs that were not supplied
    sql: Option<String>,
    parameters: Vec<ParameterReport>,
    columns: &'a [ProjectedColumn],
    plan: &'a Plan,
    #[serde(skip_serializing_if = "Option::is_none")]
    row: Option<Value>,
}

pub fn run(args: &TranslateArgs, config: &Config) -> Result<()> {
    let select: Select = read_json(&args.query)?;
    let dialect = dialect_by_name(&config.translator.dialect)
        .ok_or_else(|| anyhow!("unknown dialect '{}'", config.translator.dialect))?;

    let query = SqlTranslator::with_options(dialect.as_ref(), config.translator.options())
        .translate(&select)
        .with_context(|| format!("Failed to translate {}", args.query.display()))?;

    let inputs = match &args.inputs {
        Some(path) => Some(load_inputs(path)?),
        None => None,
    };

    let (sql, parameters) = match &inputs {
        Some(inputs) => {
            let mut command = DbCommand::new();
            query
                .command
                .apply(&mut command, inputs)
                .context("Failed to bind parameters")?;
            let parameters = command
                .parameters
                .into_iter()
                .map(|p| ParameterReport {
                    name: p.name,
                    value: Some(p.value),
                    source: None,
                })
                .collect();
            (Some(command.text), parameters)
        }
        None => unbound(&query.command),
    };

    let row = match &args.row {
        Some(path) => {
            let row = load_row(path)?;
            let empty = Inputs::new();
            let value = query
                .materializer
                .materialize_with(&row, inputs.as_ref().unwrap_or(&empty))
                .context("Failed to materialize row")?;
            Some(value)
        }
        None => None,
    };

    let report = Report {
        fingerprint: select.fingerprint(),
        dialect: dialect.name(),
        sql,
        parameters,
        columns: query.materializer.columns(),
        plan: query.materializer.plan(),
        row,
    };

    log_event!(
        level: Level::INFO,
        event: "query_translated",
        fingerprint: report.fingerprint,
        columns: report.columns.len(),
        parameters: report.parameters.len()
    );

    let format = args.format.unwrap_or(config.output.format);
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Text => print_text(&report)?,
    }
    Ok(())
}

pub fn fingerprint(args: &FingerprintArgs) -> Result<()> {
    let select: Select = read_json(&args.query)?;
    println!("{}", select.fingerprint());
    Ok(())
}

fn unbound(command: &CommandBuilder) -> (Option<String>, Vec<ParameterReport>) {
    match command {
        CommandBuilder::Static { text, parameters } => (
            Some(text.clone()),
            parameters
                .iter()
                .map(|p| ParameterReport {
                    name: p.name.clone(),
                    value: None,
                    source: Some(p.value.clone()),
                })
                .collect(),
        ),
        CommandBuilder::Dynamic { .. } => (None, Vec::new()),
    }
}

fn print_text(report: &Report<'_>) -> Result<()> {
    println!("-- fingerprint: {}", report.fingerprint);
    println!("-- dialect: {}", report.dialect);
    match &report.sql {
        Some(sql) => println!("{}", sql),
        None => println!("-- command text depends on list inputs; pass --inputs to build it"),
    }

    if !report.parameters.is_empty() {
        println!();
        println!("-- parameters");
        for parameter in &report.parameters {
            match (&parameter.value, &parameter.source) {
                (Some(value), _) => println!("{} = {}", parameter.name, value),
                (None, Some(source)) => {
                    println!("{} <- {}", parameter.name, serde_json::to_string(source)?)
                }
                (None, None) => println!("{}", parameter.name),
            }
        }
    }

    println!();
    println!("-- columns");
    for (ordinal, column) in report.columns.iter().enumerate() {
        println!("{}: [{}] {:?}", ordinal, column.name, column.ty);
    }

    println!();
    println!("-- plan");
    println!("{}", serde_json::to_string_pretty(report.plan)?);

    if let Some(row) = &report.row {
        println!();
        println!("-- row");
        println!("{}", row);
    }
    Ok(())
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    debug!(path = %path.display(), bytes = contents.len(), "read input file");
    serde_json::from_str(&contents).with_context(|| format!("Failed to parse {}", path.display()))
}

/// Inputs file: a JSON object of plain JSON values.
fn load_inputs(path: &Path) -> Result<Inputs> {
    let json: serde_json::Map<String, serde_json::Value> = read_json(path)?;
    let mut inputs = Inputs::new();
    for (name, value) in &json {
        inputs.insert(name.clone(), plain_value(value));
    }
    Ok(inputs)
}

/// Row file: a JSON array, one plain value per column.
fn load_row(path: &Path) -> Result<ValueRow> {
    let json: Vec<serde_json::Value> = read_json(path)?;
    Ok(ValueRow::new(json.iter().map(plain_value).collect()))
}

/// Untyped JSON to a value. Typed conversion happens on read.
fn plain_value(json: &serde_json::Value) -> Value {
    use serde_json::Value as Json;

    match json {
        Json::Null => Value::Null,
        Json::Bool(b) => Value::Bool(*b),
        Json::Number(n) => match n.as_i64() {
            Some(i) => Value::Int(i),
            None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
        },
        Json::String(s) => Value::String(s.clone()),
        Json::Array(items) => Value::Array(items.iter().map(plain_value).collect()),
        Json::Object(fields) => Value::Record(
            fields
                .iter()
                .map(|(name, value)| (name.clone(), plain_value(value)))
                .collect(),
        ),
    }
}
