//! Row materialization
//!
//! The flattened projection compiles to a `Plan`: a small tree of
//! instructions that reads column ordinals from a row and rebuilds the
//! result shape. Plans are plain data and can be cached with the command.

use relq_ir::{apply_binary, apply_unary, condition, eval, BinaryOp, DataType, Inputs, UnaryOp, Value};
use serde::Serialize;
use tracing::trace;

use crate::error::MaterializeError;

/// Access to one result row.
pub trait RowCursor {
    /// Value at `ordinal`, converted to `ty`.
    fn get_value(&self, ordinal: usize, ty: &DataType) -> Result<Value, MaterializeError>;
}

/// Row held in memory.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValueRow {
    values: Vec<Value>,
}

impl ValueRow {
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl From<Vec<Value>> for ValueRow {
    fn from(values: Vec<Value>) -> Self {
        Self::new(values)
    }
}

impl RowCursor for ValueRow {
    fn get_value(&self, ordinal: usize, ty: &DataType) -> Result<Value, MaterializeError> {
        let value = self
            .values
            .get(ordinal)
            .ok_or(MaterializeError::ColumnOutOfRange {
                ordinal,
                count: self.values.len(),
            })?;
        value
            .clone()
            .coerce(ty)
            .map_err(|source| MaterializeError::Column { ordinal, source })
    }
}

/// Materialization instruction.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "instr", rename_all = "snake_case")]
pub enum Plan {
    ReadColumn {
        ordinal: usize,
        ty: DataType,
    },
    /// Column holding a JSON sub-document.
    DecodeSubDocument {
        ordinal: usize,
        ty: DataType,
    },
    /// `default` when the flag column reads true, `inner` otherwise.
    DefaultIfEmpty {
        flag_ordinal: usize,
        default: Value,
        inner: Box<Plan>,
    },
    Construct {
        fields: Vec<(String, Plan)>,
    },
    /// Runs `inputs`, then `body` with their results bound by position.
    Combine {
        inputs: Vec<Plan>,
        body: Box<Plan>,
    },
    Bound {
        index: usize,
    },
    Field {
        source: Box<Plan>,
        field: String,
    },
    Array {
        elements: Vec<Plan>,
    },
    Constant {
        value: Value,
    },
    /// Host operators over values already read from the row.
    Binary {
        op: BinaryOp,
        left: Box<Plan>,
        right: Box<Plan>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Plan>,
    },
    Conditional {
        test: Box<Plan>,
        if_true: Box<Plan>,
        if_false: Box<Plan>,
    },
    /// Host expression over the query's inputs.
    Evaluate {
        expr: relq_ir::Expr,
    },
}

impl Plan {
    /// Field access, folded when the source is a literal construction.
    pub fn field(source: Plan, field: impl Into<String>) -> Plan {
        let field = field.into();
        match source {
            Plan::Construct { mut fields } => {
                match fields.iter().position(|(name, _)| *name == field) {
                    Some(i) => fields.swap_remove(i).1,
                    None => Plan::Field {
                        source: Box::new(Plan::Construct { fields }),
                        field,
                    },
                }
            }
            source => Plan::Field {
                source: Box::new(source),
                field,
            },
        }
    }

    fn run<R: RowCursor + ?Sized>(
        &self,
        row: &R,
        inputs: &Inputs,
        bound: &[Value],
    ) -> Result<Value, MaterializeError> {
        match self {
            Plan::ReadColumn { ordinal, ty } => row.get_value(*ordinal, ty),
            Plan::DecodeSubDocument { ordinal, ty } => decode_sub_document(row, *ordinal, ty),
            Plan::DefaultIfEmpty {
                flag_ordinal,
                default,
                inner,
            } => match row.get_value(*flag_ordinal, &DataType::Bool)? {
                Value::Bool(true) => Ok(default.clone()),
                _ => inner.run(row, inputs, bound),
            },
            Plan::Construct { fields } => fields
                .iter()
                .map(|(name, plan)| plan.run(row, inputs, bound).map(|v| (name.clone(), v)))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Record),
            Plan::Combine { inputs: parts, body } => {
                let values = parts
                    .iter()
                    .map(|p| p.run(row, inputs, bound))
                    .collect::<Result<Vec<_>, _>>()?;
                body.run(row, inputs, &values)
            }
            Plan::Bound { index } => bound
                .get(*index)
                .cloned()
                .ok_or(MaterializeError::UnboundParameter(*index)),
            Plan::Field { source, field } => match source.run(row, inputs, bound)? {
                Value::Null => Ok(Value::Null),
                record => record.field(field).cloned().ok_or_else(|| {
                    MaterializeError::Eval(relq_ir::EvalError::MissingField(field.clone()))
                }),
            },
            Plan::Array { elements } => elements
                .iter()
                .map(|p| p.run(row, inputs, bound))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            Plan::Constant { value } => Ok(value.clone()),
            Plan::Binary { op, left, right } => {
                let lhs = left.run(row, inputs, bound)?;
                apply_binary(*op, lhs, || right.run(row, inputs, bound))
            }
            Plan::Unary { op, operand } => Ok(apply_unary(op, operand.run(row, inputs, bound)?)?),
            Plan::Conditional {
                test,
                if_true,
                if_false,
            } => {
                if condition(&test.run(row, inputs, bound)?)? {
                    if_true.run(row, inputs, bound)
                } else {
                    if_false.run(row, inputs, bound)
                }
            }
            Plan::Evaluate { expr } => Ok(eval(expr, inputs)?),
        }
    }
}

fn decode_sub_document<R: RowCursor + ?Sized>(
    row: &R,
    ordinal: usize,
    ty: &DataType,
) -> Result<Value, MaterializeError> {
    let text = match row.get_value(ordinal, &DataType::String)? {
        Value::String(text) => text,
        Value::Null => {
            trace!(ordinal, "null sub-document");
            return Ok(match ty {
                DataType::Collection(_) => Value::Array(Vec::new()),
                _ => Value::Null,
            });
        }
        other => {
            return Err(MaterializeError::Column {
                ordinal,
                source: relq_ir::ValueError::TypeMismatch {
                    expected: DataType::String,
                    found: other.kind().to_string(),
                },
            })
        }
    };

    let json: serde_json::Value = serde_json::from_str(&text)
        .map_err(|source| MaterializeError::SubDocument { ordinal, source })?;
    Value::from_json(&json, ty).map_err(|source| MaterializeError::SubDocumentShape { ordinal, source })
}

/// One emitted SELECT column.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectedColumn {
    pub name: String,
    pub ty: DataType,
}

/// Rebuilds result values from rows of a translated query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Materializer {
    plan: Plan,
    columns: Vec<ProjectedColumn>,
}

impl Materializer {
    pub fn new(plan: Plan, columns: Vec<ProjectedColumn>) -> Self {
        Self { plan, columns }
    }

    pub fn plan(&self) -> &Plan {
        &self.plan
    }

    /// Columns in SELECT order; position is the ordinal.
    pub fn columns(&self) -> &[ProjectedColumn] {
        &self.columns
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Materialize a row whose shape depends on no inputs.
    pub fn materialize<R: RowCursor + ?Sized>(&self, row: &R) -> Result<Value, MaterializeError> {
        self.materialize_with(row, &Inputs::new())
    }

    /// Materialize a row; client-side leaves read from `inputs`.
    pub fn materialize_with<R: RowCursor + ?Sized>(
        &self,
        row: &R,
        inputs: &Inputs,
    ) -> Result<Value, MaterializeError> {
        self.plan.run(row, inputs, &[])
    }
}
