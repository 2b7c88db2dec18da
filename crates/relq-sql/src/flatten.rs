//! Projection flattening
//!
//! Walks a projection in the order its columns are emitted, gathering every
//! database-evaluated leaf as a SELECT list item and compiling the `Plan`
//! that rebuilds the shape from those ordinals.

use relq_ir::{Expr, Projection};

use crate::classify::{is_parameterizable, is_translatable, node_kind};
use crate::error::{TranslateError, TranslateResult};
use crate::materializer::Plan;

/// One SELECT list item. `name` is the dotted shape path; empty for a bare
/// scalar projection.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct GatheredColumn {
    pub name: String,
    pub expr: Expr,
}

#[derive(Debug, Default)]
pub(crate) struct ProjectionFlattener {
    columns: Vec<GatheredColumn>,
    path: Vec<String>,
    /// Shapes flattened so far at this level; drives `$0`/`$1` prefixes.
    shapes: usize,
    in_sub_leaf: bool,
    sub_leaf_index: usize,
}

impl ProjectionFlattener {
    pub fn flatten(projection: &Projection) -> TranslateResult<(Vec<GatheredColumn>, Plan)> {
        let mut flattener = Self::default();
        let plan = flattener.visit_projection(projection)?;
        Ok((flattener.columns, plan))
    }

    /// Database-evaluated leaves of a grouping key, in emission order.
    pub fn gather_leaves(key: &Expr) -> TranslateResult<Vec<Expr>> {
        let mut flattener = Self::default();
        flattener.visit(key)?;
        Ok(flattener.columns.into_iter().map(|c| c.expr).collect())
    }

    fn visit_projection(&mut self, projection: &Projection) -> TranslateResult<Plan> {
        match projection {
            Projection::Server { body } => self.visit_shape(body),
            Projection::Client { server, client } => {
                let server = self.visit_shape(server)?;
                Ok(Plan::Combine {
                    inputs: vec![server],
                    body: Box::new(compile_client(client)?),
                })
            }
            Projection::Composite {
                outer,
                inner,
                result,
            } => {
                let outer = self.visit_projection(outer)?;
                let inner = self.visit_projection(inner)?;
                Ok(Plan::Combine {
                    inputs: vec![outer, inner],
                    body: Box::new(compile_client(result)?),
                })
            }
        }
    }

    /// Flatten one server shape. From the second shape on, every column is
    /// keyed under the shape's position so equal field names from different
    /// shapes stay apart.
    fn visit_shape(&mut self, body: &Expr) -> TranslateResult<Plan> {
        let position = self.shapes;
        self.shapes += 1;

        if position == 0 {
            return self.visit(body);
        }
        if position == 1 {
            for column in &mut self.columns {
                column.name = join_path("$0", &column.name);
            }
        }

        self.path.push(format!("${}", position));
        let plan = self.visit(body);
        self.path.pop();
        plan
    }

    fn visit(&mut self, expr: &Expr) -> TranslateResult<Plan> {
        match expr {
            Expr::New { fields } => {
                let saved = self.sub_leaf_index;
                self.sub_leaf_index = 0;
                let mut compiled = Vec::with_capacity(fields.len());
                for (name, field) in fields {
                    self.path.push(name.clone());
                    let plan = self.visit(field);
                    self.path.pop();
                    compiled.push((name.clone(), plan?));
                }
                self.sub_leaf_index = saved;
                Ok(Plan::Construct { fields: compiled })
            }
            Expr::DefaultIfEmpty {
                expr,
                flag,
                flag_alias,
            } => {
                let flag_ordinal = self.gather(self.path_with(flag_alias), (**flag).clone());
                let inner = self.visit(expr)?;
                Ok(Plan::DefaultIfEmpty {
                    flag_ordinal,
                    default: expr.ty().default_value(),
                    inner: Box::new(inner),
                })
            }
            e if is_parameterizable(e) => Ok(Plan::Evaluate { expr: e.clone() }),
            Expr::Constant { value, .. } if self.in_sub_leaf => Ok(Plan::Constant {
                value: value.clone(),
            }),
            e if is_translatable(e) => {
                let name = if self.in_sub_leaf {
                    self.sub_leaf_index += 1;
                    self.path_with(&format!("${}", self.sub_leaf_index))
                } else {
                    self.path_name()
                };
                let ordinal = self.gather(name, e.clone());
                Ok(match e {
                    Expr::ComplexSubquery { ty, .. } | Expr::CollectionSubquery { ty, .. } => {
                        Plan::DecodeSubDocument {
                            ordinal,
                            ty: ty.clone(),
                        }
                    }
                    Expr::ScalarSubquery { ty, .. } if !ty.is_scalar() => Plan::DecodeSubDocument {
                        ordinal,
                        ty: ty.clone(),
                    },
                    other => Plan::ReadColumn {
                        ordinal,
                        ty: other.ty(),
                    },
                })
            }
            e => {
                let entering = !self.in_sub_leaf;
                if entering {
                    self.in_sub_leaf = true;
                    self.sub_leaf_index = 0;
                }
                let plan = self.visit_sub_leaf(e);
                if entering {
                    self.in_sub_leaf = false;
                    self.sub_leaf_index = 0;
                }
                plan
            }
        }
    }

    /// Host-side leaf built over database values.
    fn visit_sub_leaf(&mut self, expr: &Expr) -> TranslateResult<Plan> {
        match expr {
            Expr::Member { expr, field, .. } => Ok(Plan::field(self.visit(expr)?, field.clone())),
            Expr::ArrayInit { elements, .. } => Ok(Plan::Array {
                elements: elements
                    .iter()
                    .map(|e| self.visit(e))
                    .collect::<TranslateResult<Vec<_>>>()?,
            }),
            Expr::Binary { op, left, right } => Ok(Plan::Binary {
                op: *op,
                left: Box::new(self.visit(left)?),
                right: Box::new(self.visit(right)?),
            }),
            Expr::Unary { op, operand } => Ok(Plan::Unary {
                op: op.clone(),
                operand: Box::new(self.visit(operand)?),
            }),
            Expr::Conditional {
                test,
                if_true,
                if_false,
            } => Ok(Plan::Conditional {
                test: Box::new(self.visit(test)?),
                if_true: Box::new(self.visit(if_true)?),
                if_false: Box::new(self.visit(if_false)?),
            }),
            other => Err(TranslateError::Unsupported(format!(
                "{} in a projection",
                node_kind(other)
            ))),
        }
    }

    fn gather(&mut self, name: String, expr: Expr) -> usize {
        self.columns.push(GatheredColumn { name, expr });
        self.columns.len() - 1
    }

    fn path_name(&self) -> String {
        self.path.join(".")
    }

    fn path_with(&self, last: &str) -> String {
        join_path(&self.path_name(), last)
    }
}

fn join_path(prefix: &str, name: &str) -> String {
    match (prefix.is_empty(), name.is_empty()) {
        (true, _) => name.to_string(),
        (false, true) => prefix.to_string(),
        (false, false) => format!("{}.{}", prefix, name),
    }
}

/// Compile a client or composite body. `Parameter(i)` reads the i-th
/// flattened shape.
fn compile_client(expr: &Expr) -> TranslateResult<Plan> {
    match expr {
        Expr::Parameter { index, .. } => Ok(Plan::Bound { index: *index }),
        e if is_parameterizable(e) => Ok(Plan::Evaluate { expr: e.clone() }),
        Expr::Constant { value, .. } => Ok(Plan::Constant {
            value: value.clone(),
        }),
        Expr::New { fields } => Ok(Plan::Construct {
            fields: fields
                .iter()
                .map(|(name, e)| compile_client(e).map(|plan| (name.clone(), plan)))
                .collect::<TranslateResult<Vec<_>>>()?,
        }),
        Expr::Member { expr, field, .. } => Ok(Plan::field(compile_client(expr)?, field.clone())),
        Expr::ArrayInit { elements, .. } => Ok(Plan::Array {
            elements: elements
                .iter()
                .map(compile_client)
                .collect::<TranslateResult<Vec<_>>>()?,
        }),
        Expr::Alias { expr, .. } => compile_client(expr),
        Expr::Binary { op, left, right } => Ok(Plan::Binary {
            op: *op,
            left: Box::new(compile_client(left)?),
            right: Box::new(compile_client(right)?),
        }),
        Expr::Unary { op, operand } => Ok(Plan::Unary {
            op: op.clone(),
            operand: Box::new(compile_client(operand)?),
        }),
        Expr::Conditional {
            test,
            if_true,
            if_false,
        } => Ok(Plan::Conditional {
            test: Box::new(compile_client(test)?),
            if_true: Box::new(compile_client(if_true)?),
            if_false: Box::new(compile_client(if_false)?),
        }),
        other => Err(TranslateError::Unsupported(format!(
            "{} in a client projection",
            node_kind(other)
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relq_ir::{DataType, TableId};

    fn col(table: u32, name: &str) -> Expr {
        Expr::column(TableId(table), name, DataType::Int32)
    }

    fn names(columns: &[GatheredColumn]) -> Vec<&str> {
        columns.iter().map(|c| c.name.as_str()).collect()
    }

    #[test]
    fn test_bare_scalar_has_empty_name() {
        let (columns, plan) = ProjectionFlattener::flatten(&Projection::server(col(0, "Id"))).unwrap();
        assert_eq!(names(&columns), [""]);
        assert_eq!(
            plan,
            Plan::ReadColumn {
                ordinal: 0,
                ty: DataType::Int32
            }
        );
    }

    #[test]
    fn test_nested_record_paths() {
        let body = Expr::new_record([
            ("Id", col(0, "Id")),
            ("Owner", Expr::new_record([("Id", col(1, "Id"))])),
        ]);
        let (columns, _) = ProjectionFlattener::flatten(&Projection::server(body)).unwrap();
        assert_eq!(names(&columns), ["Id", "Owner.Id"]);
    }

    #[test]
    fn test_composite_prefixes_and_order() {
        let outer = Projection::server(Expr::new_record([("Id", col(0, "Id"))]));
        let inner = Projection::server(Expr::new_record([("Id", col(1, "Id"))]));
        let result = Expr::new_record([
            ("A", Expr::parameter(0, DataType::Record(vec![]))),
            ("B", Expr::parameter(1, DataType::Record(vec![]))),
        ]);
        let (columns, plan) =
            ProjectionFlattener::flatten(&Projection::composite(outer, inner, result)).unwrap();

        assert_eq!(names(&columns), ["$0.Id", "$1.Id"]);
        assert_eq!(columns[0].expr, col(0, "Id"));
        assert_eq!(columns[1].expr, col(1, "Id"));
        assert!(matches!(plan, Plan::Combine { ref inputs, .. } if inputs.len() == 2));
    }

    #[test]
    fn test_sub_leaf_names() {
        let body = Expr::new_record([(
            "Pair",
            Expr::ArrayInit {
                elements: vec![col(0, "A"), col(0, "B")],
                ty: DataType::Collection(Box::new(DataType::Int32)),
            },
        )]);
        let (columns, plan) = ProjectionFlattener::flatten(&Projection::server(body)).unwrap();
        assert_eq!(names(&columns), ["Pair.$1", "Pair.$2"]);
        match plan {
            Plan::Construct { fields } => assert!(matches!(fields[0].1, Plan::Array { .. })),
            other => panic!("unexpected plan {:?}", other),
        }
    }

    #[test]
    fn test_default_if_empty_gathers_flag_first() {
        let optional = Expr::DefaultIfEmpty {
            expr: Box::new(Expr::new_record([("Total", col(1, "Total"))])),
            flag: Box::new(Expr::Fragment {
                sql: "CASE WHEN [o].[Id] IS NULL THEN 1 ELSE 0 END".to_string(),
                ty: DataType::Bool,
            }),
            flag_alias: "$empty".to_string(),
        };
        let body = Expr::new_record([("Order", optional)]);
        let (columns, plan) = ProjectionFlattener::flatten(&Projection::server(body)).unwrap();

        assert_eq!(names(&columns), ["Order.$empty", "Order.Total"]);
        match plan {
            Plan::Construct { fields } => {
                assert!(matches!(fields[0].1, Plan::DefaultIfEmpty { flag_ordinal: 0, .. }))
            }
            other => panic!("unexpected plan {:?}", other),
        }
    }

    #[test]
    fn test_parameterizable_leaf_stays_on_client() {
        let body = Expr::new_record([
            ("Id", col(0, "Id")),
            ("Tag", Expr::input("tag", DataType::String)),
        ]);
        let (columns, plan) = ProjectionFlattener::flatten(&Projection::server(body)).unwrap();
        assert_eq!(columns.len(), 1);
        match plan {
            Plan::Construct { fields } => assert!(matches!(fields[1].1, Plan::Evaluate { .. })),
            other => panic!("unexpected plan {:?}", other),
        }
    }

    #[test]
    fn test_member_over_construct_folds() {
        let body = Expr::member(Expr::new_record([("Id", col(0, "Id"))]), "Id").unwrap();
        let (columns, plan) = ProjectionFlattener::flatten(&Projection::server(body)).unwrap();
        assert_eq!(columns.len(), 1);
        assert!(matches!(plan, Plan::ReadColumn { ordinal: 0, .. }));
    }

    #[test]
    fn test_grouping_leaves() {
        let key = Expr::new_record([("A", col(0, "A")), ("B", col(0, "B"))]);
        assert_eq!(
            ProjectionFlattener::gather_leaves(&key).unwrap(),
            vec![col(0, "A"), col(0, "B")]
        );
    }

    #[test]
    fn test_host_binary_over_sub_leaf() {
        let record = Expr::new_record([("A", col(0, "A"))]);
        let next = Expr::binary(
            relq_ir::BinaryOp::Add,
            Expr::member(record, "A").unwrap(),
            Expr::int(1),
        );
        let body = Expr::new_record([("Next", next)]);
        let (columns, plan) = ProjectionFlattener::flatten(&Projection::server(body)).unwrap();

        assert_eq!(columns.len(), 1);
        assert_eq!(columns[0].expr, col(0, "A"));
        let expected = Plan::Construct {
            fields: vec![(
                "Next".to_string(),
                Plan::Binary {
                    op: relq_ir::BinaryOp::Add,
                    left: Box::new(Plan::ReadColumn {
                        ordinal: 0,
                        ty: DataType::Int32,
                    }),
                    right: Box::new(Plan::Constant {
                        value: relq_ir::Value::Int(1),
                    }),
                },
            )],
        };
        assert_eq!(plan, expected);
    }
}
