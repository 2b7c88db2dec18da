//! Scalar and shape expressions

use serde::{Deserialize, Serialize};

use crate::{DataType, FieldType, Select, TableId, Value};

/// Expression node.
///
/// SQL nodes (`Column` through `CollectionSubquery`) can only be evaluated by
/// the database. Host nodes (`Input`, `New`, `ArrayInit`, `Member`,
/// `Parameter`, `DefaultIfEmpty`) describe values the client supplies or the
/// shape the client rebuilds from result columns. `Constant`, `Binary`,
/// `Unary` and `Conditional` are shared by both worlds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Expr {
    Column {
        table: TableId,
        name: String,
        ty: DataType,
    },
    Alias {
        expr: Box<Expr>,
        alias: String,
    },
    Constant {
        value: Value,
        ty: DataType,
    },
    Input {
        name: String,
        ty: DataType,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Conditional {
        test: Box<Expr>,
        if_true: Box<Expr>,
        if_false: Box<Expr>,
    },
    Function {
        name: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        args: Vec<Expr>,
        ty: DataType,
    },
    /// Raw SQL emitted verbatim.
    Fragment {
        sql: String,
        ty: DataType,
    },
    Cast {
        expr: Box<Expr>,
        sql_type: String,
        ty: DataType,
    },
    Exists {
        select: Box<Select>,
    },
    In {
        value: Box<Expr>,
        values: InValues,
    },
    Aggregate {
        function: String,
        arg: Box<Expr>,
        #[serde(default)]
        distinct: bool,
        ty: DataType,
    },
    /// Subquery producing a single scalar value.
    ScalarSubquery {
        select: Box<Select>,
        ty: DataType,
    },
    /// Subquery producing a single record, carried as a sub-document column.
    ComplexSubquery {
        select: Box<Select>,
        ty: DataType,
    },
    /// Subquery producing a collection, carried as a sub-document column.
    CollectionSubquery {
        select: Box<Select>,
        ty: DataType,
    },
    New {
        fields: Vec<(String, Expr)>,
    },
    ArrayInit {
        elements: Vec<Expr>,
        ty: DataType,
    },
    Member {
        expr: Box<Expr>,
        field: String,
        ty: DataType,
    },
    /// Parameter of a client or composite result body.
    Parameter {
        index: usize,
        ty: DataType,
    },
    /// Outer-join slot: `flag` is true when the joined side produced no row.
    DefaultIfEmpty {
        expr: Box<Expr>,
        flag: Box<Expr>,
        flag_alias: String,
    },
}

/// Right-hand side of an `IN` test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum InValues {
    Subquery { select: Box<Select> },
    List { elements: Vec<Expr> },
    Constants { values: Vec<Value> },
    /// Runtime collection, known only when the command is built.
    Dynamic { expr: Box<Expr> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOp {
    Coalesce,
    // Logical
    And,
    Or,
    // Comparison
    Equal,
    NotEqual,
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
    // Arithmetic
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    Power,
    ExclusiveOr,
}

impl BinaryOp {
    /// Operators producing a boolean.
    pub fn is_predicate(self) -> bool {
        matches!(
            self,
            BinaryOp::And
                | BinaryOp::Or
                | BinaryOp::Equal
                | BinaryOp::NotEqual
                | BinaryOp::GreaterThan
                | BinaryOp::GreaterThanOrEqual
                | BinaryOp::LessThan
                | BinaryOp::LessThanOrEqual
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum UnaryOp {
    Not,
    Negate,
    Convert { ty: DataType },
}

impl Expr {
    /// Static type of the expression.
    pub fn ty(&self) -> DataType {
        match self {
            Expr::Column { ty, .. }
            | Expr::Constant { ty, .. }
            | Expr::Input { ty, .. }
            | Expr::Function { ty, .. }
            | Expr::Fragment { ty, .. }
            | Expr::Cast { ty, .. }
            | Expr::Aggregate { ty, .. }
            | Expr::ScalarSubquery { ty, .. }
            | Expr::ComplexSubquery { ty, .. }
            | Expr::CollectionSubquery { ty, .. }
            | Expr::ArrayInit { ty, .. }
            | Expr::Member { ty, .. }
            | Expr::Parameter { ty, .. } => ty.clone(),
            Expr::Alias { expr, .. } | Expr::DefaultIfEmpty { expr, .. } => expr.ty(),
            Expr::Binary { op, left, .. } => {
                if op.is_predicate() {
                    DataType::Bool
                } else {
                    left.ty()
                }
            }
            Expr::Unary { op, operand } => match op {
                UnaryOp::Not => DataType::Bool,
                UnaryOp::Negate => operand.ty(),
                UnaryOp::Convert { ty } => ty.clone(),
            },
            Expr::Conditional { if_true, .. } => if_true.ty(),
            Expr::Exists { .. } | Expr::In { .. } => DataType::Bool,
            Expr::New { fields } => DataType::Record(
                fields
                    .iter()
                    .map(|(name, expr)| FieldType::new(name.clone(), expr.ty()))
                    .collect(),
            ),
        }
    }

    pub fn column(table: TableId, name: impl Into<String>, ty: DataType) -> Self {
        Expr::Column {
            table,
            name: name.into(),
            ty,
        }
    }

    pub fn constant(value: impl Into<Value>, ty: DataType) -> Self {
        Expr::Constant {
            value: value.into(),
            ty,
        }
    }

    pub fn int(value: i64) -> Self {
        Expr::constant(value, DataType::Int32)
    }

    pub fn string(value: impl Into<String>) -> Self {
        Expr::constant(Value::String(value.into()), DataType::String)
    }

    pub fn boolean(value: bool) -> Self {
        Expr::constant(value, DataType::Bool)
    }

    pub fn null(ty: DataType) -> Self {
        Expr::Constant {
            value: Value::Null,
            ty,
        }
    }

    pub fn input(name: impl Into<String>, ty: DataType) -> Self {
        Expr::Input {
            name: name.into(),
            ty,
        }
    }

    pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Self {
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn eq(left: Expr, right: Expr) -> Self {
        Expr::binary(BinaryOp::Equal, left, right)
    }

    pub fn gt(left: Expr, right: Expr) -> Self {
        Expr::binary(BinaryOp::GreaterThan, left, right)
    }

    pub fn and(left: Expr, right: Expr) -> Self {
        Expr::binary(BinaryOp::And, left, right)
    }

    pub fn not(operand: Expr) -> Self {
        Expr::Unary {
            op: UnaryOp::Not,
            operand: Box::new(operand),
        }
    }

    pub fn conditional(test: Expr, if_true: Expr, if_false: Expr) -> Self {
        Expr::Conditional {
            test: Box::new(test),
            if_true: Box::new(if_true),
            if_false: Box::new(if_false),
        }
    }

    pub fn alias(expr: Expr, alias: impl Into<String>) -> Self {
        Expr::Alias {
            expr: Box::new(expr),
            alias: alias.into(),
        }
    }

    pub fn function(name: impl Into<String>, args: Vec<Expr>, ty: DataType) -> Self {
        Expr::Function {
            name: name.into(),
            args,
            ty,
        }
    }

    pub fn aggregate(function: impl Into<String>, arg: Expr, ty: DataType) -> Self {
        Expr::Aggregate {
            function: function.into(),
            arg: Box::new(arg),
            distinct: false,
            ty,
        }
    }

    pub fn new_record<N: Into<String>>(fields: impl IntoIterator<Item = (N, Expr)>) -> Self {
        Expr::New {
            fields: fields.into_iter().map(|(n, e)| (n.into(), e)).collect(),
        }
    }

    /// Field access typed from the record's field list. `None` when `expr`
    /// is not a record carrying `field`.
    pub fn member(expr: Expr, field: impl Into<String>) -> Option<Self> {
        let field = field.into();
        let ty = expr.ty().find_field(&field)?.data_type.clone();
        Some(Expr::Member {
            expr: Box::new(expr),
            field,
            ty,
        })
    }

    pub fn parameter(index: usize, ty: DataType) -> Self {
        Expr::Parameter { index, ty }
    }

    pub fn exists(select: Select) -> Self {
        Expr::Exists {
            select: Box::new(select),
        }
    }

    pub fn in_values(value: Expr, values: InValues) -> Self {
        Expr::In {
            value: Box::new(value),
            values,
        }
    }

    /// Node that only the database can evaluate.
    pub fn is_sql_node(&self) -> bool {
        matches!(
            self,
            Expr::Column { .. }
                | Expr::Alias { .. }
                | Expr::Function { .. }
                | Expr::Fragment { .. }
                | Expr::Cast { .. }
                | Expr::Exists { .. }
                | Expr::In { .. }
                | Expr::Aggregate { .. }
                | Expr::ScalarSubquery { .. }
                | Expr::ComplexSubquery { .. }
                | Expr::CollectionSubquery { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_predicate_types() {
        let t = TableId(0);
        let age = Expr::column(t, "Age", DataType::Int32);
        assert_eq!(Expr::gt(age.clone(), Expr::int(30)).ty(), DataType::Bool);
        assert_eq!(
            Expr::binary(BinaryOp::Add, age.clone(), Expr::int(1)).ty(),
            DataType::Int32
        );
        assert_eq!(Expr::not(Expr::boolean(true)).ty(), DataType::Bool);
    }

    #[test]
    fn test_new_record_type() {
        let t = TableId(0);
        let record = Expr::new_record([
            ("Id", Expr::column(t, "Id", DataType::Int64)),
            ("Name", Expr::column(t, "Name", DataType::String)),
        ]);
        let ty = record.ty();
        assert_eq!(ty.find_field("Id").map(|f| &f.data_type), Some(&DataType::Int64));

        assert!(Expr::member(record.clone(), "Missing").is_none());
        assert!(Expr::member(Expr::int(1), "Id").is_none());

        let member = Expr::member(record, "Id").unwrap();
        assert_eq!(member.ty(), DataType::Int64);
    }

    #[test]
    fn test_expr_json_round_trip() {
        let expr = Expr::in_values(
            Expr::column(TableId(3), "Status", DataType::String),
            InValues::Constants {
                values: vec![Value::from("open"), Value::from("closed")],
            },
        );
        let json = serde_json::to_string(&expr).unwrap();
        let parsed: Expr = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, expr);
    }
}
