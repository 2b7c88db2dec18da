//! Relational IR to SQL translation
//!
//! One pass over a `Select` tree emits the command text and compiles the
//! materializer for the root projection. A translator is consumed by the
//! pass; alias and depth state never leak into the next query.

use relq_ir::{BinaryOp, Expr, InValues, Ordering, Select, SetOperator, Table, TableId, UnaryOp, Value};
use tracing::debug;

use crate::alias::{AliasTable, TableCatalog};
use crate::classify::{is_parameterizable, node_kind};
use crate::command::CommandBuilder;
use crate::dialect::{LimitPlacement, SqlDialect};
use crate::emitter::{Emitter, DEFAULT_INDENT_WIDTH};
use crate::error::{TranslateError, TranslateResult};
use crate::flatten::ProjectionFlattener;
use crate::materializer::{Materializer, ProjectedColumn};

/// Library-side translator configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TranslatorOptions {
    /// Spaces per indentation level
    pub indent_width: usize,
}

impl Default for TranslatorOptions {
    fn default() -> Self {
        Self {
            indent_width: DEFAULT_INDENT_WIDTH,
        }
    }
}

/// Output of one translation pass.
#[derive(Debug, Clone)]
pub struct TranslatedQuery {
    pub materializer: Materializer,
    pub command: CommandBuilder,
}

pub struct SqlTranslator<'d> {
    dialect: &'d dyn SqlDialect,
    emitter: Emitter,
    depth: i32,
    catalog: TableCatalog,
    aliases: AliasTable,
}

impl<'d> SqlTranslator<'d> {
    pub fn new(dialect: &'d dyn SqlDialect) -> Self {
        Self::with_options(dialect, TranslatorOptions::default())
    }

    pub fn with_options(dialect: &'d dyn SqlDialect, options: TranslatorOptions) -> Self {
        Self {
            dialect,
            emitter: Emitter::new(options.indent_width),
            depth: -1,
            catalog: TableCatalog::default(),
            aliases: AliasTable::default(),
        }
    }

    /// Translate a root SELECT into command text and a materializer.
    pub fn translate(mut self, select: &Select) -> TranslateResult<TranslatedQuery> {
        debug!(dialect = self.dialect.name(), "translating query");

        self.catalog = TableCatalog::collect(select);
        let materializer = self.visit_select(select)?;
        let parameters = self.emitter.parameter_count();
        let command = self.emitter.build();

        debug!(
            columns = materializer.column_count(),
            parameters,
            static_text = command.is_static(),
            "translated query"
        );

        Ok(TranslatedQuery {
            materializer,
            command,
        })
    }

    /// Entry point for every expression: scalar subtrees that only depend on
    /// inputs are hoisted into parameters before descending.
    fn visit(&mut self, expr: &Expr) -> TranslateResult<()> {
        if is_parameterizable(expr) && expr.ty().is_scalar() {
            self.emitter.add_parameter(expr, self.dialect);
            return Ok(());
        }
        self.visit_node(expr)
    }

    fn visit_node(&mut self, expr: &Expr) -> TranslateResult<()> {
        match expr {
            Expr::Column { table, name, .. } => {
                let alias = self.table_alias(*table)?;
                let sql = format!(
                    "{}.{}",
                    self.dialect.quote_identifier(&alias),
                    self.dialect.quote_identifier(name)
                );
                self.emitter.append(&sql);
            }
            Expr::Alias { expr, alias } => {
                self.visit(expr)?;
                self.emitter.append(" AS ");
                self.emitter.append(&self.dialect.quote_identifier(alias));
            }
            Expr::Constant { value, .. } => self.visit_constant(value)?,
            Expr::Binary { op, left, right } => self.visit_binary(*op, left, right)?,
            Expr::Unary { op, operand } => self.visit_unary(op, operand)?,
            Expr::Conditional {
                test,
                if_true,
                if_false,
            } => {
                self.emitter.append("(CASE WHEN ");
                self.visit(test)?;
                self.emitter.append(" THEN ");
                self.visit(if_true)?;
                self.emitter.append(" ELSE ");
                self.visit(if_false)?;
                self.emitter.append(" END)");
            }
            Expr::Function { name, args, .. } => {
                self.emitter.append(name);
                self.emitter.append("(");
                self.visit_comma_separated(args)?;
                self.emitter.append(")");
            }
            Expr::Fragment { sql, .. } => self.emitter.append(sql),
            Expr::Cast { expr, sql_type, .. } => {
                self.emitter.append("CAST(");
                self.visit(expr)?;
                self.emitter.append(" AS ");
                self.emitter.append(sql_type);
                self.emitter.append(")");
            }
            Expr::Exists { select } => {
                self.emitter.append("EXISTS ");
                self.visit_subquery(select, false)?;
            }
            Expr::In { value, values } => self.visit_in(value, values)?,
            Expr::Aggregate {
                function,
                arg,
                distinct,
                ..
            } => {
                self.emitter.append(function);
                self.emitter.append("(");
                if *distinct {
                    self.emitter.append("DISTINCT ");
                }
                self.visit(arg)?;
                self.emitter.append(")");
            }
            Expr::ScalarSubquery { select, ty } => self.visit_subquery(select, !ty.is_scalar())?,
            Expr::ComplexSubquery { select, .. } | Expr::CollectionSubquery { select, .. } => {
                self.visit_subquery(select, true)?
            }
            Expr::Input { .. }
            | Expr::New { .. }
            | Expr::ArrayInit { .. }
            | Expr::Member { .. }
            | Expr::Parameter { .. }
            | Expr::DefaultIfEmpty { .. } => {
                return Err(TranslateError::Unsupported(format!(
                    "{} in SQL position",
                    node_kind(expr)
                )))
            }
        }
        Ok(())
    }

    fn visit_select(&mut self, select: &Select) -> TranslateResult<Materializer> {
        self.depth += 1;

        self.emitter.append("SELECT ");
        if select.distinct {
            self.emitter.append("DISTINCT ");
        }

        let placement = self.dialect.limit_placement(select.offset.is_some());
        if placement == LimitPlacement::Top {
            if let Some(limit) = &select.limit {
                self.emitter.append("TOP (");
                self.visit(limit)?;
                self.emitter.append(") ");
            }
        }

        let (gathered, plan) = ProjectionFlattener::flatten(&select.projection)?;
        if gathered.is_empty() {
            self.emitter.append("1");
        }
        for (i, column) in gathered.iter().enumerate() {
            if i > 0 {
                self.emitter.append(", ");
            }
            if self.depth == 0 && column.expr.ty().is_boolean() && !is_bit_ready(&column.expr) {
                self.emitter.append("CAST(");
                self.visit_list_item(&column.expr)?;
                self.emitter.append(" AS ");
                self.emitter.append(self.dialect.boolean_storage_type());
                self.emitter.append(")");
            } else {
                self.visit_list_item(&column.expr)?;
            }
            if !column.name.is_empty() {
                self.emitter.append(" AS ");
                self.emitter.append(&self.dialect.quote_identifier(&column.name));
            }
        }

        if let Some(table) = &select.table {
            self.emitter.newline();
            self.emitter.append("FROM ");
            self.visit_table(table)?;
        }

        if let Some(predicate) = &select.predicate {
            self.emitter.newline();
            self.emitter.append("WHERE ");
            self.visit(predicate)?;
        }

        if let Some(grouping) = &select.grouping {
            self.emitter.newline();
            self.emitter.append("GROUP BY ");
            let keys = ProjectionFlattener::gather_leaves(grouping)?;
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    self.emitter.append(", ");
                }
                self.visit_list_item(key)?;
            }
        }

        if let Some(ordering) = &select.ordering {
            self.emitter.newline();
            self.emitter.append("ORDER BY ");
            self.visit_ordering(ordering)?;
        }

        match placement {
            LimitPlacement::Top => {}
            LimitPlacement::OffsetFetch => {
                if let Some(offset) = &select.offset {
                    if select.ordering.is_none() {
                        self.emitter.newline();
                        self.emitter.append("ORDER BY ");
                        self.emitter.append(self.dialect.constant_ordering());
                    }
                    self.emitter.newline();
                    self.emitter.append("OFFSET ");
                    self.visit(offset)?;
                    self.emitter.append(" ROWS");
                    if let Some(limit) = &select.limit {
                        self.emitter.append(" FETCH NEXT ");
                        self.visit(limit)?;
                        self.emitter.append(" ROWS ONLY");
                    }
                }
            }
            LimitPlacement::LimitOffset => {
                if let Some(limit) = &select.limit {
                    self.emitter.newline();
                    self.emitter.append("LIMIT ");
                    self.visit(limit)?;
                }
                if let Some(offset) = &select.offset {
                    self.emitter.newline();
                    self.emitter.append("OFFSET ");
                    self.visit(offset)?;
                }
            }
        }

        self.depth -= 1;

        let columns = gathered
            .into_iter()
            .map(|c| ProjectedColumn {
                ty: c.expr.ty(),
                name: c.name,
            })
            .collect();
        Ok(Materializer::new(plan, columns))
    }

    /// Expression-list item: booleans become a value, not a predicate.
    fn visit_list_item(&mut self, expr: &Expr) -> TranslateResult<()> {
        let already_value = matches!(expr, Expr::Conditional { .. } | Expr::Constant { .. })
            || is_bit_ready(expr);
        if expr.ty().is_boolean() && !already_value {
            self.emitter.append("(CASE WHEN ");
            self.visit(expr)?;
            self.emitter.append(" THEN 1 ELSE 0 END)");
            return Ok(());
        }
        self.visit(expr)
    }

    fn visit_ordering(&mut self, ordering: &Ordering) -> TranslateResult<()> {
        if let Some(previous) = &ordering.previous {
            self.visit_ordering(previous)?;
            self.emitter.append(", ");
        }
        self.visit_list_item(&ordering.expr)?;
        self.emitter
            .append(if ordering.descending { " DESC" } else { " ASC" });
        Ok(())
    }

    /// Parenthesized, indented subquery; `sub_document` renders its rows as
    /// one JSON column.
    fn visit_subquery(&mut self, select: &Select, sub_document: bool) -> TranslateResult<()> {
        self.emitter.append("(");
        self.emitter.increase_indent();
        self.emitter.newline();
        self.visit_select(select)?;
        if sub_document {
            self.emitter.newline();
            self.emitter.append(self.dialect.sub_document_directive());
        }
        self.emitter.decrease_indent();
        self.emitter.newline();
        self.emitter.append(")");
        Ok(())
    }

    fn visit_table(&mut self, table: &Table) -> TranslateResult<()> {
        match table {
            Table::Base {
                id, schema, name, ..
            } => {
                if !schema.is_empty() {
                    self.emitter.append(&self.dialect.quote_identifier(schema));
                    self.emitter.append(".");
                }
                self.emitter.append(&self.dialect.quote_identifier(name));
                self.append_table_alias(*id)?;
            }
            Table::Subquery { id, select, .. } => {
                self.visit_subquery(select, false)?;
                self.append_table_alias(*id)?;
            }
            Table::SetOperation {
                id,
                operator,
                left,
                right,
                ..
            } => {
                self.emitter.append("(");
                self.emitter.increase_indent();
                self.emitter.newline();
                self.visit_select(left)?;
                self.emitter.newline();
                self.emitter.append(set_operator(*operator));
                self.emitter.newline();
                self.visit_select(right)?;
                self.emitter.decrease_indent();
                self.emitter.newline();
                self.emitter.append(")");
                self.append_table_alias(*id)?;
            }
            Table::InnerJoin {
                outer,
                inner,
                predicate,
            } => self.visit_join(outer, inner, "INNER JOIN", Some(predicate))?,
            Table::LeftJoin {
                outer,
                inner,
                predicate,
            } => self.visit_join(outer, inner, "LEFT JOIN", Some(predicate))?,
            Table::CrossJoin { outer, inner } => self.visit_join(outer, inner, "CROSS JOIN", None)?,
            Table::CrossApply { outer, inner } => self.visit_join(outer, inner, "CROSS APPLY", None)?,
            Table::OuterApply { outer, inner } => self.visit_join(outer, inner, "OUTER APPLY", None)?,
        }
        Ok(())
    }

    fn visit_join(
        &mut self,
        outer: &Table,
        inner: &Table,
        keyword: &str,
        predicate: Option<&Expr>,
    ) -> TranslateResult<()> {
        self.visit_table(outer)?;
        self.emitter.newline();
        self.emitter.append(keyword);
        self.emitter.append(" ");
        self.visit_table(inner)?;
        if let Some(predicate) = predicate {
            self.emitter.append(" ON ");
            self.visit(predicate)?;
        }
        Ok(())
    }

    fn append_table_alias(&mut self, id: TableId) -> TranslateResult<()> {
        let alias = self.table_alias(id)?;
        self.emitter.append(" AS ");
        self.emitter.append(&self.dialect.quote_identifier(&alias));
        Ok(())
    }

    fn table_alias(&mut self, id: TableId) -> TranslateResult<String> {
        let preferred = self
            .catalog
            .preferred(id)
            .ok_or(TranslateError::UnknownTable(id))?;
        Ok(self.aliases.alias_for(id, preferred))
    }

    fn visit_binary(&mut self, op: BinaryOp, left: &Expr, right: &Expr) -> TranslateResult<()> {
        if op == BinaryOp::Coalesce {
            self.emitter.append("COALESCE(");
            self.visit(left)?;
            self.emitter.append(", ");
            self.visit(right)?;
            self.emitter.append(")");
            return Ok(());
        }

        if let (Expr::New { fields: l }, Expr::New { fields: r }) = (left, right) {
            if matches!(op, BinaryOp::Equal | BinaryOp::NotEqual) {
                let rewritten = record_comparison(op, l, r)?;
                return self.visit(&rewritten);
            }
        }

        let operator = binary_operator(op)?;
        self.visit_operand(left)?;
        self.emitter.append(" ");
        self.emitter.append(operator);
        self.emitter.append(" ");
        self.visit_operand(right)
    }

    /// Binary operands get one level of parentheses; their own operands are
    /// handled by the nested call.
    fn visit_operand(&mut self, operand: &Expr) -> TranslateResult<()> {
        match operand {
            Expr::Binary { op, left, right } => {
                self.emitter.append("(");
                self.visit_binary(*op, left, right)?;
                self.emitter.append(")");
                Ok(())
            }
            other => self.visit(other),
        }
    }

    fn visit_unary(&mut self, op: &UnaryOp, operand: &Expr) -> TranslateResult<()> {
        match op {
            UnaryOp::Not => match operand {
                Expr::Exists { .. } | Expr::In { .. } => {
                    self.emitter.append("NOT ");
                    self.visit(operand)
                }
                _ => self.visit_binary(BinaryOp::Equal, &Expr::boolean(false), operand),
            },
            UnaryOp::Negate => {
                self.emitter.append("-");
                self.visit_operand(operand)
            }
            UnaryOp::Convert { .. } => self.visit(operand),
        }
    }

    fn visit_in(&mut self, value: &Expr, values: &InValues) -> TranslateResult<()> {
        self.visit(value)?;
        self.emitter.append(" IN (");
        match values {
            InValues::Subquery { select } => {
                self.emitter.increase_indent();
                self.emitter.newline();
                self.visit_select(select)?;
                self.emitter.decrease_indent();
                self.emitter.newline();
            }
            InValues::List { elements } if elements.is_empty() => {
                self.emitter.append(self.dialect.empty_list())
            }
            InValues::List { elements } => self.visit_comma_separated(elements)?,
            InValues::Constants { values } if values.is_empty() => {
                self.emitter.append(self.dialect.empty_list())
            }
            InValues::Constants { values } => {
                for (i, v) in values.iter().enumerate() {
                    if i > 0 {
                        self.emitter.append(", ");
                    }
                    self.visit_constant(v)?;
                }
            }
            InValues::Dynamic { expr } => {
                if !is_parameterizable(expr) {
                    return Err(TranslateError::NonParameterizableDynamicList(
                        node_kind(expr).to_string(),
                    ));
                }
                self.emitter.add_parameter_list(expr, self.dialect);
            }
        }
        self.emitter.append(")");
        Ok(())
    }

    fn visit_comma_separated(&mut self, exprs: &[Expr]) -> TranslateResult<()> {
        for (i, expr) in exprs.iter().enumerate() {
            if i > 0 {
                self.emitter.append(", ");
            }
            self.visit(expr)?;
        }
        Ok(())
    }

    fn visit_constant(&mut self, value: &Value) -> TranslateResult<()> {
        let sql = match value {
            Value::Null => "NULL".to_string(),
            Value::Bool(true) => "1".to_string(),
            Value::Bool(false) => "0".to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::String(s) => self.dialect.string_literal(s),
            Value::Date(_) | Value::Timestamp(_) | Value::Uuid(_) => {
                format!("'{}'", value)
            }
            Value::Bytes(_) => value.to_string(),
            Value::Array(_) | Value::Record(_) => {
                return Err(TranslateError::Unsupported(format!(
                    "{} constant in SQL position",
                    value.kind()
                )))
            }
        };
        self.emitter.append(&sql);
        Ok(())
    }
}

/// Nodes whose boolean value the database already returns as a value.
fn is_bit_ready(expr: &Expr) -> bool {
    matches!(expr, Expr::Alias { .. } | Expr::Column { .. } | Expr::Cast { .. })
}

fn binary_operator(op: BinaryOp) -> TranslateResult<&'static str> {
    Ok(match op {
        BinaryOp::And => "AND",
        BinaryOp::Or => "OR",
        BinaryOp::Equal => "=",
        BinaryOp::NotEqual => "<>",
        BinaryOp::GreaterThan => ">",
        BinaryOp::GreaterThanOrEqual => ">=",
        BinaryOp::LessThan => "<",
        BinaryOp::LessThanOrEqual => "<=",
        BinaryOp::Add => "+",
        BinaryOp::Subtract => "-",
        BinaryOp::Multiply => "*",
        BinaryOp::Divide => "/",
        BinaryOp::Coalesce | BinaryOp::Modulo | BinaryOp::Power | BinaryOp::ExclusiveOr => {
            return Err(TranslateError::Unsupported(format!("binary operator {:?}", op)))
        }
    })
}

fn set_operator(op: SetOperator) -> &'static str {
    match op {
        SetOperator::Union => "UNION",
        SetOperator::UnionAll => "UNION ALL",
        SetOperator::Intersect => "INTERSECT",
        SetOperator::Except => "EXCEPT",
    }
}

/// `(a, b) = (c, d)` becomes `a = c AND b = d`; `<>` becomes a disjunction.
fn record_comparison(
    op: BinaryOp,
    left: &[(String, Expr)],
    right: &[(String, Expr)],
) -> TranslateResult<Expr> {
    if left.len() != right.len() {
        return Err(TranslateError::Unsupported(
            "comparison of records with different arity".to_string(),
        ));
    }
    let joiner = if op == BinaryOp::Equal {
        BinaryOp::And
    } else {
        BinaryOp::Or
    };

    left.iter()
        .zip(right)
        .map(|((_, l), (_, r))| Expr::binary(op, l.clone(), r.clone()))
        .reduce(|acc, term| Expr::binary(joiner, acc, term))
        .ok_or_else(|| TranslateError::Unsupported("comparison of empty records".to_string()))
}

/// Translate with the default options.
pub fn translate(select: &Select, dialect: &dyn SqlDialect) -> TranslateResult<TranslatedQuery> {
    SqlTranslator::new(dialect).translate(select)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::SqlServerDialect;
    use relq_ir::{DataType, Projection, TableIds};

    fn sql(select: &Select) -> String {
        translate(select, &SqlServerDialect)
            .unwrap()
            .command
            .text()
            .unwrap()
            .to_string()
    }

    #[test]
    fn test_one_level_parenthesization() {
        let mut ids = TableIds::new();
        let t = ids.next();
        let a = Expr::column(t, "A", DataType::Int32);
        let b = Expr::column(t, "B", DataType::Int32);
        let c = Expr::column(t, "C", DataType::Int32);
        let sum = Expr::binary(
            BinaryOp::Multiply,
            Expr::binary(BinaryOp::Add, a, b),
            c,
        );
        let select = Select::new(Projection::server(sum)).from(Table::base(t, "dbo", "T", "t"));

        assert_eq!(sql(&select), "SELECT ([t].[A] + [t].[B]) * [t].[C]\nFROM [dbo].[T] AS [t]");
    }

    #[test]
    fn test_not_rewrites() {
        let mut ids = TableIds::new();
        let t = ids.next();
        let active = Expr::column(t, "Active", DataType::Bool);
        let select = Select::new(Projection::server(Expr::column(t, "Id", DataType::Int32)))
            .from(Table::base(t, "dbo", "T", "t"))
            .filter(Expr::not(active));

        assert!(sql(&select).ends_with("WHERE 0 = [t].[Active]"));
    }

    #[test]
    fn test_record_inequality_is_disjunction() {
        let mut ids = TableIds::new();
        let t = ids.next();
        let col = |n: &str| Expr::column(t, n, DataType::Int32);
        let predicate = Expr::binary(
            BinaryOp::NotEqual,
            Expr::new_record([("X", col("A")), ("Y", col("B"))]),
            Expr::new_record([("X", col("C")), ("Y", col("D"))]),
        );
        let select = Select::new(Projection::server(col("A")))
            .from(Table::base(t, "dbo", "T", "t"))
            .filter(predicate);

        assert!(sql(&select).ends_with("WHERE ([t].[A] <> [t].[C]) OR ([t].[B] <> [t].[D])"));
    }

    #[test]
    fn test_unsupported_operator_fails() {
        let mut ids = TableIds::new();
        let t = ids.next();
        let modulo = Expr::binary(
            BinaryOp::Modulo,
            Expr::column(t, "A", DataType::Int32),
            Expr::int(2),
        );
        let select = Select::new(Projection::server(modulo)).from(Table::base(t, "dbo", "T", "t"));

        assert!(matches!(
            translate(&select, &SqlServerDialect),
            Err(TranslateError::Unsupported(_))
        ));
    }

    #[test]
    fn test_unknown_table() {
        let select = Select::new(Projection::server(Expr::column(TableId(5), "A", DataType::Int32)));
        assert!(matches!(
            translate(&select, &SqlServerDialect),
            Err(TranslateError::UnknownTable(TableId(5)))
        ));
    }

    #[test]
    fn test_constant_literals() {
        let select = Select::new(Projection::server(Expr::new_record([
            ("S", Expr::string("O'Brien")),
            ("N", Expr::null(DataType::Int32)),
            ("F", Expr::constant(1.5, DataType::Float64)),
        ])));
        assert_eq!(sql(&select), "SELECT N'O''Brien' AS [S], NULL AS [N], 1.5 AS [F]");
    }

    #[test]
    fn test_indent_width_option() {
        let mut ids = TableIds::new();
        let t = ids.next();
        let inner = Select::new(Projection::server(Expr::column(t, "Id", DataType::Int32)))
            .from(Table::base(t, "dbo", "T", "t"));
        let select = Select::new(Projection::server(Expr::exists(inner)));

        let dialect = SqlServerDialect;
        let translated = SqlTranslator::with_options(&dialect, TranslatorOptions { indent_width: 2 })
            .translate(&select)
            .unwrap();
        assert_eq!(
            translated.command.text(),
            Some(
                "SELECT CAST((CASE WHEN EXISTS (\n  SELECT [t].[Id]\n  FROM [dbo].[T] AS [t]\n) THEN 1 ELSE 0 END) AS BIT)"
            )
        );
    }
}
