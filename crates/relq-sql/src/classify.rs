//! Expression classification
//!
//! Decides which subtrees travel as bound parameters and which ones the
//! database can evaluate.

use relq_ir::{Expr, InValues};

/// Count of host inputs and database-only nodes in a subtree.
#[derive(Debug, Default)]
struct Census {
    inputs: usize,
    blockers: usize,
}

impl Census {
    fn visit(&mut self, expr: &Expr) {
        if expr.is_sql_node() {
            self.blockers += 1;
            return;
        }

        match expr {
            Expr::Input { .. } => self.inputs += 1,
            Expr::Parameter { .. } | Expr::DefaultIfEmpty { .. } => self.blockers += 1,
            Expr::Constant { .. } => {}
            Expr::Binary { left, right, .. } => {
                self.visit(left);
                self.visit(right);
            }
            Expr::Unary { operand, .. } => self.visit(operand),
            Expr::Conditional {
                test,
                if_true,
                if_false,
            } => {
                self.visit(test);
                self.visit(if_true);
                self.visit(if_false);
            }
            Expr::New { fields } => fields.iter().for_each(|(_, e)| self.visit(e)),
            Expr::ArrayInit { elements, .. } => elements.iter().for_each(|e| self.visit(e)),
            Expr::Member { expr, .. } => self.visit(expr),
            _ => self.blockers += 1,
        }
    }
}

/// True when the subtree depends on at least one input and nothing the
/// database must evaluate. Such a subtree is computed on the host and bound
/// as a parameter.
pub fn is_parameterizable(expr: &Expr) -> bool {
    let mut census = Census::default();
    census.visit(expr);
    census.inputs > 0 && census.blockers == 0
}

/// True when the whole subtree can be rendered as SQL.
pub fn is_translatable(expr: &Expr) -> bool {
    if is_parameterizable(expr) {
        return true;
    }

    match expr {
        Expr::Column { .. }
        | Expr::Constant { .. }
        | Expr::Input { .. }
        | Expr::Fragment { .. }
        | Expr::Exists { .. }
        | Expr::ScalarSubquery { .. }
        | Expr::ComplexSubquery { .. }
        | Expr::CollectionSubquery { .. } => true,
        Expr::Alias { expr, .. } | Expr::Cast { expr, .. } => is_translatable(expr),
        Expr::Aggregate { arg, .. } => is_translatable(arg),
        Expr::Unary { operand, .. } => is_translatable(operand),
        Expr::Binary { left, right, .. } => is_translatable(left) && is_translatable(right),
        Expr::Conditional {
            test,
            if_true,
            if_false,
        } => is_translatable(test) && is_translatable(if_true) && is_translatable(if_false),
        Expr::Function { args, .. } => args.iter().all(is_translatable),
        Expr::In { value, values } => {
            is_translatable(value)
                && match values {
                    InValues::List { elements } => elements.iter().all(is_translatable),
                    InValues::Dynamic { expr } => is_parameterizable(expr),
                    InValues::Subquery { .. } | InValues::Constants { .. } => true,
                }
        }
        Expr::New { .. }
        | Expr::ArrayInit { .. }
        | Expr::Member { .. }
        | Expr::Parameter { .. }
        | Expr::DefaultIfEmpty { .. } => false,
    }
}

/// Short human name for error messages.
pub(crate) fn node_kind(expr: &Expr) -> &'static str {
    match expr {
        Expr::Column { .. } => "column",
        Expr::Alias { .. } => "alias",
        Expr::Constant { .. } => "constant",
        Expr::Input { .. } => "input",
        Expr::Binary { .. } => "binary",
        Expr::Unary { .. } => "unary",
        Expr::Conditional { .. } => "conditional",
        Expr::Function { .. } => "function",
        Expr::Fragment { .. } => "fragment",
        Expr::Cast { .. } => "cast",
        Expr::Exists { .. } => "exists",
        Expr::In { .. } => "in",
        Expr::Aggregate { .. } => "aggregate",
        Expr::ScalarSubquery { .. } => "scalar subquery",
        Expr::ComplexSubquery { .. } => "complex subquery",
        Expr::CollectionSubquery { .. } => "collection subquery",
        Expr::New { .. } => "record construction",
        Expr::ArrayInit { .. } => "array construction",
        Expr::Member { .. } => "member access",
        Expr::Parameter { .. } => "lambda parameter",
        Expr::DefaultIfEmpty { .. } => "default-if-empty",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relq_ir::{BinaryOp, DataType, FieldType, TableId};

    fn age() -> Expr {
        Expr::column(TableId(0), "Age", DataType::Int32)
    }

    #[test]
    fn test_input_is_parameterizable() {
        assert!(is_parameterizable(&Expr::input("x", DataType::Int32)));
        let sum = Expr::binary(
            BinaryOp::Add,
            Expr::input("x", DataType::Int32),
            Expr::int(1),
        );
        assert!(is_parameterizable(&sum));
    }

    #[test]
    fn test_constant_alone_is_not_parameterizable() {
        assert!(!is_parameterizable(&Expr::int(1)));
        assert!(!is_parameterizable(&Expr::binary(BinaryOp::Add, Expr::int(1), Expr::int(2))));
    }

    #[test]
    fn test_column_blocks_parameterization() {
        let mixed = Expr::gt(age(), Expr::input("x", DataType::Int32));
        assert!(!is_parameterizable(&mixed));
        assert!(is_translatable(&mixed));
    }

    #[test]
    fn test_member_of_input_is_parameterizable() {
        let ty = DataType::Record(vec![FieldType::new("Min", DataType::Int32)]);
        let member = Expr::member(Expr::input("f", ty), "Min").unwrap();
        assert!(is_parameterizable(&member));
        assert!(is_translatable(&member));
    }

    #[test]
    fn test_host_shapes_are_not_translatable() {
        let record = Expr::new_record([("Age", age())]);
        assert!(!is_translatable(&record));
        assert!(!is_translatable(&Expr::member(record, "Age").unwrap()));
        assert!(!is_translatable(&Expr::parameter(0, DataType::Int32)));
    }
}
