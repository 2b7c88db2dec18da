//! Table alias assignment
//!
//! Columns reference relations by `TableId`. Aliases are handed out the first
//! time a relation is emitted, so a catalog of every relation's preferred
//! alias is collected up front.

use std::collections::{HashMap, HashSet};

use relq_ir::{Expr, InValues, Ordering, Projection, Select, Table, TableId};
use tracing::trace;

/// Preferred alias of every relation reachable from a root SELECT.
#[derive(Debug, Default)]
pub(crate) struct TableCatalog {
    preferred: HashMap<TableId, String>,
}

impl TableCatalog {
    pub fn collect(select: &Select) -> Self {
        let mut catalog = Self::default();
        catalog.visit_select(select);
        catalog
    }

    pub fn preferred(&self, id: TableId) -> Option<&str> {
        self.preferred.get(&id).map(String::as_str)
    }

    fn visit_select(&mut self, select: &Select) {
        self.visit_projection(&select.projection);
        if let Some(table) = &select.table {
            self.visit_table(table);
        }
        for expr in [&select.predicate, &select.grouping, &select.offset, &select.limit]
            .into_iter()
            .flatten()
        {
            self.visit_expr(expr);
        }
        if let Some(ordering) = &select.ordering {
            self.visit_ordering(ordering);
        }
    }

    fn visit_ordering(&mut self, ordering: &Ordering) {
        if let Some(previous) = &ordering.previous {
            self.visit_ordering(previous);
        }
        self.visit_expr(&ordering.expr);
    }

    fn visit_projection(&mut self, projection: &Projection) {
        match projection {
            Projection::Server { body } => self.visit_expr(body),
            Projection::Client { server, client } => {
                self.visit_expr(server);
                self.visit_expr(client);
            }
            Projection::Composite {
                outer,
                inner,
                result,
            } => {
                self.visit_projection(outer);
                self.visit_projection(inner);
                self.visit_expr(result);
            }
        }
    }

    fn visit_table(&mut self, table: &Table) {
        if let Some((id, alias)) = table.identity() {
            self.preferred.entry(id).or_insert_with(|| alias.to_string());
        }

        match table {
            Table::Base { .. } => {}
            Table::Subquery { select, .. } => self.visit_select(select),
            Table::SetOperation { left, right, .. } => {
                self.visit_select(left);
                self.visit_select(right);
            }
            Table::InnerJoin {
                outer,
                inner,
                predicate,
            }
            | Table::LeftJoin {
                outer,
                inner,
                predicate,
            } => {
                self.visit_table(outer);
                self.visit_table(inner);
                self.visit_expr(predicate);
            }
            Table::CrossJoin { outer, inner }
            | Table::CrossApply { outer, inner }
            | Table::OuterApply { outer, inner } => {
                self.visit_table(outer);
                self.visit_table(inner);
            }
        }
    }

    fn visit_expr(&mut self, expr: &Expr) {
        match expr {
            Expr::Column { .. }
            | Expr::Constant { .. }
            | Expr::Input { .. }
            | Expr::Fragment { .. }
            | Expr::Parameter { .. } => {}
            Expr::Alias { expr, .. }
            | Expr::Cast { expr, .. }
            | Expr::Member { expr, .. } => self.visit_expr(expr),
            Expr::Aggregate { arg, .. } => self.visit_expr(arg),
            Expr::Unary { operand, .. } => self.visit_expr(operand),
            Expr::Binary { left, right, .. } => {
                self.visit_expr(left);
                self.visit_expr(right);
            }
            Expr::Conditional {
                test,
                if_true,
                if_false,
            } => {
                self.visit_expr(test);
                self.visit_expr(if_true);
                self.visit_expr(if_false);
            }
            Expr::Function { args, .. } => args.iter().for_each(|a| self.visit_expr(a)),
            Expr::ArrayInit { elements, .. } => elements.iter().for_each(|e| self.visit_expr(e)),
            Expr::New { fields } => fields.iter().for_each(|(_, e)| self.visit_expr(e)),
            Expr::DefaultIfEmpty { expr, flag, .. } => {
                self.visit_expr(flag);
                self.visit_expr(expr);
            }
            Expr::Exists { select }
            | Expr::ScalarSubquery { select, .. }
            | Expr::ComplexSubquery { select, .. }
            | Expr::CollectionSubquery { select, .. } => self.visit_select(select),
            Expr::In { value, values } => {
                self.visit_expr(value);
                match values {
                    InValues::Subquery { select } => self.visit_select(select),
                    InValues::List { elements } => elements.iter().for_each(|e| self.visit_expr(e)),
                    InValues::Dynamic { expr } => self.visit_expr(expr),
                    InValues::Constants { .. } => {}
                }
            }
        }
    }
}

/// Aliases assigned so far in one translation pass.
#[derive(Debug, Default)]
pub(crate) struct AliasTable {
    assigned: HashMap<TableId, String>,
    reserved: HashSet<String>,
}

impl AliasTable {
    /// Alias for `id`, reserving `preferred` (or the first free `preferred0`,
    /// `preferred1`, ...) on first use.
    pub fn alias_for(&mut self, id: TableId, preferred: &str) -> String {
        if let Some(alias) = self.assigned.get(&id) {
            return alias.clone();
        }

        let mut alias = preferred.to_string();
        let mut suffix = 0;
        while self.reserved.contains(&alias) {
            alias = format!("{}{}", preferred, suffix);
            suffix += 1;
        }

        trace!(table = %id, alias = %alias, "assigned table alias");
        self.reserved.insert(alias.clone());
        self.assigned.insert(id, alias.clone());
        alias
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use relq_ir::DataType;

    #[test]
    fn test_alias_suffixing() {
        let mut aliases = AliasTable::default();
        assert_eq!(aliases.alias_for(TableId(0), "u"), "u");
        assert_eq!(aliases.alias_for(TableId(1), "u"), "u0");
        assert_eq!(aliases.alias_for(TableId(2), "u"), "u1");
        // Stable on re-request
        assert_eq!(aliases.alias_for(TableId(1), "u"), "u0");
    }

    #[test]
    fn test_suffix_skips_taken_names() {
        let mut aliases = AliasTable::default();
        aliases.alias_for(TableId(0), "u0");
        aliases.alias_for(TableId(1), "u");
        assert_eq!(aliases.alias_for(TableId(2), "u"), "u1");
    }

    #[test]
    fn test_catalog_reaches_nested_selects() {
        let orders = TableId(1);
        let inner = Select::new(Projection::server(Expr::column(orders, "Id", DataType::Int32)))
            .from(Table::base(orders, "dbo", "Orders", "o"));
        let users = TableId(0);
        let root = Select::new(Projection::server(Expr::column(users, "Id", DataType::Int32)))
            .from(Table::base(users, "dbo", "Users", "u"))
            .filter(Expr::exists(inner));

        let catalog = TableCatalog::collect(&root);
        assert_eq!(catalog.preferred(users), Some("u"));
        assert_eq!(catalog.preferred(orders), Some("o"));
        assert_eq!(catalog.preferred(TableId(9)), None);
    }

    proptest! {
        #[test]
        fn prop_aliases_are_distinct(prefs in proptest::collection::vec("[a-c]{1,2}[0-2]?", 1..24)) {
            let mut aliases = AliasTable::default();
            let assigned: Vec<String> = prefs
                .iter()
                .enumerate()
                .map(|(i, p)| aliases.alias_for(TableId(i as u32), p))
                .collect();

            let unique: HashSet<&String> = assigned.iter().collect();
            prop_assert_eq!(unique.len(), assigned.len());
            for (alias, pref) in assigned.iter().zip(&prefs) {
                prop_assert!(alias.starts_with(pref.as_str()));
            }
        }
    }
}
