//! relq Intermediate Representation (IR)
//!
//! Relational algebra plus scalar expressions, as handed over by the query
//! planner. The tree is already decided: what to select, join and filter is
//! fixed here, and the SQL backend only renders it.
//! All types are deterministically serializable for caching and provenance.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

mod eval;
mod expr;
mod types;
mod value;

pub use eval::{apply_binary, apply_unary, condition, eval, EvalError};
pub use expr::*;
pub use types::*;
pub use value::*;

/// Identity of an aliased relation (base table, subquery or set operation).
///
/// Columns refer to their relation through this id, so the backend can
/// assign one alias per relation without relying on node addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TableId(pub u32);

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Hands out fresh table ids while a tree is being built.
#[derive(Debug, Default)]
pub struct TableIds {
    next: u32,
}

impl TableIds {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&mut self) -> TableId {
        let id = TableId(self.next);
        self.next += 1;
        id
    }
}

/// A single SELECT block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Select {
    pub projection: Projection,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<Table>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub predicate: Option<Expr>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grouping: Option<Expr>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ordering: Option<Ordering>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<Expr>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<Expr>,

    #[serde(default)]
    pub distinct: bool,
}

impl Select {
    pub fn new(projection: Projection) -> Self {
        Self {
            projection,
            table: None,
            predicate: None,
            grouping: None,
            ordering: None,
            offset: None,
            limit: None,
            distinct: false,
        }
    }

    pub fn from(mut self, table: Table) -> Self {
        self.table = Some(table);
        self
    }

    pub fn filter(mut self, predicate: Expr) -> Self {
        self.predicate = Some(predicate);
        self
    }

    pub fn group_by(mut self, key: Expr) -> Self {
        self.grouping = Some(key);
        self
    }

    pub fn order_by(mut self, ordering: Ordering) -> Self {
        self.ordering = Some(ordering);
        self
    }

    pub fn skip(mut self, offset: Expr) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn take(mut self, limit: Expr) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    /// Calculate fingerprint (SHA-256) of the query shape for caching.
    ///
    /// Structurally identical trees hash identically. Input values are not
    /// part of the tree, so one fingerprint covers every execution.
    pub fn fingerprint(&self) -> String {
        let json = serde_json::to_string(self).expect("IR should always serialize");
        let mut hasher = Sha256::new();
        hasher.update(json.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

/// Relation operand of a FROM clause.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Table {
    Base {
        id: TableId,
        schema: String,
        name: String,
        alias: String,
    },
    Subquery {
        id: TableId,
        alias: String,
        select: Box<Select>,
    },
    SetOperation {
        id: TableId,
        alias: String,
        operator: SetOperator,
        left: Box<Select>,
        right: Box<Select>,
    },
    InnerJoin {
        outer: Box<Table>,
        inner: Box<Table>,
        predicate: Expr,
    },
    LeftJoin {
        outer: Box<Table>,
        inner: Box<Table>,
        predicate: Expr,
    },
    CrossJoin {
        outer: Box<Table>,
        inner: Box<Table>,
    },
    CrossApply {
        outer: Box<Table>,
        inner: Box<Table>,
    },
    OuterApply {
        outer: Box<Table>,
        inner: Box<Table>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SetOperator {
    Union,
    UnionAll,
    Intersect,
    Except,
}

impl Table {
    pub fn base(
        id: TableId,
        schema: impl Into<String>,
        name: impl Into<String>,
        alias: impl Into<String>,
    ) -> Self {
        Table::Base {
            id,
            schema: schema.into(),
            name: name.into(),
            alias: alias.into(),
        }
    }

    pub fn subquery(id: TableId, alias: impl Into<String>, select: Select) -> Self {
        Table::Subquery {
            id,
            alias: alias.into(),
            select: Box::new(select),
        }
    }

    pub fn set_operation(
        id: TableId,
        alias: impl Into<String>,
        operator: SetOperator,
        left: Select,
        right: Select,
    ) -> Self {
        Table::SetOperation {
            id,
            alias: alias.into(),
            operator,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn inner_join(outer: Table, inner: Table, predicate: Expr) -> Self {
        Table::InnerJoin {
            outer: Box::new(outer),
            inner: Box::new(inner),
            predicate,
        }
    }

    pub fn left_join(outer: Table, inner: Table, predicate: Expr) -> Self {
        Table::LeftJoin {
            outer: Box::new(outer),
            inner: Box::new(inner),
            predicate,
        }
    }

    pub fn cross_join(outer: Table, inner: Table) -> Self {
        Table::CrossJoin {
            outer: Box::new(outer),
            inner: Box::new(inner),
        }
    }

    pub fn cross_apply(outer: Table, inner: Table) -> Self {
        Table::CrossApply {
            outer: Box::new(outer),
            inner: Box::new(inner),
        }
    }

    pub fn outer_apply(outer: Table, inner: Table) -> Self {
        Table::OuterApply {
            outer: Box::new(outer),
            inner: Box::new(inner),
        }
    }

    /// Identity and preferred alias, for relations that carry one.
    pub fn identity(&self) -> Option<(TableId, &str)> {
        match self {
            Table::Base { id, alias, .. }
            | Table::Subquery { id, alias, .. }
            | Table::SetOperation { id, alias, .. } => Some((*id, alias.as_str())),
            _ => None,
        }
    }
}

/// One ORDER BY term, linked back to the terms before it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ordering {
    pub expr: Expr,
    #[serde(default)]
    pub descending: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous: Option<Box<Ordering>>,
}

impl Ordering {
    pub fn asc(expr: Expr) -> Self {
        Self {
            expr,
            descending: false,
            previous: None,
        }
    }

    pub fn desc(expr: Expr) -> Self {
        Self {
            expr,
            descending: true,
            previous: None,
        }
    }

    /// Append a term after this one.
    pub fn then(self, expr: Expr, descending: bool) -> Self {
        Self {
            expr,
            descending,
            previous: Some(Box::new(self)),
        }
    }

    /// Build a chain from terms in ORDER BY order.
    pub fn chain(terms: impl IntoIterator<Item = (Expr, bool)>) -> Option<Self> {
        terms.into_iter().fold(None, |previous, (expr, descending)| {
            Some(Self {
                expr,
                descending,
                previous: previous.map(Box::new),
            })
        })
    }
}

/// Result shape of a SELECT.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Projection {
    /// Shape built from one row's columns.
    Server { body: Expr },
    /// Client-side transform of a server shape; `client` sees the server
    /// result as `Parameter(0)`.
    Client { server: Expr, client: Expr },
    /// Two shapes combined by `result`, which sees the outer result as
    /// `Parameter(0)` and the inner one as `Parameter(1)`.
    Composite {
        outer: Box<Projection>,
        inner: Box<Projection>,
        result: Expr,
    },
}

impl Projection {
    pub fn server(body: Expr) -> Self {
        Projection::Server { body }
    }

    pub fn client(server: Expr, client: Expr) -> Self {
        Projection::Client { server, client }
    }

    pub fn composite(outer: Projection, inner: Projection, result: Expr) -> Self {
        Projection::Composite {
            outer: Box::new(outer),
            inner: Box::new(inner),
            result,
        }
    }

    /// Static type of the materialized result.
    pub fn ty(&self) -> DataType {
        match self {
            Projection::Server { body } => body.ty(),
            Projection::Client { client, .. } => client.ty(),
            Projection::Composite { result, .. } => result.ty(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn users_query(ids: &mut TableIds) -> Select {
        let users = ids.next();
        Select::new(Projection::server(Expr::column(users, "Name", DataType::String)))
            .from(Table::base(users, "dbo", "Users", "u"))
            .filter(Expr::gt(
                Expr::column(users, "Age", DataType::Int32),
                Expr::input("minAge", DataType::Int32),
            ))
    }

    #[test]
    fn test_fingerprint_deterministic() {
        let query1 = users_query(&mut TableIds::new());
        let query2 = users_query(&mut TableIds::new());

        assert_eq!(query1.fingerprint(), query2.fingerprint());
    }

    #[test]
    fn test_fingerprint_differs_by_shape() {
        let query1 = users_query(&mut TableIds::new());
        let query2 = users_query(&mut TableIds::new()).distinct();

        assert_ne!(query1.fingerprint(), query2.fingerprint());
    }

    #[test]
    fn test_json_round_trip() {
        let query = users_query(&mut TableIds::new())
            .order_by(Ordering::asc(Expr::column(TableId(0), "Name", DataType::String)))
            .take(Expr::int(10));

        let json = serde_json::to_string(&query).unwrap();
        let parsed: Select = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed, query);
        assert_eq!(query.fingerprint(), parsed.fingerprint());
    }

    #[test]
    fn test_ordering_chain_links_back() {
        let t = TableId(0);
        let ordering = Ordering::chain([
            (Expr::column(t, "A", DataType::Int32), false),
            (Expr::column(t, "B", DataType::Int32), true),
        ])
        .unwrap();

        assert!(ordering.descending);
        let previous = ordering.previous.as_deref().unwrap();
        assert_eq!(previous.expr, Expr::column(t, "A", DataType::Int32));
        assert!(previous.previous.is_none());
    }

    #[test]
    fn test_table_ids_are_fresh() {
        let mut ids = TableIds::new();
        let a = ids.next();
        let b = ids.next();
        assert_ne!(a, b);
    }
}
