//! SQL dialect abstraction
//!
//! Everything that differs between SQL engines is one overridable hook here;
//! the translator never hardcodes quoting, parameter names or pagination.

/// Where LIMIT/OFFSET go in a SELECT.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitPlacement {
    /// `SELECT TOP (n) ...`
    Top,
    /// `... ORDER BY ... OFFSET m ROWS FETCH NEXT n ROWS ONLY`
    OffsetFetch,
    /// `... LIMIT n OFFSET m`
    LimitOffset,
}

/// Trait for SQL dialect implementations
pub trait SqlDialect: Send + Sync {
    /// Get the dialect name
    fn name(&self) -> &'static str;

    /// Quote an identifier for this dialect
    fn quote_identifier(&self, ident: &str) -> String;

    /// Placeholder text for a named parameter (`p0` -> `@p0`)
    fn format_parameter(&self, name: &str) -> String;

    /// Pagination syntax for a SELECT with or without an offset
    fn limit_placement(&self, has_offset: bool) -> LimitPlacement;

    /// Ordering used when OFFSET is present but the query has no ORDER BY
    fn constant_ordering(&self) -> &'static str {
        "(SELECT 1)"
    }

    /// Storage type used to return booleans from the root SELECT
    fn boolean_storage_type(&self) -> &'static str {
        "BIT"
    }

    /// Clause that renders a subquery's rows as one JSON document
    fn sub_document_directive(&self) -> &'static str;

    /// Text literal
    fn string_literal(&self, value: &str) -> String {
        format!("'{}'", value.replace('\'', "''"))
    }

    /// Row source standing in for an empty IN list
    fn empty_list(&self) -> &'static str {
        "SELECT NULL WHERE 1 = 0"
    }
}

/// Microsoft SQL Server (T-SQL)
#[derive(Debug, Clone, Copy, Default)]
pub struct SqlServerDialect;

impl SqlDialect for SqlServerDialect {
    fn name(&self) -> &'static str {
        "sqlserver"
    }

    fn quote_identifier(&self, ident: &str) -> String {
        format!("[{}]", ident.replace(']', "]]"))
    }

    fn format_parameter(&self, name: &str) -> String {
        format!("@{}", name)
    }

    fn limit_placement(&self, has_offset: bool) -> LimitPlacement {
        if has_offset {
            LimitPlacement::OffsetFetch
        } else {
            LimitPlacement::Top
        }
    }

    fn sub_document_directive(&self) -> &'static str {
        "FOR JSON PATH"
    }

    fn string_literal(&self, value: &str) -> String {
        format!("N'{}'", value.replace('\'', "''"))
    }
}

/// Look up a dialect by its configured name.
pub fn dialect_by_name(name: &str) -> Option<Box<dyn SqlDialect>> {
    match name.to_lowercase().as_str() {
        "sqlserver" | "mssql" | "tsql" => Some(Box::new(SqlServerDialect)),
        _ => None,
    }
}
