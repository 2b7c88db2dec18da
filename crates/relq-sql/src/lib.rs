//! SQL backend for the relq relational IR
//!
//! Translates one `Select` tree into parameterized SQL text plus a
//! materializer that rebuilds each result row into its original shape.
//!
//! ```no_run
//! use relq_ir::{DataType, Expr, Inputs, Projection, Select, Table, TableIds};
//! use relq_sql::{translate, DbCommand, SqlServerDialect};
//!
//! let mut ids = TableIds::new();
//! let users = ids.next();
//! let select = Select::new(Projection::server(Expr::column(users, "Name", DataType::String)))
//!     .from(Table::base(users, "dbo", "Users", "u"));
//!
//! let query = translate(&select, &SqlServerDialect).unwrap();
//! let mut command = DbCommand::new();
//! query.command.apply(&mut command, &Inputs::new()).unwrap();
//! ```

mod alias;
pub mod classify;
pub mod command;
pub mod dialect;
pub mod emitter;
pub mod error;
mod flatten;
pub mod materializer;
pub mod translator;

pub use classify::{is_parameterizable, is_translatable};
pub use command::{
    Command, CommandBuilder, CommandStep, DbCommand, DbParameter, ParameterBinding, ParameterListBinding,
};
pub use dialect::{dialect_by_name, LimitPlacement, SqlDialect, SqlServerDialect};
pub use error::{CommandError, MaterializeError, TranslateError, TranslateResult};
pub use materializer::{Materializer, Plan, ProjectedColumn, RowCursor, ValueRow};
pub use translator::{translate, SqlTranslator, TranslatedQuery, TranslatorOptions};
