//! SQL text accumulation
//!
//! Text is written into a working buffer. Hoisting a parameter list freezes
//! the working text into a step, after which the command can no longer be a
//! single static string.

use relq_ir::Expr;
use tracing::trace;

use crate::command::{CommandBuilder, CommandStep, ParameterBinding, ParameterListBinding};
use crate::dialect::SqlDialect;

pub(crate) const DEFAULT_INDENT_WIDTH: usize = 4;

#[derive(Debug)]
pub struct Emitter {
    indent_width: usize,
    indent: usize,
    next_parameter: usize,
    working: String,
    archived: String,
    steps: Vec<CommandStep>,
    parameters: Vec<ParameterBinding>,
    has_parameter_list: bool,
}

impl Default for Emitter {
    fn default() -> Self {
        Self::new(DEFAULT_INDENT_WIDTH)
    }
}

impl Emitter {
    pub fn new(indent_width: usize) -> Self {
        Self {
            indent_width,
            indent: 0,
            next_parameter: 0,
            working: String::new(),
            archived: String::new(),
            steps: Vec::new(),
            parameters: Vec::new(),
            has_parameter_list: false,
        }
    }

    pub fn append(&mut self, sql: &str) {
        self.working.push_str(sql);
    }

    /// Line break followed by the current indentation.
    pub fn newline(&mut self) {
        self.working.push('\n');
        self.working
            .extend(std::iter::repeat(' ').take(self.indent * self.indent_width));
    }

    pub fn increase_indent(&mut self) {
        self.indent += 1;
    }

    pub fn decrease_indent(&mut self) {
        self.indent = self.indent.saturating_sub(1);
    }

    /// Hoist `expr` into a named parameter and write its placeholder.
    pub fn add_parameter(&mut self, expr: &Expr, dialect: &dyn SqlDialect) {
        let name = self.fresh_name();
        let placeholder = dialect.format_parameter(&name);
        trace!(parameter = %name, "hoisted parameter");

        self.append(&placeholder);
        self.flush();
        let binding = ParameterBinding {
            name,
            placeholder,
            value: expr.clone(),
        };
        self.steps.push(CommandStep::Parameter(binding.clone()));
        self.parameters.push(binding);
    }

    /// Hoist a runtime collection; its placeholders are only known per
    /// execution.
    pub fn add_parameter_list(&mut self, expr: &Expr, dialect: &dyn SqlDialect) {
        let prefix = format!("{}_", self.fresh_name());
        trace!(parameter = %prefix, "hoisted parameter list");

        self.flush();
        self.has_parameter_list = true;
        self.steps.push(CommandStep::ParameterList(ParameterListBinding {
            placeholder_prefix: dialect.format_parameter(&prefix),
            prefix,
            empty_list: dialect.empty_list().to_string(),
            source: expr.clone(),
        }));
    }

    pub fn parameter_count(&self) -> usize {
        self.next_parameter
    }

    /// Finish the pass.
    pub fn build(mut self) -> CommandBuilder {
        self.flush();
        if self.has_parameter_list {
            CommandBuilder::Dynamic { steps: self.steps }
        } else {
            CommandBuilder::Static {
                text: self.archived,
                parameters: self.parameters,
            }
        }
    }

    fn fresh_name(&mut self) -> String {
        let name = format!("p{}", self.next_parameter);
        self.next_parameter += 1;
        name
    }

    fn flush(&mut self) {
        if self.working.is_empty() {
            return;
        }
        let text = std::mem::take(&mut self.working);
        self.archived.push_str(&text);
        self.steps.push(CommandStep::Text(text));
    }
}
