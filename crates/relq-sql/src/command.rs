//! Database command construction
//!
//! A `CommandBuilder` is the reusable half of a translated query: it turns a
//! set of inputs into command text plus bound parameter values, without
//! touching the IR again.

use relq_ir::{eval, Expr, Inputs, Value};
use serde::Serialize;
use tracing::trace;

use crate::error::CommandError;

/// Execution-side command seam. Drivers implement this for their own
/// command type.
pub trait Command {
    fn set_text(&mut self, text: String);
    fn add_parameter(&mut self, name: String, value: Value);
}

/// In-memory command, used by the CLI and tests.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DbCommand {
    pub text: String,
    pub parameters: Vec<DbParameter>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DbParameter {
    pub name: String,
    pub value: Value,
}

impl DbCommand {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parameter(&self, name: &str) -> Option<&Value> {
        self.parameters
            .iter()
            .find(|p| p.name == name)
            .map(|p| &p.value)
    }
}

impl Command for DbCommand {
    fn set_text(&mut self, text: String) {
        self.text = text;
    }

    fn add_parameter(&mut self, name: String, value: Value) {
        self.parameters.push(DbParameter { name, value });
    }
}

/// A single hoisted value: bound under `name`, referenced in the text by
/// its placeholder.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParameterBinding {
    pub name: String,
    pub placeholder: String,
    pub value: Expr,
}

/// A runtime collection expanded into one parameter per element.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParameterListBinding {
    /// Element names are `{prefix}{i}`
    pub prefix: String,
    /// Element placeholders are `{placeholder_prefix}{i}`
    pub placeholder_prefix: String,
    /// Text emitted instead when the collection is empty
    pub empty_list: String,
    pub source: Expr,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "step", content = "value", rename_all = "snake_case")]
pub enum CommandStep {
    Text(String),
    Parameter(ParameterBinding),
    ParameterList(ParameterListBinding),
}

/// Recipe for building a command from inputs.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum CommandBuilder {
    /// Text is fixed; only parameter values vary.
    Static {
        text: String,
        parameters: Vec<ParameterBinding>,
    },
    /// Text depends on runtime list lengths and is rebuilt per execution.
    Dynamic { steps: Vec<CommandStep> },
}

impl CommandBuilder {
    pub fn is_static(&self) -> bool {
        matches!(self, CommandBuilder::Static { .. })
    }

    /// Fixed command text, when there is one.
    pub fn text(&self) -> Option<&str> {
        match self {
            CommandBuilder::Static { text, .. } => Some(text),
            CommandBuilder::Dynamic { .. } => None,
        }
    }

    /// Set the command text and bind every parameter from `inputs`.
    ///
    /// Every value is evaluated before `command` is touched, so a failed
    /// binding leaves it unchanged.
    pub fn apply<C: Command + ?Sized>(
        &self,
        command: &mut C,
        inputs: &Inputs,
    ) -> Result<(), CommandError> {
        let (text, bound) = self.bind_all(inputs)?;
        command.set_text(text);
        for (name, value) in bound {
            command.add_parameter(name, value);
        }
        Ok(())
    }

    fn bind_all(&self, inputs: &Inputs) -> Result<(String, Vec<(String, Value)>), CommandError> {
        match self {
            CommandBuilder::Static { text, parameters } => {
                let bound = parameters
                    .iter()
                    .map(|binding| bind(binding, inputs).map(|value| (binding.name.clone(), value)))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok((text.clone(), bound))
            }
            CommandBuilder::Dynamic { steps } => {
                let mut text = String::new();
                let mut bound = Vec::new();
                for step in steps {
                    match step {
                        CommandStep::Text(sql) => text.push_str(sql),
                        CommandStep::Parameter(binding) => {
                            bound.push((binding.name.clone(), bind(binding, inputs)?));
                        }
                        CommandStep::ParameterList(list) => {
                            expand_list(list, inputs, &mut text, &mut bound)?;
                        }
                    }
                }
                Ok((text, bound))
            }
        }
    }
}

fn bind(binding: &ParameterBinding, inputs: &Inputs) -> Result<Value, CommandError> {
    eval(&binding.value, inputs).map_err(|source| CommandError::Eval {
        name: binding.name.clone(),
        source,
    })
}

fn expand_list(
    list: &ParameterListBinding,
    inputs: &Inputs,
    text: &mut String,
    bound: &mut Vec<(String, Value)>,
) -> Result<(), CommandError> {
    let items = match eval(&list.source, inputs) {
        Ok(Value::Array(items)) => items,
        Ok(Value::Null) => Vec::new(),
        Ok(other) => {
            return Err(CommandError::NotACollection {
                name: list.prefix.clone(),
                found: other.kind(),
            })
        }
        Err(source) => {
            return Err(CommandError::Eval {
                name: list.prefix.clone(),
                source,
            })
        }
    };

    trace!(list = %list.prefix, count = items.len(), "expanding parameter list");

    if items.is_empty() {
        text.push_str(&list.empty_list);
        return Ok(());
    }

    for (i, item) in items.into_iter().enumerate() {
        if i > 0 {
            text.push_str(", ");
        }
        text.push_str(&format!("{}{}", list.placeholder_prefix, i));
        bound.push((format!("{}{}", list.prefix, i), item));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use relq_ir::DataType;

    fn ids_list() -> ParameterListBinding {
        ParameterListBinding {
            prefix: "p0_".to_string(),
            placeholder_prefix: "@p0_".to_string(),
            empty_list: "SELECT NULL WHERE 1 = 0".to_string(),
            source: Expr::input("ids", DataType::Collection(Box::new(DataType::Int32))),
        }
    }

    fn dynamic() -> CommandBuilder {
        CommandBuilder::Dynamic {
            steps: vec![
                CommandStep::Text("SELECT 1 WHERE [t].[Id] IN (".to_string()),
                CommandStep::ParameterList(ids_list()),
                CommandStep::Text(")".to_string()),
            ],
        }
    }

    #[test]
    fn test_static_apply_binds_in_order() {
        let builder = CommandBuilder::Static {
            text: "SELECT @p0, @p1".to_string(),
            parameters: vec![
                ParameterBinding {
                    name: "p0".to_string(),
                    placeholder: "@p0".to_string(),
                    value: Expr::input("a", DataType::Int32),
                },
                ParameterBinding {
                    name: "p1".to_string(),
                    placeholder: "@p1".to_string(),
                    value: Expr::input("b", DataType::String),
                },
            ],
        };

        let mut command = DbCommand::new();
        builder
            .apply(&mut command, &Inputs::new().with("a", 1).with("b", "x"))
            .unwrap();

        assert_eq!(command.text, "SELECT @p0, @p1");
        assert_eq!(command.parameters.len(), 2);
        assert_eq!(command.parameters[0].name, "p0");
        assert_eq!(command.parameter("p1"), Some(&Value::from("x")));
    }

    #[test]
    fn test_dynamic_list_expansion() {
        let inputs = {
            let mut i = Inputs::new();
            i.insert("ids", Value::Array(vec![Value::Int(1), Value::Int(2), Value::Int(3)]));
            i
        };
        let mut command = DbCommand::new();
        dynamic().apply(&mut command, &inputs).unwrap();

        assert_eq!(command.text, "SELECT 1 WHERE [t].[Id] IN (@p0_0, @p0_1, @p0_2)");
        let names: Vec<_> = command.parameters.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["p0_0", "p0_1", "p0_2"]);
    }

    #[test]
    fn test_dynamic_empty_list() {
        let inputs = {
            let mut i = Inputs::new();
            i.insert("ids", Value::Array(vec![]));
            i
        };
        let mut command = DbCommand::new();
        dynamic().apply(&mut command, &inputs).unwrap();

        assert_eq!(command.text, "SELECT 1 WHERE [t].[Id] IN (SELECT NULL WHERE 1 = 0)");
        assert!(command.parameters.is_empty());
    }

    #[test]
    fn test_dynamic_rejects_scalar_source() {
        let mut command = DbCommand::new();
        let err = dynamic()
            .apply(&mut command, &Inputs::new().with("ids", 5))
            .unwrap_err();
        assert!(matches!(err, CommandError::NotACollection { found: "int", .. }));
    }

    #[test]
    fn test_missing_input_reports_parameter() {
        let builder = CommandBuilder::Static {
            text: "SELECT @p0".to_string(),
            parameters: vec![ParameterBinding {
                name: "p0".to_string(),
                placeholder: "@p0".to_string(),
                value: Expr::input("gone", DataType::Int32),
            }],
        };
        let err = builder.apply(&mut DbCommand::new(), &Inputs::new()).unwrap_err();
        assert!(matches!(err, CommandError::Eval { ref name, .. } if name == "p0"));
    }

    #[test]
    fn test_failed_dynamic_binding_leaves_command_untouched() {
        let builder = CommandBuilder::Dynamic {
            steps: vec![
                CommandStep::Text("SELECT 1 WHERE [t].[Id] IN (".to_string()),
                CommandStep::ParameterList(ids_list()),
                CommandStep::Text(") AND [t].[Age] > ".to_string()),
                CommandStep::Parameter(ParameterBinding {
                    name: "p1".to_string(),
                    placeholder: "@p1".to_string(),
                    value: Expr::input("minAge", DataType::Int32),
                }),
            ],
        };
        let mut inputs = Inputs::new();
        inputs.insert("ids", Value::Array(vec![Value::Int(1), Value::Int(2)]));

        let mut command = DbCommand::new();
        let err = builder.apply(&mut command, &inputs).unwrap_err();

        assert!(matches!(err, CommandError::Eval { ref name, .. } if name == "p1"));
        assert_eq!(command, DbCommand::new());
    }

    #[test]
    fn test_failed_static_binding_leaves_command_untouched() {
        let builder = CommandBuilder::Static {
            text: "SELECT @p0, @p1".to_string(),
            parameters: vec![
                ParameterBinding {
                    name: "p0".to_string(),
                    placeholder: "@p0".to_string(),
                    value: Expr::input("a", DataType::Int32),
                },
                ParameterBinding {
                    name: "p1".to_string(),
                    placeholder: "@p1".to_string(),
                    value: Expr::input("gone", DataType::Int32),
                },
            ],
        };

        let mut command = DbCommand::new();
        assert!(builder
            .apply(&mut command, &Inputs::new().with("a", 1))
            .is_err());
        assert!(command.text.is_empty());
        assert!(command.parameters.is_empty());
    }
}
