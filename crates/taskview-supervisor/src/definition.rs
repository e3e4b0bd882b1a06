use serde::{Deserialize, Serialize};
use taskview_core::ParameterSpec;

/// A predefined task, loaded at boot and immutable thereafter.
///
/// `command` is a shell-command template; `{{name}}` markers are replaced
/// with validated parameter values at launch. `max_execution_time` is in
/// seconds, with `0` meaning unbounded.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaskDefinition {
    pub name: String,
    pub command: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub max_execution_time: u64,
    #[serde(default)]
    pub parameters: Vec<ParameterSpec>,
}

#[cfg(test)]
mod tests {
    use taskview_core::ParameterKind;

    use super::*;

    #[test]
    fn unit_task_definition_parses_from_toml_table() {
        let definition: TaskDefinition = toml::from_str(
            r#"
            name = "deploy"
            command = "deploy.sh {{env}} {{replicas}}"
            max_execution_time = 300

            [[parameters]]
            name = "env"
            type = "string"

            [[parameters]]
            name = "replicas"
            type = "int"
            optional = true
            "#,
        )
        .expect("parse definition");

        assert_eq!(definition.name, "deploy");
        assert_eq!(definition.max_execution_time, 300);
        assert_eq!(definition.parameters.len(), 2);
        assert_eq!(definition.parameters[0].kind, ParameterKind::String);
        assert!(!definition.parameters[0].optional);
        assert_eq!(definition.parameters[1].kind, ParameterKind::Int);
        assert!(definition.parameters[1].optional);
    }

    #[test]
    fn unit_task_definition_defaults_are_empty() {
        let definition: TaskDefinition = toml::from_str(
            r#"
            name = "echo"
            command = "echo hello"
            "#,
        )
        .expect("parse definition");
        assert_eq!(definition.max_execution_time, 0);
        assert!(definition.parameters.is_empty());
        assert!(definition.description.is_empty());
    }
}
