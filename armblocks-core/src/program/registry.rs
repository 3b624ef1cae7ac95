//! Block definitions and their parameter schemas
//!
//! The registry is built by the caller and handed to the loader; there is
//! no global instance. Hosts can add aliases for the standard definitions or
//! register their own ids that compile to one of the built-in operations.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use super::error::ValidationErrorKind;

/// Longest `wait` accepted (seconds)
pub const MAX_WAIT_SECONDS: f64 = 3600.0;

/// Most iterations a `repeat` accepts
pub const MAX_REPEAT: u32 = 10_000;

/// Operation a definition compiles to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Move,
    Home,
    OpenGripper,
    CloseGripper,
    Wait,
    Repeat,
    If,
    While,
}

impl Operation {
    /// Check if blocks of this operation may have children
    pub fn is_compound(self) -> bool {
        matches!(self, Operation::Repeat | Operation::If | Operation::While)
    }

    /// Parameter schema of the built-in definition
    pub fn params(self) -> Vec<ParamSpec> {
        match self {
            // Either joint + degrees or targets; the loader checks which
            Operation::Move => vec![
                ParamSpec::optional("joint", ParamType::Joint),
                ParamSpec::optional("degrees", ParamType::Number { min: None, max: None }),
                ParamSpec::optional("targets", ParamType::Targets),
            ],
            Operation::Wait => vec![ParamSpec::required(
                "seconds",
                ParamType::Number {
                    min: Some(0.0),
                    max: Some(MAX_WAIT_SECONDS),
                },
            )],
            Operation::Repeat => vec![ParamSpec::required(
                "times",
                ParamType::Count { max: MAX_REPEAT },
            )],
            Operation::If | Operation::While => {
                vec![ParamSpec::required("condition", ParamType::Bool)]
            }
            Operation::Home | Operation::OpenGripper | Operation::CloseGripper => Vec::new(),
        }
    }
}

/// Parameter value type
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParamType {
    /// Finite number, optionally bounded (inclusive)
    Number { min: Option<f64>, max: Option<f64> },
    /// Non-negative integer up to `max`
    Count { max: u32 },
    Bool,
    /// Joint name or servo id
    Joint,
    /// List of `{joint, degrees}` or `{servoId, value}` objects
    Targets,
}

impl ParamType {
    /// Check a value against this type
    pub fn accepts(&self, value: &Value) -> bool {
        match *self {
            ParamType::Number { min, max } => value.as_f64().map_or(false, |n| {
                n.is_finite() && min.map_or(true, |m| n >= m) && max.map_or(true, |m| n <= m)
            }),
            ParamType::Count { max } => value.as_u64().map_or(false, |n| n <= max as u64),
            ParamType::Bool => value.is_boolean(),
            ParamType::Joint => is_joint_ref(value),
            ParamType::Targets => value
                .as_array()
                .map_or(false, |targets| targets.iter().all(is_target)),
        }
    }
}

fn is_joint_ref(value: &Value) -> bool {
    value.is_string() || value.as_u64().map_or(false, |id| id <= u8::MAX as u64)
}

fn is_finite_number(value: Option<&Value>) -> bool {
    value.and_then(Value::as_f64).map_or(false, f64::is_finite)
}

fn is_target(value: &Value) -> bool {
    let Some(target) = value.as_object() else {
        return false;
    };
    match (target.get("joint"), target.get("servoId")) {
        (Some(joint), None) => is_joint_ref(joint) && is_finite_number(target.get("degrees")),
        (None, Some(id)) => {
            id.as_u64().map_or(false, |id| id <= u8::MAX as u64)
                && is_finite_number(target.get("value"))
        }
        _ => false,
    }
}

/// One named parameter
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamSpec {
    pub name: &'static str,
    pub ty: ParamType,
    pub required: bool,
}

impl ParamSpec {
    pub const fn required(name: &'static str, ty: ParamType) -> Self {
        Self {
            name,
            ty,
            required: true,
        }
    }

    pub const fn optional(name: &'static str, ty: ParamType) -> Self {
        Self {
            name,
            ty,
            required: false,
        }
    }
}

/// A registered block kind
#[derive(Debug, Clone, PartialEq)]
pub struct BlockDefinition {
    /// Id used in documents (`kind` / `definitionId`)
    pub id: String,
    pub operation: Operation,
    pub params: Vec<ParamSpec>,
}

impl BlockDefinition {
    /// Definition with the built-in schema for `operation`
    pub fn new(id: impl Into<String>, operation: Operation) -> Self {
        Self {
            id: id.into(),
            operation,
            params: operation.params(),
        }
    }

    /// Check a parameter object against the schema
    pub fn check(&self, params: &Map<String, Value>) -> Result<(), ValidationErrorKind> {
        if let Some(name) = params
            .keys()
            .find(|name| !self.params.iter().any(|spec| spec.name == name.as_str()))
        {
            return Err(ValidationErrorKind::UnknownParameter(name.clone()));
        }

        for spec in &self.params {
            match params.get(spec.name) {
                Some(value) if !spec.ty.accepts(value) => {
                    return Err(ValidationErrorKind::InvalidParameter(spec.name));
                }
                None if spec.required => {
                    return Err(ValidationErrorKind::MissingParameter(spec.name));
                }
                _ => {}
            }
        }
        Ok(())
    }
}

/// Set of known block definitions
#[derive(Debug, Clone, Default)]
pub struct BlockRegistry {
    definitions: BTreeMap<String, BlockDefinition>,
}

impl BlockRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in definitions
    pub fn standard() -> Self {
        let mut registry = Self::new();
        for (id, operation) in [
            ("move", Operation::Move),
            ("home", Operation::Home),
            ("open_gripper", Operation::OpenGripper),
            ("close_gripper", Operation::CloseGripper),
            ("wait", Operation::Wait),
            ("repeat", Operation::Repeat),
            ("if", Operation::If),
            ("while", Operation::While),
        ] {
            registry.register(BlockDefinition::new(id, operation));
        }
        registry
    }

    /// Add a definition
    ///
    /// Returns false (and keeps the existing one) if the id is taken.
    pub fn register(&mut self, definition: BlockDefinition) -> bool {
        if self.definitions.contains_key(&definition.id) {
            return false;
        }
        self.definitions.insert(definition.id.clone(), definition);
        true
    }

    /// Register `alias` as another name for the definition `target`
    pub fn alias(&mut self, alias: &str, target: &str) -> bool {
        let Some(existing) = self.definitions.get(target) else {
            return false;
        };
        let definition = BlockDefinition {
            id: alias.to_owned(),
            ..existing.clone()
        };
        self.register(definition)
    }

    pub fn get(&self, id: &str) -> Option<&BlockDefinition> {
        self.definitions.get(id)
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(value: Value) -> Map<String, Value> {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn test_standard_registry() {
        let registry = BlockRegistry::standard();
        assert_eq!(registry.len(), 8);
        assert_eq!(registry.get("wait").unwrap().operation, Operation::Wait);
        assert!(registry.get("repeat").unwrap().operation.is_compound());
        assert!(registry.get("spin").is_none());
    }

    #[test]
    fn test_register_and_alias() {
        let mut registry = BlockRegistry::standard();
        assert!(!registry.register(BlockDefinition::new("move", Operation::Home)));
        assert_eq!(registry.get("move").unwrap().operation, Operation::Move);

        assert!(registry.alias("move_joint", "move"));
        let alias = registry.get("move_joint").unwrap();
        assert_eq!(alias.operation, Operation::Move);
        assert_eq!(alias.params, Operation::Move.params());

        assert!(!registry.alias("x", "missing"));
    }

    #[test]
    fn test_check_required_and_unknown() {
        let wait = BlockDefinition::new("wait", Operation::Wait);

        assert!(wait.check(&params(json!({ "seconds": 1.5 }))).is_ok());
        assert_eq!(
            wait.check(&params(json!({}))),
            Err(ValidationErrorKind::MissingParameter("seconds"))
        );
        assert_eq!(
            wait.check(&params(json!({ "seconds": 1, "speed": 2 }))),
            Err(ValidationErrorKind::UnknownParameter("speed".into()))
        );
        assert_eq!(
            wait.check(&params(json!({ "seconds": -1 }))),
            Err(ValidationErrorKind::InvalidParameter("seconds"))
        );
        assert_eq!(
            wait.check(&params(json!({ "seconds": "1" }))),
            Err(ValidationErrorKind::InvalidParameter("seconds"))
        );
    }

    #[test]
    fn test_param_types() {
        let count = ParamType::Count { max: 5 };
        assert!(count.accepts(&json!(0)));
        assert!(count.accepts(&json!(5)));
        assert!(!count.accepts(&json!(6)));
        assert!(!count.accepts(&json!(-1)));
        assert!(!count.accepts(&json!(1.5)));

        assert!(ParamType::Bool.accepts(&json!(true)));
        assert!(!ParamType::Bool.accepts(&json!("true")));

        assert!(ParamType::Joint.accepts(&json!("base")));
        assert!(ParamType::Joint.accepts(&json!(3)));
        assert!(!ParamType::Joint.accepts(&json!(300)));

        let targets = ParamType::Targets;
        assert!(targets.accepts(&json!([
            { "joint": "base", "degrees": 90 },
            { "servoId": 2, "value": 45.5 }
        ])));
        assert!(targets.accepts(&json!([])));
        assert!(!targets.accepts(&json!([{ "joint": "base" }])));
        assert!(!targets.accepts(&json!([{ "joint": "base", "servoId": 1, "degrees": 1 }])));
        assert!(!targets.accepts(&json!({ "joint": "base", "degrees": 90 })));
    }
}
