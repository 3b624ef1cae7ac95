//! JSON program loader
//!
//! Validates a serialized block forest and compiles it into a typed
//! [`Program`]. Blocks are checked depth-first in document order and the
//! first problem found is reported.
//!
//! Accepted shape (either the bare list or wrapped in `{ "blocks": [...] }`):
//!
//! ```json
//! [
//!   { "id": "b1", "kind": "move", "parameters": { "joint": "base", "degrees": 180 },
//!     "children": [], "x": 40, "y": 20 },
//!   { "id": "b2", "definitionId": "repeat", "parameters": { "times": 3 },
//!     "children": [ ... ] }
//! ]
//! ```

use std::collections::BTreeSet;

use log::debug;
use serde_json::{Map, Value};

use super::block::{Block, BlockKind, Program};
use super::error::{Field, ValidationError, ValidationErrorKind};
use super::registry::{BlockDefinition, BlockRegistry, Operation};
use crate::config::JointRegistry;
use crate::traits::JointTarget;

type Result<T> = core::result::Result<T, ValidationError>;

/// Validating program loader
pub struct ProgramLoader<'r> {
    blocks: &'r BlockRegistry,
    joints: &'r JointRegistry,
}

impl<'r> ProgramLoader<'r> {
    pub fn new(blocks: &'r BlockRegistry, joints: &'r JointRegistry) -> Self {
        Self { blocks, joints }
    }

    /// Parse and validate a JSON document
    pub fn load_str(&self, json: &str) -> Result<Program> {
        let value: Value = serde_json::from_str(json)
            .map_err(|e| ValidationError::new(None, ValidationErrorKind::Json(e.to_string())))?;
        self.load_value(&value)
    }

    /// Validate an already parsed document
    pub fn load_value(&self, value: &Value) -> Result<Program> {
        let roots = match value {
            Value::Array(roots) => roots,
            Value::Object(doc) => doc
                .get("blocks")
                .and_then(Value::as_array)
                .ok_or_else(|| ValidationError::new(None, ValidationErrorKind::NotAList))?,
            _ => return Err(ValidationError::new(None, ValidationErrorKind::NotAList)),
        };

        let mut seen = BTreeSet::new();
        let blocks = self.compile_list(roots, &mut seen)?;
        let program = Program::new(blocks);
        debug!(
            "Loaded program: {} root blocks, {} total",
            program.len(),
            program.block_count()
        );
        Ok(program)
    }

    fn compile_list<'v>(
        &self,
        values: &'v [Value],
        seen: &mut BTreeSet<&'v str>,
    ) -> Result<Vec<Block>> {
        values.iter().map(|value| self.compile(value, seen)).collect()
    }

    fn compile<'v>(&self, value: &'v Value, seen: &mut BTreeSet<&'v str>) -> Result<Block> {
        let block = value
            .as_object()
            .ok_or_else(|| ValidationError::new(None, ValidationErrorKind::NotAnObject))?;

        let id = match block.get("id") {
            None => return Err(ValidationError::new(None, ValidationErrorKind::MissingField(Field::Id))),
            Some(Value::String(id)) if id.is_empty() => {
                return Err(ValidationError::new(None, ValidationErrorKind::EmptyId))
            }
            Some(Value::String(id)) => id.as_str(),
            Some(_) => return Err(ValidationError::new(None, ValidationErrorKind::WrongType(Field::Id))),
        };
        let fail = |kind: ValidationErrorKind| ValidationError::new(Some(id), kind);

        let kind = match block.get("kind").or_else(|| block.get("definitionId")) {
            None => return Err(fail(ValidationErrorKind::MissingField(Field::Kind))),
            Some(kind) => kind
                .as_str()
                .ok_or_else(|| fail(ValidationErrorKind::WrongType(Field::Kind)))?,
        };
        let params = required(block, Field::Parameters, Value::as_object).map_err(&fail)?;
        let children = required(block, Field::Children, Value::as_array).map_err(&fail)?;
        for field in [Field::X, Field::Y] {
            if block.get(field.as_str()).map_or(false, |v| !v.is_number()) {
                return Err(fail(ValidationErrorKind::WrongType(field)));
            }
        }

        if !seen.insert(id) {
            return Err(fail(ValidationErrorKind::DuplicateId));
        }

        let definition = self
            .blocks
            .get(kind)
            .ok_or_else(|| fail(ValidationErrorKind::UnknownDefinition(kind.to_owned())))?;
        if !definition.operation.is_compound() && !children.is_empty() {
            return Err(fail(ValidationErrorKind::ChildrenOnLeaf));
        }
        definition.check(params).map_err(&fail)?;

        let kind = self.compile_kind(definition, params).map_err(&fail)?;
        let kind = match kind {
            Compiled::Leaf(kind) => kind,
            Compiled::Compound(make) => make(self.compile_list(children, seen)?),
        };

        Ok(Block::new(id, kind))
    }

    fn compile_kind(
        &self,
        definition: &BlockDefinition,
        params: &Map<String, Value>,
    ) -> core::result::Result<Compiled, ValidationErrorKind> {
        let compiled = match definition.operation {
            Operation::Move => Compiled::Leaf(BlockKind::Move {
                targets: self.move_targets(params)?,
            }),
            Operation::Home => Compiled::Leaf(BlockKind::Home),
            Operation::OpenGripper => Compiled::Leaf(BlockKind::OpenGripper),
            Operation::CloseGripper => Compiled::Leaf(BlockKind::CloseGripper),
            Operation::Wait => {
                let seconds = number(params, "seconds")?;
                Compiled::Leaf(BlockKind::Wait {
                    millis: (seconds * 1000.0).round() as u32,
                })
            }
            Operation::Repeat => {
                let times = params
                    .get("times")
                    .and_then(Value::as_u64)
                    .and_then(|n| u32::try_from(n).ok())
                    .ok_or(ValidationErrorKind::InvalidParameter("times"))?;
                Compiled::Compound(Box::new(move |body| BlockKind::Repeat { times, body }))
            }
            Operation::If => {
                let condition = flag(params, "condition")?;
                Compiled::Compound(Box::new(move |body| BlockKind::If { condition, body }))
            }
            Operation::While => {
                let condition = flag(params, "condition")?;
                Compiled::Compound(Box::new(move |body| BlockKind::While { condition, body }))
            }
        };
        Ok(compiled)
    }

    fn move_targets(
        &self,
        params: &Map<String, Value>,
    ) -> core::result::Result<Vec<JointTarget>, ValidationErrorKind> {
        if let Some(targets) = params.get("targets") {
            if params.contains_key("joint") || params.contains_key("degrees") {
                return Err(ValidationErrorKind::InvalidParameter("targets"));
            }
            let targets = targets
                .as_array()
                .ok_or(ValidationErrorKind::InvalidParameter("targets"))?;
            return targets.iter().map(|t| self.target(t)).collect();
        }

        let joint = params
            .get("joint")
            .ok_or(ValidationErrorKind::MissingParameter("joint"))?;
        let degrees = number(params, "degrees")?;
        Ok(vec![JointTarget::new(self.resolve_joint(joint)?, degrees as f32)])
    }

    fn target(&self, value: &Value) -> core::result::Result<JointTarget, ValidationErrorKind> {
        let invalid = ValidationErrorKind::InvalidParameter("targets");
        let target = value.as_object().ok_or(invalid.clone())?;
        let (joint, degrees) = match (target.get("joint"), target.get("servoId")) {
            (Some(joint), _) => (joint, target.get("degrees")),
            (None, Some(id)) => (id, target.get("value")),
            (None, None) => return Err(invalid),
        };
        let degrees = degrees.and_then(Value::as_f64).ok_or(invalid)?;
        Ok(JointTarget::new(self.resolve_joint(joint)?, degrees as f32))
    }

    fn resolve_joint(&self, joint: &Value) -> core::result::Result<u8, ValidationErrorKind> {
        let found = match joint {
            Value::String(name) => self.joints.by_name(name),
            other => other
                .as_u64()
                .and_then(|id| u8::try_from(id).ok())
                .and_then(|id| self.joints.get(id)),
        };
        found
            .map(|config| config.servo_id)
            .ok_or_else(|| ValidationErrorKind::UnknownJoint(joint_label(joint)))
    }
}

/// Block kind waiting for its compiled body
enum Compiled {
    Leaf(BlockKind),
    Compound(Box<dyn FnOnce(Vec<Block>) -> BlockKind>),
}

fn required<'v, T: ?Sized>(
    block: &'v Map<String, Value>,
    field: Field,
    cast: fn(&'v Value) -> Option<&'v T>,
) -> core::result::Result<&'v T, ValidationErrorKind> {
    let value = block
        .get(field.as_str())
        .ok_or(ValidationErrorKind::MissingField(field))?;
    cast(value).ok_or(ValidationErrorKind::WrongType(field))
}

fn number(params: &Map<String, Value>, name: &'static str) -> core::result::Result<f64, ValidationErrorKind> {
    params
        .get(name)
        .and_then(Value::as_f64)
        .ok_or(ValidationErrorKind::MissingParameter(name))
}

fn flag(params: &Map<String, Value>, name: &'static str) -> core::result::Result<bool, ValidationErrorKind> {
    params
        .get(name)
        .and_then(Value::as_bool)
        .ok_or(ValidationErrorKind::MissingParameter(name))
}

fn joint_label(joint: &Value) -> String {
    match joint {
        Value::String(name) => name.clone(),
        other => other.to_string(),
    }
}
