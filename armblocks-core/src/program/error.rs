//! Program validation errors

use core::fmt;

/// Structural field of a serialized block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Id,
    Kind,
    Parameters,
    Children,
    X,
    Y,
}

impl Field {
    pub fn as_str(self) -> &'static str {
        match self {
            Field::Id => "id",
            Field::Kind => "kind",
            Field::Parameters => "parameters",
            Field::Children => "children",
            Field::X => "x",
            Field::Y => "y",
        }
    }
}

/// What is wrong with a program document
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationErrorKind {
    /// Not valid JSON
    Json(String),
    /// Top level is neither a block list nor `{ "blocks": [...] }`
    NotAList,
    /// A block is not a JSON object
    NotAnObject,
    MissingField(Field),
    WrongType(Field),
    EmptyId,
    DuplicateId,
    /// No definition registered under this id
    UnknownDefinition(String),
    /// A leaf block has children
    ChildrenOnLeaf,
    UnknownParameter(String),
    MissingParameter(&'static str),
    /// Parameter present but wrong type or out of range
    InvalidParameter(&'static str),
    /// Joint reference does not match any configured joint
    UnknownJoint(String),
}

/// Validation failure, with the offending block when known
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub block_id: Option<String>,
    pub kind: ValidationErrorKind,
}

impl ValidationError {
    pub fn new(block_id: Option<&str>, kind: ValidationErrorKind) -> Self {
        Self {
            block_id: block_id.map(str::to_owned),
            kind,
        }
    }
}

impl fmt::Display for ValidationErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationErrorKind::Json(msg) => write!(f, "invalid JSON: {}", msg),
            ValidationErrorKind::NotAList => write!(f, "expected a list of blocks"),
            ValidationErrorKind::NotAnObject => write!(f, "block is not an object"),
            ValidationErrorKind::MissingField(field) => write!(f, "missing '{}'", field.as_str()),
            ValidationErrorKind::WrongType(field) => write!(f, "'{}' has the wrong type", field.as_str()),
            ValidationErrorKind::EmptyId => write!(f, "empty id"),
            ValidationErrorKind::DuplicateId => write!(f, "duplicate id"),
            ValidationErrorKind::UnknownDefinition(id) => write!(f, "unknown block '{}'", id),
            ValidationErrorKind::ChildrenOnLeaf => write!(f, "leaf block has children"),
            ValidationErrorKind::UnknownParameter(name) => write!(f, "unknown parameter '{}'", name),
            ValidationErrorKind::MissingParameter(name) => write!(f, "missing parameter '{}'", name),
            ValidationErrorKind::InvalidParameter(name) => write!(f, "invalid parameter '{}'", name),
            ValidationErrorKind::UnknownJoint(joint) => write!(f, "unknown joint '{}'", joint),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.block_id {
            Some(id) => write!(f, "block '{}': {}", id, self.kind),
            None => write!(f, "{}", self.kind),
        }
    }
}

impl std::error::Error for ValidationError {}
