use super::types::EntityId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StageError {
    #[error("unknown component type '{0}'")]
    UnknownComponentType(String),
    #[error("failed to construct component '{type_name}': {reason}")]
    ConstructionFailed { type_name: String, reason: String },
    #[error("cannot parent {child} under {parent}: it would create a cycle")]
    HierarchyCycle { child: EntityId, parent: EntityId },
    #[error("invalid data for component '{type_name}': {reason}")]
    InvalidComponentData { type_name: String, reason: String },
}

impl StageError {
    pub fn invalid_data(type_name: &str, reason: impl ToString) -> Self {
        StageError::InvalidComponentData { type_name: type_name.to_string(), reason: reason.to_string() }
    }

    /// Errors that must abort a load instead of being skipped.
    pub fn is_fatal(&self) -> bool {
        matches!(self, StageError::ConstructionFailed { .. })
    }
}
