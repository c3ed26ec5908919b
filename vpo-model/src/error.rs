use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("unknown {kind} value: {value}")]
    UnknownEnumValue { kind: &'static str, value: String },

    #[error("invalid plan: {0}")]
    InvalidPlan(String),
}

pub type Result<T> = std::result::Result<T, ModelError>;
