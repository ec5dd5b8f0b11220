//! Rule and handler error types

use thiserror::Error;

/// Errors from running or compiling a handler
#[derive(Debug, Error)]
pub enum HandlerError {
    /// Rule declares a script but no script runtime is installed
    #[error("script handler requires a script runtime")]
    NoScriptRuntime,

    /// Script failed to compile
    #[error("script compilation failed: {0}")]
    Compile(String),

    /// Script failed at run time
    #[error("script execution failed: {0}")]
    Script(String),
}

impl HandlerError {
    /// Create a Compile error
    pub fn compile(msg: impl Into<String>) -> Self {
        Self::Compile(msg.into())
    }

    /// Create a Script error
    pub fn script(msg: impl Into<String>) -> Self {
        Self::Script(msg.into())
    }
}

/// Errors from compiling a rule out of its configuration
#[derive(Debug, Error)]
pub enum RuleError {
    /// Source schema failed to compile
    #[error("invalid rule schema: {0}")]
    Schema(#[from] gravity_schema::SchemaError),

    /// Handler failed to compile
    #[error(transparent)]
    Handler(#[from] HandlerError),
}
