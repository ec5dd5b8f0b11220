//! Handler variants and the script-transform seam
//!
//! A handler turns one source payload into zero or more output payloads.
//! Zero outputs suppress the message; the dispatcher publishes the first
//! output of a fan-out.

use std::sync::Arc;

use crossbeam::queue::ArrayQueue;
use serde::Deserialize;

use crate::JsonMap;
use crate::error::HandlerError;

/// The script body that means "pass the payload through unchanged"
///
/// Settings written for existing deployments default to this body; it
/// compiles to the pass-through handler without touching a script runtime.
pub const PASS_THROUGH_SCRIPT: &str = "return source";

/// Compiled program instances a handler leases per transform call
pub trait ScriptProgram: Send + Sync {
    /// Transform one payload into zero or more outputs
    fn run(&self, env: Option<&JsonMap>, source: &JsonMap) -> Result<Vec<JsonMap>, HandlerError>;
}

/// The external script-execution capability
///
/// The dispatcher consumes scripts through this seam only; deployments
/// install an implementation at startup and tests install closures.
pub trait ScriptRuntime: Send + Sync {
    /// Compile a script body into a runnable program
    fn compile(&self, script: &str) -> Result<Box<dyn ScriptProgram>, HandlerError>;
}

/// Handler section of a rule configuration
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct HandlerConfig {
    #[serde(rename = "type")]
    pub handler_type: String,

    #[serde(default)]
    pub script: String,
}

impl Default for HandlerConfig {
    fn default() -> Self {
        Self {
            handler_type: "script".to_string(),
            script: PASS_THROUGH_SCRIPT.to_string(),
        }
    }
}

/// What a compiled handler does
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerKind {
    /// Payload passes through unchanged
    PassThrough,
    /// Payload runs through a user script
    Script,
}

/// Per-rule program instances, pooled for reentrancy
const PROGRAM_POOL_SIZE: usize = 8;

/// A compiled rule handler
pub struct Handler {
    kind: HandlerKind,
    script: String,
    runtime: Option<Arc<dyn ScriptRuntime>>,
    pool: ArrayQueue<Box<dyn ScriptProgram>>,
}

impl Handler {
    /// Compile a handler from its configuration
    ///
    /// A missing configuration, or a script body of `return source`,
    /// compiles to the pass-through handler. Anything else requires a
    /// script runtime; the first program instance is compiled eagerly so
    /// broken scripts fail at configuration time, not per message.
    pub fn compile(
        config: Option<&HandlerConfig>,
        runtime: Option<Arc<dyn ScriptRuntime>>,
    ) -> Result<Self, HandlerError> {
        let config = config.cloned().unwrap_or_default();

        let is_script =
            config.handler_type == "script" && config.script.trim() != PASS_THROUGH_SCRIPT;

        if !is_script {
            return Ok(Self {
                kind: HandlerKind::PassThrough,
                script: String::new(),
                runtime: None,
                pool: ArrayQueue::new(1),
            });
        }

        let runtime = runtime.ok_or(HandlerError::NoScriptRuntime)?;
        let pool = ArrayQueue::new(PROGRAM_POOL_SIZE);
        let program = runtime.compile(&config.script)?;
        let _ = pool.push(program);

        Ok(Self {
            kind: HandlerKind::Script,
            script: config.script,
            runtime: Some(runtime),
            pool,
        })
    }

    /// The kind of this handler
    pub fn kind(&self) -> HandlerKind {
        self.kind
    }

    /// Run the handler on one payload
    ///
    /// Script handlers lease a program instance from the per-rule pool and
    /// return it afterwards, so concurrent workers each get their own
    /// instance.
    pub fn run(
        &self,
        env: Option<&JsonMap>,
        source: &JsonMap,
    ) -> Result<Vec<JsonMap>, HandlerError> {
        match self.kind {
            HandlerKind::PassThrough => Ok(vec![source.clone()]),
            HandlerKind::Script => {
                let runtime = self.runtime.as_ref().ok_or(HandlerError::NoScriptRuntime)?;
                let program = match self.pool.pop() {
                    Some(program) => program,
                    None => runtime.compile(&self.script)?,
                };

                let result = program.run(env, source);
                let _ = self.pool.push(program);
                result
            }
        }
    }
}

impl std::fmt::Debug for Handler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handler")
            .field("kind", &self.kind)
            .field("pooled_programs", &self.pool.len())
            .finish()
    }
}

#[cfg(test)]
#[path = "handler_test.rs"]
mod handler_test;
