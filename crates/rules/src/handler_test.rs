//! Tests for handler compilation and execution

use std::sync::Arc;

use crate::error::HandlerError;
use crate::handler::{
    Handler, HandlerConfig, HandlerKind, PASS_THROUGH_SCRIPT, ScriptProgram, ScriptRuntime,
};
use crate::JsonMap;

/// Script runtime backed by a closure, for tests
struct FnRuntime<F>(F);

struct FnProgram(Box<dyn Fn(&JsonMap) -> Vec<JsonMap> + Send + Sync>);

impl ScriptProgram for FnProgram {
    fn run(&self, _env: Option<&JsonMap>, source: &JsonMap) -> Result<Vec<JsonMap>, HandlerError> {
        Ok((self.0)(source))
    }
}

impl<F> ScriptRuntime for FnRuntime<F>
where
    F: Fn(&str) -> Box<dyn Fn(&JsonMap) -> Vec<JsonMap> + Send + Sync> + Send + Sync,
{
    fn compile(&self, script: &str) -> Result<Box<dyn ScriptProgram>, HandlerError> {
        Ok(Box::new(FnProgram((self.0)(script))))
    }
}

fn payload(json: serde_json::Value) -> JsonMap {
    json.as_object().unwrap().clone()
}

#[test]
fn test_missing_config_is_pass_through() {
    let handler = Handler::compile(None, None).unwrap();
    assert_eq!(handler.kind(), HandlerKind::PassThrough);

    let input = payload(serde_json::json!({"id": 1}));
    let out = handler.run(None, &input).unwrap();
    assert_eq!(out, vec![input]);
}

#[test]
fn test_return_source_script_is_pass_through() {
    let config = HandlerConfig {
        handler_type: "script".into(),
        script: PASS_THROUGH_SCRIPT.into(),
    };

    // No runtime needed for the default script body
    let handler = Handler::compile(Some(&config), None).unwrap();
    assert_eq!(handler.kind(), HandlerKind::PassThrough);
}

#[test]
fn test_script_without_runtime_fails() {
    let config = HandlerConfig {
        handler_type: "script".into(),
        script: "return { id: source.id }".into(),
    };

    let err = Handler::compile(Some(&config), None).unwrap_err();
    assert!(matches!(err, HandlerError::NoScriptRuntime));
}

#[test]
fn test_script_handler_runs_program() {
    let runtime = Arc::new(FnRuntime(|_script: &str| {
        Box::new(|source: &JsonMap| {
            let mut out = source.clone();
            out.insert("extra".into(), serde_json::json!(true));
            vec![out]
        }) as Box<dyn Fn(&JsonMap) -> Vec<JsonMap> + Send + Sync>
    }));

    let config = HandlerConfig {
        handler_type: "script".into(),
        script: "add extra".into(),
    };

    let handler = Handler::compile(Some(&config), Some(runtime)).unwrap();
    assert_eq!(handler.kind(), HandlerKind::Script);

    let out = handler.run(None, &payload(serde_json::json!({"id": 1}))).unwrap();
    assert_eq!(out.len(), 1);
    assert_eq!(out[0]["extra"], serde_json::json!(true));
}

#[test]
fn test_script_empty_result_suppresses() {
    let runtime = Arc::new(FnRuntime(|_script: &str| {
        Box::new(|_source: &JsonMap| Vec::new())
            as Box<dyn Fn(&JsonMap) -> Vec<JsonMap> + Send + Sync>
    }));

    let config = HandlerConfig {
        handler_type: "script".into(),
        script: "drop everything".into(),
    };

    let handler = Handler::compile(Some(&config), Some(runtime)).unwrap();
    let out = handler.run(None, &payload(serde_json::json!({"id": 1}))).unwrap();
    assert!(out.is_empty());
}

#[test]
fn test_broken_script_fails_at_compile_time() {
    struct Refusing;
    impl ScriptRuntime for Refusing {
        fn compile(&self, script: &str) -> Result<Box<dyn ScriptProgram>, HandlerError> {
            Err(HandlerError::compile(format!("syntax error in '{script}'")))
        }
    }

    let config = HandlerConfig {
        handler_type: "script".into(),
        script: "not a script".into(),
    };

    let err = Handler::compile(Some(&config), Some(Arc::new(Refusing))).unwrap_err();
    assert!(matches!(err, HandlerError::Compile(_)));
}
