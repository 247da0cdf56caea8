//! Sandboxed code evaluator.
//!
//! Steps from the Agent Driver land here as a block of model-written code;
//! this module tokenizes it ([`lexer`]), parses it into a tree ([`ast`],
//! [`parser`]), and walks that tree ([`eval`]) against a restricted set of
//! builtins ([`builtins`]) and the caller's registered tools, returning
//! either a plain value or a `final_answer(...)` sentinel.

mod ast;
mod builtins;
mod eval;
mod extract;
mod lexer;
mod multi_tool_use;
mod parser;
mod value;

pub use eval::Outcome;
pub use extract::{extract_code_blocks, ExtractedCode};
pub use value::{Scope, Value};

use crate::hooks::Hooks;
use crate::state::State;
use crate::tools::Tool;
use std::collections::HashMap;
use std::sync::Arc;

/// Default operation budget for a single code block, matching the
/// original's ceiling on interpreter steps before it assumes the code is
/// runaway rather than merely slow.
pub const DEFAULT_OPERATION_BUDGET: u64 = 10_000_000;

/// Runs one block of sandboxed code against `globals`, returning the
/// updated globals alongside whatever the block produced.
///
/// `hooks` (if any) gate and observe every tool call the block makes;
/// `history` is a read-only snapshot handed to those hooks, not consulted by
/// the evaluator itself. `state` (if any) is exposed as a read-only snapshot
/// to tools registered with `needs_state()`.
pub async fn run(
    source: &str,
    globals: Scope,
    tools: &HashMap<String, Arc<Tool>>,
    authorized_imports: &[String],
    max_code_length: usize,
    hooks: Option<&Hooks>,
    history: &[serde_json::Value],
    state: Option<&State>,
) -> crate::Result<(Outcome, Scope)> {
    let program = parser::parse(source, max_code_length)?;
    let mut evaluator = eval::Evaluator::new(
        globals,
        tools,
        authorized_imports,
        DEFAULT_OPERATION_BUDGET,
        hooks,
        history,
        state,
    );
    let outcome = evaluator.run_block(&program).await?;
    Ok((outcome, evaluator.into_globals()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn no_tools() -> HashMap<String, Arc<Tool>> {
        HashMap::new()
    }

    #[tokio::test]
    async fn test_run_simple_arithmetic() {
        let (outcome, _) = run("x = 1 + 2\nfinal_answer(x)", Scope::new(), &no_tools(), &[], 2000, None, &[], None)
            .await
            .unwrap();
        match outcome {
            Outcome::FinalAnswer(v) => assert_eq!(v.to_json(), json!(3)),
            Outcome::Completed(_) => panic!("expected final answer"),
        }
    }

    #[tokio::test]
    async fn test_run_for_loop_accumulates() {
        let source = "total = 0\nfor i in range(5):\n    total += i\nfinal_answer(total)";
        let (outcome, _) = run(source, Scope::new(), &no_tools(), &[], 2000, None, &[], None).await.unwrap();
        match outcome {
            Outcome::FinalAnswer(v) => assert_eq!(v.to_json(), json!(10)),
            Outcome::Completed(_) => panic!("expected final answer"),
        }
    }

    #[tokio::test]
    async fn test_run_without_final_answer_is_completed() {
        let (outcome, globals) = run("y = 42", Scope::new(), &no_tools(), &[], 2000, None, &[], None)
            .await
            .unwrap();
        assert!(matches!(outcome, Outcome::Completed(_)));
        assert_eq!(globals.get("y").unwrap().to_json(), json!(42));
    }

    #[tokio::test]
    async fn test_run_rejects_banned_import() {
        let err = run("import os", Scope::new(), &no_tools(), &["os".to_string()], 2000, None, &[], None)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not permitted"));
    }

    #[tokio::test]
    async fn test_run_rejects_unauthorized_import() {
        let err = run("import requests", Scope::new(), &no_tools(), &[], 2000, None, &[], None)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("authorized"));
    }

    #[tokio::test]
    async fn test_run_list_comprehension() {
        let source = "squares = [x * x for x in range(4)]\nfinal_answer(squares)";
        let (outcome, _) = run(source, Scope::new(), &no_tools(), &[], 2000, None, &[], None).await.unwrap();
        match outcome {
            Outcome::FinalAnswer(v) => assert_eq!(v.to_json(), json!([0, 1, 4, 9])),
            Outcome::Completed(_) => panic!("expected final answer"),
        }
    }

    #[tokio::test]
    async fn test_run_function_definition_and_call() {
        let source = "def add(a, b):\n    return a + b\nfinal_answer(add(2, 3))";
        let (outcome, _) = run(source, Scope::new(), &no_tools(), &[], 2000, None, &[], None).await.unwrap();
        match outcome {
            Outcome::FinalAnswer(v) => assert_eq!(v.to_json(), json!(5)),
            Outcome::Completed(_) => panic!("expected final answer"),
        }
    }

    #[tokio::test]
    async fn test_run_fstring_interpolation() {
        let source = "name = 'world'\nfinal_answer(f\"hello {name}\")";
        let (outcome, _) = run(source, Scope::new(), &no_tools(), &[], 2000, None, &[], None).await.unwrap();
        match outcome {
            Outcome::FinalAnswer(v) => assert_eq!(v.to_json(), json!("hello world")),
            Outcome::Completed(_) => panic!("expected final answer"),
        }
    }

    #[tokio::test]
    async fn test_run_enforces_max_code_length() {
        let source = "x = 1\n".repeat(1000);
        let err = run(&source, Scope::new(), &no_tools(), &[], 10, None, &[], None).await.unwrap_err();
        assert!(err.to_string().contains("exceeds"));
    }

    #[tokio::test]
    async fn test_run_dunder_attribute_denied() {
        let err = run("x = (1).__class__", Scope::new(), &no_tools(), &[], 2000, None, &[], None)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("dunder"));
    }

    #[tokio::test]
    async fn test_run_list_append_mutates_in_place() {
        let source = "items = []\nitems.append(1)\nitems.append(2)\nfinal_answer(items)";
        let (outcome, _) = run(source, Scope::new(), &no_tools(), &[], 2000, None, &[], None).await.unwrap();
        match outcome {
            Outcome::FinalAnswer(v) => assert_eq!(v.to_json(), json!([1, 2])),
            Outcome::Completed(_) => panic!("expected final answer"),
        }
    }

    #[tokio::test]
    async fn test_run_tuple_literal_and_unpacking() {
        let source = "point = (1, 2)\na, b = point\nfinal_answer(a + b)";
        let (outcome, _) = run(source, Scope::new(), &no_tools(), &[], 2000, None, &[], None).await.unwrap();
        match outcome {
            Outcome::FinalAnswer(v) => assert_eq!(v.to_json(), json!(3)),
            Outcome::Completed(_) => panic!("expected final answer"),
        }
    }

    #[tokio::test]
    async fn test_run_tuple_subscript_assignment_rejected() {
        let err = run("t = (1, 2)\nt[0] = 5", Scope::new(), &no_tools(), &[], 2000, None, &[], None)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("does not support item assignment"));
    }

    #[tokio::test]
    async fn test_run_ternary_expression() {
        let source = "x = 10\nfinal_answer('big' if x > 5 else 'small')";
        let (outcome, _) = run(source, Scope::new(), &no_tools(), &[], 2000, None, &[], None).await.unwrap();
        match outcome {
            Outcome::FinalAnswer(v) => assert_eq!(v.to_json(), json!("big")),
            Outcome::Completed(_) => panic!("expected final answer"),
        }
    }

    #[tokio::test]
    async fn test_run_dict_comprehension() {
        let source = "squares = {x: x * x for x in range(3)}\nfinal_answer(squares)";
        let (outcome, _) = run(source, Scope::new(), &no_tools(), &[], 2000, None, &[], None).await.unwrap();
        match outcome {
            Outcome::FinalAnswer(v) => assert_eq!(v.to_json(), json!({"0": 0, "1": 1, "2": 4})),
            Outcome::Completed(_) => panic!("expected final answer"),
        }
    }

    #[tokio::test]
    async fn test_run_await_expression_is_passthrough() {
        let source = "final_answer(await 5)";
        let (outcome, _) = run(source, Scope::new(), &no_tools(), &[], 2000, None, &[], None).await.unwrap();
        match outcome {
            Outcome::FinalAnswer(v) => assert_eq!(v.to_json(), json!(5)),
            Outcome::Completed(_) => panic!("expected final answer"),
        }
    }

    #[tokio::test]
    async fn test_run_try_except_catches_and_binds_error() {
        let source = "try:\n    raise ZeroDivisionError('division by zero')\nexcept ZeroDivisionError as e:\n    final_answer('caught')";
        let (outcome, _) = run(source, Scope::new(), &no_tools(), &[], 2000, None, &[], None).await.unwrap();
        match outcome {
            Outcome::FinalAnswer(v) => assert_eq!(v.to_json(), json!("caught")),
            Outcome::Completed(_) => panic!("expected final answer"),
        }
    }

    #[tokio::test]
    async fn test_run_try_finally_always_runs() {
        let source =
            "log = []\ntry:\n    log.append(1)\n    raise Exception('boom')\nexcept Exception:\n    log.append(2)\nfinally:\n    log.append(3)\nfinal_answer(log)";
        let (outcome, _) = run(source, Scope::new(), &no_tools(), &[], 2000, None, &[], None).await.unwrap();
        match outcome {
            Outcome::FinalAnswer(v) => assert_eq!(v.to_json(), json!([1, 2, 3])),
            Outcome::Completed(_) => panic!("expected final answer"),
        }
    }

    #[tokio::test]
    async fn test_run_unhandled_exception_type_propagates() {
        let source = "try:\n    raise ValueError('bad')\nexcept KeyError:\n    pass";
        let err = run(source, Scope::new(), &no_tools(), &[], 2000, None, &[], None)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("bad"));
    }

    #[tokio::test]
    async fn test_run_with_binds_context_value() {
        let source = "with 42 as n:\n    final_answer(n)";
        let (outcome, _) = run(source, Scope::new(), &no_tools(), &[], 2000, None, &[], None).await.unwrap();
        match outcome {
            Outcome::FinalAnswer(v) => assert_eq!(v.to_json(), json!(42)),
            Outcome::Completed(_) => panic!("expected final answer"),
        }
    }

    #[tokio::test]
    async fn test_run_set_comprehension_dedupes_nothing_but_evaluates() {
        let source = "result = {x for x in [1, 1, 2]}\nfinal_answer(result)";
        let (outcome, _) = run(source, Scope::new(), &no_tools(), &[], 2000, None, &[], None).await.unwrap();
        match outcome {
            Outcome::FinalAnswer(v) => assert_eq!(v.to_json(), json!([1, 1, 2])),
            Outcome::Completed(_) => panic!("expected final answer"),
        }
    }

    #[tokio::test]
    async fn test_run_rejects_class_definition() {
        let err = run("class Foo:\n    pass", Scope::new(), &no_tools(), &[], 2000, None, &[], None)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("class definitions are not supported"));
    }

    #[tokio::test]
    async fn test_run_multi_tool_use_parallel_envelope() {
        let mut tools: HashMap<String, Arc<Tool>> = HashMap::new();
        tools.insert(
            "ping".to_string(),
            Arc::new(crate::tool("ping", "echoes n").build(|args| async move {
                Ok(args.get("arg0").cloned().unwrap_or(json!(null)))
            })),
        );
        tools.insert(
            "echo".to_string(),
            Arc::new(crate::tool("echo", "echoes s").build(|args| async move {
                Ok(args.get("arg0").cloned().unwrap_or(json!(null)))
            })),
        );
        let source = r#"
from multi_tool_use import parallel
r = parallel({"tool_uses": [
    {"recipient_name": "functions.ping", "parameters": {"arg0": 1}},
    {"recipient_name": "functions.echo", "parameters": {"arg0": "ok"}}
]})
final_answer(r)
"#;
        let (outcome, _) = run(source, Scope::new(), &tools, &[], 2000, None, &[], None).await.unwrap();
        match outcome {
            Outcome::FinalAnswer(v) => {
                let json = v.to_json();
                assert_eq!(json["total_calls"], json!(2));
                assert_eq!(json["successful_calls"], json!(2));
                assert_eq!(json["failed_calls"], json!(0));
                assert_eq!(json["results"].as_array().unwrap().len(), 2);
                assert_eq!(json["results"][0]["recipient_name"], json!("functions.ping"));
                assert_eq!(json["results"][0]["success"], json!(true));
                assert_eq!(json["results"][1]["recipient_name"], json!("functions.echo"));
            }
            Outcome::Completed(_) => panic!("expected final answer"),
        }
    }

    #[tokio::test]
    async fn test_run_multi_tool_use_parallel_captures_per_entry_failure() {
        let mut tools: HashMap<String, Arc<Tool>> = HashMap::new();
        tools.insert(
            "ping".to_string(),
            Arc::new(crate::tool("ping", "echoes n").build(|args| async move {
                Ok(args.get("arg0").cloned().unwrap_or(json!(null)))
            })),
        );
        let source = r#"
from multi_tool_use import parallel
r = parallel({"tool_uses": [
    {"recipient_name": "functions.ping", "parameters": {"arg0": 1}},
    {"recipient_name": "functions.missing", "parameters": {}}
]})
final_answer(r)
"#;
        let (outcome, _) = run(source, Scope::new(), &tools, &[], 2000, None, &[], None).await.unwrap();
        match outcome {
            Outcome::FinalAnswer(v) => {
                let json = v.to_json();
                assert_eq!(json["total_calls"], json!(2));
                assert_eq!(json["successful_calls"], json!(1));
                assert_eq!(json["failed_calls"], json!(1));
                assert_eq!(json["results"][0]["success"], json!(true));
                assert_eq!(json["results"][1]["success"], json!(false));
                assert!(json["results"][1]["error"].as_str().unwrap().contains("unknown tool"));
            }
            Outcome::Completed(_) => panic!("expected final answer"),
        }
    }

    #[tokio::test]
    async fn test_run_passes_state_snapshot_to_needs_state_tool() {
        use crate::state::State;
        let mut tools: HashMap<String, Arc<Tool>> = HashMap::new();
        tools.insert(
            "peek".to_string(),
            Arc::new(
                crate::tool("peek", "reads the live state snapshot")
                    .needs_state()
                    .build(|args| async move {
                        Ok(args.get("__state__").cloned().unwrap_or(json!(null)))
                    }),
            ),
        );
        let mut state = State::new();
        state.set("x", json!(7));
        let source = "final_answer(peek())";
        let (outcome, _) = run(source, Scope::new(), &tools, &[], 2000, None, &[], Some(&state))
            .await
            .unwrap();
        match outcome {
            Outcome::FinalAnswer(v) => {
                assert_eq!(v.to_json()["variables"]["x"], json!(7));
            }
            Outcome::Completed(_) => panic!("expected final answer"),
        }
    }
}
