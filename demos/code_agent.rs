//! Runs an agent that solves a small multi-step task by writing code rather
//! than issuing native tool calls. Point `--base-url`/the `BASE_URL` env var
//! at any OpenAI-compatible local server (LM Studio, Ollama, llama.cpp, vLLM).

use minion_rt::{tool, Agent, AgentOptions};
use serde_json::json;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let base_url =
        std::env::var("BASE_URL").unwrap_or_else(|_| "http://localhost:1234/v1".to_string());
    let model = std::env::var("MODEL").unwrap_or_else(|_| "qwen2.5-32b-instruct".to_string());

    let add = tool("add", "Add two numbers")
        .param("a", "number")
        .param("b", "number")
        .build(|args| async move {
            let a = args["a"].as_f64().unwrap_or(0.0);
            let b = args["b"].as_f64().unwrap_or(0.0);
            Ok(json!(a + b))
        });

    let multiply = tool("multiply", "Multiply two numbers")
        .param("a", "number")
        .param("b", "number")
        .build(|args| async move {
            let a = args["a"].as_f64().unwrap_or(0.0);
            let b = args["b"].as_f64().unwrap_or(0.0);
            Ok(json!(a * b))
        });

    let options = AgentOptions::builder()
        .system_prompt("You are a careful assistant that solves tasks step by step.")
        .model(model)
        .base_url(base_url)
        .tool(add)
        .tool(multiply)
        .max_steps(8)
        .build()?;

    let mut agent = Agent::new(options);
    let response = agent
        .run("What's 2+2, then multiply that result by 10? Call final_answer with the number.")
        .await?;

    println!("final answer: {:?}", response.final_answer);
    println!("steps taken:  {}", response.steps_taken);
    if !response.errors.is_empty() {
        println!("non-fatal errors along the way: {:?}", response.errors);
    }

    Ok(())
}
