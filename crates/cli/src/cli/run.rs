//! `agentrt run "message"` — one-shot execution: boot the runtime, run
//! one turn, print the response, exit.

use agentrt_domain::config::Config;
use agentrt_orchestrator::{InterruptFlag, TurnDeps};

pub async fn run(config: Config, message: String, session_key: String, model: Option<String>, json_output: bool) -> anyhow::Result<()> {
    let project_root = std::env::current_dir()?;
    let llm_config = config.llm.clone();
    let mut runtime = agentrt_orchestrator::Runtime::bootstrap(&project_root, &session_key, config, &llm_config).await?;

    let mut session = crate::bootstrap::resolve_or_create(&runtime.sessions, &session_key, &project_root.display().to_string()).await?;

    let ltm_top = runtime.tool_ctx.ltm.top_n(5).await.unwrap_or_default();
    crate::bootstrap::prime_system_message(&mut session, &runtime.registry, &ltm_top, false);

    if let Some(model) = model {
        runtime.config.model = model;
    }

    let deps = TurnDeps { router: &runtime.router, registry: &runtime.registry, tool_ctx: &runtime.tool_ctx, config: &runtime.config };
    let interrupt = InterruptFlag::new();
    agentrt_orchestrator::watch_ctrl_c(interrupt.clone());

    let outcome = agentrt_orchestrator::run_turn(&mut session, &message, &deps, &interrupt).await;

    runtime.sessions.save(&mut session).await?;

    match outcome {
        Ok(outcome) => {
            if json_output {
                println!("{}", serde_json::to_string_pretty(&serde_json::json!({
                    "final_text": outcome.final_text,
                    "iterations": outcome.iterations,
                    "truncated": outcome.truncated,
                }))?);
            } else {
                println!("{}", outcome.final_text);
                if outcome.truncated {
                    eprintln!("(stopped after {} iterations without a final answer)", outcome.iterations);
                }
            }
            Ok(())
        }
        Err(e) => {
            tracing::error!(error = %e, "turn failed");
            eprintln!("error: {e}");
            std::process::exit(1);
        }
    }
}
