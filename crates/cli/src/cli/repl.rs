//! Interactive session: a `rustyline`-backed read-eval-print loop that
//! keeps driving `run_turn` over the same session until the user exits.

use agentrt_domain::config::Config;
use agentrt_orchestrator::{InterruptFlag, TurnDeps};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

const SESSION_KEY: &str = "cli:chat";

pub async fn run(config: Config) -> anyhow::Result<()> {
    let project_root = std::env::current_dir()?;
    let llm_config = config.llm.clone();
    let runtime = agentrt_orchestrator::Runtime::bootstrap(&project_root, SESSION_KEY, config, &llm_config).await?;

    let mut session = crate::bootstrap::resolve_or_create(&runtime.sessions, SESSION_KEY, &project_root.display().to_string()).await?;

    let interrupt = InterruptFlag::new();
    agentrt_orchestrator::watch_ctrl_c(interrupt.clone());

    println!("agentrt — interactive session ({SESSION_KEY}). Type 'exit' or Ctrl-D to quit.");

    let mut editor = DefaultEditor::new()?;
    loop {
        let line = match editor.readline("> ") {
            Ok(line) => line,
            Err(ReadlineError::Eof) | Err(ReadlineError::Interrupted) => break,
            Err(e) => return Err(e.into()),
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "exit" || line == "quit" {
            break;
        }
        let _ = editor.add_history_entry(line);

        let ltm_top = runtime.tool_ctx.ltm.top_n(5).await.unwrap_or_default();
        crate::bootstrap::prime_system_message(&mut session, &runtime.registry, &ltm_top, false);

        let deps = TurnDeps { router: &runtime.router, registry: &runtime.registry, tool_ctx: &runtime.tool_ctx, config: &runtime.config };
        match agentrt_orchestrator::run_turn(&mut session, line, &deps, &interrupt).await {
            Ok(outcome) => {
                println!("{}", outcome.final_text);
                if outcome.truncated {
                    eprintln!("(stopped after {} iterations without a final answer)", outcome.iterations);
                }
            }
            Err(e) => eprintln!("error: {e}"),
        }

        if let Err(e) = runtime.sessions.save(&mut session).await {
            tracing::warn!(error = %e, "failed to persist session after turn");
        }
    }

    runtime.sessions.save(&mut session).await?;
    Ok(())
}
