//! Sub-Agent Operations and the persistent Agent Loop.
//!
//! Spawning, listing, killing, and messaging sibling agents is driven
//! entirely through the [Coordination Broker](agentrt_broker); this crate
//! holds no tool-registry or LLM-turn logic of its own. A spawned child
//! re-runs the same binary in `--subagent` mode (see [`child`]), which
//! wires its own orchestrator turn loop and a broker-aware collaboration
//! channel — that wiring lives in the binary/orchestrator crate, not here.

pub mod agent_loop;
pub mod child;
pub mod manager;

pub use agent_loop::{run as run_agent_loop, AgentLoopConfig, HandlerOutcome, TaskHandler};
pub use child::ChildInvocation;
pub use manager::{AgentStatusDetail, AgentSummary, SpawnOptions, SubAgentManager};
