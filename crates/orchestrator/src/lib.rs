//! Wires the tool registry, provider router, session store, and broker
//! together into the turn loop.

pub mod collab;
pub mod git_lock;
pub mod interrupt;
pub mod retry;
pub mod runtime;
pub mod system_prompt;
pub mod turn;

pub use collab::{BrokerCollaborationChannel, TerminalCollaborationChannel};
pub use git_lock::BrokerGitLock;
pub use interrupt::{interrupt_message, watch_ctrl_c, InterruptFlag};
pub use retry::with_rate_limit_retry;
pub use runtime::Runtime;
pub use system_prompt::{build as build_system_prompt, SystemPromptInputs};
pub use turn::{run_turn, TurnDeps, TurnOutcome};
