//! Turn-taking control: phases, agent commands, and the coordinator.

pub mod command;
pub mod coordinator;
pub mod phase;

pub use command::{AgentCommand, VerificationReport};
pub use coordinator::{CoordinatorConfig, TurnCoordinator, TurnEvent};
pub use phase::TurnPhase;
