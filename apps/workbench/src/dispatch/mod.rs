// Action dispatch: one FIFO queue per artifact, executed against a Sandbox.

pub mod dispatcher;
pub mod memory;
pub mod sandbox;

pub use dispatcher::{ActionDispatcher, ActionOutcome, ActionStatus, OutcomeListener};
pub use memory::MemorySandbox;
pub use sandbox::{LocalSandbox, Sandbox, SandboxError};
