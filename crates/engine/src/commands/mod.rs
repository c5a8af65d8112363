mod envelope;
mod guard;
mod window;

pub use envelope::{CommandEnvelope, CommandKind, CommandPayload};
pub use guard::{
    CommandOptions, CommandOutcome, CommandReplayGuard, CommandSpawn, Navigation, Toggle,
};
pub use window::{RecentCommandWindow, DEFAULT_RECENT_COMMAND_CAPACITY};
