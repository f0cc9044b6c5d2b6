pub use channel::{ChannelEvent, MessageSink, ReplicationChannel};
pub use progression::{ActivationRefused, PlayerProgression, ProgressionError, Role};

pub mod buffer;
pub mod channel;
pub mod modifiers;
pub mod persist;
pub mod progression;
