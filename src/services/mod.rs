//! Orchestration services between the HTTP/voice surfaces and the agent runtime

pub mod chat;
pub mod diagnostics;
pub mod sanitize;
pub mod translator;
pub mod voice;

pub use chat::{ChatReply, ChatService};
pub use diagnostics::{DiagnosticsReport, DiagnosticsService};
pub use translator::{ChatDelta, ChatDeltaStream, FrameStream, StreamFrame};
pub use voice::VoiceSessionBridge;
