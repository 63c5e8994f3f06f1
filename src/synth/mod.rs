//! Voice layer: per-note voices, their registries, timbres and the
//! instrument facade that ties them to an engine.

#[cfg(feature = "rtrb")]
pub mod control;
pub mod instrument;
pub mod registry;
pub mod timbre;
pub mod voice;

#[cfg(feature = "rtrb")]
pub use control::{ControlError, VoiceCommand, VoiceController};
pub use instrument::Instrument;
pub use registry::{VoiceId, VoiceRegistry};
pub use timbre::{Osc2Settings, Timbre};
pub use voice::{CancelToken, RenderState, SynthVoice};
