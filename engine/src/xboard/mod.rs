//! WinBoard/XBoard line protocol.
//!
//! There is no request/response pairing here: the engine prints whenever it
//! likes, so a reader task classifies every line as it arrives and the
//! session consumes the resulting [`LegacyEvent`]s.

pub mod parser;
pub mod session;

pub use parser::{classify_line, SearchPhase, ThinkingLine, XboardLine};
pub use session::{LegacyEvent, LegacyTimings, XboardSession, XboardState};
