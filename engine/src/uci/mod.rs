pub mod parser;
pub mod session;

pub use parser::{parse_uci_message, RawInfo, UciMessage};
pub use session::UciSession;

#[derive(Debug, thiserror::Error)]
pub enum UciError {
    #[error("Malformed UCI message: {0}")]
    MalformedMessage(String),
    #[error("Unknown UCI message: {0}")]
    UnknownMessage(String),
}
