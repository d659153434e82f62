use chess_common::GamePosition;
use engine::{OptionValue, SearchLimit};
use tokio::sync::oneshot;

use crate::descriptor::EngineDescriptor;

/// Requests queued to a worker's runtime, executed strictly in order.
#[derive(Debug)]
pub(crate) enum WorkerCommand {
    Start(Box<EngineDescriptor>),
    /// Quit the session. The ack reports whether a session was running.
    Stop {
        ack: Option<oneshot::Sender<bool>>,
    },
    Analyze {
        position: GamePosition,
        multipv: u32,
        limit: SearchLimit,
        generation: u64,
    },
    BestMove {
        position: GamePosition,
        limit: SearchLimit,
        generation: u64,
    },
    UpdateOption {
        name: String,
        value: OptionValue,
    },
    ApplyPersonality(Vec<String>),
    /// Stop the session and leave the runtime.
    Exit,
}
