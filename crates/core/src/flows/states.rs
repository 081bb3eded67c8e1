use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TurnState {
    Received,
    ContextBuilt,
    ModelInvoked,
    ToolsDispatched,
    DirectReply,
    Persisted,
    Done,
    Errored,
}

impl TurnState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Errored)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::ContextBuilt => "context_built",
            Self::ModelInvoked => "model_invoked",
            Self::ToolsDispatched => "tools_dispatched",
            Self::DirectReply => "direct_reply",
            Self::Persisted => "persisted",
            Self::Done => "done",
            Self::Errored => "errored",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TurnEvent {
    BlankInbound,
    ContextAssembled,
    CompletionReceived,
    CompletionFailed,
    EmptyCompletion,
    ToolCallsRequested,
    NoToolCalls,
    TurnRecorded,
    Finished,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TurnAction {
    BuildContext,
    InvokeModel,
    SendApology,
    DispatchTools,
    SendDirectReply,
    PersistTurn,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub from: TurnState,
    pub to: TurnState,
    pub event: TurnEvent,
    pub actions: Vec<TurnAction>,
}
