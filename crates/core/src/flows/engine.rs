use thiserror::Error;

use crate::flows::states::{TransitionOutcome, TurnAction, TurnEvent, TurnState};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FlowTransitionError {
    #[error("invalid transition from {state:?} using event {event:?}")]
    InvalidTransition { state: TurnState, event: TurnEvent },
    #[error("turn already finished in {state:?}")]
    AlreadyTerminal { state: TurnState },
}

/// Transition table for one inbound-message turn.
#[derive(Clone, Copy, Debug, Default)]
pub struct TurnFlow;

impl TurnFlow {
    pub fn initial_state(&self) -> TurnState {
        TurnState::Received
    }

    pub fn apply(
        &self,
        current: TurnState,
        event: TurnEvent,
    ) -> Result<TransitionOutcome, FlowTransitionError> {
        use TurnAction::{
            BuildContext, DispatchTools, InvokeModel, PersistTurn, SendApology, SendDirectReply,
        };
        use TurnEvent::{
            BlankInbound, CompletionFailed, CompletionReceived, ContextAssembled, EmptyCompletion,
            Finished, NoToolCalls, ToolCallsRequested, TurnRecorded,
        };
        use TurnState::{
            ContextBuilt, DirectReply, Done, Errored, ModelInvoked, Persisted, Received,
            ToolsDispatched,
        };

        if current.is_terminal() {
            return Err(FlowTransitionError::AlreadyTerminal { state: current });
        }

        let (to, actions) = match (current, event) {
            (Received, BlankInbound) => (Done, vec![]),
            (Received, ContextAssembled) => (ContextBuilt, vec![BuildContext, InvokeModel]),
            (ContextBuilt, CompletionReceived) => (ModelInvoked, vec![]),
            (ContextBuilt, CompletionFailed) | (ContextBuilt, EmptyCompletion) => {
                (Errored, vec![SendApology])
            }
            (ModelInvoked, ToolCallsRequested) => (ToolsDispatched, vec![DispatchTools]),
            (ModelInvoked, NoToolCalls) => (DirectReply, vec![SendDirectReply]),
            (ToolsDispatched, TurnRecorded) | (DirectReply, TurnRecorded) => {
                (Persisted, vec![PersistTurn])
            }
            (Persisted, Finished) => (Done, vec![]),
            _ => return Err(FlowTransitionError::InvalidTransition { state: current, event }),
        };

        Ok(TransitionOutcome { from: current, to, event, actions })
    }
}

/// Carries the current state of one turn and records every applied transition.
#[derive(Clone, Debug)]
pub struct TurnTracker {
    flow: TurnFlow,
    state: TurnState,
    history: Vec<TransitionOutcome>,
}

impl Default for TurnTracker {
    fn default() -> Self {
        let flow = TurnFlow;
        Self { flow, state: flow.initial_state(), history: Vec::new() }
    }
}

impl TurnTracker {
    pub fn state(&self) -> TurnState {
        self.state
    }

    pub fn history(&self) -> &[TransitionOutcome] {
        &self.history
    }

    pub fn advance(&mut self, event: TurnEvent) -> Result<TurnState, FlowTransitionError> {
        let outcome = self.flow.apply(self.state, event)?;
        self.state = outcome.to;
        self.history.push(outcome);
        Ok(self.state)
    }
}

#[cfg(test)]
mod tests {
    use super::{FlowTransitionError, TurnFlow, TurnTracker};
    use crate::flows::states::{TurnAction, TurnEvent, TurnState};

    #[test]
    fn tool_path_walks_to_done() {
        let mut tracker = TurnTracker::default();
        for event in [
            TurnEvent::ContextAssembled,
            TurnEvent::CompletionReceived,
            TurnEvent::ToolCallsRequested,
            TurnEvent::TurnRecorded,
            TurnEvent::Finished,
        ] {
            tracker.advance(event).expect("valid transition");
        }

        assert_eq!(tracker.state(), TurnState::Done);
        let visited: Vec<TurnState> = tracker.history().iter().map(|step| step.to).collect();
        assert_eq!(
            visited,
            vec![
                TurnState::ContextBuilt,
                TurnState::ModelInvoked,
                TurnState::ToolsDispatched,
                TurnState::Persisted,
                TurnState::Done,
            ]
        );
    }

    #[test]
    fn direct_reply_path_sends_reply_then_persists() {
        let flow = TurnFlow;
        let reply = flow.apply(TurnState::ModelInvoked, TurnEvent::NoToolCalls).expect("valid");
        assert_eq!(reply.to, TurnState::DirectReply);
        assert_eq!(reply.actions, vec![TurnAction::SendDirectReply]);

        let persisted = flow.apply(reply.to, TurnEvent::TurnRecorded).expect("valid");
        assert_eq!(persisted.to, TurnState::Persisted);
    }

    #[test]
    fn completion_failures_end_in_errored_with_apology() {
        let flow = TurnFlow;
        for event in [TurnEvent::CompletionFailed, TurnEvent::EmptyCompletion] {
            let outcome = flow.apply(TurnState::ContextBuilt, event).expect("valid");
            assert_eq!(outcome.to, TurnState::Errored);
            assert_eq!(outcome.actions, vec![TurnAction::SendApology]);
        }
    }

    #[test]
    fn blank_inbound_finishes_without_actions() {
        let outcome = TurnFlow.apply(TurnState::Received, TurnEvent::BlankInbound).expect("valid");
        assert_eq!(outcome.to, TurnState::Done);
        assert!(outcome.actions.is_empty());
    }

    #[test]
    fn skipping_persistence_is_rejected() {
        let error = TurnFlow
            .apply(TurnState::ToolsDispatched, TurnEvent::Finished)
            .expect_err("persist must come first");
        assert_eq!(
            error,
            FlowTransitionError::InvalidTransition {
                state: TurnState::ToolsDispatched,
                event: TurnEvent::Finished,
            }
        );
    }

    #[test]
    fn terminal_states_accept_no_further_events() {
        let mut tracker = TurnTracker::default();
        tracker.advance(TurnEvent::ContextAssembled).expect("valid");
        tracker.advance(TurnEvent::CompletionFailed).expect("valid");

        let error = tracker.advance(TurnEvent::TurnRecorded).expect_err("errored is terminal");
        assert_eq!(error, FlowTransitionError::AlreadyTerminal { state: TurnState::Errored });
        assert_eq!(tracker.state(), TurnState::Errored);
    }
}
