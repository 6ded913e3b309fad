use crate::error::PipelineError;
use crate::traits::FetchedMessage;
use futures::StreamExt;
use futures::stream::BoxStream;

/// Raw event source of a fetch: one item per message, an `Err` item is the
/// terminal error, and the end of the stream is the completion event.
pub type FetchEvents<'a> = BoxStream<'a, Result<FetchedMessage, PipelineError>>;

/// An in-flight FETCH command.
///
/// Message events are read with [`FetchHandle::next_message`]; the command
/// itself resolves exactly once, through [`FetchHandle::await_completion`].
/// Nothing is polled after the terminal event.
pub struct FetchHandle<'a> {
    events: FetchEvents<'a>,
    outcome: Option<Result<(), PipelineError>>,
}

impl<'a> FetchHandle<'a> {
    pub fn new(events: FetchEvents<'a>) -> Self {
        Self {
            events,
            outcome: None,
        }
    }

    /// Next message event, or `None` once the terminal event has been seen.
    pub async fn next_message(&mut self) -> Option<FetchedMessage> {
        if self.outcome.is_some() {
            return None;
        }

        match self.events.next().await {
            Some(Ok(message)) => Some(message),
            Some(Err(e)) => {
                self.outcome = Some(Err(e));
                None
            }
            None => {
                self.outcome = Some(Ok(()));
                None
            }
        }
    }

    /// Drains unobserved events, then returns the terminal outcome.
    pub async fn await_completion(mut self) -> Result<(), PipelineError> {
        while self.next_message().await.is_some() {}
        self.outcome.unwrap_or(Ok(()))
    }
}
