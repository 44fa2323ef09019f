//! The per-direction view a handler sees while it runs (§4.6).

use crate::message::Message;
use crate::Error;

/// An event flowing through the pipeline in a given [`Direction`] (§4.6).
///
/// Inbound traffic can carry `Message`, `Failure`, `ConnectionActive`,
/// `ConnectionInactive` or `UserEvent`; outbound traffic only ever carries
/// `Message` or `Failure` (outbound has no connection-lifecycle or
/// user-event notion of its own — those only ever originate inbound, from
/// the connection runtime). The split isn't enforced by the type itself,
/// mirroring how a handler is free to fire any event in either direction;
/// [`Pipeline::dispatch`](super::Pipeline::dispatch) just walks whatever it
/// is given.
pub enum Event {
    /// A message working its way through the chain.
    Message(Message),
    /// Something upstream failed; carries the error that caused it. Per
    /// the REDESIGN FLAG resolving the source's exception-driven error
    /// flow, this is how a handler failure is represented as it continues
    /// propagating to the next context, rather than unwinding a call
    /// stack.
    Failure(Error),
    /// The connection just became usable (SASL + Hello() both completed).
    ConnectionActive,
    /// The connection is gone; no further events will follow.
    ConnectionInactive,
    /// An application-defined notification with no message payload.
    UserEvent(String),
}

/// What a handler decides to do with an event as it passes through.
pub enum Outcome {
    /// Let the (possibly transformed) event continue to the next handler.
    Forward(Event),
    /// Stop traversal here; no downstream handler (nor the transport, for
    /// an outbound event short-circuited this way) sees the event.
    Consume,
}

/// The direction an event is travelling, named for clarity at call sites.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Frame splitter → pipeline head → user handlers → tail.
    Inbound,
    /// Caller → pipeline tail → user handlers → head → encoder.
    Outbound,
}

/// A handler's view of the event it's processing: which direction it
/// arrived from and which handler (by name) is asking.
pub struct Context<'a> {
    pub direction: Direction,
    pub handler_name: &'a str,
}

impl<'a> Context<'a> {
    /// Turn `error` into a `Failure` event continuing in this context's own
    /// direction, the single `propagate_failure` helper the REDESIGN FLAG
    /// asks for in place of a thrown exception.
    pub fn propagate_failure(&self, error: Error) -> Outcome {
        Outcome::Forward(Event::Failure(error))
    }
}

/// A bidirectional pipeline handler (§4.6). Implementors see every event
/// kind flowing in both directions and decide per event whether to
/// forward it (possibly transformed), or consume it outright.
#[async_trait::async_trait]
pub trait Handler: Send + Sync + 'static {
    async fn on_event(&self, ctx: &Context<'_>, event: Event) -> Outcome;
}
