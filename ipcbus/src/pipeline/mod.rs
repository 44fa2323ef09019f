//! The bidirectional handler pipeline (§4.6).
//!
//! A named chain of handlers through which every inbound and outbound
//! message passes. Per the arena REDESIGN FLAG in §9, this is not a
//! pointer-linked list: entries live in a slab addressed by stable index,
//! with `prev`/`next` stored as indices into that slab and a name→index
//! side map for lookup. Removing an entry tombstones its slot rather than
//! shifting anything, so no other entry's index ever changes.

pub mod context;

use std::collections::HashMap;

use async_lock::RwLock;

use crate::message::Message;
use crate::{Error, Result};

pub use context::{Context, Direction, Event, Handler, Outcome};

type HandlerIndex = usize;

struct Slot {
    name: String,
    handler: Box<dyn Handler>,
    prev: Option<HandlerIndex>,
    next: Option<HandlerIndex>,
}

struct Inner {
    slots: Vec<Option<Slot>>,
    by_name: HashMap<String, HandlerIndex>,
    head: Option<HandlerIndex>,
    tail: Option<HandlerIndex>,
}

impl Inner {
    fn new() -> Self {
        Inner { slots: Vec::new(), by_name: HashMap::new(), head: None, tail: None }
    }

    fn insert_slot(&mut self, name: String, handler: Box<dyn Handler>) -> HandlerIndex {
        if let Some(free) = self.slots.iter().position(|s| s.is_none()) {
            self.slots[free] = Some(Slot { name, handler, prev: None, next: None });
            free
        } else {
            self.slots.push(Some(Slot { name, handler, prev: None, next: None }));
            self.slots.len() - 1
        }
    }

    fn link_last(&mut self, idx: HandlerIndex) {
        if let Some(tail) = self.tail {
            self.slots[tail].as_mut().expect("tail slot present").next = Some(idx);
            self.slots[idx].as_mut().expect("just inserted").prev = Some(tail);
        } else {
            self.head = Some(idx);
        }
        self.tail = Some(idx);
    }

    fn link_before(&mut self, target: HandlerIndex, idx: HandlerIndex) {
        let prev = self.slots[target].as_ref().expect("target present").prev;
        self.slots[idx].as_mut().expect("just inserted").next = Some(target);
        self.slots[idx].as_mut().expect("just inserted").prev = prev;
        self.slots[target].as_mut().expect("target present").prev = Some(idx);
        match prev {
            Some(p) => self.slots[p].as_mut().expect("prev present").next = Some(idx),
            None => self.head = Some(idx),
        }
    }

    fn unlink(&mut self, idx: HandlerIndex) {
        let (prev, next) = {
            let slot = self.slots[idx].as_ref().expect("present");
            (slot.prev, slot.next)
        };
        match prev {
            Some(p) => self.slots[p].as_mut().expect("prev present").next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.slots[n].as_mut().expect("next present").prev = prev,
            None => self.tail = prev,
        }
    }
}

/// The bidirectional handler chain a connection drives on its single I/O
/// task (§5, §4.6). Structural mutation takes the writer lock; dispatch
/// takes the reader lock for the duration of one event, so handlers can
/// only mutate the pipeline via separately scheduled work, never while an
/// event is being walked.
pub struct Pipeline {
    inner: RwLock<Inner>,
}

impl Pipeline {
    pub fn new() -> Self {
        Pipeline { inner: RwLock::new(Inner::new()) }
    }

    /// Append a handler at the tail. Errs if `name` is already in use.
    pub async fn add_last(&self, name: impl Into<String>, handler: impl Handler) -> Result<()> {
        let name = name.into();
        let mut inner = self.inner.write().await;
        if inner.by_name.contains_key(&name) {
            return Err(Error::DuplicateHandlerName(name));
        }
        let idx = inner.insert_slot(name.clone(), Box::new(handler));
        inner.link_last(idx);
        inner.by_name.insert(name, idx);
        Ok(())
    }

    /// Insert a handler immediately before the one named `target`.
    pub async fn add_before(&self, target: &str, name: impl Into<String>, handler: impl Handler) -> Result<()> {
        let name = name.into();
        let mut inner = self.inner.write().await;
        if inner.by_name.contains_key(&name) {
            return Err(Error::DuplicateHandlerName(name));
        }
        let target_idx = *inner.by_name.get(target).ok_or_else(|| Error::NoSuchHandler(target.to_owned()))?;
        let idx = inner.insert_slot(name.clone(), Box::new(handler));
        inner.link_before(target_idx, idx);
        inner.by_name.insert(name, idx);
        Ok(())
    }

    /// Swap the handler named `old` for a new handler, keeping its position
    /// and name.
    pub async fn replace(&self, old: &str, handler: impl Handler) -> Result<()> {
        let mut inner = self.inner.write().await;
        let idx = *inner.by_name.get(old).ok_or_else(|| Error::NoSuchHandler(old.to_owned()))?;
        inner.slots[idx].as_mut().expect("present").handler = Box::new(handler);
        Ok(())
    }

    /// Remove the handler named `name` from the chain.
    pub async fn remove(&self, name: &str) -> Result<()> {
        let mut inner = self.inner.write().await;
        let idx = inner.by_name.remove(name).ok_or_else(|| Error::NoSuchHandler(name.to_owned()))?;
        inner.unlink(idx);
        inner.slots[idx] = None;
        Ok(())
    }

    /// Run `event` head-to-tail (inbound, §4.4's "pipeline head → user
    /// handlers → tail") or tail-to-head (outbound), returning whatever
    /// event remains once every handler has had a chance at it, or `None`
    /// if some handler consumed it. A `Failure` a handler raises keeps
    /// propagating through the remaining handlers in the same direction —
    /// it is not treated as aborting the walk (§4.6: "the failure continues
    /// propagating").
    pub async fn dispatch_event(&self, direction: Direction, mut event: Event) -> Option<Event> {
        let inner = self.inner.read().await;
        let mut cursor = match direction {
            Direction::Inbound => inner.head,
            Direction::Outbound => inner.tail,
        };
        while let Some(idx) = cursor {
            let slot = inner.slots[idx].as_ref().expect("live index");
            let ctx = Context { direction, handler_name: &slot.name };
            match slot.handler.on_event(&ctx, event).await {
                Outcome::Forward(next) => event = next,
                Outcome::Consume => return None,
            }
            cursor = match direction {
                Direction::Inbound => slot.next,
                Direction::Outbound => slot.prev,
            };
        }
        Some(event)
    }

    /// Convenience wrapper around [`Pipeline::dispatch_event`] for the
    /// common case of routing a single `Message`: a `Failure` that
    /// survives to the end of the chain becomes `Err`, any other surviving
    /// event kind (a stray `ConnectionActive`/`ConnectionInactive`/
    /// `UserEvent` nobody consumed) is dropped with a log.
    pub async fn dispatch(&self, direction: Direction, message: Message) -> Result<Option<Message>> {
        match self.dispatch_event(direction, Event::Message(message)).await {
            Some(Event::Message(message)) => Ok(Some(message)),
            Some(Event::Failure(error)) => Err(error),
            Some(_) | None => Ok(None),
        }
    }

    /// Fire a connection-lifecycle or user-defined event inbound, for
    /// handlers that care about it; no message payload, so there's nothing
    /// to hand back to a caller (§4.6).
    pub async fn notify(&self, event: Event) {
        self.dispatch_event(Direction::Inbound, event).await;
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ipcbus_names::{BusName, InterfaceName, MemberName};
    use ipcbus_types::{LittleEndian, ObjectPath};

    struct Echo;

    #[async_trait::async_trait]
    impl Handler for Echo {
        async fn on_event(&self, _ctx: &Context<'_>, event: Event) -> Outcome {
            Outcome::Forward(event)
        }
    }

    struct Swallow;

    #[async_trait::async_trait]
    impl Handler for Swallow {
        async fn on_event(&self, _ctx: &Context<'_>, _event: Event) -> Outcome {
            Outcome::Consume
        }
    }

    struct AlwaysFails;

    #[async_trait::async_trait]
    impl Handler for AlwaysFails {
        async fn on_event(&self, ctx: &Context<'_>, _event: Event) -> Outcome {
            ctx.propagate_failure(Error::Timeout)
        }
    }

    fn sample_message() -> Message {
        Message::method_call::<LittleEndian>(
            1,
            ObjectPath::try_from("/org/freedesktop/DBus").unwrap(),
            Some(InterfaceName::try_from("org.freedesktop.DBus").unwrap()),
            MemberName::try_from("Hello").unwrap(),
            Some(BusName::try_from("org.freedesktop.DBus").unwrap()),
            crate::message::Flags::empty(),
            &[],
        )
        .unwrap()
    }

    #[tokio::test]
    async fn duplicate_name_rejected() {
        let pipeline = Pipeline::new();
        pipeline.add_last("a", Echo).await.unwrap();
        assert!(matches!(pipeline.add_last("a", Echo).await, Err(Error::DuplicateHandlerName(_))));
    }

    #[tokio::test]
    async fn add_before_inserts_ahead_of_target() {
        let pipeline = Pipeline::new();
        pipeline.add_last("tail", Swallow).await.unwrap();
        pipeline.add_before("tail", "head", Echo).await.unwrap();
        let result = pipeline.dispatch(Direction::Inbound, sample_message()).await.unwrap();
        // `head` forwards, `tail` swallows: nothing should come out.
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn removed_handler_is_skipped() {
        let pipeline = Pipeline::new();
        pipeline.add_last("a", Swallow).await.unwrap();
        pipeline.remove("a").await.unwrap();
        let result = pipeline.dispatch(Direction::Inbound, sample_message()).await.unwrap();
        assert!(result.is_some());
    }

    #[tokio::test]
    async fn failure_continues_propagating_past_later_handlers() {
        let pipeline = Pipeline::new();
        pipeline.add_last("faulty", AlwaysFails).await.unwrap();
        // `echo` still runs after `faulty` turned the event into a
        // `Failure`; it forwards whatever it's handed, so the failure
        // reaches the end of the chain rather than aborting the walk.
        pipeline.add_last("echo", Echo).await.unwrap();
        let err = pipeline.dispatch(Direction::Inbound, sample_message()).await.unwrap_err();
        assert!(matches!(err, Error::Timeout));
    }

    struct RecordsLifecycle(std::sync::Arc<std::sync::atomic::AtomicUsize>);

    #[async_trait::async_trait]
    impl Handler for RecordsLifecycle {
        async fn on_event(&self, _ctx: &Context<'_>, event: Event) -> Outcome {
            if matches!(event, Event::ConnectionActive) {
                self.0.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            }
            Outcome::Forward(event)
        }
    }

    #[tokio::test]
    async fn connection_active_reaches_handlers() {
        let counter = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let pipeline = Pipeline::new();
        pipeline.add_last("lifecycle", RecordsLifecycle(counter.clone())).await.unwrap();
        pipeline.notify(Event::ConnectionActive).await;
        assert_eq!(counter.load(std::sync::atomic::Ordering::SeqCst), 1);
    }
}
