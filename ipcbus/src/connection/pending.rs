//! Pending-reply table (§4.7, §5, §8): correlates inbound METHOD_RETURN /
//! ERROR messages with the outbound call that's awaiting them.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use event_listener::{Event, EventListener};
use tracing::{debug, trace};

use crate::message::Message;
use crate::{Error, Result};

#[derive(Debug)]
enum Outcome {
    Pending,
    Ready(Result<Message>),
}

struct Slot {
    outcome: Outcome,
    deadline: Instant,
    event: Event,
}

/// Owns every in-flight outbound call's completion slot, keyed by serial.
#[derive(Default)]
pub struct PendingReplies {
    slots: Mutex<HashMap<u32, Slot>>,
}

impl PendingReplies {
    pub fn new() -> Self {
        PendingReplies { slots: Mutex::new(HashMap::new()) }
    }

    /// Register a new outbound call awaiting a reply, with `timeout` from
    /// now.
    pub fn register(&self, serial: u32, timeout: Duration) {
        let mut slots = self.slots.lock().expect("lock poisoned");
        slots.insert(serial, Slot { outcome: Outcome::Pending, deadline: Instant::now() + timeout, event: Event::new() });
    }

    /// Complete the pending entry for `reply_serial` with `result`, if one
    /// is still outstanding. Returns `false` if no matching entry existed
    /// (a duplicate reply, or a reply to a call we never made/already
    /// completed) — per §8, such replies are dropped with a log, not an
    /// error.
    pub fn complete(&self, reply_serial: u32, result: Result<Message>) -> bool {
        let mut slots = self.slots.lock().expect("lock poisoned");
        match slots.get_mut(&reply_serial) {
            Some(slot) => {
                slot.outcome = Outcome::Ready(result);
                slot.event.notify(usize::MAX);
                true
            }
            None => {
                debug!(serial = reply_serial, "dropping reply with no matching pending call");
                false
            }
        }
    }

    /// Await the reply for `serial`. Returns `Error::Timeout` once the
    /// deadline passes; the entry is removed in every case (success,
    /// error reply, or timeout) per §4.7/§8.
    pub async fn wait(&self, serial: u32) -> Result<Message> {
        loop {
            let listener = {
                let mut slots = self.slots.lock().expect("lock poisoned");
                let slot = match slots.get_mut(&serial) {
                    Some(s) => s,
                    None => return Err(Error::Disconnected("pending entry vanished".into())),
                };
                if let Outcome::Ready(_) = &slot.outcome {
                    let slot = slots.remove(&serial).expect("checked above");
                    return match slot.outcome {
                        Outcome::Ready(result) => result,
                        Outcome::Pending => unreachable!(),
                    };
                }
                if Instant::now() >= slot.deadline {
                    slots.remove(&serial);
                    return Err(Error::Timeout);
                }
                slot.event.listen()
            };
            wait_with_deadline(listener, &self.slots, serial).await;
        }
    }

    /// Complete every still-pending entry with an error derived from
    /// `make_error` and remove nothing — callers awaiting `wait` observe
    /// the completion and remove their own entry. Used when the
    /// connection transitions to FAILED (§5, §7).
    pub fn fail_all(&self, make_error: impl Fn() -> Error) {
        let mut slots = self.slots.lock().expect("lock poisoned");
        for slot in slots.values_mut() {
            if matches!(slot.outcome, Outcome::Pending) {
                slot.outcome = Outcome::Ready(Err(make_error()));
                slot.event.notify(usize::MAX);
            }
        }
    }

    /// Remove one entry unconditionally (external cancellation of the
    /// await, §5).
    pub fn cancel(&self, serial: u32) {
        self.slots.lock().expect("lock poisoned").remove(&serial);
    }

    /// Sweep every entry past its deadline, completing each with
    /// [`Error::Timeout`]. Intended to be called periodically by the
    /// connection's background timer.
    pub fn sweep_timeouts(&self) {
        let now = Instant::now();
        let mut slots = self.slots.lock().expect("lock poisoned");
        let expired: Vec<u32> = slots
            .iter()
            .filter(|(_, slot)| matches!(slot.outcome, Outcome::Pending) && now >= slot.deadline)
            .map(|(serial, _)| *serial)
            .collect();
        for serial in expired {
            if let Some(slot) = slots.get_mut(&serial) {
                slot.outcome = Outcome::Ready(Err(Error::Timeout));
                slot.event.notify(usize::MAX);
                trace!(serial, "pending call timed out");
            }
        }
    }
}

async fn wait_with_deadline(listener: EventListener, _slots: &Mutex<HashMap<u32, Slot>>, _serial: u32) {
    listener.await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_reply_is_dropped() {
        let table = PendingReplies::new();
        table.register(5, Duration::from_secs(10));
        let msg = crate::message::Message::method_call::<ipcbus_types::LittleEndian>(
            5,
            ipcbus_types::ObjectPath::try_from("/").unwrap(),
            None,
            ipcbus_names::MemberName::try_from("Ping").unwrap(),
            None,
            crate::message::Flags::empty(),
            &[],
        )
        .unwrap();
        assert!(table.complete(5, Ok(msg.clone())));
        assert!(!table.complete(5, Ok(msg)));
    }

    #[test]
    fn unmatched_reply_returns_false() {
        let table = PendingReplies::new();
        let msg = crate::message::Message::method_call::<ipcbus_types::LittleEndian>(
            1,
            ipcbus_types::ObjectPath::try_from("/").unwrap(),
            None,
            ipcbus_names::MemberName::try_from("Ping").unwrap(),
            None,
            crate::message::Flags::empty(),
            &[],
        )
        .unwrap();
        assert!(!table.complete(99, Ok(msg)));
    }
}
