//! Who is owed each SUBACK.
//!
//! Requests are recorded in the order they enter rumqttc's request queue.
//! rumqttc assigns packet ids in that same order and reports each one as
//! `Outgoing::Subscribe`, so SUBACKs can be matched by packet id.

use std::collections::{HashMap, VecDeque};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Owner {
    /// The pending `subscribe` call.
    Caller,
    /// A re-subscription issued by the driver after a reconnect.
    Resubscribe,
}

#[derive(Debug, Default)]
pub(crate) struct SubackLedger {
    queued: VecDeque<Owner>,
    in_flight: HashMap<u16, Owner>,
}

impl SubackLedger {
    /// A SUBSCRIBE request was handed to the client.
    pub(crate) fn queued(&mut self, owner: Owner) {
        self.queued.push_back(owner);
    }

    /// The oldest queued request went out with packet id `pkid`.
    pub(crate) fn sent(&mut self, pkid: u16) {
        if let Some(owner) = self.queued.pop_front() {
            self.in_flight.insert(pkid, owner);
        }
    }

    pub(crate) fn acked(&mut self, pkid: u16) -> Option<Owner> {
        self.in_flight.remove(&pkid)
    }

    /// A new session started. Requests in flight died with the old link;
    /// returns whether the caller's was one of them.
    pub(crate) fn reconnected(&mut self) -> bool {
        self.in_flight.drain().any(|(_, owner)| owner == Owner::Caller)
    }
}

/// What a recorded route needs when a new session starts.
///
/// A route still awaiting its first SUBACK is only re-sent when that request
/// was lost, and then on behalf of the caller. Its request is otherwise
/// still queued.
pub(crate) fn resubscribe_owner(
    confirmed: bool,
    session_present: bool,
    caller_lost: bool,
) -> Option<Owner> {
    match (confirmed, session_present) {
        (false, _) if caller_lost => Some(Owner::Caller),
        (false, _) => None,
        (true, false) => Some(Owner::Resubscribe),
        (true, true) => None,
    }
}
