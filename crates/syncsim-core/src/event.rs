// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2026 syncsim contributors

use std::cell::Cell;
use std::rc::Rc;

use crate::channel::ChannelHandle;
use crate::peer::PeerHandle;

/// What a fired event actually does. A closed enum instead of a boxed
/// closure: the scheduler can match on it directly, and nothing here needs
/// to capture more than a handle to the component it wakes up.
#[derive(Clone)]
pub(crate) enum Callback {
    ChannelTimer(ChannelHandle),
    PeerTimeout(PeerHandle),
    PeerRebootStart(PeerHandle),
    PeerRebootFinished(PeerHandle),
}

/// A scheduled occurrence, ordered by `(firing_time, serial)`. `serial` is
/// assigned at schedule time and breaks ties in submission order, so two
/// events scheduled for the same virtual time fire in the order they were
/// queued.
pub(crate) struct EventEntry {
    pub firing_time: f64,
    pub serial: u64,
    pub active: Rc<Cell<bool>>,
    pub callback: Callback,
}

impl PartialEq for EventEntry {
    fn eq(&self, other: &Self) -> bool {
        self.firing_time == other.firing_time && self.serial == other.serial
    }
}
impl Eq for EventEntry {}

impl PartialOrd for EventEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for EventEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // total_cmp so NaN firing times (which should never occur, but we
        // don't want to panic inside a BinaryHeap comparator) still order.
        self.firing_time
            .total_cmp(&other.firing_time)
            .then_with(|| self.serial.cmp(&other.serial))
    }
}

/// A handle to a previously-scheduled event. Cancellation is lazy: calling
/// [`EventHandle::cancel`] only flips a shared flag the scheduler consults
/// when the event would otherwise fire, so cancelling doesn't require
/// mutating the heap.
#[derive(Clone)]
pub struct EventHandle {
    active: Rc<Cell<bool>>,
}

impl EventHandle {
    pub(crate) fn new(active: Rc<Cell<bool>>) -> Self {
        Self { active }
    }

    pub fn cancel(&self) {
        self.active.set(false);
    }

    pub fn is_active(&self) -> bool {
        self.active.get()
    }
}
