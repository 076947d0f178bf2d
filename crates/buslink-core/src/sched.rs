//! Deferred-work plumbing: the non-blocking posting primitive used from
//! interrupt context and the one-shot handler table used by the consumer.

use core::fmt;

use crate::handoff::{BusEvent, EventKind};

/// Depth of the deferred-work queue. One event per direction can be in
/// flight while the host is stalled; the rest is headroom.
pub const EVENT_QUEUE_CAPACITY: usize = 8;

/// Event queue between the bus interrupt handlers and the dispatch loop.
pub type EventQueue = heapless::spsc::Queue<BusEvent, EVENT_QUEUE_CAPACITY>;
/// Producer end (owned by interrupt context).
pub type EventProducer<'a> = heapless::spsc::Producer<'a, BusEvent>;
/// Consumer end (owned by the dispatch loop).
pub type EventConsumer<'a> = heapless::spsc::Consumer<'a, BusEvent>;

/// Non-blocking, FIFO post. Hands the item back when there is no room.
pub trait Post<T> {
    fn post(&mut self, item: T) -> Result<(), T>;
}

impl<T> Post<T> for heapless::spsc::Producer<'_, T> {
    fn post(&mut self, item: T) -> Result<(), T> {
        self.enqueue(item)
    }
}

impl<T, const N: usize> Post<T> for heapless::Deque<T, N> {
    fn post(&mut self, item: T) -> Result<(), T> {
        self.push_back(item)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum HandlerError {
    /// Each event kind takes exactly one handler, registered once.
    AlreadyRegistered(EventKind),
}

impl fmt::Display for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandlerError::AlreadyRegistered(kind) => {
                write!(f, "handler for {:?} already registered", kind)
            }
        }
    }
}

/// Deferred handler: runs to completion outside interrupt context with
/// exclusive access to the context that owns the bus.
pub type Handler<C> = fn(&mut C, BusEvent);

/// Event-kind to handler map, filled once at start-up before the matching
/// interrupts are unmasked.
pub struct HandlerTable<C> {
    bus_read: Option<Handler<C>>,
    bus_write: Option<Handler<C>>,
}

impl<C> HandlerTable<C> {
    pub const fn new() -> Self {
        Self {
            bus_read: None,
            bus_write: None,
        }
    }

    fn slot(&mut self, kind: EventKind) -> &mut Option<Handler<C>> {
        match kind {
            EventKind::BusRead => &mut self.bus_read,
            EventKind::BusWrite => &mut self.bus_write,
        }
    }

    pub fn register(&mut self, kind: EventKind, handler: Handler<C>) -> Result<(), HandlerError> {
        let slot = self.slot(kind);
        if slot.is_some() {
            return Err(HandlerError::AlreadyRegistered(kind));
        }
        *slot = Some(handler);
        Ok(())
    }

    pub fn is_registered(&self, kind: EventKind) -> bool {
        match kind {
            EventKind::BusRead => self.bus_read.is_some(),
            EventKind::BusWrite => self.bus_write.is_some(),
        }
    }

    /// Run the handler for `event`. Returns false if none is registered.
    pub fn dispatch(&self, context: &mut C, event: BusEvent) -> bool {
        let handler = match event.kind {
            EventKind::BusRead => self.bus_read,
            EventKind::BusWrite => self.bus_write,
        };
        match handler {
            Some(handler) => {
                handler(context, event);
                true
            }
            None => false,
        }
    }
}

impl<C> Default for HandlerTable<C> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Counts {
        reads: u32,
        writes: u32,
        last_status: u8,
    }

    fn on_read(c: &mut Counts, e: BusEvent) {
        c.reads += 1;
        c.last_status = e.status;
    }

    fn on_write(c: &mut Counts, _: BusEvent) {
        c.writes += 1;
    }

    fn event(kind: EventKind) -> BusEvent {
        BusEvent { kind, status: 0x21 }
    }

    #[test]
    fn dispatches_by_kind() {
        let mut table: HandlerTable<Counts> = HandlerTable::new();
        table.register(EventKind::BusRead, on_read).unwrap();
        table.register(EventKind::BusWrite, on_write).unwrap();

        let mut counts = Counts::default();
        assert!(table.dispatch(&mut counts, event(EventKind::BusRead)));
        assert!(table.dispatch(&mut counts, event(EventKind::BusWrite)));
        assert!(table.dispatch(&mut counts, event(EventKind::BusWrite)));

        assert_eq!((counts.reads, counts.writes), (1, 2));
        assert_eq!(counts.last_status, 0x21);
    }

    #[test]
    fn second_registration_is_rejected() {
        let mut table: HandlerTable<Counts> = HandlerTable::new();
        table.register(EventKind::BusRead, on_read).unwrap();
        assert_eq!(
            table.register(EventKind::BusRead, on_write),
            Err(HandlerError::AlreadyRegistered(EventKind::BusRead))
        );
        // the first handler stays in place
        let mut counts = Counts::default();
        table.dispatch(&mut counts, event(EventKind::BusRead));
        assert_eq!((counts.reads, counts.writes), (1, 0));
    }

    #[test]
    fn unregistered_kind_is_not_dispatched() {
        let table: HandlerTable<Counts> = HandlerTable::new();
        let mut counts = Counts::default();
        assert!(!table.is_registered(EventKind::BusWrite));
        assert!(!table.dispatch(&mut counts, event(EventKind::BusWrite)));
    }

    #[test]
    fn spsc_queue_preserves_order() {
        let mut queue = EventQueue::new();
        let (mut producer, mut consumer) = queue.split();
        producer.post(event(EventKind::BusWrite)).unwrap();
        producer.post(event(EventKind::BusRead)).unwrap();
        assert_eq!(consumer.dequeue().map(|e| e.kind), Some(EventKind::BusWrite));
        assert_eq!(consumer.dequeue().map(|e| e.kind), Some(EventKind::BusRead));
        assert_eq!(consumer.dequeue(), None);
    }
}
