//! Interrupt-to-task handoff.
//!
//! Interrupt handlers only capture the raw flag state, clear the originating
//! flag and post an immutable [`BusEvent`]. All bus I/O happens later in the
//! deferred consumer that owns the engine.

use buslink_hal::PioIrq;

use crate::sched::Post;
use crate::sm::program::flag_mask;

/// Which strobe fired.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EventKind {
    BusRead,
    BusWrite,
}

/// Deferred-work descriptor posted from interrupt context.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BusEvent {
    pub kind: EventKind,
    /// IRQ flag register as seen on entry to the handler.
    pub status: u8,
}

/// Processor interrupt line fed by one request flag.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct IrqRoute {
    /// Request flag within the block.
    pub flag: u8,
    /// Processor interrupt line (0 or 1 of the block).
    pub line: u8,
    pub kind: EventKind,
}

/// Body of a bus interrupt handler.
///
/// Returns the event back if the queue was full; it is never retried.
pub fn on_bus_interrupt<I, Q>(irq: &I, route: &IrqRoute, queue: &mut Q) -> Result<(), BusEvent>
where
    I: PioIrq + ?Sized,
    Q: Post<BusEvent> + ?Sized,
{
    let status = irq.flags();
    irq.clear(flag_mask(route.flag));
    queue.post(BusEvent {
        kind: route.kind,
        status,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::cell::Cell;

    struct FakeIrq {
        flags: Cell<u8>,
        clears: Cell<u8>,
    }

    impl PioIrq for FakeIrq {
        fn flags(&self) -> u8 {
            self.flags.get()
        }

        fn clear(&self, mask: u8) {
            self.clears.set(self.clears.get() + 1);
            self.flags.set(self.flags.get() & !mask);
        }
    }

    const READ: IrqRoute = IrqRoute { flag: 0, line: 0, kind: EventKind::BusRead };
    const WRITE: IrqRoute = IrqRoute { flag: 1, line: 1, kind: EventKind::BusWrite };

    #[test]
    fn clears_only_its_own_flag_and_posts_raw_status() {
        let irq = FakeIrq { flags: Cell::new(0b0011_0011), clears: Cell::new(0) };
        let mut queue: heapless::Deque<BusEvent, 4> = heapless::Deque::new();

        on_bus_interrupt(&irq, &READ, &mut queue).unwrap();

        assert_eq!(irq.flags.get(), 0b0011_0010);
        assert_eq!(irq.clears.get(), 1);
        assert_eq!(
            queue.pop_front(),
            Some(BusEvent { kind: EventKind::BusRead, status: 0b0011_0011 })
        );
    }

    #[test]
    fn events_keep_posting_order() {
        let irq = FakeIrq { flags: Cell::new(0b11), clears: Cell::new(0) };
        let mut queue: heapless::Deque<BusEvent, 4> = heapless::Deque::new();

        on_bus_interrupt(&irq, &WRITE, &mut queue).unwrap();
        on_bus_interrupt(&irq, &READ, &mut queue).unwrap();

        assert_eq!(queue.pop_front().map(|e| e.kind), Some(EventKind::BusWrite));
        assert_eq!(queue.pop_front().map(|e| e.kind), Some(EventKind::BusRead));
    }

    #[test]
    fn full_queue_hands_the_event_back() {
        let irq = FakeIrq { flags: Cell::new(0b1), clears: Cell::new(0) };
        let mut queue: heapless::Deque<BusEvent, 1> = heapless::Deque::new();

        assert!(on_bus_interrupt(&irq, &READ, &mut queue).is_ok());
        let rejected = on_bus_interrupt(&irq, &READ, &mut queue);
        assert_eq!(rejected.map_err(|e| e.kind), Err(EventKind::BusRead));
        // flag is cleared even when the post is dropped
        assert_eq!(irq.flags.get(), 0);
    }
}
