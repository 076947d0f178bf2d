//! Application side of the peripheral role: where read data comes from and
//! where written data goes.

/// Produces the byte for the next host read.
pub trait ReadSource {
    fn next_byte(&mut self) -> u8;
}

impl<F: FnMut() -> u8> ReadSource for F {
    fn next_byte(&mut self) -> u8 {
        self()
    }
}

/// Receives each byte the host writes.
pub trait WriteSink {
    fn accept(&mut self, value: u8);
}

impl<F: FnMut(u8)> WriteSink for F {
    fn accept(&mut self, value: u8) {
        self(value)
    }
}

/// Serves a counter that counts down by one per read, wrapping at zero.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DecrementingCounter {
    next: u8,
}

impl DecrementingCounter {
    pub const fn new(start: u8) -> Self {
        Self { next: start }
    }

    /// Value the next read will return.
    pub const fn peek(&self) -> u8 {
        self.next
    }
}

impl Default for DecrementingCounter {
    fn default() -> Self {
        Self::new(0xFF)
    }
}

impl ReadSource for DecrementingCounter {
    fn next_byte(&mut self) -> u8 {
        let value = self.next;
        self.next = self.next.wrapping_sub(1);
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter_serves_then_decrements() {
        let mut counter = DecrementingCounter::new(0x05);
        assert_eq!(counter.next_byte(), 0x05);
        assert_eq!(counter.peek(), 0x04);
    }

    #[test]
    fn counter_wraps_below_zero() {
        let mut counter = DecrementingCounter::new(0);
        assert_eq!(counter.next_byte(), 0);
        assert_eq!(counter.peek(), 0xFF);
    }

    #[test]
    fn closures_are_sources_and_sinks() {
        let mut seen = None;
        {
            let mut sink = |v: u8| seen = Some(v);
            sink.accept(0x7E);
        }
        assert_eq!(seen, Some(0x7E));

        let mut source = || 0x42u8;
        assert_eq!(source.next_byte(), 0x42);
    }
}
