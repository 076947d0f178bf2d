//! Board-level panic: light the error LED, log, halt.

use buslink_hal::ErrorIndicator;
use embedded_hal::digital::OutputPin;

use crate::board::StatusLedPin;

pub struct StatusLed(StatusLedPin);

impl StatusLed {
    pub fn new(pin: StatusLedPin) -> Self {
        let mut led = StatusLed(pin);
        led.set_error(false);
        led
    }
}

impl ErrorIndicator for StatusLed {
    fn set_error(&mut self, on: bool) {
        // SIO outputs cannot fail
        if on {
            self.0.set_high().unwrap();
        } else {
            self.0.set_low().unwrap();
        }
    }
}

/// Unrecoverable start-up failure. `status` is the negative code of the
/// failing step.
pub fn board_panic(led: &mut impl ErrorIndicator, what: &str, status: i32) -> ! {
    led.set_error(true);
    defmt::error!("{=str} failed, status {=i32}", what, status);
    panic!("{} failed", what)
}
