//! Build-time role selection. Everything outside this module sees only
//! [`Engine`] through [`buslink_core::BusEngine`].

use buslink_core::board::BoardPins;
use rp235x_hal::gpio::Pins;

use crate::board::Board;
use crate::fatal::StatusLed;
use crate::pio_hw::Rp2350Pio;

#[cfg(not(feature = "bus-master"))]
mod selected {
    use buslink_core::source::DecrementingCounter;
    use buslink_core::PeripheralEngine;

    use super::*;
    use crate::data_bus::SioDataBus;

    pub type Engine = PeripheralEngine<Rp2350Pio, SioDataBus, DecrementingCounter, fn(u8)>;

    /// Lines the processor drives until PIO1 or the firmware takes them.
    pub type Held = [crate::board::ControlLine; 2];

    fn log_host_write(value: u8) {
        defmt::info!("host wrote {=u8:#04x}", value);
    }

    pub fn build(pins: Pins, pio: Rp2350Pio) -> (Engine, Held, StatusLed) {
        let board = Board::peripheral(pins);
        let bus = SioDataBus::new(board.lines.data, &BoardPins::DEFAULT);
        let sink: fn(u8) = log_host_write;
        let engine = PeripheralEngine::new(pio, bus, DecrementingCounter::default(), sink);
        (engine, board.lines.held, StatusLed::new(board.led))
    }

    pub fn after_start(_engine: &mut Engine, _led: &mut StatusLed) {
        defmt::info!("serving host cycles");
    }
}

#[cfg(feature = "bus-master")]
mod selected {
    use buslink_core::MasterEngine;

    use super::*;
    use crate::fatal;

    pub type Engine = MasterEngine<Rp2350Pio>;

    pub type Held = [crate::board::ControlLine; 4];

    const ECHO_PATTERN: u8 = 0x3C;

    pub fn build(pins: Pins, pio: Rp2350Pio) -> (Engine, Held, StatusLed) {
        let board = Board::master(pins);
        let engine = MasterEngine::new(pio);
        (engine, board.lines.held, StatusLed::new(board.led))
    }

    /// Write a pattern, read it back and report what the peripheral answered.
    pub fn after_start(engine: &mut Engine, led: &mut StatusLed) {
        if let Err(e) = engine.write(ECHO_PATTERN) {
            fatal::board_panic(led, "master write", e.status());
        }
        match engine.read() {
            Ok(value) if value == ECHO_PATTERN => {
                defmt::info!("peripheral echoed {=u8:#04x}", value)
            }
            Ok(value) => defmt::warn!(
                "wrote {=u8:#04x}, peripheral answered {=u8:#04x}",
                ECHO_PATTERN,
                value
            ),
            Err(e) => fatal::board_panic(led, "master read", e.status()),
        }
    }
}

pub use selected::{after_start, build, Engine, Held};
