//! The data bus under processor control, switched as one group through the
//! SIO set/clear/xor registers.

use buslink_core::board::BoardPins;
use buslink_hal::{BusDirection, DataBus};
use rp235x_hal::pac;

use crate::board::DataLine;

pub struct SioDataBus {
    _lines: [DataLine; 8],
    mask: u32,
    shift: u8,
}

impl SioDataBus {
    pub fn new(lines: [DataLine; 8], pins: &BoardPins) -> Self {
        SioDataBus {
            _lines: lines,
            mask: pins.data_mask(),
            shift: pins.data_shift(),
        }
    }

    fn sio() -> &'static pac::sio::RegisterBlock {
        // SAFETY: the SIO GPIO set/clear/xor registers are single-write
        // atomic, and this type owns the eight data lines.
        unsafe { &*pac::SIO::ptr() }
    }
}

impl DataBus for SioDataBus {
    fn set_direction(&mut self, direction: BusDirection) {
        let sio = Self::sio();
        match direction {
            BusDirection::Output => sio.gpio_oe_set().write(|w| unsafe { w.bits(self.mask) }),
            BusDirection::Input => sio.gpio_oe_clr().write(|w| unsafe { w.bits(self.mask) }),
        }
    }

    fn direction(&self) -> BusDirection {
        if Self::sio().gpio_oe().read().bits() & self.mask != 0 {
            BusDirection::Output
        } else {
            BusDirection::Input
        }
    }

    fn put(&mut self, value: u8) {
        let sio = Self::sio();
        // one xor write flips exactly the lines that change
        let current = sio.gpio_out().read().bits();
        let toggle = (current ^ (value as u32) << self.shift) & self.mask;
        sio.gpio_out_xor().write(|w| unsafe { w.bits(toggle) });
    }

    fn sample(&mut self) -> u8 {
        ((Self::sio().gpio_in().read().bits() & self.mask) >> self.shift) as u8
    }
}
