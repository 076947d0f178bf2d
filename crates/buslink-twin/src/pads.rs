//! GPIO pads: function select, pulls and external drivers.
//!
//! A pad is driven by whichever on-board function owns it (processor I/O or
//! the PIO block) and possibly by a device on the other end of the bus.
//! Both driving at once is counted as contention; the board wins the
//! resolved level. An undriven pad follows its pull, or keeps its last
//! level when it has none.

use buslink_core::board::GPIO_COUNT;

use crate::pio::PinLatch;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PadFunction {
    /// Processor-controlled input/output.
    Sio,
    Pio,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Pull {
    None,
    Up,
    Down,
}

pub struct Pads {
    function: [PadFunction; GPIO_COUNT as usize],
    pull: [Pull; GPIO_COUNT as usize],
    sio_out: u32,
    sio_oe: u32,
    external_out: u32,
    external_oe: u32,
    levels: u32,
    contention: u64,
}

impl Default for Pads {
    fn default() -> Self {
        Self::new()
    }
}

impl Pads {
    pub fn new() -> Self {
        Pads {
            function: [PadFunction::Sio; GPIO_COUNT as usize],
            pull: [Pull::None; GPIO_COUNT as usize],
            sio_out: 0,
            sio_oe: 0,
            external_out: 0,
            external_oe: 0,
            levels: 0,
            contention: 0,
        }
    }

    pub fn set_pull(&mut self, pin: u8, pull: Pull) {
        if let Some(slot) = self.pull.get_mut(pin as usize) {
            *slot = pull;
            if pull == Pull::Up {
                self.levels |= 1 << pin;
            }
        }
    }

    pub fn set_function(&mut self, pin: u8, function: PadFunction) {
        if let Some(slot) = self.function.get_mut(pin as usize) {
            *slot = function;
        }
    }

    pub fn function(&self, pin: u8) -> PadFunction {
        self.function[pin as usize % GPIO_COUNT as usize]
    }

    // processor side

    pub fn sio_output_enable(&mut self, mask: u32, enabled: bool) {
        if enabled {
            self.sio_oe |= mask;
        } else {
            self.sio_oe &= !mask;
        }
    }

    pub fn sio_output_enabled(&self) -> u32 {
        self.sio_oe
    }

    pub fn sio_write(&mut self, mask: u32, value: u32) {
        self.sio_out = (self.sio_out & !mask) | (value & mask);
    }

    // the far end of the bus

    pub fn drive(&mut self, mask: u32, value: u32) {
        self.external_oe |= mask;
        self.external_out = (self.external_out & !mask) | (value & mask);
    }

    pub fn release(&mut self, mask: u32) {
        self.external_oe &= !mask;
    }

    /// Pins the board itself drives, given the PIO latches.
    pub fn board_driven(&self, pio: PinLatch) -> u32 {
        let mut driven = 0;
        for pin in 0..GPIO_COUNT {
            let oe = match self.function[pin as usize] {
                PadFunction::Sio => self.sio_oe,
                PadFunction::Pio => pio.dirs,
            };
            driven |= oe & (1 << pin);
        }
        driven
    }

    /// Resolve every pad and remember the result.
    pub fn resolve(&mut self, pio: PinLatch) -> u32 {
        let board_oe = self.board_driven(pio);
        let mut levels = 0;
        for pin in 0..GPIO_COUNT {
            let bit = 1u32 << pin;
            let board_out = match self.function[pin as usize] {
                PadFunction::Sio => self.sio_out,
                PadFunction::Pio => pio.values,
            };
            let level = match (board_oe & bit != 0, self.external_oe & bit != 0) {
                (true, external) => {
                    if external {
                        self.contention += 1;
                    }
                    board_out & bit
                }
                (false, true) => self.external_out & bit,
                (false, false) => match self.pull[pin as usize] {
                    Pull::Up => bit,
                    Pull::Down => 0,
                    Pull::None => self.levels & bit,
                },
            };
            levels |= level;
        }
        self.levels = levels;
        levels
    }

    /// Levels from the last resolve.
    pub fn levels(&self) -> u32 {
        self.levels
    }

    pub fn level(&self, pin: u8) -> bool {
        self.levels >> pin & 1 == 1
    }

    /// Pin-cycles on which both ends drove the same pad.
    pub fn contention(&self) -> u64 {
        self.contention
    }
}
