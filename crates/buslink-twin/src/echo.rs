//! Peripheral on the far end of the bus, as seen by a board in the master
//! role. Holds WAIT- low for a fixed number of cycles on every strobe,
//! latches written bytes on the rising edge of WR- and answers reads with
//! the last byte written.

use buslink_core::board::BoardPins;

use crate::pads::Pads;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Strobe {
    Read,
    Write,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    Idle,
    Holding(Strobe, u32),
    Released(Strobe),
}

pub struct EchoPeripheral {
    pins: BoardPins,
    wait_cycles: u32,
    phase: Phase,
    last: u8,
    writes: Vec<u8>,
    reads: Vec<u8>,
}

impl EchoPeripheral {
    pub fn new(pins: BoardPins, wait_cycles: u32) -> Self {
        EchoPeripheral {
            pins,
            wait_cycles,
            phase: Phase::Idle,
            last: 0,
            writes: Vec::new(),
            reads: Vec::new(),
        }
    }

    /// Bytes latched from write cycles, oldest first.
    pub fn writes(&self) -> &[u8] {
        &self.writes
    }

    /// Bytes served to read cycles, oldest first.
    pub fn reads(&self) -> &[u8] {
        &self.reads
    }

    pub fn last(&self) -> u8 {
        self.last
    }

    pub fn tick(&mut self, pads: &mut Pads) {
        let p = self.pins;
        let selected = !pads.level(p.modsel);
        let rd = !pads.level(p.rd);
        let wr = !pads.level(p.wr);
        let wait = 1 << p.wait;

        self.phase = match self.phase {
            Phase::Idle if selected && rd => {
                pads.drive(p.data_mask(), (self.last as u32) << p.data_shift());
                pads.drive(wait, 0);
                Phase::Holding(Strobe::Read, self.wait_cycles)
            }
            Phase::Idle if selected && wr => {
                pads.drive(wait, 0);
                Phase::Holding(Strobe::Write, self.wait_cycles)
            }
            Phase::Idle => Phase::Idle,
            Phase::Holding(strobe, n) if n > 1 => Phase::Holding(strobe, n - 1),
            Phase::Holding(strobe, _) => {
                pads.release(wait);
                Phase::Released(strobe)
            }
            Phase::Released(Strobe::Read) if !rd => {
                pads.release(p.data_mask());
                self.reads.push(self.last);
                log::debug!("echo: served {:#04x}", self.last);
                Phase::Idle
            }
            Phase::Released(Strobe::Write) if !wr => {
                self.last = ((pads.levels() & p.data_mask()) >> p.data_shift()) as u8;
                self.writes.push(self.last);
                log::debug!("echo: latched {:#04x}", self.last);
                Phase::Idle
            }
            released => released,
        };
    }
}
