//! Host CPU on the far end of the bus, as seen by a board in the peripheral
//! role.
//!
//! One cycle: select (MODSEL- low), assert the strobe, then either see WAIT-
//! go low within [`STROBE_MIN`] cycles and wait for it to rise again, or let
//! the window run out. The byte is taken on the first cycle WAIT- reads high,
//! after which the strobe and then MODSEL- are released.

use buslink_core::board::BoardPins;

use crate::pads::Pads;

/// Cycles between MODSEL- and the strobe.
pub const SETUP: u32 = 4;
/// Shortest strobe the host drives, WAIT- or not.
pub const STROBE_MIN: u32 = 24;
/// Cycles the strobe stays low after the byte is taken.
pub const HOLD: u32 = 4;
/// Cycles between strobe release and MODSEL- release.
pub const DESELECT: u32 = 2;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HostOp {
    Read,
    Write(u8),
}

/// What the host observed during one bus cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CycleRecord {
    pub op: HostOp,
    /// Byte read, or the byte written.
    pub value: u8,
    /// WAIT- was seen low at some point while the strobe was asserted.
    pub saw_wait: bool,
    /// The board was driving all eight data lines when the byte was taken.
    pub driven_at_release: bool,
    pub start: u64,
    /// Cycle on which WAIT- was seen released and the byte was taken.
    pub release: u64,
    pub end: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    Idle,
    Select(u32),
    Strobe(u32),
    Stalled,
    Hold(u32),
    Deselect(u32),
}

pub struct HostCpu {
    pins: BoardPins,
    phase: Phase,
    pending: Option<HostOp>,
    current: Option<CycleRecord>,
    records: Vec<CycleRecord>,
}

impl HostCpu {
    pub fn new(pins: BoardPins) -> Self {
        HostCpu {
            pins,
            phase: Phase::Idle,
            pending: None,
            current: None,
            records: Vec::new(),
        }
    }

    /// Drive the control lines to their idle levels.
    pub fn attach(&self, pads: &mut Pads) {
        let p = &self.pins;
        let strobes = 1 << p.modsel | 1 << p.rd | 1 << p.wr;
        pads.drive(strobes | 1 << p.addr, strobes | 1 << p.addr);
    }

    /// Queue one bus cycle. Returns false if a cycle is already under way.
    pub fn start(&mut self, op: HostOp) -> bool {
        if self.pending.is_some() || self.phase != Phase::Idle {
            return false;
        }
        self.pending = Some(op);
        true
    }

    pub fn is_idle(&self) -> bool {
        self.pending.is_none() && self.phase == Phase::Idle
    }

    pub fn records(&self) -> &[CycleRecord] {
        &self.records
    }

    pub fn last_record(&self) -> Option<&CycleRecord> {
        self.records.last()
    }

    fn strobe(&self, op: HostOp) -> u8 {
        match op {
            HostOp::Read => self.pins.rd,
            HostOp::Write(_) => self.pins.wr,
        }
    }

    /// Advance one system cycle. `board_driven` is the set of pads the
    /// board drives this cycle.
    pub fn tick(&mut self, cycle: u64, pads: &mut Pads, board_driven: u32) {
        let p = self.pins;
        let wait_low = !pads.level(p.wait);
        self.phase = match self.phase {
            Phase::Idle => match self.pending.take() {
                Some(op) => {
                    // C-/D high: data cycle
                    pads.drive(1 << p.modsel | 1 << p.addr, 1 << p.addr);
                    if let HostOp::Write(value) = op {
                        pads.drive(p.data_mask(), (value as u32) << p.data_shift());
                    }
                    log::trace!("host: {:?} cycle starts at {}", op, cycle);
                    self.current = Some(CycleRecord {
                        op,
                        value: 0,
                        saw_wait: false,
                        driven_at_release: false,
                        start: cycle,
                        release: 0,
                        end: 0,
                    });
                    Phase::Select(SETUP)
                }
                None => Phase::Idle,
            },
            Phase::Select(n) if n > 1 => Phase::Select(n - 1),
            Phase::Select(_) => {
                if let Some(record) = &self.current {
                    pads.drive(1 << self.strobe(record.op), 0);
                }
                Phase::Strobe(STROBE_MIN)
            }
            Phase::Strobe(_) if wait_low => {
                self.mark_wait();
                Phase::Stalled
            }
            Phase::Strobe(n) if n > 1 => Phase::Strobe(n - 1),
            Phase::Strobe(_) => Phase::Stalled,
            Phase::Stalled if wait_low => {
                self.mark_wait();
                Phase::Stalled
            }
            Phase::Stalled => {
                if let Some(record) = self.current.as_mut() {
                    record.release = cycle;
                    record.driven_at_release = board_driven & p.data_mask() == p.data_mask();
                    record.value = match record.op {
                        HostOp::Read => ((pads.levels() & p.data_mask()) >> p.data_shift()) as u8,
                        HostOp::Write(value) => value,
                    };
                }
                Phase::Hold(HOLD)
            }
            Phase::Hold(n) if n > 1 => Phase::Hold(n - 1),
            Phase::Hold(_) => {
                if let Some(record) = &self.current {
                    let strobe = 1 << self.strobe(record.op);
                    pads.drive(strobe, strobe);
                }
                Phase::Deselect(DESELECT)
            }
            Phase::Deselect(n) if n > 1 => Phase::Deselect(n - 1),
            Phase::Deselect(_) => {
                pads.drive(1 << p.modsel, 1 << p.modsel);
                pads.release(p.data_mask());
                if let Some(mut record) = self.current.take() {
                    record.end = cycle;
                    log::debug!("host: {:?} cycle done, {:#04x}", record.op, record.value);
                    self.records.push(record);
                }
                Phase::Idle
            }
        };
    }

    fn mark_wait(&mut self) {
        if let Some(record) = self.current.as_mut() {
            record.saw_wait = true;
        }
    }
}
