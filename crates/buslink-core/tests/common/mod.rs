//! Recording mocks for the hardware seams.
//!
//! The PIO block and the data bus share one operation log so tests can check
//! the relative order of bus moves and WAIT release.

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use buslink_hal::{BusDirection, DataBus, PioHardware, SmRegisters};

/// One captured hardware access.
#[derive(Clone, Debug, PartialEq)]
pub enum Op {
    Instruction(u8, u16),
    Enable(u8, bool),
    Restart(u8),
    Registers(u8, SmRegisters),
    Exec(u8, u16),
    Drain(u8),
    Claim(u8),
    Route { line: u8, flag: u8, enabled: bool },
    RxPop(u8),
    TxPush(u8, u32),
    ClearIrq(u8),
    Direction(BusDirection),
    Put(u8),
    Sample(u8),
    Sink(u8),
}

pub type OpLog = Rc<RefCell<Vec<Op>>>;

pub fn new_log() -> OpLog {
    Rc::new(RefCell::new(Vec::new()))
}

/// Mock PIO block. Clones share state.
#[derive(Clone)]
pub struct MockPio {
    log: OpLog,
    flags: Rc<Cell<u8>>,
    rx: Rc<RefCell<VecDeque<u32>>>,
    /// Flags raised whenever a word is pushed to a TX FIFO.
    raise_on_push: Rc<Cell<u8>>,
}

impl MockPio {
    pub fn new(log: &OpLog) -> Self {
        Self {
            log: log.clone(),
            flags: Rc::new(Cell::new(0)),
            rx: Rc::new(RefCell::new(VecDeque::new())),
            raise_on_push: Rc::new(Cell::new(0)),
        }
    }

    pub fn raise(&self, mask: u8) {
        self.flags.set(self.flags.get() | mask);
    }

    pub fn flags(&self) -> u8 {
        self.flags.get()
    }

    pub fn queue_rx(&self, word: u32) {
        self.rx.borrow_mut().push_back(word);
    }

    pub fn raise_on_push(&self, mask: u8) {
        self.raise_on_push.set(mask);
    }
}

impl PioHardware for MockPio {
    fn block(&self) -> u8 {
        1
    }

    fn write_instruction(&mut self, address: u8, instruction: u16) {
        self.log.borrow_mut().push(Op::Instruction(address, instruction));
    }

    fn set_enabled(&mut self, mask: u8, enabled: bool) {
        self.log.borrow_mut().push(Op::Enable(mask, enabled));
    }

    fn restart(&mut self, mask: u8) {
        self.log.borrow_mut().push(Op::Restart(mask));
    }

    fn write_sm_registers(&mut self, sm: u8, registers: &SmRegisters) {
        self.log.borrow_mut().push(Op::Registers(sm, *registers));
    }

    fn exec(&mut self, sm: u8, instruction: u16) {
        self.log.borrow_mut().push(Op::Exec(sm, instruction));
    }

    fn drain_fifos(&mut self, sm: u8) {
        self.log.borrow_mut().push(Op::Drain(sm));
    }

    fn claim_pin(&mut self, pin: u8) {
        self.log.borrow_mut().push(Op::Claim(pin));
    }

    fn set_irq_routing(&mut self, line: u8, flag: u8, enabled: bool) {
        self.log.borrow_mut().push(Op::Route { line, flag, enabled });
    }

    fn rx_pop(&mut self, sm: u8) -> Option<u32> {
        self.log.borrow_mut().push(Op::RxPop(sm));
        self.rx.borrow_mut().pop_front()
    }

    fn tx_push(&mut self, sm: u8, word: u32) -> bool {
        self.log.borrow_mut().push(Op::TxPush(sm, word));
        self.raise(self.raise_on_push.get());
        true
    }

    fn irq_flags(&self) -> u8 {
        self.flags.get()
    }

    fn clear_irq(&mut self, mask: u8) {
        self.log.borrow_mut().push(Op::ClearIrq(mask));
        self.flags.set(self.flags.get() & !mask);
    }
}

/// Mock data bus: `lines` is what a sample returns while the bus is input.
#[derive(Clone)]
pub struct MockBus {
    log: OpLog,
    direction: Rc<Cell<BusDirection>>,
    latch: Rc<Cell<u8>>,
    lines: Rc<Cell<u8>>,
}

impl MockBus {
    pub fn new(log: &OpLog) -> Self {
        Self {
            log: log.clone(),
            direction: Rc::new(Cell::new(BusDirection::Input)),
            latch: Rc::new(Cell::new(0)),
            lines: Rc::new(Cell::new(0xFF)),
        }
    }

    /// Value an external driver puts on the lines.
    pub fn drive_lines(&self, value: u8) {
        self.lines.set(value);
    }

    pub fn current_direction(&self) -> BusDirection {
        self.direction.get()
    }
}

impl DataBus for MockBus {
    fn set_direction(&mut self, direction: BusDirection) {
        self.log.borrow_mut().push(Op::Direction(direction));
        self.direction.set(direction);
    }

    fn direction(&self) -> BusDirection {
        self.direction.get()
    }

    fn put(&mut self, value: u8) {
        self.log.borrow_mut().push(Op::Put(value));
        self.latch.set(value);
    }

    fn sample(&mut self) -> u8 {
        let value = match self.direction.get() {
            BusDirection::Output => self.latch.get(),
            BusDirection::Input => self.lines.get(),
        };
        self.log.borrow_mut().push(Op::Sample(value));
        value
    }
}

/// Write sink that records into the shared log.
pub fn logging_sink(log: &OpLog) -> impl FnMut(u8) {
    let log = log.clone();
    move |value| log.borrow_mut().push(Op::Sink(value))
}

/// Every enabling write, in order.
pub fn enables(log: &OpLog) -> Vec<Op> {
    log.borrow()
        .iter()
        .filter(|op| matches!(op, Op::Enable(_, true)))
        .cloned()
        .collect()
}

/// Log contents recorded after `mark`.
pub fn since(log: &OpLog, mark: usize) -> Vec<Op> {
    log.borrow()[mark..].to_vec()
}
