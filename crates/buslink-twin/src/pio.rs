//! Cycle-level model of one programmable I/O block.
//!
//! Four state machines share a 32-word instruction memory, eight IRQ flags
//! and one set of pin output latches. Each state machine advances on its own
//! fractional clock divider. Within a system cycle the state machines run in
//! index order and write the latches directly, so on a conflict the
//! higher-numbered one wins.
//!
//! Modelled: the full instruction set (JMP, WAIT, IN, OUT, PUSH, PULL, MOV,
//! IRQ, SET), side-set with optional enable and pindirs, delays, wrap,
//! autopush/autopull, FIFO joining and forced execution. Not modelled: the
//! STATUS source beyond "0", input synchronisers and debug registers.

use std::collections::VecDeque;

use buslink_hal::SmRegisters;

pub const SM_COUNT: usize = 4;
pub const INSTRUCTION_WORDS: usize = 32;
const FIFO_DEPTH: usize = 4;

/// Output latches the block presents to the pads.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PinLatch {
    pub values: u32,
    pub dirs: u32,
}

impl PinLatch {
    fn write(&mut self, base: u8, count: u8, data: u32, dirs: bool) {
        for i in 0..count {
            let pin = (base + i) % 32;
            let target = if dirs { &mut self.dirs } else { &mut self.values };
            if data >> i & 1 == 1 {
                *target |= 1 << pin;
            } else {
                *target &= !(1 << pin);
            }
        }
    }
}

/// Block-wide state a state machine touches while executing.
struct Shared<'a> {
    flags: &'a mut u8,
    latch: &'a mut PinLatch,
    levels: u32,
}

/// What the program counter does after an instruction.
enum Flow {
    Next,
    Jump(u8),
    Stall,
    Exec(u16),
}

#[derive(Clone, Debug)]
pub struct StateMachine {
    registers: SmRegisters,
    pub pc: u8,
    pub x: u32,
    pub y: u32,
    pub isr: u32,
    pub isr_count: u8,
    pub osr: u32,
    pub osr_count: u8,
    tx: VecDeque<u32>,
    rx: VecDeque<u32>,
    delay: u8,
    stalled: bool,
    exec_next: Option<u16>,
    clock: u32,
    /// Instructions issued, stalls excluded.
    pub retired: u64,
}

impl Default for StateMachine {
    fn default() -> Self {
        StateMachine {
            registers: SmRegisters {
                clkdiv: 1 << 16,
                execctrl: 0x1F << 12,
                shiftctrl: 0x000C_0000,
                pinctrl: 5 << 26,
            },
            pc: 0,
            x: 0,
            y: 0,
            isr: 0,
            isr_count: 0,
            osr: 0,
            osr_count: 32,
            tx: VecDeque::new(),
            rx: VecDeque::new(),
            delay: 0,
            stalled: false,
            exec_next: None,
            clock: 0,
            retired: 0,
        }
    }
}

impl StateMachine {
    pub fn registers(&self) -> &SmRegisters {
        &self.registers
    }

    pub fn is_stalled(&self) -> bool {
        self.stalled
    }

    pub fn rx_level(&self) -> usize {
        self.rx.len()
    }

    pub fn tx_level(&self) -> usize {
        self.tx.len()
    }

    // execctrl
    fn side_en(&self) -> bool {
        self.registers.execctrl >> 30 & 1 == 1
    }
    fn side_pindir(&self) -> bool {
        self.registers.execctrl >> 29 & 1 == 1
    }
    fn jmp_pin(&self) -> u8 {
        (self.registers.execctrl >> 24 & 0x1F) as u8
    }
    fn wrap_top(&self) -> u8 {
        (self.registers.execctrl >> 12 & 0x1F) as u8
    }
    fn wrap_bottom(&self) -> u8 {
        (self.registers.execctrl >> 7 & 0x1F) as u8
    }

    // shiftctrl
    fn join_rx(&self) -> bool {
        self.registers.shiftctrl >> 31 & 1 == 1
    }
    fn join_tx(&self) -> bool {
        self.registers.shiftctrl >> 30 & 1 == 1
    }
    fn pull_threshold(&self) -> u8 {
        threshold(self.registers.shiftctrl >> 25)
    }
    fn push_threshold(&self) -> u8 {
        threshold(self.registers.shiftctrl >> 20)
    }
    fn out_right(&self) -> bool {
        self.registers.shiftctrl >> 19 & 1 == 1
    }
    fn in_right(&self) -> bool {
        self.registers.shiftctrl >> 18 & 1 == 1
    }
    fn autopull(&self) -> bool {
        self.registers.shiftctrl >> 17 & 1 == 1
    }
    fn autopush(&self) -> bool {
        self.registers.shiftctrl >> 16 & 1 == 1
    }

    // pinctrl
    fn sideset_count(&self) -> u8 {
        (self.registers.pinctrl >> 29 & 0x7) as u8
    }
    fn set_count(&self) -> u8 {
        (self.registers.pinctrl >> 26 & 0x7) as u8
    }
    fn out_count(&self) -> u8 {
        (self.registers.pinctrl >> 20 & 0x3F) as u8
    }
    fn in_base(&self) -> u8 {
        (self.registers.pinctrl >> 15 & 0x1F) as u8
    }
    fn sideset_base(&self) -> u8 {
        (self.registers.pinctrl >> 10 & 0x1F) as u8
    }
    fn set_base(&self) -> u8 {
        (self.registers.pinctrl >> 5 & 0x1F) as u8
    }
    fn out_base(&self) -> u8 {
        (self.registers.pinctrl & 0x1F) as u8
    }

    fn rx_capacity(&self) -> usize {
        match (self.join_rx(), self.join_tx()) {
            (true, _) => FIFO_DEPTH * 2,
            (false, true) => 0,
            (false, false) => FIFO_DEPTH,
        }
    }

    fn tx_capacity(&self) -> usize {
        match (self.join_tx(), self.join_rx()) {
            (true, _) => FIFO_DEPTH * 2,
            (false, true) => 0,
            (false, false) => FIFO_DEPTH,
        }
    }

    /// Clock divider in 1/256ths; an integer part of 0 means 65536.
    fn divider_x256(&self) -> u32 {
        let int = self.registers.clkdiv >> 16;
        let frac = self.registers.clkdiv >> 8 & 0xFF;
        let int = if int == 0 { 65536 } else { int };
        int << 8 | frac
    }

    fn clock_enable(&mut self) -> bool {
        self.clock += 256;
        let div = self.divider_x256();
        if self.clock >= div {
            self.clock -= div;
            true
        } else {
            false
        }
    }

    fn restart(&mut self) {
        self.isr = 0;
        self.isr_count = 0;
        self.osr = 0;
        self.osr_count = 32;
        self.delay = 0;
        self.stalled = false;
        self.exec_next = None;
        self.clock = 0;
    }

    fn advance(&mut self) {
        self.pc = if self.pc == self.wrap_top() {
            self.wrap_bottom()
        } else {
            (self.pc + 1) % INSTRUCTION_WORDS as u8
        };
    }

    /// Split the delay/side-set field of `instr`.
    fn side_and_delay(&self, instr: u16) -> (Option<u32>, u8) {
        let field = (instr >> 8 & 0x1F) as u8;
        let count = self.sideset_count().min(5);
        let delay_bits = 5 - count;
        let delay = field & ((1u8 << delay_bits) - 1);
        if count == 0 {
            return (None, delay);
        }
        let side = (field >> delay_bits) as u32;
        if self.side_en() {
            let enable = 1 << (count - 1);
            if side & enable == 0 {
                return (None, delay);
            }
            (Some(side & (enable - 1)), delay)
        } else {
            (Some(side), delay)
        }
    }

    fn apply_side_set(&self, value: u32, latch: &mut PinLatch) {
        let pins = self.sideset_count() - self.side_en() as u8;
        latch.write(self.sideset_base(), pins, value, self.side_pindir());
    }

    /// One state-machine clock.
    fn cycle(&mut self, index: u8, memory: &[u16; INSTRUCTION_WORDS], shared: &mut Shared<'_>) {
        if self.delay > 0 {
            self.delay -= 1;
            return;
        }
        let exec = self.exec_next.take();
        let instr = exec.unwrap_or(memory[self.pc as usize]);
        let first_issue = !self.stalled;
        let (side, delay) = self.side_and_delay(instr);
        if first_issue {
            if let Some(value) = side {
                self.apply_side_set(value, shared.latch);
            }
        }
        match self.execute(index, instr, first_issue, shared) {
            Flow::Stall => {
                // a stalled exec'd instruction is retried, not the one at pc
                self.exec_next = exec;
                self.stalled = true;
            }
            flow => {
                self.stalled = false;
                self.retired += 1;
                self.delay = delay;
                match flow {
                    Flow::Jump(address) => self.pc = address,
                    Flow::Exec(next) => {
                        self.advance();
                        self.exec_next = Some(next);
                    }
                    _ => self.advance(),
                }
            }
        }
    }

    /// Instruction written by the processor: runs at once, ignores delay,
    /// moves the program counter only if it jumps.
    fn force(&mut self, index: u8, instr: u16, shared: &mut Shared<'_>) {
        let (side, _) = self.side_and_delay(instr);
        if let Some(value) = side {
            self.apply_side_set(value, shared.latch);
        }
        match self.execute(index, instr, true, shared) {
            Flow::Jump(address) => self.pc = address,
            Flow::Exec(next) => self.exec_next = Some(next),
            Flow::Stall => {
                self.exec_next = Some(instr);
                self.stalled = true;
            }
            Flow::Next => {}
        }
    }

    fn execute(&mut self, index: u8, instr: u16, first_issue: bool, shared: &mut Shared<'_>) -> Flow {
        let operands = instr & 0xFF;
        match instr >> 13 {
            0 => self.jmp(operands, shared.levels),
            1 => self.wait(index, operands, shared),
            2 => self.shift_in(operands, shared.levels),
            3 => self.shift_out(operands, shared.latch),
            4 if operands & 0x80 == 0 => self.push(operands),
            4 => self.pull(operands),
            5 => self.mov(operands, shared),
            6 => {
                let flag = irq_index((operands & 0x1F) as u8, index);
                if operands & 0x40 != 0 {
                    *shared.flags &= !(1 << flag);
                    return Flow::Next;
                }
                if first_issue {
                    *shared.flags |= 1 << flag;
                }
                if operands & 0x20 != 0 && *shared.flags & (1 << flag) != 0 {
                    Flow::Stall
                } else {
                    Flow::Next
                }
            }
            _ => {
                let data = (operands & 0x1F) as u32;
                match operands >> 5 {
                    0 => shared.latch.write(self.set_base(), self.set_count(), data, false),
                    1 => self.x = data,
                    2 => self.y = data,
                    4 => shared.latch.write(self.set_base(), self.set_count(), data, true),
                    _ => {}
                }
                Flow::Next
            }
        }
    }

    fn jmp(&mut self, operands: u16, levels: u32) -> Flow {
        let address = (operands & 0x1F) as u8;
        let taken = match operands >> 5 & 0x7 {
            0 => true,
            1 => self.x == 0,
            2 => {
                let taken = self.x != 0;
                self.x = self.x.wrapping_sub(1);
                taken
            }
            3 => self.y == 0,
            4 => {
                let taken = self.y != 0;
                self.y = self.y.wrapping_sub(1);
                taken
            }
            5 => self.x != self.y,
            6 => levels >> self.jmp_pin() & 1 == 1,
            _ => self.osr_count < self.pull_threshold(),
        };
        if taken {
            Flow::Jump(address)
        } else {
            Flow::Next
        }
    }

    fn wait(&mut self, index: u8, operands: u16, shared: &mut Shared<'_>) -> Flow {
        let polarity = operands >> 7 & 1 == 1;
        let idx = (operands & 0x1F) as u8;
        let level = |pin: u8| shared.levels >> (pin % 32) & 1 == 1;
        let satisfied = match operands >> 5 & 0x3 {
            0 => level(idx) == polarity,
            1 => level(self.in_base() + idx) == polarity,
            2 => {
                let flag = irq_index(idx, index);
                let set = *shared.flags & (1 << flag) != 0;
                if polarity && set {
                    *shared.flags &= !(1 << flag);
                }
                set == polarity
            }
            _ => level(self.jmp_pin() + (idx & 0x3)) == polarity,
        };
        if satisfied {
            Flow::Next
        } else {
            Flow::Stall
        }
    }

    fn shift_in(&mut self, operands: u16, levels: u32) -> Flow {
        let bits = bit_count(operands);
        let threshold = self.push_threshold();
        if self.autopush()
            && self.isr_count.saturating_add(bits) >= threshold
            && self.rx.len() >= self.rx_capacity()
        {
            return Flow::Stall;
        }
        let data = match operands >> 5 & 0x7 {
            0 => levels.rotate_right(self.in_base() as u32),
            1 => self.x,
            2 => self.y,
            6 => self.isr,
            7 => self.osr,
            _ => 0,
        } & mask(bits);
        self.isr = if bits == 32 {
            data
        } else if self.in_right() {
            self.isr >> bits | data << (32 - bits)
        } else {
            self.isr << bits | data
        };
        self.isr_count = (self.isr_count + bits).min(32);
        if self.autopush() && self.isr_count >= threshold {
            self.rx.push_back(self.isr);
            self.isr = 0;
            self.isr_count = 0;
        }
        Flow::Next
    }

    fn shift_out(&mut self, operands: u16, latch: &mut PinLatch) -> Flow {
        let bits = bit_count(operands);
        if self.autopull() && self.osr_count >= self.pull_threshold() {
            match self.tx.pop_front() {
                Some(word) => {
                    self.osr = word;
                    self.osr_count = 0;
                }
                None => return Flow::Stall,
            }
        }
        let data = if bits == 32 {
            let data = self.osr;
            self.osr = 0;
            data
        } else if self.out_right() {
            let data = self.osr & mask(bits);
            self.osr >>= bits;
            data
        } else {
            let data = self.osr >> (32 - bits);
            self.osr <<= bits;
            data
        };
        self.osr_count = (self.osr_count + bits).min(32);
        match operands >> 5 & 0x7 {
            0 => latch.write(self.out_base(), self.out_count(), data, false),
            1 => self.x = data,
            2 => self.y = data,
            4 => latch.write(self.out_base(), self.out_count(), data, true),
            5 => return Flow::Jump((data & 0x1F) as u8),
            6 => {
                self.isr = data;
                self.isr_count = bits;
            }
            7 => return Flow::Exec(data as u16),
            _ => {}
        }
        Flow::Next
    }

    fn push(&mut self, operands: u16) -> Flow {
        let if_full = operands & 0x40 != 0;
        let block = operands & 0x20 != 0;
        if if_full && self.isr_count < self.push_threshold() {
            return Flow::Next;
        }
        if self.rx.len() >= self.rx_capacity() {
            if block {
                return Flow::Stall;
            }
        } else {
            self.rx.push_back(self.isr);
        }
        self.isr = 0;
        self.isr_count = 0;
        Flow::Next
    }

    fn pull(&mut self, operands: u16) -> Flow {
        let if_empty = operands & 0x40 != 0;
        let block = operands & 0x20 != 0;
        if if_empty && self.osr_count < self.pull_threshold() {
            return Flow::Next;
        }
        match self.tx.pop_front() {
            Some(word) => self.osr = word,
            None if block => return Flow::Stall,
            None => self.osr = self.x,
        }
        self.osr_count = 0;
        Flow::Next
    }

    fn mov(&mut self, operands: u16, shared: &mut Shared<'_>) -> Flow {
        let value = match operands & 0x7 {
            0 => shared.levels.rotate_right(self.in_base() as u32),
            1 => self.x,
            2 => self.y,
            6 => self.isr,
            7 => self.osr,
            _ => 0,
        };
        let value = match operands >> 3 & 0x3 {
            1 => !value,
            2 => value.reverse_bits(),
            _ => value,
        };
        match operands >> 5 & 0x7 {
            0 => shared.latch.write(self.out_base(), self.out_count(), value, false),
            1 => self.x = value,
            2 => self.y = value,
            3 => shared.latch.write(self.out_base(), self.out_count(), value, true),
            4 => return Flow::Exec(value as u16),
            5 => return Flow::Jump((value & 0x1F) as u8),
            6 => {
                self.isr = value;
                self.isr_count = 0;
            }
            _ => {
                self.osr = value;
                self.osr_count = 0;
            }
        }
        Flow::Next
    }
}

/// Shift threshold field: 0 encodes 32.
fn threshold(field: u32) -> u8 {
    match (field & 0x1F) as u8 {
        0 => 32,
        n => n,
    }
}

/// IN/OUT bit count field: 0 encodes 32.
fn bit_count(operands: u16) -> u8 {
    threshold(operands as u32)
}

fn mask(bits: u8) -> u32 {
    if bits >= 32 {
        u32::MAX
    } else {
        (1 << bits) - 1
    }
}

/// Flag addressed by an IRQ index, resolving the relative bit.
fn irq_index(idx: u8, sm: u8) -> u8 {
    if idx & 0x10 != 0 {
        (idx & 0x4) | ((idx + sm) & 0x3)
    } else {
        idx & 0x7
    }
}

pub struct PioBlock {
    index: u8,
    memory: [u16; INSTRUCTION_WORDS],
    sms: [StateMachine; SM_COUNT],
    enabled: u8,
    flags: u8,
    /// Per processor line, which of flags 0-3 raise it.
    routing: [u8; 2],
    latch: PinLatch,
    instruction_writes: u32,
}

impl PioBlock {
    pub fn new(index: u8) -> Self {
        PioBlock {
            index,
            memory: [0; INSTRUCTION_WORDS],
            sms: Default::default(),
            enabled: 0,
            flags: 0,
            routing: [0; 2],
            latch: PinLatch::default(),
            instruction_writes: 0,
        }
    }

    pub fn index(&self) -> u8 {
        self.index
    }

    pub fn sm(&self, sm: u8) -> &StateMachine {
        &self.sms[sm as usize % SM_COUNT]
    }

    pub fn instruction(&self, address: u8) -> u16 {
        self.memory[address as usize % INSTRUCTION_WORDS]
    }

    pub fn instruction_writes(&self) -> u32 {
        self.instruction_writes
    }

    pub fn enabled(&self) -> u8 {
        self.enabled
    }

    pub fn flags(&self) -> u8 {
        self.flags
    }

    pub fn latch(&self) -> PinLatch {
        self.latch
    }

    pub fn write_instruction(&mut self, address: u8, instr: u16) {
        self.memory[address as usize % INSTRUCTION_WORDS] = instr;
        self.instruction_writes += 1;
    }

    pub fn set_enabled(&mut self, mask: u8, enabled: bool) {
        if enabled {
            self.enabled |= mask & 0xF;
        } else {
            self.enabled &= !mask;
        }
    }

    pub fn restart(&mut self, mask: u8) {
        for (i, sm) in self.sms.iter_mut().enumerate() {
            if mask >> i & 1 == 1 {
                sm.restart();
            }
        }
    }

    pub fn write_registers(&mut self, sm: u8, registers: &SmRegisters) {
        self.sms[sm as usize % SM_COUNT].registers = *registers;
    }

    pub fn drain(&mut self, sm: u8) {
        let sm = &mut self.sms[sm as usize % SM_COUNT];
        sm.rx.clear();
        sm.tx.clear();
    }

    pub fn force_exec(&mut self, sm: u8, instr: u16, levels: u32) {
        let mut shared = Shared {
            flags: &mut self.flags,
            latch: &mut self.latch,
            levels,
        };
        self.sms[sm as usize % SM_COUNT].force(sm, instr, &mut shared);
    }

    pub fn set_routing(&mut self, line: u8, flag: u8, enabled: bool) {
        if line > 1 || flag > 3 {
            return;
        }
        let line = &mut self.routing[line as usize];
        if enabled {
            *line |= 1 << flag;
        } else {
            *line &= !(1 << flag);
        }
    }

    pub fn routing(&self, line: u8) -> u8 {
        self.routing.get(line as usize).copied().unwrap_or(0)
    }

    /// Level of processor interrupt line `line`.
    pub fn line_asserted(&self, line: u8) -> bool {
        self.flags & self.routing(line) != 0
    }

    pub fn set_flags(&mut self, mask: u8) {
        self.flags |= mask;
    }

    pub fn clear_flags(&mut self, mask: u8) {
        self.flags &= !mask;
    }

    pub fn rx_pop(&mut self, sm: u8) -> Option<u32> {
        self.sms[sm as usize % SM_COUNT].rx.pop_front()
    }

    pub fn tx_push(&mut self, sm: u8, word: u32) -> bool {
        let sm = &mut self.sms[sm as usize % SM_COUNT];
        if sm.tx.len() >= sm.tx_capacity() {
            return false;
        }
        sm.tx.push_back(word);
        true
    }

    /// Advance one system clock with the pads at `levels`.
    pub fn step(&mut self, levels: u32) {
        let Self {
            memory,
            sms,
            enabled,
            flags,
            latch,
            ..
        } = self;
        let mut shared = Shared {
            flags,
            latch,
            levels,
        };
        for (i, sm) in sms.iter_mut().enumerate() {
            if *enabled >> i & 1 == 1 && sm.clock_enable() {
                sm.cycle(i as u8, memory, &mut shared);
            }
        }
    }
}
