#![no_std]

/// Register image of one state machine: clock divider, execution control,
/// shift control and pin mapping, in the hardware bit layout.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SmRegisters {
    pub clkdiv: u32,
    pub execctrl: u32,
    pub shiftctrl: u32,
    pub pinctrl: u32,
}

/// Register-level access to one programmable I/O block.
///
/// State machines are addressed by index (0-3). Masks address several state
/// machines at once so cooperating channels can be started in the same clock.
pub trait PioHardware {
    /// Index of the block (0, 1, ...).
    fn block(&self) -> u8;

    /// Write one word of the shared instruction memory.
    fn write_instruction(&mut self, address: u8, instruction: u16);

    /// Enable or disable every state machine set in `mask`.
    fn set_enabled(&mut self, mask: u8, enabled: bool);

    /// Restart the state machines in `mask` together with their clock dividers.
    fn restart(&mut self, mask: u8);

    /// Load clock divider, execution control, shift control and pin mapping.
    fn write_sm_registers(&mut self, sm: u8, registers: &SmRegisters);

    /// Execute one instruction on a state machine right away.
    fn exec(&mut self, sm: u8, instruction: u16);

    /// Discard the contents of both FIFOs of a state machine.
    fn drain_fifos(&mut self, sm: u8);

    /// Hand a GPIO to this block (function select, input enable).
    fn claim_pin(&mut self, pin: u8);

    /// Route (or unroute) state-machine IRQ flag `flag` to processor line `line`.
    fn set_irq_routing(&mut self, line: u8, flag: u8, enabled: bool);

    /// Pop one word from the RX FIFO, `None` when empty.
    fn rx_pop(&mut self, sm: u8) -> Option<u32>;

    /// Push one word into the TX FIFO. Returns false when full.
    fn tx_push(&mut self, sm: u8, word: u32) -> bool;

    /// Raw state of the block's IRQ flags.
    fn irq_flags(&self) -> u8;

    /// Clear the IRQ flags set in `mask` (write-one-to-clear).
    fn clear_irq(&mut self, mask: u8);
}

/// Interrupt-context view of a block's IRQ flags.
///
/// Reading and write-one-to-clear are single register accesses, so a handle
/// can live in an interrupt handler next to the owning engine.
pub trait PioIrq {
    /// Raw state of the block's IRQ flags.
    fn flags(&self) -> u8;

    /// Clear the IRQ flags set in `mask`.
    fn clear(&self, mask: u8);
}

/// Direction of the shared data-bus lines.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BusDirection {
    /// High impedance; the weak pull-ups hold the idle level.
    Input,
    /// Driven by this board.
    Output,
}

/// The eight data-bus lines under processor (not state machine) control.
pub trait DataBus {
    /// Switch all eight lines at once.
    fn set_direction(&mut self, direction: BusDirection);

    /// Current direction of the lines.
    fn direction(&self) -> BusDirection;

    /// Put a byte on the output latches. Only visible while driving.
    fn put(&mut self, value: u8);

    /// Sample the eight lines.
    fn sample(&mut self) -> u8;
}

/// Board error indicator (status LED).
pub trait ErrorIndicator {
    fn set_error(&mut self, on: bool);
}
