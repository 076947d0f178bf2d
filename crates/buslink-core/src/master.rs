//! Bus master engine: blocking single-cycle reads and writes.
//!
//! The read and write drivers own the strobe timing and the data-bus
//! direction; the processor only hands bytes across the FIFOs. Neither call
//! has a timeout. A peripheral that never releases WAIT- hangs the caller.

use core::hint;

use buslink_hal::PioHardware;

use crate::board::{BoardPins, PinGroup, SmAssignment};
use crate::error::{Channel, EngineError};
use crate::handoff::{BusEvent, IrqRoute};
use crate::role::{already_initialized, BusEngine, BusRole, EngineState};
use crate::sm::program::{self, flag_mask, MASTER_READ_PARKED_FLAG, MASTER_WRITE_DONE_FLAG};
use crate::sm::{configure, ChannelSpec, ClockDivider, InstructionMemory, ShiftConfig, SmBinding};

const MODULE: &str = "bus master engine";

/// Master channels tick at sysclk / 16.
pub const MASTER_CLOCK_DIVIDER: ClockDivider = ClockDivider::from_int(16);

#[derive(Clone, Copy, Debug)]
pub struct MasterBindings {
    pub read: SmBinding,
    pub write: SmBinding,
}

pub struct MasterEngine<P> {
    pio: P,
    pins: BoardPins,
    sms: SmAssignment,
    memory: InstructionMemory,
    state: EngineState,
    bindings: Option<MasterBindings>,
}

impl<P: PioHardware> MasterEngine<P> {
    pub fn new(pio: P) -> Self {
        Self::with_board(pio, BoardPins::DEFAULT, SmAssignment::DEFAULT)
    }

    pub fn with_board(pio: P, pins: BoardPins, sms: SmAssignment) -> Self {
        MasterEngine {
            pio,
            pins,
            sms,
            memory: InstructionMemory::new(),
            state: EngineState::Uninitialized,
            bindings: None,
        }
    }

    /// Start from an instruction memory that already holds other programs.
    pub fn with_memory(mut self, memory: InstructionMemory) -> Self {
        self.memory = memory;
        self
    }

    /// Configure the write driver, then the read driver, then enable both.
    ///
    /// # Panics
    ///
    /// On a second call.
    pub fn init(&mut self) -> Result<(), EngineError> {
        if self.state != EngineState::Uninitialized {
            already_initialized(MODULE);
        }
        match self.bring_up() {
            Ok(bindings) => {
                self.bindings = Some(bindings);
                self.state = EngineState::Running;
                Ok(())
            }
            Err(e) => {
                self.state = EngineState::Failed(e);
                Err(e)
            }
        }
    }

    fn bring_up(&mut self) -> Result<MasterBindings, EngineError> {
        self.sms.validate(BusRole::Master)?;
        let strobes = self.pins.master_strobes()?;
        let data = self.pins.validated_data_bus()?;
        PinGroup::single(self.pins.wait)?;

        let read_program = program::master_read();
        let write_program = program::master_write();

        // The read driver goes second so the data pins end up as inputs.
        let write = ChannelSpec {
            clock_divider: MASTER_CLOCK_DIVIDER,
            out_shift: ShiftConfig::right(8),
            out_pins: data,
            side_set_pins: strobes,
            side_set_idle_high: true,
            jmp_pin: Some(self.pins.wait),
            ..ChannelSpec::new(self.sms.master_write, &write_program)
        };
        let read = ChannelSpec {
            clock_divider: MASTER_CLOCK_DIVIDER,
            in_shift: ShiftConfig::right(8),
            in_pins: data,
            side_set_pins: strobes,
            side_set_idle_high: true,
            jmp_pin: Some(self.pins.wait),
            ..ChannelSpec::new(self.sms.master_read, &read_program)
        };

        let write = self.configure(Channel::MasterWrite, &write)?;
        let read = self.configure(Channel::MasterRead, &read)?;

        self.pio
            .clear_irq(flag_mask(MASTER_READ_PARKED_FLAG) | flag_mask(MASTER_WRITE_DONE_FLAG));
        let mask = read.mask() | write.mask();
        self.pio.restart(mask);
        self.pio.set_enabled(mask, true);
        Ok(MasterBindings { read, write })
    }

    fn configure(&mut self, channel: Channel, spec: &ChannelSpec<'_>) -> Result<SmBinding, EngineError> {
        configure(&mut self.pio, &mut self.memory, spec)
            .map_err(|cause| EngineError::Configure { channel, cause })
    }

    fn running(&self) -> Result<MasterBindings, EngineError> {
        match (self.state, self.bindings) {
            (EngineState::Running, Some(bindings)) => Ok(bindings),
            _ => Err(EngineError::NotRunning),
        }
    }

    /// Run one read cycle and return the byte the peripheral drove.
    pub fn read(&mut self) -> Result<u8, EngineError> {
        let read = self.running()?.read;
        let parked = flag_mask(MASTER_READ_PARKED_FLAG);
        while self.pio.irq_flags() & parked == 0 {
            hint::spin_loop();
        }
        // releasing the parked driver starts the cycle
        self.pio.clear_irq(parked);
        let word = loop {
            if let Some(word) = self.pio.rx_pop(read.sm) {
                break word;
            }
            hint::spin_loop();
        };
        Ok(read.received_byte(word))
    }

    /// Run one write cycle. Returns once the strobes and data pins are
    /// released, so a following read cannot overlap it.
    pub fn write(&mut self, value: u8) -> Result<(), EngineError> {
        let write = self.running()?.write;
        let done = flag_mask(MASTER_WRITE_DONE_FLAG);
        self.pio.clear_irq(done);
        while !self.pio.tx_push(write.sm, value as u32) {
            hint::spin_loop();
        }
        while self.pio.irq_flags() & done == 0 {
            hint::spin_loop();
        }
        self.pio.clear_irq(done);
        Ok(())
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn bindings(&self) -> Option<&MasterBindings> {
        self.bindings.as_ref()
    }

    pub fn pio(&self) -> &P {
        &self.pio
    }

    pub fn pio_mut(&mut self) -> &mut P {
        &mut self.pio
    }
}

impl<P: PioHardware> BusEngine for MasterEngine<P> {
    fn role(&self) -> BusRole {
        BusRole::Master
    }

    fn init(&mut self) -> Result<(), EngineError> {
        MasterEngine::init(self)
    }

    fn state(&self) -> EngineState {
        self.state
    }

    fn interrupt_routes(&self) -> &[IrqRoute] {
        &[]
    }

    /// The master role raises no bus events.
    fn handle_event(&mut self, _event: BusEvent) {}
}
