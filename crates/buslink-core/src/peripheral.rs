//! Bus peripheral engine.
//!
//! Three channels snoop the host bus without processor involvement:
//!
//! - the read watcher raises a request flag when MODSEL- and RD- are low,
//! - the write watcher does the same for WR-,
//! - the wait enforcer drives WAIT- low the moment either watcher fires and
//!   holds it until software clears the WAIT-held flag.
//!
//! The deferred handler moves the data byte and then releases WAIT-, so the
//! host is held for exactly as long as servicing takes.

use core::hint;

use buslink_hal::{BusDirection, DataBus, PioHardware};

use crate::board::{BoardPins, PinGroup, SmAssignment};
use crate::error::{Channel, EngineError};
use crate::handoff::{BusEvent, EventKind, IrqRoute};
use crate::role::{already_initialized, BusEngine, BusRole, EngineState};
use crate::sm::program::{self, flag_mask, CYCLE_PENDING_FLAG, WAIT_HELD_FLAG};
use crate::sm::{configure, ChannelSpec, InstructionMemory, SmBinding};
use crate::source::{ReadSource, WriteSink};

const MODULE: &str = "bus peripheral engine";

/// Bindings of the three peripheral channels.
#[derive(Clone, Copy, Debug)]
pub struct PeripheralBindings {
    pub read_watcher: SmBinding,
    pub write_watcher: SmBinding,
    pub wait_enforcer: SmBinding,
}

impl PeripheralBindings {
    fn mask(&self) -> u8 {
        self.read_watcher.mask() | self.write_watcher.mask() | self.wait_enforcer.mask()
    }
}

pub struct PeripheralEngine<P, B, S, K> {
    pio: P,
    bus: B,
    source: S,
    sink: K,
    pins: BoardPins,
    sms: SmAssignment,
    memory: InstructionMemory,
    state: EngineState,
    bindings: Option<PeripheralBindings>,
    routes: [IrqRoute; 2],
}

impl<P, B, S, K> PeripheralEngine<P, B, S, K>
where
    P: PioHardware,
    B: DataBus,
    S: ReadSource,
    K: WriteSink,
{
    /// Engine on the default board wiring and state-machine assignment.
    pub fn new(pio: P, bus: B, source: S, sink: K) -> Self {
        Self::with_board(pio, bus, source, sink, BoardPins::DEFAULT, SmAssignment::DEFAULT)
    }

    pub fn with_board(
        pio: P,
        bus: B,
        source: S,
        sink: K,
        pins: BoardPins,
        sms: SmAssignment,
    ) -> Self {
        // `irq 0 rel` lands on flag (sm mod 4)
        let routes = [
            IrqRoute {
                flag: sms.read_watcher & 3,
                line: 0,
                kind: EventKind::BusRead,
            },
            IrqRoute {
                flag: sms.write_watcher & 3,
                line: 1,
                kind: EventKind::BusWrite,
            },
        ];
        PeripheralEngine {
            pio,
            bus,
            source,
            sink,
            pins,
            sms,
            memory: InstructionMemory::new(),
            state: EngineState::Uninitialized,
            bindings: None,
            routes,
        }
    }

    /// Start from an instruction memory that already holds other programs.
    pub fn with_memory(mut self, memory: InstructionMemory) -> Self {
        self.memory = memory;
        self
    }

    /// Configure all three channels, then enable them together.
    ///
    /// On error nothing is enabled and the engine stays failed.
    ///
    /// # Panics
    ///
    /// On a second call, whatever the outcome of the first.
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

    fn bring_up(&mut self) -> Result<PeripheralBindings, EngineError> {
        self.sms.validate(BusRole::Peripheral)?;
        let rd = PinGroup::single(self.pins.rd)?;
        let wr = PinGroup::single(self.pins.wr)?;
        let wait = PinGroup::single(self.pins.wait)?;
        self.pins.validated_data_bus()?;

        let watcher = program::strobe_watcher();
        let enforcer = program::wait_enforcer();

        let read_watcher = ChannelSpec {
            in_pins: rd,
            jmp_pin: Some(self.pins.modsel),
            ..ChannelSpec::new(self.sms.read_watcher, &watcher)
        };
        let write_watcher = ChannelSpec {
            in_pins: wr,
            jmp_pin: Some(self.pins.modsel),
            ..ChannelSpec::new(self.sms.write_watcher, &watcher)
        };
        let wait_enforcer = ChannelSpec {
            side_set_pins: wait,
            side_set_idle_high: true,
            ..ChannelSpec::new(self.sms.wait_enforcer, &enforcer)
        };

        let bindings = PeripheralBindings {
            read_watcher: self.configure(Channel::ReadWatcher, &read_watcher)?,
            write_watcher: self.configure(Channel::WriteWatcher, &write_watcher)?,
            wait_enforcer: self.configure(Channel::WaitEnforcer, &wait_enforcer)?,
        };

        self.bus.set_direction(BusDirection::Input);
        self.pio.clear_irq(
            flag_mask(self.routes[0].flag)
                | flag_mask(self.routes[1].flag)
                | flag_mask(CYCLE_PENDING_FLAG)
                | flag_mask(WAIT_HELD_FLAG),
        );
        for route in &self.routes {
            self.pio.set_irq_routing(route.line, route.flag, true);
        }

        let mask = bindings.mask();
        self.pio.restart(mask);
        self.pio.set_enabled(mask, true);
        Ok(bindings)
    }

    fn configure(&mut self, channel: Channel, spec: &ChannelSpec<'_>) -> Result<SmBinding, EngineError> {
        configure(&mut self.pio, &mut self.memory, spec)
            .map_err(|cause| EngineError::Configure { channel, cause })
    }

    /// Deferred handler body for one posted event.
    pub fn service(&mut self, event: BusEvent) {
        if !self.state.is_running() {
            return;
        }
        match event.kind {
            EventKind::BusRead => self.service_read(),
            EventKind::BusWrite => self.service_write(),
        }
    }

    /// Drive the next byte, release WAIT-, then let go of the bus.
    fn service_read(&mut self) {
        let value = self.source.next_byte();
        self.bus.set_direction(BusDirection::Output);
        self.bus.put(value);
        self.release_wait();
        self.bus.set_direction(BusDirection::Input);
    }

    /// Sample the byte the host drives, release WAIT-, then hand it on.
    fn service_write(&mut self) {
        self.bus.set_direction(BusDirection::Input);
        let value = self.bus.sample();
        self.release_wait();
        self.sink.accept(value);
    }

    fn release_wait(&mut self) {
        let held = flag_mask(WAIT_HELD_FLAG);
        // the enforcer sets the flag a couple of PIO cycles after the request
        while self.pio.irq_flags() & held == 0 {
            hint::spin_loop();
        }
        self.pio.clear_irq(held);
    }

    /// Sample the data bus directly, turning it around first if driven.
    pub fn read_direct(&mut self) -> u8 {
        if self.bus.direction() == BusDirection::Output {
            self.bus.set_direction(BusDirection::Input);
        }
        self.bus.sample()
    }

    /// Drive a byte onto the data bus directly. The bus stays driven.
    pub fn write_direct(&mut self, value: u8) {
        self.bus.set_direction(BusDirection::Output);
        self.bus.put(value);
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn bindings(&self) -> Option<&PeripheralBindings> {
        self.bindings.as_ref()
    }

    pub fn interrupt_routes(&self) -> &[IrqRoute] {
        &self.routes
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn sink(&self) -> &K {
        &self.sink
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn pio(&self) -> &P {
        &self.pio
    }

    pub fn pio_mut(&mut self) -> &mut P {
        &mut self.pio
    }
}

impl<P, B, S, K> BusEngine for PeripheralEngine<P, B, S, K>
where
    P: PioHardware,
    B: DataBus,
    S: ReadSource,
    K: WriteSink,
{
    fn role(&self) -> BusRole {
        BusRole::Peripheral
    }

    fn init(&mut self) -> Result<(), EngineError> {
        PeripheralEngine::init(self)
    }

    fn state(&self) -> EngineState {
        self.state
    }

    fn interrupt_routes(&self) -> &[IrqRoute] {
        &self.routes
    }

    fn handle_event(&mut self, event: BusEvent) {
        self.service(event)
    }
}
