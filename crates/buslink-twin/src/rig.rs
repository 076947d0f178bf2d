//! Test rigs: an engine on a simulated board, with the interrupt controller
//! and the deferred-work loop the firmware would provide.

use std::cell::RefCell;
use std::rc::Rc;

use buslink_core::board::BoardPins;
use buslink_core::handoff::on_bus_interrupt;
use buslink_core::sched::{HandlerTable, EVENT_QUEUE_CAPACITY};
use buslink_core::sm::InstructionMemory;
use buslink_core::source::DecrementingCounter;
use buslink_core::{BusEngine, BusEvent, EventKind, IrqRoute, MasterEngine, PeripheralEngine};
use heapless::Deque;

use crate::error::{Result, TwinError};
use crate::host::{CycleRecord, HostOp};
use crate::world::{Twin, TwinDataBus, TwinPio};

/// Cycles a single host bus cycle may take before the rig gives up.
pub const CYCLE_BUDGET: u64 = 20_000;

pub type CaptureSink = Box<dyn FnMut(u8)>;
pub type TwinPeripheralEngine =
    PeripheralEngine<TwinPio, TwinDataBus, DecrementingCounter, CaptureSink>;
pub type TwinMasterEngine = MasterEngine<TwinPio>;

fn forward<E: BusEngine>(engine: &mut E, event: BusEvent) {
    engine.handle_event(event);
}

/// Interrupt controller plus dispatch loop around one engine.
///
/// After every system cycle each routed line is sampled; an asserted line
/// runs the interrupt body, and the queue is then drained through the
/// handler table, all before the next cycle.
pub struct Dispatcher<E> {
    twin: Twin,
    irq: TwinPio,
    engine: E,
    handlers: HandlerTable<E>,
    queue: Deque<BusEvent, EVENT_QUEUE_CAPACITY>,
    routes: Vec<IrqRoute>,
    dispatched: usize,
    dropped: usize,
}

impl<E: BusEngine> Dispatcher<E> {
    pub fn new(twin: &Twin, engine: E) -> Result<Self> {
        let mut handlers = HandlerTable::new();
        handlers.register(EventKind::BusRead, forward::<E>)?;
        handlers.register(EventKind::BusWrite, forward::<E>)?;
        Ok(Dispatcher {
            twin: twin.clone(),
            irq: twin.pio(),
            engine,
            handlers,
            queue: Deque::new(),
            routes: Vec::new(),
            dispatched: 0,
            dropped: 0,
        })
    }

    /// Start the engine, then unmask exactly the lines it reports.
    pub fn init(&mut self) -> Result<()> {
        self.engine.init().map_err(TwinError::Engine)?;
        self.routes = self.engine.interrupt_routes().to_vec();
        log::info!(
            "{} engine running, {} interrupt line(s)",
            self.engine.role().name(),
            self.routes.len()
        );
        Ok(())
    }

    /// One system cycle plus the interrupt and deferred work it triggers.
    pub fn step(&mut self) {
        self.twin.tick();
        for route in &self.routes {
            if !self.twin.line_asserted(route.line) {
                continue;
            }
            if let Err(event) = on_bus_interrupt(&self.irq, route, &mut self.queue) {
                self.dropped += 1;
                log::warn!("event queue full, dropped {:?}", event.kind);
            }
        }
        while let Some(event) = self.queue.pop_front() {
            log::trace!("dispatch {:?} (flags {:#04x})", event.kind, event.status);
            if self.handlers.dispatch(&mut self.engine, event) {
                self.dispatched += 1;
            } else {
                log::warn!("no handler for {:?}", event.kind);
            }
        }
    }

    /// Step until `done` holds, or fail after `budget` cycles.
    pub fn run_until(
        &mut self,
        what: &'static str,
        budget: u64,
        mut done: impl FnMut(&Twin) -> bool,
    ) -> Result<u64> {
        let start = self.twin.cycle();
        while !done(&self.twin) {
            if self.twin.cycle() - start > budget {
                return Err(TwinError::Timeout { what, budget });
            }
            self.step();
        }
        Ok(self.twin.cycle() - start)
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    pub fn routes(&self) -> &[IrqRoute] {
        &self.routes
    }

    pub fn dispatched(&self) -> usize {
        self.dispatched
    }

    pub fn dropped(&self) -> usize {
        self.dropped
    }
}

/// Peripheral engine on a simulated board, serving a decrementing counter
/// to a simulated host and capturing what the host writes.
pub struct PeripheralRig {
    twin: Twin,
    dispatcher: Dispatcher<TwinPeripheralEngine>,
    captured: Rc<RefCell<Vec<u8>>>,
}

impl PeripheralRig {
    pub fn new(counter: u8) -> Result<Self> {
        Self::with_memory(counter, InstructionMemory::new())
    }

    /// Rig whose engine starts from an already partly used instruction
    /// memory.
    pub fn with_memory(counter: u8, memory: InstructionMemory) -> Result<Self> {
        let twin = Twin::peripheral(BoardPins::DEFAULT);
        let captured = Rc::new(RefCell::new(Vec::new()));
        let sink: CaptureSink = {
            let captured = captured.clone();
            Box::new(move |value| captured.borrow_mut().push(value))
        };
        let engine = PeripheralEngine::new(
            twin.pio(),
            twin.data_bus(),
            DecrementingCounter::new(counter),
            sink,
        )
        .with_memory(memory);
        let dispatcher = Dispatcher::new(&twin, engine)?;
        Ok(PeripheralRig {
            twin,
            dispatcher,
            captured,
        })
    }

    pub fn init(&mut self) -> Result<()> {
        self.dispatcher.init()
    }

    /// Let the simulated host run one cycle to completion.
    pub fn host_cycle(&mut self, op: HostOp) -> Result<CycleRecord> {
        let started = {
            let mut world = self.twin.world_mut();
            let host = world.host.as_mut().ok_or(TwinError::NotAttached("host CPU"))?;
            let count = host.records().len();
            if !host.start(op) {
                return Err(TwinError::HostBusy);
            }
            count
        };
        let what = match op {
            HostOp::Read => "host read cycle",
            HostOp::Write(_) => "host write cycle",
        };
        self.dispatcher.run_until(what, CYCLE_BUDGET, |twin| {
            twin.world()
                .host
                .as_ref()
                .map_or(true, |host| host.records().len() > started)
        })?;
        let world = self.twin.world();
        world
            .host
            .as_ref()
            .and_then(|host| host.last_record().copied())
            .ok_or(TwinError::NotAttached("host CPU"))
    }

    pub fn host_read(&mut self) -> Result<CycleRecord> {
        self.host_cycle(HostOp::Read)
    }

    pub fn host_write(&mut self, value: u8) -> Result<CycleRecord> {
        self.host_cycle(HostOp::Write(value))
    }

    /// Keep the board running without new host activity.
    pub fn settle(&mut self, cycles: u64) {
        for _ in 0..cycles {
            self.dispatcher.step();
        }
    }

    /// Bytes the write sink has received so far.
    pub fn captured(&self) -> Vec<u8> {
        self.captured.borrow().clone()
    }

    pub fn twin(&self) -> &Twin {
        &self.twin
    }

    pub fn engine(&self) -> &TwinPeripheralEngine {
        self.dispatcher.engine()
    }

    pub fn engine_mut(&mut self) -> &mut TwinPeripheralEngine {
        self.dispatcher.engine_mut()
    }

    pub fn dispatcher(&self) -> &Dispatcher<TwinPeripheralEngine> {
        &self.dispatcher
    }
}

/// Master engine on a simulated board wired to an echo peripheral.
pub struct MasterRig {
    twin: Twin,
    engine: TwinMasterEngine,
}

impl MasterRig {
    pub fn new(wait_cycles: u32) -> Self {
        Self::with_memory(wait_cycles, InstructionMemory::new())
    }

    pub fn with_memory(wait_cycles: u32, memory: InstructionMemory) -> Self {
        let twin = Twin::master(BoardPins::DEFAULT, wait_cycles);
        let engine = MasterEngine::new(twin.pio()).with_memory(memory);
        MasterRig { twin, engine }
    }

    pub fn init(&mut self) -> Result<()> {
        self.engine.init().map_err(TwinError::Engine)?;
        log::info!("master engine running");
        Ok(())
    }

    pub fn read(&mut self) -> Result<u8> {
        self.engine.read().map_err(TwinError::Call)
    }

    pub fn write(&mut self, value: u8) -> Result<()> {
        self.engine.write(value).map_err(TwinError::Call)
    }

    /// Bytes the echo peripheral latched.
    pub fn echoed_writes(&self) -> Vec<u8> {
        self.twin
            .world()
            .echo
            .as_ref()
            .map(|echo| echo.writes().to_vec())
            .unwrap_or_default()
    }

    pub fn twin(&self) -> &Twin {
        &self.twin
    }

    pub fn engine(&self) -> &TwinMasterEngine {
        &self.engine
    }
}
