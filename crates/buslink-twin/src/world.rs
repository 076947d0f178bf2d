//! The simulated board and what is attached to it, plus the handles through
//! which the engines reach it.
//!
//! Every handle operation first advances the world by [`OP_CYCLES`] system
//! cycles, standing in for the time the processor spends on the access.
//! Interrupt-context reads ([`buslink_hal::PioIrq`]) take no time.

use std::cell::{Ref, RefCell, RefMut};
use std::rc::Rc;

use buslink_core::board::{BoardPins, LinePull, LineSetup, SmAssignment};
use buslink_core::BusRole;
use buslink_hal::{BusDirection, DataBus, PioHardware, PioIrq, SmRegisters};

use crate::echo::EchoPeripheral;
use crate::host::HostCpu;
use crate::pads::{PadFunction, Pads, Pull};
use crate::pio::PioBlock;

/// System cycles one processor access to the block or the pads costs.
pub const OP_CYCLES: u32 = 4;

pub struct World {
    pub pins: BoardPins,
    pub pio: PioBlock,
    pub pads: Pads,
    pub host: Option<HostCpu>,
    pub echo: Option<EchoPeripheral>,
    cycle: u64,
}

impl World {
    fn new(pins: BoardPins, block: u8) -> Self {
        World {
            pins,
            pio: PioBlock::new(block),
            pads: Pads::new(),
            host: None,
            echo: None,
            cycle: 0,
        }
    }

    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    /// Advance one system cycle: resolve the pads, step the block, then let
    /// the attached devices react to the levels.
    pub fn tick(&mut self) {
        let levels = self.pads.resolve(self.pio.latch());
        self.pio.step(levels);
        let driven = self.pads.board_driven(self.pio.latch());
        if let Some(host) = self.host.as_mut() {
            host.tick(self.cycle, &mut self.pads, driven);
        }
        if let Some(echo) = self.echo.as_mut() {
            echo.tick(&mut self.pads);
        }
        self.cycle += 1;
    }

    pub fn run(&mut self, cycles: u32) {
        for _ in 0..cycles {
            self.tick();
        }
    }

    /// Pad state the firmware leaves the bus lines in for `role`.
    fn bring_up(&mut self, role: BusRole) {
        let pins = self.pins;
        for (pin, setup) in pins.bring_up(role) {
            match setup {
                LineSetup::Input(pull) => self.pads.set_pull(
                    pin,
                    match pull {
                        LinePull::None => Pull::None,
                        LinePull::Up => Pull::Up,
                        LinePull::Down => Pull::Down,
                    },
                ),
                LineSetup::DriveHigh => {
                    self.pads.sio_write(1 << pin, 1 << pin);
                    self.pads.sio_output_enable(1 << pin, true);
                }
            }
        }
    }

    /// The board drives any of the data lines.
    pub fn data_bus_driven(&self) -> bool {
        self.pads.board_driven(self.pio.latch()) & self.pins.data_mask() != 0
    }
}

/// Shared handle to a simulated board.
#[derive(Clone)]
pub struct Twin {
    world: Rc<RefCell<World>>,
}

impl Twin {
    /// Board in the peripheral role with a host CPU attached.
    pub fn peripheral(pins: BoardPins) -> Self {
        let mut world = World::new(pins, SmAssignment::DEFAULT.block);
        world.bring_up(BusRole::Peripheral);
        let host = HostCpu::new(pins);
        host.attach(&mut world.pads);
        world.host = Some(host);
        Self::from_world(world)
    }

    /// Board in the master role with an echo peripheral holding WAIT- for
    /// `wait_cycles` on every strobe.
    pub fn master(pins: BoardPins, wait_cycles: u32) -> Self {
        let mut world = World::new(pins, SmAssignment::DEFAULT.block);
        world.bring_up(BusRole::Master);
        world.echo = Some(EchoPeripheral::new(pins, wait_cycles));
        Self::from_world(world)
    }

    fn from_world(mut world: World) -> Self {
        // settle the pulls before anything samples them
        world.pads.resolve(world.pio.latch());
        Twin {
            world: Rc::new(RefCell::new(world)),
        }
    }

    pub fn world(&self) -> Ref<'_, World> {
        self.world.borrow()
    }

    pub fn world_mut(&self) -> RefMut<'_, World> {
        self.world.borrow_mut()
    }

    pub fn tick(&self) {
        self.world.borrow_mut().tick();
    }

    pub fn run(&self, cycles: u32) {
        self.world.borrow_mut().run(cycles);
    }

    pub fn cycle(&self) -> u64 {
        self.world.borrow().cycle()
    }

    pub fn line_asserted(&self, line: u8) -> bool {
        self.world.borrow().pio.line_asserted(line)
    }

    pub fn pio(&self) -> TwinPio {
        TwinPio { twin: self.clone() }
    }

    pub fn data_bus(&self) -> TwinDataBus {
        let pins = self.world.borrow().pins;
        TwinDataBus {
            twin: self.clone(),
            mask: pins.data_mask(),
            shift: pins.data_shift(),
        }
    }

    /// Advance the world for one processor access, then apply `f`.
    fn access<R>(&self, f: impl FnOnce(&mut World) -> R) -> R {
        let mut world = self.world.borrow_mut();
        world.run(OP_CYCLES);
        f(&mut world)
    }
}

/// [`PioHardware`] over the simulated block. Also serves as the interrupt
/// handle.
#[derive(Clone)]
pub struct TwinPio {
    twin: Twin,
}

impl PioHardware for TwinPio {
    fn block(&self) -> u8 {
        self.twin.world().pio.index()
    }

    fn write_instruction(&mut self, address: u8, instruction: u16) {
        self.twin.access(|w| w.pio.write_instruction(address, instruction));
    }

    fn set_enabled(&mut self, mask: u8, enabled: bool) {
        self.twin.access(|w| w.pio.set_enabled(mask, enabled));
    }

    fn restart(&mut self, mask: u8) {
        self.twin.access(|w| w.pio.restart(mask));
    }

    fn write_sm_registers(&mut self, sm: u8, registers: &SmRegisters) {
        self.twin.access(|w| w.pio.write_registers(sm, registers));
    }

    fn exec(&mut self, sm: u8, instruction: u16) {
        self.twin.access(|w| {
            let levels = w.pads.levels();
            w.pio.force_exec(sm, instruction, levels);
        });
    }

    fn drain_fifos(&mut self, sm: u8) {
        self.twin.access(|w| w.pio.drain(sm));
    }

    fn claim_pin(&mut self, pin: u8) {
        self.twin.access(|w| w.pads.set_function(pin, PadFunction::Pio));
    }

    fn set_irq_routing(&mut self, line: u8, flag: u8, enabled: bool) {
        self.twin.access(|w| w.pio.set_routing(line, flag, enabled));
    }

    fn rx_pop(&mut self, sm: u8) -> Option<u32> {
        self.twin.access(|w| w.pio.rx_pop(sm))
    }

    fn tx_push(&mut self, sm: u8, word: u32) -> bool {
        self.twin.access(|w| w.pio.tx_push(sm, word))
    }

    fn irq_flags(&self) -> u8 {
        self.twin.access(|w| w.pio.flags())
    }

    fn clear_irq(&mut self, mask: u8) {
        self.twin.access(|w| w.pio.clear_flags(mask));
    }
}

impl PioIrq for TwinPio {
    fn flags(&self) -> u8 {
        self.twin.world().pio.flags()
    }

    fn clear(&self, mask: u8) {
        self.twin.world_mut().pio.clear_flags(mask);
    }
}

/// [`DataBus`] over the processor-controlled data pads.
#[derive(Clone)]
pub struct TwinDataBus {
    twin: Twin,
    mask: u32,
    shift: u8,
}

impl DataBus for TwinDataBus {
    fn set_direction(&mut self, direction: BusDirection) {
        let mask = self.mask;
        self.twin.access(|w| {
            w.pads
                .sio_output_enable(mask, direction == BusDirection::Output)
        });
    }

    fn direction(&self) -> BusDirection {
        if self.twin.world().pads.sio_output_enabled() & self.mask != 0 {
            BusDirection::Output
        } else {
            BusDirection::Input
        }
    }

    fn put(&mut self, value: u8) {
        let (mask, shift) = (self.mask, self.shift);
        self.twin
            .access(|w| w.pads.sio_write(mask, (value as u32) << shift));
    }

    fn sample(&mut self) -> u8 {
        let (mask, shift) = (self.mask, self.shift);
        self.twin
            .access(|w| ((w.pads.levels() & mask) >> shift) as u8)
    }
}
