//! RP2350 parallel-bus bridge firmware.
//!
//! The bus role is fixed at build time (`bus-master` feature). In the
//! peripheral role the PIO1 request flags raise PIO1_IRQ_0/1; the handlers
//! post a [`BusEvent`] and the main loop services it. The master role is
//! driven synchronously from the main loop.

#![no_std]
#![no_main]

mod board;
#[cfg(not(feature = "bus-master"))]
mod data_bus;
mod fatal;
mod pio_hw;
mod role;

use core::cell::RefCell;

use defmt_rtt as _;
use panic_probe as _;
use rp235x_hal as hal;

use critical_section::Mutex;
use hal::pac::{self, interrupt};
use hal::sio::Sio;

use buslink_core::handoff::on_bus_interrupt;
use buslink_core::sched::{EventConsumer, EventProducer, EventQueue, HandlerTable};
use buslink_core::{BusEngine, BusEvent, IrqRoute};

use pio_hw::{Rp2350Pio, Rp2350PioIrq};
use role::Engine;

/// Boot ROM image definition for Cortex-M33 secure mode.
#[link_section = ".start_block"]
#[used]
pub static IMAGE_DEF: hal::block::ImageDef = hal::block::ImageDef::secure_exe();

/// External crystal frequency (Pico 2 standard).
const XTAL_FREQ_HZ: u32 = 12_000_000;

/// Deferred-work queue between the bus interrupts and the main loop.
/// Safety: split once in `main` before any bus interrupt is unmasked; the
/// producer then lives only in interrupt context, the consumer only in the
/// main loop.
static mut EVENT_QUEUE: EventQueue = EventQueue::new();

/// What the bus interrupt handlers need, installed before they are unmasked.
struct IsrContext {
    producer: EventProducer<'static>,
    /// Route served by each PIO1 interrupt line.
    routes: [Option<IrqRoute>; 2],
    dropped: u32,
}

static ISR_CONTEXT: Mutex<RefCell<Option<IsrContext>>> = Mutex::new(RefCell::new(None));

fn forward(engine: &mut Engine, event: BusEvent) {
    engine.handle_event(event);
}

#[hal::entry]
fn main() -> ! {
    defmt::info!("buslink-rp2350: starting");

    let mut pac = pac::Peripherals::take().unwrap();
    let mut watchdog = hal::Watchdog::new(pac.WATCHDOG);

    // Initialize clocks from 12 MHz crystal.
    let _clocks = hal::clocks::init_clocks_and_plls(
        XTAL_FREQ_HZ,
        pac.XOSC,
        pac.CLOCKS,
        pac.PLL_SYS,
        pac.PLL_USB,
        &mut pac.RESETS,
        &mut watchdog,
    )
    .unwrap();

    let sio = Sio::new(pac.SIO);
    let pins = hal::gpio::Pins::new(
        pac.IO_BANK0,
        pac.PADS_BANK0,
        sio.gpio_bank0,
        &mut pac.RESETS,
    );

    let pio = Rp2350Pio::new(pac.PIO1, &mut pac.RESETS);
    let (mut engine, _held, mut led) = role::build(pins, pio);
    defmt::info!("role: {=str}", engine.role().name());

    let mut handlers: HandlerTable<Engine> = HandlerTable::new();
    let mut routes = [None; 2];
    for route in engine.interrupt_routes() {
        if let Err(e) = handlers.register(route.kind, forward) {
            defmt::error!("{}", e);
            fatal::board_panic(&mut led, "handler registration", -1);
        }
        routes[route.line as usize] = Some(*route);
    }

    if let Err(e) = engine.init() {
        defmt::error!("engine: {}", e);
        fatal::board_panic(&mut led, "bus engine init", e.status());
    }

    // Safety: the only split of EVENT_QUEUE; no bus interrupt is unmasked yet.
    let (producer, mut consumer): (EventProducer<'static>, EventConsumer<'static>) =
        unsafe { (*core::ptr::addr_of_mut!(EVENT_QUEUE)).split() };

    critical_section::with(|cs| {
        ISR_CONTEXT.borrow_ref_mut(cs).replace(IsrContext {
            producer,
            routes,
            dropped: 0,
        });
    });

    for (line, route) in routes.iter().enumerate() {
        if route.is_none() {
            continue;
        }
        let irq = match line {
            0 => pac::Interrupt::PIO1_IRQ_0,
            _ => pac::Interrupt::PIO1_IRQ_1,
        };
        // Safety: handler context is installed above.
        unsafe { pac::NVIC::unmask(irq) };
    }

    role::after_start(&mut engine, &mut led);

    loop {
        match consumer.dequeue() {
            Some(event) => {
                if !handlers.dispatch(&mut engine, event) {
                    defmt::warn!("no handler for {}", event);
                }
            }
            // interrupts stay masked between the check and the sleep; a
            // pending one still wakes the core
            None => critical_section::with(|_| {
                if !consumer.ready() {
                    cortex_m::asm::wfi();
                }
            }),
        }
    }
}

/// Interrupt body shared by both PIO1 lines.
fn bus_interrupt(line: usize) {
    critical_section::with(|cs| {
        let mut context = ISR_CONTEXT.borrow_ref_mut(cs);
        let Some(context) = context.as_mut() else {
            return;
        };
        let Some(route) = context.routes[line] else {
            return;
        };
        if on_bus_interrupt(&Rp2350PioIrq, &route, &mut context.producer).is_err() {
            context.dropped += 1;
            defmt::warn!("bus event dropped ({=u32} so far)", context.dropped);
        }
    });
}

#[interrupt]
fn PIO1_IRQ_0() {
    bus_interrupt(0);
}

#[interrupt]
fn PIO1_IRQ_1() {
    bus_interrupt(1);
}

/// Program metadata for `picotool info`.
#[link_section = ".bi_entries"]
#[used]
pub static PICOTOOL_ENTRIES: [hal::binary_info::EntryAddr; 5] = [
    hal::binary_info::rp_cargo_bin_name!(),
    hal::binary_info::rp_cargo_version!(),
    hal::binary_info::rp_program_description!(c"Parallel bus bridge on PIO1"),
    hal::binary_info::rp_cargo_homepage_url!(),
    hal::binary_info::rp_program_build_attribute!(),
];
