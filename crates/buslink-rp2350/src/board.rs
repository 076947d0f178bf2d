//! Pad setup for the bus lines, one layout per role.
//!
//! Lines this board drives start out as processor outputs at their inactive
//! level and stay driven until the configurator hands them to PIO1. Lines
//! the far end drives only get a pull here.

use buslink_core::board::{BoardPins, LinePull, LineSetup};
use buslink_core::BusRole;
use rp235x_hal as hal;

use hal::gpio::bank0::Gpio25;
use hal::gpio::{
    DynPinId, FunctionNull, FunctionSioInput, FunctionSioOutput, OutputDriveStrength, Pin, PinId,
    PinState, Pins, PullDown, PullNone, PullType, PullUp, ValidFunction,
};

const fn is(role: BusRole, pin: u8, setup: LineSetup) -> bool {
    match (BoardPins::DEFAULT.line_setup(role, pin), setup) {
        (Some(LineSetup::DriveHigh), LineSetup::DriveHigh) => true,
        (Some(LineSetup::Input(a)), LineSetup::Input(b)) => a as u8 == b as u8,
        _ => false,
    }
}

const DRIVEN: LineSetup = LineSetup::DriveHigh;
const PULL_UP: LineSetup = LineSetup::Input(LinePull::Up);
const PULL_DOWN: LineSetup = LineSetup::Input(LinePull::Down);

// The pin handles below are taken by name; keep them in step with the map
// and with the per-role bring-up layout.
const _: () = {
    let p = BoardPins::DEFAULT;
    assert!(p.data_bus.base() == 2 && p.data_bus.count() == 8);
    assert!(p.addr == 10 && p.rd == 11 && p.wr == 12 && p.modsel == 13);
    assert!(p.wait == 14 && p.intrq == 15 && p.status_led == 25);

    let mut pin = 2;
    while pin < 10 {
        assert!(is(BusRole::Peripheral, pin, PULL_UP) && is(BusRole::Master, pin, PULL_UP));
        pin += 1;
    }

    assert!(is(BusRole::Peripheral, 10, PULL_DOWN));
    assert!(is(BusRole::Peripheral, 11, PULL_UP));
    assert!(is(BusRole::Peripheral, 12, PULL_UP));
    assert!(is(BusRole::Peripheral, 13, PULL_UP));
    assert!(is(BusRole::Peripheral, 14, DRIVEN));
    assert!(is(BusRole::Peripheral, 15, DRIVEN));

    // no window where the master strobes float before PIO1 takes them
    assert!(is(BusRole::Master, 10, DRIVEN));
    assert!(is(BusRole::Master, 11, DRIVEN));
    assert!(is(BusRole::Master, 12, DRIVEN));
    assert!(is(BusRole::Master, 13, DRIVEN));
    assert!(is(BusRole::Master, 14, PULL_UP));
    assert!(is(BusRole::Master, 15, PULL_UP));
};

/// A data-bus line under processor control.
pub type DataLine = Pin<DynPinId, FunctionSioInput, PullUp>;

/// A control line the processor drives, idle high.
pub type ControlLine = Pin<DynPinId, FunctionSioOutput, PullNone>;

pub type StatusLedPin = Pin<Gpio25, FunctionSioOutput, PullDown>;

type Unconfigured<I> = Pin<I, FunctionNull, PullDown>;

/// Peripheral role: the host drives the strobes, this board drives WAIT-,
/// INTRQ- and (while servicing a read) the data bus.
pub struct PeripheralLines {
    /// DATA0..DATA7, input with pull-ups until a read is serviced.
    pub data: [DataLine; 8],
    /// WAIT- and INTRQ-, held inactive. WAIT- passes to the wait enforcer.
    pub held: [ControlLine; 2],
}

/// Master role: this board drives C-/D and the strobes, the peripheral
/// drives WAIT- and INTRQ-.
pub struct MasterLines {
    /// C-/D, RD-, WR- and MODSEL-, held high. The strobes pass to the
    /// master drivers.
    pub held: [ControlLine; 4],
}

fn data_line<I>(pin: Unconfigured<I>) -> DataLine
where
    I: PinId + ValidFunction<FunctionSioInput>,
{
    let mut pin = pin.into_pull_up_input();
    pin.set_drive_strength(OutputDriveStrength::FourMilliAmps);
    pin.into_dyn_pin()
}

fn control_line<I>(pin: Unconfigured<I>) -> ControlLine
where
    I: PinId + ValidFunction<FunctionSioOutput>,
{
    let mut pin = pin
        .into_pull_type::<PullNone>()
        .into_push_pull_output_in_state(PinState::High);
    pin.set_drive_strength(OutputDriveStrength::FourMilliAmps);
    pin.into_dyn_pin()
}

/// Pull only; the function select is left to whoever reads the line.
fn pulled<I, P>(pin: Unconfigured<I>)
where
    I: PinId,
    P: PullType,
{
    let _ = pin.into_pull_type::<P>();
}

pub struct Board<L> {
    pub lines: L,
    pub led: StatusLedPin,
}

impl Board<PeripheralLines> {
    pub fn peripheral(pins: Pins) -> Self {
        pulled::<_, PullDown>(pins.gpio10);
        pulled::<_, PullUp>(pins.gpio11);
        pulled::<_, PullUp>(pins.gpio12);
        pulled::<_, PullUp>(pins.gpio13);
        Board {
            lines: PeripheralLines {
                data: [
                    data_line(pins.gpio2),
                    data_line(pins.gpio3),
                    data_line(pins.gpio4),
                    data_line(pins.gpio5),
                    data_line(pins.gpio6),
                    data_line(pins.gpio7),
                    data_line(pins.gpio8),
                    data_line(pins.gpio9),
                ],
                held: [control_line(pins.gpio14), control_line(pins.gpio15)],
            },
            led: pins.gpio25.into_push_pull_output(),
        }
    }
}

impl Board<MasterLines> {
    pub fn master(pins: Pins) -> Self {
        // the write driver turns the data lines around itself
        let _ = data_line(pins.gpio2);
        let _ = data_line(pins.gpio3);
        let _ = data_line(pins.gpio4);
        let _ = data_line(pins.gpio5);
        let _ = data_line(pins.gpio6);
        let _ = data_line(pins.gpio7);
        let _ = data_line(pins.gpio8);
        let _ = data_line(pins.gpio9);
        pulled::<_, PullUp>(pins.gpio14);
        pulled::<_, PullUp>(pins.gpio15);
        Board {
            lines: MasterLines {
                held: [
                    control_line(pins.gpio10),
                    control_line(pins.gpio11),
                    control_line(pins.gpio12),
                    control_line(pins.gpio13),
                ],
            },
            led: pins.gpio25.into_push_pull_output(),
        }
    }
}
