//! State-machine configurator: load a program, wire its pin groups and shift
//! registers, and leave the channel initialized but disabled.
//!
//! Enabling is left to the caller so that all channels of one bus role can be
//! started in the same clock with a single mask write.

use core::fmt;

use pio::{InstructionOperands, JmpCondition, SetDestination};

use buslink_hal::{PioHardware, SmRegisters};

use crate::board::{PinGroup, PinGroupError, GPIO_COUNT};

use super::config::{ClockDivider, FifoJoin, ShiftConfig, SmConfig};
use super::memory::{InstructionMemory, LoadError, LoadedProgram};
use super::program::BusProgram;

/// SET reaches at most five consecutive pins per instruction.
const SET_GROUP_MAX: u8 = 5;

/// Why a channel could not be configured.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigureError {
    /// Program memory could not take the program.
    Load(LoadError),
    /// A pin group does not fit the field that maps it.
    Pins(PinGroupError),
    /// Side-set pin group does not match the program's side-set width.
    SideSetMismatch { program: u8, pins: u8 },
}

impl ConfigureError {
    /// Negative status code, the value a failed binding's offset would carry.
    pub const fn status(&self) -> i32 {
        match self {
            ConfigureError::Load(LoadError::NoSpace) => -1,
            ConfigureError::Load(LoadError::TooLarge) => -2,
            ConfigureError::Load(LoadError::OriginUnavailable(_)) => -3,
            ConfigureError::Pins(_) => -4,
            ConfigureError::SideSetMismatch { .. } => -5,
        }
    }
}

impl From<LoadError> for ConfigureError {
    fn from(e: LoadError) -> Self {
        ConfigureError::Load(e)
    }
}

impl From<PinGroupError> for ConfigureError {
    fn from(e: PinGroupError) -> Self {
        ConfigureError::Pins(e)
    }
}

impl fmt::Display for ConfigureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigureError::Load(LoadError::NoSpace) => write!(f, "instruction memory full"),
            ConfigureError::Load(LoadError::TooLarge) => {
                write!(f, "program larger than instruction memory")
            }
            ConfigureError::Load(LoadError::OriginUnavailable(origin)) => {
                write!(f, "program origin {} unavailable", origin)
            }
            ConfigureError::Pins(e) => write!(f, "{}", e),
            ConfigureError::SideSetMismatch { program, pins } => {
                write!(f, "program side-sets {} pins, group has {}", program, pins)
            }
        }
    }
}

/// Everything needed to bring up one channel.
#[derive(Clone, Copy)]
pub struct ChannelSpec<'a> {
    /// State-machine index within the block.
    pub sm: u8,
    pub program: &'a BusProgram,
    /// Builds the starting configuration from the loaded program.
    pub default_config: fn(&LoadedProgram) -> SmConfig,
    pub clock_divider: ClockDivider,
    pub fifo_join: FifoJoin,
    pub in_shift: ShiftConfig,
    pub out_shift: ShiftConfig,
    pub in_pins: PinGroup,
    pub out_pins: PinGroup,
    pub set_pins: PinGroup,
    pub side_set_pins: PinGroup,
    pub jmp_pin: Option<u8>,
    /// Preload the side-set group high before it becomes an output, for
    /// active-low strobes.
    pub side_set_idle_high: bool,
}

impl<'a> ChannelSpec<'a> {
    /// A channel with no pins, unity clock and reset shift configuration.
    pub fn new(sm: u8, program: &'a BusProgram) -> Self {
        ChannelSpec {
            sm,
            program,
            default_config: SmConfig::for_program,
            clock_divider: ClockDivider::UNITY,
            fifo_join: FifoJoin::Separate,
            in_shift: ShiftConfig::UNUSED,
            out_shift: ShiftConfig::UNUSED,
            in_pins: PinGroup::EMPTY,
            out_pins: PinGroup::EMPTY,
            set_pins: PinGroup::EMPTY,
            side_set_pins: PinGroup::EMPTY,
            jmp_pin: None,
            side_set_idle_high: false,
        }
    }

    fn validate(&self) -> Result<(), ConfigureError> {
        self.set_pins.at_most(SET_GROUP_MAX)?;
        self.side_set_pins.at_most(SET_GROUP_MAX)?;
        if let Some(pin) = self.jmp_pin {
            PinGroup::single(pin)?;
        }
        let side_set = self.program.side_set;
        let program_pins = side_set.bits() - side_set.optional() as u8;
        if !self.side_set_pins.is_empty() && self.side_set_pins.count() != program_pins {
            return Err(ConfigureError::SideSetMismatch {
                program: program_pins,
                pins: self.side_set_pins.count(),
            });
        }
        Ok(())
    }
}

/// A configured, disabled channel.
#[derive(Clone, Copy, Debug)]
pub struct SmBinding {
    pub block: u8,
    pub sm: u8,
    pub program: LoadedProgram,
    pub config: SmConfig,
}

impl SmBinding {
    /// Load offset of the channel's program.
    pub fn offset(&self) -> u8 {
        self.program.offset
    }

    /// Mask bit of this channel for enable/restart writes.
    pub fn mask(&self) -> u8 {
        1 << self.sm
    }

    /// Byte carried in an RX word, per the channel's input shift setup.
    pub fn received_byte(&self, word: u32) -> u8 {
        self.config.in_shift.received_byte(word)
    }
}

/// Configure one channel. The channel is disabled on entry and stays disabled.
pub fn configure<P: PioHardware>(
    pio: &mut P,
    memory: &mut InstructionMemory,
    spec: &ChannelSpec<'_>,
) -> Result<SmBinding, ConfigureError> {
    let sm = spec.sm;
    pio.set_enabled(1 << sm, false);

    spec.validate()?;
    let program = memory.load(pio, spec.program)?;

    let mut config = (spec.default_config)(&program);
    config.clock_divider = spec.clock_divider;
    config.fifo_join = spec.fifo_join;
    config.in_base = spec.in_pins.base();
    config.out_base = spec.out_pins.base();
    config.out_count = spec.out_pins.count();
    config.set_base = spec.set_pins.base();
    config.set_count = spec.set_pins.count();
    config.side_set_base = spec.side_set_pins.base();
    config.jmp_pin = spec.jmp_pin.unwrap_or(0);
    if spec.in_shift.is_used() {
        config.in_shift = spec.in_shift;
    }
    if spec.out_shift.is_used() {
        config.out_shift = spec.out_shift;
    }
    let registers = config.registers();

    // Directions first, then hand the pins to the block.
    if spec.side_set_idle_high {
        set_group(pio, sm, &registers, spec.side_set_pins, SetDestination::PINS, true);
    }
    for group in [spec.out_pins, spec.set_pins, spec.side_set_pins] {
        set_group(pio, sm, &registers, group, SetDestination::PINDIRS, true);
    }
    set_group(pio, sm, &registers, spec.in_pins, SetDestination::PINDIRS, false);
    if let Some(pin) = spec.jmp_pin {
        let group = PinGroup::single(pin)?;
        set_group(pio, sm, &registers, group, SetDestination::PINDIRS, false);
    }

    let claimed = spec.in_pins.mask()
        | spec.out_pins.mask()
        | spec.set_pins.mask()
        | spec.side_set_pins.mask()
        | spec.jmp_pin.map_or(0, |pin| 1 << pin);
    for pin in (0..GPIO_COUNT).filter(|pin| claimed & (1u32 << *pin) != 0) {
        pio.claim_pin(pin);
    }

    init(pio, sm, &registers, &program);

    Ok(SmBinding {
        block: pio.block(),
        sm,
        program,
        config,
    })
}

/// Load the registers, flush state and point the channel at its entry.
fn init<P: PioHardware>(pio: &mut P, sm: u8, registers: &SmRegisters, program: &LoadedProgram) {
    pio.drain_fifos(sm);
    pio.restart(1 << sm);
    let jmp = InstructionOperands::JMP {
        condition: JmpCondition::Always,
        address: program.entry(),
    }
    .encode();
    exec_without_side_set(pio, sm, registers, jmp);
    pio.write_sm_registers(sm, registers);
}

/// Drive `group` through SET in chunks of five, restoring the registers after.
fn set_group<P: PioHardware>(
    pio: &mut P,
    sm: u8,
    registers: &SmRegisters,
    group: PinGroup,
    destination: SetDestination,
    high: bool,
) {
    if group.is_empty() {
        return;
    }
    let end = group.base() + group.count();
    for base in group.pins().step_by(SET_GROUP_MAX as usize) {
        let count = (end - base).min(SET_GROUP_MAX);
        let scratch = SmRegisters {
            pinctrl: (count as u32) << 26 | (base as u32) << 5,
            execctrl: registers.execctrl & !(1 << 30),
            ..*registers
        };
        pio.write_sm_registers(sm, &scratch);
        let set = InstructionOperands::SET {
            destination,
            data: if high { 0x1F } else { 0 },
        }
        .encode();
        pio.exec(sm, set);
    }
    pio.write_sm_registers(sm, registers);
}

/// Forced instructions carry a zero delay/side-set field; with side-set
/// enabled that would drive every side-set pin low.
fn exec_without_side_set<P: PioHardware>(
    pio: &mut P,
    sm: u8,
    registers: &SmRegisters,
    instruction: u16,
) {
    let scratch = SmRegisters {
        pinctrl: registers.pinctrl & !(0x7 << 29),
        execctrl: registers.execctrl & !(1 << 30),
        ..*registers
    };
    pio.write_sm_registers(sm, &scratch);
    pio.exec(sm, instruction);
}
