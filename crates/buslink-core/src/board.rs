//! Static board description: logical bus roles mapped to GPIO numbers, and
//! the state machines each engine uses.
//!
//! Multi-pin groups are carried as validated [`PinGroup`] descriptors so that
//! adjacency assumptions (e.g. the master strobe side-set group) are checked
//! once, at construction, instead of being implied by pin arithmetic.

use core::fmt;
use core::ops::Range;

use crate::role::BusRole;

/// Number of user GPIOs in bank 0.
pub const GPIO_COUNT: u8 = 30;

/// Width of the data bus in lines.
pub const DATA_BUS_WIDTH: u8 = 8;

/// State machines in one programmable I/O block.
pub const SM_COUNT: u8 = 4;

/// Invalid pin-group description.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PinGroupError {
    /// The group runs past the last GPIO.
    OutOfRange { base: u8, count: u8 },
    /// Lines that must be consecutive are not.
    NotAdjacent { expected: u8, found: u8 },
    /// The group is wider than the hardware field that maps it.
    TooWide { count: u8, max: u8 },
}

impl fmt::Display for PinGroupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PinGroupError::OutOfRange { base, count } => {
                write!(f, "pin group GPIO{}+{} runs past GPIO{}", base, count, GPIO_COUNT - 1)
            }
            PinGroupError::NotAdjacent { expected, found } => {
                write!(f, "expected GPIO{} next in group, found GPIO{}", expected, found)
            }
            PinGroupError::TooWide { count, max } => {
                write!(f, "pin group of {} exceeds {} lines", count, max)
            }
        }
    }
}

/// A run of consecutive GPIOs: `base`, `base + 1`, ... `base + count - 1`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PinGroup {
    base: u8,
    count: u8,
}

impl PinGroup {
    /// No pins.
    pub const EMPTY: PinGroup = PinGroup { base: 0, count: 0 };

    /// Validate and build a group.
    pub const fn new(base: u8, count: u8) -> Result<Self, PinGroupError> {
        if base as u16 + count as u16 > GPIO_COUNT as u16 {
            return Err(PinGroupError::OutOfRange { base, count });
        }
        Ok(PinGroup { base, count })
    }

    /// One pin.
    pub const fn single(pin: u8) -> Result<Self, PinGroupError> {
        Self::new(pin, 1)
    }

    /// Build a group from named lines that must sit on consecutive GPIOs,
    /// lowest first.
    pub fn contiguous(pins: &[u8]) -> Result<Self, PinGroupError> {
        let Some((&first, rest)) = pins.split_first() else {
            return Ok(Self::EMPTY);
        };
        let mut expected = first;
        for &pin in rest {
            expected = match expected.checked_add(1) {
                Some(next) => next,
                None => {
                    return Err(PinGroupError::OutOfRange {
                        base: first,
                        count: pins.len() as u8,
                    })
                }
            };
            if pin != expected {
                return Err(PinGroupError::NotAdjacent { expected, found: pin });
            }
        }
        Self::new(first, pins.len() as u8)
    }

    /// Reject groups wider than `max` lines.
    pub const fn at_most(self, max: u8) -> Result<Self, PinGroupError> {
        if self.count > max {
            return Err(PinGroupError::TooWide { count: self.count, max });
        }
        Ok(self)
    }

    pub const fn base(&self) -> u8 {
        self.base
    }

    pub const fn count(&self) -> u8 {
        self.count
    }

    pub const fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// GPIO numbers in the group.
    pub fn pins(&self) -> Range<u8> {
        self.base..self.base + self.count
    }

    /// Bit mask of the group over bank 0.
    pub const fn mask(&self) -> u32 {
        if self.count == 0 {
            0
        } else {
            (u32::MAX >> (32 - self.count as u32)) << self.base
        }
    }

    pub const fn contains(&self, pin: u8) -> bool {
        pin >= self.base && pin < self.base + self.count
    }
}

/// Pad pull resistor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LinePull {
    None,
    Up,
    Down,
}

/// How a bus line is left by board bring-up, before any state machine
/// claims it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LineSetup {
    /// Processor input with the given pull.
    Input(LinePull),
    /// Processor output at its inactive (high) level, 4 mA.
    DriveHigh,
}

/// Logical bus lines and their GPIO numbers.
///
/// Control strobes are active-low throughout.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BoardPins {
    /// DATA0..DATA7.
    pub data_bus: PinGroup,
    /// C-/D discriminator.
    pub addr: u8,
    /// RD- read strobe.
    pub rd: u8,
    /// WR- write strobe.
    pub wr: u8,
    /// MODSEL- module select.
    pub modsel: u8,
    /// WAIT- wait request.
    pub wait: u8,
    /// INTRQ- interrupt request to the host.
    pub intrq: u8,
    /// On-board status/error LED.
    pub status_led: u8,
}

impl BoardPins {
    /// Production wiring.
    pub const DEFAULT: BoardPins = BoardPins {
        data_bus: PinGroup { base: 2, count: DATA_BUS_WIDTH },
        addr: 10,
        rd: 11,
        wr: 12,
        modsel: 13,
        wait: 14,
        intrq: 15,
        status_led: 25,
    };

    /// Mask of the data-bus lines over bank 0.
    pub const fn data_mask(&self) -> u32 {
        self.data_bus.mask()
    }

    /// Shift that moves a byte to/from the data-bus lines.
    pub const fn data_shift(&self) -> u8 {
        self.data_bus.base()
    }

    /// RD-, WR- and MODSEL- as one side-set group (bit 0 = RD-, bit 1 = WR-,
    /// bit 2 = MODSEL-), which the master drivers toggle together.
    pub fn master_strobes(&self) -> Result<PinGroup, PinGroupError> {
        PinGroup::contiguous(&[self.rd, self.wr, self.modsel])
    }

    /// Bring-up state of `pin` in `role`, or `None` if it is not a bus line.
    ///
    /// Every line this board drives during bus cycles starts out driven
    /// inactive; lines the far end drives get a pull towards idle.
    pub const fn line_setup(&self, role: BusRole, pin: u8) -> Option<LineSetup> {
        let strobe = pin == self.rd || pin == self.wr || pin == self.modsel;
        if self.data_bus.contains(pin) {
            return Some(LineSetup::Input(LinePull::Up));
        }
        match role {
            BusRole::Peripheral => {
                if strobe {
                    Some(LineSetup::Input(LinePull::Up))
                } else if pin == self.addr {
                    Some(LineSetup::Input(LinePull::Down))
                } else if pin == self.wait || pin == self.intrq {
                    Some(LineSetup::DriveHigh)
                } else {
                    None
                }
            }
            BusRole::Master => {
                if strobe || pin == self.addr {
                    Some(LineSetup::DriveHigh)
                } else if pin == self.wait || pin == self.intrq {
                    Some(LineSetup::Input(LinePull::Up))
                } else {
                    None
                }
            }
        }
    }

    /// Bring-up state of every bus line in `role`, data lines first.
    pub fn bring_up(&self, role: BusRole) -> impl Iterator<Item = (u8, LineSetup)> + '_ {
        let control = [self.addr, self.rd, self.wr, self.modsel, self.wait, self.intrq];
        self.data_bus
            .pins()
            .chain(control)
            .filter_map(move |pin| self.line_setup(role, pin).map(|setup| (pin, setup)))
    }

    /// Validate the data bus is exactly eight lines wide.
    pub fn validated_data_bus(&self) -> Result<PinGroup, PinGroupError> {
        if self.data_bus.count() != DATA_BUS_WIDTH {
            return Err(PinGroupError::TooWide {
                count: self.data_bus.count(),
                max: DATA_BUS_WIDTH,
            });
        }
        Ok(self.data_bus)
    }
}

impl Default for BoardPins {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Invalid state-machine assignment.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SmAssignmentError {
    /// No such state machine in the block.
    OutOfRange { sm: u8 },
    /// Two channels of one role were given the same state machine.
    Shared { sm: u8 },
}

impl fmt::Display for SmAssignmentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SmAssignmentError::OutOfRange { sm } => {
                write!(f, "state machine {} out of range (0..{})", sm, SM_COUNT)
            }
            SmAssignmentError::Shared { sm } => {
                write!(f, "state machine {} assigned to two channels", sm)
            }
        }
    }
}

/// Which block and state machines each channel runs on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SmAssignment {
    /// Programmable I/O block that owns the bus.
    pub block: u8,
    pub read_watcher: u8,
    pub write_watcher: u8,
    pub wait_enforcer: u8,
    pub master_read: u8,
    pub master_write: u8,
}

impl SmAssignment {
    pub const DEFAULT: SmAssignment = SmAssignment {
        block: 1,
        read_watcher: 0,
        write_watcher: 1,
        wait_enforcer: 2,
        master_read: 2,
        master_write: 3,
    };

    /// Check the state machines `role` uses are in range and distinct.
    pub fn validate(&self, role: BusRole) -> Result<(), SmAssignmentError> {
        let peripheral = [self.read_watcher, self.write_watcher, self.wait_enforcer];
        let master = [self.master_write, self.master_read];
        let used: &[u8] = match role {
            BusRole::Peripheral => &peripheral,
            BusRole::Master => &master,
        };
        let mut taken = 0u8;
        for &sm in used {
            if sm >= SM_COUNT {
                return Err(SmAssignmentError::OutOfRange { sm });
            }
            if taken & 1 << sm != 0 {
                return Err(SmAssignmentError::Shared { sm });
            }
            taken |= 1 << sm;
        }
        Ok(())
    }
}

impl Default for SmAssignment {
    fn default() -> Self {
        Self::DEFAULT
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_data_bus_mask_matches_gpio2_to_9() {
        assert_eq!(BoardPins::DEFAULT.data_mask(), 0x0000_03FC);
        assert_eq!(BoardPins::DEFAULT.data_shift(), 2);
    }

    #[test]
    fn master_strobes_form_one_group() {
        let group = BoardPins::DEFAULT.master_strobes().unwrap();
        assert_eq!(group.base(), 11);
        assert_eq!(group.count(), 3);
        assert!(group.contains(13));
        assert!(!group.contains(14));
    }

    #[test]
    fn non_adjacent_strobes_are_rejected() {
        let pins = BoardPins {
            modsel: 20,
            ..BoardPins::DEFAULT
        };
        assert_eq!(
            pins.master_strobes(),
            Err(PinGroupError::NotAdjacent { expected: 13, found: 20 })
        );
    }

    #[test]
    fn group_past_last_gpio_is_rejected() {
        assert_eq!(
            PinGroup::new(25, 8),
            Err(PinGroupError::OutOfRange { base: 25, count: 8 })
        );
        assert!(PinGroup::new(22, 8).is_ok());
    }

    #[test]
    fn width_limit() {
        let group = PinGroup::new(0, 6).unwrap();
        assert_eq!(group.at_most(5), Err(PinGroupError::TooWide { count: 6, max: 5 }));
        assert!(group.at_most(6).is_ok());
    }

    #[test]
    fn empty_group_has_no_pins() {
        assert!(PinGroup::EMPTY.is_empty());
        assert_eq!(PinGroup::EMPTY.mask(), 0);
        assert_eq!(PinGroup::EMPTY.pins().count(), 0);
        assert_eq!(PinGroup::contiguous(&[]), Ok(PinGroup::EMPTY));
    }

    #[test]
    fn group_ending_past_u8_is_out_of_range() {
        assert_eq!(
            PinGroup::contiguous(&[254, 255, 0]),
            Err(PinGroupError::OutOfRange { base: 254, count: 3 })
        );
        assert_eq!(
            PinGroup::contiguous(&[255, 0]),
            Err(PinGroupError::OutOfRange { base: 255, count: 2 })
        );
    }

    #[test]
    fn master_drives_its_strobes_from_bring_up() {
        let pins = BoardPins::DEFAULT;
        for pin in [pins.addr, pins.rd, pins.wr, pins.modsel] {
            assert_eq!(pins.line_setup(BusRole::Master, pin), Some(LineSetup::DriveHigh));
        }
        for pin in [pins.wait, pins.intrq] {
            assert_eq!(
                pins.line_setup(BusRole::Master, pin),
                Some(LineSetup::Input(LinePull::Up))
            );
        }
    }

    #[test]
    fn peripheral_bring_up_layout() {
        let pins = BoardPins::DEFAULT;
        let role = BusRole::Peripheral;
        for pin in [pins.rd, pins.wr, pins.modsel] {
            assert_eq!(pins.line_setup(role, pin), Some(LineSetup::Input(LinePull::Up)));
        }
        assert_eq!(pins.line_setup(role, pins.addr), Some(LineSetup::Input(LinePull::Down)));
        assert_eq!(pins.line_setup(role, pins.wait), Some(LineSetup::DriveHigh));
        assert_eq!(pins.line_setup(role, pins.intrq), Some(LineSetup::DriveHigh));
        assert_eq!(pins.line_setup(role, pins.status_led), None);
    }

    #[test]
    fn bring_up_covers_every_bus_line_once() {
        let pins = BoardPins::DEFAULT;
        for role in [BusRole::Peripheral, BusRole::Master] {
            let mut seen = 0u32;
            for (pin, _) in pins.bring_up(role) {
                assert_eq!(seen & 1 << pin, 0, "GPIO{} listed twice", pin);
                seen |= 1 << pin;
            }
            assert_eq!(seen, 0x0000_FFFC);
        }
        assert!(pins
            .bring_up(BusRole::Peripheral)
            .take(8)
            .all(|(_, setup)| setup == LineSetup::Input(LinePull::Up)));
    }

    #[test]
    fn default_assignment_is_valid_for_both_roles() {
        assert_eq!(SmAssignment::DEFAULT.validate(BusRole::Peripheral), Ok(()));
        assert_eq!(SmAssignment::DEFAULT.validate(BusRole::Master), Ok(()));
    }

    #[test]
    fn shared_state_machine_is_rejected() {
        let sms = SmAssignment {
            write_watcher: 0,
            ..SmAssignment::DEFAULT
        };
        assert_eq!(
            sms.validate(BusRole::Peripheral),
            Err(SmAssignmentError::Shared { sm: 0 })
        );
        // the master channels are untouched
        assert_eq!(sms.validate(BusRole::Master), Ok(()));
    }

    #[test]
    fn state_machine_past_block_is_rejected() {
        let sms = SmAssignment {
            master_read: 4,
            ..SmAssignment::DEFAULT
        };
        assert_eq!(
            sms.validate(BusRole::Master),
            Err(SmAssignmentError::OutOfRange { sm: 4 })
        );
    }

    #[test]
    fn full_width_mask() {
        let group = PinGroup::new(0, 30).unwrap();
        assert_eq!(group.mask(), 0x3FFF_FFFF);
    }
}
