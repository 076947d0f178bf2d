//! State-machine configuration values and their register encoding.

use buslink_hal::SmRegisters;

use super::memory::LoadedProgram;

/// How the two 4-word FIFOs are combined.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FifoJoin {
    /// Separate TX and RX FIFOs.
    #[default]
    Separate,
    /// 8-word RX FIFO, no TX.
    JoinRx,
    /// 8-word TX FIFO, no RX.
    JoinTx,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ShiftDirection {
    Left,
    #[default]
    Right,
}

/// One shift register: threshold in bits, direction and auto push/pull.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ShiftConfig {
    /// 1..=32; 0 leaves the register at its reset configuration.
    pub bits: u8,
    pub direction: ShiftDirection,
    pub auto: bool,
}

impl ShiftConfig {
    /// Reset configuration: 32 bits, right shift, manual.
    pub const UNUSED: ShiftConfig = ShiftConfig {
        bits: 0,
        direction: ShiftDirection::Right,
        auto: false,
    };

    pub const fn right(bits: u8) -> Self {
        ShiftConfig { bits, direction: ShiftDirection::Right, auto: false }
    }

    pub const fn left(bits: u8) -> Self {
        ShiftConfig { bits, direction: ShiftDirection::Left, auto: false }
    }

    pub const fn with_auto(self) -> Self {
        ShiftConfig { auto: true, ..self }
    }

    pub const fn is_used(&self) -> bool {
        self.bits > 0
    }

    /// Extract the received byte from an RX FIFO word. Right-shifted input
    /// lands in the top bits of the word, left-shifted in the bottom.
    pub const fn received_byte(&self, word: u32) -> u8 {
        let bits = if self.bits == 0 { 32 } else { self.bits as u32 };
        match self.direction {
            ShiftDirection::Right => (word >> (32 - bits)) as u8,
            ShiftDirection::Left => word as u8,
        }
    }
}

impl Default for ShiftConfig {
    fn default() -> Self {
        Self::UNUSED
    }
}

/// Clock divider in 16.8 fixed point.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ClockDivider {
    pub int: u16,
    pub frac: u8,
}

impl ClockDivider {
    /// Full system clock.
    pub const UNITY: ClockDivider = ClockDivider { int: 1, frac: 0 };

    pub const fn from_int(int: u16) -> Self {
        ClockDivider { int, frac: 0 }
    }

    /// Divider from a ratio given in 1/256ths (`0x1000` = 16.0).
    pub const fn from_fixed(ratio_x256: u32) -> Self {
        ClockDivider {
            int: (ratio_x256 >> 8) as u16,
            frac: ratio_x256 as u8,
        }
    }

    pub const fn register(&self) -> u32 {
        (self.int as u32) << 16 | (self.frac as u32) << 8
    }
}

impl Default for ClockDivider {
    fn default() -> Self {
        Self::UNITY
    }
}

/// Full configuration of one state machine before it is written out.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SmConfig {
    pub clock_divider: ClockDivider,
    pub wrap_bottom: u8,
    pub wrap_top: u8,
    pub side_set_count: u8,
    pub side_set_optional: bool,
    pub side_set_pindirs: bool,
    pub side_set_base: u8,
    pub jmp_pin: u8,
    pub in_base: u8,
    pub out_base: u8,
    pub out_count: u8,
    pub set_base: u8,
    pub set_count: u8,
    pub in_shift: ShiftConfig,
    pub out_shift: ShiftConfig,
    pub fifo_join: FifoJoin,
}

impl SmConfig {
    /// Defaults derived from a loaded program: wrap and side-set layout.
    pub fn for_program(program: &LoadedProgram) -> Self {
        SmConfig {
            clock_divider: ClockDivider::UNITY,
            wrap_bottom: program.wrap.target,
            wrap_top: program.wrap.source,
            side_set_count: program.side_set.bits(),
            side_set_optional: program.side_set.optional(),
            side_set_pindirs: program.side_set.pindirs(),
            side_set_base: 0,
            jmp_pin: 0,
            in_base: 0,
            out_base: 0,
            out_count: 0,
            set_base: 0,
            set_count: 0,
            in_shift: ShiftConfig::UNUSED,
            out_shift: ShiftConfig::UNUSED,
            fifo_join: FifoJoin::Separate,
        }
    }

    /// Hardware register image.
    pub fn registers(&self) -> SmRegisters {
        SmRegisters {
            clkdiv: self.clock_divider.register(),
            execctrl: self.execctrl(),
            shiftctrl: self.shiftctrl(),
            pinctrl: self.pinctrl(),
        }
    }

    fn execctrl(&self) -> u32 {
        (self.side_set_optional as u32) << 30
            | (self.side_set_pindirs as u32) << 29
            | (self.jmp_pin as u32 & 0x1F) << 24
            | (self.wrap_top as u32 & 0x1F) << 12
            | (self.wrap_bottom as u32 & 0x1F) << 7
    }

    fn shiftctrl(&self) -> u32 {
        // threshold 32 is encoded as 0
        let threshold = |shift: &ShiftConfig| (shift.bits as u32) & 0x1F;
        let (fjoin_rx, fjoin_tx) = match self.fifo_join {
            FifoJoin::Separate => (0, 0),
            FifoJoin::JoinRx => (1, 0),
            FifoJoin::JoinTx => (0, 1),
        };
        fjoin_rx << 31
            | fjoin_tx << 30
            | threshold(&self.out_shift) << 25
            | threshold(&self.in_shift) << 20
            | ((self.out_shift.direction == ShiftDirection::Right) as u32) << 19
            | ((self.in_shift.direction == ShiftDirection::Right) as u32) << 18
            | (self.out_shift.auto as u32) << 17
            | (self.in_shift.auto as u32) << 16
    }

    fn pinctrl(&self) -> u32 {
        (self.side_set_count as u32 & 0x7) << 29
            | (self.set_count as u32 & 0x7) << 26
            | (self.out_count as u32 & 0x3F) << 20
            | (self.in_base as u32 & 0x1F) << 15
            | (self.side_set_base as u32 & 0x1F) << 10
            | (self.set_base as u32 & 0x1F) << 5
            | (self.out_base as u32 & 0x1F)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pio::{SideSet, Wrap};

    fn loaded(offset: u8, len: u8, side_set: SideSet) -> LoadedProgram {
        LoadedProgram {
            offset,
            len,
            wrap: Wrap { source: offset + len - 1, target: offset },
            side_set,
        }
    }

    #[test]
    fn reset_shift_configuration() {
        let config = SmConfig::for_program(&loaded(0, 4, SideSet::new(false, 0, false)));
        // both directions right, thresholds 32
        assert_eq!(config.registers().shiftctrl, 0x000C_0000);
        assert_eq!(config.registers().clkdiv, 0x0001_0000);
    }

    #[test]
    fn master_read_channel_registers() {
        let mut config = SmConfig::for_program(&loaded(24, 8, SideSet::new(false, 3, false)));
        config.clock_divider = ClockDivider::from_int(16);
        config.in_shift = ShiftConfig::right(8);
        config.in_base = 2;
        config.side_set_base = 11;
        config.jmp_pin = 14;
        let regs = config.registers();
        assert_eq!(regs.clkdiv, 0x0010_0000);
        assert_eq!(regs.execctrl, 14 << 24 | 31 << 12 | 24 << 7);
        assert_eq!(regs.shiftctrl, 8 << 20 | 1 << 19 | 1 << 18);
        assert_eq!(regs.pinctrl, 3 << 29 | 2 << 15 | 11 << 10);
    }

    #[test]
    fn optional_side_set_enables_side_en() {
        let config = SmConfig::for_program(&loaded(0, 3, SideSet::new(true, 1, false)));
        assert_eq!(config.side_set_count, 2);
        assert_eq!(config.registers().execctrl >> 30 & 1, 1);
    }

    #[test]
    fn fifo_join_bits() {
        let mut config = SmConfig::for_program(&loaded(0, 1, SideSet::new(false, 0, false)));
        config.fifo_join = FifoJoin::JoinRx;
        assert_eq!(config.registers().shiftctrl >> 30, 0b10);
        config.fifo_join = FifoJoin::JoinTx;
        assert_eq!(config.registers().shiftctrl >> 30, 0b01);
    }

    #[test]
    fn fractional_divider() {
        let div = ClockDivider::from_fixed(0x0280);
        assert_eq!(div, ClockDivider { int: 2, frac: 0x80 });
        assert_eq!(div.register(), 0x0002_8000);
    }

    mod received_byte_tests {
        use super::*;

        #[test]
        fn right_shift_byte_is_in_top_bits() {
            assert_eq!(ShiftConfig::right(8).received_byte(0x3C00_0000), 0x3C);
        }

        #[test]
        fn left_shift_byte_is_in_bottom_bits() {
            assert_eq!(ShiftConfig::left(8).received_byte(0x0000_01A5), 0xA5);
        }
    }
}
