//! Shared instruction-memory bookkeeping for one programmable I/O block.

use pio::{Instruction, InstructionOperands, SideSet, Wrap};

use buslink_hal::PioHardware;

use super::program::{BusProgram, INSTRUCTION_MEMORY_SIZE};

/// Why a program could not be placed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LoadError {
    /// No free run of words long enough.
    NoSpace,
    /// The program is longer than the whole memory.
    TooLarge,
    /// The program's fixed origin is taken or out of range.
    OriginUnavailable(u8),
}

/// A program resident in instruction memory.
#[derive(Clone, Copy, Debug)]
pub struct LoadedProgram {
    pub offset: u8,
    pub len: u8,
    /// Wrap addresses already relocated by `offset`.
    pub wrap: Wrap,
    pub side_set: SideSet,
}

impl LoadedProgram {
    /// Absolute address of the program's first instruction.
    pub fn entry(&self) -> u8 {
        self.offset
    }
}

/// Occupancy map of the 32 instruction words.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct InstructionMemory {
    used: u32,
}

impl InstructionMemory {
    pub const fn new() -> Self {
        Self { used: 0 }
    }

    /// Start with words already occupied by other code.
    pub const fn with_reserved(used: u32) -> Self {
        Self { used }
    }

    pub fn used(&self) -> u32 {
        self.used
    }

    pub fn free_words(&self) -> u32 {
        self.used.count_zeros()
    }

    /// Highest free offset for a program of `len` words, honouring a fixed
    /// origin when one is given.
    pub fn find_offset(&self, len: usize, origin: Option<u8>) -> Result<u8, LoadError> {
        if len > INSTRUCTION_MEMORY_SIZE {
            return Err(LoadError::TooLarge);
        }
        if len == 0 {
            return Ok(0);
        }
        let mask = u32::MAX >> (32 - len);
        if let Some(origin) = origin {
            if origin as usize > INSTRUCTION_MEMORY_SIZE - len
                || self.used & (mask << origin) != 0
            {
                return Err(LoadError::OriginUnavailable(origin));
            }
            return Ok(origin);
        }
        (0..=INSTRUCTION_MEMORY_SIZE - len)
            .rev()
            .find(|&offset| self.used & (mask << offset) == 0)
            .map(|offset| offset as u8)
            .ok_or(LoadError::NoSpace)
    }

    /// Relocate and write `program` into the block, marking the words used.
    pub fn load<P: PioHardware>(
        &mut self,
        pio: &mut P,
        program: &BusProgram,
    ) -> Result<LoadedProgram, LoadError> {
        let len = program.code.len();
        let offset = self.find_offset(len, program.origin)?;
        for (i, &raw) in program.code.iter().enumerate() {
            pio.write_instruction(offset + i as u8, relocate(raw, offset, program.side_set));
        }
        if len > 0 {
            self.used |= (u32::MAX >> (32 - len)) << offset;
        }
        Ok(LoadedProgram {
            offset,
            len: len as u8,
            wrap: Wrap {
                source: program.wrap.source + offset,
                target: program.wrap.target + offset,
            },
            side_set: program.side_set,
        })
    }
}

/// JMP targets are program-relative in the assembled code.
fn relocate(raw: u16, offset: u8, side_set: SideSet) -> u16 {
    match Instruction::decode(raw, side_set) {
        Some(mut instr) => {
            if let InstructionOperands::JMP { condition, address } = instr.operands {
                instr.operands = InstructionOperands::JMP {
                    condition,
                    address: (address + offset) % INSTRUCTION_MEMORY_SIZE as u8,
                };
                instr.encode(side_set)
            } else {
                raw
            }
        }
        None => raw,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocates_from_the_top() {
        let memory = InstructionMemory::new();
        assert_eq!(memory.find_offset(5, None), Ok(27));
    }

    #[test]
    fn skips_used_words() {
        // top 8 words taken
        let memory = InstructionMemory::with_reserved(0xFF00_0000);
        assert_eq!(memory.find_offset(4, None), Ok(20));
    }

    #[test]
    fn exact_fit_in_a_hole() {
        // only words 3..=6 free
        let memory = InstructionMemory::with_reserved(!0x0000_0078);
        assert_eq!(memory.find_offset(4, None), Ok(3));
        assert_eq!(memory.find_offset(5, None), Err(LoadError::NoSpace));
    }

    #[test]
    fn full_memory_reports_no_space() {
        let memory = InstructionMemory::with_reserved(u32::MAX);
        assert_eq!(memory.find_offset(1, None), Err(LoadError::NoSpace));
        assert_eq!(memory.free_words(), 0);
    }

    #[test]
    fn oversized_program() {
        let memory = InstructionMemory::new();
        assert_eq!(memory.find_offset(33, None), Err(LoadError::TooLarge));
        assert_eq!(memory.find_offset(32, None), Ok(0));
    }

    #[test]
    fn fixed_origin_is_exact_or_fails() {
        let memory = InstructionMemory::with_reserved(0x0000_0001);
        assert_eq!(memory.find_offset(4, Some(1)), Ok(1));
        assert_eq!(memory.find_offset(4, Some(0)), Err(LoadError::OriginUnavailable(0)));
        assert_eq!(memory.find_offset(4, Some(29)), Err(LoadError::OriginUnavailable(29)));
    }

    #[test]
    fn jump_targets_are_relocated() {
        let side_set = SideSet::new(false, 0, false);
        // jmp 2 (always)
        let jmp = 0x0002;
        assert_eq!(relocate(jmp, 10, side_set), 0x000C);
        // nop (mov y, y) is untouched
        assert_eq!(relocate(0xA042, 10, side_set), 0xA042);
    }
}
