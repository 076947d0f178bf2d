//! State-machine configurator against the recording mock.

mod common;

use buslink_core::board::{PinGroup, PinGroupError};
use buslink_core::sm::program::{self, INSTRUCTION_MEMORY_SIZE};
use buslink_core::sm::{
    configure, ChannelSpec, ClockDivider, ConfigureError, FifoJoin, InstructionMemory, LoadError,
    ShiftConfig,
};
use pio::{InstructionOperands, SetDestination};

use common::{new_log, MockPio, Op};

fn set(destination: SetDestination, data: u8) -> u16 {
    InstructionOperands::SET { destination, data }.encode()
}

#[test]
fn channel_is_disabled_first_and_never_enabled() {
    let log = new_log();
    let mut pio = MockPio::new(&log);
    let mut memory = InstructionMemory::new();
    let watcher = program::strobe_watcher();
    let spec = ChannelSpec {
        in_pins: PinGroup::single(11).unwrap(),
        jmp_pin: Some(13),
        ..ChannelSpec::new(0, &watcher)
    };

    configure(&mut pio, &mut memory, &spec).unwrap();

    let log = log.borrow();
    assert_eq!(log.first(), Some(&Op::Enable(0b0001, false)));
    assert!(!log.iter().any(|op| matches!(op, Op::Enable(_, true))));
}

#[test]
fn program_is_written_at_the_top_of_memory() {
    let log = new_log();
    let mut pio = MockPio::new(&log);
    let mut memory = InstructionMemory::new();
    let watcher = program::strobe_watcher();
    let len = watcher.code.len();

    let binding = configure(&mut pio, &mut memory, &ChannelSpec::new(0, &watcher)).unwrap();

    assert_eq!(binding.offset() as usize, INSTRUCTION_MEMORY_SIZE - len);
    assert_eq!(binding.program.wrap.target, binding.offset());
    assert_eq!(binding.program.wrap.source as usize, INSTRUCTION_MEMORY_SIZE - 1);
    let addresses: Vec<u8> = log
        .borrow()
        .iter()
        .filter_map(|op| match op {
            Op::Instruction(address, _) => Some(*address),
            _ => None,
        })
        .collect();
    assert_eq!(addresses, (binding.offset()..32).collect::<Vec<_>>());
    assert_eq!(memory.free_words() as usize, INSTRUCTION_MEMORY_SIZE - len);
}

#[test]
fn jump_in_watcher_is_relocated() {
    let log = new_log();
    let mut pio = MockPio::new(&log);
    let mut memory = InstructionMemory::new();
    let watcher = program::strobe_watcher();

    let binding = configure(&mut pio, &mut memory, &ChannelSpec::new(0, &watcher)).unwrap();

    // third instruction: jmp pin idle, with idle at program start
    let jmp = log
        .borrow()
        .iter()
        .find_map(|op| match op {
            Op::Instruction(address, word) if *address == binding.offset() + 2 => Some(*word),
            _ => None,
        })
        .unwrap();
    assert_eq!(jmp & 0xE000, 0x0000);
    assert_eq!(jmp & 0x001F, binding.offset() as u16);
}

#[test]
fn wide_output_group_is_directed_in_chunks_of_five() {
    let log = new_log();
    let mut pio = MockPio::new(&log);
    let mut memory = InstructionMemory::new();
    let writer = program::master_write();
    let spec = ChannelSpec {
        out_pins: PinGroup::new(2, 8).unwrap(),
        out_shift: ShiftConfig::right(8),
        ..ChannelSpec::new(3, &writer)
    };

    configure(&mut pio, &mut memory, &spec).unwrap();

    let log = log.borrow();
    let mut chunks = Vec::new();
    for pair in log.windows(2) {
        if let [Op::Registers(3, regs), Op::Exec(3, instr)] = pair {
            if *instr == set(SetDestination::PINDIRS, 0x1F) {
                let count = regs.pinctrl >> 26 & 0x7;
                let base = regs.pinctrl >> 5 & 0x1F;
                chunks.push((base, count));
            }
        }
    }
    assert_eq!(chunks, vec![(2, 5), (7, 3)]);
}

#[test]
fn inputs_and_jump_pin_are_set_as_inputs() {
    let log = new_log();
    let mut pio = MockPio::new(&log);
    let mut memory = InstructionMemory::new();
    let reader = program::master_read();
    let spec = ChannelSpec {
        in_pins: PinGroup::new(2, 8).unwrap(),
        jmp_pin: Some(14),
        ..ChannelSpec::new(2, &reader)
    };

    configure(&mut pio, &mut memory, &spec).unwrap();

    let input = set(SetDestination::PINDIRS, 0);
    let inputs = log
        .borrow()
        .iter()
        .filter(|op| **op == Op::Exec(2, input))
        .count();
    // 5 + 3 data lines, then the jump pin
    assert_eq!(inputs, 3);
}

#[test]
fn strobes_are_preloaded_high_before_becoming_outputs() {
    let log = new_log();
    let mut pio = MockPio::new(&log);
    let mut memory = InstructionMemory::new();
    let reader = program::master_read();
    let spec = ChannelSpec {
        side_set_pins: PinGroup::new(11, 3).unwrap(),
        side_set_idle_high: true,
        ..ChannelSpec::new(2, &reader)
    };

    configure(&mut pio, &mut memory, &spec).unwrap();

    let execs: Vec<u16> = log
        .borrow()
        .iter()
        .filter_map(|op| match op {
            Op::Exec(2, instr) => Some(*instr),
            _ => None,
        })
        .collect();
    let high = execs.iter().position(|i| *i == set(SetDestination::PINS, 0x1F));
    let output = execs.iter().position(|i| *i == set(SetDestination::PINDIRS, 0x1F));
    assert!(high.unwrap() < output.unwrap());
}

#[test]
fn pins_are_claimed_after_directions_are_set() {
    let log = new_log();
    let mut pio = MockPio::new(&log);
    let mut memory = InstructionMemory::new();
    let enforcer = program::wait_enforcer();
    let spec = ChannelSpec {
        side_set_pins: PinGroup::single(14).unwrap(),
        ..ChannelSpec::new(2, &enforcer)
    };

    configure(&mut pio, &mut memory, &spec).unwrap();

    let log = log.borrow();
    let last_set = log.iter().rposition(|op| {
        matches!(op, Op::Exec(2, instr) if *instr == set(SetDestination::PINDIRS, 0x1F))
    });
    let claim = log.iter().position(|op| *op == Op::Claim(14));
    assert!(last_set.unwrap() < claim.unwrap());
    assert_eq!(log.iter().filter(|op| matches!(op, Op::Claim(_))).count(), 1);
}

#[test]
fn final_registers_match_binding() {
    let log = new_log();
    let mut pio = MockPio::new(&log);
    let mut memory = InstructionMemory::new();
    let reader = program::master_read();
    let spec = ChannelSpec {
        clock_divider: ClockDivider::from_int(16),
        fifo_join: FifoJoin::JoinRx,
        in_shift: ShiftConfig::right(8),
        in_pins: PinGroup::new(2, 8).unwrap(),
        side_set_pins: PinGroup::new(11, 3).unwrap(),
        jmp_pin: Some(14),
        ..ChannelSpec::new(2, &reader)
    };

    let binding = configure(&mut pio, &mut memory, &spec).unwrap();

    let last = log
        .borrow()
        .iter()
        .rev()
        .find_map(|op| match op {
            Op::Registers(2, regs) => Some(*regs),
            _ => None,
        })
        .unwrap();
    assert_eq!(last, binding.config.registers());
    assert_eq!(last.clkdiv, 16 << 16);
    assert_eq!(last.shiftctrl >> 31, 1);
    assert_eq!(binding.block, 1);
}

#[test]
fn entry_jump_is_forced_without_side_set() {
    let log = new_log();
    let mut pio = MockPio::new(&log);
    let mut memory = InstructionMemory::new();
    let reader = program::master_read();
    let spec = ChannelSpec {
        side_set_pins: PinGroup::new(11, 3).unwrap(),
        ..ChannelSpec::new(2, &reader)
    };

    let binding = configure(&mut pio, &mut memory, &spec).unwrap();

    let log = log.borrow();
    let jmp = InstructionOperands::JMP {
        condition: pio::JmpCondition::Always,
        address: binding.offset(),
    }
    .encode();
    let at = log.iter().position(|op| *op == Op::Exec(2, jmp)).unwrap();
    match &log[at - 1] {
        Op::Registers(2, regs) => assert_eq!(regs.pinctrl >> 29, 0),
        other => panic!("expected register write before entry jump, got {:?}", other),
    }
}

#[test]
fn exhausted_memory_is_a_negative_status_and_touches_no_pins() {
    let log = new_log();
    let mut pio = MockPio::new(&log);
    let mut memory = InstructionMemory::with_reserved(u32::MAX);
    let watcher = program::strobe_watcher();
    let spec = ChannelSpec {
        in_pins: PinGroup::single(11).unwrap(),
        ..ChannelSpec::new(0, &watcher)
    };

    let err = configure(&mut pio, &mut memory, &spec).unwrap_err();

    assert_eq!(err, ConfigureError::Load(LoadError::NoSpace));
    assert!(err.status() < 0);
    assert_eq!(*log.borrow(), vec![Op::Enable(0b0001, false)]);
}

#[test]
fn side_set_group_must_match_program() {
    let log = new_log();
    let mut pio = MockPio::new(&log);
    let mut memory = InstructionMemory::new();
    let reader = program::master_read();
    let spec = ChannelSpec {
        side_set_pins: PinGroup::new(11, 2).unwrap(),
        ..ChannelSpec::new(2, &reader)
    };

    assert_eq!(
        configure(&mut pio, &mut memory, &spec).unwrap_err(),
        ConfigureError::SideSetMismatch { program: 3, pins: 2 }
    );
    assert_eq!(memory.free_words(), 32);
}

#[test]
fn set_group_wider_than_five_is_rejected() {
    let log = new_log();
    let mut pio = MockPio::new(&log);
    let mut memory = InstructionMemory::new();
    let watcher = program::strobe_watcher();
    let spec = ChannelSpec {
        set_pins: PinGroup::new(0, 6).unwrap(),
        ..ChannelSpec::new(0, &watcher)
    };

    assert_eq!(
        configure(&mut pio, &mut memory, &spec).unwrap_err(),
        ConfigureError::Pins(PinGroupError::TooWide { count: 6, max: 5 })
    );
}
