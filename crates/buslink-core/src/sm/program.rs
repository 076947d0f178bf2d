//! Bus programs for the programmable I/O block, and the IRQ flags they share
//! with software.
//!
//! All control strobes are active-low. Side-set values in the master
//! drivers are 3-bit strobe patterns over [RD-, WR-, MODSEL-]:
//!
//! | value | MODSEL- | WR- | RD- | meaning |
//! |---|---|---|---|---|
//! | 7 | 1 | 1 | 1 | idle |
//! | 3 | 0 | 1 | 1 | selected |
//! | 2 | 0 | 1 | 0 | read strobe |
//! | 1 | 0 | 0 | 1 | write strobe |

/// Size of the shared instruction memory in words.
pub const INSTRUCTION_MEMORY_SIZE: usize = 32;

/// Program type used throughout the crate.
pub type BusProgram = pio::Program<INSTRUCTION_MEMORY_SIZE>;

/// Processor-visible request flag raised by the read watcher (flag 0 + SM index).
pub const READ_REQUEST_FLAG: u8 = 0;
/// Processor-visible request flag raised by the write watcher.
pub const WRITE_REQUEST_FLAG: u8 = 1;
/// Raised by either watcher; consumed by the wait enforcer.
pub const CYCLE_PENDING_FLAG: u8 = 4;
/// Set while the wait enforcer holds WAIT- low. Clearing it releases WAIT-.
pub const WAIT_HELD_FLAG: u8 = 5;
/// Set by the master read driver while it is parked between cycles.
pub const MASTER_READ_PARKED_FLAG: u8 = 4;
/// Set by the master write driver once the cycle has been released.
pub const MASTER_WRITE_DONE_FLAG: u8 = 6;

/// Mask for a single IRQ flag.
pub const fn flag_mask(flag: u8) -> u8 {
    1 << flag
}

/// Strobe watcher for the peripheral role.
///
/// `in` base is the strobe (RD- or WR-), the jump pin is MODSEL-. The
/// request flag is relative, so the same program raises flag 0 on SM0 and
/// flag 1 on SM1.
pub fn strobe_watcher() -> BusProgram {
    pio::pio_asm!(
        ".wrap_target",
        "idle:",
        "    wait 1 pin 0",     // strobe released
        "    wait 0 pin 0",     // strobe asserted
        "    jmp pin idle",     // MODSEL- high: not for us
        "    irq 4",            // hold the host
        "    irq 0 rel",        // request service
        ".wrap",
    )
    .program
}

/// WAIT- stall enforcer for the peripheral role. Side-set base is WAIT-.
pub fn wait_enforcer() -> BusProgram {
    pio::pio_asm!(
        ".side_set 1 opt",
        ".wrap_target",
        "    wait 1 irq 4   side 1", // WAIT- released while idle
        "    irq 5          side 0", // WAIT- asserted, flag software
        "    wait 0 irq 5",          // until software clears it
        ".wrap",
    )
    .program
}

/// Read-cycle driver for the master role.
///
/// Side-set base is RD-, `in` base is DATA0, jump pin is WAIT-. Right shift
/// without autopush, so the byte arrives in bits 31..24.
pub fn master_read() -> BusProgram {
    pio::pio_asm!(
        ".side_set 3",
        ".wrap_target",
        "    irq wait 4         side 7",
        "    nop                side 3 [1]",
        "    nop                side 2 [3]",
        "stall:",
        "    jmp pin sample     side 2",
        "    jmp stall          side 2",
        "sample:",
        "    in pins, 8         side 2",
        "    push block         side 7",
        ".wrap",
    )
    .program
}

/// Write-cycle driver for the master role.
///
/// Side-set base is RD-, `out` base is DATA0, jump pin is WAIT-. The data
/// pins are only driven between select and deselect.
pub fn master_write() -> BusProgram {
    pio::pio_asm!(
        ".side_set 3",
        ".wrap_target",
        "    pull block         side 7",
        "    out pins, 8        side 7",
        "    mov osr, ~null     side 7",
        "    out pindirs, 8     side 3",
        "    nop                side 1 [3]",
        "stall:",
        "    jmp pin release    side 1",
        "    jmp stall          side 1",
        "release:",
        "    nop                side 3 [1]",
        "    mov osr, null      side 3",
        "    out pindirs, 8     side 7",
        "    irq 6              side 7",
        ".wrap",
    )
    .program
}
