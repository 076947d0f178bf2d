//! End-to-end acceptance scenarios, run on the twin.
//!
//! | Letter | Role | What happens |
//! |---|---|---|
//! | A | peripheral | host reads with the counter at `0x05` |
//! | B | peripheral | host writes `0x7E` |
//! | C | master | `write(0x3C)` then `read()` against an echo peripheral |
//! | D | peripheral | bring-up with the instruction memory already full |

use std::fmt;

use buslink_core::sm::InstructionMemory;

use crate::error::{Result, TwinError};
use crate::host::CycleRecord;
use crate::rig::{MasterRig, PeripheralRig};
use crate::world::Twin;

/// WAIT- hold time of the echo peripheral in scenario C, long enough that
/// the master drivers really stall.
pub const ECHO_WAIT_CYCLES: u32 = 96;

const READ_START: u8 = 0x05;
const WRITE_VALUE: u8 = 0x7E;
const ECHO_VALUE: u8 = 0x3C;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Scenario {
    HostRead,
    HostWrite,
    MasterEcho,
    ProgramSpaceFull,
}

impl Scenario {
    pub const ALL: [Scenario; 4] = [
        Scenario::HostRead,
        Scenario::HostWrite,
        Scenario::MasterEcho,
        Scenario::ProgramSpaceFull,
    ];

    pub fn letter(&self) -> char {
        match self {
            Scenario::HostRead => 'A',
            Scenario::HostWrite => 'B',
            Scenario::MasterEcho => 'C',
            Scenario::ProgramSpaceFull => 'D',
        }
    }

    pub fn from_letter(letter: char) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|s| s.letter() == letter.to_ascii_uppercase())
    }

    pub fn describe(&self) -> &'static str {
        match self {
            Scenario::HostRead => "peripheral role, host read",
            Scenario::HostWrite => "peripheral role, host write",
            Scenario::MasterEcho => "master role, write then read back",
            Scenario::ProgramSpaceFull => "instruction memory full at bring-up",
        }
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.letter(), self.describe())
    }
}

/// What a scenario run observed.
#[derive(Clone, Debug)]
pub struct ScenarioReport {
    pub scenario: Scenario,
    /// Engine start status: 0 when running, negative on failure.
    pub status: i32,
    pub host_cycles: Vec<CycleRecord>,
    /// Bytes the peripheral's write sink received.
    pub captured: Vec<u8>,
    /// Bytes the echo peripheral latched.
    pub echoed: Vec<u8>,
    pub master_read: Option<u8>,
    /// Next byte the read source will serve.
    pub counter_after: Option<u8>,
    /// State machines left enabled.
    pub enabled: u8,
    pub instruction_writes: u32,
    /// Data lines still driven by the board at the end.
    pub bus_driven_after: bool,
    pub contention: u64,
    pub elapsed: u64,
}

impl ScenarioReport {
    fn new(scenario: Scenario) -> Self {
        ScenarioReport {
            scenario,
            status: 0,
            host_cycles: Vec::new(),
            captured: Vec::new(),
            echoed: Vec::new(),
            master_read: None,
            counter_after: None,
            enabled: 0,
            instruction_writes: 0,
            bus_driven_after: false,
            contention: 0,
            elapsed: 0,
        }
    }

    fn observe(&mut self, twin: &Twin) {
        let world = twin.world();
        self.enabled = world.pio.enabled();
        self.instruction_writes = world.pio.instruction_writes();
        self.bus_driven_after = world.data_bus_driven();
        self.contention = world.pads.contention();
        self.elapsed = world.cycle();
    }

    /// Check the report against the scenario's expected outcome.
    pub fn verify(&self) -> Result<()> {
        let fail = |detail: String| {
            Err(TwinError::Mismatch {
                scenario: self.scenario,
                detail,
            })
        };
        if self.contention != 0 {
            return fail(format!("{} pin-cycles of bus contention", self.contention));
        }
        if self.bus_driven_after {
            return fail("data bus still driven after the cycle".into());
        }
        match self.scenario {
            Scenario::ProgramSpaceFull => {
                if self.status >= 0 {
                    return fail(format!("bring-up status {} is not negative", self.status));
                }
                if self.enabled != 0 {
                    return fail(format!("state machines {:#06b} enabled", self.enabled));
                }
                return Ok(());
            }
            _ if self.status != 0 => {
                return fail(format!("bring-up status {}", self.status));
            }
            _ => {}
        }
        for cycle in &self.host_cycles {
            if !cycle.saw_wait {
                return fail(format!("{:?} cycle never saw WAIT- asserted", cycle.op));
            }
        }
        match self.scenario {
            Scenario::HostRead => {
                let Some(cycle) = self.host_cycles.first() else {
                    return fail("no host cycle recorded".into());
                };
                if cycle.value != READ_START {
                    return fail(format!("host read {:#04x}, expected {:#04x}", cycle.value, READ_START));
                }
                if !cycle.driven_at_release {
                    return fail("data bus not driven when WAIT- was released".into());
                }
                if self.counter_after != Some(READ_START.wrapping_sub(1)) {
                    return fail(format!("counter left at {:?}", self.counter_after));
                }
            }
            Scenario::HostWrite => {
                if self.captured != [WRITE_VALUE] {
                    return fail(format!("captured {:02x?}, expected [{:02x}]", self.captured, WRITE_VALUE));
                }
            }
            Scenario::MasterEcho => {
                if self.echoed != [ECHO_VALUE] {
                    return fail(format!("echo latched {:02x?}", self.echoed));
                }
                if self.master_read != Some(ECHO_VALUE) {
                    return fail(format!("read() returned {:02x?}", self.master_read));
                }
            }
            Scenario::ProgramSpaceFull => {}
        }
        Ok(())
    }
}

/// Run one scenario from a fresh twin.
pub fn run(scenario: Scenario) -> Result<ScenarioReport> {
    log::info!("scenario {}", scenario);
    let mut report = ScenarioReport::new(scenario);
    match scenario {
        Scenario::HostRead => {
            let mut rig = PeripheralRig::new(READ_START)?;
            rig.init()?;
            report.host_cycles.push(rig.host_read()?);
            report.counter_after = Some(rig.engine().source().peek());
            report.observe(rig.twin());
        }
        Scenario::HostWrite => {
            let mut rig = PeripheralRig::new(READ_START)?;
            rig.init()?;
            report.host_cycles.push(rig.host_write(WRITE_VALUE)?);
            report.captured = rig.captured();
            report.observe(rig.twin());
        }
        Scenario::MasterEcho => {
            let mut rig = MasterRig::new(ECHO_WAIT_CYCLES);
            rig.init()?;
            rig.write(ECHO_VALUE)?;
            report.master_read = Some(rig.read()?);
            report.echoed = rig.echoed_writes();
            report.observe(rig.twin());
        }
        Scenario::ProgramSpaceFull => {
            let mut rig = PeripheralRig::with_memory(READ_START, InstructionMemory::with_reserved(u32::MAX))?;
            match rig.init() {
                Ok(()) => report.status = 0,
                Err(TwinError::Engine(e)) => {
                    log::info!("bring-up refused: {}", e);
                    report.status = e.status();
                }
                Err(e) => return Err(e),
            }
            report.observe(rig.twin());
        }
    }
    Ok(report)
}
