//! PC debug host for the buslink bridge.
//!
//! Runs the real engines on the digital twin: the peripheral role against a
//! simulated host CPU, the master role against an echo peripheral. Bytes on
//! the command line are hex, with or without a `0x` prefix.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use log::LevelFilter;

use buslink_twin::scenario::{self, Scenario, ScenarioReport};
use buslink_twin::{CycleRecord, HostOp, MasterRig, PeripheralRig};

#[derive(Parser)]
#[command(name = "buslink-pc")]
#[command(about = "Run the parallel-bus engines on the digital twin", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Suppress all non-error output
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Peripheral role: the host runs read cycles against the counter
    Read {
        /// First byte the counter serves
        #[arg(long, default_value = "ff", value_parser = parse_byte)]
        start: u8,

        /// Number of read cycles
        #[arg(short, long, default_value = "1")]
        count: usize,
    },
    /// Peripheral role: the host writes each byte
    Write {
        #[arg(required = true, value_parser = parse_byte)]
        bytes: Vec<u8>,
    },
    /// Master role: write each byte to an echo peripheral and read it back
    MasterEcho {
        #[arg(required = true, value_parser = parse_byte)]
        bytes: Vec<u8>,

        /// Cycles the echo peripheral holds WAIT- on every strobe
        #[arg(long, default_value = "96")]
        wait_cycles: u32,
    },
    /// Run acceptance scenarios A-D (all of them when none is named)
    Scenario {
        #[arg(value_parser = parse_scenario)]
        letters: Vec<Scenario>,
    },
}

fn parse_byte(s: &str) -> Result<u8, String> {
    let digits = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    u8::from_str_radix(digits, 16).map_err(|e| format!("'{s}' is not a hex byte: {e}"))
}

fn parse_scenario(s: &str) -> Result<Scenario, String> {
    let mut chars = s.chars();
    match (chars.next(), chars.next()) {
        (Some(letter), None) => {
            Scenario::from_letter(letter).ok_or_else(|| format!("no scenario '{s}' (A-D)"))
        }
        _ => Err(format!("no scenario '{s}' (A-D)")),
    }
}

fn print_cycle(cycle: &CycleRecord) {
    let op = match cycle.op {
        HostOp::Read => "read",
        HostOp::Write(_) => "write",
    };
    println!(
        "{:<5} {:#04x}  wait {:<5}  driven {:<5}  {} cycles",
        op,
        cycle.value,
        cycle.saw_wait,
        cycle.driven_at_release,
        cycle.end - cycle.start
    );
}

fn print_report(report: &ScenarioReport) {
    println!("scenario {}", report.scenario);
    println!("  status        {}", report.status);
    for cycle in &report.host_cycles {
        print!("  ");
        print_cycle(cycle);
    }
    if !report.captured.is_empty() {
        println!("  captured      {:02x?}", report.captured);
    }
    if let Some(value) = report.master_read {
        println!("  read()        {:#04x}", value);
    }
    if let Some(value) = report.counter_after {
        println!("  counter       {:#04x}", value);
    }
    println!("  enabled       {:#06b}", report.enabled);
    println!("  contention    {}", report.contention);
    println!("  elapsed       {} cycles", report.elapsed);
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    env_logger::Builder::new()
        .filter_level(if cli.quiet {
            LevelFilter::Warn
        } else {
            LevelFilter::Info
        })
        .parse_default_env()
        .init();

    match cli.command {
        Commands::Read { start, count } => {
            let mut rig = PeripheralRig::new(start)?;
            rig.init().context("peripheral bring-up")?;
            for _ in 0..count {
                print_cycle(&rig.host_read()?);
            }
            Ok(())
        }
        Commands::Write { bytes } => {
            let mut rig = PeripheralRig::new(0xFF)?;
            rig.init().context("peripheral bring-up")?;
            for value in bytes {
                print_cycle(&rig.host_write(value)?);
            }
            println!("captured {:02x?}", rig.captured());
            Ok(())
        }
        Commands::MasterEcho { bytes, wait_cycles } => {
            let mut rig = MasterRig::new(wait_cycles);
            rig.init().context("master bring-up")?;
            for value in bytes {
                rig.write(value)?;
                let echoed = rig.read()?;
                println!("write {:#04x}  read {:#04x}", value, echoed);
                if echoed != value {
                    bail!("echo mismatch: wrote {:#04x}, read {:#04x}", value, echoed);
                }
            }
            Ok(())
        }
        Commands::Scenario { letters } => {
            let selected = if letters.is_empty() {
                Scenario::ALL.to_vec()
            } else {
                letters
            };
            let mut failed = 0;
            for s in selected {
                let report = scenario::run(s)?;
                print_report(&report);
                match report.verify() {
                    Ok(()) => println!("  PASS"),
                    Err(e) => {
                        log::error!("{}", e);
                        println!("  FAIL");
                        failed += 1;
                    }
                }
            }
            if failed > 0 {
                bail!("{} scenario(s) failed", failed);
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_are_hex_with_optional_prefix() {
        assert_eq!(parse_byte("7e"), Ok(0x7E));
        assert_eq!(parse_byte("0x3C"), Ok(0x3C));
        assert_eq!(parse_byte("FF"), Ok(0xFF));
        assert!(parse_byte("100").is_err());
        assert!(parse_byte("zz").is_err());
    }

    #[test]
    fn scenarios_by_single_letter() {
        assert_eq!(parse_scenario("a"), Ok(Scenario::HostRead));
        assert_eq!(parse_scenario("D"), Ok(Scenario::ProgramSpaceFull));
        assert!(parse_scenario("ab").is_err());
        assert!(parse_scenario("").is_err());
    }

    #[test]
    fn command_line_parses() {
        let cli = Cli::try_parse_from(["buslink-pc", "-q", "master-echo", "3c", "0xa5"]).unwrap();
        assert!(cli.quiet);
        match cli.command {
            Commands::MasterEcho { bytes, wait_cycles } => {
                assert_eq!(bytes, vec![0x3C, 0xA5]);
                assert_eq!(wait_cycles, 96);
            }
            _ => panic!("wrong subcommand"),
        }
    }
}
