//! Whole bus cycles: real engines, real programs, simulated host and
//! peripheral.

use buslink_core::board::BoardPins;
use buslink_core::sm::InstructionMemory;
use buslink_core::EngineState;
use buslink_twin::scenario::{self, Scenario};
use buslink_twin::{HostOp, MasterRig, PeripheralRig, TwinError};

/// Rig and dispatcher logs, shown with `RUST_LOG=debug cargo test`.
fn logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn data_dirs(rig: &MasterRig) -> u32 {
    rig.twin().world().pio.latch().dirs & BoardPins::DEFAULT.data_mask()
}

mod peripheral_tests {
    use super::*;

    #[test]
    fn read_cycle_serves_the_counter() {
        logging();
        let mut rig = PeripheralRig::new(0x05).unwrap();
        rig.init().unwrap();

        let cycle = rig.host_read().unwrap();
        assert_eq!(cycle.op, HostOp::Read);
        assert_eq!(cycle.value, 0x05);
        assert!(cycle.saw_wait);
        assert!(cycle.driven_at_release);
        assert_eq!(rig.engine().source().peek(), 0x04);
    }

    #[test]
    fn bus_is_released_after_a_read() {
        let mut rig = PeripheralRig::new(0x05).unwrap();
        rig.init().unwrap();
        rig.host_read().unwrap();
        assert!(!rig.twin().world().data_bus_driven());
        assert_eq!(rig.twin().world().pads.contention(), 0);
    }

    #[test]
    fn consecutive_reads_count_down_through_zero() {
        let mut rig = PeripheralRig::new(0x01).unwrap();
        rig.init().unwrap();
        let values: Vec<u8> = (0..3).map(|_| rig.host_read().unwrap().value).collect();
        assert_eq!(values, vec![0x01, 0x00, 0xFF]);
    }

    #[test]
    fn write_cycle_captures_the_driven_byte() {
        let mut rig = PeripheralRig::new(0x00).unwrap();
        rig.init().unwrap();

        let cycle = rig.host_write(0x7E).unwrap();
        assert!(cycle.saw_wait);
        assert!(!cycle.driven_at_release);
        assert_eq!(rig.captured(), vec![0x7E]);
        // writes do not consume read data
        assert_eq!(rig.engine().source().peek(), 0x00);
    }

    #[test]
    fn mixed_cycles_keep_their_order() {
        let mut rig = PeripheralRig::new(0x10).unwrap();
        rig.init().unwrap();

        rig.host_write(0xA1).unwrap();
        assert_eq!(rig.host_read().unwrap().value, 0x10);
        rig.host_write(0xA2).unwrap();
        assert_eq!(rig.host_read().unwrap().value, 0x0F);
        assert_eq!(rig.captured(), vec![0xA1, 0xA2]);
        assert_eq!(rig.dispatcher().dispatched(), 4);
        assert_eq!(rig.dispatcher().dropped(), 0);
        assert_eq!(rig.twin().world().pads.contention(), 0);
    }

    #[test]
    fn wait_is_held_until_the_handler_has_driven_the_byte() {
        let mut rig = PeripheralRig::new(0x5A).unwrap();
        rig.init().unwrap();
        let cycle = rig.host_read().unwrap();
        // servicing takes several processor accesses; the host must have
        // been held for at least that long
        assert!(cycle.release - cycle.start > 16);
        assert!(cycle.end > cycle.release);
    }

    #[test]
    fn without_init_the_host_is_never_held() {
        let mut rig = PeripheralRig::new(0x05).unwrap();
        let cycle = rig.host_read().unwrap();
        assert!(!cycle.saw_wait);
        // nobody drives the lines; the pull-ups win
        assert_eq!(cycle.value, 0xFF);
        assert_eq!(rig.engine().state(), EngineState::Uninitialized);
    }

    #[test]
    fn each_cycle_dispatches_exactly_one_event() {
        let mut rig = PeripheralRig::new(0x05).unwrap();
        rig.init().unwrap();
        rig.host_read().unwrap();
        rig.settle(200);
        assert_eq!(rig.dispatcher().dispatched(), 1);
        assert_eq!(rig.twin().world().pio.flags(), 0);
    }

    #[test]
    fn routes_cover_both_strobes() {
        let mut rig = PeripheralRig::new(0x05).unwrap();
        rig.init().unwrap();
        let lines: Vec<u8> = rig.dispatcher().routes().iter().map(|r| r.line).collect();
        assert_eq!(lines, vec![0, 1]);
    }

    #[test]
    #[should_panic(expected = "bus peripheral engine: init called more than once")]
    fn second_init_panics() {
        let mut rig = PeripheralRig::new(0x05).unwrap();
        rig.init().unwrap();
        let _ = rig.init();
    }
}

mod master_tests {
    use super::*;

    #[test]
    fn write_then_read_echoes() {
        logging();
        let mut rig = MasterRig::new(96);
        rig.init().unwrap();
        rig.write(0x3C).unwrap();
        assert_eq!(rig.read().unwrap(), 0x3C);
        assert_eq!(rig.echoed_writes(), vec![0x3C]);
    }

    #[test]
    fn bus_is_quiet_through_init() {
        let pins = BoardPins::DEFAULT;
        let mut rig = MasterRig::new(8);
        {
            let world = rig.twin().world();
            for pin in [pins.rd, pins.wr, pins.modsel] {
                assert!(world.pads.level(pin), "GPIO{} low before init", pin);
            }
        }

        rig.init().unwrap();

        let world = rig.twin().world();
        let echo = world.echo.as_ref().unwrap();
        assert!(echo.reads().is_empty());
        assert!(echo.writes().is_empty());
        for pin in [pins.rd, pins.wr, pins.modsel] {
            assert!(world.pads.level(pin), "GPIO{} low after init", pin);
        }
        assert_eq!(world.pads.contention(), 0);
    }

    #[test]
    fn data_direction_reverts_between_cycles() {
        let mut rig = MasterRig::new(40);
        rig.init().unwrap();
        assert_eq!(data_dirs(&rig), 0);

        rig.read().unwrap();
        assert_eq!(data_dirs(&rig), 0);
        rig.write(0x81).unwrap();
        assert_eq!(data_dirs(&rig), 0);
        assert_eq!(rig.read().unwrap(), 0x81);
        assert_eq!(data_dirs(&rig), 0);
        assert_eq!(rig.twin().world().pads.contention(), 0);
    }

    #[test]
    fn read_before_any_write_returns_peripheral_reset_value() {
        let mut rig = MasterRig::new(8);
        rig.init().unwrap();
        assert_eq!(rig.read().unwrap(), 0x00);
    }

    #[test]
    fn strobes_are_idle_high_between_cycles() {
        let mut rig = MasterRig::new(8);
        rig.init().unwrap();
        rig.write(0x11).unwrap();
        rig.read().unwrap();
        let latch = rig.twin().world().pio.latch();
        let pins = BoardPins::DEFAULT;
        for pin in [pins.rd, pins.wr, pins.modsel] {
            assert!(latch.values & 1 << pin != 0, "GPIO{} left low", pin);
            assert!(latch.dirs & 1 << pin != 0, "GPIO{} not driven", pin);
        }
    }

    #[test]
    fn several_bytes_round_trip() {
        let mut rig = MasterRig::new(24);
        rig.init().unwrap();
        for value in [0x00, 0xFF, 0x55, 0xAA] {
            rig.write(value).unwrap();
            assert_eq!(rig.read().unwrap(), value);
        }
    }

    #[test]
    fn calls_before_init_fail() {
        let mut rig = MasterRig::new(8);
        assert!(matches!(rig.read(), Err(TwinError::Call(_))));
        assert!(matches!(rig.write(1), Err(TwinError::Call(_))));
    }

    #[test]
    fn full_memory_leaves_everything_disabled() {
        let mut rig = MasterRig::with_memory(8, InstructionMemory::with_reserved(u32::MAX));
        let err = rig.init().unwrap_err();
        match err {
            TwinError::Engine(e) => assert!(e.status() < 0),
            other => panic!("unexpected error {other}"),
        }
        assert_eq!(rig.twin().world().pio.enabled(), 0);
    }
}

mod scenario_tests {
    use super::*;

    #[test]
    fn every_scenario_passes() {
        logging();
        for s in Scenario::ALL {
            let report = scenario::run(s).unwrap();
            report.verify().unwrap();
        }
    }

    #[test]
    fn scenario_a_counts_down() {
        let report = scenario::run(Scenario::HostRead).unwrap();
        assert_eq!(report.host_cycles[0].value, 0x05);
        assert_eq!(report.counter_after, Some(0x04));
    }

    #[test]
    fn scenario_b_captures() {
        let report = scenario::run(Scenario::HostWrite).unwrap();
        assert_eq!(report.captured, vec![0x7E]);
    }

    #[test]
    fn scenario_c_reads_back() {
        let report = scenario::run(Scenario::MasterEcho).unwrap();
        assert_eq!(report.master_read, Some(0x3C));
    }

    #[test]
    fn scenario_d_fails_closed() {
        let report = scenario::run(Scenario::ProgramSpaceFull).unwrap();
        assert!(report.status < 0);
        assert_eq!(report.enabled, 0);
        assert_eq!(report.instruction_writes, 0);
    }

    #[test]
    fn letters_round_trip() {
        for s in Scenario::ALL {
            assert_eq!(Scenario::from_letter(s.letter()), Some(s));
        }
        assert_eq!(Scenario::from_letter('b'), Some(Scenario::HostWrite));
        assert_eq!(Scenario::from_letter('e'), None);
    }

    #[test]
    fn mismatch_names_the_scenario() {
        let mut report = scenario::run(Scenario::HostWrite).unwrap();
        report.captured = vec![0x00];
        let err = report.verify().unwrap_err();
        assert!(err.to_string().starts_with("scenario B"));
    }
}
