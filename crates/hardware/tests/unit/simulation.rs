//! # Whole-Machine Tests
//!
//! Both cores on their own threads, driven by the simulator. Programs that
//! share a word are avoided where the outcome would depend on which core wins
//! a race for the bus; sharing a block is fine.

use std::collections::BTreeSet;
use std::time::Duration;

use pretty_assertions::assert_eq;
use rstest::rstest;

use smpsim_core::common::data::CoreId;
use smpsim_core::common::error::SimError;
use smpsim_core::common::reg::Reg;
use smpsim_core::core::units::cache::LineState;
use smpsim_core::core::{Context, SchedEvent};
use smpsim_core::sim::loader::Program;
use smpsim_core::Simulator;

use crate::common::builder::ProgramBuilder;
use crate::common::harness::{
    config, program, run_programs, run_programs_within, try_run_programs,
};

fn reg(ctx: &Context, index: i32) -> i32 {
    ctx.registers.read(Reg::new(index).unwrap())
}

/// Program `i` writes `value` to its own block and reads it back into r3.
fn private_store(i: i32, value: i32) -> ProgramBuilder {
    ProgramBuilder::new()
        .daddi(1, 0, 16 * i)
        .daddi(2, 0, value)
        .sw(2, 4, 1)
        .countdown(4, 3)
        .lw(3, 4, 1)
        .fin()
}

#[test]
fn test_single_context_add_immediate() {
    let report = run_programs(config(20), &[ProgramBuilder::new().daddi(1, 0, 5).fin()]);
    assert_eq!(report.contexts.len(), 1);
    let ctx = report.context(0).unwrap();
    assert_eq!(reg(ctx, 1), 5);
    assert_eq!(ctx.retired_by, Some(CoreId::HIDING));
}

#[test]
fn test_two_contexts_one_per_core() {
    let programs = [
        ProgramBuilder::new().daddi(1, 0, 10).fin(),
        ProgramBuilder::new().daddi(1, 0, 20).fin(),
    ];
    let report = run_programs(config(20), &programs);
    assert_eq!(report.contexts.len(), 2);
    assert_eq!(report.context(0).unwrap().retired_by, Some(CoreId::HIDING));
    assert_eq!(report.context(1).unwrap().retired_by, Some(CoreId::BLOCKING));
    assert_eq!(reg(report.context(0).unwrap(), 1), 10);
    assert_eq!(reg(report.context(1).unwrap(), 1), 20);
    assert_eq!(report.stats.cores[0].contexts_retired, 1);
    assert_eq!(report.stats.cores[1].contexts_retired, 1);
}

#[rstest]
#[case(1)]
#[case(4)]
#[case(20)]
fn test_every_context_retires_exactly_once(#[case] quantum: u32) {
    let programs: Vec<ProgramBuilder> = (0..6).map(|i| private_store(i, 50 + i)).collect();
    let report = run_programs(config(quantum), &programs);

    let ids: BTreeSet<usize> = report.contexts.iter().map(|c| c.id).collect();
    assert_eq!(ids, (0..6).collect());
    assert_eq!(report.contexts.len(), 6);
    for ctx in &report.contexts {
        assert_eq!(reg(ctx, 3), 50 + ctx.id as i32);
        assert!(ctx.retired_by.is_some());
        assert_eq!(ctx.pc % 4, 0);
        assert_eq!(report.coherent_word(16 * ctx.id as u32 + 4), Some(50 + ctx.id as i32));
    }
    let retired: u64 = report.stats.cores.iter().map(|c| c.contexts_retired).sum();
    assert_eq!(retired, 6);
}

/// Program `i` keeps storing to and reloading its own word of data block 0
/// or 8, which all programs share, then reads one untouched word of each.
fn contended_store(i: i32) -> ProgramBuilder {
    ProgramBuilder::new()
        .daddi(1, 0, 128 * (i % 2) + 4 * (i / 2))
        .daddi(2, 0, 100 * (i + 1))
        .daddi(4, 0, 5)
        .sw(2, 0, 1)
        .lw(3, 0, 1)
        .daddi(2, 3, 1)
        .daddi(4, 4, -1)
        .bnez(4, -5)
        .lw(5, 12, 0)
        .lw(6, 140, 0)
        .fin()
}

#[rstest]
#[case(1)]
#[case(2)]
#[case(5)]
fn test_contended_blocks_stay_coherent(#[case] quantum: u32) {
    let programs: Vec<ProgramBuilder> = (0..6).map(contended_store).collect();
    for _ in 0..3 {
        let report = run_programs_within(config(quantum), &programs, Duration::from_secs(60));

        let ids: BTreeSet<usize> = report.contexts.iter().map(|c| c.id).collect();
        assert_eq!(ids, (0..6).collect());
        assert_eq!(report.contexts.len(), 6);
        for ctx in &report.contexts {
            let i = ctx.id as i32;
            let last = 100 * (i + 1) + 4;
            assert_eq!(reg(ctx, 3), last, "context {i} lost its own store");
            assert_eq!(reg(ctx, 4), 0);
            assert_eq!((reg(ctx, 5), reg(ctx, 6)), (1, 1));
            let addr = (128 * (i % 2) + 4 * (i / 2)) as u32;
            assert_eq!(report.coherent_word(addr), Some(last));
        }
        assert_eq!(report.coherent_word(12), Some(1));
        assert_eq!(report.coherent_word(140), Some(1));

        let lines: Vec<_> = report.data_caches.iter().flatten().collect();
        for tag in [0, 8] {
            let valid: Vec<_> = lines.iter().filter(|line| line.holds(tag)).collect();
            let modified = valid
                .iter()
                .filter(|line| line.state == LineState::Modified)
                .count();
            assert!(modified <= 1, "block {tag} modified in {modified} caches");
            if modified == 1 {
                assert_eq!(valid.len(), 1, "block {tag} modified with other copies");
            }
            for line in valid.iter().filter(|line| line.state == LineState::Shared) {
                assert_eq!(line.block, report.memory[tag], "shared copy of block {tag} is stale");
            }
        }
    }
}

#[test]
fn test_final_state_is_reproducible() {
    let programs: Vec<ProgramBuilder> = (0..5).map(|i| private_store(i, i * 7)).collect();
    let first = run_programs(config(3), &programs);
    let second = run_programs(config(3), &programs);

    let registers = |report: &smpsim_core::SimReport| {
        let mut regs: Vec<(usize, Vec<i32>)> = report
            .contexts
            .iter()
            .map(|c| (c.id, c.registers.as_slice().to_vec()))
            .collect();
        regs.sort();
        regs
    };
    assert_eq!(registers(&first), registers(&second));
    for addr in (0..5).map(|i| 16 * i + 4) {
        assert_eq!(first.coherent_word(addr), second.coherent_word(addr));
    }
}

#[test]
fn test_no_block_is_modified_twice_at_the_end() {
    let programs = [
        ProgramBuilder::new().daddi(1, 0, 9).sw(1, 0, 0).fin(),
        ProgramBuilder::new().daddi(1, 0, 8).sw(1, 4, 0).fin(),
        ProgramBuilder::new().lw(2, 0, 0).fin(),
    ];
    let report = run_programs(config(2), &programs);
    let mut modified = BTreeSet::new();
    for line in report.data_caches.iter().flatten() {
        if line.state == LineState::Modified {
            assert!(modified.insert(line.tag), "block {:?} modified twice", line.tag);
        }
    }
}

#[test]
fn test_memory_holds_initial_words_elsewhere() {
    let report = run_programs(config(20), &[private_store(2, -3)]);
    assert_eq!(report.coherent_word(36), Some(-3));
    assert_eq!(report.word(0), Some(1));
    assert_eq!(report.word(380), Some(1));
    assert_eq!(report.word(384), None);
}

#[test]
fn test_divide_by_zero_stops_the_run() {
    let programs = [
        ProgramBuilder::new().countdown(1, 200).fin(),
        ProgramBuilder::new().ddiv(3, 1, 2).fin(),
    ];
    let err = try_run_programs(config(20), &programs).unwrap_err();
    assert!(matches!(err, SimError::DivideByZero { context: 1, .. }));
}

#[test]
fn test_new_rejects_empty_program_and_bad_config() {
    assert!(matches!(
        Simulator::new(config(20), Program::default()),
        Err(SimError::NoContexts)
    ));
    let one = program(&[ProgramBuilder::new().fin()]);
    assert!(matches!(
        Simulator::new(config(0), one),
        Err(SimError::InvalidConfig(_))
    ));
}

#[test]
fn test_step_holds_the_machine_between_calls() {
    let mut sim = Simulator::new(
        config(20),
        program(&[
            ProgramBuilder::new().countdown(1, 50).fin(),
            ProgramBuilder::new().countdown(1, 50).fin(),
        ]),
    )
    .unwrap();
    assert!(!sim.is_running());
    sim.start().unwrap();
    sim.start().unwrap();
    assert!(sim.is_running());

    assert_eq!(sim.step(10).unwrap(), 10);
    assert_eq!(sim.cycle(), 10);
    assert_eq!(sim.running_context(CoreId::HIDING), Some(0));
    assert_eq!(sim.running_context(CoreId::BLOCKING), Some(1));

    let mut total = 10;
    while sim.is_running() {
        total += sim.step(25).unwrap();
    }
    assert_eq!(sim.step(5).unwrap(), 0);
    let report = sim.finish().unwrap();
    assert_eq!(report.stats.cycles, total);
    assert_eq!(report.contexts.len(), 2);
}

#[test]
fn test_report_serializes_events_and_state() {
    let report = run_programs(
        config(20),
        &[
            ProgramBuilder::new().lw(1, 0, 0).fin(),
            ProgramBuilder::new().fin(),
            ProgramBuilder::new().fin(),
        ],
    );
    assert!(report.events[0]
        .iter()
        .chain(&report.events[1])
        .any(|e| matches!(e, SchedEvent::Retired { .. })));

    let value = serde_json::to_value(&report).unwrap();
    assert_eq!(value["contexts"].as_array().unwrap().len(), 3);
    assert_eq!(value["memory"].as_array().unwrap().len(), 24);
    assert_eq!(value["data_caches"][1].as_array().unwrap().len(), 4);
    let first_event = &value["events"]
        .as_array()
        .unwrap()
        .iter()
        .find_map(|core| core.as_array().unwrap().first())
        .unwrap()["event"];
    assert!(first_event.is_string());
}
