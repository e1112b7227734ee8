mod common;

use virusmc_core::StateError;
use virusmc_types::{
    BankNumber, ControlCommand, McFeedback, MidiEvent, PresetKind, StateType, M_PROGRAMCHANGE,
    SINGLE_PART,
};

fn populated() -> virusmc_core::Microcontroller {
    let (mc, _ch) = common::unit();
    mc.write_single(BankNumber::A, 3, common::named_single("Saved A3")).unwrap();
    mc.write_single(BankNumber::B, 127, common::named_single("Saved B127")).unwrap();
    mc.write_multi(BankNumber::A, 9, common::multi_on_program("Saved M9", 3)).unwrap();
    mc.write_single(BankNumber::EditBuffer, SINGLE_PART, common::named_single("Edited")).unwrap();
    mc.send_sysex(
        &common::frame(virusmc_core::codec::Command::ParameterChange {
            page: virusmc_types::Page::C,
            part: 0,
            param: ControlCommand::MasterTune.param(),
            value: 70,
        }),
        virusmc_types::MidiEventSource::Host,
    );
    common::run_until_idle(&mc, 20);
    mc
}

#[test]
fn test_full_state_roundtrip() {
    let source = populated();
    let state = source.get_state(StateType::Full);

    let (target, ch) = common::unit();
    target.set_state(&state, StateType::Full).unwrap();
    assert!(target.is_loading_state());
    common::run_until_idle(&target, 20);
    assert!(!target.is_loading_state());

    assert_eq!(target.get_state(StateType::Full), state);
    assert_eq!(
        target.request_single(BankNumber::A, 3).unwrap().name(PresetKind::Single),
        "Saved A3"
    );
    assert_eq!(
        target.request_multi(BankNumber::A, 9).unwrap().name(PresetKind::Multi),
        "Saved M9"
    );
    assert_eq!(
        target.current_part_single(SINGLE_PART).unwrap().name(PresetKind::Single),
        "Edited"
    );
    assert_eq!(target.global(ControlCommand::MasterTune.param()), 70);

    // the restored single edit buffer was resent to the DSP
    let blocks = ch.preset_blocks();
    assert_eq!(blocks.len(), 1);
    assert_eq!(blocks[0].preset.name(PresetKind::Single), "Edited");
    assert!(common::drain_feedback(&target).contains(&McFeedback::StateRestored));
}

#[test]
fn test_bank_state_keeps_edit_buffers() {
    let source = populated();
    let state = source.get_state(StateType::Banks);

    let (target, ch) = common::unit();
    target.set_state(&state, StateType::Banks).unwrap();
    assert!(!target.is_loading_state());
    common::run_until_idle(&target, 20);

    assert!(target.request_single(BankNumber::B, 127).is_ok());
    assert_eq!(
        target.current_part_single(SINGLE_PART).unwrap().name(PresetKind::Single),
        "Init"
    );
    assert_eq!(ch.preset_block_count(), 0);
}

#[test]
fn test_rejected_snapshots_leave_store_untouched() {
    let source = populated();
    let good = source.get_state(StateType::Full);
    let (target, _ch) = common::unit();
    let before = target.get_state(StateType::Full);

    let mut bad_magic = good.clone();
    bad_magic[0] = b'Z';
    assert_eq!(target.set_state(&bad_magic, StateType::Full), Err(StateError::BadMagic));

    let mut bad_version = good.clone();
    bad_version[4] = 2;
    assert_eq!(
        target.set_state(&bad_version, StateType::Full),
        Err(StateError::UnsupportedVersion(2))
    );

    assert!(matches!(
        target.set_state(&good, StateType::Banks),
        Err(StateError::TypeMismatch { .. })
    ));
    assert!(matches!(
        target.set_state(&good[..good.len() - 10], StateType::Full),
        Err(StateError::Length { .. })
    ));
    assert_eq!(target.set_state(&[], StateType::Full), Err(StateError::BadMagic));

    assert_eq!(target.get_state(StateType::Full), before);
    assert!(!target.is_loading_state());
}

#[test]
fn test_restore_blocks_program_changes_until_delivered() {
    let source = populated();
    let state = source.get_state(StateType::Full);

    let (target, ch) = common::manual_unit();
    target.write_single(BankNumber::A, 5, common::named_single("Five")).unwrap();
    target.set_state(&state, StateType::Full).unwrap();
    assert_eq!(target.set_state(&state, StateType::Full), Err(StateError::RestoreInProgress));

    target.send_midi(MidiEvent::new(M_PROGRAMCHANGE, 3, 0));
    target.process(64);
    assert_eq!(target.diagnostics().rejected_while_loading, 1);
    assert_eq!(
        target.current_part_single(SINGLE_PART).unwrap().name(PresetKind::Single),
        "Edited"
    );

    assert_eq!(ch.preset_block_count(), 1);
    ch.acknowledge();
    target.process(64);
    assert!(!target.is_loading_state());

    target.send_midi(MidiEvent::new(M_PROGRAMCHANGE, 3, 0));
    target.process(64);
    assert_eq!(
        target.current_part_single(SINGLE_PART).unwrap().name(PresetKind::Single),
        "Saved A3"
    );
}

#[test]
fn test_ack_for_an_earlier_transfer_does_not_finish_a_restore() {
    let source = populated();
    let state = source.get_state(StateType::Full);

    let (target, ch) = common::manual_unit();
    target.write_single(BankNumber::EditBuffer, SINGLE_PART, common::named_single("Before")).unwrap();
    target.process(64);
    assert_eq!(ch.preset_block_count(), 1);

    target.set_state(&state, StateType::Full).unwrap();
    // this ack answers the block sent before the restore
    ch.acknowledge();
    for _ in 0..4 {
        target.process(64);
    }
    assert_eq!(ch.preset_block_count(), 2);
    assert!(target.is_loading_state());
    assert!(!common::drain_feedback(&target).contains(&McFeedback::StateRestored));

    ch.acknowledge();
    target.process(64);
    assert!(!target.is_loading_state());
    assert!(common::drain_feedback(&target).contains(&McFeedback::StateRestored));
}
