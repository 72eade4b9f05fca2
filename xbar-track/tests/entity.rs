// Copyright (c) 2023 Graphcore Ltd. All rights reserved.

use xbar_track::entity::{Entity, toplevel};
use xbar_track::test_helpers::check_and_clear;
use xbar_track::{debug, enter, exit, info, test_init, value};

#[test]
fn hierarchy_names() {
    let (_test_tracker, tracker) = test_init!(2);
    let top = toplevel(&tracker, "top");
    let switch = std::rc::Rc::new(Entity::new(&top, "switch"));
    let sched = Entity::new(&switch, "sched");

    assert_eq!(sched.full_name(), "top::switch::sched");
    assert_eq!(format!("{sched}"), "top::switch::sched");
    assert_eq!(switch.full_name(), "top::switch");
    assert_eq!(top.depth(), 0);
    assert_eq!(sched.depth(), 2);
    assert_eq!(sched.parent_id(), switch.id);
    assert_eq!(top.parent_id(), xbar_track::NO_ID);
}

#[test]
fn create_and_log() {
    let (test_tracker, tracker) = test_init!(10);
    let top = toplevel(&tracker, "top");
    check_and_clear(&test_tracker, &["0: created 10, top"]);

    let sched = Entity::new(&top, "sched");
    check_and_clear(&test_tracker, &["10: created 11, top::sched"]);

    info!(sched ; "matched {} pairs", 3);
    debug!(top ; "tick done");
    check_and_clear(
        &test_tracker,
        &["11:INFO: matched 3 pairs", "10:DEBUG: tick done"],
    );

    enter!(sched ; xbar_track::Id(42));
    exit!(sched ; xbar_track::Id(42));
    value!(sched ; 1.5);
    check_and_clear(
        &test_tracker,
        &["11: 42 entered", "11: 42 exited", "11: value 1.5"],
    );

    drop(sched);
    check_and_clear(&test_tracker, &["10: destroyed 11"]);
}
