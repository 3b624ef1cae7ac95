//! End-to-end runs: JSON document through the loader, the engine and the
//! synchronizer down to the simulated bus.

use armblocks_core::config::{GripperSettings, JointConfig, JointRegistry};
use armblocks_core::engine::{CancelToken, Engine, EngineConfig, FailReason, RunError, RunState};
use armblocks_core::program::{BlockRegistry, ProgramLoader};
use armblocks_core::sync::{BusOp, JointTable, SimulatedBus, Synchronizer};
use embassy_futures::block_on;
use embedded_hal_async::delay::DelayNs;

const PICK: &str = r#"{
    "blocks": [
        { "id": "home", "kind": "home", "parameters": {}, "children": [], "x": 0, "y": 0 },
        { "id": "reach", "kind": "move",
          "parameters": { "targets": [
              { "joint": "base", "degrees": 90 },
              { "joint": "shoulder", "degrees": 120 }
          ] },
          "children": [], "x": 0, "y": 40 },
        { "id": "grab", "definitionId": "repeat", "parameters": { "times": 2 },
          "children": [
              { "id": "open", "kind": "open_gripper", "parameters": {}, "children": [] },
              { "id": "pause", "kind": "wait", "parameters": { "seconds": 0.5 }, "children": [] },
              { "id": "close", "kind": "close_gripper", "parameters": {}, "children": [] }
          ] },
        { "id": "lift", "kind": "move", "parameters": { "joint": "shoulder", "degrees": 60 },
          "children": [] }
    ]
}"#;

/// Delay that completes immediately and remembers what was asked
#[derive(Default)]
struct InstantDelay {
    waits: Vec<u32>,
}

impl DelayNs for InstantDelay {
    async fn delay_ns(&mut self, _ns: u32) {}

    async fn delay_ms(&mut self, ms: u32) {
        self.waits.push(ms);
    }
}

fn joints() -> JointRegistry {
    JointRegistry::new(&[
        JointConfig::revolute("base", 1).with_home(180.0),
        JointConfig::revolute("shoulder", 2)
            .with_limit(30.0, 150.0)
            .with_home(90.0),
        JointConfig::revolute("gripper", 6).with_limit(0.0, 180.0),
    ])
    .unwrap()
}

const GRIPPER: GripperSettings = GripperSettings {
    servo_id: 6,
    open: 180.0,
    close: 0.0,
};

#[test]
fn test_connected_program_run() {
    let joints = joints();
    let blocks = BlockRegistry::standard();
    let program = ProgramLoader::new(&blocks, &joints).load_str(PICK).unwrap();

    let table = JointTable::new(&joints);
    let sync = Synchronizer::new(&joints, &table, Some(GRIPPER), SimulatedBus::for_registry(&joints));
    block_on(sync.connect()).unwrap();
    block_on(sync.with_bus(|bus| bus.clear_ops()));

    let engine = Engine::new(EngineConfig { settle_ms: 500 });
    let mut delay = InstantDelay::default();
    block_on(engine.run(&program, &sync, &mut delay, &CancelToken::new())).unwrap();

    assert_eq!(engine.state(), RunState::Completed);
    assert_eq!(delay.waits, vec![500, 500, 500, 500, 500]);

    // Snapped to the read-back position, one encoder count from 60
    let shoulder = table.joint(2).unwrap();
    assert!((shoulder.degrees - 60.0).abs() < 0.1);
    assert!(!shoulder.is_moving);
    assert_eq!(table.joint(1).unwrap().degrees, 90.0);
    assert_eq!(table.joint(6).unwrap().degrees, 0.0);

    let ops = block_on(sync.with_bus(|bus| bus.ops().to_vec()));
    assert!(ops.contains(&BusOp::SyncWritePositions(vec![(1, 1024), (2, 1365)])));
    assert_eq!(
        ops.iter()
            .filter(|op| matches!(op, BusOp::WritePosition(6, _)))
            .count(),
        4
    );
}

#[test]
fn test_disconnected_run_only_animates() {
    let joints = joints();
    let blocks = BlockRegistry::standard();
    let program = ProgramLoader::new(&blocks, &joints).load_str(PICK).unwrap();

    let table = JointTable::new(&joints);
    let sync = Synchronizer::new(&joints, &table, Some(GRIPPER), SimulatedBus::for_registry(&joints));

    let engine = Engine::default();
    let mut delay = InstantDelay::default();
    block_on(engine.run(&program, &sync, &mut delay, &CancelToken::new())).unwrap();

    // Homing is refused but absorbed
    assert_eq!(engine.state(), RunState::Completed);
    assert_eq!(engine.report().absorbed_failures, 1);

    let shoulder = table.joint(2).unwrap();
    assert_eq!(shoulder.target_degrees, Some(60.0));
    assert!(shoulder.is_moving);
    assert!(table.is_animating());

    while table.tick() {}
    assert_eq!(table.joint(2).unwrap().degrees, 60.0);
    assert_eq!(table.joint(1).unwrap().degrees, 90.0);
    assert!(block_on(sync.with_bus(|bus| bus.ops().is_empty())));
}

#[test]
fn test_link_loss_fails_run() {
    let joints = joints();
    let blocks = BlockRegistry::standard();
    let program = ProgramLoader::new(&blocks, &joints).load_str(PICK).unwrap();

    // open + three revolute inits, then two home round-trips
    let bus = SimulatedBus::for_registry(&joints).drop_link_after(14);
    let table = JointTable::new(&joints);
    let sync = Synchronizer::new(&joints, &table, Some(GRIPPER), bus);
    block_on(sync.connect()).unwrap();

    let engine = Engine::new(EngineConfig { settle_ms: 0 });
    let mut delay = InstantDelay::default();
    let result = block_on(engine.run(&program, &sync, &mut delay, &CancelToken::new()));

    assert_eq!(result, Err(RunError::ConnectionLost));
    assert_eq!(engine.state(), RunState::Failed(FailReason::ConnectionLost));
    assert!(!sync.is_connected());

    // The reach block was attempted, the gripper never moved
    assert_eq!(table.joint(1).unwrap().target_degrees, Some(90.0));
    assert_eq!(table.joint(6).unwrap().target_degrees, Some(180.0));
    assert!(delay.waits.is_empty());
}

#[test]
fn test_out_of_range_move_absorbed() {
    let joints = joints();
    let blocks = BlockRegistry::standard();
    let program = ProgramLoader::new(&blocks, &joints)
        .load_str(
            r#"[
                { "id": "a", "kind": "move", "parameters": { "targets": [
                    { "servoId": 1, "value": 400 },
                    { "servoId": 2, "value": 90 }
                ] }, "children": [] }
            ]"#,
        )
        .unwrap();

    let table = JointTable::new(&joints);
    let sync = Synchronizer::new(&joints, &table, None, SimulatedBus::for_registry(&joints));
    block_on(sync.connect()).unwrap();
    block_on(sync.with_bus(|bus| bus.clear_ops()));

    let engine = Engine::default();
    block_on(engine.run(&program, &sync, &mut InstantDelay::default(), &CancelToken::new())).unwrap();

    assert_eq!(table.joint(1).unwrap().degrees, 180.0);
    assert_eq!(table.joint(2).unwrap().degrees, 90.0);
    assert_eq!(
        block_on(sync.with_bus(|bus| bus.ops().to_vec())),
        vec![BusOp::WritePosition(2, 1024), BusOp::ReadPosition(2)]
    );
}
