//! Interpolation task driven by the std time driver

use core::pin::pin;

use armblocks_core::config::{JointConfig, JointRegistry};
use armblocks_core::sync::{JointTable, SimulatedBus, Synchronizer};
use embassy_futures::select::{select, Either};
use embassy_futures::{block_on, poll_once};
use embassy_time::{Duration, Timer};

fn registry() -> JointRegistry {
    JointRegistry::new(&[
        JointConfig::revolute("base", 1).with_home(90.0),
        JointConfig::revolute("elbow", 2).with_home(10.0),
    ])
    .unwrap()
}

async fn settled(table: &JointTable) {
    while !table.is_settled() {
        Timer::after_millis(1).await;
    }
}

#[test]
fn test_animator_reaches_target_and_sleeps() {
    let registry = registry();
    let table = JointTable::new(&registry);
    let sync = Synchronizer::new(&registry, &table, None, SimulatedBus::for_registry(&registry));
    let mut animator = table.animator(Duration::from_millis(1)).unwrap();

    let outcome = block_on(select(animator.run(), async {
        sync.update_degrees(1, 180.0).await.unwrap();
        settled(&table).await;

        // Second request after the animator went idle wakes it again
        sync.update_degrees(2, 0.0).await.unwrap();
        settled(&table).await;
    }));
    assert!(matches!(outcome, Either::Second(())));

    let base = table.joint(1).unwrap();
    assert_eq!(base.degrees, 180.0);
    assert!(!base.is_moving);
    assert_eq!(table.joint(2).unwrap().degrees, 0.0);
    assert!(!table.is_animating());
}

#[test]
fn test_animate_counts_frames() {
    let registry = registry();
    let table = JointTable::new(&registry);
    let sync = Synchronizer::new(&registry, &table, None, SimulatedBus::for_registry(&registry));
    let mut animator = table.animator(Duration::from_millis(1)).unwrap();

    block_on(sync.update_degrees(1, 100.0)).unwrap();
    let frames = block_on(animator.animate());

    // Five 2-degree steps, then the frame that finds nothing left to move
    assert_eq!(frames, 6);
    assert_eq!(table.joint(1).unwrap().degrees, 100.0);
}

#[test]
fn test_second_animator_resumes_dropped_motion() {
    let registry = registry();
    let table = JointTable::new(&registry);
    let sync = Synchronizer::new(&registry, &table, None, SimulatedBus::for_registry(&registry));

    {
        let mut animator = table.animator(Duration::from_millis(1)).unwrap();
        block_on(sync.update_degrees(1, 180.0)).unwrap();

        let mut run = pin!(animator.run());
        assert!(poll_once(run.as_mut()).is_pending());
        assert!(poll_once(run.as_mut()).is_pending());
    }
    assert!(table.joint(1).unwrap().is_moving);

    let mut animator = table.animator(Duration::from_millis(1)).unwrap();
    let outcome = block_on(select(animator.run(), async {
        sync.update_degrees(1, 100.0).await.unwrap();
        settled(&table).await;
    }));
    assert!(matches!(outcome, Either::Second(())));

    let base = table.joint(1).unwrap();
    assert_eq!(base.degrees, 100.0);
    assert!(!base.is_moving);
    assert!(!table.is_animating());
}
