use std::sync::Once;

use rayon::prelude::*;

use canvas_scaler::engine::commands::{Command, CommandBuffer};
use canvas_scaler::engine::component::{component_id_of, register_component, Bundle};
use canvas_scaler::engine::error::{ECSError, ECSResult, RegistryError, SpawnError};
use canvas_scaler::engine::manager::{ECSData, ECSManager};
use canvas_scaler::engine::query::QueryBuilder;

#[derive(Clone, Copy, Debug, PartialEq)]
struct Health(u32);

#[derive(Clone, Copy, Debug, PartialEq)]
struct Speed(f32);

#[derive(Clone, Copy, Debug, PartialEq)]
struct Tag;

#[derive(Clone, Copy, Debug, PartialEq)]
struct NeverRegistered;

static INIT: Once = Once::new();

fn init() {
    INIT.call_once(|| {
        register_component::<Health>().unwrap();
        register_component::<Speed>().unwrap();
        register_component::<Tag>().unwrap();
    });
}

fn unit(health: u32, speed: f32) -> Bundle {
    Bundle::new().with(Health(health)).unwrap().with(Speed(speed)).unwrap()
}

#[test]
fn spawn_get_despawn() -> ECSResult<()> {
    init();
    let mut world = ECSData::new();

    let a = world.spawn(unit(10, 1.0))?;
    assert!(world.is_alive(a));
    assert_eq!(world.get::<Health>(a)?, Some(Health(10)));
    assert_eq!(world.get::<Tag>(a)?, None);

    if let Some(speed) = world.get_mut::<Speed>(a)? {
        speed.0 = 4.0;
    }
    assert_eq!(world.get::<Speed>(a)?, Some(Speed(4.0)));

    assert!(world.despawn(a)?);
    assert!(!world.is_alive(a));
    assert!(!world.despawn(a)?);
    assert_eq!(world.get::<Health>(a)?, None);
    assert_eq!(world.live_count(), 0);
    Ok(())
}

#[test]
fn stale_handles_never_alias_reused_slots() -> ECSResult<()> {
    init();
    let mut world = ECSData::new();

    let old = world.spawn(unit(1, 1.0))?;
    world.despawn(old)?;
    let new = world.spawn(unit(2, 2.0))?;

    assert_eq!(old.index(), new.index());
    assert_ne!(old, new);
    assert_eq!(world.get::<Health>(old)?, None);
    assert_eq!(world.get::<Health>(new)?, Some(Health(2)));
    Ok(())
}

#[test]
fn swap_remove_keeps_other_rows_addressable() -> ECSResult<()> {
    init();
    let mut world = ECSData::new();

    let records: Vec<_> = (0..5).map(|i| world.spawn(unit(i, i as f32))).collect::<ECSResult<_>>()?;
    world.despawn(records[0])?;
    world.despawn(records[2])?;

    for &i in &[1usize, 3, 4] {
        assert_eq!(world.get::<Health>(records[i])?, Some(Health(i as u32)));
    }
    world.check_integrity()
}

#[test]
fn add_and_remove_migrate_between_archetypes() -> ECSResult<()> {
    init();
    let mut world = ECSData::new();
    let tag = component_id_of::<Tag>()?;
    let speed = component_id_of::<Speed>()?;

    let a = world.spawn(unit(7, 3.5))?;
    let b = world.spawn(unit(8, 4.5))?;

    let report = world.apply(vec![Command::add(a, tag, Tag)])?;
    assert_eq!(report.added, 1);
    assert_eq!(world.get::<Tag>(a)?, Some(Tag));
    assert_eq!(world.get::<Health>(a)?, Some(Health(7)));
    assert_eq!(world.get::<Health>(b)?, Some(Health(8)));

    let tagged = QueryBuilder::new().read::<Tag>()?.build();
    assert_eq!(world.count(&tagged), 1);

    world.apply(vec![Command::add(a, speed, Speed(9.0))])?;
    assert_eq!(world.get::<Speed>(a)?, Some(Speed(9.0)));

    let report = world.apply(vec![Command::Remove { entity: a, component_id: tag }])?;
    assert_eq!(report.removed, 1);
    assert_eq!(world.get::<Tag>(a)?, None);
    assert_eq!(world.get::<Speed>(a)?, Some(Speed(9.0)));
    assert_eq!(world.count(&tagged), 0);
    world.check_integrity()
}

#[test]
fn removing_the_last_component_destroys_the_record() -> ECSResult<()> {
    init();
    let mut world = ECSData::new();
    let a = world.spawn(Bundle::new().with(Tag)?)?;

    world.apply(vec![Command::Remove { entity: a, component_id: component_id_of::<Tag>()? }])?;
    assert!(!world.is_alive(a));
    Ok(())
}

#[test]
fn replay_counts_commands_on_absent_records() -> ECSResult<()> {
    init();
    let mut world = ECSData::new();
    let a = world.spawn(unit(1, 1.0))?;
    let tag = component_id_of::<Tag>()?;

    let report = world.apply(vec![
        Command::Despawn { entity: a },
        Command::Despawn { entity: a },
        Command::add(a, tag, Tag),
        Command::Spawn { bundle: unit(2, 2.0) },
    ])?;

    assert_eq!(report.despawned, vec![a]);
    assert_eq!(report.ignored, 2);
    assert_eq!(report.spawned.len(), 1);
    assert_eq!(report.total(), 4);
    assert_eq!(world.live_count(), 1);
    Ok(())
}

#[test]
fn bad_spawns_are_rejected() {
    init();
    let mut world = ECSData::new();

    assert_eq!(world.spawn(Bundle::new()), Err(ECSError::Spawn(SpawnError::EmptyBundle)));

    let mut mismatched = Bundle::new();
    mismatched.insert(component_id_of::<Health>().unwrap(), "not a health value");
    assert!(matches!(world.spawn(mismatched), Err(ECSError::Spawn(SpawnError::TypeMismatch { .. }))));
    assert_eq!(world.live_count(), 0);

    assert!(matches!(
        Bundle::new().with(NeverRegistered),
        Err(ECSError::Registry(RegistryError::NotRegistered { .. }))
    ));
}

#[test]
fn mismatched_add_fails_without_corrupting_storage() -> ECSResult<()> {
    init();
    let mut world = ECSData::new();
    let a = world.spawn(unit(1, 1.0))?;

    let result = world.apply(vec![Command::add(a, component_id_of::<Health>()?, 5u64)]);
    assert!(matches!(result, Err(ECSError::Spawn(SpawnError::TypeMismatch { .. }))));
    assert_eq!(world.get::<Health>(a)?, Some(Health(1)));
    world.check_integrity()
}

#[test]
fn buffer_refuses_to_drain_while_producers_run() -> ECSResult<()> {
    init();
    let buffer = CommandBuffer::new();

    let guard = buffer.producer();
    buffer.push(Command::Spawn { bundle: unit(1, 1.0) })?;
    assert_eq!(buffer.open_producers(), 1);
    assert!(buffer.drain(4).unwrap_err().is_ordering_violation());

    drop(guard);
    let drained = buffer.drain(4)?;
    assert_eq!(drained.len(), 1);
    assert!(buffer.is_empty());
    Ok(())
}

#[test]
fn concurrent_pushes_keep_every_command_in_per_thread_order() -> ECSResult<()> {
    init();
    let buffer = CommandBuffer::new();

    (0..1_000u32).into_par_iter().try_for_each(|i| buffer.push(Command::Spawn { bundle: unit(i, 0.0) }))?;
    assert_eq!(buffer.len(), 1_000);

    let mut ecs = ECSManager::default();
    for command in buffer.drain(0)? {
        ecs.world_ref().defer(command)?;
    }
    let report = ecs.apply_deferred_commands()?;
    assert_eq!(report.spawned.len(), 1_000);

    let mut healths: Vec<u32> = report
        .spawned
        .iter()
        .map(|&e| ecs.data().get::<Health>(e).map(|h| h.map_or(u32::MAX, |h| h.0)))
        .collect::<ECSResult<_>>()?;
    healths.sort_unstable();
    assert_eq!(healths, (0..1_000).collect::<Vec<_>>());
    Ok(())
}

#[test]
fn replay_applies_in_enqueue_order() -> ECSResult<()> {
    init();
    let mut ecs = ECSManager::default();
    let a = ecs.data_mut().spawn(unit(1, 1.0))?;
    let tag = component_id_of::<Tag>()?;

    let world = ecs.world_ref();
    world.defer(Command::add(a, tag, Tag))?;
    world.defer(Command::Remove { entity: a, component_id: tag })?;
    world.defer(Command::add(a, tag, Tag))?;

    let report = ecs.apply_deferred_commands()?;
    assert_eq!((report.added, report.removed), (2, 1));
    assert_eq!(ecs.data().get::<Tag>(a)?, Some(Tag));
    assert!(ecs.commands().is_empty());
    Ok(())
}

#[test]
fn discarded_commands_are_never_applied() -> ECSResult<()> {
    init();
    let mut ecs = ECSManager::default();
    ecs.world_ref().defer(Command::Spawn { bundle: unit(1, 1.0) })?;

    assert_eq!(ecs.commands().discard(), 1);
    let report = ecs.apply_deferred_commands()?;
    assert_eq!(report.total(), 0);
    assert_eq!(ecs.data().live_count(), 0);
    Ok(())
}
