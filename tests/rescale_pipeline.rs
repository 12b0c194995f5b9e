use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use canvas_scaler::engine::types::build_signature;
use canvas_scaler::prelude::*;
use canvas_scaler::scaling::{ChangeSignal, RaisedAt, SignalLedger, SignalLifecycle, ViewportSize};
use canvas_scaler::{component_id_of, AccessSets, ECSError, ExecutionError};

fn pipeline_at(width: i32, height: i32) -> (Arc<ManualViewport>, RescalePipeline) {
    let viewport = Arc::new(ManualViewport::new(width, height));
    let pipeline = RescalePipeline::new(viewport.clone(), &PipelineConfig::default()).unwrap();
    (viewport, pipeline)
}

fn spawn_canvas(pipeline: &mut RescalePipeline) -> Entity {
    pipeline
        .spawn_scalable(
            ReferenceResolution::new(800.0, 600.0).unwrap(),
            AxisBlendWeight::new(0.5).unwrap(),
            Transform::default(),
        )
        .unwrap()
}

#[test]
fn resize_rescales_and_raises_one_signal() {
    let (viewport, mut pipeline) = pipeline_at(800, 600);
    let canvas = spawn_canvas(&mut pipeline);

    viewport.set(1600, 600);
    let report = pipeline.tick().unwrap();

    assert_eq!(report.tick, 1);
    assert!(report.rescaled);
    assert_eq!(report.viewport, Some(ViewportSize::new(1600, 600).unwrap()));
    assert_eq!(report.records_rescaled, 1);
    assert_eq!(report.signals_raised, 1);
    assert_eq!(report.live_signals, 1);

    let transform = pipeline.world().get::<Transform>(canvas).unwrap().unwrap();
    let t = transform.translation();
    assert!((t.x - 800.0).abs() < 1e-3 && (t.y - 300.0).abs() < 1e-3 && t.z == 0.0);
    assert!((transform.scale().x - 1.41421).abs() < 1e-4);
}

#[test]
fn signal_is_retired_on_the_following_tick() {
    let (viewport, mut pipeline) = pipeline_at(800, 600);
    spawn_canvas(&mut pipeline);

    viewport.set(1024, 768);
    pipeline.tick().unwrap();
    let signal = pipeline.live_signals()[0];
    assert_eq!(pipeline.ledger().state(signal), SignalLifecycle::Live { since: 1 });

    let report = pipeline.tick().unwrap();
    assert!(!report.rescaled);
    assert_eq!(report.signals_retired, 1);
    assert_eq!(report.live_signals, 0);
    assert_eq!(pipeline.ledger().state(signal), SignalLifecycle::Retired { at: 2 });
    assert!(!pipeline.world().is_alive(signal));
}

#[test]
fn unchanged_viewport_does_nothing() {
    let (_viewport, mut pipeline) = pipeline_at(800, 600);
    let canvas = spawn_canvas(&mut pipeline);

    for _ in 0..2 {
        let report = pipeline.tick().unwrap();
        assert!(!report.rescaled);
        assert_eq!(report.records_rescaled, 0);
        assert_eq!(report.signals_raised, 0);
        assert_eq!(report.signals_retired, 0);
    }
    assert_eq!(pipeline.ledger().retired_count(), 0);
    assert_eq!(pipeline.world().get::<Transform>(canvas).unwrap(), Some(Transform::default()));
}

#[test]
fn non_positive_viewport_skips_the_tick() {
    let (viewport, mut pipeline) = pipeline_at(800, 600);
    spawn_canvas(&mut pipeline);

    viewport.set(0, 600);
    let report = pipeline.tick().unwrap();
    assert!(!report.rescaled);
    assert_eq!(report.live_signals, 0);
    assert_eq!(pipeline.viewport().unwrap(), Some(ViewportSize::new(800, 600).unwrap()));

    // Coming back to the retained size is not a change either.
    viewport.set(800, 600);
    assert!(!pipeline.tick().unwrap().rescaled);
}

#[test]
fn invalid_reading_still_retires_pending_signals() {
    let (viewport, mut pipeline) = pipeline_at(800, 600);
    spawn_canvas(&mut pipeline);

    viewport.set(1200, 600);
    pipeline.tick().unwrap();
    viewport.set(-5, -5);
    let report = pipeline.tick().unwrap();
    assert!(!report.rescaled);
    assert_eq!(report.signals_retired, 1);
    assert_eq!(report.live_signals, 0);
}

#[test]
fn invalid_startup_reading_triggers_on_first_valid_one() {
    let (viewport, mut pipeline) = pipeline_at(0, 0);
    spawn_canvas(&mut pipeline);
    assert_eq!(pipeline.viewport().unwrap(), None);

    assert!(!pipeline.tick().unwrap().rescaled);
    viewport.set(800, 600);
    let report = pipeline.tick().unwrap();
    assert!(report.rescaled);
    assert_eq!(report.viewport, Some(ViewportSize::new(800, 600).unwrap()));
}

#[test]
fn back_to_back_resizes_never_overlap_signals() {
    let (viewport, mut pipeline) = pipeline_at(800, 600);
    spawn_canvas(&mut pipeline);

    let sizes = [(900, 600), (1000, 700), (1100, 800), (1100, 800), (640, 480)];
    let mut raised = 0;
    let mut retired = 0;
    for (w, h) in sizes {
        viewport.set(w, h);
        let report = pipeline.tick().unwrap();
        assert!(report.live_signals <= 1);
        raised += report.signals_raised;
        retired += report.signals_retired;
    }
    let report = pipeline.tick().unwrap();
    retired += report.signals_retired;

    assert_eq!(raised, 4);
    assert_eq!(retired, 4);
    assert_eq!(pipeline.ledger().retired_count(), 4);
    assert!(pipeline.live_signals().is_empty());
}

#[test]
fn observers_see_a_signal_on_the_tick_after_it_was_raised() {
    let (viewport, mut pipeline) = pipeline_at(800, 600);
    spawn_canvas(&mut pipeline);

    let seen = Arc::new(AtomicUsize::new(0));
    let seen_in_system = Arc::clone(&seen);
    let access = AccessSets {
        read: build_signature(&[component_id_of::<ChangeSignal>().unwrap()]),
        ..AccessSets::default()
    };
    pipeline.add_system(FnSystem::new(10, "signal_observer", access, move |world| {
        let query = world.query().read::<ChangeSignal>()?.build();
        seen_in_system.fetch_add(world.count(&query)?, Ordering::Relaxed);
        Ok(())
    }));

    viewport.set(1600, 900);
    pipeline.tick().unwrap();
    assert_eq!(seen.load(Ordering::Relaxed), 0);

    pipeline.tick().unwrap();
    assert_eq!(seen.load(Ordering::Relaxed), 1);

    pipeline.tick().unwrap();
    assert_eq!(seen.load(Ordering::Relaxed), 1);
}

#[test]
fn signal_from_the_current_tick_is_an_ordering_violation() {
    let (_viewport, mut pipeline) = pipeline_at(800, 600);
    let bogus = Bundle::new().with(ChangeSignal).unwrap().with(RaisedAt(1)).unwrap();
    let signal = pipeline.world_mut().spawn(bogus).unwrap();

    let err = pipeline.tick().unwrap_err();
    assert!(err.is_ordering_violation(), "{err}");
    assert!(pipeline.world().is_alive(signal));
    assert_eq!(pipeline.current_tick(), 1);
}

#[test]
fn abandoned_tick_rescales_again_on_the_next_one() {
    let (viewport, mut pipeline) = pipeline_at(800, 600);
    let canvas = spawn_canvas(&mut pipeline);

    let failures_left = Arc::new(AtomicUsize::new(1));
    let failures_in_system = Arc::clone(&failures_left);
    pipeline.add_system(
        FnSystem::new(9, "flaky", AccessSets::default(), move |_| {
            if failures_in_system.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1)).is_ok() {
                return Err(ECSError::SystemFailed { system: 9, reason: "transient".into() });
            }
            Ok(())
        })
        .after(&[1]),
    );
    assert_eq!(pipeline.stage_plan().unwrap(), vec![vec![1], vec![2, 9], vec![3]]);

    viewport.set(1600, 600);
    assert!(pipeline.tick().is_err());
    assert_eq!(pipeline.viewport().unwrap(), Some(ViewportSize::new(800, 600).unwrap()));
    assert!(pipeline.live_signals().is_empty());

    let report = pipeline.tick().unwrap();
    assert!(report.rescaled);
    assert_eq!(report.viewport, Some(ViewportSize::new(1600, 600).unwrap()));
    assert_eq!(report.signals_raised, 1);
    assert_eq!(pipeline.viewport().unwrap(), Some(ViewportSize::new(1600, 600).unwrap()));

    let transform = pipeline.world().get::<Transform>(canvas).unwrap().unwrap();
    assert!((transform.translation().x - 800.0).abs() < 1e-3);
    assert!((transform.scale().x - 1.41421).abs() < 1e-4);

    let report = pipeline.tick().unwrap();
    assert!(!report.rescaled);
    assert_eq!(report.signals_retired, 1);
    assert_eq!(pipeline.ledger().retired_count(), 1);
}

#[test]
fn ledger_forgets_signals_retired_before_the_previous_tick() {
    let mut ledger = SignalLedger::new();
    for i in 0..50u64 {
        let tick = 2 * i + 1;
        ledger.reconcile(tick, &[Entity(i)]).unwrap();
        ledger.reconcile(tick + 1, &[]).unwrap();
        assert!(ledger.tracked() <= 2);
    }
    assert_eq!(ledger.retired_count(), 50);
    assert_eq!(ledger.state(Entity(49)), SignalLifecycle::Retired { at: 100 });
}

#[test]
fn ledger_tracks_the_full_lifecycle() {
    let mut ledger = SignalLedger::new();
    let a = Entity(1);

    assert_eq!(ledger.state(a), SignalLifecycle::Unborn);
    let delta = ledger.reconcile(3, &[a]).unwrap();
    assert_eq!(delta.raised, vec![a]);
    assert_eq!(ledger.state(a), SignalLifecycle::Live { since: 3 });

    let delta = ledger.reconcile(4, &[]).unwrap();
    assert_eq!(delta.retired, vec![a]);
    assert_eq!(ledger.state(a), SignalLifecycle::Retired { at: 4 });
}

#[test]
fn ledger_rejects_broken_histories() {
    let (a, b) = (Entity(1), Entity(2));

    let mut ledger = SignalLedger::new();
    let err = ledger.reconcile(1, &[a, b]).unwrap_err();
    assert!(err.is_ordering_violation());

    let mut ledger = SignalLedger::new();
    ledger.reconcile(1, &[a]).unwrap();
    ledger.reconcile(2, &[]).unwrap();
    assert!(ledger.reconcile(3, &[a]).unwrap_err().is_ordering_violation());

    let mut ledger = SignalLedger::new();
    ledger.reconcile(1, &[a]).unwrap();
    ledger.reconcile(2, &[a]).unwrap();
    let err = ledger.reconcile(3, &[a]).unwrap_err();
    assert!(matches!(err, ECSError::Execution(ExecutionError::OrderingViolation { tick: 3, .. })));
}

#[test]
fn stages_follow_the_pipeline_order() {
    let (_viewport, mut pipeline) = pipeline_at(800, 600);
    assert_eq!(pipeline.stage_plan().unwrap(), vec![vec![1], vec![2], vec![3]]);
}
