mod common;

use anyhow::{Context, Result};
use common::{marker, sample_frame_data};
use kestrel_vat::bone_jobs::AttachmentTransform;
use kestrel_vat::config::RuntimeConfig;
use kestrel_vat::ecs::VatWorld;
use kestrel_vat::events::PlaybackEvent;
use kestrel_vat::frames::{CombinedFrameData, FrameAsset};
use kestrel_vat::playback::PlaybackPhase;
use kestrel_vat::runtime::VatRuntime;

fn config() -> RuntimeConfig {
    RuntimeConfig { random_start_offset: false, ..RuntimeConfig::default() }
}

fn asset() -> FrameAsset {
    FrameAsset::new(sample_frame_data())
}

#[test]
fn started_instances_play_the_default_clip_and_fill_attachments() -> Result<()> {
    let mut runtime = VatRuntime::init(config());
    let asset = asset();
    let mut a = runtime.create_instance(asset.clone(), 2);
    let mut b = runtime.create_instance(asset.clone(), 1);
    assert_ne!(a.id(), b.id());

    a.start(&mut runtime);
    b.start(&mut runtime);
    assert!(a.is_started() && a.has_bone_work());
    assert_eq!(a.player().current_animation(), Some(0));
    assert_eq!(runtime.scheduler().registered_count(), 2);
    assert_eq!(runtime.cache().ref_count(asset.id()), 2);

    let completed = runtime.tick([&mut a, &mut b], 0.25);
    assert_eq!(completed, 2);
    assert_eq!(a.attachments().snapshot(), vec![marker(0, 1, 0).into(), marker(0, 1, 1).into()]);
    assert_eq!(b.attachments().get(0), Some(marker(0, 1, 0).into()));

    a.stop(&mut runtime);
    assert_eq!(runtime.cache().ref_count(asset.id()), 1);
    assert_eq!(runtime.scheduler().registered_count(), 1);
    b.stop(&mut runtime);
    assert!(runtime.cache().is_empty());
    Ok(())
}

#[test]
fn attachment_slots_are_capped_at_tracked_bones() {
    let mut runtime = VatRuntime::init(config());
    let instance = runtime.create_instance(asset(), 5);
    assert_eq!(instance.attachments().len(), 2);
}

#[test]
fn instances_without_slots_skip_the_cache() {
    let mut runtime = VatRuntime::init(config());
    let asset = asset();
    let mut instance = runtime.create_instance(asset.clone(), 0);
    instance.start(&mut runtime);
    assert!(!instance.has_bone_work());
    assert!(!runtime.cache().contains(asset.id()));
    assert!(instance.bone_job().is_none());
    assert_eq!(runtime.tick([&mut instance], 0.1), 0);
}

#[test]
fn default_animation_is_clamped_and_play_on_start_respected() {
    let mut runtime = VatRuntime::init(RuntimeConfig { default_animation: 9, ..config() });
    let mut instance = runtime.create_instance(asset(), 0);
    instance.start(&mut runtime);
    assert_eq!(instance.player().current_animation(), Some(2));

    let mut runtime = VatRuntime::init(RuntimeConfig { play_on_start: false, ..config() });
    let mut idle = runtime.create_instance(asset(), 2);
    idle.start(&mut runtime);
    assert_eq!(idle.player().phase(), PlaybackPhase::Idle);
    assert!(idle.bone_job().is_none());
}

#[test]
fn playback_events_are_collected_by_the_runtime() -> Result<()> {
    let mut runtime = VatRuntime::init(config());
    let mut instance = runtime.create_instance(asset(), 2);
    instance.start(&mut runtime);

    assert!(instance.play_transition(&mut runtime, 2, 0.5));
    assert!(!instance.play_transition(&mut runtime, 2, 0.5));
    instance.update(&mut runtime, 0.5);
    runtime.complete();

    assert!(instance.play(1, false));
    instance.update(&mut runtime, 1.0);
    runtime.complete();

    let events = runtime.drain_events();
    let id = instance.id();
    assert_eq!(
        events,
        vec![
            PlaybackEvent::TransitionStarted { instance: id, from: Some(0), to: 2, duration: 0.5 },
            PlaybackEvent::TransitionCompleted { instance: id, animation: 2 },
            PlaybackEvent::Finished { instance: id, animation: 1 },
        ]
    );
    assert!(events.iter().all(|event| event.instance() == id));
    assert!(runtime.drain_events().is_empty());
    let last = instance.attachments().get(1).context("slot 1")?;
    assert_eq!(last, marker(1, 1, 1).into());
    Ok(())
}

#[test]
fn unbatched_and_standalone_instances_complete_inline() {
    let mut runtime = VatRuntime::init(RuntimeConfig { batched_bone_updates: false, ..config() });
    let mut instance = runtime.create_instance(asset(), 1);
    instance.start(&mut runtime);
    assert_eq!(runtime.scheduler().registered_count(), 0);

    instance.update(&mut runtime, 0.5);
    assert_eq!(runtime.scheduler().pending_count(), 0);
    assert_eq!(instance.attachments().get(0), Some(marker(0, 2, 0).into()));

    let mut standalone = runtime.create_instance(asset(), 2);
    standalone.start_standalone();
    standalone.update_standalone(0.75);
    assert_eq!(standalone.attachments().get(1), Some(marker(0, 3, 1).into()));
}

#[test]
fn stopping_before_completion_discards_queued_work() {
    let mut runtime = VatRuntime::init(config());
    let mut instance = runtime.create_instance(asset(), 1);
    instance.start(&mut runtime);
    instance.update(&mut runtime, 0.5);
    assert_eq!(runtime.scheduler().pending_count(), 1);

    instance.stop(&mut runtime);
    assert_eq!(runtime.complete(), 0);
    assert_eq!(instance.attachments().get(0), Some(AttachmentTransform::default()));
    assert_eq!(instance.update(&mut runtime, 0.5), Default::default(), "stopped instances do not tick");
}

#[test]
fn shutdown_completes_work_and_drops_the_cache() {
    let mut runtime = VatRuntime::init(config());
    let asset = asset();
    let mut instance = runtime.create_instance(asset.clone(), 1);
    instance.start(&mut runtime);
    instance.update(&mut runtime, 0.25);

    runtime.shutdown();
    assert!(!runtime.is_active());
    assert!(runtime.cache().is_empty());
    assert_eq!(instance.attachments().get(0), Some(marker(0, 1, 0).into()));

    instance.stop(&mut runtime);
    assert!(runtime.cache().is_empty());
    runtime.shutdown();
}

#[test]
fn invalidated_assets_are_rebuilt_on_next_start() {
    let mut runtime = VatRuntime::init(config());
    let asset = asset();
    let mut first = runtime.create_instance(asset.clone(), 1);
    first.start(&mut runtime);
    assert!(runtime.invalidate_asset(&asset));
    assert!(!runtime.cache().contains(asset.id()));

    let mut second = runtime.create_instance(asset.clone(), 1);
    second.start(&mut runtime);
    assert_eq!(runtime.cache().ref_count(asset.id()), 1);
    assert_eq!(runtime.tick([&mut first, &mut second], 0.25), 2);
}

#[test]
fn runtime_profiles_tick_phases() {
    let mut runtime = VatRuntime::init(config());
    let mut instance = runtime.create_instance(asset(), 1);
    instance.start(&mut runtime);
    runtime.tick([&mut instance], 0.1);
    runtime.tick([&mut instance], 0.1);

    let schedule = runtime.profiler().summary("schedule").expect("schedule phase recorded");
    assert_eq!(schedule.samples, 2);
    assert!(runtime.profiler().summary("complete").is_some());
    assert_eq!(runtime.profiler().summaries().len(), 2);
}

#[test]
fn world_drives_animators_through_its_schedule() -> Result<()> {
    let mut world = VatWorld::new(config());
    let asset = asset();
    let entity = world.spawn_animator(asset.clone(), 2);
    let other = world.spawn_animator(asset.clone(), 2);
    assert_eq!(world.runtime().cache().ref_count(asset.id()), 2);

    world.update(0.5);
    let animator = world.animator(entity).context("animator spawned")?;
    assert_eq!(animator.attachments(), vec![marker(0, 2, 0).into(), marker(0, 2, 1).into()]);
    let material = animator.material_params();
    assert_eq!((material.frames, material.offset), (4, 0));
    assert_eq!(world.runtime().scheduler().completed_last_tick(), 2);

    assert!(world.play_transition(entity, 1, 0.25));
    assert!(world.animator(entity).context("animator")?.material_params().blend.is_some());
    world.update(0.25);
    world.set_finish(other, true);
    world.update(0.25);
    assert!(world.play(other, 2, true));

    let events = world.drain_events();
    assert!(matches!(events[0], PlaybackEvent::TransitionStarted { to: 1, .. }));
    assert!(matches!(events[1], PlaybackEvent::TransitionCompleted { animation: 1, .. }));

    assert!(world.despawn_animator(entity));
    assert!(!world.despawn_animator(entity));
    assert_eq!(world.runtime().cache().ref_count(asset.id()), 1);

    world.shutdown();
    assert!(!world.runtime().is_active());
    assert!(world.runtime().cache().is_empty());
    Ok(())
}

#[test]
fn assets_without_bone_data_still_animate_materials() -> Result<()> {
    let mut world = VatWorld::new(config());
    let asset = FrameAsset::new(CombinedFrameData::new(sample_frame_data().timings));
    let entity = world.spawn_animator(asset, 2);
    world.update(0.25);

    let animator = world.animator(entity).context("animator spawned")?;
    assert!(animator.attachments().is_empty());
    assert_eq!(animator.material_params().timer, 0.25);
    Ok(())
}

#[test]
fn instances_started_before_invalidation_leave_the_rebuilt_entry_alone() {
    let mut runtime = VatRuntime::init(config());
    let asset = asset();
    let mut first = runtime.create_instance(asset.clone(), 1);
    let mut second = runtime.create_instance(asset.clone(), 1);
    let mut third = runtime.create_instance(asset.clone(), 1);

    first.start(&mut runtime);
    runtime.invalidate_asset(&asset);
    second.start(&mut runtime);
    first.stop(&mut runtime);
    assert_eq!(runtime.cache().ref_count(asset.id()), 1);

    third.start(&mut runtime);
    assert_eq!(runtime.cache().ref_count(asset.id()), 2);
    second.stop(&mut runtime);
    assert!(runtime.cache().contains(asset.id()), "third instance still holds the entry");
    assert_eq!(runtime.cache().ref_count(asset.id()), 1);

    assert_eq!(runtime.tick([&mut third], 0.25), 1);
    assert_eq!(third.attachments().get(0), Some(marker(0, 1, 0).into()));
    third.stop(&mut runtime);
    assert!(runtime.cache().is_empty());
}

#[test]
fn repeated_updates_before_completion_keep_the_latest_pose() {
    let mut runtime = VatRuntime::init(config());
    let mut instance = runtime.create_instance(asset(), 2);
    instance.start(&mut runtime);

    instance.update(&mut runtime, 0.25);
    instance.update(&mut runtime, 0.25);
    assert_eq!(runtime.scheduler().pending_count(), 1);

    assert_eq!(runtime.complete(), 1);
    assert_eq!(instance.attachments().snapshot(), vec![marker(0, 2, 0).into(), marker(0, 2, 1).into()]);
}
