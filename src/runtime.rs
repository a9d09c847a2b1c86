use crate::bone_jobs::{AttachmentSlots, BoneUpdateJob, BoneUpdateScheduler, InstanceId, JobHandle};
use crate::config::RuntimeConfig;
use crate::events::{EventBus, PlaybackEvent};
use crate::frame_cache::{BoneFrameBuffers, SharedFrameDataCache};
use crate::frames::FrameAsset;
use crate::playback::{TickOutcome, VatPlayer};
use crate::profiler::TickProfiler;
use bevy_ecs::prelude::Resource;

/// Process-wide playback state: the bone job scheduler, the shared frame cache,
/// emitted events and tick timings. Created with [`VatRuntime::init`] and passed
/// by reference to every instance.
#[derive(Resource)]
pub struct VatRuntime {
    config: RuntimeConfig,
    scheduler: BoneUpdateScheduler,
    cache: SharedFrameDataCache,
    events: EventBus,
    profiler: TickProfiler,
    next_instance: u64,
    active: bool,
}

impl VatRuntime {
    pub fn init(config: RuntimeConfig) -> Self {
        log::info!("[vat::runtime] init (batched bone updates: {})", config.batched_bone_updates);
        Self {
            config,
            scheduler: BoneUpdateScheduler::new(),
            cache: SharedFrameDataCache::new(),
            events: EventBus::default(),
            profiler: TickProfiler::new(),
            next_instance: 0,
            active: true,
        }
    }

    /// Completes outstanding work and drops every cache entry. Instances stopped afterwards
    /// release nothing.
    pub fn shutdown(&mut self) {
        if !self.active {
            return;
        }
        self.scheduler.shutdown();
        let dropped = self.cache.shutdown();
        self.active = false;
        log::info!("[vat::runtime] shutdown ({dropped} cache entries dropped)");
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn scheduler(&self) -> &BoneUpdateScheduler {
        &self.scheduler
    }

    pub fn cache(&self) -> &SharedFrameDataCache {
        &self.cache
    }

    /// Drops a cached asset after it was re-baked; live instances keep their buffers.
    pub fn invalidate_asset(&mut self, asset: &FrameAsset) -> bool {
        self.cache.invalidate(asset.id())
    }

    pub fn profiler(&self) -> &TickProfiler {
        &self.profiler
    }

    pub fn drain_events(&mut self) -> Vec<PlaybackEvent> {
        self.events.drain()
    }

    /// New stopped instance bound to `asset` with up to `attachment_slots` slots.
    pub fn create_instance(&mut self, asset: FrameAsset, attachment_slots: usize) -> VatInstance {
        let id = InstanceId(self.next_instance);
        self.next_instance += 1;
        VatInstance::new(id, asset, &self.config, attachment_slots)
    }

    /// Advances every instance and queues its bone work.
    pub fn drive<'a>(&mut self, instances: impl IntoIterator<Item = &'a mut VatInstance>, dt: f32) {
        let _scope = self.profiler.scope("schedule");
        for instance in instances {
            instance.advance(Some(&mut self.scheduler), Some(&mut self.events), dt);
        }
    }

    /// Resolves all bone work queued this tick.
    pub fn complete(&mut self) -> usize {
        let _scope = self.profiler.scope("complete");
        self.scheduler.complete_batch()
    }

    pub fn tick<'a>(&mut self, instances: impl IntoIterator<Item = &'a mut VatInstance>, dt: f32) -> usize {
        self.drive(instances, dt);
        self.complete()
    }
}

/// One animated object: its player, attachment slots and lifecycle bookkeeping.
pub struct VatInstance {
    id: InstanceId,
    asset: FrameAsset,
    player: VatPlayer,
    slots: AttachmentSlots,
    buffers: Option<BoneFrameBuffers>,
    cached: bool,
    batched: bool,
    play_on_start: bool,
    default_animation: usize,
    started: bool,
}

impl VatInstance {
    fn new(id: InstanceId, asset: FrameAsset, config: &RuntimeConfig, attachment_slots: usize) -> Self {
        let data = asset.data().clone();
        let slot_count = attachment_slots.min(data.bone_count);
        if slot_count < attachment_slots {
            log::warn!(
                "[vat::runtime] instance {} requested {attachment_slots} attachment slots but the asset tracks {} bones",
                id.0,
                data.bone_count
            );
        }
        Self {
            id,
            player: VatPlayer::new(data, config),
            asset,
            slots: AttachmentSlots::new(slot_count),
            buffers: None,
            cached: false,
            batched: config.batched_bone_updates,
            play_on_start: config.play_on_start,
            default_animation: config.default_animation,
            started: false,
        }
    }

    pub fn id(&self) -> InstanceId {
        self.id
    }

    pub fn asset(&self) -> &FrameAsset {
        &self.asset
    }

    pub fn player(&self) -> &VatPlayer {
        &self.player
    }

    pub fn player_mut(&mut self) -> &mut VatPlayer {
        &mut self.player
    }

    pub fn attachments(&self) -> &AttachmentSlots {
        &self.slots
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Whether this instance will produce bone work once playing.
    pub fn has_bone_work(&self) -> bool {
        self.buffers.is_some() && !self.slots.is_empty()
    }

    /// Registers with the runtime, acquires shared bone buffers and starts the default clip.
    pub fn start(&mut self, runtime: &mut VatRuntime) {
        if self.started {
            return;
        }
        if self.batched && runtime.is_active() {
            runtime.scheduler.register(self.id);
        }
        if !self.slots.is_empty() {
            self.buffers = runtime.cache.acquire(&self.asset);
            self.cached = self.buffers.is_some();
        }
        self.begin_playback();
    }

    /// Start without a runtime; bone work is completed inline on every update.
    pub fn start_standalone(&mut self) {
        if self.started {
            return;
        }
        let data = self.asset.data();
        if !self.slots.is_empty() && data.has_bone_data() {
            self.buffers = Some(BoneFrameBuffers::from_frame_data(data));
        }
        self.cached = false;
        self.batched = false;
        self.begin_playback();
    }

    fn begin_playback(&mut self) {
        self.started = true;
        let count = self.player.data().animation_count();
        if self.play_on_start && self.player.current_animation().is_none() && count > 0 {
            let index = self.default_animation.min(count - 1);
            self.player.play(index, true, None);
        }
    }

    /// Unregisters, discarding pending bone work, and releases the cache reference.
    pub fn stop(&mut self, runtime: &mut VatRuntime) {
        if !self.started {
            return;
        }
        runtime.scheduler.unregister(self.id);
        let buffers = self.buffers.take();
        if std::mem::take(&mut self.cached) {
            if let Some(buffers) = buffers.as_ref() {
                runtime.cache.release_buffers(self.asset.id(), buffers);
            }
        }
        self.started = false;
    }

    pub fn play(&mut self, index: usize, looping: bool) -> bool {
        self.player.play(index, looping, None)
    }

    pub fn play_transition(&mut self, runtime: &mut VatRuntime, target: usize, blend_duration: f32) -> bool {
        let from = self.player.current_animation();
        if !self.player.play_transition(target, blend_duration) {
            return false;
        }
        runtime.events.push(PlaybackEvent::TransitionStarted {
            instance: self.id,
            from,
            to: target,
            duration: blend_duration,
        });
        true
    }

    /// One tick through the runtime: bone work is queued for the batched completion.
    pub fn update(&mut self, runtime: &mut VatRuntime, dt: f32) -> TickOutcome {
        self.advance(Some(&mut runtime.scheduler), Some(&mut runtime.events), dt)
    }

    /// One tick without a scheduler: bone work completes before returning.
    pub fn update_standalone(&mut self, dt: f32) -> TickOutcome {
        self.advance(None, None, dt)
    }

    fn advance(
        &mut self,
        scheduler: Option<&mut BoneUpdateScheduler>,
        events: Option<&mut EventBus>,
        dt: f32,
    ) -> TickOutcome {
        if !self.started {
            return TickOutcome::default();
        }
        let outcome = self.player.tick(dt);
        if let Some(events) = events {
            if let Some(animation) = outcome.finished {
                events.push(PlaybackEvent::Finished { instance: self.id, animation });
            }
            if let Some(animation) = outcome.transition_completed {
                events.push(PlaybackEvent::TransitionCompleted { instance: self.id, animation });
            }
        }

        if let Some(handle) = self.bone_job() {
            let unscheduled = match scheduler {
                Some(scheduler) if self.batched => scheduler.schedule(self.id, handle),
                _ => Some(handle),
            };
            if let Some(handle) = unscheduled {
                handle.complete();
            }
        }
        outcome
    }

    /// Bone work for the current frame, `None` without slots, data or an active clip.
    pub fn bone_job(&self) -> Option<JobHandle> {
        if self.slots.is_empty() {
            return None;
        }
        let buffers = self.buffers.as_ref()?;
        let params = self.player.job_params()?;
        Some(BoneUpdateJob::new(buffers.clone(), params, self.slots.clone()).schedule())
    }
}
