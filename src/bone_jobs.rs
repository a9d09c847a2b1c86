use crate::frame_cache::BoneFrameBuffers;
use crate::frames::BoneFrameData;
use glam::{Quat, Vec3};
use rayon::prelude::*;
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InstanceId(pub u64);

/// Per-tick inputs of one instance's bone update.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoneJobParams {
    pub current_anim: usize,
    pub current_frame: usize,
    pub blend_from_anim: Option<usize>,
    pub blend_from_frame: usize,
    pub blend_weight: f32,
    pub is_blending: bool,
}

impl BoneJobParams {
    pub fn new(current_anim: usize, current_frame: usize) -> Self {
        Self {
            current_anim,
            current_frame,
            blend_from_anim: None,
            blend_from_frame: 0,
            blend_weight: 1.0,
            is_blending: false,
        }
    }

    pub fn blending_from(mut self, anim: usize, frame: usize, weight: f32) -> Self {
        self.blend_from_anim = Some(anim);
        self.blend_from_frame = frame;
        self.blend_weight = weight.clamp(0.0, 1.0);
        self.is_blending = true;
        self
    }

    /// Bone pose for `slot`: the current frame, blended from the source frame while
    /// a transition runs. Missing data resolves to [`BoneFrameData::NEUTRAL`].
    pub fn evaluate(&self, buffers: &BoneFrameBuffers, slot: usize) -> BoneFrameData {
        let current =
            buffers.lookup(self.current_anim, self.current_frame, slot).unwrap_or(BoneFrameData::NEUTRAL);
        if !self.is_blending {
            return current;
        }
        let source = self.blend_from_anim.and_then(|anim| buffers.lookup(anim, self.blend_from_frame, slot));
        match source {
            Some(source) => source.blend(&current, self.blend_weight),
            None => current,
        }
    }
}

/// Local transform written into an attachment slot.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AttachmentTransform {
    pub local_position: Vec3,
    pub local_rotation: Quat,
}

impl Default for AttachmentTransform {
    fn default() -> Self {
        Self { local_position: Vec3::ZERO, local_rotation: Quat::IDENTITY }
    }
}

impl From<BoneFrameData> for AttachmentTransform {
    fn from(frame: BoneFrameData) -> Self {
        Self { local_position: frame.position, local_rotation: frame.rotation }
    }
}

/// Attachment transforms of one instance, written by its bone job.
#[derive(Clone, Debug, Default)]
pub struct AttachmentSlots {
    inner: Arc<Mutex<Vec<AttachmentTransform>>>,
}

impl AttachmentSlots {
    pub fn new(count: usize) -> Self {
        Self { inner: Arc::new(Mutex::new(vec![AttachmentTransform::default(); count])) }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<AttachmentTransform>> {
        // Jobs only overwrite whole transforms, so a poisoned lock still holds usable data.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn get(&self, slot: usize) -> Option<AttachmentTransform> {
        self.lock().get(slot).copied()
    }

    pub fn snapshot(&self) -> Vec<AttachmentTransform> {
        self.lock().clone()
    }

    /// Keeps at most `count` slots.
    pub fn truncate(&self, count: usize) {
        self.lock().truncate(count);
    }
}

/// Read-only over shared buffers; writes only its own instance's slots.
#[derive(Clone, Debug)]
pub struct BoneUpdateJob {
    buffers: BoneFrameBuffers,
    params: BoneJobParams,
    slots: AttachmentSlots,
}

impl BoneUpdateJob {
    pub fn new(buffers: BoneFrameBuffers, params: BoneJobParams, slots: AttachmentSlots) -> Self {
        Self { buffers, params, slots }
    }

    pub fn params(&self) -> &BoneJobParams {
        &self.params
    }

    /// Updates every slot in parallel.
    pub fn execute(&self) {
        let mut slots = self.slots.lock();
        let bone_count = self.buffers.bone_count();
        slots.par_iter_mut().enumerate().filter(|(slot, _)| *slot < bone_count).for_each(|(slot, transform)| {
            *transform = self.params.evaluate(&self.buffers, slot).into();
        });
    }

    pub fn schedule(self) -> JobHandle {
        JobHandle { job: Some(self) }
    }
}

/// Pending bone work of one instance.
#[derive(Debug, Default)]
#[must_use = "a scheduled bone job does nothing until it is completed or combined"]
pub struct JobHandle {
    job: Option<BoneUpdateJob>,
}

impl JobHandle {
    pub fn is_pending(&self) -> bool {
        self.job.is_some()
    }

    /// Runs the job now on the calling thread's pool.
    pub fn complete(mut self) {
        if let Some(job) = self.job.take() {
            job.execute();
        }
    }

    /// Drops the work without running it.
    pub fn dispose(mut self) {
        self.job = None;
    }
}

/// Several instances' pending work resolved at one synchronization point.
#[derive(Debug, Default)]
pub struct CombinedJobHandle {
    jobs: Vec<(InstanceId, BoneUpdateJob)>,
}

impl CombinedJobHandle {
    /// Holds at most one job per owner; a newer handle replaces the owner's pending job.
    pub fn combine(&mut self, owner: InstanceId, handle: JobHandle) {
        let Some(job) = handle.job else {
            return;
        };
        match self.jobs.iter_mut().find(|(id, _)| *id == owner) {
            Some((_, pending)) => *pending = job,
            None => self.jobs.push((owner, job)),
        }
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn discard(&mut self, owner: InstanceId) -> usize {
        let before = self.jobs.len();
        self.jobs.retain(|(id, _)| *id != owner);
        before - self.jobs.len()
    }

    /// Runs every job across the pool and returns how many ran.
    pub fn complete(self) -> usize {
        let count = self.jobs.len();
        self.jobs.par_iter().for_each(|(_, job)| job.execute());
        count
    }
}

/// Collects every registered instance's bone work and completes it once per tick.
#[derive(Debug, Default)]
pub struct BoneUpdateScheduler {
    registered: BTreeSet<InstanceId>,
    pending: CombinedJobHandle,
    completed_last_tick: usize,
}

impl BoneUpdateScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, id: InstanceId) -> bool {
        self.registered.insert(id)
    }

    /// Removes the instance and discards its pending work without waiting on it.
    pub fn unregister(&mut self, id: InstanceId) -> bool {
        let discarded = self.pending.discard(id);
        if discarded > 0 {
            log::debug!("[vat::jobs] discarded {discarded} pending job(s) for instance {}", id.0);
        }
        self.registered.remove(&id)
    }

    pub fn is_registered(&self, id: InstanceId) -> bool {
        self.registered.contains(&id)
    }

    pub fn registered_count(&self) -> usize {
        self.registered.len()
    }

    /// Queues work for a registered instance, replacing work it queued earlier in the same
    /// batch. Unregistered callers get their handle back.
    pub fn schedule(&mut self, id: InstanceId, handle: JobHandle) -> Option<JobHandle> {
        if !self.registered.contains(&id) {
            return Some(handle);
        }
        self.pending.combine(id, handle);
        None
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Resolves all pending work. Must run before the next tick schedules again.
    pub fn complete_batch(&mut self) -> usize {
        let batch = std::mem::take(&mut self.pending);
        self.completed_last_tick = batch.complete();
        self.completed_last_tick
    }

    pub fn completed_last_tick(&self) -> usize {
        self.completed_last_tick
    }

    /// Completes outstanding work and forgets every instance.
    pub fn shutdown(&mut self) {
        self.complete_batch();
        self.registered.clear();
    }
}
