use crate::frames::{BoneFrameData, CombinedFrameData, FrameAsset};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Unpadded start frame and length of one animation inside the bone frame table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AnimTiming {
    pub frame_offset: usize,
    pub frame_count: usize,
}

/// Immutable bone tables shared by every instance playing the same asset.
#[derive(Clone, Debug)]
pub struct BoneFrameBuffers {
    frames: Arc<[BoneFrameData]>,
    timings: Arc<[AnimTiming]>,
    bone_count: usize,
}

impl BoneFrameBuffers {
    pub fn from_frame_data(data: &CombinedFrameData) -> Self {
        let mut frame_offset = 0;
        let timings: Vec<AnimTiming> = data
            .timings
            .iter()
            .map(|timing| {
                let entry = AnimTiming { frame_offset, frame_count: timing.frame_count as usize };
                frame_offset += entry.frame_count;
                entry
            })
            .collect();
        Self { frames: Arc::from(data.bone_frames.as_slice()), timings: Arc::from(timings), bone_count: data.bone_count }
    }

    pub fn bone_count(&self) -> usize {
        self.bone_count
    }

    pub fn animation_count(&self) -> usize {
        self.timings.len()
    }

    pub fn timing(&self, anim_index: usize) -> Option<AnimTiming> {
        self.timings.get(anim_index).copied()
    }

    pub fn frame_len(&self) -> usize {
        self.frames.len()
    }

    /// `None` when any part of the index falls outside the tables.
    pub fn lookup(&self, anim_index: usize, frame: usize, bone_slot: usize) -> Option<BoneFrameData> {
        if bone_slot >= self.bone_count {
            return None;
        }
        let timing = self.timings.get(anim_index)?;
        let index = (timing.frame_offset + frame) * self.bone_count + bone_slot;
        self.frames.get(index).copied()
    }

    pub fn shares_storage(&self, other: &BoneFrameBuffers) -> bool {
        Arc::ptr_eq(&self.frames, &other.frames)
    }
}

struct CacheEntry {
    buffers: BoneFrameBuffers,
    ref_count: usize,
}

/// Reference-counted [`BoneFrameBuffers`] keyed by asset identity.
///
/// Only the main tick mutates the cache; jobs hold cheap clones of the buffers.
#[derive(Default)]
pub struct SharedFrameDataCache {
    entries: HashMap<Uuid, CacheEntry>,
}

impl SharedFrameDataCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `None` for assets without bone data; nothing is retained in that case.
    pub fn acquire(&mut self, asset: &FrameAsset) -> Option<BoneFrameBuffers> {
        let data = asset.data();
        if !data.has_bone_data() {
            return None;
        }
        if let Some(entry) = self.entries.get_mut(&asset.id()) {
            entry.ref_count += 1;
            return Some(entry.buffers.clone());
        }
        let buffers = BoneFrameBuffers::from_frame_data(data);
        log::debug!(
            "[vat::cache] built bone buffers for {} ({} frames x {} bones)",
            asset.id(),
            buffers.frame_len() / buffers.bone_count().max(1),
            buffers.bone_count()
        );
        self.entries.insert(asset.id(), CacheEntry { buffers: buffers.clone(), ref_count: 1 });
        Some(buffers)
    }

    /// Drops one reference. Returns `false` for unknown ids.
    pub fn release(&mut self, id: Uuid) -> bool {
        let Some(entry) = self.entries.get_mut(&id) else {
            return false;
        };
        entry.ref_count = entry.ref_count.saturating_sub(1);
        if entry.ref_count == 0 {
            self.entries.remove(&id);
            log::debug!("[vat::cache] released bone buffers for {id}");
        }
        true
    }

    /// Drops the reference backing `held`. Buffers from an invalidated entry release
    /// nothing, so a rebuilt entry only counts the holders that acquired it.
    pub fn release_buffers(&mut self, id: Uuid, held: &BoneFrameBuffers) -> bool {
        match self.entries.get(&id) {
            Some(entry) if entry.buffers.shares_storage(held) => self.release(id),
            _ => false,
        }
    }

    pub fn ref_count(&self, id: Uuid) -> usize {
        self.entries.get(&id).map_or(0, |entry| entry.ref_count)
    }

    pub fn contains(&self, id: Uuid) -> bool {
        self.entries.contains_key(&id)
    }

    /// Forgets an entry regardless of its reference count, e.g. after the asset was re-baked.
    pub fn invalidate(&mut self, id: Uuid) -> bool {
        self.entries.remove(&id).is_some()
    }

    /// Drops every entry and returns how many were still alive.
    pub fn shutdown(&mut self) -> usize {
        let remaining = self.entries.len();
        if remaining > 0 {
            log::info!("[vat::cache] shutdown dropped {remaining} live entries");
        }
        self.entries.clear();
        remaining
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
