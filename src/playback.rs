use crate::bone_jobs::BoneJobParams;
use crate::config::RuntimeConfig;
use crate::frames::{CombinedFrameData, FrameTiming};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;

/// One-shot clips freeze this far before their end so the last frame stays selected.
pub const FINISH_EPSILON: f32 = 0.001;
pub const MIN_BLEND_DURATION: f32 = 0.001;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlaybackPhase {
    Idle,
    Playing,
    Blending,
    Finished,
}

/// Blend source values for the shader while a transition runs.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BlendParams {
    pub frames: u32,
    pub offset: u32,
    pub duration: f32,
    pub weight: f32,
}

/// Values a VAT shader reads each frame.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct VatMaterialParams {
    pub timer: f32,
    pub frames: u32,
    pub offset: u32,
    pub duration: f32,
    pub blend: Option<BlendParams>,
}

impl VatMaterialParams {
    fn for_timing(timing: &FrameTiming) -> Self {
        Self { timer: 0.0, frames: timing.frame_count, offset: timing.offset, duration: timing.duration, blend: None }
    }

    /// Weight of the current clip; 1 when no transition is running.
    pub fn blend_weight(&self) -> f32 {
        self.blend.map_or(1.0, |blend| blend.weight)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct PlaybackState {
    pub current_index: Option<usize>,
    pub timer: f32,
    pub duration: f32,
    pub frame_count: u32,
    pub is_looping: bool,
    pub has_finished: bool,
    pub blend_from_index: Option<usize>,
    pub blend_timer: f32,
    pub blend_duration: f32,
    pub blend_elapsed: f32,
    pub is_blending: bool,
}

impl Default for PlaybackState {
    fn default() -> Self {
        Self {
            current_index: None,
            timer: 0.0,
            duration: 1.0,
            frame_count: 1,
            is_looping: true,
            has_finished: false,
            blend_from_index: None,
            blend_timer: 0.0,
            blend_duration: 0.0,
            blend_elapsed: 0.0,
            is_blending: false,
        }
    }
}

impl PlaybackState {
    pub fn phase(&self) -> PlaybackPhase {
        match self.current_index {
            None => PlaybackPhase::Idle,
            Some(_) if self.is_blending => PlaybackPhase::Blending,
            Some(_) if self.has_finished => PlaybackPhase::Finished,
            Some(_) => PlaybackPhase::Playing,
        }
    }

    pub fn current_frame(&self) -> usize {
        frame_at(self.timer, self.duration, self.frame_count)
    }

    pub fn normalized_time(&self) -> f32 {
        if self.duration > 0.0 {
            self.timer / self.duration
        } else {
            0.0
        }
    }

    pub fn blend_weight(&self) -> f32 {
        if !self.is_blending {
            return 1.0;
        }
        (self.blend_elapsed / self.blend_duration.max(MIN_BLEND_DURATION)).clamp(0.0, 1.0)
    }

    fn clear_blend(&mut self) {
        self.is_blending = false;
        self.blend_from_index = None;
        self.blend_timer = 0.0;
        self.blend_elapsed = 0.0;
        self.blend_duration = 0.0;
    }
}

/// `floor(timer / duration * frame_count) mod frame_count`, never past the last frame.
pub fn frame_at(timer: f32, duration: f32, frame_count: u32) -> usize {
    if frame_count == 0 || duration <= 0.0 {
        return 0;
    }
    let frame = ((timer / duration) * frame_count as f32).floor();
    if !frame.is_finite() || frame < 0.0 {
        return 0;
    }
    (frame as usize) % frame_count as usize
}

/// What happened during one [`VatPlayer::tick`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TickOutcome {
    /// Index of a one-shot clip that reached its end this tick.
    pub finished: Option<usize>,
    /// Target index of a transition that completed this tick.
    pub transition_completed: Option<usize>,
}

/// Per-instance playback over one shared [`CombinedFrameData`].
pub struct VatPlayer {
    data: Arc<CombinedFrameData>,
    state: PlaybackState,
    material: VatMaterialParams,
    rng: StdRng,
    random_start_offset: bool,
    finish: bool,
}

impl VatPlayer {
    pub fn new(data: Arc<CombinedFrameData>, config: &RuntimeConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            data,
            state: PlaybackState::default(),
            material: VatMaterialParams::default(),
            rng,
            random_start_offset: config.random_start_offset,
            finish: false,
        }
    }

    pub fn data(&self) -> &Arc<CombinedFrameData> {
        &self.data
    }

    pub fn state(&self) -> &PlaybackState {
        &self.state
    }

    pub fn material_params(&self) -> &VatMaterialParams {
        &self.material
    }

    /// Starts `index` from the beginning, or from a random point when the offset is enabled.
    /// `random_offset` overrides the configured default. Out-of-range indices are ignored.
    pub fn play(&mut self, index: usize, looping: bool, random_offset: Option<bool>) -> bool {
        let Some(timing) = self.data.timing(index) else {
            log::warn!("[vat::playback] animation index {index} out of range ({} clips)", self.data.animation_count());
            return false;
        };
        let duration = timing.duration;
        let frame_count = timing.frame_count;
        self.material = VatMaterialParams::for_timing(timing);

        let timer = if random_offset.unwrap_or(self.random_start_offset) && duration > 0.0 {
            self.rng.gen_range(0.0..duration)
        } else {
            0.0
        };
        let state = &mut self.state;
        state.current_index = Some(index);
        state.timer = timer;
        state.duration = duration;
        state.frame_count = frame_count;
        state.is_looping = looping;
        state.has_finished = false;
        state.clear_blend();
        self.finish = false;
        self.material.timer = timer;
        true
    }

    pub fn play_by_name(&mut self, name: &str, looping: bool, random_offset: Option<bool>) -> bool {
        match self.data.index_of(name) {
            Some(index) => self.play(index, looping, random_offset),
            None => {
                if !name.is_empty() {
                    log::warn!("[vat::playback] animation '{name}' not found");
                }
                false
            }
        }
    }

    /// Switches to `target` immediately and blends bone poses and the shader weight from the
    /// current clip over `blend_duration` seconds. Transitions to the playing clip are ignored.
    pub fn play_transition(&mut self, target: usize, blend_duration: f32) -> bool {
        if Some(target) == self.state.current_index {
            return false;
        }
        let Some(timing) = self.data.timing(target) else {
            return false;
        };
        let Some(source) = self.state.current_index else {
            return self.play(target, self.state.is_looping, Some(false));
        };
        let source_timing = self.data.timing(source).cloned();

        let state = &mut self.state;
        state.blend_from_index = Some(source);
        state.blend_timer = state.timer;
        state.blend_duration = blend_duration.max(MIN_BLEND_DURATION);
        state.blend_elapsed = 0.0;
        state.is_blending = true;

        state.current_index = Some(target);
        state.timer = 0.0;
        state.duration = timing.duration;
        state.frame_count = timing.frame_count;
        state.has_finished = false;
        self.finish = false;

        self.material = VatMaterialParams::for_timing(timing);
        self.material.blend = source_timing.map(|from| BlendParams {
            frames: from.frame_count,
            offset: from.offset,
            duration: from.duration,
            weight: 0.0,
        });
        true
    }

    pub fn play_transition_by_name(&mut self, name: &str, blend_duration: f32) -> bool {
        match self.data.index_of(name) {
            Some(index) => self.play_transition(index, blend_duration),
            None => {
                if !name.is_empty() {
                    log::warn!("[vat::playback] animation '{name}' not found for transition");
                }
                false
            }
        }
    }

    /// While set, the timer is frozen but bone parameters are still produced.
    pub fn set_finish(&mut self, finish: bool) {
        self.finish = finish;
    }

    pub fn is_finish(&self) -> bool {
        self.finish
    }

    pub fn tick(&mut self, dt: f32) -> TickOutcome {
        let mut outcome = TickOutcome::default();
        let Some(index) = self.state.current_index else {
            return outcome;
        };
        if self.finish {
            return outcome;
        }
        let dt = dt.max(0.0);
        let state = &mut self.state;

        state.timer += dt;
        if state.timer >= state.duration {
            if state.is_looping {
                state.timer = if state.duration > 0.0 { state.timer % state.duration } else { 0.0 };
            } else {
                state.timer = (state.duration - FINISH_EPSILON).max(0.0);
                if !state.has_finished {
                    state.has_finished = true;
                    outcome.finished = Some(index);
                }
            }
        }
        self.material.timer = state.timer;

        if state.is_blending {
            state.blend_timer += dt;
            state.blend_elapsed += dt;
            let weight = state.blend_weight();
            if let Some(blend) = self.material.blend.as_mut() {
                blend.weight = weight;
            }
            if state.blend_elapsed >= state.blend_duration {
                state.clear_blend();
                self.material.blend = None;
                outcome.transition_completed = Some(index);
            }
        }
        outcome
    }

    /// Bone lookup inputs for the current state, `None` while idle.
    pub fn job_params(&self) -> Option<BoneJobParams> {
        let index = self.state.current_index?;
        self.data.timing(index)?;
        let params = BoneJobParams::new(index, self.state.current_frame());
        if !self.state.is_blending {
            return Some(params);
        }
        let Some(source) = self.state.blend_from_index else {
            return Some(params);
        };
        let Some(from) = self.data.timing(source) else {
            return Some(params);
        };
        let source_frame = frame_at(self.state.blend_timer, from.duration, from.frame_count);
        Some(params.blending_from(source, source_frame, self.state.blend_weight()))
    }

    pub fn current_frame(&self) -> usize {
        self.state.current_frame()
    }

    pub fn max_frame(&self) -> u32 {
        self.state.frame_count
    }

    pub fn current_animation(&self) -> Option<usize> {
        self.state.current_index
    }

    pub fn current_duration(&self) -> f32 {
        self.state.duration
    }

    pub fn normalized_time(&self) -> f32 {
        self.state.normalized_time()
    }

    pub fn is_looping(&self) -> bool {
        self.state.is_looping
    }

    pub fn has_finished(&self) -> bool {
        self.state.has_finished
    }

    pub fn is_blending(&self) -> bool {
        self.state.is_blending
    }

    pub fn blend_weight(&self) -> f32 {
        self.state.blend_weight()
    }

    pub fn phase(&self) -> PlaybackPhase {
        self.state.phase()
    }
}
