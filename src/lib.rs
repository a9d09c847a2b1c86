pub mod bake;
pub mod bone_jobs;
pub mod config;
pub mod ecs;
pub mod events;
pub mod frame_cache;
pub mod frames;
pub mod playback;
pub mod profiler;
pub mod runtime;

pub use bake::{BakeOutput, BakeReport, BakeRig, Baker};
pub use config::{BakerSettings, BakingProfile, RuntimeConfig};
pub use frames::{BoneFrameData, CombinedFrameData, FrameAsset, FrameTiming};
pub use playback::VatPlayer;
pub use runtime::{VatInstance, VatRuntime};
