use crate::bone_jobs::AttachmentTransform;
use crate::config::RuntimeConfig;
use crate::events::PlaybackEvent;
use crate::frames::FrameAsset;
use crate::playback::VatMaterialParams;
use crate::runtime::{VatInstance, VatRuntime};
use bevy_ecs::prelude::*;
use bevy_ecs::schedule::IntoSystemConfigs;

// ---------- Components & resources ----------
#[derive(Component)]
pub struct VatAnimator {
    pub instance: VatInstance,
}

impl VatAnimator {
    pub fn material_params(&self) -> VatMaterialParams {
        *self.instance.player().material_params()
    }

    pub fn attachments(&self) -> Vec<AttachmentTransform> {
        self.instance.attachments().snapshot()
    }
}

#[derive(Resource, Clone, Copy, Default)]
pub struct TimeDelta(pub f32);

// ---------- Systems ----------
pub fn sys_drive_vat_animators(
    mut runtime: ResMut<VatRuntime>,
    dt: Res<TimeDelta>,
    mut animators: Query<&mut VatAnimator>,
) {
    let instances = animators.iter_mut().map(|animator| &mut animator.into_inner().instance);
    runtime.drive(instances, dt.0);
}

pub fn sys_complete_bone_jobs(mut runtime: ResMut<VatRuntime>) {
    runtime.complete();
}

// ---------- World container ----------
pub struct VatWorld {
    pub world: World,
    schedule: Schedule,
}

impl Default for VatWorld {
    fn default() -> Self {
        Self::new(RuntimeConfig::default())
    }
}

impl VatWorld {
    pub fn new(config: RuntimeConfig) -> Self {
        let mut world = World::new();
        world.insert_resource(TimeDelta(0.0));
        world.insert_resource(VatRuntime::init(config));

        let mut schedule = Schedule::default();
        schedule.add_systems((sys_drive_vat_animators, sys_complete_bone_jobs).chain());
        Self { world, schedule }
    }

    pub fn runtime(&self) -> &VatRuntime {
        self.world.resource::<VatRuntime>()
    }

    /// Spawns a started animator for `asset`.
    pub fn spawn_animator(&mut self, asset: FrameAsset, attachment_slots: usize) -> Entity {
        let instance = {
            let mut runtime = self.world.resource_mut::<VatRuntime>();
            let mut instance = runtime.create_instance(asset, attachment_slots);
            instance.start(&mut runtime);
            instance
        };
        self.world.spawn(VatAnimator { instance }).id()
    }

    /// Stops the animator, releasing its shared data, then despawns the entity.
    pub fn despawn_animator(&mut self, entity: Entity) -> bool {
        if self.world.get::<VatAnimator>(entity).is_none() {
            return false;
        }
        let Some(mut animator) = self.world.entity_mut(entity).take::<VatAnimator>() else {
            return false;
        };
        {
            let mut runtime = self.world.resource_mut::<VatRuntime>();
            animator.instance.stop(&mut runtime);
        }
        self.world.despawn(entity)
    }

    pub fn animator(&self, entity: Entity) -> Option<&VatAnimator> {
        self.world.get::<VatAnimator>(entity)
    }

    pub fn play_transition(&mut self, entity: Entity, target: usize, blend_duration: f32) -> bool {
        self.world.resource_scope(|world, mut runtime: Mut<VatRuntime>| {
            match world.get_mut::<VatAnimator>(entity) {
                Some(mut animator) => animator.instance.play_transition(&mut runtime, target, blend_duration),
                None => false,
            }
        })
    }

    pub fn play(&mut self, entity: Entity, index: usize, looping: bool) -> bool {
        match self.world.get_mut::<VatAnimator>(entity) {
            Some(mut animator) => animator.instance.play(index, looping),
            None => false,
        }
    }

    pub fn set_finish(&mut self, entity: Entity, finish: bool) {
        if let Some(mut animator) = self.world.get_mut::<VatAnimator>(entity) {
            animator.instance.player_mut().set_finish(finish);
        }
    }

    pub fn update(&mut self, dt: f32) {
        self.world.resource_mut::<TimeDelta>().0 = dt;
        self.schedule.run(&mut self.world);
    }

    pub fn drain_events(&mut self) -> Vec<PlaybackEvent> {
        self.world.resource_mut::<VatRuntime>().drain_events()
    }

    /// Stops every animator and shuts the runtime down.
    pub fn shutdown(&mut self) {
        self.world.resource_scope(|world, mut runtime: Mut<VatRuntime>| {
            let mut animators = world.query::<&mut VatAnimator>();
            for mut animator in animators.iter_mut(world) {
                animator.instance.stop(&mut runtime);
            }
            runtime.shutdown();
        });
    }
}
