use crate::bone_jobs::InstanceId;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackEvent {
    Finished { instance: InstanceId, animation: usize },
    TransitionStarted { instance: InstanceId, from: Option<usize>, to: usize, duration: f32 },
    TransitionCompleted { instance: InstanceId, animation: usize },
}

impl PlaybackEvent {
    pub fn instance(&self) -> InstanceId {
        match self {
            PlaybackEvent::Finished { instance, .. }
            | PlaybackEvent::TransitionStarted { instance, .. }
            | PlaybackEvent::TransitionCompleted { instance, .. } => *instance,
        }
    }
}

impl fmt::Display for PlaybackEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlaybackEvent::Finished { instance, animation } => {
                write!(f, "Finished instance={} animation={}", instance.0, animation)
            }
            PlaybackEvent::TransitionStarted { instance, from, to, duration } => match from {
                Some(from) => {
                    write!(f, "TransitionStarted instance={} from={} to={} duration={:.3}", instance.0, from, to, duration)
                }
                None => write!(f, "TransitionStarted instance={} to={} duration={:.3}", instance.0, to, duration),
            },
            PlaybackEvent::TransitionCompleted { instance, animation } => {
                write!(f, "TransitionCompleted instance={} animation={}", instance.0, animation)
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct EventBus {
    events: Vec<PlaybackEvent>,
}

impl EventBus {
    pub fn push(&mut self, event: PlaybackEvent) {
        self.events.push(event);
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn drain(&mut self) -> Vec<PlaybackEvent> {
        self.events.drain(..).collect()
    }
}
