use crate::ecs::{ComponentId, EntityId};
use std::collections::VecDeque;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum StageEvent {
    EntityDestroyed { entity: EntityId, name: String },
    ComponentDestroyed { entity: EntityId, component: ComponentId, type_name: &'static str },
    ParentChanged { entity: EntityId, parent: Option<EntityId> },
    ClipFinished { entity: EntityId, clip: String },
    ClipMissing { entity: EntityId, clip: String },
}

impl fmt::Display for StageEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageEvent::EntityDestroyed { entity, name } => {
                write!(f, "EntityDestroyed entity={} name={name}", entity.raw().index())
            }
            StageEvent::ComponentDestroyed { entity, component, type_name } => write!(
                f,
                "ComponentDestroyed entity={} component={} type={type_name}",
                entity.raw().index(),
                component.raw().index()
            ),
            StageEvent::ParentChanged { entity, parent } => match parent {
                Some(parent) => {
                    write!(f, "ParentChanged entity={} parent={}", entity.raw().index(), parent.raw().index())
                }
                None => write!(f, "ParentChanged entity={} parent=root", entity.raw().index()),
            },
            StageEvent::ClipFinished { entity, clip } => {
                write!(f, "ClipFinished entity={} clip={clip}", entity.raw().index())
            }
            StageEvent::ClipMissing { entity, clip } => {
                write!(f, "ClipMissing entity={} clip={clip}", entity.raw().index())
            }
        }
    }
}

/// Events kept before the oldest are dropped, for hosts that never drain.
pub const DEFAULT_EVENT_CAPACITY: usize = 4096;

pub struct EventBus {
    events: VecDeque<StageEvent>,
    capacity: usize,
    dropped: u64,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_EVENT_CAPACITY)
    }
}

impl EventBus {
    pub fn with_capacity(capacity: usize) -> Self {
        Self { events: VecDeque::new(), capacity: capacity.max(1), dropped: 0 }
    }

    pub fn push(&mut self, event: StageEvent) {
        if self.events.len() >= self.capacity {
            self.events.pop_front();
            if self.dropped == 0 {
                log::warn!("event bus full ({} events); dropping the oldest until drained", self.capacity);
            }
            self.dropped += 1;
        }
        self.events.push_back(event);
    }

    pub fn drain(&mut self) -> Vec<StageEvent> {
        self.dropped = 0;
        self.events.drain(..).collect()
    }

    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity.max(1);
        while self.events.len() > self.capacity {
            self.events.pop_front();
            self.dropped += 1;
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Events lost to the cap since the last drain.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
