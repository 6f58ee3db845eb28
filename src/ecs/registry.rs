use bevy_ecs::prelude::Entity;
use smallvec::SmallVec;
use std::any::TypeId;
use std::collections::{BTreeSet, HashMap};

/// Growable bitset of component type indices.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TypeMask {
    words: SmallVec<[u64; 2]>,
}

impl TypeMask {
    pub fn set(&mut self, bit: usize) {
        let word = bit / 64;
        if self.words.len() <= word {
            self.words.resize(word + 1, 0);
        }
        self.words[word] |= 1 << (bit % 64);
    }

    pub fn clear(&mut self, bit: usize) {
        if let Some(word) = self.words.get_mut(bit / 64) {
            *word &= !(1 << (bit % 64));
        }
    }

    pub fn contains(&self, bit: usize) -> bool {
        self.words.get(bit / 64).map(|word| word & (1 << (bit % 64)) != 0).unwrap_or(false)
    }

    pub fn contains_all(&self, other: &TypeMask) -> bool {
        other.words.iter().enumerate().all(|(i, want)| {
            let have = self.words.get(i).copied().unwrap_or(0);
            have & want == *want
        })
    }

    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|word| *word == 0)
    }
}

struct TypeSlot {
    name: &'static str,
    entities: BTreeSet<Entity>,
}

#[derive(Default)]
struct EntityEntry {
    mask: TypeMask,
    counts: SmallVec<[(usize, u32); 4]>,
}

/// Type -> entities index with a per-entity type mask.
#[derive(Default)]
pub struct ComponentRegistry {
    bits: HashMap<TypeId, usize>,
    slots: Vec<TypeSlot>,
    entries: HashMap<Entity, EntityEntry>,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn bit_for(&mut self, type_id: TypeId, name: &'static str) -> usize {
        if let Some(bit) = self.bits.get(&type_id) {
            return *bit;
        }
        let bit = self.slots.len();
        self.slots.push(TypeSlot { name, entities: BTreeSet::new() });
        self.bits.insert(type_id, bit);
        bit
    }

    pub fn register(&mut self, entity: Entity, type_id: TypeId, name: &'static str) {
        let bit = self.bit_for(type_id, name);
        let entry = self.entries.entry(entity).or_default();
        match entry.counts.iter_mut().find(|(b, _)| *b == bit) {
            Some((_, count)) => *count += 1,
            None => {
                entry.counts.push((bit, 1));
                entry.mask.set(bit);
                self.slots[bit].entities.insert(entity);
            }
        }
    }

    pub fn unregister(&mut self, entity: Entity, type_id: TypeId) {
        let Some(bit) = self.bits.get(&type_id).copied() else {
            return;
        };
        let Some(entry) = self.entries.get_mut(&entity) else {
            return;
        };
        let Some(pos) = entry.counts.iter().position(|(b, _)| *b == bit) else {
            return;
        };
        entry.counts[pos].1 -= 1;
        if entry.counts[pos].1 == 0 {
            entry.counts.swap_remove(pos);
            entry.mask.clear(bit);
            self.slots[bit].entities.remove(&entity);
        }
        if entry.counts.is_empty() {
            self.entries.remove(&entity);
        }
    }

    pub fn forget_entity(&mut self, entity: Entity) {
        if let Some(entry) = self.entries.remove(&entity) {
            for (bit, _) in entry.counts {
                self.slots[bit].entities.remove(&entity);
            }
        }
    }

    pub fn contains(&self, entity: Entity, type_id: TypeId) -> bool {
        match (self.bits.get(&type_id), self.entries.get(&entity)) {
            (Some(bit), Some(entry)) => entry.mask.contains(*bit),
            _ => false,
        }
    }

    pub fn mask(&self, entity: Entity) -> TypeMask {
        self.entries.get(&entity).map(|entry| entry.mask.clone()).unwrap_or_default()
    }

    pub fn type_name(&self, type_id: TypeId) -> Option<&'static str> {
        self.bits.get(&type_id).map(|bit| self.slots[*bit].name)
    }

    /// Entities owning at least one component of every requested type, in handle order.
    pub fn entities_with_components(&self, types: &[TypeId]) -> Vec<Entity> {
        if types.is_empty() {
            return Vec::new();
        }
        let mut wanted = TypeMask::default();
        let mut smallest: Option<&BTreeSet<Entity>> = None;
        for type_id in types {
            let Some(bit) = self.bits.get(type_id) else {
                return Vec::new();
            };
            wanted.set(*bit);
            let set = &self.slots[*bit].entities;
            if smallest.map(|s| set.len() < s.len()).unwrap_or(true) {
                smallest = Some(set);
            }
        }
        let Some(candidates) = smallest else {
            return Vec::new();
        };
        candidates
            .iter()
            .copied()
            .filter(|entity| {
                self.entries.get(entity).map(|entry| entry.mask.contains_all(&wanted)).unwrap_or(false)
            })
            .collect()
    }
}
