use super::behaviour::Behaviour;
use super::error::StageError;
use std::collections::BTreeMap;

type Constructor = Box<dyn Fn() -> Result<Box<dyn Behaviour>, String> + Send + Sync>;

struct FactoryEntry {
    construct: Constructor,
    run_in_edit_mode: bool,
}

/// Type-name directory used to build components out of scene data.
#[derive(Default)]
pub struct ComponentFactory {
    entries: BTreeMap<String, FactoryEntry>,
}

impl ComponentFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Factory preloaded with the engine's own serializable components.
    pub fn with_builtins() -> Self {
        let mut factory = Self::new();
        factory.register::<crate::sprite::Sprite>("Sprite");
        factory.register_edit_mode::<crate::skeleton::Skeleton>("Skeleton");
        factory.register::<crate::animation::Animator>("Animator");
        factory
    }

    pub fn register<T: Behaviour + Default>(&mut self, name: &str) {
        self.insert(name, false, Box::new(default_constructor::<T>));
    }

    pub fn register_edit_mode<T: Behaviour + Default>(&mut self, name: &str) {
        self.insert(name, true, Box::new(default_constructor::<T>));
    }

    /// Registers a fallible constructor. An `Err` surfaces as
    /// [`StageError::ConstructionFailed`].
    pub fn register_with<F>(&mut self, name: &str, run_in_edit_mode: bool, construct: F)
    where
        F: Fn() -> Result<Box<dyn Behaviour>, String> + Send + Sync + 'static,
    {
        self.insert(name, run_in_edit_mode, Box::new(construct));
    }

    fn insert(&mut self, name: &str, run_in_edit_mode: bool, construct: Constructor) {
        if self.entries.insert(name.to_string(), FactoryEntry { construct, run_in_edit_mode }).is_some() {
            log::warn!("component type '{name}' registered twice; keeping the latest constructor");
        }
    }

    pub fn unregister(&mut self, name: &str) -> bool {
        self.entries.remove(name).is_some()
    }

    pub fn construct(&self, name: &str) -> Result<Box<dyn Behaviour>, StageError> {
        let entry = self.entries.get(name).ok_or_else(|| StageError::UnknownComponentType(name.to_string()))?;
        (entry.construct)()
            .map_err(|reason| StageError::ConstructionFailed { type_name: name.to_string(), reason })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn runs_in_edit_mode(&self, name: &str) -> bool {
        self.entries.get(name).map(|entry| entry.run_in_edit_mode).unwrap_or(false)
    }

    pub fn type_names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(|name| name.as_str())
    }
}

fn default_constructor<T: Behaviour + Default>() -> Result<Box<dyn Behaviour>, String> {
    Ok(Box::new(T::default()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_construct_by_name() {
        let factory = ComponentFactory::with_builtins();
        let sprite = factory.construct("Sprite").expect("sprite");
        assert_eq!(sprite.type_name(), "Sprite");
        assert!(factory.runs_in_edit_mode("Skeleton"));
        assert!(!factory.runs_in_edit_mode("Animator"));
        assert_eq!(factory.type_names().collect::<Vec<_>>(), vec!["Animator", "Skeleton", "Sprite"]);
    }

    #[test]
    fn unknown_and_failing_types_are_distinguished() {
        let mut factory = ComponentFactory::new();
        factory.register_with("Broken", false, || Err("no default state".to_string()));
        match factory.construct("Missing") {
            Err(StageError::UnknownComponentType(name)) => assert_eq!(name, "Missing"),
            other => panic!("expected unknown type, got {:?}", other.map(|b| b.type_name())),
        }
        let err = factory.construct("Broken").err().expect("construction should fail");
        assert!(err.is_fatal());
        assert!(err.to_string().contains("Broken"));
    }
}
