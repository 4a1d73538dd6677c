//! Schema registry - descriptors by type name plus the reverse-link index

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use super::{LinkField, ObjectDescriptor};
use crate::entity::Entity;
use crate::{Error, Result};

/// A link in some other type that points at a registered type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependent {
    /// Type owning the link column
    pub type_name: String,
    pub link: LinkField,
}

/// Registered object descriptors.
///
/// Each descriptor is validated once on registration and then only read.
/// The reverse-link index (`target type -> links pointing at it`) is kept
/// current on every registration so cascades never scan all types.
#[derive(Debug, Default)]
pub struct SchemaRegistry {
    descriptors: HashMap<String, Arc<ObjectDescriptor>>,
    /// Type names in registration order
    order: Vec<String>,
    dependents: HashMap<String, Vec<Dependent>>,
    /// Registered but not yet materialized as tables
    pending: Vec<Arc<ObjectDescriptor>>,
    /// Rust types whose linked types have been registered
    linked: HashSet<&'static str>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the descriptor of `T` and of every type it links to.
    ///
    /// A descriptor registered earlier without its type (from config, say)
    /// is kept, but its linked types are still registered.
    pub fn register<T: Entity>(&mut self) -> Result<Arc<ObjectDescriptor>> {
        let desc = match self.descriptors.get(T::TYPE_NAME) {
            Some(desc) => Arc::clone(desc),
            None => {
                let desc = T::descriptor();
                if desc.type_name != T::TYPE_NAME {
                    return Err(Error::schema(
                        T::TYPE_NAME,
                        format!("descriptor declares type name '{}'", desc.type_name),
                    ));
                }
                self.register_descriptor(desc)?
            }
        };
        // Inserted before recursing so cyclic links terminate
        if self.linked.insert(T::TYPE_NAME) {
            if let Err(e) = T::describe_links(self) {
                self.linked.remove(T::TYPE_NAME);
                return Err(e);
            }
        }
        Ok(desc)
    }

    /// True once `register::<T>()` has completed for this type name
    pub fn is_fully_registered(&self, type_name: &str) -> bool {
        self.linked.contains(type_name)
    }

    /// Register a descriptor supplied without a Rust type.
    ///
    /// Registering an identical descriptor twice is a no-op; a different
    /// descriptor under an existing type name is rejected.
    pub fn register_descriptor(&mut self, desc: ObjectDescriptor) -> Result<Arc<ObjectDescriptor>> {
        desc.validate()?;

        if let Some(existing) = self.descriptors.get(&desc.type_name) {
            if **existing == desc {
                return Ok(Arc::clone(existing));
            }
            return Err(Error::schema(&desc.type_name, "conflicting descriptor already registered"));
        }
        if let Some(other) = self
            .descriptors
            .values()
            .find(|d| d.table_name.eq_ignore_ascii_case(&desc.table_name))
        {
            return Err(Error::schema(
                &desc.type_name,
                format!("table '{}' already used by {}", desc.table_name, other.type_name),
            ));
        }

        for link in &desc.links {
            self.dependents
                .entry(link.target_type.clone())
                .or_default()
                .push(Dependent {
                    type_name: desc.type_name.clone(),
                    link: link.clone(),
                });
        }

        tracing::debug!("Registered {} -> table {}", desc.type_name, desc.table_name);
        let desc = Arc::new(desc);
        self.order.push(desc.type_name.clone());
        self.descriptors.insert(desc.type_name.clone(), Arc::clone(&desc));
        self.pending.push(Arc::clone(&desc));
        Ok(desc)
    }

    /// Registered descriptor for a type name
    pub fn describe(&self, type_name: &str) -> Result<Arc<ObjectDescriptor>> {
        self.descriptors
            .get(type_name)
            .cloned()
            .ok_or_else(|| Error::UnknownType(type_name.to_string()))
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.descriptors.contains_key(type_name)
    }

    /// Fail if any registered link targets a type that is not registered
    pub fn check_link_targets(&self) -> Result<()> {
        for desc in self.descriptors() {
            if let Some(link) = desc.links.iter().find(|l| !self.contains(&l.target_type)) {
                return Err(Error::schema(
                    &desc.type_name,
                    format!("link '{}' targets unregistered type {}", link.column, link.target_type),
                ));
            }
        }
        Ok(())
    }

    /// Links in other types that target `type_name`
    pub fn dependents_of(&self, type_name: &str) -> &[Dependent] {
        self.dependents
            .get(type_name)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// All descriptors in registration order
    pub fn descriptors(&self) -> impl Iterator<Item = &Arc<ObjectDescriptor>> {
        self.order.iter().filter_map(|name| self.descriptors.get(name))
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// Drain descriptors whose tables still need to be created
    pub(crate) fn take_pending(&mut self) -> Vec<Arc<ObjectDescriptor>> {
        std::mem::take(&mut self.pending)
    }

    /// Queue every descriptor again, after a rollback may have undone DDL
    pub(crate) fn requeue_all(&mut self) {
        let all: Vec<_> = self.descriptors().cloned().collect();
        self.pending = all;
    }
}
