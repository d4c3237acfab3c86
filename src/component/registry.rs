use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use itertools::Itertools;

use super::{AnyTable, ComponentType, Descriptor, NewWorldContext, Table};
use crate::Result;

/// Identifies a registered component type.
///
/// Indices are assigned in registration order.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TypeIndex(pub(crate) usize);

impl fmt::Debug for TypeIndex {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result { write!(f, "type{}", self.0) }
}

/// Object-safe constructor of the instance table of a component type.
pub(crate) trait AnyType: Send + Sync {
    fn new_table(
        &self,
        index: TypeIndex,
        name: &str,
        ctx: &NewWorldContext<'_>,
    ) -> Result<Box<dyn AnyTable>>;
}

impl<C: ComponentType> AnyType for Arc<C> {
    fn new_table(
        &self,
        index: TypeIndex,
        name: &str,
        ctx: &NewWorldContext<'_>,
    ) -> Result<Box<dyn AnyTable>> {
        let table = Table::new(Arc::clone(self), index, name, ctx)?;
        Ok(Box::new(table))
    }
}

pub(crate) struct TypeEntry {
    pub(crate) descriptor: Descriptor,
    pub(crate) capacity:   usize,
    pub(crate) ty:         Box<dyn AnyType>,
}

/// The immutable table of registered component types.
#[derive(Default)]
pub(crate) struct Types {
    entries:    IndexMap<String, TypeEntry>,
    by_type_id: HashMap<TypeId, TypeIndex>,
    /// Type indices sorted by `(update_priority, registration order)`.
    schedule:   Vec<TypeIndex>,
}

impl Types {
    /// Registers a component type.
    ///
    /// # Panics
    /// Panics if the type or its name is already registered.
    pub(crate) fn register<C: ComponentType>(
        &mut self,
        descriptor: Descriptor,
        ty: C,
        capacity: usize,
    ) -> TypeIndex {
        let index = TypeIndex(self.entries.len());

        if let Some(&previous) = self.by_type_id.get(&TypeId::of::<C>()) {
            panic!(
                "Component type {} is already registered as {:?}",
                std::any::type_name::<C>(),
                self.entries.get_index(previous.0).map(|(name, _)| name),
            );
        }
        if self.entries.contains_key(&descriptor.name) {
            panic!("Component type name {:?} is registered twice", descriptor.name);
        }

        log::debug!(
            "Registered component type {} (priority {}, reload {})",
            descriptor.name,
            descriptor.update_priority,
            descriptor.supports_reload
        );
        self.by_type_id.insert(TypeId::of::<C>(), index);
        self.entries.insert(
            descriptor.name.clone(),
            TypeEntry { descriptor, capacity, ty: Box::new(Arc::new(ty)) },
        );

        self.schedule = self
            .entries
            .values()
            .enumerate()
            .sorted_by_key(|&(order, entry)| (entry.descriptor.update_priority, order))
            .map(|(order, _)| TypeIndex(order))
            .collect();

        index
    }

    pub(crate) fn len(&self) -> usize { self.entries.len() }

    pub(crate) fn get(&self, index: TypeIndex) -> &TypeEntry {
        self.entries.get_index(index.0).expect("type index out of bounds").1
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (TypeIndex, &TypeEntry)> {
        self.entries.values().enumerate().map(|(order, entry)| (TypeIndex(order), entry))
    }

    pub(crate) fn index_of<C: ComponentType>(&self) -> Option<TypeIndex> {
        self.by_type_id.get(&TypeId::of::<C>()).copied()
    }

    pub(crate) fn index_by_name(&self, name: &str) -> Option<TypeIndex> {
        self.entries.get_index_of(name).map(TypeIndex)
    }

    /// The order in which types are updated and rendered.
    pub(crate) fn schedule(&self) -> &[TypeIndex] { &self.schedule }
}
