//! Per-build store of named, reusable schema definitions.
//!
//! Names map to slots in insertion order. A slot is reserved before the
//! children of a definition are synthesized and filled afterwards, so a
//! definition that is still being built is already known by name.

use crate::error::{Error, Result};
use crate::schema_generator::Schema;
use indexmap::IndexMap;
use log::debug;

/// Index of a reserved definition slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotId(usize);

/// Canonical placeholder definitions shared by every use site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Canonical {
    /// Array of strings
    Array,
    /// Free-form object
    Object,
}

impl Canonical {
    pub fn name(&self) -> &'static str {
        match self {
            Canonical::Array => "ModelArray",
            Canonical::Object => "ModelObject",
        }
    }

    fn schema(&self) -> Schema {
        match self {
            Canonical::Array => Schema::array(Schema::string()),
            Canonical::Object => Schema::object(),
        }
    }
}

/// Definition registry scoped to a single document build.
#[derive(Debug, Default)]
pub struct DefinitionRegistry {
    slots: IndexMap<String, Option<Schema>>,
}

impl DefinitionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve a slot for `name`, reusing the existing one if present.
    pub fn reserve(&mut self, name: &str) -> SlotId {
        let entry = self.slots.entry(name.to_string());
        let index = entry.index();
        entry.or_insert(None);
        SlotId(index)
    }

    /// Fill a reserved slot.
    ///
    /// Filling an already filled slot with an equal schema is a no-op; with a
    /// different schema it is a [`Error::DefinitionConflict`].
    pub fn fill(&mut self, slot: SlotId, schema: Schema) -> Result<()> {
        let (name, current) = self
            .slots
            .get_index_mut(slot.0)
            .ok_or_else(|| Error::InvalidConfig(format!("unknown definition slot {}", slot.0)))?;

        if let Some(existing) = current.as_ref() {
            if *existing == schema {
                debug!("Definition {} already registered, reusing", name);
                return Ok(());
            }
            return Err(Error::DefinitionConflict { name: name.clone() });
        }

        debug!("Registered definition {}", name);
        *current = Some(schema);
        Ok(())
    }

    /// Reserve and fill in one step.
    pub fn register(&mut self, name: &str, schema: Schema) -> Result<()> {
        let slot = self.reserve(name);
        self.fill(slot, schema)
    }

    /// Register a canonical placeholder once and return its name.
    pub fn intern(&mut self, canonical: Canonical) -> &'static str {
        let name = canonical.name();
        if !self.is_filled(name) {
            let slot = self.reserve(name);
            if let Some((_, current)) = self.slots.get_index_mut(slot.0) {
                *current = Some(canonical.schema());
            }
        }
        name
    }

    /// Whether `name` is known, filled or merely reserved.
    pub fn contains(&self, name: &str) -> bool {
        self.slots.contains_key(name)
    }

    pub fn is_filled(&self, name: &str) -> bool {
        matches!(self.slots.get(name), Some(Some(_)))
    }

    pub fn get(&self, name: &str) -> Option<&Schema> {
        self.slots.get(name).and_then(Option::as_ref)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Snapshot of all definitions in registration order.
    ///
    /// # Errors
    ///
    /// A slot that was reserved but never filled is reported as a
    /// [`Error::DanglingDefinitionReference`].
    pub fn into_schemas(self) -> Result<IndexMap<String, Schema>> {
        let mut schemas = IndexMap::with_capacity(self.slots.len());
        for (name, schema) in self.slots {
            match schema {
                Some(schema) => {
                    schemas.insert(name, schema);
                }
                None => {
                    return Err(Error::DanglingDefinitionReference {
                        location: "components.schemas".to_string(),
                        name,
                    })
                }
            }
        }
        Ok(schemas)
    }
}
