//! Read-only graph schema consulted during compilation.
//!
//! The compiler only reads this model: property lookup by name, the
//! declared property list, storage names and primary keys. Constraint
//! checking belongs to whoever builds the model.

use crate::types::ValueType;
use std::collections::HashMap;

/// A property declared on an entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Property {
    pub name: String,
    /// Name stored in the graph; defaults to `name`
    pub storage_name: Option<String>,
    pub value_type: ValueType,
    /// Explicit store type (`date`, `datetime`, ...) overriding the default mapping
    pub store_type: Option<String>,
}

impl Property {
    pub fn new(name: impl Into<String>, value_type: ValueType) -> Self {
        Self {
            name: name.into(),
            storage_name: None,
            value_type,
            store_type: None,
        }
    }

    pub fn with_storage_name(mut self, storage_name: impl Into<String>) -> Self {
        self.storage_name = Some(storage_name.into());
        self
    }

    pub fn with_store_type(mut self, store_type: impl Into<String>) -> Self {
        self.store_type = Some(store_type.into());
        self
    }

    pub fn storage_name(&self) -> &str {
        self.storage_name.as_deref().unwrap_or(&self.name)
    }
}

/// Handle to a property of a specific entity.
///
/// Cheap to clone and compared structurally, so two storage expressions
/// over the same property of the same node are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PropertyRef {
    pub entity: String,
    pub property: Property,
}

impl PropertyRef {
    pub fn name(&self) -> &str {
        &self.property.name
    }

    pub fn storage_name(&self) -> &str {
        self.property.storage_name()
    }

    pub fn value_type(&self) -> &ValueType {
        &self.property.value_type
    }
}

/// A mapped node type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entity {
    pub name: String,
    pub labels: Vec<String>,
    properties: Vec<Property>,
    primary_key: Vec<String>,
}

impl Entity {
    pub fn find_property(&self, name: &str) -> Option<&Property> {
        self.properties.iter().find(|p| p.name == name)
    }

    /// Properties in declaration order
    pub fn properties(&self) -> &[Property] {
        &self.properties
    }

    /// Primary key properties, in key order
    pub fn primary_key(&self) -> Vec<&Property> {
        self.primary_key
            .iter()
            .filter_map(|name| self.find_property(name))
            .collect()
    }

    pub fn property_ref(&self, name: &str) -> Option<PropertyRef> {
        self.find_property(name).map(|property| PropertyRef {
            entity: self.name.clone(),
            property: property.clone(),
        })
    }

    pub fn value_type(&self) -> ValueType {
        ValueType::Entity(self.name.clone())
    }
}

/// The schema: entities by name.
#[derive(Debug, Clone, Default)]
pub struct Model {
    entities: HashMap<String, Entity>,
}

impl Model {
    pub fn builder() -> ModelBuilder {
        ModelBuilder::default()
    }

    pub fn find_entity(&self, name: &str) -> Option<&Entity> {
        self.entities.get(name)
    }

    /// Entity backing a semantic type, if it is an entity type
    pub fn entity_for_type(&self, value_type: &ValueType) -> Option<&Entity> {
        match value_type.unwrap_nullable() {
            ValueType::Entity(name) => self.find_entity(name),
            _ => None,
        }
    }
}

/// Builder for `Model`.
#[derive(Debug, Default)]
pub struct ModelBuilder {
    entities: HashMap<String, Entity>,
}

impl ModelBuilder {
    /// Add an entity. Labels default to the entity name.
    pub fn entity(self, name: impl Into<String>) -> EntityBuilder {
        let name = name.into();
        EntityBuilder {
            model: self,
            entity: Entity {
                labels: vec![name.clone()],
                name,
                properties: Vec::new(),
                primary_key: Vec::new(),
            },
        }
    }

    pub fn build(self) -> Model {
        Model {
            entities: self.entities,
        }
    }
}

/// Builder for one entity inside a `ModelBuilder`.
pub struct EntityBuilder {
    model: ModelBuilder,
    entity: Entity,
}

impl EntityBuilder {
    pub fn labels<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.entity.labels = labels.into_iter().map(Into::into).collect();
        self
    }

    pub fn property(mut self, property: Property) -> Self {
        self.entity.properties.push(property);
        self
    }

    /// Declare a property and mark it as the (next) primary key part
    pub fn key(mut self, property: Property) -> Self {
        self.entity.primary_key.push(property.name.clone());
        self.entity.properties.push(property);
        self
    }

    /// Finish this entity and return to the model builder
    pub fn done(mut self) -> ModelBuilder {
        self.model
            .entities
            .insert(self.entity.name.clone(), self.entity);
        self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn warehouse_model() -> Model {
        Model::builder()
            .entity("Warehouse")
            .key(Property::new("Id", ValueType::Int64))
            .property(Property::new("Location", ValueType::String))
            .property(Property::new("Size", ValueType::Int32).with_storage_name("size"))
            .done()
            .build()
    }

    #[test]
    fn test_find_entity_and_property() {
        let model = warehouse_model();
        let warehouse = model.find_entity("Warehouse").unwrap();

        assert_eq!(warehouse.labels, vec!["Warehouse".to_string()]);
        assert_eq!(
            warehouse.find_property("Location").unwrap().value_type,
            ValueType::String
        );
        assert!(warehouse.find_property("Missing").is_none());
        assert!(model.find_entity("Thing").is_none());
    }

    #[test]
    fn test_declaration_order_is_kept() {
        let model = warehouse_model();
        let names: Vec<_> = model.find_entity("Warehouse").unwrap().properties()
            .iter()
            .map(|p| p.name.as_str())
            .collect();

        assert_eq!(names, vec!["Id", "Location", "Size"]);
    }

    #[test]
    fn test_storage_name_defaults_to_name() {
        let model = warehouse_model();
        let warehouse = model.find_entity("Warehouse").unwrap();

        assert_eq!(warehouse.property_ref("Location").unwrap().storage_name(), "Location");
        assert_eq!(warehouse.property_ref("Size").unwrap().storage_name(), "size");
    }

    #[test]
    fn test_primary_key() {
        let model = warehouse_model();
        let key = model.find_entity("Warehouse").unwrap().primary_key();

        assert_eq!(key.len(), 1);
        assert_eq!(key[0].name, "Id");
    }

    #[test]
    fn test_entity_for_type() {
        let model = warehouse_model();

        assert!(model
            .entity_for_type(&ValueType::Entity("Warehouse".into()))
            .is_some());
        assert!(model.entity_for_type(&ValueType::Int32).is_none());
    }
}
