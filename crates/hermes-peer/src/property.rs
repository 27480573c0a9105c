use hermes_wire::{Value, ValueEnvelope, ValueType, WireConfig};
use tracing::warn;

use crate::provider::PropertyProvider;

/// One value-backed property of a [`PropertyTable`].
#[derive(Debug, Clone, PartialEq)]
pub struct Property {
    name: String,
    value: Value,
    writable: bool,
}

impl Property {
    /// A writable property. Its type is fixed by the initial value.
    pub fn new(name: impl Into<String>, value: Value) -> Self {
        Self {
            name: name.into(),
            value,
            writable: true,
        }
    }

    pub fn read_only(name: impl Into<String>, value: Value) -> Self {
        Self {
            writable: false,
            ..Self::new(name, value)
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn value_type(&self) -> ValueType {
        self.value.value_type()
    }

    pub fn is_writable(&self) -> bool {
        self.writable
    }
}

/// Ordered, in-memory property storage served by a slave.
///
/// Holds at most 255 properties; the wire counts them in one byte. Names and
/// string values must fit the record fields of the table's [`WireConfig`].
#[derive(Debug, Clone)]
pub struct PropertyTable {
    properties: Vec<Property>,
    name_len: usize,
    string_len: usize,
}

impl PropertyTable {
    /// An empty table sized for [`WireConfig::default`].
    pub fn new() -> Self {
        Self::for_wire(&WireConfig::default())
    }

    /// An empty table whose names and strings fit `wire`.
    pub fn for_wire(wire: &WireConfig) -> Self {
        Self {
            properties: Vec::new(),
            name_len: wire.name_len,
            string_len: wire.string_len,
        }
    }

    /// Builder form of [`push`](Self::push).
    pub fn with(mut self, property: Property) -> Self {
        let name = property.name.clone();
        if !self.push(property) {
            warn!(property = %name, "property not added");
        }
        self
    }

    /// Append a property. Returns `false` if the table is full, the name is
    /// already taken, or the name or a string value does not fit the record.
    pub fn push(&mut self, property: Property) -> bool {
        if self.properties.len() >= usize::from(u8::MAX) || self.find(&property.name).is_some() {
            return false;
        }
        if property.name.is_empty() || property.name.len() > self.name_len {
            return false;
        }
        if !self.fits(&property.value) {
            return false;
        }
        self.properties.push(property);
        true
    }

    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Property> {
        self.properties.iter()
    }

    /// Current value of the property called `name`.
    pub fn value(&self, name: &str) -> Option<&Value> {
        self.find(name).map(|index| &self.properties[index].value)
    }

    fn fits(&self, value: &Value) -> bool {
        match value {
            Value::String(text) => text.len() <= self.string_len,
            _ => true,
        }
    }

    fn find(&self, name: &str) -> Option<usize> {
        self.properties.iter().position(|p| p.name == name)
    }

    fn at(&self, index: u8) -> Option<&Property> {
        self.properties.get(usize::from(index))
    }
}

impl Default for PropertyTable {
    fn default() -> Self {
        Self::new()
    }
}

impl PropertyProvider for PropertyTable {
    fn properties_count(&mut self) -> u8 {
        // push() caps the table at u8::MAX entries.
        self.properties.len() as u8
    }

    fn property_name(&mut self, index: u8) -> Option<String> {
        self.at(index).map(|p| p.name.clone())
    }

    fn property_type(&mut self, index: u8) -> Option<ValueType> {
        self.at(index).map(Property::value_type)
    }

    fn get(&mut self, index: u8) -> Option<ValueEnvelope> {
        self.at(index)
            .map(|p| ValueEnvelope::new(p.name.clone(), p.value.clone()))
    }

    fn set(&mut self, index: u8, value: &ValueEnvelope) -> bool {
        if !self.fits(&value.value) {
            return false;
        }
        let Some(property) = self.properties.get_mut(usize::from(index)) else {
            return false;
        };
        if !property.writable || property.value.value_type() != value.value_type() {
            return false;
        }
        property.value = value.value.clone();
        true
    }
}
