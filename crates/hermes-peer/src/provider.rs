use hermes_wire::{ValueEnvelope, ValueType};

/// Named, typed properties addressed by index in declaration order.
///
/// A slave serves a provider over the wire; the master's
/// [`SlaveDescriptor`](crate::SlaveDescriptor) is a provider backed by
/// round trips to that slave. Every accessor reports failure as a falsy
/// value (`0`, `None`, `false`).
pub trait PropertyProvider {
    fn properties_count(&mut self) -> u8;

    fn property_name(&mut self, index: u8) -> Option<String>;

    /// Index of the first property called `name`.
    ///
    /// The default scans [`property_name`](Self::property_name) in index
    /// order, one call per index tried.
    fn property_index(&mut self, name: &str) -> Option<u8> {
        let count = self.properties_count();
        (0..count).find(|&index| self.property_name(index).as_deref() == Some(name))
    }

    fn property_type(&mut self, index: u8) -> Option<ValueType>;

    fn get(&mut self, index: u8) -> Option<ValueEnvelope>;

    /// Store `value` at `index`. Returns `false` when nothing was written.
    fn set(&mut self, index: u8, value: &ValueEnvelope) -> bool;
}

impl<P: PropertyProvider + ?Sized> PropertyProvider for &mut P {
    fn properties_count(&mut self) -> u8 {
        (**self).properties_count()
    }

    fn property_name(&mut self, index: u8) -> Option<String> {
        (**self).property_name(index)
    }

    fn property_index(&mut self, name: &str) -> Option<u8> {
        (**self).property_index(name)
    }

    fn property_type(&mut self, index: u8) -> Option<ValueType> {
        (**self).property_type(index)
    }

    fn get(&mut self, index: u8) -> Option<ValueEnvelope> {
        (**self).get(index)
    }

    fn set(&mut self, index: u8, value: &ValueEnvelope) -> bool {
        (**self).set(index, value)
    }
}

impl<P: PropertyProvider + ?Sized> PropertyProvider for Box<P> {
    fn properties_count(&mut self) -> u8 {
        (**self).properties_count()
    }

    fn property_name(&mut self, index: u8) -> Option<String> {
        (**self).property_name(index)
    }

    fn property_index(&mut self, name: &str) -> Option<u8> {
        (**self).property_index(name)
    }

    fn property_type(&mut self, index: u8) -> Option<ValueType> {
        (**self).property_type(index)
    }

    fn get(&mut self, index: u8) -> Option<ValueEnvelope> {
        (**self).get(index)
    }

    fn set(&mut self, index: u8, value: &ValueEnvelope) -> bool {
        (**self).set(index, value)
    }
}
