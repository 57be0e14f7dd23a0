use std::collections::BTreeMap;

use crate::value::GeneratedValue;

/// Reserved field carrying the row identifier. Never drawn from a
/// distribution; the engine stamps it on every row.
pub const ROW_ID_FIELD: &str = "id";

/// One synthetic record: the row identifier plus every drawn field.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedRow {
    id: u64,
    values: BTreeMap<String, GeneratedValue>,
}

impl GeneratedRow {
    pub fn new(id: u64) -> Self {
        Self {
            id,
            values: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn get(&self, field: &str) -> Option<&GeneratedValue> {
        self.values.get(field)
    }

    /// Look up a field, treating the reserved id field like any other.
    pub fn value(&self, field: &str) -> Option<GeneratedValue> {
        if field == ROW_ID_FIELD {
            return Some(GeneratedValue::UInt(self.id));
        }
        self.values.get(field).cloned()
    }

    pub fn insert(&mut self, field: impl Into<String>, value: GeneratedValue) {
        self.values.insert(field.into(), value);
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &GeneratedValue)> {
        self.values.iter().map(|(key, value)| (key.as_str(), value))
    }
}
