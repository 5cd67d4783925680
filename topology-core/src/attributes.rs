//! Typed attribute store shared by media types, nodes, topologies and transforms
//!
//! Keys are GUIDs; values are a closed set of variants. A missing key is
//! reported as [`Error::AttributeNotFound`], which callers rely on to tell
//! "absent" apart from "present with another type".
//!
//! # Example
//!
//! ```
//! use topoload_core::attributes::Attributes;
//! use topoload_core::guids::keys;
//!
//! let mut attrs = Attributes::new();
//! attrs.set_u32(keys::AUDIO_NUM_CHANNELS, 2);
//! attrs.set_ratio(keys::FRAME_SIZE, 1280, 720);
//!
//! assert_eq!(attrs.get_u32(&keys::AUDIO_NUM_CHANNELS).unwrap(), 2);
//! assert_eq!(attrs.get_ratio(&keys::FRAME_SIZE).unwrap(), (1280, 720));
//! assert!(attrs.get_u32(&keys::AUDIO_SAMPLES_PER_SECOND).is_err());
//! ```

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::guids::{self, Guid};
use crate::{Error, Result};

// =============================================================================
// Shared objects
// =============================================================================

/// Reference-counted object stored in an attribute or bound to a node.
///
/// Equality is identity: two handles are equal when they point at the same
/// allocation.
#[derive(Clone)]
pub struct SharedObject(Arc<dyn Any + Send + Sync>);

impl SharedObject {
    /// Wrap a value in a new shared allocation.
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self(Arc::new(value))
    }

    /// Share an existing allocation.
    pub fn from_arc<T: Any + Send + Sync>(value: Arc<T>) -> Self {
        Self(value)
    }

    /// Recover the concrete type, if it matches.
    pub fn downcast<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.0.clone().downcast::<T>().ok()
    }

    /// Whether both handles refer to the same object.
    pub fn ptr_eq(&self, other: &SharedObject) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for SharedObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SharedObject({:p})", Arc::as_ptr(&self.0))
    }
}

impl PartialEq for SharedObject {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

// =============================================================================
// Values
// =============================================================================

/// Attribute value variants.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    /// GUID value
    Guid(Guid),
    /// 32-bit unsigned value
    U32(u32),
    /// 64-bit unsigned value (also used for packed ratios)
    U64(u64),
    /// String value
    String(String),
    /// Object handle
    Object(SharedObject),
}

impl AttributeValue {
    /// JSON rendering used by reports. Objects render as a placeholder.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            AttributeValue::Guid(g) => serde_json::Value::String(guids::display_name(g)),
            AttributeValue::U32(v) => serde_json::Value::from(*v),
            AttributeValue::U64(v) => serde_json::Value::from(*v),
            AttributeValue::String(s) => serde_json::Value::String(s.clone()),
            AttributeValue::Object(_) => serde_json::Value::String("<object>".to_string()),
        }
    }
}

/// Pack a ratio into the 64-bit form.
pub fn pack_ratio(numerator: u32, denominator: u32) -> u64 {
    ((numerator as u64) << 32) | denominator as u64
}

/// Split a packed ratio.
pub fn unpack_ratio(value: u64) -> (u32, u32) {
    ((value >> 32) as u32, value as u32)
}

// =============================================================================
// Store
// =============================================================================

/// Insertion-ordered attribute store.
#[derive(Debug, Clone, Default)]
pub struct Attributes {
    items: Vec<(Guid, AttributeValue)>,
}

impl Attributes {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of items.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Whether a key is present.
    pub fn contains(&self, key: &Guid) -> bool {
        self.items.iter().any(|(k, _)| k == key)
    }

    /// Raw value lookup.
    pub fn get(&self, key: &Guid) -> Option<&AttributeValue> {
        self.items.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Set a value, replacing any existing item in place.
    pub fn set(&mut self, key: Guid, value: AttributeValue) {
        match self.items.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.items.push((key, value)),
        }
    }

    /// Remove an item. Returns the previous value, if any.
    pub fn delete(&mut self, key: &Guid) -> Option<AttributeValue> {
        let index = self.items.iter().position(|(k, _)| k == key)?;
        Some(self.items.remove(index).1)
    }

    /// Remove all items.
    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Iterate items in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&Guid, &AttributeValue)> {
        self.items.iter().map(|(k, v)| (k, v))
    }

    /// Copy every item of `other` into this store, overwriting duplicates.
    pub fn copy_all_from(&mut self, other: &Attributes) {
        for (key, value) in other.iter() {
            self.set(*key, value.clone());
        }
    }

    /// Whether every item of `self` is present and equal in `other`.
    pub fn contained_in(&self, other: &Attributes) -> bool {
        self.items
            .iter()
            .all(|(key, value)| other.get(key) == Some(value))
    }

    /// Render as a JSON object keyed by readable names.
    pub fn to_json(&self) -> serde_json::Map<String, serde_json::Value> {
        self.items
            .iter()
            .map(|(key, value)| (guids::display_name(key), value.to_json()))
            .collect()
    }

    // -------------------------------------------------------------------------
    // Typed setters
    // -------------------------------------------------------------------------

    /// Set a 32-bit value.
    pub fn set_u32(&mut self, key: Guid, value: u32) {
        self.set(key, AttributeValue::U32(value));
    }

    /// Set a 64-bit value.
    pub fn set_u64(&mut self, key: Guid, value: u64) {
        self.set(key, AttributeValue::U64(value));
    }

    /// Set a GUID value.
    pub fn set_guid(&mut self, key: Guid, value: Guid) {
        self.set(key, AttributeValue::Guid(value));
    }

    /// Set a string value.
    pub fn set_string(&mut self, key: Guid, value: impl Into<String>) {
        self.set(key, AttributeValue::String(value.into()));
    }

    /// Set an object handle.
    pub fn set_unknown(&mut self, key: Guid, value: SharedObject) {
        self.set(key, AttributeValue::Object(value));
    }

    /// Set a packed ratio.
    pub fn set_ratio(&mut self, key: Guid, numerator: u32, denominator: u32) {
        self.set_u64(key, pack_ratio(numerator, denominator));
    }

    // -------------------------------------------------------------------------
    // Typed getters
    // -------------------------------------------------------------------------

    /// Get a 32-bit value.
    pub fn get_u32(&self, key: &Guid) -> Result<u32> {
        match self.get(key) {
            Some(AttributeValue::U32(v)) => Ok(*v),
            Some(_) => Err(Error::AttributeTypeMismatch(*key)),
            None => Err(Error::AttributeNotFound(*key)),
        }
    }

    /// Get a 64-bit value.
    pub fn get_u64(&self, key: &Guid) -> Result<u64> {
        match self.get(key) {
            Some(AttributeValue::U64(v)) => Ok(*v),
            Some(_) => Err(Error::AttributeTypeMismatch(*key)),
            None => Err(Error::AttributeNotFound(*key)),
        }
    }

    /// Get a GUID value.
    pub fn get_guid(&self, key: &Guid) -> Result<Guid> {
        match self.get(key) {
            Some(AttributeValue::Guid(v)) => Ok(*v),
            Some(_) => Err(Error::AttributeTypeMismatch(*key)),
            None => Err(Error::AttributeNotFound(*key)),
        }
    }

    /// Get a string value.
    pub fn get_string(&self, key: &Guid) -> Result<String> {
        match self.get(key) {
            Some(AttributeValue::String(v)) => Ok(v.clone()),
            Some(_) => Err(Error::AttributeTypeMismatch(*key)),
            None => Err(Error::AttributeNotFound(*key)),
        }
    }

    /// Get an object handle.
    pub fn get_unknown(&self, key: &Guid) -> Result<SharedObject> {
        match self.get(key) {
            Some(AttributeValue::Object(v)) => Ok(v.clone()),
            Some(_) => Err(Error::AttributeTypeMismatch(*key)),
            None => Err(Error::AttributeNotFound(*key)),
        }
    }

    /// Get a packed ratio.
    pub fn get_ratio(&self, key: &Guid) -> Result<(u32, u32)> {
        self.get_u64(key).map(unpack_ratio)
    }

    /// Boolean flag stored as a 32-bit value. Absent means false.
    pub fn flag(&self, key: &Guid) -> bool {
        self.get_u32(key).map(|v| v != 0).unwrap_or(false)
    }
}

impl PartialEq for Attributes {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.contained_in(other)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guids::keys;

    #[test]
    fn test_set_replaces_in_place() {
        let mut attrs = Attributes::new();
        attrs.set_u32(keys::AUDIO_NUM_CHANNELS, 1);
        attrs.set_u32(keys::AUDIO_SAMPLES_PER_SECOND, 44100);
        attrs.set_u32(keys::AUDIO_NUM_CHANNELS, 2);

        assert_eq!(attrs.len(), 2);
        let order: Vec<_> = attrs.iter().map(|(k, _)| *k).collect();
        assert_eq!(order[0], keys::AUDIO_NUM_CHANNELS);
        assert_eq!(attrs.get_u32(&keys::AUDIO_NUM_CHANNELS).unwrap(), 2);
    }

    #[test]
    fn test_absent_and_mismatched_keys_are_distinct() {
        let mut attrs = Attributes::new();
        attrs.set_u64(keys::MEDIASTART, 0);

        assert!(matches!(
            attrs.get_u32(&keys::STREAMID),
            Err(Error::AttributeNotFound(_))
        ));
        assert!(matches!(
            attrs.get_u32(&keys::MEDIASTART),
            Err(Error::AttributeTypeMismatch(_))
        ));
    }

    #[test]
    fn test_contained_in_ignores_extra_items() {
        let mut constraint = Attributes::new();
        constraint.set_u32(keys::AUDIO_SAMPLES_PER_SECOND, 48000);

        let mut candidate = constraint.clone();
        candidate.set_u32(keys::AUDIO_NUM_CHANNELS, 2);

        assert!(constraint.contained_in(&candidate));
        assert!(!candidate.contained_in(&constraint));
    }

    #[test]
    fn test_object_equality_is_identity() {
        let a = SharedObject::new(5u32);
        let b = SharedObject::new(5u32);
        assert_eq!(a, a.clone());
        assert_ne!(a, b);
        assert_eq!(*a.downcast::<u32>().unwrap(), 5);
        assert!(a.downcast::<String>().is_none());
    }

    #[test]
    fn test_equality_ignores_order() {
        let mut a = Attributes::new();
        a.set_u32(keys::AUDIO_NUM_CHANNELS, 2);
        a.set_u32(keys::AUDIO_BITS_PER_SAMPLE, 16);
        let mut b = Attributes::new();
        b.set_u32(keys::AUDIO_BITS_PER_SAMPLE, 16);
        b.set_u32(keys::AUDIO_NUM_CHANNELS, 2);
        assert_eq!(a, b);
    }

    #[test]
    fn test_delete_and_flag() {
        let mut attrs = Attributes::new();
        attrs.set_u32(keys::D3D_AWARE, 1);
        assert!(attrs.flag(&keys::D3D_AWARE));
        assert!(attrs.delete(&keys::D3D_AWARE).is_some());
        assert!(!attrs.flag(&keys::D3D_AWARE));
        assert!(attrs.delete(&keys::D3D_AWARE).is_none());
    }
}
