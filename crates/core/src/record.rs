//! LXP records
//!
//! A [`Record`] is a labelled cross-product: a label → value map with an
//! identity (its OID, once assigned) and an optional type label naming the
//! structural type it claims to satisfy.
//!
//! Labels starting with `$` are reserved. The only reserved label a record
//! carries in memory is [`TYPE_LABEL`], holding the type id as a `Long`.

use crate::error::{Error, Result};
use crate::schema::{check_structural_consistency, StructuralType};
use crate::traits::SchemaContext;
use crate::types::{ObjectRef, Oid, TypeId};
use crate::value::{Value, ValueKind};
use std::collections::BTreeMap;

/// Reserved label holding a record's type-label id
pub const TYPE_LABEL: &str = "$TYPELABEL";

/// Reserved label holding a record's OID in its serialized form
pub const OID_LABEL: &str = "$OID";

/// Prefix marking reserved labels
pub const RESERVED_PREFIX: char = '$';

/// Check that a label may be written by a caller
///
/// # Errors
/// `IllegalKey` if the label is empty or reserved.
pub fn validate_label(label: &str) -> Result<()> {
    if label.is_empty() {
        return Err(Error::IllegalKey("label must not be empty".to_string()));
    }
    if label.starts_with(RESERVED_PREFIX) {
        return Err(Error::IllegalKey(format!("label '{}' is reserved", label)));
    }
    Ok(())
}

/// A mutable label → value container with identity
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    oid: Option<Oid>,
    fields: BTreeMap<String, Value>,
}

impl Record {
    /// Create an empty record with no OID
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty record with a caller-chosen OID
    pub fn with_oid(oid: Oid) -> Self {
        Self {
            oid: Some(oid),
            fields: BTreeMap::new(),
        }
    }

    /// The record's OID, if one has been assigned
    pub fn oid(&self) -> Option<Oid> {
        self.oid
    }

    /// Assign the record's OID
    ///
    /// Normally done by the bucket when the record is made persistent.
    pub fn set_oid(&mut self, oid: Oid) {
        self.oid = Some(oid);
    }

    /// Forget the record's OID, detaching it from any stored object
    pub fn clear_oid(&mut self) {
        self.oid = None;
    }

    /// Exact label lookup
    ///
    /// # Errors
    /// `LabelNotFound` if the label is absent.
    pub fn get(&self, label: &str) -> Result<&Value> {
        self.fields
            .get(label)
            .ok_or_else(|| Error::LabelNotFound(label.to_string()))
    }

    fn get_kind(&self, label: &str, kind: ValueKind) -> Result<&Value> {
        let value = self.get(label)?;
        if value.kind() == kind {
            Ok(value)
        } else {
            Err(Error::TypeMismatch(format!(
                "label '{}' holds {}, not {}",
                label,
                value.kind(),
                kind
            )))
        }
    }

    /// Get a String value
    pub fn get_string(&self, label: &str) -> Result<&str> {
        match self.get_kind(label, ValueKind::String)? {
            Value::String(s) => Ok(s),
            _ => unreachable!("kind checked above"),
        }
    }

    /// Get an Int value
    pub fn get_int(&self, label: &str) -> Result<i32> {
        match self.get_kind(label, ValueKind::Int)? {
            Value::Int(i) => Ok(*i),
            _ => unreachable!("kind checked above"),
        }
    }

    /// Get a Long value
    pub fn get_long(&self, label: &str) -> Result<i64> {
        match self.get_kind(label, ValueKind::Long)? {
            Value::Long(l) => Ok(*l),
            _ => unreachable!("kind checked above"),
        }
    }

    /// Get a Double value
    pub fn get_double(&self, label: &str) -> Result<f64> {
        match self.get_kind(label, ValueKind::Double)? {
            Value::Double(d) => Ok(*d),
            _ => unreachable!("kind checked above"),
        }
    }

    /// Get a Boolean value
    pub fn get_boolean(&self, label: &str) -> Result<bool> {
        match self.get_kind(label, ValueKind::Boolean)? {
            Value::Boolean(b) => Ok(*b),
            _ => unreachable!("kind checked above"),
        }
    }

    /// Get a List value
    pub fn get_list(&self, label: &str) -> Result<&[Value]> {
        match self.get_kind(label, ValueKind::List)? {
            Value::List(l) => Ok(l),
            _ => unreachable!("kind checked above"),
        }
    }

    /// Get a Reference value
    pub fn get_reference(&self, label: &str) -> Result<&ObjectRef> {
        match self.get_kind(label, ValueKind::Reference)? {
            Value::Reference(r) => Ok(r),
            _ => unreachable!("kind checked above"),
        }
    }

    /// Insert or overwrite a label
    ///
    /// # Errors
    /// `IllegalKey` if the label is empty or reserved.
    pub fn put(&mut self, label: &str, value: impl Into<Value>) -> Result<()> {
        validate_label(label)?;
        self.fields.insert(label.to_string(), value.into());
        Ok(())
    }

    /// Insert a label known to be valid
    pub(crate) fn put_fixed(&mut self, label: &str, value: impl Into<Value>) {
        debug_assert!(validate_label(label).is_ok());
        self.fields.insert(label.to_string(), value.into());
    }

    /// Builder-style [`put`](Self::put)
    pub fn with(mut self, label: &str, value: impl Into<Value>) -> Result<Self> {
        self.put(label, value)?;
        Ok(self)
    }

    /// Remove a label, returning its value
    pub fn remove(&mut self, label: &str) -> Result<Value> {
        validate_label(label)?;
        self.fields
            .remove(label)
            .ok_or_else(|| Error::LabelNotFound(label.to_string()))
    }

    /// Check whether a label is present
    pub fn contains(&self, label: &str) -> bool {
        self.fields.contains_key(label)
    }

    /// Caller-visible labels, excluding reserved ones
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.fields
            .keys()
            .filter(|l| !l.starts_with(RESERVED_PREFIX))
            .map(String::as_str)
    }

    /// All (label, value) pairs, reserved labels included
    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of caller-visible labels
    pub fn len(&self) -> usize {
        self.labels().count()
    }

    /// True if the record has no caller-visible labels
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The structural type this record claims to satisfy
    pub fn type_label(&self) -> Option<TypeId> {
        match self.fields.get(TYPE_LABEL) {
            Some(Value::Long(id)) => u64::try_from(*id).ok().map(Oid::new),
            _ => None,
        }
    }

    /// Store a type-label id without checking the record against the type
    ///
    /// Used when reconstructing a record from storage; callers attaching a
    /// type go through [`add_type_label`](Self::add_type_label).
    ///
    /// # Errors
    /// `IllegalState` if the id does not fit the label's `Long` value.
    pub fn set_type_label_unchecked(&mut self, id: TypeId) -> Result<()> {
        let stored = i64::try_from(id.as_u64()).map_err(|_| {
            Error::IllegalState(format!("type id {} is too large for a type label", id))
        })?;
        self.fields.insert(TYPE_LABEL.to_string(), Value::Long(stored));
        Ok(())
    }

    /// Drop the type label, if any
    pub fn clear_type_label(&mut self) {
        self.fields.remove(TYPE_LABEL);
    }

    /// Associate a published structural type with this record
    ///
    /// # Errors
    /// - `IllegalState` if the type has not been published (has no id)
    /// - `TypeMismatch` if the record does not currently satisfy the type
    pub fn add_type_label(&mut self, ty: &StructuralType, ctx: &dyn SchemaContext) -> Result<()> {
        let id = ty.id().ok_or_else(|| {
            Error::IllegalState(format!("type '{}' has not been published", ty.name()))
        })?;
        if !check_structural_consistency(self, ty, ctx) {
            return Err(Error::TypeMismatch(format!(
                "record does not satisfy type '{}'",
                ty.name()
            )));
        }
        self.set_type_label_unchecked(id)
    }
}
