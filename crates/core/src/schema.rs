//! Structural types
//!
//! A [`StructuralType`] is a named, ordered set of (label, [`Kind`])
//! requirements. Typing is structural: a record satisfies a type when it has
//! every required label with a value of the required kind, whatever type
//! label it carries. This keeps records readable after a type is redefined
//! under a new id.
//!
//! ## Checks
//!
//! - [`check_structural_consistency`]: does a record satisfy a type?
//!   Total and non-raising; reference fields are checked recursively.
//! - [`check_label_consistency`]: is a record's declared type label
//!   compatible with an expected type id?
//!
//! ## Persistence
//!
//! Types are stored as ordinary records (see [`StructuralType::to_record`])
//! so the type system is persisted the same way as data. A published type is
//! immutable: changing it means publishing a new id.

use crate::error::{Error, Result};
use crate::record::Record;
use crate::traits::SchemaContext;
use crate::types::{Oid, TypeId};
use crate::value::{Value, ValueKind};
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::str::FromStr;

/// Required kind of a labelled field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    /// String value
    String,
    /// 32-bit integer
    Int,
    /// 64-bit integer
    Long,
    /// Double-precision float
    Double,
    /// Boolean
    Boolean,
    /// List of values (elements unchecked)
    List,
    /// Reference to a record satisfying the given type
    Reference(TypeId),
}

impl Kind {
    /// The value kind a field of this kind must hold
    pub fn value_kind(&self) -> ValueKind {
        match self {
            Kind::String => ValueKind::String,
            Kind::Int => ValueKind::Int,
            Kind::Long => ValueKind::Long,
            Kind::Double => ValueKind::Double,
            Kind::Boolean => ValueKind::Boolean,
            Kind::List => ValueKind::List,
            Kind::Reference(_) => ValueKind::Reference,
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Kind::Reference(id) => write!(f, "REF:{}", id),
            other => write!(f, "{}", other.value_kind()),
        }
    }
}

impl FromStr for Kind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let kind = match s {
            "STRING" => Kind::String,
            "INT" => Kind::Int,
            "LONG" => Kind::Long,
            "DOUBLE" => Kind::Double,
            "BOOLEAN" => Kind::Boolean,
            "LIST" => Kind::List,
            other => match other.strip_prefix("REF:") {
                Some(id) => Kind::Reference(id.parse()?),
                None => {
                    return Err(Error::TypeMismatch(format!("unknown kind '{}'", other)));
                }
            },
        };
        Ok(kind)
    }
}

/// A named set of required (label, kind) pairs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructuralType {
    id: Option<TypeId>,
    name: String,
    fields: Vec<(String, Kind)>,
}

impl StructuralType {
    /// Start building a type
    pub fn builder(name: impl Into<String>) -> StructuralTypeBuilder {
        StructuralTypeBuilder {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    /// Attach the id this type was published under
    pub fn with_id(mut self, id: TypeId) -> Self {
        self.id = Some(id);
        self
    }

    /// Published id, if any
    pub fn id(&self) -> Option<TypeId> {
        self.id
    }

    /// Type name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Requirements in declaration order
    pub fn fields(&self) -> impl Iterator<Item = (&str, Kind)> {
        self.fields.iter().map(|(l, k)| (l.as_str(), *k))
    }

    /// Required kind for `label`, if the type names it
    pub fn requirement(&self, label: &str) -> Option<Kind> {
        self.fields
            .iter()
            .find(|(l, _)| l == label)
            .map(|(_, k)| *k)
    }

    /// Number of requirements
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// True if the type has no requirements
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Same label set with the same kind per label
    ///
    /// Ignores names, ids and declaration order.
    pub fn structurally_equal(&self, other: &StructuralType) -> bool {
        self.fields.len() == other.fields.len()
            && self
                .fields
                .iter()
                .all(|(label, kind)| other.requirement(label) == Some(*kind))
    }

    /// Parse a JSON type descriptor
    ///
    /// Format: `{"name": "Person", "fields": {"name": "STRING", "age": "INT"}}`.
    /// Reference kinds are written `"REF:<type id>"`.
    pub fn from_descriptor_json(json: &str) -> Result<Self> {
        #[derive(Deserialize)]
        struct Descriptor {
            name: String,
            fields: BTreeMap<String, String>,
        }

        let descriptor: Descriptor = serde_json::from_str(json)?;
        let mut builder = StructuralType::builder(descriptor.name);
        for (label, kind) in descriptor.fields {
            crate::record::validate_label(&label)?;
            builder = builder.field(label, kind.parse()?);
        }
        Ok(builder.build())
    }

    /// Encode as a record for the type repository
    ///
    /// Labels: `name` (String), `labels` (List of String), `kinds`
    /// (List of String, parallel to `labels`).
    pub fn to_record(&self) -> Record {
        let mut record = Record::new();
        let labels = self
            .fields
            .iter()
            .map(|(l, _)| Value::String(l.clone()))
            .collect::<Vec<_>>();
        let kinds = self
            .fields
            .iter()
            .map(|(_, k)| Value::String(k.to_string()))
            .collect::<Vec<_>>();
        record.put_fixed("name", self.name.clone());
        record.put_fixed("labels", labels);
        record.put_fixed("kinds", kinds);
        if let Some(id) = self.id {
            record.set_oid(id);
        }
        record
    }

    /// Decode a type stored by [`to_record`](Self::to_record)
    ///
    /// The type id is the record's OID.
    pub fn from_record(record: &Record) -> Result<Self> {
        let name = record.get_string("name")?.to_string();
        let labels = record.get_list("labels")?;
        let kinds = record.get_list("kinds")?;
        if labels.len() != kinds.len() {
            return Err(Error::Corruption(format!(
                "type '{}' has {} labels but {} kinds",
                name,
                labels.len(),
                kinds.len()
            )));
        }

        let mut builder = StructuralType::builder(name);
        for (label, kind) in labels.iter().zip(kinds) {
            match (label, kind) {
                (Value::String(label), Value::String(kind)) => {
                    builder = builder.field(label.clone(), kind.parse()?);
                }
                _ => {
                    return Err(Error::Corruption(
                        "type descriptor labels and kinds must be strings".to_string(),
                    ))
                }
            }
        }

        let ty = builder.build();
        Ok(match record.oid() {
            Some(id) => ty.with_id(id),
            None => ty,
        })
    }
}

/// Declarative builder for [`StructuralType`]
#[derive(Debug, Clone)]
pub struct StructuralTypeBuilder {
    name: String,
    fields: Vec<(String, Kind)>,
}

impl StructuralTypeBuilder {
    /// Require `label` to hold a value of `kind`
    ///
    /// Declaring a label twice keeps its first position and the last kind.
    pub fn field(mut self, label: impl Into<String>, kind: Kind) -> Self {
        let label = label.into();
        match self.fields.iter_mut().find(|(l, _)| *l == label) {
            Some(existing) => existing.1 = kind,
            None => self.fields.push((label, kind)),
        }
        self
    }

    /// Finish the type (unpublished, no id)
    pub fn build(self) -> StructuralType {
        StructuralType {
            id: None,
            name: self.name,
            fields: self.fields,
        }
    }
}

/// Check whether `record` satisfies `ty`
///
/// For every required (label, kind): the label must be present and its
/// value must have that kind exactly. For a reference kind the referenced
/// record, resolved through `ctx`, must itself satisfy the referenced type.
///
/// Never raises: a missing label, a kind mismatch, an unknown type id or an
/// unresolvable reference all yield `false`. Reference cycles terminate: a
/// (record, type) pair already under check is assumed consistent.
pub fn check_structural_consistency(
    record: &Record,
    ty: &StructuralType,
    ctx: &dyn SchemaContext,
) -> bool {
    let mut in_progress = HashSet::new();
    check_fields(record, ty, ctx, &mut in_progress)
}

fn check_fields(
    record: &Record,
    ty: &StructuralType,
    ctx: &dyn SchemaContext,
    in_progress: &mut HashSet<(Oid, TypeId)>,
) -> bool {
    for (label, kind) in ty.fields() {
        let Ok(value) = record.get(label) else {
            return false;
        };

        match kind {
            Kind::Reference(target_type) => {
                let Value::Reference(target) = value else {
                    return false;
                };
                if !in_progress.insert((target.oid, target_type)) {
                    continue;
                }
                let Some(target_ty) = ctx.structural_type(target_type) else {
                    return false;
                };
                let Some(target_record) = ctx.resolve(target) else {
                    return false;
                };
                if !check_fields(&target_record, &target_ty, ctx, in_progress) {
                    return false;
                }
            }
            primitive => {
                if value.kind() != primitive.value_kind() {
                    return false;
                }
            }
        }
    }
    true
}

/// Check a record's type label against an expected type id
///
/// A record without a type label is trivially consistent. Otherwise the ids
/// must be equal or, failing that, both types must resolve and be
/// structurally equal.
pub fn check_label_consistency(
    record: &Record,
    expected: TypeId,
    ctx: &dyn SchemaContext,
) -> bool {
    let Some(actual) = record.type_label() else {
        return true;
    };
    if actual == expected {
        return true;
    }
    match (ctx.structural_type(actual), ctx.structural_type(expected)) {
        (Some(a), Some(b)) => a.structurally_equal(&b),
        _ => false,
    }
}
