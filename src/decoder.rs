//! Fills caller-defined records from the facts of one reporting context.
//!
//! A record shape is described once by a [`FieldMap`]: an ordered list of
//! `(concept, setter)` bindings. Fields without a binding are never touched.
//! Each binding is typed through [`FactField`], so only the supported value
//! kinds (text, `i32`, `i64`) can be bound statically; type names supplied at
//! runtime go through [`FieldMap::bind_value`], which rejects unknown kinds
//! when the map is built.
//!
//! Population is staged: every bound fact is located and converted before
//! any setter runs. A conversion failure therefore leaves the target exactly
//! as it was.
//!
//! ```ignore
//! #[derive(Default)]
//! struct BalanceSheet {
//!     assets: i64,
//!     liabilities: i64,
//! }
//!
//! edgarx::record!(BalanceSheet {
//!     assets: i64 => "us-gaap:Assets",
//!     liabilities: i64 => "us-gaap:Liabilities",
//! });
//!
//! let mut sheet = BalanceSheet::default();
//! doc.unpack_at(&mut sheet, Cik::new(320193), "2023-09-30")?;
//! ```

use crate::resolver::ContextResolver;
use crate::{Cik, Document, Error, Result};
use compact_str::CompactString;
use log::trace;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Value kinds a fact can be converted into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum FieldKind {
    Text,
    Int32,
    Int64,
}

impl FieldKind {
    /// Maps a type name to its kind; `None` for anything without a converter.
    pub fn from_type_name(name: &str) -> Option<Self> {
        match name {
            "text" | "string" | "String" => Some(FieldKind::Text),
            "i32" | "int32" => Some(FieldKind::Int32),
            "i64" | "int64" => Some(FieldKind::Int64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FieldKind::Text => "text",
            FieldKind::Int32 => "i32",
            FieldKind::Int64 => "i64",
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    Int32(i32),
    Int64(i64),
}

impl FieldValue {
    pub fn kind(&self) -> FieldKind {
        match self {
            FieldValue::Text(_) => FieldKind::Text,
            FieldValue::Int32(_) => FieldKind::Int32,
            FieldValue::Int64(_) => FieldKind::Int64,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Text(v) => f.write_str(v),
            FieldValue::Int32(v) => write!(f, "{}", v),
            FieldValue::Int64(v) => write!(f, "{}", v),
        }
    }
}

pub type SetFn<T, V> = Box<dyn Fn(&mut T, V) + Send + Sync>;

/// A field setter tagged with the value kind it accepts.
pub enum Setter<T> {
    Text(SetFn<T, String>),
    Int32(SetFn<T, i32>),
    Int64(SetFn<T, i64>),
}

impl<T> Setter<T> {
    pub fn kind(&self) -> FieldKind {
        match self {
            Setter::Text(_) => FieldKind::Text,
            Setter::Int32(_) => FieldKind::Int32,
            Setter::Int64(_) => FieldKind::Int64,
        }
    }
}

/// Rust types a fact can be written into.
pub trait FactField: Sized {
    const KIND: FieldKind;

    fn setter<T, F>(set: F) -> Setter<T>
    where
        F: Fn(&mut T, Self) + Send + Sync + 'static;
}

impl FactField for String {
    const KIND: FieldKind = FieldKind::Text;

    fn setter<T, F>(set: F) -> Setter<T>
    where
        F: Fn(&mut T, Self) + Send + Sync + 'static,
    {
        Setter::Text(Box::new(set))
    }
}

impl FactField for i32 {
    const KIND: FieldKind = FieldKind::Int32;

    fn setter<T, F>(set: F) -> Setter<T>
    where
        F: Fn(&mut T, Self) + Send + Sync + 'static,
    {
        Setter::Int32(Box::new(set))
    }
}

impl FactField for i64 {
    const KIND: FieldKind = FieldKind::Int64;

    fn setter<T, F>(set: F) -> Setter<T>
    where
        F: Fn(&mut T, Self) + Send + Sync + 'static,
    {
        Setter::Int64(Box::new(set))
    }
}

pub struct FieldBinding<T> {
    concept: CompactString,
    setter: Setter<T>,
}

impl<T> FieldBinding<T> {
    pub fn concept(&self) -> &str {
        &self.concept
    }

    pub fn kind(&self) -> FieldKind {
        self.setter.kind()
    }

    fn stage(&self, raw: &str) -> Result<Staged<'_, T>> {
        let fail = || Error::Conversion {
            concept: self.concept.to_string(),
            kind: self.kind(),
            value: raw.to_string(),
        };

        Ok(match &self.setter {
            Setter::Text(set) => Staged::Text(set, raw.to_string()),
            Setter::Int32(set) => Staged::Int32(set, raw.trim().parse().map_err(|_| fail())?),
            Setter::Int64(set) => Staged::Int64(set, raw.trim().parse().map_err(|_| fail())?),
        })
    }
}

enum Staged<'m, T> {
    Text(&'m SetFn<T, String>, String),
    Int32(&'m SetFn<T, i32>, i32),
    Int64(&'m SetFn<T, i64>, i64),
}

impl<T> Staged<'_, T> {
    fn apply(self, target: &mut T) {
        match self {
            Staged::Text(set, v) => set(target, v),
            Staged::Int32(set, v) => set(target, v),
            Staged::Int64(set, v) => set(target, v),
        }
    }
}

/// Ordered `(concept, setter)` table describing one record shape.
pub struct FieldMap<T> {
    bindings: Vec<FieldBinding<T>>,
}

impl<T> Default for FieldMap<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> FieldMap<T> {
    pub fn new() -> Self {
        Self {
            bindings: Vec::new(),
        }
    }

    /// Binds `concept` (e.g. `us-gaap:Assets`) to a typed setter.
    pub fn field<V, F>(mut self, concept: &str, set: F) -> Self
    where
        V: FactField,
        F: Fn(&mut T, V) + Send + Sync + 'static,
    {
        self.bindings.push(FieldBinding {
            concept: CompactString::from(concept),
            setter: V::setter(set),
        });
        self
    }

    /// Binds `concept` with a kind chosen by type name at runtime. Fails
    /// with [`Error::UnsupportedField`] for names without a converter.
    pub fn bind_value<F>(mut self, concept: &str, type_name: &str, set: F) -> Result<Self>
    where
        T: 'static,
        F: Fn(&mut T, FieldValue) + Send + Sync + 'static,
    {
        let kind = FieldKind::from_type_name(type_name).ok_or_else(|| Error::UnsupportedField {
            concept: concept.to_string(),
            type_name: type_name.to_string(),
        })?;

        let setter = match kind {
            FieldKind::Text => {
                Setter::Text(Box::new(move |t: &mut T, v: String| set(t, FieldValue::Text(v))))
            }
            FieldKind::Int32 => {
                Setter::Int32(Box::new(move |t: &mut T, v: i32| set(t, FieldValue::Int32(v))))
            }
            FieldKind::Int64 => {
                Setter::Int64(Box::new(move |t: &mut T, v: i64| set(t, FieldValue::Int64(v))))
            }
        };
        self.bindings.push(FieldBinding {
            concept: CompactString::from(concept),
            setter,
        });
        Ok(self)
    }

    pub fn bindings(&self) -> &[FieldBinding<T>] {
        &self.bindings
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

/// A record shape that knows its own concept bindings.
pub trait Record: Sized {
    fn field_map() -> FieldMap<Self>;
}

/// Implements [`Record`] for a struct from `field: type => "concept"` pairs.
///
/// ```ignore
/// edgarx::record!(CoverPage {
///     name: String => "dei:EntityRegistrantName",
///     fiscal_year: i32 => "dei:DocumentFiscalYearFocus",
/// });
/// ```
#[macro_export]
macro_rules! record {
    ($ty:ty { $($field:ident : $fty:ty => $concept:expr),* $(,)? }) => {
        impl $crate::Record for $ty {
            fn field_map() -> $crate::FieldMap<Self> {
                $crate::FieldMap::new()
                    $(.field($concept, |r: &mut Self, v: $fty| r.$field = v))*
            }
        }
    };
}

/// Concept-keyed record for shapes only known at runtime.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct DynamicRecord {
    values: BTreeMap<String, FieldValue>,
}

impl DynamicRecord {
    /// Builds a map from `(concept, type name)` pairs.
    pub fn field_map<'a, I>(fields: I) -> Result<FieldMap<DynamicRecord>>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        fields
            .into_iter()
            .try_fold(FieldMap::new(), |map, (concept, type_name)| {
                let key = concept.to_string();
                map.bind_value(concept, type_name, move |rec: &mut DynamicRecord, v| {
                    rec.values.insert(key.clone(), v);
                })
            })
    }

    pub fn get(&self, concept: &str) -> Option<&FieldValue> {
        self.values.get(concept)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

pub struct Decoder<'d> {
    doc: &'d Document,
}

impl<'d> Decoder<'d> {
    pub fn new(doc: &'d Document) -> Self {
        Self { doc }
    }

    /// Resolves the entity's context by CIK alone and populates `target`.
    pub fn unpack<T: Record>(&self, target: &mut T, cik: Cik) -> Result<()> {
        self.unpack_with(&T::field_map(), target, cik)
    }

    /// Resolves the plain instant context for `cik` on `instant`
    /// (`yyyy-mm-dd`) and populates `target`.
    pub fn unpack_at<T: Record>(&self, target: &mut T, cik: Cik, instant: &str) -> Result<()> {
        self.unpack_at_with(&T::field_map(), target, cik, instant)
    }

    pub fn unpack_with<T>(&self, map: &FieldMap<T>, target: &mut T, cik: Cik) -> Result<()> {
        let context = ContextResolver::new(self.doc).by_entity(cik)?;
        self.populate(map, target, context).map(|_| ())
    }

    pub fn unpack_at_with<T>(
        &self,
        map: &FieldMap<T>,
        target: &mut T,
        cik: Cik,
        instant: &str,
    ) -> Result<()> {
        let context = ContextResolver::new(self.doc).by_entity_at(cik, instant)?;
        self.populate(map, target, context).map(|_| ())
    }

    /// Populates `target` from the facts reported against `context_id` and
    /// returns how many fields were written.
    ///
    /// Absent facts and facts with blank text leave their field untouched.
    /// On a conversion error nothing is written.
    pub fn populate<T>(&self, map: &FieldMap<T>, target: &mut T, context_id: &str) -> Result<usize> {
        let mut staged = Vec::with_capacity(map.len());

        for binding in map.bindings() {
            let Some(fact) = self.doc.fact(binding.concept(), context_id) else {
                trace!("{} not reported in context {}", binding.concept(), context_id);
                continue;
            };
            if fact.value.trim().is_empty() {
                trace!("{} is empty in context {}", binding.concept(), context_id);
                continue;
            }
            staged.push(binding.stage(&fact.value)?);
        }

        let written = staged.len();
        for value in staged {
            value.apply(target);
        }
        Ok(written)
    }
}

impl Document {
    /// See [`Decoder::unpack`].
    pub fn unpack<T: Record>(&self, target: &mut T, cik: Cik) -> Result<()> {
        Decoder::new(self).unpack(target, cik)
    }

    /// See [`Decoder::unpack_at`].
    pub fn unpack_at<T: Record>(&self, target: &mut T, cik: Cik, instant: &str) -> Result<()> {
        Decoder::new(self).unpack_at(target, cik, instant)
    }
}
