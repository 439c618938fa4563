//! Field accessor resolution.
//!
//! A record type exposes its members through [`super::RecordDescriptor`]: named getter methods,
//! named setter methods, and field storage slots. For each bound field the resolver picks one
//! [`AccessStrategy`] per direction when the bindings are resolved, so reads and writes never
//! search the member table again.
//!
//! Reading a field tries, in order:
//!
//! 1. a getter named exactly like the field
//! 2. a getter named `get_<field>`
//! 3. for boolean fields, a getter named `is_<field>`
//! 4. the field's storage slot
//!
//! Writing tries a setter named `set_<field>` and then mutable storage.
//!
//! Method lookups are memoized in a process-wide cache keyed by record type, method kind and
//! method name, so a getter never shadows a setter of the same name. [`read_field`] and
//! [`write_field`] reuse the accessor resolved for a bound field and only search the members for
//! fields without a binding.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use once_cell::sync::Lazy;

use crate::error::{BindingError, IngestionResult, setter_name};
use crate::types::{DataType, FieldType, Value};

use super::Record;

pub(crate) type GetFn<T> = Arc<dyn Fn(&T) -> Value + Send + Sync>;
/// Returns `false` when the value's runtime type does not fit the member.
pub(crate) type SetFn<T> = Arc<dyn Fn(&mut T, Value) -> bool + Send + Sync>;

pub(crate) struct Getter<T> {
    pub(crate) field_type: FieldType,
    pub(crate) call: GetFn<T>,
}

impl<T> Clone for Getter<T> {
    fn clone(&self) -> Self {
        Self {
            field_type: self.field_type,
            call: Arc::clone(&self.call),
        }
    }
}

pub(crate) struct Setter<T> {
    pub(crate) field_type: FieldType,
    pub(crate) call: SetFn<T>,
}

impl<T> Clone for Setter<T> {
    fn clone(&self) -> Self {
        Self {
            field_type: self.field_type,
            call: Arc::clone(&self.call),
        }
    }
}

/// Direct field storage. `set` is `None` for read-only fields.
pub(crate) struct Storage<T> {
    pub(crate) field_type: FieldType,
    pub(crate) get: GetFn<T>,
    pub(crate) set: Option<SetFn<T>>,
}

/// All members a record type declared in `describe`.
pub(crate) struct Members<T> {
    pub(crate) getters: HashMap<String, Getter<T>>,
    pub(crate) setters: HashMap<String, Setter<T>>,
    pub(crate) storage: HashMap<String, Storage<T>>,
}

impl<T> Default for Members<T> {
    fn default() -> Self {
        Self {
            getters: HashMap::new(),
            setters: HashMap::new(),
            storage: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum MethodKind {
    Getter,
    Setter,
}

type MethodKey = (TypeId, MethodKind, String);

static METHOD_CACHE: Lazy<DashMap<MethodKey, Arc<dyn Any + Send + Sync>>> =
    Lazy::new(DashMap::new);

/// Number of method lookups currently memoized, across all record types.
pub fn cached_method_count() -> usize {
    METHOD_CACHE.len()
}

/// Number of method lookups currently memoized for one record type.
pub fn cached_method_count_for<T: 'static>() -> usize {
    let id = TypeId::of::<T>();
    METHOD_CACHE.iter().filter(|e| e.key().0 == id).count()
}

/// Drop every memoized method lookup.
pub fn clear_method_cache() {
    METHOD_CACHE.clear();
}

pub(crate) fn evict_methods<T: 'static>() {
    let id = TypeId::of::<T>();
    METHOD_CACHE.retain(|key, _| key.0 != id);
}

// Only successful lookups are memoized; a missing method is re-checked next time.
fn lookup<T, M>(kind: MethodKind, table: &HashMap<String, M>, name: &str) -> Option<M>
where
    T: 'static,
    M: Clone + Send + Sync + 'static,
{
    let key = (TypeId::of::<T>(), kind, name.to_string());
    if let Some(hit) = METHOD_CACHE.get(&key) {
        if let Some(m) = hit.value().downcast_ref::<M>() {
            return Some(m.clone());
        }
    }
    let found = table.get(name)?.clone();
    METHOD_CACHE
        .entry(key)
        .or_insert_with(|| Arc::new(found.clone()) as Arc<dyn Any + Send + Sync>);
    Some(found)
}

fn lookup_getter<T: 'static>(members: &Members<T>, name: &str) -> Option<Getter<T>> {
    lookup::<T, _>(MethodKind::Getter, &members.getters, name)
}

fn lookup_setter<T: 'static>(members: &Members<T>, name: &str) -> Option<Setter<T>> {
    lookup::<T, _>(MethodKind::Setter, &members.setters, name)
}

/// How a field is reached, chosen once when bindings are resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessStrategy {
    /// Through the named accessor method.
    Method(String),
    /// Through the field's storage slot.
    Storage,
}

struct ReadPath<T> {
    strategy: AccessStrategy,
    field_type: FieldType,
    call: GetFn<T>,
}

struct WritePath<T> {
    strategy: AccessStrategy,
    field_type: FieldType,
    call: SetFn<T>,
}

/// Resolved read/write access to one field of `T`.
pub struct FieldAccessor<T> {
    type_name: &'static str,
    field: String,
    field_type: FieldType,
    reader: Option<ReadPath<T>>,
    writer: Option<WritePath<T>>,
}

impl<T> fmt::Debug for FieldAccessor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldAccessor")
            .field("type_name", &self.type_name)
            .field("field", &self.field)
            .field("read", &self.read_strategy())
            .field("write", &self.write_strategy())
            .finish()
    }
}

impl<T: 'static> FieldAccessor<T> {
    /// Resolve both directions for `field`. Fails only when `T` has no member at all for it.
    pub(crate) fn resolve(
        members: &Members<T>,
        type_name: &'static str,
        field: &str,
    ) -> Result<Self, BindingError> {
        let reader = resolve_reader(members, field);
        let writer = resolve_writer(members, field);
        let field_type = match (&writer, &reader) {
            (Some(w), _) => w.field_type,
            (None, Some(r)) => r.field_type,
            (None, None) => {
                return Err(BindingError::UnknownField {
                    type_name,
                    field: field.to_string(),
                });
            }
        };
        Ok(Self {
            type_name,
            field: field.to_string(),
            field_type,
            reader,
            writer,
        })
    }
}

impl<T> FieldAccessor<T> {
    pub fn field(&self) -> &str {
        &self.field
    }

    /// The field's declared type, as seen by the write path when there is one.
    pub fn field_type(&self) -> FieldType {
        self.field_type
    }

    pub fn read_strategy(&self) -> Option<&AccessStrategy> {
        self.reader.as_ref().map(|r| &r.strategy)
    }

    pub fn write_strategy(&self) -> Option<&AccessStrategy> {
        self.writer.as_ref().map(|w| &w.strategy)
    }

    pub(crate) fn ensure_readable(&self) -> Result<(), BindingError> {
        match self.reader {
            Some(_) => Ok(()),
            None => Err(BindingError::UnknownField {
                type_name: self.type_name,
                field: self.field.clone(),
            }),
        }
    }

    pub(crate) fn ensure_writable(&self) -> Result<(), BindingError> {
        match self.writer {
            Some(_) => Ok(()),
            None => Err(self.immutable()),
        }
    }

    fn immutable(&self) -> BindingError {
        BindingError::ImmutableField {
            type_name: self.type_name,
            field: self.field.clone(),
            setter: setter_name(&self.field),
        }
    }

    pub fn read(&self, record: &T) -> Result<Value, BindingError> {
        match &self.reader {
            Some(r) => Ok((r.call)(record)),
            None => Err(BindingError::UnknownField {
                type_name: self.type_name,
                field: self.field.clone(),
            }),
        }
    }

    /// Store `value`, rejecting values whose runtime type the field cannot hold.
    pub fn write(&self, record: &mut T, value: Value) -> Result<(), BindingError> {
        let w = self.writer.as_ref().ok_or_else(|| self.immutable())?;
        if !w.field_type.accepts(&value) {
            return Err(BindingError::type_mismatch(
                self.type_name,
                &self.field,
                w.field_type,
                value.type_name(),
            ));
        }
        let found = value.type_name();
        if (w.call)(record, value) {
            Ok(())
        } else {
            Err(BindingError::type_mismatch(
                self.type_name,
                &self.field,
                w.field_type,
                found,
            ))
        }
    }
}

fn resolve_reader<T: 'static>(members: &Members<T>, field: &str) -> Option<ReadPath<T>> {
    let method = |name: String| {
        lookup_getter(members, &name).map(|g| ReadPath {
            strategy: AccessStrategy::Method(name),
            field_type: g.field_type,
            call: g.call,
        })
    };

    if let Some(path) = method(field.to_string()) {
        return Some(path);
    }
    if let Some(path) = method(format!("get_{field}")) {
        return Some(path);
    }
    if !field.starts_with("is_") {
        if let Some(path) = method(format!("is_{field}")) {
            if path.field_type.data_type == DataType::Bool {
                return Some(path);
            }
        }
    }
    members.storage.get(field).map(|s| ReadPath {
        strategy: AccessStrategy::Storage,
        field_type: s.field_type,
        call: Arc::clone(&s.get),
    })
}

fn resolve_writer<T: 'static>(members: &Members<T>, field: &str) -> Option<WritePath<T>> {
    let name = setter_name(field);
    if let Some(s) = lookup_setter(members, &name) {
        return Some(WritePath {
            strategy: AccessStrategy::Method(name),
            field_type: s.field_type,
            call: s.call,
        });
    }
    let slot = members.storage.get(field)?;
    slot.set.as_ref().map(|set| WritePath {
        strategy: AccessStrategy::Storage,
        field_type: slot.field_type,
        call: Arc::clone(set),
    })
}

/// Run `f` with the accessor for `field`: the bound one when a binding names the field,
/// otherwise a fresh resolution through the method cache.
fn with_accessor<T, R>(
    field: &str,
    f: impl FnOnce(&FieldAccessor<T>) -> Result<R, BindingError>,
) -> IngestionResult<R>
where
    T: Record,
{
    let set = super::resolve::<T>()?;
    let result = match set.accessor(field) {
        Some(bound) => f(bound),
        None => f(&FieldAccessor::resolve(set.members(), set.type_name(), field)?),
    };
    Ok(result?)
}

/// Read `field` from `record` through the resolution order above.
pub fn read_field<T: Record>(record: &T, field: &str) -> IngestionResult<Value> {
    with_accessor::<T, _>(field, |a| a.read(record))
}

/// Write `value` into `field` of `record` through the resolution order above.
pub fn write_field<T: Record>(record: &mut T, field: &str, value: Value) -> IngestionResult<()> {
    with_accessor::<T, _>(field, |a| a.write(record, value))
}
