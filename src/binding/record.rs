use std::sync::Arc;

use crate::types::{DataType, FieldValue};

use super::accessor::{Getter, Members, Setter, Storage};
use super::Direction;

/// A type that rows can be read into (and written from).
///
/// `describe` declares the type's members and its column bindings. It runs once per type, the
/// first time the type is used; the result is cached for the life of the process.
///
/// ```
/// use sheet_records::binding::{Record, RecordDescriptor};
///
/// #[derive(Default)]
/// struct Person {
///     id: i64,
///     name: String,
///     email: Option<String>,
/// }
///
/// impl Record for Person {
///     fn describe(d: &mut RecordDescriptor<Self>) {
///         d.field("id", |p: &Self| p.id, |p: &mut Self, v| p.id = v);
///         d.field("name", |p: &Self| p.name.clone(), |p: &mut Self, v| p.name = v);
///         d.field("email", |p: &Self| p.email.clone(), |p: &mut Self, v| p.email = v);
///
///         d.read_column("id", "ID");
///         d.read_column("name", "Name");
///         d.read_column("email", "Email").default_value("n/a");
///         d.write_column("name", "Name").order(0);
///     }
/// }
/// ```
pub trait Record: Default + Send + 'static {
    fn describe(desc: &mut RecordDescriptor<Self>);
}

#[derive(Debug, Clone)]
pub(crate) struct DeclaredBinding {
    pub(crate) field: String,
    pub(crate) column: String,
    pub(crate) target: Option<DataType>,
    pub(crate) default_value: Option<String>,
    pub(crate) order: Option<u32>,
    pub(crate) direction: Direction,
}

/// Collects a record type's members and column bindings.
pub struct RecordDescriptor<T> {
    bindings: Vec<DeclaredBinding>,
    members: Members<T>,
}

impl<T: 'static> RecordDescriptor<T> {
    pub(crate) fn new() -> Self {
        Self {
            bindings: Vec::new(),
            members: Members::default(),
        }
    }

    pub(crate) fn into_parts(self) -> (Vec<DeclaredBinding>, Members<T>) {
        (self.bindings, self.members)
    }

    /// Declare an accessor method that reads a value.
    ///
    /// Name it like the field, `get_<field>`, or `is_<field>` (boolean fields) to have it picked
    /// up for that field.
    pub fn getter<V, F>(&mut self, name: &str, get: F) -> &mut Self
    where
        V: FieldValue,
        F: Fn(&T) -> V + Send + Sync + 'static,
    {
        self.members.getters.insert(
            name.to_string(),
            Getter {
                field_type: V::FIELD_TYPE,
                call: Arc::new(move |r: &T| get(r).into_value()),
            },
        );
        self
    }

    /// Declare an accessor method that stores a value. Name it `set_<field>`.
    pub fn setter<V, F>(&mut self, name: &str, set: F) -> &mut Self
    where
        V: FieldValue,
        F: Fn(&mut T, V) + Send + Sync + 'static,
    {
        self.members.setters.insert(
            name.to_string(),
            Setter {
                field_type: V::FIELD_TYPE,
                call: Arc::new(move |r: &mut T, value| match V::from_value(value) {
                    Some(v) => {
                        set(r, v);
                        true
                    }
                    None => false,
                }),
            },
        );
        self
    }

    /// Declare mutable field storage.
    pub fn field<V, G, S>(&mut self, name: &str, get: G, set: S) -> &mut Self
    where
        V: FieldValue,
        G: Fn(&T) -> V + Send + Sync + 'static,
        S: Fn(&mut T, V) + Send + Sync + 'static,
    {
        self.members.storage.insert(
            name.to_string(),
            Storage {
                field_type: V::FIELD_TYPE,
                get: Arc::new(move |r: &T| get(r).into_value()),
                set: Some(Arc::new(move |r: &mut T, value| match V::from_value(value) {
                    Some(v) => {
                        set(r, v);
                        true
                    }
                    None => false,
                })),
            },
        );
        self
    }

    /// Declare field storage that can be read but not assigned.
    pub fn readonly_field<V, G>(&mut self, name: &str, get: G) -> &mut Self
    where
        V: FieldValue,
        G: Fn(&T) -> V + Send + Sync + 'static,
    {
        self.members.storage.insert(
            name.to_string(),
            Storage {
                field_type: V::FIELD_TYPE,
                get: Arc::new(move |r: &T| get(r).into_value()),
                set: None,
            },
        );
        self
    }

    /// Bind `field` to be filled from the sheet column named `column`.
    pub fn read_column(&mut self, field: &str, column: &str) -> BindingBuilder<'_> {
        self.push(field, column, Direction::Read)
    }

    /// Bind `field` to be exported under the column named `column`.
    pub fn write_column(&mut self, field: &str, column: &str) -> BindingBuilder<'_> {
        self.push(field, column, Direction::Write)
    }

    fn push(&mut self, field: &str, column: &str, direction: Direction) -> BindingBuilder<'_> {
        self.bindings.push(DeclaredBinding {
            field: field.to_string(),
            column: column.to_string(),
            target: None,
            default_value: None,
            order: None,
            direction,
        });
        let idx = self.bindings.len() - 1;
        BindingBuilder {
            binding: &mut self.bindings[idx],
        }
    }
}

/// Refines one column binding.
pub struct BindingBuilder<'a> {
    binding: &'a mut DeclaredBinding,
}

impl BindingBuilder<'_> {
    /// Convert cell values to this type instead of the field's declared type.
    pub fn target(self, data_type: DataType) -> Self {
        self.binding.target = Some(data_type);
        self
    }

    /// Literal used when the cell is absent.
    pub fn default_value(self, literal: impl Into<String>) -> Self {
        self.binding.default_value = Some(literal.into());
        self
    }

    /// Position among the write bindings; unordered bindings go last.
    pub fn order(self, order: u32) -> Self {
        self.binding.order = Some(order);
        self
    }
}
