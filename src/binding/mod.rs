//! Column bindings for record types.
//!
//! [`resolve`] turns a [`Record`]'s declarations into a validated [`TypeBindingSet`]: the read
//! bindings used to build records from rows, the write bindings used to export them, and one
//! resolved [`FieldAccessor`] per binding. The set is computed once per type and shared by every
//! reader in the process.

use std::any::{Any, TypeId};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use once_cell::sync::{Lazy, OnceCell};

use crate::error::{BindingError, IngestionResult};
use crate::types::DataType;

pub mod accessor;
pub mod convert;
pub mod mapper;
mod record;

pub use accessor::{
    AccessStrategy, FieldAccessor, cached_method_count, cached_method_count_for,
    clear_method_cache, read_field, write_field,
};
pub use convert::convert;
pub use mapper::{ColumnProjection, materialize, records_to_rows};
pub use record::{BindingBuilder, Record, RecordDescriptor};

use accessor::Members;

/// Whether a binding fills the field from a sheet or exports it to one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Read,
    Write,
}

/// One validated column binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingEntry {
    pub field: String,
    pub column: String,
    /// Type cell values are converted to before they are stored.
    pub target: DataType,
    pub default_value: Option<String>,
    pub order: Option<u32>,
    pub direction: Direction,
}

/// A binding together with the accessor resolved for its field.
pub struct BoundField<T> {
    entry: BindingEntry,
    accessor: FieldAccessor<T>,
}

impl<T> BoundField<T> {
    pub fn entry(&self) -> &BindingEntry {
        &self.entry
    }

    pub fn accessor(&self) -> &FieldAccessor<T> {
        &self.accessor
    }
}

impl<T> fmt::Debug for BoundField<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundField")
            .field("entry", &self.entry)
            .field("accessor", &self.accessor)
            .finish()
    }
}

/// All bindings of one record type.
pub struct TypeBindingSet<T> {
    type_name: &'static str,
    reads: Vec<BoundField<T>>,
    writes: Vec<BoundField<T>>,
    read_index: HashMap<String, usize>,
    field_index: HashMap<String, (Direction, usize)>,
    members: Members<T>,
}

impl<T> TypeBindingSet<T> {
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Read bindings, in declaration order.
    pub fn reads(&self) -> &[BoundField<T>] {
        &self.reads
    }

    /// Write bindings, by explicit order first and then in declaration order.
    pub fn writes(&self) -> &[BoundField<T>] {
        &self.writes
    }

    pub fn read_by_column(&self, column: &str) -> Option<&BoundField<T>> {
        self.read_index.get(column).map(|&i| &self.reads[i])
    }

    /// The accessor resolved for `field` when some binding names it.
    pub fn accessor(&self, field: &str) -> Option<&FieldAccessor<T>> {
        let &(direction, i) = self.field_index.get(field)?;
        let bound = match direction {
            Direction::Read => &self.reads[i],
            Direction::Write => &self.writes[i],
        };
        Some(&bound.accessor)
    }

    pub fn read_columns(&self) -> Vec<&str> {
        self.reads.iter().map(|b| b.entry.column.as_str()).collect()
    }

    pub fn write_columns(&self) -> Vec<&str> {
        self.writes.iter().map(|b| b.entry.column.as_str()).collect()
    }

    pub(crate) fn members(&self) -> &Members<T> {
        &self.members
    }
}

impl<T> fmt::Debug for TypeBindingSet<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeBindingSet")
            .field("type_name", &self.type_name)
            .field("reads", &self.reads)
            .field("writes", &self.writes)
            .finish()
    }
}

type CacheSlot = Arc<OnceCell<Arc<dyn Any + Send + Sync>>>;

static BINDINGS: Lazy<DashMap<TypeId, CacheSlot>> = Lazy::new(DashMap::new);

/// Returns the binding set for `T`, scanning and validating its declarations on first use.
///
/// Concurrent first callers for the same type wait for a single scan; other types are not
/// blocked. A failed scan is not cached, so the next call scans again.
pub fn resolve<T: Record>() -> IngestionResult<Arc<TypeBindingSet<T>>> {
    let slot = Arc::clone(
        BINDINGS
            .entry(TypeId::of::<T>())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .value(),
    );
    let erased = slot.get_or_try_init(|| {
        scan::<T>().map(|set| Arc::new(set) as Arc<dyn Any + Send + Sync>)
    })?;
    Arc::clone(erased)
        .downcast::<TypeBindingSet<T>>()
        .map_err(|_| {
            BindingError::CacheSlotMismatch {
                type_name: std::any::type_name::<T>(),
            }
            .into()
        })
}

/// Number of record types with a cached binding set.
pub fn cache_size() -> usize {
    BINDINGS.iter().filter(|slot| slot.value().get().is_some()).count()
}

/// Drop the cached binding set of `T`. Returns `true` if one was cached.
pub fn evict<T: 'static>() -> bool {
    accessor::evict_methods::<T>();
    BINDINGS
        .remove(&TypeId::of::<T>())
        .is_some_and(|(_, slot)| slot.get().is_some())
}

/// Drop every cached binding set.
pub fn clear_cache() {
    BINDINGS.clear();
}

fn scan<T: Record>() -> Result<TypeBindingSet<T>, BindingError> {
    let type_name = std::any::type_name::<T>();
    let mut desc = RecordDescriptor::<T>::new();
    T::describe(&mut desc);
    let (declared, members) = desc.into_parts();

    let mut seen: HashSet<(Direction, String)> = HashSet::new();
    let mut orders: HashSet<u32> = HashSet::new();
    for b in &declared {
        let column = b.column.trim();
        if column.is_empty() {
            return Err(BindingError::EmptyColumnName {
                type_name,
                field: b.field.clone(),
            });
        }
        if !seen.insert((b.direction, column.to_string())) {
            return Err(BindingError::DuplicateColumn {
                type_name,
                field: b.field.clone(),
                column: column.to_string(),
            });
        }
        if let (Direction::Write, Some(order)) = (b.direction, b.order) {
            if !orders.insert(order) {
                return Err(BindingError::DuplicateOrdinal {
                    type_name,
                    field: b.field.clone(),
                    order,
                });
            }
        }
    }
    if declared.is_empty() {
        return Err(BindingError::NoBindingsFound { type_name });
    }

    let mut reads = Vec::new();
    let mut writes = Vec::new();
    for b in declared {
        let accessor = FieldAccessor::resolve(&members, type_name, &b.field)?;
        match b.direction {
            Direction::Read => accessor.ensure_writable()?,
            Direction::Write => accessor.ensure_readable()?,
        }
        let entry = BindingEntry {
            target: b.target.unwrap_or(accessor.field_type().data_type),
            column: b.column.trim().to_string(),
            field: b.field,
            default_value: b.default_value,
            order: b.order,
            direction: b.direction,
        };
        let bound = BoundField { entry, accessor };
        match bound.entry.direction {
            Direction::Read => reads.push(bound),
            Direction::Write => writes.push(bound),
        }
    }
    // Stable: unordered entries keep declaration order after the ordered ones.
    writes.sort_by_key(|b| (b.entry.order.is_none(), b.entry.order));

    let read_index = reads
        .iter()
        .enumerate()
        .map(|(i, b)| (b.entry.column.clone(), i))
        .collect();
    let mut field_index = HashMap::new();
    for (direction, bound) in [(Direction::Read, &reads), (Direction::Write, &writes)] {
        for (i, b) in bound.iter().enumerate() {
            field_index
                .entry(b.entry.field.clone())
                .or_insert((direction, i));
        }
    }

    Ok(TypeBindingSet {
        type_name,
        reads,
        writes,
        read_index,
        field_index,
        members,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;
    use std::thread;

    use super::*;
    use crate::error::IngestionError;

    static PERSON_SCANS: AtomicUsize = AtomicUsize::new(0);

    #[derive(Default)]
    struct Person {
        id: i64,
        name: String,
        score: Option<f64>,
    }

    impl Record for Person {
        fn describe(d: &mut RecordDescriptor<Self>) {
            PERSON_SCANS.fetch_add(1, Ordering::SeqCst);
            d.field("id", |p: &Self| p.id, |p: &mut Self, v| p.id = v);
            d.field("name", |p: &Self| p.name.clone(), |p: &mut Self, v| p.name = v);
            d.field("score", |p: &Self| p.score, |p: &mut Self, v| p.score = v);

            d.read_column("id", "ID");
            d.read_column("name", " Name ");
            d.read_column("score", "Score").default_value("0");
            d.write_column("score", "Score");
            d.write_column("name", "Name").order(2);
            d.write_column("id", "ID").order(1);
        }
    }

    #[test]
    fn concurrent_first_resolution_scans_once_and_shares_the_set() {
        let barrier = Arc::new(Barrier::new(8));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    resolve::<Person>().unwrap()
                })
            })
            .collect();
        let sets: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(PERSON_SCANS.load(Ordering::SeqCst), 1);
        for s in &sets[1..] {
            assert!(Arc::ptr_eq(&sets[0], s));
        }
        assert!(Arc::ptr_eq(&sets[0], &resolve::<Person>().unwrap()));
    }

    #[test]
    fn reads_keep_declaration_order_and_writes_sort_by_order() {
        let set = resolve::<Person>().unwrap();
        assert_eq!(set.read_columns(), vec!["ID", "Name", "Score"]);
        assert_eq!(set.write_columns(), vec!["ID", "Name", "Score"]);
        assert_eq!(set.read_by_column("Score").unwrap().entry().field, "score");
        assert_eq!(
            set.read_by_column("Score").unwrap().entry().default_value.as_deref(),
            Some("0")
        );
        assert_eq!(set.read_by_column("ID").unwrap().entry().target, DataType::Int64);
        assert!(set.read_by_column("Missing").is_none());
    }

    #[derive(Default)]
    struct Nothing;

    impl Record for Nothing {
        fn describe(_d: &mut RecordDescriptor<Self>) {}
    }

    #[test]
    fn no_bindings_is_an_error_and_is_not_cached() {
        let err = resolve::<Nothing>().unwrap_err();
        assert!(matches!(
            err,
            IngestionError::Binding(BindingError::NoBindingsFound { .. })
        ));
        assert!(!evict::<Nothing>());
    }

    #[derive(Default)]
    struct EmptyColumn {
        a: i32,
    }

    impl Record for EmptyColumn {
        fn describe(d: &mut RecordDescriptor<Self>) {
            d.field("a", |r: &Self| r.a, |r: &mut Self, v| r.a = v);
            d.read_column("a", "   ");
        }
    }

    #[derive(Default)]
    struct DuplicateColumn {
        a: i32,
        b: i32,
    }

    impl Record for DuplicateColumn {
        fn describe(d: &mut RecordDescriptor<Self>) {
            d.field("a", |r: &Self| r.a, |r: &mut Self, v| r.a = v);
            d.field("b", |r: &Self| r.b, |r: &mut Self, v| r.b = v);
            d.read_column("a", "X");
            d.write_column("a", "X");
            d.read_column("b", "X");
        }
    }

    #[derive(Default)]
    struct DuplicateOrder {
        a: i32,
        b: i32,
    }

    impl Record for DuplicateOrder {
        fn describe(d: &mut RecordDescriptor<Self>) {
            d.field("a", |r: &Self| r.a, |r: &mut Self, v| r.a = v);
            d.field("b", |r: &Self| r.b, |r: &mut Self, v| r.b = v);
            d.write_column("a", "A").order(1);
            d.write_column("b", "B").order(1);
        }
    }

    #[derive(Default)]
    struct ReadIntoReadOnly {
        a: i32,
    }

    impl Record for ReadIntoReadOnly {
        fn describe(d: &mut RecordDescriptor<Self>) {
            d.readonly_field("a", |r: &Self| r.a);
            d.read_column("a", "A");
        }
    }

    #[derive(Default)]
    struct Unknown;

    impl Record for Unknown {
        fn describe(d: &mut RecordDescriptor<Self>) {
            d.read_column("ghost", "Ghost");
        }
    }

    #[test]
    fn validation_errors_name_the_offending_field() {
        assert!(matches!(
            resolve::<EmptyColumn>().unwrap_err(),
            IngestionError::Binding(BindingError::EmptyColumnName { field, .. }) if field == "a"
        ));
        assert!(matches!(
            resolve::<DuplicateColumn>().unwrap_err(),
            IngestionError::Binding(BindingError::DuplicateColumn { field, column, .. })
                if field == "b" && column == "X"
        ));
        assert!(matches!(
            resolve::<DuplicateOrder>().unwrap_err(),
            IngestionError::Binding(BindingError::DuplicateOrdinal { field, order: 1, .. })
                if field == "b"
        ));
        assert!(matches!(
            resolve::<ReadIntoReadOnly>().unwrap_err(),
            IngestionError::Binding(BindingError::ImmutableField { field, setter, .. })
                if field == "a" && setter == "set_a"
        ));
        assert!(matches!(
            resolve::<Unknown>().unwrap_err(),
            IngestionError::Binding(BindingError::UnknownField { field, .. }) if field == "ghost"
        ));
    }

    #[derive(Default)]
    struct Evictable {
        v: i32,
    }

    impl Record for Evictable {
        fn describe(d: &mut RecordDescriptor<Self>) {
            d.field("v", |r: &Self| r.v, |r: &mut Self, v| r.v = v);
            d.read_column("v", "V");
        }
    }

    #[test]
    fn evict_forces_a_fresh_set() {
        let first = resolve::<Evictable>().unwrap();
        assert!(cache_size() >= 1);
        assert!(evict::<Evictable>());
        assert!(!evict::<Evictable>());
        let second = resolve::<Evictable>().unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
    }
}
