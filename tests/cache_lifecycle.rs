//! Clearing the process-wide caches affects every record type, so this lives in its own test
//! binary with a single test.

use sheet_records::binding::{
    self, AccessStrategy, Record, RecordDescriptor, cached_method_count, cached_method_count_for,
    clear_method_cache, read_field, write_field,
};
use sheet_records::types::Value;

#[derive(Debug, Default)]
struct Sensor {
    label: String,
    online: bool,
    reading: Option<f64>,
}

impl Record for Sensor {
    fn describe(d: &mut RecordDescriptor<Self>) {
        d.getter("get_label", |s: &Self| s.label.clone());
        d.setter("set_label", |s: &mut Self, v: String| s.label = v.to_uppercase());
        d.getter("is_online", |s: &Self| s.online);
        d.setter("set_online", |s: &mut Self, v: bool| s.online = v);
        d.field("reading", |s: &Self| s.reading, |s: &mut Self, v| s.reading = v);

        d.read_column("label", "Label");
        d.read_column("online", "Online");
        d.read_column("reading", "Reading");
    }
}

#[derive(Debug, Default)]
struct Other {
    id: i64,
}

impl Record for Other {
    fn describe(d: &mut RecordDescriptor<Self>) {
        d.getter("id", |o: &Self| o.id);
        d.setter("set_id", |o: &mut Self, v: i64| o.id = v);
        d.read_column("id", "ID");
    }
}

#[test]
fn caches_fill_on_first_use_and_can_be_cleared() {
    binding::clear_cache();
    clear_method_cache();
    assert_eq!(binding::cache_size(), 0);
    assert_eq!(cached_method_count(), 0);

    let sensors = binding::resolve::<Sensor>().unwrap();
    assert_eq!(binding::cache_size(), 1);
    // get_label, set_label, is_online, set_online
    assert_eq!(cached_method_count_for::<Sensor>(), 4);

    let label = sensors.read_by_column("Label").unwrap().accessor();
    assert_eq!(label.read_strategy(), Some(&AccessStrategy::Method("get_label".to_string())));
    let reading = sensors.read_by_column("Reading").unwrap().accessor();
    assert_eq!(reading.write_strategy(), Some(&AccessStrategy::Storage));

    let again = binding::resolve::<Sensor>().unwrap();
    assert!(std::sync::Arc::ptr_eq(&sensors, &again));

    binding::resolve::<Other>().unwrap();
    assert_eq!(binding::cache_size(), 2);
    assert_eq!(cached_method_count(), 6);

    let mut s = Sensor::default();
    write_field(&mut s, "label", Value::Utf8("north".to_string())).unwrap();
    write_field(&mut s, "online", Value::Bool(true)).unwrap();
    assert_eq!(read_field(&s, "label").unwrap(), Value::Utf8("NORTH".to_string()));
    assert_eq!(read_field(&s, "online").unwrap(), Value::Bool(true));
    assert_eq!(read_field(&s, "reading").unwrap(), Value::Null);
    assert!(s.online);

    assert!(binding::evict::<Other>());
    assert!(!binding::evict::<Other>());
    assert_eq!(binding::cache_size(), 1);
    assert_eq!(cached_method_count_for::<Other>(), 0);
    assert_eq!(cached_method_count_for::<Sensor>(), 4);

    clear_method_cache();
    assert_eq!(cached_method_count(), 0);
    // Bound accessors keep working without the method cache.
    write_field(&mut s, "label", Value::Utf8("x".to_string())).unwrap();
    assert_eq!(s.label, "X");
    assert_eq!(read_field(&s, "online").unwrap(), Value::Bool(true));
    // Bound fields do not search the members again.
    assert_eq!(cached_method_count(), 0);

    binding::clear_cache();
    assert_eq!(binding::cache_size(), 0);
    let fresh = binding::resolve::<Sensor>().unwrap();
    assert!(!std::sync::Arc::ptr_eq(&sensors, &fresh));
    assert_eq!(binding::cache_size(), 1);
}
