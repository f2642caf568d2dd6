use std::collections::BTreeMap;

/// A label set, ordered by key so that iteration (and serialization) never
/// depends on insertion order.
pub type Map = BTreeMap<String, String>;

/// Returns true when every `key=value` pair in `selector` is present in
/// `labels`. An empty selector matches everything.
pub fn matches(selector: &Map, labels: &Map) -> bool {
    selector.iter().all(|(k, v)| labels.get(k) == Some(v))
}

/// Like [`matches`], but an absent selector also matches everything.
pub fn matches_opt(selector: Option<&Map>, labels: Option<&Map>) -> bool {
    match (selector, labels) {
        (None, _) => true,
        (Some(selector), Some(labels)) => matches(selector, labels),
        (Some(selector), None) => selector.is_empty(),
    }
}
