use meshhub_controller_k8s_api::labels;

/// Names the subset selecting `selector`.
///
/// Pairs are joined as `key-value` in key order and concatenated with `_`,
/// so the name depends only on the selector's contents. Destination rules
/// and the virtual services that reference their subsets are compiled
/// independently and must agree on it.
pub fn subset_name(selector: &labels::Map) -> String {
    selector
        .iter()
        .map(|(k, v)| format!("{k}-{v}"))
        .collect::<Vec<_>>()
        .join("_")
}
