//! Sparse change-set computation between successive editor states.
//!
//! An editor state is a flat map of top-level keys to arbitrary JSON values
//! (`blocks`, `theme`, `meta`, ...). A diff is the same shape, containing only
//! the keys whose value changed since the baseline. Each top-level key maps to
//! an independently-stored remote field, so diff granularity is deliberately
//! top-level-key only: a change anywhere inside a nested structure marks the
//! entire key as changed and ships the whole value.
//!
//! Comparison is whole-value structural equality, which is O(state size) per
//! call. That is acceptable because diffs are computed at deliberate save
//! points, not per keystroke.
//!
//! All functions here are pure; no I/O, no error conditions.

use serde_json::{Map, Value};

/// One editor state snapshot, or a sparse diff between two of them.
pub type StateMap = Map<String, Value>;

/// Compute the sparse diff from `prev` to `next`.
///
/// With no baseline (`prev` is `None`, the first save ever), the diff is the
/// entirety of `next`. Otherwise a top-level key of `next` is included iff
/// its value differs structurally from the baseline's value for that key.
pub fn diff(prev: Option<&StateMap>, next: &StateMap) -> StateMap {
    let Some(prev) = prev else {
        return next.clone();
    };

    let mut changed = StateMap::new();
    for (key, value) in next {
        if prev.get(key) != Some(value) {
            changed.insert(key.clone(), value.clone());
        }
    }
    changed
}

/// Whether a diff carries any changed key at all.
pub fn has_changes(diff: &StateMap) -> bool {
    !diff.is_empty()
}

/// Shallow-merge `overlay` into `base`; overlay keys win.
pub fn merge_into(base: &mut StateMap, overlay: &StateMap) {
    for (key, value) in overlay {
        base.insert(key.clone(), value.clone());
    }
}

/// Shallow-merge a sequence of diffs in order; later diffs' keys override
/// earlier ones.
pub fn merge_diffs<'a, I>(diffs: I) -> StateMap
where
    I: IntoIterator<Item = &'a StateMap>,
{
    let mut merged = StateMap::new();
    for diff in diffs {
        merge_into(&mut merged, diff);
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// Build a StateMap from a JSON object literal.
    fn state(value: Value) -> StateMap {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn test_diff_no_baseline_is_full_state() {
        let next = state(json!({"blocks": [1, 2], "theme": "dark"}));
        let d = diff(None, &next);
        assert_eq!(d, next);
    }

    #[test]
    fn test_diff_identical_states_empty() {
        let s = state(json!({"blocks": [1], "meta": {"title": "Home"}}));
        let d = diff(Some(&s), &s);
        assert!(!has_changes(&d));
    }

    #[test]
    fn test_diff_only_changed_keys() {
        let prev = state(json!({"blocks": [1], "theme": "dark", "meta": {"v": 1}}));
        let next = state(json!({"blocks": [1, 2], "theme": "dark", "meta": {"v": 1}}));
        let d = diff(Some(&prev), &next);

        assert_eq!(d.len(), 1);
        assert_eq!(d.get("blocks"), Some(&json!([1, 2])));
    }

    #[test]
    fn test_diff_nested_change_ships_whole_key() {
        let prev = state(json!({"meta": {"title": "Home", "tags": ["a"]}}));
        let next = state(json!({"meta": {"title": "Home", "tags": ["a", "b"]}}));
        let d = diff(Some(&prev), &next);

        // The whole nested value is included, not a sub-key patch.
        assert_eq!(d.get("meta"), Some(&json!({"title": "Home", "tags": ["a", "b"]})));
    }

    #[test]
    fn test_diff_new_key_included() {
        let prev = state(json!({"blocks": []}));
        let next = state(json!({"blocks": [], "footer": {"show": true}}));
        let d = diff(Some(&prev), &next);

        assert_eq!(d.len(), 1);
        assert_eq!(d.get("footer"), Some(&json!({"show": true})));
    }

    #[test]
    fn test_diff_removed_key_not_represented() {
        // Keys absent from `next` are simply not diffed; deletion is not a
        // change-set concept at this layer.
        let prev = state(json!({"blocks": [1], "legacy": true}));
        let next = state(json!({"blocks": [1]}));
        let d = diff(Some(&prev), &next);
        assert!(!has_changes(&d));
    }

    #[test]
    fn test_diff_value_equality_not_identity() {
        // Structurally equal nested values compare equal even though they are
        // distinct allocations.
        let prev = state(json!({"meta": {"a": [1, 2, 3]}}));
        let next = state(json!({"meta": {"a": [1, 2, 3]}}));
        let d = diff(Some(&prev), &next);
        assert!(!has_changes(&d));
    }

    #[test]
    fn test_merge_diffs_later_key_wins() {
        let a = state(json!({"blocks": [1], "theme": "light"}));
        let b = state(json!({"blocks": [1, 2]}));
        let c = state(json!({"theme": "dark"}));

        let merged = merge_diffs([&a, &b, &c]);
        assert_eq!(merged.get("blocks"), Some(&json!([1, 2])));
        assert_eq!(merged.get("theme"), Some(&json!("dark")));
    }

    #[test]
    fn test_merge_diffs_empty_input() {
        let merged = merge_diffs(std::iter::empty::<&StateMap>());
        assert!(!has_changes(&merged));
    }

    #[test]
    fn test_merge_into_preserves_untouched_keys() {
        let mut base = state(json!({"blocks": [1], "theme": "light"}));
        let overlay = state(json!({"theme": "dark"}));
        merge_into(&mut base, &overlay);

        assert_eq!(base.get("blocks"), Some(&json!([1])));
        assert_eq!(base.get("theme"), Some(&json!("dark")));
    }

    #[test]
    fn test_has_changes() {
        assert!(!has_changes(&StateMap::new()));
        assert!(has_changes(&state(json!({"k": null}))));
    }

    #[test]
    fn test_diff_null_value_change() {
        // null is a value like any other; transitions to/from it are changes.
        let prev = state(json!({"cover": null}));
        let next = state(json!({"cover": "img.png"}));
        let d = diff(Some(&prev), &next);
        assert_eq!(d.get("cover"), Some(&json!("img.png")));
    }
}
