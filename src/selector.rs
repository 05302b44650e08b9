//! Label selector strings for list queries

use std::collections::BTreeMap;

use crate::{Error, Result};

/// Render a label mapping as an equality-based selector, e.g. `app=api,env=prod`.
///
/// Keys are emitted in sorted order so the same mapping always yields the same
/// query. An empty mapping is rejected: an unbounded selector would match, and
/// then rewrite, every resource in the namespace.
pub fn label_selector(labels: &BTreeMap<String, String>) -> Result<String> {
    if labels.is_empty() {
        return Err(Error::validation(
            "label selector must contain at least one label",
        ));
    }

    if let Some(key) = labels.keys().find(|k| k.trim().is_empty()) {
        return Err(Error::validation(format!(
            "label selector contains an empty key (value for {:?})",
            labels.get(key)
        )));
    }

    Ok(labels
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(","))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn sorts_keys() {
        let selector = label_selector(&labels(&[
            ("environment", "pipeline"),
            ("app", "api"),
            ("build", "24"),
        ]))
        .unwrap();
        assert_eq!(selector, "app=api,build=24,environment=pipeline");
    }

    #[test]
    fn insertion_order_does_not_matter() {
        let a = labels(&[("b", "2"), ("a", "1")]);
        let b = labels(&[("a", "1"), ("b", "2")]);
        assert_eq!(label_selector(&a).unwrap(), label_selector(&b).unwrap());
    }

    #[test]
    fn empty_mapping_is_rejected() {
        let err = label_selector(&BTreeMap::new()).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn empty_key_is_rejected() {
        let err = label_selector(&labels(&[("", "x")])).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }
}
