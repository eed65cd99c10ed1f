//! # Selector Matching Tests
//!
//! Gateway selection of users through the public `matches` entry point:
//! - Namespace scoping defaults
//! - Namespace label selectors against a `NamespaceIndex`
//! - Set-based expressions
//! - Malformed selectors

mod common;

use auth_gateway_controller::cluster::NamespaceIndex;
use auth_gateway_controller::controller::selector::{matches, SelectorError};
use common::{gateway, label_map, selector, user};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, LabelSelectorRequirement};

fn expressions(requirements: &[(&str, &str, Vec<&str>)]) -> LabelSelector {
    LabelSelector {
        match_labels: None,
        match_expressions: Some(
            requirements
                .iter()
                .map(|(key, operator, values)| LabelSelectorRequirement {
                    key: (*key).to_string(),
                    operator: (*operator).to_string(),
                    values: (!values.is_empty())
                        .then(|| values.iter().map(|v| (*v).to_string()).collect()),
                })
                .collect(),
        ),
    }
}

fn index() -> NamespaceIndex {
    [
        ("team-a", label_map(&[("tenant", "a"), ("env", "prod")])),
        ("team-b", label_map(&[("tenant", "b"), ("env", "dev")])),
        ("shared", label_map(&[])),
    ]
    .into_iter()
    .collect()
}

#[test]
fn test_gateway_without_selectors_selects_everyone() {
    let g = gateway("gw", "all", None, None);
    for (namespace, labels) in [("team-a", vec![("app", "x")]), ("shared", vec![])] {
        let u = user(namespace, "u", &labels);
        assert!(matches(&u, &g, &index()).unwrap());
    }
}

#[test]
fn test_user_selector_alone_stays_in_gateway_namespace() {
    let g = gateway("team-a", "g", Some(selector(&[("app", "foo")])), None);

    assert!(matches(&user("team-a", "u1", &[("app", "foo")]), &g, &index()).unwrap());
    assert!(!matches(&user("team-b", "u2", &[("app", "foo")]), &g, &index()).unwrap());
    assert!(!matches(&user("team-a", "u3", &[("app", "bar")]), &g, &index()).unwrap());
}

#[test]
fn test_empty_namespace_selector_means_all_namespaces() {
    let g = gateway(
        "gw",
        "g",
        Some(selector(&[("app", "foo")])),
        Some(LabelSelector::default()),
    );

    assert!(matches(&user("team-a", "u1", &[("app", "foo")]), &g, &index()).unwrap());
    assert!(matches(&user("team-b", "u2", &[("app", "foo")]), &g, &index()).unwrap());
}

#[test]
fn test_namespace_label_selector() {
    let g = gateway("gw", "g", None, Some(selector(&[("env", "prod")])));

    assert!(matches(&user("team-a", "u1", &[]), &g, &index()).unwrap());
    assert!(!matches(&user("team-b", "u2", &[]), &g, &index()).unwrap());
    // Unknown namespaces carry no labels
    assert!(!matches(&user("unlisted", "u3", &[]), &g, &index()).unwrap());
}

#[test]
fn test_set_based_expressions() {
    let g = gateway(
        "gw",
        "g",
        Some(expressions(&[
            ("tier", "In", vec!["gold", "silver"]),
            ("blocked", "DoesNotExist", vec![]),
            ("region", "NotIn", vec!["eu"]),
        ])),
        Some(LabelSelector::default()),
    );

    assert!(matches(&user("team-a", "u1", &[("tier", "gold")]), &g, &index()).unwrap());
    assert!(matches(
        &user("team-a", "u2", &[("tier", "silver"), ("region", "us")]),
        &g,
        &index()
    )
    .unwrap());
    assert!(!matches(&user("team-a", "u3", &[("tier", "bronze")]), &g, &index()).unwrap());
    assert!(!matches(
        &user("team-a", "u4", &[("tier", "gold"), ("blocked", "")]),
        &g,
        &index()
    )
    .unwrap());
    assert!(!matches(
        &user("team-a", "u5", &[("tier", "gold"), ("region", "eu")]),
        &g,
        &index()
    )
    .unwrap());
}

#[test]
fn test_matching_is_deterministic() {
    let g = gateway(
        "gw",
        "g",
        Some(expressions(&[("tier", "Exists", vec![])])),
        Some(selector(&[("tenant", "a")])),
    );
    let u = user("team-a", "u1", &[("tier", "gold")]);
    let namespaces = index();

    let first = matches(&u, &g, &namespaces).unwrap();
    for _ in 0..10 {
        assert_eq!(matches(&u, &g, &namespaces).unwrap(), first);
    }
    assert!(first);
}

#[test]
fn test_malformed_selectors_are_errors() {
    let u = user("team-a", "u1", &[("tier", "gold")]);
    let namespaces = index();

    let unknown_operator = gateway("gw", "g", Some(expressions(&[("tier", "Like", vec!["g"])])), None);
    assert!(matches!(
        matches(&u, &unknown_operator, &namespaces),
        Err(SelectorError::InvalidOperator { .. })
    ));

    let in_without_values = gateway("gw", "g", Some(expressions(&[("tier", "In", vec![])])), None);
    assert!(matches!(
        matches(&u, &in_without_values, &namespaces),
        Err(SelectorError::MissingValues { .. })
    ));

    let exists_with_values =
        gateway("gw", "g", Some(expressions(&[("tier", "Exists", vec!["gold"])])), None);
    assert!(matches!(
        matches(&u, &exists_with_values, &namespaces),
        Err(SelectorError::UnexpectedValues { .. })
    ));

    let bad_key = gateway("gw", "g", None, Some(selector(&[("-team", "a")])));
    assert!(matches!(
        matches(&u, &bad_key, &namespaces),
        Err(SelectorError::InvalidKey { .. })
    ));

    let bad_value = gateway("gw", "g", Some(selector(&[("tier", "gold!")])), None);
    assert!(matches!(
        matches(&u, &bad_value, &namespaces),
        Err(SelectorError::InvalidValue { .. })
    ));
}
