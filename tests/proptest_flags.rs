//! Property-based tests using proptest
//!
//! These tests check flag binding and request compilation with randomized
//! inputs against the built-in registry.

use proptest::prelude::*;
use serde_json::{json, Value};

use xbe::error::ValidationError;
use xbe::resource::normalizer::snake_case;
use xbe::resource::{bind, compile, normalize, Action, Invocation, Normalized, Registry, Verb};

fn registry() -> Registry {
    Registry::builtin().expect("built-in registry loads")
}

fn compile_args(resource: &str, action: Action, args: Vec<String>) -> Result<xbe::resource::CompiledRequest, ValidationError> {
    let registry = registry();
    let def = registry.lookup(resource, action).expect("resource exists");
    let invocation = Invocation::new(Verb::for_action(action), resource, action, args);
    let binding = bind(&invocation, def)?;
    Ok(compile(def, action, &binding))
}

/// Generate a list filter flag with a valid value for cost-indexes
fn arb_cost_index_filter() -> impl Strategy<Value = (String, String)> {
    prop_oneof![
        "[0-9]{1,6}".prop_map(|v| ("broker".to_string(), v)),
        "[A-Za-z][A-Za-z0-9 ]{0,20}".prop_map(|v| ("name".to_string(), v)),
        any::<bool>().prop_map(|v| ("is-expired".to_string(), v.to_string())),
        Just(("created-at-min".to_string(), "2025-01-01T00:00:00Z".to_string())),
        Just(("updated-at-max".to_string(), "2025-12-31T23:59:59Z".to_string())),
    ]
}

proptest! {
    #[test]
    fn test_string_attribute_reaches_body_unchanged(value in "[A-Za-z0-9][^\\x00-\\x1f]{0,63}") {
        let request = compile_args(
            "cost-indexes",
            Action::Create,
            vec![format!("--name={value}")],
        ).unwrap();

        let body = request.body.unwrap();
        prop_assert_eq!(&body["data"]["attributes"]["name"], &Value::String(value));
        prop_assert_eq!(&body["data"]["type"], "cost-indexes");
    }

    #[test]
    fn test_limit_becomes_page_limit(limit in 1u32..10_000) {
        let request = compile_args(
            "cost-indexes",
            Action::List,
            vec!["--limit".to_string(), limit.to_string()],
        ).unwrap();

        prop_assert_eq!(
            request.query,
            vec![("page[limit]".to_string(), limit.to_string())]
        );
    }

    #[test]
    fn test_boolean_filter_spellings_normalize(
        spelling in prop_oneof![
            Just(("1", true)), Just(("t", true)), Just(("T", true)),
            Just(("true", true)), Just(("TRUE", true)), Just(("True", true)),
            Just(("0", false)), Just(("f", false)), Just(("F", false)),
            Just(("false", false)), Just(("FALSE", false)), Just(("False", false)),
        ]
    ) {
        let (raw, expected) = spelling;
        let request = compile_args(
            "cost-indexes",
            Action::List,
            vec![format!("--is-expired={raw}")],
        ).unwrap();

        prop_assert_eq!(
            request.query,
            vec![("filter[is-expired]".to_string(), expected.to_string())]
        );
    }

    #[test]
    fn test_unknown_flags_are_rejected(suffix in "[a-z]{1,12}", value in "[a-z0-9]{1,8}") {
        let flag = format!("zz-{suffix}");
        let err = compile_args(
            "cost-indexes",
            Action::List,
            vec![format!("--{flag}"), value],
        ).unwrap_err();

        let is_unknown_flag = matches!(err, ValidationError::UnknownFlag { flag: ref f, .. } if *f == flag);
        prop_assert!(is_unknown_flag);
    }

    #[test]
    fn test_query_keys_sorted_regardless_of_flag_order(
        filters in prop::collection::vec(arb_cost_index_filter(), 1..6)
            .prop_shuffle()
    ) {
        let args: Vec<String> = filters
            .iter()
            .flat_map(|(flag, value)| vec![format!("--{flag}"), value.clone()])
            .collect();
        let request = compile_args("cost-indexes", Action::List, args).unwrap();

        let keys: Vec<&str> = request.query.iter().map(|(k, _)| k.as_str()).collect();
        let mut sorted = keys.clone();
        sorted.sort();
        sorted.dedup();
        prop_assert_eq!(keys, sorted);
    }

    #[test]
    fn test_normalized_keys_have_no_dashes(
        keys in prop::collection::btree_set("[a-z]{1,6}(-[a-z]{1,6}){0,3}", 1..8)
    ) {
        let attributes: serde_json::Map<String, Value> = keys
            .iter()
            .map(|k| (k.clone(), json!("v")))
            .collect();
        let document = json!({"data": {"type": "things", "id": "1", "attributes": attributes}});

        let Normalized::One(record) = normalize(&document).unwrap() else {
            panic!("single resource document");
        };
        for key in record.keys() {
            prop_assert!(!key.contains('-'), "key {} still has a dash", key);
        }
        for key in &keys {
            prop_assert!(record.contains_key(&snake_case(key)));
        }
    }

    #[test]
    fn test_boolean_attribute_forms_are_equivalent(
        value in any::<bool>(),
        form in 0usize..3,
    ) {
        let flag_args: Vec<String> = match (form, value) {
            (0, true) => vec!["--is-active".into()],
            (0, false) => vec!["--no-is-active".into()],
            (1, v) => vec![format!("--is-active={v}")],
            (_, v) => vec!["--is-active".into(), v.to_string()],
        };
        let mut args = vec!["7".to_string()];
        args.extend(flag_args);

        let request = compile_args("brokers", Action::Update, args).unwrap();
        let body = request.body.unwrap();
        prop_assert_eq!(&body["data"]["attributes"]["is-active"], &Value::Bool(value));
        prop_assert_eq!(&body["data"]["id"], "7");
    }

    #[test]
    fn test_normalized_list_preserves_order(
        ids in prop::collection::vec("[1-9][0-9]{0,5}", 0..30)
    ) {
        let data: Vec<Value> = ids
            .iter()
            .map(|id| json!({"type": "brokers", "id": id, "attributes": {"company-name": "X"}}))
            .collect();
        let document = json!({ "data": data });

        let Normalized::Many(records) = normalize(&document).unwrap() else {
            panic!("collection document");
        };
        let normalized: Vec<&str> = records
            .iter()
            .map(|r| r["id"].as_str().unwrap_or_default())
            .collect();
        prop_assert_eq!(normalized, ids.iter().map(String::as_str).collect::<Vec<_>>());
    }
}
