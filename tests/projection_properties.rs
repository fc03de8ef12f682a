//! Property-based tests using proptest
//!
//! These tests generate random states of tagged instances and check the
//! inventory projections against straightforward reference computations.

use proptest::prelude::*;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use tfstate_inventory::inventory::{project_groups, project_host, TagPolicy};
use tfstate_inventory::state::tags::{decode_tags, HostTags, NETWORK_FIELDS};
use tfstate_inventory::state::{load_state, StateDocument};

/// One generated instance: optional group, optional name, extra tags
#[derive(Debug, Clone)]
struct GenInstance {
    kind: &'static str,
    group: Option<String>,
    name: Option<String>,
    extra: BTreeMap<String, String>,
}

impl GenInstance {
    fn to_json(&self) -> Value {
        let mut attributes = serde_json::Map::new();
        let mut count = self.extra.len();
        if let Some(group) = &self.group {
            attributes.insert("tags.Group".into(), json!(group));
            count += 1;
        }
        if let Some(name) = &self.name {
            attributes.insert("tags.Name".into(), json!(name));
            count += 1;
        }
        for (k, v) in &self.extra {
            attributes.insert(format!("tags.{}", k), json!(v));
        }
        attributes.insert("tags.#".into(), json!(count.to_string()));
        attributes.insert("private_ip".into(), json!("10.0.0.1"));

        json!({"type": self.kind, "primary": {"attributes": attributes}})
    }
}

fn arb_instance() -> impl Strategy<Value = GenInstance> {
    (
        prop_oneof![4 => Just("aws_instance"), 1 => Just("aws_ebs_volume")],
        prop::option::weighted(0.9, prop_oneof!["web", "db", "cache", "[a-z]{1,8}"]),
        prop::option::weighted(0.9, "[a-z][a-z0-9-]{0,10}"),
        prop::collection::btree_map("Extra[A-Z][a-z]{0,5}", "[a-z0-9]{0,8}", 0..4),
    )
        .prop_map(|(kind, group, name, extra)| GenInstance {
            kind,
            group,
            name,
            extra,
        })
}

/// Instances split across one to three modules
fn arb_modules() -> impl Strategy<Value = Vec<Vec<GenInstance>>> {
    prop::collection::vec(prop::collection::vec(arb_instance(), 0..8), 1..4)
}

fn build_state(modules: &[Vec<GenInstance>]) -> StateDocument {
    let doc = json!({
        "version": 3,
        "modules": modules
            .iter()
            .map(|resources| json!({
                "path": ["root"],
                "resources": resources.iter().map(GenInstance::to_json).collect::<Vec<_>>()
            }))
            .collect::<Vec<_>>()
    });
    load_state(doc.to_string().as_bytes())
        .expect("valid state")
        .expect("non-null state")
}

proptest! {
    /// Every fully tagged instance lands in its group, in document order
    #[test]
    fn groups_match_reference(modules in arb_modules()) {
        let state = build_state(&modules);
        let inventory = project_groups(Some(&state), "Group", "Name", TagPolicy::Lenient).unwrap();

        let mut expected: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for inst in modules.iter().flatten() {
            if inst.kind != "aws_instance" {
                continue;
            }
            if let (Some(group), Some(name)) = (&inst.group, &inst.name) {
                expected.entry(group.clone()).or_default().push(name.clone());
            }
        }

        prop_assert_eq!(inventory.len(), expected.len());
        for (group, hosts) in &expected {
            prop_assert_eq!(&inventory[group].hosts, hosts);
            prop_assert!(inventory[group].vars.is_empty());
        }
    }

    /// Strict mode either agrees with lenient mode or fails outright
    #[test]
    fn strict_agrees_or_fails(modules in arb_modules()) {
        let state = build_state(&modules);
        let lenient = project_groups(Some(&state), "Group", "Name", TagPolicy::Lenient).unwrap();
        let untagged = modules
            .iter()
            .flatten()
            .any(|i| i.kind == "aws_instance" && (i.group.is_none() || i.name.is_none()));

        match project_groups(Some(&state), "Group", "Name", TagPolicy::Strict) {
            Ok(strict) => {
                prop_assert!(!untagged);
                prop_assert_eq!(strict, lenient);
            }
            Err(_) => prop_assert!(untagged),
        }
    }

    /// Host lookup is repeatable byte for byte
    #[test]
    fn host_projection_is_idempotent(modules in arb_modules(), pick in any::<prop::sample::Index>()) {
        let state = build_state(&modules);
        let names: Vec<&String> = modules.iter().flatten().filter_map(|i| i.name.as_ref()).collect();
        let name = if names.is_empty() { "absent".to_string() } else { pick.get(&names).to_string() };

        let first = serde_json::to_vec(&project_host(Some(&state), &name, "Name", TagPolicy::Lenient).unwrap()).unwrap();
        let second = serde_json::to_vec(&project_host(Some(&state), &name, "Name", TagPolicy::Lenient).unwrap()).unwrap();
        prop_assert_eq!(first, second);
    }

    /// Host lookup returns the first instance in document order with that name
    #[test]
    fn host_projection_first_match(modules in arb_modules()) {
        let state = build_state(&modules);
        let instances: Vec<&GenInstance> = modules
            .iter()
            .flatten()
            .filter(|i| i.kind == "aws_instance")
            .collect();

        for inst in &instances {
            let Some(name) = &inst.name else { continue };
            let first = instances
                .iter()
                .find(|i| i.name.as_ref() == Some(name))
                .unwrap();

            let host = project_host(Some(&state), name, "Name", TagPolicy::Lenient).unwrap();
            prop_assert_eq!(host.get("Name"), Some(name.as_str()));
            prop_assert_eq!(host.get("Group"), first.group.as_deref());
            for (k, v) in &first.extra {
                prop_assert_eq!(host.get(k), Some(v.as_str()));
            }
        }
    }

    /// Decoded tags never contain the count marker and always carry network fields
    #[test]
    fn decoded_tags_shape(
        tags in prop::collection::btree_map("[A-Za-z][A-Za-z0-9_]{0,8}", "[a-z0-9]{0,8}", 1..6)
    ) {
        let mut attributes: std::collections::HashMap<String, String> = tags
            .iter()
            .map(|(k, v)| (format!("tags.{}", k), v.clone()))
            .collect();
        attributes.insert("tags.#".into(), tags.len().to_string());

        let decoded = decode_tags(&attributes);
        let HostTags::Tags(map) = &decoded else {
            return Err(TestCaseError::fail("expected tags"));
        };

        prop_assert!(!map.contains_key("#"));
        for field in NETWORK_FIELDS {
            prop_assert!(map.contains_key(field));
        }
        for (k, v) in &tags {
            if !NETWORK_FIELDS.contains(&k.as_str()) {
                prop_assert_eq!(map.get(k), Some(v));
            }
        }
    }
}

#[test]
fn no_instances_yield_empty_results() {
    let state = build_state(&[vec![GenInstance {
        kind: "aws_ebs_volume",
        group: Some("web".into()),
        name: Some("vol".into()),
        extra: BTreeMap::new(),
    }]]);

    let inventory = project_groups(Some(&state), "Group", "Name", TagPolicy::Strict).unwrap();
    assert!(inventory.is_empty());

    let host = project_host(Some(&state), "vol", "Name", TagPolicy::Strict).unwrap();
    assert!(host.is_empty());
}
