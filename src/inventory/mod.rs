//! Inventory projection
//!
//! Projects a loaded [`StateDocument`] into the two views an Ansible dynamic
//! inventory script must answer:
//!
//! - [`project_groups`] - `--list`: group name to member hosts
//! - [`project_host`] - `--host <name>`: the tag attributes of one host
//!
//! Both views only consider `aws_instance` resources, read group and member
//! names straight from `tags.<name>` attributes, and share a [`TagPolicy`]
//! that decides what happens to instances lacking those tags.

use crate::error::{InventoryError, Result};
use crate::state::tags::{decode_tags, HostTags};
use crate::state::{Resource, StateDocument, AWS_INSTANCE};
use serde::Serialize;
use std::collections::BTreeMap;

/// Default tag holding the group name
pub const DEFAULT_GROUP_TAG: &str = "Group";

/// Default tag holding the host name
pub const DEFAULT_MEMBER_TAG: &str = "Name";

/// What to do with an instance that lacks the group or member tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TagPolicy {
    /// Skip the instance
    #[default]
    Lenient,
    /// Fail the whole projection
    Strict,
}

impl TagPolicy {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "lenient" => Some(Self::Lenient),
            "strict" => Some(Self::Strict),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Lenient => "lenient",
            Self::Strict => "strict",
        }
    }
}

/// One inventory group
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InventoryGroup {
    pub hosts: Vec<String>,
    pub vars: BTreeMap<String, String>,
}

/// Group name to group
pub type Inventory = BTreeMap<String, InventoryGroup>;

/// Look up a tag on a resource, applying the policy when it is missing
///
/// `Ok(None)` means the resource should be skipped.
fn required_tag<'a>(resource: &'a Resource, tag: &str, policy: TagPolicy) -> Result<Option<&'a str>> {
    match (resource.tag(tag), policy) {
        (Some(value), _) => Ok(Some(value)),
        (None, TagPolicy::Lenient) => Ok(None),
        (None, TagPolicy::Strict) => Err(InventoryError::MissingTag {
            tag: tag.to_string(),
            kind: AWS_INSTANCE.to_string(),
            address: resource.address.clone(),
        }),
    }
}

/// Build the full inventory: every tagged instance under its group
pub fn project_groups(
    state: Option<&StateDocument>,
    group_tag: &str,
    member_tag: &str,
    policy: TagPolicy,
) -> Result<Inventory> {
    let state = state.ok_or(InventoryError::NoState)?;
    let mut inventory = Inventory::new();

    for resource in state.instances() {
        let Some(group) = required_tag(resource, group_tag, policy)? else {
            continue;
        };
        let Some(member) = required_tag(resource, member_tag, policy)? else {
            continue;
        };

        inventory
            .entry(group.to_string())
            .or_default()
            .hosts
            .push(member.to_string());
    }

    Ok(inventory)
}

/// Decoded attributes of the first instance whose member tag is `name`
///
/// Returns [`HostTags::Empty`] when no instance matches.
pub fn project_host(
    state: Option<&StateDocument>,
    name: &str,
    member_tag: &str,
    policy: TagPolicy,
) -> Result<HostTags> {
    let state = state.ok_or(InventoryError::NoState)?;

    for resource in state.instances() {
        let Some(member) = required_tag(resource, member_tag, policy)? else {
            continue;
        };

        if member == name {
            return Ok(decode_tags(resource.attributes()));
        }
    }

    Ok(HostTags::Empty)
}
