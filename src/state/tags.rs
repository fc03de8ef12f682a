//! Tag decoding
//!
//! Terraform flattens the `tags` map of a resource into dotted attribute
//! keys: `tags.Name = "web-1"`, with a sibling count marker `tags.# = "1"`.
//! This module turns that encoding back into a tag map for host output.

use serde::{Serialize, Serializer};
use std::collections::{BTreeMap, HashMap};

/// Prefix of every flattened tag key
pub const TAG_PREFIX: &str = "tags.";

/// Count marker key recording how many tags a resource has
pub const TAG_COUNT_KEY: &str = "tags.#";

/// Network fields copied into every non-empty host result
pub const NETWORK_FIELDS: [&str; 4] = ["private_ip", "private_dns", "public_ip", "public_dns"];

/// Decoded tags of a single host
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum HostTags {
    /// Resource carries no tags (count marker missing or zero)
    #[default]
    Empty,
    /// Tag name to value, plus the network fields
    Tags(BTreeMap<String, String>),
}

impl HostTags {
    pub fn is_empty(&self) -> bool {
        match self {
            HostTags::Empty => true,
            HostTags::Tags(map) => map.is_empty(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        match self {
            HostTags::Empty => None,
            HostTags::Tags(map) => map.get(key).map(String::as_str),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            HostTags::Empty => 0,
            HostTags::Tags(map) => map.len(),
        }
    }
}

/// Both variants serialize as a JSON object, `Empty` as `{}`
impl Serialize for HostTags {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            HostTags::Empty => BTreeMap::<String, String>::new().serialize(serializer),
            HostTags::Tags(map) => map.serialize(serializer),
        }
    }
}

/// Tag name encoded in a flattened key, if the key is a tag entry
///
/// `tags.Name` yields `Name`. Bare `tags`, `tags.` and the `tags.#` count
/// marker yield nothing.
fn tag_name(key: &str) -> Option<&str> {
    match key.strip_prefix(TAG_PREFIX) {
        Some(name) if !name.is_empty() && name != "#" => Some(name),
        _ => None,
    }
}

/// Decode the tags of a resource from its flat attribute map
///
/// A missing `tags.#` marker is treated the same as `tags.# = "0"`: the
/// result is [`HostTags::Empty`] and no network fields are included.
pub fn decode_tags(attributes: &HashMap<String, String>) -> HostTags {
    match attributes.get(TAG_COUNT_KEY).map(String::as_str) {
        None | Some("0") => return HostTags::Empty,
        Some(_) => {}
    }

    let mut tags: BTreeMap<String, String> = attributes
        .iter()
        .filter_map(|(key, value)| tag_name(key).map(|name| (name.to_string(), value.clone())))
        .collect();

    for field in NETWORK_FIELDS {
        let value = attributes.get(field).cloned().unwrap_or_default();
        tags.insert(field.to_string(), value);
    }

    HostTags::Tags(tags)
}
