//! Terraform state model
//!
//! Deserializes a Terraform state snapshot into an in-memory tree of
//! modules and resources. Only the parts needed for inventory projection
//! are modelled; unknown fields are ignored.
//!
//! # Module Structure
//!
//! - [`tags`] - Decodes the flat `tags.*` attribute encoding into a tag map
//!
//! # Resource layout
//!
//! Terraform writes `resources` as an object keyed by resource address
//! (`"aws_instance.web"`). A plain array of resources is accepted as well.
//! Either way resources keep their document order.

pub mod tags;

use crate::error::Result;
use serde::de::{self, Deserializer, MapAccess, SeqAccess, Visitor};
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::io::Read;
use std::path::Path;

/// Resource kind that inventory projection understands
pub const AWS_INSTANCE: &str = "aws_instance";

/// Root of a state snapshot
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StateDocument {
    #[serde(default)]
    pub version: Option<u64>,
    #[serde(default)]
    pub terraform_version: Option<String>,
    #[serde(default)]
    pub serial: Option<u64>,
    #[serde(default)]
    pub lineage: Option<String>,
    #[serde(default)]
    pub modules: Vec<Module>,
}

impl StateDocument {
    /// Iterate over every resource in document order
    pub fn resources(&self) -> impl Iterator<Item = &Resource> {
        self.modules.iter().flat_map(|m| m.resources.iter())
    }

    /// Iterate over the `aws_instance` resources in document order
    pub fn instances(&self) -> impl Iterator<Item = &Resource> {
        self.resources().filter(|r| r.is_instance())
    }
}

/// A module and the resources it contains
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Module {
    #[serde(default)]
    pub path: Vec<String>,
    #[serde(default, deserialize_with = "deserialize_resources")]
    pub resources: Vec<Resource>,
}

/// A provisioned resource with its flat attribute map
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Resource {
    #[serde(rename = "type", default)]
    pub kind: String,
    /// Key of the resource when the module stores resources by address
    #[serde(skip)]
    pub address: Option<String>,
    #[serde(default)]
    pub primary: Option<InstanceState>,
}

impl Resource {
    /// Whether this resource is an AWS compute instance
    pub fn is_instance(&self) -> bool {
        self.kind == AWS_INSTANCE
    }

    /// Flat attribute map of the primary instance, empty if there is none
    pub fn attributes(&self) -> &HashMap<String, String> {
        static EMPTY: std::sync::OnceLock<HashMap<String, String>> = std::sync::OnceLock::new();
        match &self.primary {
            Some(primary) => &primary.attributes,
            None => EMPTY.get_or_init(HashMap::new),
        }
    }

    /// Direct lookup of `tags.<name>`, independent of the `tags.#` marker
    pub fn tag(&self, name: &str) -> Option<&str> {
        self.attributes()
            .get(&format!("{}{}", tags::TAG_PREFIX, name))
            .map(String::as_str)
    }
}

/// Primary instance state of a resource
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InstanceState {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub attributes: HashMap<String, String>,
}

/// Accept `resources` as either an array or an address-keyed object
fn deserialize_resources<'de, D>(deserializer: D) -> std::result::Result<Vec<Resource>, D::Error>
where
    D: Deserializer<'de>,
{
    struct ResourcesVisitor;

    impl<'de> Visitor<'de> for ResourcesVisitor {
        type Value = Vec<Resource>;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("an array of resources or an object keyed by resource address")
        }

        fn visit_unit<E: de::Error>(self) -> std::result::Result<Self::Value, E> {
            Ok(Vec::new())
        }

        fn visit_seq<A>(self, mut seq: A) -> std::result::Result<Self::Value, A::Error>
        where
            A: SeqAccess<'de>,
        {
            let mut resources = Vec::with_capacity(seq.size_hint().unwrap_or(0));
            while let Some(resource) = seq.next_element::<Resource>()? {
                resources.push(resource);
            }
            Ok(resources)
        }

        fn visit_map<A>(self, mut map: A) -> std::result::Result<Self::Value, A::Error>
        where
            A: MapAccess<'de>,
        {
            let mut resources = Vec::with_capacity(map.size_hint().unwrap_or(0));
            while let Some((address, mut resource)) = map.next_entry::<String, Resource>()? {
                resource.address = Some(address);
                resources.push(resource);
            }
            Ok(resources)
        }
    }

    deserializer.deserialize_any(ResourcesVisitor)
}

/// Decode a state document from a reader
///
/// A `null` document decodes to `None`; callers decide whether that is an
/// error.
pub fn load_state<R: Read>(mut reader: R) -> Result<Option<StateDocument>> {
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf)?;
    let state = serde_json::from_slice(&buf)?;
    Ok(state)
}

/// Open and decode a state file
pub fn load_state_file(path: &Path) -> Result<Option<StateDocument>> {
    let file = std::fs::File::open(path)?;
    load_state(file)
}
