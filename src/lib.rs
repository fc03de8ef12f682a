//! Ansible dynamic inventory from Terraform state
//!
//! Reads a Terraform state snapshot and answers the two questions Ansible
//! asks a dynamic inventory script: which groups exist and which hosts they
//! hold (`--list`), and what variables a single host has (`--host`).
//!
//! # Module Structure
//!
//! - [`state`] - State document model and loader, tag decoding
//! - [`inventory`] - Group and host projections
//! - [`output`] - JSON encoding of projection results
//! - [`config`] - Config file, environment and CLI settings
//! - [`remote`] - Optional fetch of the state file from S3
//! - [`error`] - Error types
//!
//! # Example
//!
//! ```
//! use tfstate_inventory::inventory::{project_groups, TagPolicy};
//! use tfstate_inventory::state::load_state;
//!
//! let json = r#"{"modules": [{"resources": {
//!     "aws_instance.web": {"type": "aws_instance", "primary": {"attributes": {
//!         "tags.Group": "web", "tags.Name": "web-1"
//!     }}}
//! }}]}"#;
//! let state = load_state(json.as_bytes())?;
//! let inventory = project_groups(state.as_ref(), "Group", "Name", TagPolicy::Lenient)?;
//! assert_eq!(inventory["web"].hosts, vec!["web-1"]);
//! # Ok::<(), tfstate_inventory::error::InventoryError>(())
//! ```

pub mod config;
pub mod error;
pub mod inventory;
pub mod output;
pub mod remote;
pub mod state;

pub use error::{InventoryError, Result};
