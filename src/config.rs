//! Configuration Management
//!
//! Loads the optional JSON config file and resolves the effective settings
//! for one run. Each setting is taken from the first source that has it:
//! command line, environment, config file, built-in default.

use crate::error::{InventoryError, Result};
use crate::inventory::{TagPolicy, DEFAULT_GROUP_TAG, DEFAULT_MEMBER_TAG};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// State file used when nothing else is configured
pub const DEFAULT_STATE_FILE: &str = "./terraform.tfstate";

/// Environment variable naming the config file
pub const ENV_CONFIG: &str = "TF_STATE_CONFIG";
/// Environment variable naming the state file
pub const ENV_STATE_FILE: &str = "TF_STATE";
/// Environment variable naming the group tag
pub const ENV_GROUP_TAG: &str = "TF_STATE_GROUP_TAG";
/// Environment variable naming the member tag
pub const ENV_MEMBER_TAG: &str = "TF_STATE_INSTANCE_TAG";
/// Environment variable selecting the tag policy
pub const ENV_TAG_POLICY: &str = "TF_STATE_TAG_POLICY";
/// Environment variable holding the AWS region for remote fetches
pub const ENV_REGION: &str = "AWS_DEFAULT_REGION";
/// Environment variables holding the AWS credentials for remote fetches
pub const ENV_ACCESS_KEY_ID: &str = "AWS_ACCESS_KEY_ID";
pub const ENV_SECRET_ACCESS_KEY: &str = "AWS_SECRET_ACCESS_KEY";
pub const ENV_SESSION_TOKEN: &str = "AWS_SESSION_TOKEN";

/// Keys recognized in the `options` table of the config file
const OPTION_GROUP_TAG: &str = "group_tag";
const OPTION_MEMBER_TAG: &str = "instance_tag";
const OPTION_TAG_POLICY: &str = "tag_policy";

/// Config file contents
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Where to read the state document
    #[serde(default)]
    pub state_file: Option<PathBuf>,
    /// Remote object to fetch into `state_file` before loading
    #[serde(default)]
    pub s3: Option<S3Config>,
    /// Free-form options: `group_tag`, `instance_tag`, `tag_policy`
    #[serde(default)]
    pub options: HashMap<String, String>,
}

/// Remote state location
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct S3Config {
    pub bucket_name: String,
    pub bucket_key: String,
    #[serde(default)]
    pub region: Option<String>,
    /// Path-style endpoint for S3-compatible stores
    #[serde(default)]
    pub endpoint: Option<String>,
}

impl Config {
    /// Default config file path
    fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("tfstate-inventory").join("config.json"))
    }

    /// Load configuration
    ///
    /// An explicitly named file must exist and parse. The default location is
    /// optional; if it is unreadable the built-in defaults are used.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }

        let Some(path) = Self::config_path() else {
            return Ok(Self::default());
        };

        if !path.exists() {
            return Ok(Self::default());
        }

        match Self::from_file(&path) {
            Ok(config) => Ok(config),
            Err(e) => {
                tracing::warn!("Ignoring config file {:?}: {}", path, e);
                Ok(Self::default())
            }
        }
    }

    /// Read and parse a config file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| InventoryError::Config(format!("cannot read {}: {}", path.display(), e)))?;

        let config = serde_json::from_str(&content)
            .map_err(|e| InventoryError::Config(format!("cannot parse {}: {}", path.display(), e)))?;

        tracing::debug!("Loaded config from {:?}", path);
        Ok(config)
    }

    fn option(&self, key: &str) -> Option<String> {
        self.options.get(key).filter(|v| !v.is_empty()).cloned()
    }
}

/// Values given on the command line
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub state_file: Option<PathBuf>,
    pub group_tag: Option<String>,
    pub member_tag: Option<String>,
    pub strict: bool,
}

/// Remote source with its region and credentials resolved
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteSource {
    pub bucket: String,
    pub key: String,
    pub region: String,
    pub endpoint: Option<String>,
    /// `None` sends the request unsigned
    pub credentials: Option<AwsCredentials>,
}

/// Static AWS credentials used to sign the fetch
#[derive(Clone, PartialEq, Eq)]
pub struct AwsCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

impl std::fmt::Debug for AwsCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AwsCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"** redacted **")
            .field("session_token", &self.session_token.as_ref().map(|_| "** redacted **"))
            .finish()
    }
}

/// Effective settings for one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub state_file: PathBuf,
    pub group_tag: String,
    pub member_tag: String,
    pub policy: TagPolicy,
    pub remote: Option<RemoteSource>,
}

impl Settings {
    /// Resolve settings from overrides, environment and config file
    ///
    /// `env` looks up an environment variable; empty values count as unset.
    pub fn resolve<F>(config: &Config, overrides: &Overrides, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = |name: &str| env(name).filter(|v| !v.is_empty());

        let state_file = overrides
            .state_file
            .clone()
            .or_else(|| env(ENV_STATE_FILE).map(PathBuf::from))
            .or_else(|| config.state_file.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_STATE_FILE));

        let group_tag = overrides
            .group_tag
            .clone()
            .or_else(|| env(ENV_GROUP_TAG))
            .or_else(|| config.option(OPTION_GROUP_TAG))
            .unwrap_or_else(|| DEFAULT_GROUP_TAG.to_string());

        let member_tag = overrides
            .member_tag
            .clone()
            .or_else(|| env(ENV_MEMBER_TAG))
            .or_else(|| config.option(OPTION_MEMBER_TAG))
            .unwrap_or_else(|| DEFAULT_MEMBER_TAG.to_string());

        let policy = if overrides.strict {
            TagPolicy::Strict
        } else {
            match env(ENV_TAG_POLICY).or_else(|| config.option(OPTION_TAG_POLICY)) {
                Some(value) => TagPolicy::parse(&value).ok_or_else(|| {
                    InventoryError::Config(format!(
                        "unknown tag policy '{}', expected 'strict' or 'lenient'",
                        value
                    ))
                })?,
                None => TagPolicy::default(),
            }
        };

        let remote = match &config.s3 {
            Some(s3) => Some(resolve_remote(s3, &env)?),
            None => None,
        };

        Ok(Self {
            state_file,
            group_tag,
            member_tag,
            policy,
            remote,
        })
    }
}

fn resolve_remote<F>(s3: &S3Config, env: &F) -> Result<RemoteSource>
where
    F: Fn(&str) -> Option<String>,
{
    if s3.bucket_name.is_empty() || s3.bucket_key.is_empty() {
        return Err(InventoryError::Config(
            "s3 requires both bucket_name and bucket_key".to_string(),
        ));
    }

    let region = s3
        .region
        .clone()
        .filter(|r| !r.is_empty())
        .or_else(|| env(ENV_REGION))
        .ok_or_else(|| {
            InventoryError::Config(format!(
                "AWS region is required in environment variable: {}",
                ENV_REGION
            ))
        })?;

    let credentials = match (env(ENV_ACCESS_KEY_ID), env(ENV_SECRET_ACCESS_KEY)) {
        (Some(access_key_id), Some(secret_access_key)) => Some(AwsCredentials {
            access_key_id,
            secret_access_key,
            session_token: env(ENV_SESSION_TOKEN),
        }),
        (None, None) => None,
        _ => {
            return Err(InventoryError::Config(format!(
                "{} and {} must be set together",
                ENV_ACCESS_KEY_ID, ENV_SECRET_ACCESS_KEY
            )))
        }
    };

    Ok(RemoteSource {
        bucket: s3.bucket_name.clone(),
        key: s3.bucket_key.clone(),
        region,
        endpoint: s3.endpoint.clone().filter(|e| !e.is_empty()),
        credentials,
    })
}

/// Config file to load: the explicit path, else `TF_STATE_CONFIG`
///
/// `None` means the default location under the user config dir.
pub fn config_file_path<F>(explicit: Option<&Path>, env: F) -> Option<PathBuf>
where
    F: Fn(&str) -> Option<String>,
{
    explicit
        .map(Path::to_path_buf)
        .or_else(|| env(ENV_CONFIG).filter(|p| !p.is_empty()).map(PathBuf::from))
}

/// Process environment lookup for [`Settings::resolve`]
pub fn process_env(name: &str) -> Option<String> {
    std::env::var(name).ok()
}
