use crate::environment::{Environment, RuntimeMode};
use atlassian::CredentialSet;
use serde::Deserialize;
use std::fmt;
use std::sync::Arc;

/// One of the five values a `CredentialSet` needs, in declaration order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CredentialField {
    Username,
    ApiKey,
    InstanceUrl,
    ConfluenceSpace,
    ConfluenceParent,
}

impl CredentialField {
    pub const ALL: [CredentialField; 5] = [
        CredentialField::Username,
        CredentialField::ApiKey,
        CredentialField::InstanceUrl,
        CredentialField::ConfluenceSpace,
        CredentialField::ConfluenceParent,
    ];

    /// Name of the field in the request `atlassian_config` object.
    pub const fn wire_name(self) -> &'static str {
        match self {
            CredentialField::Username => "username",
            CredentialField::ApiKey => "api_key",
            CredentialField::InstanceUrl => "instance_url",
            CredentialField::ConfluenceSpace => "confluence_space",
            CredentialField::ConfluenceParent => "confluence_parent",
        }
    }

    /// Environment variables consulted in local mode, primary first.
    pub const fn env_vars(self) -> &'static [&'static str] {
        match self {
            CredentialField::Username => &["ATLASSIAN_USERNAME"],
            CredentialField::ApiKey => &["ATLASSIAN_API_KEY"],
            CredentialField::InstanceUrl => &["ATLASSIAN_INSTANCE_URL", "ATLASSIAN_URL"],
            CredentialField::ConfluenceSpace => &["CONFLUENCE_SPACE"],
            CredentialField::ConfluenceParent => &["CONFLUENCE_PARENT"],
        }
    }

    pub fn required_fields() -> Vec<&'static str> {
        Self::ALL.iter().map(|f| f.wire_name()).collect()
    }
}

/// Credentials as supplied in a request body. Any field may be absent.
#[derive(Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PartialCredentials {
    pub username: Option<String>,
    pub api_key: Option<String>,
    pub instance_url: Option<String>,
    pub confluence_space: Option<String>,
    pub confluence_parent: Option<String>,
}

impl PartialCredentials {
    fn get(&self, field: CredentialField) -> Option<&str> {
        let value = match field {
            CredentialField::Username => &self.username,
            CredentialField::ApiKey => &self.api_key,
            CredentialField::InstanceUrl => &self.instance_url,
            CredentialField::ConfluenceSpace => &self.confluence_space,
            CredentialField::ConfluenceParent => &self.confluence_parent,
        };
        value.as_deref()
    }
}

/// Request values that resolve to exactly `creds` in either mode.
impl From<&CredentialSet> for PartialCredentials {
    fn from(creds: &CredentialSet) -> Self {
        PartialCredentials {
            username: Some(creds.username.clone()),
            api_key: Some(creds.api_key.clone()),
            instance_url: Some(creds.instance_url.clone()),
            confluence_space: Some(creds.wiki_space.clone()),
            confluence_parent: Some(creds.wiki_parent_page_id.clone()),
        }
    }
}

impl fmt::Debug for PartialCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PartialCredentials")
            .field("username", &self.username)
            .field("api_key", &self.api_key.as_ref().map(|_| "********"))
            .field("instance_url", &self.instance_url)
            .field("confluence_space", &self.confluence_space)
            .field("confluence_parent", &self.confluence_parent)
            .finish()
    }
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
#[error("{}", self.message())]
pub struct MissingCredentials {
    pub missing: Vec<CredentialField>,
    pub mode: RuntimeMode,
}

impl MissingCredentials {
    pub fn missing_names(&self) -> Vec<&'static str> {
        self.missing.iter().map(|f| f.wire_name()).collect()
    }

    pub fn message(&self) -> String {
        let guidance = match self.mode {
            RuntimeMode::Local => {
                "For local development, provide values in request body or set environment variables in local.settings.json"
            }
            RuntimeMode::Hosted => {
                "Please provide all required fields in the atlassian_config object"
            }
        };
        format!(
            "Missing required Atlassian configuration fields: {}. {}",
            self.missing_names().join(", "),
            guidance
        )
    }

    pub fn local_development(&self) -> bool {
        self.mode.is_local()
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

/// Builds a complete `CredentialSet` from request values, falling back to the
/// environment only in local mode.
#[derive(Clone)]
pub struct ConfigResolver {
    env: Arc<dyn Environment>,
}

impl ConfigResolver {
    pub fn new(env: Arc<dyn Environment>) -> Self {
        ConfigResolver { env }
    }

    fn lookup(&self, partial: &PartialCredentials, field: CredentialField, mode: RuntimeMode) -> Option<String> {
        if let Some(value) = non_blank(partial.get(field)) {
            return Some(value.to_string());
        }
        if mode != RuntimeMode::Local {
            return None;
        }
        field
            .env_vars()
            .iter()
            .find_map(|name| self.env.var(name).filter(|v| !v.trim().is_empty()))
    }

    pub fn resolve(
        &self,
        partial: &PartialCredentials,
        mode: RuntimeMode,
    ) -> Result<CredentialSet, MissingCredentials> {
        let username = self.lookup(partial, CredentialField::Username, mode);
        let api_key = self.lookup(partial, CredentialField::ApiKey, mode);
        let instance_url = self.lookup(partial, CredentialField::InstanceUrl, mode);
        let wiki_space = self.lookup(partial, CredentialField::ConfluenceSpace, mode);
        let wiki_parent_page_id = self.lookup(partial, CredentialField::ConfluenceParent, mode);

        match (username, api_key, instance_url, wiki_space, wiki_parent_page_id) {
            (
                Some(username),
                Some(api_key),
                Some(instance_url),
                Some(wiki_space),
                Some(wiki_parent_page_id),
            ) => Ok(CredentialSet {
                username,
                api_key,
                instance_url,
                wiki_space,
                wiki_parent_page_id,
            }),
            (username, api_key, instance_url, wiki_space, wiki_parent_page_id) => {
                let present = [
                    username.is_some(),
                    api_key.is_some(),
                    instance_url.is_some(),
                    wiki_space.is_some(),
                    wiki_parent_page_id.is_some(),
                ];
                let missing = CredentialField::ALL
                    .into_iter()
                    .zip(present)
                    .filter_map(|(field, present)| (!present).then_some(field))
                    .collect();

                let err = MissingCredentials { missing, mode };
                tracing::warn!(missing = ?err.missing_names(), ?mode, "Incomplete Atlassian configuration");
                Err(err)
            }
        }
    }
}
