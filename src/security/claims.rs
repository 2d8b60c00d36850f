//! Typed token claims.
//!
//! Roles and menus arrive as loosely shaped JSON. They are decoded into
//! closed types right after signature verification so nothing downstream
//! inspects raw JSON. Entries of an unexpected shape are skipped with a
//! warning; they never fail an otherwise valid token.

use serde::{Deserialize, Serialize};
use serde_json::Value;

const EMPTY_MENUS: &str = "[]";

/// Registered and private claims the gateway reads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    #[serde(default)]
    pub sub: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub roles: Option<Value>,
    #[serde(default)]
    pub menus: Option<Value>,
    pub exp: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nbf: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<u64>,
}

/// One entry of the `roles` claim: a bare name or an object with `name`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RoleClaim {
    Name(String),
    Named { name: String },
}

impl RoleClaim {
    pub fn name(&self) -> &str {
        match self {
            RoleClaim::Name(name) => name,
            RoleClaim::Named { name } => name,
        }
    }
}

/// One authorization grant. Blank fields are treated as absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Menu {
    #[serde(default, deserialize_with = "non_blank")]
    pub path: Option<String>,
    #[serde(default, deserialize_with = "non_blank")]
    pub url: Option<String>,
    #[serde(default, deserialize_with = "non_blank")]
    pub permission: Option<String>,
}

impl Menu {
    pub fn with_path(path: impl Into<String>) -> Self {
        Self {
            path: Some(path.into()),
            ..Self::default()
        }
    }

    /// Present candidate strings, in `path`, `url`, `permission` order.
    pub fn candidates(&self) -> impl Iterator<Item = &str> {
        [&self.path, &self.url, &self.permission]
            .into_iter()
            .filter_map(|field| field.as_deref())
    }
}

fn non_blank<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.trim().is_empty()))
}

/// Caller identity derived from verified claims.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Identity {
    pub user_id: String,
    pub username: String,
    pub roles: Vec<String>,
    pub menus: Vec<Menu>,
    /// Canonical JSON text of the `menus` claim, empty when absent.
    pub menus_json: String,
}

impl Identity {
    /// Roles joined for the `X-User-Roles` header.
    pub fn joined_roles(&self) -> String {
        self.roles.join(",")
    }
}

impl From<Claims> for Identity {
    fn from(claims: Claims) -> Self {
        let roles = decode_roles(claims.roles.as_ref());

        let (menus, menus_json) = match claims.menus {
            None | Some(Value::Null) => (Vec::new(), String::new()),
            Some(Value::Array(ref entries)) if entries.is_empty() => (Vec::new(), String::new()),
            Some(Value::Array(ref entries)) => (decode_menus(entries), encode_menus(entries)),
            Some(other) => {
                tracing::warn!(kind = json_kind(&other), "Menus claim is not a list, treating as empty");
                (Vec::new(), EMPTY_MENUS.to_string())
            }
        };

        Self {
            user_id: claims.sub.unwrap_or_default(),
            username: claims.username.unwrap_or_default(),
            roles,
            menus,
            menus_json,
        }
    }
}

fn decode_roles(raw: Option<&Value>) -> Vec<String> {
    match raw {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::String(name)) => vec![name.clone()],
        Some(Value::Array(entries)) => entries
            .iter()
            .filter_map(|entry| match RoleClaim::deserialize(entry) {
                Ok(role) => Some(role.name().to_string()),
                Err(_) => {
                    tracing::warn!(kind = json_kind(entry), "Skipping role entry of unexpected shape");
                    None
                }
            })
            .collect(),
        Some(other) => {
            tracing::warn!(kind = json_kind(other), "Roles claim is not a list, treating as empty");
            Vec::new()
        }
    }
}

fn decode_menus(entries: &[Value]) -> Vec<Menu> {
    entries
        .iter()
        .filter_map(|entry| match Menu::deserialize(entry) {
            Ok(menu) => Some(menu),
            Err(e) => {
                tracing::warn!(error = %e, "Skipping menu entry of unexpected shape");
                None
            }
        })
        .collect()
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn encode_menus(raw: &[Value]) -> String {
    match serde_json::to_string(raw) {
        Ok(json) => json,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to serialize menus claim");
            EMPTY_MENUS.to_string()
        }
    }
}
