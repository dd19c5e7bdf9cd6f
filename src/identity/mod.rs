//! Attribute normalization for identity-provider profiles
//!
//! Each provider returns a differently shaped profile object; normalization
//! maps it to the canonical [`UserAttributes`] model through a per-provider
//! extractor table. Adding a provider means adding one table entry.
//!
//! Normalization is pure and produces raw attributes only. Role synthesis
//! from provider signals (e.g. Google's hosted-domain claim) belongs to the
//! onboarding flow in `service::auth`, never here.

use serde_json::Value;

use crate::domain::{Provider, UserAttributes};
use crate::error::{AppError, Result};

/// Provider profile reduced to the canonical identity fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedProfile {
    pub subject_id: String,
    pub email: String,
    pub display_name: Option<String>,
    pub attributes: UserAttributes,
}

/// Fields pulled out of a raw profile before validation.
#[derive(Debug, Default)]
struct ProfileFields {
    id: Option<String>,
    email: Option<String>,
    display_name: Option<String>,
    department: Option<String>,
    organization: Option<String>,
    roles: Vec<String>,
}

type FieldExtractor = fn(&Value) -> ProfileFields;

fn extractor_for(provider: Provider) -> FieldExtractor {
    match provider {
        Provider::Azure => extract_azure,
        Provider::Github => extract_github,
        Provider::Google => extract_google,
    }
}

fn str_field(profile: &Value, key: &str) -> Option<String> {
    profile
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Ids may arrive as JSON strings or numbers (GitHub uses numeric ids).
fn id_field(profile: &Value, key: &str) -> Option<String> {
    match profile.get(key) {
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    }
}

fn str_list(profile: &Value, key: &str) -> Vec<String> {
    profile
        .get(key)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn extract_azure(profile: &Value) -> ProfileFields {
    ProfileFields {
        id: id_field(profile, "id"),
        email: str_field(profile, "mail").or_else(|| str_field(profile, "userPrincipalName")),
        display_name: str_field(profile, "displayName"),
        department: str_field(profile, "department"),
        organization: str_field(profile, "companyName"),
        roles: str_list(profile, "roles"),
    }
}

fn extract_github(profile: &Value) -> ProfileFields {
    ProfileFields {
        id: id_field(profile, "id"),
        email: str_field(profile, "email"),
        display_name: str_field(profile, "name").or_else(|| str_field(profile, "login")),
        department: None,
        organization: str_field(profile, "company"),
        // GitHub has no native role concept
        roles: Vec::new(),
    }
}

fn extract_google(profile: &Value) -> ProfileFields {
    ProfileFields {
        id: id_field(profile, "sub").or_else(|| id_field(profile, "id")),
        email: str_field(profile, "email"),
        display_name: str_field(profile, "name"),
        department: None,
        organization: None,
        roles: Vec::new(),
    }
}

/// Normalize a raw provider profile into a canonical identity record.
///
/// Fails only when a required identity field (`id`, `email`) is absent.
pub fn normalize(raw: &Value, provider: Provider) -> Result<NormalizedProfile> {
    let fields = extractor_for(provider)(raw);

    let subject_id = fields.id.ok_or_else(|| missing_field(provider, "id"))?;
    let email = fields.email.ok_or_else(|| missing_field(provider, "email"))?;

    let domain = email
        .split_once('@')
        .map(|(_, d)| d.to_string())
        .unwrap_or_default();

    Ok(NormalizedProfile {
        subject_id,
        email,
        display_name: fields.display_name,
        attributes: UserAttributes {
            domain,
            roles: fields.roles,
            department: fields.department,
            organization: fields.organization,
        },
    })
}

fn missing_field(provider: Provider, field: &str) -> AppError {
    AppError::validation(
        format!("{provider} profile is missing required field `{field}`"),
        Some(field),
    )
}
