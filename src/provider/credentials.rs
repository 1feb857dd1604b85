// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Per-`providerType` secret key schemas (spec §6, "Provider secret keys
//! (per type)"): each backend declares the keys it expects inside the
//! referenced `Secret`'s `data` map, which are required and which are
//! optional, and a validator for each. A secret that is missing a required
//! key, carries an unexpected value for one, or fails its validator is
//! rejected outright rather than passed through to the backend adapter.

use anyhow::{anyhow, Result};
use k8s_openapi::ByteString;
use std::collections::BTreeMap;

/// A single key's validation rule.
#[derive(Clone, Copy)]
pub enum Validator {
    /// Any non-empty UTF-8 value is accepted.
    NonEmpty,
    /// Non-empty and free of leading/trailing whitespace.
    NoTrailingWhitespace,
    /// Non-empty, no trailing whitespace, and at most `max_len` bytes.
    MaxLength(usize),
    /// Must be valid JSON (used for credential blobs like a service account key).
    Json,
    /// Must equal one of a fixed set of values.
    OneOf(&'static [&'static str]),
    /// Digits only (used for numeric ids passed as strings).
    Digits,
}

impl Validator {
    fn check(&self, key: &str, value: &str) -> Result<()> {
        match self {
            Validator::NonEmpty => {
                if value.is_empty() {
                    return Err(anyhow!("secret key {key} is empty"));
                }
            }
            Validator::NoTrailingWhitespace => {
                if value.is_empty() {
                    return Err(anyhow!("secret key {key} is empty"));
                }
                if value.trim() != value {
                    return Err(anyhow!("secret key {key} has leading or trailing whitespace"));
                }
            }
            Validator::MaxLength(max_len) => {
                if value.is_empty() {
                    return Err(anyhow!("secret key {key} is empty"));
                }
                if value.trim() != value {
                    return Err(anyhow!("secret key {key} has leading or trailing whitespace"));
                }
                if value.len() > *max_len {
                    return Err(anyhow!("secret key {key} exceeds max length {max_len}"));
                }
            }
            Validator::Json => {
                serde_json::from_str::<serde_json::Value>(value)
                    .map_err(|e| anyhow!("secret key {key} is not valid JSON: {e}"))?;
            }
            Validator::OneOf(allowed) => {
                if !allowed.contains(&value) {
                    return Err(anyhow!("secret key {key} must be one of {allowed:?}, got {value:?}"));
                }
            }
            Validator::Digits => {
                if value.is_empty() || !value.chars().all(|c| c.is_ascii_digit()) {
                    return Err(anyhow!("secret key {key} must be digits only"));
                }
            }
        }
        Ok(())
    }
}

/// One expected key in a provider type's secret.
pub struct CredentialKey {
    pub name: &'static str,
    pub required: bool,
    pub validator: Validator,
}

const fn required(name: &'static str, validator: Validator) -> CredentialKey {
    CredentialKey { name, required: true, validator }
}

const fn optional(name: &'static str, validator: Validator) -> CredentialKey {
    CredentialKey { name, required: false, validator }
}

/// The key schema for one `providerType`, or `None` if the type has no
/// secret-backed credentials (e.g. `mock`).
#[must_use]
pub fn schema_for(provider_type: &str) -> Option<&'static [CredentialKey]> {
    match provider_type {
        "route53" => {
            const KEYS: [CredentialKey; 3] = [
                required("AWS_ACCESS_KEY_ID", Validator::NoTrailingWhitespace),
                required("AWS_SECRET_ACCESS_KEY", Validator::NoTrailingWhitespace),
                optional("AWS_REGION", Validator::MaxLength(32)),
            ];
            Some(&KEYS)
        }
        "azure-dns" => {
            const KEYS: [CredentialKey; 5] = [
                required("AZURE_SUBSCRIPTION_ID", Validator::NoTrailingWhitespace),
                required("AZURE_CLIENT_ID", Validator::NoTrailingWhitespace),
                required("AZURE_CLIENT_SECRET", Validator::NoTrailingWhitespace),
                required("AZURE_TENANT_ID", Validator::NoTrailingWhitespace),
                optional(
                    "AZURE_CLOUD",
                    Validator::OneOf(&["AzurePublic", "AzureChina", "AzureGovernment"]),
                ),
            ];
            Some(&KEYS)
        }
        "google-clouddns" => {
            const KEYS: [CredentialKey; 1] = [required("serviceaccount.json", Validator::Json)];
            Some(&KEYS)
        }
        "cloudflare-dns" => {
            const KEYS: [CredentialKey; 1] = [required("CLOUDFLARE_API_TOKEN", Validator::NoTrailingWhitespace)];
            Some(&KEYS)
        }
        // Other REST-fronted backends are analogous per spec §6's "Other
        // providers analogous" note: a bearer token and the base URL it's
        // scoped to.
        "alicloud-dns" | "openstack-designate" | "infoblox-dns" | "netlify-dns" => {
            const KEYS: [CredentialKey; 2] = [
                required("BASE_URL", Validator::MaxLength(2048)),
                required("BEARER_TOKEN", Validator::NoTrailingWhitespace),
            ];
            Some(&KEYS)
        }
        "remote" => {
            const KEYS: [CredentialKey; 3] = [
                required("ENDPOINT", Validator::MaxLength(2048)),
                required("CLIENT_IDENTITY", Validator::NonEmpty),
                required("CA_BUNDLE", Validator::NonEmpty),
            ];
            Some(&KEYS)
        }
        "rfc2136" => {
            const KEYS: [CredentialKey; 4] = [
                required("PRIMARY_ADDR", Validator::NoTrailingWhitespace),
                required("TSIG_KEY_NAME", Validator::NoTrailingWhitespace),
                required("TSIG_KEY_SECRET", Validator::NonEmpty),
                optional("TSIG_ALGORITHM", Validator::OneOf(&["hmac-sha256", "hmac-sha512"])),
            ];
            Some(&KEYS)
        }
        "mock" => None,
        _ => None,
    }
}

/// Validate a `Secret`'s `data` map against `provider_type`'s key schema and
/// return the validated keys as UTF-8 strings, keyed by name.
///
/// # Errors
///
/// Returns an error naming the first missing required key or the first key
/// that fails its validator.
pub fn validate(provider_type: &str, data: &BTreeMap<String, ByteString>) -> Result<BTreeMap<String, String>> {
    let Some(schema) = schema_for(provider_type) else {
        return Ok(BTreeMap::new());
    };

    let mut validated = BTreeMap::new();
    for field in schema {
        let raw = data.get(field.name);
        match raw {
            None => {
                if field.required {
                    return Err(anyhow!(
                        "secret for provider type {provider_type} is missing required key {}",
                        field.name
                    ));
                }
            }
            Some(bytes) => {
                let value = String::from_utf8(bytes.0.clone())
                    .map_err(|e| anyhow!("secret key {} is not valid UTF-8: {e}", field.name))?;
                field.validator.check(field.name, &value)?;
                validated.insert(field.name.to_string(), value);
            }
        }
    }
    Ok(validated)
}

#[cfg(test)]
mod credentials_tests {
    use super::*;

    fn data(pairs: &[(&str, &str)]) -> BTreeMap<String, ByteString> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), ByteString(v.as_bytes().to_vec())))
            .collect()
    }

    #[test]
    fn route53_requires_access_key_and_secret() {
        let err = validate("route53", &data(&[("AWS_ACCESS_KEY_ID", "id")])).unwrap_err();
        assert!(err.to_string().contains("AWS_SECRET_ACCESS_KEY"));
    }

    #[test]
    fn route53_accepts_a_complete_secret() {
        let validated = validate(
            "route53",
            &data(&[("AWS_ACCESS_KEY_ID", "id"), ("AWS_SECRET_ACCESS_KEY", "secret")]),
        )
        .unwrap();
        assert_eq!(validated.get("AWS_ACCESS_KEY_ID").map(String::as_str), Some("id"));
        assert!(!validated.contains_key("AWS_REGION"));
    }

    #[test]
    fn rejects_trailing_whitespace_in_a_validated_key() {
        let err = validate(
            "route53",
            &data(&[("AWS_ACCESS_KEY_ID", "id \n"), ("AWS_SECRET_ACCESS_KEY", "secret")]),
        )
        .unwrap_err();
        assert!(err.to_string().contains("whitespace"));
    }

    #[test]
    fn azure_cloud_must_be_one_of_the_predefined_values() {
        let err = validate(
            "azure-dns",
            &data(&[
                ("AZURE_SUBSCRIPTION_ID", "s"),
                ("AZURE_CLIENT_ID", "c"),
                ("AZURE_CLIENT_SECRET", "p"),
                ("AZURE_TENANT_ID", "t"),
                ("AZURE_CLOUD", "AzureMoon"),
            ]),
        )
        .unwrap_err();
        assert!(err.to_string().contains("AZURE_CLOUD"));
    }

    #[test]
    fn google_service_account_must_be_valid_json() {
        let err = validate("google-clouddns", &data(&[("serviceaccount.json", "not json")])).unwrap_err();
        assert!(err.to_string().contains("JSON"));
    }

    #[test]
    fn mock_provider_has_no_schema_and_always_validates() {
        assert!(validate("mock", &BTreeMap::new()).unwrap().is_empty());
    }
}
