//! Platform registry: static description of every supported platform.
//!
//! Descriptors are plain data: endpoint templates, auth scheme, feature flags
//! and on-disk storage layout. Adapters read them, never mutate them.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use flowsync_core::{Error, Result};

use crate::types::PlatformId;

/// How an adapter authenticates its HTTP calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthType {
    /// `Authorization: Token <apiToken>`
    Token,
    /// `<authHeader or X-API-Key>: <apiKey>`
    ApiKey,
    /// `Authorization: Bearer <accessToken>`
    OAuth2,
}

/// A capability a platform may or may not offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feature {
    Create,
    Pull,
    Push,
    Delete,
    Deploy,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Features {
    pub create: bool,
    pub pull: bool,
    pub push: bool,
    pub delete: bool,
    pub deploy: bool,
}

impl Features {
    pub fn supports(&self, feature: Feature) -> bool {
        match feature {
            Feature::Create => self.create,
            Feature::Pull => self.pull,
            Feature::Push => self.push,
            Feature::Delete => self.delete,
            Feature::Deploy => self.deploy,
        }
    }
}

/// Where pulled items live under the workspace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageLayout {
    pub directory: String,
    pub metadata_file: String,
    pub scenario_file: String,
}

/// Static description of one platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformDescriptor {
    pub id: String,
    pub name: String,
    pub display_name: String,
    pub description: String,
    pub auth_type: AuthType,
    /// Header name for `ApiKey` auth when the platform does not use `X-API-Key`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_header: Option<String>,
    /// Region (or logical host) → API base URL.
    #[serde(default)]
    pub base_urls: BTreeMap<String, String>,
    pub default_region: String,
    /// Logical operation → path template, may contain `:param` placeholders.
    pub endpoints: BTreeMap<String, String>,
    pub features: Features,
    pub storage: StorageLayout,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub web_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub docs_url: Option<String>,
}

impl PlatformDescriptor {
    /// Typed id; unknown ids are a hard error.
    pub fn platform_id(&self) -> Result<PlatformId> {
        self.id.parse()
    }

    /// Path template for a logical endpoint.
    pub fn endpoint(&self, key: &str) -> Result<&str> {
        self.endpoints.get(key).map(String::as_str).ok_or_else(|| {
            Error::Config(format!("Unknown endpoint '{}' for platform '{}'", key, self.id))
        })
    }

    /// Base URL for a region.
    pub fn base_url(&self, region: &str) -> Result<&str> {
        self.base_urls
            .get(region)
            .map(String::as_str)
            .filter(|u| !u.is_empty())
            .ok_or_else(|| {
                Error::Config(format!("Invalid region '{}' for platform '{}'", region, self.id))
            })
    }

    /// Replace (or add) the base URL for one region.
    pub fn with_base_url(mut self, region: &str, url: &str) -> Self {
        self.base_urls.insert(region.to_string(), url.to_string());
        self
    }
}

/// Validated set of descriptors, one per platform.
#[derive(Debug, Clone)]
pub struct PlatformRegistry {
    descriptors: BTreeMap<PlatformId, PlatformDescriptor>,
}

impl PlatformRegistry {
    /// The four built-in platforms.
    pub fn builtin() -> Self {
        let descriptors = [
            (PlatformId::AppScript, appscript()),
            (PlatformId::Make, make()),
            (PlatformId::Zapier, zapier()),
            (PlatformId::N8n, n8n()),
        ]
        .into_iter()
        .collect();
        Self { descriptors }
    }

    /// Build from arbitrary descriptors. Unknown or duplicate ids are rejected.
    pub fn from_descriptors(descriptors: Vec<PlatformDescriptor>) -> Result<Self> {
        let mut map = BTreeMap::new();
        for descriptor in descriptors {
            let id = descriptor.platform_id()?;
            if map.insert(id, descriptor).is_some() {
                return Err(Error::Config(format!("Duplicate platform descriptor: {}", id)));
            }
        }
        Ok(Self { descriptors: map })
    }

    pub fn get(&self, id: PlatformId) -> Result<&PlatformDescriptor> {
        self.descriptors
            .get(&id)
            .ok_or_else(|| Error::UnknownPlatform(id.to_string()))
    }

    pub fn all(&self) -> impl Iterator<Item = &PlatformDescriptor> {
        self.descriptors.values()
    }

    pub fn ids(&self) -> Vec<PlatformId> {
        self.descriptors.keys().copied().collect()
    }

    /// Swap in a modified descriptor (e.g. a proxy base URL).
    pub fn replace(&mut self, descriptor: PlatformDescriptor) -> Result<()> {
        let id = descriptor.platform_id()?;
        self.descriptors.insert(id, descriptor);
        Ok(())
    }
}

fn map(entries: &[(&str, &str)]) -> BTreeMap<String, String> {
    entries
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn appscript() -> PlatformDescriptor {
    PlatformDescriptor {
        id: "appscript".into(),
        name: "Google Apps Script".into(),
        display_name: "Apps Script".into(),
        description: "Serverless scripting platform for Google Workspace".into(),
        auth_type: AuthType::OAuth2,
        auth_header: None,
        base_urls: map(&[
            ("drive", "https://www.googleapis.com/drive/v3"),
            ("oauth", "https://oauth2.googleapis.com"),
        ]),
        default_region: "drive".into(),
        endpoints: map(&[
            ("scenarios", "/files"),
            ("scenario", "/files/:id"),
            ("token", "/token"),
        ]),
        features: Features {
            create: true,
            pull: true,
            push: true,
            delete: false,
            deploy: true,
        },
        storage: StorageLayout {
            directory: "scripts".into(),
            metadata_file: ".clasp-deployer.json".into(),
            scenario_file: ".clasp.json".into(),
        },
        web_url: Some("https://script.google.com/d/:id/edit".into()),
        settings_url: None,
        docs_url: Some("https://developers.google.com/apps-script/api/reference/rest".into()),
    }
}

fn make() -> PlatformDescriptor {
    PlatformDescriptor {
        id: "make".into(),
        name: "Make.com".into(),
        display_name: "Make".into(),
        description: "Visual workflow builder with 2,900+ app integrations".into(),
        auth_type: AuthType::Token,
        auth_header: None,
        base_urls: map(&[
            ("eu1", "https://eu1.make.com/api/v2"),
            ("us1", "https://us1.make.com/api/v2"),
            ("ap1", "https://ap1.make.com/api/v2"),
            ("www", "https://www.make.com/api/v2"),
        ]),
        default_region: "eu1".into(),
        endpoints: map(&[
            ("scenarios", "/scenarios"),
            ("scenario", "/scenarios/:id"),
            ("user", "/users/me"),
            ("teams", "/teams"),
            ("organizations", "/organizations"),
        ]),
        features: Features {
            create: true,
            pull: true,
            push: true,
            delete: true,
            deploy: false,
        },
        storage: StorageLayout {
            directory: "make-scenarios".into(),
            metadata_file: "metadata.json".into(),
            scenario_file: "blueprint.json".into(),
        },
        web_url: Some("https://www.make.com/en/scenarios/:id".into()),
        settings_url: Some("https://www.make.com/en/settings/api".into()),
        docs_url: Some("https://www.make.com/en/api-documentation".into()),
    }
}

fn zapier() -> PlatformDescriptor {
    PlatformDescriptor {
        id: "zapier".into(),
        name: "Zapier".into(),
        display_name: "Zapier".into(),
        description: "Market leader with 8,000+ app integrations".into(),
        auth_type: AuthType::ApiKey,
        auth_header: None,
        base_urls: map(&[("v1", "https://api.zapier.com/v1")]),
        default_region: "v1".into(),
        endpoints: map(&[
            ("scenarios", "/zaps"),
            ("scenario", "/zaps/:id"),
            ("user", "/profile"),
        ]),
        features: Features {
            create: false,
            pull: true,
            push: false,
            delete: false,
            deploy: false,
        },
        storage: StorageLayout {
            directory: "zapier-zaps".into(),
            metadata_file: "metadata.json".into(),
            scenario_file: "zap.json".into(),
        },
        web_url: Some("https://zapier.com/app/editor/:id".into()),
        settings_url: Some("https://zapier.com/app/settings/api".into()),
        docs_url: Some("https://platform.zapier.com/reference/cli-docs".into()),
    }
}

fn n8n() -> PlatformDescriptor {
    PlatformDescriptor {
        id: "n8n".into(),
        name: "n8n".into(),
        display_name: "n8n".into(),
        description: "Open-source automation with self-hosting and AI support".into(),
        auth_type: AuthType::ApiKey,
        auth_header: Some("X-N8N-API-KEY".into()),
        // Self-hosted: the base URL comes from the instanceUrl credential.
        base_urls: BTreeMap::new(),
        default_region: "custom".into(),
        endpoints: map(&[
            ("scenarios", "/workflows"),
            ("scenario", "/workflows/:id"),
            ("executions", "/executions"),
            ("credentials", "/credentials"),
        ]),
        features: Features {
            create: true,
            pull: true,
            push: true,
            delete: true,
            deploy: false,
        },
        storage: StorageLayout {
            directory: "n8n-workflows".into(),
            metadata_file: "metadata.json".into(),
            scenario_file: "workflow.json".into(),
        },
        web_url: None,
        settings_url: None,
        docs_url: Some("https://docs.n8n.io/api/".into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_has_every_platform() {
        let registry = PlatformRegistry::builtin();
        for id in PlatformId::all() {
            let descriptor = registry.get(*id).unwrap();
            assert_eq!(descriptor.platform_id().unwrap(), *id);
        }
    }

    #[test]
    fn test_unknown_descriptor_is_rejected() {
        let mut rogue = make();
        rogue.id = "ifttt".into();
        let err = PlatformRegistry::from_descriptors(vec![make(), rogue]).unwrap_err();
        assert!(matches!(err, Error::UnknownPlatform(ref id) if id == "ifttt"));
    }

    #[test]
    fn test_duplicate_descriptor_is_rejected() {
        let err = PlatformRegistry::from_descriptors(vec![make(), make()]).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_invalid_region() {
        let descriptor = make();
        assert_eq!(descriptor.base_url("us1").unwrap(), "https://us1.make.com/api/v2");
        let err = descriptor.base_url("mars1").unwrap_err();
        assert!(err.to_string().contains("Invalid region 'mars1'"));
    }

    #[test]
    fn test_feature_flags() {
        let registry = PlatformRegistry::builtin();
        let zapier = registry.get(PlatformId::Zapier).unwrap();
        assert!(zapier.features.supports(Feature::Pull));
        assert!(!zapier.features.supports(Feature::Push));
        assert!(!zapier.features.supports(Feature::Delete));
        let appscript = registry.get(PlatformId::AppScript).unwrap();
        assert!(appscript.features.supports(Feature::Deploy));
    }
}
