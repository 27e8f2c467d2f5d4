//! Per-tenant profiles.
//!
//! A tenant ("brand") is resolved once per request from the URL path and the
//! resulting profile is passed down; nothing past the router switches on the
//! tenant name.

use crate::error::{OrchestratorError, Result};
use crate::scheduling::Platform;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TenantProfile {
    pub display_name: String,
    /// Platforms posted to by default
    pub platforms: Vec<Platform>,
    /// IANA timezone used for posting slots
    pub timezone: String,
    /// Caption used when the workflow carries none
    pub default_caption: String,
    /// Title used when neither the workflow nor its source carries one
    #[serde(default)]
    pub default_title: Option<String>,
    #[serde(default)]
    pub hashtags: Vec<String>,
    #[serde(default = "default_true")]
    pub alerts_enabled: bool,
}

fn default_true() -> bool {
    true
}

impl TenantProfile {
    pub fn tz(&self) -> Result<Tz> {
        self.timezone.parse::<Tz>().map_err(|_| {
            OrchestratorError::ConfigurationError(format!("unknown timezone {}", self.timezone))
        })
    }

    /// Title fallback: configured default, then `"{display name} Video - {id}"`
    pub fn fallback_title(&self, workflow_id: &str) -> String {
        self.default_title
            .clone()
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| format!("{} Video - {}", self.display_name, workflow_id))
    }

    /// Default caption with the tenant's hashtags appended
    pub fn caption_with_hashtags(&self, caption: &str) -> String {
        if self.hashtags.is_empty() {
            caption.to_string()
        } else {
            format!("{}\n\n{}", caption.trim_end(), self.hashtags.join(" "))
        }
    }
}

fn profile(
    display_name: &str,
    platforms: &[Platform],
    timezone: &str,
    default_caption: &str,
    hashtags: &[&str],
) -> TenantProfile {
    TenantProfile {
        display_name: display_name.to_string(),
        platforms: platforms.to_vec(),
        timezone: timezone.to_string(),
        default_caption: default_caption.to_string(),
        default_title: None,
        hashtags: hashtags.iter().map(|h| h.to_string()).collect(),
        alerts_enabled: true,
    }
}

/// Built-in tenant table
pub fn default_tenants() -> BTreeMap<String, TenantProfile> {
    use Platform::*;

    let core = [Instagram, Tiktok, Youtube, Facebook, Linkedin, Threads];
    let everything = [Instagram, Tiktok, Youtube, Facebook, Linkedin, Threads, Twitter, Bluesky];

    let mut tenants = BTreeMap::new();
    tenants.insert(
        "carz".to_string(),
        profile(
            "Carz Inc",
            &core,
            "America/New_York",
            "The latest from the automotive world.",
            &["#cars", "#automotive", "#vehicles", "#auto", "#carlovers"],
        ),
    );
    tenants.insert(
        "ownerfi".to_string(),
        profile(
            "OwnerFi",
            &everything,
            "America/New_York",
            "Owner financing makes homeownership possible.",
            &["#realestate", "#ownerfinancing", "#property", "#investment", "#homeownership"],
        ),
    );
    tenants.insert(
        "podcast".to_string(),
        profile(
            "Podcast",
            &core,
            "America/Chicago",
            "New episode out now.",
            &["#podcast", "#education", "#interview", "#learning", "#knowledge"],
        ),
    );
    tenants.insert(
        "benefit".to_string(),
        profile(
            "Owner Finance Benefits",
            &core,
            "America/Chicago",
            "Why owner financing works for buyers and sellers.",
            &["#OwnerFinancing", "#RealEstate", "#Homeownership", "#Investment", "#OwnerFi"],
        ),
    );
    tenants.insert(
        "abdullah".to_string(),
        profile(
            "Abdullah",
            &[Instagram, Tiktok, Youtube, Facebook, Linkedin, Twitter, Threads],
            "America/Chicago",
            "Daily insight.",
            &[],
        ),
    );
    tenants.insert(
        "personal".to_string(),
        profile("Personal", &core, "America/Chicago", "New video.", &[]),
    );
    tenants.insert(
        "gaza".to_string(),
        profile(
            "Gaza Relief News",
            &everything,
            "America/New_York",
            "Latest humanitarian update.",
            &["#Gaza", "#HumanitarianAid"],
        ),
    );
    tenants
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_tenants_have_valid_timezones_and_platforms() {
        let tenants = default_tenants();
        for name in ["ownerfi", "carz", "podcast", "benefit", "abdullah", "personal", "gaza"] {
            let profile = tenants.get(name).unwrap();
            assert!(profile.tz().is_ok(), "{name}");
            assert!(!profile.platforms.is_empty(), "{name}");
        }
        assert!(!tenants["carz"].platforms.contains(&Platform::Twitter));
    }

    #[test]
    fn test_fallback_title() {
        let mut profile = default_tenants()["ownerfi"].clone();
        assert_eq!(profile.fallback_title("wf1"), "OwnerFi Video - wf1");
        profile.default_title = Some("Owner Finance Tips".into());
        assert_eq!(profile.fallback_title("wf1"), "Owner Finance Tips");
    }

    #[test]
    fn test_unknown_timezone() {
        let mut profile = default_tenants()["gaza"].clone();
        profile.timezone = "Mars/Olympus".into();
        assert!(profile.tz().is_err());
    }
}
