//! # Posting Schedule
//!
//! Same-day, per-platform posting slots. Every platform receives the same
//! video on the same calendar day, each at the hour that historically performs
//! best for that platform on that weekday.

pub mod same_day;

pub use same_day::{same_day_slots, PlatformSlot};

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Instagram,
    Tiktok,
    Youtube,
    Facebook,
    Linkedin,
    Twitter,
    Bluesky,
    Threads,
}

impl Platform {
    pub const ALL: [Platform; 8] = [
        Self::Instagram,
        Self::Tiktok,
        Self::Youtube,
        Self::Facebook,
        Self::Linkedin,
        Self::Twitter,
        Self::Bluesky,
        Self::Threads,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Instagram => "instagram",
            Self::Tiktok => "tiktok",
            Self::Youtube => "youtube",
            Self::Facebook => "facebook",
            Self::Linkedin => "linkedin",
            Self::Twitter => "twitter",
            Self::Bluesky => "bluesky",
            Self::Threads => "threads",
        }
    }

    /// Best local posting hour for each weekday, Sunday first
    pub fn optimal_hours(&self) -> [u32; 7] {
        match self {
            Self::Youtube => [6, 15, 17, 6, 9, 19, 8],
            Self::Tiktok => [12, 7, 9, 21, 11, 21, 21],
            Self::Instagram => [10, 11, 11, 14, 14, 15, 10],
            Self::Facebook => [12, 13, 13, 13, 15, 15, 11],
            Self::Linkedin => [9, 10, 10, 12, 16, 11, 9],
            Self::Twitter => [10, 9, 15, 15, 11, 11, 12],
            Self::Bluesky => [10, 10, 14, 14, 12, 12, 11],
            Self::Threads => [11, 12, 12, 14, 15, 14, 11],
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_ascii_lowercase();
        match lowered.as_str() {
            "x" => Ok(Self::Twitter),
            other => Self::ALL
                .iter()
                .copied()
                .find(|p| p.as_str() == other)
                .ok_or_else(|| format!("Unknown platform: {s}")),
        }
    }
}
