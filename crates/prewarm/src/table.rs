//! Static route preload table
//!
//! Maps roles, current locations and hover targets to the resource keys
//! worth warming. Built once at configuration time and never mutated.

use crate::{ModuleRegistry, PrewarmError, ResourceKey, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// User role driving role-based preloads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Platform administrator
    Admin,
    /// Teacher
    Teacher,
    /// Student
    Student,
}

impl Role {
    /// All roles
    pub const ALL: [Role; 3] = [Role::Admin, Role::Teacher, Role::Student];

    /// Lowercase name
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Teacher => "teacher",
            Role::Student => "student",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = PrewarmError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "teacher" => Ok(Role::Teacher),
            "student" => Ok(Role::Student),
            other => Err(PrewarmError::Configuration(format!("unknown role '{}'", other))),
        }
    }
}

/// Route preload table
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutePreloadTable {
    /// Keys to warm once a role is known
    pub roles: HashMap<Role, Vec<ResourceKey>>,
    /// Location -> likely next keys
    pub adjacency: HashMap<String, Vec<ResourceKey>>,
    /// Role-specific adjacency overriding `adjacency` for that role
    pub role_adjacency: HashMap<Role, HashMap<String, Vec<ResourceKey>>>,
    /// Keys needed regardless of role
    pub critical: Vec<ResourceKey>,
    /// Hover target name -> key
    pub hover: HashMap<String, ResourceKey>,
}

impl RoutePreloadTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from JSON
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Add role keys
    pub fn with_role<I, K>(mut self, role: Role, keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<ResourceKey>,
    {
        self.roles
            .entry(role)
            .or_default()
            .extend(keys.into_iter().map(Into::into));
        self
    }

    /// Add adjacency for a location
    pub fn with_adjacency<I, K>(mut self, location: impl Into<String>, keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<ResourceKey>,
    {
        self.adjacency
            .entry(location.into())
            .or_default()
            .extend(keys.into_iter().map(Into::into));
        self
    }

    /// Add role-scoped adjacency for a location
    pub fn with_role_adjacency<I, K>(
        mut self,
        role: Role,
        location: impl Into<String>,
        keys: I,
    ) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<ResourceKey>,
    {
        self.role_adjacency
            .entry(role)
            .or_default()
            .entry(location.into())
            .or_default()
            .extend(keys.into_iter().map(Into::into));
        self
    }

    /// Add critical keys
    pub fn with_critical<I, K>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<ResourceKey>,
    {
        self.critical.extend(keys.into_iter().map(Into::into));
        self
    }

    /// Add a hover target
    pub fn with_hover(mut self, name: impl Into<String>, key: impl Into<ResourceKey>) -> Self {
        self.hover.insert(name.into(), key.into());
        self
    }

    /// Keys configured for a role
    pub fn keys_for_role(&self, role: Role) -> &[ResourceKey] {
        self.roles.get(&role).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Likely next keys from a location; role-scoped rules win when present
    pub fn keys_for_location(&self, location: &str, role: Option<Role>) -> &[ResourceKey] {
        let location = normalize_location(location);

        role.and_then(|r| self.role_adjacency.get(&r))
            .and_then(|rules| rules.get(location))
            .or_else(|| self.adjacency.get(location))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Critical keys
    pub fn critical_keys(&self) -> &[ResourceKey] {
        &self.critical
    }

    /// Key behind a hover target
    pub fn hover_target(&self, name: &str) -> Option<&ResourceKey> {
        self.hover.get(name)
    }

    /// Every key the table mentions
    pub fn all_keys(&self) -> Vec<ResourceKey> {
        let mut keys: Vec<ResourceKey> = self
            .roles
            .values()
            .flatten()
            .chain(self.adjacency.values().flatten())
            .chain(self.role_adjacency.values().flat_map(|m| m.values().flatten()))
            .chain(self.critical.iter())
            .chain(self.hover.values())
            .cloned()
            .collect();
        keys.sort();
        keys.dedup();
        keys
    }

    /// Reject tables that mention keys the registry does not know.
    ///
    /// Lookups at call sites stay silent no-ops; a typo in the table is
    /// caught here instead of degrading into a missed warm-up.
    pub fn validate(&self, registry: &ModuleRegistry) -> Result<()> {
        let missing: Vec<String> = self
            .all_keys()
            .into_iter()
            .filter(|k| !registry.contains(k.as_str()))
            .map(|k| k.to_string())
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(PrewarmError::UnknownKey(missing.join(", ")))
        }
    }

    /// Preset for the education platform client
    pub fn education_platform() -> Self {
        Self::new()
            .with_critical(["Login", "Register", "AuthCallback"])
            .with_role(
                Role::Admin,
                ["AdminDashboard", "UserManagement", "PlatformAnalytics", "Settings"],
            )
            .with_role(
                Role::Teacher,
                [
                    "TeacherDashboard",
                    "QuizBuilder",
                    "QuizList",
                    "MeetingScheduler",
                    "ClassAnalytics",
                ],
            )
            .with_role(
                Role::Student,
                ["StudentDashboard", "QuizTaker", "MeetingList", "ProgressView"],
            )
            .with_adjacency("/dashboard", ["QuizList", "MeetingList", "ProgressView"])
            .with_adjacency("/quizzes", ["QuizTaker", "QuizBuilder"])
            .with_adjacency("/meetings", ["MeetingScheduler", "MeetingList"])
            .with_adjacency("/analytics", ["ClassAnalytics", "PlatformAnalytics"])
            .with_role_adjacency(Role::Teacher, "/quizzes", ["QuizBuilder", "ClassAnalytics"])
            .with_hover("quizzes", "QuizList")
            .with_hover("meetings", "MeetingList")
            .with_hover("analytics", "ClassAnalytics")
            .with_hover("settings", "Settings")
    }
}

/// `/dashboard/`, `/dashboard?tab=1` and `/dashboard` share one rule
fn normalize_location(location: &str) -> &str {
    let path = location.split(['?', '#']).next().unwrap_or_default();
    match path.trim_end_matches('/') {
        "" => "/",
        trimmed => trimmed,
    }
}
