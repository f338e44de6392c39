use std::any::{Any, TypeId};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Identity of a loaded Rust type, used as the key for handler and message lookup.
///
/// Equality and hashing use the `TypeId` only; the name is carried for
/// diagnostics. Ordering is by name so listings are stable across runs.
#[derive(Clone, Copy)]
pub struct TypeKey {
    id: TypeId,
    name: &'static str,
}

impl TypeKey {
    /// Returns the key for `T`.
    #[must_use]
    pub fn of<T: ?Sized + Any>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    #[must_use]
    pub fn id(&self) -> TypeId {
        self.id
    }

    /// Fully qualified type name as reported by the compiler.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Last path segment of the type name, without generic arguments
    /// (`my_app::dto::Ping` -> `Ping`).
    #[must_use]
    pub fn short_name(&self) -> &'static str {
        let base = self.name.split('<').next().unwrap_or(self.name);
        base.rsplit("::").next().unwrap_or(base)
    }
}

impl PartialEq for TypeKey {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeKey {}

impl Hash for TypeKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl PartialOrd for TypeKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TypeKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.name
            .cmp(other.name)
            .then_with(|| self.id.cmp(&other.id))
    }
}

impl fmt::Debug for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeKey({})", self.name)
    }
}

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Instance sharing policy applied by a dependency container.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Lifecycle {
    /// A fresh instance for every resolution ("no sharing").
    #[default]
    PerCall,
    /// One instance shared by every resolution.
    Shared,
}

impl Lifecycle {
    /// Returns the kebab-case name used in configuration.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PerCall => "per-call",
            Self::Shared => "shared",
        }
    }
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Lifecycle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "per-call" | "percall" | "transient" => Ok(Self::PerCall),
            "shared" | "singleton" => Ok(Self::Shared),
            other => Err(format!(
                "unknown lifecycle `{other}` (expected `per-call` or `shared`)"
            )),
        }
    }
}
