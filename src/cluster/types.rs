//! Storage objects as seen by the teardown workflow.
//!
//! Claims and volumes are owned by the cluster: this crate only reads them
//! from an accessor and deletes them, it never constructs them for the
//! cluster. `DeletionTarget` is the closed set of things a delete or an
//! existence check can address.

#![allow(missing_docs)]

use std::fmt;

use serde::{Deserialize, Serialize};

/// A namespaced PersistentVolumeClaim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageClaim {
    pub name: String,
    pub namespace: String,
    /// Name of the volume the claim is bound to, if any.
    pub volume_name: Option<String>,
}

impl StorageClaim {
    #[must_use]
    pub fn new(name: &str, namespace: &str) -> Self {
        Self {
            name: name.to_string(),
            namespace: namespace.to_string(),
            volume_name: None,
        }
    }

    #[must_use]
    pub fn bound_to(mut self, volume: &str) -> Self {
        self.volume_name = Some(volume.to_string());
        self
    }

    #[must_use]
    pub fn target(&self) -> DeletionTarget {
        DeletionTarget::claim(&self.name, &self.namespace)
    }
}

/// Back-reference from a volume to the claim it is bound to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimRef {
    pub name: String,
    pub namespace: Option<String>,
}

/// A cluster-scoped PersistentVolume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageVolume {
    pub name: String,
    pub claim_ref: Option<ClaimRef>,
}

impl StorageVolume {
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            claim_ref: None,
        }
    }

    #[must_use]
    pub fn bound_to(mut self, claim: &str, namespace: &str) -> Self {
        self.claim_ref = Some(ClaimRef {
            name: claim.to_string(),
            namespace: Some(namespace.to_string()),
        });
        self
    }

    /// Name of the bound claim, if the volume carries a claim reference.
    #[must_use]
    pub fn claim_name(&self) -> Option<&str> {
        self.claim_ref.as_ref().map(|r| r.name.as_str())
    }

    #[must_use]
    pub fn target(&self) -> DeletionTarget {
        DeletionTarget::volume(&self.name)
    }
}

/// Kind of storage object a target addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    Claim,
    Volume,
}

impl TargetKind {
    /// Short label for reports.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Claim => "PVC",
            Self::Volume => "PV",
        }
    }
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Claim => "PersistentVolumeClaim",
            Self::Volume => "PersistentVolume",
        })
    }
}

/// One object to delete and then watch for absence.
///
/// Claims are namespaced; volumes are cluster-scoped and carry only a name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DeletionTarget {
    Claim { name: String, namespace: String },
    Volume { name: String },
}

impl DeletionTarget {
    #[must_use]
    pub fn claim(name: &str, namespace: &str) -> Self {
        Self::Claim {
            name: name.to_string(),
            namespace: namespace.to_string(),
        }
    }

    #[must_use]
    pub fn volume(name: &str) -> Self {
        Self::Volume {
            name: name.to_string(),
        }
    }

    #[must_use]
    pub const fn kind(&self) -> TargetKind {
        match self {
            Self::Claim { .. } => TargetKind::Claim,
            Self::Volume { .. } => TargetKind::Volume,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Claim { name, .. } | Self::Volume { name } => name,
        }
    }

    #[must_use]
    pub fn namespace(&self) -> Option<&str> {
        match self {
            Self::Claim { namespace, .. } => Some(namespace),
            Self::Volume { .. } => None,
        }
    }
}

impl fmt::Display for DeletionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = self.kind().label();
        match self {
            Self::Claim { name, namespace } => write!(f, "{label} {namespace}/{name}"),
            Self::Volume { name } => write!(f, "{label} {name}"),
        }
    }
}
