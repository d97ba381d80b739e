use serde::{Deserialize, Serialize};

/// Outcome of one gravatar existence probe
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GravatarProbe {
    /// SHA-256 of the normalized email
    pub hash: String,
    pub exists: bool,
}
