pub mod node;
pub mod pod;
pub mod scaling_policy;

use serde::{Deserialize, Serialize};

/// Common identity carried by every object this crate models.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Default)]
pub struct Metadata {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

/// Minimal identity accessor shared by the object types this crate keeps.
pub trait Object {
    fn kind(&self) -> &'static str;
    fn name(&self) -> &String;
}
