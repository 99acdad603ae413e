use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A school registered on the platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TenantRecord {
    pub id: Uuid,
    pub slug: String,
    pub name: String,
    #[serde(default)]
    pub plan_code: Option<String>,
    #[serde(default)]
    pub custom_domain: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Parent,
    Admin,
}

/// The authenticated user behind a session token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TenantUser {
    pub user_id: Uuid,
    pub tenant_id: Uuid,
    pub role: Role,
    #[serde(default)]
    pub parent_id: Option<Uuid>,
}
