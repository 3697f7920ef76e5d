use serde::{Deserialize, Serialize};

/// Authenticated session issued by the story API on login.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub user_id: String,
    pub name: String,
    pub token: String,
}
