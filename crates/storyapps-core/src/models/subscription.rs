use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionKeys {
    pub p256dh: String,
    pub auth: String,
}

/// Credential issued by the platform push service. `endpoint` is unique.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct PushSubscription {
    pub endpoint: String,
    pub keys: SubscriptionKeys,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PermissionState {
    Granted,
    Denied,
    /// The prompt was dismissed without a decision.
    Default,
}
