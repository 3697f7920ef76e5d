use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;

use crate::PlatformFuture;
use crate::api::{self, StoryApi};
use crate::durable::DurableStore;
use crate::models::{CoreError, CoreErrorKind, PermissionState, PushSubscription};

/// Length of an uncompressed P-256 public key.
const APPLICATION_SERVER_KEY_LEN: usize = 65;

/// Platform notification-permission prompt.
pub trait PermissionPrompt: Send + Sync {
    /// Whether the platform can show notifications at all.
    fn supported(&self) -> bool;

    fn current(&self) -> PermissionState;

    fn request(&self) -> PlatformFuture<'_, PermissionState>;
}

/// Platform push service that issues subscriptions.
pub trait PushService: Send + Sync {
    fn subscribe(&self, application_server_key: Vec<u8>) -> PlatformFuture<'_, PushSubscription>;
}

pub struct SubscriptionManager {
    prompt: Arc<dyn PermissionPrompt>,
    push_service: Arc<dyn PushService>,
    api: Arc<dyn StoryApi>,
    store: DurableStore,
}

impl SubscriptionManager {
    pub fn new(
        prompt: Arc<dyn PermissionPrompt>,
        push_service: Arc<dyn PushService>,
        api: Arc<dyn StoryApi>,
        store: DurableStore,
    ) -> Self {
        Self {
            prompt,
            push_service,
            api,
            store,
        }
    }

    /// `false` for denial, dismissal, an unsupported platform or a failed prompt.
    pub async fn request_permission(&self) -> bool {
        if !self.prompt.supported() {
            tracing::info!("platform does not support notifications");
            return false;
        }

        match self.prompt.request().await {
            Ok(PermissionState::Granted) => true,
            Ok(PermissionState::Denied) => {
                tracing::info!("notification permission denied");
                false
            }
            Ok(PermissionState::Default) => {
                tracing::info!("notification permission prompt dismissed");
                false
            }
            Err(error) => {
                tracing::warn!(message = %error.message, "notification permission prompt failed");
                false
            }
        }
    }

    /// Best effort: every missing prerequisite is logged and yields `None`.
    pub async fn subscribe(&self) -> Option<PushSubscription> {
        match self.try_subscribe().await {
            Ok(subscription) => Some(subscription),
            Err(error) => {
                tracing::warn!(
                    kind = ?error.kind,
                    operation = error.operation.unwrap_or("subscribe"),
                    message = %error.message,
                    "push subscription unavailable"
                );
                None
            }
        }
    }

    /// Removes the remote mirror, then the local one. Requires a session.
    pub async fn unsubscribe(&self, endpoint: &str) -> Result<(), CoreError> {
        let session = self.store.session().await?.ok_or_else(|| {
            CoreError::new(
                CoreErrorKind::AuthRequired,
                "log in to manage push notifications",
            )
            .with_operation("unsubscribe")
        })?;

        let remote_endpoint = endpoint.to_string();
        api::call(&self.api, "unsubscribe", move |api| {
            api.unsubscribe_push(&session.token, &remote_endpoint)
        })
        .await?;

        self.store.delete_push_subscription(endpoint).await?;
        tracing::info!(endpoint = %endpoint, "push subscription removed");
        Ok(())
    }

    async fn try_subscribe(&self) -> Result<PushSubscription, CoreError> {
        if !self.prompt.supported() {
            return Err(unavailable("platform does not support notifications"));
        }
        if self.prompt.current() != PermissionState::Granted {
            return Err(unavailable("notification permission has not been granted"));
        }

        let vapid_key = api::call(&self.api, "vapid_public_key", |api| api.vapid_public_key())
            .await
            .map_err(|error| {
                CoreError::new(
                    CoreErrorKind::SubscriptionUnavailable,
                    format!("VAPID public key not available: {}", error.message),
                )
            })?;
        let application_server_key = decode_application_server_key(&vapid_key)?;

        let subscription = self
            .push_service
            .subscribe(application_server_key)
            .await
            .map_err(|error| {
                CoreError::new(
                    CoreErrorKind::SubscriptionUnavailable,
                    format!("push service refused the subscription: {}", error.message),
                )
            })?;
        tracing::info!(endpoint = %subscription.endpoint, "subscribed to push service");

        self.store
            .save_push_subscription(subscription.clone())
            .await?;
        self.mirror_to_server(&subscription).await;

        Ok(subscription)
    }

    async fn mirror_to_server(&self, subscription: &PushSubscription) {
        let session = match self.store.session().await {
            Ok(Some(session)) => session,
            Ok(None) => {
                tracing::info!("no session; push subscription kept on this device only");
                return;
            }
            Err(error) => {
                tracing::warn!(message = %error.message, "could not read session for push mirroring");
                return;
            }
        };

        let remote = subscription.clone();
        let result = api::call(&self.api, "subscribe_push", move |api| {
            api.subscribe_push(&session.token, &remote)
        })
        .await;

        match result {
            Ok(()) => tracing::info!(
                endpoint = %subscription.endpoint,
                "push subscription sent to server"
            ),
            Err(error) => tracing::warn!(
                kind = ?error.kind,
                message = %error.message,
                "failed to send push subscription to server"
            ),
        }
    }
}

/// Decodes a base64url VAPID key, with or without padding, into the raw
/// uncompressed point the push service expects.
pub fn decode_application_server_key(encoded: &str) -> Result<Vec<u8>, CoreError> {
    let trimmed = encoded.trim().trim_end_matches('=');
    if trimmed.is_empty() {
        return Err(unavailable("VAPID public key is empty"));
    }

    let bytes = URL_SAFE_NO_PAD
        .decode(trimmed)
        .map_err(|error| unavailable(format!("VAPID public key is not base64url: {error}")))?;

    if bytes.len() != APPLICATION_SERVER_KEY_LEN || bytes[0] != 0x04 {
        return Err(unavailable(format!(
            "VAPID public key is not an uncompressed P-256 point ({} bytes)",
            bytes.len()
        )));
    }
    Ok(bytes)
}

fn unavailable(message: impl Into<String>) -> CoreError {
    CoreError::new(CoreErrorKind::SubscriptionUnavailable, message)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_key() -> Vec<u8> {
        let mut key = vec![0x04];
        key.extend((1..=64).map(|value| value as u8));
        key
    }

    #[test]
    fn decodes_key_with_and_without_padding() {
        let key = sample_key();
        let unpadded = URL_SAFE_NO_PAD.encode(&key);
        let padded = format!("{unpadded}=");

        assert_eq!(decode_application_server_key(&unpadded).unwrap(), key);
        assert_eq!(decode_application_server_key(&padded).unwrap(), key);
    }

    #[test]
    fn rejects_keys_that_are_not_uncompressed_points() {
        let mut compressed = sample_key();
        compressed[0] = 0x02;
        let error = decode_application_server_key(&URL_SAFE_NO_PAD.encode(&compressed))
            .unwrap_err();
        assert_eq!(error.kind, CoreErrorKind::SubscriptionUnavailable);

        let short = URL_SAFE_NO_PAD.encode([0x04, 1, 2, 3]);
        assert!(decode_application_server_key(&short).is_err());
        assert!(decode_application_server_key("not*base64").is_err());
        assert!(decode_application_server_key("").is_err());
    }
}
