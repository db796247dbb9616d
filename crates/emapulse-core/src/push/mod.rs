//! Push delivery boundary.
//!
//! The notifier turns one prompt request into one notification payload and
//! hands it to a push sink. Sinks are fire-and-forget side effects: no
//! delivery receipt is expected, and nothing in this module touches the
//! state store, so a failed delivery can never corrupt scheduling state.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::DeliveryError;
use crate::state::{PromptRequest, PushSubscription};

/// Payload posted to the push endpoint. The service worker on the other
/// side shows `title`/`body` and uses `data.state_id` to route the answer
/// back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationPayload {
    pub title: String,
    pub body: String,
    pub data: PayloadData,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayloadData {
    pub state_id: String,
}

/// Delivery boundary for one payload to one registered endpoint.
///
/// Implementations are stateless between calls and must be safe to invoke
/// from concurrent delivery tasks.
pub trait PushSink: Send + Sync {
    /// Deliver the payload. Fire-and-forget: a success means the endpoint
    /// accepted the payload, not that the user saw it.
    fn push(
        &self,
        subscription: &PushSubscription,
        payload: &NotificationPayload,
    ) -> Result<(), DeliveryError>;
}

/// Posts the payload JSON to the subscription endpoint over HTTP.
pub struct WebPushSink {
    client: Client,
    timeout_secs: u64,
}

impl WebPushSink {
    pub fn new(timeout_secs: u64) -> Self {
        Self {
            client: Client::new(),
            timeout_secs,
        }
    }
}

impl PushSink for WebPushSink {
    fn push(
        &self,
        subscription: &PushSubscription,
        payload: &NotificationPayload,
    ) -> Result<(), DeliveryError> {
        let endpoint =
            url::Url::parse(&subscription.endpoint).map_err(|e| DeliveryError::InvalidEndpoint {
                endpoint: subscription.endpoint.clone(),
                message: e.to_string(),
            })?;

        let resp = tokio::runtime::Handle::current().block_on(
            self.client
                .post(endpoint)
                .timeout(std::time::Duration::from_secs(self.timeout_secs))
                .json(payload)
                .send(),
        )?;

        if resp.status().is_success() {
            Ok(())
        } else {
            Err(DeliveryError::Rejected {
                status: resp.status().as_u16(),
            })
        }
    }
}

/// Receipt for one completed delivery.
#[derive(Debug, Clone, Serialize)]
pub struct Delivered {
    pub state_id: String,
    pub endpoint: String,
    pub at: DateTime<Utc>,
}

/// Builds payloads and drives one sink.
///
/// Cheap to clone; delivery tasks each take their own handle.
#[derive(Clone)]
pub struct Notifier {
    sink: Arc<dyn PushSink>,
    default_title: String,
}

impl Notifier {
    pub fn new(sink: Arc<dyn PushSink>, default_title: impl Into<String>) -> Self {
        Self {
            sink,
            default_title: default_title.into(),
        }
    }

    /// Render the notification for a prompt request. The label's
    /// `prompt_text` overrides the stock wording.
    pub fn payload_for(&self, request: &PromptRequest) -> NotificationPayload {
        let body = request
            .prompt_text
            .clone()
            .unwrap_or_else(|| format!("Are you still feeling {}?", request.label_name));
        NotificationPayload {
            title: self.default_title.clone(),
            body,
            data: PayloadData {
                state_id: request.state_id.clone(),
            },
        }
    }

    /// Deliver one prompt to the user's registered endpoint.
    ///
    /// # Errors
    /// Returns `DeliveryError::NoSubscription` if the user has no endpoint
    /// (the state stays due and is observed via client polling instead),
    /// or the sink's transport error. Neither alters the state store.
    pub fn deliver(
        &self,
        subscription: Option<&PushSubscription>,
        request: &PromptRequest,
    ) -> Result<Delivered, DeliveryError> {
        let subscription = subscription.ok_or_else(|| DeliveryError::NoSubscription {
            user_id: request.user_id.clone(),
        })?;

        let payload = self.payload_for(request);
        self.sink.push(subscription, &payload)?;

        debug!(
            state_id = %request.state_id,
            user_id = %request.user_id,
            "prompt delivered"
        );
        Ok(Delivered {
            state_id: request.state_id.clone(),
            endpoint: subscription.endpoint.clone(),
            at: Utc::now(),
        })
    }
}
