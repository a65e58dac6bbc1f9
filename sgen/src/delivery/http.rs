use std::time::Duration;

use reqwest::{Client, StatusCode, Url};
use scommon::BoxFuture;

use super::{DeliveryError, DeliveryPort, DeliveryTarget};
use crate::WireMessage;

pub const DEFAULT_CALLBACK_TIMEOUT: Duration = Duration::from_secs(10);

/// POSTs each wire message as JSON to `{base_url}/{target}`. Every request carries
/// its own timeout, so a hung recipient surfaces as a transient failure.
#[derive(Debug, Clone)]
pub struct HttpCallbackDelivery {
    client: Client,
    base_url: Url,
    request_timeout: Duration,
}

impl HttpCallbackDelivery {
    pub fn new(client: Client, base_url: &str) -> Result<Self, DeliveryError> {
        let base_url = Url::parse(base_url).map_err(|error| {
            DeliveryError::transient(format!("invalid callback base url '{base_url}': {error}"))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(DeliveryError::transient(format!(
                "callback base url '{base_url}' cannot carry path segments"
            )));
        }

        Ok(Self {
            client,
            base_url,
            request_timeout: DEFAULT_CALLBACK_TIMEOUT,
        })
    }

    pub fn with_request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }
}

impl DeliveryPort for HttpCallbackDelivery {
    fn send<'a>(
        &'a self,
        target: &'a DeliveryTarget,
        message: &'a WireMessage,
    ) -> BoxFuture<'a, Result<(), DeliveryError>> {
        Box::pin(async move {
            let url = callback_url(&self.base_url, target)?;
            let response = self
                .client
                .post(url)
                .timeout(self.request_timeout)
                .json(message)
                .send()
                .await
                .map_err(|error| DeliveryError::transient(format!("callback failed: {error}")))?;

            classify_status(response.status(), target)
        })
    }
}

pub(crate) fn callback_url(base: &Url, target: &DeliveryTarget) -> Result<Url, DeliveryError> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| DeliveryError::transient(format!("callback base url '{base}' is opaque")))?
        .pop_if_empty()
        .push(target.as_str());
    Ok(url)
}

pub(crate) fn classify_status(
    status: StatusCode,
    target: &DeliveryTarget,
) -> Result<(), DeliveryError> {
    if status.is_success() {
        return Ok(());
    }

    match status.as_u16() {
        404 | 410 => Err(DeliveryError::gone(format!(
            "recipient '{target}' gone (status {status})"
        ))),
        _ => Err(DeliveryError::transient(format!(
            "callback for '{target}' returned status {status}"
        ))),
    }
}
