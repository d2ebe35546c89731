//! Declarative envelope rewrites built from configuration.

use async_trait::async_trait;
use axum::http::{HeaderName, HeaderValue};
use std::sync::Arc;

use super::{DispatchError, Handler, HandlerError};
use crate::config::ActionConfig;
use crate::envelope::Envelope;
use crate::ogc::OgcMessage;

/// Expands `{endpoint}`, `{service}` and `{operation}`.
fn expand(template: &str, message: &OgcMessage) -> String {
    template
        .replace("{endpoint}", message.endpoint.as_deref().unwrap_or_default())
        .replace("{service}", message.service.as_str())
        .replace("{operation}", message.operation.as_str())
}

/// Sets (or adds) a query parameter.
pub struct SetParam {
    pub name: String,
    pub value: String,
}

#[async_trait]
impl Handler for SetParam {
    async fn handle(&self, message: &OgcMessage, mut envelope: Envelope) -> Result<Envelope, HandlerError> {
        let mut params = envelope.query_params();
        params.set(&self.name, expand(&self.value, message));
        envelope.set_query_params(&params)?;
        Ok(envelope)
    }
}

pub struct RemoveParam {
    pub name: String,
}

#[async_trait]
impl Handler for RemoveParam {
    async fn handle(&self, _message: &OgcMessage, mut envelope: Envelope) -> Result<Envelope, HandlerError> {
        let mut params = envelope.query_params();
        if params.remove(&self.name) {
            envelope.set_query_params(&params)?;
        }
        Ok(envelope)
    }
}

pub struct SetHeader {
    pub name: HeaderName,
    pub value: String,
}

#[async_trait]
impl Handler for SetHeader {
    async fn handle(&self, message: &OgcMessage, mut envelope: Envelope) -> Result<Envelope, HandlerError> {
        let value = HeaderValue::from_str(&expand(&self.value, message))
            .map_err(|e| HandlerError::Failed(format!("header {}: {e}", self.name)))?;
        envelope.headers_mut().insert(self.name.clone(), value);
        Ok(envelope)
    }
}

pub struct RemoveHeader {
    pub name: HeaderName,
}

#[async_trait]
impl Handler for RemoveHeader {
    async fn handle(&self, _message: &OgcMessage, mut envelope: Envelope) -> Result<Envelope, HandlerError> {
        envelope.headers_mut().remove(&self.name);
        Ok(envelope)
    }
}

/// Replaces every occurrence of `from` in a UTF-8 body.
pub struct ReplaceText {
    pub from: String,
    pub to: String,
}

#[async_trait]
impl Handler for ReplaceText {
    async fn handle(&self, message: &OgcMessage, mut envelope: Envelope) -> Result<Envelope, HandlerError> {
        let from = expand(&self.from, message);
        if from.is_empty() {
            tracing::debug!(template = %self.from, "Replacement pattern expanded to nothing, body left as is");
            return Ok(envelope);
        }
        let body = envelope.body().await?;
        let text = std::str::from_utf8(body).map_err(|e| HandlerError::Failed(format!("body is not UTF-8: {e}")))?;
        if !text.contains(&from) {
            return Ok(envelope);
        }
        let replaced = text.replace(&from, &expand(&self.to, message));
        envelope.set_body(replaced);
        Ok(envelope)
    }
}

/// Runs handlers in order, feeding each the previous output.
pub struct Chain {
    handlers: Vec<Arc<dyn Handler>>,
}

impl Chain {
    pub fn new(handlers: Vec<Arc<dyn Handler>>) -> Self {
        Self { handlers }
    }
}

#[async_trait]
impl Handler for Chain {
    async fn handle(&self, message: &OgcMessage, mut envelope: Envelope) -> Result<Envelope, HandlerError> {
        for handler in &self.handlers {
            envelope = handler.handle(message, envelope).await?;
        }
        Ok(envelope)
    }
}

fn header_name(raw: &str) -> Result<HeaderName, DispatchError> {
    HeaderName::from_bytes(raw.as_bytes()).map_err(|_| DispatchError::InvalidAction(format!("invalid header name '{raw}'")))
}

/// Builds the handler for one configured action.
pub fn from_action(action: &ActionConfig) -> Result<Arc<dyn Handler>, DispatchError> {
    let handler: Arc<dyn Handler> = match action {
        ActionConfig::SetParam { name, value } => Arc::new(SetParam {
            name: name.clone(),
            value: value.clone(),
        }),
        ActionConfig::RemoveParam { name } => Arc::new(RemoveParam { name: name.clone() }),
        ActionConfig::SetHeader { name, value } => Arc::new(SetHeader {
            name: header_name(name)?,
            value: value.clone(),
        }),
        ActionConfig::RemoveHeader { name } => Arc::new(RemoveHeader { name: header_name(name)? }),
        ActionConfig::ReplaceText { from, to } => {
            if from.is_empty() {
                return Err(DispatchError::InvalidAction("replace_text needs a non-empty 'from'".into()));
            }
            Arc::new(ReplaceText {
                from: from.clone(),
                to: to.clone(),
            })
        }
    };
    Ok(handler)
}
