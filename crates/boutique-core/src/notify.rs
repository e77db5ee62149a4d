//! Invoice email requests.
//!
//! The invoice PDF is rendered elsewhere; this module packages it with
//! the order reference and recipient and hands it to the
//! `send-invoice-email` function through the retrying invoker.

use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::remote::{InvokeError, InvokeOptions, Invoker, RemoteDispatcher};

/// Function that renders and sends the invoice email.
pub const SEND_INVOICE_FUNCTION: &str = "send-invoice-email";

const PDF_CONTENT_TYPE: &str = "application/pdf";

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("Invalid invoice request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Invoke(#[from] InvokeError),

    #[error("Unexpected response from send-invoice-email: {0}")]
    UnexpectedResponse(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub filename: String,
    /// Base64-encoded file content.
    pub content: String,
    pub content_type: String,
}

impl Attachment {
    pub fn pdf(filename: impl Into<String>, bytes: &[u8]) -> Self {
        Self {
            filename: filename.into(),
            content: STANDARD.encode(bytes),
            content_type: PDF_CONTENT_TYPE.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceEmail {
    pub order_ref: String,
    #[serde(rename = "to")]
    pub recipient: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
}

impl InvoiceEmail {
    pub fn new(order_ref: impl Into<String>, recipient: impl Into<String>) -> Self {
        Self {
            order_ref: order_ref.into(),
            recipient: recipient.into(),
            customer_name: None,
            attachments: Vec::new(),
        }
    }

    pub fn with_customer_name(mut self, name: impl Into<String>) -> Self {
        self.customer_name = Some(name.into());
        self
    }

    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }

    pub fn validate(&self) -> Result<(), NotifyError> {
        if self.order_ref.trim().is_empty() {
            return Err(NotifyError::InvalidRequest("order reference is empty".into()));
        }
        let recipient = self.recipient.trim();
        match recipient.split_once('@') {
            Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(()),
            _ => Err(NotifyError::InvalidRequest(format!(
                "recipient '{}' is not an email address",
                recipient
            ))),
        }
    }
}

/// Provider receipt for an accepted email.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EmailReceipt {
    pub id: String,
}

pub async fn send_invoice<D: RemoteDispatcher>(
    invoker: &Invoker<D>,
    email: &InvoiceEmail,
    options: &InvokeOptions,
) -> Result<EmailReceipt, NotifyError> {
    email.validate()?;
    let payload = serde_json::to_value(email)
        .map_err(|e| NotifyError::InvalidRequest(e.to_string()))?;

    let data = invoker
        .invoke(SEND_INVOICE_FUNCTION, &payload, options)
        .await?;

    let receipt: EmailReceipt = serde_json::from_value(data.clone())
        .map_err(|_| NotifyError::UnexpectedResponse(data.to_string()))?;
    info!(order_ref = %email.order_ref, email_id = %receipt.id, "Invoice email accepted");
    Ok(receipt)
}
