use anyhow::Context as _;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::Serialize;

use crate::domain::repository::EmailSender;
use crate::domain::types::EmailMessage;
use crate::error::TicketingError;

/// Transactional email provider over its JSON API.
#[derive(Clone)]
pub struct HttpEmailSender {
    pub http: reqwest::Client,
    pub base_url: String,
    pub api_key: String,
    pub from: String,
}

#[derive(Serialize)]
struct SendEmailBody<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: &'a str,
    html: &'a str,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_to: Option<&'a str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    attachments: Vec<AttachmentBody<'a>>,
}

#[derive(Serialize)]
struct AttachmentBody<'a> {
    filename: &'a str,
    content_type: &'a str,
    /// Base64-encoded bytes.
    content: String,
}

fn send_body<'a>(from: &'a str, message: &'a EmailMessage) -> SendEmailBody<'a> {
    SendEmailBody {
        from,
        to: [message.to.as_str()],
        subject: &message.subject,
        html: &message.html,
        text: &message.text,
        reply_to: message.reply_to.as_deref(),
        attachments: message
            .attachments
            .iter()
            .map(|a| AttachmentBody {
                filename: &a.filename,
                content_type: &a.content_type,
                content: STANDARD.encode(&a.content),
            })
            .collect(),
    }
}

impl EmailSender for HttpEmailSender {
    async fn send(&self, message: &EmailMessage) -> Result<(), TicketingError> {
        let url = format!("{}/emails", self.base_url.trim_end_matches('/'));
        self.http
            .post(url)
            .bearer_auth(&self.api_key)
            .json(&send_body(&self.from, message))
            .send()
            .await
            .context("send email")?
            .error_for_status()
            .context("email provider rejected message")?;
        Ok(())
    }
}
