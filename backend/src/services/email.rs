use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::{authentication::Credentials, PoolConfig},
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use std::time::Duration;
use tracing::{error, info, warn};

use crate::config::SmtpConfig;
use crate::workflows::{CallContext, CollaboratorError, EmailCollaborator, OutboundEmail};

/// Outbound mail for workflow steps. Without SMTP settings every send fails.
#[derive(Debug, Clone)]
pub struct EmailService {
    transport: Option<AsyncSmtpTransport<Tokio1Executor>>,
    from_email: String,
    from_name: String,
}

impl EmailService {
    pub fn new(smtp_config: &SmtpConfig) -> anyhow::Result<Self> {
        let transport = if smtp_config.is_configured() {
            let creds = Credentials::new(smtp_config.username.clone(), smtp_config.password.clone());

            let builder = if smtp_config.use_tls {
                AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&smtp_config.host)?
            } else {
                AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&smtp_config.host)
            };

            Some(
                builder
                    .port(smtp_config.port)
                    .credentials(creds)
                    .pool_config(PoolConfig::new().max_size(10))
                    .timeout(Some(Duration::from_secs(10)))
                    .build(),
            )
        } else {
            warn!("SMTP is not configured; workflow email steps will fail");
            None
        };

        Ok(EmailService {
            transport,
            from_email: smtp_config.from_email.clone(),
            from_name: smtp_config.from_name.clone(),
        })
    }

    pub fn unconfigured() -> Self {
        EmailService {
            transport: None,
            from_email: String::new(),
            from_name: String::new(),
        }
    }

    fn build_message(&self, to_email: &str, subject: &str, body: &str) -> Result<Message, CollaboratorError> {
        let from = format!("{} <{}>", self.from_name, self.from_email)
            .parse::<Mailbox>()
            .map_err(|e| CollaboratorError::Rejected(format!("invalid sender address: {}", e)))?;
        let to = to_email
            .parse::<Mailbox>()
            .map_err(|e| CollaboratorError::Rejected(format!("invalid recipient '{}': {}", to_email, e)))?;

        Message::builder()
            .from(from)
            .to(to)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_string())
            .map_err(|e| CollaboratorError::Rejected(e.to_string()))
    }
}

#[async_trait]
impl EmailCollaborator for EmailService {
    async fn send(&self, ctx: &CallContext, email: OutboundEmail) -> Result<(), CollaboratorError> {
        let transport = self
            .transport
            .as_ref()
            .ok_or_else(|| CollaboratorError::Unavailable("SMTP is not configured".to_string()))?;

        for recipient in &email.recipients {
            let message = self.build_message(recipient, &email.subject, &email.body)?;

            match transport.send(message).await {
                Ok(_) => info!(
                    "Workflow email sent to {} (execution {})",
                    recipient, ctx.execution_id
                ),
                Err(e) => {
                    error!("Failed to send workflow email to {}: {}", recipient, e);
                    return Err(CollaboratorError::Unavailable(e.to_string()));
                }
            }
        }

        Ok(())
    }
}
