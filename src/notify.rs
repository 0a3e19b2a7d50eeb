use amqprs::{
    callbacks::{DefaultChannelCallback, DefaultConnectionCallback},
    channel::{BasicPublishArguments, Channel, QueueDeclareArguments},
    connection::{Connection, OpenConnectionArguments},
    BasicProperties,
};
use chrono::{NaiveDate, NaiveTime};
use log::{error, info, warn};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;
use crate::auth::{Actor, Role};
use crate::config::AppConfig;

type Result<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;

const MAX_FIELD_LEN: usize = 255;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    RequestToCompany,
    ApprovalToCandidate,
}

/// Message handed to the external mailer. The mailer owns actual delivery;
/// this side only shapes and publishes it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationMessage {
    pub message_id: Uuid,
    pub kind: NotificationKind,
    pub recipient_email: String,
    pub company_name: String,
    pub candidate_name: Option<String>,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub cv_url: Option<String>,
}

/// Publisher for booking notifications. Every publish is best-effort: callers
/// spawn it off the request path and failures are logged, never propagated to
/// the booking operation.
#[derive(Clone)]
pub struct NotificationService {
    connection: Option<Arc<Connection>>,
    queue_name: String,
    amqp_host: String,
    amqp_port: u16,
    amqp_user: String,
    amqp_password: String,
}

impl NotificationService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            connection: None,
            queue_name: "interview.notifications".to_string(),
            amqp_host: config.amqp_host.clone(),
            amqp_port: config.amqp_port,
            amqp_user: config.amqp_user.clone(),
            amqp_password: config.amqp_password.clone(),
        }
    }

    pub async fn initialize(&mut self) -> Result<()> {
        info!("Connecting to RabbitMQ for notification dispatch...");

        let connection = Connection::open(&OpenConnectionArguments::new(
            &self.amqp_host,
            self.amqp_port,
            &self.amqp_user,
            &self.amqp_password,
        ))
        .await?;

        connection.register_callback(DefaultConnectionCallback).await?;

        let setup_channel = connection.open_channel(None).await?;
        setup_channel.register_callback(DefaultChannelCallback).await?;

        setup_channel
            .queue_declare(
                QueueDeclareArguments::new(&self.queue_name)
                    .durable(true)
                    .finish(),
            )
            .await?;

        let _ = setup_channel.close().await;

        self.connection = Some(Arc::new(connection));

        info!("Notification queue '{}' ready", self.queue_name);

        Ok(())
    }

    async fn get_fresh_channel(&self) -> Result<Channel> {
        if let Some(connection) = &self.connection {
            let channel = connection.open_channel(None).await?;
            channel.register_callback(DefaultChannelCallback).await?;
            Ok(channel)
        } else {
            Err("RabbitMQ connection not initialized".into())
        }
    }

    /// Candidate requested an interview; tell the company.
    pub async fn publish_booking_request(
        &self,
        actor: &Actor,
        company_email: &str,
        company_name: &str,
        candidate_name: Option<&str>,
        date: NaiveDate,
        time: NaiveTime,
        cv_url: Option<&str>,
    ) -> Result<()> {
        if actor.role != Role::Candidate {
            return Err("only candidates may send booking request notifications".into());
        }

        let message = NotificationMessage {
            message_id: Uuid::new_v4(),
            kind: NotificationKind::RequestToCompany,
            recipient_email: company_email.to_string(),
            company_name: company_name.to_string(),
            candidate_name: candidate_name.map(|n| n.to_string()),
            date,
            time,
            cv_url: cv_url.map(|u| u.to_string()),
        };

        self.publish(message).await
    }

    /// Company approved a request; tell the candidate when to show up.
    pub async fn publish_booking_approval(
        &self,
        actor: &Actor,
        candidate_email: &str,
        company_name: &str,
        date: NaiveDate,
        time: NaiveTime,
    ) -> Result<()> {
        if actor.role == Role::Candidate {
            return Err("candidates may not send approval notifications".into());
        }

        let message = NotificationMessage {
            message_id: Uuid::new_v4(),
            kind: NotificationKind::ApprovalToCandidate,
            recipient_email: candidate_email.to_string(),
            company_name: company_name.to_string(),
            candidate_name: None,
            date,
            time,
            cv_url: None,
        };

        self.publish(message).await
    }

    async fn publish(&self, message: NotificationMessage) -> Result<()> {
        validate_message(&message)?;

        let serialized = serde_json::to_string(&message)?;
        let content = serialized.into_bytes();

        let max_retries = 2;
        let mut delay_ms = 25;

        for attempt in 1..=max_retries {
            match self.publish_once(content.clone()).await {
                Ok(()) => {
                    info!(
                        "Published {:?} notification {} for '{}'",
                        message.kind, message.message_id, message.company_name
                    );
                    return Ok(());
                }
                Err(e) if attempt < max_retries => {
                    warn!(
                        "Notification publish failed (attempt {}/{}), retrying: {:?}",
                        attempt, max_retries, e
                    );
                    tokio::time::sleep(tokio::time::Duration::from_millis(delay_ms)).await;
                    delay_ms *= 2;
                }
                Err(e) => {
                    error!("Notification publish failed after {} attempts: {:?}", max_retries, e);
                    return Err(e);
                }
            }
        }

        Ok(())
    }

    async fn publish_once(&self, content: Vec<u8>) -> Result<()> {
        let channel = self.get_fresh_channel().await?;

        let properties = BasicProperties::default()
            .with_delivery_mode(2) // persistent
            .finish();

        channel
            .basic_publish(
                properties,
                content,
                BasicPublishArguments::new("", &self.queue_name),
            )
            .await?;

        let _ = channel.close().await;

        Ok(())
    }
}

fn validate_message(message: &NotificationMessage) -> Result<()> {
    let email_re = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$")?;

    if !email_re.is_match(&message.recipient_email) {
        return Err(format!("'{}' is not a valid email address", message.recipient_email).into());
    }
    if message.company_name.is_empty() || message.company_name.len() > MAX_FIELD_LEN {
        return Err("company name is empty or too long".into());
    }
    if let Some(name) = &message.candidate_name {
        if name.len() > MAX_FIELD_LEN {
            return Err("candidate name is too long".into());
        }
    }
    if let Some(url) = &message.cv_url {
        if url.len() > 2048 {
            return Err("cv url is too long".into());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(email: &str, company: &str) -> NotificationMessage {
        NotificationMessage {
            message_id: Uuid::new_v4(),
            kind: NotificationKind::RequestToCompany,
            recipient_email: email.to_string(),
            company_name: company.to_string(),
            candidate_name: None,
            date: NaiveDate::from_ymd_opt(2025, 3, 14).unwrap(),
            time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            cv_url: None,
        }
    }

    #[test]
    fn rejects_malformed_emails() {
        assert!(validate_message(&message("not-an-email", "Acme")).is_err());
        assert!(validate_message(&message("a@b", "Acme")).is_err());
        assert!(validate_message(&message("hr@acme.example", "Acme")).is_ok());
    }

    #[test]
    fn rejects_oversized_fields() {
        assert!(validate_message(&message("hr@acme.example", "")).is_err());
        let long = "x".repeat(300);
        assert!(validate_message(&message("hr@acme.example", &long)).is_err());
    }

    #[test]
    fn kind_serializes_snake_case() {
        let json = serde_json::to_string(&NotificationKind::RequestToCompany).unwrap();
        assert_eq!(json, "\"request_to_company\"");
        let json = serde_json::to_string(&NotificationKind::ApprovalToCandidate).unwrap();
        assert_eq!(json, "\"approval_to_candidate\"");
    }
}
