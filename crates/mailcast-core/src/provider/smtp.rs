//! SMTP transport over lettre

use super::{OutgoingMessage, SendReceipt, Transport};
use async_trait::async_trait;
use chrono::Utc;
use lettre::{
    message::{header::ContentType, Mailbox, MultiPart, SinglePart},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use mailcast_common::{Error, Result};
use mailcast_storage::models::{ProviderKind, ProviderSecret};
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

/// Port on which SMTP servers expect TLS from the first byte
const IMPLICIT_TLS_PORT: u16 = 465;

/// Sends through an SMTP relay
pub struct SmtpTransport {
    host: String,
    mailer: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpTransport {
    pub fn new(secret: &ProviderSecret) -> Result<Self> {
        let ProviderSecret::Smtp {
            host,
            port,
            username,
            password,
            allow_plaintext,
        } = secret
        else {
            return Err(Error::Configuration("Not an SMTP provider".to_string()));
        };

        let builder = if *port == IMPLICIT_TLS_PORT {
            AsyncSmtpTransport::<Tokio1Executor>::relay(host)
        } else if *allow_plaintext {
            Ok(AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host))
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
        };

        let mut builder = builder
            .map_err(|e| Error::Configuration(format!("Failed to create SMTP transport: {}", e)))?
            .port(*port);

        if let (Some(username), Some(password)) = (username, password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        let mailer = builder.timeout(Some(Duration::from_secs(30))).build();

        Ok(Self {
            host: host.clone(),
            mailer,
        })
    }

    fn build_message(message: &OutgoingMessage, message_id: &str) -> Result<Message> {
        let from: Mailbox = message
            .from_header()
            .parse()
            .map_err(|e| Error::Validation(format!("Invalid from address: {}", e)))?;
        let to: Mailbox = message
            .to
            .parse()
            .map_err(|e| Error::Validation(format!("Invalid to address: {}", e)))?;

        let builder = Message::builder()
            .from(from)
            .to(to)
            .subject(&message.subject)
            .message_id(Some(message_id.to_string()));

        let email = if message.text_body.is_empty() {
            builder
                .header(ContentType::TEXT_HTML)
                .body(message.html_body.clone())
        } else {
            builder.multipart(
                MultiPart::alternative()
                    .singlepart(SinglePart::plain(message.text_body.clone()))
                    .singlepart(SinglePart::html(message.html_body.clone())),
            )
        };

        email.map_err(|e| Error::Validation(format!("Failed to build email: {}", e)))
    }
}

/// Build an RFC 5322 message; shared with the OAuth transport's raw upload
pub(crate) fn build_mime(message: &OutgoingMessage, message_id: &str) -> Result<Vec<u8>> {
    Ok(SmtpTransport::build_message(message, message_id)?.formatted())
}

pub(crate) fn new_message_id(from_address: &str) -> String {
    let domain = from_address
        .rsplit_once('@')
        .map(|(_, d)| d)
        .unwrap_or("mailcast.local");
    format!("<{}.{}@{}>", Uuid::new_v4(), Utc::now().timestamp(), domain)
}

#[async_trait]
impl Transport for SmtpTransport {
    async fn send(&self, message: &OutgoingMessage) -> Result<SendReceipt> {
        let message_id = new_message_id(&message.from_address);
        let email = Self::build_message(message, &message_id)?;

        let response = self
            .mailer
            .send(email)
            .await
            .map_err(|e| Error::Provider(format!("SMTP send via {} failed: {}", self.host, e)))?;
        debug!(host = %self.host, code = %response.code(), "SMTP relay accepted message");

        Ok(SendReceipt {
            message_id,
            provider: ProviderKind::Smtp,
        })
    }

    async fn test_connection(&self) -> Result<()> {
        match self.mailer.test_connection().await {
            Ok(true) => Ok(()),
            Ok(false) => Err(Error::Provider(format!(
                "SMTP server {} did not accept the connection",
                self.host
            ))),
            Err(e) => Err(Error::Provider(format!(
                "SMTP connection to {} failed: {}",
                self.host, e
            ))),
        }
    }
}
