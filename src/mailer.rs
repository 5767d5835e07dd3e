use crate::config::MailConfig;
use crate::traits::Mailer;
use crate::types::{DeliveryStatus, PulseError, PulseReport, Result};
use async_trait::async_trait;
use chrono::Utc;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::fmt::Write as _;
use std::sync::Mutex;
use tracing::info;

/// SMTP delivery via lettre.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(config: &MailConfig) -> Result<Self> {
        let from: Mailbox = config
            .from_email
            .parse()
            .map_err(|e| PulseError::Config(format!("invalid FROM_EMAIL: {e}")))?;

        let mut builder = if config.use_tls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.server)?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.server)
        };
        builder = builder.port(config.port);
        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        Ok(Self {
            transport: builder.build(),
            from,
        })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn deliver(&self, report: &PulseReport, recipients: &[String]) -> Result<DeliveryStatus> {
        if recipients.is_empty() {
            return Err(PulseError::Validation("no recipients to deliver to".into()));
        }

        let subject = render_subject(report);
        let mut builder = Message::builder()
            .from(self.from.clone())
            .subject(subject.clone())
            .header(ContentType::TEXT_PLAIN);
        for recipient in recipients {
            let mailbox: Mailbox = recipient.parse().map_err(|e| {
                PulseError::Validation(format!("invalid recipient address {recipient}: {e}"))
            })?;
            builder = builder.to(mailbox);
        }
        let email = builder.body(render_body(report))?;

        self.transport.send(email).await?;
        info!("delivered pulse to {} recipients", recipients.len());

        Ok(DeliveryStatus {
            recipients: recipients.to_vec(),
            subject,
            mock: false,
            sent_at: Utc::now(),
        })
    }
}

/// Records delivery intent without network I/O.
#[derive(Default)]
pub struct MockMailer {
    sent: Mutex<Vec<DeliveryStatus>>,
}

impl MockMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deliveries(&self) -> Vec<DeliveryStatus> {
        self.sent.lock().expect("mailer mutex poisoned").clone()
    }
}

#[async_trait]
impl Mailer for MockMailer {
    async fn deliver(&self, report: &PulseReport, recipients: &[String]) -> Result<DeliveryStatus> {
        let status = DeliveryStatus {
            recipients: recipients.to_vec(),
            subject: render_subject(report),
            mock: true,
            sent_at: Utc::now(),
        };
        info!(
            "mock delivery of pulse for {} to {} recipients",
            report.window,
            recipients.len()
        );
        self.sent
            .lock()
            .expect("mailer mutex poisoned")
            .push(status.clone());
        Ok(status)
    }
}

pub(crate) fn render_subject(report: &PulseReport) -> String {
    format!(
        "Weekly App Review Pulse ({} to {})",
        report.window.start_date, report.window.end_date
    )
}

pub(crate) fn render_body(report: &PulseReport) -> String {
    let mut body = String::new();
    let _ = writeln!(body, "Hi Team,");
    let _ = writeln!(body);
    let _ = writeln!(
        body,
        "Here is the app review pulse for {}.",
        report.window
    );
    let _ = writeln!(body);

    if !report.top_themes.is_empty() {
        let _ = writeln!(body, "Top Themes:");
        for summary in &report.top_themes {
            let _ = writeln!(body, "- {} ({} reviews)", summary.theme, summary.review_count);
            for bullet in &summary.bullet_points {
                let _ = writeln!(body, "  - {bullet}");
            }
        }
        let _ = writeln!(body);
    }

    if !report.quotes.is_empty() {
        let _ = writeln!(body, "User Voice (Quotes):");
        for quote in &report.quotes {
            let _ = writeln!(body, "- \"{quote}\"");
        }
        let _ = writeln!(body);
    }

    if !report.action_ideas.is_empty() {
        let _ = writeln!(body, "Action Ideas:");
        for idea in &report.action_ideas {
            let _ = writeln!(body, "- {idea}");
        }
        let _ = writeln!(body);
    }

    let _ = writeln!(body, "{}", report.narrative);
    body
}
