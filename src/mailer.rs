use anyhow::{Context, Result};
use lettre::{
    Message, SmtpTransport, Transport, message::header::ContentType,
    transport::smtp::authentication::Credentials,
};

use crate::config::Config;

const DEFAULT_FROM: &str = "BlueMoon <no-reply@bluemoon.local>";

/// Outgoing mail. Without SMTP settings every send is skipped with a warning.
#[derive(Clone)]
pub struct Mailer {
    transport: Option<SmtpTransport>,
    from: String,
}

impl Mailer {
    pub fn from_config(config: &Config) -> Result<Self> {
        let from = config
            .smtp_from
            .clone()
            .unwrap_or_else(|| DEFAULT_FROM.to_string());

        let transport = match (&config.smtp_host, &config.smtp_username, &config.smtp_password) {
            (Some(host), Some(username), Some(password)) => {
                let creds = Credentials::new(username.clone(), password.clone());
                let transport = SmtpTransport::relay(host)
                    .with_context(|| format!("invalid SMTP host {}", host))?
                    .credentials(creds)
                    .build();
                Some(transport)
            }
            _ => {
                tracing::warn!("SMTP is not configured, outgoing mail is disabled");
                None
            }
        };

        Ok(Mailer { transport, from })
    }

    /// A mailer that never sends
    #[cfg(test)]
    pub fn disabled() -> Self {
        Mailer {
            transport: None,
            from: DEFAULT_FROM.to_string(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.transport.is_some()
    }

    /// Send the login of a freshly created resident account
    pub async fn send_credentials(
        &self,
        to: &str,
        full_name: &str,
        username: &str,
        password: &str,
    ) -> Result<()> {
        let Some(transport) = self.transport.clone() else {
            tracing::warn!(%to, "mail disabled, credentials not sent");
            return Ok(());
        };

        let email = credentials_message(&self.from, to, full_name, username, password)?;

        // SmtpTransport blocks
        tokio::task::spawn_blocking(move || transport.send(&email))
            .await
            .context("mail task panicked")?
            .context("failed to send email")?;

        tracing::info!(%to, %username, "account credentials sent");
        Ok(())
    }
}

pub fn credentials_message(
    from: &str,
    to: &str,
    full_name: &str,
    username: &str,
    password: &str,
) -> Result<Message> {
    let body = format!(
        "Xin chào {},\n\n\
         Tài khoản BlueMoon của bạn đã được tạo.\n\n\
         Tên đăng nhập: {}\n\
         Mật khẩu tạm thời: {}\n\n\
         Vui lòng đổi mật khẩu sau lần đăng nhập đầu tiên.\n",
        full_name, username, password
    );

    let email = Message::builder()
        .from(from.parse().context("invalid sender address")?)
        .to(to.parse().context("invalid recipient address")?)
        .subject("BlueMoon account")
        .header(ContentType::TEXT_PLAIN)
        .body(body)?;

    Ok(email)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credentials_message_is_addressed_to_resident() {
        let email = credentials_message(
            DEFAULT_FROM,
            "resident@example.com",
            "Trần Thị B",
            "resident_1a2b3c4d",
            "s3cretPass12",
        )
        .unwrap();

        let to: Vec<String> = email.envelope().to().iter().map(|a| a.to_string()).collect();
        assert_eq!(to, vec!["resident@example.com"]);

        let raw = String::from_utf8(email.formatted()).unwrap();
        assert!(raw.contains("Subject: BlueMoon account"));
    }

    #[test]
    fn bad_address_is_an_error() {
        assert!(credentials_message(DEFAULT_FROM, "not an address", "x", "u", "p").is_err());
    }

    #[test]
    fn disabled_mailer_reports_state() {
        assert!(!Mailer::disabled().is_enabled());
    }

    fn config(pairs: &[(&str, &str)]) -> Config {
        envy::from_iter::<_, Config>(pairs.iter().map(|(k, v)| (k.to_string(), v.to_string()))).unwrap()
    }

    #[test]
    fn smtp_needs_host_username_and_password() {
        let partial = config(&[
            ("DATABASE_URL", "postgres://localhost/bluemoon"),
            ("SMTP_HOST", "smtp.example.com"),
            ("SMTP_USERNAME", "mailer"),
        ]);
        assert!(!Mailer::from_config(&partial).unwrap().is_enabled());

        let full = config(&[
            ("DATABASE_URL", "postgres://localhost/bluemoon"),
            ("SMTP_HOST", "smtp.example.com"),
            ("SMTP_USERNAME", "mailer"),
            ("SMTP_PASSWORD", "secret"),
        ]);
        assert!(Mailer::from_config(&full).unwrap().is_enabled());
    }
}
