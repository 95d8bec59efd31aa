//! Email verification codes
//!
//! Generates a six-digit one-time code and hands it to a delivery channel.
//! The code is also returned to the caller, which compares it client-side.

use async_trait::async_trait;
use rand::Rng;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info};

use crate::types::{CivicError, Result};

pub const VERIFICATION_SUBJECT: &str = "Your Verification Code";

/// Message handed to a delivery channel
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutgoingMail {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Delivery channel for verification mail
#[async_trait]
pub trait CodeDelivery: Send + Sync {
    async fn deliver(&self, mail: OutgoingMail) -> Result<()>;
}

/// Writes messages to the log instead of sending them. Dev mode only.
#[derive(Debug, Default)]
pub struct LogDelivery;

#[async_trait]
impl CodeDelivery for LogDelivery {
    async fn deliver(&self, mail: OutgoingMail) -> Result<()> {
        info!(
            to = %mail.to,
            subject = %mail.subject,
            body = %mail.body,
            "Mail (not sent, dev mode)"
        );
        Ok(())
    }
}

/// POSTs each message as JSON to an HTTP mail relay
pub struct RelayDelivery {
    url: String,
    from: Option<String>,
    http_client: reqwest::Client,
}

impl RelayDelivery {
    pub fn new(url: impl Into<String>, from: Option<String>) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| CivicError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            url: url.into(),
            from,
            http_client,
        })
    }
}

#[async_trait]
impl CodeDelivery for RelayDelivery {
    async fn deliver(&self, mut mail: OutgoingMail) -> Result<()> {
        if mail.from.is_none() {
            mail.from = self.from.clone();
        }

        let response = self
            .http_client
            .post(&self.url)
            .json(&mail)
            .send()
            .await
            .map_err(|e| CivicError::Internal(format!("Mail relay unreachable: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CivicError::Internal(format!(
                "Mail relay returned {}",
                status
            )));
        }

        debug!(to = %mail.to, "Verification mail handed to relay");
        Ok(())
    }
}

/// Random code in `100000..=999999`
pub fn generate_code() -> String {
    rand::thread_rng().gen_range(100_000..=999_999u32).to_string()
}

/// Generate a code for `email`, deliver it, and return it.
pub async fn send_verification_code(delivery: &dyn CodeDelivery, email: &str) -> Result<String> {
    let email = email.trim();
    if email.is_empty() {
        return Err(CivicError::InvalidArgument("Email is required.".into()));
    }

    let code = generate_code();
    delivery
        .deliver(OutgoingMail {
            from: None,
            to: email.to_string(),
            subject: VERIFICATION_SUBJECT.to_string(),
            body: format!("Your OTP is: {}", code),
        })
        .await
        .map_err(|e| match e {
            CivicError::Internal(_) => e,
            other => CivicError::Internal(other.to_string()),
        })?;

    Ok(code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<OutgoingMail>>);

    #[async_trait]
    impl CodeDelivery for Recorder {
        async fn deliver(&self, mail: OutgoingMail) -> Result<()> {
            self.0.lock().unwrap().push(mail);
            Ok(())
        }
    }

    struct Broken;

    #[async_trait]
    impl CodeDelivery for Broken {
        async fn deliver(&self, _mail: OutgoingMail) -> Result<()> {
            Err(CivicError::Config("relay misconfigured".into()))
        }
    }

    #[test]
    fn test_code_shape() {
        for _ in 0..100 {
            let code = generate_code();
            assert_eq!(code.len(), 6);
            let n: u32 = code.parse().unwrap();
            assert!((100_000..=999_999).contains(&n));
        }
    }

    #[tokio::test]
    async fn test_sends_code() {
        let recorder = Recorder::default();
        let code = send_verification_code(&recorder, "ravi@example.com")
            .await
            .unwrap();

        let sent = recorder.0.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "ravi@example.com");
        assert_eq!(sent[0].subject, VERIFICATION_SUBJECT);
        assert_eq!(sent[0].body, format!("Your OTP is: {}", code));
    }

    #[tokio::test]
    async fn test_empty_email() {
        let err = send_verification_code(&LogDelivery, " ").await.unwrap_err();
        assert!(matches!(err, CivicError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_delivery_failure_is_internal() {
        let err = send_verification_code(&Broken, "a@x.com").await.unwrap_err();
        assert!(matches!(err, CivicError::Internal(_)));
    }
}
