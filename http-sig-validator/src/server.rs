use chrono::{DateTime, Utc};
use http_sig_verify::{VerificationContext, VerificationOutcome, VerifyingConfig, VerifyingExt};
use rouille::{Request, Response};

use crate::inbox::Inbox;

/// Inbox test harness: signed deliveries are accepted on `POST /inbox` and
/// can be read back from `GET /inspect`.
#[derive(Debug)]
pub struct InboxServer {
    config: VerifyingConfig,
    inbox: Inbox,
    now: Option<DateTime<Utc>>,
}

impl InboxServer {
    pub fn new(config: VerifyingConfig, inbox: Inbox) -> Self {
        Self {
            config,
            inbox,
            now: None,
        }
    }

    /// Evaluate time windows against a fixed instant instead of the clock.
    pub fn with_now(mut self, now: Option<DateTime<Utc>>) -> Self {
        self.now = now;
        self
    }

    pub fn handle(&self, request: &Request) -> Response {
        match (request.method(), request.url().as_str()) {
            ("POST", "/inbox") => self.receive(request),
            ("GET", "/inspect") => Response::text(self.inbox.dump()),
            _ => Response::empty_404(),
        }
    }

    fn receive(&self, request: &Request) -> Response {
        let mut ctx = match VerificationContext::from_rouille(request) {
            Ok(ctx) => ctx,
            Err(e) => {
                log::warn!("Unreadable request: {:#}", e);
                return Response::text(format!("{:#}", e)).with_status_code(400);
            }
        };
        if let Some(now) = self.now {
            ctx = ctx.at(now);
        }

        match ctx.verify(&self.config) {
            VerificationOutcome::Verified { identity } => {
                log::info!("Accepted delivery from {}", identity);
                self.inbox.push(ctx.body().to_vec());
                Response::text("OK")
            }
            VerificationOutcome::Failed(failure) => {
                Response::text(failure.to_string()).with_status_code(failure.status_code().as_u16())
            }
        }
    }
}
