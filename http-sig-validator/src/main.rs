use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context};
use chrono::{DateTime, TimeZone, Utc};
use http_sig_verify::{
    canonicalize, CanonicalizeConfig, RsaSha256Verify, SignatureParams, SimpleKeyResolver,
    VerificationContext, VerificationOutcome, VerifyingConfig, VerifyingExt, SIGNATURE,
};
use structopt::StructOpt;

mod inbox;
mod server;

use inbox::Inbox;
use server::InboxServer;

#[derive(Debug, StructOpt)]
enum Mode {
    /// Print the signature string of the request read from stdin
    Canonicalize,
    /// Verify the signature of the request read from stdin
    Verify,
    /// Run an inbox which accepts signed deliveries
    Serve,
}

#[derive(Debug, StructOpt)]
#[structopt(about = "A validator for HTTP signatures on incoming requests.")]
struct Opt {
    #[structopt(subcommand)]
    mode: Mode,

    /// A Key Id string.
    #[structopt(short, long = "keyId", global = true)]
    key_id: Option<String>,

    /// A public key file name (PEM, or PKCS#1 DER).
    #[structopt(short = "u", long, parse(from_os_str), global = true)]
    public_key: Option<PathBuf>,

    /// The identity owning the key. Defaults to the key id without its fragment.
    #[structopt(short, long, global = true)]
    identity: Option<String>,

    /// Evaluate time windows at this unix timestamp instead of the current time.
    #[structopt(short, long, global = true)]
    now: Option<i64>,

    /// Rebuild (request-target) with the method "post" regardless of the request method.
    #[structopt(long, global = true)]
    legacy_request_target: bool,

    /// Refuse keys from this domain.
    #[structopt(long, global = true, number_of_values = 1)]
    block_domain: Vec<String>,

    /// Address for the inbox server.
    #[structopt(long, global = true, default_value = "127.0.0.1:8080")]
    bind: String,

    /// Number of deliveries kept by the inbox server.
    #[structopt(long, global = true, default_value = "100")]
    inbox_capacity: usize,
}

impl Opt {
    fn now(&self) -> anyhow::Result<Option<DateTime<Utc>>> {
        self.now
            .map(|now| {
                Utc.timestamp_opt(now, 0)
                    .single()
                    .ok_or_else(|| anyhow!("Invalid timestamp: {}", now))
            })
            .transpose()
    }

    fn key_resolver(&self) -> anyhow::Result<SimpleKeyResolver> {
        let mut key_resolver = SimpleKeyResolver::default();

        if let Some(path) = self.public_key.as_ref() {
            let key_id = self
                .key_id
                .as_deref()
                .ok_or_else(|| anyhow!("A key id is required with a public key"))?;
            let identity = match self.identity.as_deref() {
                Some(identity) => identity,
                None => key_id.split('#').next().unwrap_or(key_id),
            };

            let key_data =
                fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
            let key = match std::str::from_utf8(&key_data) {
                Ok(pem) if pem.trim_start().starts_with("-----BEGIN") => {
                    RsaSha256Verify::from_pem(pem)?
                }
                _ => RsaSha256Verify::from_der(&key_data)?,
            };
            key_resolver.add(key_id, identity, Arc::new(key));
        }

        for domain in &self.block_domain {
            key_resolver.block_domain(domain);
        }

        Ok(key_resolver)
    }

    fn verifying_config(&self) -> anyhow::Result<VerifyingConfig> {
        Ok(VerifyingConfig::new(self.key_resolver()?)
            .with_legacy_request_target(self.legacy_request_target))
    }

    fn read_request(&self) -> anyhow::Result<VerificationContext> {
        let req = VerificationContext::from_reader(&mut io::stdin().lock())?;
        log::info!("{:?}", req);
        Ok(match self.now()? {
            Some(now) => req.at(now),
            None => req,
        })
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let opt = Opt::from_args();

    match opt.mode {
        Mode::Canonicalize => {
            let req = opt.read_request()?;
            let header = req
                .header_str(&SIGNATURE)
                .ok_or_else(|| anyhow!("Request not signed"))?;
            let params: SignatureParams = header.parse()?;
            let config =
                CanonicalizeConfig::new().with_legacy_request_target(opt.legacy_request_target);
            let res = canonicalize(&req, &params, &config)?;
            io::stdout().lock().write_all(res.as_bytes())?;
        }
        Mode::Verify => {
            let req = opt.read_request()?;
            match req.verify(&opt.verifying_config()?) {
                VerificationOutcome::Verified { identity } => println!("{}", identity),
                VerificationOutcome::Failed(failure) => {
                    return Err(anyhow!("{} {}", failure.status_code(), failure));
                }
            }
        }
        Mode::Serve => {
            let server = InboxServer::new(opt.verifying_config()?, Inbox::new(opt.inbox_capacity))
                .with_now(opt.now()?);
            log::info!("Listening on {}", opt.bind);
            rouille::start_server(opt.bind.as_str(), move |request| server.handle(request));
        }
    }

    Ok(())
}
