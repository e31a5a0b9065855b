//! `serve` configuration: command-line flags, `CADASTRE_*` environment
//! variables, and a `.env` file, validated into a [`ServeConfig`].

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use cadastre_storage::{MemoryLedger, QueryLedger, SqliteLedger, StorageError};
use cadastre_verify::{SimulationProfile, MAX_SIMULATED_DELAY};
use clap::{Args, ValueEnum};

/// `--database` value selecting the in-process ledger.
pub(crate) const MEMORY_DATABASE: &str = "memory";

#[derive(Debug, thiserror::Error)]
pub(crate) enum ConfigError {
    #[error("--host '{0}' is not an IP address")]
    InvalidHost(String),
    #[error("--approval-probability must be within [0, 1], got {0}")]
    InvalidProbability(f64),
    #[error("--max-delay-ms must not exceed {max} ms, got {got}")]
    DelayTooLong { max: u128, got: u64 },
    #[error("--verification-timeout-ms must be greater than zero")]
    ZeroTimeout,
    #[error("--verification-timeout-ms ({timeout}) must exceed --max-delay-ms ({max_delay})")]
    TimeoutWithinDelay { timeout: u64, max_delay: u64 },
    #[error("--tls-cert and --tls-key must both be provided")]
    IncompleteTls,
    #[error("TLS requested but this binary was built without the `tls` feature")]
    TlsUnsupported,
}

/// How the orchestrator obtains verdicts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum VerifierMode {
    /// Call the simulated authority in-process.
    Local,
    /// Call the `/result` endpoint of an authority over HTTP.
    Http,
}

/// Flags for `cadastre serve`.
#[derive(Debug, Clone, Args)]
pub(crate) struct ServeArgs {
    /// Address to bind
    #[arg(long, env = "CADASTRE_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to listen on
    #[arg(long, env = "CADASTRE_PORT", default_value_t = 8000)]
    pub port: u16,

    /// Ledger location: a `sqlite://` URL or `memory`
    #[arg(long, env = "CADASTRE_DATABASE", default_value = "sqlite://cadastre.db")]
    pub database: String,

    /// Where verdicts come from
    #[arg(long, env = "CADASTRE_VERIFIER", value_enum, default_value = "local")]
    pub verifier: VerifierMode,

    /// Base URL of the authority for `--verifier http` (default: this server)
    #[arg(long, env = "CADASTRE_AUTHORITY_URL")]
    pub authority_url: Option<String>,

    /// Upper bound of the simulated delay, in milliseconds
    #[arg(long, env = "CADASTRE_MAX_DELAY_MS", default_value_t = 60_000)]
    pub max_delay_ms: u64,

    /// Probability that the simulated authority approves a query
    #[arg(long, env = "CADASTRE_APPROVAL_PROBABILITY", default_value_t = 0.5)]
    pub approval_probability: f64,

    /// Seed for reproducible simulated answers
    #[arg(long, env = "CADASTRE_SEED")]
    pub seed: Option<u64>,

    /// Limit on a single verification, in milliseconds; must exceed --max-delay-ms
    #[arg(long, env = "CADASTRE_VERIFICATION_TIMEOUT_MS", default_value_t = 65_000)]
    pub verification_timeout_ms: u64,

    /// Require this key on every route except /ping
    #[arg(long, env = "CADASTRE_API_KEY")]
    pub api_key: Option<String>,

    /// TLS certificate file (PEM format) for HTTPS
    #[arg(long, env = "CADASTRE_TLS_CERT")]
    pub tls_cert: Option<PathBuf>,

    /// TLS private key file (PEM format) for HTTPS
    #[arg(long, env = "CADASTRE_TLS_KEY")]
    pub tls_key: Option<PathBuf>,
}

/// Where verdicts come from, resolved.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum VerifierConfig {
    Local,
    Http { authority_url: String },
}

#[derive(Debug, Clone)]
#[cfg_attr(not(feature = "tls"), allow(dead_code))]
pub(crate) struct TlsConfig {
    pub cert: PathBuf,
    pub key: PathBuf,
}

/// Validated `serve` configuration.
#[derive(Debug, Clone)]
pub(crate) struct ServeConfig {
    pub addr: SocketAddr,
    pub database: String,
    pub verifier: VerifierConfig,
    pub simulation: SimulationProfile,
    pub verification_timeout: Duration,
    pub api_key: Option<String>,
    pub tls: Option<TlsConfig>,
}

impl ServeArgs {
    pub(crate) fn validate(self) -> Result<ServeConfig, ConfigError> {
        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|_| ConfigError::InvalidHost(self.host.clone()))?;
        let addr = SocketAddr::new(ip, self.port);

        if !(0.0..=1.0).contains(&self.approval_probability) {
            return Err(ConfigError::InvalidProbability(self.approval_probability));
        }
        let max_delay = Duration::from_millis(self.max_delay_ms);
        if max_delay > MAX_SIMULATED_DELAY {
            return Err(ConfigError::DelayTooLong {
                max: MAX_SIMULATED_DELAY.as_millis(),
                got: self.max_delay_ms,
            });
        }
        if self.verification_timeout_ms == 0 {
            return Err(ConfigError::ZeroTimeout);
        }
        if self.verification_timeout_ms <= self.max_delay_ms {
            return Err(ConfigError::TimeoutWithinDelay {
                timeout: self.verification_timeout_ms,
                max_delay: self.max_delay_ms,
            });
        }

        let tls = match (self.tls_cert, self.tls_key) {
            (Some(cert), Some(key)) => Some(TlsConfig { cert, key }),
            (None, None) => None,
            _ => return Err(ConfigError::IncompleteTls),
        };
        if tls.is_some() && !cfg!(feature = "tls") {
            return Err(ConfigError::TlsUnsupported);
        }

        let verifier = match self.verifier {
            VerifierMode::Local => VerifierConfig::Local,
            VerifierMode::Http => {
                let authority_url = self
                    .authority_url
                    .unwrap_or_else(|| self_url(addr, tls.is_some()));
                VerifierConfig::Http { authority_url }
            }
        };

        Ok(ServeConfig {
            addr,
            database: self.database,
            verifier,
            simulation: SimulationProfile {
                max_delay,
                approval_probability: self.approval_probability,
                seed: self.seed,
            },
            verification_timeout: Duration::from_millis(self.verification_timeout_ms),
            api_key: self.api_key.filter(|k| !k.is_empty()),
            tls,
        })
    }
}

/// URL at which this server reaches itself.
fn self_url(addr: SocketAddr, tls: bool) -> String {
    let ip = if addr.ip().is_unspecified() {
        match addr.ip() {
            IpAddr::V4(_) => IpAddr::from([127, 0, 0, 1]),
            IpAddr::V6(_) => IpAddr::from([0u16, 0, 0, 0, 0, 0, 0, 1]),
        }
    } else {
        addr.ip()
    };
    let scheme = if tls { "https" } else { "http" };
    format!("{scheme}://{}", SocketAddr::new(ip, addr.port()))
}

/// Open the ledger named by a `--database` value, applying the schema.
pub(crate) async fn open_ledger(database: &str) -> Result<Arc<dyn QueryLedger>, StorageError> {
    if database == MEMORY_DATABASE {
        tracing::warn!("using in-memory ledger; history is lost on exit");
        return Ok(Arc::new(MemoryLedger::new()));
    }
    let ledger = SqliteLedger::connect(database).await?;
    ledger.init_schema().await?;
    Ok(Arc::new(ledger))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        serve: ServeArgs,
    }

    fn parse(args: &[&str]) -> ServeArgs {
        let mut argv = vec!["cadastre"];
        argv.extend_from_slice(args);
        TestCli::try_parse_from(argv).unwrap().serve
    }

    #[test]
    fn defaults_are_valid() {
        let config = parse(&[]).validate().unwrap();
        assert_eq!(config.addr.port(), 8000);
        assert_eq!(config.verifier, VerifierConfig::Local);
        assert_eq!(config.simulation.max_delay, MAX_SIMULATED_DELAY);
        assert_eq!(config.simulation.approval_probability, 0.5);
        assert_eq!(config.verification_timeout, Duration::from_secs(65));
        assert!(config.tls.is_none());
    }

    #[test]
    fn rejects_probability_outside_unit_interval() {
        let err = parse(&["--approval-probability", "1.5"])
            .validate()
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidProbability(_)));
    }

    #[test]
    fn rejects_delay_above_ceiling_and_zero_timeout() {
        assert!(matches!(
            parse(&["--max-delay-ms", "60001"]).validate(),
            Err(ConfigError::DelayTooLong { .. })
        ));
        assert!(matches!(
            parse(&["--verification-timeout-ms", "0"]).validate(),
            Err(ConfigError::ZeroTimeout)
        ));
    }

    #[test]
    fn timeout_must_exceed_max_delay() {
        assert!(matches!(
            parse(&["--verification-timeout-ms", "60000"]).validate(),
            Err(ConfigError::TimeoutWithinDelay {
                timeout: 60_000,
                max_delay: 60_000
            })
        ));
        assert!(matches!(
            parse(&["--max-delay-ms", "2000", "--verification-timeout-ms", "1500"]).validate(),
            Err(ConfigError::TimeoutWithinDelay { .. })
        ));
        let config = parse(&["--max-delay-ms", "2000", "--verification-timeout-ms", "2001"])
            .validate()
            .unwrap();
        assert_eq!(config.verification_timeout, Duration::from_millis(2001));
    }

    #[test]
    fn rejects_cert_without_key() {
        assert!(matches!(
            parse(&["--tls-cert", "cert.pem"]).validate(),
            Err(ConfigError::IncompleteTls)
        ));
    }

    #[test]
    fn rejects_hostname() {
        assert!(matches!(
            parse(&["--host", "localhost"]).validate(),
            Err(ConfigError::InvalidHost(_))
        ));
    }

    #[test]
    fn http_verifier_defaults_to_self() {
        let config = parse(&["--verifier", "http", "--port", "9100"])
            .validate()
            .unwrap();
        assert_eq!(
            config.verifier,
            VerifierConfig::Http {
                authority_url: "http://127.0.0.1:9100".to_string()
            }
        );

        let config = parse(&[
            "--verifier",
            "http",
            "--authority-url",
            "http://registry.internal:8080",
        ])
        .validate()
        .unwrap();
        assert_eq!(
            config.verifier,
            VerifierConfig::Http {
                authority_url: "http://registry.internal:8080".to_string()
            }
        );
    }

    #[test]
    fn empty_api_key_disables_auth() {
        let config = parse(&["--api-key", ""]).validate().unwrap();
        assert_eq!(config.api_key, None);
    }
}
