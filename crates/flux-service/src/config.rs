//! Service configuration.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use flux_core::Amount;

use crate::dispatcher::DispatchConfig;
use crate::ipn::ProcessorSettings;

/// Account level every visitor has, logged in or not.
pub const LEVEL_ANYONE: i32 = -1;

/// Level of a regular logged-in account.
pub const LEVEL_NORMAL: i32 = 0;

/// Level required for the admin screens.
pub const LEVEL_ADMIN: i32 = 99;

/// How to treat a notification whose `txn_id` already earned credits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicatePolicy {
    /// Credit every verified notification, replays included.
    #[default]
    Allow,
    /// Audit replays with zero credits instead of crediting again.
    Skip,
}

impl DuplicatePolicy {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "allow" => Some(Self::Allow),
            "skip" => Some(Self::Skip),
            _ => None,
        }
    }
}

/// One game server group and where its login database lives.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServerGroupConfig {
    /// Human-readable server name, matched against the `custom` payload.
    pub name: String,

    /// MySQL connection URL.
    pub database_url: String,

    /// Login database holding the `login` table.
    pub login_database: String,

    /// Create the Flux ledger tables on startup if missing.
    #[serde(default)]
    pub create_schema: bool,
}

/// Errors raised by configuration validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// No default module for the dispatcher.
    #[error("default module is not set (DEFAULT_MODULE)")]
    MissingDefaultModule,

    /// No default action for the dispatcher.
    #[error("default action is not set (DEFAULT_ACTION)")]
    MissingDefaultAction,

    /// No PayPal business email.
    #[error("PayPal business email is not set (PAYPAL_BUSINESS_EMAIL)")]
    MissingBusinessEmail,

    /// Exchange rate missing, malformed or not positive.
    #[error("credit exchange rate must be a positive amount (CREDIT_EXCHANGE_RATE)")]
    InvalidExchangeRate,

    /// Donation currency is not a three-letter code.
    #[error("donation currency must be a three-letter code, got {0:?}")]
    InvalidCurrency(String),

    /// Two server groups share a name.
    #[error("duplicate server group name: {0}")]
    DuplicateServer(String),
}

/// Service configuration loaded from environment variables and JSON files.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Address to listen on (default: "0.0.0.0:8080").
    pub listen_addr: String,

    /// Root for `logs/paypal.log` and `logs/transactions/` (default: "data").
    pub data_dir: String,

    /// PayPal host answering the IPN call-back (default: "www.paypal.com").
    pub paypal_ipn_host: String,

    /// Primary PayPal business email.
    pub paypal_business_email: String,

    /// Additional receiver emails accepted on notifications.
    pub paypal_receiver_emails: Vec<String>,

    /// Currency donations are exchanged in (default: "USD").
    pub donation_currency: String,

    /// Amount of `donation_currency` per credit (default: 1.00).
    pub credit_exchange_rate: Amount,

    /// Timeout for the verification call-back in seconds (default: 20).
    pub paypal_verify_timeout_seconds: u64,

    /// Replay handling for already-credited transactions.
    pub duplicate_policy: DuplicatePolicy,

    /// Route from path segments instead of `module`/`action` parameters.
    pub use_clean_urls: bool,

    /// Base URI the panel is mounted at (default: "/").
    pub base_uri: String,

    /// Module used when the request names none (default: "main").
    pub default_module: String,

    /// Action used when the request names none (default: "index").
    pub default_action: String,

    /// Minimum account level per `module` or `module/action`.
    pub access_rules: HashMap<String, i32>,

    /// Admin API key for the admin endpoints.
    pub admin_api_key: Option<String>,

    /// HS256 secret shared with the login subsystem for session tokens.
    pub session_secret: Option<String>,

    /// CORS allowed origins.
    pub cors_origins: Vec<String>,

    /// Maximum request body size in bytes.
    pub max_body_bytes: usize,

    /// Request timeout in seconds.
    pub request_timeout_seconds: u64,

    /// Registered game server groups.
    pub servers: Vec<ServerGroupConfig>,
}

/// PayPal settings file structure.
#[derive(Debug, Default, Deserialize)]
struct PaypalSettings {
    business_email: String,
    #[serde(default)]
    receiver_emails: Vec<String>,
    #[serde(default)]
    ipn_host: Option<String>,
}

/// Server groups file structure.
#[derive(Debug, Deserialize)]
struct ServersFile {
    servers: Vec<ServerGroupConfig>,
}

impl ServiceConfig {
    /// Load configuration from environment variables and settings files.
    ///
    /// Malformed values fall back to their defaults where one exists;
    /// [`ServiceConfig::validate`] rejects what cannot be defaulted.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let paypal = resolve_paypal_settings(load_paypal_settings(), |key| std::env::var(key).ok());

        Self {
            listen_addr: env_or("LISTEN_ADDR", defaults.listen_addr),
            data_dir: env_or("DATA_DIR", defaults.data_dir),
            paypal_ipn_host: paypal.ipn_host.unwrap_or(defaults.paypal_ipn_host),
            paypal_business_email: paypal.business_email,
            paypal_receiver_emails: paypal.receiver_emails,
            donation_currency: env_or("DONATION_CURRENCY", defaults.donation_currency)
                .trim()
                .to_uppercase(),
            credit_exchange_rate: std::env::var("CREDIT_EXCHANGE_RATE").map_or(
                defaults.credit_exchange_rate,
                |s| s.parse().unwrap_or(Amount::ZERO),
            ),
            paypal_verify_timeout_seconds: env_parse(
                "PAYPAL_VERIFY_TIMEOUT_SECONDS",
                defaults.paypal_verify_timeout_seconds,
            ),
            duplicate_policy: std::env::var("DUPLICATE_TXN_POLICY")
                .ok()
                .and_then(|s| {
                    let policy = DuplicatePolicy::parse(&s);
                    if policy.is_none() {
                        tracing::warn!(value = %s, "Unknown DUPLICATE_TXN_POLICY, using default");
                    }
                    policy
                })
                .unwrap_or(defaults.duplicate_policy),
            use_clean_urls: std::env::var("USE_CLEAN_URLS")
                .map(|s| matches!(s.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(defaults.use_clean_urls),
            base_uri: env_or("BASE_URI", defaults.base_uri),
            default_module: env_or("DEFAULT_MODULE", defaults.default_module),
            default_action: env_or("DEFAULT_ACTION", defaults.default_action),
            access_rules: load_access_rules().unwrap_or(defaults.access_rules),
            admin_api_key: std::env::var("ADMIN_API_KEY").ok(),
            session_secret: std::env::var("SESSION_SECRET").ok(),
            cors_origins: std::env::var("CORS_ORIGINS")
                .map(|s| split_list(&s))
                .unwrap_or(defaults.cors_origins),
            max_body_bytes: env_parse("MAX_BODY_BYTES", defaults.max_body_bytes),
            request_timeout_seconds: env_parse(
                "REQUEST_TIMEOUT_SECONDS",
                defaults.request_timeout_seconds,
            ),
            servers: load_servers(),
        }
    }

    /// Reject settings the service cannot run with.
    ///
    /// # Errors
    ///
    /// Returns the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_module.trim().is_empty() {
            return Err(ConfigError::MissingDefaultModule);
        }
        if self.default_action.trim().is_empty() {
            return Err(ConfigError::MissingDefaultAction);
        }
        if self.paypal_business_email.trim().is_empty() {
            return Err(ConfigError::MissingBusinessEmail);
        }
        if !self.credit_exchange_rate.is_positive() {
            return Err(ConfigError::InvalidExchangeRate);
        }
        if self.donation_currency.len() != 3
            || !self.donation_currency.bytes().all(|b| b.is_ascii_uppercase())
        {
            return Err(ConfigError::InvalidCurrency(self.donation_currency.clone()));
        }

        let mut seen = std::collections::HashSet::new();
        for server in &self.servers {
            if !seen.insert(server.name.as_str()) {
                return Err(ConfigError::DuplicateServer(server.name.clone()));
            }
        }

        Ok(())
    }

    /// Dispatcher settings.
    #[must_use]
    pub fn dispatch(&self) -> DispatchConfig {
        DispatchConfig {
            default_module: self.default_module.clone(),
            default_action: self.default_action.clone(),
            use_clean_urls: self.use_clean_urls,
            base_uri: self.base_uri.clone(),
        }
    }

    /// Notification processor settings.
    #[must_use]
    pub fn processor_settings(&self) -> ProcessorSettings {
        ProcessorSettings {
            business_email: self.paypal_business_email.clone(),
            receiver_emails: self.paypal_receiver_emails.clone(),
            currency: self.donation_currency.clone(),
            exchange_rate: self.credit_exchange_rate,
            duplicate_policy: self.duplicate_policy,
            data_dir: PathBuf::from(&self.data_dir),
        }
    }

    /// Timeout for the PayPal verification call-back.
    #[must_use]
    pub fn verify_timeout(&self) -> Duration {
        Duration::from_secs(self.paypal_verify_timeout_seconds)
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".into(),
            data_dir: "data".into(),
            paypal_ipn_host: "www.paypal.com".into(),
            paypal_business_email: String::new(),
            paypal_receiver_emails: Vec::new(),
            donation_currency: "USD".into(),
            credit_exchange_rate: Amount::from_cents(100),
            paypal_verify_timeout_seconds: 20,
            duplicate_policy: DuplicatePolicy::Allow,
            use_clean_urls: false,
            base_uri: "/".into(),
            default_module: "main".into(),
            default_action: "index".into(),
            access_rules: default_access_rules(),
            admin_api_key: None,
            session_secret: None,
            cors_origins: vec!["*".into()],
            max_body_bytes: 1024 * 1024,
            request_timeout_seconds: 30,
            servers: Vec::new(),
        }
    }
}

/// Panel routes that need a logged-in or admin account.
fn default_access_rules() -> HashMap<String, i32> {
    [
        ("account/view", LEVEL_NORMAL),
        ("account/logout", LEVEL_NORMAL),
        ("donate", LEVEL_NORMAL),
        ("purchase", LEVEL_NORMAL),
        ("admin", LEVEL_ADMIN),
    ]
    .into_iter()
    .map(|(key, level)| (key.to_string(), level))
    .collect()
}

fn env_or(key: &str, default: String) -> String {
    std::env::var(key).unwrap_or(default)
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Load PayPal settings from the first settings file found.
fn load_paypal_settings() -> Option<PaypalSettings> {
    let explicit = std::env::var("PAYPAL_SECRETS_FILE").ok();
    let secret_paths = [".secrets/paypal.json", "../.secrets/paypal.json"];

    for path in explicit.iter().map(String::as_str).chain(secret_paths) {
        if let Ok(settings) = load_json_file::<PaypalSettings>(path) {
            tracing::info!(path = %path, "Loaded PayPal settings from file");
            return Some(settings);
        }
    }

    tracing::debug!("PayPal settings file not found, using environment variables");
    None
}

/// Merge the PayPal settings file with the environment.
///
/// A value set in the file wins; the environment fills in whatever the file
/// leaves out (or everything, when there is no file).
fn resolve_paypal_settings(
    file: Option<PaypalSettings>,
    env: impl Fn(&str) -> Option<String>,
) -> PaypalSettings {
    let file = file.unwrap_or_default();
    let non_empty = |s: String| Some(s).filter(|s| !s.trim().is_empty());

    PaypalSettings {
        business_email: non_empty(file.business_email)
            .or_else(|| env("PAYPAL_BUSINESS_EMAIL"))
            .unwrap_or_default(),
        receiver_emails: if file.receiver_emails.is_empty() {
            env("PAYPAL_RECEIVER_EMAILS")
                .map(|s| split_list(&s))
                .unwrap_or_default()
        } else {
            file.receiver_emails
        },
        ipn_host: file
            .ipn_host
            .and_then(non_empty)
            .or_else(|| env("PAYPAL_IPN_HOST")),
    }
}

/// Load server groups from the first servers file found.
fn load_servers() -> Vec<ServerGroupConfig> {
    let explicit = std::env::var("FLUX_SERVERS_FILE").ok();
    let paths = [".secrets/servers.json", "../.secrets/servers.json"];

    for path in explicit.iter().map(String::as_str).chain(paths) {
        match load_json_file::<ServersFile>(path) {
            Ok(file) => {
                tracing::info!(path = %path, count = file.servers.len(), "Loaded server groups");
                return file.servers;
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(path = %path, error = %e, "Ignoring unreadable servers file"),
        }
    }

    tracing::warn!("No server groups configured - donations cannot be credited");
    Vec::new()
}

/// Load access rules from `ACCESS_RULES_FILE`, if set.
fn load_access_rules() -> Option<HashMap<String, i32>> {
    let path = std::env::var("ACCESS_RULES_FILE").ok()?;
    match load_json_file(&path) {
        Ok(rules) => Some(rules),
        Err(e) => {
            tracing::warn!(path = %path, error = %e, "Ignoring unreadable access rules file");
            None
        }
    }
}

/// Load a JSON settings file.
fn load_json_file<T: serde::de::DeserializeOwned>(path: &str) -> Result<T, std::io::Error> {
    let path = Path::new(path);
    if !path.exists() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "Settings file not found",
        ));
    }
    let contents = std::fs::read_to_string(path)?;
    serde_json::from_str(&contents)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> ServiceConfig {
        ServiceConfig {
            paypal_business_email: "donate@example.com".into(),
            ..ServiceConfig::default()
        }
    }

    #[test]
    fn defaults_need_only_a_business_email() {
        assert_eq!(
            ServiceConfig::default().validate(),
            Err(ConfigError::MissingBusinessEmail)
        );
        assert_eq!(valid().validate(), Ok(()));
    }

    #[test]
    fn empty_default_route_is_fatal() {
        let config = ServiceConfig {
            default_module: String::new(),
            ..valid()
        };
        assert_eq!(config.validate(), Err(ConfigError::MissingDefaultModule));

        let config = ServiceConfig {
            default_action: " ".into(),
            ..valid()
        };
        assert_eq!(config.validate(), Err(ConfigError::MissingDefaultAction));
    }

    #[test]
    fn exchange_rate_must_be_positive() {
        let config = ServiceConfig {
            credit_exchange_rate: Amount::ZERO,
            ..valid()
        };
        assert_eq!(config.validate(), Err(ConfigError::InvalidExchangeRate));
    }

    #[test]
    fn currency_must_be_three_letters() {
        let config = ServiceConfig {
            donation_currency: "EURO".into(),
            ..valid()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidCurrency(_))
        ));
    }

    #[test]
    fn duplicate_server_names_rejected() {
        let server = ServerGroupConfig {
            name: "FluxRO".into(),
            database_url: "mysql://localhost/ragnarok".into(),
            login_database: "ragnarok".into(),
            create_schema: false,
        };
        let config = ServiceConfig {
            servers: vec![server.clone(), server],
            ..valid()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::DuplicateServer("FluxRO".into()))
        );
    }

    #[test]
    fn duplicate_policy_parsing() {
        assert_eq!(DuplicatePolicy::parse("Skip"), Some(DuplicatePolicy::Skip));
        assert_eq!(DuplicatePolicy::parse(" allow "), Some(DuplicatePolicy::Allow));
        assert_eq!(DuplicatePolicy::parse("dedupe"), None);
    }

    #[test]
    fn split_list_drops_blanks() {
        assert_eq!(
            split_list("a@example.com, ,b@example.com"),
            vec!["a@example.com".to_string(), "b@example.com".to_string()]
        );
    }

    fn env_of(pairs: &'static [(&'static str, &'static str)]) -> impl Fn(&str) -> Option<String> {
        move |key| {
            pairs
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| (*v).to_string())
        }
    }

    const PAYPAL_ENV: &[(&str, &str)] = &[
        ("PAYPAL_BUSINESS_EMAIL", "env@example.com"),
        ("PAYPAL_RECEIVER_EMAILS", "env-alt@example.com"),
        ("PAYPAL_IPN_HOST", "env.paypal.test"),
    ];

    #[test]
    fn paypal_file_values_win_over_environment() {
        let file = PaypalSettings {
            business_email: "file@example.com".into(),
            receiver_emails: vec!["file-alt@example.com".into()],
            ipn_host: Some("file.paypal.test".into()),
        };
        let paypal = resolve_paypal_settings(Some(file), env_of(PAYPAL_ENV));

        assert_eq!(paypal.business_email, "file@example.com");
        assert_eq!(paypal.receiver_emails, vec!["file-alt@example.com".to_string()]);
        assert_eq!(paypal.ipn_host.as_deref(), Some("file.paypal.test"));
    }

    #[test]
    fn paypal_environment_fills_gaps_in_file() {
        let file: PaypalSettings =
            serde_json::from_str(r#"{"business_email": "file@example.com"}"#).unwrap();
        let paypal = resolve_paypal_settings(Some(file), env_of(PAYPAL_ENV));

        assert_eq!(paypal.business_email, "file@example.com");
        assert_eq!(paypal.receiver_emails, vec!["env-alt@example.com".to_string()]);
        assert_eq!(paypal.ipn_host.as_deref(), Some("env.paypal.test"));

        let paypal = resolve_paypal_settings(None, env_of(PAYPAL_ENV));
        assert_eq!(paypal.business_email, "env@example.com");

        let paypal = resolve_paypal_settings(None, env_of(&[]));
        assert_eq!(paypal.business_email, "");
        assert!(paypal.receiver_emails.is_empty());
        assert_eq!(paypal.ipn_host, None);
    }

    #[test]
    fn servers_file_parses() {
        let file: ServersFile = serde_json::from_str(
            r#"{"servers": [{"name": "FluxRO", "database_url": "mysql://u:p@db/ragnarok", "login_database": "ragnarok"}]}"#,
        )
        .unwrap();
        assert_eq!(file.servers.len(), 1);
        assert!(!file.servers[0].create_schema);
    }
}
