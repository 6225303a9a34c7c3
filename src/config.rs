use anyhow::{Context, Result, anyhow};
use clap::{Parser, ValueEnum};
use std::{env, fmt, str::FromStr, time::Duration};

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub gateway: GatewayConfig,
    /// Collections and users registered in the backend at startup.
    pub seeds: Seeds,
}

#[derive(Debug, Clone, Default)]
pub struct Seeds {
    pub collections: Vec<CollectionSeed>,
    pub users: Vec<UserSeed>,
}

/// `DB/NAME` from `--add-collection`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionSeed {
    pub database: String,
    pub name: String,
}

/// `DB:USER:PASSWORD` from `--add-user`.
#[derive(Clone, PartialEq, Eq)]
pub struct UserSeed {
    pub database: String,
    pub username: String,
    pub password: String,
}

impl fmt::Debug for UserSeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserSeed")
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

fn parse_collection_seed(value: &str) -> Result<CollectionSeed, String> {
    match value.split_once('/') {
        Some((database, name))
            if !database.is_empty() && !name.is_empty() && !name.contains('/') =>
        {
            Ok(CollectionSeed {
                database: database.into(),
                name: name.into(),
            })
        }
        _ => Err(format!("expected DB/NAME, got `{}`", value)),
    }
}

fn parse_user_seed(value: &str) -> Result<UserSeed, String> {
    // the password is everything after the second colon and may hold more
    let mut parts = value.splitn(3, ':');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(database), Some(username), Some(password))
            if !database.is_empty() && !username.is_empty() =>
        {
            Ok(UserSeed {
                database: database.into(),
                username: username.into(),
                password: password.into(),
            })
        }
        _ => Err(format!("expected DB:USER:PASSWORD, got `{}`", value)),
    }
}

/// Settings the POST pipeline itself consults.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Realm announced in `WWW-Authenticate` on 401.
    pub realm: String,
    /// Upper bound per backend lookup. `None` waits indefinitely.
    pub backend_timeout: Option<Duration>,
    pub check_order: CheckOrder,
    /// Largest body read once the address and credential checks passed.
    pub max_body_bytes: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            realm: "atom-gateway".into(),
            backend_timeout: None,
            check_order: CheckOrder::ExistenceFirst,
            max_body_bytes: 1024 * 1024,
        }
    }
}

/// Which of "collection exists" and "credentials valid" is checked first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum CheckOrder {
    /// Unknown collections answer 404 even to bad credentials.
    #[default]
    ExistenceFirst,
    /// Bad credentials answer 403 even for unknown collections.
    CredentialsFirst,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "AtomPub gateway accepting entry POSTs")]
pub struct Args {
    /// Host to bind to (overrides ATOM_GATEWAY_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides ATOM_GATEWAY_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Backend database URL (overrides ATOM_GATEWAY_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Basic auth realm (overrides ATOM_GATEWAY_REALM)
    #[arg(long)]
    pub realm: Option<String>,

    /// Timeout for each backend lookup in seconds (overrides ATOM_GATEWAY_BACKEND_TIMEOUT_SECS)
    #[arg(long)]
    pub backend_timeout_secs: Option<u64>,

    /// Largest accepted request body (overrides ATOM_GATEWAY_MAX_BODY_BYTES)
    #[arg(long)]
    pub max_body_bytes: Option<usize>,

    /// Order of the collection and credential checks (overrides ATOM_GATEWAY_CHECK_ORDER)
    #[arg(long, value_enum)]
    pub check_order: Option<CheckOrder>,

    /// Register a collection at startup, as DB/NAME (repeatable)
    #[arg(long = "add-collection", value_name = "DB/NAME", value_parser = parse_collection_seed)]
    pub add_collection: Vec<CollectionSeed>,

    /// Register or replace a user at startup, as DB:USER:PASSWORD (repeatable)
    #[arg(long = "add-user", value_name = "DB:USER:PASSWORD", value_parser = parse_user_seed)]
    pub add_user: Vec<UserSeed>,

    /// Run migrations and seeding, then exit
    #[arg(long)]
    pub migrate: bool,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and migrate flag.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        let args = Args::parse();
        let mut cfg = Self::merge(args.clone_settings(), Settings::read()?);
        cfg.seeds = Seeds {
            collections: args.add_collection,
            users: args.add_user,
        };
        Ok((cfg, args.migrate))
    }

    fn merge(args: Settings, env: Settings) -> Self {
        let defaults = GatewayConfig::default();
        Self {
            host: args.host.or(env.host).unwrap_or_else(|| "0.0.0.0".into()),
            port: args.port.or(env.port).unwrap_or(8068),
            database_url: args
                .database_url
                .or(env.database_url)
                .unwrap_or_else(|| "sqlite://./data/gateway.db".into()),
            gateway: GatewayConfig {
                realm: args.realm.or(env.realm).unwrap_or(defaults.realm),
                backend_timeout: args
                    .backend_timeout_secs
                    .or(env.backend_timeout_secs)
                    .map(Duration::from_secs),
                check_order: args
                    .check_order
                    .or(env.check_order)
                    .unwrap_or(defaults.check_order),
                max_body_bytes: args
                    .max_body_bytes
                    .or(env.max_body_bytes)
                    .unwrap_or(defaults.max_body_bytes),
            },
            seeds: Seeds::default(),
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Args {
    fn clone_settings(&self) -> Settings {
        Settings {
            host: self.host.clone(),
            port: self.port,
            database_url: self.database_url.clone(),
            realm: self.realm.clone(),
            backend_timeout_secs: self.backend_timeout_secs,
            max_body_bytes: self.max_body_bytes,
            check_order: self.check_order,
        }
    }
}

/// Optional settings from one source; the first source that sets a value wins.
#[derive(Debug, Default)]
struct Settings {
    host: Option<String>,
    port: Option<u16>,
    database_url: Option<String>,
    realm: Option<String>,
    backend_timeout_secs: Option<u64>,
    max_body_bytes: Option<usize>,
    check_order: Option<CheckOrder>,
}

impl Settings {
    fn read() -> Result<Self> {
        Ok(Self {
            host: env::var("ATOM_GATEWAY_HOST").ok(),
            port: parsed_var("ATOM_GATEWAY_PORT")?,
            database_url: env::var("ATOM_GATEWAY_DATABASE_URL").ok(),
            realm: env::var("ATOM_GATEWAY_REALM").ok(),
            backend_timeout_secs: parsed_var("ATOM_GATEWAY_BACKEND_TIMEOUT_SECS")?,
            max_body_bytes: parsed_var("ATOM_GATEWAY_MAX_BODY_BYTES")?,
            check_order: match env::var("ATOM_GATEWAY_CHECK_ORDER") {
                Ok(value) => Some(
                    <CheckOrder as ValueEnum>::from_str(&value, true)
                        .map_err(|err| anyhow!(err))
                        .with_context(|| {
                            format!("parsing ATOM_GATEWAY_CHECK_ORDER value `{}`", value)
                        })?,
                ),
                Err(env::VarError::NotPresent) => None,
                Err(err) => return Err(err).context("reading ATOM_GATEWAY_CHECK_ORDER"),
            },
        })
    }
}

fn parsed_var<T>(name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(value) => value
            .parse::<T>()
            .map(Some)
            .with_context(|| format!("parsing {} value `{}`", name, value)),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(err) => Err(err).with_context(|| format!("reading {}", name)),
    }
}
