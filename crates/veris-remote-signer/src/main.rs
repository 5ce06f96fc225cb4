//! veris-remote-signer: detached validator key daemon.
//!
//! Serves public-key, vote-signing, proposal-signing, and liveness requests
//! over the framed signer protocol, bound to a single chain id and a single
//! underlying signer.
//!
//! # Security Notes
//!
//! - Private key material never leaves the signer host
//! - The double-sign watermark is persisted before a signature is released
//! - Key material is NEVER logged

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;

use veris_crypto::Keypair;
use veris_privval::{LocalSigner, PrivValidator, ServeError, SignerEndpoint, SignerServer};

// ============================================================================
// Configuration
// ============================================================================

/// Daemon configuration.
#[derive(Debug, Clone)]
pub struct SignerDaemonConfig {
    /// TCP address to listen on (e.g. "127.0.0.1:26659").
    pub listen_addr: String,
    /// Chain id this signer is bound to.
    pub chain_id: String,
    /// Path to the 32-byte hex key seed. Created on first start.
    pub key_file: PathBuf,
    /// Path to the double-sign watermark file.
    pub state_file: PathBuf,
}

impl SignerDaemonConfig {
    /// Parse configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let mut listen_addr: Option<String> = None;
        let mut chain_id: Option<String> = None;
        let mut key_file: Option<PathBuf> = None;
        let mut state_file: Option<PathBuf> = None;

        for line in toml_str.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with('[') {
                continue;
            }
            if let Some((key, value)) = line.split_once('=') {
                let key = key.trim();
                let value = value.trim().trim_matches('"');
                match key {
                    "listen_addr" => listen_addr = Some(value.to_string()),
                    "chain_id" => chain_id = Some(value.to_string()),
                    "key_file" => key_file = Some(PathBuf::from(value)),
                    "state_file" => state_file = Some(PathBuf::from(value)),
                    _ => {}
                }
            }
        }

        Ok(SignerDaemonConfig {
            listen_addr: listen_addr.ok_or(ConfigError::MissingField("listen_addr"))?,
            chain_id: chain_id.ok_or(ConfigError::MissingField("chain_id"))?,
            key_file: key_file.ok_or(ConfigError::MissingField("key_file"))?,
            state_file: state_file.ok_or(ConfigError::MissingField("state_file"))?,
        })
    }

    /// Load configuration from a file.
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::FileError(format!("failed to read config: {}", e)))?;
        Self::from_toml(&content)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chain_id.is_empty() {
            return Err(ConfigError::InvalidConfig("chain_id is empty".into()));
        }
        if !self.listen_addr.contains(':') {
            return Err(ConfigError::InvalidConfig(format!(
                "listen_addr {:?} is not host:port",
                self.listen_addr
            )));
        }
        Ok(())
    }
}

/// Configuration errors.
#[derive(Debug)]
pub enum ConfigError {
    MissingField(&'static str),
    InvalidConfig(String),
    FileError(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::MissingField(field) => write!(f, "missing field: {}", field),
            ConfigError::InvalidConfig(msg) => write!(f, "invalid config: {}", msg),
            ConfigError::FileError(msg) => write!(f, "file error: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

// ============================================================================
// Key bootstrap
// ============================================================================

fn parse_hex(s: &str) -> Option<Vec<u8>> {
    let s = s.trim();
    if s.len() % 2 != 0 {
        return None;
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).ok())
        .collect()
}

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Load the key seed, generating a fresh one on first start.
fn load_or_generate_keypair(path: &std::path::Path) -> Result<Keypair, String> {
    match std::fs::read_to_string(path) {
        Ok(content) => {
            let seed = parse_hex(&content).ok_or_else(|| "key file is not hex".to_string())?;
            Keypair::from_seed(&seed).map_err(|e| format!("bad key seed: {}", e))
        }
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            let keypair = Keypair::generate();
            std::fs::write(path, to_hex(&keypair.seed()))
                .map_err(|e| format!("write key file: {}", e))?;
            eprintln!("[INFO] generated new signing key at {}", path.display());
            Ok(keypair)
        }
        Err(err) => Err(format!("read key file: {}", err)),
    }
}

// ============================================================================
// Metrics
// ============================================================================

#[derive(Debug, Default)]
pub struct DaemonMetrics {
    connections_total: AtomicU64,
    sessions_closed_total: AtomicU64,
    sessions_dropped_total: AtomicU64,
}

impl DaemonMetrics {
    fn new() -> Self {
        Self::default()
    }
    fn inc_connections(&self) {
        self.connections_total.fetch_add(1, Ordering::Relaxed);
    }
    fn inc_closed(&self) {
        self.sessions_closed_total.fetch_add(1, Ordering::Relaxed);
    }
    fn inc_dropped(&self) {
        self.sessions_dropped_total.fetch_add(1, Ordering::Relaxed);
    }
    fn connections_total(&self) -> u64 {
        self.connections_total.load(Ordering::Relaxed)
    }
    fn format(&self) -> String {
        format!(
            "conn={} closed={} dropped={}",
            self.connections_total(),
            self.sessions_closed_total.load(Ordering::Relaxed),
            self.sessions_dropped_total.load(Ordering::Relaxed),
        )
    }
}

// ============================================================================
// CLI
// ============================================================================

#[derive(Parser, Debug)]
#[command(
    name = "veris-remote-signer",
    about = "Detached validator key daemon for veris nodes"
)]
struct CliArgs {
    #[arg(short, long, default_value = "/etc/veris/remote_signer.toml")]
    config: PathBuf,
    #[arg(long)]
    listen_addr: Option<String>,
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main(flavor = "multi_thread")]
async fn main() {
    let args = CliArgs::parse();
    eprintln!("[INFO] veris-remote-signer starting...");
    eprintln!("[INFO] Config: {}", args.config.display());

    let mut config = match SignerDaemonConfig::from_file(&args.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("[ERROR] Config: {}", e);
            std::process::exit(1);
        }
    };
    if let Some(addr) = args.listen_addr {
        config.listen_addr = addr;
    }
    if let Err(e) = config.validate() {
        eprintln!("[ERROR] {}", e);
        std::process::exit(1);
    }

    let keypair = match load_or_generate_keypair(&config.key_file) {
        Ok(kp) => kp,
        Err(e) => {
            eprintln!("[ERROR] Key: {}", e);
            std::process::exit(1);
        }
    };
    let signer = match LocalSigner::with_state_file(keypair, config.state_file.clone()) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("[ERROR] Sign state: {}", e);
            std::process::exit(1);
        }
    };
    let signer: Arc<dyn PrivValidator> = Arc::new(signer);
    let public_key = match signer.get_pub_key() {
        Ok(pk) => pk,
        Err(e) => {
            eprintln!("[ERROR] Key: {}", e);
            std::process::exit(1);
        }
    };

    eprintln!("[INFO] Chain: {}", config.chain_id);
    eprintln!("[INFO] Validator key: {:?}", public_key);
    eprintln!("[INFO] Listen: {}", config.listen_addr);

    let listener = match TcpListener::bind(&config.listen_addr).await {
        Ok(l) => l,
        Err(e) => {
            eprintln!("[ERROR] Bind: {}", e);
            std::process::exit(1);
        }
    };

    let metrics = Arc::new(DaemonMetrics::new());
    let chain_id = config.chain_id.clone();

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(pair) => pair,
                    Err(e) => {
                        eprintln!("[WARN] Accept: {}", e);
                        continue;
                    }
                };
                metrics.inc_connections();
                eprintln!("[INFO] signer connection from {}", peer);

                let server = SignerServer::new(chain_id.clone(), Arc::clone(&signer));
                let conn_metrics = Arc::clone(&metrics);
                // The serving loop is synchronous (blocking socket reads);
                // bridge it off the async runtime.
                tokio::task::spawn_blocking(move || {
                    let std_stream = match stream.into_std() {
                        Ok(s) => s,
                        Err(e) => {
                            eprintln!("[WARN] Socket: {}", e);
                            return;
                        }
                    };
                    if let Err(e) = std_stream.set_nonblocking(false) {
                        eprintln!("[WARN] Socket: {}", e);
                        return;
                    }
                    let mut endpoint = match SignerEndpoint::new(std_stream) {
                        Ok(ep) => ep,
                        Err(e) => {
                            eprintln!("[WARN] Socket: {}", e);
                            return;
                        }
                    };
                    match server.serve_connection(&mut endpoint) {
                        Ok(()) => conn_metrics.inc_closed(),
                        Err(ServeError::Handler(err)) => {
                            conn_metrics.inc_dropped();
                            eprintln!("[WARN] session from {} dropped: {}", peer, err);
                        }
                        Err(ServeError::Endpoint(err)) => {
                            conn_metrics.inc_dropped();
                            eprintln!("[WARN] session from {} failed: {}", peer, err);
                        }
                    }
                });

                let conn_count = metrics.connections_total();
                if conn_count > 0 && conn_count % 100 == 0 {
                    eprintln!("[INFO] Metrics: {}", metrics.format());
                }
            }
            _ = tokio::signal::ctrl_c() => {
                eprintln!("[INFO] shutdown requested");
                eprintln!("[INFO] Metrics: {}", metrics.format());
                break;
            }
        }
    }
}
