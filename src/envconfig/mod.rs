use std::env;
use std::path::PathBuf;

pub struct EnvConfig {
    pub host: Host,
    pub models_dir: PathBuf,
    pub max_loaded_models: usize,
    pub reduction_seed: u64,
}

pub struct Host {
    pub host: String,
    pub port: u16,
}

impl EnvConfig {
    pub fn from_env() -> Self {
        Self {
            host: Host::from_env(),
            models_dir: models_dir(),
            max_loaded_models: env::var("TRACELENS_MAX_MODELS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(4),
            reduction_seed: env::var("TRACELENS_SEED")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(42),
        }
    }
}

impl Host {
    pub fn from_env() -> Self {
        let raw = env::var("TRACELENS_HOST").unwrap_or_else(|_| "127.0.0.1:8000".to_string());
        let (host, port) = parse_host(&raw);
        Self { host, port }
    }
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

fn parse_host(raw: &str) -> (String, u16) {
    if raw.contains(':') {
        let parts: Vec<&str> = raw.rsplitn(2, ':').collect();
        let port = parts[0].parse().unwrap_or(8000);
        (parts[1].to_string(), port)
    } else {
        (raw.to_string(), 8000)
    }
}

pub fn models_dir() -> PathBuf {
    let mut path =
        env::var("TRACELENS_MODELS").unwrap_or_else(|_| "~/.tracelens/models".to_string());

    if path.starts_with("~/") {
        if let Some(home) = dirs::home_dir() {
            path = path.replace("~", &home.to_string_lossy());
        }
    }

    PathBuf::from(path)
}
