use anyhow::Result;

use crate::core::model::factory;
use crate::envconfig::{self, EnvConfig};
use crate::manager::ModelManager;

pub async fn serve() -> Result<()> {
    crate::server::serve(EnvConfig::from_env()).await
}

/// Prints the models available on disk.
pub async fn list() -> Result<()> {
    let models_dir = envconfig::models_dir();
    let models = factory::available_models(&models_dir);
    if models.is_empty() {
        println!("no models found in {}", models_dir.display());
        return Ok(());
    }
    for name in models {
        println!("{}", name);
    }
    Ok(())
}

/// Tokenizes `text` with the named model and prints one token per line.
pub async fn tokenize(model: &str, text: &str) -> Result<()> {
    let config = EnvConfig::from_env();
    let manager = ModelManager::new(&config.models_dir, config.max_loaded_models);
    let tokens = manager.tokenize_only(text, model)?;
    for token in tokens {
        println!("{}", token);
    }
    Ok(())
}

pub async fn version() -> Result<()> {
    println!("tracelens {}", env!("CARGO_PKG_VERSION"));
    Ok(())
}
