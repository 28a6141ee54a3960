//! Resolves a model key against the local models directory and constructs
//! the matching binding.

use std::fs;
use std::path::{Path, PathBuf};

use crate::core::model::{BertEncoder, LanguageModel};
use crate::error::ModelError;
use crate::service::ModelService;

/// Keys may contain `/` (hub-style namespacing); directories may not.
pub fn model_dir(models_dir: &Path, name: &str) -> PathBuf {
    models_dir.join(name.replace('/', "--"))
}

/// Loads the tokenizer/model pair named by `name` and wraps it in a
/// service. Every failure mode (missing directory, unreadable files,
/// unsupported architecture) reports the offending key.
pub fn load_service(models_dir: &Path, name: &str) -> Result<ModelService, ModelError> {
    let model = load_model(models_dir, name)?;
    Ok(ModelService::new(name, model))
}

pub fn load_model(models_dir: &Path, name: &str) -> Result<Box<dyn LanguageModel>, ModelError> {
    let dir = model_dir(models_dir, name);
    if !dir.is_dir() {
        return Err(ModelError::load(
            name,
            format!("no model directory at {}", dir.display()),
        ));
    }

    match architecture(&dir, name)?.as_str() {
        "bert" => Ok(Box::new(BertEncoder::load(&dir, name)?)),
        other => Err(ModelError::load(
            name,
            format!("unsupported architecture '{}'", other),
        )),
    }
}

fn architecture(dir: &Path, name: &str) -> Result<String, ModelError> {
    let config_path = dir.join("config.json");
    let raw = fs::read_to_string(&config_path)
        .map_err(|e| ModelError::load(name, format!("{}: {}", config_path.display(), e)))?;
    let config: serde_json::Value = serde_json::from_str(&raw)
        .map_err(|e| ModelError::load(name, format!("invalid config.json: {}", e)))?;
    Ok(config
        .get("model_type")
        .and_then(|v| v.as_str())
        .unwrap_or("unknown")
        .to_string())
}

/// Model names present on disk (directories holding a `config.json`),
/// whether or not they are currently loaded.
pub fn available_models(models_dir: &Path) -> Vec<String> {
    let mut names = Vec::new();
    if let Ok(entries) = fs::read_dir(models_dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_dir() || !path.join("config.json").is_file() {
                continue;
            }
            if let Some(dir_name) = path.file_name().and_then(|n| n.to_str()) {
                names.push(dir_name.replace("--", "/"));
            }
        }
    }
    names.sort();
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_key_names_the_key() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_model(dir.path(), "no-such-model").unwrap_err();
        assert!(err.to_string().contains("no-such-model"));
        assert!(matches!(err, ModelError::Load { .. }));
    }

    #[test]
    fn unsupported_architecture_is_a_load_error() {
        let dir = tempfile::tempdir().unwrap();
        let model_dir = dir.path().join("tiny-gpt");
        fs::create_dir(&model_dir).unwrap();
        fs::write(model_dir.join("config.json"), r#"{"model_type": "gpt2"}"#).unwrap();

        let err = load_model(dir.path(), "tiny-gpt").unwrap_err();
        assert!(err.to_string().contains("gpt2"));
    }

    #[test]
    fn malformed_config_is_a_load_error() {
        let dir = tempfile::tempdir().unwrap();
        let model_dir = dir.path().join("broken");
        fs::create_dir(&model_dir).unwrap();
        fs::write(model_dir.join("config.json"), "not json").unwrap();

        let err = load_model(dir.path(), "broken").unwrap_err();
        assert!(matches!(err, ModelError::Load { ref name, .. } if name == "broken"));
    }

    #[test]
    fn available_models_lists_config_dirs() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b-model", "a--model"] {
            let d = dir.path().join(name);
            fs::create_dir(&d).unwrap();
            fs::write(d.join("config.json"), "{}").unwrap();
        }
        fs::create_dir(dir.path().join("not-a-model")).unwrap();

        assert_eq!(
            available_models(dir.path()),
            vec!["a/model".to_string(), "b-model".to_string()]
        );
    }
}
