//! `switchyard config` — Configuration management commands.

use std::path::Path;
use switchyard_config::AppConfig;

pub fn validate(path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    println!("🔍 Validating configuration...");

    let config = match super::chat::load_config(path) {
        Ok(config) => config,
        Err(e) => {
            println!("   ❌ Config error: {e}");
            return Err(e.into());
        }
    };
    println!("   ✅ Config parsed successfully");

    let mut warnings = Vec::new();
    if !config.has_api_key() {
        warnings.push(format!(
            "No API key for provider '{}' (set SWITCHYARD_API_KEY or the provider's api_key)",
            config.default_provider
        ));
    }

    let model = match config.resolve_model() {
        Ok(model) => Some(model),
        Err(e) => {
            warnings.push(e.to_string());
            None
        }
    };
    if let Some(model) = &model {
        if model.base_url.is_empty() {
            warnings.push(format!("Provider '{}' has no base_url", config.default_provider));
        }
        if config.reasoning.is_some() && !model.reasoning {
            warnings.push("`reasoning` is set but the provider does not enable it".to_string());
        }
    }

    if warnings.is_empty() {
        println!("   ✅ All checks passed");
    } else {
        println!();
        for w in &warnings {
            println!("   ⚠️  {w}");
        }
    }

    println!();
    println!("   Provider:  {}", config.default_provider);
    println!("   Model:     {}", config.default_model);
    if let Some(model) = &model {
        println!("   API:       {}", model.api);
        println!("   Base URL:  {}", model.base_url);
    }
    println!("   Steering:  {:?}", config.agent.steering_mode);
    println!("   Follow-up: {:?}", config.agent.follow_up_mode);

    Ok(())
}

/// Write the default configuration unless a file already exists.
pub fn init(path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(AppConfig::config_path);
    if path.exists() {
        println!("   Config already exists at {}", path.display());
        return Ok(());
    }

    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    std::fs::write(&path, AppConfig::default_toml())?;
    println!("   ✅ Wrote {}", path.display());
    Ok(())
}
