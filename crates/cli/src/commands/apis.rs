//! `switchyard apis` — List the model APIs the registry can dispatch to.

use switchyard_providers::registry::get_api_providers;

pub fn run() -> Result<(), Box<dyn std::error::Error>> {
    let mut providers = get_api_providers();
    providers.sort_by(|a, b| a.api().as_str().cmp(b.api().as_str()));

    println!("📡 Registered APIs");
    println!();
    for provider in &providers {
        println!("   {:<24} {}", provider.api(), provider.source().unwrap_or("builtin"));
    }
    if providers.is_empty() {
        println!("   (none)");
    }
    println!();
    println!("   Select one per provider with `api = \"...\"` under [providers.<name>]");
    println!("   in {}", switchyard_config::AppConfig::config_path().display());

    Ok(())
}
