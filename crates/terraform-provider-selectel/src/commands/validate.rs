use colored::Colorize;
use std::path::Path;

pub fn handle(config_path: Option<&Path>) -> anyhow::Result<()> {
    println!("{}", "Validating provider configuration...".blue());

    let config = match selectel_provider::load_config(config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!();
            eprintln!("{}", "✗ Configuration error".red().bold());
            eprintln!("  {}", e);
            std::process::exit(1);
        }
    };

    let unset = || "(not set)".dimmed().to_string();
    let auth = if config.uses_keystone() {
        "keystone credentials"
    } else {
        "token"
    };

    println!("{}", "✓ Configuration is valid".green().bold());
    println!();
    println!("  auth:        {}", auth.cyan());
    println!("  endpoint:    {}", config.endpoint);
    println!("  os_endpoint: {}", config.os_endpoint);
    println!(
        "  project_id:  {}",
        config.project_id.clone().unwrap_or_else(unset)
    );
    println!(
        "  region:      {}",
        config
            .region
            .map(|r| r.to_string())
            .unwrap_or_else(unset)
    );
    Ok(())
}
