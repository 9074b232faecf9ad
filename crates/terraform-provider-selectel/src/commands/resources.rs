use colored::Colorize;
use selectel_provider::Provider;

pub fn handle(provider: &Provider) {
    println!("{} ({})", "Resource types".bold(), provider.len());
    for name in provider.resource_types() {
        println!("  {}", name.cyan());
    }
}
