//! create / read / update / delete / import against one resource type

use super::read_json;
use colored::Colorize;
use selectel_cloud::{ProviderContext, ResourceState, Timeouts};
use selectel_provider::Provider;
use std::path::PathBuf;
use std::time::Duration;

pub enum Operation {
    Create {
        spec: PathBuf,
    },
    Read {
        id: String,
        spec: PathBuf,
    },
    Update {
        id: String,
        old: PathBuf,
        new: PathBuf,
    },
    Delete {
        id: String,
        spec: PathBuf,
    },
    Import {
        id: String,
    },
}

fn print_state(state: Option<&ResourceState>) -> anyhow::Result<()> {
    if state.is_none() {
        eprintln!("{}", "Resource no longer exists".yellow());
    }
    println!("{}", serde_json::to_string_pretty(&state)?);
    Ok(())
}

pub async fn handle(
    provider: &Provider,
    ctx: &ProviderContext,
    resource_type: &str,
    operation: Operation,
    timeout: Option<u64>,
) -> anyhow::Result<()> {
    let resource = provider.resource(resource_type)?;
    let timeouts = timeout.map(|secs| Timeouts::uniform(Duration::from_secs(secs)));

    match operation {
        Operation::Create { spec } => {
            let spec = read_json(&spec)?;
            let state = resource.create(ctx, &spec, timeouts).await?;
            eprintln!("{} {} {}", "✓ Created".green(), resource_type, state.id.cyan());
            print_state(Some(&state))?;
        }
        Operation::Read { id, spec } => {
            let spec = read_json(&spec)?;
            let state = resource.read(ctx, &id, &spec).await?;
            print_state(state.as_ref())?;
        }
        Operation::Update { id, old, new } => {
            let old = read_json(&old)?;
            let new = read_json(&new)?;
            let state = resource.update(ctx, &id, &old, &new, timeouts).await?;
            eprintln!("{} {} {}", "✓ Updated".green(), resource_type, id.cyan());
            print_state(Some(&state))?;
        }
        Operation::Delete { id, spec } => {
            let spec = read_json(&spec)?;
            resource.delete(ctx, &id, &spec, timeouts).await?;
            eprintln!("{} {} {}", "✓ Deleted".green(), resource_type, id.cyan());
        }
        Operation::Import { id } => {
            let state = resource.import(ctx, &id).await?;
            print_state(state.as_ref())?;
        }
    }
    Ok(())
}
