//! DNS zone and rrset lookup by name

use anyhow::Context;
use colored::Colorize;
use selectel_cloud::ProviderContext;
use selectel_cloud_domains::DomainsV2Client;

pub enum Lookup {
    Zone {
        name: String,
    },
    Rrset {
        zone: String,
        name: String,
        rrset_type: String,
    },
}

pub async fn handle(ctx: &ProviderContext, lookup: Lookup) -> anyhow::Result<()> {
    // Zones belong to a project, and the v2 API takes a project token
    let project_id = ctx
        .config()
        .project_id
        .as_deref()
        .context("SEL_PROJECT_ID must be set to look up DNS zones")?;
    let client = DomainsV2Client::for_project(ctx, project_id).await?;

    match lookup {
        Lookup::Zone { name } => {
            let zone = client.zone_by_name(&name).await?;
            eprintln!("{} {} {}", "✓ Found zone".green(), name, zone.id.cyan());
            println!("{}", serde_json::to_string_pretty(&zone)?);
        }
        Lookup::Rrset {
            zone,
            name,
            rrset_type,
        } => {
            let zone = client.zone_by_name(&zone).await?;
            let rrset = client
                .rrset_by_name_and_type(&zone.id, &name, &rrset_type)
                .await?;
            eprintln!(
                "{} {} {} {}",
                "✓ Found rrset".green(),
                rrset_type,
                name,
                rrset.id.cyan()
            );
            println!("{}", serde_json::to_string_pretty(&rrset)?);
        }
    }
    Ok(())
}
