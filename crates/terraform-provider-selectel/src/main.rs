mod commands;

use clap::{Parser, Subcommand};
use commands::lookup::Lookup;
use commands::resource::Operation;
use selectel_cloud::ProviderContext;
use selectel_provider::Provider;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "terraform-provider-selectel", version)]
#[command(about = "Manage Selectel VPC, Managed Kubernetes, DBaaS and DNS resources", long_about = None)]
struct Cli {
    /// Provider config file (defaults to <config dir>/selectel/provider.yaml)
    #[arg(short, long, global = true, env = "SEL_CONFIG_PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate the provider configuration
    Validate,
    /// List the supported resource types
    Resources,
    /// Create a resource from declared attributes
    Create {
        /// Resource type, e.g. selectel_mks_cluster_v1
        resource_type: String,
        /// JSON file with the declared attributes
        #[arg(long)]
        spec: PathBuf,
        /// Timeout in seconds (defaults to the resource type's timeout)
        #[arg(long)]
        timeout: Option<u64>,
    },
    /// Read the current state of a resource
    Read {
        resource_type: String,
        id: String,
        /// JSON file with the last declared attributes
        #[arg(long)]
        spec: PathBuf,
    },
    /// Apply a change between two declarations
    Update {
        resource_type: String,
        id: String,
        /// JSON file with the previous attributes
        #[arg(long)]
        old: PathBuf,
        /// JSON file with the new attributes
        #[arg(long)]
        new: PathBuf,
        #[arg(long)]
        timeout: Option<u64>,
    },
    /// Delete a resource
    Delete {
        resource_type: String,
        id: String,
        #[arg(long)]
        spec: PathBuf,
        #[arg(long)]
        timeout: Option<u64>,
    },
    /// Read an existing resource by id (needs SEL_PROJECT_ID and SEL_REGION
    /// for project resources)
    Import { resource_type: String, id: String },
    /// Look up DNS records by name (needs SEL_PROJECT_ID)
    Lookup {
        #[command(subcommand)]
        target: LookupTarget,
    },
}

#[derive(Subcommand)]
enum LookupTarget {
    /// Zone by name, e.g. example.com.
    Zone { name: String },
    /// Rrset by zone name, rrset name and type
    Rrset {
        zone: String,
        name: String,
        #[arg(value_name = "TYPE")]
        rrset_type: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // stdout carries resource state, logs go to stderr
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let provider = Provider::new();

    let (resource_type, operation, timeout) = match cli.command {
        Commands::Validate => return commands::validate::handle(cli.config.as_deref()),
        Commands::Resources => {
            commands::resources::handle(&provider);
            return Ok(());
        }
        Commands::Create {
            resource_type,
            spec,
            timeout,
        } => (resource_type, Operation::Create { spec }, timeout),
        Commands::Read {
            resource_type,
            id,
            spec,
        } => (resource_type, Operation::Read { id, spec }, None),
        Commands::Update {
            resource_type,
            id,
            old,
            new,
            timeout,
        } => (resource_type, Operation::Update { id, old, new }, timeout),
        Commands::Delete {
            resource_type,
            id,
            spec,
            timeout,
        } => (resource_type, Operation::Delete { id, spec }, timeout),
        Commands::Import { resource_type, id } => (resource_type, Operation::Import { id }, None),
        Commands::Lookup { target } => {
            let lookup = match target {
                LookupTarget::Zone { name } => Lookup::Zone { name },
                LookupTarget::Rrset {
                    zone,
                    name,
                    rrset_type,
                } => Lookup::Rrset {
                    zone,
                    name,
                    rrset_type,
                },
            };
            let config = selectel_provider::load_config(cli.config.as_deref())?;
            return commands::lookup::handle(&ProviderContext::new(config), lookup).await;
        }
    };

    // Reject unknown types before touching credentials
    provider.resource(&resource_type)?;

    let config = selectel_provider::load_config(cli.config.as_deref())?;
    let ctx = ProviderContext::new(config);
    commands::resource::handle(&provider, &ctx, &resource_type, operation, timeout).await
}
