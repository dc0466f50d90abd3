use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use retailos_api::{
    config::{self, AppConfig},
    db,
    entities::master::tenant,
    services::tenants::{CreateTenantRequest, TenantAdmin, TenantService},
    tenancy::TenantRegistry,
};
use serde::Serialize;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config().context("failed to load configuration")?;
    config::init_tracing(cfg.log_level(), cfg.log_json);

    match cli.command {
        Commands::Migrate => migrate(&cfg).await?,
        Commands::CreateTenant(args) => create_tenant(cfg, args, cli.json).await?,
        Commands::ListTenants => list_tenants(cfg, cli.json).await?,
        Commands::SetStatus(args) => set_status(cfg, args, cli.json).await?,
    }

    Ok(())
}

#[derive(Parser)]
#[command(name = "retailos", about = "RetailOS platform administration", version)]
struct Cli {
    #[arg(
        long,
        global = true,
        action = ArgAction::SetTrue,
        help = "Render command output as pretty JSON"
    )]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply pending platform database migrations
    Migrate,
    /// Register a store and provision its database
    CreateTenant(CreateTenantArgs),
    /// List registered stores
    ListTenants,
    /// Activate or deactivate a store
    SetStatus(SetStatusArgs),
}

#[derive(Args)]
struct CreateTenantArgs {
    #[arg(long)]
    subdomain: String,
    #[arg(long)]
    name: String,
    #[arg(long)]
    address: Option<String>,
    #[arg(long)]
    phone: Option<String>,
    #[arg(long)]
    email: Option<String>,
    #[arg(long, requires_all = ["admin_name", "admin_password"])]
    admin_email: Option<String>,
    #[arg(long)]
    admin_name: Option<String>,
    #[arg(long)]
    admin_password: Option<String>,
}

#[derive(Args)]
struct SetStatusArgs {
    #[arg(long)]
    subdomain: String,
    #[arg(long, action = ArgAction::Set)]
    active: bool,
}

async fn tenant_service(cfg: AppConfig) -> Result<TenantService> {
    let master = db::establish_connection_from_app_config(&cfg)
        .await
        .context("failed to connect to the platform database")?;
    let registry = TenantRegistry::new(Arc::new(cfg), Arc::new(master));
    Ok(TenantService::new(Arc::new(registry)))
}

async fn migrate(cfg: &AppConfig) -> Result<()> {
    let master = db::establish_connection_from_app_config(cfg)
        .await
        .context("failed to connect to the platform database")?;
    db::run_master_migrations(&master)
        .await
        .context("platform migrations failed")?;
    println!("Platform database is up to date");
    Ok(())
}

async fn create_tenant(cfg: AppConfig, args: CreateTenantArgs, json: bool) -> Result<()> {
    let admin = match (args.admin_email, args.admin_name, args.admin_password) {
        (Some(email), Some(full_name), Some(password)) => Some(TenantAdmin {
            email,
            full_name,
            password,
        }),
        _ => None,
    };
    let request = CreateTenantRequest {
        subdomain: args.subdomain,
        store_name: args.name,
        latitude: None,
        longitude: None,
        store_address: args.address,
        store_phone: args.phone,
        store_email: args.email,
        admin,
    };

    let provisioned = tenant_service(cfg)
        .await?
        .create_tenant(request)
        .await
        .context("failed to provision store")?;

    if json {
        return print_json(&provisioned);
    }
    println!(
        "Store '{}' provisioned at {} (database {})",
        provisioned.tenant.store_name,
        provisioned.tenant.subdomain,
        provisioned.tenant.database_name
    );
    if let Some(email) = provisioned.admin_email {
        println!("Store admin: {}", email);
    }
    Ok(())
}

async fn list_tenants(cfg: AppConfig, json: bool) -> Result<()> {
    let tenants = tenant_service(cfg)
        .await?
        .list_tenants()
        .await
        .context("failed to list stores")?;

    if json {
        return print_json(&tenants);
    }
    if tenants.is_empty() {
        println!("No stores registered");
    }
    for t in &tenants {
        render_tenant(t);
    }
    Ok(())
}

async fn set_status(cfg: AppConfig, args: SetStatusArgs, json: bool) -> Result<()> {
    let updated = tenant_service(cfg)
        .await?
        .set_status(&args.subdomain, args.active)
        .await
        .context("failed to update store status")?;

    if json {
        return print_json(&updated);
    }
    render_tenant(&updated);
    Ok(())
}

fn render_tenant(t: &tenant::Model) {
    println!(
        "- {} • {} • {} • {}",
        t.subdomain,
        t.store_name,
        if t.is_active { "active" } else { "inactive" },
        if t.database_created {
            "provisioned"
        } else {
            "provisioning incomplete"
        }
    );
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
