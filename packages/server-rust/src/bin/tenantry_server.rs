//! Tenantry server binary.
//!
//! ```bash
//! # Scope every entity declaring `tenant_id`, accept HS256 tokens
//! TENANTRY_JWT_SECRET=dev-secret tenantry-server --port 8080
//!
//! # Scope only the listed entity types, JSON logs
//! tenantry-server --scoped-entity Invoice --scoped-entity Disbursement --log-json
//! ```

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use clap::Parser;
use tenantry_core::{EntitySchema, PolicyRegistry, ScopingPolicy};
use tenantry_server::network::{AuthConfig, NetworkConfig, NetworkModule};
use tenantry_server::service::{build_data_pipeline, ServerConfig};
use tenantry_server::storage::MemoryStore;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "tenantry-server", version, about = "Multi-tenant scoped data server")]
struct Args {
    #[arg(long, env = "TENANTRY_HOST", default_value = "0.0.0.0")]
    host: String,

    #[arg(long, env = "TENANTRY_PORT", default_value_t = 8080)]
    port: u16,

    /// HS256 secret for bearer tokens. Without it every request is anonymous.
    #[arg(long, env = "TENANTRY_JWT_SECRET", hide_env_values = true)]
    jwt_secret: Option<String>,

    /// Field holding each row's owning tenant.
    #[arg(long, env = "TENANTRY_TENANT_FIELD", default_value = "tenant_id")]
    tenant_field: String,

    /// Restrict scoping to these entity types (repeatable). Empty scopes all
    /// entity types that declare the tenant field.
    #[arg(long = "scoped-entity")]
    scoped_entities: Vec<String>,

    /// Per-operation timeout in milliseconds.
    #[arg(long, env = "TENANTRY_OPERATION_TIMEOUT_MS", default_value_t = 30_000)]
    operation_timeout_ms: u64,

    #[arg(long, env = "TENANTRY_MAX_CONCURRENT_OPERATIONS", default_value_t = 1000)]
    max_concurrent_operations: u32,

    /// Allowed CORS origins (repeatable).
    #[arg(long = "cors-origin", default_value = "*")]
    cors_origins: Vec<String>,

    /// Emit logs as JSON lines.
    #[arg(long, env = "TENANTRY_LOG_JSON")]
    log_json: bool,
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Entity types served by this binary.
fn entity_schemas(tenant_field: &str) -> Vec<EntitySchema> {
    vec![
        EntitySchema::new("Invoice")
            .required_field(tenant_field)
            .field("number")
            .field("amount")
            .field("status"),
        EntitySchema::new("Disbursement")
            .required_field(tenant_field)
            .field("amount")
            .field("payee"),
        EntitySchema::new("Collection")
            .required_field(tenant_field)
            .field("amount")
            .field("payer"),
        EntitySchema::new("Currency")
            .required_field("code")
            .field("name"),
    ]
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.log_json);

    let config = ServerConfig {
        node_id: uuid::Uuid::new_v4().to_string(),
        default_operation_timeout_ms: args.operation_timeout_ms,
        max_concurrent_operations: args.max_concurrent_operations,
        scoping: ScopingPolicy::default()
            .with_tenant_field(args.tenant_field.clone())
            .allow(args.scoped_entities.iter().cloned()),
    };

    let mut builder = PolicyRegistry::builder(config.scoping.clone());
    for schema in entity_schemas(&config.scoping.tenant_field) {
        builder.register(schema).context("registering entity types")?;
    }
    let registry = Arc::new(builder.build().context("validating scoping policy")?);

    let store = MemoryStore::new(Arc::clone(&registry));
    let data = build_data_pipeline(store, Arc::clone(&registry), &config);

    let network = NetworkConfig {
        host: args.host,
        port: args.port,
        cors_origins: args.cors_origins,
        request_timeout: Duration::from_millis(args.operation_timeout_ms),
        auth: AuthConfig {
            jwt_secret: args.jwt_secret,
            leeway_secs: 0,
        },
        ..NetworkConfig::default()
    };

    let mut module = NetworkModule::new(network, data, registry);
    let port = module.start().await?;
    info!(node_id = config.node_id.as_str(), port, "tenantry server started");

    module
        .serve(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %err, "failed to listen for shutdown signal");
            }
        })
        .await?;

    info!("tenantry server stopped");
    Ok(())
}
