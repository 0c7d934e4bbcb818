use fusion_plugin::features::host::vmrun::VmrunHost;
use fusion_plugin::shared::config::PluginConfig;
use fusion_plugin::shared::types::DescribeRequest;
use fusion_plugin::FusionPlugin;
use std::sync::Arc;
use tracing::{info, warn, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    if std::env::args().nth(1).as_deref() == Some("version") {
        let info = serde_json::json!({
            "version": VERSION,
            "revision": option_env!("FUSION_PLUGIN_REVISION").unwrap_or("unknown"),
        });
        println!("{}", serde_json::to_string_pretty(&info)?);
        return Ok(());
    }

    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("fusion_plugin=info,info")),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = PluginConfig::from_env();
    info!(
        vm_dir = %config.vm_dir.display(),
        vm_lib = %config.vm_lib.display(),
        vmrun = %config.vmrun_path.display(),
        host_type = config.host_type.as_flag(),
        "Starting Fusion instance plugin"
    );

    let host = Arc::new(VmrunHost::new(&config));
    let plugin = FusionPlugin::start(config, host).await?;

    match plugin
        .controller()
        .describe_instances(DescribeRequest::default())
        .await
    {
        Ok(instances) => info!(count = instances.len(), "Found running instances"),
        Err(error) => warn!(error = %error, "Initial instance scan failed"),
    }

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    plugin.shutdown().await;
    Ok(())
}
