use std::sync::Arc;

use clap::Parser;

use playground::config::{CliArgs, Config};
use playground::sandbox::{
    CompilerPipeline, EnvironmentProvisioner, PackageInstaller, ScriptRunner,
};
use playground::web_server::build_server;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let cli = CliArgs::parse();
    let Config {
        server: server_config,
        runtime: runtime_config,
        compiler: compiler_config,
    } = cli.to_config()?;

    let provisioner = Arc::new(EnvironmentProvisioner::new(
        runtime_config.env_dir()?,
        runtime_config.base_interpreter(),
    ));

    if cli.provision_on_startup {
        match provisioner.ensure_async().await {
            Ok(env) => log::info!("User runtime ready at {}", env.root().display()),
            Err(e) => log::error!("User runtime unavailable, script jobs will fail: {e}"),
        }
    }

    let script_runner = ScriptRunner::new(provisioner.clone());
    let installer = PackageInstaller::new(provisioner);
    let pipeline = CompilerPipeline::new(compiler_config.command());

    // ======= PREPARATION END, EXECUTION START =======

    let server = build_server(server_config, script_runner, installer, pipeline)?;
    let server_handle = server.handle();
    let server_task = actix_web::rt::spawn(server);

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            log::info!("Ctrl-c received, shutting down...");
        }
        res_server = server_task => {
            log::error!("Server terminated unexpectedly: {:?}", res_server);
        }
    }

    server_handle.stop(true).await;

    log::info!("Shutdown complete");
    Ok(())
}
