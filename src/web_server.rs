use actix_web::{App, HttpServer, dev::Server, middleware, web};

use crate::config::ServerConfig;
use crate::routes;
use crate::sandbox::{CompilerPipeline, PackageInstaller, ScriptRunner};

pub fn build_server(
    server_config: ServerConfig,
    script_runner: ScriptRunner,
    installer: PackageInstaller,
    pipeline: CompilerPipeline,
) -> std::io::Result<Server> {
    let script_runner = web::Data::new(script_runner);
    let installer = web::Data::new(installer);
    let pipeline = web::Data::new(pipeline);
    let address = server_config.address();

    let mut server = HttpServer::new(move || {
        App::new()
            .app_data(script_runner.clone())
            .app_data(installer.clone())
            .app_data(pipeline.clone())
            .wrap(middleware::Logger::default())
            .configure(routes::configure)
    });
    if let Some(workers) = server_config.workers {
        server = server.workers(workers);
    }

    log::info!("Listening on http://{}:{}", address.0, address.1);
    Ok(server.bind(address)?.run())
}
