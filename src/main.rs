use std::process::ExitCode;
use std::sync::Arc;

use ows_server::server::new_server;
use ows_server::{DocumentRenderer, JsonProjectStore, OwsServer, Settings, logging};

fn main() -> ExitCode {
    let settings = match Settings::load() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Invalid configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    logging::init(&settings);
    settings.log_summary();

    let address = settings.bind_address.clone();
    let ows = Arc::new(OwsServer::new(
        settings,
        Arc::new(JsonProjectStore),
        Arc::new(DocumentRenderer),
    ));

    let server = new_server(&address, ows);
    if let Err(e) = server.listen() {
        tracing::error!("Failed to start server: {}", e);
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
