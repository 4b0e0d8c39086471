//! Main application entry point.

fn main() {
    env_logger::init();
    log::info!("Starting TableInk");

    let config = match std::env::args().nth(1) {
        Some(path) => match tableink_core::EngineConfig::load(&path) {
            Ok(config) => config,
            Err(e) => {
                log::error!("Failed to load config from {}: {}", path, e);
                std::process::exit(1);
            }
        },
        None => tableink_core::EngineConfig::default(),
    };

    let host = tableink_app::Host::new(tableink_app::HostConfig {
        engine: config,
        ..Default::default()
    });
    match pollster::block_on(host.run_demo()) {
        Ok(report) => match serde_json::to_string_pretty(&report) {
            Ok(json) => println!("{}", json),
            Err(e) => log::error!("Failed to serialize report: {}", e),
        },
        Err(e) => {
            log::error!("Demo failed: {}", e);
            std::process::exit(1);
        }
    }
}
