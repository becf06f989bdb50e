use std::time::Duration;

use pmossdp::{DiscoveryConfig, DiscoveryEngine, SsdpTransport};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    tracing::info!("Starting DIAL discovery dump helper...");

    let engine = DiscoveryEngine::new(SsdpTransport::new(), DiscoveryConfig::default());
    let devices = engine.discover(Duration::from_secs(5))?;

    if devices.is_empty() {
        println!("No DIAL devices answered within the window.");
        return Ok(());
    }

    for device in devices {
        println!(
            "[DIAL] usn={} location={} server={} max_age={}",
            device.usn, device.location, device.server, device.max_age
        );
    }
    Ok(())
}
