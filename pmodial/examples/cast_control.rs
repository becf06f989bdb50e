//! Discover DIAL receivers, then dump the status of one application on each.
//!
//! Usage: cast_control [app-name]   (defaults to YouTube)

use std::time::Duration;

use pmodial::{DescriptionResolver, DialClient};
use pmossdp::{DiscoveryConfig, DiscoveryEngine, SsdpTransport};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let app = std::env::args().nth(1).unwrap_or_else(|| "YouTube".to_string());

    let engine = DiscoveryEngine::new(SsdpTransport::new(), DiscoveryConfig::default());
    let devices = engine.discover(Duration::from_secs(5))?;
    println!("{} DIAL device(s) answered", devices.len());

    let resolver = DescriptionResolver::new(5);
    for device in devices {
        let dial_device = match resolver.resolve(&device) {
            Ok(d) => d,
            Err(err) => {
                eprintln!("skipping {}: {}", device.usn, err);
                continue;
            }
        };
        println!(
            "[{}] {} ({}) apps at {}",
            dial_device.udn.as_deref().unwrap_or("-"),
            dial_device.friendly_name,
            dial_device.model_name,
            dial_device.application_url
        );

        let client = DialClient::new(dial_device);
        match client.status(&app) {
            Ok(instance) => println!(
                "  {} is {} (stoppable: {})",
                instance.name, instance.state, instance.allow_stop
            ),
            Err(err) => println!("  {app}: {err}"),
        }
    }
    Ok(())
}
