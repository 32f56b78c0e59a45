//! Connect, generate (or resume) an auth key, ping and make one typed API call.
//!
//! # What this does
//!
//! 1. TCP connect to `STRATA_ADDR` (DC2 production by default)
//! 2. Run the key exchange, or resume the key saved in `STRATA_SESSION`
//! 3. Send an encrypted `ping` and wait for the `pong`
//! 4. Call `help.getNearestDc`
//! 5. Save the session for the next run
//!
//! # Run
//! ```text
//! RUST_LOG=debug STRATA_TRANSPORT=intermediate cargo run -p strata-connect
//! ```
//!
//! | Variable           | Default              |
//! |--------------------|----------------------|
//! | `STRATA_ADDR`      | `149.154.167.51:443` |
//! | `STRATA_DC`        | `2`                  |
//! | `STRATA_SESSION`   | `strata.session`     |
//! | `STRATA_TRANSPORT` | `abridged`           |

use std::env;
use std::sync::Arc;

use log::info;
use strata_client::{BinaryFileBackend, Client, Config, TransportKind};
use strata_tl_types::{enums, functions};

fn parse_transport(name: &str) -> Result<TransportKind, String> {
    match name.to_ascii_lowercase().as_str() {
        "abridged" => Ok(TransportKind::Abridged),
        "intermediate" => Ok(TransportKind::Intermediate),
        other => Err(format!("unknown transport {other:?} (expected abridged or intermediate)")),
    }
}

fn config_from_env() -> Result<Config, Box<dyn std::error::Error>> {
    let mut config = Config::default();
    if let Ok(addr) = env::var("STRATA_ADDR") {
        config.addr = addr;
    }
    if let Ok(dc) = env::var("STRATA_DC") {
        config.dc_id = dc.parse()?;
    }
    if let Ok(transport) = env::var("STRATA_TRANSPORT") {
        config.transport = parse_transport(&transport)?;
    }
    let session = env::var("STRATA_SESSION").unwrap_or_else(|_| "strata.session".to_string());
    config.session_backend = Arc::new(BinaryFileBackend::new(session));
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let config = config_from_env()?;
    println!("Connecting to {} (dc {}, {:?}) …", config.addr, config.dc_id, config.transport);
    let client = Client::connect(config).await?;
    println!("✓ Encrypted session up (session id {:#x})", client.session_id());

    let pong = client.ping().await?;
    println!("✓ pong for ping {}", pong.ping_id);

    let enums::NearestDc::NearestDc(dc) = client.invoke(&functions::help::GetNearestDc {}).await?;
    println!("✓ this dc {}, nearest dc {}, country {:?}", dc.this_dc, dc.nearest_dc, dc.country);

    client.save_session()?;
    info!("session saved");
    client.disconnect();
    Ok(())
}
