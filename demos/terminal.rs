use std::sync::Arc;

use taptpos::{config::FileStore, Terminal, TerminalOptions};

#[tokio::main]
async fn main() {
    pretty_env_logger::init();

    let path = std::env::var("TPOS_CONFIG").unwrap_or_else(|_| "tpos.json".to_string());

    let store = FileStore::open(&path)
        .map_err(|err| {
            println!("Can't open config {}: {}", path, err);
            std::process::exit(1);
        })
        .unwrap();

    let terminal = Terminal::simulated(Arc::new(store), TerminalOptions::default());

    if let Ok(url) = std::env::var("TPOS_PAIRING_URL") {
        terminal.pair(&url).unwrap();
    }

    if !terminal.is_paired() {
        println!("Not paired, set TPOS_PAIRING_URL to a pairing url");
        std::process::exit(1);
    }

    let reader = terminal
        .register(|count| println!("Discovered readers: {}", count))
        .await
        .unwrap();

    println!(
        "Reader {} ({}) connected",
        reader.serial_number, reader.device_type
    );

    terminal.run().await.unwrap();
}
