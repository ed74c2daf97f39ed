//! Checkout signing-secret generator for nimbus-premium.
//!
//! Generates a fresh 256-bit secret and prints it as hex, alongside a
//! ready-to-paste configuration snippet. The payment provider dashboard
//! must be configured with the same secret so completion signatures
//! verify.
//!
//! Usage:
//!   cargo run --bin nimbus-keygen [output-file]

use rand::rngs::OsRng;
use rand::RngCore;
use std::env;
use std::fs;
use std::path::Path;

fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    println!("Checkout signing-secret generator for nimbus-premium\n");

    let mut secret = [0u8; 32];
    OsRng.fill_bytes(&mut secret);
    let encoded = hex::encode(secret);

    println!("Generated secret (256-bit, hex):\n");
    println!("  {encoded}\n");
    println!("Configuration snippet for nimbus-premium.toml:\n");
    println!("[checkout]");
    println!("key_secret = \"{encoded}\"");

    // Optionally persist the raw hex for CI or provisioning
    let args: Vec<String> = env::args().collect();
    if let Some(path) = args.get(1).map(Path::new) {
        fs::write(path, &encoded)?;
        println!("\nSecret saved to: {}", path.display());
        println!("  WARNING: Keep this file secure! The payment provider must sign with the same secret.");
    }

    Ok(())
}
