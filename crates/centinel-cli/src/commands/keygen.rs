// crates/centinel-cli/src/commands/keygen.rs

use centinel_core::crypto::BaseKey;

use crate::config::KEY_ENV;

/// Print a fresh 256-bit base key, base64url-encoded.
pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let key = BaseKey::generate();
    println!("{}", key.to_b64url());
    eprintln!("Store it in {} on the collector host. It is not recoverable.", KEY_ENV);
    Ok(())
}
