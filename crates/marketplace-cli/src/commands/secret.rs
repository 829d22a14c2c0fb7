//! Secret command - generate a shared signing secret.

use marketplace_token::SigningSecret;

use crate::ui;

/// Print a fresh signing secret.
///
/// The value goes to stdout on its own line so it can be captured by
/// scripts; the hints go around it.
pub fn run_secret_generate() {
    let secret = SigningSecret::generate();

    ui::info("Set this value as jwtSecret (or MARKETPLACE_JWT_SECRET) on BOTH the issuer and the gateway:");
    println!("{}", secret.to_config_value());
}
