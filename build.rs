//! Build script for chainfold
//!
//! Embeds build-time information (git commit, dirty status, build timestamp)
//! for the `chainfold version` subcommand.

fn main() {
    shadow_rs::ShadowBuilder::builder()
        .build()
        .expect("Failed to generate build info");
}
