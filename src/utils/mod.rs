//! Utility modules
//!
//! Small helpers shared by the signaling and viewer modules.

pub mod uri;

pub use uri::decode_uri;

use rand::Rng;

const BASE36: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Generate a random signaling client id (uppercase base-36)
pub fn random_client_id() -> String {
    let mut rng = rand::thread_rng();
    (0..11)
        .map(|_| BASE36[rng.gen_range(0..BASE36.len())] as char)
        .collect()
}
