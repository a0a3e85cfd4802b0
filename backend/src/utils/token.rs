use rand::RngCore;

const TOKEN_BYTES: usize = 32;

/// 32 random bytes, hex encoded. Used for device bearer tokens and admin
/// session cookies.
pub fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}
