use rand::Rng;

const ROOM_CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ";
const ROOM_CODE_LEN: usize = 5;

/// Generates a fresh opaque player id. Uniqueness is the caller's
/// responsibility (the room/registry checks for collisions).
pub fn generate_player_id() -> String {
    format!("player-{}", generate_token_suffix())
}

pub fn generate_connection_token() -> String {
    generate_token_suffix()
}

/// Solo/single-player rooms use a generated code prefixed `SP` so callers
/// can distinguish the mode from the code alone (spec §4.6).
pub fn generate_solo_room_code() -> String {
    format!("SP{}", random_code(ROOM_CODE_LEN))
}

fn random_code(len: usize) -> String {
    let mut rng = rand::rng();
    (0..len)
        .map(|_| {
            let idx = rng.random_range(0..ROOM_CODE_ALPHABET.len());
            ROOM_CODE_ALPHABET[idx] as char
        })
        .collect()
}

fn generate_token_suffix() -> String {
    let mut rng = rand::rng();
    let n: u64 = rng.random();
    format!("{:016x}", n)
}
