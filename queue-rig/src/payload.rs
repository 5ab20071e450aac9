//! Random message bodies for the load generator.

use rand::Rng;

/// The 52 letters a payload is drawn from.
const LETTERS: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Bits needed to index `LETTERS`.
const LETTER_IDX_BITS: u32 = 6;
const LETTER_IDX_MASK: u64 = (1 << LETTER_IDX_BITS) - 1;

/// Letter indices packed into one 63-bit draw.
const LETTER_IDX_MAX: u32 = 63 / LETTER_IDX_BITS;

/// Generate a random letter string with length drawn uniformly from `[min_len, max_len)`.
///
/// Uses the calling thread's RNG, so concurrent callers never contend.
pub fn random_payload(min_len: usize, max_len: usize) -> String {
    debug_assert!(min_len < max_len);
    let mut rng = rand::thread_rng();
    let len = rng.gen_range(min_len..max_len);
    random_letters(&mut rng, len)
}

/// Fill `len` letters, slicing 6-bit indices out of each 63-bit draw.
///
/// Indices that fall outside the alphabet are discarded, which keeps every
/// letter equally likely.
pub fn random_letters<R: Rng>(rng: &mut R, len: usize) -> String {
    let mut buf = vec![0u8; len];
    let mut i = len;
    let mut cache = rng.gen::<u64>() >> 1;
    let mut remain = LETTER_IDX_MAX;

    while i > 0 {
        if remain == 0 {
            cache = rng.gen::<u64>() >> 1;
            remain = LETTER_IDX_MAX;
        }
        let idx = (cache & LETTER_IDX_MASK) as usize;
        if idx < LETTERS.len() {
            i -= 1;
            buf[i] = LETTERS[idx];
        }
        cache >>= LETTER_IDX_BITS;
        remain -= 1;
    }

    // Every byte comes from LETTERS, which is ASCII.
    buf.into_iter().map(char::from).collect()
}
