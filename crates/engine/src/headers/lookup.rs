//! Known-header recognition without hashing.
//!
//! Candidates are grouped by name length. Each candidate stores its name as up to four
//! little-endian `u64` words together with a mask that clears the ASCII case bit on letters
//! and keeps every other byte exact, so a lookup loads the input words, masks them and
//! compares.

use once_cell::sync::Lazy;

use crate::headers::KnownHeader;

const MAX_WORDS: usize = 4;
const MAX_NAME_LEN: usize = MAX_WORDS * 8;

struct Signature {
    words: [u64; MAX_WORDS],
    masks: [u64; MAX_WORDS],
    header: KnownHeader,
}

impl Signature {
    fn new(header: KnownHeader) -> Self {
        let name = header.as_str().as_bytes();
        assert!(name.len() <= MAX_NAME_LEN, "known header name too long: {header}");

        let mut words = [0u64; MAX_WORDS];
        let mut masks = [0u64; MAX_WORDS];
        for (i, &b) in name.iter().enumerate() {
            let mask: u8 = if b.is_ascii_alphabetic() { 0xDF } else { 0xFF };
            words[i / 8] |= u64::from(b & mask) << (8 * (i % 8));
            masks[i / 8] |= u64::from(mask) << (8 * (i % 8));
        }
        Self { words, masks, header }
    }

    #[inline]
    fn matches(&self, input: &[u64; MAX_WORDS], word_count: usize) -> bool {
        (0..word_count).all(|i| input[i] & self.masks[i] == self.words[i])
    }
}

/// Candidates per name length.
static TABLE: Lazy<Vec<Vec<Signature>>> = Lazy::new(|| {
    let mut table: Vec<Vec<Signature>> = (0..=MAX_NAME_LEN).map(|_| Vec::new()).collect();
    for &header in KnownHeader::ALL {
        table[header.as_str().len()].push(Signature::new(header));
    }
    table
});

#[inline]
fn load_words(name: &[u8]) -> [u64; MAX_WORDS] {
    let mut words = [0u64; MAX_WORDS];
    for (word, chunk) in words.iter_mut().zip(name.chunks(8)) {
        let mut bytes = [0u8; 8];
        bytes[..chunk.len()].copy_from_slice(chunk);
        *word = u64::from_le_bytes(bytes);
    }
    words
}

pub(crate) fn lookup(name: &[u8]) -> Option<KnownHeader> {
    let candidates = TABLE.get(name.len())?;
    if candidates.is_empty() {
        return None;
    }
    let input = load_words(name);
    let word_count = name.len().div_ceil(8);
    candidates.iter().find(|sig| sig.matches(&input, word_count)).map(|sig| sig.header)
}
