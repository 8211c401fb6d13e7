//! Mersenne-Twister generator used to mint file identifiers.
//!
//! The state table is 848 words with a 456 word shift, the layout long used by
//! PDF producers for `/ID` generation. Output tempering is the standard MT19937
//! one. Identifiers only need to be unique, not unpredictable.

const MT_N: usize = 848;
const MT_M: usize = 456;
const MATRIX_A: u32 = 0x9908_b0df;
const UPPER_MASK: u32 = 0x8000_0000;
const LOWER_MASK: u32 = 0x7fff_ffff;

/// Seeded generator state.
pub struct MersenneTwister {
    mt: Box<[u32; MT_N]>,
    index: usize,
}

impl MersenneTwister {
    pub fn new(seed: u32) -> Self {
        let mut mt = Box::new([0u32; MT_N]);
        mt[0] = seed;
        for i in 1..MT_N {
            let prev = mt[i - 1];
            mt[i] = 1_812_433_253u32
                .wrapping_mul(prev ^ (prev >> 30))
                .wrapping_add(i as u32);
        }
        Self { mt, index: MT_N }
    }

    pub fn next_u32(&mut self) -> u32 {
        if self.index >= MT_N {
            self.twist();
        }
        let mut v = self.mt[self.index];
        self.index += 1;
        v ^= v >> 11;
        v ^= (v << 7) & 0x9d2c_5680;
        v ^= (v << 15) & 0xefc6_0000;
        v ^= v >> 18;
        v
    }

    fn twist(&mut self) {
        let mag = |v: u32| if v & 1 == 0 { 0 } else { MATRIX_A };
        let mt = &mut self.mt;
        for kk in 0..MT_N - MT_M {
            let v = (mt[kk] & UPPER_MASK) | (mt[kk + 1] & LOWER_MASK);
            mt[kk] = mt[kk + MT_M] ^ (v >> 1) ^ mag(v);
        }
        for kk in MT_N - MT_M..MT_N - 1 {
            let v = (mt[kk] & UPPER_MASK) | (mt[kk + 1] & LOWER_MASK);
            mt[kk] = mt[kk + MT_M - MT_N] ^ (v >> 1) ^ mag(v);
        }
        let v = (mt[MT_N - 1] & UPPER_MASK) | (mt[0] & LOWER_MASK);
        mt[MT_N - 1] = mt[MT_M - 1] ^ (v >> 1) ^ mag(v);
        self.index = 0;
    }
}

/// Draw `N` words from a generator seeded with `seed`.
pub fn random_words<const N: usize>(seed: u32) -> [u32; N] {
    let mut mt = MersenneTwister::new(seed);
    std::array::from_fn(|_| mt.next_u32())
}

/// Build a 16-byte file identifier from two seeds, two words each.
pub fn generate_file_id(seed1: u32, seed2: u32) -> [u8; 16] {
    let mut id = [0u8; 16];
    let words = random_words::<2>(seed1)
        .into_iter()
        .chain(random_words::<2>(seed2));
    for (chunk, word) in id.chunks_exact_mut(4).zip(words) {
        chunk.copy_from_slice(&word.to_le_bytes());
    }
    id
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_stream() {
        let a = random_words::<8>(42);
        let b = random_words::<8>(42);
        assert_eq!(a, b);
        assert_ne!(a, random_words::<8>(43));
    }

    #[test]
    fn survives_multiple_twists() {
        let mut mt = MersenneTwister::new(1);
        let first: Vec<u32> = (0..MT_N * 3).map(|_| mt.next_u32()).collect();
        assert!(first.windows(2).any(|w| w[0] != w[1]));
    }

    #[test]
    fn file_id_halves_follow_their_seeds() {
        let id = generate_file_id(7, 9);
        let other = generate_file_id(7, 10);
        assert_eq!(id[..8], other[..8]);
        assert_ne!(id[8..], other[8..]);
    }
}
