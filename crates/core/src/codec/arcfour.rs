//! Arcfour (RC4) stream cipher.
//!
//! The keystream state survives across calls, so a string or stream can be
//! fed in arbitrary chunks and still produce the same bytes as a single call.

/// RC4 keystream state.
#[derive(Clone)]
pub struct Arcfour {
    state: [u8; 256],
    i: u8,
    j: u8,
}

impl Arcfour {
    /// Run the key schedule. PDF keys are 5 to 16 bytes, though any
    /// non-empty key up to 256 bytes is accepted.
    pub fn new(key: &[u8]) -> Self {
        debug_assert!(!key.is_empty() && key.len() <= 256);
        let mut state: [u8; 256] = std::array::from_fn(|i| i as u8);

        if !key.is_empty() {
            let mut j: u8 = 0;
            for i in 0..256 {
                j = j.wrapping_add(state[i]).wrapping_add(key[i % key.len()]);
                state.swap(i, j as usize);
            }
        }

        Self { state, i: 0, j: 0 }
    }

    /// XOR the keystream into `data`.
    pub fn apply(&mut self, data: &mut [u8]) {
        for byte in data.iter_mut() {
            *byte ^= self.next_byte();
        }
    }

    /// Encrypt/decrypt into a new buffer (RC4 is symmetric).
    pub fn process(&mut self, data: &[u8]) -> Vec<u8> {
        let mut out = data.to_vec();
        self.apply(&mut out);
        out
    }

    /// One-shot helper: fresh key schedule, then process `data` in place.
    pub fn crypt(key: &[u8], data: &mut [u8]) {
        Self::new(key).apply(data);
    }

    fn next_byte(&mut self) -> u8 {
        self.i = self.i.wrapping_add(1);
        self.j = self.j.wrapping_add(self.state[self.i as usize]);
        self.state.swap(self.i as usize, self.j as usize);

        let idx = self.state[self.i as usize].wrapping_add(self.state[self.j as usize]);
        self.state[idx as usize]
    }
}

impl std::fmt::Debug for Arcfour {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Arcfour").finish_non_exhaustive()
    }
}
