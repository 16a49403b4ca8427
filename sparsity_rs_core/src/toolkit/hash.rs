//! Deterministic fingerprints used to name task-graph nodes.
//!
//! Two graph nodes built from the same operation and the same (ordered) inputs get the
//! same name, which is what makes merging independently built graphs safe.

use md5::{Digest, Md5};

pub struct Tokenizer(Md5);

impl Default for Tokenizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Tokenizer {
    pub fn new() -> Self {
        Self(Md5::new())
    }

    /// Every write is length-prefixed, so `("ab", "c")` and `("a", "bc")` differ.
    pub fn write(&mut self, bytes: &[u8]) {
        self.0.update((bytes.len() as u64).to_le_bytes());
        self.0.update(bytes);
    }

    pub fn write_tag(&mut self, tag: u8) {
        self.0.update([tag]);
    }

    pub fn finish(self) -> String {
        self.0
            .finalize()
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect()
    }
}

pub trait Tokenize {
    fn tokenize(&self, tokenizer: &mut Tokenizer);
}

/// Fingerprint of an ordered sequence of tokenizable parts.
pub fn tokenize(parts: &[&dyn Tokenize]) -> String {
    let mut tokenizer = Tokenizer::new();
    parts.iter().for_each(|p| p.tokenize(&mut tokenizer));
    tokenizer.finish()
}

impl Tokenize for str {
    fn tokenize(&self, tokenizer: &mut Tokenizer) {
        tokenizer.write(self.as_bytes());
    }
}
impl Tokenize for String {
    fn tokenize(&self, tokenizer: &mut Tokenizer) {
        self.as_str().tokenize(tokenizer)
    }
}
impl Tokenize for usize {
    fn tokenize(&self, tokenizer: &mut Tokenizer) {
        tokenizer.write(&(*self as u64).to_le_bytes());
    }
}
impl Tokenize for i64 {
    fn tokenize(&self, tokenizer: &mut Tokenizer) {
        tokenizer.write(&self.to_le_bytes());
    }
}
impl Tokenize for f64 {
    fn tokenize(&self, tokenizer: &mut Tokenizer) {
        tokenizer.write(&self.to_bits().to_le_bytes());
    }
}
impl Tokenize for bool {
    fn tokenize(&self, tokenizer: &mut Tokenizer) {
        tokenizer.write_tag(u8::from(*self));
    }
}
impl<T: Tokenize> Tokenize for Option<T> {
    fn tokenize(&self, tokenizer: &mut Tokenizer) {
        match self {
            None => tokenizer.write_tag(0),
            Some(v) => {
                tokenizer.write_tag(1);
                v.tokenize(tokenizer);
            }
        }
    }
}
impl<T: Tokenize> Tokenize for [T] {
    fn tokenize(&self, tokenizer: &mut Tokenizer) {
        self.len().tokenize(tokenizer);
        self.iter().for_each(|v| v.tokenize(tokenizer));
    }
}
impl<T: Tokenize> Tokenize for Vec<T> {
    fn tokenize(&self, tokenizer: &mut Tokenizer) {
        self.as_slice().tokenize(tokenizer)
    }
}
impl<T: Tokenize + ?Sized> Tokenize for &T {
    fn tokenize(&self, tokenizer: &mut Tokenizer) {
        (**self).tokenize(tokenizer)
    }
}
