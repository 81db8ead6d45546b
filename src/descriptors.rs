//! Descriptor words attached to posts.
//!
//! Each post gets a fixed set of adjectives; readers react by picking one.

use rand::seq::SliceRandom;

/// Descriptors drawn for every new post
pub const DESCRIPTORS_PER_POST: usize = 10;

const ADJECTIVES: &str = include_str!("../data/adjectives.txt");

/// Word list descriptors are drawn from.
#[derive(Debug, Clone)]
pub struct DescriptorPool {
    words: Vec<&'static str>,
}

impl Default for DescriptorPool {
    fn default() -> Self {
        Self::embedded()
    }
}

impl DescriptorPool {
    /// The built-in adjective list.
    pub fn embedded() -> Self {
        Self::from_words(ADJECTIVES)
    }

    /// One word per line; blank lines are skipped.
    pub fn from_words(list: &'static str) -> Self {
        let words = list
            .lines()
            .map(str::trim)
            .filter(|w| !w.is_empty())
            .collect();
        Self { words }
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// A single random descriptor.
    pub fn draw_one(&self) -> Option<String> {
        self.words
            .choose(&mut rand::thread_rng())
            .map(|w| w.to_string())
    }

    /// `count` random descriptors, drawn independently (repeats possible).
    pub fn draw(&self, count: usize) -> Vec<String> {
        (0..count).filter_map(|_| self.draw_one()).collect()
    }
}

/// Is `descriptor` one of the post's descriptors?
pub fn check_descriptor(descriptor: &str, descriptors: &[String]) -> bool {
    !descriptor.is_empty() && descriptors.iter().any(|d| d == descriptor)
}
