//! Unique name generators.
//!
//! Renaming passes draw new identifiers from a [`NameGenerator`] that they reset before use.
//! Between two resets a generator never repeats a value. The pipeline owns one generator
//! and lends it to each pass, so separate passes (classes, fields, methods) may reuse the
//! same short names for unrelated symbols.
//!
//! # Strategies
//!
//! - [`LexicographicNames`] counts `A`, `B`, ..., `Z`, `AA`, `AB`, ... and therefore produces
//!   the shortest names possible, in non-decreasing length.
//! - [`OpaqueNames`] produces fixed-length names from the characters `U+007F..=U+00FE`, which
//!   are valid in class files but render poorly and never clash with the separators of
//!   internal names and descriptors.
//!
//! # Examples
//!
//! ```rust
//! use classveil::naming::{LexicographicNames, NameGenerator};
//!
//! let mut names = LexicographicNames::new();
//! let first: Vec<String> = (0..3).map(|_| names.next_name()).collect();
//! assert_eq!(first, ["A", "B", "C"]);
//! names.reset();
//! assert_eq!(names.next_name(), "A");
//! ```

use std::collections::HashSet;

use rand::{rngs::StdRng, Rng, SeedableRng};

/// A source of identifiers that are unique between two calls to [`NameGenerator::reset`].
pub trait NameGenerator: Send {
    /// Restarts the sequence.
    fn reset(&mut self);

    /// Returns a name not returned since the last reset.
    fn next_name(&mut self) -> String;
}

/// Base-26 counter over `A..=Z`.
#[derive(Debug, Clone, Default)]
pub struct LexicographicNames {
    digits: Vec<u8>,
}

impl LexicographicNames {
    /// Creates a counter positioned before `A`.
    #[must_use]
    pub fn new() -> Self {
        LexicographicNames::default()
    }
}

impl NameGenerator for LexicographicNames {
    fn reset(&mut self) {
        self.digits.clear();
    }

    fn next_name(&mut self) -> String {
        let mut carry = true;
        for digit in self.digits.iter_mut().rev() {
            if *digit < b'Z' {
                *digit += 1;
                carry = false;
                break;
            }
            *digit = b'A';
        }
        if carry {
            self.digits = vec![b'A'; self.digits.len() + 1];
        }

        self.digits.iter().map(|&b| char::from(b)).collect()
    }
}

/// Lowest character drawn by [`OpaqueNames`], just above the printable ASCII range.
const OPAQUE_LOW: u32 = 0x7F;
/// Highest character drawn by [`OpaqueNames`].
const OPAQUE_HIGH: u32 = 0xFE;
/// Consecutive collisions tolerated before the name length grows by one.
const OPAQUE_ATTEMPTS: usize = 64;

/// Random fixed-length names from `U+007F..=U+00FE`, regenerated on collision.
///
/// If a length is exhausted (collisions keep occurring) the generator moves on to longer
/// names rather than looping; [`NameGenerator::reset`] returns to the configured length.
#[derive(Debug, Clone)]
pub struct OpaqueNames {
    length: usize,
    current: usize,
    rng: StdRng,
    used: HashSet<String>,
}

impl OpaqueNames {
    /// Creates a generator of `length` character names seeded from the operating system.
    #[must_use]
    pub fn new(length: usize) -> Self {
        Self::with_rng(length, StdRng::from_os_rng())
    }

    /// Creates a generator with a reproducible sequence.
    #[must_use]
    pub fn seeded(length: usize, seed: u64) -> Self {
        Self::with_rng(length, StdRng::seed_from_u64(seed))
    }

    fn with_rng(length: usize, rng: StdRng) -> Self {
        let length = length.max(1);
        OpaqueNames {
            length,
            current: length,
            rng,
            used: HashSet::new(),
        }
    }

    /// The configured name length in characters.
    #[must_use]
    pub fn length(&self) -> usize {
        self.length
    }

    fn draw(&mut self) -> String {
        (0..self.current)
            .filter_map(|_| char::from_u32(self.rng.random_range(OPAQUE_LOW..=OPAQUE_HIGH)))
            .collect()
    }
}

impl NameGenerator for OpaqueNames {
    fn reset(&mut self) {
        self.used.clear();
        self.current = self.length;
    }

    fn next_name(&mut self) -> String {
        loop {
            for _ in 0..OPAQUE_ATTEMPTS {
                let name = self.draw();
                if self.used.insert(name.clone()) {
                    return name;
                }
            }
            self.current += 1;
        }
    }
}

/// Selects the generator the pipeline hands to renaming passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NamingStrategy {
    /// [`LexicographicNames`]
    #[default]
    Lexicographic,
    /// [`OpaqueNames`] of the given length
    Opaque {
        /// Characters per name
        length: usize,
    },
}

impl NamingStrategy {
    /// Creates the generator, seeding opaque names from `seed` if given.
    #[must_use]
    pub fn generator(self, seed: Option<u64>) -> Box<dyn NameGenerator> {
        match (self, seed) {
            (NamingStrategy::Lexicographic, _) => Box::new(LexicographicNames::new()),
            (NamingStrategy::Opaque { length }, Some(seed)) => {
                Box::new(OpaqueNames::seeded(length, seed))
            }
            (NamingStrategy::Opaque { length }, None) => Box::new(OpaqueNames::new(length)),
        }
    }
}
