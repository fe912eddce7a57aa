//! Number-word table for spoken command arguments
//!
//! Maps 1..=60 to English words and back. Compound numbers are written with a
//! space ("twenty one") because that is how a speech recognizer emits them.

/// Largest number a command argument may carry
pub const MAX_NUMBER: u32 = 60;

const ONES: [&str; 20] = [
    "zero",
    "one",
    "two",
    "three",
    "four",
    "five",
    "six",
    "seven",
    "eight",
    "nine",
    "ten",
    "eleven",
    "twelve",
    "thirteen",
    "fourteen",
    "fifteen",
    "sixteen",
    "seventeen",
    "eighteen",
    "nineteen",
];

const TENS: [&str; 7] = ["", "", "twenty", "thirty", "forty", "fifty", "sixty"];

/// Bidirectional number-word table for `1..=MAX_NUMBER`
#[derive(Debug, Clone)]
pub struct NumberWords {
    words: Vec<String>,
}

impl NumberWords {
    /// Build the table
    #[must_use]
    pub fn new() -> Self {
        let words = (1..=MAX_NUMBER).map(spell).collect();
        Self { words }
    }

    /// Word form of `n`, if it is inside the table
    #[must_use]
    pub fn word(&self, n: u32) -> Option<&str> {
        if n == 0 {
            return None;
        }
        self.words.get(n as usize - 1).map(String::as_str)
    }

    /// Numeric value of a word form ("twenty one" → 21)
    ///
    /// Hyphenated forms ("twenty-one") and extra whitespace are accepted.
    #[must_use]
    pub fn value(&self, word: &str) -> Option<u32> {
        let normalized = word
            .split(|c: char| c.is_whitespace() || c == '-')
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase();

        self.words
            .iter()
            .position(|w| *w == normalized)
            .and_then(|idx| u32::try_from(idx + 1).ok())
    }

    /// Iterate `(n, word)` pairs in ascending order
    pub fn iter(&self) -> impl Iterator<Item = (u32, &str)> {
        (1..=MAX_NUMBER).zip(self.words.iter().map(String::as_str))
    }
}

impl Default for NumberWords {
    fn default() -> Self {
        Self::new()
    }
}

/// Spell out a number below one hundred
fn spell(n: u32) -> String {
    let n = n as usize;
    if n < ONES.len() {
        return ONES[n].to_string();
    }

    let tens = TENS[n / 10];
    match n % 10 {
        0 => tens.to_string(),
        ones => format!("{tens} {}", ONES[ones]),
    }
}
