//! Message pool construction.
//!
//! Templates are drawn in blocks: each block is a fresh uniform
//! permutation of the whole template list, so within a block every
//! template appears exactly once.

use rand::Rng;
use rand::seq::SliceRandom;

use crate::config::MENTION_PLACEHOLDER;

/// Largest number of messages one broadcast may send.
pub const MAX_QUANTITY: u32 = 100;

/// A validated broadcast size in `1..=MAX_QUANTITY`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quantity(u32);

impl Quantity {
    #[must_use]
    pub fn new(value: u32) -> Option<Self> {
        (1..=MAX_QUANTITY).contains(&value).then_some(Self(value))
    }

    /// Parses user input; anything outside the range is rejected.
    #[must_use]
    pub fn parse(input: &str) -> Option<Self> {
        input.trim().parse().ok().and_then(Self::new)
    }

    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }
}

/// Lazily yields templates block by block, reshuffling at every block start.
///
/// Finite: stops after `remaining` items. Yields nothing for an empty
/// template list.
#[derive(Debug)]
pub struct BlockShuffle<'a, R> {
    templates: &'a [String],
    order: Vec<usize>,
    cursor: usize,
    remaining: usize,
    rng: R,
}

impl<'a, R: Rng> BlockShuffle<'a, R> {
    pub fn new(templates: &'a [String], quantity: Quantity, rng: R) -> Self {
        Self {
            templates,
            order: (0..templates.len()).collect(),
            // Forces a shuffle before the first item.
            cursor: templates.len(),
            remaining: quantity.get() as usize,
            rng,
        }
    }
}

impl<'a, R: Rng> Iterator for BlockShuffle<'a, R> {
    type Item = &'a str;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 || self.templates.is_empty() {
            return None;
        }

        if self.cursor == self.order.len() {
            self.order.shuffle(&mut self.rng);
            self.cursor = 0;
        }

        let template = &self.templates[self.order[self.cursor]];
        self.cursor += 1;
        self.remaining -= 1;
        Some(template.as_str())
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = if self.templates.is_empty() {
            0
        } else {
            self.remaining
        };
        (n, Some(n))
    }
}

/// Builds the ordered list of `quantity` templates to send.
pub fn build_pool<R: Rng>(templates: &[String], quantity: Quantity, rng: R) -> Vec<String> {
    BlockShuffle::new(templates, quantity, rng)
        .map(str::to_owned)
        .collect()
}

/// Substitutes the mention placeholder.
#[must_use]
pub fn render(template: &str, mention: &str) -> String {
    template.replace(MENTION_PLACEHOLDER, mention)
}

/// HTML link mentioning a user by id.
#[must_use]
pub fn render_mention(user_id: i64, display_name: &str) -> String {
    let name = display_name.trim();
    let name = if name.is_empty() {
        user_id.to_string()
    } else {
        html_escape::encode_text(name).into_owned()
    };
    format!("<a href=\"tg://user?id={user_id}\">{name}</a>")
}
