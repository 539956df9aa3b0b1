// SPDX-License-Identifier: Apache-2.0

use unicode_normalization::UnicodeNormalization;

/// Escapes LIKE metacharacters with `!` as the escape character.
#[must_use]
pub fn escape_like(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '!' | '%' | '_' => {
                out.push('!');
                out.push(c);
            }
            _ => out.push(c),
        }
    }
    out
}

/// NFKC + Unicode lowercase, applied to stored keys/names and to search text.
#[must_use]
pub fn normalize_lookup(input: &str) -> String {
    input.nfkc().collect::<String>().to_lowercase()
}

#[must_use]
pub fn contains_pattern(substring: &str) -> String {
    format!("%{}%", escape_like(&normalize_lookup(substring)))
}
