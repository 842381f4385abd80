//! Loose `key=value` / `key: value` payload format.
//!
//! The feed has emitted a debug formatted record like
//! `TapToPay(payment_intent_id=pi_1, client_secret=cs_1, amount=500)` instead of
//! json, this parser extracts whatever known keys it can find in such text.

use std::collections::HashMap;

use super::PaymentEvent;

fn is_bracket(c: char) -> bool {
    matches!(c, '(' | ')' | '{' | '}' | '[' | ']')
}

fn is_separator(c: char) -> bool {
    c == ',' || c == ';' || c.is_whitespace()
}

fn is_pair_separator(c: char) -> bool {
    c == '=' || c == ':'
}

/// `TapToPay(...)` -> `(...)`, a leading word not followed by a bracket is kept.
fn strip_type_tag(s: &str) -> &str {
    let tag_len = s
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .unwrap_or(s.len());

    match s[tag_len..].chars().next() {
        Some('(') | Some('{') => &s[tag_len..],
        _ => s,
    }
}

fn fields(raw: &str) -> HashMap<String, String> {
    let body = strip_type_tag(raw.trim())
        .trim_matches(is_bracket)
        .replace(['\'', '"'], "");

    let mut map = HashMap::new();

    let mut tokens = body
        .split(is_separator)
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .peekable();

    while let Some(token) = tokens.next() {
        let Some((key, value)) = token.split_once(is_pair_separator) else {
            log::trace!("Skip loose token without separator: {}", token);
            continue;
        };

        let key = key.trim().trim_matches(is_bracket);
        if key.is_empty() {
            continue;
        }

        let mut value = value.trim().trim_matches(is_bracket);
        if value.is_empty() {
            // `key: value`, the value went to the next token
            if let Some(next) = tokens.next_if(|next| !next.contains(is_pair_separator)) {
                value = next.trim_matches(is_bracket);
            }
        }

        map.insert(key.to_lowercase(), value.to_string());
    }

    map
}

pub(super) fn parse(raw: &str) -> PaymentEvent {
    let mut map = fields(raw);

    let mut take = |key: &str| {
        map.remove(key)
            .filter(|val| !val.is_empty() && val != "null")
    };

    PaymentEvent {
        payment_intent_id: take("payment_intent_id"),
        client_secret: take("client_secret"),
        currency: take("currency"),
        amount: take("amount").and_then(|val| val.parse().ok()),
        tpos_id: take("tpos_id"),
        payment_hash: take("payment_hash"),
    }
}
