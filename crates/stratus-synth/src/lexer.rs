//! Splitting of strings into literal text and token markers using `nom`.
//!
//! A token string produced by [`ConstructTree::token_string`] looks like
//! `${Token[LB.DNSName.3]}`; only the trailing number is significant. Any
//! string may contain several markers mixed with ordinary text.
//!
//! [`ConstructTree::token_string`]: crate::tree::ConstructTree::token_string

use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::{tag, take_until, take_until1},
    combinator::rest,
    sequence::delimited,
};
use stratus_common::constants::{TOKEN_MARKER_END, TOKEN_MARKER_START};
use stratus_common::error::{Result, StratusError};

/// A piece of a string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fragment<'a> {
    /// Plain text.
    Literal(&'a str),
    /// A registered token, by index.
    Token(usize),
}

/// Returns `true` if `input` contains at least one token marker.
#[must_use]
pub fn contains_token(input: &str) -> bool {
    input.contains(TOKEN_MARKER_START)
}

/// Parses one complete marker and returns its token index.
fn marker(input: &str) -> IResult<&str, usize> {
    let (input, body) = delimited(
        tag(TOKEN_MARKER_START),
        take_until(TOKEN_MARKER_END),
        tag(TOKEN_MARKER_END),
    )
    .parse(input)?;
    let digits = body.rsplit('.').next().unwrap_or(body);
    let index = digits.parse::<usize>().map_err(|_| {
        nom::Err::Failure(nom::error::Error::new(body, nom::error::ErrorKind::Digit))
    })?;
    Ok((input, index))
}

/// Parses text up to the next marker, or to the end of input.
fn literal(input: &str) -> IResult<&str, &str> {
    alt((take_until1(TOKEN_MARKER_START), rest)).parse(input)
}

/// Splits `input` into literal and token fragments.
///
/// # Errors
///
/// Returns an error if a marker is not closed or has no numeric index.
pub fn split_tokens(input: &str) -> Result<Vec<Fragment<'_>>> {
    let mut fragments = Vec::new();
    let mut remaining = input;

    while !remaining.is_empty() {
        if remaining.starts_with(TOKEN_MARKER_START) {
            let (rest, index) = marker(remaining).map_err(|e| StratusError::UnresolvedToken {
                token: format!("malformed token marker at \"{}\" ({e})", preview(remaining)),
            })?;
            fragments.push(Fragment::Token(index));
            remaining = rest;
        } else {
            let (rest, text) = literal(remaining).map_err(|e| StratusError::UnresolvedToken {
                token: format!("unreadable text at \"{}\" ({e})", preview(remaining)),
            })?;
            fragments.push(Fragment::Literal(text));
            remaining = rest;
        }
    }

    Ok(fragments)
}

fn preview(input: &str) -> String {
    input.chars().take(24).collect()
}
