// https://github.com/Geal/nom/blob/master/doc/choosing_a_combinator.md

//! Line classification and whitespace tokenizing.
//!
//! There is no quoting and no escaping: whitespace is the only separator,
//! and `|`, `<`, `>` and a trailing `&` are the only characters with meaning.

use nom::{
    bytes::complete::{take_till, take_till1, take_while, take_while1},
    character::complete::char,
    multi::{separated_list0, separated_list1},
    sequence::{delimited, preceded},
    IResult,
};

use crate::error::{Result, ShellError};

/// Upper bound on the number of commands chained with `|`.
pub(crate) const MAX_PIPELINE_SEGMENTS: usize = 20;

/// Upper bound on the number of tokens in one pipeline segment.
pub(crate) const MAX_SEGMENT_ARGS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LineKind {
    Empty,
    Background,
    Pipeline,
    Redirection,
    Plain,
}

/// Classifies an already-stripped line.
///
/// Priority is background, then pipeline, then redirection, then plain.
pub(crate) fn classify(line: &str) -> LineKind {
    if line.is_empty() {
        LineKind::Empty
    } else if line.ends_with('&') {
        LineKind::Background
    } else if line.contains('|') {
        LineKind::Pipeline
    } else if line.contains(|c| c == '<' || c == '>') {
        LineKind::Redirection
    } else {
        LineKind::Plain
    }
}

// words and separators share one predicate, so every input splits completely
fn word(input: &str) -> IResult<&str, &str> {
    take_till1(|c: char| c.is_whitespace())(input)
}

fn whitespace0(input: &str) -> IResult<&str, &str> {
    take_while(|c: char| c.is_whitespace())(input)
}

fn whitespace1(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c.is_whitespace())(input)
}

fn segment(input: &str) -> IResult<&str, &str> {
    take_till(|c| c == '|')(input)
}

/// Splits on runs of Unicode whitespace.
pub(crate) fn tokenize(input: &str) -> Vec<&str> {
    match delimited(whitespace0, separated_list0(whitespace1, word), whitespace0)(input) {
        Ok(("", words)) => words,
        Ok((rest, words)) => {
            log::warn!("tokenizer stopped early, {rest:?} left over");
            words.into_iter().chain(rest.split_whitespace()).collect()
        }
        Err(_) => input.split_whitespace().collect(),
    }
}

/// Splits a plain line into the command name and everything after it.
///
/// The remainder is one opaque argument, not a word list.
pub(crate) fn split_command(line: &str) -> Option<(&str, Option<&str>)> {
    let (rest, name) = preceded(whitespace0, word)(line).ok()?;
    let rest = rest.trim();
    Some((name, if rest.is_empty() { None } else { Some(rest) }))
}

/// Splits a pipeline into per-segment argument vectors.
pub(crate) fn split_pipeline(line: &str) -> Result<Vec<Vec<&str>>> {
    let (_, raw) = separated_list1(char('|'), segment)(line)
        .map_err(|e| ShellError::Syntax(e.to_string()))?;

    if raw.len() > MAX_PIPELINE_SEGMENTS {
        return Err(ShellError::Syntax(format!(
            "too many pipeline segments ({}, at most {})",
            raw.len(),
            MAX_PIPELINE_SEGMENTS
        )));
    }

    raw.into_iter()
        .map(|segment| {
            let argv = tokenize(segment);
            if argv.is_empty() {
                Err(ShellError::Syntax("empty command in pipeline".into()))
            } else if argv.len() > MAX_SEGMENT_ARGS {
                Err(ShellError::Syntax(format!(
                    "too many arguments for {} ({}, at most {})",
                    argv[0],
                    argv.len(),
                    MAX_SEGMENT_ARGS
                )))
            } else {
                Ok(argv)
            }
        })
        .collect()
}

#[derive(Debug, Default, PartialEq)]
pub(crate) struct Redirection<'a> {
    pub input: Option<&'a str>,
    pub output: Option<&'a str>,
    pub argv: Vec<&'a str>,
}

/// Single left-to-right scan: `<` and `>` each take the following token as
/// a path, every other token lands in `argv` in order.
pub(crate) fn parse_redirection(line: &str) -> Result<Redirection<'_>> {
    let mut redirection = Redirection::default();
    let mut tokens = tokenize(line).into_iter();

    while let Some(token) = tokens.next() {
        match token {
            "<" => {
                let path = tokens
                    .next()
                    .ok_or_else(|| ShellError::Syntax("missing input path after '<'".into()))?;
                redirection.input = Some(path);
            }
            ">" => {
                let path = tokens
                    .next()
                    .ok_or_else(|| ShellError::Syntax("missing output path after '>'".into()))?;
                redirection.output = Some(path);
            }
            _ => redirection.argv.push(token),
        }
    }

    if redirection.argv.is_empty() {
        return Err(ShellError::Syntax("missing command".into()));
    }
    Ok(redirection)
}
