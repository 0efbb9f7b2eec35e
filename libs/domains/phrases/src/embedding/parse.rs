//! Output contract of `embed_doc`.
//!
//! The tool prints a few banner lines before the vector, so only the last
//! non-empty stdout line is read. Its fields are separated by commas or ASCII
//! whitespace.

/// Floats read from one output line plus the number of tokens thrown away.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedVector {
    pub values: Vec<f32>,
    pub dropped: usize,
}

pub fn last_non_empty_line(output: &str) -> Option<&str> {
    output.lines().rev().find(|line| !line.trim().is_empty())
}

/// Split `line` and keep every token that is a finite `f32`.
///
/// NaN and infinities parse as floats but cannot be stored or compared, so
/// they are dropped with the rest of the garbage.
pub fn parse_vector_line(line: &str) -> ParsedVector {
    let mut parsed = ParsedVector::default();

    for token in line
        .split(|c: char| c == ',' || c.is_ascii_whitespace())
        .filter(|token| !token.is_empty())
    {
        match token.parse::<f32>() {
            Ok(value) if value.is_finite() => parsed.values.push(value),
            _ => parsed.dropped += 1,
        }
    }

    parsed
}

/// Vector printed by the embedder, `None` when stdout has no content.
pub fn parse_embedder_output(stdout: &str) -> Option<ParsedVector> {
    last_non_empty_line(stdout).map(parse_vector_line)
}
