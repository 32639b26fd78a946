//! Repetition points: notes at which a rank's pitch breaks back.
//!
//! High mixture stops repeat to a lower pitch partway up the compass. The
//! break points ride in the stop's comment field between `$` markers, as
//! space-separated `note:pitch` tokens where pitch is a length in feet
//! written `a+b/c`, `b/c` or `b`. Example: `$ 60:4 72:2+2/3 $`.

use crate::{Error, Result};

/// One break point: from `note` upward the stop speaks at `num/den` feet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RepetitionPoint {
    pub note: u8,
    pub num: i32,
    pub den: i32,
}

fn parse_int(s: &str, tok: &str) -> Result<i32> {
    s.parse().map_err(|_| Error::Repetition(tok.to_owned()))
}

fn parse_pitch(s: &str, tok: &str) -> Result<(i32, i32)> {
    if let Some((whole, frac)) = s.split_once('+') {
        let (num, den) = frac
            .split_once('/')
            .ok_or_else(|| Error::Repetition(tok.to_owned()))?;
        let whole = parse_int(whole, tok)?;
        let num = parse_int(num, tok)?;
        let den = parse_int(den, tok)?;
        Ok((whole * den + num, den))
    } else if let Some((num, den)) = s.split_once('/') {
        Ok((parse_int(num, tok)?, parse_int(den, tok)?))
    } else {
        Ok((parse_int(s, tok)?, 1))
    }
}

/// Parse the repetition points out of a comment field.
///
/// No `$` marker means no repetitions. Anything malformed between the
/// markers is an error rather than a best-effort guess.
pub fn parse_repetitions(comments: &str) -> Result<Vec<RepetitionPoint>> {
    let Some(start) = comments.find('$') else {
        return Ok(Vec::new());
    };
    let rest = &comments[start + 1..];
    let body = match rest.find('$') {
        Some(end) => &rest[..end],
        None => rest,
    };

    let mut points = Vec::new();
    for tok in body.split_whitespace() {
        let (note, pitch) = tok
            .split_once(':')
            .ok_or_else(|| Error::Repetition(tok.to_owned()))?;
        let note = parse_int(note, tok)?;
        if !(0..=127).contains(&note) {
            return Err(Error::Repetition(tok.to_owned()));
        }
        let (num, den) = parse_pitch(pitch, tok)?;
        if num <= 0 || den <= 0 {
            return Err(Error::Repetition(tok.to_owned()));
        }
        points.push(RepetitionPoint {
            note: note as u8,
            num,
            den,
        });
    }
    Ok(points)
}
