//! Edit-script computation.
//!
//! All text positions are counted in Unicode scalar values (`char`s).

pub mod seq;

pub use seq::{diff, diff_affix, DiffOp};

/// Diffs two strings char by char.
pub fn diff_chars(old: &str, new: &str, refined: bool) -> Vec<DiffOp> {
    let old: Vec<char> = old.chars().collect();
    let new: Vec<char> = new.chars().collect();
    if refined {
        seq::diff(&old, &new)
    } else {
        seq::diff_affix(&old, &new)
    }
}

/// Splits `text` into lines, keeping the trailing `\n` on each line.
pub fn split_lines(text: &str) -> Vec<&str> {
    text.split_inclusive('\n').collect()
}

/// Diffs two strings line by line; indices and lengths count lines.
pub fn diff_lines(old: &str, new: &str) -> Vec<DiffOp> {
    seq::diff(&split_lines(old), &split_lines(new))
}
