//! Numeric suffixes of shard and computer names (`shard3`, `comp12`).

/// Returns the number starting at the first digit of `name`.
///
/// Only the contiguous run of digits is taken, so `shard12_b7` yields `12`.
/// Returns [`None`] if `name` contains no digits or the number doesn't fit
/// into [`u64`].
pub fn numeric_suffix(name: &str) -> Option<u64> {
    let start = name.find(|c: char| c.is_ascii_digit())?;
    let digits = &name[start..];
    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());

    digits[..end].parse().ok()
}

/// Returns the largest [`numeric_suffix`] among `names`, or `0` if none of
/// them has one.
pub fn max_suffix<'a>(names: impl IntoIterator<Item = &'a str>) -> u64 {
    names
        .into_iter()
        .filter_map(numeric_suffix)
        .max()
        .unwrap_or(0)
}
