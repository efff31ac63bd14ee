//! "Did you mean" suggestions for misspelled record keys.

/// The known key nearest to `key` by edit distance, ignoring case.
///
/// Nothing is suggested when more than half of the longer name would have to
/// change; at that point the key is not a typo of anything we know.
pub(crate) fn closest<'a>(key: &str, known: &[&'a str]) -> Option<&'a str> {
    let key = key.to_lowercase();
    known
        .iter()
        .map(|&name| (name, edit_distance(&key, &name.to_lowercase())))
        .min_by_key(|&(_, distance)| distance)
        .filter(|&(name, distance)| {
            distance <= key.chars().count().max(name.chars().count()) / 2
        })
        .map(|(name, _)| name)
}

/// Insertions, deletions and substitutions needed to turn `a` into `b`,
/// computed over a single rolling row.
fn edit_distance(a: &str, b: &str) -> usize {
    let b: Vec<char> = b.chars().collect();
    let mut row: Vec<usize> = (0..=b.len()).collect();

    for (i, ca) in a.chars().enumerate() {
        let mut diagonal = row[0];
        row[0] = i + 1;
        for (j, &cb) in b.iter().enumerate() {
            let above = row[j + 1];
            row[j + 1] = (above + 1)
                .min(row[j] + 1)
                .min(diagonal + usize::from(ca != cb));
            diagonal = above;
        }
    }

    row[b.len()]
}
