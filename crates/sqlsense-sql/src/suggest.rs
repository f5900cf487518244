//! "Did you mean" suggestions by edit distance

/// Levenshtein distance over characters
pub fn levenshtein_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();

    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    // Single rolling row; prev[j] is the distance between a[..i] and b[..j]
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}

/// Closest candidate within `max_distance`, compared case-insensitively
///
/// Ties keep the first candidate seen, so callers control precedence by order.
pub fn nearest<'a, I>(name: &str, candidates: I, max_distance: usize) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    let name = name.to_lowercase();
    let mut best: Option<(usize, &'a str)> = None;

    for candidate in candidates {
        let distance = levenshtein_distance(&name, &candidate.to_lowercase());
        if distance > max_distance {
            continue;
        }
        if best.map_or(true, |(d, _)| distance < d) {
            best = Some((distance, candidate));
        }
    }

    best.map(|(_, candidate)| candidate)
}
