//! Local file names for downloaded objects.

use std::collections::{HashMap, HashSet};

use sxflow_verify::Sha256Hasher;

/// Longest name kept verbatim when shortening is enabled.
pub const MAX_NAME_LEN: usize = 60;

const DIGEST_CHARS: usize = 40;

/// Replace characters that are unsafe in local file names.
pub fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '*' | ';' | ':' | '/' | '\\' => '_',
            c => c,
        })
        .collect()
}

/// Replace an over-long name with `_`, a digest of the full name, and as
/// much of the name's tail as still fits, so the extension survives.
pub fn shorten(name: &str) -> String {
    if name.chars().count() <= MAX_NAME_LEN {
        return name.to_string();
    }
    let digest = Sha256Hasher::hex_digest(name.as_bytes());
    let tail_len = MAX_NAME_LEN - DIGEST_CHARS - 1;
    let tail: String = {
        let chars: Vec<char> = name.chars().collect();
        chars[chars.len() - tail_len..].iter().collect()
    };
    format!("_{}{}", &digest[..DIGEST_CHARS], tail)
}

pub fn local_name(object: &str, shorten_names: bool) -> String {
    let name = sanitize(object);
    if shorten_names { shorten(&name) } else { name }
}

/// Local names for a whole listing, in order.
///
/// Objects whose sanitised names collide get a short digest of their remote
/// name inserted before the extension. `None` if names still collide.
pub fn local_names<'a, I>(objects: I, shorten_names: bool) -> Option<Vec<String>>
where
    I: IntoIterator<Item = &'a str>,
{
    let objects: Vec<&str> = objects.into_iter().collect();
    let names: Vec<String> = objects.iter().map(|o| local_name(o, shorten_names)).collect();

    let mut counts: HashMap<&str, usize> = HashMap::new();
    for name in &names {
        *counts.entry(name.as_str()).or_default() += 1;
    }
    let names: Vec<String> = names
        .iter()
        .zip(&objects)
        .map(|(name, object)| match counts.get(name.as_str()) {
            Some(&n) if n > 1 => disambiguate(name, object),
            _ => name.clone(),
        })
        .collect();

    let mut seen = HashSet::new();
    if !names.iter().all(|n| seen.insert(n.as_str())) {
        return None;
    }
    Some(names)
}

fn disambiguate(name: &str, object: &str) -> String {
    let digest = Sha256Hasher::hex_digest(object.as_bytes());
    let tag = &digest[..8];
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => format!("{stem}-{tag}.{ext}"),
        _ => format!("{name}-{tag}"),
    }
}
