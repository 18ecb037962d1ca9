//! Pure helpers for virtual document URIs.
//!
//! URIs are slash-separated and root-relative. Both `/` and `\` are accepted as
//! separators on input; output always uses `/`. A trailing separator marks a
//! directory and is preserved.

const SEPARATORS: [char; 2] = ['/', '\\'];

/// What `basename` should cut from the end of the name.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Strip<'a> {
    Nothing,
    /// A literal suffix (only if the name is longer than the suffix).
    Suffix(&'a str),
    /// The detected extension, see [`extname`].
    Extension,
}

/// Resolves `.` and `..` lexically.
/// Returns the surviving segments and how many `..` climbed above the start.
fn lexical(path: &str) -> (Vec<&str>, usize) {
    let mut parts = Vec::new();
    let mut escaped = 0;
    for piece in path.split(SEPARATORS) {
        match piece {
            "" | "." => {}
            ".." => {
                if parts.pop().is_none() {
                    escaped += 1;
                }
            }
            name => parts.push(name),
        }
    }
    (parts, escaped)
}

fn is_dir_marked(path: &str) -> bool {
    path.ends_with(SEPARATORS)
}

/// Normalizes a single URI. See [`normalize_all`].
pub fn normalize(path: &str) -> String {
    normalize_all(&[path])
}

/// Joins `segments` with `/` and normalizes the result.
///
/// * Duplicate separators collapse, `.` disappears, `..` pops the previous segment.
/// * A leading `/` means the virtual root and is stripped.
/// * `..` above the root saturates at the root.
/// * A trailing `/` is kept.
/// * An empty result is `"."`.
pub fn normalize_all<S: AsRef<str>>(segments: &[S]) -> String {
    let joined = segments
        .iter()
        .map(AsRef::as_ref)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("/");
    let (parts, _) = lexical(&joined);
    if parts.is_empty() {
        return ".".to_string();
    }
    let mut out = parts.join("/");
    if is_dir_marked(&joined) {
        out.push('/');
    }
    out
}

/// Splits a normalized URI into its segments. `"."` has none.
pub fn segments(path: &str) -> Vec<&str> {
    lexical(path).0
}

/// True if lexical resolution of `path` climbs above its starting point.
pub fn escapes_root(path: &str) -> bool {
    lexical(path).1 > 0
}

/// Returns the last component of `path`.
/// A directory path keeps its trailing `/`: `basename("a/b/")` is `"b/"`.
pub fn basename(path: &str, strip: Strip<'_>) -> String {
    let trimmed = path.trim_end_matches(SEPARATORS);
    let name = trimmed.rsplit(SEPARATORS).next().unwrap_or_default();
    if name.is_empty() {
        return String::new();
    }
    if is_dir_marked(path) {
        return format!("{name}/");
    }
    let kept = match strip {
        Strip::Nothing => name,
        Strip::Suffix(suffix) if name.len() > suffix.len() => {
            name.strip_suffix(suffix).unwrap_or(name)
        }
        Strip::Suffix(_) => name,
        // position taken on the original name, lowercasing may change byte lengths
        Strip::Extension => match name.rfind('.') {
            None | Some(0) => name,
            Some(i) => &name[..i],
        },
    };
    kept.to_string()
}

/// Returns the parent directory of `path`, always ending with `/`.
/// Top-level entries and the root itself map to `"/"`.
pub fn dirname(path: &str) -> String {
    let trimmed = path.trim_end_matches(SEPARATORS);
    match trimmed.rfind(SEPARATORS) {
        None | Some(0) => "/".to_string(),
        Some(i) => format!("{}/", &trimmed[..i]),
    }
}

/// Returns the lowercased extension including the dot, or `""`.
/// Directories and dotfiles without a second dot (`.gitignore`) have none.
pub fn extname(path: &str) -> String {
    if is_dir_marked(path) {
        return String::new();
    }
    let name = path.rsplit(SEPARATORS).next().unwrap_or_default();
    match name.rfind('.') {
        None | Some(0) => String::new(),
        Some(i) => name[i..].to_lowercase(),
    }
}

/// Path that leads from `from` to `to`; may start with `..`.
pub fn relative(from: &str, to: &str) -> String {
    let from = normalize(from);
    let to_norm = normalize(to);
    let from_parts = segments(&from);
    let to_parts = segments(&to_norm);

    let common = from_parts
        .iter()
        .zip(to_parts.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut parts: Vec<&str> = vec![".."; from_parts.len() - common];
    parts.extend(&to_parts[common..]);
    if parts.is_empty() {
        return ".".to_string();
    }
    let mut out = parts.join("/");
    if is_dir_marked(&to_norm) {
        out.push('/');
    }
    out
}

/// Joins a directory URI and a child name.
pub fn join(dir: &str, name: &str) -> String {
    let dir = normalize(dir);
    if dir == "." {
        normalize(name)
    } else {
        normalize_all(&[dir.as_str(), name])
    }
}

/// Base-36 encoding used by index files.
pub fn to_base36(mut value: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if value == 0 {
        return "0".to_string();
    }
    let mut buf = Vec::new();
    while value > 0 {
        buf.push(DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    buf.reverse();
    String::from_utf8_lossy(&buf).into_owned()
}

pub fn from_base36(value: &str) -> Option<u64> {
    u64::from_str_radix(value, 36).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    mod normalize {
        use super::*;

        #[test]
        fn test_normalize_edge_cases() {
            assert_eq!(normalize("/a"), "a");
            assert_eq!(normalize("a/./b"), "a/b");
            assert_eq!(normalize("a//b///c"), "a/b/c");
            assert_eq!(normalize("a/b/"), "a/b/");
            assert_eq!(normalize(""), ".");
            assert_eq!(normalize("/"), ".");
            assert_eq!(normalize("a/.."), ".");
            assert_eq!(normalize("a\\b\\c"), "a/b/c");
        }

        #[test]
        fn test_normalize_clamps_at_root() {
            assert_eq!(normalize("../../x"), "x");
            assert_eq!(normalize("a/../../../b"), "b");
            assert_eq!(normalize(".."), ".");
            assert_eq!(normalize("a/b/../../../../c/"), "c/");
        }

        #[test]
        fn test_normalize_is_idempotent() {
            let samples = [
                "", "/", ".", "..", "a", "/a/b/", "a//b", "../x/./y/..", "x\\y/", "a/b/c/../../d",
            ];
            for sample in samples {
                let once = normalize(sample);
                assert_eq!(normalize(&once), once, "sample {sample:?}");
            }
        }

        #[test]
        fn test_normalize_all_joins_segments() {
            assert_eq!(normalize_all(&["a", "b", "c.txt"]), "a/b/c.txt");
            assert_eq!(normalize_all(&["a/", "/b"]), "a/b");
            assert_eq!(normalize_all(&["a", "", "b/"]), "a/b/");
            assert_eq!(normalize_all(&["sub", "..", ".."]), ".");
            assert_eq!(normalize_all::<&str>(&[]), ".");
        }

        #[test]
        fn test_escapes_root() {
            assert!(escapes_root(".."));
            assert!(escapes_root("../x"));
            assert!(escapes_root("a/../../x"));
            assert!(!escapes_root("a/../x"));
            assert!(!escapes_root("/a/b"));
        }
    }

    mod names {
        use super::*;

        #[test]
        fn test_basename() {
            assert_eq!(basename("a/b/c.txt", Strip::Nothing), "c.txt");
            assert_eq!(basename("a/b/", Strip::Nothing), "b/");
            assert_eq!(basename("c.txt", Strip::Extension), "c");
            assert_eq!(basename("a/c.tar.gz", Strip::Extension), "c.tar");
            assert_eq!(basename(".gitignore", Strip::Extension), ".gitignore");
            assert_eq!(basename("notes.md", Strip::Suffix(".md")), "notes");
            assert_eq!(basename(".md", Strip::Suffix(".md")), ".md");
            assert_eq!(basename("dir/", Strip::Extension), "dir/");
            assert_eq!(basename("/", Strip::Nothing), "");
        }

        #[test]
        fn test_basename_non_ascii_extension() {
            assert_eq!(basename("ab.İ", Strip::Extension), "ab");
            assert_eq!(basename("aé.İ", Strip::Extension), "aé");
            assert_eq!(basename("dir/ünï.CSV", Strip::Extension), "ünï");
            assert_eq!(extname("aé.İ"), ".İ".to_lowercase());
        }

        #[test]
        fn test_dirname() {
            assert_eq!(dirname("a/b/c.txt"), "a/b/");
            assert_eq!(dirname("a/b/"), "a/");
            assert_eq!(dirname("a.txt"), "/");
            assert_eq!(dirname("/a.txt"), "/");
            assert_eq!(dirname("/"), "/");
        }

        #[test]
        fn test_extname() {
            assert_eq!(extname("a/b.JSON"), ".json");
            assert_eq!(extname("a.tar.gz"), ".gz");
            assert_eq!(extname(".gitignore"), "");
            assert_eq!(extname("Makefile"), "");
            assert_eq!(extname("dir.d/"), "");
            assert_eq!(extname("v1.2/readme"), "");
        }

        #[test]
        fn test_relative() {
            assert_eq!(relative("a/b", "a/c/d.txt"), "../c/d.txt");
            assert_eq!(relative("a", "a/b/"), "b/");
            assert_eq!(relative("a/b", "a/b"), ".");
            assert_eq!(relative(".", "x"), "x");
        }

        #[test]
        fn test_join() {
            assert_eq!(join(".", "a.txt"), "a.txt");
            assert_eq!(join("docs/", "a.txt"), "docs/a.txt");
            assert_eq!(join("docs", "sub/"), "docs/sub/");
        }
    }

    mod base36 {
        use super::*;

        #[test]
        fn test_base36() {
            assert_eq!(to_base36(0), "0");
            assert_eq!(to_base36(35), "z");
            assert_eq!(to_base36(36), "10");
            assert_eq!(from_base36("10"), Some(36));
            assert_eq!(from_base36(&to_base36(1_700_000_000_123)), Some(1_700_000_000_123));
            assert_eq!(from_base36("not base36!"), None);
        }
    }
}
