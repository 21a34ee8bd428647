/// Flags that are never permitted, for any operation
///
/// These let a caller run arbitrary programs (`--upload-pack`, `--exec`),
/// rewrite git config for the invocation (`-c`, `--config-env`), or point git
/// at a different repository or output file. Matched case-insensitively.
pub const BLOCKED_GIT_FLAGS: &[&str] = &[
    "--upload-pack",
    "--receive-pack",
    "--exec",
    "--exec-path",
    "-c",
    "--config",
    "--config-env",
    "-C",
    "--git-dir",
    "--work-tree",
    "--separate-git-dir",
    "--template",
    "--output",
    "--ext-diff",
    "--textconv",
    "--open-files-in-pager",
];

/// Short flags whose long form is the same for every operation that allows them
const SHORT_TO_LONG: &[(&str, &str)] = &[
    ("-a", "--all"),
    ("-f", "--force"),
    ("-n", "--dry-run"),
    ("-q", "--quiet"),
    ("-v", "--verbose"),
    ("-u", "--set-upstream"),
    ("-m", "--message"),
    ("-d", "--delete"),
    ("-r", "--remotes"),
    ("-l", "--list"),
    ("-t", "--tags"),
];

/// Short flags that mean something different for one subcommand
///
/// Consulted before `SHORT_TO_LONG`.
const OPERATION_SHORT_TO_LONG: &[(&str, &str, &str)] = &[
    ("log", "-n", "--max-count"),
    ("log", "-p", "--patch"),
    ("show", "-s", "--no-patch"),
    ("status", "-s", "--short"),
    ("status", "-b", "--branch"),
    ("status", "-u", "--untracked-files"),
    ("add", "-u", "--update"),
    ("add", "-A", "--all"),
    ("commit", "-s", "--signoff"),
    ("commit", "-n", "--no-verify"),
    ("tag", "-a", "--annotate"),
    ("diff", "-p", "--patch"),
    ("fetch", "-p", "--prune"),
    ("stash", "-u", "--include-untracked"),
    ("grep", "-n", "--line-number"),
    ("grep", "-i", "--ignore-case"),
    ("grep", "-l", "--files-with-matches"),
    ("grep", "-w", "--word-regexp"),
    ("grep", "-E", "--extended-regexp"),
    ("grep", "-F", "--fixed-strings"),
];

/// Map a flag to its canonical long form
///
/// A value attached with `=` is preserved: only the part before the first `=`
/// is looked up. Flags without a mapping (long flags, unknown short flags,
/// combined short flags like `-fd`) are returned unchanged.
pub fn normalize_flag(flag: &str) -> String {
    normalize_with(flag, lookup_global)
}

/// Like [`normalize_flag`], but honours subcommand-specific meanings first
pub fn normalize_flag_for(operation: &str, flag: &str) -> String {
    normalize_with(flag, |base| {
        OPERATION_SHORT_TO_LONG
            .iter()
            .find(|(op, short, _)| *op == operation && *short == base)
            .map(|(_, _, long)| *long)
            .or_else(|| lookup_global(base))
    })
}

/// Whether the flag's base name is in [`BLOCKED_GIT_FLAGS`]
pub fn is_blocked_flag(flag: &str) -> bool {
    let base = flag_base(flag);
    BLOCKED_GIT_FLAGS
        .iter()
        .any(|blocked| blocked.eq_ignore_ascii_case(base))
}

/// The part of a flag before any `=`
pub fn flag_base(flag: &str) -> &str {
    flag.split_once('=').map_or(flag, |(base, _)| base)
}

fn lookup_global(base: &str) -> Option<&'static str> {
    SHORT_TO_LONG
        .iter()
        .find(|(short, _)| *short == base)
        .map(|(_, long)| *long)
}

fn normalize_with<F>(flag: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<&'static str>,
{
    match flag.split_once('=') {
        Some((base, value)) => match lookup(base) {
            Some(long) => format!("{}={}", long, value),
            None => flag.to_string(),
        },
        None => lookup(flag).map_or_else(|| flag.to_string(), str::to_string),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_flags_map_to_long() {
        assert_eq!(normalize_flag("-a"), "--all");
        assert_eq!(normalize_flag("-f"), "--force");
        assert_eq!(normalize_flag("-n"), "--dry-run");
    }

    #[test]
    fn test_unknown_flags_pass_through() {
        assert_eq!(normalize_flag("-x"), "-x");
        assert_eq!(normalize_flag("--oneline"), "--oneline");
        assert_eq!(normalize_flag("-fd"), "-fd");
    }

    #[test]
    fn test_value_is_reattached() {
        assert_eq!(normalize_flag("-m=fix bug"), "--message=fix bug");
        assert_eq!(normalize_flag("--format=%H=%s"), "--format=%H=%s");
    }

    #[test]
    fn test_operation_specific_mapping() {
        assert_eq!(normalize_flag_for("log", "-n"), "--max-count");
        assert_eq!(normalize_flag_for("push", "-n"), "--dry-run");
        assert_eq!(normalize_flag_for("add", "-u"), "--update");
        assert_eq!(normalize_flag_for("push", "-u"), "--set-upstream");
        assert_eq!(normalize_flag_for("status", "-s"), "--short");
    }

    #[test]
    fn test_blocked_flags_case_insensitive() {
        assert!(is_blocked_flag("--upload-pack"));
        assert!(is_blocked_flag("--Upload-Pack=/tmp/evil"));
        assert!(is_blocked_flag("-c"));
        assert!(is_blocked_flag("-C"));
        assert!(is_blocked_flag("--CONFIG"));
        assert!(!is_blocked_flag("--oneline"));
    }

    #[test]
    fn test_flag_base() {
        assert_eq!(flag_base("--format=%H"), "--format");
        assert_eq!(flag_base("--stat"), "--stat");
    }
}
