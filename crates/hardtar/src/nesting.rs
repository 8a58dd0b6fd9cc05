/// Extensions recognised as nested archives, longest spellings first.
const ARCHIVE_EXTENSIONS: &[&str] = &[
    ".tar.gz", ".tar.bz2", ".tar.xz", ".tgz", ".tbz2", ".txz", ".tar",
];

/// The archive extension of `name`, if it has one.
pub fn archive_extension(name: &str) -> Option<&'static str> {
    let lower = name.to_ascii_lowercase();
    ARCHIVE_EXTENSIONS
        .iter()
        .find(|ext| lower.ends_with(*ext))
        .copied()
}

/// Directory name a nested archive extracts into: the basename with the
/// archive extension removed.
pub fn nested_dir_name(file_name: &str) -> String {
    let stem = match archive_extension(file_name) {
        Some(ext) => &file_name[..file_name.len() - ext.len()],
        None => file_name,
    };
    if stem.is_empty() {
        "unpacked".to_string()
    } else {
        stem.to_string()
    }
}
