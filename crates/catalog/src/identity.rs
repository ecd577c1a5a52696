//! Pure derivations from a filename. No I/O, so reruns always agree.

const FALLBACK_ID: &str = "photo";
const SIZE_UNITS: [&str; 5] = ["Bytes", "KB", "MB", "GB", "TB"];

/// Slug identifier: lowercase stem, non `[a-z0-9]` runs collapsed to one hyphen,
/// no leading or trailing hyphens.
pub fn photo_id(filename: &str) -> String {
    let lowered = strip_extension(filename).to_lowercase();
    let mut id = String::with_capacity(lowered.len());
    let mut pending_hyphen = false;
    for c in lowered.chars() {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            if pending_hyphen && !id.is_empty() {
                id.push('-');
            }
            pending_hyphen = false;
            id.push(c);
        } else {
            pending_hyphen = true;
        }
    }

    if id.is_empty() {
        FALLBACK_ID.to_string()
    } else {
        id
    }
}

/// Display title: extension stripped, `-`/`_` become spaces, each word capitalized.
pub fn photo_title(filename: &str) -> String {
    let mut title = String::with_capacity(filename.len());
    let mut at_word_start = true;
    for c in strip_extension(filename).chars() {
        let c = if c == '-' || c == '_' { ' ' } else { c };
        if c.is_whitespace() {
            at_word_start = true;
            title.push(c);
        } else if at_word_start {
            at_word_start = false;
            title.extend(c.to_uppercase());
        } else {
            title.push(c);
        }
    }
    title
}

pub fn photo_url(prefix: &str, filename: &str) -> String {
    if prefix.ends_with('/') {
        format!("{prefix}{filename}")
    } else {
        format!("{prefix}/{filename}")
    }
}

/// Human-readable size in 1024-based units, e.g. `2.35 MB`.
pub fn format_file_size(bytes: u64) -> String {
    if bytes == 0 {
        return "0 Bytes".to_string();
    }

    let mut unit = 0;
    let mut value = bytes as f64;
    while value >= 1024.0 && unit < SIZE_UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{} {}", trim_decimal(value, 2), SIZE_UNITS[unit])
}

/// Fixed-precision rendering with trailing zeros (and a dangling point) removed.
pub(crate) fn trim_decimal(value: f64, places: usize) -> String {
    let fixed = format!("{value:.places$}");
    if fixed.contains('.') {
        fixed.trim_end_matches('0').trim_end_matches('.').to_string()
    } else {
        fixed
    }
}

fn strip_extension(filename: &str) -> &str {
    match filename.rsplit_once('.') {
        Some((stem, ext)) if !ext.is_empty() && !ext.contains('/') => stem,
        _ => filename,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derives_id_and_title_for_new_files() {
        assert_eq!(photo_id("Morning_Walk-02.JPG"), "morning-walk-02");
        assert_eq!(photo_title("Morning_Walk-02.JPG"), "Morning Walk 02");
    }

    #[test]
    fn id_collapses_runs_and_trims_edges() {
        assert_eq!(photo_id("__Tokyo  Night__(final).jpeg"), "tokyo-night-final");
        assert_eq!(photo_id("café-crème.png"), "caf-cr-me");
        assert_eq!(photo_id("___.jpg"), "photo");
    }

    #[test]
    fn title_only_strips_last_extension() {
        assert_eq!(photo_title("roll.12_frame-3.tif"), "Roll.12 Frame 3");
        assert_eq!(photo_title("already Titled.webp"), "Already Titled");
        assert_eq!(photo_title("noext"), "Noext");
    }

    #[test]
    fn derivation_is_deterministic() {
        let name = "Some Photo - v2.avif";
        assert_eq!(photo_id(name), photo_id(name));
        assert_eq!(photo_title(name), photo_title(name));
    }

    #[test]
    fn url_joins_prefix_once() {
        assert_eq!(photo_url("/photos/", "a.jpg"), "/photos/a.jpg");
        assert_eq!(photo_url("/photos", "a.jpg"), "/photos/a.jpg");
    }

    #[test]
    fn file_sizes_use_binary_units() {
        assert_eq!(format_file_size(0), "0 Bytes");
        assert_eq!(format_file_size(512), "512 Bytes");
        assert_eq!(format_file_size(1024), "1 KB");
        assert_eq!(format_file_size(1536), "1.5 KB");
        assert_eq!(format_file_size(2_464_153), "2.35 MB");
        assert_eq!(format_file_size(3 * 1024 * 1024 * 1024), "3 GB");
    }

    #[test]
    fn trim_decimal_drops_trailing_zeros() {
        assert_eq!(trim_decimal(2.8, 1), "2.8");
        assert_eq!(trim_decimal(8.0, 1), "8");
        assert_eq!(trim_decimal(2.50, 2), "2.5");
        assert_eq!(trim_decimal(35.0, 0), "35");
    }
}
