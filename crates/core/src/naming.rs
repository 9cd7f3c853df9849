//! Result filename derivation.
//!
//! The backend normally reports the result name in the job status. When it
//! does not, the client names the artifact after the source and the stage
//! list: `cat.png` upscaled by `[x4, x2]` becomes `cat (x4 x2).png`.

use std::sync::LazyLock;

use regex::Regex;

use crate::stages::ScaleFactor;

/// A stem ending in a factor group such as `name (x2 x4)`.
const FACTOR_SUFFIX_PATTERN: &str = r"^(?P<base>.*?)\s*\((?P<factors>x\d+(?:\s+x\d+)*)\)$";

static FACTOR_SUFFIX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(FACTOR_SUFFIX_PATTERN).expect("valid regex"));

/// Space-separated factor labels, e.g. `"x4 x2"`.
pub fn factors_label(stages: &[ScaleFactor]) -> String {
    stages
        .iter()
        .map(ScaleFactor::as_str)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Name for the artifact produced from `source_name` by `stages`.
///
/// Re-upscaling an earlier result extends its factor group instead of
/// stacking a second one: `cat (x2).png` + `[x4]` → `cat (x2 x4).png`.
pub fn suggested_filename(source_name: &str, stages: &[ScaleFactor]) -> String {
    let (stem, extension) = match source_name.rfind('.') {
        Some(idx) if idx > 0 => source_name.split_at(idx),
        _ => (source_name, ""),
    };
    let factors = factors_label(stages);

    match FACTOR_SUFFIX_RE.captures(stem) {
        Some(caps) => format!("{} ({} {factors}){extension}", &caps["base"], &caps["factors"]),
        None => format!("{stem} ({factors}){extension}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn appends_factor_group() {
        let name = suggested_filename("cat.png", &[ScaleFactor::X4, ScaleFactor::X2]);
        assert_eq!(name, "cat (x4 x2).png");
    }

    #[test]
    fn extends_existing_factor_group() {
        let name = suggested_filename("cat (x2).png", &[ScaleFactor::X4]);
        assert_eq!(name, "cat (x2 x4).png");
    }

    #[test]
    fn ignores_non_factor_parentheses() {
        let name = suggested_filename("holiday (copy).jpg", &[ScaleFactor::X2]);
        assert_eq!(name, "holiday (copy) (x2).jpg");
    }

    #[test]
    fn keeps_inner_dots_in_stem() {
        let name = suggested_filename("my.photo.v2.tiff", &[ScaleFactor::X8]);
        assert_eq!(name, "my.photo.v2 (x8).tiff");
    }

    #[test]
    fn handles_missing_extension() {
        assert_eq!(suggested_filename("scan", &[ScaleFactor::X2]), "scan (x2)");
        assert_eq!(suggested_filename(".png", &[ScaleFactor::X2]), ".png (x2)");
    }
}
