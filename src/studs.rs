//! Stud-style primitive substitution
//!
//! With a non-default [`StudStyle`] active, references to the common stud
//! primitives are fed synthesized content instead of the library files.
//! Each substitute comes from a fixed template; the instruction-style
//! variants recolor the stud cylinder by replacing a magic color token,
//! and the logo variants append a reference to the library's `logo.dat`
//! outline. Synthesized files are cached in a scratch directory keyed by
//! style, color mode and name so repeated loads skip regeneration.

use log::debug;
use std::fs;
use std::path::Path;

/// How stud primitives are rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StudStyle {
    /// Library content, unmodified
    #[default]
    Plain,
    /// Logo outline on each stud top
    Logo,
    /// Stud cylinder recolored black, as in building instructions
    HighContrast,
    /// Logo and recolored cylinder combined
    HighContrastLogo,
}

impl StudStyle {
    fn has_logo(self) -> bool {
        matches!(self, StudStyle::Logo | StudStyle::HighContrastLogo)
    }

    fn recolors_cylinder(self) -> bool {
        matches!(self, StudStyle::HighContrast | StudStyle::HighContrastLogo)
    }

    /// Tag used in scratch-cache file names; encodes style and color mode
    fn cache_tag(self) -> &'static str {
        match self {
            StudStyle::Plain => "plain",
            StudStyle::Logo => "logo",
            StudStyle::HighContrast => "contrast",
            StudStyle::HighContrastLogo => "contrast-logo",
        }
    }
}

/// Placeholder color on template cylinder lines, rewritten per style
const MAGIC_COLOR: &str = "4242";

/// Logo outline placed on a stud top; `logo.dat` is drawn at stud scale
const LOGO_LINE: &str = "1 16 0 -4 0 1 0 0 0 1 0 0 0 1 logo.dat\n";

/// Solid stud, radius 6, height 4
const STUD_BODY: &str = "0 Stud\n\
0 Name: stud.dat\n\
0 BFC CERTIFY CCW\n\
1 16 0 0 0 6 0 0 0 1 0 0 0 6 4-4edge.dat\n\
1 16 0 -4 0 6 0 0 0 1 0 0 0 6 4-4edge.dat\n\
1 4242 0 -4 0 6 0 0 0 4 0 0 0 6 4-4cyli.dat\n\
1 16 0 -4 0 6 0 0 0 1 0 0 0 6 4-4disc.dat\n";

/// Open stud, outer radius 6, inner radius 4
const STUD2_BODY: &str = "0 Stud Open\n\
0 Name: stud2.dat\n\
0 BFC CERTIFY CCW\n\
1 16 0 0 0 4 0 0 0 1 0 0 0 4 4-4edge.dat\n\
1 16 0 0 0 6 0 0 0 1 0 0 0 6 4-4edge.dat\n\
1 16 0 -4 0 4 0 0 0 1 0 0 0 4 4-4edge.dat\n\
1 16 0 -4 0 6 0 0 0 1 0 0 0 6 4-4edge.dat\n\
0 BFC INVERTNEXT\n\
1 4242 0 -4 0 4 0 0 0 4 0 0 0 4 4-4cyli.dat\n\
1 4242 0 -4 0 6 0 0 0 4 0 0 0 6 4-4cyli.dat\n\
1 16 0 -4 0 2 0 0 0 1 0 0 0 2 4-4ring2.dat\n";

/// Open stud without the inner wall
const STUD2A_BODY: &str = "0 Stud Open without Base Edges\n\
0 Name: stud2a.dat\n\
0 BFC CERTIFY CCW\n\
1 16 0 0 0 4 0 0 0 1 0 0 0 4 4-4edge.dat\n\
1 16 0 0 0 6 0 0 0 1 0 0 0 6 4-4edge.dat\n\
1 4242 0 -4 0 6 0 0 0 4 0 0 0 6 4-4cyli.dat\n\
1 16 0 -4 0 2 0 0 0 1 0 0 0 2 4-4ring2.dat\n";

/// Template body for a substitutable primitive name. The name must
/// already be in canonical form.
fn template(name: &str) -> Option<&'static str> {
    match name {
        "stud.dat" => Some(STUD_BODY),
        "stud2.dat" => Some(STUD2_BODY),
        "stud2a.dat" => Some(STUD2A_BODY),
        _ => None,
    }
}

/// Synthesize substitute content for a stud primitive.
///
/// Returns `None` when the style is [`StudStyle::Plain`] or the name is
/// not in the substitution catalog, in which case the caller resolves the
/// name normally. `scratch_dir`, when given, caches generated files
/// across sessions; cache failures fall back to regeneration.
pub(crate) fn substitute(name: &str, style: StudStyle, scratch_dir: Option<&Path>) -> Option<String> {
    if style == StudStyle::Plain {
        return None;
    }
    let body = template(name)?;

    let cache_path =
        scratch_dir.map(|dir| dir.join(format!("{}-{}", style.cache_tag(), name)));
    if let Some(ref path) = cache_path {
        if let Ok(cached) = fs::read_to_string(path) {
            debug!("stud substitute for '{}' served from {}", name, path.display());
            return Some(cached);
        }
    }

    let cylinder_color = if style.recolors_cylinder() { "0" } else { "16" };
    let mut content = body.replace(MAGIC_COLOR, cylinder_color);
    if style.has_logo() {
        content.push_str(LOGO_LINE);
    }

    if let Some(ref path) = cache_path {
        if let Err(error) = fs::write(path, &content) {
            debug!("could not cache stud substitute at {}: {}", path.display(), error);
        }
    }
    Some(content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_style_never_substitutes() {
        assert!(substitute("stud.dat", StudStyle::Plain, None).is_none());
    }

    #[test]
    fn unknown_names_fall_through() {
        assert!(substitute("4-4cyli.dat", StudStyle::Logo, None).is_none());
        assert!(substitute("3001.dat", StudStyle::HighContrast, None).is_none());
    }

    #[test]
    fn logo_style_appends_logo_reference() {
        let content = substitute("stud.dat", StudStyle::Logo, None).unwrap();
        assert!(content.contains("logo.dat"));
        // Plain colors kept
        assert!(!content.contains(MAGIC_COLOR));
        assert!(content.contains("1 16 0 -4 0 6 0 0 0 4 0 0 0 6 4-4cyli.dat"));
    }

    #[test]
    fn high_contrast_recolors_the_cylinder() {
        let content = substitute("stud.dat", StudStyle::HighContrast, None).unwrap();
        assert!(content.contains("1 0 0 -4 0 6 0 0 0 4 0 0 0 6 4-4cyli.dat"));
        assert!(!content.contains(MAGIC_COLOR));
        assert!(!content.contains("logo.dat"));
    }

    #[test]
    fn combined_style_does_both() {
        let content = substitute("stud2.dat", StudStyle::HighContrastLogo, None).unwrap();
        assert!(content.contains("1 0 0 -4 0 4 0 0 0 4 0 0 0 4 4-4cyli.dat"));
        assert!(content.contains("logo.dat"));
    }

    #[test]
    fn every_template_line_classifies() {
        for style in [StudStyle::Logo, StudStyle::HighContrastLogo] {
            for name in ["stud.dat", "stud2.dat", "stud2a.dat"] {
                let content = substitute(name, style, None).unwrap();
                for line in content.lines() {
                    crate::line::classify(line).unwrap();
                }
            }
        }
    }

    #[test]
    fn scratch_cache_is_written_and_reused() {
        let dir = tempfile::tempdir().unwrap();
        let first = substitute("stud.dat", StudStyle::Logo, Some(dir.path())).unwrap();
        let cache = dir.path().join("logo-stud.dat");
        assert_eq!(fs::read_to_string(&cache).unwrap(), first);

        // A hit is served from the file, not regenerated
        fs::write(&cache, "0 sentinel\n").unwrap();
        let second = substitute("stud.dat", StudStyle::Logo, Some(dir.path())).unwrap();
        assert_eq!(second, "0 sentinel\n");
    }

    #[test]
    fn cache_keys_separate_styles() {
        let dir = tempfile::tempdir().unwrap();
        substitute("stud.dat", StudStyle::Logo, Some(dir.path())).unwrap();
        substitute("stud.dat", StudStyle::HighContrast, Some(dir.path())).unwrap();
        assert!(dir.path().join("logo-stud.dat").exists());
        assert!(dir.path().join("contrast-stud.dat").exists());
    }
}
