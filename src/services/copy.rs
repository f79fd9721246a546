//! User-facing route copy: prompts, templates and normalisation.

use crate::constants::{MIN_DESCRIPTION_CHARS, MIN_TITLE_CHARS};
use crate::models::Theme;

const BANNED_TITLE_PHRASES: &[&str] = &["recommended", "must-see", "course", "!"];
const BANNED_DESCRIPTION_PHRASES: &[&str] =
    &["recommended", "perfect", "absolutely", "right now", "!"];
const DEFAULT_TITLE: &str = "A quiet little walk";

/// Fallback descriptions, chosen at random when text generation fails.
pub fn template_descriptions(theme: Theme) -> &'static [&'static str] {
    match theme {
        Theme::Exercise => &[
            "Step by step, at your own pace. A walk to get your body moving a little.",
            "A gentle workout on foot. Speed up where it feels good, ease off where it does not.",
            "Keep a steady rhythm and let your breathing settle in along the way.",
        ],
        Theme::Think => &[
            "A calm loop for letting your thoughts wander without a destination in mind.",
            "Walk slowly and give yourself some room to think things through.",
            "Quiet streets and an easy pace, made for turning an idea over in your head.",
        ],
        Theme::Refresh => &[
            "Stepping outside might shift your mood a little. An easy walk to reset.",
            "No need to hurry. A short change of scenery to clear your head.",
            "A light walk for a fresh start, with a few pleasant stops along the way.",
        ],
        Theme::Nature => &[
            "A walk to notice the trees, the sky and the small seasonal details nearby.",
            "Follow the greener side of the neighbourhood at an unhurried pace.",
            "Take in the fresh air and look for a bit of nature along the route.",
        ],
    }
}

fn theme_mood(theme: Theme) -> &'static str {
    match theme {
        Theme::Exercise => "Energising",
        Theme::Think => "Reflective",
        Theme::Refresh => "Refreshing",
        Theme::Nature => "Green",
    }
}

/// Deterministic title used when the text service is unavailable.
pub fn fallback_title(theme: Theme, distance_km: f64, spot_names: &[String]) -> String {
    match spot_names.iter().find(|n| !n.trim().is_empty()) {
        Some(spot) => format!("{} walk past {}", theme_mood(theme), spot.trim()),
        None => format!("{} {:.1} km walk", theme_mood(theme), distance_km),
    }
}

/// Prompt for the text service. The strict variant asks for a shorter answer.
pub fn build_prompt(
    theme: Theme,
    distance_km: f64,
    duration_min: f64,
    spot_names: &[String],
    strict: bool,
) -> String {
    let spots = if spot_names.is_empty() {
        "none".to_string()
    } else {
        spot_names.join(", ")
    };
    let mut prompt = format!(
        "Write a title and a short description for a walking route.\n\
         Theme: {}\nDistance: {:.1} km\nDuration: about {:.0} minutes\nSpots: {}\n\
         Tone: calm and encouraging, no exclamation marks, no superlatives.\n\
         Respond with JSON only: {{\"title\": string (max 20 characters), \
         \"description\": string (60-120 characters)}}.",
        theme, distance_km, duration_min, spots
    );
    if strict {
        prompt.push_str(
            "\nKeep the answer minimal. Output the JSON object and nothing else, on one line.",
        );
    }
    prompt
}

/// Remove banned phrases, ASCII case-insensitively and only as whole words.
fn strip_phrases(text: &str, phrases: &[&str]) -> String {
    let mut out = text.to_string();
    for phrase in phrases {
        let mut from = 0;
        while let Some(pos) = find_phrase(&out, phrase, from) {
            out.replace_range(pos..pos + phrase.len(), " ");
            from = pos + 1;
        }
    }
    collapse_whitespace(&out)
}

/// Byte offset of the next whole-word match of an ASCII `phrase` at or after `from`.
fn find_phrase(text: &str, phrase: &str, from: usize) -> Option<usize> {
    let (bytes, needle) = (text.as_bytes(), phrase.as_bytes());
    if needle.is_empty() || bytes.len() < needle.len() {
        return None;
    }
    (from..=bytes.len() - needle.len()).find(|&i| {
        let end = i + needle.len();
        text.is_char_boundary(i)
            && bytes[i..end].eq_ignore_ascii_case(needle)
            && at_word_edges(text, i, end, phrase)
    })
}

/// A phrase edge that is a letter or digit must not continue into a longer word.
fn at_word_edges(text: &str, start: usize, end: usize, phrase: &str) -> bool {
    let alnum = |c: Option<char>| c.is_some_and(char::is_alphanumeric);
    let open_before = !alnum(phrase.chars().next()) || !alnum(text[..start].chars().next_back());
    let open_after = !alnum(phrase.chars().next_back()) || !alnum(text[end..].chars().next());
    open_before && open_after
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn normalize_title(raw: &str) -> String {
    let cleaned = strip_phrases(raw.trim().trim_matches('"'), BANNED_TITLE_PHRASES);
    let cleaned = cleaned.trim_matches(|c: char| c == ',' || c == '.' || c.is_whitespace());
    if cleaned.chars().count() < MIN_TITLE_CHARS {
        DEFAULT_TITLE.to_string()
    } else {
        cleaned.to_string()
    }
}

pub fn normalize_description(raw: &str, distance_km: f64, duration_min: f64) -> String {
    let mut cleaned = strip_phrases(raw.trim(), BANNED_DESCRIPTION_PHRASES);
    if cleaned.chars().count() < MIN_DESCRIPTION_CHARS {
        if !cleaned.is_empty() && !cleaned.ends_with('.') {
            cleaned.push('.');
        }
        cleaned = format!(
            "{} About {:.1} km, roughly {:.0} minutes. Feel free to turn back at any point.",
            cleaned, distance_km, duration_min
        );
    }
    collapse_whitespace(&cleaned)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_title_uses_first_spot() {
        let spots = vec!["  ".to_string(), "Maple Pond".to_string()];
        assert_eq!(fallback_title(Theme::Nature, 2.0, &spots), "Green walk past Maple Pond");
        assert_eq!(fallback_title(Theme::Think, 2.04, &[]), "Reflective 2.0 km walk");
    }

    #[test]
    fn normalize_title_strips_banned_phrases() {
        assert_eq!(normalize_title("Recommended Riverside Stroll!"), "Riverside Stroll");
        assert_eq!(normalize_title("!!"), DEFAULT_TITLE);
    }

    #[test]
    fn banned_words_inside_longer_words_survive() {
        assert_eq!(normalize_title("Golf Courses by the River"), "Golf Courses by the River");
        assert_eq!(normalize_title("A COURSE around the pond"), "A around the pond");
        assert_eq!(normalize_title("Hello!World loop"), "Hello World loop");

        let text = "Perfectly quiet lanes past the old mill, with benches every few hundred metres.";
        assert_eq!(normalize_description(text, 2.0, 25.0), text);
    }

    #[test]
    fn normalize_description_pads_short_text() {
        let out = normalize_description("A perfect little loop", 2.0, 25.0);
        assert!(out.starts_with("A little loop."));
        assert!(out.contains("About 2.0 km, roughly 25 minutes."));
        assert!(out.chars().count() >= MIN_DESCRIPTION_CHARS);
    }

    #[test]
    fn normalize_description_keeps_long_text() {
        let text = "Walk along the river and past the old library, then circle back through the park at your own pace.";
        assert_eq!(normalize_description(text, 3.0, 40.0), text);
    }

    #[test]
    fn strict_prompt_is_longer() {
        let loose = build_prompt(Theme::Refresh, 2.0, 25.0, &[], false);
        let strict = build_prompt(Theme::Refresh, 2.0, 25.0, &[], true);
        assert!(strict.len() > loose.len());
        assert!(loose.contains("Spots: none"));
    }

    #[test]
    fn templates_exist_for_every_theme() {
        for theme in Theme::ALL {
            let templates = template_descriptions(theme);
            assert!(templates.len() >= 3);
            assert!(templates.iter().all(|t| !t.contains('!')));
        }
    }
}
