//! Photo metadata field dictionary served to the web client: field
//! labels, shooting direction values with per-platform compass icons,
//! and watermark signature constraints.

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use utoipa::ToSchema;

/// Watermark signatures cap out at 65 characters.
pub const WATERSIGN_LENGTH: usize = 65;

/// Character class accepted in a watermark signature, as handed to clients.
pub const WATERSIGN_PATTERN: &str =
    r#"[\w.,:;()\[\]\\|/№§©®℗℠™•?!@#$%^&*+\-={}"'<>~` ]"#;

// Same class with `\w` pinned to ASCII: JavaScript's `\w` never matches
// beyond [0-9A-Za-z_], so server-side filtering must not either.
const WATERSIGN_FILTER_PATTERN: &str =
    r#"[0-9A-Za-z_.,:;()\[\]\\|/№§©®℗℠™•?!@#$%^&*+\-={}"'<>~` ]"#;

/// Shooting direction of a photo.
#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Debug)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    N,
    Ne,
    E,
    Se,
    S,
    Sw,
    W,
    Nw,
    Aero,
}

impl Direction {
    /// Order the direction dropdown presents its options in.
    pub const ALL: [Self; 9] = [
        Self::W,
        Self::Nw,
        Self::N,
        Self::Ne,
        Self::E,
        Self::Se,
        Self::S,
        Self::Sw,
        Self::Aero,
    ];

    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::N => "n",
            Self::Ne => "ne",
            Self::E => "e",
            Self::Se => "se",
            Self::S => "s",
            Self::Sw => "sw",
            Self::W => "w",
            Self::Nw => "nw",
            Self::Aero => "aero",
        }
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::N => "North",
            Self::Ne => "Northeast",
            Self::E => "East",
            Self::Se => "Southeast",
            Self::S => "South",
            Self::Sw => "Southwest",
            Self::W => "West",
            Self::Nw => "Northwest",
            Self::Aero => "Aero/Satellite",
        }
    }

    // Arrows are not unified across browsers and platforms.
    // The choices we use: [default, Firefox, Mac].
    const fn icons(self) -> [&'static str; 3] {
        match self {
            Self::N => ["&#xf1e0;", "\u{1f861}", "↑"],
            Self::Ne => ["&#xf1e1;", "\u{1f865}", "↗"],
            Self::E => ["&#xf1df;", "\u{1f862}", "→"],
            Self::Se => ["&#xf1e4;", "\u{1f866}", "↘"],
            Self::S => ["&#xf1e3;", "\u{1f863}", "↓"],
            Self::Sw => ["&#xf1e5;", "\u{1f867}", "↙"],
            Self::W => ["&#xf1e6;", "\u{1f860}", "←"],
            Self::Nw => ["&#xf1e2;", "\u{1f864}", "↖"],
            Self::Aero => ["&#xe3f7;", "◎", "◎"],
        }
    }
}

/// Which icon variant the client should render.
#[derive(ToSchema, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Debug, Default)]
#[serde(rename_all = "lowercase")]
pub enum IconTheme {
    #[default]
    Default,
    Firefox,
    Mac,
}

/// Compass icon for a direction under a theme. The Mac variant pads most
/// arrows with `&nbsp;` to align option text in selects.
#[must_use]
pub fn dir_icon(dir: Direction, theme: IconTheme) -> String {
    let icons = dir.icons();
    match theme {
        IconTheme::Default => icons[0].to_string(),
        IconTheme::Firefox => icons[1].to_string(),
        IconTheme::Mac => {
            if matches!(dir, Direction::E | Direction::W | Direction::Aero) {
                icons[2].to_string()
            } else {
                format!("{}&nbsp;", icons[2])
            }
        }
    }
}

/// Is the character allowed in a watermark signature?
#[must_use]
pub fn watersign_allowed(c: char) -> bool {
    Regex::new(WATERSIGN_FILTER_PATTERN).is_ok_and(|re| re.is_match(&c.to_string()))
}

/// Strip disallowed characters and clamp to the maximum length.
#[must_use]
pub fn clean_watersign(text: &str) -> String {
    text.chars()
        .filter(|c| watersign_allowed(*c))
        .take(WATERSIGN_LENGTH)
        .collect()
}

/// The full field dictionary, as one JSON document.
#[must_use]
pub fn dictionary(theme: IconTheme) -> Value {
    let mut dir_vals = Map::new();
    let mut dir_icons = Map::new();
    for dir in Direction::ALL {
        dir_vals.insert(dir.code().to_string(), Value::String(dir.label().to_string()));
        dir_icons.insert(dir.code().to_string(), Value::String(dir_icon(dir, theme)));
    }

    json!({
        "s": "Status",
        "y": "Year",
        "geo": "Coordinates",
        "type": "Type",
        "regions": "Region",
        "title": "Photo title",
        "desc": "Description",
        "source": "Source",
        "author": "Author",
        "address": "Shooting point address",
        "dir": "Shooting direction",
        "typeVals": {
            "1": "Photograph",
            "2": "Painting/drawing",
        },
        "types": ["1", "2"],
        "dirVals": dir_vals,
        "dirValsArr": Direction::ALL.iter().map(|d| d.code()).collect::<Vec<_>>(),
        "dirIcons": dir_icons,
        "watersign": {
            "title": "Watermark signature",
            "profile": "As specified in the profile",
            "individual": "Individually",
            "option": "Add a signature to the watermark",
            "default": "System settings",
            "text": "Text",
        },
        "watersignText": "Watermark signature",
        "watersignLength": WATERSIGN_LENGTH,
        "watersignPattern": WATERSIGN_PATTERN,
        "downloadOrigin": {
            "title": "Original download",
            "profile": "As specified in the profile",
            "individual": "Individually",
            "option": "Allow other users to download the original",
        },
        "painting": {
            "title": "Title",
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direction_order_starts_west_ends_aero() {
        let codes: Vec<_> = Direction::ALL.iter().map(|d| d.code()).collect();
        assert_eq!(
            codes,
            ["w", "nw", "n", "ne", "e", "se", "s", "sw", "aero"]
        );
    }

    #[test]
    fn mac_icons_pad_everything_but_east_west_and_aero() {
        assert_eq!(dir_icon(Direction::N, IconTheme::Mac), "↑&nbsp;");
        assert_eq!(dir_icon(Direction::Se, IconTheme::Mac), "↘&nbsp;");
        assert_eq!(dir_icon(Direction::E, IconTheme::Mac), "→");
        assert_eq!(dir_icon(Direction::W, IconTheme::Mac), "←");
        assert_eq!(dir_icon(Direction::Aero, IconTheme::Mac), "◎");
    }

    #[test]
    fn default_theme_uses_font_entities() {
        assert_eq!(dir_icon(Direction::N, IconTheme::Default), "&#xf1e0;");
        assert_eq!(dir_icon(Direction::Aero, IconTheme::Default), "&#xe3f7;");
    }

    #[test]
    fn firefox_theme_has_no_padding() {
        assert_eq!(dir_icon(Direction::N, IconTheme::Firefox), "\u{1f861}");
    }

    #[test]
    fn watersign_cleaning_filters_and_clamps() {
        assert_eq!(clean_watersign("© John Doe, 1999"), "© John Doe, 1999");
        // Cyrillic and emoji are not in the allowed class
        assert_eq!(clean_watersign("фото😀abc"), "abc");
        let long = "x".repeat(100);
        assert_eq!(clean_watersign(&long).len(), WATERSIGN_LENGTH);
    }

    #[test]
    fn watersign_word_chars_are_ascii_only() {
        assert!(watersign_allowed('a'));
        assert!(watersign_allowed('Z'));
        assert!(watersign_allowed('7'));
        assert!(watersign_allowed('_'));
        // Unicode word characters are filtered like the client does
        assert!(!watersign_allowed('ф'));
        assert!(!watersign_allowed('é'));
        assert!(!watersign_allowed('漢'));
    }

    #[test]
    fn dictionary_is_complete() {
        let dict = dictionary(IconTheme::Default);
        assert_eq!(dict["dir"], "Shooting direction");
        assert_eq!(dict["typeVals"]["2"], "Painting/drawing");
        assert_eq!(dict["dirVals"]["aero"], "Aero/Satellite");
        assert_eq!(dict["dirValsArr"][0], "w");
        assert_eq!(dict["watersignLength"], 65);
        assert_eq!(dict["watersign"]["default"], "System settings");
        assert_eq!(dict["downloadOrigin"]["title"], "Original download");
        assert_eq!(dict["painting"]["title"], "Title");
    }
}
