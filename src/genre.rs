//! Closed set of genre labels used to filter the catalog.
//!
//! The labels match what the audio tagger emits, including its odd casing
//! (`Hip-Hop`, `Progressive rock`, `House`). Parsing is case-insensitive.
//! [`Genre::None`] is the "no filter" sentinel and never appears in a song's
//! genre set.

use crate::error::RecommendError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Genre {
    Rock,
    Pop,
    Alternative,
    Indie,
    Electronic,
    Dance,
    AlternativeRock,
    Jazz,
    Metal,
    Chillout,
    ClassicRock,
    Soul,
    IndieRock,
    Electronica,
    Folk,
    Chill,
    Instrumental,
    Punk,
    Blues,
    HardRock,
    Ambient,
    Acoustic,
    Experimental,
    HipHop,
    Country,
    EasyListening,
    Funk,
    Electro,
    HeavyMetal,
    ProgressiveRock,
    Rnb,
    IndiePop,
    House,
    #[default]
    None,
}

impl Genre {
    /// Every real genre label, without the `None` sentinel.
    pub const LABELS: [Genre; 33] = [
        Genre::Rock,
        Genre::Pop,
        Genre::Alternative,
        Genre::Indie,
        Genre::Electronic,
        Genre::Dance,
        Genre::AlternativeRock,
        Genre::Jazz,
        Genre::Metal,
        Genre::Chillout,
        Genre::ClassicRock,
        Genre::Soul,
        Genre::IndieRock,
        Genre::Electronica,
        Genre::Folk,
        Genre::Chill,
        Genre::Instrumental,
        Genre::Punk,
        Genre::Blues,
        Genre::HardRock,
        Genre::Ambient,
        Genre::Acoustic,
        Genre::Experimental,
        Genre::HipHop,
        Genre::Country,
        Genre::EasyListening,
        Genre::Funk,
        Genre::Electro,
        Genre::HeavyMetal,
        Genre::ProgressiveRock,
        Genre::Rnb,
        Genre::IndiePop,
        Genre::House,
    ];

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Genre::Rock => "rock",
            Genre::Pop => "pop",
            Genre::Alternative => "alternative",
            Genre::Indie => "indie",
            Genre::Electronic => "electronic",
            Genre::Dance => "dance",
            Genre::AlternativeRock => "alternative rock",
            Genre::Jazz => "jazz",
            Genre::Metal => "metal",
            Genre::Chillout => "chillout",
            Genre::ClassicRock => "classic rock",
            Genre::Soul => "soul",
            Genre::IndieRock => "indie rock",
            Genre::Electronica => "electronica",
            Genre::Folk => "folk",
            Genre::Chill => "chill",
            Genre::Instrumental => "instrumental",
            Genre::Punk => "punk",
            Genre::Blues => "blues",
            Genre::HardRock => "hard rock",
            Genre::Ambient => "ambient",
            Genre::Acoustic => "acoustic",
            Genre::Experimental => "experimental",
            Genre::HipHop => "Hip-Hop",
            Genre::Country => "country",
            Genre::EasyListening => "easy listening",
            Genre::Funk => "funk",
            Genre::Electro => "electro",
            Genre::HeavyMetal => "heavy metal",
            Genre::ProgressiveRock => "Progressive rock",
            Genre::Rnb => "rnb",
            Genre::IndiePop => "indie pop",
            Genre::House => "House",
            Genre::None => "none",
        }
    }

    /// `Some(self)` for a real genre, `None` for the no-filter sentinel.
    #[must_use]
    pub const fn as_filter(self) -> Option<Genre> {
        match self {
            Genre::None => None,
            genre => Some(genre),
        }
    }
}

impl fmt::Display for Genre {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Genre {
    type Err = RecommendError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        if wanted.eq_ignore_ascii_case(Genre::None.label()) {
            return Ok(Genre::None);
        }
        Genre::LABELS
            .into_iter()
            .find(|genre| genre.label().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| RecommendError::InvalidGenre(s.to_string()))
    }
}

impl TryFrom<String> for Genre {
    type Error = RecommendError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Genre> for String {
    fn from(genre: Genre) -> Self {
        genre.label().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_label_set_is_closed_and_unique() {
        let labels: HashSet<&str> = Genre::LABELS.iter().map(|g| g.label()).collect();
        assert_eq!(labels.len(), 33);
        assert!(!labels.contains("none"));
    }

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!("hip-hop".parse::<Genre>().unwrap(), Genre::HipHop);
        assert_eq!("PROGRESSIVE ROCK".parse::<Genre>().unwrap(), Genre::ProgressiveRock);
        assert_eq!(" jazz ".parse::<Genre>().unwrap(), Genre::Jazz);
        assert_eq!("None".parse::<Genre>().unwrap(), Genre::None);
    }

    #[test]
    fn test_unknown_genre_is_rejected() {
        match "polka".parse::<Genre>() {
            Err(RecommendError::InvalidGenre(label)) => assert_eq!(label, "polka"),
            other => panic!("expected InvalidGenre, got {other:?}"),
        }
    }

    #[test]
    fn test_every_label_round_trips() {
        for genre in Genre::LABELS {
            assert_eq!(genre.label().parse::<Genre>().unwrap(), genre);
        }
    }

    #[test]
    fn test_filter_sentinel() {
        assert_eq!(Genre::None.as_filter(), None);
        assert_eq!(Genre::Soul.as_filter(), Some(Genre::Soul));
        assert_eq!(Genre::default(), Genre::None);
    }

    #[test]
    fn test_serde_uses_labels() {
        let json = serde_json::to_string(&vec![Genre::EasyListening, Genre::House]).unwrap();
        assert_eq!(json, r#"["easy listening","House"]"#);
        assert!(serde_json::from_str::<Genre>(r#""opera""#).is_err());
    }
}
