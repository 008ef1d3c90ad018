//! BDD prefixes of the supported languages.

use smol_str::SmolStr;

/// Prefix table of one language.
#[derive(Debug)]
pub struct Language {
    pub code: &'static str,
    pub name: &'static str,
    pub given: &'static [&'static str],
    pub when: &'static [&'static str],
    pub then: &'static [&'static str],
    pub and: &'static [&'static str],
    pub but: &'static [&'static str],
}

impl Language {
    pub fn bdd_prefixes(&self) -> impl Iterator<Item = &'static str> {
        self.given
            .iter()
            .chain(self.when)
            .chain(self.then)
            .chain(self.and)
            .chain(self.but)
            .copied()
    }
}

pub static ENGLISH: Language = Language {
    code: "en",
    name: "English",
    given: &["Given"],
    when: &["When"],
    then: &["Then"],
    and: &["And"],
    but: &["But"],
};

static OTHER_LANGUAGES: &[Language] = &[
    Language {
        code: "de",
        name: "German",
        given: &["Angenommen"],
        when: &["Wenn"],
        then: &["Dann"],
        and: &["Und"],
        but: &["Aber"],
    },
    Language {
        code: "fi",
        name: "Finnish",
        given: &["Oletetaan"],
        when: &["Kun"],
        then: &["Niin"],
        and: &["Ja"],
        but: &["Mutta"],
    },
    Language {
        code: "fr",
        name: "French",
        given: &[
            "Soit",
            "Sachant",
            "Sachant que",
            "Sachant qu'",
            "Étant donné",
            "Étant donné que",
            "Etant donné qu'",
        ],
        when: &["Lorsque", "Quand", "Lorsqu'"],
        then: &["Alors", "Donc"],
        and: &["Et", "Et que", "Et qu'"],
        but: &["Mais", "Mais que", "Mais qu'"],
    },
    Language {
        code: "nl",
        name: "Dutch",
        given: &["Stel", "Gegeven"],
        when: &["Als"],
        then: &["Dan"],
        and: &["En"],
        but: &["Maar"],
    },
    Language {
        code: "pt",
        name: "Portuguese",
        given: &["Dado"],
        when: &["Quando"],
        then: &["Então", "Entao"],
        and: &["E"],
        but: &["Mas"],
    },
    Language {
        code: "sv",
        name: "Swedish",
        given: &["Givet"],
        when: &["När"],
        then: &["Då"],
        and: &["Och"],
        but: &["Men"],
    },
];

/// Look up a language by code or English name, case-insensitively.
pub fn find_language(name: &str) -> Option<&'static Language> {
    let wanted = name.trim().to_lowercase();
    std::iter::once(&ENGLISH)
        .chain(OTHER_LANGUAGES.iter())
        .find(|l| l.code == wanted || l.name.to_lowercase() == wanted)
}

/// Active languages of a workspace. English is always active.
#[derive(Clone, Debug)]
pub struct Languages {
    languages: Vec<&'static Language>,
    prefixes: Vec<SmolStr>,
}

impl Default for Languages {
    fn default() -> Self {
        Self::new::<&str>(&[])
    }
}

impl Languages {
    pub fn new<S: AsRef<str>>(names: &[S]) -> Self {
        let mut languages: Vec<&'static Language> = vec![&ENGLISH];
        for name in names {
            match find_language(name.as_ref()) {
                Some(lang) if !languages.iter().any(|l| l.code == lang.code) => languages.push(lang),
                Some(_) => {}
                None => tracing::warn!("unknown language '{}' ignored", name.as_ref()),
            }
        }
        let prefixes = languages
            .iter()
            .flat_map(|l| l.bdd_prefixes())
            .map(|p| SmolStr::new(p.to_lowercase()))
            .collect();
        Self {
            languages,
            prefixes,
        }
    }

    pub fn languages(&self) -> &[&'static Language] {
        &self.languages
    }

    /// All BDD prefixes of the active languages, English first.
    pub fn bdd_prefixes(&self) -> Vec<&'static str> {
        self.languages.iter().flat_map(|l| l.bdd_prefixes()).collect()
    }

    pub fn is_bdd_prefix(&self, prefix: &str) -> bool {
        let wanted = prefix.to_lowercase();
        self.prefixes.iter().any(|p| *p == wanted)
    }

    /// Split `name` into a BDD prefix and the rest. Longer prefixes win,
    /// so `Et que` is preferred over `Et`. Whitespace between words is
    /// collapsed to single spaces.
    pub fn split_bdd_prefix(&self, name: &str) -> Option<(String, String)> {
        let parts: Vec<&str> = name.split_whitespace().collect();
        (1..parts.len()).rev().find_map(|index| {
            let prefix = parts[..index].join(" ");
            self.is_bdd_prefix(&prefix)
                .then(|| (prefix, parts[index..].join(" ")))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_english_is_always_active() {
        let languages = Languages::new(&["de"]);
        assert!(languages.is_bdd_prefix("given"));
        assert!(languages.is_bdd_prefix("Angenommen"));
        assert!(!languages.is_bdd_prefix("Oletetaan"));
    }

    #[test]
    fn test_find_language_by_name_or_code() {
        assert_eq!(find_language("Finnish").map(|l| l.code), Some("fi"));
        assert_eq!(find_language("PT").map(|l| l.code), Some("pt"));
        assert!(find_language("klingon").is_none());
    }

    fn split(languages: &Languages, name: &str) -> Option<(String, String)> {
        languages.split_bdd_prefix(name)
    }

    #[test]
    fn test_split_bdd_prefix_single_word() {
        let languages = Languages::default();
        let expected = Some(("Given".to_string(), "log in".to_string()));
        assert_eq!(split(&languages, "Given log in"), expected);
        assert_eq!(
            split(&languages, "given  log in"),
            Some(("given".to_string(), "log in".to_string()))
        );
        assert_eq!(split(&languages, "Log in"), None);
        assert_eq!(split(&languages, "Given"), None);
    }

    #[test]
    fn test_split_bdd_prefix_prefers_longest() {
        let languages = Languages::new(&["fr"]);
        assert_eq!(
            split(&languages, "Étant donné que le client existe"),
            Some(("Étant donné que".to_string(), "le client existe".to_string()))
        );
    }
}
