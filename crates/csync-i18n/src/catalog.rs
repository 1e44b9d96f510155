//! Locale symbol catalog with fallback.
//!
//! # Invariants
//!
//! 1. **Fallback chain terminates**: every lookup tries the exact tag, then
//!    its language, then walks the chain exactly once, returning `None` if no
//!    locale matches.
//!
//! 2. **Complete tables**: [`LocaleCatalog::add_locale`] only accepts data
//!    with 12 month names and 7 day names in both forms.
//!
//! 3. **Thread safety**: `LocaleCatalog` is `Send + Sync` (all data is
//!    immutable after construction).
//!
//! # Failure Modes
//!
//! | Failure | Cause | Behavior |
//! |---------|-------|----------|
//! | Missing locale | Locale not loaded | Falls through chain |
//! | Wrong table length | Bad locale data | `I18nError::IncompleteTable` |
//! | Empty catalog | No locales loaded | All lookups return `None` |

use std::collections::HashMap;

use crate::pattern::DateTimeFormat;

/// Locale tag in wire form (e.g., `"en"`, `"fi_FI"`).
pub type Locale = String;

/// Errors from i18n operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum I18nError {
    /// A locale string was malformed.
    InvalidLocale(String),
    /// A month or day table has the wrong length.
    IncompleteTable {
        locale: String,
        table: &'static str,
        len: usize,
    },
}

impl std::fmt::Display for I18nError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidLocale(l) => write!(f, "invalid locale: {l}"),
            Self::IncompleteTable { locale, table, len } => {
                write!(f, "locale '{locale}' has {len} entries in table '{table}'")
            }
        }
    }
}

impl std::error::Error for I18nError {}

/// Calendar symbols and the short date-time pattern of one locale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocaleData {
    pub short_months: Vec<String>,
    pub months: Vec<String>,
    /// Sunday first.
    pub short_days: Vec<String>,
    /// Sunday first.
    pub days: Vec<String>,
    /// 0 = Sunday, 1 = Monday.
    pub first_day_of_week: u8,
    /// Combined short date-time pattern, e.g. `"M/d/yy h:mm a"`.
    pub date_time_pattern: String,
    pub am_pm: [String; 2],
}

impl LocaleData {
    fn from_static(
        short_months: [&str; 12],
        months: [&str; 12],
        short_days: [&str; 7],
        days: [&str; 7],
        first_day_of_week: u8,
        date_time_pattern: &str,
        am_pm: [&str; 2],
    ) -> Self {
        let owned = |items: &[&str]| -> Vec<String> {
            items.iter().map(|s| (*s).to_owned()).collect()
        };
        Self {
            short_months: owned(&short_months),
            months: owned(&months),
            short_days: owned(&short_days),
            days: owned(&days),
            first_day_of_week,
            date_time_pattern: date_time_pattern.to_owned(),
            am_pm: am_pm.map(str::to_owned),
        }
    }

    /// The pattern split into client fields.
    #[must_use]
    pub fn date_time_format(&self) -> DateTimeFormat {
        DateTimeFormat::from_pattern(&self.date_time_pattern)
    }

    fn validate(&self, locale: &str) -> Result<(), I18nError> {
        let tables: [(&'static str, usize, usize); 4] = [
            ("short_months", self.short_months.len(), 12),
            ("months", self.months.len(), 12),
            ("short_days", self.short_days.len(), 7),
            ("days", self.days.len(), 7),
        ];
        for (table, len, expected) in tables {
            if len != expected {
                return Err(I18nError::IncompleteTable {
                    locale: locale.to_owned(),
                    table,
                    len,
                });
            }
        }
        Ok(())
    }
}

/// Locale data catalog with language and chain fallback.
///
/// # Example
///
/// ```
/// use csync_i18n::catalog::LocaleCatalog;
///
/// let catalog = LocaleCatalog::builtin();
///
/// let (tag, fi) = catalog.resolve("fi_FI").unwrap();
/// assert_eq!(tag, "fi_FI");
/// assert_eq!(fi.months[0], "tammikuu");
///
/// // Unknown region falls back to the language, unknown language to "en".
/// assert_eq!(catalog.resolve("de_AT").unwrap().0, "de_DE");
/// assert_eq!(catalog.resolve("pt_BR").unwrap().0, "en");
/// ```
#[derive(Debug, Clone, Default)]
pub struct LocaleCatalog {
    locales: HashMap<Locale, LocaleData>,
    fallback_chain: Vec<Locale>,
}

impl LocaleCatalog {
    /// Create an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog with the built-in tables and `["en"]` as fallback.
    #[must_use]
    pub fn builtin() -> Self {
        let mut catalog = Self::new();
        for (tag, data) in builtin_locales() {
            catalog.locales.insert(tag.to_owned(), data);
        }
        catalog.set_fallback_chain(vec!["en".into()]);
        catalog
    }

    /// Add data for a locale.
    ///
    /// # Errors
    ///
    /// [`I18nError::InvalidLocale`] for an empty tag,
    /// [`I18nError::IncompleteTable`] for short tables.
    pub fn add_locale(&mut self, locale: impl Into<String>, data: LocaleData) -> Result<(), I18nError> {
        let locale = locale.into();
        if locale.trim().is_empty() {
            return Err(I18nError::InvalidLocale(locale));
        }
        data.validate(&locale)?;
        self.locales.insert(locale, data);
        Ok(())
    }

    /// Set the fallback chain (tried in order when a locale is missing).
    pub fn set_fallback_chain(&mut self, chain: Vec<Locale>) {
        self.fallback_chain = chain;
    }

    /// Find data for `locale`: exact tag, then any tag of the same
    /// language, then the fallback chain. Returns the tag actually used.
    #[must_use]
    pub fn resolve(&self, locale: &str) -> Option<(&str, &LocaleData)> {
        if let Some((tag, data)) = self.locales.get_key_value(locale) {
            return Some((tag.as_str(), data));
        }

        let language = language_of(locale);
        if let Some((tag, data)) = self.locales.get_key_value(language) {
            return Some((tag.as_str(), data));
        }
        let mut same_language: Vec<_> = self
            .locales
            .iter()
            .filter(|(tag, _)| language_of(tag) == language)
            .collect();
        same_language.sort_by(|a, b| a.0.cmp(b.0));
        if let Some((tag, data)) = same_language.first() {
            return Some((tag.as_str(), *data));
        }

        for fallback in &self.fallback_chain {
            if let Some((tag, data)) = self.locales.get_key_value(fallback.as_str()) {
                return Some((tag.as_str(), data));
            }
        }

        None
    }

    /// All registered locale tags.
    #[must_use]
    pub fn locales(&self) -> Vec<&str> {
        self.locales.keys().map(String::as_str).collect()
    }
}

fn language_of(tag: &str) -> &str {
    tag.split(['_', '-']).next().unwrap_or(tag)
}

fn builtin_locales() -> Vec<(&'static str, LocaleData)> {
    let english = |pattern: &str, first_day: u8| {
        LocaleData::from_static(
            ["Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec"],
            [
                "January", "February", "March", "April", "May", "June", "July", "August",
                "September", "October", "November", "December",
            ],
            ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"],
            ["Sunday", "Monday", "Tuesday", "Wednesday", "Thursday", "Friday", "Saturday"],
            first_day,
            pattern,
            ["AM", "PM"],
        )
    };
    vec![
        ("en", english("M/d/yy h:mm a", 0)),
        ("en_US", english("M/d/yy h:mm a", 0)),
        ("en_GB", english("dd/MM/yy HH:mm", 1)),
        (
            "fi_FI",
            LocaleData::from_static(
                [
                    "tammi", "helmi", "maalis", "huhti", "touko", "kesä", "heinä", "elo", "syys",
                    "loka", "marras", "joulu",
                ],
                [
                    "tammikuu", "helmikuu", "maaliskuu", "huhtikuu", "toukokuu", "kesäkuu",
                    "heinäkuu", "elokuu", "syyskuu", "lokakuu", "marraskuu", "joulukuu",
                ],
                ["su", "ma", "ti", "ke", "to", "pe", "la"],
                [
                    "sunnuntai", "maanantai", "tiistai", "keskiviikko", "torstai", "perjantai",
                    "lauantai",
                ],
                1,
                "d.M.yyyy H.mm",
                ["ap.", "ip."],
            ),
        ),
        (
            "de_DE",
            LocaleData::from_static(
                ["Jan", "Feb", "Mär", "Apr", "Mai", "Jun", "Jul", "Aug", "Sep", "Okt", "Nov", "Dez"],
                [
                    "Januar", "Februar", "März", "April", "Mai", "Juni", "Juli", "August",
                    "September", "Oktober", "November", "Dezember",
                ],
                ["So", "Mo", "Di", "Mi", "Do", "Fr", "Sa"],
                ["Sonntag", "Montag", "Dienstag", "Mittwoch", "Donnerstag", "Freitag", "Samstag"],
                1,
                "dd.MM.yy HH:mm",
                ["AM", "PM"],
            ),
        ),
        (
            "fr_FR",
            LocaleData::from_static(
                [
                    "janv.", "févr.", "mars", "avr.", "mai", "juin", "juil.", "août", "sept.",
                    "oct.", "nov.", "déc.",
                ],
                [
                    "janvier", "février", "mars", "avril", "mai", "juin", "juillet", "août",
                    "septembre", "octobre", "novembre", "décembre",
                ],
                ["dim.", "lun.", "mar.", "mer.", "jeu.", "ven.", "sam."],
                ["dimanche", "lundi", "mardi", "mercredi", "jeudi", "vendredi", "samedi"],
                1,
                "dd/MM/yy HH:mm",
                ["AM", "PM"],
            ),
        ),
        (
            "sv_SE",
            LocaleData::from_static(
                ["jan", "feb", "mar", "apr", "maj", "jun", "jul", "aug", "sep", "okt", "nov", "dec"],
                [
                    "januari", "februari", "mars", "april", "maj", "juni", "juli", "augusti",
                    "september", "oktober", "november", "december",
                ],
                ["sön", "mån", "tis", "ons", "tor", "fre", "lör"],
                ["söndag", "måndag", "tisdag", "onsdag", "torsdag", "fredag", "lördag"],
                1,
                "yyyy-MM-dd HH:mm",
                ["fm", "em"],
            ),
        ),
        (
            "ko_KR",
            LocaleData::from_static(
                ["1월", "2월", "3월", "4월", "5월", "6월", "7월", "8월", "9월", "10월", "11월", "12월"],
                ["1월", "2월", "3월", "4월", "5월", "6월", "7월", "8월", "9월", "10월", "11월", "12월"],
                ["일", "월", "화", "수", "목", "금", "토"],
                ["일요일", "월요일", "화요일", "수요일", "목요일", "금요일", "토요일"],
                0,
                "yy. M. d a h:mm",
                ["오전", "오후"],
            ),
        ),
    ]
}
