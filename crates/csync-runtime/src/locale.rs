#![forbid(unsafe_code)]

//! Locales the client has asked for, and their wire form.
//!
//! Locales are queued with [`PendingLocales::require`] and sent once; a full
//! repaint resets the queue so the client gets them again.

use std::env;

use csync_i18n::{LocaleCatalog, LocaleData};
use serde_json::{Value as JsonValue, json};

/// Locale queue of one session.
#[derive(Debug, Clone, Default)]
pub struct PendingLocales {
    locales: Vec<String>,
    sent: usize,
}

impl PendingLocales {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `locale` unless it is already queued or sent.
    pub fn require(&mut self, locale: &str) {
        let Some(locale) = normalize_locale_tag(locale) else {
            return;
        };
        if !self.locales.contains(&locale) {
            self.locales.push(locale);
        }
    }

    /// Forget everything sent and start over with `locale`.
    pub fn reset(&mut self, locale: &str) {
        self.locales.clear();
        self.sent = 0;
        self.require(locale);
    }

    /// Locales not yet sent, marking them sent.
    pub fn drain_unsent(&mut self) -> Vec<String> {
        let unsent = self.locales[self.sent..].to_vec();
        self.sent = self.locales.len();
        unsent
    }

    #[must_use]
    pub fn has_unsent(&self) -> bool {
        self.sent < self.locales.len()
    }
}

/// The `{name, smn, mn, sdn, dn, fdow, df, thc, hmd[, ampm]}` object.
#[must_use]
pub fn locale_json(name: &str, data: &LocaleData) -> JsonValue {
    let format = data.date_time_format();
    let mut object = json!({
        "name": name,
        "smn": data.short_months,
        "mn": data.months,
        "sdn": data.short_days,
        "dn": data.days,
        "fdow": data.first_day_of_week,
        "df": format.date_format,
        "thc": format.twelve_hour_clock,
        "hmd": format.hour_min_delimiter.to_string(),
    });
    if format.twelve_hour_clock {
        if let Some(map) = object.as_object_mut() {
            map.insert("ampm".to_owned(), json!(data.am_pm));
        }
    }
    object
}

/// Resolve and render every unsent locale. Locales the catalog cannot
/// resolve are skipped with a warning.
pub fn render_pending(pending: &mut PendingLocales, catalog: &LocaleCatalog) -> Vec<JsonValue> {
    pending
        .drain_unsent()
        .into_iter()
        .filter_map(|name| match catalog.resolve(&name) {
            Some((_, data)) => Some(locale_json(&name, data)),
            None => {
                tracing::warn!(locale = %name, "no locale data available");
                None
            }
        })
        .collect()
}

/// Process locale from `LC_ALL` or `LANG`, `en` when unknown.
#[must_use]
pub fn detect_system_locale() -> String {
    let lc_all = env::var("LC_ALL").ok();
    let lang = env::var("LANG").ok();
    detect_system_locale_from(lc_all.as_deref(), lang.as_deref())
}

fn detect_system_locale_from(lc_all: Option<&str>, lang: Option<&str>) -> String {
    lc_all
        .and_then(normalize_locale_tag)
        .or_else(|| lang.and_then(normalize_locale_tag))
        .unwrap_or_else(|| "en".to_owned())
}

/// `fi-FI.UTF-8@euro` → `fi_FI`; `C` and `POSIX` → `en`.
#[must_use]
pub fn normalize_locale_tag(raw: &str) -> Option<String> {
    let raw = raw.trim();
    let raw = raw.split('@').next().unwrap_or(raw);
    let raw = raw.split('.').next().unwrap_or(raw).trim();
    if raw.is_empty() {
        return None;
    }
    if raw.eq_ignore_ascii_case("c") || raw.eq_ignore_ascii_case("posix") {
        return Some("en".to_owned());
    }
    Some(raw.replace('-', "_"))
}
