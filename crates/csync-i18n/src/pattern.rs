#![forbid(unsafe_code)]

//! Split a combined short date-time pattern into the pieces the client
//! needs: the date part, whether the clock is 12-hour, and the hour/minute
//! delimiter.

/// Client-facing view of a short date-time pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateTimeFormat {
    /// Date-only pattern (`df`).
    pub date_format: String,
    /// Twelve-hour clock (`thc`).
    pub twelve_hour_clock: bool,
    /// Hour/minute delimiter (`hmd`).
    pub hour_min_delimiter: char,
}

impl DateTimeFormat {
    /// Split `pattern`, e.g. `"M/d/yy h:mm a"`.
    ///
    /// The time part starts at the first `H` (or `h`), or at an `a` marker
    /// that precedes it. A time part at the very start means the date
    /// follows it after the first space (after the marker, if any).
    ///
    /// ```
    /// use csync_i18n::pattern::DateTimeFormat;
    ///
    /// let us = DateTimeFormat::from_pattern("M/d/yy h:mm a");
    /// assert_eq!(us.date_format, "M/d/yy");
    /// assert!(us.twelve_hour_clock);
    ///
    /// let fi = DateTimeFormat::from_pattern("d.M.yyyy H.mm");
    /// assert_eq!(fi.date_format, "d.M.yyyy");
    /// assert_eq!(fi.hour_min_delimiter, '.');
    /// ```
    #[must_use]
    pub fn from_pattern(pattern: &str) -> Self {
        let hour = pattern.find('H').or_else(|| pattern.find('h'));
        let ampm = pattern.find('a');
        let time_start = match (hour, ampm) {
            (Some(h), Some(a)) if a > 0 && a < h => Some(a),
            (Some(h), _) => Some(h),
            (None, _) => None,
        };

        let Some(time_start) = time_start else {
            return Self {
                date_format: pattern.trim().to_owned(),
                twelve_hour_clock: false,
                hour_min_delimiter: ':',
            };
        };

        let date_format = if time_start == 0 {
            let mut date_start = pattern.find(' ');
            if let (Some(a), Some(space)) = (ampm, date_start) {
                if a > space {
                    date_start = pattern[a..].find(' ').map(|offset| a + offset);
                }
            }
            date_start.map_or("", |space| &pattern[space + 1..])
        } else {
            &pattern[..time_start]
        };

        let time_format = if time_start == 0 {
            pattern
        } else {
            &pattern[time_start..]
        };

        Self {
            date_format: date_format.trim().to_owned(),
            twelve_hour_clock: time_format.contains('a'),
            hour_min_delimiter: if time_format.contains('.') { '.' } else { ':' },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn twenty_four_hour_colon() {
        let f = DateTimeFormat::from_pattern("dd/MM/yy HH:mm");
        assert_eq!(f.date_format, "dd/MM/yy");
        assert!(!f.twelve_hour_clock);
        assert_eq!(f.hour_min_delimiter, ':');
    }

    #[test]
    fn ampm_marker_before_hour() {
        let f = DateTimeFormat::from_pattern("yy. M. d a h:mm");
        assert_eq!(f.date_format, "yy. M. d");
        assert!(f.twelve_hour_clock);
    }

    #[test]
    fn time_before_date() {
        let f = DateTimeFormat::from_pattern("HH:mm dd/MM/yy");
        assert_eq!(f.date_format, "dd/MM/yy");
        assert!(!f.twelve_hour_clock);
    }

    #[test]
    fn time_before_date_with_marker() {
        let f = DateTimeFormat::from_pattern("h:mm a dd/MM/yy");
        assert_eq!(f.date_format, "dd/MM/yy");
        assert!(f.twelve_hour_clock);
    }

    #[test]
    fn date_only_pattern() {
        let f = DateTimeFormat::from_pattern("yyyy-MM-dd");
        assert_eq!(f.date_format, "yyyy-MM-dd");
        assert!(!f.twelve_hour_clock);
        assert_eq!(f.hour_min_delimiter, ':');
    }

    proptest! {
        #[test]
        fn never_panics(pattern in "[dMyHhma .:/-]{0,24}") {
            let f = DateTimeFormat::from_pattern(&pattern);
            prop_assert!(f.date_format.len() <= pattern.len());
        }
    }
}
