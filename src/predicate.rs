//! Record filter: keep records whose named field matches a value, ignoring case.
//!
//! Case is removed with full Unicode case folding, so `"STRASSE"` matches
//! `"straße"`.

use crate::io::records::Record;

/// Field compared by default.
pub const DEFAULT_FIELD: &str = "subreddit";

/// Case-insensitive equality filter on one string field.
///
/// With no value set, every record is kept. An empty value is treated as unset.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Predicate {
    field: String,
    folded: Option<String>,
}

impl Default for Predicate {
    fn default() -> Self {
        Self::keep_all()
    }
}

impl Predicate {
    /// A filter that keeps every record.
    #[must_use]
    pub fn keep_all() -> Self {
        Self {
            field: DEFAULT_FIELD.to_string(),
            folded: None,
        }
    }

    /// Filter on the `subreddit` field.
    #[must_use]
    pub fn subreddit(value: Option<&str>) -> Self {
        Self::on_field(DEFAULT_FIELD, value)
    }

    /// Filter on an arbitrary top-level field.
    #[must_use]
    pub fn on_field(field: impl Into<String>, value: Option<&str>) -> Self {
        Self {
            field: field.into(),
            folded: value.filter(|v| !v.is_empty()).map(fold),
        }
    }

    #[must_use]
    pub fn field(&self) -> &str {
        &self.field
    }

    /// `true` when no filter value is set.
    #[must_use]
    pub fn is_keep_all(&self) -> bool {
        self.folded.is_none()
    }

    #[must_use]
    pub fn keep(&self, record: &Record) -> bool {
        match &self.folded {
            None => true,
            Some(want) => fold_opt(record.field_str(&self.field)).as_deref() == Some(want.as_str()),
        }
    }
}

fn fold(s: &str) -> String {
    caseless::default_case_fold_str(s)
}

// Absent stays `None`, which never equals a folded string.
fn fold_opt(s: Option<&str>) -> Option<String> {
    s.map(fold)
}
