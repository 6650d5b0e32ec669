//! The per-key cache record and the partial updates applied to it.

/// Field name of the cached payload.
pub const FIELD_HTML: &str = "html";
/// Field name of the write timestamp.
pub const FIELD_CREATED: &str = "created";
/// Field name of the rebuild-started marker.
pub const FIELD_BUILDING: &str = "building";

/// One cached page, as the store holds it.
///
/// Timestamps stay as the raw text the store returned. A value that does not
/// parse behaves as if the field were absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheEntry {
    pub html: Option<String>,
    pub created: Option<String>,
    pub building: Option<String>,
}

impl CacheEntry {
    /// Build an entry from `(field, value)` pairs, ignoring unknown fields.
    pub fn from_fields<I, K, V>(fields: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut entry = Self::default();
        for (name, value) in fields {
            match name.as_ref() {
                FIELD_HTML => entry.html = Some(value.into()),
                FIELD_CREATED => entry.created = Some(value.into()),
                FIELD_BUILDING => entry.building = Some(value.into()),
                _ => {}
            }
        }
        entry
    }

    /// Milliseconds since epoch when `html` was written, if readable.
    pub fn created_at(&self) -> Option<i64> {
        parse_millis(self.created.as_deref())
    }

    /// Milliseconds since epoch when the last rebuild started, if readable.
    pub fn building_since(&self) -> Option<i64> {
        parse_millis(self.building.as_deref())
    }

    /// Apply a patch in place with the same merge rule the stores use.
    pub fn merge(&mut self, patch: &EntryPatch) {
        if let Some(html) = &patch.html {
            self.html = Some(html.clone());
        }
        if let Some(created) = patch.created {
            self.created = Some(created.to_string());
        }
        if let Some(building) = patch.building {
            self.building = Some(building.to_string());
        }
    }
}

fn parse_millis(raw: Option<&str>) -> Option<i64> {
    raw?.trim().parse().ok()
}

/// A partial update merged into an entry. Fields left as `None` are untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryPatch {
    pub html: Option<String>,
    pub created: Option<i64>,
    pub building: Option<i64>,
}

impl EntryPatch {
    /// Rebuild-started marker.
    pub fn building(now: i64) -> Self {
        Self { building: Some(now), ..Default::default() }
    }

    /// Rebuild-completed marker.
    pub fn built(now: i64, html: impl Into<String>) -> Self {
        Self { html: Some(html.into()), created: Some(now), building: None }
    }

    /// The set fields as `(name, value)` pairs, for hash-per-key stores.
    pub fn fields(&self) -> Vec<(&'static str, String)> {
        let mut fields = Vec::with_capacity(3);
        if let Some(html) = &self.html {
            fields.push((FIELD_HTML, html.clone()));
        }
        if let Some(created) = self.created {
            fields.push((FIELD_CREATED, created.to_string()));
        }
        if let Some(building) = self.building {
            fields.push((FIELD_BUILDING, building.to_string()));
        }
        fields
    }

    pub fn is_empty(&self) -> bool {
        self.html.is_none() && self.created.is_none() && self.building.is_none()
    }
}
