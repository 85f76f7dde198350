/// Equality predicate over entity fields.
///
/// Parsed from a query string such as `ownerUserId=4&runtime=1.13` (a leading `?` is allowed).
/// A row matches when every pair's value equals the string form of the row's field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntityQuery {
    pairs: Vec<(String, String)>,
}

impl EntityQuery {
    pub fn new() -> Self {
        Self { pairs: Vec::new() }
    }

    /// Parse a `key=value&key=value` string.
    ///
    /// Segments without `=` or with an empty key are skipped. A repeated key keeps its last value.
    pub fn parse(params: &str) -> Self {
        let params = params.trim().trim_start_matches('?');
        let mut query = Self::new();

        for segment in params.split('&') {
            let Some((key, value)) = segment.split_once('=') else {
                continue;
            };
            if key.is_empty() {
                continue;
            }
            query = query.with(key, value);
        }
        query
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into();
        let value = value.into();
        match self.pairs.iter_mut().find(|(k, _)| *k == key) {
            Some(pair) => pair.1 = value,
            None => self.pairs.push((key, value)),
        }
        self
    }

    pub fn pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// An empty query matches every row.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}
