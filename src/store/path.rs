//! Typed field paths into table columns and nested JSON metadata.
//!
//! A path addresses either a plain column (`user_id`) or a nested field of
//! a JSON column (`metadata__ensembles__always__0`). Paths are parsed once
//! into a column plus a sequence of key/index segments and compiled to the
//! store's native `json_extract` syntax; user values never reach the SQL
//! text directly.

/// One step into a JSON document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    /// Object key
    Key(String),
    /// Array index
    Index(usize),
}

/// A column, optionally followed by a path into its JSON content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPath {
    column: String,
    segments: Vec<PathSegment>,
}

impl FieldPath {
    /// A plain column reference.
    pub fn column(name: impl Into<String>) -> Self {
        Self {
            column: name.into(),
            segments: Vec::new(),
        }
    }

    /// Parse dunder syntax: `metadata__a__0__b` is column `metadata`,
    /// key `a`, index 0, key `b`. Purely numeric segments become indices.
    pub fn parse(path: &str) -> Self {
        let mut parts = path.split("__");
        let column = parts.next().unwrap_or_default().to_string();
        let segments = parts
            .map(|part| match part.parse::<usize>() {
                Ok(idx) => PathSegment::Index(idx),
                Err(_) => PathSegment::Key(part.to_string()),
            })
            .collect();
        Self { column, segments }
    }

    /// Descend one key deeper.
    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.segments.push(PathSegment::Key(key.into()));
        self
    }

    /// Descend into an array element.
    pub fn index(mut self, idx: usize) -> Self {
        self.segments.push(PathSegment::Index(idx));
        self
    }

    /// The column this path starts from.
    pub fn column_name(&self) -> &str {
        &self.column
    }

    /// Whether this path descends into JSON content.
    pub fn is_nested(&self) -> bool {
        !self.segments.is_empty()
    }

    /// JSONPath string for the nested part, e.g. `$."a"[0]."b"`.
    fn json_path(&self) -> String {
        let mut out = String::from("$");
        for segment in &self.segments {
            match segment {
                // Keys are quoted so dots and brackets in key names stay literal.
                PathSegment::Key(key) => {
                    out.push_str(&format!(".\"{}\"", key.replace('"', "\"\"")))
                }
                PathSegment::Index(idx) => out.push_str(&format!("[{idx}]")),
            }
        }
        out
    }

    /// SQL expression selecting this path's value.
    pub fn sql(&self) -> String {
        if self.segments.is_empty() {
            format!("\"{}\"", self.column)
        } else {
            format!("json_extract(\"{}\", '{}')", self.column, self.json_path())
        }
    }

    /// SQL expression with an output alias, for projections.
    pub fn sql_projection(&self) -> String {
        if self.segments.is_empty() {
            self.sql()
        } else {
            format!("{} AS json_field", self.sql())
        }
    }
}

impl From<&str> for FieldPath {
    fn from(path: &str) -> Self {
        FieldPath::parse(path)
    }
}

impl From<String> for FieldPath {
    fn from(path: String) -> Self {
        FieldPath::parse(&path)
    }
}
