// ============================================================
// Layer 3 - Category Catalog
// ============================================================
// Maps contiguous class ids to category names.
//
// Names come from the per-category source files, e.g.
//   "The Eiffel Tower.csv" -> "The Eiffel Tower"
// and are sorted case-insensitively, so id 0 is the first name
// in that order. Shard labels (`y`) were produced with the same
// ordering, which is why the catalog must never be re-sorted or
// mutated once built.

/// Immutable id -> name table for the whole run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryCatalog {
    names: Vec<String>,
}

impl CategoryCatalog {
    /// Build from source file names ("cat.csv", "hot dog.csv", ...).
    /// Everything from the first `.` onwards is dropped.
    pub fn from_file_names<I, S>(file_names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let names = file_names
            .into_iter()
            .map(|f| category_from_file_name(f.as_ref()).to_string());
        Self::from_names(names)
    }

    /// Build from bare category names.
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut names: Vec<String> = names.into_iter().map(Into::into).collect();
        // Stable sort: names that only differ by case keep their listing order.
        names.sort_by_key(|n| n.to_lowercase());
        Self { names }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn name(&self, id: usize) -> Option<&str> {
        self.names.get(id).map(String::as_str)
    }

    /// Name as it appears in a submission: spaces become underscores
    /// so the three predictions stay space-separated tokens.
    pub fn submission_name(&self, id: usize) -> Option<String> {
        self.name(id).map(|n| n.replace(' ', "_"))
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }
}

fn category_from_file_name(file_name: &str) -> &str {
    file_name.split('.').next().unwrap_or(file_name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sorts_case_insensitively() {
        let c = CategoryCatalog::from_file_names(["zebra.csv", "The Eiffel Tower.csv", "apple.csv"]);
        assert_eq!(c.names(), &["apple", "The Eiffel Tower", "zebra"]);
        assert_eq!(c.name(2), Some("zebra"));
    }

    #[test]
    fn test_strips_everything_after_first_dot() {
        let c = CategoryCatalog::from_file_names(["cat.csv.gz"]);
        assert_eq!(c.name(0), Some("cat"));
    }

    #[test]
    fn test_submission_name_replaces_spaces() {
        let c = CategoryCatalog::from_names(["hot dog", "cat"]);
        assert_eq!(c.submission_name(1), Some("hot_dog".to_string()));
        assert_eq!(c.submission_name(0), Some("cat".to_string()));
    }

    #[test]
    fn test_unknown_id() {
        let c = CategoryCatalog::from_names(["cat"]);
        assert_eq!(c.name(1), None);
        assert_eq!(c.submission_name(5), None);
    }
}
