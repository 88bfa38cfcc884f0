use bson::{Bson, Document};

/// Specifies the direction for sorting documents.
///
/// On the wire `Ascending` encodes as `1` and `Descending` as `-1`.
///
/// # Usage
/// ```text
/// let options = FindOptions::new().sort_by("age", SortOrder::Descending);
/// let results = repository.find(all(), options).await?;
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    /// Sort in ascending order (smallest to largest, A-Z, oldest to newest)
    Ascending,
    /// Sort in descending order (largest to smallest, Z-A, newest to oldest)
    Descending,
}

impl SortOrder {
    /// Native direction value, `1` or `-1`.
    pub fn direction(&self) -> i32 {
        match self {
            SortOrder::Ascending => 1,
            SortOrder::Descending => -1,
        }
    }

    /// Parses a native direction value. Any negative number means descending.
    pub fn from_bson(value: &Bson) -> Option<SortOrder> {
        let direction = match value {
            Bson::Int32(v) => *v as i64,
            Bson::Int64(v) => *v,
            Bson::Double(v) => *v as i64,
            _ => return None,
        };
        match direction {
            0 => None,
            d if d < 0 => Some(SortOrder::Descending),
            _ => Some(SortOrder::Ascending),
        }
    }
}

/// An ordered list of `(field, direction)` pairs.
///
/// The order of insertion is the order of precedence: the first field is the
/// primary sort key, the second breaks ties of the first, and so on.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SortableFields {
    sorting_order: Vec<(String, SortOrder)>,
}

impl SortableFields {
    pub fn new() -> SortableFields {
        SortableFields {
            sorting_order: Vec::new(),
        }
    }

    #[inline]
    pub fn add_field(self, field_name: &str) -> SortableFields {
        self.add_sorted_field(field_name, SortOrder::Ascending)
    }

    #[inline]
    pub fn add_sorted_field(mut self, field_name: &str, sort_order: SortOrder) -> SortableFields {
        self.sorting_order.push((field_name.to_string(), sort_order));
        self
    }

    pub fn field_names(&self) -> Vec<String> {
        self.sorting_order
            .iter()
            .map(|(name, _)| name.clone())
            .collect()
    }

    #[inline]
    pub fn sorting_order(&self) -> &[(String, SortOrder)] {
        &self.sorting_order
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.sorting_order.is_empty()
    }

    /// Encodes the fields as a native sort specification, preserving order.
    pub fn to_document(&self) -> Document {
        let mut spec = Document::new();
        for (field, order) in &self.sorting_order {
            spec.insert(field.clone(), order.direction());
        }
        spec
    }
}

impl<S: Into<String>> FromIterator<(S, SortOrder)> for SortableFields {
    fn from_iter<I: IntoIterator<Item = (S, SortOrder)>>(iter: I) -> Self {
        SortableFields {
            sorting_order: iter
                .into_iter()
                .map(|(name, order)| (name.into(), order))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direction_encoding() {
        assert_eq!(SortOrder::Ascending.direction(), 1);
        assert_eq!(SortOrder::Descending.direction(), -1);
    }

    #[test]
    fn test_from_bson() {
        assert_eq!(SortOrder::from_bson(&Bson::Int32(1)), Some(SortOrder::Ascending));
        assert_eq!(SortOrder::from_bson(&Bson::Int64(-1)), Some(SortOrder::Descending));
        assert_eq!(SortOrder::from_bson(&Bson::Int32(0)), None);
        assert_eq!(SortOrder::from_bson(&Bson::String("asc".into())), None);
    }

    #[test]
    fn test_sortable_fields_preserve_order() {
        let fields = SortableFields::new()
            .add_sorted_field("b", SortOrder::Descending)
            .add_field("a");
        assert_eq!(fields.field_names(), vec!["b".to_string(), "a".to_string()]);

        let spec = fields.to_document();
        let keys: Vec<&String> = spec.keys().collect();
        assert_eq!(keys, vec!["b", "a"]);
        assert_eq!(spec.get_i32("b").ok(), Some(-1));
        assert_eq!(spec.get_i32("a").ok(), Some(1));
    }

    #[test]
    fn test_collect_from_pairs() {
        let fields: SortableFields = vec![("x", SortOrder::Ascending), ("y", SortOrder::Descending)]
            .into_iter()
            .collect();
        assert_eq!(fields.sorting_order().len(), 2);
        assert!(!fields.is_empty());
        assert!(SortableFields::new().is_empty());
    }
}
