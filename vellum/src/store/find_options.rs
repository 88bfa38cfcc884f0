use crate::common::{SortOrder, SortableFields};

/// Options for controlling find operations.
///
/// `FindOptions` carries pagination and ordering for a read. Skip and limit
/// accept signed counts and clamp negatives to zero; a limit of zero means no
/// limit at all.
///
/// # Examples
///
/// ```rust,ignore
/// use vellum::store::{FindOptions, order_by};
/// use vellum::common::SortOrder;
///
/// let options = FindOptions::new()
///     .sort_by("age", SortOrder::Descending)
///     .skip(10)
///     .limit(20);
///
/// let options = order_by("name", SortOrder::Ascending);
/// let options = skip_by(5);
/// let options = limit_to(100);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindOptions {
    pub(crate) sort_by: SortableFields,
    pub(crate) skip: u64,
    pub(crate) limit: u64,
}

/// Creates `FindOptions` sorted by a single field.
pub fn order_by(field_name: &str, sort_order: SortOrder) -> FindOptions {
    FindOptions::new().sort_by(field_name, sort_order)
}

/// Creates `FindOptions` that skips the first `skip` results.
pub fn skip_by(skip: i64) -> FindOptions {
    FindOptions::new().skip(skip)
}

/// Creates `FindOptions` returning at most `limit` results.
pub fn limit_to(limit: i64) -> FindOptions {
    FindOptions::new().limit(limit)
}

impl FindOptions {
    pub fn new() -> FindOptions {
        FindOptions {
            sort_by: SortableFields::new(),
            skip: 0,
            limit: 0,
        }
    }

    /// Sets the number of results to skip. Negative values count as zero.
    pub fn skip(mut self, skip: i64) -> FindOptions {
        self.skip = clamp(skip);
        self
    }

    /// Sets the maximum number of results. Zero, or a negative value, removes
    /// the limit.
    pub fn limit(mut self, limit: i64) -> FindOptions {
        self.limit = clamp(limit);
        self
    }

    /// Appends a sort key. Keys apply in the order they were added.
    pub fn sort_by(mut self, field_name: &str, sort_order: SortOrder) -> FindOptions {
        self.sort_by = self.sort_by.add_sorted_field(field_name, sort_order);
        self
    }

    /// Replaces the sort keys.
    pub fn sort(mut self, fields: SortableFields) -> FindOptions {
        self.sort_by = fields;
        self
    }

    #[inline]
    pub fn skip_count(&self) -> u64 {
        self.skip
    }

    #[inline]
    pub fn limit_count(&self) -> u64 {
        self.limit
    }

    #[inline]
    pub fn sortable_fields(&self) -> &SortableFields {
        &self.sort_by
    }
}

#[inline]
fn clamp(value: i64) -> u64 {
    value.max(0) as u64
}
