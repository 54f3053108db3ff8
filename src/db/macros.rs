/// Append `"column = ?N"` to a dynamic SET clause and queue its bound value.
///
/// `$values` is a `Vec<Box<dyn rusqlite::ToSql>>`; the placeholder index is
/// derived from its length, so SET fragments and params can't drift apart.
/// `None` fields are skipped.
///
/// ```ignore
/// let mut sets = Vec::new();
/// let mut values: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();
/// push_field!(input.question, "question", sets, values);
/// push_field!(input.keywords.map(|k| encode(&k)), "keywords", sets, values);
/// ```
#[macro_export]
macro_rules! push_field {
    ($field:expr, $col:literal, $sets:expr, $values:expr) => {
        if let Some(value) = $field {
            $values.push(Box::new(value) as Box<dyn rusqlite::ToSql>);
            $sets.push(format!("{} = ?{}", $col, $values.len()));
        }
    };
}
