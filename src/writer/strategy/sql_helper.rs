//! Column lists and positional transforms for stage `COPY INTO`

use crate::database::quote::quote_identifier;
use crate::models::Column;

/// Quoted target names of the non-ignored columns
pub fn quoted_column_names(items: &[Column]) -> Vec<String> {
    items
        .iter()
        .filter(|item| !item.is_ignored())
        .map(|item| quote_identifier(&item.db_name))
        .collect()
}

/// Positional select expressions for the non-ignored columns
///
/// Positions count ignored columns too, since they are still present in the
/// staged files. Nullable columns turn empty strings into NULL.
pub fn column_transformations(items: &[Column]) -> Vec<String> {
    items
        .iter()
        .enumerate()
        .filter(|(_, item)| !item.is_ignored())
        .map(|(index, item)| {
            let position = index + 1;
            if item.is_nullable() {
                format!("IFF(t.${} = '', null, t.${})", position, position)
            } else {
                format!("t.${}", position)
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_positions_skip_ignored() {
        let items = vec![
            Column::new("id", "id", "int").with_nullable(false),
            Column::new("junk", "junk", "IGNORE"),
            Column::new("name", "name", "varchar"),
        ];

        assert_eq!(quoted_column_names(&items), vec!["\"id\"", "\"name\""]);
        assert_eq!(
            column_transformations(&items),
            vec!["t.$1".to_string(), "IFF(t.$3 = '', null, t.$3)".to_string()]
        );
    }
}
