//! Table and column naming strategies.

use std::fmt;

use convert_case::{Case, Casing};

/// Maps entity and field keys to table and column names.
///
/// Names declared explicitly on the entity or field always take precedence.
pub trait NamingStrategy: fmt::Debug + Send + Sync {
    /// Table name for an entity.
    fn table_name(&self, entity: &str) -> String;

    /// Column name for a field key.
    fn column_name(&self, field: &str) -> String;
}

/// Uses entity and field keys verbatim.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultNaming;

impl NamingStrategy for DefaultNaming {
    fn table_name(&self, entity: &str) -> String {
        entity.to_string()
    }

    fn column_name(&self, field: &str) -> String {
        field.to_string()
    }
}

/// Converts keys to `snake_case` (`MeasureUnit` -> `measure_unit`).
#[derive(Debug, Clone, Copy, Default)]
pub struct SnakeCaseNaming;

impl NamingStrategy for SnakeCaseNaming {
    fn table_name(&self, entity: &str) -> String {
        entity.to_case(Case::Snake)
    }

    fn column_name(&self, field: &str) -> String {
        field.to_case(Case::Snake)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snake_case() {
        assert_eq!(SnakeCaseNaming.table_name("MeasureUnit"), "measure_unit");
        assert_eq!(SnakeCaseNaming.column_name("measureUnitId"), "measure_unit_id");
        assert_eq!(DefaultNaming.column_name("measureUnitId"), "measureUnitId");
    }
}
