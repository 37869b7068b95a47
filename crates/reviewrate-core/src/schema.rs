/// Column names and Arrow schema of the annotation ledger.
pub mod ledger {
    use arrow::datatypes::{DataType, Field, Schema, TimeUnit};

    pub const ROW_ID: &str = "row_id";
    pub const PRODUCT_LINE_ID: &str = "product_line_id";
    pub const ITEM_ID: &str = "item_id";
    pub const REVIEWER_ID: &str = "reviewer_id";
    pub const PROPERTY_NAME: &str = "property_name";
    pub const PROPERTY_TYPE: &str = "property_type";
    pub const AI_RATING_RESULT: &str = "ai_rating_result";
    pub const AI_MODEL: &str = "ai_model";
    pub const AI_SCORE: &str = "ai_score";
    pub const RATED_AT: &str = "rated_at";

    /// Identity columns, in tuple order.
    pub const IDENTITY: [&str; 3] = [ITEM_ID, REVIEWER_ID, PROPERTY_NAME];

    /// Schema of a ledger table as read back from the store.
    ///
    /// `row_id` comes from a sequence and is the ordering column; `rated_at`
    /// (UTC, stored without zone) is shared by every record committed in the
    /// same chunk.
    pub fn ledger_schema() -> Schema {
        Schema::new(vec![
            Field::new(ROW_ID, DataType::Int64, false),
            Field::new(PRODUCT_LINE_ID, DataType::Utf8, false),
            Field::new(ITEM_ID, DataType::Utf8, false),
            Field::new(REVIEWER_ID, DataType::Utf8, false),
            Field::new(PROPERTY_NAME, DataType::Utf8, false),
            Field::new(PROPERTY_TYPE, DataType::Utf8, true),
            Field::new(AI_RATING_RESULT, DataType::Utf8, false),
            Field::new(AI_MODEL, DataType::Utf8, false),
            Field::new(AI_SCORE, DataType::Int32, true),
            Field::new(RATED_AT, DataType::Timestamp(TimeUnit::Microsecond, None), false),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::ledger;

    #[test]
    fn ledger_schema_has_expected_fields() {
        let schema = ledger::ledger_schema();
        assert_eq!(schema.fields().len(), 10);
        for col in ledger::IDENTITY {
            let field = schema.field_with_name(col).unwrap();
            assert!(!field.is_nullable(), "{col} must not be nullable");
        }
        assert!(schema.field_with_name(ledger::AI_SCORE).unwrap().is_nullable());
    }
}
