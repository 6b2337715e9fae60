//! Database schema definitions

/// Results table: one row per delivery-execution attempt
pub const RESULTS_TABLE: &str = "results_storage";
/// Variables table: one row per recorded outcome/response datum
pub const VARIABLES_TABLE: &str = "variables_storage";
/// Foreign-key column tying a variable to its result (not engine-enforced)
pub const VARIABLES_FK_COLUMN: &str = "results_result_id";

/// SQL to create the results table
pub const CREATE_RESULTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS results_storage (
    result_id TEXT PRIMARY KEY,
    test_taker TEXT,
    delivery TEXT
)
"#;

/// SQL to create the variables table
///
/// The reference to results_storage is deliberately not a FOREIGN KEY
/// constraint; the cascade on delete is done by the store inside one
/// transaction.
pub const CREATE_VARIABLES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS variables_storage (
    variable_id INTEGER PRIMARY KEY AUTOINCREMENT,
    results_result_id TEXT NOT NULL,
    test TEXT NOT NULL,
    item TEXT,
    call_id_item TEXT,
    call_id_test TEXT,
    identifier TEXT NOT NULL,
    value TEXT NOT NULL
)
"#;

/// SQL to create indexes
pub const CREATE_INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_variables_storage_call_id_item ON variables_storage(call_id_item)",
    "CREATE INDEX IF NOT EXISTS idx_variables_storage_call_id_test ON variables_storage(call_id_test)",
    "CREATE INDEX IF NOT EXISTS idx_variables_storage_result ON variables_storage(results_result_id)",
];

/// All schema creation statements
pub fn all_schema_statements() -> Vec<&'static str> {
    let mut stmts = vec![CREATE_RESULTS_TABLE, CREATE_VARIABLES_TABLE];
    stmts.extend(CREATE_INDEXES.iter().copied());
    stmts
}
